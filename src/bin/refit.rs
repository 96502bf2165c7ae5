use std::env;
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::bail;
use clap::Parser;
use stanza::renderer::console::Console;
use stanza::renderer::Renderer;
use tinyrand::{Rand, Seeded, StdRand};
use tracing::{debug, info, warn};

use refit::algorithm::FitterKind;
use refit::display::{DisplayPoint, DisplaySecs};
use refit::event::FitEvent;
use refit::file::{write_json, ReadJsonFile};
use refit::history::UncertaintyState;
use refit::mapper::Mapper;
use refit::print::{tabulate_parameters, tabulate_stats};
use refit::problem::{Parameter, Problem};
use refit::session::{FitSession, SessionConfig};

/// Fits a simulated thin-film reflectivity curve in the background, reporting progress as it
/// goes.
#[derive(Debug, clap::Parser, Clone)]
struct Args {
    /// JSON file to source the session configuration from
    #[clap(short = 'c', long)]
    config: Option<PathBuf>,

    /// fitter to use (amoeba, de, dream, newton, rl, snobfit)
    #[clap(short = 'f', long)]
    fitter: Option<String>,

    /// iteration budget
    #[clap(short = 's', long)]
    steps: Option<u64>,

    /// random seed
    #[clap(long)]
    seed: Option<u64>,

    /// evaluate on a pool of this many workers
    #[clap(short = 'w', long)]
    workers: Option<usize>,

    /// seconds between progress reports
    #[clap(short = 'p', long)]
    progress: Option<f64>,

    /// file to write the best point to
    #[clap(short = 'o', long)]
    output: Option<PathBuf>,
}
impl Args {
    fn validate(&self) -> anyhow::Result<()> {
        if let Some(fitter) = &self.fitter {
            FitterKind::parse(fitter)?;
        }
        if self.steps == Some(0) {
            bail!("at least one step must be allowed");
        }
        if self.workers == Some(0) {
            bail!("at least one worker must be specified");
        }
        if let Some(progress) = self.progress {
            if Duration::try_from_secs_f64(progress).is_err() {
                bail!("progress interval must be a non-negative number of seconds");
            }
        }
        Ok(())
    }

    fn session_config(&self) -> anyhow::Result<SessionConfig> {
        let mut config = match &self.config {
            None => SessionConfig {
                fitter: FitterKind::De,
                ..SessionConfig::default()
            },
            Some(path) => SessionConfig::read_json_file(path)?,
        };
        if let Some(fitter) = &self.fitter {
            config.fitter = FitterKind::parse(fitter)?;
        }
        if let Some(steps) = self.steps {
            config.options.steps = steps;
        }
        if let Some(seed) = self.seed {
            config.options.seed = seed;
        }
        if let Some(workers) = self.workers {
            config.mapper = Mapper::Parallel {
                workers: Some(workers),
            };
        }
        if let Some(progress) = self.progress {
            config.intervals.progress = progress;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    if env::var("RUST_BACKTRACE").is_err() {
        env::set_var("RUST_BACKTRACE", "full")
    }
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info")
    }
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    args.validate()?;
    debug!("args: {args:?}");

    let config = args.session_config()?;
    info!(
        "fitting with {} ({}), {:?}",
        config.fitter,
        config.fitter.description(),
        config.mapper
    );

    let mut problem = thin_film(config.options.seed)?;
    let mut handle = FitSession::new(config).start(&problem)?;
    let mut uncertainty: Option<UncertaintyState> = None;
    while let Some(event) = handle.next().await {
        match event {
            FitEvent::Progress { step, value, .. } => {
                info!("step {step}: value {value:.6e}");
            }
            FitEvent::Improvement {
                step, value, point, ..
            } => {
                info!("improved at step {step}: {value:.6e} at {}", DisplayPoint::from(&*point));
            }
            FitEvent::ConvergenceUpdate { summary, .. } => {
                debug!(
                    "convergence at step {}: best {:.6e}, trend {:?}",
                    summary.step, summary.best, summary.trend
                );
            }
            FitEvent::UncertaintyUpdate { state, .. } => {
                info!(
                    "uncertainty at generation {}: {} draws, acceptance {:.3}",
                    state.generation,
                    state.draws.len(),
                    state.acceptance_rate
                );
                uncertainty = Some((*state).clone());
            }
            FitEvent::Complete { best, stats, .. } => {
                info!(
                    "\n{}",
                    Console::default().render(&tabulate_stats(best.as_ref(), &stats))
                );
                match best {
                    Some(best) => {
                        let table = tabulate_parameters(&problem, &best, uncertainty.as_ref());
                        info!("\n{}", Console::default().render(&table));
                        problem.remember_best(&best)?;
                        for line in problem.summarize(&best.point) {
                            debug!("{line}");
                        }
                        if let Some(output) = &args.output {
                            write_json(output, &best)?;
                            info!("wrote best point to {}", output.display());
                        }
                    }
                    None => warn!("fit aborted after {}", DisplaySecs(stats.elapsed)),
                }
            }
        }
    }
    handle.join()?;
    Ok(())
}

const TRUE_THICKNESS: f64 = 120.0;
const TRUE_ROUGHNESS: f64 = 4.0;
const TRUE_BACKGROUND: f64 = -7.0;

/// Kinematic reflectivity of a single film on a substrate: Fresnel decay modulated by Kiessig
/// fringes, damped by interfacial roughness, over a flat background.
fn reflectivity(q: f64, thickness: f64, roughness: f64, log_background: f64) -> f64 {
    const Q_CRITICAL: f64 = 0.02;
    let fresnel = if q <= Q_CRITICAL {
        1.0
    } else {
        (Q_CRITICAL / (2.0 * q)).powi(4)
    };
    let fringes = 1.0 + 0.8 * (q * thickness).cos() * (-(q * roughness).powi(2)).exp();
    fresnel * fringes + 10_f64.powf(log_background)
}

/// A simulated measurement with 3% noise, and a problem fitting it by the mean squared
/// difference in log reflectivity.
fn thin_film(seed: u64) -> anyhow::Result<Problem> {
    const POINTS: usize = 150;
    let mut rand = StdRand::seed(seed);
    let data: Vec<(f64, f64)> = (0..POINTS)
        .map(|index| {
            let q = 0.01 + 0.24 * index as f64 / (POINTS - 1) as f64;
            let noise = 1.0 + 0.03 * (2.0 * rand.next_u64() as f64 / u64::MAX as f64 - 1.0);
            let measured =
                reflectivity(q, TRUE_THICKNESS, TRUE_ROUGHNESS, TRUE_BACKGROUND) * noise;
            (q, measured.log10())
        })
        .collect();

    let problem = Problem::from_fn(
        vec![
            Parameter::new("thickness", 100.0, 50.0..=200.0),
            Parameter::new("roughness", 1.0, 0.0..=10.0),
            Parameter::new("log_background", -6.0, -9.0..=-5.0),
        ],
        move |point| {
            let sum: f64 = data
                .iter()
                .map(|&(q, measured)| {
                    (reflectivity(q, point[0], point[1], point[2]).log10() - measured).powi(2)
                })
                .sum();
            sum / data.len() as f64
        },
    )?;
    Ok(problem)
}
