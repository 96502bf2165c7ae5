use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use assert_float_eq::*;

use super::*;
use crate::driver::FitStatus;
use crate::problem::Parameter;
use crate::testing::{parabola, poisoned, Stepper, Tally, TallyMonitor};

fn collect(handle: &mut FitHandle) -> Vec<FitEvent> {
    let mut events = vec![];
    while let Some(event) = handle.blocking_next() {
        events.push(event);
    }
    events
}

fn only_complete(events: &[FitEvent]) -> &FitEvent {
    let completes: Vec<_> = events.iter().filter(|event| event.is_complete()).collect();
    assert_eq!(1, completes.len(), "{events:?}");
    let last = events.last().unwrap();
    assert!(last.is_complete(), "{events:?}");
    last
}

fn quiet() -> MonitorIntervals {
    MonitorIntervals {
        progress: 60.0,
        improvement: 60.0,
        convergence: 60.0,
        uncertainty: 60.0,
    }
}

#[test]
fn amoeba_scenario() {
    let mut problem = parabola();
    let config = SessionConfig {
        fitter: FitterKind::Amoeba,
        options: FitOptions::default().with_steps(50),
        ..SessionConfig::default()
    };
    let mut handle = FitSession::new(config).start(&problem).unwrap();
    assert_eq!(problem.id(), handle.problem());
    let events = collect(&mut handle);
    handle.join().unwrap();
    assert!(handle.is_finished());

    assert!(events.iter().all(|event| event.problem() == problem.id()));
    let FitEvent::Complete { best, stats, .. } = only_complete(&events) else {
        unreachable!()
    };
    let best = best.clone().unwrap();
    assert!(best.value < 1e-6, "{best:?}");
    assert_float_absolute_eq!(3.0, best.point[0], 1e-3);
    assert_eq!(FitStatus::Converged, stats.status);

    // the first progress and improvement are immediate, and each monitor reports once more
    // when finalized
    let count = |message: &str| events.iter().filter(|event| event.message() == message).count();
    assert_eq!(2, count("progress"));
    assert_eq!(2, count("improvement"));
    assert_eq!(1, count("convergence_update"));
    assert_eq!(0, count("uncertainty_update"));

    // the run never touched the original
    assert_eq!(vec![0.0], problem.getp());
    problem.remember_best(&best).unwrap();
    assert_eq!(best.point, problem.getp());
}

#[test]
fn worker_failure_on_third_batch() {
    let problem = poisoned(3.0);
    let tally = Arc::new(Tally::default());
    let config = SessionConfig {
        mapper: Mapper::Parallel { workers: Some(2) },
        ..SessionConfig::default()
    };
    let mut handle = FitSession::new(config)
        .with_algorithm(Box::new(Stepper::new(10)))
        .with_monitor(Box::new(TallyMonitor(tally.clone())))
        .start(&problem)
        .unwrap();
    let events = collect(&mut handle);

    let FitEvent::Complete { best, stats, .. } = only_complete(&events) else {
        unreachable!()
    };
    assert_eq!(&None, best);
    assert_eq!(FitStatus::Aborted, stats.status);
    assert_eq!(3, stats.batches);
    assert_eq!(1, tally.finalized.load(Ordering::SeqCst));
    assert_eq!(2, tally.histories.load(Ordering::SeqCst));
}

#[test]
fn configuration_errors_before_start() {
    let problem = parabola();
    assert_eq!(
        Err(ConfigError::UnknownFitter("levenberg".into())),
        FitterKind::parse("levenberg")
    );

    let config = SessionConfig {
        options: FitOptions {
            steps: 0,
            ..FitOptions::default()
        },
        ..SessionConfig::default()
    };
    assert!(matches!(
        FitSession::new(config).start(&problem),
        Err(ConfigError::InvalidOption(_))
    ));

    let config = SessionConfig {
        intervals: MonitorIntervals {
            progress: f64::NAN,
            ..MonitorIntervals::default()
        },
        ..SessionConfig::default()
    };
    assert!(matches!(
        FitSession::new(config).start(&problem),
        Err(ConfigError::InvalidOption(_))
    ));

    let config = SessionConfig {
        intervals: MonitorIntervals {
            progress: 1e300,
            ..MonitorIntervals::default()
        },
        ..SessionConfig::default()
    };
    assert!(matches!(
        FitSession::new(config).start(&problem),
        Err(ConfigError::InvalidOption(_))
    ));

    let config = SessionConfig {
        options: FitOptions {
            samples: 1 << 40,
            ..FitOptions::fast()
        },
        fitter: FitterKind::Dream,
        ..SessionConfig::default()
    };
    assert!(matches!(
        FitSession::new(config).start(&problem),
        Err(ConfigError::InvalidOption(_))
    ));

    let config = SessionConfig {
        mapper: Mapper::Parallel { workers: Some(0) },
        ..SessionConfig::default()
    };
    assert!(matches!(
        FitSession::new(config).start(&problem),
        Err(ConfigError::InvalidOption(_))
    ));
}

#[test]
fn cancel_completes_with_best_so_far() {
    let problem = Problem::from_fn(vec![Parameter::new("x", 0.0, 0.0..=1.0)], |point| {
        std::thread::sleep(Duration::from_millis(1));
        1.0 / point[0]
    })
    .unwrap();
    let config = SessionConfig {
        intervals: MonitorIntervals {
            progress: 0.0,
            ..quiet()
        },
        ..SessionConfig::default()
    };
    let mut handle = FitSession::new(config)
        .with_algorithm(Box::new(Stepper::new(u64::MAX)))
        .start(&problem)
        .unwrap();

    let first = handle.blocking_next().unwrap();
    assert_eq!("progress", first.message());
    handle.cancel();
    let events = collect(&mut handle);
    handle.join().unwrap();

    let FitEvent::Complete { best, stats, .. } = only_complete(&events) else {
        unreachable!()
    };
    assert_eq!(FitStatus::Cancelled, stats.status);
    let best = best.clone().unwrap();
    assert!(best.value <= 1.0);
    assert_eq!(stats.steps as f64, best.point[0]);
}

#[test]
fn caller_monitor_emits_through_channel() {
    struct Echo(Emitter);

    impl Monitor for Echo {
        fn on_history(&mut self, history: &crate::history::History) {
            if let Some(record) = history.latest() {
                self.0.progress(record);
            }
        }

        fn finalize(&mut self) {}
    }

    let problem = parabola();
    let config = SessionConfig {
        intervals: quiet(),
        ..SessionConfig::default()
    };
    let mut handle = FitSession::new(config)
        .with_algorithm(Box::new(Stepper::new(5)))
        .with_monitor_fn(|emitter| -> Box<dyn Monitor> { Box::new(Echo(emitter)) })
        .start(&problem)
        .unwrap();
    let events = collect(&mut handle);
    only_complete(&events);

    // one immediate and one final progress from the standard monitor, five echoes
    let steps: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            FitEvent::Progress { step, .. } => Some(*step),
            _ => None,
        })
        .collect();
    assert_eq!(vec![0, 0, 1, 2, 3, 4, 4], steps);
}

#[test]
fn dream_emits_uncertainty() {
    let problem = parabola();
    let config = SessionConfig {
        fitter: FitterKind::Dream,
        options: FitOptions::fast().with_steps(60),
        intervals: quiet(),
        ..SessionConfig::default()
    };
    let mut handle = FitSession::new(config).start(&problem).unwrap();
    let events = collect(&mut handle);
    let FitEvent::Complete { stats, .. } = only_complete(&events) else {
        unreachable!()
    };
    assert_eq!(FitStatus::StepLimit, stats.status);

    let states: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            FitEvent::UncertaintyUpdate { state, .. } => Some(state.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(1, states.len());
    assert_eq!(59, states[0].generation);
    assert!(!states[0].draws.is_empty());
}

#[tokio::test]
async fn async_events() {
    let problem = parabola();
    let config = SessionConfig {
        fitter: FitterKind::Newton,
        ..SessionConfig::default()
    };
    let mut handle = FitSession::new(config).start(&problem).unwrap();
    let mut complete = None;
    while let Some(event) = handle.next().await {
        if event.is_complete() {
            complete = Some(event);
        }
    }
    let Some(FitEvent::Complete { best, .. }) = complete else {
        panic!("no complete event");
    };
    assert_float_absolute_eq!(3.0, best.unwrap().point[0], 1e-3);
    assert!(handle.try_next().is_none());
}

#[test]
fn complete_event_json() {
    let problem = parabola();
    let mut handle = FitSession::new(SessionConfig::default())
        .with_algorithm(Box::new(Stepper::new(2)))
        .start(&problem)
        .unwrap();
    let events = collect(&mut handle);
    let json = serde_json::to_value(only_complete(&events)).unwrap();
    assert_eq!("complete", json["message"]);
    assert_eq!(problem.id().value(), json["problem"].as_u64().unwrap());
    assert_eq!("step_limit", json["stats"]["status"]);
    assert_eq!(1.0, json["best"]["value"].as_f64().unwrap());
    assert_eq!(2.0, json["best"]["point"][0].as_f64().unwrap());
}

#[test]
fn session_config_json() {
    let config: SessionConfig = serde_json::from_str(
        r#"{
            "fitter": "snobfit",
            "mapper": {"kind": "parallel"},
            "intervals": {"progress": 1.0}
        }"#,
    )
    .unwrap();
    assert_eq!(FitterKind::Snobfit, config.fitter);
    assert_eq!(Mapper::Parallel { workers: None }, config.mapper);
    assert_eq!(1.0, config.intervals.progress);
    assert_eq!(15.0, config.intervals.uncertainty);
    config.validate().unwrap();
}
