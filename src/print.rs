//! Console tables summarising a completed fit.

use stanza::style::{HAlign, Header, MinWidth, Separator, Styles};
use stanza::table::{Col, Row, Table};

use crate::algorithm::Best;
use crate::driver::FitStats;
use crate::history::UncertaintyState;
use crate::problem::Problem;

/// One row per parameter: its bounds, the starting value and the fitted value. When an
/// uncertainty state is supplied, the posterior mean and standard deviation are shown as well.
pub fn tabulate_parameters(
    problem: &Problem,
    best: &Best,
    uncertainty: Option<&UncertaintyState>,
) -> Table {
    let mut table = Table::default()
        .with_cols({
            let mut cols = vec![
                Col::new(Styles::default().with(MinWidth(16)).with(HAlign::Left)),
                Col::new(Styles::default().with(MinWidth(10)).with(HAlign::Right)),
                Col::new(
                    Styles::default()
                        .with(Separator(true))
                        .with(MinWidth(10))
                        .with(HAlign::Right),
                ),
                Col::new(Styles::default().with(MinWidth(12)).with(HAlign::Right)),
                Col::new(Styles::default().with(MinWidth(12)).with(HAlign::Right)),
            ];
            if uncertainty.is_some() {
                cols.push(Col::new(
                    Styles::default()
                        .with(Separator(true))
                        .with(MinWidth(12))
                        .with(HAlign::Right),
                ));
                cols.push(Col::new(Styles::default().with(MinWidth(12)).with(HAlign::Right)));
            }
            cols
        })
        .with_row({
            let mut header_cells = vec![
                "Parameter".into(),
                "Low".into(),
                "High".into(),
                "Initial".into(),
                "Fitted".into(),
            ];
            if uncertainty.is_some() {
                header_cells.push("Mean".into());
                header_cells.push("Std dev".into());
            }
            Row::new(
                Styles::default().with(Header(true)).with(Separator(true)),
                header_cells,
            )
        });

    let (mean, stdev) = match uncertainty {
        Some(state) if !state.draws.is_empty() => (Some(state.mean()), Some(state.stdev())),
        _ => (None, None),
    };
    for (index, parameter) in problem.parameters().iter().enumerate() {
        let mut row_cells = vec![
            parameter.name.clone().into(),
            format!("{}", parameter.bounds.start()).into(),
            format!("{}", parameter.bounds.end()).into(),
            format!("{:.6}", parameter.value).into(),
            format!("{:.6}", best.point[index]).into(),
        ];
        if uncertainty.is_some() {
            match (&mean, &stdev) {
                (Some(mean), Some(stdev)) => {
                    row_cells.push(format!("{:.6}", mean[index]).into());
                    row_cells.push(format!("{:.6}", stdev[index]).into());
                }
                _ => {
                    row_cells.push("-".into());
                    row_cells.push("-".into());
                }
            }
        }
        table.push_row(Row::new(Styles::default(), row_cells));
    }
    table
}

/// A two-column summary of how the run ended.
pub fn tabulate_stats(best: Option<&Best>, stats: &FitStats) -> Table {
    let mut table = Table::default()
        .with_cols(vec![
            Col::new(Styles::default().with(MinWidth(12)).with(HAlign::Left)),
            Col::new(Styles::default().with(MinWidth(14)).with(HAlign::Right)),
        ])
        .with_row(Row::new(
            Styles::default().with(Header(true)).with(Separator(true)),
            vec!["Outcome".into(), "".into()],
        ));
    let value = best.map_or_else(|| "-".to_string(), |best| format!("{:.6e}", best.value));
    for (label, cell) in [
        ("status", stats.status.to_string()),
        ("best value", value),
        ("steps", stats.steps.to_string()),
        ("batches", stats.batches.to_string()),
        ("evaluations", stats.evaluations.to_string()),
        ("elapsed", format!("{:.3}s", stats.elapsed.as_secs_f64())),
    ] {
        table.push_row(Row::new(Styles::default(), vec![label.into(), cell.into()]));
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::Draws;
    use crate::problem::Parameter;

    #[test]
    fn tabulate_parameters_without_uncertainty() {
        let problem = Problem::from_fn(
            vec![
                Parameter::new("thickness", 10.0, 0.0..=100.0),
                Parameter::new("roughness", 1.0, 0.0..=5.0),
            ],
            |point| point.iter().sum(),
        )
        .unwrap();
        let table = tabulate_parameters(&problem, &Best::new(vec![12.5, 2.0], 0.0), None);
        assert_eq!(3, table.num_rows());
        assert_eq!(5, table.num_cols());
    }

    #[test]
    fn tabulate_parameters_with_uncertainty() {
        let problem =
            Problem::from_fn(vec![Parameter::new("x", 0.0, -1.0..=1.0)], |point| point[0]).unwrap();
        let state = UncertaintyState {
            generation: 3,
            labels: vec!["x".into()],
            draws: Draws::from_samples(vec![vec![0.1], vec![0.3]], vec![-0.1, -0.3]),
            acceptance_rate: 0.5,
        };
        let table = tabulate_parameters(&problem, &Best::new(vec![0.1], 0.1), Some(&state));
        assert_eq!(2, table.num_rows());
        assert_eq!(7, table.num_cols());
    }

    #[test]
    fn tabulate_stats_rows() {
        let table = tabulate_stats(None, &FitStats::default());
        assert_eq!(7, table.num_rows());
    }
}
