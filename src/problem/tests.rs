use super::*;

fn two_layer() -> Problem {
    Problem::from_fn(
        vec![
            Parameter::new("thickness", 50.0, 10.0..=200.0),
            Parameter::new("roughness", 2.0, 0.0..=10.0),
        ],
        |point| point[0] / 100.0 + point[1],
    )
    .unwrap()
}

#[test]
fn construction_rejects_bad_schemas() {
    let cost = |point: &[f64]| point[0];
    assert_eq!(
        ProblemError::NoParameters,
        Problem::from_fn(vec![], cost).unwrap_err()
    );
    assert_eq!(
        ProblemError::EmptyName,
        Problem::from_fn(vec![Parameter::new(" ", 0.0, 0.0..=1.0)], cost).unwrap_err()
    );
    assert_eq!(
        ProblemError::InvalidBounds {
            name: "x".into(),
            lo: 1.0,
            hi: 0.0
        },
        Problem::from_fn(vec![Parameter::new("x", 0.5, 1.0..=0.0)], cost).unwrap_err()
    );
    assert!(matches!(
        Problem::from_fn(vec![Parameter::new("x", 0.0, f64::NEG_INFINITY..=0.0)], cost),
        Err(ProblemError::InvalidBounds { .. })
    ));
    assert!(matches!(
        Problem::from_fn(vec![Parameter::new("x", 2.0, 0.0..=1.0)], cost),
        Err(ProblemError::OutOfBounds { .. })
    ));
    assert_eq!(
        ProblemError::DuplicateName("x".into()),
        Problem::from_fn(
            vec![
                Parameter::new("x", 0.0, 0.0..=1.0),
                Parameter::new("x", 0.0, 0.0..=1.0)
            ],
            cost
        )
        .unwrap_err()
    );
}

#[test]
fn accessors() {
    let problem = two_layer();
    assert_eq!(2, problem.dim());
    assert_eq!(vec!["thickness", "roughness"], problem.labels());
    assert_eq!(vec![10.0..=200.0, 0.0..=10.0], problem.bounds());
    assert_eq!(vec![50.0, 2.0], problem.getp());
    assert_eq!(Ok(2.5), problem.cost(&problem.getp()));
}

#[test]
fn distinct_problems_have_distinct_ids() {
    assert_ne!(two_layer().id(), two_layer().id());
}

#[test]
fn setp_is_all_or_nothing() {
    let mut problem = two_layer();
    assert_eq!(
        Err(ProblemError::DimensionMismatch {
            expected: 2,
            actual: 1
        }),
        problem.setp(&[20.0])
    );
    assert!(matches!(
        problem.setp(&[20.0, 11.0]),
        Err(ProblemError::OutOfBounds { .. })
    ));
    assert_eq!(vec![50.0, 2.0], problem.getp());

    problem.setp(&[20.0, 3.0]).unwrap();
    assert_eq!(vec![20.0, 3.0], problem.getp());
}

#[test]
fn set_value_by_name() {
    let mut problem = two_layer();
    problem.set_value("roughness", 4.0).unwrap();
    assert_eq!(vec![50.0, 4.0], problem.getp());
    assert_eq!(
        Err(ProblemError::UnknownParameter("sld".into())),
        problem.set_value("sld", 1.0)
    );
}

#[test]
fn clip_into_bounds() {
    let problem = two_layer();
    let mut point = vec![5.0, 12.0];
    problem.clip(&mut point);
    assert_eq!(vec![10.0, 10.0], point);
}

#[test]
fn snapshot_is_independent() {
    let mut original = two_layer();
    let mut snapshot = original.snapshot();
    assert_eq!(original.id(), snapshot.id());

    snapshot.setp(&[100.0, 5.0]).unwrap();
    assert_eq!(vec![50.0, 2.0], original.getp());

    original.set_value("thickness", 75.0).unwrap();
    assert_eq!(vec![100.0, 5.0], snapshot.getp());
    assert_eq!(original.cost(&[1.0, 1.0]), snapshot.cost(&[1.0, 1.0]));
}

#[test]
fn remember_best_applies_point() {
    let mut problem = two_layer();
    problem
        .remember_best(&Best::new(vec![120.0, 0.5], 1.7))
        .unwrap();
    assert_eq!(vec![120.0, 0.5], problem.getp());
}

#[test]
fn summarize_one_line_per_parameter() {
    let problem = two_layer();
    let lines = problem.summarize(&[105.0, 10.0]);
    assert_eq!(2, lines.len());
    assert!(lines[0].contains("thickness"), "{}", lines[0]);
    assert!(lines[0].contains("50.0%"), "{}", lines[0]);
    assert!(lines[1].contains("100.0%"), "{}", lines[1]);
}

#[test]
fn failing_objective() {
    let problem = Problem::try_from_fn(vec![Parameter::new("x", 0.0, -1.0..=1.0)], |point| {
        if point[0] < 0.0 {
            Err("negative".into())
        } else {
            Ok(point[0])
        }
    })
    .unwrap();
    assert_eq!(Ok(0.5), problem.cost(&[0.5]));
    assert_eq!(Err(CostError::from("negative")), problem.cost(&[-0.5]));
}
