use criterion::{criterion_group, criterion_main, Criterion};
use refit::mapper::{Map, Mapper};
use refit::problem::{Parameter, Problem};

fn criterion_benchmark(c: &mut Criterion) {
    let problem = Problem::from_fn(
        (0..4)
            .map(|index| Parameter::new(format!("p{index}"), 0.0, -1.0..=1.0))
            .collect(),
        |point| {
            // a deliberately slow objective, so that worker overhead is amortised
            (0..2_000)
                .map(|k| point.iter().map(|x| (x * k as f64).sin()).sum::<f64>())
                .sum()
        },
    )
    .unwrap();
    let points: Vec<Vec<f64>> = (0..64)
        .map(|index| vec![index as f64 / 64.0; problem.dim()])
        .collect();
    {
        let mut map = Mapper::Serial.start(&problem).unwrap();
        assert_eq!(points.len(), map.map(&points).unwrap().len());
        c.bench_function("cri_mapper_serial_64", |b| {
            b.iter(|| map.map(&points).unwrap());
        });
    }
    {
        let mut map = Mapper::Parallel { workers: Some(4) }.start(&problem).unwrap();
        assert_eq!(points.len(), map.map(&points).unwrap().len());
        c.bench_function("cri_mapper_parallel4_64", |b| {
            b.iter(|| map.map(&points).unwrap());
        });
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
