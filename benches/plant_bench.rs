use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use thermal_rts::plant::{
    EnergyBalanceParameters, FopdtParameters, celsius_to_kelvin,
    energy_balance::EnergyBalanceModel, fopdt::FopdtModel, integrator::Rk4,
};

fn energy_balance_bench(c: &mut Criterion) {
    let model = EnergyBalanceModel::new(EnergyBalanceParameters::default(), Rk4::default());
    let t0 = celsius_to_kelvin(30.0);

    c.bench_function("energy_balance_advance_1s", |b| {
        b.iter(|| model.advance(black_box(t0), black_box(1.0), black_box(60.0)).unwrap())
    });
}

fn fopdt_bench(c: &mut Criterion) {
    let model = FopdtModel::new(FopdtParameters::default());
    let predictions: Vec<f64> = (0..600).map(|i| 23.0 + i as f64 * 0.01).collect();
    let commands: Vec<f64> = (0..600).map(|i| (i % 100) as f64).collect();

    c.bench_function("fopdt_advance", |b| {
        b.iter(|| {
            model
                .advance(black_box(&predictions), black_box(&commands), black_box(599), 1.0)
                .unwrap()
        })
    });
}

criterion_group!(benches, energy_balance_bench, fopdt_bench);
criterion_main!(benches);
