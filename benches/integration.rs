use criterion::{black_box, criterion_group, criterion_main, Criterion};
use astro_events::{
    catalog, ContinueOnEvent, DetectorConfig, EventDetector, EventEngine, EventShifter,
    OdeSystem, OrbitState, Rkf78, Tolerances,
};

/// Two-body problem (6-state)
struct TwoBody {
    mu: f64,
}

impl OdeSystem<6> for TwoBody {
    fn rhs(&self, _t: f64, y: &[f64; 6], dydt: &mut [f64; 6]) {
        let r = (y[0] * y[0] + y[1] * y[1] + y[2] * y[2]).sqrt();
        let r3 = r * r * r;
        let mu_r3 = self.mu / r3;

        dydt[0] = y[3];
        dydt[1] = y[4];
        dydt[2] = y[5];
        dydt[3] = -mu_r3 * y[0];
        dydt[4] = -mu_r3 * y[1];
        dydt[5] = -mu_r3 * y[2];
    }
}

const MU: f64 = 398600.4418;

/// Slightly eccentric, inclined LEO starting off every apsis and node.
fn leo() -> (OrbitState<6>, f64) {
    let r0: f64 = 6878.0;
    let v0 = 1.01 * (MU / r0).sqrt();
    let inc = 0.9f64;
    let y0 = [r0, 0.0, 100.0, 5e-3, v0 * inc.cos(), v0 * inc.sin()];
    let a = 1.0 / (2.0 / r0 - v0 * v0 / MU);
    let period = 2.0 * std::f64::consts::PI * (a.powi(3) / MU).sqrt();
    (OrbitState::new(0.0, y0), period)
}

fn solver() -> Rkf78<6> {
    let mut solver = Rkf78::new(Tolerances::new(1e-12, 1e-12));
    solver.set_step_limits(1e-6, 60.0);
    solver
}

fn bench_propagate_without_detectors(c: &mut Criterion) {
    let (initial, period) = leo();
    let sys = TwoBody { mu: MU };

    c.bench_function("propagate_1period_no_detectors", |b| {
        b.iter(|| {
            let mut engine = EventEngine::new();
            solver()
                .propagate(&sys, &mut engine, black_box(initial.clone()), period, 60.0)
                .unwrap()
        })
    });
}

fn bench_propagate_with_detectors(c: &mut Criterion) {
    let (initial, period) = leo();
    let sys = TwoBody { mu: MU };
    let config = DetectorConfig::new(120.0, 1e-6).unwrap();
    let apsis = EventDetector::new("apsis", config, catalog::apside()).with_handler(ContinueOnEvent);
    let node = EventDetector::new("node", config, catalog::node()).with_handler(ContinueOnEvent);
    let altitude = EventDetector::new("altitude", config, catalog::altitude(6378.137, 520.0))
        .with_handler(ContinueOnEvent);

    c.bench_function("propagate_1period_three_detectors", |b| {
        b.iter(|| {
            let mut engine = EventEngine::new();
            for det in [&apsis, &node, &altitude] {
                engine.register_detector(det.clone()).unwrap();
            }
            solver()
                .propagate(&sys, &mut engine, black_box(initial.clone()), period, 60.0)
                .unwrap()
        })
    });
}

fn bench_propagate_with_shifted_detector(c: &mut Criterion) {
    let (initial, period) = leo();
    let sys = TwoBody { mu: MU };
    let config = DetectorConfig::new(120.0, 1e-6).unwrap();
    let node = EventDetector::new("node", config, catalog::node()).with_handler(ContinueOnEvent);
    let shifted = EventShifter::new(node, -5.0, 5.0)
        .with_max_check(10.0)
        .with_translation(solver().flow(TwoBody { mu: MU }))
        .build()
        .unwrap();

    c.bench_function("propagate_1period_shifted_node", |b| {
        b.iter(|| {
            let mut engine = EventEngine::new();
            engine.register_detector(shifted.clone()).unwrap();
            solver()
                .propagate(&sys, &mut engine, black_box(initial.clone()), period, 60.0)
                .unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_propagate_without_detectors,
    bench_propagate_with_detectors,
    bench_propagate_with_shifted_detector
);
criterion_main!(benches);
