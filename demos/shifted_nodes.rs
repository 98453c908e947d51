//! Anticipated node crossings with an event shifter.
//!
//! A plain node detector and a shifted copy of it run side by side: the
//! copy reports ascending nodes 5 s early and descending nodes 5 s late.
//! The copy moves states along the two-body flow, so the offsets hold to the
//! integration tolerance.
//!
//! Run with:
//!   cargo run --example shifted_nodes

use astro_events::{
    catalog, ContinueOnEvent, DetectorConfig, EventDetector, EventEngine, EventShifter,
    OdeSystem, OrbitState, Rkf78, Tolerances,
};

/// Keplerian two-body problem.
struct TwoBody {
    mu: f64,
}

impl OdeSystem<6> for TwoBody {
    fn rhs(&self, _t: f64, y: &[f64; 6], dydt: &mut [f64; 6]) {
        let r2 = y[0] * y[0] + y[1] * y[1] + y[2] * y[2];
        let mu_r3 = self.mu / (r2 * r2.sqrt());

        dydt[0] = y[3];
        dydt[1] = y[4];
        dydt[2] = y[5];
        dydt[3] = -mu_r3 * y[0];
        dydt[4] = -mu_r3 * y[1];
        dydt[5] = -mu_r3 * y[2];
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let mu = 398600.4418;
    let sys = TwoBody { mu };

    // circular LEO, 51.6 deg, starting 90 deg past the ascending node
    let r = 6778.0;
    let v = (mu / r).sqrt();
    let inc = 51.6f64.to_radians();
    let initial = OrbitState::new(0.0, [0.0, r * inc.cos(), r * inc.sin(), -v, 0.0, 0.0]);
    let period = 2.0 * std::f64::consts::PI * (r.powi(3) / mu).sqrt();

    let config = DetectorConfig::new(120.0, 1e-6).unwrap();
    let node = EventDetector::new("node", config, catalog::node()).with_handler(ContinueOnEvent);
    let mut solver = Rkf78::new(Tolerances::new(1e-12, 1e-12));
    solver.set_step_limits(1e-6, 30.0);
    let shifted = EventShifter::new(node.clone(), -5.0, 5.0)
        .with_max_check(10.0)
        .with_translation(solver.flow(TwoBody { mu }))
        .build()
        .unwrap();

    let mut engine = EventEngine::new();
    engine.register_detector(node).unwrap();
    engine.register_detector(shifted).unwrap();

    solver
        .propagate(&sys, &mut engine, initial, 2.0 * period, 10.0)
        .unwrap();

    println!("Node crossings over two orbits ({:.1} s period)", period);
    println!();
    for e in engine.resolved_events() {
        let kind = if e.increasing { "ascending" } else { "descending" };
        println!("  {:<13} {kind:<10} t = {:>9.3} s", e.name, e.t);
    }
}
