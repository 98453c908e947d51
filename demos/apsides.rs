//! Apsis detection in a two-body orbit.
//!
//! One detector on r·v reports every periapsis and apoapsis passage over
//! three orbits, a second one stops the run at the first node crossing
//! after two orbits.
//!
//! Run with:
//!   cargo run --example apsides

use astro_events::{
    catalog, handler_fn, Action, DetectorConfig, EventDetector, EventEngine, OdeSystem,
    OrbitState, Rkf78, Snapshot, Tolerances,
};

/// Keplerian two-body problem.
struct TwoBody {
    mu: f64,
}

impl OdeSystem<6> for TwoBody {
    fn rhs(&self, _t: f64, y: &[f64; 6], dydt: &mut [f64; 6]) {
        let r2 = y[0] * y[0] + y[1] * y[1] + y[2] * y[2];
        let r = r2.sqrt();
        let mu_r3 = self.mu / (r2 * r);

        dydt[0] = y[3];
        dydt[1] = y[4];
        dydt[2] = y[5];
        dydt[3] = -mu_r3 * y[0];
        dydt[4] = -mu_r3 * y[1];
        dydt[5] = -mu_r3 * y[2];
    }
}

fn radius(s: &OrbitState<6>) -> f64 {
    (s.y[0] * s.y[0] + s.y[1] * s.y[1] + s.y[2] * s.y[2]).sqrt()
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let mu = 398600.4418;
    let sys = TwoBody { mu };

    // 400 km x 2000 km altitude, inclined 30 degrees
    let earth_radius = 6378.137;
    let r_peri = earth_radius + 400.0;
    let r_apo = earth_radius + 2000.0;
    let a = (r_peri + r_apo) / 2.0;
    let v_peri = (mu * (2.0 / r_peri - 1.0 / a)).sqrt();
    let inc = 30f64.to_radians();
    let period = 2.0 * std::f64::consts::PI * (a.powi(3) / mu).sqrt();

    // periapsis on the equator: both indicators start on a root
    let initial = OrbitState::new(
        0.0,
        [r_peri, 0.0, 0.0, 0.0, v_peri * inc.cos(), v_peri * inc.sin()],
    );

    println!("Apsis detection");
    println!("  Orbit:  {:.0} x {:.0} km altitude, i = 30 deg", 400.0, 2000.0);
    println!("  Period: {:.1} s ({:.1} min)", period, period / 60.0);
    println!();

    let config = DetectorConfig::new(300.0, 1e-6).unwrap();
    let apsides = EventDetector::new("apsis", config, catalog::apside()).with_handler(handler_fn(
        |s: &Snapshot<OrbitState<6>>, increasing: bool, _forward: bool| {
            if let Some(s) = s.as_single() {
                let kind = if increasing { "periapsis" } else { "apoapsis" };
                println!("  {kind:<10} t = {:>10.3} s   r = {:.6} km", s.t, radius(s));
            }
            Action::Continue
        },
    ));
    let after_two_orbits = 2.0 * period;
    let node = EventDetector::new("ascending node", config, catalog::node())
        .with_filter(move |s, increasing, _| !increasing || s.time() < after_two_orbits);

    let mut engine = EventEngine::new();
    engine.register_detector(apsides).unwrap();
    engine.register_detector(node).unwrap();

    let mut solver = Rkf78::new(Tolerances::new(1e-12, 1e-12));
    solver.set_step_limits(1e-6, 60.0);
    let result = solver
        .propagate(&sys, &mut engine, initial, 3.0 * period, 10.0)
        .unwrap();

    println!();
    let s = result.state();
    if result.is_halted() {
        println!("  stopped at the ascending node, t = {:.3} s, z = {:.2e} km", s.t, s.y[2]);
    } else {
        println!("  completed at t = {:.3} s", s.t);
    }
    println!("  resolved events: {}", engine.resolved_events().len());
    println!("  accepted steps:  {}", solver.stats.accepted_steps);
    println!("  function evals:  {}", solver.stats.fn_evals);
}
