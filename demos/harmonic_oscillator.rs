//! Zero crossings of a harmonic oscillator.
//!
//! Integrates y'' + ω²y = 0 over two periods, reports every zero crossing
//! of y against the exact times and stops at the first peak of the velocity
//! after t = 2.
//!
//! Run with:
//!   cargo run --example harmonic_oscillator

use astro_events::{
    ContinueOnEvent, DetectorConfig, EventDetector, EventEngine, OdeSystem, OrbitState, Rkf78,
    SlopeSelection, Tolerances,
};

/// Simple harmonic oscillator: y'' + ω²y = 0
///
/// State vector: [y, y']
struct HarmonicOscillator {
    omega: f64,
}

impl OdeSystem<2> for HarmonicOscillator {
    fn rhs(&self, _t: f64, y: &[f64; 2], dydt: &mut [f64; 2]) {
        dydt[0] = y[1];
        dydt[1] = -self.omega * self.omega * y[0];
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let omega = 2.0;
    let sys = HarmonicOscillator { omega };
    let period = 2.0 * std::f64::consts::PI / omega;

    let config = DetectorConfig::new(0.05, 1e-12).unwrap();
    let zero = EventDetector::from_fn("y = 0", config, |s: &OrbitState<2>| s.y[0])
        .with_handler(ContinueOnEvent);
    // y'' = 0 with y' falling: maximum of the velocity
    let peak = EventDetector::from_fn("peak y'", config, |s: &OrbitState<2>| {
        if s.t < 2.0 {
            1.0
        } else {
            s.ydot[1]
        }
    })
    .with_slope(SlopeSelection::Decreasing);

    let mut engine = EventEngine::new();
    engine.register_detector(zero).unwrap();
    engine.register_detector(peak).unwrap();

    let mut solver = Rkf78::new(Tolerances::new(1e-12, 1e-12));
    solver.set_step_limits(1e-12, 0.01);
    let result = solver
        .propagate(&sys, &mut engine, OrbitState::new(0.0, [1.0, 0.0]), 2.0 * period, 0.01)
        .unwrap();

    println!("Harmonic Oscillator (ω = {omega})");
    println!("  Period: {period:.6} s");
    println!();
    for (k, e) in engine
        .resolved_events()
        .iter()
        .filter(|e| e.name == "y = 0")
        .enumerate()
    {
        // y = cos(ωt) vanishes at (k + 1/2)π/ω
        let exact = (k as f64 + 0.5) * std::f64::consts::PI / omega;
        println!("  t = {:.12}   (exact: {:.12}, error {:.2e})", e.t, exact, (e.t - exact).abs());
    }

    let s = result.state();
    println!();
    println!("  Stopped: {}   t = {:.6} s   y' = {:.6}", result.is_halted(), s.t, s.y[1]);
    println!("  Accepted steps: {}", solver.stats.accepted_steps);
    println!("  Rejected steps: {}", solver.stats.rejected_steps);
    println!("  Function evals: {}", solver.stats.fn_evals);
}
