//! Event handling driven by the RKF7(8) propagator.

mod common;

use std::cell::Cell;
use std::f64::consts::{FRAC_PI_2, PI};
use std::rc::Rc;

use approx::assert_abs_diff_eq;
use astro_events::{
    catalog, handler_fn, Action, ContinueOnEvent, DetectorConfig, EventDetector, EventEngine,
    EventShifter, IntegrationError, OdeSystem, OrbitState, ResetOnEvent, Rkf78, SlopeSelection, Snapshot,
    Tolerances,
};
use common::Spy;

/// Earth gravitational parameter [km³/s²]
const MU: f64 = 398600.4418;

struct TwoBody {
    mu: f64,
}

impl OdeSystem<6> for TwoBody {
    fn rhs(&self, _t: f64, y: &[f64; 6], dydt: &mut [f64; 6]) {
        let r = (y[0] * y[0] + y[1] * y[1] + y[2] * y[2]).sqrt();
        let mu_r3 = self.mu / (r * r * r);
        dydt[0] = y[3];
        dydt[1] = y[4];
        dydt[2] = y[5];
        dydt[3] = -mu_r3 * y[0];
        dydt[4] = -mu_r3 * y[1];
        dydt[5] = -mu_r3 * y[2];
    }
}

struct HarmonicOscillator {
    omega: f64,
}

impl OdeSystem<2> for HarmonicOscillator {
    fn rhs(&self, _t: f64, y: &[f64; 2], dydt: &mut [f64; 2]) {
        dydt[0] = y[1];
        dydt[1] = -self.omega * self.omega * y[0];
    }
}

/// x'' = a, with `a` switched from outside.
struct Throttled {
    accel: Rc<Cell<f64>>,
}

impl OdeSystem<2> for Throttled {
    fn rhs(&self, _t: f64, y: &[f64; 2], dydt: &mut [f64; 2]) {
        dydt[0] = y[1];
        dydt[1] = self.accel.get();
    }
}

fn solver<const N: usize>(h_max: f64) -> Rkf78<N> {
    let mut solver = Rkf78::new(Tolerances::new(1e-12, 1e-12));
    solver.set_step_limits(1e-14, h_max);
    solver
}

#[test]
fn periapsis_of_a_transfer_orbit() {
    // start at apoapsis of a GTO-like ellipse
    let (ra, rp) = (42164.0, 6678.0);
    let a = (ra + rp) / 2.0;
    let v_apo = (MU * (2.0 / ra - 1.0 / a)).sqrt();
    let period = 2.0 * PI * (a.powi(3) / MU).sqrt();

    // r·v vanishes at the start; the detector must look past it
    let config = DetectorConfig::new(600.0, 1e-6).unwrap();
    let periapsis = EventDetector::new("periapsis", config, catalog::apside())
        .with_slope(SlopeSelection::Increasing);
    let mut engine = EventEngine::new();
    engine.register_detector(periapsis).unwrap();

    let initial = OrbitState::new(0.0, [ra, 0.0, 0.0, 0.0, -v_apo, 0.0]);
    let result = solver(30.0)
        .propagate(&TwoBody { mu: MU }, &mut engine, initial, period, 60.0)
        .unwrap();

    assert!(result.is_halted());
    let s = result.state();
    let r = (s.y[0].powi(2) + s.y[1].powi(2) + s.y[2].powi(2)).sqrt();
    assert_abs_diff_eq!(s.t, period / 2.0, epsilon = 0.1);
    assert_abs_diff_eq!(r, rp, epsilon = 1e-2);
}

#[test]
fn oscillator_crossings_are_all_reported() {
    let config = DetectorConfig::new(0.1, 1e-10).unwrap();
    let det = EventDetector::from_fn("x", config, |s: &OrbitState<2>| s.y[0]).with_handler(ContinueOnEvent);

    let mut engine = EventEngine::new();
    engine.register_detector(det).unwrap();
    let result = solver(0.02)
        .propagate(
            &HarmonicOscillator { omega: 1.0 },
            &mut engine,
            OrbitState::new(0.0, [1.0, 0.0]),
            10.0,
            0.1,
        )
        .unwrap();

    assert!(!result.is_halted());
    let events = engine.resolved_events();
    assert_eq!(events.len(), 3);
    for (k, e) in events.iter().enumerate() {
        assert_abs_diff_eq!(e.t, FRAC_PI_2 + k as f64 * PI, epsilon = 1e-8);
        // cos falls through zero at π/2, rises at 3π/2
        assert_eq!(e.increasing, k % 2 == 1);
    }
}

#[test]
fn backward_propagation_finds_the_same_crossing() {
    let config = DetectorConfig::new(0.1, 1e-10).unwrap();
    let sys = HarmonicOscillator { omega: 1.0 };

    let mut forward = EventEngine::new();
    forward
        .register_detector(EventDetector::from_fn("x", config, |s: &OrbitState<2>| s.y[0]))
        .unwrap();
    let fwd = solver(0.02)
        .propagate(&sys, &mut forward, OrbitState::new(0.0, [1.0, 0.0]), 3.0, 0.1)
        .unwrap();

    let mut backward = EventEngine::new();
    backward
        .register_detector(EventDetector::from_fn("x", config, |s: &OrbitState<2>| s.y[0]))
        .unwrap();
    let start = OrbitState::new(PI, [-1.0, 0.0]);
    let bwd = solver(0.02)
        .propagate(&sys, &mut backward, start, 0.0, -0.1)
        .unwrap();

    assert!(fwd.is_halted() && bwd.is_halted());
    assert_abs_diff_eq!(fwd.state().t, bwd.state().t, epsilon = 1e-8);
    assert_eq!(
        forward.last_resolved().unwrap().increasing,
        backward.last_resolved().unwrap().increasing
    );
}

#[test]
fn shifted_detector_follows_the_propagated_flow() {
    let sys = HarmonicOscillator { omega: 1.0 };
    let config = DetectorConfig::new(0.1, 1e-10).unwrap();
    let x = EventDetector::from_fn("x", config, |s: &OrbitState<2>| s.y[0]).with_handler(ContinueOnEvent);

    // falls through zero at π/2 and 5π/2, rises at 3π/2
    let (inc, dec) = (-0.3, 0.4);
    let mut engine = EventEngine::new();
    let template = solver(0.02);
    engine
        .register_detector(
            EventShifter::new(x, inc, dec)
                .with_translation(template.flow(HarmonicOscillator { omega: 1.0 }))
                .build()
                .unwrap(),
        )
        .unwrap();
    solver(0.02)
        .propagate(&sys, &mut engine, OrbitState::new(0.0, [1.0, 0.0]), 10.0, 0.1)
        .unwrap();

    let events: Vec<(f64, bool)> = engine.resolved_events().iter().map(|e| (e.t, e.increasing)).collect();
    let expected = [(FRAC_PI_2 + dec, false), (3.0 * FRAC_PI_2 + inc, true), (5.0 * FRAC_PI_2 + dec, false)];
    assert_eq!(events.len(), expected.len(), "{events:?}");
    for ((t, increasing), (t_exp, inc_exp)) in events.iter().zip(expected) {
        assert_abs_diff_eq!(*t, t_exp, epsilon = 1e-8);
        assert_eq!(*increasing, inc_exp);
    }
}

#[test]
fn anticipated_stop_lands_ahead_of_the_crossing() {
    let sys = HarmonicOscillator { omega: 1.0 };
    let config = DetectorConfig::new(0.1, 1e-10).unwrap();
    let x = EventDetector::from_fn("x", config, |s: &OrbitState<2>| s.y[0])
        .with_slope(SlopeSelection::Decreasing);
    let template = solver(0.02);
    let early = EventShifter::new(x, -0.5, -0.5)
        .with_translation(template.flow(HarmonicOscillator { omega: 1.0 }))
        .build()
        .unwrap();

    let mut engine = EventEngine::new();
    engine.register_detector(early).unwrap();
    let result = solver(0.02)
        .propagate(&sys, &mut engine, OrbitState::new(0.0, [1.0, 0.0]), 5.0, 0.1)
        .unwrap();

    assert!(result.is_halted());
    assert_abs_diff_eq!(result.state().t, FRAC_PI_2 - 0.5, epsilon = 1e-8);
    assert_abs_diff_eq!(result.state().y[0], (FRAC_PI_2 - 0.5).cos(), epsilon = 1e-8);
}

#[test]
fn derivative_reset_switches_thrust_mid_step() {
    let accel = Rc::new(Cell::new(0.0));
    let throttle = Rc::clone(&accel);
    let config = DetectorConfig::new(0.5, 1e-12).unwrap();
    let ignition = EventDetector::new("ignition", config, catalog::epoch(1.0))
        .with_handler(handler_fn(move |_s: &Snapshot<OrbitState<2>>, _inc, _fwd| {
            throttle.set(1.0);
            Action::ResetDerivatives
        }));

    let mut engine = EventEngine::new();
    engine.register_detector(ignition).unwrap();
    let mut solver = solver(10.0);
    let result = solver
        .propagate(
            &Throttled { accel },
            &mut engine,
            OrbitState::new(0.0, [0.0, 1.0]),
            3.0,
            0.7,
        )
        .unwrap();

    // x = t until ignition, then 1 + (t - 1) + (t - 1)^2 / 2
    let s = result.state();
    assert_abs_diff_eq!(s.y[0], 5.0, epsilon = 1e-9);
    assert_abs_diff_eq!(s.y[1], 3.0, epsilon = 1e-9);
    assert_abs_diff_eq!(s.ydot[1], 1.0);
    assert_eq!(solver.stats.restarts, 1);
}

#[test]
fn state_reset_applies_impulse_and_channels() {
    struct Coast;
    impl OdeSystem<2> for Coast {
        fn rhs(&self, _t: f64, y: &[f64; 2], dydt: &mut [f64; 2]) {
            dydt[0] = y[1];
            dydt[1] = 0.0;
        }
    }

    let burn = ResetOnEvent::new(|old: &Snapshot<OrbitState<2>>| match old {
        Snapshot::Single(s) => {
            let mass = s.channel("mass").unwrap_or_default();
            Snapshot::Single(
                OrbitState::new(s.t, [s.y[0], s.y[1] + 1.0])
                    .with_channels(s.channels().clone())
                    .with_channel("mass", mass - 20.0),
            )
        }
        other => other.clone(),
    });
    let spy = Spy::new(Action::Continue, |s: &Snapshot<OrbitState<2>>| {
        s.as_single().map_or(f64::NAN, |s| s.y[1])
    });

    let config = DetectorConfig::new(0.5, 1e-12).unwrap();
    let mut engine = EventEngine::new();
    engine
        .register_detector(EventDetector::new("burn", config, catalog::epoch(2.0)).with_handler(burn))
        .unwrap();
    engine
        .register_detector(
            EventDetector::new("watch", config, catalog::epoch(10.0)).with_handler(spy.clone()),
        )
        .unwrap();

    let initial = OrbitState::new(0.0, [0.0, 1.0]).with_channel("mass", 100.0);
    let result = solver(10.0)
        .propagate(&Coast, &mut engine, initial, 4.0, 0.5)
        .unwrap();

    let s = result.state();
    assert_abs_diff_eq!(s.y[0], 6.0, epsilon = 1e-9);
    assert_eq!(s.channel("mass"), Some(80.0));
    // the bystander was re-initialized with the post-burn velocity
    let inits = spy.inits.borrow();
    assert_eq!(inits.len(), 2);
    assert_abs_diff_eq!(inits[1].1, 2.0, epsilon = 1e-12);
}

#[test]
fn detector_registered_mid_run_is_picked_up() {
    let sys = HarmonicOscillator { omega: 1.0 };
    let mut engine = EventEngine::new();
    let mut solver = solver(0.02);

    let first = solver
        .propagate(&sys, &mut engine, OrbitState::new(0.0, [1.0, 0.0]), 1.0, 0.1)
        .unwrap();
    engine
        .register_detector(EventDetector::from_fn(
            "x",
            DetectorConfig::new(0.1, 1e-10).unwrap(),
            |s: &OrbitState<2>| s.y[0],
        ))
        .unwrap();
    let second = solver
        .propagate(&sys, &mut engine, first.state().clone(), 5.0, 0.1)
        .unwrap();
    assert!(second.is_halted());
    assert_abs_diff_eq!(second.state().t, FRAC_PI_2, epsilon = 1e-8);
}

#[test]
fn event_errors_surface_through_the_integrator() {
    let det = EventDetector::new(
        "fragile",
        DetectorConfig::new(0.1, 1e-10).unwrap(),
        astro_events::Indicator::single(|s: &OrbitState<2>| {
            if s.t > 0.5 {
                Err(astro_events::IndicatorError::domain("out of range"))
            } else {
                Ok(1.0)
            }
        }),
    );
    let mut engine = EventEngine::new();
    engine.register_detector(det).unwrap();
    let err = solver(0.05)
        .propagate(
            &HarmonicOscillator { omega: 1.0 },
            &mut engine,
            OrbitState::new(0.0, [1.0, 0.0]),
            2.0,
            0.05,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        IntegrationError::Event(astro_events::EventError::Evaluation { .. })
    ));
}
