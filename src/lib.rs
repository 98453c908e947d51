//! # astro-events: event detection and handling for trajectory propagation
//!
//! Watches scalar indicator functions of a propagated trajectory, finds the
//! instants where they change sign, and lets each detector decide what the
//! propagation should do next: carry on, stop, or restart from a modified
//! state.
//!
//! ## Features
//!
//! - Sampling of every accepted step at a per-detector check interval,
//!   with Brent refinement of every bracketed sign change
//! - Slope selection, veto filters and one-shot detectors
//! - Deterministic ordering of simultaneous events across detectors
//! - State and derivative resets with automatic re-initialization
//! - Time-shifted detectors ([`EventShifter`]) and detectors over several
//!   trajectories at once ([`multi::multi_entity`])
//! - A Runge-Kutta-Fehlberg 7(8) driver ([`Rkf78::propagate`]) with Hermite
//!   interpolation of the state inside each step
//!
//! ## Basic Usage
//!
//! ```rust
//! use astro_events::{
//!     DetectorConfig, EventDetector, EventEngine, OdeSystem, OrbitState, Rkf78,
//!     SlopeSelection, Tolerances,
//! };
//!
//! struct HarmonicOscillator { omega: f64 }
//!
//! impl OdeSystem<2> for HarmonicOscillator {
//!     fn rhs(&self, _t: f64, y: &[f64; 2], dydt: &mut [f64; 2]) {
//!         dydt[0] = y[1];
//!         dydt[1] = -self.omega * self.omega * y[0];
//!     }
//! }
//!
//! // stop the first time x falls through zero
//! let config = DetectorConfig::new(0.1, 1e-10).unwrap();
//! let detector = EventDetector::from_fn("x = 0", config, |s: &OrbitState<2>| s.y[0])
//!     .with_slope(SlopeSelection::Decreasing);
//!
//! let mut engine = EventEngine::new();
//! engine.register_detector(detector).unwrap();
//!
//! let mut solver = Rkf78::new(Tolerances::new(1e-12, 1e-12));
//! solver.set_step_limits(1e-14, 0.01);
//! let sys = HarmonicOscillator { omega: 1.0 };
//! let result = solver
//!     .propagate(&sys, &mut engine, OrbitState::new(0.0, [1.0, 0.0]), 10.0, 0.1)
//!     .unwrap();
//!
//! assert!(result.is_halted());
//! assert!((result.state().t - std::f64::consts::FRAC_PI_2).abs() < 1e-9);
//! ```
//!
//! ## Detection model
//!
//! A crossing is only seen if the indicator has opposite signs at two
//! consecutive samples, so the check interval must be shorter than the
//! shortest interval the indicator spends on one side. Localized times are
//! within the detector threshold of the true root; two crossings closer than
//! the threshold are indistinguishable.
//!
//! Inside a step, [`Rkf78::propagate`] serves states from a cubic Hermite
//! interpolant whose error grows like `h^4`; cap the step size with
//! [`Rkf78::set_step_limits`] when event states must be accurate.
//!
//! Event times do not depend on the propagation direction: a run backward
//! over the same trajectory reports the same crossings, in reverse order,
//! with the same physical slope.
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events (brackets at `trace`, crossings and
//! resolutions at `debug`, halts at `info`, resets and risky configurations
//! at `warn`) and never installs a subscriber.
//!
//! ## References
//!
//! 1. Fehlberg, E. (1968). "Classical Fifth-, Sixth-, Seventh-, and
//!    Eighth-Order Runge-Kutta Formulas with Stepsize Control".
//!    NASA TR R-287.
//!
//! 2. Brent, R.P. (1973). "Algorithms for Minimization without
//!    Derivatives". Prentice-Hall.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod catalog;
pub mod combinators;
pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod handler;
pub mod indicator;
pub mod multi;
pub mod propagator;
pub mod refiner;
mod scanner;
pub mod shifter;
pub mod state;
mod tableau;
pub mod tracking;

pub use config::{DetectorConfig, SlopeSelection};
pub use detector::EventDetector;
pub use engine::{DetectorId, EventEngine, EventRecord, ResolverPhase, StepOutcome};
pub use error::{EventError, EventResult};
pub use handler::{
    handler_fn, Action, ContinueOnEvent, EventHandler, ResetOnEvent, StopOnDecreasing,
    StopOnEvent, StopOnIncreasing,
};
pub use indicator::{Indicator, IndicatorError};
pub use propagator::{
    IntegrationError, IntegrationResult, OdeSystem, Rkf78, Stats, StepController, StepResult,
    Tolerances,
};
pub use refiner::{Bracket, RefineFailure, Root, RootRefiner};
pub use shifter::EventShifter;
pub use state::{Arity, EntityStates, OrbitState, Snapshot, StateProvider, TrajectoryState};
pub use tracking::TrackingState;
