//! Runge-Kutta-Fehlberg 7(8) propagation driver.
//!
//! A 13-stage embedded RK7(8) pair with adaptive step control. Besides
//! plain integration, [`Rkf78::propagate`] runs an [`EventEngine`] over
//! every accepted step: the step is handed to the engine together with a
//! Hermite cubic interpolator built from the states and derivatives at both
//! ends, and the driver obeys whatever the resolved events ask for.
//!
//! Reference: NASA TR R-287, Erwin Fehlberg, 1968

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, trace};

use crate::engine::{EventEngine, StepOutcome};
use crate::error::EventError;
use crate::indicator::IndicatorError;
use crate::state::{OrbitState, Snapshot, StateProvider, TrajectoryState};
use crate::tableau::{RKF78, STAGES};

/// System of ordinary differential equations: dy/dt = f(t, y)
pub trait OdeSystem<const N: usize> {
    /// Evaluate the right-hand side at `(t, y)` into `dydt`.
    fn rhs(&self, t: f64, y: &[f64; N], dydt: &mut [f64; N]);
}

/// Outcome of a single attempted step
#[derive(Debug, Clone)]
pub struct StepResult<const N: usize> {
    /// Eighth-order solution at the end of the step
    pub y: [f64; N],
    /// Time at the end of the step
    pub t: f64,
    /// Scaled error estimate; the step is acceptable when it is at most 1
    pub error: f64,
    /// Suggested magnitude of the next step
    pub h_next: f64,
    /// Whether the step was accepted
    pub accepted: bool,
}

/// Integration counters
#[derive(Debug, Clone, Default)]
pub struct Stats {
    /// Right-hand side evaluations
    pub fn_evals: u64,
    /// Accepted steps
    pub accepted_steps: u64,
    /// Rejected steps
    pub rejected_steps: u64,
    /// Steps cut short by a state or derivative reset
    pub restarts: u64,
}

/// I-controller: `h_new = safety * h * error^(-1/8)`, clamped.
#[derive(Debug, Clone)]
pub struct StepController {
    /// Safety factor
    pub safety: f64,
    /// Largest growth per step
    pub max_factor: f64,
    /// Largest reduction per step
    pub min_factor: f64,
    exponent: f64,
}

impl Default for StepController {
    fn default() -> Self {
        Self {
            safety: 0.9,
            max_factor: 5.0,
            min_factor: 0.2,
            // embedded estimate is 7th order
            exponent: 1.0 / 8.0,
        }
    }
}

impl StepController {
    /// Step size factor for a scaled error.
    pub fn factor(&self, error: f64) -> f64 {
        if error == 0.0 {
            return self.max_factor;
        }
        (self.safety * error.powf(-self.exponent)).clamp(self.min_factor, self.max_factor)
    }
}

/// Mixed absolute/relative error tolerances.
///
/// The scaled error of component `i` is `|err_i| / (atol_i + rtol_i * |y_i|)`.
#[derive(Debug, Clone)]
pub struct Tolerances<const N: usize> {
    /// Absolute tolerance per component
    pub atol: [f64; N],
    /// Relative tolerance per component
    pub rtol: [f64; N],
}

impl<const N: usize> Tolerances<N> {
    /// Same tolerances on every component.
    pub fn new(atol: f64, rtol: f64) -> Self {
        Self {
            atol: [atol; N],
            rtol: [rtol; N],
        }
    }

    /// Per-component tolerances.
    pub fn with_components(atol: [f64; N], rtol: [f64; N]) -> Self {
        Self { atol, rtol }
    }
}

/// How a propagation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum IntegrationResult<const N: usize> {
    /// The target time was reached.
    Completed(OrbitState<N>),
    /// An event handler stopped the run.
    Halted(OrbitState<N>),
}

impl<const N: usize> IntegrationResult<N> {
    /// Final state, however the run ended.
    pub fn state(&self) -> &OrbitState<N> {
        match self {
            IntegrationResult::Completed(s) | IntegrationResult::Halted(s) => s,
        }
    }

    /// Whether an event stopped the run.
    pub fn is_halted(&self) -> bool {
        matches!(self, IntegrationResult::Halted(_))
    }
}

/// Integration failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IntegrationError {
    /// The controller asked for a step below `h_min`.
    #[error("step size {h} too small at t = {t}")]
    StepSizeTooSmall {
        /// Time of the failure
        t: f64,
        /// Rejected step size
        h: f64,
    },

    /// `max_steps` attempts were made without reaching the target.
    #[error("maximum number of integration steps exceeded")]
    MaxStepsExceeded,

    /// Bad arguments.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// What is wrong
        message: String,
    },

    /// The solution stopped being finite.
    #[error("non-finite state at t = {t}")]
    NonFiniteState {
        /// Time of the failure
        t: f64,
    },

    /// Event detection or handling failed.
    #[error(transparent)]
    Event(#[from] EventError),
}

/// Hermite cubic interpolation over one accepted step.
struct HermiteStep<'a, const N: usize> {
    t_a: f64,
    y_a: [f64; N],
    f_a: [f64; N],
    t_b: f64,
    y_b: [f64; N],
    f_b: [f64; N],
    channels: &'a BTreeMap<String, f64>,
}

impl<const N: usize> HermiteStep<'_, N> {
    fn eval(&self, t: f64) -> ([f64; N], [f64; N]) {
        let dt = self.t_b - self.t_a;
        if dt == 0.0 {
            return (self.y_a, self.f_a);
        }
        let s = (t - self.t_a) / dt;
        let s2 = s * s;
        let s3 = s2 * s;

        let h00 = 1.0 - 3.0 * s2 + 2.0 * s3;
        let h10 = s - 2.0 * s2 + s3;
        let h01 = 3.0 * s2 - 2.0 * s3;
        let h11 = s3 - s2;

        let d00 = 6.0 * (s2 - s);
        let d10 = 1.0 - 4.0 * s + 3.0 * s2;
        let d11 = 3.0 * s2 - 2.0 * s;

        let mut y = [0.0; N];
        let mut ydot = [0.0; N];
        for i in 0..N {
            y[i] = h00 * self.y_a[i]
                + h01 * self.y_b[i]
                + dt * (h10 * self.f_a[i] + h11 * self.f_b[i]);
            ydot[i] = d00 * (self.y_a[i] - self.y_b[i]) / dt
                + d10 * self.f_a[i]
                + d11 * self.f_b[i];
        }
        (y, ydot)
    }
}

impl<const N: usize> StateProvider<OrbitState<N>> for HermiteStep<'_, N> {
    fn state_at(&self, t: f64) -> Snapshot<OrbitState<N>> {
        let (y, ydot) = self.eval(t);
        Snapshot::Single(
            OrbitState::new(t, y)
                .with_derivative(ydot)
                .with_channels(self.channels.clone()),
        )
    }
}

/// Runge-Kutta-Fehlberg 7(8) integrator
///
/// ```
/// use astro_events::{OdeSystem, Rkf78, Tolerances};
///
/// struct HarmonicOscillator { omega: f64 }
///
/// impl OdeSystem<2> for HarmonicOscillator {
///     fn rhs(&self, _t: f64, y: &[f64; 2], dydt: &mut [f64; 2]) {
///         dydt[0] = y[1];
///         dydt[1] = -self.omega * self.omega * y[0];
///     }
/// }
///
/// let mut solver = Rkf78::new(Tolerances::new(1e-12, 1e-12));
/// let sys = HarmonicOscillator { omega: 1.0 };
/// let (tf, yf) = solver.integrate(&sys, 0.0, &[1.0, 0.0], 10.0, 0.1).unwrap();
/// assert!((yf[0] - tf.cos()).abs() < 1e-9);
/// ```
#[derive(Debug, Clone)]
pub struct Rkf78<const N: usize> {
    tol: Tolerances<N>,
    controller: StepController,
    /// Smallest step magnitude
    pub h_min: f64,
    /// Largest step magnitude
    pub h_max: f64,
    /// Step attempts allowed per call
    pub max_steps: u64,
    k: [[f64; N]; STAGES],
    /// Counters since creation or the last [`Rkf78::reset_stats`]
    pub stats: Stats,
}

impl<const N: usize> Rkf78<N> {
    /// Integrator with the given tolerances and default step limits.
    pub fn new(tol: Tolerances<N>) -> Self {
        Self {
            tol,
            controller: StepController::default(),
            h_min: 1e-14,
            h_max: f64::INFINITY,
            max_steps: 10_000_000,
            k: [[0.0; N]; STAGES],
            stats: Stats::default(),
        }
    }

    /// Set minimum and maximum step magnitudes.
    pub fn set_step_limits(&mut self, h_min: f64, h_max: f64) {
        self.h_min = h_min;
        self.h_max = h_max;
    }

    /// Reset the counters.
    pub fn reset_stats(&mut self) {
        self.stats = Stats::default();
    }

    /// Attempt one step of size `h` from `(t, y)`.
    pub fn step<Sys: OdeSystem<N>>(&mut self, sys: &Sys, t: f64, y: &[f64; N], h: f64) -> StepResult<N> {
        let h = h.signum() * h.abs().clamp(self.h_min, self.h_max);

        self.compute_stages(sys, t, y, h);
        let y8 = self.combine(y, h, &RKF78.b);
        let error = self.scaled_error(&y8, h);
        let accepted = error <= 1.0;
        let h_next = (h.abs() * self.controller.factor(error)).clamp(self.h_min, self.h_max);

        self.stats.fn_evals += STAGES as u64;
        if accepted {
            self.stats.accepted_steps += 1;
        } else {
            self.stats.rejected_steps += 1;
            trace!(t, h, error, "step rejected");
        }

        StepResult {
            y: y8,
            t: t + h,
            error,
            h_next,
            accepted,
        }
    }

    /// Integrate from `t0` to `tf` without event detection.
    pub fn integrate<Sys: OdeSystem<N>>(
        &mut self,
        sys: &Sys,
        t0: f64,
        y0: &[f64; N],
        tf: f64,
        h0: f64,
    ) -> Result<(f64, [f64; N]), IntegrationError> {
        if t0 == tf {
            return Ok((t0, *y0));
        }
        self.validate_inputs(t0, y0, tf, h0)?;

        let dir = (tf - t0).signum();
        let (mut t, mut y, mut h) = (t0, *y0, h0);
        let mut attempts = 0u64;

        while (tf - t) * dir > self.h_min {
            if (t + h - tf) * dir > 0.0 {
                h = tf - t;
            }
            let result = self.step(sys, t, &y, h);
            if result.accepted {
                t = result.t;
                y = result.y;
                Self::check_finite(t, &y)?;
            }
            h = result.h_next * dir;
            self.check_progress(&mut attempts, &result, t, tf, dir)?;
        }
        Ok((t, y))
    }

    /// Translation of states along the flow of `sys`, integrated by a copy
    /// of this integrator. Install it with
    /// [`EventShifter::with_translation`](crate::shifter::EventShifter::with_translation)
    /// so shifted detectors see the true trajectory instead of a linear
    /// extrapolation.
    ///
    /// Channels are carried over unchanged.
    pub fn flow<Sys>(
        &self,
        sys: Sys,
    ) -> impl Fn(&OrbitState<N>, f64) -> Result<OrbitState<N>, IndicatorError> + 'static
    where
        Sys: OdeSystem<N> + 'static,
    {
        let template = Self {
            stats: Stats::default(),
            ..self.clone()
        };
        move |state: &OrbitState<N>, dt: f64| {
            if dt == 0.0 {
                return Ok(state.clone());
            }
            let tf = state.t + dt;
            let mut solver = template.clone();
            let (t, mut y) = solver
                .integrate(&sys, state.t, &state.y, tf, dt)
                .map_err(|e| IndicatorError::domain(format!("state translation failed: {e}")))?;
            let mut ydot = [0.0; N];
            sys.rhs(t, &y, &mut ydot);
            if t != tf {
                // remaining gap is below h_min
                for (yi, di) in y.iter_mut().zip(ydot) {
                    *yi += (tf - t) * di;
                }
                sys.rhs(tf, &y, &mut ydot);
            }
            Ok(OrbitState::new(tf, y)
                .with_derivative(ydot)
                .with_channels(state.channels().clone()))
        }
    }

    /// Propagate `initial` towards `tf`, letting `engine` watch every
    /// accepted step.
    ///
    /// The engine is initialized here, so detectors must be registered
    /// beforehand (or between calls, in which case they are picked up at
    /// the next step). Auxiliary channels of `initial` are carried along
    /// unchanged unless a state reset replaces them.
    ///
    /// States inside a step come from a cubic Hermite interpolant of the
    /// step end points, accurate to `O(h^4)`; bound `h_max` when event
    /// times must be tighter than that.
    pub fn propagate<Sys: OdeSystem<N>>(
        &mut self,
        sys: &Sys,
        engine: &mut EventEngine<OrbitState<N>>,
        initial: OrbitState<N>,
        tf: f64,
        h0: f64,
    ) -> Result<IntegrationResult<N>, IntegrationError> {
        let t0 = initial.t;
        if t0 != tf {
            self.validate_inputs(t0, &initial.y, tf, h0)?;
        }
        let mut current = self.with_fresh_derivative(sys, initial);
        engine.init(&Snapshot::Single(current.clone()), tf)?;
        if t0 == tf {
            return Ok(IntegrationResult::Completed(current));
        }

        let dir = (tf - t0).signum();
        let mut h = h0;
        let mut attempts = 0u64;

        while (tf - current.t) * dir > self.h_min {
            if (current.t + h - tf) * dir > 0.0 {
                h = tf - current.t;
            }
            let result = self.step(sys, current.t, &current.y, h);
            h = result.h_next * dir;

            if result.accepted {
                Self::check_finite(result.t, &result.y)?;
                // k[0] holds f(t_a, y_a) of the step just taken
                let f_a = self.k[0];
                let mut f_b = [0.0; N];
                sys.rhs(result.t, &result.y, &mut f_b);
                self.stats.fn_evals += 1;

                let interp = HermiteStep {
                    t_a: current.t,
                    y_a: current.y,
                    f_a,
                    t_b: result.t,
                    y_b: result.y,
                    f_b,
                    channels: current.channels(),
                };

                match engine.scan_step(current.t, result.t, &interp)? {
                    StepOutcome::Continue => {
                        current = OrbitState::new(result.t, result.y)
                            .with_derivative(f_b)
                            .with_channels(current.channels().clone());
                    }
                    StepOutcome::Halt { t, state } => {
                        debug!(t, "propagation stopped by event");
                        return Ok(IntegrationResult::Halted(Self::single(state)?));
                    }
                    StepOutcome::ResetState { t, state }
                    | StepOutcome::ResetDerivatives { t, state } => {
                        debug!(t, "restarting integration at event");
                        self.stats.restarts += 1;
                        current = self.with_fresh_derivative(sys, Self::single(state)?);
                    }
                }
            }

            let t = current.t;
            self.check_progress(&mut attempts, &result, t, tf, dir)?;
        }

        // the last sliver is shorter than h_min: cross it along the derivative
        while (tf - current.t) * dir > 0.0 {
            attempts += 1;
            if attempts > self.max_steps {
                return Err(IntegrationError::MaxStepsExceeded);
            }
            let mut moved = current.shifted_by(tf - current.t);
            moved.t = tf;
            let end = self.with_fresh_derivative(sys, moved);
            let provider = |t: f64| Snapshot::Single(current.shifted_by(t - current.t));
            match engine.scan_step(current.t, tf, &provider)? {
                StepOutcome::Continue => current = end,
                StepOutcome::Halt { t, state } => {
                    debug!(t, "propagation stopped by event");
                    return Ok(IntegrationResult::Halted(Self::single(state)?));
                }
                StepOutcome::ResetState { t, state }
                | StepOutcome::ResetDerivatives { t, state } => {
                    debug!(t, "restarting integration at event");
                    self.stats.restarts += 1;
                    current = self.with_fresh_derivative(sys, Self::single(state)?);
                }
            }
        }

        debug!(t = current.t, steps = self.stats.accepted_steps, "propagation completed");
        Ok(IntegrationResult::Completed(current))
    }

    fn with_fresh_derivative<Sys: OdeSystem<N>>(&mut self, sys: &Sys, state: OrbitState<N>) -> OrbitState<N> {
        let mut ydot = [0.0; N];
        sys.rhs(state.t, &state.y, &mut ydot);
        self.stats.fn_evals += 1;
        state.with_derivative(ydot)
    }

    fn single(state: Snapshot<OrbitState<N>>) -> Result<OrbitState<N>, IntegrationError> {
        match state {
            Snapshot::Single(s) => Ok(s),
            Snapshot::Multi(_) => Err(IntegrationError::InvalidInput {
                message: "event handler produced a multi-entity state".to_string(),
            }),
        }
    }

    fn check_finite(t: f64, y: &[f64; N]) -> Result<(), IntegrationError> {
        if y.iter().all(|v| v.is_finite()) {
            Ok(())
        } else {
            Err(IntegrationError::NonFiniteState { t })
        }
    }

    fn check_progress(
        &self,
        attempts: &mut u64,
        result: &StepResult<N>,
        t: f64,
        tf: f64,
        dir: f64,
    ) -> Result<(), IntegrationError> {
        *attempts += 1;
        if *attempts > self.max_steps {
            return Err(IntegrationError::MaxStepsExceeded);
        }
        // rejected at the floor: no way forward
        if !result.accepted && result.h_next <= self.h_min && (tf - t) * dir > self.h_min {
            return Err(IntegrationError::StepSizeTooSmall {
                t,
                h: result.h_next,
            });
        }
        Ok(())
    }

    fn compute_stages<Sys: OdeSystem<N>>(&mut self, sys: &Sys, t: f64, y: &[f64; N], h: f64) {
        sys.rhs(t, y, &mut self.k[0]);
        for i in 1..STAGES {
            let row = RKF78.a[i];
            let mut y_stage = *y;
            for (n, ys) in y_stage.iter_mut().enumerate() {
                let sum: f64 = row.iter().zip(&self.k).map(|(a, k)| a * k[n]).sum();
                *ys += h * sum;
            }
            sys.rhs(t + RKF78.c[i] * h, &y_stage, &mut self.k[i]);
        }
    }

    fn combine(&self, y: &[f64; N], h: f64, weights: &[f64; STAGES]) -> [f64; N] {
        let mut out = *y;
        for (n, o) in out.iter_mut().enumerate() {
            let sum: f64 = weights.iter().zip(&self.k).map(|(w, k)| w * k[n]).sum();
            *o += h * sum;
        }
        out
    }

    /// Infinity norm of the scaled local error.
    fn scaled_error(&self, y8: &[f64; N], h: f64) -> f64 {
        (0..N)
            .map(|n| {
                let err: f64 = RKF78.e.iter().zip(&self.k).map(|(e, k)| e * k[n]).sum();
                let scale = self.tol.atol[n] + self.tol.rtol[n] * y8[n].abs();
                (h * err).abs() / scale
            })
            .fold(0.0, f64::max)
    }

    fn validate_inputs(&self, t0: f64, y0: &[f64; N], tf: f64, h0: f64) -> Result<(), IntegrationError> {
        let invalid = |message: String| Err(IntegrationError::InvalidInput { message });
        if !t0.is_finite() || !tf.is_finite() || !h0.is_finite() {
            return invalid("t0, tf and h0 must be finite".to_string());
        }
        if h0 == 0.0 {
            return invalid("h0 must be non-zero".to_string());
        }
        if tf != t0 && h0.signum() != (tf - t0).signum() {
            return invalid("h0 must point from t0 towards tf".to_string());
        }
        if let Some(i) = y0.iter().position(|v| !v.is_finite()) {
            return invalid(format!("y0[{i}] is not finite"));
        }
        for (i, (&a, &r)) in self.tol.atol.iter().zip(&self.tol.rtol).enumerate() {
            if !a.is_finite() || a <= 0.0 {
                return invalid(format!("atol[{i}] must be positive and finite"));
            }
            if !r.is_finite() || r < 0.0 {
                return invalid(format!("rtol[{i}] must be non-negative and finite"));
            }
        }
        Ok(())
    }
}
