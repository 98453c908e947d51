//! Event detectors.
//!
//! An [`EventDetector`] bundles an indicator closure, its immutable
//! configuration, a reaction handler, an optional veto filter and the
//! run-scoped [`TrackingState`]. Variants are built by composing closures
//! and decorators rather than by subtyping.

use std::fmt;
use std::rc::Rc;

use crate::config::{DetectorConfig, SlopeSelection};
use crate::error::{EventError, EventResult};
use crate::handler::{Action, EventHandler, StopOnEvent};
use crate::indicator::{Indicator, IndicatorError};
use crate::state::{Arity, Snapshot, TrajectoryState};
use crate::tracking::TrackingState;

type FilterFn<S> = Rc<dyn Fn(&Snapshot<S>, bool, bool) -> bool>;

/// A watched indicator function together with everything needed to react
/// to its zero crossings.
pub struct EventDetector<S: TrajectoryState> {
    name: String,
    config: DetectorConfig,
    indicator: Indicator<S>,
    handler: Box<dyn EventHandler<S>>,
    filter: Option<FilterFn<S>>,
    tracking: TrackingState,
}

impl<S: TrajectoryState> fmt::Debug for EventDetector<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDetector")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("arity", &self.indicator.arity())
            .field("filtered", &self.filter.is_some())
            .field("tracking", &self.tracking)
            .finish()
    }
}

/// Produces an independent detector: same configuration, indicator and
/// filter, a cloned handler, and a fresh tracking state.
impl<S: TrajectoryState> Clone for EventDetector<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            config: self.config,
            indicator: self.indicator.clone(),
            handler: self.handler.clone_handler(),
            filter: self.filter.clone(),
            tracking: TrackingState::default(),
        }
    }
}

impl<S: TrajectoryState> EventDetector<S> {
    /// Detector stopping on every crossing of `indicator`.
    pub fn new(name: impl Into<String>, config: DetectorConfig, indicator: Indicator<S>) -> Self {
        Self {
            name: name.into(),
            config,
            indicator,
            handler: Box::new(StopOnEvent),
            filter: None,
            tracking: TrackingState::default(),
        }
    }

    /// Detector on a single-entity closure.
    pub fn from_fn<F>(name: impl Into<String>, config: DetectorConfig, g: F) -> Self
    where
        F: Fn(&S) -> f64 + 'static,
    {
        Self::new(name, config, Indicator::from_fn(g))
    }

    /// Replace the reaction handler.
    pub fn with_handler(mut self, handler: impl EventHandler<S> + 'static) -> Self {
        self.handler = Box::new(handler);
        self
    }

    /// Replace the reaction handler with an already boxed one.
    pub fn with_boxed_handler(mut self, handler: Box<dyn EventHandler<S>>) -> Self {
        self.handler = handler;
        self
    }

    /// Install a veto: crossings for which `filter(state, increasing, forward)`
    /// returns `true` are discarded without invoking the handler.
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Snapshot<S>, bool, bool) -> bool + 'static,
    {
        self.filter = Some(Rc::new(filter));
        self
    }

    /// Restrict the crossings the detector reacts to.
    pub fn with_slope(mut self, slope: SlopeSelection) -> Self {
        self.config = self.config.with_slope(slope);
        self
    }

    /// Rename the detector.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// A detector watching a different indicator with the same handler and
    /// filter. Used by decorators.
    pub(crate) fn rewrapped(
        &self,
        name: impl Into<String>,
        config: DetectorConfig,
        indicator: Indicator<S>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            indicator,
            handler: self.handler.clone_handler(),
            filter: self.filter.clone(),
            tracking: TrackingState::default(),
        }
    }

    /// Detector name, used in diagnostics and event records.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// The watched indicator
    pub fn indicator(&self) -> &Indicator<S> {
        &self.indicator
    }

    /// State cardinality the detector consumes
    pub fn arity(&self) -> Arity {
        self.indicator.arity()
    }

    /// Maximum sampling period [s]
    pub fn max_check_interval(&self) -> f64 {
        self.config.max_check_interval()
    }

    /// Convergence threshold [s]
    pub fn threshold(&self) -> f64 {
        self.config.threshold()
    }

    /// Root refinement iteration budget
    pub fn max_iteration_count(&self) -> usize {
        self.config.max_iteration_count()
    }

    /// Which crossings are visible
    pub fn slope_selection(&self) -> SlopeSelection {
        self.config.slope_selection()
    }

    /// Run-scoped bookkeeping
    pub fn tracking(&self) -> &TrackingState {
        &self.tracking
    }

    pub(crate) fn tracking_mut(&mut self) -> &mut TrackingState {
        &mut self.tracking
    }

    /// Evaluate the indicator.
    ///
    /// Fails with [`EventError::ContractMismatch`] when handed a state of
    /// the wrong cardinality and with [`EventError::Evaluation`] when the
    /// indicator cannot be computed or yields a non-finite value.
    pub fn g(&self, state: &Snapshot<S>) -> EventResult<f64> {
        let t = state.time();
        match self.indicator.value(state) {
            Ok(g) if g.is_finite() => Ok(g),
            Ok(g) => Err(EventError::Evaluation {
                detector: self.name.clone(),
                t,
                reason: format!("indicator returned {g}"),
            }),
            Err(IndicatorError::Arity { expected, found }) => Err(EventError::ContractMismatch {
                detector: self.name.clone(),
                expected,
                found,
            }),
            Err(e) => Err(EventError::Evaluation {
                detector: self.name.clone(),
                t,
                reason: e.to_string(),
            }),
        }
    }

    /// Evaluate and count.
    pub(crate) fn sample(&mut self, state: &Snapshot<S>) -> EventResult<f64> {
        self.tracking.count_call();
        self.g(state)
    }

    /// Fail fast if the detector cannot consume snapshots of this arity.
    pub(crate) fn check_arity(&self, found: Arity) -> EventResult<()> {
        if self.arity() == found {
            Ok(())
        } else {
            Err(EventError::ContractMismatch {
                detector: self.name.clone(),
                expected: self.arity(),
                found,
            })
        }
    }

    /// Start a run from `initial` towards `target`, discarding any
    /// previous tracking state.
    pub fn init(&mut self, initial: &Snapshot<S>, target: f64) -> EventResult<()> {
        self.check_arity(initial.arity())?;
        let t0 = initial.time();
        self.tracking.reset(target >= t0);
        self.handler.init(initial, target);
        self.prime(initial)
    }

    /// Take a first sample at `state` without touching the handler.
    pub(crate) fn prime(&mut self, state: &Snapshot<S>) -> EventResult<()> {
        let g0 = self.sample(state)?;
        let positive = if g0 != 0.0 {
            g0 > 0.0
        } else {
            // starting exactly on a root: take the sign just ahead
            let dt = self.tracking.direction() * self.threshold();
            let ahead = self.sample(&state.shifted_by(dt))?;
            ahead >= 0.0
        };
        self.tracking.prime(state.time(), g0, positive);
        Ok(())
    }

    /// Re-prime after the run restarted at `state` because of this
    /// detector's own crossing, which left the indicator on the
    /// `after_positive` side.
    pub(crate) fn prime_after_own_event(
        &mut self,
        state: &Snapshot<S>,
        after_positive: bool,
    ) -> EventResult<()> {
        let te = state.time();
        let g = self.sample(state)?;
        if self.tracking.sign_of(g) == after_positive || g == 0.0 {
            self.tracking.record_event(te, te, g, after_positive);
            return Ok(());
        }
        let dt = self.tracking.direction() * self.threshold();
        let ahead = self.sample(&state.shifted_by(dt))?;
        if (ahead > 0.0) == after_positive {
            self.tracking.record_event(te, te, g, after_positive);
        } else {
            // the new state genuinely sits before the crossing again
            self.tracking.prime(te, g, g > 0.0);
        }
        Ok(())
    }

    /// Reaction callback. Also settles whether the detector should be
    /// deregistered afterwards.
    pub fn event_occurred(&mut self, state: &Snapshot<S>, increasing: bool, forward: bool) -> Action {
        let action = self.handler.event_occurred(state, increasing, forward);
        let remove = self.config.removes_after(increasing) || self.handler.should_be_removed();
        self.tracking.set_pending_removal(remove);
        action
    }

    /// Whether the last handled crossing deregisters the detector.
    pub fn should_be_removed(&self) -> bool {
        self.tracking.pending_removal()
    }

    /// Secondary veto; `true` discards the crossing.
    pub fn filter_event(&self, state: &Snapshot<S>, increasing: bool, forward: bool) -> bool {
        self.filter
            .as_ref()
            .is_some_and(|f| f(state, increasing, forward))
    }

    /// Replacement state after [`Action::ResetState`].
    pub fn reset_state(&mut self, old: &Snapshot<S>) -> EventResult<Snapshot<S>> {
        let new = self.handler.reset_state(old);
        if new.arity() != old.arity() {
            return Err(EventError::ContractMismatch {
                detector: self.name.clone(),
                expected: old.arity(),
                found: new.arity(),
            });
        }
        Ok(new)
    }
}
