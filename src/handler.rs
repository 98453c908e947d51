//! Event reactions.
//!
//! When a crossing is localized and not vetoed, the detector's handler
//! decides what the integrator does next by returning an [`Action`].

use crate::state::{Snapshot, TrajectoryState};

/// Directive returned by an event reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    /// Keep propagating
    Continue,
    /// Halt propagation at the event
    #[default]
    Stop,
    /// Restart integration from the handler's replacement state
    ResetState,
    /// Recompute derivatives at the event, keep the state
    ResetDerivatives,
}

/// Reaction callback attached to a detector.
///
/// Handlers may own mutable data (counters, logs) or share it with the
/// caller. [`EventHandler::clone_handler`] decides how that data is split
/// when a detector is cloned for a new run.
pub trait EventHandler<S: TrajectoryState> {
    /// Called whenever the owning detector is (re)initialized.
    fn init(&mut self, _initial: &Snapshot<S>, _target: f64) {}

    /// React to a localized crossing.
    fn event_occurred(&mut self, state: &Snapshot<S>, increasing: bool, forward: bool) -> Action;

    /// Replacement state after an [`Action::ResetState`]. Defaults to the
    /// unchanged state.
    fn reset_state(&mut self, old: &Snapshot<S>) -> Snapshot<S> {
        old.clone()
    }

    /// Whether the handler itself wants the detector deregistered.
    fn should_be_removed(&self) -> bool {
        false
    }

    /// Independent copy of the handler.
    fn clone_handler(&self) -> Box<dyn EventHandler<S>>;
}

/// Stop at every crossing.
#[derive(Debug, Clone, Copy, Default)]
pub struct StopOnEvent;

impl<S: TrajectoryState> EventHandler<S> for StopOnEvent {
    fn event_occurred(&mut self, _state: &Snapshot<S>, _inc: bool, _fwd: bool) -> Action {
        Action::Stop
    }

    fn clone_handler(&self) -> Box<dyn EventHandler<S>> {
        Box::new(*self)
    }
}

/// Continue through every crossing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContinueOnEvent;

impl<S: TrajectoryState> EventHandler<S> for ContinueOnEvent {
    fn event_occurred(&mut self, _state: &Snapshot<S>, _inc: bool, _fwd: bool) -> Action {
        Action::Continue
    }

    fn clone_handler(&self) -> Box<dyn EventHandler<S>> {
        Box::new(*self)
    }
}

/// Stop on increasing crossings, continue on decreasing ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct StopOnIncreasing;

impl<S: TrajectoryState> EventHandler<S> for StopOnIncreasing {
    fn event_occurred(&mut self, _state: &Snapshot<S>, increasing: bool, _fwd: bool) -> Action {
        if increasing {
            Action::Stop
        } else {
            Action::Continue
        }
    }

    fn clone_handler(&self) -> Box<dyn EventHandler<S>> {
        Box::new(*self)
    }
}

/// Stop on decreasing crossings, continue on increasing ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct StopOnDecreasing;

impl<S: TrajectoryState> EventHandler<S> for StopOnDecreasing {
    fn event_occurred(&mut self, _state: &Snapshot<S>, increasing: bool, _fwd: bool) -> Action {
        if increasing {
            Action::Continue
        } else {
            Action::Stop
        }
    }

    fn clone_handler(&self) -> Box<dyn EventHandler<S>> {
        Box::new(*self)
    }
}

/// Handler backed by a closure. See [`handler_fn`].
#[derive(Clone)]
pub struct FnHandler<F> {
    f: F,
}

/// Wrap a closure `(state, increasing, forward) -> Action` as a handler.
///
/// The closure is cloned along with the detector; anything it captures by
/// `Rc` stays shared between the clones.
pub fn handler_fn<S, F>(f: F) -> FnHandler<F>
where
    S: TrajectoryState,
    F: FnMut(&Snapshot<S>, bool, bool) -> Action + Clone + 'static,
{
    FnHandler { f }
}

impl<S, F> EventHandler<S> for FnHandler<F>
where
    S: TrajectoryState,
    F: FnMut(&Snapshot<S>, bool, bool) -> Action + Clone + 'static,
{
    fn event_occurred(&mut self, state: &Snapshot<S>, increasing: bool, forward: bool) -> Action {
        (self.f)(state, increasing, forward)
    }

    fn clone_handler(&self) -> Box<dyn EventHandler<S>> {
        Box::new(self.clone())
    }
}

/// Reset the state at every crossing using a replacement closure
/// (an impulsive manoeuvre, a mass drop, a switched attitude channel).
#[derive(Clone)]
pub struct ResetOnEvent<R> {
    reset: R,
}

impl<R> ResetOnEvent<R> {
    /// Handler returning [`Action::ResetState`] with `reset(old)` as the new state.
    pub fn new(reset: R) -> Self {
        Self { reset }
    }
}

impl<S, R> EventHandler<S> for ResetOnEvent<R>
where
    S: TrajectoryState,
    R: FnMut(&Snapshot<S>) -> Snapshot<S> + Clone + 'static,
{
    fn event_occurred(&mut self, _state: &Snapshot<S>, _inc: bool, _fwd: bool) -> Action {
        Action::ResetState
    }

    fn reset_state(&mut self, old: &Snapshot<S>) -> Snapshot<S> {
        (self.reset)(old)
    }

    fn clone_handler(&self) -> Box<dyn EventHandler<S>> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn stock_handlers() {
        let s = Snapshot::Single(1.0_f64);
        assert_eq!(StopOnEvent.event_occurred(&s, true, true), Action::Stop);
        assert_eq!(ContinueOnEvent.event_occurred(&s, false, true), Action::Continue);
        assert_eq!(StopOnIncreasing.event_occurred(&s, true, false), Action::Stop);
        assert_eq!(StopOnIncreasing.event_occurred(&s, false, false), Action::Continue);
        assert_eq!(StopOnDecreasing.event_occurred(&s, false, true), Action::Stop);
        assert_eq!(StopOnDecreasing.event_occurred(&s, true, true), Action::Continue);
    }

    #[test]
    fn closure_handler_clones_share_captured_rc() {
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let mut h = handler_fn(move |_s: &Snapshot<f64>, _i, _f| {
            counter.set(counter.get() + 1);
            Action::Continue
        });
        let mut copy = EventHandler::<f64>::clone_handler(&h);
        h.event_occurred(&Snapshot::Single(0.0), true, true);
        copy.event_occurred(&Snapshot::Single(0.0), true, true);
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn reset_handler_replaces_state() {
        let mut h = ResetOnEvent::new(|s: &Snapshot<f64>| s.shifted_by(0.0));
        let s = Snapshot::Single(2.0);
        assert_eq!(h.event_occurred(&s, true, true), Action::ResetState);
        assert_eq!(h.reset_state(&s), Snapshot::Single(2.0));
    }
}
