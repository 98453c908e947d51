//! Shared drivers for the integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use astro_events::{
    Action, EventEngine, EventError, EventHandler, Snapshot, StepOutcome, TrajectoryState,
};

/// Step an analytic trajectory through the engine with fixed steps.
///
/// `flow(anchor, t)` is the state at `t` of the trajectory passing through
/// `anchor`. Resets move the anchor. Returns the final state: the halt
/// state, or the state at `t_end`.
pub fn drive<S, F>(
    engine: &mut EventEngine<S>,
    initial: Snapshot<S>,
    t_end: f64,
    h: f64,
    flow: F,
) -> Result<Snapshot<S>, EventError>
where
    S: TrajectoryState,
    F: Fn(&Snapshot<S>, f64) -> Snapshot<S>,
{
    engine.init(&initial, t_end)?;
    let dir = if t_end >= initial.time() { 1.0 } else { -1.0 };
    let mut anchor = initial;
    let mut t = anchor.time();
    while (t_end - t) * dir > 0.0 {
        let next = if (t + h * dir - t_end) * dir >= 0.0 {
            t_end
        } else {
            t + h * dir
        };
        let provider = |s: f64| flow(&anchor, s);
        match engine.scan_step(t, next, &provider)? {
            StepOutcome::Continue => t = next,
            StepOutcome::Halt { state, .. } => return Ok(state),
            StepOutcome::ResetState { t: te, state }
            | StepOutcome::ResetDerivatives { t: te, state } => {
                anchor = state;
                t = te;
            }
        }
    }
    Ok(flow(&anchor, t_end))
}

/// Trajectory made of nothing but its epoch.
pub fn epoch_flow(_anchor: &Snapshot<f64>, t: f64) -> Snapshot<f64> {
    Snapshot::Single(t)
}

/// Handler that logs every init and every crossing it sees, then answers
/// with a fixed action. `value` picks the number recorded at init.
pub struct Spy<S> {
    pub action: Action,
    pub inits: Rc<RefCell<Vec<(f64, f64)>>>,
    pub events: Rc<RefCell<Vec<(f64, bool)>>>,
    value: Rc<dyn Fn(&Snapshot<S>) -> f64>,
}

impl<S> Clone for Spy<S> {
    fn clone(&self) -> Self {
        Self {
            action: self.action,
            inits: Rc::clone(&self.inits),
            events: Rc::clone(&self.events),
            value: Rc::clone(&self.value),
        }
    }
}

impl<S: TrajectoryState> Spy<S> {
    pub fn new(action: Action, value: impl Fn(&Snapshot<S>) -> f64 + 'static) -> Self {
        Self {
            action,
            inits: Rc::default(),
            events: Rc::default(),
            value: Rc::new(value),
        }
    }
}

impl<S: TrajectoryState> EventHandler<S> for Spy<S> {
    fn init(&mut self, initial: &Snapshot<S>, _target: f64) {
        let v = (self.value)(initial);
        self.inits.borrow_mut().push((initial.time(), v));
    }

    fn event_occurred(&mut self, state: &Snapshot<S>, increasing: bool, _forward: bool) -> Action {
        self.events.borrow_mut().push((state.time(), increasing));
        self.action
    }

    fn clone_handler(&self) -> Box<dyn EventHandler<S>> {
        Box::new(self.clone())
    }
}
