//! The event engine: multi-detector step scanning and action resolution.
//!
//! The propagation driver owns the integrator. After every accepted step it
//! hands the engine the step bounds and an interpolator, and the engine
//! answers with a [`StepOutcome`] telling the driver whether to accept the
//! step, halt, or restart from the event time.
//!
//! Within one step, crossings are resolved strictly in scan order. Crossings
//! of different detectors that fall within a threshold of each other form a
//! batch resolved in registration order; the first `Stop` in a batch halts
//! the run before later members are consulted. A reset discards the rest of
//! the step: every pending crossing is dropped and re-detected against the
//! new trajectory.

use tracing::{debug, info, warn};

use crate::detector::EventDetector;
use crate::error::{EventError, EventResult};
use crate::handler::Action;
use crate::scanner::{next_crossing, Crossing};
use crate::state::{Arity, Snapshot, StateProvider, TrajectoryState};

/// Handle of a registered detector. Handles are issued in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DetectorId(pub usize);

/// Resolver state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolverPhase {
    /// Sampling detectors for sign changes
    #[default]
    Scanning,
    /// Localized crossings are waiting to be ordered and resolved
    Localizing,
    /// A handler is being consulted
    Resolving,
    /// A `Stop` was resolved; the run is over
    Halted,
}

/// A resolved event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    /// Detector that fired
    pub detector: DetectorId,
    /// Its name
    pub name: String,
    /// Event time
    pub t: f64,
    /// Physical slope of the crossing
    pub increasing: bool,
    /// What the handler asked for
    pub action: Action,
}

/// What the driver must do with the step it just completed.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome<S> {
    /// No event needs attention; accept the whole step.
    Continue,
    /// Stop propagating; the run ends at `state`.
    Halt {
        /// Event time
        t: f64,
        /// State at the event
        state: Snapshot<S>,
    },
    /// Discard the rest of the step and restart integration from `state`.
    /// Detectors have already been re-initialized with it.
    ResetState {
        /// Event time
        t: f64,
        /// Replacement state
        state: Snapshot<S>,
    },
    /// Discard the rest of the step, recompute derivatives at `state` and
    /// restart integration from it.
    ResetDerivatives {
        /// Event time
        t: f64,
        /// State at the event
        state: Snapshot<S>,
    },
}

struct Slot<S: TrajectoryState> {
    id: DetectorId,
    detector: EventDetector<S>,
}

/// Event detection and handling for a single propagation run.
pub struct EventEngine<S: TrajectoryState> {
    slots: Vec<Slot<S>>,
    retired: Vec<Slot<S>>,
    next_id: usize,
    arity: Option<Arity>,
    target: Option<f64>,
    forward: bool,
    phase: ResolverPhase,
    halted: Option<(f64, Snapshot<S>)>,
    history: Vec<EventRecord>,
}

impl<S: TrajectoryState> Default for EventEngine<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: TrajectoryState> EventEngine<S> {
    /// Engine with no detectors.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            retired: Vec::new(),
            next_id: 0,
            arity: None,
            target: None,
            forward: true,
            phase: ResolverPhase::Scanning,
            halted: None,
            history: Vec::new(),
        }
    }

    /// Register a detector. Detectors registered after [`EventEngine::init`]
    /// are initialized at the start of the next scanned step.
    pub fn register_detector(&mut self, detector: EventDetector<S>) -> EventResult<DetectorId> {
        if let Some(arity) = self.arity {
            detector.check_arity(arity)?;
        }
        let id = DetectorId(self.next_id);
        self.next_id += 1;
        debug!(detector = detector.name(), id = id.0, "detector registered");
        self.slots.push(Slot { id, detector });
        Ok(id)
    }

    /// Start a run from `initial` towards `target`.
    pub fn init(&mut self, initial: &Snapshot<S>, target: f64) -> EventResult<()> {
        self.arity = Some(initial.arity());
        self.target = Some(target);
        self.forward = target >= initial.time();
        self.phase = ResolverPhase::Scanning;
        self.halted = None;
        self.history.clear();
        for slot in &mut self.slots {
            slot.detector.init(initial, target)?;
        }
        Ok(())
    }

    /// Whether the run propagates forward in time.
    pub fn is_forward(&self) -> bool {
        self.forward
    }

    /// Current resolver phase.
    pub fn phase(&self) -> ResolverPhase {
        self.phase
    }

    /// Every event resolved during the run, in resolution order.
    pub fn resolved_events(&self) -> &[EventRecord] {
        &self.history
    }

    /// The last successfully resolved event.
    pub fn last_resolved(&self) -> Option<&EventRecord> {
        self.history.last()
    }

    /// Time of the last successfully resolved event.
    pub fn last_resolved_time(&self) -> Option<f64> {
        self.history.last().map(|r| r.t)
    }

    /// A detector by handle, whether still registered or already removed.
    pub fn detector(&self, id: DetectorId) -> Option<&EventDetector<S>> {
        self.slots
            .iter()
            .chain(self.retired.iter())
            .find(|s| s.id == id)
            .map(|s| &s.detector)
    }

    /// Whether the detector is still registered.
    pub fn is_active(&self, id: DetectorId) -> bool {
        self.slots.iter().any(|s| s.id == id)
    }

    /// Registered detectors in registration order.
    pub fn active_detectors(&self) -> impl Iterator<Item = (DetectorId, &EventDetector<S>)> {
        self.slots.iter().map(|s| (s.id, &s.detector))
    }

    /// Re-initialize every detector after the driver replaced the state
    /// on its own (outside of any event).
    pub fn notify_reset(&mut self, new_state: &Snapshot<S>) -> EventResult<()> {
        let target = self.require_target()?;
        warn!(t = new_state.time(), "trajectory state replaced by driver");
        self.phase = ResolverPhase::Scanning;
        self.halted = None;
        for slot in &mut self.slots {
            slot.detector.init(new_state, target)?;
        }
        Ok(())
    }

    /// Scan the completed step `[t0, t1]` and resolve the crossings found.
    ///
    /// `provider` must serve states anywhere inside the step.
    pub fn scan_step<P>(&mut self, t0: f64, t1: f64, provider: &P) -> EventResult<StepOutcome<S>>
    where
        P: StateProvider<S> + ?Sized,
    {
        self.scan(t0, t1, provider)
            .map_err(|e| e.with_last_resolved(self.last_resolved_time()))
    }

    fn require_target(&self) -> EventResult<f64> {
        self.target
            .ok_or_else(|| EventError::configuration("event engine used before init"))
    }

    fn scan<P>(&mut self, t0: f64, t1: f64, provider: &P) -> EventResult<StepOutcome<S>>
    where
        P: StateProvider<S> + ?Sized,
    {
        if let Some((t, state)) = &self.halted {
            return Ok(StepOutcome::Halt {
                t: *t,
                state: state.clone(),
            });
        }
        let target = self.require_target()?;

        let mut start = None;
        for slot in &mut self.slots {
            if !slot.detector.tracking().is_primed() {
                let initial = start.get_or_insert_with(|| provider.state_at(t0));
                slot.detector.init(initial, target)?;
            }
        }

        self.phase = ResolverPhase::Scanning;
        let mut pending = Vec::with_capacity(self.slots.len());
        for slot in &mut self.slots {
            pending.push(next_crossing(&mut slot.detector, t1, provider)?);
        }

        loop {
            let batch = self.next_batch(&pending);
            if batch.is_empty() {
                self.phase = ResolverPhase::Scanning;
                return Ok(StepOutcome::Continue);
            }
            self.phase = ResolverPhase::Localizing;

            // members already handled in this batch, with their post-crossing sign
            let mut handled: Vec<(usize, bool)> = Vec::new();
            let mut removals = Vec::new();
            for idx in batch {
                let Some(crossing) = pending[idx].take() else {
                    continue;
                };
                self.phase = ResolverPhase::Resolving;
                let action = self.resolve(idx, &crossing);
                let remove = self.slots[idx].detector.should_be_removed();

                match action {
                    Action::Stop => {
                        self.phase = ResolverPhase::Halted;
                        info!(
                            detector = self.slots[idx].detector.name(),
                            t = crossing.t,
                            "propagation halted by event"
                        );
                        self.halted = Some((crossing.t, crossing.state.clone()));
                        return Ok(StepOutcome::Halt {
                            t: crossing.t,
                            state: crossing.state,
                        });
                    }
                    Action::ResetState => {
                        let det = &mut self.slots[idx].detector;
                        let new_state = det.reset_state(&crossing.state)?;
                        if (new_state.time() - crossing.t).abs() > det.threshold() {
                            return Err(EventError::configuration(format!(
                                "detector `{}` reset the state to t = {} at an event at t = {}",
                                det.name(),
                                new_state.time(),
                                crossing.t
                            )));
                        }
                        warn!(
                            detector = det.name(),
                            t = crossing.t,
                            "state reset by event, rest of step discarded"
                        );
                        handled.push((idx, crossing.after_positive));
                        if remove {
                            removals.push(idx);
                        }
                        self.restart(&new_state, true, &handled, removals)?;
                        return Ok(StepOutcome::ResetState {
                            t: crossing.t,
                            state: new_state,
                        });
                    }
                    Action::ResetDerivatives => {
                        debug!(
                            detector = self.slots[idx].detector.name(),
                            t = crossing.t,
                            "derivatives reset by event, rest of step discarded"
                        );
                        handled.push((idx, crossing.after_positive));
                        if remove {
                            removals.push(idx);
                        }
                        self.restart(&crossing.state, false, &handled, removals)?;
                        return Ok(StepOutcome::ResetDerivatives {
                            t: crossing.t,
                            state: crossing.state,
                        });
                    }
                    Action::Continue => {
                        let det = &mut self.slots[idx].detector;
                        det.tracking_mut().record_event(
                            crossing.t,
                            crossing.t_after,
                            crossing.g_after,
                            crossing.after_positive,
                        );
                        handled.push((idx, crossing.after_positive));
                        if remove {
                            removals.push(idx);
                        } else {
                            pending[idx] = next_crossing(det, t1, provider)?;
                        }
                    }
                }
            }

            // highest index first so lower indices stay valid
            for idx in removals.into_iter().rev() {
                pending.remove(idx);
                self.retire(idx);
            }
        }
    }

    /// Indices of the earliest crossing and of every other crossing within
    /// a threshold of it, in registration order.
    fn next_batch(&self, pending: &[Option<Crossing<S>>]) -> Vec<usize> {
        let dir = if self.forward { 1.0 } else { -1.0 };
        let first = pending
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|c| (i, c.t)))
            .min_by(|a, b| (a.1 * dir).total_cmp(&(b.1 * dir)));
        let Some((first_idx, t_first)) = first else {
            return Vec::new();
        };
        let thr_first = self.slots[first_idx].detector.threshold();
        pending
            .iter()
            .enumerate()
            .filter_map(|(i, c)| {
                let c = c.as_ref()?;
                let tie = thr_first.max(self.slots[i].detector.threshold());
                ((c.t - t_first).abs() <= tie).then_some(i)
            })
            .collect()
    }

    fn resolve(&mut self, idx: usize, crossing: &Crossing<S>) -> Action {
        let forward = self.forward;
        let slot = &mut self.slots[idx];
        let action = slot
            .detector
            .event_occurred(&crossing.state, crossing.increasing, forward);
        debug!(
            detector = slot.detector.name(),
            t = crossing.t,
            increasing = crossing.increasing,
            ?action,
            "event resolved"
        );
        self.history.push(EventRecord {
            detector: slot.id,
            name: slot.detector.name().to_string(),
            t: crossing.t,
            increasing: crossing.increasing,
            action,
        });
        action
    }

    /// Restart detection at `state` after a reset. A state reset re-runs
    /// every detector's `init`; a derivative reset only re-samples them.
    ///
    /// Detectors in `handled` already reacted to a crossing of the current
    /// batch (the trigger among them). They resume on the post-crossing side
    /// so that crossing is never handled twice. `removals` lists slots to
    /// retire, in increasing order.
    fn restart(
        &mut self,
        state: &Snapshot<S>,
        reinit: bool,
        handled: &[(usize, bool)],
        removals: Vec<usize>,
    ) -> EventResult<()> {
        let target = self.require_target()?;
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if reinit {
                slot.detector.init(state, target)?;
            }
            if let Some(&(_, after_positive)) = handled.iter().find(|(h, _)| *h == i) {
                slot.detector.prime_after_own_event(state, after_positive)?;
            } else if !reinit {
                slot.detector.prime(state)?;
            }
        }
        for idx in removals.into_iter().rev() {
            self.retire(idx);
        }
        self.phase = ResolverPhase::Scanning;
        Ok(())
    }

    fn retire(&mut self, idx: usize) {
        let slot = self.slots.remove(idx);
        debug!(detector = slot.detector.name(), id = slot.id.0, "detector removed");
        self.retired.push(slot);
    }
}
