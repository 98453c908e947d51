//! Per-detector bookkeeping carried across integration steps.
//!
//! A [`TrackingState`] belongs to exactly one detector and one run. It is
//! reset by `init` and never copied into a clone, so two runs can never
//! observe each other's samples.

/// Mutable, run-scoped scan state of a detector.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingState {
    t_last: Option<f64>,
    g_last: f64,
    positive: bool,
    last_event: Option<f64>,
    forward: bool,
    armed: bool,
    g_calls: u64,
    pending_removal: bool,
}

impl Default for TrackingState {
    fn default() -> Self {
        Self {
            t_last: None,
            g_last: 0.0,
            positive: true,
            last_event: None,
            forward: true,
            armed: false,
            g_calls: 0,
            pending_removal: false,
        }
    }
}

impl TrackingState {
    /// Time and value of the last retained sample, once primed.
    pub fn last_sample(&self) -> Option<(f64, f64)> {
        self.t_last.map(|t| (t, self.g_last))
    }

    /// Whether the detector has been primed for the current run.
    pub fn is_primed(&self) -> bool {
        self.t_last.is_some()
    }

    /// Sign the indicator is currently considered to have.
    pub fn is_positive(&self) -> bool {
        self.positive
    }

    /// Time of the last handled (or vetoed) crossing.
    pub fn last_event(&self) -> Option<f64> {
        self.last_event
    }

    /// Propagation direction of the current run.
    pub fn is_forward(&self) -> bool {
        self.forward
    }

    /// Whether sign changes are currently acted upon.
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Indicator evaluations performed during the current run.
    pub fn g_calls(&self) -> u64 {
        self.g_calls
    }

    /// Whether the last handled crossing asked for deregistration.
    pub fn pending_removal(&self) -> bool {
        self.pending_removal
    }

    pub(crate) fn reset(&mut self, forward: bool) {
        *self = Self {
            forward,
            ..Self::default()
        };
    }

    pub(crate) fn direction(&self) -> f64 {
        if self.forward {
            1.0
        } else {
            -1.0
        }
    }

    pub(crate) fn count_call(&mut self) {
        self.g_calls += 1;
    }

    /// Effective sign of a sample; an exact zero keeps the current sign.
    pub(crate) fn sign_of(&self, g: f64) -> bool {
        if g == 0.0 {
            self.positive
        } else {
            g > 0.0
        }
    }

    pub(crate) fn prime(&mut self, t: f64, g: f64, positive: bool) {
        self.t_last = Some(t);
        self.g_last = g;
        self.positive = positive;
        self.armed = true;
    }

    pub(crate) fn record_sample(&mut self, t: f64, g: f64) {
        self.positive = self.sign_of(g);
        self.t_last = Some(t);
        self.g_last = g;
    }

    /// Move past a sample without letting it change the sign.
    pub(crate) fn absorb_sample(&mut self, t: f64, g: f64) {
        self.t_last = Some(t);
        self.g_last = g;
    }

    /// A crossing has been handled at `te`; scanning resumes at `t_after`
    /// where the indicator has the post-crossing sign.
    pub(crate) fn record_event(&mut self, te: f64, t_after: f64, g_after: f64, after_positive: bool) {
        self.last_event = Some(te);
        self.t_last = Some(t_after);
        self.g_last = g_after;
        self.positive = after_positive;
        self.armed = false;
    }

    pub(crate) fn set_pending_removal(&mut self, pending: bool) {
        self.pending_removal = pending;
    }

    /// Re-arm once the scan is more than `threshold` past the last event.
    /// Returns whether a sample at `t` may trigger a crossing.
    pub(crate) fn arm_for(&mut self, t: f64, threshold: f64) -> bool {
        if self.armed {
            return true;
        }
        match self.last_event {
            Some(te) if (t - te) * self.direction() <= threshold => false,
            _ => {
                self.armed = true;
                true
            }
        }
    }

    /// Physical slope of a crossing that ends on the `new_positive` side.
    pub(crate) fn crossing_is_increasing(&self, new_positive: bool) -> bool {
        new_positive == self.forward
    }

    /// Left end of a bracket in scan order. A zero or absorbed sample is
    /// replaced by the smallest value carrying the current sign so the
    /// refiner cannot settle on it.
    pub(crate) fn bracket_start(&self) -> Option<(f64, f64)> {
        let t = self.t_last?;
        let g = self.g_last;
        if g == 0.0 || (g > 0.0) != self.positive {
            let tiny = if self.positive {
                f64::MIN_POSITIVE
            } else {
                -f64::MIN_POSITIVE
            };
            Some((t, tiny))
        } else {
            Some((t, g))
        }
    }
}
