//! Time-shifted event detection.
//!
//! [`EventShifter`] wraps a detector so that its increasing crossings are
//! reported `inc_shift` seconds after they happen and its decreasing
//! crossings `dec_shift` seconds after they happen. Negative shifts
//! anticipate events, which is what makes the decorator useful: "one
//! minute before eclipse entry" is a decreasing-shift of -60 s on an
//! eclipse detector.
//!
//! The wrapped indicator evaluates the inner one at two translated epochs,
//! `g(t - inc_shift)` and `g(t - dec_shift)`, and keeps the larger of the two
//! when `inc_shift <= dec_shift`, the smaller otherwise. The result turns
//! positive when the first translated copy does and negative when the second
//! does, so each crossing of the inner indicator appears exactly once, at
//! its shifted time, as long as the inner indicator stays on one side for
//! longer than `|inc_shift - dec_shift|`. The shifted detector's own refiner
//! then localizes the inner crossing through the translated states.
//!
//! Shifted times are exactly as good as the translation. The default is
//! [`TrajectoryState::shifted_by`], which is exact for states that carry
//! nothing but their epoch and first-order for [`OrbitState`]. Over curved
//! trajectories install the flow of the dynamics with
//! [`EventShifter::with_translation`] (see [`Rkf78::flow`]).
//!
//! [`OrbitState`]: crate::state::OrbitState
//! [`Rkf78::flow`]: crate::propagator::Rkf78::flow

use std::fmt;
use std::rc::Rc;

use tracing::warn;

use crate::detector::EventDetector;
use crate::error::{EventError, EventResult};
use crate::indicator::IndicatorError;
use crate::state::{EntityStates, Snapshot, TrajectoryState};

type Translation<S> = Rc<dyn Fn(&S, f64) -> Result<S, IndicatorError>>;

/// Builder for a time-shifted copy of a detector.
#[derive(Clone)]
pub struct EventShifter<S: TrajectoryState> {
    inner: EventDetector<S>,
    inc_shift: f64,
    dec_shift: f64,
    max_check: Option<f64>,
    threshold: Option<f64>,
    translation: Option<Translation<S>>,
}

impl<S: TrajectoryState> fmt::Debug for EventShifter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventShifter")
            .field("inner", &self.inner)
            .field("inc_shift", &self.inc_shift)
            .field("dec_shift", &self.dec_shift)
            .field("max_check", &self.max_check)
            .field("threshold", &self.threshold)
            .field("translated", &self.translation.is_some())
            .finish()
    }
}

impl<S: TrajectoryState> EventShifter<S> {
    /// Shift increasing crossings of `inner` by `inc_shift` seconds and
    /// decreasing ones by `dec_shift` seconds.
    pub fn new(inner: EventDetector<S>, inc_shift: f64, dec_shift: f64) -> Self {
        Self {
            inner,
            inc_shift,
            dec_shift,
            max_check: None,
            threshold: None,
            translation: None,
        }
    }

    /// Sampling period of the shifted detector. Defaults to the inner one.
    pub fn with_max_check(mut self, max_check: f64) -> Self {
        self.max_check = Some(max_check);
        self
    }

    /// Convergence threshold of the shifted detector. Defaults to the inner one.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// Move states along the trajectory with `translate(state, dt)` instead
    /// of [`TrajectoryState::shifted_by`]. The result must be the state at
    /// `state.time() + dt`.
    pub fn with_translation<F>(mut self, translate: F) -> Self
    where
        F: Fn(&S, f64) -> Result<S, IndicatorError> + 'static,
    {
        self.translation = Some(Rc::new(translate));
        self
    }

    /// Produce the shifted detector. It keeps the inner detector's handler,
    /// filter, slope selection and removal flags.
    pub fn build(self) -> EventResult<EventDetector<S>> {
        let Self {
            inner,
            inc_shift,
            dec_shift,
            max_check,
            threshold,
            translation,
        } = self;

        if !inc_shift.is_finite() || !dec_shift.is_finite() {
            return Err(EventError::configuration(format!(
                "event shifts must be finite, got {inc_shift} and {dec_shift}"
            )));
        }

        let max_check = max_check.unwrap_or(inner.max_check_interval());
        let threshold = threshold.unwrap_or(inner.threshold());
        let config = inner.config().rescaled(max_check, threshold)?;

        let spread = (inc_shift - dec_shift).abs();
        if spread > 0.0 && max_check > spread {
            warn!(
                detector = inner.name(),
                max_check,
                spread,
                "check interval longer than the shift spread; short intervals may be missed"
            );
        }

        let keep_max = inc_shift <= dec_shift;
        let indicator = inner.indicator().map_snapshot(move |g, snap| {
            let inc = g(&translate(translation.as_deref(), snap, -inc_shift)?)?;
            let dec = g(&translate(translation.as_deref(), snap, -dec_shift)?)?;
            Ok(if keep_max { inc.max(dec) } else { inc.min(dec) })
        });

        let name = format!("{} shifted", inner.name());
        Ok(inner.rewrapped(name, config, indicator))
    }
}

/// `snap` moved by `dt`, entity by entity for multi-entity snapshots.
fn translate<S: TrajectoryState>(
    translation: Option<&dyn Fn(&S, f64) -> Result<S, IndicatorError>>,
    snap: &Snapshot<S>,
    dt: f64,
) -> Result<Snapshot<S>, IndicatorError> {
    let Some(f) = translation else {
        return Ok(snap.shifted_by(dt));
    };
    if dt == 0.0 {
        return Ok(snap.clone());
    }
    match snap {
        Snapshot::Single(s) => Ok(Snapshot::Single(f(s, dt)?)),
        Snapshot::Multi(m) => {
            let mut moved = EntityStates::new(m.time() + dt);
            for (id, s) in m.iter() {
                moved.insert(id, f(s, dt)?);
            }
            Ok(Snapshot::Multi(moved))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DetectorConfig, SlopeSelection};
    use crate::state::Snapshot;

    fn window() -> EventDetector<f64> {
        // positive on [2, 5]
        EventDetector::from_fn(
            "window",
            DetectorConfig::new(0.1, 1e-9).unwrap(),
            |t: &f64| -(t - 2.0) * (t - 5.0),
        )
    }

    #[test]
    fn shifted_indicator_moves_both_edges() {
        let det = EventShifter::new(window(), -0.5, 1.0).build().unwrap();
        let g = |t: f64| det.g(&Snapshot::Single(t)).unwrap();
        // positive on [1.5, 6]
        assert!(g(1.4) < 0.0);
        assert!(g(1.6) > 0.0);
        assert!(g(5.9) > 0.0);
        assert!(g(6.1) < 0.0);
    }

    #[test]
    fn reordered_shifts_use_the_minimum() {
        let det = EventShifter::new(window(), 1.0, -0.5).build().unwrap();
        let g = |t: f64| det.g(&Snapshot::Single(t)).unwrap();
        // positive on [3, 4.5]
        assert!(g(2.9) < 0.0);
        assert!(g(3.1) > 0.0);
        assert!(g(4.4) > 0.0);
        assert!(g(4.6) < 0.0);
    }

    #[test]
    fn inherits_slope_and_overrides_tolerances() {
        let inner = window().with_slope(SlopeSelection::Decreasing);
        let det = EventShifter::new(inner, 0.0, -1.0)
            .with_max_check(0.05)
            .with_threshold(1e-11)
            .build()
            .unwrap();
        assert_eq!(det.slope_selection(), SlopeSelection::Decreasing);
        assert_eq!(det.max_check_interval(), 0.05);
        assert_eq!(det.threshold(), 1e-11);
        assert_eq!(det.name(), "window shifted");
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(EventShifter::new(window(), f64::NAN, 0.0).build().is_err());
        assert!(EventShifter::new(window(), 0.0, 0.0)
            .with_threshold(1.0)
            .build()
            .is_err());
    }
}
