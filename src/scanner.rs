//! Step scanning: hunting for sign changes of one detector inside a
//! completed integration step and localizing them.

use tracing::{debug, trace};

use crate::detector::EventDetector;
use crate::error::{EventError, EventResult};
use crate::refiner::{Bracket, RefineFailure, Root, RootRefiner};
use crate::state::{Snapshot, StateProvider, TrajectoryState};

/// A localized, non-vetoed crossing waiting for resolution.
#[derive(Debug, Clone)]
pub struct Crossing<S> {
    /// Localized event time
    pub t: f64,
    /// Whether `g` increases with physical time through the crossing
    pub increasing: bool,
    /// State at the event
    pub state: Snapshot<S>,
    /// Refinement iterations used
    pub iterations: usize,
    pub(crate) t_after: f64,
    pub(crate) g_after: f64,
    pub(crate) after_positive: bool,
}

/// Scan `det` from its last retained sample up to `t_end` and return its
/// first crossing that survives slope selection and the veto filter.
///
/// The detector's tracking state advances as samples are taken; on return
/// without a crossing it sits at `t_end`.
pub(crate) fn next_crossing<S, P>(
    det: &mut EventDetector<S>,
    t_end: f64,
    provider: &P,
) -> EventResult<Option<Crossing<S>>>
where
    S: TrajectoryState,
    P: StateProvider<S> + ?Sized,
{
    let threshold = det.threshold();
    let max_check = det.max_check_interval();
    let forward = det.tracking().is_forward();
    let dir = det.tracking().direction();

    loop {
        let Some((t_start, _)) = det.tracking().last_sample() else {
            return Ok(None);
        };
        let span = t_end - t_start;
        if span * dir <= 0.0 {
            return Ok(None);
        }

        // sub-intervals no wider than the check interval
        let n = ((span.abs() / max_check).ceil() as usize).max(1);
        let h = span / n as f64;

        let mut flip = None;
        for i in 1..=n {
            let tb = if i == n { t_end } else { t_start + i as f64 * h };
            let gb = det.sample(&provider.state_at(tb))?;
            let tracking = det.tracking_mut();

            if !tracking.arm_for(tb, threshold) {
                tracking.absorb_sample(tb, gb);
                continue;
            }

            let new_positive = tracking.sign_of(gb);
            if new_positive == tracking.is_positive() {
                tracking.record_sample(tb, gb);
                continue;
            }

            let increasing = tracking.crossing_is_increasing(new_positive);
            if !det.slope_selection().accepts(increasing) {
                trace!(detector = det.name(), t = tb, increasing, "crossing outside slope selection");
                det.tracking_mut().record_sample(tb, gb);
                continue;
            }

            flip = Some((tb, gb, increasing, new_positive));
            break;
        }

        let Some((tb, gb, increasing, after_positive)) = flip else {
            return Ok(None);
        };

        let (ta, ga) = det
            .tracking()
            .bracket_start()
            .ok_or_else(|| EventError::NotBracketed {
                detector: det.name().to_string(),
                lo: tb,
                hi: tb,
            })?;
        trace!(detector = det.name(), ta, tb, ga, gb, "bracketed sign change");

        let root = localize(det, provider, Bracket::new(ta, ga, tb, gb))?;
        let (t_after, g_after) = root.after_side(forward);
        let state = provider.state_at(root.t);

        if det.filter_event(&state, increasing, forward) {
            debug!(detector = det.name(), t = root.t, increasing, "crossing vetoed by filter");
            det.tracking_mut()
                .record_event(root.t, t_after, g_after, after_positive);
            continue;
        }

        debug!(
            detector = det.name(),
            t = root.t,
            increasing,
            iterations = root.iterations,
            "crossing localized"
        );
        return Ok(Some(Crossing {
            t: root.t,
            increasing,
            state,
            iterations: root.iterations,
            t_after,
            g_after,
            after_positive,
        }));
    }
}

fn localize<S, P>(det: &mut EventDetector<S>, provider: &P, bracket: Bracket) -> EventResult<Root>
where
    S: TrajectoryState,
    P: StateProvider<S> + ?Sized,
{
    let refiner = RootRefiner::new(det.threshold(), det.max_iteration_count());
    let result = refiner.refine(|t| det.sample(&provider.state_at(t)), bracket);
    result.map_err(|failure| match failure {
        RefineFailure::Evaluation(e) => e,
        RefineFailure::NotBracketed { lo, hi } => EventError::NotBracketed {
            detector: det.name().to_string(),
            lo,
            hi,
        },
        RefineFailure::MaxIterations {
            lo,
            hi,
            best,
            iterations,
        } => EventError::NonConvergence {
            detector: det.name().to_string(),
            lo,
            hi,
            best,
            iterations,
            last_resolved: None,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DetectorConfig, SlopeSelection};
    use approx::assert_abs_diff_eq;

    fn epoch(t: f64) -> Snapshot<f64> {
        Snapshot::Single(t)
    }

    fn sine(max_check: f64) -> EventDetector<f64> {
        EventDetector::from_fn(
            "sine",
            DetectorConfig::new(max_check, 1e-10).unwrap(),
            |t: &f64| t.sin(),
        )
    }

    #[test]
    fn finds_first_crossing_in_step() {
        let mut det = sine(0.5);
        det.init(&epoch(0.5), 10.0).unwrap();
        let c = next_crossing(&mut det, 10.0, &epoch).unwrap().unwrap();
        assert_abs_diff_eq!(c.t, std::f64::consts::PI, epsilon = 1e-10);
        assert!(!c.increasing);
        // tracking stays at the bracket start until the crossing is resolved
        let (t_last, _) = det.tracking().last_sample().unwrap();
        assert!(t_last < c.t);
    }

    #[test]
    fn no_crossing_leaves_tracking_at_step_end() {
        let mut det = sine(0.5);
        det.init(&epoch(0.5), 10.0).unwrap();
        assert!(next_crossing(&mut det, 2.0, &epoch).unwrap().is_none());
        assert_eq!(det.tracking().last_sample().unwrap().0, 2.0);
    }

    #[test]
    fn slope_selection_skips_excluded_direction() {
        let mut det = sine(0.5).with_slope(SlopeSelection::Increasing);
        det.init(&epoch(0.5), 10.0).unwrap();
        let c = next_crossing(&mut det, 10.0, &epoch).unwrap().unwrap();
        assert_abs_diff_eq!(c.t, 2.0 * std::f64::consts::PI, epsilon = 1e-10);
        assert!(c.increasing);
    }

    #[test]
    fn backward_scan_reports_physical_slope() {
        let mut det = sine(0.5);
        det.init(&epoch(4.0), 0.0).unwrap();
        let c = next_crossing(&mut det, 0.0, &epoch).unwrap().unwrap();
        assert_abs_diff_eq!(c.t, std::f64::consts::PI, epsilon = 1e-10);
        // sin decreases through π in physical time
        assert!(!c.increasing);
    }

    #[test]
    fn vetoed_crossing_is_skipped() {
        let mut det = sine(0.5).with_filter(|s: &Snapshot<f64>, _inc, _fwd| s.time() < 4.0);
        det.init(&epoch(0.5), 10.0).unwrap();
        let c = next_crossing(&mut det, 10.0, &epoch).unwrap().unwrap();
        assert_abs_diff_eq!(c.t, 2.0 * std::f64::consts::PI, epsilon = 1e-10);
        let vetoed = det.tracking().last_event().unwrap();
        assert_abs_diff_eq!(vetoed, std::f64::consts::PI, epsilon = 1e-10);
    }

    #[test]
    fn coarse_check_interval_misses_even_crossings() {
        // two roots inside one sampling interval cancel out
        let mut det = EventDetector::from_fn(
            "narrow",
            DetectorConfig::new(10.0, 1e-9).unwrap(),
            |t: &f64| (t - 4.0) * (t - 5.0),
        );
        det.init(&epoch(0.0), 10.0).unwrap();
        assert!(next_crossing(&mut det, 10.0, &epoch).unwrap().is_none());
    }

    #[test]
    fn non_convergence_is_reported_with_bracket() {
        let cfg = DetectorConfig::new(1.0, 1e-14)
            .unwrap()
            .with_max_iterations(1)
            .unwrap();
        let mut det = EventDetector::from_fn("slow", cfg, |t: &f64| t.powi(3) - 0.3);
        det.init(&epoch(0.0), 2.0).unwrap();
        let err = next_crossing(&mut det, 2.0, &epoch).unwrap_err();
        match err {
            EventError::NonConvergence { lo, hi, iterations, .. } => {
                assert_eq!(iterations, 1);
                assert!(lo <= 0.3_f64.cbrt() && 0.3_f64.cbrt() <= hi);
            }
            other => panic!("expected NonConvergence, got {other:?}"),
        }
    }
}
