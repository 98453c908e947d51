//! Per-detector configuration.

use crate::error::{EventError, EventResult};

/// Default maximum check interval [s]
pub const DEFAULT_MAX_CHECK: f64 = 600.0;

/// Default convergence threshold [s]
pub const DEFAULT_THRESHOLD: f64 = 1e-6;

/// Default maximum number of root refinement iterations
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

/// Which sign transitions a detector reacts to.
///
/// Directions are always physical-time directions: an increasing crossing
/// is one where `g` grows with time, whichever way the run propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlopeSelection {
    /// `g` goes from negative to positive
    Increasing,
    /// `g` goes from positive to negative
    Decreasing,
    /// Any crossing
    #[default]
    Both,
}

impl SlopeSelection {
    /// Whether a crossing in the given direction is visible.
    pub fn accepts(self, increasing: bool) -> bool {
        match self {
            SlopeSelection::Increasing => increasing,
            SlopeSelection::Decreasing => !increasing,
            SlopeSelection::Both => true,
        }
    }
}

/// Immutable detector parameters, validated on construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    max_check: f64,
    threshold: f64,
    max_iterations: usize,
    slope: SlopeSelection,
    remove_on_increasing: bool,
    remove_on_decreasing: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            max_check: DEFAULT_MAX_CHECK,
            threshold: DEFAULT_THRESHOLD,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            slope: SlopeSelection::Both,
            remove_on_increasing: false,
            remove_on_decreasing: false,
        }
    }
}

impl DetectorConfig {
    /// Create a configuration with the given sampling period and
    /// convergence threshold (both in seconds).
    ///
    /// Fails if either is non-positive or non-finite, or if the threshold
    /// is not strictly smaller than the check interval.
    pub fn new(max_check: f64, threshold: f64) -> EventResult<Self> {
        if !max_check.is_finite() || max_check <= 0.0 {
            return Err(EventError::configuration(format!(
                "max check interval must be positive and finite, got {max_check}"
            )));
        }
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(EventError::configuration(format!(
                "threshold must be positive and finite, got {threshold}"
            )));
        }
        if threshold >= max_check {
            return Err(EventError::configuration(format!(
                "threshold {threshold} must be smaller than max check interval {max_check}"
            )));
        }
        Ok(Self {
            max_check,
            threshold,
            ..Self::default()
        })
    }

    /// Set the root refinement iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> EventResult<Self> {
        if max_iterations == 0 {
            return Err(EventError::configuration(
                "max iteration count must be at least 1",
            ));
        }
        self.max_iterations = max_iterations;
        Ok(self)
    }

    /// Restrict the crossings the detector reacts to.
    pub fn with_slope(mut self, slope: SlopeSelection) -> Self {
        self.slope = slope;
        self
    }

    /// Deregister the detector after its first handled increasing crossing.
    pub fn remove_after_increasing(mut self) -> Self {
        self.remove_on_increasing = true;
        self
    }

    /// Deregister the detector after its first handled decreasing crossing.
    pub fn remove_after_decreasing(mut self) -> Self {
        self.remove_on_decreasing = true;
        self
    }

    /// Same parameters with a new sampling period and threshold.
    pub(crate) fn rescaled(self, max_check: f64, threshold: f64) -> EventResult<Self> {
        let base = Self::new(max_check, threshold)?;
        Ok(Self {
            max_check: base.max_check,
            threshold: base.threshold,
            ..self
        })
    }

    /// Maximum sampling period [s]
    pub fn max_check_interval(&self) -> f64 {
        self.max_check
    }

    /// Convergence threshold [s]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Root refinement iteration budget
    pub fn max_iteration_count(&self) -> usize {
        self.max_iterations
    }

    /// Slope selection
    pub fn slope_selection(&self) -> SlopeSelection {
        self.slope
    }

    /// Whether a handled crossing in this direction removes the detector.
    pub fn removes_after(&self, increasing: bool) -> bool {
        if increasing {
            self.remove_on_increasing
        } else {
            self.remove_on_decreasing
        }
    }
}
