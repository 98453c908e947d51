//! Error types for event detection.

use thiserror::Error;

use crate::state::Arity;

/// Failures of the event detection engine.
///
/// Every variant is fatal for the run in which it occurs. The engine never
/// retries: a root search that failed once fails again with the same inputs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventError {
    /// The indicator could not be computed at the requested state.
    #[error("indicator of `{detector}` cannot be evaluated at t = {t}: {reason}")]
    Evaluation {
        /// Detector name
        detector: String,
        /// Time of the offending state
        t: f64,
        /// Reason reported by the indicator
        reason: String,
    },

    /// The root refiner exhausted its iteration budget.
    #[error(
        "root of `{detector}` not localized after {iterations} iterations, \
         best bracket [{lo}, {hi}] (last resolved event: {last_resolved:?})"
    )]
    NonConvergence {
        /// Detector name
        detector: String,
        /// Lower end of the best known bracket
        lo: f64,
        /// Upper end of the best known bracket
        hi: f64,
        /// Best root estimate
        best: f64,
        /// Iterations performed
        iterations: usize,
        /// Time of the last event resolved before the failure
        last_resolved: Option<f64>,
    },

    /// A detector was queried with a state of the wrong cardinality.
    #[error("detector `{detector}` expects a {expected} state, got a {found} one")]
    ContractMismatch {
        /// Detector name
        detector: String,
        /// Arity the indicator was built for
        expected: Arity,
        /// Arity it was given
        found: Arity,
    },

    /// Invalid detector parameters.
    #[error("invalid detector configuration: {reason}")]
    Configuration {
        /// What is wrong
        reason: String,
    },

    /// The scanner handed the refiner an interval without a sign change.
    #[error("no sign change of `{detector}` in [{lo}, {hi}]")]
    NotBracketed {
        /// Detector name
        detector: String,
        /// Lower end of the interval
        lo: f64,
        /// Upper end of the interval
        hi: f64,
    },
}

impl EventError {
    pub(crate) fn configuration(reason: impl Into<String>) -> Self {
        EventError::Configuration {
            reason: reason.into(),
        }
    }

    /// Attach the last successfully resolved event time for diagnostics.
    pub(crate) fn with_last_resolved(self, last: Option<f64>) -> Self {
        match self {
            EventError::NonConvergence {
                detector,
                lo,
                hi,
                best,
                iterations,
                ..
            } => EventError::NonConvergence {
                detector,
                lo,
                hi,
                best,
                iterations,
                last_resolved: last,
            },
            other => other,
        }
    }
}

/// Convenience alias.
pub type EventResult<T> = Result<T, EventError>;
