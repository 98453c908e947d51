//! Indicator functions: the scalar whose sign change signals an event.
//!
//! An indicator is built for exactly one state cardinality. Single-entity
//! indicators read one trajectory state; multi-entity indicators read a
//! mapping of entity identifiers to states. The cardinality is fixed at
//! construction and checked on every evaluation, so handing a detector the
//! wrong kind of state fails immediately instead of degrading.

use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::state::{Arity, EntityStates, Snapshot, TrajectoryState};

/// Failure reported by an indicator evaluation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndicatorError {
    /// The state lies outside the indicator's domain (e.g. a geometric degeneracy).
    #[error("{0}")]
    Domain(String),

    /// A multi-entity indicator needs an entity the snapshot does not carry.
    #[error("missing entity `{0}`")]
    MissingEntity(String),

    /// The indicator was handed a state of the wrong cardinality.
    #[error("expected a {expected} state, got a {found} one")]
    Arity {
        /// Arity the indicator was built for
        expected: Arity,
        /// Arity it was given
        found: Arity,
    },
}

impl IndicatorError {
    /// Domain failure with a message.
    pub fn domain(reason: impl Into<String>) -> Self {
        IndicatorError::Domain(reason.into())
    }
}

type SingleFn<S> = Rc<dyn Fn(&S) -> Result<f64, IndicatorError>>;
type MultiFn<S> = Rc<dyn Fn(&EntityStates<S>) -> Result<f64, IndicatorError>>;

/// A continuous scalar function of the trajectory state.
pub enum Indicator<S> {
    /// Reads a single trajectory
    Single(SingleFn<S>),
    /// Reads several trajectories jointly
    Multi(MultiFn<S>),
}

impl<S> Clone for Indicator<S> {
    fn clone(&self) -> Self {
        match self {
            Indicator::Single(f) => Indicator::Single(Rc::clone(f)),
            Indicator::Multi(f) => Indicator::Multi(Rc::clone(f)),
        }
    }
}

impl<S> fmt::Debug for Indicator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Indicator::Single(_) => write!(f, "Indicator::Single(..)"),
            Indicator::Multi(_) => write!(f, "Indicator::Multi(..)"),
        }
    }
}

impl<S: TrajectoryState> Indicator<S> {
    /// Single-entity indicator from a fallible closure.
    pub fn single<F>(f: F) -> Self
    where
        F: Fn(&S) -> Result<f64, IndicatorError> + 'static,
    {
        Indicator::Single(Rc::new(f))
    }

    /// Single-entity indicator from an infallible closure.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&S) -> f64 + 'static,
    {
        Indicator::Single(Rc::new(move |s| Ok(f(s))))
    }

    /// Multi-entity indicator from a fallible closure over all entity states.
    pub fn multi<F>(f: F) -> Self
    where
        F: Fn(&EntityStates<S>) -> Result<f64, IndicatorError> + 'static,
    {
        Indicator::Multi(Rc::new(f))
    }

    /// The cardinality this indicator was built for.
    pub fn arity(&self) -> Arity {
        match self {
            Indicator::Single(_) => Arity::Single,
            Indicator::Multi(_) => Arity::Multi,
        }
    }

    /// Evaluate the indicator.
    pub fn value(&self, snapshot: &Snapshot<S>) -> Result<f64, IndicatorError> {
        match (self, snapshot) {
            (Indicator::Single(f), Snapshot::Single(s)) => f(s),
            (Indicator::Multi(f), Snapshot::Multi(m)) => f(m),
            _ => Err(IndicatorError::Arity {
                expected: self.arity(),
                found: snapshot.arity(),
            }),
        }
    }

    /// Build a new indicator of the same arity whose value is `op` applied
    /// to the values of this one at (possibly transformed) snapshots.
    pub(crate) fn map_snapshot<F>(&self, op: F) -> Self
    where
        F: Fn(&dyn Fn(&Snapshot<S>) -> Result<f64, IndicatorError>, &Snapshot<S>)
                -> Result<f64, IndicatorError>
            + 'static,
    {
        let op = Rc::new(op);
        match self.clone() {
            Indicator::Single(inner) => {
                let eval = move |snap: &Snapshot<S>| match snap {
                    Snapshot::Single(s) => inner(s),
                    Snapshot::Multi(_) => Err(IndicatorError::Arity {
                        expected: Arity::Single,
                        found: Arity::Multi,
                    }),
                };
                Indicator::Single(Rc::new(move |s: &S| {
                    op(&eval, &Snapshot::Single(s.clone()))
                }))
            }
            Indicator::Multi(inner) => {
                let eval = move |snap: &Snapshot<S>| match snap {
                    Snapshot::Multi(m) => inner(m),
                    Snapshot::Single(_) => Err(IndicatorError::Arity {
                        expected: Arity::Multi,
                        found: Arity::Single,
                    }),
                };
                Indicator::Multi(Rc::new(move |m: &EntityStates<S>| {
                    op(&eval, &Snapshot::Multi(m.clone()))
                }))
            }
        }
    }
}
