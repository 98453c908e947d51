//! Indicator algebra.
//!
//! Treating "indicator positive" as "condition holds", `all_of` is the
//! conjunction of several conditions (pointwise minimum) and `any_of` their
//! disjunction (pointwise maximum). Both stay continuous whenever the parts
//! are, so the combined indicator can be watched like any other.

use std::rc::Rc;

use crate::error::{EventError, EventResult};
use crate::indicator::{Indicator, IndicatorError};
use crate::state::{Arity, EntityStates, Snapshot, TrajectoryState};

/// Flip the sign of an indicator, swapping increasing and decreasing crossings.
pub fn negate<S: TrajectoryState>(indicator: &Indicator<S>) -> Indicator<S> {
    indicator.map_snapshot(|g, snap| Ok(-g(snap)?))
}

/// Positive when every part is positive.
pub fn all_of<S: TrajectoryState>(parts: Vec<Indicator<S>>) -> EventResult<Indicator<S>> {
    combine("all_of", parts, f64::min)
}

/// Positive when at least one part is positive.
pub fn any_of<S: TrajectoryState>(parts: Vec<Indicator<S>>) -> EventResult<Indicator<S>> {
    combine("any_of", parts, f64::max)
}

fn combine<S: TrajectoryState>(
    label: &str,
    parts: Vec<Indicator<S>>,
    pick: fn(f64, f64) -> f64,
) -> EventResult<Indicator<S>> {
    let Some(arity) = parts.first().map(Indicator::arity) else {
        return Err(EventError::configuration(format!(
            "{label} needs at least one indicator"
        )));
    };
    if let Some(odd) = parts.iter().find(|p| p.arity() != arity) {
        return Err(EventError::ContractMismatch {
            detector: label.to_string(),
            expected: arity,
            found: odd.arity(),
        });
    }

    let parts: Rc<[Indicator<S>]> = parts.into();
    let fold = move |snap: &Snapshot<S>| -> Result<f64, IndicatorError> {
        let mut acc: Option<f64> = None;
        for part in parts.iter() {
            let g = part.value(snap)?;
            acc = Some(acc.map_or(g, |a| pick(a, g)));
        }
        Ok(acc.unwrap_or_default())
    };

    Ok(match arity {
        Arity::Single => Indicator::single(move |s: &S| fold(&Snapshot::Single(s.clone()))),
        Arity::Multi => {
            Indicator::multi(move |m: &EntityStates<S>| fold(&Snapshot::Multi(m.clone())))
        }
    })
}
