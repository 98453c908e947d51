//! Indicators over several independently propagated trajectories.
//!
//! A multi-entity indicator names the entities it reads. Every evaluation
//! looks them up in the [`EntityStates`] it is handed and fails with
//! [`IndicatorError::MissingEntity`] when one is absent. Such an indicator
//! can only ever be evaluated on a multi-entity snapshot; the detector
//! reports [`EventError::ContractMismatch`](crate::EventError::ContractMismatch)
//! otherwise.

use crate::indicator::{Indicator, IndicatorError};
use crate::state::{EntityStates, TrajectoryState};

/// Build a multi-entity indicator from a closure over the states of
/// `entities`, passed in the order they are listed.
///
/// ```
/// use astro_events::multi::multi_entity;
/// use astro_events::{EntityStates, Snapshot};
///
/// // time-like "states": the gap between two clocks
/// let gap = multi_entity(["a", "b"], |s: &[&f64]| Ok(s[0] - s[1]));
/// let snap = Snapshot::Multi(EntityStates::new(0.0).with("a", 3.0).with("b", 1.0));
/// assert_eq!(gap.value(&snap), Ok(2.0));
/// ```
pub fn multi_entity<S, I, F>(entities: I, f: F) -> Indicator<S>
where
    S: TrajectoryState,
    I: IntoIterator,
    I::Item: Into<String>,
    F: Fn(&[&S]) -> Result<f64, IndicatorError> + 'static,
{
    let ids: Vec<String> = entities.into_iter().map(Into::into).collect();
    Indicator::multi(move |states: &EntityStates<S>| {
        let selected = ids
            .iter()
            .map(|id| {
                states
                    .get(id)
                    .ok_or_else(|| IndicatorError::MissingEntity(id.clone()))
            })
            .collect::<Result<Vec<&S>, _>>()?;
        f(&selected)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectorConfig;
    use crate::detector::EventDetector;
    use crate::error::EventError;
    use crate::state::{Arity, Snapshot};

    fn gap() -> Indicator<f64> {
        multi_entity(["leader", "follower"], |s: &[&f64]| Ok(*s[0] - *s[1] - 1.0))
    }

    #[test]
    fn reads_entities_in_listed_order() {
        let snap = Snapshot::Multi(
            EntityStates::new(0.0)
                .with("follower", 2.0)
                .with("leader", 5.0),
        );
        assert_eq!(gap().arity(), Arity::Multi);
        assert_eq!(gap().value(&snap), Ok(2.0));
    }

    #[test]
    fn missing_entity_is_reported() {
        let snap = Snapshot::Multi(EntityStates::new(0.0).with("leader", 5.0));
        assert_eq!(
            gap().value(&snap),
            Err(IndicatorError::MissingEntity("follower".into()))
        );
        let det = EventDetector::new("gap", DetectorConfig::default(), gap());
        assert!(matches!(det.g(&snap), Err(EventError::Evaluation { .. })));
    }

    #[test]
    fn single_state_is_a_contract_mismatch() {
        let det = EventDetector::new("gap", DetectorConfig::default(), gap());
        assert!(matches!(
            det.g(&Snapshot::Single(1.0)),
            Err(EventError::ContractMismatch {
                expected: Arity::Multi,
                found: Arity::Single,
                ..
            })
        ));
    }
}
