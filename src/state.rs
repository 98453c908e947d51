//! Trajectory states exchanged between the propagation driver and the
//! event engine.
//!
//! Time is an `f64` number of seconds on whatever scale the caller
//! propagates on. The engine never compares times for equality; it works
//! on signed durations scaled by the propagation direction.

use std::collections::BTreeMap;
use std::fmt;

/// A time-stamped, immutable simulation state.
///
/// The engine treats states as opaque: it only needs their epoch and the
/// ability to extrapolate them a short distance in time.
pub trait TrajectoryState: Clone + fmt::Debug + 'static {
    /// Epoch of the state.
    fn time(&self) -> f64;

    /// Short-range extrapolation of the state by `dt` seconds.
    fn shifted_by(&self, dt: f64) -> Self;
}

/// A bare epoch is a valid trajectory state for purely time-driven indicators.
impl TrajectoryState for f64 {
    fn time(&self) -> f64 {
        *self
    }

    fn shifted_by(&self, dt: f64) -> Self {
        *self + dt
    }
}

/// State of a single propagated body: epoch, state vector, its time
/// derivative and named auxiliary channels (mass, attitude angles, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitState<const N: usize> {
    /// Epoch
    pub t: f64,
    /// State vector
    pub y: [f64; N],
    /// dy/dt at `t`, as last computed by the propagator
    pub ydot: [f64; N],
    channels: BTreeMap<String, f64>,
}

impl<const N: usize> OrbitState<N> {
    /// Create a state with a zero derivative and no channels.
    pub fn new(t: f64, y: [f64; N]) -> Self {
        Self {
            t,
            y,
            ydot: [0.0; N],
            channels: BTreeMap::new(),
        }
    }

    /// Attach the state derivative.
    pub fn with_derivative(mut self, ydot: [f64; N]) -> Self {
        self.ydot = ydot;
        self
    }

    /// Set an auxiliary channel, replacing any previous value.
    pub fn with_channel(mut self, name: impl Into<String>, value: f64) -> Self {
        self.channels.insert(name.into(), value);
        self
    }

    /// Read an auxiliary channel.
    pub fn channel(&self, name: &str) -> Option<f64> {
        self.channels.get(name).copied()
    }

    /// All auxiliary channels.
    pub fn channels(&self) -> &BTreeMap<String, f64> {
        &self.channels
    }

    /// Replace every auxiliary channel at once.
    pub fn with_channels(mut self, channels: BTreeMap<String, f64>) -> Self {
        self.channels = channels;
        self
    }
}

impl<const N: usize> TrajectoryState for OrbitState<N> {
    fn time(&self) -> f64 {
        self.t
    }

    /// First-order extrapolation along the stored derivative. Adequate for
    /// shifts that are short compared to the dynamics' time scale.
    fn shifted_by(&self, dt: f64) -> Self {
        let mut y = self.y;
        for (yi, di) in y.iter_mut().zip(self.ydot.iter()) {
            *yi += dt * di;
        }
        Self {
            t: self.t + dt,
            y,
            ydot: self.ydot,
            channels: self.channels.clone(),
        }
    }
}

/// States of several independently propagated entities at a common epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityStates<S> {
    t: f64,
    entities: BTreeMap<String, S>,
}

impl<S: TrajectoryState> EntityStates<S> {
    /// Create an empty set of entity states at epoch `t`.
    pub fn new(t: f64) -> Self {
        Self {
            t,
            entities: BTreeMap::new(),
        }
    }

    /// Add (or replace) the state of an entity.
    pub fn with(mut self, id: impl Into<String>, state: S) -> Self {
        self.insert(id, state);
        self
    }

    /// Add (or replace) the state of an entity.
    pub fn insert(&mut self, id: impl Into<String>, state: S) {
        self.entities.insert(id.into(), state);
    }

    /// State of entity `id`, if present.
    pub fn get(&self, id: &str) -> Option<&S> {
        self.entities.get(id)
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether no entity is present.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Iterate over `(id, state)` pairs in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &S)> {
        self.entities.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<S: TrajectoryState> TrajectoryState for EntityStates<S> {
    fn time(&self) -> f64 {
        self.t
    }

    fn shifted_by(&self, dt: f64) -> Self {
        Self {
            t: self.t + dt,
            entities: self
                .entities
                .iter()
                .map(|(k, v)| (k.clone(), v.shifted_by(dt)))
                .collect(),
        }
    }
}

/// Number of trajectories an indicator consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// One trajectory
    Single,
    /// A mapping of entity identifiers to trajectories
    Multi,
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Single => write!(f, "single-entity"),
            Arity::Multi => write!(f, "multi-entity"),
        }
    }
}

/// The value handed to detectors: either one state or a set of entity states.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot<S> {
    /// Single-trajectory run
    Single(S),
    /// Multi-trajectory run
    Multi(EntityStates<S>),
}

impl<S: TrajectoryState> Snapshot<S> {
    /// Epoch of the snapshot.
    pub fn time(&self) -> f64 {
        match self {
            Snapshot::Single(s) => s.time(),
            Snapshot::Multi(m) => m.time(),
        }
    }

    /// Extrapolate the snapshot by `dt`.
    pub fn shifted_by(&self, dt: f64) -> Self {
        match self {
            Snapshot::Single(s) => Snapshot::Single(s.shifted_by(dt)),
            Snapshot::Multi(m) => Snapshot::Multi(m.shifted_by(dt)),
        }
    }

    /// Arity of the snapshot.
    pub fn arity(&self) -> Arity {
        match self {
            Snapshot::Single(_) => Arity::Single,
            Snapshot::Multi(_) => Arity::Multi,
        }
    }

    /// The single state, if this is a single-trajectory snapshot.
    pub fn as_single(&self) -> Option<&S> {
        match self {
            Snapshot::Single(s) => Some(s),
            Snapshot::Multi(_) => None,
        }
    }

    /// The entity states, if this is a multi-trajectory snapshot.
    pub fn as_multi(&self) -> Option<&EntityStates<S>> {
        match self {
            Snapshot::Single(_) => None,
            Snapshot::Multi(m) => Some(m),
        }
    }
}

/// State interpolation over the step currently being scanned.
///
/// Only times inside the step are ever requested.
pub trait StateProvider<S: TrajectoryState> {
    /// State at time `t`.
    fn state_at(&self, t: f64) -> Snapshot<S>;
}

impl<S, F> StateProvider<S> for F
where
    S: TrajectoryState,
    F: Fn(f64) -> Snapshot<S>,
{
    fn state_at(&self, t: f64) -> Snapshot<S> {
        self(t)
    }
}
