//! Stock indicators for Cartesian orbits.
//!
//! All orbit indicators read an [`OrbitState<6>`] laid out as
//! `[x, y, z, vx, vy, vz]` in any consistent length and time units.

use crate::indicator::{Indicator, IndicatorError};
use crate::multi::multi_entity;
use crate::state::{OrbitState, TrajectoryState};

/// Cartesian orbit state
pub type Cartesian = OrbitState<6>;

fn position(s: &Cartesian) -> [f64; 3] {
    [s.y[0], s.y[1], s.y[2]]
}

fn velocity(s: &Cartesian) -> [f64; 3] {
    [s.y[3], s.y[4], s.y[5]]
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn norm(a: [f64; 3]) -> f64 {
    dot(a, a).sqrt()
}

fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

/// Radial velocity `r·v`.
///
/// Increasing crossings are periapsis passages, decreasing ones apoapsis
/// passages.
pub fn apside() -> Indicator<Cartesian> {
    Indicator::from_fn(|s: &Cartesian| dot(position(s), velocity(s)))
}

/// Out-of-plane coordinate `z`.
///
/// Increasing crossings are ascending nodes, decreasing ones descending nodes.
pub fn node() -> Indicator<Cartesian> {
    Indicator::from_fn(|s: &Cartesian| s.y[2])
}

/// Height above a spherical body minus `altitude`.
///
/// Increasing crossings are climbs through the altitude, decreasing ones
/// descents.
pub fn altitude(body_radius: f64, altitude: f64) -> Indicator<Cartesian> {
    let limit = body_radius + altitude;
    Indicator::from_fn(move |s: &Cartesian| norm(position(s)) - limit)
}

/// Elapsed time since `epoch`; a single increasing crossing at `epoch`.
pub fn epoch<S: TrajectoryState>(epoch: f64) -> Indicator<S> {
    Indicator::from_fn(move |s: &S| s.time() - epoch)
}

/// Angle subtended at `observer` by `a` and `b`, minus `angle` (radians).
///
/// Negative while the two appear closer than `angle`. Undefined, and
/// reported as a domain error, when either target coincides with the
/// observer.
pub fn angular_separation(observer: &str, a: &str, b: &str, angle: f64) -> Indicator<Cartesian> {
    multi_entity([observer, a, b], move |s: &[&Cartesian]| {
        let origin = position(s[0]);
        let u = sub(position(s[1]), origin);
        let v = sub(position(s[2]), origin);
        let (nu, nv) = (norm(u), norm(v));
        if nu == 0.0 || nv == 0.0 {
            return Err(IndicatorError::domain(
                "target coincides with observer, separation undefined",
            ));
        }
        let cos = (dot(u, v) / (nu * nv)).clamp(-1.0, 1.0);
        Ok(cos.acos() - angle)
    })
}
