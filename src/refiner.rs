//! Root refinement for bracketed sign changes.
//!
//! Brent's method: inverse quadratic interpolation and secant steps for
//! speed, guarded by bisection so the bracket always shrinks.
//!
//! The refiner always works on the bracket in increasing time order. A
//! crossing scanned backward therefore goes through exactly the same
//! arithmetic as the same crossing scanned forward, which keeps event times
//! symmetric under time reversal.
//!
//! Reference: Brent, R.P. (1973). "Algorithms for Minimization without
//! Derivatives". Prentice-Hall.

use tracing::trace;

/// An interval known to contain a sign change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bracket {
    /// Earlier end
    pub lo: f64,
    /// Later end
    pub hi: f64,
    /// Indicator at `lo`
    pub g_lo: f64,
    /// Indicator at `hi`
    pub g_hi: f64,
}

impl Bracket {
    /// Bracket from two samples given in any time order.
    pub fn new(ta: f64, ga: f64, tb: f64, gb: f64) -> Self {
        if ta <= tb {
            Self {
                lo: ta,
                hi: tb,
                g_lo: ga,
                g_hi: gb,
            }
        } else {
            Self {
                lo: tb,
                hi: ta,
                g_lo: gb,
                g_hi: ga,
            }
        }
    }
}

/// A localized root and the final bracket around it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Root {
    /// Best estimate of the crossing time
    pub t: f64,
    /// Indicator at `t`
    pub g: f64,
    /// Other end of the final bracket
    pub t_other: f64,
    /// Indicator at `t_other`
    pub g_other: f64,
    /// Iterations used
    pub iterations: usize,
}

impl Root {
    fn exact(t: f64) -> Self {
        Self {
            t,
            g: 0.0,
            t_other: t,
            g_other: 0.0,
            iterations: 0,
        }
    }

    /// Point of the final bracket lying past the crossing in scan order,
    /// with its indicator value.
    pub fn after_side(&self, forward: bool) -> (f64, f64) {
        if self.g == 0.0 {
            return (self.t, self.g);
        }
        let other_is_later = if forward {
            self.t_other > self.t
        } else {
            self.t_other < self.t
        };
        if other_is_later {
            (self.t_other, self.g_other)
        } else {
            (self.t, self.g)
        }
    }
}

/// Why a refinement failed.
#[derive(Debug, Clone, PartialEq)]
pub enum RefineFailure<E> {
    /// The indicator could not be evaluated
    Evaluation(E),
    /// The ends of the bracket have the same strict sign
    NotBracketed {
        /// Earlier end
        lo: f64,
        /// Later end
        hi: f64,
    },
    /// The iteration budget ran out
    MaxIterations {
        /// Earlier end of the best bracket
        lo: f64,
        /// Later end of the best bracket
        hi: f64,
        /// Best estimate
        best: f64,
        /// Iterations performed
        iterations: usize,
    },
}

/// Bracketing root solver with a time tolerance and an iteration budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RootRefiner {
    /// Bracket width below which a root counts as localized
    pub threshold: f64,
    /// Iteration budget
    pub max_iterations: usize,
}

impl RootRefiner {
    /// Create a refiner.
    pub fn new(threshold: f64, max_iterations: usize) -> Self {
        Self {
            threshold,
            max_iterations,
        }
    }

    /// Narrow `bracket` until it is no wider than the threshold.
    ///
    /// The returned root lies within the threshold of the true sign change.
    pub fn refine<F, E>(&self, mut f: F, bracket: Bracket) -> Result<Root, RefineFailure<E>>
    where
        F: FnMut(f64) -> Result<f64, E>,
    {
        let Bracket {
            lo: mut a,
            hi: mut b,
            g_lo: mut fa,
            g_hi: mut fb,
        } = bracket;

        if fa * fb > 0.0 {
            return Err(RefineFailure::NotBracketed { lo: a, hi: b });
        }
        if fa == 0.0 {
            return Ok(Root::exact(a));
        }
        if fb == 0.0 {
            return Ok(Root::exact(b));
        }

        if fa.abs() < fb.abs() {
            std::mem::swap(&mut a, &mut b);
            std::mem::swap(&mut fa, &mut fb);
        }

        let tol = self.threshold;
        let mut c = a;
        let mut fc = fa;
        let mut mflag = true;
        let mut d = b - a;

        for iter in 0..self.max_iterations {
            // b is kept as the best estimate
            if fa.abs() < fb.abs() {
                std::mem::swap(&mut a, &mut b);
                std::mem::swap(&mut fa, &mut fb);
            }

            if fb == 0.0 || (b - a).abs() <= tol {
                trace!(t = b, width = (b - a).abs(), iter, "root localized");
                return Ok(Root {
                    t: b,
                    g: fb,
                    t_other: a,
                    g_other: fa,
                    iterations: iter + 1,
                });
            }

            let s = if fa != fc && fb != fc && fa != fb {
                // inverse quadratic interpolation
                a * fb * fc / ((fa - fb) * (fa - fc))
                    + b * fa * fc / ((fb - fa) * (fb - fc))
                    + c * fa * fb / ((fc - fa) * (fc - fb))
            } else if fb != fa {
                // secant
                b - fb * (b - a) / (fb - fa)
            } else {
                (a + b) / 2.0
            };

            let use_bisection = (s - (3.0 * a + b) / 4.0) * (s - b) > 0.0
                || (mflag && (s - b).abs() >= (b - c).abs() / 2.0)
                || (!mflag && (s - b).abs() >= (c - d).abs() / 2.0)
                || (mflag && (b - c).abs() < tol)
                || (!mflag && (c - d).abs() < tol);

            let s = if use_bisection {
                mflag = true;
                (a + b) / 2.0
            } else {
                mflag = false;
                s
            };

            let fs = f(s).map_err(RefineFailure::Evaluation)?;
            d = c;
            c = b;
            fc = fb;

            if fa * fs < 0.0 {
                b = s;
                fb = fs;
            } else {
                a = s;
                fa = fs;
            }
        }

        Err(RefineFailure::MaxIterations {
            lo: a.min(b),
            hi: a.max(b),
            best: if fa.abs() < fb.abs() { a } else { b },
            iterations: self.max_iterations,
        })
    }
}
