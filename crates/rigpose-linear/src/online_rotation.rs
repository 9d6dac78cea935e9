//! Online rotation-only hand-eye estimation.
//!
//! Incremental variant of the batch rotation stage in [`crate::handeye`]:
//! given a stream of relative-rotation pairs `(a, b)` with `a·x = x·b`, the
//! estimator maintains a running estimate of `x` without retaining history.

use log::debug;
use nalgebra::Quaternion;
use rigpose_core::{skew, Mat3, Quat, Vec3};

/// Recursive rotation-only hand-eye estimator.
///
/// Each measurement folds the linearized constraint
/// `skew(v_a + v_b) · p = v_b - v_a` (with `p` the quaternion vector part of
/// `x` over its scalar part) into an information-form accumulator of the
/// normal equations. [`Self::compute_result`] solves the accumulated 3×3
/// system on demand, so adding a measurement is O(1) and querying is
/// non-destructive.
///
/// The accumulated system is exactly the batch rotation stage's, so the
/// estimate converges to what a batch solve over the same stream yields.
///
/// Not safe for concurrent mutation; wrap in external synchronization when
/// shared across threads.
#[derive(Debug, Clone, Default)]
pub struct OnlineRotationEstimator {
    info: Mat3,
    rhs: Vec3,
    measurements: usize,
}

impl OnlineRotationEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one relative-rotation pair into the running state.
    ///
    /// `a` and `b` are the relative motions of the two sensor frames over
    /// the same interval.
    pub fn add_measurement(&mut self, a: &Quat, b: &Quat) {
        let va = positive_vector(a);
        let vb = positive_vector(b);

        let jac = skew(&(va + vb));
        let res = vb - va;

        self.info += jac.transpose() * jac;
        self.rhs += jac.transpose() * res;
        self.measurements += 1;
    }

    /// Number of measurements folded in so far.
    pub fn measurement_count(&self) -> usize {
        self.measurements
    }

    /// Current estimate of `x`.
    ///
    /// Returns the identity quaternion until the accumulated system
    /// constrains the estimate; under-determined states (fewer than two
    /// independent rotation axes) resolve to the minimum-norm solution,
    /// which is the rotation closest to identity satisfying the stream.
    pub fn compute_result(&self) -> Quat {
        if self.measurements == 0 {
            return Quat::identity();
        }

        let p = match self.info.cholesky() {
            Some(chol) => chol.solve(&self.rhs),
            // Singular information matrix: fall back to the pseudo-inverse.
            None => match self.info.svd(true, true).solve(&self.rhs, 1e-12) {
                Ok(p) => p,
                Err(err) => {
                    debug!("online rotation solve failed ({err}), returning identity");
                    return Quat::identity();
                }
            },
        };

        Quat::from_quaternion(Quaternion::from_parts(1.0, p))
    }
}

/// Quaternion vector part, sign-normalized to a non-negative scalar part.
///
/// The batch extraction forces `w ≥ 0`; the stream must agree on the sign
/// convention or antipodal inputs would cancel instead of reinforce.
fn positive_vector(q: &Quat) -> Vec3 {
    if q.w < 0.0 {
        -q.imag()
    } else {
        q.imag()
    }
}
