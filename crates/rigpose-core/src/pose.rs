//! Pose encodings for optimization and the error-pose result type.

use crate::math::{Iso3, Mat6, Real, Vec3, Vec6};
use nalgebra::{Matrix3, RealField, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Cross-product (skew-symmetric) matrix of a 3-vector.
pub fn skew<T: RealField>(v: &Vector3<T>) -> Matrix3<T> {
    Matrix3::new(
        T::zero(),
        -v.z.clone(),
        v.y.clone(),
        v.z.clone(),
        T::zero(),
        -v.x.clone(),
        -v.y.clone(),
        v.x.clone(),
        T::zero(),
    )
}

/// Encode a pose as the 6-parameter vector `[tx, ty, tz, rx, ry, rz]`.
///
/// The rotation part is the quaternion logarithm expressed as a rotation
/// vector (axis × angle). This encoding is unconstrained, which is what the
/// damped least-squares refinement iterates on.
pub fn pose_to_params6(pose: &Iso3) -> Vec6 {
    let t = pose.translation.vector;
    let w = pose.rotation.scaled_axis();
    Vec6::new(t.x, t.y, t.z, w.x, w.y, w.z)
}

/// Decode a 6-parameter vector back into a pose via the exponential map.
pub fn pose_from_params6(p: &Vec6) -> Iso3 {
    let rot = UnitQuaternion::from_scaled_axis(Vec3::new(p[3], p[4], p[5]));
    Iso3::from_parts(Translation3::new(p[0], p[1], p[2]), rot)
}

/// A pose together with a 6×6 covariance estimate.
///
/// Value type; produced fresh per call and never mutated after return.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPose {
    pub pose: Iso3,
    pub covariance: Mat6,
}

impl ErrorPose {
    pub fn new(pose: Iso3, covariance: Mat6) -> Self {
        Self { pose, covariance }
    }

    /// Build an error pose with an isotropic covariance `scale · I`.
    ///
    /// The refinement uses the final residual as `scale`. This is an
    /// approximation to rank the estimate against others, not a
    /// statistically derived covariance.
    pub fn isotropic(pose: Iso3, scale: Real) -> Self {
        Self {
            pose,
            covariance: Mat6::identity() * scale,
        }
    }
}
