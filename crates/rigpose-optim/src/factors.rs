//! Reprojection residual factor for rig-pose refinement.

use nalgebra::{DVector, Matrix3, RealField, Vector3};
use tiny_solver::factors::Factor;

/// Reprojection residual of one observed point in one camera.
///
/// The single parameter block is the rig pose encoded as
/// `[tx, ty, tz, rx, ry, rz]` (translation plus rotation logarithm); camera
/// geometry and the observation are fixed. The residual is the measured
/// pixel minus the projection of the point through
/// rig pose ∘ camera extrinsics ∘ intrinsics.
#[derive(Debug, Clone)]
pub struct RigReprojFactor {
    /// Observed 3D point (target coordinates).
    pub pw: [f64; 3],
    /// Measured pixel.
    pub uv: [f64; 2],
    /// Rig-to-camera rotation, row major.
    pub cam_rot: [[f64; 3]; 3],
    /// Rig-to-camera translation.
    pub cam_tra: [f64; 3],
    /// Intrinsic matrix, row major.
    pub kmtx: [[f64; 3]; 3],
}

impl RigReprojFactor {
    fn residual_generic<T: RealField>(&self, pose: &DVector<T>) -> DVector<T> {
        debug_assert_eq!(pose.len(), 6, "pose block must have 6 params");

        let tra = Vector3::new(pose[0].clone(), pose[1].clone(), pose[2].clone());
        let rot_log = Vector3::new(pose[3].clone(), pose[4].clone(), pose[5].clone());

        let pw = lift_vec3::<T>(&self.pw);
        let p_rig = rotate_by_log(&rot_log, &pw) + tra;

        let p_cam = lift_mat3::<T>(&self.cam_rot) * p_rig + lift_vec3::<T>(&self.cam_tra);
        let h = lift_mat3::<T>(&self.kmtx) * p_cam;

        let u = h[0].clone() / h[2].clone();
        let v = h[1].clone() / h[2].clone();

        let ru = T::from_f64(self.uv[0]).unwrap() - u;
        let rv = T::from_f64(self.uv[1]).unwrap() - v;
        nalgebra::dvector![ru, rv]
    }
}

impl<T: RealField> Factor<T> for RigReprojFactor {
    fn residual_func(&self, params: &[DVector<T>]) -> DVector<T> {
        debug_assert_eq!(params.len(), 1, "expected a single pose block");
        self.residual_generic(&params[0])
    }
}

/// Rotate `p` by the rotation vector `w` (Rodrigues), valid for dual-number
/// scalars so the engine can differentiate through it.
fn rotate_by_log<T: RealField>(w: &Vector3<T>, p: &Vector3<T>) -> Vector3<T> {
    let theta2 = w.norm_squared();

    // sin θ / θ and (1 - cos θ) / θ², with Taylor fallbacks near zero to
    // keep the derivatives finite.
    let (a, b) = if theta2 < T::from_f64(1e-14).unwrap() {
        let sixth = T::from_f64(1.0 / 6.0).unwrap();
        let half = T::from_f64(0.5).unwrap();
        let twenty_fourth = T::from_f64(1.0 / 24.0).unwrap();
        (
            T::one() - theta2.clone() * sixth,
            half - theta2.clone() * twenty_fourth,
        )
    } else {
        let theta = theta2.clone().sqrt();
        (
            theta.clone().sin() / theta.clone(),
            (T::one() - theta.clone().cos()) / theta2.clone(),
        )
    };

    let wxp = w.cross(p);
    let wxwxp = w.cross(&wxp);
    p + wxp * a + wxwxp * b
}

fn lift_vec3<T: RealField>(v: &[f64; 3]) -> Vector3<T> {
    Vector3::new(
        T::from_f64(v[0]).unwrap(),
        T::from_f64(v[1]).unwrap(),
        T::from_f64(v[2]).unwrap(),
    )
}

fn lift_mat3<T: RealField>(m: &[[f64; 3]; 3]) -> Matrix3<T> {
    Matrix3::from_fn(|r, c| T::from_f64(m[r][c]).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Rotation3, UnitQuaternion};

    #[test]
    fn rotate_by_log_matches_quaternion_exp() {
        let w = Vector3::new(0.4, -0.9, 0.3);
        let p = Vector3::new(1.0, 2.0, -0.5);

        let rotated = rotate_by_log(&w, &p);
        let expected = UnitQuaternion::from_scaled_axis(w) * p;

        assert!((rotated - expected).norm() < 1e-12);
    }

    #[test]
    fn rotate_by_log_is_smooth_near_zero() {
        let w = Vector3::new(1e-9, -1e-9, 1e-10);
        let p = Vector3::new(0.3, -0.2, 1.1);

        let rotated = rotate_by_log(&w, &p);

        assert!((rotated - p).norm() < 1e-8);
    }

    #[test]
    fn residual_vanishes_at_true_pose() {
        let rot = Rotation3::from_euler_angles(0.1, -0.2, 0.05);
        let tra = Vector3::new(0.3, -0.1, 0.4);

        let pw = Vector3::new(0.05, -0.02, 0.1);
        let p_rig = rot * pw + tra;
        let p_cam = p_rig + Vector3::new(0.0, 0.0, 1.5);

        let kmtx = [[800.0, 0.0, 640.0], [0.0, 780.0, 360.0], [0.0, 0.0, 1.0]];
        let u = 800.0 * p_cam.x / p_cam.z + 640.0;
        let v = 780.0 * p_cam.y / p_cam.z + 360.0;

        let factor = RigReprojFactor {
            pw: [pw.x, pw.y, pw.z],
            uv: [u, v],
            cam_rot: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            cam_tra: [0.0, 0.0, 1.5],
            kmtx,
        };

        let w = rot.scaled_axis();
        let pose = nalgebra::dvector![tra.x, tra.y, tra.z, w.x, w.y, w.z];
        let r = factor.residual_generic(&pose);

        assert!(r[0].abs() < 1e-10 && r[1].abs() < 1e-10);
    }
}
