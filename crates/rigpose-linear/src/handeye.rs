//! Hand-eye calibration (AX = XB) via decoupled two-stage least squares
//! (Tsai–Lenz family).
//!
//! Recovers the fixed rigid transform between two co-moving sensors from
//! paired relative-motion samples: first the rotation from a stacked linear
//! system over quaternion vector parts, then the translation reusing the
//! estimated rotation.

use crate::motion_pairs::{build_motion_pairs, MotionPair, PairingMode};
use log::debug;
use nalgebra::{
    DMatrix, DVector, Matrix3, Matrix4, Quaternion, RealField, Translation3, UnitQuaternion,
    Vector3,
};
use rigpose_core::{iso3_to_mat4, rotation_block, skew, translation_block, Iso3};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HandEyeError {
    #[error("hand/eye sequence lengths do not match: {hand} vs {eye}")]
    SizeMismatch { hand: usize, eye: usize },
    #[error("hand-eye calibration failed: {0}")]
    CalibrationFailed(&'static str),
}

/// Estimate the fixed transform `X` between two rigidly linked sensors from
/// synchronized pose sequences, solving `H·X = X·E` over relative motions.
///
/// Sequences of two or fewer samples return the identity pose as an
/// insufficient-data sentinel rather than an error; mismatched lengths fail
/// with [`HandEyeError::SizeMismatch`].
pub fn estimate_handeye(
    hand: &[Iso3],
    eye: &[Iso3],
    use_all_pairs: bool,
) -> Result<Iso3, HandEyeError> {
    if hand.len() != eye.len() {
        return Err(HandEyeError::SizeMismatch {
            hand: hand.len(),
            eye: eye.len(),
        });
    }
    if hand.len() <= 2 {
        debug!(
            "hand-eye: only {} samples, returning identity sentinel",
            hand.len()
        );
        return Ok(Iso3::identity());
    }

    let hand_m: Vec<_> = hand.iter().map(iso3_to_mat4).collect();
    let eye_m: Vec<_> = eye.iter().map(iso3_to_mat4).collect();

    let (rot, tra) = estimate_handeye_matrices(
        &hand_m,
        &eye_m,
        PairingMode::from_all_pairs_flag(use_all_pairs),
    )?;
    Ok(Iso3::from_parts(Translation3::from(tra), rot))
}

/// Generic core of [`estimate_handeye`] operating on homogeneous matrices.
///
/// Works for any scalar precision; the pose-based entry point is a thin
/// adapter over this routine.
pub fn estimate_handeye_matrices<T: RealField>(
    hand: &[Matrix4<T>],
    eye: &[Matrix4<T>],
    mode: PairingMode,
) -> Result<(UnitQuaternion<T>, Vector3<T>), HandEyeError> {
    if hand.len() != eye.len() {
        return Err(HandEyeError::SizeMismatch {
            hand: hand.len(),
            eye: eye.len(),
        });
    }
    if hand.len() <= 2 {
        let identity = UnitQuaternion::new_unchecked(Quaternion::new(
            T::one(),
            T::zero(),
            T::zero(),
            T::zero(),
        ));
        return Ok((identity, Vector3::zeros()));
    }

    let pairs = build_motion_pairs(hand, eye, mode);
    debug!(
        "hand-eye: {} samples, {} motion pairs ({:?})",
        hand.len(),
        pairs.len(),
        mode
    );

    let rot = solve_rotation(&pairs)?;
    let tra = solve_translation(&pairs, &rot)?;

    let [x, y, z, w] = quaternion_from_rotation(&rot);
    Ok((
        UnitQuaternion::new_unchecked(Quaternion::new(w, x, y, z)),
        tra,
    ))
}

/// Rotation stage: stack `skew(p_h + p_e) · x = p_e - p_h` over all pairs,
/// solve by dense least squares, and rebuild the rotation matrix from the
/// renormalized solution.
fn solve_rotation<T: RealField>(pairs: &[MotionPair<T>]) -> Result<Matrix3<T>, HandEyeError> {
    let mut lhs = DMatrix::<T>::zeros(3 * pairs.len(), 3);
    let mut rhs = DVector::<T>::zeros(3 * pairs.len());

    for (idx, pair) in pairs.iter().enumerate() {
        let ph = quat_vector(&rotation_block(&pair.hand));
        let pe = quat_vector(&rotation_block(&pair.eye));

        lhs.view_mut((3 * idx, 0), (3, 3))
            .copy_from(&skew(&(ph.clone() + pe.clone())));
        rhs.rows_mut(3 * idx, 3).copy_from(&(pe - ph));
    }

    let x = solve_least_squares(lhs, rhs)?;
    Ok(rotation_from_quat_solution(&x))
}

/// Translation stage: with the rotation `R` fixed, stack
/// `(R_h - I) · t = R·t_e - t_h` over all pairs and solve.
fn solve_translation<T: RealField>(
    pairs: &[MotionPair<T>],
    rot: &Matrix3<T>,
) -> Result<Vector3<T>, HandEyeError> {
    let mut lhs = DMatrix::<T>::zeros(3 * pairs.len(), 3);
    let mut rhs = DVector::<T>::zeros(3 * pairs.len());

    for (idx, pair) in pairs.iter().enumerate() {
        let rot_h = rotation_block(&pair.hand);
        let tra_h = translation_block(&pair.hand);
        let tra_e = translation_block(&pair.eye);

        lhs.view_mut((3 * idx, 0), (3, 3))
            .copy_from(&(rot_h - Matrix3::identity()));
        rhs.rows_mut(3 * idx, 3).copy_from(&(rot * tra_e - tra_h));
    }

    solve_least_squares(lhs, rhs)
}

/// Dense least squares for the stacked `3P×3` systems via SVD.
///
/// Rank deficiency (degenerate motion, e.g. no rotation or parallel axes
/// only) is surfaced as [`HandEyeError::CalibrationFailed`].
fn solve_least_squares<T: RealField>(
    lhs: DMatrix<T>,
    rhs: DVector<T>,
) -> Result<Vector3<T>, HandEyeError> {
    let svd = lhs.svd(true, true);

    let mut s_max = T::zero();
    let mut s_min = T::max_value().unwrap_or_else(T::one);
    for s in svd.singular_values.iter() {
        if *s > s_max {
            s_max = s.clone();
        }
        if *s < s_min {
            s_min = s.clone();
        }
    }
    if s_min <= s_max.clone() * T::from_f64(1e-12).unwrap() {
        return Err(HandEyeError::CalibrationFailed(
            "rank-deficient stacked system",
        ));
    }

    let x = svd
        .solve(&rhs, T::from_f64(1e-15).unwrap())
        .map_err(|_| HandEyeError::CalibrationFailed("least-squares solve failed"))?;

    Ok(Vector3::new(x[0].clone(), x[1].clone(), x[2].clone()))
}

/// Full quaternion `[x, y, z, w]` (scalar part last, forced non-negative)
/// from an orthonormal rotation matrix.
///
/// Evaluates all four diagonal trace combinations and divides by the
/// largest, keeping the extraction away from a near-zero divisor for every
/// trace-sign branch.
fn quaternion_from_rotation<T: RealField>(r: &Matrix3<T>) -> [T; 4] {
    let one = T::one();
    let quarter = T::from_f64(0.25).unwrap();

    let r00 = r[(0, 0)].clone();
    let r11 = r[(1, 1)].clone();
    let r22 = r[(2, 2)].clone();

    // Squared quaternion components from the diagonal.
    let q = [
        (one.clone() + r00.clone() + r11.clone() + r22.clone()) * quarter.clone(),
        (one.clone() + r00.clone() - r11.clone() - r22.clone()) * quarter.clone(),
        (one.clone() - r00.clone() + r11.clone() - r22.clone()) * quarter.clone(),
        (one - r00 - r11 + r22) * quarter.clone(),
    ];

    let mut c = 0;
    for i in 1..4 {
        if q[c] < q[i] {
            c = i;
        }
    }

    // Off-diagonal products: [wx, wy, wz, xy, xz, yz].
    let qoff = [
        (r[(2, 1)].clone() - r[(1, 2)].clone()) * quarter.clone(),
        (r[(0, 2)].clone() - r[(2, 0)].clone()) * quarter.clone(),
        (r[(1, 0)].clone() - r[(0, 1)].clone()) * quarter.clone(),
        (r[(1, 0)].clone() + r[(0, 1)].clone()) * quarter.clone(),
        (r[(0, 2)].clone() + r[(2, 0)].clone()) * quarter.clone(),
        (r[(2, 1)].clone() + r[(1, 2)].clone()) * quarter,
    ];

    let (w, x, y, z) = match c {
        0 => {
            let w = q[0].clone().sqrt();
            (
                w.clone(),
                qoff[0].clone() / w.clone(),
                qoff[1].clone() / w.clone(),
                qoff[2].clone() / w,
            )
        }
        1 => {
            let x = q[1].clone().sqrt();
            (
                qoff[0].clone() / x.clone(),
                x.clone(),
                qoff[3].clone() / x.clone(),
                qoff[4].clone() / x,
            )
        }
        2 => {
            let y = q[2].clone().sqrt();
            (
                qoff[1].clone() / y.clone(),
                qoff[3].clone() / y.clone(),
                y.clone(),
                qoff[5].clone() / y,
            )
        }
        _ => {
            let z = q[3].clone().sqrt();
            (
                qoff[2].clone() / z.clone(),
                qoff[4].clone() / z.clone(),
                qoff[5].clone() / z.clone(),
                z,
            )
        }
    };

    if w < T::zero() {
        [-x, -y, -z, -w]
    } else {
        [x, y, z, w]
    }
}

/// Vector part of the quaternion of a rotation matrix.
fn quat_vector<T: RealField>(r: &Matrix3<T>) -> Vector3<T> {
    let [x, y, z, _] = quaternion_from_rotation(r);
    Vector3::new(x, y, z)
}

/// Rebuild the rotation matrix from the least-squares solution `x`.
///
/// `x` is first renormalized into a proper quaternion vector part,
/// `p = 2x / √(1 + |x|²)`, then expanded with
/// `R = (1 - |p|²/2)·I + ½(p·pᵀ + √(4 - |p|²)·skew(p))`.
fn rotation_from_quat_solution<T: RealField>(x: &Vector3<T>) -> Matrix3<T> {
    let one = T::one();
    let half = T::from_f64(0.5).unwrap();

    let divisor = (one.clone() + x.norm_squared()).sqrt();
    let p = x * (T::from_f64(2.0).unwrap() / divisor);

    let len = p.norm_squared();
    let alpha = (T::from_f64(4.0).unwrap() - len.clone()).sqrt();

    let diagonal = Matrix3::identity() * (one - len * half.clone());
    let off = (&p * p.transpose() + skew(&p) * alpha) * half;
    diagonal + off
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Rotation3;
    use std::f64::consts::PI;

    fn angle_between(r: &Matrix3<f64>, rot: &Rotation3<f64>) -> f64 {
        let diff = r.transpose() * rot.matrix();
        ((diff.trace() - 1.0) * 0.5).clamp(-1.0, 1.0).acos()
    }

    #[test]
    fn quaternion_extraction_is_stable_on_all_branches() {
        // One rotation per extraction branch: near-identity plus half-turns
        // about each axis, where the naive trace formula divides by ~0.
        let cases = [
            Rotation3::from_euler_angles(0.01, -0.02, 0.015),
            Rotation3::from_axis_angle(&Vector3::x_axis(), PI - 1e-4),
            Rotation3::from_axis_angle(&Vector3::y_axis(), PI - 1e-4),
            Rotation3::from_axis_angle(&Vector3::z_axis(), PI - 1e-4),
            Rotation3::from_axis_angle(&Vector3::x_axis(), PI),
            Rotation3::from_axis_angle(&Vector3::y_axis(), PI),
            Rotation3::from_axis_angle(&Vector3::z_axis(), PI),
        ];

        for rot in &cases {
            let [x, y, z, w] = quaternion_from_rotation(rot.matrix());
            assert!(x.is_finite() && y.is_finite() && z.is_finite() && w.is_finite());
            assert!(w >= 0.0);

            let norm = (w * w + x * x + y * y + z * z).sqrt();
            assert!((norm - 1.0).abs() < 1e-9, "not unit norm: {}", norm);

            let q = UnitQuaternion::from_quaternion(Quaternion::new(w, x, y, z));
            let rebuilt = q.to_rotation_matrix().into_inner();
            assert!(
                angle_between(&rebuilt, rot) < 1e-6,
                "extraction lost the rotation"
            );
        }
    }

    #[test]
    fn rotation_reconstruction_inverts_extraction() {
        let rot = Rotation3::from_euler_angles(0.4, -0.7, 1.2);
        let [x, y, z, w] = quaternion_from_rotation(rot.matrix());

        // The solver's unknown is v/w; reconstruction must undo the scaling.
        let solution = Vector3::new(x / w, y / w, z / w);
        let rebuilt = rotation_from_quat_solution(&solution);

        assert!(angle_between(&rebuilt, &rot) < 1e-10);
    }

    #[test]
    fn short_sequences_return_identity_sentinel() {
        let poses = vec![Iso3::identity(), Iso3::translation(1.0, 0.0, 0.0)];

        let result = estimate_handeye(&poses, &poses, true).unwrap();

        assert_eq!(result.translation.vector, Vector3::zeros());
        assert!(result.rotation.angle() < 1e-15);
    }

    #[test]
    fn mismatched_lengths_fail() {
        let three = vec![Iso3::identity(); 3];
        let four = vec![Iso3::identity(); 4];

        match estimate_handeye(&three, &four, false) {
            Err(HandEyeError::SizeMismatch { hand: 3, eye: 4 }) => {}
            other => panic!("expected SizeMismatch, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn degenerate_motion_is_a_calibration_failure() {
        // Identical poses carry no rotation information at all.
        let poses = vec![Iso3::translation(0.1, 0.2, 0.3); 4];

        match estimate_handeye(&poses, &poses, true) {
            Err(HandEyeError::CalibrationFailed(_)) => {}
            other => panic!("expected CalibrationFailed, got {:?}", other.map(|_| ())),
        }
    }
}
