//! Mathematical type definitions and rigid-transform helpers.
//!
//! This module provides the fundamental types used throughout the library
//! and the conversions between the two interchangeable rigid-transform
//! representations (quaternion + vector pose, homogeneous 4x4 matrix).

use nalgebra::{
    Isometry3, Matrix3, Matrix4, Matrix6, Point2, Point3, RealField, Rotation3, Translation3,
    UnitQuaternion, Vector2, Vector3, Vector6,
};

/// Scalar type used throughout the library (currently `f64`).
pub type Real = f64;

/// 2D vector with [`Real`] components.
pub type Vec2 = Vector2<Real>;
/// 3D vector with [`Real`] components.
pub type Vec3 = Vector3<Real>;
/// 6D vector with [`Real`] components.
pub type Vec6 = Vector6<Real>;
/// 2D point with [`Real`] coordinates.
pub type Pt2 = Point2<Real>;
/// 3D point with [`Real`] coordinates.
pub type Pt3 = Point3<Real>;
/// 3×3 matrix with [`Real`] entries.
pub type Mat3 = Matrix3<Real>;
/// 4×4 matrix with [`Real`] entries.
pub type Mat4 = Matrix4<Real>;
/// 6×6 matrix with [`Real`] entries.
pub type Mat6 = Matrix6<Real>;
/// 3D rigid transform (SE(3)) using [`Real`].
pub type Iso3 = Isometry3<Real>;
/// Unit quaternion with [`Real`] components.
pub type Quat = UnitQuaternion<Real>;

/// Rotation block of a homogeneous rigid transform.
pub fn rotation_block<T: RealField>(m: &Matrix4<T>) -> Matrix3<T> {
    m.fixed_view::<3, 3>(0, 0).into_owned()
}

/// Translation column of a homogeneous rigid transform.
pub fn translation_block<T: RealField>(m: &Matrix4<T>) -> Vector3<T> {
    m.fixed_view::<3, 1>(0, 3).into_owned()
}

/// Inverse of a homogeneous rigid transform.
///
/// Assumes the rotation block is orthonormal (the caller's invariant for
/// every pose entering this library) and uses `[Rᵀ, -Rᵀt]` instead of a
/// general matrix inversion.
pub fn rigid_inverse<T: RealField>(m: &Matrix4<T>) -> Matrix4<T> {
    let rot_t = rotation_block(m).transpose();
    let tra = rot_t.clone() * translation_block(m);

    let mut out = Matrix4::identity();
    out.fixed_view_mut::<3, 3>(0, 0).copy_from(&rot_t);
    out.fixed_view_mut::<3, 1>(0, 3).copy_from(&(-tra));
    out
}

/// Convert a pose into its homogeneous 4×4 matrix representation.
pub fn iso3_to_mat4(pose: &Iso3) -> Mat4 {
    pose.to_homogeneous()
}

/// Convert a homogeneous 4×4 matrix into a pose.
///
/// The rotation block must be orthonormal; the conversion is lossless for
/// matrices produced by [`iso3_to_mat4`].
pub fn mat4_to_iso3(m: &Mat4) -> Iso3 {
    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(
        rotation_block(m),
    ));
    Iso3::from_parts(Translation3::from(translation_block(m)), rot)
}
