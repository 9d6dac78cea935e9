//! Deterministic synthetic-data helpers for workspace test suites.
//!
//! Everything here avoids `thread_rng` and RNG-crate internals: pseudo-random
//! values come from a splitmix64 mix so synthetic datasets stay stable across
//! versions and platforms. Public to allow use across workspace tests, not
//! intended for production use.

use crate::math::{Iso3, Mat3, Pt3, Real, Vec2, Vec3};
use nalgebra::{Rotation3, Translation3, Vector3};

/// Generate a planar grid of 3D points (Z=0) with `nx * ny` points.
///
/// Points are ordered deterministically in row-major order (Y major).
pub fn grid_points(nx: usize, ny: usize, spacing: Real) -> Vec<Pt3> {
    let mut points = Vec::with_capacity(nx * ny);
    for j in 0..ny {
        for i in 0..nx {
            points.push(Pt3::new(i as Real * spacing, j as Real * spacing, 0.0));
        }
    }
    points
}

/// Generate a planar grid of 3D points (Z=0) centered on the origin.
pub fn centered_grid_points(nx: usize, ny: usize, spacing: Real) -> Vec<Pt3> {
    let cx = (nx as Real - 1.0) * spacing * 0.5;
    let cy = (ny as Real - 1.0) * spacing * 0.5;
    grid_points(nx, ny, spacing)
        .into_iter()
        .map(|p| Pt3::new(p.x - cx, p.y - cy, 0.0))
        .collect()
}

/// Deterministic pseudo-random pose with rotation angles in
/// `[-rot_amp, rot_amp]` (per Euler axis) and translation components in
/// `[-tra_amp, tra_amp]`.
pub fn sample_pose(seed: u64, rot_amp: Real, tra_amp: Real) -> Iso3 {
    let r = Vector3::new(
        unit(seed, 0) * rot_amp,
        unit(seed, 1) * rot_amp,
        unit(seed, 2) * rot_amp,
    );
    let t = Vector3::new(
        unit(seed, 3) * tra_amp,
        unit(seed, 4) * tra_amp,
        unit(seed, 5) * tra_amp,
    );
    Iso3::from_parts(
        Translation3::from(t),
        Rotation3::from_euler_angles(r.x, r.y, r.z).into(),
    )
}

/// Project a tracked point through one rig camera.
///
/// `rig_pose` maps target coordinates into the rig frame, `cam_pose` is the
/// camera's pose in the rig frame (camera-to-rig), and `kmtx` is the pinhole
/// intrinsic matrix. Returns `None` when the point lands behind the camera.
pub fn project_rig_point(kmtx: &Mat3, cam_pose: &Iso3, rig_pose: &Iso3, pw: &Pt3) -> Option<Vec2> {
    let p_rig = rig_pose.transform_point(pw);
    let p_cam = cam_pose.inverse_transform_point(&p_rig);
    if p_cam.z <= 1e-9 {
        return None;
    }
    let h = kmtx * Vec3::new(p_cam.x, p_cam.y, p_cam.z);
    Some(Vec2::new(h.x / h.z, h.y / h.z))
}

/// Deterministic uniform pixel noise in `[-max_abs_px, +max_abs_px]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformPixelNoise {
    /// Base seed controlling the pseudo-random sequence.
    pub seed: u64,
    /// Maximum absolute per-axis noise (pixels).
    pub max_abs_px: Real,
}

impl UniformPixelNoise {
    /// Sample a deterministic 2D noise vector for a `(camera, point)` key.
    #[inline]
    pub fn sample(&self, cam_idx: usize, point_idx: usize) -> Vec2 {
        let max_abs = self.max_abs_px.abs();
        if max_abs == 0.0 {
            return Vec2::zeros();
        }

        let key = self.seed
            ^ (cam_idx as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
            ^ (point_idx as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        let du = (unit_from_bits(splitmix64(key)) * 2.0 - 1.0) * max_abs;
        let dv = (unit_from_bits(splitmix64(key ^ 0x94D0_49BB_1331_11EB)) * 2.0 - 1.0) * max_abs;
        Vec2::new(du, dv)
    }

    /// Apply deterministic noise to a pixel observation.
    #[inline]
    pub fn apply(&self, cam_idx: usize, point_idx: usize, uv: Vec2) -> Vec2 {
        uv + self.sample(cam_idx, point_idx)
    }
}

/// Signed unit sample in `[-1, 1]` for a `(seed, lane)` key.
fn unit(seed: u64, lane: u64) -> Real {
    let x = splitmix64(seed.wrapping_add(lane.wrapping_mul(0xD1B5_4A32_D192_ED03)));
    unit_from_bits(x) * 2.0 - 1.0
}

#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Top 53 bits to a double in `[0, 1)`; deterministic and platform-independent.
#[inline]
fn unit_from_bits(x: u64) -> Real {
    ((x >> 11) as Real) * (1.0 / ((1u64 << 53) as Real))
}
