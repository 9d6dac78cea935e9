//! Closed-form point-pose estimation from near-planar correspondences.
//!
//! This is the bootstrap used by the multi-camera refinement when no initial
//! pose is available: a DLT homography from plane coordinates to pixels,
//! decomposed against the intrinsic matrix into a camera-frame pose.

use log::debug;
use nalgebra::{DMatrix, Matrix3, Rotation3, Translation3, UnitQuaternion};
use rigpose_core::{Iso3, Mat3, Pt3, Real, Vec2, Vec3};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PnpError {
    #[error("need at least 4 point correspondences, got {0}")]
    NotEnoughPoints(usize),
    #[error("2d/3d correspondence counts do not match: {points2d} vs {points3d}")]
    CorrespondenceMismatch { points2d: usize, points3d: usize },
    #[error("degenerate correspondence geometry: {0}")]
    DegenerateGeometry(&'static str),
}

/// Estimate `H` such that `pixel ~ H · [u, v, 1]` from plane coordinates
/// using the DLT.
fn dlt_homography(plane: &[Vec2], image: &[Vec2]) -> Result<Mat3, PnpError> {
    let n = plane.len();

    let mut a = DMatrix::<Real>::zeros(2 * n, 9);
    for (i, (pw, pi)) in plane.iter().zip(image.iter()).enumerate() {
        let (x, y) = (pw.x, pw.y);
        let (u, v) = (pi.x, pi.y);

        let r0 = 2 * i;
        let r1 = 2 * i + 1;

        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    // Null vector of A via SVD (smallest singular value).
    let svd = a.svd(false, true);
    let v_t = svd
        .v_t
        .ok_or(PnpError::DegenerateGeometry("homography svd failed"))?;
    let h = v_t.row(v_t.nrows() - 1);

    let mut h_mat = Mat3::zeros();
    for r in 0..3 {
        for c in 0..3 {
            h_mat[(r, c)] = h[3 * r + c];
        }
    }

    let scale = h_mat[(2, 2)];
    if scale.abs() > f64::EPSILON {
        h_mat /= scale;
    }

    Ok(h_mat)
}

/// Decompose a plane-induced homography into a pose `T_C_P` given the
/// intrinsics `K`, assuming the points lie on `Z = 0` in plane coordinates.
pub fn pose_from_planar_homography(kmtx: &Mat3, hmtx: &Mat3) -> Result<Iso3, PnpError> {
    let k_inv = kmtx
        .try_inverse()
        .ok_or(PnpError::DegenerateGeometry("intrinsic matrix not invertible"))?;

    let k_inv_h1 = k_inv * hmtx.column(0);
    let k_inv_h2 = k_inv * hmtx.column(1);
    let h3 = hmtx.column(2).into_owned();

    let norm1 = k_inv_h1.norm();
    let norm2 = k_inv_h2.norm();
    if norm1 < f64::EPSILON || norm2 < f64::EPSILON {
        return Err(PnpError::DegenerateGeometry("homography column collapsed"));
    }
    let lambda = 1.0 / ((norm1 + norm2) * 0.5);

    let r1 = k_inv_h1 * lambda;
    let r2 = k_inv_h2 * lambda;
    let r3 = r1.cross(&r2);

    let mut r_mat = Matrix3::<Real>::zeros();
    r_mat.set_column(0, &r1);
    r_mat.set_column(1, &r2);
    r_mat.set_column(2, &r3);

    // Project onto SO(3) (polar decomposition via SVD).
    let svd = r_mat.svd(true, true);
    let u = svd
        .u
        .ok_or(PnpError::DegenerateGeometry("rotation svd failed"))?;
    let v_t = svd
        .v_t
        .ok_or(PnpError::DegenerateGeometry("rotation svd failed"))?;
    let mut r_orth = u * v_t;
    if r_orth.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r_orth = u_flipped * v_t;
    }

    let t_vec: Vec3 = k_inv * h3 * lambda;
    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r_orth));
    Ok(Iso3::from_parts(Translation3::from(t_vec), rot))
}

/// Closed-form pose of a near-planar 3D point set from its pixel
/// observations and the intrinsic matrix.
///
/// Fits a plane to the 3D points, expresses them in plane coordinates,
/// estimates the plane-to-image homography and decomposes it, then maps the
/// result back into the original 3D frame. Returns `T_C_W` (object
/// coordinates into the camera frame). Requires at least 4 correspondences.
pub fn estimate_planar_pnp(
    points3d: &[Pt3],
    points2d: &[Vec2],
    kmtx: &Mat3,
) -> Result<Iso3, PnpError> {
    if points3d.len() != points2d.len() {
        return Err(PnpError::CorrespondenceMismatch {
            points2d: points2d.len(),
            points3d: points3d.len(),
        });
    }
    if points3d.len() < 4 {
        return Err(PnpError::NotEnoughPoints(points3d.len()));
    }

    let n = points3d.len() as Real;
    let centroid = points3d
        .iter()
        .fold(Vec3::zeros(), |acc, p| acc + p.coords)
        / n;

    // Principal in-plane directions of the centered point cloud.
    let mut scatter = Mat3::zeros();
    for p in points3d {
        let d = p.coords - centroid;
        scatter += d * d.transpose();
    }
    let eig = scatter.symmetric_eigen();

    let mut order = [0usize, 1, 2];
    order.sort_by(|&i, &j| {
        eig.eigenvalues[j]
            .partial_cmp(&eig.eigenvalues[i])
            .expect("eigenvalues are finite")
    });
    let e1: Vec3 = eig.eigenvectors.column(order[0]).into_owned();
    let e2: Vec3 = eig.eigenvectors.column(order[1]).into_owned();
    if eig.eigenvalues[order[1]] < 1e-12 {
        return Err(PnpError::DegenerateGeometry("collinear 3d points"));
    }

    let plane: Vec<Vec2> = points3d
        .iter()
        .map(|p| {
            let d = p.coords - centroid;
            Vec2::new(d.dot(&e1), d.dot(&e2))
        })
        .collect();

    let hmtx = dlt_homography(&plane, points2d)?;
    let cam_from_plane = pose_from_planar_homography(kmtx, &hmtx)?;
    debug!(
        "planar pnp over {} correspondences, plane residual axis spread {:.3e}/{:.3e}",
        points3d.len(),
        eig.eigenvalues[order[1]],
        eig.eigenvalues[order[2]]
    );

    // Plane coordinates -> object coordinates.
    let e3 = e1.cross(&e2);
    let mut basis = Mat3::zeros();
    basis.set_column(0, &e1);
    basis.set_column(1, &e2);
    basis.set_column(2, &e3);
    let object_from_plane = Iso3::from_parts(
        Translation3::from(centroid),
        UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(basis)),
    );

    Ok(cam_from_plane * object_from_plane.inverse())
}
