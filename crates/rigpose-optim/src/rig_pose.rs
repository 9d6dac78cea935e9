//! Multi-camera rig-pose estimation.
//!
//! Estimates the 6-DOF pose of a tracked target from 2D observations in
//! several fixed, pre-calibrated cameras, with per-observation visibility
//! weights, optional initial pose, and an optional sub-range of the point
//! set (local bundles).

use crate::factors::RigReprojFactor;
use crate::solver::{self, DampedLsqOptions};
use log::{debug, trace};
use nalgebra::DVector;
use rigpose_core::{pose_from_params6, pose_to_params6, ErrorPose, Iso3, Mat3, Pt3, Real, Vec2};
use rigpose_linear::{estimate_planar_pnp, PnpError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Range;
use thiserror::Error;
use tiny_solver::problem::Problem;

#[derive(Debug, Error)]
pub enum RigPoseError {
    #[error("rig pose estimation requires at least 3 points, got {0}")]
    TooFewPoints(usize),
    #[error(
        "camera counts do not match: {points2d} observation sets, {weights} weight sets, \
         {poses} camera poses, {matrices} intrinsic matrices"
    )]
    CameraCountMismatch {
        points2d: usize,
        weights: usize,
        poses: usize,
        matrices: usize,
    },
    #[error("camera {camera}: expected {expected} observations and weights, got {observations}/{weights}")]
    ObservationLengthMismatch {
        camera: usize,
        expected: usize,
        observations: usize,
        weights: usize,
    },
    #[error("point range {start}..{end} out of bounds for {points} points")]
    RangeOutOfBounds {
        start: usize,
        end: usize,
        points: usize,
    },
    #[error("initial pose bootstrap failed: {0}")]
    BootstrapFailed(#[from] PnpError),
    #[error("damped least-squares solve failed")]
    SolveFailed,
}

/// Configuration for [`estimate_rig_pose`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RigPoseOptions {
    /// Minimum number of visible observations required in *every* camera.
    pub min_correspondences: usize,
    /// Damped least-squares engine settings.
    pub solver: DampedLsqOptions,
}

impl Default for RigPoseOptions {
    fn default() -> Self {
        Self {
            min_correspondences: 3,
            solver: DampedLsqOptions::default(),
        }
    }
}

/// Outcome of one rig-pose estimation call.
///
/// A discriminated result instead of a `(pose, weight = -1)` sentinel pair:
/// rejected calls carry their observation counts and can never be confused
/// with (or compared against) a real residual.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RigPoseEstimate {
    /// Refinement ran; `residual` is the summed squared pixel error at the
    /// optimum and doubles as an inverse-quality score for downstream
    /// weighting (lower is better).
    Estimated { pose: ErrorPose, residual: Real },
    /// Visibility gating rejected the call before optimization: some camera
    /// saw fewer than the required correspondences, or no camera saw the
    /// four points the bootstrap needs.
    InsufficientObservations {
        min_observed: usize,
        max_observed: usize,
    },
}

impl RigPoseEstimate {
    /// Estimated pose, if the call was not rejected.
    pub fn pose(&self) -> Option<&ErrorPose> {
        match self {
            Self::Estimated { pose, .. } => Some(pose),
            Self::InsufficientObservations { .. } => None,
        }
    }

    /// Residual of a successful estimate.
    pub fn residual(&self) -> Option<Real> {
        match self {
            Self::Estimated { residual, .. } => Some(*residual),
            Self::InsufficientObservations { .. } => None,
        }
    }

    pub fn is_estimated(&self) -> bool {
        matches!(self, Self::Estimated { .. })
    }
}

/// Estimate the rig pose of a tracked target from multi-camera observations.
///
/// * `points3d` — the `M` labeled reference points in target coordinates.
/// * `points2d[k][m]` / `weights[k][m]` — per-camera pixel observations and
///   visibility weights aligned with `points3d`; weight `0` marks the point
///   as not visible in that camera.
/// * `cam_poses[k]` — fixed pose of camera `k` in the rig frame
///   (camera-to-rig); projection applies its inverse.
/// * `cam_matrices[k]` — fixed 3×3 intrinsic matrix of camera `k`.
/// * `initial_pose` — optional seed; without it, a closed-form planar
///   homography solve on the most-observed camera bootstraps the pose.
/// * `range` — optional sub-range of point indices, for independently-posed
///   local bundles; `None` uses all points.
///
/// Input-shape violations fail with [`RigPoseError`]; too few visible
/// observations are reported by value as
/// [`RigPoseEstimate::InsufficientObservations`].
#[allow(clippy::too_many_arguments)]
pub fn estimate_rig_pose(
    points3d: &[Pt3],
    points2d: &[Vec<Vec2>],
    weights: &[Vec<Real>],
    cam_poses: &[Iso3],
    cam_matrices: &[Mat3],
    opts: &RigPoseOptions,
    initial_pose: Option<Iso3>,
    range: Option<Range<usize>>,
) -> Result<RigPoseEstimate, RigPoseError> {
    check_consistency(points3d, points2d, weights, cam_poses, cam_matrices)?;

    let range = range.unwrap_or(0..points3d.len());
    if range.start > range.end || range.end > points3d.len() {
        return Err(RigPoseError::RangeOutOfBounds {
            start: range.start,
            end: range.end,
            points: points3d.len(),
        });
    }

    let num_cameras = weights.len();

    // Filter to visible observations: flattened (local point, camera) list
    // plus per-camera 2D/3D arrays and observation counts.
    let mut observations: Vec<(usize, usize)> = Vec::new();
    let mut p2d_filtered: Vec<Vec<Vec2>> = vec![Vec::new(); num_cameras];
    let mut p3d_filtered: Vec<Vec<Pt3>> = vec![Vec::new(); num_cameras];
    let mut obs_count = vec![0usize; num_cameras];

    for cam in 0..num_cameras {
        for (local, global) in range.clone().enumerate() {
            if weights[cam][global] != 0.0 {
                trace!(
                    "observation: point {global} -> camera {cam}, weight={}, m={:?}",
                    weights[cam][global],
                    points2d[cam][global]
                );
                observations.push((local, cam));
                p2d_filtered[cam].push(points2d[cam][global]);
                p3d_filtered[cam].push(points3d[global]);
                obs_count[cam] += 1;
            }
        }
    }
    debug!("{} observations found", observations.len());

    let min_obs = obs_count.iter().copied().min().unwrap_or(0);
    let (max_cam, max_obs) = obs_count
        .iter()
        .copied()
        .enumerate()
        .max_by_key(|&(_, count)| count)
        .unwrap_or((0, 0));

    // Every camera must contribute at least the minimum, and the bootstrap
    // needs four points in the best camera when no seed was supplied.
    if observations.is_empty()
        || min_obs < opts.min_correspondences
        || (initial_pose.is_none() && max_obs < 4)
    {
        debug!(
            "not enough observations: min {min_obs} / max {max_obs} over {num_cameras} cameras"
        );
        return Ok(RigPoseEstimate::InsufficientObservations {
            min_observed: min_obs,
            max_observed: max_obs,
        });
    }

    let initial = match initial_pose {
        Some(pose) => pose,
        None => {
            debug!(
                "computing initial pose from camera {max_cam} with {max_obs} observations"
            );
            let cam_from_target = estimate_planar_pnp(
                &p3d_filtered[max_cam],
                &p2d_filtered[max_cam],
                &cam_matrices[max_cam],
            )?;
            cam_poses[max_cam] * cam_from_target
        }
    };
    trace!("initial pose {initial:?}");

    debug!(
        "optimizing pose over {num_cameras} cameras using {} observations",
        observations.len()
    );

    // One 2-residual block per observation, camera-major then point-minor.
    let mut problem = Problem::new();
    for cam in 0..num_cameras {
        let rig_to_cam = cam_poses[cam].inverse();
        let rot = rig_to_cam.rotation.to_rotation_matrix();
        let cam_rot: [[f64; 3]; 3] =
            std::array::from_fn(|r| std::array::from_fn(|c| rot.matrix()[(r, c)]));
        let cam_tra: [f64; 3] = rig_to_cam.translation.vector.into();
        let kmtx: [[f64; 3]; 3] =
            std::array::from_fn(|r| std::array::from_fn(|c| cam_matrices[cam][(r, c)]));

        for (pw, uv) in p3d_filtered[cam].iter().zip(&p2d_filtered[cam]) {
            let factor = RigReprojFactor {
                pw: [pw.x, pw.y, pw.z],
                uv: [uv.x, uv.y],
                cam_rot,
                cam_tra,
                kmtx,
            };
            problem.add_residual_block(2, &["rig_pose"], Box::new(factor), None);
        }
    }

    let params = pose_to_params6(&initial);
    let initial_values = HashMap::from([(
        "rig_pose".to_owned(),
        DVector::from_column_slice(params.as_slice()),
    )]);

    let (solution, residual) =
        solver::solve(&problem, initial_values, &opts.solver).map_err(|err| {
            debug!("rig pose solve failed: {err}");
            RigPoseError::SolveFailed
        })?;

    let solved = solution.get("rig_pose").ok_or(RigPoseError::SolveFailed)?;
    let pose = pose_from_params6(&nalgebra::Vector6::from_column_slice(solved.as_slice()));
    debug!("estimated pose {pose:?}, residual {residual:.3e}");

    // Isotropic covariance scaled by the residual: an approximate quality
    // measure, not a statistically derived covariance.
    Ok(RigPoseEstimate::Estimated {
        pose: ErrorPose::isotropic(pose, residual),
        residual,
    })
}

/// Estimate one pose per local bundle.
///
/// `bundle_sizes` partitions the point range into consecutive sub-targets
/// that share the camera rig but move independently. Each bundle is
/// estimated exactly like an [`estimate_rig_pose`] call with no initial
/// pose and the bundle's sub-range.
pub fn estimate_rig_pose_bundles(
    points3d: &[Pt3],
    points2d: &[Vec<Vec2>],
    weights: &[Vec<Real>],
    cam_poses: &[Iso3],
    cam_matrices: &[Mat3],
    opts: &RigPoseOptions,
    bundle_sizes: &[usize],
) -> Result<Vec<RigPoseEstimate>, RigPoseError> {
    check_consistency(points3d, points2d, weights, cam_poses, cam_matrices)?;

    debug!("processing {} local bundles", bundle_sizes.len());

    let mut estimates = Vec::with_capacity(bundle_sizes.len());
    let mut offset = 0usize;
    for (idx, &size) in bundle_sizes.iter().enumerate() {
        debug!("local bundle {idx}: {size} points at offset {offset}");

        let estimate = estimate_rig_pose(
            points3d,
            points2d,
            weights,
            cam_poses,
            cam_matrices,
            opts,
            None,
            Some(offset..offset + size),
        )?;
        estimates.push(estimate);
        offset += size;
    }

    Ok(estimates)
}

fn check_consistency(
    points3d: &[Pt3],
    points2d: &[Vec<Vec2>],
    weights: &[Vec<Real>],
    cam_poses: &[Iso3],
    cam_matrices: &[Mat3],
) -> Result<(), RigPoseError> {
    if points3d.len() < 3 {
        return Err(RigPoseError::TooFewPoints(points3d.len()));
    }
    if points2d.len() != weights.len()
        || points2d.len() != cam_poses.len()
        || points2d.len() != cam_matrices.len()
    {
        return Err(RigPoseError::CameraCountMismatch {
            points2d: points2d.len(),
            weights: weights.len(),
            poses: cam_poses.len(),
            matrices: cam_matrices.len(),
        });
    }
    for (camera, (obs, w)) in points2d.iter().zip(weights.iter()).enumerate() {
        if obs.len() != points3d.len() || w.len() != points3d.len() {
            return Err(RigPoseError::ObservationLengthMismatch {
                camera,
                expected: points3d.len(),
                observations: obs.len(),
                weights: w.len(),
            });
        }
    }
    Ok(())
}
