//! Nonlinear multi-camera rig-pose refinement built on tiny-solver.
//!
//! The entry points in [`rig_pose`] estimate the 6-DOF pose of a tracked
//! target observed simultaneously (and partially) by several fixed,
//! pre-calibrated cameras, minimizing reprojection error with a damped
//! least-squares engine.

pub mod factors;
pub mod rig_pose;
pub mod solver;

pub use rig_pose::{
    estimate_rig_pose, estimate_rig_pose_bundles, RigPoseError, RigPoseEstimate, RigPoseOptions,
};
pub use solver::DampedLsqOptions;
