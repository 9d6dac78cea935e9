//! Core math and geometry primitives for `rigpose-rs`.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Vec3`, `Iso3`, ...),
//! - rigid-transform conversions between the pose and homogeneous-matrix
//!   representations,
//! - the 6-parameter pose encoding used by the nonlinear refinement,
//! - [`ErrorPose`] (pose + 6x6 covariance),
//! - deterministic synthetic-data helpers shared by workspace test suites.

/// Linear algebra type aliases and rigid-transform helpers.
pub mod math;
/// Pose encodings and the error-pose type.
pub mod pose;
/// Deterministic synthetic targets, rigs and noise for tests.
pub mod synthetic;

pub use math::*;
pub use pose::*;
