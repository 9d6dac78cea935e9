//! High-level entry crate for the `rigpose-rs` toolbox.
//!
//! Two families of rigid-geometry estimates for a sensor/tracking rig:
//!
//! - **Hand-eye calibration** — recover the fixed rigid transform between
//!   two co-moving sensors from paired relative-motion sequences
//!   ([`linear::estimate_handeye`], [`linear::OnlineRotationEstimator`]).
//! - **Multi-camera rig-pose refinement** — estimate the 6-DOF pose of a
//!   target observed partially by several fixed, pre-calibrated cameras
//!   ([`optim::estimate_rig_pose`], [`optim::estimate_rig_pose_bundles`]).
//!
//! All entry points are pure synchronous functions of their inputs; results
//! are value types. See each crate for the algorithmic details.
//!
//! ```no_run
//! use rigpose::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let hand: Vec<Iso3> = /* poses of the first sensor */
//! # vec![];
//! let eye: Vec<Iso3> = /* synchronized poses of the second sensor */
//! # vec![];
//!
//! let x = estimate_handeye(&hand, &eye, /* use_all_pairs */ true)?;
//! println!("fixed transform: {x}");
//! # Ok(())
//! # }
//! ```

/// Core math types, pose encodings, and synthetic-data helpers.
pub mod core {
    pub use rigpose_core::*;
}

/// Closed-form solvers: hand-eye calibration, motion pairs, planar PnP.
pub mod linear {
    pub use rigpose_linear::*;
}

/// Nonlinear multi-camera rig-pose refinement.
pub mod optim {
    pub use rigpose_optim::*;
}

/// Convenient re-exports for common use cases.
pub mod prelude {
    pub use crate::core::{ErrorPose, Iso3, Mat3, Mat4, Pt3, Quat, Real, Vec2, Vec3};
    pub use crate::linear::{
        estimate_handeye, HandEyeError, OnlineRotationEstimator, PairingMode,
    };
    pub use crate::optim::{
        estimate_rig_pose, estimate_rig_pose_bundles, DampedLsqOptions, RigPoseError,
        RigPoseEstimate, RigPoseOptions,
    };
}
