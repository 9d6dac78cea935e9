mod handeye;
mod motion_pairs;
mod online_rotation;
mod planar_pose;

pub use handeye::*;
pub use motion_pairs::*;
pub use online_rotation::*;
pub use planar_pose::*;
