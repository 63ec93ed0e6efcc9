pub mod geometry;
pub mod keypoint;

pub use keypoint::{Frame, Keypoint, LandmarkId, Pose};
