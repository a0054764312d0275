pub mod keypoint;
pub mod observation;
pub mod source;

pub use keypoint::{Keypoint, KeypointIndex, Pose};
pub use observation::{BBox, PersonObservation, TrackId};
pub use source::PoseSource;
