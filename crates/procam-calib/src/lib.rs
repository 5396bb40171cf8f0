#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Camera models and the OpenGL-style camera parameter.
pub mod camera;

/// Image/object point correspondences.
pub mod correspondence;

/// Error types for the calibration solvers.
pub mod error;

/// Linear algebra utilities.
pub mod linalg;

/// Editable markers and recalibration tracking.
pub mod markers;

/// Perspective-n-point pose estimation and Levenberg-Marquardt refinement.
pub mod pnp;

/// Homography and pose solvers.
pub mod solver;

/// 3D rotation conversions.
pub mod transforms;

pub use camera::{CameraExtrinsics, CameraIntrinsics, CameraParam, ImageSize};
pub use correspondence::{Correspondence, CorrespondenceSet, SolveMode};
pub use error::CalibError;
pub use markers::{Marker, MarkerId, MarkerSet, MarkerState};
pub use solver::{
    solve_camera_param, solve_homography, solve_homography_with, solve_pose, HomographyOptions,
    HomographySolution, PoseMode, PoseOptions, PoseSolution, Solved, UnsetPolicy,
};
