#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Error types for reading and writing calibration files.
///
/// Defines [`error::PersistenceError`] variants for missing files, file access
/// and format errors.
pub mod error;

/// Text files holding the projection and modelview matrices.
///
/// See [`camera_param::write_camera_param`] and [`camera_param::read_camera_param`].
pub mod camera_param;

/// JSON marker documents.
pub mod markers;

pub use camera_param::{read_camera_param, write_camera_param};
pub use error::PersistenceError;
pub use markers::{read_markers, read_markers_into, write_markers, MarkerDocument};
