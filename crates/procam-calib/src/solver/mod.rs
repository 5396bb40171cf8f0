//! Calibration solvers.
//!
//! The homography path maps the object plane to the image and re-lays the result
//! into a 4x4 transform. The pose path either calibrates focal length and pose
//! from a single view or, with a forced field of view, solves the pose alone.

mod homography;
pub use homography::*;

mod calibrate;
pub use calibrate::*;

mod pose;
pub use pose::*;

use serde::{Deserialize, Serialize};

use crate::correspondence::{CorrespondenceSet, SolveMode};
use crate::error::CalibError;

/// What the solvers do with correspondences whose object point is unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UnsetPolicy {
    /// Use every correspondence as given. An object point at the origin is a
    /// valid position, e.g. the corner of a planar target.
    #[default]
    Keep,
    /// Drop unset correspondences before counting and solving.
    Exclude,
    /// Fail with [`CalibError::IncompleteCorrespondence`] on the first unset one.
    Reject,
}

/// Notification that a solve consumed the correspondences of a given marker revision.
///
/// The solvers never touch marker state; hand this to
/// [`MarkerSet::mark_solved`](crate::markers::MarkerSet::mark_solved) to clear the
/// recalibration flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solved {
    /// Revision of the marker state the solve was computed from.
    pub revision: u64,
}

/// Apply the unset policy and the minimum count of `mode`.
pub(crate) fn prepare_correspondences(
    set: &CorrespondenceSet,
    mode: SolveMode,
    policy: UnsetPolicy,
) -> Result<CorrespondenceSet, CalibError> {
    let incomplete = set.incomplete_indices();

    let prepared = match (policy, incomplete.first()) {
        (_, None) => set.clone(),
        (UnsetPolicy::Keep, Some(_)) => {
            log::warn!(
                "solving with {} unset object point(s) at {:?}",
                incomplete.len(),
                incomplete
            );
            set.clone()
        }
        (UnsetPolicy::Exclude, Some(_)) => {
            log::debug!("excluding unset correspondences {:?}", incomplete);
            set.without_unset()
        }
        (UnsetPolicy::Reject, Some(&index)) => {
            return Err(CalibError::IncompleteCorrespondence { index })
        }
    };

    let required = mode.minimum_size();
    if prepared.len() < required {
        return Err(CalibError::InsufficientPoints {
            required,
            actual: prepared.len(),
        });
    }

    Ok(prepared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correspondence::Correspondence;

    fn set_with_unset() -> CorrespondenceSet {
        [
            Correspondence::new([0.0, 0.0], [0.0, 0.0, 0.0]),
            Correspondence::new([1.0, 0.0], [1.0, 0.0, 0.0]),
            Correspondence::new([1.0, 1.0], [1.0, 1.0, 0.0]),
            Correspondence::new([0.0, 1.0], [0.0, 1.0, 0.0]),
            Correspondence::new([0.5, 0.5], [0.5, 0.5, 0.0]),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_prepare_keep() -> Result<(), CalibError> {
        let prepared =
            prepare_correspondences(&set_with_unset(), SolveMode::Homography, UnsetPolicy::Keep)?;
        assert_eq!(prepared.len(), 5);
        Ok(())
    }

    #[test]
    fn test_prepare_exclude() -> Result<(), CalibError> {
        let prepared = prepare_correspondences(
            &set_with_unset(),
            SolveMode::Homography,
            UnsetPolicy::Exclude,
        )?;
        assert_eq!(prepared.len(), 4);
        assert!(prepared.is_complete());
        Ok(())
    }

    #[test]
    fn test_prepare_reject() {
        let result =
            prepare_correspondences(&set_with_unset(), SolveMode::Homography, UnsetPolicy::Reject);
        assert_eq!(result, Err(CalibError::IncompleteCorrespondence { index: 0 }));
    }

    #[test]
    fn test_prepare_counts_after_exclusion() {
        let mut set = set_with_unset();
        set.remove(4);
        let result = prepare_correspondences(&set, SolveMode::Homography, UnsetPolicy::Exclude);
        assert_eq!(
            result,
            Err(CalibError::InsufficientPoints {
                required: 4,
                actual: 3
            })
        );
    }
}
