use serde::{Deserialize, Serialize};

use super::{calibrate_single_view, prepare_correspondences, CalibrationFlags, Solved, UnsetPolicy};
use crate::camera::{CameraExtrinsics, CameraIntrinsics, CameraParam, ImageSize};
use crate::correspondence::{CorrespondenceSet, SolveMode};
use crate::error::CalibError;
use crate::pnp::{self, LMParams};

/// Field of view in degrees used to seed the focal length when none is forced.
pub const DEFAULT_FOV_DEG: f64 = 60.0;

/// Residual reported by the fixed-FOV path, kept for callers that compare against it.
pub const FIXED_FOV_RESIDUAL: f64 = 1.0;

/// Which pose path a solve took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoseMode {
    /// Focal length estimated together with the pose.
    FreeFocal,
    /// Focal length derived from a forced field of view, pose only.
    FixedFov,
}

/// Options for [`solve_pose`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseOptions {
    /// Vertical field of view in degrees. `0.0` estimates the focal length.
    pub forced_fov: f64,
    /// Principal point offset from the image center in pixels.
    pub lens_offset: [f64; 2],
    /// Handling of correspondences with an unset object point.
    pub unset_policy: UnsetPolicy,
    /// Levenberg-Marquardt parameters for the refinement.
    pub lm: LMParams,
}

impl Default for PoseOptions {
    fn default() -> Self {
        Self {
            forced_fov: 0.0,
            lens_offset: [0.0, 0.0],
            unset_policy: UnsetPolicy::default(),
            lm: LMParams::default(),
        }
    }
}

impl PoseOptions {
    /// Create default pose options: free focal length, no lens offset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Force the field of view in degrees, `0.0` to estimate the focal length.
    pub fn with_forced_fov(mut self, fov_deg: f64) -> Self {
        self.forced_fov = fov_deg;
        self
    }

    /// Set the lens offset in pixels.
    pub fn with_lens_offset(mut self, offset: [f64; 2]) -> Self {
        self.lens_offset = offset;
        self
    }

    /// Set the unset-point policy.
    pub fn with_unset_policy(mut self, policy: UnsetPolicy) -> Self {
        self.unset_policy = policy;
        self
    }

    /// Set the refinement parameters.
    pub fn with_lm_params(mut self, lm: LMParams) -> Self {
        self.lm = lm;
        self
    }

    /// The pose path these options select.
    pub fn mode(&self) -> PoseMode {
        if self.forced_fov == 0.0 {
            PoseMode::FreeFocal
        } else {
            PoseMode::FixedFov
        }
    }

    /// Field of view used for the seed focal length.
    pub fn seed_fov(&self) -> f64 {
        match self.mode() {
            PoseMode::FreeFocal => DEFAULT_FOV_DEG,
            PoseMode::FixedFov => self.forced_fov,
        }
    }
}

/// Result of a pose solve.
#[derive(Debug, Clone)]
pub struct PoseSolution {
    /// Camera intrinsics.
    pub intrinsics: CameraIntrinsics,
    /// Camera pose.
    pub extrinsics: CameraExtrinsics,
    /// RMS reprojection error for [`PoseMode::FreeFocal`], [`FIXED_FOV_RESIDUAL`]
    /// for [`PoseMode::FixedFov`].
    pub residual: f64,
    /// RMS reprojection error in pixels, on both paths.
    pub rms_error: f64,
    /// The path the solve took.
    pub mode: PoseMode,
    /// Image dimensions the intrinsics refer to.
    pub image_size: ImageSize,
    /// Number of correspondences used.
    pub num_points: usize,
    /// Notification for the marker state this solve consumed.
    pub solved: Solved,
}

impl PoseSolution {
    /// Build the projection and modelview matrices for the given clip planes.
    pub fn camera_param(&self, near: f64, far: f64) -> Result<CameraParam, CalibError> {
        CameraParam::new(
            self.image_size,
            &self.intrinsics,
            &self.extrinsics,
            near,
            far,
        )
    }
}

/// Estimate the camera pose, and the focal length unless the field of view is forced.
///
/// The seed camera has square pixels, a focal length of
/// `(height / 2) * tan(fov / 2)` and its principal point at the image center
/// shifted by the lens offset.
///
/// # Arguments
///
/// * `set` - The correspondences, more than six.
/// * `image_size` - Dimensions of the camera or projector image.
/// * `options` - Forced field of view, lens offset and refinement settings.
///
/// # Errors
///
/// [`CalibError::InsufficientPoints`] for six or fewer correspondences,
/// [`CalibError::InvalidParameter`] for an empty image or a non-positive
/// forced field of view, [`CalibError::DegenerateGeometry`] when the points
/// determine no pose.
pub fn solve_pose(
    set: &CorrespondenceSet,
    image_size: ImageSize,
    options: &PoseOptions,
) -> Result<PoseSolution, CalibError> {
    image_size.validate()?;
    if !(options.forced_fov.is_finite() && options.forced_fov >= 0.0 && options.forced_fov < 180.0)
    {
        return Err(CalibError::InvalidParameter(format!(
            "forced field of view must lie in [0, 180) degrees, got {}",
            options.forced_fov
        )));
    }

    let prepared = prepare_correspondences(set, SolveMode::Pose, options.unset_policy)?;
    let world = prepared.object_points();
    let image = prepared.image_points();

    let seed = CameraIntrinsics::from_fov(image_size, options.seed_fov(), options.lens_offset);
    let mode = options.mode();

    let (intrinsics, extrinsics, residual, rms_error) = match mode {
        PoseMode::FreeFocal => {
            let flags = CalibrationFlags::single_view(options.lens_offset);
            let result =
                calibrate_single_view(&world, &image, image_size, &seed, &flags, &options.lm)?;
            (result.intrinsics, result.extrinsics, result.rms, result.rms)
        }
        PoseMode::FixedFov => {
            let result = pnp::solve_pnp(&world, &image, &seed, &options.lm)?;
            (seed, result.extrinsics, FIXED_FOV_RESIDUAL, result.reproj_rmse)
        }
    };

    log::debug!(
        "{:?} pose from {} correspondences: f={:.3}, rms {:.4} px",
        mode,
        prepared.len(),
        intrinsics.fy,
        rms_error
    );

    Ok(PoseSolution {
        intrinsics,
        extrinsics,
        residual,
        rms_error,
        mode,
        image_size,
        num_points: prepared.len(),
        solved: Solved {
            revision: set.revision(),
        },
    })
}

/// Solve the pose and build the camera parameter in one go.
///
/// Nothing is built when the solve fails.
pub fn solve_camera_param(
    set: &CorrespondenceSet,
    image_size: ImageSize,
    near: f64,
    far: f64,
    options: &PoseOptions,
) -> Result<(CameraParam, PoseSolution), CalibError> {
    let solution = solve_pose(set, image_size, options)?;
    let param = solution.camera_param(near, far)?;
    Ok((param, solution))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correspondence::Correspondence;
    use approx::assert_relative_eq;

    const WORLD: [[f64; 3]; 9] = [
        [-0.5, -0.5, 0.0],
        [0.5, -0.5, 0.0],
        [0.5, 0.5, 0.0],
        [-0.5, 0.5, 0.0],
        [-0.5, -0.5, 0.6],
        [0.5, -0.5, 0.6],
        [0.5, 0.5, 0.6],
        [-0.5, 0.5, 0.6],
        [0.1, 0.2, 0.3],
    ];

    fn synthetic_set(k: &CameraIntrinsics, pose: &CameraExtrinsics) -> CorrespondenceSet {
        WORLD
            .iter()
            .map(|p| Correspondence::new(k.project(&pose.transform_point(p)).unwrap(), *p))
            .collect()
    }

    #[test]
    fn test_pose_options() {
        let options = PoseOptions::new();
        assert_eq!(options.mode(), PoseMode::FreeFocal);
        assert_eq!(options.seed_fov(), DEFAULT_FOV_DEG);

        let options = options.with_forced_fov(45.0).with_lens_offset([3.0, 4.0]);
        assert_eq!(options.mode(), PoseMode::FixedFov);
        assert_eq!(options.seed_fov(), 45.0);
        assert_eq!(options.lens_offset, [3.0, 4.0]);
    }

    #[test]
    fn test_solve_pose_fixed_fov() -> Result<(), Box<dyn std::error::Error>> {
        let size = ImageSize::new(1280, 720);
        let options = PoseOptions::new().with_forced_fov(50.0);
        let k = CameraIntrinsics::from_fov(size, 50.0, [0.0, 0.0]);
        let pose = CameraExtrinsics::new([0.3, -0.2, 0.1], [0.2, -0.1, 4.0]);

        let solution = solve_pose(&synthetic_set(&k, &pose), size, &options)?;
        assert_eq!(solution.mode, PoseMode::FixedFov);
        assert_eq!(solution.residual, FIXED_FOV_RESIDUAL);
        assert_eq!(solution.intrinsics, k);
        assert!(solution.rms_error < 1e-6);
        for i in 0..3 {
            assert_relative_eq!(solution.extrinsics.rvec[i], pose.rvec[i], epsilon = 1e-6);
            assert_relative_eq!(solution.extrinsics.tvec[i], pose.tvec[i], epsilon = 1e-6);
        }
        Ok(())
    }

    #[test]
    fn test_solve_pose_free_focal() -> Result<(), Box<dyn std::error::Error>> {
        let size = ImageSize::new(1024, 768);
        let k = CameraIntrinsics::new(1100.0, 1100.0, 512.0, 384.0);
        let pose = CameraExtrinsics::new([0.25, 0.3, -0.1], [-0.1, 0.2, 5.0]);

        let solution = solve_pose(&synthetic_set(&k, &pose), size, &PoseOptions::default())?;
        assert_eq!(solution.mode, PoseMode::FreeFocal);
        assert_relative_eq!(solution.intrinsics.fx, solution.intrinsics.fy, epsilon = 1e-9);
        assert_relative_eq!(solution.intrinsics.fx, 1100.0, max_relative = 1e-3);
        assert_relative_eq!(solution.residual, solution.rms_error);
        assert!(solution.residual < 1e-3);
        Ok(())
    }

    #[test]
    fn test_solve_pose_insufficient() {
        let set: CorrespondenceSet = WORLD[..6]
            .iter()
            .map(|p| Correspondence::new([p[0], p[1]], *p))
            .collect();
        let result = solve_pose(&set, ImageSize::new(640, 480), &PoseOptions::default());
        assert_eq!(
            result.err(),
            Some(CalibError::InsufficientPoints {
                required: 7,
                actual: 6
            })
        );
    }

    #[test]
    fn test_solve_pose_invalid_parameters() {
        let k = CameraIntrinsics::new(800.0, 800.0, 320.0, 240.0);
        let pose = CameraExtrinsics::new([0.0, 0.0, 0.0], [0.0, 0.0, 4.0]);
        let set = synthetic_set(&k, &pose);

        let result = solve_pose(&set, ImageSize::new(0, 480), &PoseOptions::default());
        assert!(matches!(result, Err(CalibError::InvalidParameter(_))));

        let options = PoseOptions::new().with_forced_fov(-10.0);
        let result = solve_pose(&set, ImageSize::new(640, 480), &options);
        assert!(matches!(result, Err(CalibError::InvalidParameter(_))));
    }

    #[test]
    fn test_solve_camera_param() -> Result<(), Box<dyn std::error::Error>> {
        let size = ImageSize::new(800, 600);
        let options = PoseOptions::new().with_forced_fov(40.0);
        let k = CameraIntrinsics::from_fov(size, 40.0, [0.0, 0.0]);
        let pose = CameraExtrinsics::new([0.1, 0.1, 0.0], [0.0, 0.0, 3.0]);
        let set = synthetic_set(&k, &pose).with_revision(7);

        let (param, solution) = solve_camera_param(&set, size, 0.1, 100.0, &options)?;
        assert_eq!(solution.solved, Solved { revision: 7 });
        for c in set.iter() {
            let uv = param.project_to_pixel(size, &c.object_point).unwrap();
            assert_relative_eq!(uv[0], c.image_point[0], epsilon = 1e-4);
            assert_relative_eq!(uv[1], c.image_point[1], epsilon = 1e-4);
        }

        let result = solve_camera_param(&set, size, 10.0, 1.0, &options);
        assert!(matches!(result, Err(CalibError::InvalidParameter(_))));
        Ok(())
    }
}
