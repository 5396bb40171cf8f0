//! Perspective-n-Point (PnP) solvers for a camera with known intrinsics.

/// Closed-form initial poses.
pub mod init;

/// LM-based refinement.
pub mod refine;

pub(crate) mod ops;

pub use init::{classify_points, initial_pose, PointLayout};
pub use ops::reprojection_rmse;
pub use refine::{levenberg_marquardt, LMParams, LMSummary, TerminationReason};

use crate::camera::{CameraExtrinsics, CameraIntrinsics};
use crate::error::CalibError;
use crate::linalg::Mat3;

/// Minimum number of correspondences accepted by [`solve_pnp`].
pub const PNP_MIN_POINTS: usize = 4;

/// Result returned by the PnP solver.
///
/// The rotation maps coordinates from the **world** frame to the **camera** frame.
#[derive(Debug, Clone)]
pub struct PnPResult {
    /// Estimated pose.
    pub extrinsics: CameraExtrinsics,
    /// Estimated rotation matrix.
    pub rotation: Mat3,
    /// Root-mean-square reprojection error in pixels.
    pub reproj_rmse: f64,
    /// Number of LM iterations taken.
    pub num_iterations: usize,
    /// Whether the refinement converged.
    pub converged: bool,
}

/// Solve for the camera pose given 2D-3D correspondences and fixed intrinsics.
///
/// Distortion is not modeled. The pose is initialized in closed form and then
/// refined by minimizing the reprojection error.
///
/// # Arguments
///
/// * `world` - 3-D coordinates in the world frame.
/// * `image` - Corresponding pixel coordinates.
/// * `k` - Camera intrinsics.
/// * `params` - LM refinement parameters.
pub fn solve_pnp(
    world: &[[f64; 3]],
    image: &[[f64; 2]],
    k: &CameraIntrinsics,
    params: &LMParams,
) -> Result<PnPResult, CalibError> {
    let n = world.len();
    if n != image.len() {
        return Err(CalibError::InvalidParameter(format!(
            "mismatched array lengths: world points ({}) != image points ({})",
            n,
            image.len()
        )));
    }
    if n < PNP_MIN_POINTS {
        return Err(CalibError::InsufficientPoints {
            required: PNP_MIN_POINTS,
            actual: n,
        });
    }

    let initial = initial_pose(world, image, k)?;

    let x0 = [initial.rvec, initial.tvec].concat();
    let summary = levenberg_marquardt(
        &x0,
        |x| {
            let pose = CameraExtrinsics::new([x[0], x[1], x[2]], [x[3], x[4], x[5]]);
            ops::reprojection_residuals(world, image, k, &pose)
        },
        params,
    )?;

    let x = &summary.params;
    let extrinsics = CameraExtrinsics::new([x[0], x[1], x[2]], [x[3], x[4], x[5]]);
    let reproj_rmse = reprojection_rmse(world, image, k, &extrinsics).ok_or_else(|| {
        CalibError::DegenerateGeometry("refined pose sees no point in front of it".to_string())
    })?;

    Ok(PnPResult {
        rotation: extrinsics.rotation_matrix(),
        extrinsics,
        reproj_rmse,
        num_iterations: summary.iterations,
        converged: summary.converged(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_solve_pnp_noisy() -> Result<(), Box<dyn std::error::Error>> {
        let k = CameraIntrinsics::new(800.0, 800.0, 640.0, 480.0);
        let gt = CameraExtrinsics::new([0.15, -0.35, 0.1], [0.7, -0.4, 5.0]);
        let world = [
            [-0.5, -0.5, 0.0],
            [0.5, -0.5, 0.0],
            [0.5, 0.5, 0.0],
            [-0.5, 0.5, 0.0],
            [-0.5, -0.5, 1.0],
            [0.5, -0.5, 1.0],
            [0.5, 0.5, 1.0],
            [-0.5, 0.5, 1.0],
            [0.0, 0.2, 0.5],
        ];
        // deterministic sub-pixel perturbation
        let image = world
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let uv = k.project(&gt.transform_point(p)).unwrap();
                let noise = 0.2 * ((i as f64) * 1.7).sin();
                [uv[0] + noise, uv[1] - noise]
            })
            .collect::<Vec<_>>();

        let result = solve_pnp(&world, &image, &k, &LMParams::default())?;
        for i in 0..3 {
            assert_relative_eq!(result.extrinsics.rvec[i], gt.rvec[i], epsilon = 1e-2);
            assert_relative_eq!(result.extrinsics.tvec[i], gt.tvec[i], epsilon = 5e-2);
        }
        assert!(result.reproj_rmse < 0.5);
        Ok(())
    }

    #[test]
    fn test_solve_pnp_insufficient() {
        let k = CameraIntrinsics::new(800.0, 800.0, 640.0, 480.0);
        let result = solve_pnp(&[[0.0; 3]; 3], &[[0.0; 2]; 3], &k, &LMParams::default());
        assert_eq!(
            result.err(),
            Some(CalibError::InsufficientPoints {
                required: 4,
                actual: 3
            })
        );
    }
}
