use serde::{Deserialize, Serialize};

use super::DEFAULT_FOV_DEG;
use crate::camera::{CameraExtrinsics, CameraIntrinsics, ImageSize};
use crate::error::CalibError;
use crate::linalg;
use crate::pnp::{self, ops, LMParams, PointLayout};
use crate::solver::find_homography;

/// Lens offsets with a squared length at or below this are treated as absent.
const LENS_OFFSET_EPS: f64 = f32::EPSILON as f64;

/// Constraints applied to the single-view calibration.
///
/// Lens distortion is always fixed at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationFlags {
    /// Start from the supplied intrinsics instead of a default camera.
    pub use_intrinsic_guess: bool,
    /// Keep `fx / fy` at the ratio of the starting intrinsics.
    pub fix_aspect_ratio: bool,
    /// Keep the principal point at its starting position.
    pub fix_principal_point: bool,
}

impl Default for CalibrationFlags {
    fn default() -> Self {
        Self {
            use_intrinsic_guess: true,
            fix_aspect_ratio: true,
            fix_principal_point: false,
        }
    }
}

impl CalibrationFlags {
    /// Flags for calibrating a projector from a single view.
    ///
    /// The principal point is pinned when a non-zero lens offset is given.
    pub fn single_view(lens_offset: [f64; 2]) -> Self {
        let offset_sq = lens_offset[0] * lens_offset[0] + lens_offset[1] * lens_offset[1];
        Self {
            fix_principal_point: offset_sq > LENS_OFFSET_EPS,
            ..Self::default()
        }
    }

    /// Set whether the supplied intrinsics are used as the starting point.
    pub fn with_intrinsic_guess(mut self, enabled: bool) -> Self {
        self.use_intrinsic_guess = enabled;
        self
    }

    /// Set whether the aspect ratio is fixed.
    pub fn with_fixed_aspect_ratio(mut self, enabled: bool) -> Self {
        self.fix_aspect_ratio = enabled;
        self
    }

    /// Set whether the principal point is fixed.
    pub fn with_fixed_principal_point(mut self, enabled: bool) -> Self {
        self.fix_principal_point = enabled;
        self
    }
}

/// Result of a single-view calibration.
#[derive(Debug, Clone)]
pub struct CalibrationResult {
    /// Estimated intrinsics.
    pub intrinsics: CameraIntrinsics,
    /// Estimated pose of the view.
    pub extrinsics: CameraExtrinsics,
    /// Root-mean-square reprojection error in pixels.
    pub rms: f64,
    /// Number of LM iterations taken.
    pub num_iterations: usize,
    /// Whether the refinement converged.
    pub converged: bool,
}

/// Which entries of the intrinsics are optimized, and the values of the fixed ones.
struct ParamLayout {
    fix_aspect_ratio: bool,
    fix_principal_point: bool,
    aspect: f64,
    principal_point: [f64; 2],
}

impl ParamLayout {
    fn new(flags: &CalibrationFlags, start: &CameraIntrinsics) -> Self {
        Self {
            fix_aspect_ratio: flags.fix_aspect_ratio,
            fix_principal_point: flags.fix_principal_point,
            aspect: start.fx / start.fy,
            principal_point: start.principal_point(),
        }
    }

    fn num_intrinsics(&self) -> usize {
        let focal = if self.fix_aspect_ratio { 1 } else { 2 };
        let center = if self.fix_principal_point { 0 } else { 2 };
        focal + center
    }

    fn len(&self) -> usize {
        self.num_intrinsics() + 6
    }

    fn pack(&self, k: &CameraIntrinsics, pose: &CameraExtrinsics) -> Vec<f64> {
        let mut x = Vec::with_capacity(self.len());
        if self.fix_aspect_ratio {
            x.push(k.fy);
        } else {
            x.extend_from_slice(&[k.fx, k.fy]);
        }
        if !self.fix_principal_point {
            x.extend_from_slice(&[k.cx, k.cy]);
        }
        x.extend_from_slice(&pose.rvec);
        x.extend_from_slice(&pose.tvec);
        x
    }

    fn unpack(&self, x: &[f64]) -> (CameraIntrinsics, CameraExtrinsics) {
        let (fx, fy, mut i) = if self.fix_aspect_ratio {
            (x[0] * self.aspect, x[0], 1)
        } else {
            (x[0], x[1], 2)
        };
        let [cx, cy] = if self.fix_principal_point {
            self.principal_point
        } else {
            i += 2;
            [x[i - 2], x[i - 1]]
        };
        let pose = CameraExtrinsics::new(
            [x[i], x[i + 1], x[i + 2]],
            [x[i + 3], x[i + 4], x[i + 5]],
        );
        (CameraIntrinsics::new(fx, fy, cx, cy), pose)
    }
}

/// Calibrate intrinsics and pose of a camera from a single view.
///
/// Minimizes the reprojection error jointly over the free intrinsics and the
/// pose. Distortion is not modeled.
///
/// # Arguments
///
/// * `world` - Object points.
/// * `image` - Corresponding pixel coordinates.
/// * `image_size` - Image dimensions, used for the default camera when no guess is used.
/// * `guess` - Starting intrinsics, honored when `flags.use_intrinsic_guess` is set.
/// * `flags` - Which intrinsics stay fixed.
/// * `params` - LM refinement parameters.
///
/// # Errors
///
/// [`CalibError::InsufficientPoints`] if there are fewer residuals than unknowns,
/// [`CalibError::DegenerateGeometry`] if no pose can be initialized or the
/// refinement ends on a non-physical camera.
pub fn calibrate_single_view(
    world: &[[f64; 3]],
    image: &[[f64; 2]],
    image_size: ImageSize,
    guess: &CameraIntrinsics,
    flags: &CalibrationFlags,
    params: &LMParams,
) -> Result<CalibrationResult, CalibError> {
    image_size.validate()?;
    let n = world.len();
    if n != image.len() {
        return Err(CalibError::InvalidParameter(format!(
            "mismatched array lengths: world points ({}) != image points ({})",
            n,
            image.len()
        )));
    }

    let start = if flags.use_intrinsic_guess {
        *guess
    } else {
        CameraIntrinsics::from_fov(image_size, DEFAULT_FOV_DEG, [0.0, 0.0])
    };
    if !(start.fx > 0.0 && start.fy > 0.0) {
        return Err(CalibError::InvalidParameter(format!(
            "starting focal lengths must be positive, got fx={} fy={}",
            start.fx, start.fy
        )));
    }

    let layout = ParamLayout::new(flags, &start);
    let required = layout.len().div_ceil(2).max(pnp::PNP_MIN_POINTS);
    if n < required {
        return Err(CalibError::InsufficientPoints {
            required,
            actual: n,
        });
    }

    let (seed_k, seed_pose) = initial_camera(world, image, &start, &layout)?;
    log::debug!(
        "calibration seed fx={:.3} fy={:.3} cx={:.3} cy={:.3}",
        seed_k.fx,
        seed_k.fy,
        seed_k.cx,
        seed_k.cy
    );

    let x0 = layout.pack(&seed_k, &seed_pose);
    let summary = pnp::levenberg_marquardt(
        &x0,
        |x| {
            let (k, pose) = layout.unpack(x);
            if !(k.fx > 0.0 && k.fy > 0.0) {
                return None;
            }
            ops::reprojection_residuals(world, image, &k, &pose)
        },
        params,
    )?;

    let (intrinsics, extrinsics) = layout.unpack(&summary.params);
    let finite = [intrinsics.fx, intrinsics.fy, intrinsics.cx, intrinsics.cy]
        .iter()
        .chain(extrinsics.rvec.iter())
        .chain(extrinsics.tvec.iter())
        .all(|v| v.is_finite());
    if !finite || intrinsics.fx <= 0.0 || intrinsics.fy <= 0.0 {
        return Err(CalibError::DegenerateGeometry(
            "calibration converged to a non-physical camera".to_string(),
        ));
    }

    let rms = pnp::reprojection_rmse(world, image, &intrinsics, &extrinsics).ok_or_else(|| {
        CalibError::DegenerateGeometry("calibrated camera sees no point in front of it".to_string())
    })?;

    log::debug!(
        "calibrated fx={:.3} fy={:.3} cx={:.3} cy={:.3}, rms {:.4} px after {} iterations",
        intrinsics.fx,
        intrinsics.fy,
        intrinsics.cx,
        intrinsics.cy,
        rms,
        summary.iterations
    );

    Ok(CalibrationResult {
        intrinsics,
        extrinsics,
        rms,
        num_iterations: summary.iterations,
        converged: summary.converged(),
    })
}

/// Pick the starting camera for the joint refinement.
///
/// Tries the starting intrinsics and a linear focal estimate, keeping whichever
/// reprojects better once a pose is fitted to it.
fn initial_camera(
    world: &[[f64; 3]],
    image: &[[f64; 2]],
    start: &CameraIntrinsics,
    layout: &ParamLayout,
) -> Result<(CameraIntrinsics, CameraExtrinsics), CalibError> {
    let mut candidates = vec![*start];
    match estimate_focal(world, image, start, layout.fix_aspect_ratio) {
        Some((fx, fy)) => candidates.push(CameraIntrinsics::new(fx, fy, start.cx, start.cy)),
        None => log::debug!("no linear focal estimate, starting from the supplied intrinsics"),
    }

    let mut best: Option<(f64, CameraIntrinsics, CameraExtrinsics)> = None;
    let mut last_err = None;
    for k in candidates {
        let pose = match pnp::initial_pose(world, image, &k) {
            Ok(pose) => pose,
            Err(err) => {
                last_err = Some(err);
                continue;
            }
        };
        let Some(rmse) = pnp::reprojection_rmse(world, image, &k, &pose) else {
            continue;
        };
        if best.as_ref().map_or(true, |(b, _, _)| rmse < *b) {
            best = Some((rmse, k, pose));
        }
    }

    match (best, last_err) {
        (Some((_, k, pose)), _) => Ok((k, pose)),
        (None, Some(err)) => Err(err),
        (None, None) => Err(CalibError::DegenerateGeometry(
            "no starting camera sees the object points".to_string(),
        )),
    }
}

/// Linear focal length estimate with the principal point of `start` held fixed.
///
/// General layouts read the focal lengths off a DLT projection, planar ones use
/// the orthogonality constraints on the plane homography.
fn estimate_focal(
    world: &[[f64; 3]],
    image: &[[f64; 2]],
    start: &CameraIntrinsics,
    fix_aspect_ratio: bool,
) -> Option<(f64, f64)> {
    let normalized = image.iter().map(|p| start.unproject(p)).collect::<Vec<_>>();

    let (ax, ay) = match pnp::classify_points(world).ok()? {
        PointLayout::General => {
            let (m, _) = pnp::init::projection_from_dlt(world, &normalized).ok()?;
            let depth = linalg::norm3(&m[2]);
            if depth < 1e-12 {
                return None;
            }
            let (ax, ay) = (linalg::norm3(&m[0]) / depth, linalg::norm3(&m[1]) / depth);
            if fix_aspect_ratio {
                let a = (ax * ay).sqrt();
                (a, a)
            } else {
                (ax, ay)
            }
        }
        PointLayout::Planar { centroid, basis } => {
            let plane = pnp::init::plane_coordinates(world, &centroid, &basis);
            let h = find_homography(&plane, &normalized).ok()?;
            let a = planar_focal_scale(&h)?;
            (a, a)
        }
    };

    let (fx, fy) = (start.fx * ax, start.fy * ay);
    (fx.is_finite() && fy.is_finite() && fx > 0.0 && fy > 0.0).then_some((fx, fy))
}

/// Focal scale `a` of a homography `H ~ diag(a, a, 1) [r1 r2 t]`.
///
/// Averages the estimates from `r1 . r2 = 0` and `|r1| = |r2|`, skipping the
/// ones that are ill-conditioned, as for a plane facing the camera.
fn planar_focal_scale(h: &linalg::Mat3) -> Option<f64> {
    let (h1, h2) = (
        [h[0][0], h[1][0], h[2][0]],
        [h[0][1], h[1][1], h[2][1]],
    );

    let mut estimates = Vec::with_capacity(2);

    let den = h1[2] * h2[2];
    if den.abs() > 1e-9 {
        estimates.push(-(h1[0] * h2[0] + h1[1] * h2[1]) / den);
    }
    let den = h1[2] * h1[2] - h2[2] * h2[2];
    if den.abs() > 1e-9 {
        estimates.push(-(h1[0] * h1[0] + h1[1] * h1[1] - h2[0] * h2[0] - h2[1] * h2[1]) / den);
    }

    let valid = estimates
        .into_iter()
        .filter(|a2| a2.is_finite() && *a2 > 0.0)
        .map(f64::sqrt)
        .collect::<Vec<_>>();
    if valid.is_empty() {
        return None;
    }
    Some(valid.iter().sum::<f64>() / valid.len() as f64)
}
