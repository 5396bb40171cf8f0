use serde::{Deserialize, Serialize};

use super::{prepare_correspondences, Solved, UnsetPolicy};
use crate::correspondence::{CorrespondenceSet, SolveMode};
use crate::error::CalibError;
use crate::linalg::{self, Mat3, Mat4};

/// Relative singular value below which the DLT system is rank deficient.
const RANK_EPS: f64 = 1e-10;

/// Options for [`solve_homography_with`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HomographyOptions {
    /// Handling of correspondences with an unset object point.
    pub unset_policy: UnsetPolicy,
}

impl HomographyOptions {
    /// Set the unset-point policy.
    pub fn with_unset_policy(mut self, policy: UnsetPolicy) -> Self {
        self.unset_policy = policy;
        self
    }
}

/// Result of a homography solve.
#[derive(Debug, Clone, PartialEq)]
pub struct HomographySolution {
    /// Homography from object-plane `(x, y)` to image `(x, y)`, with `H[2][2] == 1`.
    pub homography: Mat3,
    /// The homography re-laid into a 4x4 transform, see [`homography_to_model_view`].
    pub model_view: Mat4,
    /// Root-mean-square transfer error in pixels over the used correspondences.
    pub rms_error: f64,
    /// Number of correspondences used.
    pub num_points: usize,
    /// Notification for the marker state this solve consumed.
    pub solved: Solved,
}

impl HomographySolution {
    /// Map an object-plane point to the image through the 4x4 transform.
    pub fn transform_point(&self, object_point: &[f64; 2]) -> Option<[f64; 2]> {
        linalg::transform_point(&self.model_view, &[object_point[0], object_point[1], 0.0])
            .map(|p| [p[0], p[1]])
    }
}

/// Apply a homography to a 2d point.
///
/// Returns `None` when the point maps to infinity.
pub fn apply_homography(h: &Mat3, p: &[f64; 2]) -> Option<[f64; 2]> {
    let q = linalg::mat33_mul_vec3(h, &[p[0], p[1], 1.0]);
    if q[2].abs() < 1e-12 {
        return None;
    }
    Some([q[0] / q[2], q[1] / q[2]])
}

/// Estimate the homography mapping `src` to `dst` with the normalized DLT.
///
/// Least squares for more than four correspondences, exact for four noiseless
/// ones. The result is scaled so that `H[2][2] == 1`.
///
/// # Arguments
///
/// * `src` - The source 2d points, at least 4.
/// * `dst` - The destination 2d points, same length as `src`.
///
/// # Errors
///
/// [`CalibError::DegenerateGeometry`] if the points coincide, three or more
/// are collinear in a way that leaves the system rank deficient, or the
/// resulting matrix is singular.
pub fn find_homography(src: &[[f64; 2]], dst: &[[f64; 2]]) -> Result<Mat3, CalibError> {
    let n = src.len();
    if n != dst.len() {
        return Err(CalibError::InvalidParameter(format!(
            "mismatched array lengths: source points ({}) != destination points ({})",
            n,
            dst.len()
        )));
    }
    if n < 4 {
        return Err(CalibError::InsufficientPoints {
            required: 4,
            actual: n,
        });
    }

    let (src_n, t_src) = linalg::normalize_points_2d(src).ok_or_else(|| {
        CalibError::DegenerateGeometry("source points coincide".to_string())
    })?;
    let (dst_n, t_dst) = linalg::normalize_points_2d(dst).ok_or_else(|| {
        CalibError::DegenerateGeometry("destination points coincide".to_string())
    })?;

    // construct matrix A
    let mut mat_a = faer::Mat::<f64>::zeros(2 * n, 9);
    for (i, (x1, x2)) in src_n.iter().zip(dst_n.iter()).enumerate() {
        mat_a.write(2 * i, 0, x1[0]);
        mat_a.write(2 * i, 1, x1[1]);
        mat_a.write(2 * i, 2, 1.0);
        mat_a.write(2 * i, 6, -x2[0] * x1[0]);
        mat_a.write(2 * i, 7, -x2[0] * x1[1]);
        mat_a.write(2 * i, 8, -x2[0]);

        mat_a.write(2 * i + 1, 3, x1[0]);
        mat_a.write(2 * i + 1, 4, x1[1]);
        mat_a.write(2 * i + 1, 5, 1.0);
        mat_a.write(2 * i + 1, 6, -x2[1] * x1[0]);
        mat_a.write(2 * i + 1, 7, -x2[1] * x1[1]);
        mat_a.write(2 * i + 1, 8, -x2[1]);
    }

    // solve A h = 0 and take the right singular vector of the smallest singular value
    let svd = mat_a.svd();
    let s = svd.s_diagonal();
    if s.read(7) / s.read(0) < RANK_EPS {
        return Err(CalibError::DegenerateGeometry(
            "correspondences do not determine a unique homography".to_string(),
        ));
    }
    let h = svd.v().col(8);

    let h_norm = [[h[0], h[1], h[2]], [h[3], h[4], h[5]], [h[6], h[7], h[8]]];
    if linalg::det_mat33(&h_norm).abs() < RANK_EPS {
        return Err(CalibError::DegenerateGeometry(
            "homography is singular".to_string(),
        ));
    }

    // denormalize: H = T_dst^-1 * Hn * T_src
    let mut homo = linalg::matmul33(
        &linalg::matmul33(&linalg::invert_similarity2d(&t_dst), &h_norm),
        &t_src,
    );

    if !linalg::normalize_mat33_inplace(&mut homo) {
        return Err(CalibError::DegenerateGeometry(
            "homography maps the source origin to infinity".to_string(),
        ));
    }
    if homo.iter().flatten().any(|v| !v.is_finite()) {
        return Err(CalibError::DegenerateGeometry(
            "homography is not finite".to_string(),
        ));
    }

    Ok(homo)
}

/// Re-lay a 3x3 homography into a 4x4 transform.
///
/// The result uses the row-vector convention of [`Mat4`]: for an object point
/// `p = (x, y, z, 1)`, `p * M` is `(H * (x, y, 1), z)` in homogeneous form, so the
/// z axis keeps unit scale and zero translation.
///
/// ```text
/// M[0] = (H00, H10, 0, H20)
/// M[1] = (H01, H11, 0, H21)
/// M[2] = (0,   0,   1, 0  )
/// M[3] = (H02, H12, 0, 1  )
/// ```
pub fn homography_to_model_view(h: &Mat3) -> Mat4 {
    [
        [h[0][0], h[1][0], 0.0, h[2][0]],
        [h[0][1], h[1][1], 0.0, h[2][1]],
        [0.0, 0.0, 1.0, 0.0],
        [h[0][2], h[1][2], 0.0, 1.0],
    ]
}

/// Solve the homography from object plane to image with default options.
///
/// Object z coordinates are dropped. Fails with [`CalibError::InsufficientPoints`]
/// for fewer than four correspondences.
pub fn solve_homography(set: &CorrespondenceSet) -> Result<HomographySolution, CalibError> {
    solve_homography_with(set, &HomographyOptions::default())
}

/// Solve the homography from object plane to image.
pub fn solve_homography_with(
    set: &CorrespondenceSet,
    options: &HomographyOptions,
) -> Result<HomographySolution, CalibError> {
    let prepared = prepare_correspondences(set, SolveMode::Homography, options.unset_policy)?;

    let src = prepared.object_points_2d();
    let dst = prepared.image_points();
    let homography = find_homography(&src, &dst)?;

    let (sum_sq, count) = src
        .iter()
        .zip(dst.iter())
        .filter_map(|(s, d)| {
            let p = apply_homography(&homography, s)?;
            Some((p[0] - d[0]).powi(2) + (p[1] - d[1]).powi(2))
        })
        .fold((0.0, 0usize), |(acc, c), e| (acc + e, c + 1));
    let rms_error = if count > 0 {
        (sum_sq / count as f64).sqrt()
    } else {
        f64::INFINITY
    };

    log::debug!(
        "homography from {} correspondences, rms {:.4} px",
        prepared.len(),
        rms_error
    );

    Ok(HomographySolution {
        homography,
        model_view: homography_to_model_view(&homography),
        rms_error,
        num_points: prepared.len(),
        solved: Solved {
            revision: set.revision(),
        },
    })
}
