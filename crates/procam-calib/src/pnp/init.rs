//! Closed-form initial poses for the iterative PnP and calibration solvers.
//!
//! Non-planar point sets use a normalized DLT on the 3x4 projection, planar sets a
//! homography decomposition.

use crate::camera::{CameraExtrinsics, CameraIntrinsics};
use crate::error::CalibError;
use crate::linalg::{self, Mat3};
use crate::solver::find_homography;

/// Below this ratio of the smallest to the middle eigenvalue of the point
/// covariance the object points are treated as coplanar.
const PLANARITY_RATIO: f64 = 1e-3;

/// Relative singular value below which a system is considered rank deficient.
const RANK_EPS: f64 = 1e-10;

/// Spatial layout of a set of object points.
#[derive(Debug, Clone, PartialEq)]
pub enum PointLayout {
    /// The points span all three dimensions.
    General,
    /// The points lie on a plane.
    Planar {
        /// Centroid of the points.
        centroid: [f64; 3],
        /// Orthonormal basis `[e1, e2, n]` stored as rows, with `n` the plane normal.
        basis: Mat3,
    },
}

/// Classify object points as general or planar.
///
/// Fails with [`CalibError::DegenerateGeometry`] if the points coincide or are
/// collinear, since no pose can be recovered from them.
pub fn classify_points(points: &[[f64; 3]]) -> Result<PointLayout, CalibError> {
    let centroid = linalg::centroid3(points);

    let mut centered = faer::Mat::<f64>::zeros(points.len().max(3), 3);
    for (i, p) in points.iter().enumerate() {
        for j in 0..3 {
            centered.write(i, j, p[j] - centroid[j]);
        }
    }

    let svd = centered.svd();
    let s = svd.s_diagonal();
    let (s0, s1, s2) = (s.read(0), s.read(1), s.read(2));

    if s0 < 1e-12 {
        return Err(CalibError::DegenerateGeometry(
            "all object points coincide".to_string(),
        ));
    }
    if s1 / s0 < RANK_EPS {
        return Err(CalibError::DegenerateGeometry(
            "object points are collinear".to_string(),
        ));
    }

    // eigenvalues of the covariance are the squared singular values
    if (s2 * s2) / (s1 * s1) >= PLANARITY_RATIO {
        return Ok(PointLayout::General);
    }

    let v = svd.v();
    let e1 = [v.read(0, 0), v.read(1, 0), v.read(2, 0)];
    let e2 = [v.read(0, 1), v.read(1, 1), v.read(2, 1)];
    let normal = linalg::cross_vec3(&e1, &e2);

    Ok(PointLayout::Planar {
        centroid,
        basis: [e1, e2, normal],
    })
}

/// Estimate an initial pose for the given intrinsics.
///
/// Dispatches on the point layout: DLT for general point sets (at least six
/// points), homography decomposition for planar ones (at least four).
pub fn initial_pose(
    world: &[[f64; 3]],
    image: &[[f64; 2]],
    k: &CameraIntrinsics,
) -> Result<CameraExtrinsics, CalibError> {
    let normalized = image.iter().map(|p| k.unproject(p)).collect::<Vec<_>>();
    match classify_points(world)? {
        PointLayout::General => {
            log::debug!("initial pose from DLT on {} points", world.len());
            pose_from_dlt(world, &normalized)
        }
        PointLayout::Planar { centroid, basis } => {
            log::debug!("initial pose from plane homography on {} points", world.len());
            pose_from_plane(world, &normalized, &centroid, &basis)
        }
    }
}

/// Pose from a normalized DLT on the 3x4 projection `[R | t]`.
///
/// `normalized` are image points premultiplied by `K^-1`.
pub fn pose_from_dlt(
    world: &[[f64; 3]],
    normalized: &[[f64; 2]],
) -> Result<CameraExtrinsics, CalibError> {
    let (m, p4) = projection_from_dlt(world, normalized)?;

    let scale = linalg::det_mat33(&m).cbrt();
    if scale.abs() < 1e-12 || !scale.is_finite() {
        return Err(CalibError::DegenerateGeometry(
            "projection matrix is singular".to_string(),
        ));
    }

    let rotation = linalg::closest_rotation(&m);
    let tvec = [p4[0] / scale, p4[1] / scale, p4[2] / scale];

    Ok(CameraExtrinsics::from_rotation_matrix(&rotation, tvec))
}

/// Linear estimate of the 3x4 projection `[M | p4]` mapping `world` to `image`.
///
/// The result is defined up to a positive scale and signed so that `det(M) > 0`.
pub(crate) fn projection_from_dlt(
    world: &[[f64; 3]],
    image: &[[f64; 2]],
) -> Result<(Mat3, [f64; 3]), CalibError> {
    let n = world.len();
    if n < 6 {
        return Err(CalibError::InsufficientPoints {
            required: 6,
            actual: n,
        });
    }

    // normalize the world points: zero mean and average distance sqrt(3)
    let c = linalg::centroid3(world);
    let mean_dist = world
        .iter()
        .map(|p| linalg::norm3(&[p[0] - c[0], p[1] - c[1], p[2] - c[2]]))
        .sum::<f64>()
        / n as f64;
    if mean_dist < 1e-12 {
        return Err(CalibError::DegenerateGeometry(
            "all object points coincide".to_string(),
        ));
    }
    let s = 3f64.sqrt() / mean_dist;

    let mut a = faer::Mat::<f64>::zeros(2 * n, 12);
    for (i, (pw, pn)) in world.iter().zip(image.iter()).enumerate() {
        let x = [(pw[0] - c[0]) * s, (pw[1] - c[1]) * s, (pw[2] - c[2]) * s, 1.0];
        let (u, v) = (pn[0], pn[1]);
        for j in 0..4 {
            a.write(2 * i, j, x[j]);
            a.write(2 * i, 8 + j, -u * x[j]);
            a.write(2 * i + 1, 4 + j, x[j]);
            a.write(2 * i + 1, 8 + j, -v * x[j]);
        }
    }

    let svd = a.svd();
    let sv = svd.s_diagonal();
    if sv.read(10) / sv.read(0) < RANK_EPS {
        return Err(CalibError::DegenerateGeometry(
            "projection matrix is not determined by the correspondences".to_string(),
        ));
    }
    let p = svd.v().col(11);

    // undo the world normalization: P = Pn * [[s I, -s c], [0, 1]]
    let mut m = [[0.0; 3]; 3];
    let mut p4 = [0.0; 3];
    for row in 0..3 {
        for col in 0..3 {
            m[row][col] = s * p[4 * row + col];
        }
        p4[row] = p[4 * row + 3] - linalg::dot_product3(&m[row], &c);
    }

    if linalg::det_mat33(&m) < 0.0 {
        for row in 0..3 {
            for col in 0..3 {
                m[row][col] = -m[row][col];
            }
            p4[row] = -p4[row];
        }
    }

    Ok((m, p4))
}

/// Coordinates of `world` in the plane frame `basis * (X - centroid)`, dropping the normal.
pub(crate) fn plane_coordinates(
    world: &[[f64; 3]],
    centroid: &[f64; 3],
    basis: &Mat3,
) -> Vec<[f64; 2]> {
    world
        .iter()
        .map(|p| {
            let d = [p[0] - centroid[0], p[1] - centroid[1], p[2] - centroid[2]];
            [
                linalg::dot_product3(&basis[0], &d),
                linalg::dot_product3(&basis[1], &d),
            ]
        })
        .collect()
}

/// Pose from the homography between a plane and the normalized image.
///
/// `basis` holds the plane axes and normal as rows, so that plane coordinates are
/// `basis * (X - centroid)`.
pub fn pose_from_plane(
    world: &[[f64; 3]],
    normalized: &[[f64; 2]],
    centroid: &[f64; 3],
    basis: &Mat3,
) -> Result<CameraExtrinsics, CalibError> {
    let plane_points = plane_coordinates(world, centroid, basis);
    let h = find_homography(&plane_points, normalized)?;

    let h1 = [h[0][0], h[1][0], h[2][0]];
    let h2 = [h[0][1], h[1][1], h[2][1]];
    let h3 = [h[0][2], h[1][2], h[2][2]];

    let norm_sum = linalg::norm3(&h1) + linalg::norm3(&h2);
    if norm_sum < 1e-12 {
        return Err(CalibError::DegenerateGeometry(
            "plane homography has a vanishing scale".to_string(),
        ));
    }
    let mut lambda = 2.0 / norm_sum;
    // the plane centroid maps to t, which must lie in front of the camera
    if h3[2] * lambda < 0.0 {
        lambda = -lambda;
    }

    let r1 = h1.map(|v| v * lambda);
    let r2 = h2.map(|v| v * lambda);
    let r3 = linalg::cross_vec3(&r1, &r2);
    let t = h3.map(|v| v * lambda);

    let r_plane = linalg::closest_rotation(&[
        [r1[0], r2[0], r3[0]],
        [r1[1], r2[1], r3[1]],
        [r1[2], r2[2], r3[2]],
    ]);

    // X_cam = R_plane * B * (X - c) + t
    let rotation = linalg::matmul33(&r_plane, basis);
    let rc = linalg::mat33_mul_vec3(&rotation, centroid);
    let tvec = [t[0] - rc[0], t[1] - rc[1], t[2] - rc[2]];

    Ok(CameraExtrinsics::from_rotation_matrix(&rotation, tvec))
}
