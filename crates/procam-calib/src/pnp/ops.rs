use crate::camera::{CameraExtrinsics, CameraIntrinsics};
use crate::linalg::{self, Mat3};

/// Project a world point through a pose and intrinsics.
///
/// Returns `None` if the point lies on or behind the camera plane.
pub(crate) fn project_point(
    k: &CameraIntrinsics,
    r_mat: &Mat3,
    t_vec: &[f64; 3],
    world_point: &[f64; 3],
) -> Option<[f64; 2]> {
    let pc = linalg::mat33_mul_vec3(r_mat, world_point);
    k.project(&[pc[0] + t_vec[0], pc[1] + t_vec[1], pc[2] + t_vec[2]])
}

/// Write the reprojection residuals `[u_hat - u, v_hat - v]` of every correspondence.
///
/// Returns `None` if any point projects behind the camera.
pub(crate) fn reprojection_residuals(
    world: &[[f64; 3]],
    image: &[[f64; 2]],
    k: &CameraIntrinsics,
    pose: &CameraExtrinsics,
) -> Option<Vec<f64>> {
    let r_mat = pose.rotation_matrix();
    let mut residuals = Vec::with_capacity(2 * world.len());
    for (pw, pi) in world.iter().zip(image.iter()) {
        let uv = project_point(k, &r_mat, &pose.tvec, pw)?;
        residuals.push(uv[0] - pi[0]);
        residuals.push(uv[1] - pi[1]);
    }
    Some(residuals)
}

/// Root-mean-square reprojection error, `sqrt(sum(du^2 + dv^2) / N)`.
///
/// Points behind the camera are skipped; returns `None` if no point is visible.
pub fn reprojection_rmse(
    world: &[[f64; 3]],
    image: &[[f64; 2]],
    k: &CameraIntrinsics,
    pose: &CameraExtrinsics,
) -> Option<f64> {
    let r_mat = pose.rotation_matrix();
    let (sum_sq, count) = world
        .iter()
        .zip(image.iter())
        .filter_map(|(pw, pi)| {
            let uv = project_point(k, &r_mat, &pose.tvec, pw)?;
            let (du, dv) = (uv[0] - pi[0], uv[1] - pi[1]);
            Some(du.mul_add(du, dv * dv))
        })
        .fold((0.0, 0usize), |(s, c), e| (s + e, c + 1));

    (count > 0).then(|| (sum_sq / count as f64).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_reprojection_rmse_exact() {
        let k = CameraIntrinsics::new(400.0, 400.0, 320.0, 240.0);
        let pose = CameraExtrinsics::new([0.0, 0.2, 0.0], [0.0, 0.0, 5.0]);
        let world = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.5]];
        let image: Vec<[f64; 2]> = world
            .iter()
            .map(|p| k.project(&pose.transform_point(p)).unwrap())
            .collect();
        let rmse = reprojection_rmse(&world, &image, &k, &pose).unwrap();
        assert_relative_eq!(rmse, 0.0, epsilon = 1e-9);

        let shifted: Vec<[f64; 2]> = image.iter().map(|p| [p[0] + 3.0, p[1] - 4.0]).collect();
        let rmse = reprojection_rmse(&world, &shifted, &k, &pose).unwrap();
        assert_relative_eq!(rmse, 5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_residuals_behind_camera() {
        let k = CameraIntrinsics::new(400.0, 400.0, 320.0, 240.0);
        let pose = CameraExtrinsics::new([0.0; 3], [0.0, 0.0, -1.0]);
        let world = [[0.0, 0.0, 0.0]];
        let image = [[320.0, 240.0]];
        assert!(reprojection_residuals(&world, &image, &k, &pose).is_none());
        assert!(reprojection_rmse(&world, &image, &k, &pose).is_none());
    }
}
