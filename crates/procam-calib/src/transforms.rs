use crate::linalg::{Mat3, IDENTITY3};

/// Compute the rotation matrix from an axis and angle.
///
/// # Arguments
///
/// * `axis` - The axis of rotation, it does not need to be normalized.
/// * `angle` - The angle of rotation in radians.
///
/// # Returns
///
/// The rotation matrix, or an error if the axis is a zero vector.
///
/// Example:
///
/// ```
/// use procam_calib::transforms::axis_angle_to_rotation_matrix;
///
/// let axis = [1.0, 0.0, 0.0];
/// let angle = std::f64::consts::PI / 2.0;
/// let rotation = axis_angle_to_rotation_matrix(&axis, angle).unwrap();
/// assert!((rotation[1][2] + 1.0).abs() < 1e-12);
/// ```
pub fn axis_angle_to_rotation_matrix(axis: &[f64; 3], angle: f64) -> Result<Mat3, &'static str> {
    // normalize the vector
    let axis_norm = {
        let magnitude = (axis[0].powi(2) + axis[1].powi(2) + axis[2].powi(2)).sqrt();
        match magnitude < 1e-10 {
            true => return Err("cannot compute rotation matrix from a zero vector"),
            false => [
                axis[0] / magnitude,
                axis[1] / magnitude,
                axis[2] / magnitude,
            ],
        }
    };

    let [x, y, z] = axis_norm;

    let c = angle.cos();
    let s = angle.sin();
    let t = 1.0 - c;

    let tmp1 = x * y * t;
    let tmp2 = z * s;
    let tmp3 = x * z * t;
    let tmp4 = y * s;
    let tmp5 = y * z * t;
    let tmp6 = x * s;

    Ok([
        [c + x * x * t, tmp1 - tmp2, tmp3 + tmp4],
        [tmp1 + tmp2, c + y * y * t, tmp5 - tmp6],
        [tmp3 - tmp4, tmp5 + tmp6, c + z * z * t],
    ])
}

/// Convert a Rodrigues rotation vector into a rotation matrix.
///
/// The direction of `rvec` is the rotation axis and its norm the angle in radians.
/// A zero vector maps to the identity.
pub fn rodrigues_to_rotation_matrix(rvec: &[f64; 3]) -> Mat3 {
    let theta = (rvec[0].powi(2) + rvec[1].powi(2) + rvec[2].powi(2)).sqrt();
    if theta < 1e-12 {
        // first order expansion R ~ I + [r]x
        return [
            [1.0, -rvec[2], rvec[1]],
            [rvec[2], 1.0, -rvec[0]],
            [-rvec[1], rvec[0], 1.0],
        ];
    }
    axis_angle_to_rotation_matrix(rvec, theta).unwrap_or(IDENTITY3)
}

/// Convert a rotation matrix into a Rodrigues rotation vector.
///
/// PRECONDITION: `r` is a proper rotation matrix.
pub fn rotation_matrix_to_rodrigues(r: &Mat3) -> [f64; 3] {
    let rx = r[2][1] - r[1][2];
    let ry = r[0][2] - r[2][0];
    let rz = r[1][0] - r[0][1];

    let s = 0.5 * (rx * rx + ry * ry + rz * rz).sqrt();
    let c = ((r[0][0] + r[1][1] + r[2][2] - 1.0) * 0.5).clamp(-1.0, 1.0);

    if s < 1e-5 {
        if c > 0.0 {
            // near identity
            return [0.5 * rx, 0.5 * ry, 0.5 * rz];
        }

        // near a half turn: R + I = 2 * a * a^T
        let diag = [r[0][0], r[1][1], r[2][2]];
        let k = (0..3)
            .max_by(|&a, &b| diag[a].total_cmp(&diag[b]))
            .unwrap_or(0);
        let ak = ((diag[k] + 1.0) * 0.5).max(0.0).sqrt();
        let mut axis = [0.0; 3];
        for (j, val) in axis.iter_mut().enumerate() {
            *val = if j == k {
                ak
            } else {
                (r[k][j] + r[j][k]) / (4.0 * ak)
            };
        }
        let theta = c.acos();
        return [axis[0] * theta, axis[1] * theta, axis[2] * theta];
    }

    let theta = s.atan2(c);
    let factor = theta / (2.0 * s);
    [rx * factor, ry * factor, rz * factor]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_axis_angle_to_rotation_matrix() -> Result<(), Box<dyn std::error::Error>> {
        let axis = [1.0, 0.0, 0.0];
        let angle = std::f64::consts::PI / 2.0;
        let rotation = axis_angle_to_rotation_matrix(&axis, angle)?;
        let expected = [[1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]];
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(rotation[i][j], expected[i][j], epsilon = 1e-12);
            }
        }
        Ok(())
    }

    #[test]
    fn test_axis_angle_zero_axis() {
        assert!(axis_angle_to_rotation_matrix(&[0.0; 3], 1.0).is_err());
    }

    #[test]
    fn test_rodrigues_roundtrip() {
        for rvec in [
            [0.1, -0.2, 0.3],
            [1.2, 0.4, -0.7],
            [0.0, 0.0, 0.0],
            [0.0, 3.0, 0.0],
        ] {
            let r = rodrigues_to_rotation_matrix(&rvec);
            let back = rotation_matrix_to_rodrigues(&r);
            for i in 0..3 {
                assert_relative_eq!(back[i], rvec[i], epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_rodrigues_half_turn() {
        let pi = std::f64::consts::PI;
        let r = rodrigues_to_rotation_matrix(&[0.0, 0.0, pi]);
        let back = rotation_matrix_to_rodrigues(&r);
        assert_relative_eq!(back[2].abs(), pi, epsilon = 1e-6);
        assert_relative_eq!(back[0], 0.0, epsilon = 1e-6);
        assert_relative_eq!(back[1], 0.0, epsilon = 1e-6);
    }
}
