/// A 3x3 matrix stored row-major as `m[row][col]`.
pub type Mat3 = [[f64; 3]; 3];

/// A 4x4 matrix stored as `m[row][col]`.
///
/// All 4x4 matrices in this crate follow the row-vector convention `p' = p * M`,
/// so the translation lives in row 3. This is the same memory order as an
/// OpenGL column-major matrix and can be uploaded to a renderer as-is.
pub type Mat4 = [[f64; 4]; 4];

/// The 3x3 identity matrix.
pub const IDENTITY3: Mat3 = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// The 4x4 identity matrix.
pub const IDENTITY4: Mat4 = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// Compute the dot product of two 3d vectors.
pub fn dot_product3(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Compute the cross product of two 3d vectors.
pub fn cross_vec3(a: &[f64; 3], b: &[f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// Euclidean norm of a 3d vector.
pub fn norm3(a: &[f64; 3]) -> f64 {
    dot_product3(a, a).sqrt()
}

/// Multiply a 3x3 matrix by a 3d column vector.
pub fn mat33_mul_vec3(m: &Mat3, v: &[f64; 3]) -> [f64; 3] {
    [
        dot_product3(&m[0], v),
        dot_product3(&m[1], v),
        dot_product3(&m[2], v),
    ]
}

/// Multiply two 3x3 matrices.
pub fn matmul33(a: &Mat3, b: &Mat3) -> Mat3 {
    let mut m = [[0.0; 3]; 3];
    for (i, row) in m.iter_mut().enumerate() {
        for (j, val) in row.iter_mut().enumerate() {
            *val = a[i][0] * b[0][j] + a[i][1] * b[1][j] + a[i][2] * b[2][j];
        }
    }
    m
}

/// Transpose a 3x3 matrix.
pub fn transpose33(m: &Mat3) -> Mat3 {
    [
        [m[0][0], m[1][0], m[2][0]],
        [m[0][1], m[1][1], m[2][1]],
        [m[0][2], m[1][2], m[2][2]],
    ]
}

/// Compute the determinant of a 3x3 matrix.
pub fn det_mat33(m: &Mat3) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

/// Scale a 3x3 matrix in place so that its bottom-right element equals one.
///
/// Returns `false` and leaves the matrix untouched when that element is too close
/// to zero to divide by.
pub fn normalize_mat33_inplace(m: &mut Mat3) -> bool {
    let scale = m[2][2];
    if scale.abs() < f64::EPSILON {
        return false;
    }
    for row in m.iter_mut() {
        for val in row.iter_mut() {
            *val /= scale;
        }
    }
    true
}

/// Transpose a 4x4 matrix.
pub fn transpose44(m: &Mat4) -> Mat4 {
    let mut t = [[0.0; 4]; 4];
    for (i, row) in m.iter().enumerate() {
        for (j, val) in row.iter().enumerate() {
            t[j][i] = *val;
        }
    }
    t
}

/// Multiply two 4x4 matrices.
pub fn matmul44(a: &Mat4, b: &Mat4) -> Mat4 {
    let mut m = [[0.0; 4]; 4];
    for (i, row) in m.iter_mut().enumerate() {
        for (j, val) in row.iter_mut().enumerate() {
            *val = (0..4).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    m
}

/// Multiply a homogeneous row vector by a 4x4 matrix, `p' = p * M`.
pub fn vec4_mul_mat44(p: &[f64; 4], m: &Mat4) -> [f64; 4] {
    let mut out = [0.0; 4];
    for (j, val) in out.iter_mut().enumerate() {
        *val = p[0] * m[0][j] + p[1] * m[1][j] + p[2] * m[2][j] + p[3] * m[3][j];
    }
    out
}

/// Transform a 3d point with a 4x4 matrix in the row-vector convention.
///
/// The result is divided by the homogeneous coordinate. Returns `None` when the
/// point maps to infinity.
pub fn transform_point(m: &Mat4, p: &[f64; 3]) -> Option<[f64; 3]> {
    let q = vec4_mul_mat44(&[p[0], p[1], p[2], 1.0], m);
    if q[3].abs() < f64::EPSILON {
        return None;
    }
    Some([q[0] / q[3], q[1] / q[3], q[2] / q[3]])
}

/// Project a rotation-like 3x3 matrix onto the closest proper rotation.
///
/// Uses the SVD `M = U S V^T` and returns `U V^T` with the sign of the last
/// singular direction flipped if needed so that the determinant is `+1`.
pub fn closest_rotation(m: &Mat3) -> Mat3 {
    let svd = to_faer_mat3(m).svd();
    let u = from_faer_mat3(&svd.u().to_owned());
    let v = from_faer_mat3(&svd.v().to_owned());
    let mut r = matmul33(&u, &transpose33(&v));
    if det_mat33(&r) < 0.0 {
        let mut u_flip = u;
        for row in u_flip.iter_mut() {
            row[2] = -row[2];
        }
        r = matmul33(&u_flip, &transpose33(&v));
    }
    r
}

/// Normalize a set of 2d points to zero mean and an average distance of sqrt(2).
///
/// Returns the normalized points and the similarity transform `T` such that
/// `x_norm = T * x`. Returns `None` if all points coincide.
pub fn normalize_points_2d(x: &[[f64; 2]]) -> Option<(Vec<[f64; 2]>, Mat3)> {
    if x.is_empty() {
        return None;
    }
    let n = x.len() as f64;
    let (mut mx, mut my) = (0.0, 0.0);
    for p in x {
        mx += p[0];
        my += p[1];
    }
    mx /= n;
    my /= n;

    let mean_dist = x
        .iter()
        .map(|p| ((p[0] - mx).powi(2) + (p[1] - my).powi(2)).sqrt())
        .sum::<f64>()
        / n;

    if mean_dist < 1e-12 || !mean_dist.is_finite() {
        return None;
    }
    let scale = std::f64::consts::SQRT_2 / mean_dist;

    let xn = x
        .iter()
        .map(|p| [(p[0] - mx) * scale, (p[1] - my) * scale])
        .collect();

    // T = [[s, 0, -s*mx], [0, s, -s*my], [0, 0, 1]]
    let t = [
        [scale, 0.0, -scale * mx],
        [0.0, scale, -scale * my],
        [0.0, 0.0, 1.0],
    ];
    Some((xn, t))
}

/// Invert a similarity transform produced by [`normalize_points_2d`].
pub fn invert_similarity2d(t: &Mat3) -> Mat3 {
    let s = t[0][0];
    [
        [1.0 / s, 0.0, -t[0][2] / s],
        [0.0, 1.0 / s, -t[1][2] / s],
        [0.0, 0.0, 1.0],
    ]
}

/// Compute the centroid of a set of 3d points.
pub fn centroid3(points: &[[f64; 3]]) -> [f64; 3] {
    let n = points.len().max(1) as f64;
    let sum = points.iter().fold([0.0; 3], |acc, p| {
        [acc[0] + p[0], acc[1] + p[1], acc[2] + p[2]]
    });
    [sum[0] / n, sum[1] / n, sum[2] / n]
}

pub(crate) fn to_faer_mat3(m: &Mat3) -> faer::Mat<f64> {
    faer::mat![
        [m[0][0], m[0][1], m[0][2]],
        [m[1][0], m[1][1], m[1][2]],
        [m[2][0], m[2][1], m[2][2]]
    ]
}

pub(crate) fn from_faer_mat3(m: &faer::Mat<f64>) -> Mat3 {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, val) in row.iter_mut().enumerate() {
            *val = m.read(i, j);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_det_mat33() {
        let m = [[2.0, 0.0, 0.0], [0.0, 3.0, 0.0], [0.0, 0.0, 4.0]];
        assert_relative_eq!(det_mat33(&m), 24.0);
        let singular = [[1.0, 2.0, 3.0], [2.0, 4.0, 6.0], [0.0, 1.0, 1.0]];
        assert_relative_eq!(det_mat33(&singular), 0.0);
    }

    #[test]
    fn test_normalize_mat33_inplace() {
        let mut m = [[2.0, 0.0, 4.0], [0.0, 2.0, 6.0], [0.0, 0.0, 2.0]];
        assert!(normalize_mat33_inplace(&mut m));
        assert_eq!(m, [[1.0, 0.0, 2.0], [0.0, 1.0, 3.0], [0.0, 0.0, 1.0]]);

        let mut zero = [[1.0; 3], [1.0; 3], [1.0, 1.0, 0.0]];
        assert!(!normalize_mat33_inplace(&mut zero));
    }

    #[test]
    fn test_transform_point_translation_row() {
        let mut m = IDENTITY4;
        m[3] = [1.0, 2.0, 3.0, 1.0];
        let p = transform_point(&m, &[1.0, 1.0, 1.0]).unwrap();
        assert_eq!(p, [2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_closest_rotation_of_scaled_rotation() {
        let r = [[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]];
        let mut scaled = r;
        for row in scaled.iter_mut() {
            for val in row.iter_mut() {
                *val *= 3.5;
            }
        }
        let projected = closest_rotation(&scaled);
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(projected[i][j], r[i][j], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_normalize_points_2d() {
        let pts = [[0.0, 0.0], [2.0, 0.0], [2.0, 2.0], [0.0, 2.0]];
        let (xn, t) = normalize_points_2d(&pts).unwrap();
        let mean_dist = xn
            .iter()
            .map(|p| (p[0] * p[0] + p[1] * p[1]).sqrt())
            .sum::<f64>()
            / 4.0;
        assert_relative_eq!(mean_dist, std::f64::consts::SQRT_2, epsilon = 1e-12);

        let t_inv = invert_similarity2d(&t);
        let back = matmul33(&t_inv, &t);
        for i in 0..3 {
            for j in 0..3 {
                assert_relative_eq!(back[i][j], IDENTITY3[i][j], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_normalize_points_2d_coincident() {
        let pts = [[1.0, 1.0]; 4];
        assert!(normalize_points_2d(&pts).is_none());
    }
}
