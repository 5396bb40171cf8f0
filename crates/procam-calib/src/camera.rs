use serde::{Deserialize, Serialize};

use crate::error::CalibError;
use crate::linalg::{self, Mat3, Mat4};
use crate::transforms;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
}

impl ImageSize {
    /// Create a new image size.
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Image center in pixels.
    pub fn center(&self) -> [f64; 2] {
        [self.width as f64 / 2.0, self.height as f64 / 2.0]
    }

    pub(crate) fn validate(&self) -> Result<(), CalibError> {
        if self.width == 0 || self.height == 0 {
            return Err(CalibError::InvalidParameter(format!(
                "image size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

/// Pinhole intrinsics `K = [[fx, 0, cx], [0, fy, cy], [0, 0, 1]]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    /// Focal length along x in pixels.
    pub fx: f64,
    /// Focal length along y in pixels.
    pub fy: f64,
    /// Principal point x in pixels.
    pub cx: f64,
    /// Principal point y in pixels.
    pub cy: f64,
}

impl CameraIntrinsics {
    /// Create intrinsics from focal lengths and principal point.
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// Build the seed intrinsics used by the pose solver.
    ///
    /// The focal length is `(height / 2) * tan(fov / 2)` with `fov` in degrees,
    /// square pixels, and the principal point at the image center shifted by
    /// `lens_offset` pixels.
    pub fn from_fov(image_size: ImageSize, fov_deg: f64, lens_offset: [f64; 2]) -> Self {
        let f = (image_size.height as f64 / 2.0) * (fov_deg / 2.0).to_radians().tan();
        let [cx, cy] = image_size.center();
        Self {
            fx: f,
            fy: f,
            cx: cx + lens_offset[0],
            cy: cy + lens_offset[1],
        }
    }

    /// The 3x3 camera matrix.
    pub fn camera_matrix(&self) -> Mat3 {
        [
            [self.fx, 0.0, self.cx],
            [0.0, self.fy, self.cy],
            [0.0, 0.0, 1.0],
        ]
    }

    /// Principal point in pixels.
    pub fn principal_point(&self) -> [f64; 2] {
        [self.cx, self.cy]
    }

    /// Project a point in camera coordinates to pixels.
    ///
    /// Returns `None` for points on or behind the camera plane.
    pub fn project(&self, point_cam: &[f64; 3]) -> Option<[f64; 2]> {
        if point_cam[2] <= f64::EPSILON {
            return None;
        }
        let inv_z = 1.0 / point_cam[2];
        Some([
            self.fx * point_cam[0] * inv_z + self.cx,
            self.fy * point_cam[1] * inv_z + self.cy,
        ])
    }

    /// Map a pixel to normalized image coordinates `K^-1 * [u, v, 1]`.
    pub fn unproject(&self, pixel: &[f64; 2]) -> [f64; 2] {
        [
            (pixel[0] - self.cx) / self.fx,
            (pixel[1] - self.cy) / self.fy,
        ]
    }
}

/// Camera pose as a Rodrigues rotation vector and a translation.
///
/// Maps object coordinates into the camera frame, `X_cam = R * X + t`, with the
/// camera looking down +z, +x to the right and +y down.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CameraExtrinsics {
    /// Rodrigues rotation vector.
    pub rvec: [f64; 3],
    /// Translation vector.
    pub tvec: [f64; 3],
}

impl CameraExtrinsics {
    /// Create extrinsics from a rotation vector and a translation.
    pub fn new(rvec: [f64; 3], tvec: [f64; 3]) -> Self {
        Self { rvec, tvec }
    }

    /// Create extrinsics from a rotation matrix and a translation.
    pub fn from_rotation_matrix(rotation: &Mat3, tvec: [f64; 3]) -> Self {
        Self {
            rvec: transforms::rotation_matrix_to_rodrigues(rotation),
            tvec,
        }
    }

    /// The rotation as a 3x3 matrix.
    pub fn rotation_matrix(&self) -> Mat3 {
        transforms::rodrigues_to_rotation_matrix(&self.rvec)
    }

    /// Transform an object point into the camera frame.
    pub fn transform_point(&self, point: &[f64; 3]) -> [f64; 3] {
        let p = linalg::mat33_mul_vec3(&self.rotation_matrix(), point);
        [p[0] + self.tvec[0], p[1] + self.tvec[1], p[2] + self.tvec[2]]
    }
}

/// The persisted calibration artifact: projection and modelview matrices.
///
/// Both matrices follow the row-vector convention of [`Mat4`] and describe an
/// OpenGL-style camera: the modelview is the pose `[R | t]`, the projection is a
/// frustum built from the intrinsics and clip planes, with the flip from the
/// y-down/z-forward camera frame to the y-up/z-backward eye frame baked in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraParam {
    /// Projection matrix.
    pub projection: Mat4,
    /// Modelview matrix.
    pub modelview: Mat4,
}

impl Default for CameraParam {
    fn default() -> Self {
        Self {
            projection: linalg::IDENTITY4,
            modelview: linalg::IDENTITY4,
        }
    }
}

impl CameraParam {
    /// Create a camera parameter from raw matrices.
    pub fn from_matrices(projection: Mat4, modelview: Mat4) -> Self {
        Self {
            projection,
            modelview,
        }
    }

    /// Derive the projection and modelview matrices from a solved camera.
    ///
    /// # Arguments
    ///
    /// * `image_size` - The image dimensions the intrinsics refer to.
    /// * `intrinsics` - The camera intrinsics.
    /// * `extrinsics` - The camera pose.
    /// * `near` - Near clip plane distance, must be positive.
    /// * `far` - Far clip plane distance, must be larger than `near`.
    pub fn new(
        image_size: ImageSize,
        intrinsics: &CameraIntrinsics,
        extrinsics: &CameraExtrinsics,
        near: f64,
        far: f64,
    ) -> Result<Self, CalibError> {
        image_size.validate()?;
        if !(near > 0.0 && far > near) {
            return Err(CalibError::InvalidParameter(format!(
                "clip planes must satisfy 0 < near < far, got near={near} far={far}"
            )));
        }
        if intrinsics.fx <= 0.0 || intrinsics.fy <= 0.0 {
            return Err(CalibError::InvalidParameter(format!(
                "focal lengths must be positive, got fx={} fy={}",
                intrinsics.fx, intrinsics.fy
            )));
        }

        let (w, h) = (image_size.width as f64, image_size.height as f64);
        let CameraIntrinsics { fx, fy, cx, cy } = *intrinsics;

        // frustum bounds at the near plane
        let left = near * (-cx) / fx;
        let right = near * (w - cx) / fx;
        let bottom = near * (cy - h) / fy;
        let top = near * cy / fy;

        // column-vector frustum, as built by glFrustum
        let frustum: Mat4 = [
            [
                2.0 * near / (right - left),
                0.0,
                (right + left) / (right - left),
                0.0,
            ],
            [
                0.0,
                2.0 * near / (top - bottom),
                (top + bottom) / (top - bottom),
                0.0,
            ],
            [
                0.0,
                0.0,
                -(far + near) / (far - near),
                -2.0 * far * near / (far - near),
            ],
            [0.0, 0.0, -1.0, 0.0],
        ];
        // camera frame (y down, z forward) to eye frame (y up, z backward)
        let flip: Mat4 = [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, -1.0, 0.0, 0.0],
            [0.0, 0.0, -1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        let projection = linalg::transpose44(&linalg::matmul44(&frustum, &flip));

        let r = extrinsics.rotation_matrix();
        let t = extrinsics.tvec;
        let modelview = [
            [r[0][0], r[1][0], r[2][0], 0.0],
            [r[0][1], r[1][1], r[2][1], 0.0],
            [r[0][2], r[1][2], r[2][2], 0.0],
            [t[0], t[1], t[2], 1.0],
        ];

        Ok(Self {
            projection,
            modelview,
        })
    }

    /// Project an object point to pixel coordinates of an image of `image_size`.
    ///
    /// Runs the point through modelview and projection, then maps normalized
    /// device coordinates to pixels with the origin at the top-left corner.
    /// Returns `None` for points behind the camera.
    pub fn project_to_pixel(&self, image_size: ImageSize, point: &[f64; 3]) -> Option<[f64; 2]> {
        let eye = linalg::vec4_mul_mat44(&[point[0], point[1], point[2], 1.0], &self.modelview);
        let clip = linalg::vec4_mul_mat44(&eye, &self.projection);
        if clip[3] <= f64::EPSILON {
            return None;
        }
        let x_ndc = clip[0] / clip[3];
        let y_ndc = clip[1] / clip[3];
        Some([
            (x_ndc + 1.0) * image_size.width as f64 / 2.0,
            (1.0 - y_ndc) * image_size.height as f64 / 2.0,
        ])
    }
}
