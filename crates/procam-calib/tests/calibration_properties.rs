use approx::assert_relative_eq;
use procam_calib::{
    linalg, solve_homography, solve_pose, CalibError, CameraExtrinsics, CameraIntrinsics,
    CameraParam, Correspondence, CorrespondenceSet, ImageSize, MarkerSet, PoseMode, PoseOptions,
    SolveMode,
};

fn unit_square() -> Vec<Correspondence> {
    vec![
        Correspondence::new([0.0, 0.0], [0.0, 0.0, 0.0]),
        Correspondence::new([100.0, 0.0], [1.0, 0.0, 0.0]),
        Correspondence::new([100.0, 100.0], [1.0, 1.0, 0.0]),
        Correspondence::new([0.0, 100.0], [0.0, 1.0, 0.0]),
    ]
}

fn object_points() -> Vec<[f64; 3]> {
    vec![
        [0.0, 0.0, 0.1],
        [1.0, 0.0, 0.0],
        [1.0, 1.0, 0.2],
        [0.0, 1.0, 0.0],
        [0.5, 0.5, 0.6],
        [0.2, 0.8, 0.3],
        [0.8, 0.3, 0.4],
        [0.4, 0.1, 0.5],
    ]
}

fn projected_set(k: &CameraIntrinsics, pose: &CameraExtrinsics, count: usize) -> CorrespondenceSet {
    object_points()
        .into_iter()
        .take(count)
        .map(|p| Correspondence::new(k.project(&pose.transform_point(&p)).unwrap(), p))
        .collect()
}

#[test]
fn homography_point_count() {
    let mut set = CorrespondenceSet::from_correspondences(unit_square());
    let last = set.remove(3).unwrap();
    assert_eq!(
        solve_homography(&set).err(),
        Some(CalibError::InsufficientPoints {
            required: 4,
            actual: 3
        })
    );

    set.push(last);
    assert!(set.has_minimum(SolveMode::Homography));
    assert!(solve_homography(&set).is_ok());
}

#[test]
fn homography_unit_square_maps_center() -> Result<(), Box<dyn std::error::Error>> {
    let set = CorrespondenceSet::from_correspondences(unit_square());
    let solution = solve_homography(&set)?;

    let center = linalg::transform_point(&solution.model_view, &[0.5, 0.5, 0.0]).unwrap();
    assert_relative_eq!(center[0], 50.0, epsilon = 1e-3);
    assert_relative_eq!(center[1], 50.0, epsilon = 1e-3);
    assert_relative_eq!(solution.homography[2][2], 1.0);
    Ok(())
}

#[test]
fn pose_point_count() -> Result<(), Box<dyn std::error::Error>> {
    let size = ImageSize::new(640, 480);
    let k = CameraIntrinsics::new(650.0, 650.0, 320.0, 240.0);
    let pose = CameraExtrinsics::new([0.1, -0.25, 0.05], [-0.5, -0.4, 4.0]);

    let six = projected_set(&k, &pose, 6);
    assert_eq!(
        solve_pose(&six, size, &PoseOptions::default()).err(),
        Some(CalibError::InsufficientPoints {
            required: 7,
            actual: 6
        })
    );

    let seven = projected_set(&k, &pose, 7);
    let solution = solve_pose(&seven, size, &PoseOptions::default())?;
    assert!(solution.residual.is_finite());
    assert!(solution.residual >= 0.0);
    Ok(())
}

#[test]
fn fixed_fov_residual_is_one() -> Result<(), Box<dyn std::error::Error>> {
    let size = ImageSize::new(1920, 1080);
    let k = CameraIntrinsics::from_fov(size, 35.0, [0.0, 0.0]);
    let pose = CameraExtrinsics::new([-0.2, 0.15, 0.0], [-0.5, -0.5, 3.0]);

    let options = PoseOptions::new().with_forced_fov(35.0);
    let solution = solve_pose(&projected_set(&k, &pose, 8), size, &options)?;
    assert_eq!(solution.mode, PoseMode::FixedFov);
    assert_eq!(solution.residual, 1.0);
    assert!(solution.rms_error < 1e-6);
    Ok(())
}

fn with_object_points(points: impl IntoIterator<Item = [f64; 3]>) -> CorrespondenceSet {
    points
        .into_iter()
        .enumerate()
        .map(|(i, p)| Correspondence::new([40.0 * i as f64, 25.0 * (i % 3) as f64], p))
        .collect()
}

#[test]
fn identical_object_points_are_degenerate() {
    let point = [0.3, 0.4, 1.0];

    let result = solve_homography(&with_object_points([point; 4]));
    assert!(matches!(result, Err(CalibError::DegenerateGeometry(_))));

    let set = with_object_points([point; 8]);
    let size = ImageSize::new(640, 480);
    for options in [PoseOptions::default(), PoseOptions::new().with_forced_fov(45.0)] {
        let result = solve_pose(&set, size, &options);
        assert!(matches!(result, Err(CalibError::DegenerateGeometry(_))));
    }
}

#[test]
fn collinear_object_points_are_degenerate() {
    let set = with_object_points((0..8).map(|i| {
        let t = i as f64;
        [1.0 + t, 2.0 * t, 0.5 * t]
    }));
    let size = ImageSize::new(640, 480);
    for options in [PoseOptions::default(), PoseOptions::new().with_forced_fov(45.0)] {
        let result = solve_pose(&set, size, &options);
        assert!(matches!(result, Err(CalibError::DegenerateGeometry(_))));
    }
}

#[test]
fn free_focal_keeps_lens_offset() -> Result<(), Box<dyn std::error::Error>> {
    let size = ImageSize::new(1280, 800);
    let offset = [0.0, 200.0];
    let k = CameraIntrinsics::new(1500.0, 1500.0, 640.0 + offset[0], 400.0 + offset[1]);
    let pose = CameraExtrinsics::new([0.3, 0.1, 0.0], [-0.5, -0.6, 5.0]);

    let options = PoseOptions::new().with_lens_offset(offset);
    let solution = solve_pose(&projected_set(&k, &pose, 8), size, &options)?;
    assert_eq!(solution.mode, PoseMode::FreeFocal);
    assert_eq!(solution.intrinsics.principal_point(), [640.0, 600.0]);
    assert_relative_eq!(solution.intrinsics.fx, 1500.0, max_relative = 1e-3);
    Ok(())
}

#[test]
fn camera_param_reprojects_solution() -> Result<(), Box<dyn std::error::Error>> {
    let size = ImageSize::new(1024, 768);
    let k = CameraIntrinsics::new(1000.0, 1000.0, 512.0, 384.0);
    let pose = CameraExtrinsics::new([0.05, 0.2, -0.1], [-0.4, -0.5, 3.5]);
    let set = projected_set(&k, &pose, 8);

    let solution = solve_pose(&set, size, &PoseOptions::default())?;
    let param: CameraParam = solution.camera_param(0.1, 50.0)?;
    for c in set.iter() {
        let uv = param.project_to_pixel(size, &c.object_point).unwrap();
        assert_relative_eq!(uv[0], c.image_point[0], epsilon = 1e-3);
        assert_relative_eq!(uv[1], c.image_point[1], epsilon = 1e-3);
    }
    Ok(())
}

#[test]
fn marker_edits_invalidate_solve() -> Result<(), Box<dyn std::error::Error>> {
    let mut markers = MarkerSet::new();
    let ids = unit_square()
        .into_iter()
        .map(|c| markers.add_marker_at("", c.image_point, c.object_point))
        .collect::<Vec<_>>();

    let solution = solve_homography(&markers.snapshot())?;
    markers.set_image_position(ids[2], [101.0, 99.0]);
    assert!(!markers.mark_solved(solution.solved));
    assert!(markers.needs_recalibration());

    let solution = solve_homography(&markers.snapshot())?;
    assert!(markers.mark_solved(solution.solved));
    assert!(!markers.needs_recalibration());
    Ok(())
}
