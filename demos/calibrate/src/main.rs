use argh::FromArgs;
use std::path::PathBuf;

use procam::calib::{
    self, linalg, CameraParam, HomographyOptions, ImageSize, MarkerSet, PoseOptions, UnsetPolicy,
};
use procam::io;

#[derive(FromArgs)]
/// Calibrate a projector from a saved marker document
struct Args {
    /// path to the JSON marker document
    #[argh(option)]
    markers: PathBuf,

    /// solve mode, either "pose" or "homography"
    #[argh(option, default = "String::from(\"pose\")")]
    mode: String,

    /// projector image width in pixels
    #[argh(option, default = "1920")]
    width: usize,

    /// projector image height in pixels
    #[argh(option, default = "1080")]
    height: usize,

    /// forced vertical field of view in degrees, 0 to estimate the focal length
    #[argh(option, default = "0.0")]
    fov: f64,

    /// horizontal lens offset in pixels
    #[argh(option, default = "0.0")]
    lens_offset_x: f64,

    /// vertical lens offset in pixels
    #[argh(option, default = "0.0")]
    lens_offset_y: f64,

    /// near clip plane distance
    #[argh(option, default = "0.1")]
    near: f64,

    /// far clip plane distance
    #[argh(option, default = "1000.0")]
    far: f64,

    /// drop markers whose object point has not been placed
    #[argh(switch)]
    exclude_unset: bool,

    /// where to write the camera parameter file
    #[argh(option)]
    output: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let mut markers = MarkerSet::new();
    io::read_markers_into(&args.markers, &mut markers)?;
    log::info!("loaded {} markers from {:?}", markers.len(), args.markers);

    let unset_policy = if args.exclude_unset {
        UnsetPolicy::Exclude
    } else {
        UnsetPolicy::Keep
    };
    let snapshot = markers.snapshot();

    let (param, solved) = match args.mode.as_str() {
        "pose" => {
            let options = PoseOptions::new()
                .with_forced_fov(args.fov)
                .with_lens_offset([args.lens_offset_x, args.lens_offset_y])
                .with_unset_policy(unset_policy);
            let size = ImageSize::new(args.width, args.height);
            let (param, solution) =
                calib::solve_camera_param(&snapshot, size, args.near, args.far, &options)?;

            let k = &solution.intrinsics;
            println!("mode: {:?}", solution.mode);
            println!(
                "intrinsics: fx={:.3} fy={:.3} cx={:.3} cy={:.3}",
                k.fx, k.fy, k.cx, k.cy
            );
            println!("rvec: {:?}", solution.extrinsics.rvec);
            println!("tvec: {:?}", solution.extrinsics.tvec);
            println!(
                "residual: {:.6} (rms {:.6} px)",
                solution.residual, solution.rms_error
            );
            (param, solution.solved)
        }
        "homography" => {
            let options = HomographyOptions::default().with_unset_policy(unset_policy);
            let solution = calib::solve_homography_with(&snapshot, &options)?;

            println!("homography: {:?}", solution.homography);
            println!("rms: {:.6} px", solution.rms_error);
            (
                CameraParam::from_matrices(linalg::IDENTITY4, solution.model_view),
                solution.solved,
            )
        }
        other => return Err(format!("unknown mode: {other}").into()),
    };

    if markers.mark_solved(solved) {
        log::info!("markers are up to date");
    }

    if let Some(output) = args.output {
        io::write_camera_param(&output, &param)?;
        log::info!("camera parameter written to {:?}", output);
    } else {
        print!("{}", io::camera_param::format_camera_param(&param));
    }

    Ok(())
}
