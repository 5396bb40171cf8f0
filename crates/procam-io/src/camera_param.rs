use std::path::Path;

use procam_calib::{linalg::Mat4, CameraParam};

use crate::error::PersistenceError;

const PROJECTION_HEADER: &str = "#projection";
const MODELVIEW_HEADER: &str = "#modelview";

/// Render a camera parameter in its text form.
///
/// Each matrix is written as a header line followed by four rows of four
/// comma-separated numbers. Numbers use the shortest representation that parses
/// back to the same value.
pub fn format_camera_param(param: &CameraParam) -> String {
    let mut out = String::new();
    for (header, matrix) in [
        (PROJECTION_HEADER, &param.projection),
        (MODELVIEW_HEADER, &param.modelview),
    ] {
        out.push_str(header);
        out.push('\n');
        for row in matrix {
            let line = row.iter().map(|v| v.to_string()).collect::<Vec<_>>();
            out.push_str(&line.join(", "));
            out.push('\n');
        }
    }
    out
}

/// Utility function to parse a single matrix entry
fn parse_part(s: &str) -> Result<f64, PersistenceError> {
    let value = s
        .parse::<f64>()
        .map_err(|e| PersistenceError::ParseError(format!("{}: {}", s, e)))?;
    if !value.is_finite() {
        return Err(PersistenceError::ParseError(format!(
            "{}: matrix entries must be finite",
            s
        )));
    }
    Ok(value)
}

/// Parse one matrix row, accepting commas and/or whitespace between entries.
fn parse_row(line: &str) -> Result<[f64; 4], PersistenceError> {
    let parts = line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    match parts.as_slice() {
        [a, b, c, d] => Ok([parse_part(a)?, parse_part(b)?, parse_part(c)?, parse_part(d)?]),
        _ => Err(PersistenceError::ParseError(format!(
            "Invalid number of matrix entries: {}",
            parts.len()
        ))),
    }
}

fn parse_matrix<'a, I>(lines: &mut I, header: &str) -> Result<Mat4, PersistenceError>
where
    I: Iterator<Item = &'a str>,
{
    match lines.next() {
        Some(line) if line == header => {}
        Some(line) => {
            return Err(PersistenceError::ParseError(format!(
                "expected {}, found {}",
                header, line
            )))
        }
        None => return Err(PersistenceError::ParseError(format!("missing {}", header))),
    }

    let mut matrix = [[0.0; 4]; 4];
    for row in matrix.iter_mut() {
        let line = lines
            .next()
            .ok_or_else(|| PersistenceError::ParseError(format!("truncated {} block", header)))?;
        *row = parse_row(line)?;
    }
    Ok(matrix)
}

/// Parse the text form written by [`format_camera_param`].
///
/// Blank lines and surrounding whitespace are ignored.
pub fn parse_camera_param(text: &str) -> Result<CameraParam, PersistenceError> {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

    let projection = parse_matrix(&mut lines, PROJECTION_HEADER)?;
    let modelview = parse_matrix(&mut lines, MODELVIEW_HEADER)?;

    if let Some(extra) = lines.next() {
        return Err(PersistenceError::ParseError(format!(
            "unexpected trailing content: {}",
            extra
        )));
    }

    Ok(CameraParam::from_matrices(projection, modelview))
}

/// Read a camera parameter file.
///
/// # Arguments
///
/// * `path` - The path to the camera parameter file.
///
/// # Returns
///
/// The parsed camera parameter. Nothing is returned on a malformed file.
pub fn read_camera_param(path: impl AsRef<Path>) -> Result<CameraParam, PersistenceError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(PersistenceError::FileDoesNotExist(path.to_path_buf()));
    }

    let text = std::fs::read_to_string(path)?;
    let param = parse_camera_param(&text)?;
    log::debug!("loaded camera parameter from {}", path.display());
    Ok(param)
}

/// Write a camera parameter file, replacing any existing one.
///
/// # Arguments
///
/// * `path` - The path to the camera parameter file.
/// * `param` - The camera parameter to write.
pub fn write_camera_param(
    path: impl AsRef<Path>,
    param: &CameraParam,
) -> Result<(), PersistenceError> {
    let path = path.as_ref();
    std::fs::write(path, format_camera_param(param))?;
    log::debug!("saved camera parameter to {}", path.display());
    Ok(())
}
