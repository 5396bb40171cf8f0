use std::{
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use procam_calib::{Correspondence, MarkerSet};
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;

/// A 2d position in a marker document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Point2 {
    /// x coordinate.
    pub x: f64,
    /// y coordinate.
    pub y: f64,
}

/// A 3d position in a marker document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Point3 {
    /// x coordinate.
    pub x: f64,
    /// y coordinate.
    pub y: f64,
    /// z coordinate.
    pub z: f64,
}

/// A single marker entry. Missing fields default to zero and an empty label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerEntry {
    /// Position on the projected image in pixels.
    pub image: Point2,
    /// Position on the physical object.
    pub object: Point3,
    /// Free-form label.
    pub label: String,
}

impl MarkerEntry {
    /// The correspondence described by this entry.
    pub fn correspondence(&self) -> Correspondence {
        Correspondence::new(
            [self.image.x, self.image.y],
            [self.object.x, self.object.y, self.object.z],
        )
    }
}

/// The saved marker list. The position in `markers` is the marker index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerDocument {
    /// Markers in order.
    pub markers: Vec<MarkerEntry>,
}

impl MarkerDocument {
    /// Capture the markers of a set in order.
    pub fn from_marker_set(set: &MarkerSet) -> Self {
        let markers = set
            .iter()
            .map(|m| {
                let [ix, iy] = m.image_point();
                let [ox, oy, oz] = m.object_point();
                MarkerEntry {
                    image: Point2 { x: ix, y: iy },
                    object: Point3 {
                        x: ox,
                        y: oy,
                        z: oz,
                    },
                    label: m.label.clone(),
                }
            })
            .collect();
        Self { markers }
    }

    /// Replace every marker of `set` with the ones in this document.
    ///
    /// The loaded markers start without a pending recalibration.
    pub fn apply_to(&self, set: &mut MarkerSet) {
        set.replace_all(
            self.markers
                .iter()
                .map(|e| (e.label.clone(), e.correspondence())),
        );
    }
}

/// Read a marker document.
///
/// # Arguments
///
/// * `path` - The path to the JSON marker document.
pub fn read_markers(path: impl AsRef<Path>) -> Result<MarkerDocument, PersistenceError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(PersistenceError::FileDoesNotExist(path.to_path_buf()));
    }

    let file = std::fs::File::open(path)?;
    let document: MarkerDocument = serde_json::from_reader(BufReader::new(file))?;
    log::debug!(
        "loaded {} markers from {}",
        document.markers.len(),
        path.display()
    );
    Ok(document)
}

/// Load a marker document into `set`, replacing its markers.
///
/// `set` is left untouched if the document cannot be read.
pub fn read_markers_into(
    path: impl AsRef<Path>,
    set: &mut MarkerSet,
) -> Result<(), PersistenceError> {
    let document = read_markers(path)?;
    document.apply_to(set);
    Ok(())
}

/// Write the markers of `set` as a JSON document.
///
/// # Arguments
///
/// * `path` - The path to the JSON marker document.
/// * `set` - The markers to save.
pub fn write_markers(path: impl AsRef<Path>, set: &MarkerSet) -> Result<(), PersistenceError> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(std::fs::File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, &MarkerDocument::from_marker_set(set))?;
    writer.flush()?;
    log::debug!("saved {} markers to {}", set.len(), path.display());
    Ok(())
}
