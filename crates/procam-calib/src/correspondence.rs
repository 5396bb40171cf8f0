use serde::{Deserialize, Serialize};

/// Squared length below which an object point counts as unset.
pub const UNSET_EPSILON: f64 = 1e-6;

/// A single projected image point paired with its known object point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Correspondence {
    /// Image-space position in pixels.
    pub image_point: [f64; 2],
    /// Object-space position.
    pub object_point: [f64; 3],
}

impl Correspondence {
    /// Create a new correspondence.
    pub fn new(image_point: [f64; 2], object_point: [f64; 3]) -> Self {
        Self {
            image_point,
            object_point,
        }
    }

    /// Whether the object point has been placed.
    ///
    /// Markers start with their object point at the origin, so a point with a
    /// negligible magnitude is considered unset.
    pub fn is_set(&self) -> bool {
        let p = &self.object_point;
        p[0] * p[0] + p[1] * p[1] + p[2] * p[2] > UNSET_EPSILON
    }
}

/// The two kinds of solve a correspondence set can feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveMode {
    /// Planar homography between the object plane and the image.
    Homography,
    /// Full camera pose with intrinsics and extrinsics.
    Pose,
}

impl SolveMode {
    /// Minimum number of correspondences for this mode.
    pub fn minimum_size(&self) -> usize {
        match self {
            SolveMode::Homography => 4,
            SolveMode::Pose => 7,
        }
    }
}

/// An ordered collection of correspondences.
///
/// The set remembers the marker revision it was taken from so that a solve result
/// can later be matched against the marker state that produced it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrespondenceSet {
    entries: Vec<Correspondence>,
    revision: u64,
}

impl CorrespondenceSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set from existing correspondences.
    pub fn from_correspondences(entries: Vec<Correspondence>) -> Self {
        Self {
            entries,
            revision: 0,
        }
    }

    /// Tag the set with the marker revision it was taken from.
    pub fn with_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }

    /// Marker revision this set was taken from, zero if built directly.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Append a correspondence.
    pub fn push(&mut self, correspondence: Correspondence) {
        self.entries.push(correspondence);
    }

    /// Remove the correspondence at `index`, returning it if it existed.
    pub fn remove(&mut self, index: usize) -> Option<Correspondence> {
        (index < self.entries.len()).then(|| self.entries.remove(index))
    }

    /// Remove all correspondences.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of correspondences.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get the correspondence at `index`.
    pub fn get(&self, index: usize) -> Option<&Correspondence> {
        self.entries.get(index)
    }

    /// Iterate over the correspondences in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Correspondence> {
        self.entries.iter()
    }

    /// Correspondences as a slice.
    pub fn as_slice(&self) -> &[Correspondence] {
        &self.entries
    }

    /// Minimum number of correspondences for the given mode.
    pub fn minimum_size(mode: SolveMode) -> usize {
        mode.minimum_size()
    }

    /// Whether the set holds enough correspondences for `mode`.
    pub fn has_minimum(&self, mode: SolveMode) -> bool {
        self.len() >= mode.minimum_size()
    }

    /// True only if every object point is set.
    pub fn is_complete(&self) -> bool {
        self.entries.iter().all(Correspondence::is_set)
    }

    /// Indices of correspondences whose object point is unset.
    pub fn incomplete_indices(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_set())
            .map(|(i, _)| i)
            .collect()
    }

    /// A copy of the set without the unset correspondences.
    pub fn without_unset(&self) -> Self {
        Self {
            entries: self.entries.iter().filter(|c| c.is_set()).copied().collect(),
            revision: self.revision,
        }
    }

    /// Image points in order.
    pub fn image_points(&self) -> Vec<[f64; 2]> {
        self.entries.iter().map(|c| c.image_point).collect()
    }

    /// Object points in order.
    pub fn object_points(&self) -> Vec<[f64; 3]> {
        self.entries.iter().map(|c| c.object_point).collect()
    }

    /// Object points projected onto the xy plane, dropping z.
    pub fn object_points_2d(&self) -> Vec<[f64; 2]> {
        self.entries
            .iter()
            .map(|c| [c.object_point[0], c.object_point[1]])
            .collect()
    }
}

impl FromIterator<Correspondence> for CorrespondenceSet {
    fn from_iter<T: IntoIterator<Item = Correspondence>>(iter: T) -> Self {
        Self::from_correspondences(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a CorrespondenceSet {
    type Item = &'a Correspondence;
    type IntoIter = std::slice::Iter<'a, Correspondence>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
