//! Editable markers feeding the solvers.
//!
//! A marker pairs a position on the projected image with a position on the
//! physical object. Every edit bumps a revision counter; snapshots carry that
//! revision so a solve result can only clear the recalibration flag of the
//! state it was computed from.

use serde::{Deserialize, Serialize};

use crate::correspondence::{Correspondence, CorrespondenceSet};
use crate::solver::Solved;

/// Stable handle to a marker within a [`MarkerSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarkerId(u64);

/// Display state of a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkerState {
    /// Placed and consumed by the last solve.
    Idle,
    /// The object point has not been placed yet.
    Unset,
    /// Edited since the last solve.
    Dirty,
}

/// A single marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    id: MarkerId,
    /// Free-form label.
    pub label: String,
    correspondence: Correspondence,
    dirty: bool,
}

impl Marker {
    /// Handle of this marker.
    pub fn id(&self) -> MarkerId {
        self.id
    }

    /// Position on the projected image in pixels.
    pub fn image_point(&self) -> [f64; 2] {
        self.correspondence.image_point
    }

    /// Position on the physical object.
    pub fn object_point(&self) -> [f64; 3] {
        self.correspondence.object_point
    }

    /// The image/object pair of this marker.
    pub fn correspondence(&self) -> Correspondence {
        self.correspondence
    }

    /// Display state.
    pub fn state(&self) -> MarkerState {
        if !self.correspondence.is_set() {
            MarkerState::Unset
        } else if self.dirty {
            MarkerState::Dirty
        } else {
            MarkerState::Idle
        }
    }
}

/// Ordered, editable list of markers.
#[derive(Debug, Clone, Default)]
pub struct MarkerSet {
    markers: Vec<Marker>,
    revision: u64,
    next_id: u64,
    // a marker was removed since the last consumed solve
    removed: bool,
}

impl MarkerSet {
    /// Create an empty marker set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set of `count` unlabeled markers at the origin.
    pub fn with_markers(count: usize) -> Self {
        let mut set = Self::new();
        for _ in 0..count {
            set.add_marker("");
        }
        set
    }

    /// Revision of the current marker state.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Number of markers.
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    /// Whether the set holds no markers.
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Iterate over the markers in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Marker> {
        self.markers.iter()
    }

    /// Look up a marker.
    pub fn get(&self, id: MarkerId) -> Option<&Marker> {
        self.markers.iter().find(|m| m.id == id)
    }

    fn get_mut(&mut self, id: MarkerId) -> Option<&mut Marker> {
        self.markers.iter_mut().find(|m| m.id == id)
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    /// Add a marker with both points at the origin.
    pub fn add_marker(&mut self, label: impl Into<String>) -> MarkerId {
        self.insert(label.into(), Correspondence::new([0.0, 0.0], [0.0, 0.0, 0.0]), true)
    }

    /// Add a marker at the given positions.
    pub fn add_marker_at(
        &mut self,
        label: impl Into<String>,
        image_point: [f64; 2],
        object_point: [f64; 3],
    ) -> MarkerId {
        self.insert(
            label.into(),
            Correspondence::new(image_point, object_point),
            true,
        )
    }

    fn insert(&mut self, label: String, correspondence: Correspondence, dirty: bool) -> MarkerId {
        let id = MarkerId(self.next_id);
        self.next_id += 1;
        self.markers.push(Marker {
            id,
            label,
            correspondence,
            dirty,
        });
        self.touch();
        id
    }

    /// Remove a marker, returning it if it existed.
    pub fn remove(&mut self, id: MarkerId) -> Option<Marker> {
        let index = self.markers.iter().position(|m| m.id == id)?;
        let marker = self.markers.remove(index);
        self.removed = true;
        self.touch();
        Some(marker)
    }

    /// Remove all markers.
    pub fn clear(&mut self) {
        if !self.markers.is_empty() {
            self.markers.clear();
            self.removed = true;
            self.touch();
        }
    }

    /// Image position of a marker.
    pub fn image_position(&self, id: MarkerId) -> Option<[f64; 2]> {
        self.get(id).map(Marker::image_point)
    }

    /// Object position of a marker.
    pub fn object_position(&self, id: MarkerId) -> Option<[f64; 3]> {
        self.get(id).map(Marker::object_point)
    }

    /// Label of a marker.
    pub fn label(&self, id: MarkerId) -> Option<&str> {
        self.get(id).map(|m| m.label.as_str())
    }

    /// Move a marker on the image. Returns false for an unknown marker.
    ///
    /// Flags the marker for recalibration if the position changed.
    pub fn set_image_position(&mut self, id: MarkerId, position: [f64; 2]) -> bool {
        let Some(marker) = self.get_mut(id) else {
            return false;
        };
        if marker.correspondence.image_point != position {
            marker.correspondence.image_point = position;
            marker.dirty = true;
            self.touch();
        }
        true
    }

    /// Move a marker on the object. Returns false for an unknown marker.
    ///
    /// Flags the marker for recalibration if the position changed.
    pub fn set_object_position(&mut self, id: MarkerId, position: [f64; 3]) -> bool {
        let Some(marker) = self.get_mut(id) else {
            return false;
        };
        if marker.correspondence.object_point != position {
            marker.correspondence.object_point = position;
            marker.dirty = true;
            self.touch();
        }
        true
    }

    /// Rename a marker. Returns false for an unknown marker.
    pub fn set_label(&mut self, id: MarkerId, label: impl Into<String>) -> bool {
        match self.get_mut(id) {
            Some(marker) => {
                marker.label = label.into();
                true
            }
            None => false,
        }
    }

    /// Whether any marker was added, moved or removed since the last consumed solve.
    pub fn needs_recalibration(&self) -> bool {
        self.removed || self.markers.iter().any(|m| m.dirty)
    }

    /// Display state of a marker.
    pub fn state(&self, id: MarkerId) -> Option<MarkerState> {
        self.get(id).map(Marker::state)
    }

    /// Correspondences of all markers in order, stamped with the current revision.
    pub fn snapshot(&self) -> CorrespondenceSet {
        self.markers
            .iter()
            .map(Marker::correspondence)
            .collect::<CorrespondenceSet>()
            .with_revision(self.revision)
    }

    /// Consume a solve notification.
    ///
    /// Clears the recalibration flag and returns true only if the markers were
    /// not edited after the snapshot the solve used.
    pub fn mark_solved(&mut self, solved: Solved) -> bool {
        if solved.revision != self.revision {
            log::debug!(
                "ignoring solve of revision {}, markers are at {}",
                solved.revision,
                self.revision
            );
            return false;
        }
        for marker in &mut self.markers {
            marker.dirty = false;
        }
        self.removed = false;
        true
    }

    /// Replace every marker, as when loading a saved document.
    ///
    /// The new markers start clean.
    pub fn replace_all<I>(&mut self, markers: I)
    where
        I: IntoIterator<Item = (String, Correspondence)>,
    {
        self.markers.clear();
        self.removed = false;
        for (label, correspondence) in markers {
            self.insert(label, correspondence, false);
        }
        self.touch();
    }
}

impl<'a> IntoIterator for &'a MarkerSet {
    type Item = &'a Marker;
    type IntoIter = std::slice::Iter<'a, Marker>;

    fn into_iter(self) -> Self::IntoIter {
        self.markers.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_edit() {
        let mut markers = MarkerSet::new();
        let a = markers.add_marker("corner");
        assert_eq!(markers.label(a), Some("corner"));
        assert_eq!(markers.state(a), Some(MarkerState::Unset));
        assert!(markers.needs_recalibration());

        assert!(markers.set_object_position(a, [1.0, 2.0, 0.0]));
        assert!(markers.set_image_position(a, [10.0, 20.0]));
        assert_eq!(markers.state(a), Some(MarkerState::Dirty));
        assert_eq!(markers.image_position(a), Some([10.0, 20.0]));
        assert_eq!(markers.object_position(a), Some([1.0, 2.0, 0.0]));

        let snapshot = markers.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.revision(), markers.revision());
    }

    #[test]
    fn test_mark_solved() {
        let mut markers = MarkerSet::new();
        let a = markers.add_marker_at("a", [1.0, 1.0], [1.0, 0.0, 0.0]);
        let snapshot = markers.snapshot();

        assert!(markers.mark_solved(Solved {
            revision: snapshot.revision()
        }));
        assert!(!markers.needs_recalibration());
        assert_eq!(markers.state(a), Some(MarkerState::Idle));
    }

    #[test]
    fn test_mark_solved_stale_revision() {
        let mut markers = MarkerSet::new();
        let a = markers.add_marker_at("a", [1.0, 1.0], [1.0, 0.0, 0.0]);
        let snapshot = markers.snapshot();

        markers.set_image_position(a, [2.0, 1.0]);
        assert!(!markers.mark_solved(Solved {
            revision: snapshot.revision()
        }));
        assert!(markers.needs_recalibration());
    }

    #[test]
    fn test_unchanged_position_keeps_revision() {
        let mut markers = MarkerSet::new();
        let a = markers.add_marker_at("a", [1.0, 1.0], [1.0, 0.0, 0.0]);
        let revision = markers.revision();
        markers.set_image_position(a, [1.0, 1.0]);
        markers.set_label(a, "renamed");
        assert_eq!(markers.revision(), revision);
    }

    #[test]
    fn test_remove_and_replace() {
        let mut markers = MarkerSet::new();
        let a = markers.add_marker("a");
        let b = markers.add_marker("b");
        assert_eq!(markers.remove(a).map(|m| m.label), Some("a".to_string()));
        assert!(markers.remove(a).is_none());
        assert!(!markers.set_image_position(a, [0.0, 0.0]));
        assert_eq!(markers.len(), 1);

        markers.replace_all(vec![
            ("x".to_string(), Correspondence::new([1.0, 2.0], [3.0, 4.0, 5.0])),
            ("y".to_string(), Correspondence::new([6.0, 7.0], [0.0, 0.0, 0.0])),
        ]);
        assert!(markers.get(b).is_none());
        assert_eq!(markers.len(), 2);
        assert!(!markers.needs_recalibration());
        let states = markers.iter().map(Marker::state).collect::<Vec<_>>();
        assert_eq!(states, vec![MarkerState::Idle, MarkerState::Unset]);

        markers.clear();
        assert!(markers.is_empty());
    }

    #[test]
    fn test_remove_needs_recalibration() {
        let mut markers = MarkerSet::new();
        let a = markers.add_marker_at("a", [1.0, 1.0], [1.0, 0.0, 0.0]);
        let b = markers.add_marker_at("b", [2.0, 1.0], [0.0, 1.0, 0.0]);
        assert!(markers.mark_solved(Solved {
            revision: markers.revision()
        }));

        markers.remove(a);
        assert!(markers.needs_recalibration());
        assert_eq!(markers.state(b), Some(MarkerState::Idle));
        assert!(markers.mark_solved(Solved {
            revision: markers.revision()
        }));
        assert!(!markers.needs_recalibration());

        markers.clear();
        assert!(markers.needs_recalibration());
    }

    #[test]
    fn test_with_markers() {
        let markers = MarkerSet::with_markers(5);
        assert_eq!(markers.len(), 5);
        assert!(markers.iter().all(|m| m.state() == MarkerState::Unset));
        assert_eq!(markers.snapshot().incomplete_indices(), vec![0, 1, 2, 3, 4]);
    }
}
