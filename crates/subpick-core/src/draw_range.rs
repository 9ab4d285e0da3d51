//! Draw ranges: contiguous index-buffer spans that map back to model elements.
//!
//! A batched mesh packs many semantic sub-elements into one index buffer. Each
//! sub-element owns a [`Span`] `[start, count]` of that buffer, keyed by its
//! [`RangeId`]. Offsets not covered by any span are untracked geometry.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{PickError, Result};

/// Identifier of a draw range, shared with the element hierarchy.
pub type RangeId = String;

/// Draw ranges of a single mesh.
pub type DrawRangeMap = HashMap<RangeId, Span>;

/// Draw ranges of every mesh in a model, keyed by mesh name.
pub type MeshDrawRanges = HashMap<String, DrawRangeMap>;

/// A `[start, count]` span of an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[u32; 2]", into = "[u32; 2]")]
pub struct Span {
    /// First index-buffer offset covered by the span.
    pub start: u32,
    /// Number of indices covered.
    pub count: u32,
}

impl Span {
    /// Creates a new span.
    #[must_use]
    pub const fn new(start: u32, count: u32) -> Self {
        Self { start, count }
    }

    /// One past the last covered offset.
    #[must_use]
    pub fn end(&self) -> u64 {
        u64::from(self.start) + u64::from(self.count)
    }

    /// Returns whether `offset` falls inside this span.
    #[must_use]
    pub fn contains(&self, offset: u64) -> bool {
        offset >= u64::from(self.start) && offset < self.end()
    }
}

impl From<[u32; 2]> for Span {
    fn from([start, count]: [u32; 2]) -> Self {
        Self { start, count }
    }
}

impl From<Span> for [u32; 2] {
    fn from(span: Span) -> Self {
        [span.start, span.count]
    }
}

/// A resolved draw range: its id together with its span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawRange {
    pub range_id: RangeId,
    pub start: u32,
    pub count: u32,
}

impl DrawRange {
    fn new(range_id: &str, span: Span) -> Self {
        Self {
            range_id: range_id.to_string(),
            start: span.start,
            count: span.count,
        }
    }

    /// Returns the span of this range.
    #[must_use]
    pub fn span(&self) -> Span {
        Span::new(self.start, self.count)
    }
}

/// Converts a triangle index into the index-buffer offset of its first corner.
#[must_use]
pub fn face_offset(face_index: u32) -> u64 {
    u64::from(face_index) * 3
}

/// Linear scan for the range containing an index-buffer offset.
pub fn find_containing(ranges: &DrawRangeMap, offset: u64) -> Option<DrawRange> {
    ranges
        .iter()
        .find(|(_, span)| span.contains(offset))
        .map(|(id, span)| DrawRange::new(id, *span))
}

/// Returns the ranges of a mesh sorted by start offset.
pub fn sorted_by_start(ranges: &DrawRangeMap) -> Vec<(&str, Span)> {
    let mut sorted: Vec<(&str, Span)> = ranges.iter().map(|(id, s)| (id.as_str(), *s)).collect();
    sorted.sort_by(|a, b| a.1.start.cmp(&b.1.start).then_with(|| a.0.cmp(b.0)));
    sorted
}

/// Checks that the ranges of one mesh are pairwise disjoint.
///
/// Empty ranges cover nothing and never overlap.
pub fn validate_disjoint(mesh: &str, ranges: &DrawRangeMap) -> Result<()> {
    let sorted = sorted_by_start(ranges);
    let mut previous: Option<(&str, Span)> = None;
    for (id, span) in sorted.into_iter().filter(|(_, s)| s.count > 0) {
        if let Some((prev_id, prev)) = previous {
            if prev.end() > u64::from(span.start) {
                return Err(PickError::OverlappingRanges {
                    mesh: mesh.to_string(),
                    first: prev_id.to_string(),
                    second: id.to_string(),
                });
            }
        }
        previous = Some((id, span));
    }
    Ok(())
}

/// Validates every mesh of a model.
pub fn validate_mesh_ranges(draw_ranges: &MeshDrawRanges) -> Result<()> {
    draw_ranges
        .iter()
        .try_for_each(|(mesh, ranges)| validate_disjoint(mesh, ranges))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beam() -> DrawRangeMap {
        HashMap::from([
            ("A".to_string(), Span::new(0, 300)),
            ("B".to_string(), Span::new(300, 150)),
        ])
    }

    #[test]
    fn test_face_lookup() {
        let ranges = beam();
        assert_eq!(find_containing(&ranges, face_offset(13)).unwrap().range_id, "A");
        assert_eq!(find_containing(&ranges, face_offset(110)).unwrap().range_id, "B");
        assert!(find_containing(&ranges, face_offset(150)).is_none());
    }

    #[test]
    fn test_span_boundaries() {
        let span = Span::new(300, 150);
        assert!(!span.contains(299));
        assert!(span.contains(300));
        assert!(span.contains(449));
        assert!(!span.contains(450));
    }

    #[test]
    fn test_span_json_is_pair() {
        let span: Span = serde_json::from_str("[12, 30]").unwrap();
        assert_eq!(span, Span::new(12, 30));
        assert_eq!(serde_json::to_string(&span).unwrap(), "[12,30]");
    }

    #[test]
    fn test_validate_disjoint() {
        assert!(validate_disjoint("beam_0", &beam()).is_ok());

        let mut overlapping = beam();
        overlapping.insert("C".to_string(), Span::new(440, 20));
        let err = validate_disjoint("beam_0", &overlapping).unwrap_err();
        assert!(matches!(
            err,
            PickError::OverlappingRanges { ref first, ref second, .. }
                if first == "B" && second == "C"
        ));
    }

    #[test]
    fn test_empty_ranges_never_overlap() {
        let mut ranges = beam();
        ranges.insert("E".to_string(), Span::new(10, 0));
        assert!(validate_disjoint("beam_0", &ranges).is_ok());
    }
}
