//! Byte-range edits and the text patcher

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{OverlapError, PatchError};

/// What an edit puts in place of its range.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Replacement {
    Text(String),
    Delete,
}

/// A single splice against the original source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edit {
    pub range: Range<usize>,
    pub replacement: Replacement,
}

impl Edit {
    pub fn replace(range: Range<usize>, text: impl Into<String>) -> Self {
        Self {
            range,
            replacement: Replacement::Text(text.into()),
        }
    }

    pub fn delete(range: Range<usize>) -> Self {
        Self {
            range,
            replacement: Replacement::Delete,
        }
    }

    pub fn text(&self) -> &str {
        match &self.replacement {
            Replacement::Text(text) => text,
            Replacement::Delete => "",
        }
    }

    /// Two edits conflict if their ranges intersect or they start at the same
    /// offset (so two insertions at one point conflict too).
    pub fn overlaps(&self, other: &Edit) -> bool {
        self.range.start == other.range.start
            || (self.range.start < other.range.end && other.range.start < self.range.end)
    }
}

/// A validated, pairwise non-overlapping set of edits, sorted by offset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EditSet {
    edits: Vec<Edit>,
}

impl EditSet {
    pub fn new(mut edits: Vec<Edit>) -> Result<Self, OverlapError> {
        edits.sort_by_key(|e| (e.range.start, e.range.end));
        for pair in edits.windows(2) {
            if pair[0].overlaps(&pair[1]) {
                return Err(OverlapError {
                    first: pair[0].range.clone(),
                    second: pair[1].range.clone(),
                });
            }
        }
        Ok(Self { edits })
    }

    pub fn edits(&self) -> &[Edit] {
        &self.edits
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    /// Splice every edit into `source`. Text outside the edited ranges is
    /// copied verbatim.
    pub fn apply(&self, source: &str) -> Result<String, PatchError> {
        for edit in &self.edits {
            let Range { start, end } = edit.range;
            if start > end
                || end > source.len()
                || !source.is_char_boundary(start)
                || !source.is_char_boundary(end)
            {
                return Err(PatchError::OutOfBounds {
                    range: edit.range.clone(),
                    len: source.len(),
                });
            }
        }

        let (mut out, cursor) = self.edits.iter().fold(
            (String::with_capacity(source.len()), 0),
            |(mut out, cursor), edit| {
                out.push_str(&source[cursor..edit.range.start]);
                out.push_str(edit.text());
                (out, edit.range.end)
            },
        );
        out.push_str(&source[cursor..]);
        Ok(out)
    }

    pub fn into_edits(self) -> Vec<Edit> {
        self.edits
    }
}

impl From<Edit> for EditSet {
    fn from(edit: Edit) -> Self {
        Self { edits: vec![edit] }
    }
}

/// Pick edits in source order, keeping each one that does not conflict with
/// an already picked edit.
pub fn combine_greedy(edits: impl IntoIterator<Item = Edit>) -> EditSet {
    let mut candidates: Vec<Edit> = edits.into_iter().collect();
    candidates.sort_by_key(|e| (e.range.start, e.range.end));
    let mut chosen: Vec<Edit> = Vec::new();
    for edit in candidates {
        if chosen.iter().all(|c| !c.overlaps(&edit)) {
            chosen.push(edit);
        }
    }
    EditSet { edits: chosen }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_set_is_identity() {
        let src = "module m;\nendmodule\n";
        assert_eq!(EditSet::default().apply(src).as_deref(), Ok(src));
    }

    #[test]
    fn test_apply_in_order_regardless_of_input_order() {
        let set = EditSet::new(vec![Edit::delete(6..8), Edit::replace(0..3, "xyz")])
            .expect("disjoint");
        assert_eq!(set.apply("abc---de--"), Ok("xyz-----".to_string()));
    }

    #[test]
    fn test_overlap_rejected() {
        let err = EditSet::new(vec![Edit::delete(0..5), Edit::delete(4..6)]).expect_err("overlap");
        assert_eq!(err.first, 0..5);
        assert_eq!(err.second, 4..6);
    }

    #[test]
    fn test_same_start_rejected() {
        assert!(EditSet::new(vec![Edit::replace(3..3, "a"), Edit::replace(3..3, "b")]).is_err());
        assert!(EditSet::new(vec![Edit::replace(3..3, "a"), Edit::delete(3..5)]).is_err());
    }

    #[test]
    fn test_adjacent_edits_allowed() {
        let set = EditSet::new(vec![Edit::replace(0..2, "X"), Edit::replace(2..4, "Y")])
            .expect("adjacent");
        assert_eq!(set.apply("abcdef"), Ok("XYef".to_string()));
    }

    #[test]
    fn test_out_of_bounds() {
        let set = EditSet::new(vec![Edit::delete(2..10)]).expect("single");
        assert!(matches!(set.apply("abc"), Err(PatchError::OutOfBounds { .. })));
        // Splitting a multi-byte character
        let set = EditSet::new(vec![Edit::delete(0..1)]).expect("single");
        assert!(set.apply("é").is_err());
    }

    #[test]
    fn test_combine_greedy_skips_conflicts() {
        let set = combine_greedy(vec![
            Edit::delete(5..9),
            Edit::delete(0..4),
            Edit::delete(2..6),
            Edit::delete(10..12),
        ]);
        let ranges: Vec<_> = set.edits().iter().map(|e| e.range.clone()).collect();
        assert_eq!(ranges, vec![0..4, 5..9, 10..12]);
    }
}
