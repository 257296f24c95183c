//! Text edits against the original source buffer.

use crate::utils::errors::RewriteError;
use serde::{Deserialize, Serialize};

/// Replace `length` bytes at `offset` with `replacement`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEdit {
    pub offset: usize,
    pub length: usize,
    pub replacement: String,
}

impl TextEdit {
    pub fn new(offset: usize, length: usize, replacement: impl Into<String>) -> Self {
        Self { offset, length, replacement: replacement.into() }
    }

    /// Pure insertion before `offset`.
    pub fn insert(offset: usize, text: impl Into<String>) -> Self {
        Self::new(offset, 0, text)
    }

    fn end(&self) -> usize {
        self.offset + self.length
    }

    fn overlaps(&self, other: &TextEdit) -> bool {
        if self.length == 0 || other.length == 0 {
            // Insertions only clash when they land strictly inside a replaced range
            // or at the same point as another insertion.
            if self.length == 0 && other.length == 0 {
                return self.offset == other.offset;
            }
            let (ins, rep) = if self.length == 0 { (self, other) } else { (other, self) };
            return rep.offset < ins.offset && ins.offset < rep.end();
        }
        self.offset < other.end() && other.offset < self.end()
    }
}

/// A set of non-overlapping edits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEdits {
    edits: Vec<TextEdit>,
}

impl SourceEdits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an edit, rejecting it when it overlaps one already present.
    pub fn add(&mut self, edit: TextEdit) -> Result<(), RewriteError> {
        if let Some(clash) = self.edits.iter().find(|e| e.overlaps(&edit)) {
            log::debug!("edit {:?} overlaps {:?}", edit, clash);
            return Err(RewriteError::Overlap { offset: edit.offset, length: edit.length });
        }
        self.edits.push(edit);
        Ok(())
    }

    pub fn replace(&mut self, offset: usize, length: usize, text: impl Into<String>) -> Result<(), RewriteError> {
        self.add(TextEdit::new(offset, length, text))
    }

    pub fn insert(&mut self, offset: usize, text: impl Into<String>) -> Result<(), RewriteError> {
        self.add(TextEdit::insert(offset, text))
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn edits(&self) -> &[TextEdit] {
        &self.edits
    }

    /// Splice every edit into `source`, highest offset first so earlier
    /// offsets stay valid.
    pub fn finalize(&self, source: &str) -> Result<String, RewriteError> {
        let mut ordered: Vec<&TextEdit> = self.edits.iter().collect();
        ordered.sort_by(|a, b| b.offset.cmp(&a.offset).then(b.length.cmp(&a.length)));

        let mut out = source.to_string();
        for edit in ordered {
            if edit.end() > out.len()
                || !out.is_char_boundary(edit.offset)
                || !out.is_char_boundary(edit.end())
            {
                return Err(RewriteError::OutOfBounds { offset: edit.offset, length: edit.length });
            }
            out.replace_range(edit.offset..edit.end(), &edit.replacement);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finalize_applies_in_descending_order() {
        let mut edits = SourceEdits::new();
        edits.replace(0, 3, "first").unwrap();
        edits.replace(8, 3, "third").unwrap();
        edits.insert(4, ">").unwrap();
        assert_eq!(edits.finalize("abc def ghi").unwrap(), "first >def third");
    }

    #[test]
    fn test_overlap_rejected() {
        let mut edits = SourceEdits::new();
        edits.replace(2, 5, "x").unwrap();
        assert!(matches!(edits.replace(4, 4, "y"), Err(RewriteError::Overlap { .. })));
        assert!(edits.insert(4, "z").is_err());
        // Insertions at the boundaries are fine.
        edits.insert(2, "<").unwrap();
        edits.insert(7, ">").unwrap();
        assert_eq!(edits.finalize("0123456789").unwrap(), "01<x>789");
    }

    #[test]
    fn test_out_of_bounds() {
        let mut edits = SourceEdits::new();
        edits.replace(5, 10, "x").unwrap();
        assert!(edits.finalize("short").is_err());
    }
}
