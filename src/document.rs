//! In-memory document model shared by the command surface, palette, and
//! generation session.
//!
//! Offsets are measured in characters, not bytes, so callers never have to
//! worry about splitting a multi-byte sequence. Every mutation bumps a
//! revision counter, which the generation session uses to detect that the
//! document shifted underneath a pending AI response.

/// A normalized selection range in character offsets (`from <= to`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub from: usize,
    pub to: usize,
}

impl Selection {
    /// Creates a selection, swapping the endpoints if given backwards.
    pub fn new(a: usize, b: usize) -> Self {
        if a <= b {
            Self { from: a, to: b }
        } else {
            Self { from: b, to: a }
        }
    }

    /// A caret (zero-width selection) at the given offset.
    pub fn caret(at: usize) -> Self {
        Self { from: at, to: at }
    }

    pub fn is_empty(&self) -> bool {
        self.from == self.to
    }

    pub fn len(&self) -> usize {
        self.to - self.from
    }
}

/// Mutation and inspection primitives the editing flow needs from a document.
///
/// The terminal front-end uses [`TextDocument`]; a GUI embedding would
/// implement this over its own buffer type.
pub trait DocumentHandle {
    /// Document length in characters.
    fn len_chars(&self) -> usize;

    /// Monotonically increasing counter, bumped on every mutation.
    fn revision(&self) -> u64;

    /// The current selection, clamped to the document bounds.
    fn selection(&self) -> Selection;

    fn set_selection(&mut self, selection: Selection);

    /// Text between two character offsets (clamped, normalized).
    fn text_between(&self, from: usize, to: usize) -> String;

    fn insert(&mut self, at: usize, text: &str);

    fn delete_range(&mut self, from: usize, to: usize);

    /// Deletes `from..to` and inserts `text` in its place, leaving the
    /// selection collapsed after the inserted text.
    fn replace_range(&mut self, from: usize, to: usize, text: &str);

    /// The full document text.
    fn text(&self) -> String {
        self.text_between(0, self.len_chars())
    }
}

/// Plain string-backed implementation of [`DocumentHandle`].
#[derive(Debug, Default)]
pub struct TextDocument {
    text: String,
    selection: Selection,
    revision: u64,
}

impl Default for Selection {
    fn default() -> Self {
        Selection::caret(0)
    }
}

impl TextDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            selection: Selection::caret(0),
            revision: 0,
        }
    }

    fn clamp(&self, offset: usize) -> usize {
        offset.min(self.text.chars().count())
    }

    fn byte_offset(&self, char_offset: usize) -> usize {
        self.text
            .char_indices()
            .nth(char_offset)
            .map(|(i, _)| i)
            .unwrap_or(self.text.len())
    }
}

impl DocumentHandle for TextDocument {
    fn len_chars(&self) -> usize {
        self.text.chars().count()
    }

    fn revision(&self) -> u64 {
        self.revision
    }

    fn selection(&self) -> Selection {
        let from = self.clamp(self.selection.from);
        let to = self.clamp(self.selection.to);
        Selection::new(from, to)
    }

    fn set_selection(&mut self, selection: Selection) {
        self.selection = Selection::new(self.clamp(selection.from), self.clamp(selection.to));
    }

    fn text_between(&self, from: usize, to: usize) -> String {
        let sel = Selection::new(self.clamp(from), self.clamp(to));
        let start = self.byte_offset(sel.from);
        let end = self.byte_offset(sel.to);
        self.text[start..end].to_string()
    }

    fn insert(&mut self, at: usize, text: &str) {
        let at = self.clamp(at);
        let byte_at = self.byte_offset(at);
        self.text.insert_str(byte_at, text);
        self.revision += 1;
        self.selection = Selection::caret(at + text.chars().count());
    }

    fn delete_range(&mut self, from: usize, to: usize) {
        let sel = Selection::new(self.clamp(from), self.clamp(to));
        if sel.is_empty() {
            return;
        }
        let start = self.byte_offset(sel.from);
        let end = self.byte_offset(sel.to);
        self.text.replace_range(start..end, "");
        self.revision += 1;
        self.selection = Selection::caret(sel.from);
    }

    fn replace_range(&mut self, from: usize, to: usize, text: &str) {
        let sel = Selection::new(self.clamp(from), self.clamp(to));
        let start = self.byte_offset(sel.from);
        let end = self.byte_offset(sel.to);
        self.text.replace_range(start..end, text);
        self.revision += 1;
        self.selection = Selection::caret(sel.from + text.chars().count());
    }
}
