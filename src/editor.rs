//! Editor boundary and patch application.
//!
//! The editor widget itself lives outside this crate; everything here talks
//! to it through [`Editor`]. Offsets are character offsets with an exclusive end.
//!
//! A scope is captured when an AI action is triggered, not when the reply
//! arrives, so [`apply_patch`] has to cope with a document that changed in
//! between.

/// Half-open character range `[start, end)`. Always `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextRange {
    start: usize,
    end: usize,
}

impl TextRange {
    pub fn new(start: usize, end: usize) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }
}

/// What the patch pipeline needs from the host editor.
pub trait Editor {
    fn full_text(&self) -> String;

    /// Current selection; `None` or an empty range when nothing is selected.
    fn selection(&self) -> Option<TextRange>;

    fn text_in_range(&self, range: TextRange) -> Option<String>;

    /// Replaces `range` and shifts every marker after it by the length
    /// difference (a forced-move edit).
    fn replace_range(&mut self, range: TextRange, text: &str);

    fn replace_all(&mut self, text: &str);

    fn char_len(&self) -> usize {
        self.full_text().chars().count()
    }
}

/// In-memory document with a cursor and an optional selection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextBuffer {
    text: String,
    cursor: usize,
    selection: Option<TextRange>,
}

impl TextBuffer {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            cursor: 0,
            selection: None,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Sets the selection, clamped to the document. The cursor moves to the
    /// end of a new selection.
    pub fn set_selection(&mut self, selection: Option<TextRange>) {
        let len = self.char_len();
        self.selection =
            selection.map(|range| TextRange::new(range.start.min(len), range.end.min(len)));
        if let Some(range) = self.selection {
            self.cursor = range.end;
        }
    }

    fn byte_offset(&self, char_offset: usize) -> usize {
        self.text
            .char_indices()
            .nth(char_offset)
            .map(|(byte, _)| byte)
            .unwrap_or(self.text.len())
    }
}

impl Editor for TextBuffer {
    fn full_text(&self) -> String {
        self.text.clone()
    }

    fn selection(&self) -> Option<TextRange> {
        self.selection
    }

    fn text_in_range(&self, range: TextRange) -> Option<String> {
        if range.end > self.char_len() {
            return None;
        }
        let start = self.byte_offset(range.start);
        let end = self.byte_offset(range.end);
        Some(self.text[start..end].to_string())
    }

    fn replace_range(&mut self, range: TextRange, text: &str) {
        let len = self.char_len();
        let range = TextRange::new(range.start.min(len), range.end.min(len));
        let start = self.byte_offset(range.start);
        let end = self.byte_offset(range.end);
        self.text.replace_range(start..end, text);

        let inserted = text.chars().count();
        let shift = |marker: usize| {
            if marker >= range.end {
                marker - range.len() + inserted
            } else if marker > range.start {
                range.start + inserted
            } else {
                marker
            }
        };
        self.cursor = shift(self.cursor);
        self.selection = None;
    }

    fn replace_all(&mut self, text: &str) {
        self.text = text.to_string();
        self.cursor = self.cursor.min(self.char_len());
        self.selection = None;
    }

    fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Document,
    Selection,
}

/// The code an AI action was asked about, frozen at trigger time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeSnapshot {
    pub kind: ScopeKind,
    pub text: String,
    /// Only set for selection scopes.
    pub range: Option<TextRange>,
    /// Document length in characters when the scope was captured.
    pub document_len: usize,
}

impl ScopeSnapshot {
    /// Uses the selection when it is non-empty and not just whitespace,
    /// the whole document otherwise.
    pub fn capture<E: Editor + ?Sized>(editor: &E) -> Self {
        let full_text = editor.full_text();
        let selection = editor
            .selection()
            .filter(|range| !range.is_empty())
            .and_then(|range| editor.text_in_range(range).map(|text| (range, text)));

        Self::from_parts(full_text, selection)
    }

    pub fn from_parts(full_text: String, selection: Option<(TextRange, String)>) -> Self {
        let document_len = full_text.chars().count();

        match selection {
            Some((range, text)) if !range.is_empty() && !text.trim().is_empty() => Self {
                kind: ScopeKind::Selection,
                text,
                range: Some(range),
                document_len,
            },
            _ => Self {
                kind: ScopeKind::Document,
                text: full_text,
                range: None,
                document_len,
            },
        }
    }

    pub fn label(&self) -> &'static str {
        match self.kind {
            ScopeKind::Document => "whole document",
            ScopeKind::Selection => "selected code",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    NothingToApply,
    ReplacedSelection(TextRange),
    ReplacedDocument,
    /// The captured range no longer matched the document, so the whole
    /// document was replaced instead.
    ReplacedDocumentStale,
}

impl ApplyOutcome {
    pub fn edited(&self) -> bool {
        !matches!(self, ApplyOutcome::NothingToApply)
    }
}

/// Writes `code` into the editor at the captured scope.
pub fn apply_patch<E: Editor + ?Sized>(
    editor: &mut E,
    code: Option<&str>,
    scope: &ScopeSnapshot,
) -> ApplyOutcome {
    let Some(code) = code else {
        return ApplyOutcome::NothingToApply;
    };

    let Some(range) = scope.range else {
        editor.replace_all(code);
        return ApplyOutcome::ReplacedDocument;
    };

    let current_len = editor.char_len();
    if current_len != scope.document_len || range.end > current_len {
        tracing::warn!(
            captured_len = scope.document_len,
            current_len,
            start = range.start,
            end = range.end,
            "document changed since the selection was captured, replacing whole document"
        );
        editor.replace_all(code);
        return ApplyOutcome::ReplacedDocumentStale;
    }

    editor.replace_range(range, code);
    ApplyOutcome::ReplacedSelection(range)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "0123456789ABCDEFGHIJKLMNOP";

    #[test]
    fn test_capture_without_selection_is_document() {
        let buffer = TextBuffer::new(DOC);
        let scope = ScopeSnapshot::capture(&buffer);
        assert_eq!(scope.kind, ScopeKind::Document);
        assert_eq!(scope.text, DOC);
        assert_eq!(scope.range, None);
        assert_eq!(scope.document_len, 26);
    }

    #[test]
    fn test_capture_selection() {
        let mut buffer = TextBuffer::new(DOC);
        buffer.set_selection(Some(TextRange::new(10, 20)));
        let scope = ScopeSnapshot::capture(&buffer);
        assert_eq!(scope.kind, ScopeKind::Selection);
        assert_eq!(scope.text, "ABCDEFGHIJ");
        assert_eq!(scope.range, Some(TextRange::new(10, 20)));
    }

    #[test]
    fn test_blank_or_empty_selection_falls_back_to_document() {
        let mut buffer = TextBuffer::new("a   \n  b");
        buffer.set_selection(Some(TextRange::new(1, 6)));
        assert_eq!(ScopeSnapshot::capture(&buffer).kind, ScopeKind::Document);

        buffer.set_selection(Some(TextRange::new(3, 3)));
        assert_eq!(ScopeSnapshot::capture(&buffer).kind, ScopeKind::Document);
    }

    #[test]
    fn test_apply_to_selection_leaves_surroundings() {
        let mut buffer = TextBuffer::new(DOC);
        buffer.set_selection(Some(TextRange::new(10, 20)));
        let scope = ScopeSnapshot::capture(&buffer);

        let outcome = apply_patch(&mut buffer, Some("XY"), &scope);
        assert_eq!(outcome, ApplyOutcome::ReplacedSelection(TextRange::new(10, 20)));
        assert_eq!(buffer.text(), "0123456789XYKLMNOP");
    }

    #[test]
    fn test_apply_without_range_replaces_everything() {
        let mut buffer = TextBuffer::new(DOC);
        let scope = ScopeSnapshot::capture(&buffer);
        assert_eq!(
            apply_patch(&mut buffer, Some("NEW"), &scope),
            ApplyOutcome::ReplacedDocument
        );
        assert_eq!(buffer.text(), "NEW");
    }

    #[test]
    fn test_apply_without_code_is_noop() {
        let mut buffer = TextBuffer::new(DOC);
        let scope = ScopeSnapshot::capture(&buffer);
        let outcome = apply_patch(&mut buffer, None, &scope);
        assert_eq!(outcome, ApplyOutcome::NothingToApply);
        assert!(!outcome.edited());
        assert_eq!(buffer.text(), DOC);
    }

    #[test]
    fn test_stale_range_falls_back_to_document() {
        let mut buffer = TextBuffer::new(DOC);
        buffer.set_selection(Some(TextRange::new(10, 20)));
        let scope = ScopeSnapshot::capture(&buffer);

        // the user keeps typing while the request is in flight
        buffer.replace_range(TextRange::new(0, 0), "// ");

        let outcome = apply_patch(&mut buffer, Some("fixed"), &scope);
        assert_eq!(outcome, ApplyOutcome::ReplacedDocumentStale);
        assert_eq!(buffer.text(), "fixed");
    }

    #[test]
    fn test_same_length_edit_keeps_range() {
        let mut buffer = TextBuffer::new(DOC);
        buffer.set_selection(Some(TextRange::new(10, 20)));
        let scope = ScopeSnapshot::capture(&buffer);
        buffer.replace_range(TextRange::new(0, 1), "Z");

        let outcome = apply_patch(&mut buffer, Some("-"), &scope);
        assert_eq!(outcome, ApplyOutcome::ReplacedSelection(TextRange::new(10, 20)));
        assert_eq!(buffer.text(), "Z123456789-KLMNOP");
    }

    fn place_cursor(buffer: &mut TextBuffer, at: usize) {
        buffer.set_selection(Some(TextRange::new(at, at)));
    }

    #[test]
    fn test_replace_range_shifts_cursor() {
        let mut buffer = TextBuffer::new(DOC);
        place_cursor(&mut buffer, 22);
        buffer.replace_range(TextRange::new(10, 20), "XY");
        assert_eq!(buffer.cursor(), 14);

        place_cursor(&mut buffer, 11);
        buffer.replace_range(TextRange::new(10, 12), "abc");
        assert_eq!(buffer.cursor(), 13);

        place_cursor(&mut buffer, 3);
        buffer.replace_range(TextRange::new(10, 12), "");
        assert_eq!(buffer.cursor(), 3);
    }

    #[test]
    fn test_applied_selection_leaves_cursor_after_new_code() {
        let mut buffer = TextBuffer::new(DOC);
        buffer.set_selection(Some(TextRange::new(10, 20)));
        assert_eq!(buffer.cursor(), 20);
        let scope = ScopeSnapshot::capture(&buffer);

        apply_patch(&mut buffer, Some("XYZ"), &scope);
        assert_eq!(buffer.cursor(), 13);
    }

    #[test]
    fn test_reversed_offsets_are_normalized() {
        let range = TextRange::new(4, 1);
        assert_eq!((range.start(), range.end()), (1, 4));
        assert_eq!(range.len(), 3);

        let buffer = TextBuffer::new("abcdef");
        assert_eq!(buffer.text_in_range(range).as_deref(), Some("bcd"));
    }

    #[test]
    fn test_multibyte_offsets_are_characters() {
        let mut buffer = TextBuffer::new("héllo wörld");
        buffer.set_selection(Some(TextRange::new(6, 11)));
        let scope = ScopeSnapshot::capture(&buffer);
        assert_eq!(scope.text, "wörld");

        apply_patch(&mut buffer, Some("wereld"), &scope);
        assert_eq!(buffer.text(), "héllo wereld");
    }

    #[test]
    fn test_selection_is_clamped_and_normalized() {
        let mut buffer = TextBuffer::new("abc");
        buffer.set_selection(Some(TextRange::new(10, 1)));
        assert_eq!(buffer.selection(), Some(TextRange::new(1, 3)));
        assert_eq!(buffer.text_in_range(TextRange::new(0, 9)), None);
    }
}
