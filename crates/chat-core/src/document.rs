//! Live document surface.
//!
//! The orchestrator only needs to insert text at a cursor and ask where the
//! cursor is. Hosts implement [`DocumentSurface`] over whatever editor or file
//! they own.

use std::fmt;

/// Cursor position: zero-based line and character offset within the line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    pub line: usize,
    pub ch: usize,
}

impl Position {
    #[must_use]
    pub const fn new(line: usize, ch: usize) -> Self {
        Self { line, ch }
    }

    /// Position reached after writing `text` starting here.
    #[must_use]
    pub fn advance(self, text: &str) -> Self {
        match text.rfind('\n') {
            Some(idx) => Self {
                line: self.line + text.matches('\n').count(),
                ch: text[idx + 1..].chars().count(),
            },
            None => Self {
                line: self.line,
                ch: self.ch + text.chars().count(),
            },
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.ch + 1)
    }
}

/// Text surface the assistant's reply is written into.
pub trait DocumentSurface: Send {
    /// Insert `text` at `position` and return the position just after it.
    fn insert_at(&mut self, position: Position, text: &str) -> Position;

    /// Where new text should go.
    fn current_cursor(&self) -> Position;
}

/// In-memory document, one `String` per line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDocument {
    lines: Vec<String>,
    cursor: Position,
}

impl Default for TextDocument {
    fn default() -> Self {
        Self::new("")
    }
}

impl TextDocument {
    /// Load `text` with the cursor at the end.
    #[must_use]
    pub fn new(text: &str) -> Self {
        let lines: Vec<String> = text.split('\n').map(str::to_string).collect();
        let cursor = Position::new(
            lines.len() - 1,
            lines.last().map_or(0, |l| l.chars().count()),
        );
        Self { lines, cursor }
    }

    /// Move the cursor, clamped to the document.
    pub fn set_cursor(&mut self, position: Position) {
        self.cursor = self.clamp(position);
    }

    #[must_use]
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    #[must_use]
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    fn clamp(&self, position: Position) -> Position {
        let line = position.line.min(self.lines.len() - 1);
        let len = self.lines[line].chars().count();
        Position::new(line, position.ch.min(len))
    }
}

impl DocumentSurface for TextDocument {
    fn insert_at(&mut self, position: Position, text: &str) -> Position {
        let position = self.clamp(position);
        let line = &self.lines[position.line];
        let split = line
            .char_indices()
            .nth(position.ch)
            .map_or(line.len(), |(idx, _)| idx);
        let (head, tail) = line.split_at(split);
        let tail = tail.to_string();

        let combined = format!("{head}{text}{tail}");
        let inserted: Vec<String> = combined.split('\n').map(str::to_string).collect();
        let end = position.advance(text);
        debug_assert_eq!(end.line, position.line + inserted.len() - 1);

        self.lines.splice(position.line..=position.line, inserted);

        self.cursor = end;
        end
    }

    fn current_cursor(&self) -> Position {
        self.cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_over_lines() {
        let start = Position::new(2, 4);
        assert_eq!(start.advance("abc"), Position::new(2, 7));
        assert_eq!(start.advance("ab\ncd\nxyz"), Position::new(4, 3));
        assert_eq!(start.advance("line\n"), Position::new(3, 0));
        assert_eq!(start.advance("h\u{e9}"), Position::new(2, 6));
    }

    #[test]
    fn insert_at_end_appends() {
        let mut doc = TextDocument::new("# Notes\n");
        let cursor = doc.current_cursor();
        assert_eq!(cursor, Position::new(1, 0));

        let end = doc.insert_at(cursor, "Hello\nworld");
        assert_eq!(end, Position::new(2, 5));
        assert_eq!(doc.text(), "# Notes\nHello\nworld");
        assert_eq!(doc.current_cursor(), end);
    }

    #[test]
    fn insert_in_middle_keeps_tail() {
        let mut doc = TextDocument::new("abc\ndef");
        let end = doc.insert_at(Position::new(0, 1), "X\nY");
        assert_eq!(doc.text(), "aX\nYbc\ndef");
        assert_eq!(end, Position::new(1, 1));
    }

    #[test]
    fn out_of_range_positions_are_clamped() {
        let mut doc = TextDocument::new("ab");
        let end = doc.insert_at(Position::new(9, 9), "!");
        assert_eq!(doc.text(), "ab!");
        assert_eq!(end, Position::new(0, 3));
    }

    #[test]
    fn consecutive_inserts_compose() {
        let mut doc = TextDocument::default();
        let mut cursor = doc.current_cursor();
        for part in ["Hel", "lo wo", "rld\n"] {
            cursor = doc.insert_at(cursor, part);
        }
        assert_eq!(doc.text(), "Hello world\n");
        assert_eq!(cursor, Position::new(1, 0));
    }
}
