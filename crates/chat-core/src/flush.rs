//! Streaming buffer and flush engine.
//!
//! Fragments are buffered and committed to the surface in whole lines so the
//! document never shows a half-rendered line mid-stream. A periodic tick calls
//! [`FlushEngine::flush`]; [`FlushEngine::stop`] commits whatever is left.

use std::time::Duration;

use crate::document::{DocumentSurface, Position};

/// Default flush cadence.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(50);

/// Default buffer ceiling before an unconditional flush.
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 4096;

/// Flush cadence and buffer ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushSettings {
    pub interval: Duration,
    pub max_buffer_bytes: usize,
}

impl Default for FlushSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_FLUSH_INTERVAL,
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
        }
    }
}

/// Buffers streamed text and commits it to a surface.
pub struct FlushEngine<'s> {
    surface: &'s mut dyn DocumentSurface,
    cursor: Position,
    pending: String,
    committed: String,
    max_buffer_bytes: usize,
}

impl std::fmt::Debug for FlushEngine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlushEngine")
            .field("cursor", &self.cursor)
            .field("pending", &self.pending.len())
            .field("committed", &self.committed.len())
            .finish_non_exhaustive()
    }
}

impl<'s> FlushEngine<'s> {
    /// Start writing at the surface's current cursor.
    pub fn new(surface: &'s mut dyn DocumentSurface, settings: FlushSettings) -> Self {
        let cursor = surface.current_cursor();
        Self {
            surface,
            cursor,
            pending: String::new(),
            committed: String::new(),
            max_buffer_bytes: settings.max_buffer_bytes.max(1),
        }
    }

    /// Buffer a fragment.
    ///
    /// Returns `true` when the buffer ceiling forced a flush.
    pub fn append(&mut self, text: &str) -> bool {
        self.pending.push_str(text);
        if self.pending.len() > self.max_buffer_bytes {
            tracing::debug!(bytes = self.pending.len(), "buffer ceiling reached, forcing flush");
            self.commit(self.pending.len());
            return true;
        }
        false
    }

    /// Commit buffered text up to and including the last newline.
    ///
    /// Returns the number of bytes committed. Calling it again without new
    /// input commits nothing.
    pub fn flush(&mut self) -> usize {
        match self.pending.rfind('\n') {
            Some(idx) => self.commit(idx + 1),
            None => 0,
        }
    }

    /// Commit everything still buffered, partial line included.
    pub fn stop(&mut self) -> usize {
        self.commit(self.pending.len())
    }

    /// Cursor just after the last committed text.
    #[must_use]
    pub const fn cursor(&self) -> Position {
        self.cursor
    }

    /// Everything committed so far.
    #[must_use]
    pub fn committed(&self) -> &str {
        &self.committed
    }

    /// Text waiting for a line boundary.
    #[must_use]
    pub fn pending(&self) -> &str {
        &self.pending
    }

    fn commit(&mut self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        let rest = self.pending.split_off(len);
        let span = std::mem::replace(&mut self.pending, rest);
        self.cursor = self.surface.insert_at(self.cursor, &span);
        self.committed.push_str(&span);
        len
    }
}
