//! File-backed document surface.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use chat_core::{DocumentSurface, Position, TextDocument};

/// A note on disk that the reply streams into.
///
/// Every insertion is written back to the file so an editor watching it sees
/// the reply grow. With echo on, inserted text is also printed to stdout.
#[derive(Debug)]
pub struct FileSurface {
    path: PathBuf,
    document: TextDocument,
    echo: bool,
}

impl FileSurface {
    /// Open `path`, creating an empty document if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(anyhow::anyhow!("failed to read {}: {e}", path.display())),
        };
        Ok(Self {
            path,
            document: TextDocument::new(&text),
            echo: false,
        })
    }

    #[must_use]
    pub const fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn text(&self) -> String {
        self.document.text()
    }

    /// Insert at the cursor outside of a streamed reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn append(&mut self, text: &str) -> anyhow::Result<()> {
        let cursor = self.document.current_cursor();
        self.document.insert_at(cursor, text);
        self.persist()
            .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", self.path.display()))
    }

    fn persist(&self) -> std::io::Result<()> {
        std::fs::write(&self.path, self.document.text())
    }
}

impl DocumentSurface for FileSurface {
    fn insert_at(&mut self, position: Position, text: &str) -> Position {
        let end = self.document.insert_at(position, text);
        if let Err(error) = self.persist() {
            tracing::warn!(path = %self.path.display(), %error, "failed to persist note");
        }
        if self.echo {
            let mut stdout = std::io::stdout().lock();
            if let Err(error) = stdout.write_all(text.as_bytes()).and_then(|()| stdout.flush()) {
                tracing::debug!(%error, "failed to echo reply to stdout");
            }
        }
        end
    }

    fn current_cursor(&self) -> Position {
        self.document.current_cursor()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn insertions_are_persisted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("note.md");
        std::fs::write(&path, "Hello?\n").unwrap();

        let mut surface = FileSurface::open(&path).unwrap();
        let cursor = surface.current_cursor();
        assert_eq!(cursor, Position::new(1, 0));

        let end = surface.insert_at(cursor, "Hi there.\n");
        assert_eq!(end, Position::new(2, 0));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Hello?\nHi there.\n");
    }

    #[test]
    fn echo_does_not_change_what_is_persisted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("note.md");

        let mut surface = FileSurface::open(&path).unwrap().with_echo(true);
        let end = surface.insert_at(Position::new(0, 0), "streamed\n");
        assert_eq!(end, Position::new(1, 0));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "streamed\n");
    }

    #[test]
    fn missing_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("new.md");

        let mut surface = FileSurface::open(&path).unwrap();
        assert_eq!(surface.text(), "");
        surface.append("first line\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first line\n");
    }
}
