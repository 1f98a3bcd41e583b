//! Temporary text files and line-terminator fixtures.

use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary directory of text files, removed on drop.
pub struct TempTextFiles {
    dir: TempDir,
}

impl TempTextFiles {
    /// # Errors
    ///
    /// Returns an error if the temporary directory cannot be created.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            dir: TempDir::new()?,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `contents` to `name` inside the directory, creating parents.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write(&self, name: &str, contents: impl AsRef<[u8]>) -> io::Result<PathBuf> {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, contents)?;
        Ok(path)
    }
}

/// Join `lines` cycling through `\n`, `\r\n` and `\r` as terminators.
///
/// ```
/// use ironline::testing::join_with_mixed_terminators;
///
/// assert_eq!(join_with_mixed_terminators(&["a", "b", "c", "d"]), "a\nb\r\nc\rd\n");
/// ```
#[must_use]
pub fn join_with_mixed_terminators<S: AsRef<str>>(lines: &[S]) -> String {
    const TERMINATORS: [&str; 3] = ["\n", "\r\n", "\r"];
    let mut text = String::new();
    for (i, line) in lines.iter().enumerate() {
        text.push_str(line.as_ref());
        text.push_str(TERMINATORS[i % TERMINATORS.len()]);
    }
    text
}
