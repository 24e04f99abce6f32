//! Output files that only appear at their final path once complete.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{Error, Result};

/// A file being written next to its destination.
///
/// Data goes to a temporary file in the destination directory; [`commit`]
/// renames it onto the destination. Dropping an uncommitted `OutputFile`
/// removes the temporary file, so a failed stage never leaves a partial
/// product behind.
///
/// [`commit`]: OutputFile::commit
#[derive(Debug)]
pub struct OutputFile {
    temp: NamedTempFile,
    dest: PathBuf,
}

impl OutputFile {
    /// Create the temporary file, creating parent directories as needed.
    pub fn create(dest: impl AsRef<Path>) -> Result<Self> {
        let dest = dest.as_ref().to_path_buf();
        let parent = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let stem = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = tempfile::Builder::new()
            .prefix(&format!(".{}.", stem))
            .suffix(".partial")
            .tempfile_in(&parent)?;

        Ok(Self { temp, dest })
    }

    /// Final path of this output
    pub fn dest(&self) -> &Path {
        &self.dest
    }

    pub fn file_mut(&mut self) -> &mut File {
        self.temp.as_file_mut()
    }

    /// Flush to disk and move the file onto its destination.
    pub fn commit(self) -> Result<PathBuf> {
        self.temp.as_file().sync_all()?;
        self.temp
            .persist(&self.dest)
            .map_err(|e| Error::Io(e.error))?;
        debug!(path = %self.dest.display(), "committed output");
        Ok(self.dest)
    }

    /// Commit outputs that belong together: all of them or none.
    ///
    /// Every file is synced before the first rename. If a rename fails, the
    /// outputs already moved into place are removed again.
    pub fn commit_all(outputs: Vec<OutputFile>) -> Result<Vec<PathBuf>> {
        for out in &outputs {
            out.temp.as_file().sync_all()?;
        }

        let mut committed: Vec<PathBuf> = Vec::with_capacity(outputs.len());
        for out in outputs {
            let dest = out.dest;
            if let Err(e) = out.temp.persist(&dest) {
                for path in &committed {
                    if let Err(rm) = fs::remove_file(path) {
                        debug!(path = %path.display(), error = %rm, "could not roll back output");
                    }
                }
                return Err(Error::Io(e.error));
            }
            debug!(path = %dest.display(), "committed output");
            committed.push(dest);
        }
        Ok(committed)
    }
}
