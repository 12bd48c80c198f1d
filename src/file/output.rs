//! Atomic file persistence for generated containers.
//!
//! This module provides the [`Output`] type, which implements the
//! write-to-temp-then-rename pattern: bytes are written to a temporary sibling
//! of the target path and only moved into place when the caller finalizes the
//! output. An interrupted or failed pass therefore never leaves a partially
//! written artifact at the destination.
//!
//! # Key Components
//!
//! - [`Output`] - Temporary output file with atomic finalization
//!
//! # Usage Examples
//!
//! ```rust,ignore
//! use patchscope::file::Output;
//!
//! let output = Output::create("patched.psmc", &bytes)?;
//! output.finalize()?;
//! # Ok::<(), patchscope::Error>(())
//! ```

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use crate::Result;

/// A pending output file that becomes visible at its target path only on finalization.
///
/// The temporary file is created in the same directory as the target so the
/// final rename never crosses a filesystem boundary. Dropping an unfinalized
/// `Output` removes the temporary file.
pub struct Output {
    /// Where the temporary bytes currently live
    temp_path: PathBuf,

    /// The target path
    target_path: PathBuf,

    /// Whether the file has been finalized
    finalized: bool,
}

impl Output {
    /// Writes `data` to a temporary sibling of `target_path`.
    ///
    /// The data is flushed and synced to disk before this returns; the target
    /// path itself is not touched until [`Output::finalize`] is called.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the temporary file cannot be
    /// created, written, or synced.
    pub fn create<P: AsRef<Path>>(target_path: P, data: &[u8]) -> Result<Self> {
        let target_path = target_path.as_ref().to_path_buf();

        let file_name = match target_path.file_name() {
            Some(name) => name.to_os_string(),
            None => {
                return Err(crate::Error::Error(format!(
                    "Output path '{}' has no file name",
                    target_path.display()
                )))
            }
        };
        let mut temp_name = file_name;
        temp_name.push(".tmp");
        let temp_path = target_path.with_file_name(temp_name);

        let mut file = fs::File::create(&temp_path)?;
        if let Err(error) = file.write_all(data).and_then(|()| file.sync_all()) {
            drop(file);
            let _ = fs::remove_file(&temp_path);
            return Err(error.into());
        }

        Ok(Output {
            temp_path,
            target_path,
            finalized: false,
        })
    }

    /// Atomically moves the temporary file to the target path.
    ///
    /// After this returns the artifact is complete and will remain at the
    /// target path. Can only be called once per instance.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the rename fails; the temporary
    /// file is removed in that case.
    pub fn finalize(mut self) -> Result<()> {
        if let Err(error) = fs::rename(&self.temp_path, &self.target_path) {
            let _ = fs::remove_file(&self.temp_path);
            self.finalized = true;
            return Err(error.into());
        }

        self.finalized = true;
        Ok(())
    }

    /// Gets the target path where the file will be placed on finalization.
    pub fn target_path(&self) -> &Path {
        &self.target_path
    }
}

impl Drop for Output {
    fn drop(&mut self) {
        if !self.finalized {
            // Abandoned output, remove the incomplete temporary file
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}
