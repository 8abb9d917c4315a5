use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempPath;
use tracing::{debug, warn};

use crate::error::GenerationError;

/// Creates uniquely named temp files for provider uploads.
#[derive(Debug, Clone, Default)]
pub struct StagingArea {
    dir: Option<PathBuf>,
}

impl StagingArea {
    /// `None` stages into the system temp directory.
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    pub fn stage(&self, bytes: &[u8]) -> Result<StagedFile, GenerationError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("cardforge-").suffix(".png");
        let created = match &self.dir {
            Some(dir) => {
                fs::create_dir_all(dir).map_err(|err| {
                    GenerationError::staging(format!("failed creating {}: {err}", dir.display()))
                })?;
                builder.tempfile_in(dir)
            }
            None => builder.tempfile(),
        };
        let mut file = created
            .map_err(|err| GenerationError::staging(format!("failed creating temp file: {err}")))?;
        file.write_all(bytes)
            .and_then(|_| file.flush())
            .map_err(|err| GenerationError::staging(format!("failed writing temp file: {err}")))?;

        let guard = file.into_temp_path();
        let path = guard.to_path_buf();
        debug!(path = %path.display(), bytes = bytes.len(), "staged temp file");
        Ok(StagedFile {
            path,
            guard: Some(guard),
        })
    }
}

/// A staged upload. The file is removed when this value is dropped, on every
/// exit path including unwinding; removal errors are logged and ignored.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    guard: Option<TempPath>,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };
        match guard.close() {
            Ok(()) => debug!(path = %self.path.display(), "cleaned up temp file"),
            Err(err) => warn!(path = %self.path.display(), "temp file cleanup failed: {err}"),
        }
    }
}
