//! Work directory bootstrap.

use std::fs;
use std::io;
use std::path::Path;

use tracing::info;

use crate::error::PipelineError;

/// Make sure `path` is a usable directory, creating it if absent.
pub fn ensure_work_dir(path: &Path) -> Result<(), PipelineError> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(PipelineError::WorkDirNotDirectory {
            path: path.to_path_buf(),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(path).map_err(|source| PipelineError::WorkDirSetup {
                path: path.to_path_buf(),
                source,
            })?;
            info!("created work dir {}", path.display());
            Ok(())
        }
        Err(source) => Err(PipelineError::WorkDirSetup {
            path: path.to_path_buf(),
            source,
        }),
    }
}
