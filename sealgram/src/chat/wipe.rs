//! Panic wipe: truncate every sensitive file to zero bytes.
//!
//! Truncation only. The old contents may survive on disk until the blocks
//! are reused.

use std::fs::File;
use std::path::PathBuf;

/// Error from [`wipe`], naming the file that failed.
#[derive(Debug, thiserror::Error)]
#[error("failed to wipe {}: {source}", path.display())]
pub struct WipeError {
    /// File being truncated.
    pub path: PathBuf,
    /// Underlying I/O error.
    pub source: std::io::Error,
}

/// Truncate each of `targets` to zero bytes, creating missing ones empty.
///
/// Stops at the first failure; earlier files stay truncated.
///
/// # Errors
///
/// Returns [`WipeError`] for the first file that cannot be truncated.
pub fn wipe(targets: &[PathBuf]) -> Result<(), WipeError> {
    for path in targets {
        let file = File::create(path).map_err(|source| WipeError {
            path: path.clone(),
            source,
        })?;
        file.sync_all().map_err(|source| WipeError {
            path: path.clone(),
            source,
        })?;
    }
    tracing::warn!(files = targets.len(), "panic wipe completed");
    Ok(())
}
