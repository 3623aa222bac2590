//! Directory provisioning for capture files

use std::io;
use std::path::Path;
use tokio::fs::DirBuilder;

/// Permission bits for directories created under the storage roots
#[cfg(unix)]
pub const DIR_MODE: u32 = 0o755;

/// Create `dir` and all missing ancestors. Existing directories are fine.
pub async fn ensure_dir(dir: &Path) -> io::Result<()> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(DIR_MODE);
    builder.create(dir).await
}

/// Create the parent directory of `file`, if it has one
pub async fn ensure_parent(file: &Path) -> io::Result<()> {
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir(parent).await,
        _ => Ok(()),
    }
}
