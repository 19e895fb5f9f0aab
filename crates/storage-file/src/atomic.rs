//! Crash-safe whole-file replacement.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use loppiskassa_core::StorageError;

/// Atomically replaces `path` with `bytes`.
///
/// Writes a sibling temp file, fsyncs it, renames it over the target, then
/// fsyncs the parent directory so the rename itself survives power loss.
/// Readers observe either the old content or the new content, never a
/// prefix.
pub(crate) fn replace_file(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let parent = path.parent().ok_or_else(|| StorageError::Io {
        path: path.display().to_string(),
        message: "no parent directory".to_string(),
    })?;

    let tmp_path = temp_sibling(path);
    write_and_sync(&tmp_path, bytes)?;
    fs::rename(&tmp_path, path).map_err(|err| StorageError::io(path, &err))?;
    sync_dir(parent)
}

/// Temp name next to the target so the rename stays on one filesystem.
fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_and_sync(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let mut file = File::create(path).map_err(|err| StorageError::io(path, &err))?;
    file.write_all(bytes).map_err(|err| StorageError::io(path, &err))?;
    file.sync_all().map_err(|err| StorageError::io(path, &err))
}

fn sync_dir(dir: &Path) -> Result<(), StorageError> {
    let handle = File::open(dir).map_err(|err| StorageError::io(dir, &err))?;
    handle.sync_all().map_err(|err| StorageError::io(dir, &err))
}
