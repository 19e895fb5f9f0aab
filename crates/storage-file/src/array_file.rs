//! Whole-file JSON array persistence for the log-style stores.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use loppiskassa_core::StorageError;

use crate::atomic;

/// Reads a JSON array file. Missing or empty files read as an empty list; a
/// file that exists but fails to parse is reported as corrupt rather than
/// silently discarded.
pub(crate) fn read_array<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StorageError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(StorageError::io(path, &err)),
    };

    if bytes.iter().all(|byte| byte.is_ascii_whitespace()) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(&bytes).map_err(|err| StorageError::corrupt(path, err.to_string()))
}

pub(crate) fn write_array<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), StorageError> {
    let bytes = serde_json::to_vec(rows).map_err(|err| StorageError::Encode(err.to_string()))?;
    atomic::replace_file(path, &bytes)
}
