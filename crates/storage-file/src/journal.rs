//! Append-only JSONL journal shared by the queue-style stores.

use std::collections::HashSet;
use std::fs;
use std::io::BufRead;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;

use loppiskassa_core::StorageError;

use crate::atomic;

/// Minimum spacing between corrupt-line warnings per journal file.
const CORRUPT_LINE_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// A row stored in a journal, addressed by a stable key.
///
/// Appends deduplicate on the key: the first stored row wins and later
/// appends of the same key are dropped, which makes retried writes after a
/// crash idempotent.
pub trait JournalRecord: Serialize + DeserializeOwned + Send + 'static {
    fn key(&self) -> &str;
}

/// One JSONL file with atomic whole-file rewrites for every mutation.
///
/// All operations serialize on a single async mutex per journal; the file
/// work itself runs on the blocking pool while that lock is held. Concurrent
/// writers therefore observe strict FIFO ordering and partial writes never
/// interleave.
pub struct Journal<R> {
    path: Arc<PathBuf>,
    lock: Mutex<()>,
    last_skip_warn: Arc<StdMutex<Option<Instant>>>,
    _record: std::marker::PhantomData<fn() -> R>,
}

impl<R: JournalRecord> Journal<R> {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path: Arc::new(path),
            lock: Mutex::new(()),
            last_skip_warn: Arc::new(StdMutex::new(None)),
            _record: std::marker::PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `records`, dropping any whose key is already stored (or
    /// repeated within the batch). No-op for an empty input. Returns how many
    /// rows were actually written.
    pub async fn append(&self, records: Vec<R>) -> Result<usize, StorageError> {
        if records.is_empty() {
            return Ok(0);
        }

        let _guard = self.lock.lock().await;
        let path = Arc::clone(&self.path);
        let warn_state = Arc::clone(&self.last_skip_warn);
        run_blocking(move || {
            let mut rows = read_rows::<R>(&path, &warn_state)?;
            let mut seen: HashSet<String> =
                rows.iter().map(|row| row.key().to_string()).collect();

            let before = rows.len();
            for record in records {
                if seen.insert(record.key().to_string()) {
                    rows.push(record);
                }
            }

            let appended = rows.len() - before;
            if appended == 0 {
                return Ok(0);
            }
            write_rows(&path, &rows)?;
            Ok(appended)
        })
        .await
    }

    /// Inserts the row, or replaces the stored row carrying the same key.
    pub async fn upsert(&self, record: R) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let path = Arc::clone(&self.path);
        let warn_state = Arc::clone(&self.last_skip_warn);
        run_blocking(move || {
            let mut rows = read_rows::<R>(&path, &warn_state)?;
            match rows.iter_mut().find(|row| row.key() == record.key()) {
                Some(slot) => *slot = record,
                None => rows.push(record),
            }
            write_rows(&path, &rows)
        })
        .await
    }

    /// Reads every parseable row in file order.
    pub async fn read_all(&self) -> Result<Vec<R>, StorageError> {
        let _guard = self.lock.lock().await;
        let path = Arc::clone(&self.path);
        let warn_state = Arc::clone(&self.last_skip_warn);
        run_blocking(move || read_rows::<R>(&path, &warn_state)).await
    }

    /// Rewrites rows matching `predicate` through `transform`; returning
    /// `None` deletes the row. Returns the number of rows affected. The file
    /// is untouched when nothing matches.
    pub async fn update_where<P, T>(
        &self,
        predicate: P,
        mut transform: T,
    ) -> Result<usize, StorageError>
    where
        P: Fn(&R) -> bool + Send + 'static,
        T: FnMut(R) -> Option<R> + Send + 'static,
    {
        let _guard = self.lock.lock().await;
        let path = Arc::clone(&self.path);
        let warn_state = Arc::clone(&self.last_skip_warn);
        run_blocking(move || {
            let rows = read_rows::<R>(&path, &warn_state)?;
            let mut next = Vec::with_capacity(rows.len());
            let mut affected = 0usize;

            for row in rows {
                if predicate(&row) {
                    affected += 1;
                    if let Some(updated) = transform(row) {
                        next.push(updated);
                    }
                } else {
                    next.push(row);
                }
            }

            if affected == 0 {
                return Ok(0);
            }
            write_rows(&path, &next)?;
            Ok(affected)
        })
        .await
    }

    /// Deletes rows matching `predicate`. Returns the number removed.
    pub async fn remove_where<P>(&self, predicate: P) -> Result<usize, StorageError>
    where
        P: Fn(&R) -> bool + Send + 'static,
    {
        self.update_where(predicate, |_| None).await
    }
}

pub(crate) async fn run_blocking<T>(
    task: impl FnOnce() -> Result<T, StorageError> + Send + 'static,
) -> Result<T, StorageError>
where
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| StorageError::Background(err.to_string()))?
}

fn read_rows<R: JournalRecord>(
    path: &Path,
    warn_state: &StdMutex<Option<Instant>>,
) -> Result<Vec<R>, StorageError> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(StorageError::io(path, &err)),
    };

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|err| StorageError::io(path, &err))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<R>(trimmed) {
            Ok(row) => rows.push(row),
            Err(_) => skipped += 1,
        }
    }

    if skipped > 0 {
        warn_skipped(path, skipped, warn_state);
    }
    Ok(rows)
}

/// Rate limited so a damaged file does not flood the log on every read.
fn warn_skipped(path: &Path, skipped: usize, warn_state: &StdMutex<Option<Instant>>) {
    let mut last = warn_state.lock().unwrap();
    let now = Instant::now();
    let due = match *last {
        None => true,
        Some(at) => now.duration_since(at) >= CORRUPT_LINE_LOG_INTERVAL,
    };
    if due {
        *last = Some(now);
        warn!(
            "[Journal] Skipped {skipped} unparseable line(s) in {}",
            path.display()
        );
    }
}

fn write_rows<R: JournalRecord>(path: &Path, rows: &[R]) -> Result<(), StorageError> {
    let mut buf = Vec::with_capacity(rows.len() * 128);
    for row in rows {
        let line = serde_json::to_vec(row).map_err(|err| StorageError::Encode(err.to_string()))?;
        buf.extend_from_slice(&line);
        buf.push(b'\n');
    }
    atomic::replace_file(path, &buf)
}
