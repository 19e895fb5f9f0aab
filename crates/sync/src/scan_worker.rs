//! Background commit worker for the offline scan queue.
//!
//! Scans commit one at a time, oldest first. HTTP 412 is the backend saying
//! the ticket was already admitted by another device; the scan leaves the
//! queue and its history row turns into a duplicate. Other terminal HTTP
//! errors mark the history row rejected. Transport failures abort the run.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::sync::Mutex;

use loppiskassa_backend_api::{NetworkOutcome, ScanRequest, TicketResponse};
use loppiskassa_core::scanning::{CommittedScan, PendingScan, ScanStatus};
use loppiskassa_core::sync::{classify_http_response, RunSummary, UploadErrorKind, WorkerOutcome};
use loppiskassa_core::time::now_rfc3339;
use loppiskassa_core::Result;

use crate::context::SyncContext;
use crate::scheduler::SyncTask;

/// Scheduler task name for this worker.
pub const SCAN_SYNC_TASK: &str = "scan_sync";

/// Status returned by the backend for a ticket admitted twice.
const ALREADY_SCANNED_STATUS: u16 = 412;

pub struct ScanSyncWorker {
    context: Arc<SyncContext>,
    run_lock: Mutex<()>,
}

impl ScanSyncWorker {
    pub fn new(context: Arc<SyncContext>) -> Self {
        Self {
            context,
            run_lock: Mutex::new(()),
        }
    }

    /// Commits every queued scan once, oldest first.
    pub async fn run_once(&self) -> Result<RunSummary> {
        let _run = self.run_lock.lock().await;
        let started = Instant::now();
        let stores = self.context.stores();

        let scans = stores.pending_scans().get_all_scans().await?;
        if scans.is_empty() {
            let summary = RunSummary::empty(WorkerOutcome::Completed);
            self.context.record_run(&summary);
            return Ok(summary);
        }

        let mut summary = RunSummary::empty(WorkerOutcome::Completed);
        let mut queue = scans.into_iter();
        for scan in queue.by_ref() {
            let request = ScanRequest {
                scan_id: scan.scan_id.clone(),
                ticket_id: scan.ticket_id.clone(),
                scanned_at: scan.scanned_at.clone(),
                was_offline: scan.was_offline,
            };
            match self.context.api().commit_scan(self.context.event_id(), request).await {
                NetworkOutcome::Success(ticket) => {
                    self.confirm(&scan, ScanStatus::Confirmed, Some(ticket)).await?;
                    summary.uploaded += 1;
                }
                NetworkOutcome::Http { status, .. } if status == ALREADY_SCANNED_STATUS => {
                    // Someone else admitted this ticket first. Queue-wise a
                    // success; history-wise a duplicate.
                    info!(
                        "[ScanSync] Ticket {} already admitted elsewhere; scan {} recorded as duplicate",
                        scan.ticket_id, scan.scan_id
                    );
                    self.confirm(&scan, ScanStatus::Duplicate, None).await?;
                    summary.uploaded += 1;
                }
                NetworkOutcome::Http { status, body } => {
                    match classify_http_response(status, &body) {
                        UploadErrorKind::ServerError => {
                            warn!("[ScanSync] HTTP {status} for scan {}; left queued", scan.scan_id);
                            summary.deferred += 1;
                        }
                        kind => {
                            let message = match kind {
                                UploadErrorKind::ValidationError(message)
                                | UploadErrorKind::Unknown(message) => message,
                                _ => format!("HTTP {status}"),
                            };
                            warn!(
                                "[ScanSync] Scan {} refused with HTTP {status}: {message}",
                                scan.scan_id
                            );
                            self.reject(&scan, &message).await?;
                            summary.rejected += 1;
                        }
                    }
                }
                NetworkOutcome::Timeout | NetworkOutcome::ConnectionFailed(_) => {
                    warn!("[ScanSync] Transport failure for scan {}; aborting run", scan.scan_id);
                    summary.deferred += 1;
                    summary.outcome = WorkerOutcome::Retry;
                    break;
                }
            }
        }
        summary.deferred += queue.count();

        summary.duration_ms = started.elapsed().as_millis() as i64;
        debug!(
            "[ScanSync] Run finished: outcome={:?} committed={} rejected={} deferred={} in {}ms",
            summary.outcome, summary.uploaded, summary.rejected, summary.deferred, summary.duration_ms
        );
        self.context.record_run(&summary);
        Ok(summary)
    }

    /// Writes the confirmed (or duplicate) history row, then drops the queue
    /// row. History first: replays after a crash are idempotent, losing a
    /// queue row is not.
    async fn confirm(
        &self,
        scan: &PendingScan,
        status: ScanStatus,
        ticket: Option<TicketResponse>,
    ) -> Result<()> {
        let stores = self.context.stores();
        let mut row = CommittedScan::from_pending(scan);
        row.status = status;
        row.committed_at = Some(now_rfc3339());
        if let Some(ticket) = ticket {
            row.ticket_type = ticket
                .ticket_type
                .map(|type_id| self.context.ticket_types().name_for(&type_id).unwrap_or(type_id));
            row.email = ticket.email;
        }
        stores.committed_scans().record_result(row).await?;
        stores.pending_scans().remove_scan(&scan.scan_id).await?;
        Ok(())
    }

    /// Writes the rejected history row, then drops the queue row. Upserts for
    /// the same reason [`Self::confirm`] does: the provisional history row may
    /// have been lost to a crash, and the queue row is about to go.
    async fn reject(&self, scan: &PendingScan, message: &str) -> Result<()> {
        let stores = self.context.stores();
        let mut row = CommittedScan::from_pending(scan);
        row.status = ScanStatus::Rejected;
        row.error_message = Some(message.to_string());
        row.committed_at = Some(now_rfc3339());
        stores.committed_scans().record_result(row).await?;
        stores.pending_scans().remove_scan(&scan.scan_id).await?;
        Ok(())
    }
}

#[async_trait]
impl SyncTask for ScanSyncWorker {
    fn name(&self) -> &'static str {
        SCAN_SYNC_TASK
    }

    async fn run(&self) -> WorkerOutcome {
        match self.run_once().await {
            Ok(summary) => summary.outcome,
            Err(err) => {
                warn!("[ScanSync] Run failed: {err}");
                WorkerOutcome::Retry
            }
        }
    }
}
