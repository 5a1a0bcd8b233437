//! Background export worker.
//!
//! Writing a large workbook must not block the caller's (UI) thread: the
//! export runs on a dedicated thread that owns the destination path for its
//! duration, reports phase milestones over a channel, honours cooperative
//! cancellation between phases, and is abandoned with a typed timeout error
//! when it exceeds its wall-clock allowance. File-write failures are terminal
//! for the invocation; there are no retries.

use crate::engine::SampleReport;
use crate::export::{export_with_control, ExportOptions, ExportPhase};
use crate::SamplingError;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, Clone)]
pub enum ExportEvent {
    Phase(ExportPhase),
    Finished(Result<PathBuf, String>),
}

/// Handle to a running background export.
pub struct ExportHandle {
    events: Receiver<ExportEvent>,
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<Result<(), SamplingError>>,
}

impl ExportHandle {
    /// Request cooperative cancellation (checked between export phases).
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Drain any events reported so far without blocking.
    pub fn poll_events(&self) -> Vec<ExportEvent> {
        self.events.try_iter().collect()
    }

    /// Wait for the export to finish. On timeout the worker is asked to
    /// cancel and abandoned; the caller gets a typed timeout error (the
    /// output is likely too large for interactive use).
    pub fn wait(self, timeout: Duration) -> Result<(), SamplingError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(ExportEvent::Finished(_)) => {
                    return match self.handle.join() {
                        Ok(res) => res,
                        Err(_) => {
                            Err(SamplingError::ExportWrite("export worker panicked".into()))
                        }
                    };
                }
                Ok(ExportEvent::Phase(_)) => continue,
                Err(RecvTimeoutError::Timeout) => {
                    warn!(?timeout, "export timed out, requesting cancellation");
                    self.cancel.store(true, Ordering::Relaxed);
                    return Err(SamplingError::Timeout(timeout));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return match self.handle.join() {
                        Ok(res) => res,
                        Err(_) => {
                            Err(SamplingError::ExportWrite("export worker panicked".into()))
                        }
                    };
                }
            }
        }
    }
}

/// Run the export on a dedicated thread. The worker owns `path` exclusively
/// until it finishes.
pub fn spawn_export(report: SampleReport, path: PathBuf, opts: ExportOptions) -> ExportHandle {
    let cancel = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel();
    let worker_cancel = Arc::clone(&cancel);
    let handle = thread::Builder::new()
        .name("declaration-export".to_string())
        .spawn(move || {
            let phase_tx = tx.clone();
            let result = export_with_control(
                &report,
                &path,
                &opts,
                Some(&worker_cancel),
                move |phase| {
                    phase_tx.send(ExportEvent::Phase(phase)).ok();
                },
            );
            let outcome = match &result {
                Ok(()) => Ok(path.clone()),
                Err(e) => Err(e.to_string()),
            };
            tx.send(ExportEvent::Finished(outcome)).ok();
            result
        })
        .expect("failed to spawn export worker thread");
    ExportHandle {
        events: rx,
        cancel,
        handle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{SamplingStats, SummaryRow, REASONS_COLUMN};
    use crate::table::Record;
    use std::collections::HashMap;

    fn small_report() -> SampleReport {
        let mut values = HashMap::new();
        values.insert("Beyanname_no".to_string(), "B1".to_string());
        values.insert(REASONS_COLUMN.to_string(), "Random sampling".to_string());
        SampleReport {
            id_column: "Beyanname_no".to_string(),
            date_column: None,
            headers: vec!["Beyanname_no".to_string(), REASONS_COLUMN.to_string()],
            rows: vec![Record { values }],
            summary: vec![SummaryRow {
                declaration: "B1".to_string(),
                reasons: "Random sampling".to_string(),
                date: None,
            }],
            stats: SamplingStats {
                total_declarations: 2,
                target_sample_count: 1,
                selected_count: 1,
            },
        }
    }

    #[test]
    fn background_export_reports_phases_and_completes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bg.xlsx");
        let handle = spawn_export(small_report(), path.clone(), ExportOptions::default());
        handle.wait(Duration::from_secs(60)).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn precondition_failure_surfaces_through_the_worker() {
        let dir = tempfile::tempdir().unwrap();
        // A directory destination fails validation before any write.
        let handle = spawn_export(
            small_report(),
            dir.path().to_path_buf(),
            ExportOptions::default(),
        );
        let err = handle.wait(Duration::from_secs(60)).unwrap_err();
        assert!(matches!(err, SamplingError::ExportPrecondition(_)));
    }
}
