//! Audit trail (§4.9): append-only, buffered, flushed asynchronously to a
//! file and/or console sink. Mirrors the telemetry task's
//! `CancellationToken` + bounded-channel shutdown discipline (§4.4, §5).

use fabric_types::{AuditOutcome, AuditRecord};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Where flushed audit records go. A sealed enum matching the three string
/// forms `AuditSinkConfig` parses from config (§6).
pub enum AuditSink {
    File(PathBuf),
    Console,
    None,
}

impl From<&fabric_types::AuditSinkConfig> for AuditSink {
    fn from(config: &fabric_types::AuditSinkConfig) -> Self {
        match config {
            fabric_types::AuditSinkConfig::File(path) => AuditSink::File(path.clone()),
            fabric_types::AuditSinkConfig::Console => AuditSink::Console,
            fabric_types::AuditSinkConfig::None => AuditSink::None,
        }
    }
}

/// The in-memory queryable buffer plus the channel feeding the background
/// flush task. Bounded to `capacity` records (§6 `audit_buffer_size`,
/// default 100); oldest record is evicted on overflow, matching
/// `TelemetryHistory`'s ring discipline (§3).
pub struct AuditLog {
    buffer: Mutex<VecDeque<AuditRecord>>,
    capacity: usize,
    tx: mpsc::Sender<AuditRecord>,
}

impl AuditLog {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<AuditRecord>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            AuditLog {
                buffer: Mutex::new(VecDeque::with_capacity(capacity)),
                capacity,
                tx,
            },
            rx,
        )
    }

    /// Record an audit entry: push into the queryable buffer and hand it to
    /// the background flush task. Never blocks the caller — a full flush
    /// channel just means the record is still visible to queries but the
    /// durable sink sees it late, never never (§5: audit must not stall
    /// operations it's auditing).
    pub fn record(&self, record: AuditRecord) {
        {
            let mut buffer = self.buffer.lock();
            if buffer.len() == self.capacity {
                buffer.pop_front();
            }
            buffer.push_back(record.clone());
        }
        let _ = self.tx.try_send(record);
    }

    pub fn by_principal(&self, principal_id: &str) -> Vec<AuditRecord> {
        self.buffer
            .lock()
            .iter()
            .filter(|r| r.principal_id == principal_id)
            .cloned()
            .collect()
    }

    pub fn by_event_type(&self, event_type: &str) -> Vec<AuditRecord> {
        self.buffer
            .lock()
            .iter()
            .filter(|r| r.event_type == event_type)
            .cloned()
            .collect()
    }

    /// Inclusive range over `timestamp_ms`. Covers only what's still
    /// buffered — a file sink is append-only JSONL and is not re-read for
    /// queries (documented as an Open Question resolution in DESIGN.md).
    pub fn by_time_range(&self, from_ms: u64, to_ms: u64) -> Vec<AuditRecord> {
        self.buffer
            .lock()
            .iter()
            .filter(|r| r.timestamp_ms >= from_ms && r.timestamp_ms <= to_ms)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }
}

fn render(record: &AuditRecord) -> String {
    let outcome = match record.outcome {
        AuditOutcome::Allowed => "allowed",
        AuditOutcome::Denied => "denied",
    };
    format!(
        "{{\"principal_id\":{:?},\"event_type\":{:?},\"device_id\":{:?},\"outcome\":{:?},\"timestamp_ms\":{},\"metadata\":{:?}}}",
        record.principal_id, record.event_type, record.device_id, outcome, record.timestamp_ms, record.metadata
    )
}

/// Background flush task: drains the channel and writes each record to the
/// configured sink. On cancellation, drains whatever is left before
/// returning (§4.9 "the buffer must flush on shutdown").
pub async fn run_flush_task(mut rx: mpsc::Receiver<AuditRecord>, sink: AuditSink, cancel: CancellationToken) {
    let mut file = match &sink {
        AuditSink::File(path) => tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .ok(),
        _ => None,
    };

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            record = rx.recv() => match record {
                Some(record) => write_record(&sink, &mut file, &record).await,
                None => break,
            },
        }
    }

    while let Ok(record) = rx.try_recv() {
        write_record(&sink, &mut file, &record).await;
    }
}

async fn write_record(sink: &AuditSink, file: &mut Option<tokio::fs::File>, record: &AuditRecord) {
    match sink {
        AuditSink::None => {}
        AuditSink::Console => {
            tracing::info!(target: "audit", "{}", render(record));
        }
        AuditSink::File(_) => {
            if let Some(f) = file {
                let line = format!("{}\n", render(record));
                let _ = f.write_all(line.as_bytes()).await;
                let _ = f.flush().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_types::AuditOutcome;

    fn record(principal: &str, event_type: &str, ts: u64) -> AuditRecord {
        AuditRecord {
            principal_id: principal.into(),
            event_type: event_type.into(),
            device_id: None,
            outcome: AuditOutcome::Allowed,
            timestamp_ms: ts,
            metadata: String::new(),
        }
    }

    #[test]
    fn ring_buffer_evicts_oldest_once_full() {
        let (log, _rx) = AuditLog::new(2);
        log.record(record("alice", "allocate", 1));
        log.record(record("alice", "allocate", 2));
        log.record(record("alice", "allocate", 3));
        assert_eq!(log.len(), 2);
        assert_eq!(log.by_time_range(0, 1).len(), 0);
    }

    #[test]
    fn queries_filter_by_principal_and_event_type() {
        let (log, _rx) = AuditLog::new(10);
        log.record(record("alice", "allocate", 1));
        log.record(record("bob", "deallocate", 2));
        assert_eq!(log.by_principal("alice").len(), 1);
        assert_eq!(log.by_event_type("deallocate").len(), 1);
        assert_eq!(log.by_time_range(1, 1).len(), 1);
    }

    #[tokio::test]
    async fn flush_task_drains_on_cancellation() {
        let (log, rx) = AuditLog::new(10);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_flush_task(rx, AuditSink::None, cancel.clone()));
        log.record(record("alice", "allocate", 1));
        cancel.cancel();
        handle.await.unwrap();
    }
}
