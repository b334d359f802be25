//! Audit Logger for certification decisions
//!
//! - Audit ids are generated here, so a decision always has one
//! - Sink writes are bounded by a timeout and never fail the request
//! - Failed writes wait in a bounded retry queue drained by a background task
//! - Sinks are idempotent on `audit_id`, so a timed-out write that later lands
//!   is not duplicated by its retry

use crate::domain::audit::{AuditEntry, AuditRecord};
use crate::domain::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[async_trait]
pub trait AuditSink: Send + Sync {
    fn name(&self) -> &'static str;
    async fn write(&self, record: &AuditRecord) -> Result<()>;
}

/// Keeps the most recent records in process memory. Default sink and test
/// double. Once `capacity` is reached the oldest record is evicted.
pub struct InMemoryAuditSink {
    capacity: usize,
    log: Mutex<MemoryLog>,
}

#[derive(Default)]
struct MemoryLog {
    records: VecDeque<AuditRecord>,
    ids: HashSet<String>,
}

impl InMemoryAuditSink {
    pub const DEFAULT_CAPACITY: usize = 10_000;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            log: Mutex::new(MemoryLog::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.lock_log().records.iter().cloned().collect()
    }

    fn lock_log(&self) -> std::sync::MutexGuard<'_, MemoryLog> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for InMemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn write(&self, record: &AuditRecord) -> Result<()> {
        let mut log = self.lock_log();
        if !log.ids.insert(record.audit_id.clone()) {
            return Ok(());
        }
        if log.records.len() >= self.capacity {
            if let Some(evicted) = log.records.pop_front() {
                log.ids.remove(&evicted.audit_id);
            }
        }
        log.records.push_back(record.clone());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct AuditLoggerConfig {
    pub write_timeout: Duration,
    pub retry_queue_capacity: usize,
    pub audit_denials: bool,
}

impl Default for AuditLoggerConfig {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_millis(2000),
            retry_queue_capacity: 1000,
            audit_denials: false,
        }
    }
}

pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
    config: AuditLoggerConfig,
    pending: Mutex<VecDeque<AuditRecord>>,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>, config: AuditLoggerConfig) -> Self {
        Self {
            sink,
            config,
            pending: Mutex::new(VecDeque::new()),
        }
    }

    pub fn audits_denials(&self) -> bool {
        self.config.audit_denials
    }

    pub fn sink_name(&self) -> &'static str {
        self.sink.name()
    }

    /// Stamp and persist one decision. Returns the audit id whether or not
    /// the sink accepted the write.
    pub async fn record(&self, entry: AuditEntry) -> String {
        let audit_id = Uuid::new_v4().to_string();
        let record = entry.into_record(audit_id.clone(), Utc::now());

        let written = tokio::time::timeout(self.config.write_timeout, self.sink.write(&record)).await;
        match written {
            Ok(Ok(())) => {
                debug!(
                    audit_id = %audit_id,
                    outcome = record.outcome.label(),
                    sink = self.sink.name(),
                    "Audit record written"
                );
            }
            Ok(Err(e)) => {
                warn!(audit_id = %audit_id, sink = self.sink.name(), "Audit write failed: {}", e);
                self.enqueue(record);
            }
            Err(_) => {
                warn!(
                    audit_id = %audit_id,
                    sink = self.sink.name(),
                    timeout_ms = self.config.write_timeout.as_millis() as u64,
                    "Audit write timed out"
                );
                self.enqueue(record);
            }
        }

        audit_id
    }

    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    /// Retry queued records oldest first. Stops at the first failure so
    /// order is kept. Returns how many records were written.
    pub async fn flush_pending(&self) -> usize {
        let mut flushed = 0;

        loop {
            let next = self.lock_pending().pop_front();
            let Some(record) = next else {
                break;
            };

            let written =
                tokio::time::timeout(self.config.write_timeout, self.sink.write(&record)).await;
            match written {
                Ok(Ok(())) => flushed += 1,
                _ => {
                    self.lock_pending().push_front(record);
                    break;
                }
            }
        }

        if flushed > 0 {
            info!(flushed, remaining = self.pending_count(), "Flushed pending audit records");
        }
        flushed
    }

    /// Drain the retry queue every `every` until the runtime shuts down.
    pub fn spawn_flusher(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let logger = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if logger.pending_count() > 0 {
                    logger.flush_pending().await;
                }
            }
        })
    }

    fn enqueue(&self, record: AuditRecord) {
        let mut pending = self.lock_pending();
        if pending.len() >= self.config.retry_queue_capacity {
            if let Some(dropped) = pending.pop_front() {
                warn!(audit_id = %dropped.audit_id, "Audit retry queue full, dropping oldest record");
            }
        }
        pending.push_back(record);
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, VecDeque<AuditRecord>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
