//! Audit trail of everything the retriever runs or refuses.
//!
//! Each executed statement, each rejection and each fallback activation is
//! recorded as an [`AuditEntry`] and forwarded to the configured sinks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

const DEFAULT_RETAINED_ENTRIES: usize = 1_000;

/// A single audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub event: AuditEvent,
    /// The question that led to the statement.
    pub question: String,
    /// The raw statement, when there is one.
    pub sql: Option<String>,
    pub outcome: AuditOutcome,
    pub details: Option<String>,
}

/// Types of auditable retrieval events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// A statement ran against the store.
    QueryExecuted { attempt: u32, rows: usize },
    /// The store rejected a statement or timed out.
    QueryFailed { attempt: u32, kind: String },
    /// The safety gate refused a statement; it never reached the store.
    QueryRejected { attempt: u32 },
    /// Every attempt failed and the keyword search ran instead.
    FallbackSearch { attempts: u32 },
    /// The caller cancelled the retrieval.
    RetrievalCancelled { attempt: u32 },
}

/// Outcome of an audited operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
    Denied,
}

/// Where audit entries are written.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditEntry);
}

/// Bounded in-memory audit log with pluggable sinks.
///
/// Keeps the most recent entries only; sinks see every entry.
pub struct AuditLogger {
    entries: Mutex<VecDeque<AuditEntry>>,
    retained: usize,
    sinks: Vec<Box<dyn AuditSink>>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("entry_count", &self.count())
            .field("retained", &self.retained)
            .field("sink_count", &self.sinks.len())
            .finish()
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLogger {
    /// Create a new audit logger with no sinks.
    pub fn new() -> Self {
        Self::with_sinks(Vec::new())
    }

    /// Create a new audit logger with the given sinks.
    pub fn with_sinks(sinks: Vec<Box<dyn AuditSink>>) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            retained: DEFAULT_RETAINED_ENTRIES,
            sinks,
        }
    }

    /// Change how many entries stay in memory.
    pub fn retain_last(mut self, retained: usize) -> Self {
        self.retained = retained.max(1);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<AuditEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record an audit event.
    pub fn log(
        &self,
        event: AuditEvent,
        question: &str,
        sql: Option<&str>,
        outcome: AuditOutcome,
        details: Option<String>,
    ) {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            event,
            question: question.into(),
            sql: sql.map(String::from),
            outcome,
            details,
        };

        for sink in &self.sinks {
            sink.record(&entry);
        }

        let mut entries = self.lock();
        entries.push_back(entry);
        while entries.len() > self.retained {
            entries.pop_front();
        }
    }

    /// Get all retained entries, oldest first.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.lock().iter().cloned().collect()
    }

    pub fn entries_by_outcome(&self, outcome: &AuditOutcome) -> Vec<AuditEntry> {
        self.lock()
            .iter()
            .filter(|e| &e.outcome == outcome)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }
}

/// A tracing-based audit sink.
///
/// Denied entries are logged at `warn`, everything else at `info`.
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn record(&self, entry: &AuditEntry) {
        match entry.outcome {
            AuditOutcome::Denied => tracing::warn!(
                event = ?entry.event,
                sql = ?entry.sql,
                details = ?entry.details,
                "AUDIT"
            ),
            _ => tracing::info!(
                event = ?entry.event,
                outcome = ?entry.outcome,
                sql = ?entry.sql,
                details = ?entry.details,
                "AUDIT"
            ),
        }
    }
}
