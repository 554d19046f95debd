//! The retrieval loop: generate, validate, execute, format.
//!
//! One [`Retriever::retrieve`] call runs a bounded number of attempts and
//! always ends in exactly one terminal state:
//!
//! - **Formatted**: a validated statement ran and its rows were rendered.
//! - **Rejected**: the safety gate refused a statement. Never retried.
//! - **Fallback**: every attempt failed; the keyword search ran instead.
//! - **Cancelled**: the caller's [`CancelToken`] fired.
//!
//! Execution errors and timeouts are fed back into the next prompt as
//! `errorType: message`. Generation and cleaning failures consume an
//! attempt without changing that context.

use crate::cancel::CancelToken;
use crate::fallback::{FALLBACK_HEADER, fallback_search};
use crate::format::{NO_ROWS, format_rows, pretty_print};
use crate::generator::QueryGenerator;
use crate::relevance::MemoryCompressor;
use safeq_config::RetrievalConfig;
use safeq_core::error::{RetrievalError, Stage};
use safeq_core::exchange::Exchange;
use safeq_core::store::QueryStore;
use safeq_security::{AuditEvent, AuditLogger, AuditOutcome, SqlGuard};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::error::Elapsed;
use tracing::{debug, info, warn};

const REJECTED_CONTEXT: &str = "query not authorized";
const REJECTED_ERROR: &str = "potentially dangerous query";
const CANCELLED_CONTEXT: &str = "Retrieval cancelled before a result was produced.";

/// Limits applied to one retrieval.
#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    pub max_attempts: u32,
    pub row_display_cap: usize,
    pub fallback_limit: usize,
    pub generation_timeout: Duration,
    pub execution_timeout: Duration,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            row_display_cap: 50,
            fallback_limit: 10,
            generation_timeout: Duration::from_secs(60),
            execution_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&RetrievalConfig> for RetrievalSettings {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            row_display_cap: config.row_display_cap,
            fallback_limit: config.fallback_limit,
            generation_timeout: Duration::from_secs(config.generation_timeout_secs),
            execution_timeout: Duration::from_secs(config.execution_timeout_secs),
        }
    }
}

/// Record of one pass through the loop, emitted to the debug log.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationAttempt {
    pub attempt_number: u32,
    pub generated_sql: Option<String>,
    pub explanation: Option<String>,
    pub prior_error_context: Option<String>,
}

/// The only thing a retrieval hands back to its caller.
///
/// `context` is never empty, whatever the outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub success: bool,
    pub context: String,
    /// Pretty-printed statement, for display only.
    pub sql_used: Option<String>,
    /// The statement exactly as validated (and, on success, executed).
    pub sql_raw: Option<String>,
    pub explanation: Option<String>,
    pub row_count: usize,
    pub attempts: u32,
    pub error: Option<String>,
    /// Stable error class name when `success` is false.
    pub error_kind: Option<String>,
}

impl RetrievalResult {
    fn failure(context: String, attempts: u32, error: String, kind: &str) -> Self {
        Self {
            success: false,
            context,
            sql_used: None,
            sql_raw: None,
            explanation: None,
            row_count: 0,
            attempts,
            error: Some(error),
            error_kind: Some(kind.to_string()),
        }
    }
}

/// Run `fut` under a deadline, giving up early if `cancel` fires.
///
/// `None` means cancelled.
async fn bounded<F: Future>(
    cancel: &CancelToken,
    limit: Duration,
    fut: F,
) -> Option<Result<F::Output, Elapsed>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = tokio::time::timeout(limit, fut) => Some(out),
    }
}

/// Stateless retrieval orchestrator.
///
/// Holds only collaborators and limits; conversation state arrives with
/// each call.
pub struct Retriever {
    generator: QueryGenerator,
    store: Arc<dyn QueryStore>,
    compressor: MemoryCompressor,
    guard: SqlGuard,
    settings: RetrievalSettings,
    audit: Option<Arc<AuditLogger>>,
}

impl Retriever {
    pub fn new(generator: QueryGenerator, store: Arc<dyn QueryStore>) -> Self {
        Self {
            generator,
            store,
            compressor: MemoryCompressor::default(),
            guard: SqlGuard::default(),
            settings: RetrievalSettings::default(),
            audit: None,
        }
    }

    pub fn with_compressor(mut self, compressor: MemoryCompressor) -> Self {
        self.compressor = compressor;
        self
    }

    pub fn with_settings(mut self, settings: RetrievalSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_guard(mut self, guard: SqlGuard) -> Self {
        self.guard = guard;
        self
    }

    /// Record executed, failed and rejected statements.
    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    /// Answer `question` given the caller's recent exchanges (oldest first).
    pub async fn retrieve(&self, question: &str, history: &[Exchange]) -> RetrievalResult {
        self.retrieve_with_cancel(question, history, &CancelToken::new())
            .await
    }

    /// Like [`retrieve`](Self::retrieve), stopping early once `cancel` fires.
    pub async fn retrieve_with_cancel(
        &self,
        question: &str,
        history: &[Exchange],
        cancel: &CancelToken,
    ) -> RetrievalResult {
        let max_attempts = self.settings.max_attempts.max(1);
        let compressed = self.compressor.prepare(history, question);
        let mut prior_error: Option<String> = None;
        let mut last_error: Option<RetrievalError> = None;

        info!(
            max_attempts,
            history = history.len(),
            context_entries = compressed.len(),
            "Starting retrieval"
        );

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return self.cancelled(question, attempt);
            }

            let generation = bounded(
                cancel,
                self.settings.generation_timeout,
                self.generator
                    .generate(question, &compressed, prior_error.as_deref()),
            )
            .await;

            let query = match generation {
                None => return self.cancelled(question, attempt),
                Some(Ok(Ok(query))) => query,
                Some(Ok(Err(e))) => {
                    warn!(attempt, kind = e.kind(), error = %e, "Query generation failed");
                    self.trace_attempt(attempt, None, None, prior_error.as_deref());
                    last_error = Some(e);
                    continue;
                }
                Some(Err(_)) => {
                    let e = RetrievalError::Timeout {
                        stage: Stage::Generation,
                        after: self.settings.generation_timeout,
                    };
                    warn!(attempt, error = %e, "Query generation timed out");
                    self.trace_attempt(attempt, None, None, prior_error.as_deref());
                    prior_error = e.prompt_context();
                    last_error = Some(e);
                    continue;
                }
            };

            self.trace_attempt(
                attempt,
                Some(&query.sql),
                Some(&query.explanation),
                prior_error.as_deref(),
            );

            if let Err(violation) = self.guard.check(&query.sql) {
                warn!(attempt, %violation, "Generated statement rejected");
                self.audit(
                    AuditEvent::QueryRejected { attempt },
                    question,
                    Some(&query.sql),
                    AuditOutcome::Denied,
                    Some(violation.to_string()),
                );
                return RetrievalResult {
                    sql_used: Some(pretty_print(&query.sql)),
                    sql_raw: Some(query.sql),
                    explanation: Some(query.explanation),
                    ..RetrievalResult::failure(
                        REJECTED_CONTEXT.to_string(),
                        attempt,
                        REJECTED_ERROR.to_string(),
                        RetrievalError::UnsafeQuery.kind(),
                    )
                };
            }

            let execution = bounded(
                cancel,
                self.settings.execution_timeout,
                self.store.fetch(&query.sql),
            )
            .await;

            let error = match execution {
                None => return self.cancelled(question, attempt),
                Some(Ok(Ok(rows))) => {
                    let row_count = rows.len();
                    info!(attempt, rows = row_count, "Query executed");
                    self.audit(
                        AuditEvent::QueryExecuted {
                            attempt,
                            rows: row_count,
                        },
                        question,
                        Some(&query.sql),
                        AuditOutcome::Success,
                        None,
                    );
                    let context = if rows.is_empty() {
                        NO_ROWS.to_string()
                    } else {
                        format_rows(&rows, self.settings.row_display_cap)
                    };
                    return RetrievalResult {
                        success: true,
                        context,
                        sql_used: Some(pretty_print(&query.sql)),
                        sql_raw: Some(query.sql),
                        explanation: Some(query.explanation),
                        row_count,
                        attempts: attempt,
                        error: None,
                        error_kind: None,
                    };
                }
                Some(Ok(Err(e))) => RetrievalError::Execution(e),
                Some(Err(_)) => RetrievalError::Timeout {
                    stage: Stage::Execution,
                    after: self.settings.execution_timeout,
                },
            };

            warn!(attempt, max_attempts, kind = error.kind(), error = %error, "Query execution failed");
            self.audit(
                AuditEvent::QueryFailed {
                    attempt,
                    kind: error.kind().to_string(),
                },
                question,
                Some(&query.sql),
                AuditOutcome::Failure,
                Some(error.to_string()),
            );
            prior_error = error.prompt_context();
            last_error = Some(error);
        }

        self.fallback(question, max_attempts, last_error, cancel)
            .await
    }

    async fn fallback(
        &self,
        question: &str,
        attempts: u32,
        last_error: Option<RetrievalError>,
        cancel: &CancelToken,
    ) -> RetrievalResult {
        warn!(attempts, "All attempts failed, running keyword search");
        self.audit(
            AuditEvent::FallbackSearch { attempts },
            question,
            None,
            AuditOutcome::Failure,
            last_error.as_ref().map(ToString::to_string),
        );

        let search = bounded(
            cancel,
            self.settings.execution_timeout,
            fallback_search(self.store.as_ref(), question, self.settings.fallback_limit),
        )
        .await;

        let context = match search {
            None => return self.cancelled(question, attempts),
            Some(Ok(text)) => text,
            Some(Err(_)) => format!(
                "{FALLBACK_HEADER}\n\nSearch timed out after {}s.",
                self.settings.execution_timeout.as_secs()
            ),
        };

        let exhausted = RetrievalError::ExhaustedRetries { attempts };
        let error = match &last_error {
            Some(e) => format!("exhausted {attempts} attempts (last error: {e})"),
            None => format!("exhausted {attempts} attempts"),
        };
        RetrievalResult::failure(context, attempts, error, exhausted.kind())
    }

    fn cancelled(&self, question: &str, attempt: u32) -> RetrievalResult {
        info!(attempt, "Retrieval cancelled");
        self.audit(
            AuditEvent::RetrievalCancelled { attempt },
            question,
            None,
            AuditOutcome::Failure,
            None,
        );
        RetrievalResult::failure(
            CANCELLED_CONTEXT.to_string(),
            attempt,
            "cancelled".to_string(),
            RetrievalError::Cancelled.kind(),
        )
    }

    fn trace_attempt(
        &self,
        attempt: u32,
        sql: Option<&str>,
        explanation: Option<&str>,
        prior_error: Option<&str>,
    ) {
        let record = GenerationAttempt {
            attempt_number: attempt,
            generated_sql: sql.map(String::from),
            explanation: explanation.map(String::from),
            prior_error_context: prior_error.map(String::from),
        };
        debug!(attempt = record.attempt_number, record = ?record, "Generation attempt");
    }

    fn audit(
        &self,
        event: AuditEvent,
        question: &str,
        sql: Option<&str>,
        outcome: AuditOutcome,
        details: Option<String>,
    ) {
        if let Some(audit) = &self.audit {
            audit.log(event, question, sql, outcome, details);
        }
    }
}
