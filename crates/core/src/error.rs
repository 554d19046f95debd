//! Error types for the safeq domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The store rejected or failed to run a statement.
    ///
    /// `kind` is a short error class (e.g. `DatabaseError`) and is rendered
    /// first so the message reads as `kind: message`.
    #[error("{kind}: {message}")]
    Execution { kind: String, message: String },

    #[error("Unsupported value in column {column}: {reason}")]
    UnsupportedValue { column: String, reason: String },
}

impl StoreError {
    /// Build an execution error from a kind and message.
    pub fn execution(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Execution {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// Which half of an attempt an error happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Generation,
    Execution,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Generation => write!(f, "generation"),
            Stage::Execution => write!(f, "execution"),
        }
    }
}

/// Failure conditions of the retrieval pipeline.
///
/// Only [`RetrievalError::UnsafeQuery`] is terminal on first sight; the
/// orchestrator retries everything else until the attempt budget runs out.
#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    /// The model produced no extractable query, or the call itself failed.
    #[error("Query generation failed: {0}")]
    GenerationFailure(String),

    /// The extracted query failed cleaning (unbalanced punctuation, empty).
    #[error("Malformed query: {0}")]
    MalformedQuery(String),

    /// The statement failed the safety validator.
    #[error("Potentially dangerous query")]
    UnsafeQuery,

    /// The store rejected the statement.
    #[error("{0}")]
    Execution(StoreError),

    /// Generation or execution exceeded its time limit.
    #[error("{stage} exceeded {}s", .after.as_secs())]
    Timeout { stage: Stage, after: Duration },

    /// Every attempt was consumed.
    #[error("Exhausted {attempts} attempts")]
    ExhaustedRetries { attempts: u32 },

    /// The caller cancelled the retrieval.
    #[error("Retrieval cancelled")]
    Cancelled,
}

impl RetrievalError {
    /// Stable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GenerationFailure(_) => "GenerationFailure",
            Self::MalformedQuery(_) => "MalformedQuery",
            Self::UnsafeQuery => "UnsafeQuery",
            Self::Execution(_) => "ExecutionError",
            Self::Timeout { .. } => "TimeoutError",
            Self::ExhaustedRetries { .. } => "ExhaustedRetries",
            Self::Cancelled => "Cancelled",
        }
    }

    /// The `errorType: message` line fed back into the next prompt.
    ///
    /// Only execution errors and timeouts carry context worth showing the
    /// model; everything else returns `None`.
    pub fn prompt_context(&self) -> Option<String> {
        match self {
            Self::Execution(StoreError::Execution { kind, message }) => {
                Some(format!("{kind}: {message}"))
            }
            Self::Execution(other) => Some(format!("{}: {other}", self.kind())),
            Self::Timeout { .. } => Some(format!("{}: {self}", self.kind())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        };
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn store_execution_error_reads_kind_first() {
        let err = StoreError::execution("DatabaseError", "no such column: e.foo");
        assert_eq!(err.to_string(), "DatabaseError: no such column: e.foo");
    }

    #[test]
    fn kinds_are_stable_names() {
        assert_eq!(RetrievalError::UnsafeQuery.kind(), "UnsafeQuery");
        assert_eq!(
            RetrievalError::Execution(StoreError::Connection("x".into())).kind(),
            "ExecutionError"
        );
        assert_eq!(
            RetrievalError::Timeout {
                stage: Stage::Execution,
                after: Duration::from_secs(3),
            }
            .kind(),
            "TimeoutError"
        );
        assert_eq!(RetrievalError::ExhaustedRetries { attempts: 5 }.kind(), "ExhaustedRetries");
    }

    #[test]
    fn prompt_context_for_execution_and_timeout() {
        let exec = RetrievalError::Execution(StoreError::execution(
            "DatabaseError",
            "misuse of aggregate: COUNT()",
        ));
        assert_eq!(
            exec.prompt_context().as_deref(),
            Some("DatabaseError: misuse of aggregate: COUNT()")
        );

        let timeout = RetrievalError::Timeout {
            stage: Stage::Generation,
            after: Duration::from_secs(60),
        };
        assert_eq!(
            timeout.prompt_context().as_deref(),
            Some("TimeoutError: generation exceeded 60s")
        );

        assert!(RetrievalError::MalformedQuery("odd quotes".into()).prompt_context().is_none());
    }
}
