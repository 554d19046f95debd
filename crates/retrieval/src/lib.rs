//! Conversational retrieval for safeq.
//!
//! Turns a natural-language question, plus a short window of prior
//! exchanges, into one validated read-only query against the safety-events
//! store and renders the result as a bounded context block.

pub mod cancel;
pub mod fallback;
pub mod format;
pub mod generator;
pub mod orchestrator;
pub mod relevance;
pub mod schema;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use cancel::CancelToken;
pub use fallback::fallback_search;
pub use format::{format_rows, pretty_print};
pub use generator::{GeneratedQuery, QueryGenerator};
pub use orchestrator::{GenerationAttempt, RetrievalResult, RetrievalSettings, Retriever};
pub use relevance::{
    CompressedHistory, HeuristicClassifier, MemoryCompressor, RelevanceClassifier,
};
pub use schema::schema_description;
