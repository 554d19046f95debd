//! # safeq Core
//!
//! Domain types, traits, and error definitions for the safeq retrieval
//! orchestrator. This crate has **no framework dependencies**: it defines
//! the two collaborator seams (text generation and the relational store)
//! and the conversation value objects that flow between caller and
//! orchestrator.
//!
//! Implementations live in their own crates:
//! - `safeq-providers` implements [`Provider`]
//! - `safeq-store` implements [`QueryStore`]
//! - `safeq-retrieval` consumes both

pub mod error;
pub mod exchange;
pub mod message;
pub mod provider;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use error::{ProviderError, RetrievalError, Stage, StoreError};
pub use exchange::{ConversationHistory, Exchange, SnippetLimits};
pub use message::{Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use store::{QueryStore, RowSet, Value};
