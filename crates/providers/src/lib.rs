//! Text-generation provider implementations for safeq.
//!
//! All providers implement the `safeq_core::Provider` trait.
//! The router selects the correct provider based on configuration.

pub mod openai_compat;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderRouter, build_from_config, resolve_model};
