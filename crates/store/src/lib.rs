//! Relational store implementations for safeq.
//!
//! The retrieval pipeline only sees the `safeq_core::QueryStore` trait;
//! this crate provides the SQLite backend plus the schema bootstrap used
//! by `safeq init`.

pub mod bootstrap;
pub mod sqlite;

pub use sqlite::SqliteStore;
