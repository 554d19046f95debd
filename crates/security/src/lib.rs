//! Query safety for safeq: the read-only SQL gate and the audit trail.
//!
//! Provides:
//! - **SQL guard**: lexical check that only `SELECT`/`WITH` statements run
//! - **Audit logging**: structured record of executed, failed and refused statements

pub mod audit;
pub mod sql_guard;

pub use audit::{AuditEntry, AuditEvent, AuditLogger, AuditOutcome, AuditSink, TracingSink};
pub use sql_guard::{GuardViolation, SqlGuard, is_safe};
