//! Security module for Covenant — tamper-evident audit logging and
//! owner-confirmation tokens.
//!
//! Provides:
//! - **Audit logging**: Append-only, SHA-256 hash-chained event log with a
//!   single logical writer and chain verification from genesis
//! - **Audit sinks**: Fan-out of every entry to tracing or a JSONL file, with
//!   failed deliveries buffered for retry instead of dropped
//! - **Purge tokens**: HMAC-SHA256 signed `nonce.timestamp.signature` tokens
//!   that gate irreversible memory deletion

pub mod audit;
pub mod purge;
pub mod sink;

pub use audit::{
    verify_entries, AuditEntry, AuditEvent, AuditEventType, AuditLogger, AuditOutcome,
    GENESIS_HASH,
};
pub use purge::{PurgeSigner, PurgeToken};
pub use sink::{read_jsonl, AuditSink, JsonlFileSink, TracingSink};
