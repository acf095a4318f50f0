//! Error types for the Covenant domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum. Enforcement denials are
//! deliberately absent: a denial is a normal policy outcome, not an error.

use thiserror::Error;

use crate::contract::{ContractState, ContractType};

/// The top-level error type for all Covenant operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Lifecycle errors ---
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    // --- Validation errors ---
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    // --- Persistence errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Audit errors ---
    #[error("Audit error: {0}")]
    Audit(#[from] AuditError),

    // --- Forgetting errors ---
    #[error("Forgetting error: {0}")]
    Forgetting(#[from] ForgettingError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Lifecycle misuse. Raised as an error because it indicates a caller bug,
/// not normal policy flow.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Invalid state transition for {contract_id}: cannot {event} from {from}")]
    InvalidStateTransition {
        contract_id: String,
        from: ContractState,
        event: String,
    },

    #[error("Contract {0} is not revocable")]
    ContractNotRevocable(String),

    #[error("Only the creator ({creator}) may {action} contract {contract_id}, not {actor}")]
    NotCreator {
        contract_id: String,
        creator: String,
        actor: String,
        action: String,
    },

    #[error("Contract {contract_id} cannot expire: {reason}")]
    NotExpirable { contract_id: String, reason: String },

    #[error("Contract not found: {0}")]
    ContractNotFound(String),

    #[error("Contract already exists: {0}")]
    DuplicateContract(String),

    #[error("Invalid contract: {0}")]
    Invalid(#[from] ValidationError),

    #[error("Persistence failed: {0}")]
    Store(#[from] StoreError),
}

/// A draft contract failed structural validation.
#[derive(Debug, Clone, Error)]
#[error("contract '{contract_id}' ({contract_type}) is malformed: {}", errors.join("; "))]
pub struct ValidationError {
    pub contract_id: String,
    pub contract_type: ContractType,
    pub errors: Vec<String>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum AuditError {
    /// The hash chain no longer reproduces from genesis. Security-class and
    /// non-recoverable: callers must surface it, never swallow it.
    #[error("Audit chain integrity violation at entry {entry_id}: {reason}")]
    ChainIntegrityViolation { entry_id: String, reason: String },

    #[error("Audit sink '{sink}' failed: {reason}")]
    SinkFailed { sink: String, reason: String },

    #[error("Audit log I/O error: {0}")]
    Io(String),

    #[error("Audit log parse error: {0}")]
    Parse(String),
}

/// Why a purge confirmation token was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PurgeTokenError {
    #[error("purge token must have the form nonce.timestamp.signature")]
    BadFormat,

    #[error("purge token signature does not match")]
    BadSignature,

    #[error("owner confirmation predates the purge token")]
    StaleConfirmation,
}

#[derive(Debug, Error)]
pub enum ForgettingError {
    #[error("Cannot {operation} memories of contract {contract_id} in state {actual} (requires {required})")]
    WrongState {
        operation: String,
        contract_id: String,
        actual: ContractState,
        required: String,
    },

    #[error("Owner mismatch: contract {contract_id} is owned by {expected}, confirmation came from {provided}")]
    OwnerMismatch {
        contract_id: String,
        expected: String,
        provided: String,
    },

    #[error("Invalid purge token: {0}")]
    InvalidPurgeToken(#[from] PurgeTokenError),
}
