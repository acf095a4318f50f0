//! # Covenant Core
//!
//! Domain types, traits, and error definitions for Covenant learning
//! contracts. This crate has **no framework dependencies** beyond serde and
//! chrono. It defines the model that the lifecycle, enforcement, audit and
//! forgetting crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator outside the authorization core (contract persistence,
//! wall-clock time, event delivery) is a trait or an explicit value here.
//! Implementations are injected through constructors, never looked up from
//! global state. This enables:
//! - Swapping persistence via configuration
//! - Deterministic tests with a manual clock and in-memory stores
//! - A clean dependency graph (all crates depend inward on core)

pub mod clock;
pub mod contract;
pub mod error;
pub mod event;
pub mod memory;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use clock::{Clock, ManualClock, SystemClock};
pub use contract::{
    AbstractionLevel, BoundaryMode, ContractId, ContractScope, ContractState, ContractType,
    GeneralizationRules, LearningContract, MemoryPermissions, RecallRules, RetentionPolicy,
    MAX_CLASSIFICATION,
};
pub use error::{Error, Result};
pub use event::{ContractEvent, EventBus};
pub use memory::{HeuristicReference, MemoryReference};
pub use store::{ContractFilter, ContractStore};
