//! Secure forgetting for Covenant.
//!
//! When a contract ends, the memories it authorized must become unreadable.
//! [`MemoryForgetting`] computes which memories are affected and records the
//! decision in the audit chain; the external memory store applies it.
//!
//! | Tier | Contract state | Cascades to derived memories | Reversible |
//! |------|----------------|------------------------------|------------|
//! | freeze | EXPIRED | no | yes |
//! | tombstone | REVOKED | yes | content retained |
//! | deep purge | REVOKED or EXPIRED | yes | no, needs signed owner consent |

pub mod derivation;
pub mod forgetting;

pub use derivation::DerivationGraph;
pub use forgetting::{
    AccessCheck, ForgettingAction, ForgettingResult, MemoryForgetting, OwnerConfirmation,
};
