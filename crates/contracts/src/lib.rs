//! Learning Contracts — explicit, revocable agreements bounding what an
//! agent may learn, store, generalize and recall.
//!
//! This crate is the authorization core between an agent's memory
//! operations and its storage backends:
//!
//! - [`ContractFactory`] builds draft contracts with per-type permission
//!   bundles; [`ContractValidator`] rejects malformed drafts.
//! - [`LifecycleManager`] walks contracts through the state machine, pairing
//!   every transition with exactly one audit entry.
//! - [`EnforcementEngine`] answers the four policy questions (store,
//!   abstract, recall, export) without side effects.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐    ┌──────────────┐    ┌──────────────┐
//! │ Agent memory │───▶│ Enforcement  │───▶│ Memory store │
//! │  operation   │    │   Engine     │    │  (external)  │
//! └─────────────┘    └──────────────┘    └──────────────┘
//!                          │ reads
//!                    ┌─────┴──────┐      ┌──────────────┐
//!                    │ Lifecycle  │─────▶│ Audit Logger │
//!                    │  Manager   │      │ (hash chain) │
//!                    └────────────┘      └──────────────┘
//! ```
//!
//! # Lifecycle
//!
//! ```text
//! DRAFT ──submit──▶ REVIEW ──activate──▶ ACTIVE ──expire──▶ EXPIRED
//!   │                 │                    │ └────amend───▶ AMENDED (+ new DRAFT)
//!   └──────revoke─────┴───────revoke───────┴──revoke──▶ REVOKED
//! ```

mod engine;
mod factory;
mod lifecycle;
mod store;
mod transitions;
mod validator;

pub use engine::{reasons, EnforcementCheck, EnforcementContext, EnforcementEngine, EnforcementResult};
pub use factory::{ContractFactory, ContractOptions, ScopeSpec};
pub use lifecycle::{AmendmentOutcome, ContractChanges, LifecycleManager, RevocationOverride};
pub use store::{InMemoryContractStore, JsonlContractStore};
pub use transitions::{next_state, LifecycleEvent, LEGAL_TRANSITIONS};
pub use validator::ContractValidator;
