//! The legal-transition table.

use covenant_core::ContractState;
use covenant_security::AuditEventType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Events that move a contract along the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    SubmitForReview,
    Activate,
    Revoke,
    Expire,
    Amend,
}

impl LifecycleEvent {
    pub const ALL: [LifecycleEvent; 5] = [
        LifecycleEvent::SubmitForReview,
        LifecycleEvent::Activate,
        LifecycleEvent::Revoke,
        LifecycleEvent::Expire,
        LifecycleEvent::Amend,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::SubmitForReview => "submit_for_review",
            LifecycleEvent::Activate => "activate",
            LifecycleEvent::Revoke => "revoke",
            LifecycleEvent::Expire => "expire",
            LifecycleEvent::Amend => "amend",
        }
    }

    pub fn audit_event_type(&self) -> AuditEventType {
        match self {
            LifecycleEvent::SubmitForReview => AuditEventType::ContractSubmitted,
            LifecycleEvent::Activate => AuditEventType::ContractActivated,
            LifecycleEvent::Revoke => AuditEventType::ContractRevoked,
            LifecycleEvent::Expire => AuditEventType::ContractExpired,
            LifecycleEvent::Amend => AuditEventType::ContractAmended,
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every legal `(from, event) → to` edge.
pub const LEGAL_TRANSITIONS: [(ContractState, LifecycleEvent, ContractState); 7] = [
    (ContractState::Draft, LifecycleEvent::SubmitForReview, ContractState::Review),
    (ContractState::Review, LifecycleEvent::Activate, ContractState::Active),
    (ContractState::Draft, LifecycleEvent::Revoke, ContractState::Revoked),
    (ContractState::Review, LifecycleEvent::Revoke, ContractState::Revoked),
    (ContractState::Active, LifecycleEvent::Revoke, ContractState::Revoked),
    (ContractState::Active, LifecycleEvent::Expire, ContractState::Expired),
    (ContractState::Active, LifecycleEvent::Amend, ContractState::Amended),
];

/// The state `event` leads to from `from`, or `None` if the edge is illegal.
pub fn next_state(from: ContractState, event: LifecycleEvent) -> Option<ContractState> {
    use ContractState::*;
    use LifecycleEvent::*;

    match (from, event) {
        (Draft, SubmitForReview) => Some(Review),
        (Review, Activate) => Some(Active),
        (Draft | Review | Active, Revoke) => Some(Revoked),
        (Active, Expire) => Some(Expired),
        (Active, Amend) => Some(Amended),
        _ => None,
    }
}
