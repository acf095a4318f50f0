//! Contract event bus — decoupled notification of lifecycle changes.
//!
//! Events are published after a transition has been persisted and audited.
//! Subscribers (expiry watchers, memory-store adapters, UIs) react without
//! the lifecycle manager knowing about them. Dropping the receiver returned
//! by [`EventBus::subscribe`] unsubscribes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::contract::{ContractState, ContractType};

/// All contract events in the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContractEvent {
    /// A draft was validated and persisted.
    Created {
        contract_id: String,
        contract_type: ContractType,
        actor: String,
        timestamp: DateTime<Utc>,
    },

    /// A contract moved along a lifecycle edge.
    Transitioned {
        contract_id: String,
        from: ContractState,
        to: ContractState,
        actor: String,
        timestamp: DateTime<Utc>,
    },

    /// An active contract was superseded by a new draft.
    Amended {
        original_id: String,
        draft_id: String,
        actor: String,
        timestamp: DateTime<Utc>,
    },

    /// Memories under a contract were frozen, tombstoned or purged.
    MemoriesForgotten {
        contract_id: String,
        action: String,
        affected: usize,
        timestamp: DateTime<Utc>,
    },
}

impl ContractEvent {
    pub fn contract_id(&self) -> &str {
        match self {
            ContractEvent::Created { contract_id, .. }
            | ContractEvent::Transitioned { contract_id, .. }
            | ContractEvent::MemoriesForgotten { contract_id, .. } => contract_id,
            ContractEvent::Amended { original_id, .. } => original_id,
        }
    }
}

/// A broadcast-based event bus for contract events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub. Publishing is
/// synchronous and never blocks.
pub struct EventBus {
    sender: broadcast::Sender<Arc<ContractEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: ContractEvent) {
        // No subscribers is fine.
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events. Drop the receiver to unsubscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ContractEvent>> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}
