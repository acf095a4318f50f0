//! Contract persistence trait.
//!
//! Any store satisfying `get` / `save` / `query` is acceptable; the core
//! makes no assumption about durability or transport.

use serde::{Deserialize, Serialize};

use crate::contract::{ContractState, ContractType, LearningContract};
use crate::error::StoreError;

/// Criteria for [`ContractStore::query`]. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ContractState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_type: Option<ContractType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    /// Matches contracts whose domain scope includes this domain
    /// (a wildcard scope matches any domain).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl ContractFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(mut self, state: ContractState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_type(mut self, contract_type: ContractType) -> Self {
        self.contract_type = Some(contract_type);
        self
    }

    pub fn with_creator(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn matches(&self, contract: &LearningContract) -> bool {
        self.state.is_none_or(|s| contract.state == s)
            && self.contract_type.is_none_or(|t| contract.contract_type == t)
            && self
                .created_by
                .as_deref()
                .is_none_or(|c| contract.created_by == c)
            && self
                .domain
                .as_deref()
                .is_none_or(|d| contract.scope.covers_domain(d))
    }
}

/// The persistence contract for learning contracts.
///
/// Implementations: in-memory (tests, embedding), JSONL file (CLI).
pub trait ContractStore: Send + Sync {
    /// The store name (e.g., "in_memory", "jsonl").
    fn name(&self) -> &str;

    /// Get a contract by ID.
    fn get(&self, contract_id: &str) -> Result<Option<LearningContract>, StoreError>;

    /// Insert or replace a contract, keyed by `contract_id`.
    fn save(&self, contract: &LearningContract) -> Result<(), StoreError>;

    /// All contracts matching the filter, ordered by creation time.
    fn query(&self, filter: &ContractFilter) -> Result<Vec<LearningContract>, StoreError>;
}
