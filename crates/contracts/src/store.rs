//! Contract stores — in-memory and JSON-lines file persistence.

use covenant_core::error::StoreError;
use covenant_core::{ContractFilter, ContractStore, LearningContract};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

fn sorted_matches<'a>(
    contracts: impl Iterator<Item = &'a LearningContract>,
    filter: &ContractFilter,
) -> Vec<LearningContract> {
    let mut matched: Vec<_> = contracts.filter(|c| filter.matches(c)).cloned().collect();
    matched.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.contract_id.cmp(&b.contract_id))
    });
    matched
}

/// A process-local contract store.
#[derive(Debug, Default)]
pub struct InMemoryContractStore {
    contracts: RwLock<BTreeMap<String, LearningContract>>,
}

impl InMemoryContractStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ContractStore for InMemoryContractStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    fn get(&self, contract_id: &str) -> Result<Option<LearningContract>, StoreError> {
        let contracts = self.contracts.read().unwrap_or_else(PoisonError::into_inner);
        Ok(contracts.get(contract_id).cloned())
    }

    fn save(&self, contract: &LearningContract) -> Result<(), StoreError> {
        self.contracts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(contract.contract_id.clone(), contract.clone());
        Ok(())
    }

    fn query(&self, filter: &ContractFilter) -> Result<Vec<LearningContract>, StoreError> {
        let contracts = self.contracts.read().unwrap_or_else(PoisonError::into_inner);
        Ok(sorted_matches(contracts.values(), filter))
    }
}

/// A file-backed store: one JSON contract per line.
///
/// Contracts are loaded when the store is opened and the whole file is
/// rewritten on every save (write to a sibling temp file, then rename), so
/// a crash mid-write never leaves a half-written file behind.
#[derive(Debug)]
pub struct JsonlContractStore {
    path: PathBuf,
    contracts: RwLock<BTreeMap<String, LearningContract>>,
}

impl JsonlContractStore {
    /// Open the store at `path`. A missing file is an empty store; a line
    /// that does not parse is an error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let contracts = Self::load(&path)?;
        debug!(path = %path.display(), count = contracts.len(), "Contract store loaded");
        Ok(Self {
            path,
            contracts: RwLock::new(contracts),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> Result<BTreeMap<String, LearningContract>, StoreError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(StoreError::Storage(format!("{}: {e}", path.display())));
            }
        };

        let mut contracts = BTreeMap::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let contract: LearningContract = serde_json::from_str(line)
                .map_err(|e| StoreError::Corrupt(format!("line {}: {e}", line_no + 1)))?;
            contracts.insert(contract.contract_id.clone(), contract);
        }
        Ok(contracts)
    }

    fn flush(&self, contracts: &BTreeMap<String, LearningContract>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Storage(format!("Failed to create store directory: {e}")))?;
        }

        let mut content = String::new();
        for contract in contracts.values() {
            let line = serde_json::to_string(contract)
                .map_err(|e| StoreError::Storage(format!("Failed to serialize contract: {e}")))?;
            content.push_str(&line);
            content.push('\n');
        }

        let tmp = self.path.with_extension("jsonl.tmp");
        std::fs::write(&tmp, &content)
            .and_then(|_| std::fs::rename(&tmp, &self.path))
            .map_err(|e| StoreError::Storage(format!("Failed to write contract file: {e}")))
    }
}

impl ContractStore for JsonlContractStore {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn get(&self, contract_id: &str) -> Result<Option<LearningContract>, StoreError> {
        let contracts = self.contracts.read().unwrap_or_else(PoisonError::into_inner);
        Ok(contracts.get(contract_id).cloned())
    }

    fn save(&self, contract: &LearningContract) -> Result<(), StoreError> {
        let mut contracts = self.contracts.write().unwrap_or_else(PoisonError::into_inner);
        let previous = contracts.insert(contract.contract_id.clone(), contract.clone());
        if let Err(e) = self.flush(&contracts) {
            // Keep memory consistent with disk.
            match previous {
                Some(prev) => contracts.insert(prev.contract_id.clone(), prev),
                None => contracts.remove(&contract.contract_id),
            };
            return Err(e);
        }
        Ok(())
    }

    fn query(&self, filter: &ContractFilter) -> Result<Vec<LearningContract>, StoreError> {
        let contracts = self.contracts.read().unwrap_or_else(PoisonError::into_inner);
        Ok(sorted_matches(contracts.values(), filter))
    }
}
