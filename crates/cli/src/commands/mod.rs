//! CLI subcommands and the file-backed workspace they share.

pub mod audit;
pub mod check;
pub mod config_cmd;
pub mod contract;
pub mod forget;
pub mod token;

use covenant_config::CovenantConfig;
use covenant_contracts::{ContractFactory, EnforcementEngine, JsonlContractStore, LifecycleManager};
use covenant_core::{HeuristicReference, MemoryReference};
use covenant_memory::MemoryForgetting;
use covenant_security::{read_jsonl, AuditLogger, AuditSink, JsonlFileSink, PurgeSigner, TracingSink};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Every component wired over the configured data directory.
pub struct Workspace {
    pub config: CovenantConfig,
    pub audit: Arc<AuditLogger>,
    pub lifecycle: LifecycleManager,
    pub factory: ContractFactory,
    pub engine: EnforcementEngine,
    pub forgetting: MemoryForgetting,
}

impl Workspace {
    /// Load contracts and the audit chain from disk. Refuses to open over a
    /// tampered audit log.
    pub fn open(config: CovenantConfig) -> CliResult<Self> {
        let audit_path = config.audit_path();
        let entries = read_jsonl(&audit_path)?;

        let mut sinks: Vec<Box<dyn AuditSink>> = Vec::new();
        if config.audit.tracing_sink {
            sinks.push(Box::new(TracingSink));
        }
        if config.audit.jsonl_sink {
            sinks.push(Box::new(JsonlFileSink::open(&audit_path)?));
        }
        let audit = Arc::new(AuditLogger::restore(entries, sinks).map_err(|e| {
            format!("{e} (run `covenant audit verify` for details)")
        })?);

        let store = Arc::new(JsonlContractStore::open(config.contracts_path())?);
        let lifecycle = LifecycleManager::new(store, audit.clone());
        let factory = ContractFactory::new(config.defaults.clone());
        let signer = Arc::new(PurgeSigner::from_config(&config.purge));
        let forgetting = MemoryForgetting::new(audit.clone(), signer);

        tracing::debug!(
            data_dir = %config.data_dir().display(),
            audit_entries = audit.len(),
            "Workspace opened"
        );
        Ok(Self {
            config,
            audit,
            lifecycle,
            factory,
            engine: EnforcementEngine::new(),
            forgetting,
        })
    }

    /// Actor recorded for operations run without an explicit one.
    pub fn system_actor(&self) -> &str {
        &self.config.defaults.system_actor
    }

    /// Retry undelivered audit entries; fail if any sink still rejects them.
    pub fn finish(&self) -> CliResult {
        let remaining = self.audit.retry_undelivered();
        if remaining > 0 {
            return Err(format!("{remaining} audit entries could not be delivered to their sinks").into());
        }
        Ok(())
    }
}

pub fn print_json<T: Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_json_list<T: DeserializeOwned>(path: &Path, what: &str) -> CliResult<Vec<T>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {what} file {}: {e}", path.display()))?;
    let items = serde_json::from_str(&content)
        .map_err(|e| format!("Failed to parse {what} file {}: {e}", path.display()))?;
    Ok(items)
}

/// Memory references from a JSON array file.
pub fn read_memories(path: &Path) -> CliResult<Vec<MemoryReference>> {
    read_json_list(path, "memory reference")
}

/// Heuristic references from a JSON array file.
pub fn read_heuristics(path: &Path) -> CliResult<Vec<HeuristicReference>> {
    read_json_list(path, "heuristic reference")
}
