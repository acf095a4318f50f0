//! `covenant forget` — freeze, tombstone or purge an ended contract's memories.
//!
//! Memory references are read from a JSON array file; the resulting memory
//! sets are printed as JSON for the memory store to apply.

use chrono::{DateTime, Utc};
use clap::Subcommand;
use covenant_memory::{ForgettingResult, OwnerConfirmation};
use serde::Serialize;
use std::path::{Path, PathBuf};

use super::{print_json, read_heuristics, read_memories, CliResult, Workspace};

#[derive(Subcommand)]
pub enum ForgetCommand {
    /// Freeze memories of an EXPIRED contract
    Freeze {
        contract_id: String,
        /// JSON array of memory references
        #[arg(long)]
        memories: PathBuf,
        #[arg(long)]
        actor: Option<String>,
    },

    /// Tombstone memories of a REVOKED contract and everything derived from them
    Tombstone {
        contract_id: String,
        #[arg(long)]
        memories: PathBuf,
        #[arg(long)]
        actor: Option<String>,
        /// JSON array of heuristic references to invalidate alongside
        #[arg(long)]
        heuristics: Option<PathBuf>,
    },

    /// Irreversibly purge memories, with the owner's signed confirmation
    Purge {
        contract_id: String,
        #[arg(long)]
        memories: PathBuf,
        #[arg(long)]
        owner: String,
        /// Token from `covenant token generate`
        #[arg(long)]
        token: String,
        /// When the owner confirmed (RFC 3339, default now)
        #[arg(long)]
        confirmed_at: Option<DateTime<Utc>>,
        #[arg(long)]
        heuristics: Option<PathBuf>,
    },

    /// Invalidate heuristics generalized from the given memories
    Heuristics {
        /// JSON array of heuristic references
        #[arg(long)]
        heuristics: PathBuf,
        #[arg(long = "memory", value_name = "MEMORY_ID", required = true)]
        memory_ids: Vec<String>,
        #[arg(long)]
        actor: Option<String>,
    },
}

#[derive(Serialize)]
struct ForgetReport {
    #[serde(flatten)]
    result: ForgettingResult,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    invalidated_heuristics: Vec<String>,
}

pub fn run(ws: &Workspace, command: ForgetCommand) -> CliResult {
    match command {
        ForgetCommand::Freeze {
            contract_id,
            memories,
            actor,
        } => {
            let contract = ws.lifecycle.get(&contract_id)?;
            let memories = read_memories(&memories)?;
            let actor = actor.as_deref().unwrap_or(ws.system_actor());
            let result = ws.forgetting.freeze_memories(&contract, &memories, actor)?;
            report(ws, result, None, actor)
        }
        ForgetCommand::Tombstone {
            contract_id,
            memories,
            actor,
            heuristics,
        } => {
            let contract = ws.lifecycle.get(&contract_id)?;
            let memories = read_memories(&memories)?;
            let actor = actor.as_deref().unwrap_or(ws.system_actor());
            let result = ws.forgetting.tombstone_memories(&contract, &memories, actor)?;
            report(ws, result, heuristics.as_deref(), actor)
        }
        ForgetCommand::Purge {
            contract_id,
            memories,
            owner,
            token,
            confirmed_at,
            heuristics,
        } => {
            let contract = ws.lifecycle.get(&contract_id)?;
            let memories = read_memories(&memories)?;
            let confirmation = OwnerConfirmation {
                owner,
                confirmation_token: token,
                timestamp: confirmed_at.unwrap_or_else(Utc::now),
            };
            let result = ws.forgetting.deep_purge(&contract, &memories, &confirmation)?;
            report(ws, result, heuristics.as_deref(), &confirmation.owner)
        }
        ForgetCommand::Heuristics {
            heuristics,
            memory_ids,
            actor,
        } => {
            let heuristics = read_heuristics(&heuristics)?;
            let actor = actor.as_deref().unwrap_or(ws.system_actor());
            let invalidated = ws.forgetting.invalidate_heuristics(&memory_ids, &heuristics, actor);
            print_json(&invalidated)
        }
    }
}

/// Print the result, first invalidating any heuristics built on the
/// affected memories.
fn report(
    ws: &Workspace,
    result: ForgettingResult,
    heuristics: Option<&Path>,
    actor: &str,
) -> CliResult {
    let invalidated_heuristics = match heuristics {
        Some(path) => {
            let heuristics = read_heuristics(path)?;
            let forgotten: Vec<String> = result
                .affected_memories
                .iter()
                .chain(&result.affected_derived)
                .cloned()
                .collect();
            ws.forgetting.invalidate_heuristics(&forgotten, &heuristics, actor)
        }
        None => Vec::new(),
    };
    print_json(&ForgetReport {
        result,
        invalidated_heuristics,
    })
}
