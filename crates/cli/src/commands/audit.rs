//! `covenant audit` — verify and inspect the audit log.
//!
//! Works on the persisted file directly, so a damaged chain can still be
//! diagnosed.

use clap::Subcommand;
use covenant_config::CovenantConfig;
use covenant_security::{read_jsonl, verify_entries, AuditEntry};

use super::CliResult;

#[derive(Subcommand)]
pub enum AuditCommand {
    /// Recompute the hash chain from genesis
    Verify,

    /// Entries for one contract
    History {
        contract_id: String,
        /// Print entries as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Denied and violation entries
    Violations {
        #[arg(long)]
        json: bool,
    },
}

pub fn run(config: &CovenantConfig, command: AuditCommand) -> CliResult {
    let path = config.audit_path();
    let entries = read_jsonl(&path)?;

    match command {
        AuditCommand::Verify => match verify_entries(&entries) {
            Ok(count) => {
                let head = entries.last().map(|e| e.hash.as_str()).unwrap_or("(empty)");
                println!("Audit chain intact: {count} entries");
                println!("  head: {head}");
                Ok(())
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Audit chain verification failed");
                Err(e.into())
            }
        },
        AuditCommand::History { contract_id, json } => {
            let history: Vec<&AuditEntry> = entries
                .iter()
                .filter(|e| e.contract_id.as_deref() == Some(contract_id.as_str()))
                .collect();
            print_entries(&history, json)
        }
        AuditCommand::Violations { json } => {
            let violations: Vec<&AuditEntry> = entries.iter().filter(|e| e.is_violation()).collect();
            print_entries(&violations, json)
        }
    }
}

fn print_entries(entries: &[&AuditEntry], json: bool) -> CliResult {
    if json {
        for entry in entries {
            println!("{}", serde_json::to_string(entry)?);
        }
        return Ok(());
    }
    if entries.is_empty() {
        println!("No matching entries.");
        return Ok(());
    }
    for entry in entries {
        println!("{}", summarize(entry));
    }
    Ok(())
}

fn summarize(entry: &AuditEntry) -> String {
    let mut line = format!(
        "#{:<4} {}  {:<22} {:<8} by {}",
        entry.sequence,
        entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
        entry.event_type.to_string(),
        format!("{:?}", entry.outcome).to_lowercase(),
        entry.actor
    );
    if let (Some(from), Some(to)) = (entry.old_state, entry.new_state) {
        line.push_str(&format!("  {from} -> {to}"));
    }
    if let Some(reason) = entry.details.get("reason").and_then(|r| r.as_str()) {
        line.push_str(&format!("  ({reason})"));
    }
    line
}
