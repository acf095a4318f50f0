//! `covenant contract` — create contracts and drive them through the lifecycle.

use chrono::{Duration, Utc};
use clap::{Args, Subcommand};
use covenant_contracts::{ContractChanges, ContractOptions, ScopeSpec};
use covenant_core::{
    AbstractionLevel, BoundaryMode, ContractFilter, ContractState, ContractType, LearningContract,
    RetentionPolicy,
};

use super::{print_json, CliResult, Workspace};

#[derive(Subcommand)]
pub enum ContractCommand {
    /// Create a new DRAFT contract
    Create(CreateArgs),

    /// Submit a DRAFT for review (creator only)
    Submit {
        contract_id: String,
        #[arg(long)]
        actor: String,
    },

    /// Activate a contract under review
    Activate {
        contract_id: String,
        #[arg(long)]
        actor: String,
    },

    /// Revoke a contract
    Revoke {
        contract_id: String,
        #[arg(long)]
        actor: String,
    },

    /// Expire a contract whose retention window has closed
    Expire {
        #[arg(required_unless_present = "due")]
        contract_id: Option<String>,
        /// Expire every contract that is due instead of a single one
        #[arg(long, conflicts_with = "contract_id")]
        due: bool,
        #[arg(long)]
        actor: Option<String>,
    },

    /// Amend an ACTIVE contract, producing a linked DRAFT
    Amend(AmendArgs),

    /// List contracts
    List(ListArgs),

    /// Show one contract as JSON
    Show { contract_id: String },
}

#[derive(Args)]
pub struct CreateArgs {
    /// observation, episodic, procedural, strategic or prohibited
    #[arg(long = "type", value_name = "TYPE")]
    pub contract_type: ContractType,
    #[arg(long)]
    pub creator: String,
    #[arg(long = "domain", value_name = "DOMAIN")]
    pub domains: Vec<String>,
    #[arg(long = "context", value_name = "CONTEXT")]
    pub contexts: Vec<String>,
    #[arg(long = "tool", value_name = "TOOL")]
    pub tools: Vec<String>,
    /// Classification cap (0-5)
    #[arg(long)]
    pub cap: Option<u8>,
    #[arg(long)]
    pub retention: Option<RetentionPolicy>,
    /// Retention window in days from now (TIMEBOUND)
    #[arg(long)]
    pub retention_days: Option<u32>,
    #[arg(long)]
    pub max_abstraction: Option<AbstractionLevel>,
    #[arg(long)]
    pub transferable: bool,
    #[arg(long)]
    pub non_revocable: bool,
    #[arg(long)]
    pub requires_owner: Option<bool>,
    #[arg(long)]
    pub boundary_min: Option<BoundaryMode>,
}

#[derive(Args)]
pub struct AmendArgs {
    pub contract_id: String,
    #[arg(long)]
    pub actor: String,
    /// Replace the domain list
    #[arg(long = "domain", value_name = "DOMAIN")]
    pub domains: Vec<String>,
    /// Replace the context list
    #[arg(long = "context", value_name = "CONTEXT")]
    pub contexts: Vec<String>,
    /// Replace the tool list
    #[arg(long = "tool", value_name = "TOOL")]
    pub tools: Vec<String>,
    #[arg(long)]
    pub max_abstraction: Option<AbstractionLevel>,
    #[arg(long)]
    pub transferable: Option<bool>,
    #[arg(long)]
    pub cap: Option<u8>,
    #[arg(long)]
    pub allow_generalization: Option<bool>,
    #[arg(long)]
    pub requires_owner: Option<bool>,
    #[arg(long)]
    pub boundary_min: Option<BoundaryMode>,
    #[arg(long)]
    pub revocable: Option<bool>,
}

#[derive(Args)]
pub struct ListArgs {
    #[arg(long)]
    pub state: Option<ContractState>,
    #[arg(long = "type", value_name = "TYPE")]
    pub contract_type: Option<ContractType>,
    #[arg(long)]
    pub creator: Option<String>,
    #[arg(long)]
    pub domain: Option<String>,
}

pub fn run(ws: &Workspace, command: ContractCommand) -> CliResult {
    match command {
        ContractCommand::Create(args) => create(ws, args),
        ContractCommand::Submit { contract_id, actor } => {
            report(&ws.lifecycle.submit_for_review(&contract_id, &actor)?);
            Ok(())
        }
        ContractCommand::Activate { contract_id, actor } => {
            report(&ws.lifecycle.activate(&contract_id, &actor)?);
            Ok(())
        }
        ContractCommand::Revoke { contract_id, actor } => {
            report(&ws.lifecycle.revoke(&contract_id, &actor)?);
            Ok(())
        }
        ContractCommand::Expire {
            contract_id,
            due,
            actor,
        } => {
            let actor = actor.as_deref().unwrap_or(ws.system_actor());
            if due {
                let expired = ws.lifecycle.expire_due(actor)?;
                println!("Expired {} contract(s)", expired.len());
                for id in expired {
                    println!("  {id}");
                }
            } else if let Some(id) = contract_id {
                report(&ws.lifecycle.expire(&id, actor)?);
            }
            Ok(())
        }
        ContractCommand::Amend(args) => amend(ws, args),
        ContractCommand::List(args) => list(ws, args),
        ContractCommand::Show { contract_id } => print_json(&ws.lifecycle.get(&contract_id)?),
    }
}

fn create(ws: &Workspace, args: CreateArgs) -> CliResult {
    let scope = ScopeSpec::new()
        .domains(args.domains)
        .contexts(args.contexts)
        .tools(args.tools);
    let options = ContractOptions {
        classification_cap: args.cap,
        retention: args.retention,
        retention_until: args
            .retention_days
            .map(|days| Utc::now() + Duration::days(i64::from(days))),
        max_abstraction: args.max_abstraction,
        transferable: args.transferable.then_some(true),
        requires_owner: args.requires_owner,
        boundary_mode_min: args.boundary_min,
        revocable: args.non_revocable.then_some(false),
        ..ContractOptions::default()
    };

    let draft = ws
        .factory
        .build(args.contract_type, &args.creator, scope, options)?;
    let contract = ws.lifecycle.create(draft, &args.creator)?;
    println!("{}", contract.contract_id);
    Ok(())
}

fn amend(ws: &Workspace, args: AmendArgs) -> CliResult {
    let current = ws.lifecycle.get(&args.contract_id)?;
    let changes = changes_from(&current, &args);
    let outcome = ws.lifecycle.amend(&args.contract_id, changes, &args.actor)?;
    report(&outcome.original);
    println!("New draft: {}", outcome.draft.contract_id);
    Ok(())
}

/// Only the sections touched by a flag are replaced; the rest carry forward.
fn changes_from(current: &LearningContract, args: &AmendArgs) -> ContractChanges {
    let mut changes = ContractChanges::default();

    if !args.domains.is_empty()
        || !args.contexts.is_empty()
        || !args.tools.is_empty()
        || args.max_abstraction.is_some()
        || args.transferable.is_some()
    {
        let mut scope = current.scope.clone();
        if !args.domains.is_empty() {
            scope.domains = args.domains.iter().cloned().collect();
        }
        if !args.contexts.is_empty() {
            scope.contexts = args.contexts.iter().cloned().collect();
        }
        if !args.tools.is_empty() {
            scope.tools = args.tools.iter().cloned().collect();
        }
        if let Some(level) = args.max_abstraction {
            scope.max_abstraction = level;
        }
        if let Some(transferable) = args.transferable {
            scope.transferable = transferable;
        }
        changes.scope = Some(scope);
    }

    if let Some(cap) = args.cap {
        let mut perms = current.memory_permissions.clone();
        perms.classification_cap = cap;
        changes.memory_permissions = Some(perms);
    }

    if let Some(allowed) = args.allow_generalization {
        let mut rules = current.generalization_rules.clone();
        rules.allowed = allowed;
        changes.generalization_rules = Some(rules);
    }

    if args.requires_owner.is_some() || args.boundary_min.is_some() {
        let mut recall = current.recall_rules.clone();
        if let Some(requires_owner) = args.requires_owner {
            recall.requires_owner = requires_owner;
        }
        if let Some(mode) = args.boundary_min {
            recall.boundary_mode_min = mode;
        }
        changes.recall_rules = Some(recall);
    }

    changes.revocable = args.revocable;
    changes
}

fn list(ws: &Workspace, args: ListArgs) -> CliResult {
    let mut filter = ContractFilter::new();
    filter.state = args.state;
    filter.contract_type = args.contract_type;
    filter.created_by = args.creator;
    filter.domain = args.domain;

    let contracts = ws.lifecycle.list(&filter)?;
    if contracts.is_empty() {
        println!("No contracts found.");
        return Ok(());
    }

    println!("Contracts ({}):\n", contracts.len());
    for c in &contracts {
        println!(
            "  {}  {:<11} {:<8} by {} at {}",
            c.contract_id,
            c.contract_type.to_string(),
            c.state.to_string(),
            c.created_by,
            c.created_at.format("%Y-%m-%d %H:%M:%S")
        );
        if !c.scope.domains.is_empty() {
            let domains: Vec<&str> = c.scope.domains.iter().map(String::as_str).collect();
            println!("     domains: {}", domains.join(", "));
        }
    }
    Ok(())
}

fn report(contract: &LearningContract) {
    println!("{} is now {}", contract.contract_id, contract.state);
}
