//! `covenant check` — evaluate an enforcement check and record the decision.

use clap::{Args, Subcommand};
use covenant_contracts::{EnforcementCheck, EnforcementContext, EnforcementResult};
use covenant_core::{AbstractionLevel, BoundaryMode};
use std::path::PathBuf;

use super::{read_memories, CliResult, Workspace};

#[derive(Args)]
pub struct ContextArgs {
    pub contract_id: String,
    /// Current boundary mode
    #[arg(long, default_value = "NORMAL")]
    pub mode: BoundaryMode,
    #[arg(long)]
    pub domain: Option<String>,
    #[arg(long)]
    pub context: Option<String>,
    #[arg(long)]
    pub tool: Option<String>,
    /// The owner's presence has been verified
    #[arg(long)]
    pub owner_present: bool,
    /// Owner approval was requested and is still pending
    #[arg(long)]
    pub approval_pending: bool,
    #[arg(long, default_value = "agent")]
    pub actor: String,
    /// Do not record the decision in the audit log
    #[arg(long)]
    pub no_record: bool,
}

#[derive(Subcommand)]
pub enum CheckCommand {
    /// May a memory of this classification be stored?
    Memory {
        #[command(flatten)]
        ctx: ContextArgs,
        #[arg(long)]
        classification: u8,
    },

    /// May learned material be generalized to this level?
    Abstraction {
        #[command(flatten)]
        ctx: ContextArgs,
        /// RAW, PATTERN, HEURISTIC, STRATEGY (or 0-3)
        #[arg(long)]
        level: AbstractionLevel,
    },

    /// May memories be recalled?
    Recall {
        #[command(flatten)]
        ctx: ContextArgs,
    },

    /// May memories be exported?
    Export {
        #[command(flatten)]
        ctx: ContextArgs,
    },

    /// Which of the contract's memories are readable right now
    Access {
        contract_id: String,
        /// JSON array of memory references
        #[arg(long)]
        memories: PathBuf,
    },
}

pub fn run(ws: &Workspace, command: CheckCommand) -> CliResult {
    let (args, check) = match command {
        CheckCommand::Memory { ctx, classification } => {
            (ctx, EnforcementCheck::MemoryCreation { classification })
        }
        CheckCommand::Abstraction { ctx, level } => (ctx, EnforcementCheck::Abstraction { target: level }),
        CheckCommand::Recall { ctx } => (ctx, EnforcementCheck::Recall),
        CheckCommand::Export { ctx } => (ctx, EnforcementCheck::Export),
        CheckCommand::Access {
            contract_id,
            memories,
        } => return access(ws, &contract_id, memories),
    };

    let result = evaluate(ws, &args, check)?;
    if result.allowed {
        println!("ALLOWED ({})", check.as_str());
    } else {
        println!(
            "DENIED ({}): {}",
            check.as_str(),
            result.reason.as_deref().unwrap_or("no reason given")
        );
    }
    for warning in &result.warnings {
        println!("  warning: {warning}");
    }
    Ok(())
}

/// Run `check` and, unless disabled, append the decision to the audit log.
fn evaluate(ws: &Workspace, args: &ContextArgs, check: EnforcementCheck) -> CliResult<EnforcementResult> {
    let contract = ws.lifecycle.get(&args.contract_id)?;
    let mut ctx = EnforcementContext::new(&contract, args.mode)
        .owner_present(args.owner_present)
        .owner_approval_pending(args.approval_pending);
    if let Some(domain) = &args.domain {
        ctx = ctx.domain(domain);
    }
    if let Some(context) = &args.context {
        ctx = ctx.context(context);
    }
    if let Some(tool) = &args.tool {
        ctx = ctx.tool(tool);
    }

    let result = match check {
        EnforcementCheck::MemoryCreation { classification } => {
            ws.engine.check_memory_creation(&ctx, classification)
        }
        EnforcementCheck::Abstraction { target } => ws.engine.check_abstraction(&ctx, target),
        EnforcementCheck::Recall => ws.engine.check_recall(&ctx),
        EnforcementCheck::Export => ws.engine.check_export(&ctx),
    };

    if !args.no_record {
        ws.audit.append(result.audit_event(&ctx, check, &args.actor));
    }
    Ok(result)
}

fn access(ws: &Workspace, contract_id: &str, memories: PathBuf) -> CliResult {
    let contract = ws.lifecycle.get(contract_id)?;
    let memories = read_memories(&memories)?;
    for memory in memories.iter().filter(|m| m.contract_id == contract.contract_id) {
        let access = ws.forgetting.is_memory_accessible(memory, &contract);
        match access.reason {
            None => println!("  {}  readable", memory.memory_id),
            Some(reason) => println!("  {}  blocked: {reason}", memory.memory_id),
        }
    }
    Ok(())
}
