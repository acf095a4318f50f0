//! `covenant token` — issue purge confirmation tokens.

use clap::Subcommand;

use super::{CliResult, Workspace};

#[derive(Subcommand)]
pub enum TokenCommand {
    /// Issue a fresh purge token for a contract's owner
    Generate {
        contract_id: String,
        #[arg(long)]
        owner: String,
    },
}

pub fn run(ws: &Workspace, command: TokenCommand) -> CliResult {
    match command {
        TokenCommand::Generate { contract_id, owner } => {
            let contract = ws.lifecycle.get(&contract_id)?;
            if contract.created_by != owner {
                return Err(format!(
                    "{owner} does not own {contract_id} (owner is {})",
                    contract.created_by
                )
                .into());
            }
            if ws.config.purge.secret.is_none() {
                eprintln!(
                    "warning: no purge secret configured (set COVENANT_PURGE_SECRET); \
                     this token cannot be verified by another invocation"
                );
            }
            println!("{}", ws.forgetting.generate_purge_token(&contract_id, &owner));
            Ok(())
        }
    }
}
