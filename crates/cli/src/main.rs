//! Covenant CLI — operate learning contracts over file-backed state.
//!
//! Commands:
//! - `contract` — Create contracts and drive them through the lifecycle
//! - `check`    — Run an enforcement check (and record the decision)
//! - `audit`    — Verify and inspect the hash-chained audit log
//! - `token`    — Issue purge confirmation tokens
//! - `forget`   — Freeze, tombstone or purge a contract's memories
//! - `config`   — Show or initialize configuration

use clap::{Parser, Subcommand};
use covenant_config::CovenantConfig;
use std::path::PathBuf;

mod commands;

use commands::Workspace;

#[derive(Parser)]
#[command(
    name = "covenant",
    about = "Covenant — learning contract enforcement for AI agents",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Override the data directory (contracts.jsonl, audit.jsonl)
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create contracts and drive them through the lifecycle
    Contract {
        #[command(subcommand)]
        action: commands::contract::ContractCommand,
    },

    /// Evaluate an enforcement check against a contract
    Check {
        #[command(subcommand)]
        check: commands::check::CheckCommand,
    },

    /// Verify and inspect the audit log
    Audit {
        #[command(subcommand)]
        action: commands::audit::AuditCommand,
    },

    /// Issue purge confirmation tokens
    Token {
        #[command(subcommand)]
        action: commands::token::TokenCommand,
    },

    /// Freeze, tombstone or purge memories of an ended contract
    Forget {
        #[command(subcommand)]
        action: commands::forget::ForgetCommand,
    },

    /// Show or initialize configuration
    Config {
        #[command(subcommand)]
        action: commands::config_cmd::ConfigCommand,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing. Logs go to stderr; stdout carries command output.
    let filter = if cli.verbose { "debug" } else { "info" };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let mut config = CovenantConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = Some(dir);
    }

    match cli.command {
        // These read the raw files and must work even when state is damaged
        Commands::Audit { action } => commands::audit::run(&config, action)?,
        Commands::Config { action } => commands::config_cmd::run(&config, action)?,

        Commands::Contract { action } => {
            let ws = Workspace::open(config)?;
            commands::contract::run(&ws, action)?;
            ws.finish()?;
        }
        Commands::Check { check } => {
            let ws = Workspace::open(config)?;
            commands::check::run(&ws, check)?;
            ws.finish()?;
        }
        Commands::Token { action } => {
            let ws = Workspace::open(config)?;
            commands::token::run(&ws, action)?;
            ws.finish()?;
        }
        Commands::Forget { action } => {
            let ws = Workspace::open(config)?;
            commands::forget::run(&ws, action)?;
            ws.finish()?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_contract_create() {
        let cli = Cli::try_parse_from([
            "covenant",
            "contract",
            "create",
            "--type",
            "episodic",
            "--creator",
            "alice",
            "--domain",
            "coding",
            "--domain",
            "review",
            "--cap",
            "2",
        ])
        .unwrap();
        match cli.command {
            Commands::Contract {
                action: commands::contract::ContractCommand::Create(args),
            } => {
                assert_eq!(args.contract_type, covenant_core::ContractType::Episodic);
                assert_eq!(args.domains, vec!["coding", "review"]);
                assert_eq!(args.cap, Some(2));
            }
            _ => panic!("expected contract create"),
        }
    }

    #[test]
    fn rejects_unknown_contract_type() {
        assert!(Cli::try_parse_from([
            "covenant", "contract", "create", "--type", "bogus", "--creator", "alice",
        ])
        .is_err());
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "covenant",
            "audit",
            "verify",
            "--verbose",
            "--log-json",
            "--data-dir",
            "/tmp/covenant",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert!(cli.log_json);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/covenant")));
    }

    #[test]
    fn expire_needs_id_or_due() {
        assert!(Cli::try_parse_from(["covenant", "contract", "expire"]).is_err());
        assert!(Cli::try_parse_from(["covenant", "contract", "expire", "--due"]).is_ok());
        assert!(Cli::try_parse_from(["covenant", "contract", "expire", "lc_1"]).is_ok());
    }
}
