//! `covenant config` — configuration management commands.

use clap::Subcommand;
use covenant_config::CovenantConfig;

use super::CliResult;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration (secrets redacted)
    Show,

    /// Print the config file path and data paths
    Path,

    /// Write a default config file if none exists
    Init,
}

pub fn run(config: &CovenantConfig, command: ConfigCommand) -> CliResult {
    match command {
        ConfigCommand::Show => {
            println!("{}", render(config)?);
            Ok(())
        }
        ConfigCommand::Path => {
            println!("config:    {}", CovenantConfig::config_dir().join("config.toml").display());
            println!("contracts: {}", config.contracts_path().display());
            println!("audit:     {}", config.audit_path().display());
            Ok(())
        }
        ConfigCommand::Init => {
            let path = CovenantConfig::config_dir().join("config.toml");
            if path.exists() {
                println!("Config already exists at {}", path.display());
                return Ok(());
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, CovenantConfig::default_toml())?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}

fn render(config: &CovenantConfig) -> CliResult<String> {
    let mut shown = config.clone();
    if shown.purge.secret.is_some() {
        shown.purge.secret = Some("[REDACTED]".into());
    }
    Ok(toml::to_string_pretty(&shown)?)
}
