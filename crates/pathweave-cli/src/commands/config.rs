//! Config command - Show the effective configuration

use anyhow::{Context, Result};
use clap::Subcommand;
use pathweave_config::{ConfigLoader, PathweaveConfig};

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the merged configuration
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the configuration file locations
    Path,
}

/// Execute a config subcommand
pub fn execute(cmd: ConfigCommand, config: PathweaveConfig) -> Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let rendered = if json {
                serde_json::to_string_pretty(&config)?
            } else {
                toml::to_string_pretty(&config).context("Failed to render configuration")?
            };
            println!("{}", rendered);
        }
        ConfigCommand::Path => {
            let loader = ConfigLoader::new();
            match loader.global_config_path() {
                Some(path) => println!("global: {}", path.display()),
                None => println!("global: (no home directory)"),
            }
            let cwd = std::env::current_dir().context("Failed to get current directory")?;
            println!("local:  {}", loader.local_config_path(&cwd).display());
        }
    }
    Ok(())
}
