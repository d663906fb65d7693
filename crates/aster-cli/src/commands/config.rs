//! Configuration commands: print the default file and check a file.

use std::path::PathBuf;

use anyhow::Context;
use aster_config::PipelineConfig;
use clap::{Args, Subcommand};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the default pipeline configuration as TOML
    Default,

    /// Load and validate a pipeline configuration file
    Check {
        /// Configuration file (TOML)
        file: PathBuf,
    },
}

pub fn run(args: ConfigArgs) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Default => {
            print!("{}", PipelineConfig::default().to_toml_string()?);
        }
        ConfigCommand::Check { file } => {
            let config = PipelineConfig::load(&file)?;
            config
                .validate()
                .with_context(|| format!("{} is not a runnable pipeline", file.display()))?;
            println!(
                "{}: ok ({} passes, {} elements in {} frame(s), {} task override(s))",
                file.display(),
                config.passes,
                config.elements,
                config.frames,
                config.tasks.len()
            );
        }
    }
    Ok(())
}
