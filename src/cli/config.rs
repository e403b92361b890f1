//! Config command implementation.

use clap::Args;
use vmfactory::FactoryConfig;

/// Print the effective configuration.
#[derive(Args, Debug)]
pub struct ConfigCmd {
    /// Output as JSON instead of TOML.
    #[arg(long)]
    pub json: bool,
}

impl ConfigCmd {
    /// Execute the config command.
    pub fn run(&self, config: &FactoryConfig) -> vmfactory::Result<()> {
        if self.json {
            let rendered = serde_json::to_string_pretty(config)
                .map_err(|e| vmfactory::Error::invalid_config(e.to_string()))?;
            println!("{}", rendered);
        } else {
            print!("{}", config.to_toml()?);
        }
        Ok(())
    }
}
