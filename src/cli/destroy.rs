//! Destroy command implementation.

use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use vmfactory::{FactoryConfig, StateStore, Tmpfs};

/// Unmount and remove a VM template.
#[derive(Args, Debug)]
pub struct DestroyCmd {
    /// Template directory (default: from config).
    #[arg(short, long)]
    pub path: Option<PathBuf>,

    /// Remove without confirmation.
    #[arg(short, long)]
    pub force: bool,
}

impl DestroyCmd {
    /// Execute the destroy command.
    pub fn run(&self, config: &FactoryConfig) -> vmfactory::Result<()> {
        let path = self.path.clone().unwrap_or_else(|| config.template_path.clone());

        if !path.exists() {
            println!("No VM template at {}", path.display());
            return Ok(());
        }

        if !self.force {
            eprint!("Destroy VM template at {}? [y/N] ", path.display());
            let mut input = String::new();
            if std::io::stdin().read_line(&mut input).is_err() {
                println!("Cancelled");
                return Ok(());
            }
            let input = input.trim().to_lowercase();
            if input != "y" && input != "yes" {
                println!("Cancelled");
                return Ok(());
            }
        }

        tracing::debug!(path = %path.display(), "destroying vm template");
        StateStore::new(&path, Arc::new(Tmpfs)).release();

        if path.exists() {
            eprintln!("Warning: {} could not be fully removed", path.display());
        } else {
            println!("Destroyed VM template at {}", path.display());
        }
        Ok(())
    }
}
