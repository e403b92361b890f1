//! Status command implementation.

use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use vmfactory::{FactoryConfig, StateStore, Tmpfs};

/// Report whether a VM template is established.
#[derive(Args, Debug)]
pub struct StatusCmd {
    /// Template directory (default: from config).
    #[arg(short, long)]
    pub path: Option<PathBuf>,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusCmd {
    /// Execute the status command.
    ///
    /// Fails when no template is established, so scripts can branch on the
    /// exit code.
    pub fn run(&self, config: &FactoryConfig) -> vmfactory::Result<()> {
        let path = self.path.clone().unwrap_or_else(|| config.template_path.clone());
        let state_file = config.vm.hypervisor.device_state_file();
        let store = StateStore::new(&path, Arc::new(Tmpfs));
        let result = store.check_established(state_file);

        if self.json {
            let status = serde_json::json!({
                "path": path,
                "established": result.is_ok(),
                "hypervisor": config.vm.hypervisor.name(),
                "memory_file": store.memory_path(),
                "state_file": path.join(state_file),
                "memory_mib": config.vm.resources.memory_mib,
            });
            let rendered = serde_json::to_string_pretty(&status)
                .map_err(|e| vmfactory::Error::invalid_config(e.to_string()))?;
            println!("{}", rendered);
            return result;
        }

        result?;
        println!("VM template established at {}", path.display());
        println!("  Hypervisor: {}", config.vm.hypervisor);
        println!("  Memory: {} MiB", config.vm.resources.memory_mib);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(path: &std::path::Path, json: bool) -> StatusCmd {
        StatusCmd {
            path: Some(path.to_path_buf()),
            json,
        }
    }

    #[test]
    fn test_status_fails_without_template_in_both_formats() {
        let temp = tempfile::tempdir().unwrap();
        let config = FactoryConfig::default();

        for json in [false, true] {
            let err = status(temp.path(), json).run(&config).unwrap_err();
            assert!(matches!(err, vmfactory::Error::NotFound { .. }), "json={json}: {err}");
        }
    }

    #[test]
    fn test_status_succeeds_on_established_template() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("memory"), b"").unwrap();
        std::fs::write(temp.path().join("state"), b"").unwrap();
        let config = FactoryConfig::default();

        status(temp.path(), false).run(&config).unwrap();
        status(temp.path(), true).run(&config).unwrap();
    }
}
