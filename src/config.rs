//! Factory configuration.
//!
//! Loaded from a TOML file:
//!
//! ```toml
//! template = true
//! template_path = "/run/vmfactory/template"
//! agent_grace = "2s"
//! device_state_reserve_mib = 8
//!
//! [vm]
//! hypervisor = "qemu"
//!
//! [vm.resources]
//! memory_mib = 2048
//! cpus = 1
//! ```

use crate::error::{Error, Result};
use crate::storage::DEVICE_STATE_RESERVE_MIB;
use crate::template::{TemplateOptions, DEFAULT_AGENT_GRACE};
use crate::vm::config::VmConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application name for default paths.
const APP_NAME: &str = "vmfactory";

/// Factory configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FactoryConfig {
    /// Clone VMs from a template instead of cold-booting each one.
    pub template: bool,

    /// Template state store directory.
    pub template_path: PathBuf,

    /// Wait between closing the agent connection and pausing the template VM.
    #[serde(with = "crate::vm::config::humantime_serde")]
    pub agent_grace: Duration,

    /// Store headroom for the device state file, in MiB.
    pub device_state_reserve_mib: u64,

    /// Base VM configuration.
    pub vm: VmConfig,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            template: true,
            template_path: default_template_path(),
            agent_grace: DEFAULT_AGENT_GRACE,
            device_state_reserve_mib: DEVICE_STATE_RESERVE_MIB,
            vm: VmConfig::default(),
        }
    }
}

impl FactoryConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigLoad(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&contents)
            .map_err(|e| Error::ConfigLoad(format!("{}: {}", path.display(), e)))
    }

    /// Load from `path` if given, otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(contents: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Render configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::invalid_config(e.to_string()))
    }

    /// Template tuning derived from this configuration.
    pub fn template_options(&self) -> TemplateOptions {
        TemplateOptions {
            agent_grace: self.agent_grace,
            device_state_reserve_mib: self.device_state_reserve_mib,
        }
    }
}

/// Default template directory.
///
/// `$XDG_RUNTIME_DIR/vmfactory/template` when a runtime directory exists,
/// `/run/vmfactory/template` otherwise.
pub fn default_template_path() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(|| PathBuf::from("/run"))
        .join(APP_NAME)
        .join("template")
}
