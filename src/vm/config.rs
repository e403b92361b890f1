//! VM configuration types.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

/// Unique identifier for a VM instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VmId(pub String);

impl VmId {
    /// Create a new VmId from a string.
    ///
    /// The ID is sanitized to only allow alphanumeric characters, dashes, and underscores.
    /// IDs are limited to 64 characters. If the input is empty or contains only invalid
    /// characters, a generated ID is used instead.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        // Sanitize: only allow alphanumeric, dash, underscore
        let sanitized: String = id
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
            .take(64)
            .collect();
        if sanitized.is_empty() {
            Self::generate()
        } else {
            Self(sanitized)
        }
    }

    /// Generate a unique VmId based on timestamp and a process-local sequence.
    pub fn generate() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        static SEQ: AtomicU32 = AtomicU32::new(0);

        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let seq = SEQ.fetch_add(1, Ordering::Relaxed);
        Self(format!("vm-{:x}-{:x}", ts, seq))
    }

    /// Get the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for VmId {
    fn default() -> Self {
        Self::generate()
    }
}

impl std::fmt::Display for VmId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for VmId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Hypervisor driving the VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HypervisorKind {
    /// QEMU.
    #[default]
    Qemu,
    /// Cloud Hypervisor.
    CloudHypervisor,
    /// Firecracker.
    Firecracker,
}

impl HypervisorKind {
    /// Name of the device state file this hypervisor saves into a template.
    pub fn device_state_file(&self) -> &'static str {
        match self {
            HypervisorKind::CloudHypervisor => "state.json",
            _ => "state",
        }
    }

    /// Whether guest communication goes through a host-local UNIX socket
    /// ("hybrid vsock") instead of the host kernel's vsock transport.
    ///
    /// The socket lives under the VM store path, so a template VM of such
    /// a hypervisor must keep its store path inside the template directory.
    pub fn uses_hybrid_vsock(&self) -> bool {
        matches!(self, HypervisorKind::CloudHypervisor)
    }

    /// Get the hypervisor name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            HypervisorKind::Qemu => "qemu",
            HypervisorKind::CloudHypervisor => "cloud-hypervisor",
            HypervisorKind::Firecracker => "firecracker",
        }
    }
}

impl std::fmt::Display for HypervisorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// VM resource limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Resources {
    /// Memory in MiB (default: 2048).
    pub memory_mib: u32,

    /// Number of vCPUs (default: 1).
    pub cpus: u8,
}

impl Default for Resources {
    fn default() -> Self {
        Self {
            memory_mib: 2048,
            cpus: 1,
        }
    }
}

/// Serde adapter storing durations as humantime strings ("2s", "1m 30s").
pub(crate) mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

/// Complete VM configuration.
///
/// The template fields (`boot_to_be_template`, `boot_from_template`,
/// `memory_path`, `devices_state_path`) are normally left unset by callers
/// and filled in by the template factory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Unique VM identifier.
    pub id: VmId,

    /// Hypervisor kind.
    pub hypervisor: HypervisorKind,

    /// Boot this VM so it can be saved as a template.
    pub boot_to_be_template: bool,

    /// Boot this VM from a saved template instead of a cold boot.
    pub boot_from_template: bool,

    /// Guest memory backing file.
    pub memory_path: Option<PathBuf>,

    /// Device state file.
    pub devices_state_path: Option<PathBuf>,

    /// Host directory shared into the guest.
    pub shared_path: Option<PathBuf>,

    /// Per-VM persistent store directory.
    pub vm_store_path: Option<PathBuf>,

    /// Per-VM runtime directory.
    pub run_store_path: Option<PathBuf>,

    /// Resource limits.
    pub resources: Resources,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            id: VmId::generate(),
            hypervisor: HypervisorKind::default(),
            resources: Resources::default(),
            boot_to_be_template: false,
            boot_from_template: false,
            memory_path: None,
            devices_state_path: None,
            shared_path: None,
            vm_store_path: None,
            run_store_path: None,
        }
    }
}

impl VmConfig {
    /// Create a builder for VmConfig.
    pub fn builder(hypervisor: HypervisorKind) -> VmConfigBuilder {
        VmConfigBuilder::new(hypervisor)
    }

    /// Check that the configuration can be used to boot a VM.
    pub fn validate(&self) -> Result<()> {
        if self.resources.memory_mib == 0 {
            return Err(Error::invalid_config("memory size must be non-zero"));
        }
        if self.resources.cpus == 0 {
            return Err(Error::invalid_config("vcpu count must be non-zero"));
        }
        if self.boot_to_be_template && self.boot_from_template {
            return Err(Error::invalid_config(
                "a vm cannot both boot from a template and become one",
            ));
        }

        let paths = [
            ("shared_path", &self.shared_path),
            ("vm_store_path", &self.vm_store_path),
            ("run_store_path", &self.run_store_path),
        ];
        for (name, path) in paths {
            if let Some(path) = path {
                if !path.is_absolute() {
                    return Err(Error::invalid_config(format!(
                        "{} must be absolute: {}",
                        name,
                        path.display()
                    )));
                }
            }
        }

        Ok(())
    }

    /// Device state file path inside a template directory.
    pub fn devices_state_path_in(&self, dir: &Path) -> PathBuf {
        dir.join(self.hypervisor.device_state_file())
    }
}

/// Builder for VmConfig.
#[derive(Debug)]
pub struct VmConfigBuilder {
    config: VmConfig,
}

impl VmConfigBuilder {
    /// Create a new builder for the given hypervisor.
    pub fn new(hypervisor: HypervisorKind) -> Self {
        Self {
            config: VmConfig {
                hypervisor,
                ..Default::default()
            },
        }
    }

    /// Set the VM ID.
    pub fn id(mut self, id: VmId) -> Self {
        self.config.id = id;
        self
    }

    /// Set the memory in MiB.
    pub fn memory(mut self, mib: u32) -> Self {
        self.config.resources.memory_mib = mib;
        self
    }

    /// Set the number of CPUs.
    pub fn cpus(mut self, cpus: u8) -> Self {
        self.config.resources.cpus = cpus;
        self
    }

    /// Set the shared directory.
    pub fn shared_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.shared_path = Some(path.into());
        self
    }

    /// Set the VM store directory.
    pub fn vm_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.vm_store_path = Some(path.into());
        self
    }

    /// Set the run store directory.
    pub fn run_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.run_store_path = Some(path.into());
        self
    }

    /// Build the VmConfig.
    pub fn build(self) -> VmConfig {
        self.config
    }
}
