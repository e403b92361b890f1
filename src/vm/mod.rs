//! VM abstraction consumed by the factories.
//!
//! Hypervisor internals live behind two traits:
//! - [`VmBackend`]: boots a VM from a [`VmConfig`]
//! - [`VmHandle`]: controls one booted VM
//!
//! A backend's `boot` returns once the guest agent has completed its
//! handshake. When `boot_from_template` is set, the backend maps the
//! template's memory and device state files instead of cold booting, and is
//! responsible for making concurrent mappings of the same files safe
//! (copy-on-write or read-only).

pub mod config;
pub mod state;

use crate::error::Result;
pub use config::{HypervisorKind, Resources, VmConfig, VmConfigBuilder, VmId};
pub use state::VmState;

/// Handle to a booted VM.
///
/// This trait provides the interface for controlling a VM's lifecycle.
/// Implementations handle the platform-specific details of VM management.
pub trait VmHandle: Send {
    /// Get the VM ID.
    fn id(&self) -> &VmId;

    /// Configuration the VM was booted with.
    fn config(&self) -> &VmConfig;

    /// Get current state.
    fn state(&self) -> VmState;

    /// Close the control channel to the guest agent.
    fn disconnect(&mut self) -> Result<()>;

    /// Pause all vCPUs.
    fn pause(&mut self) -> Result<()>;

    /// Save guest memory and device state to the configured paths.
    fn save(&mut self) -> Result<()>;

    /// Stop the VM and its hypervisor process.
    fn stop(&mut self) -> Result<()>;
}

/// Boots VMs.
///
/// This trait abstracts over different hypervisor backends.
pub trait VmBackend: Send + Sync {
    /// Backend name (e.g., "qemu", "cloud-hypervisor").
    fn name(&self) -> &'static str;

    /// Boot a VM and wait for its agent to become ready.
    fn boot(&self, config: VmConfig) -> Result<Box<dyn VmHandle>>;
}
