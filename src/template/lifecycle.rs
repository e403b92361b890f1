//! Template VM lifecycle.
//!
//! Template creation walks one VM through a fixed sequence:
//!
//! ```text
//! Booting -> AgentReady -> Disconnected -> Paused -> Saved
//! ```
//!
//! The order is load-bearing. Pausing before the agent is ready saves a guest
//! that never finished booting, and pausing right after the disconnect can
//! freeze the agent halfway through reopening its listener.

use crate::error::{Error, Result};
use crate::vm::{VmBackend, VmConfig, VmHandle};
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::time::Duration;

/// Default wait between closing the agent channel and pausing the VM.
pub const DEFAULT_AGENT_GRACE: Duration = Duration::from_secs(2);

/// Stage reached by a template VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateStage {
    /// Hypervisor is booting the guest.
    Booting,
    /// Guest agent completed its handshake.
    AgentReady,
    /// Host closed its agent connection.
    Disconnected,
    /// vCPUs paused.
    Paused,
    /// Memory and device state written to the store.
    Saved,
}

impl TemplateStage {
    /// Get the stage name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            TemplateStage::Booting => "booting",
            TemplateStage::AgentReady => "agent-ready",
            TemplateStage::Disconnected => "disconnected",
            TemplateStage::Paused => "paused",
            TemplateStage::Saved => "saved",
        }
    }
}

impl std::fmt::Display for TemplateStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Stops the wrapped VM when dropped.
struct StopOnDrop(Box<dyn VmHandle>);

impl Deref for StopOnDrop {
    type Target = dyn VmHandle;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl DerefMut for StopOnDrop {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.0
    }
}

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        tracing::debug!(vm = %self.0.id(), "stopping template vm");
        if let Err(e) = self.0.stop() {
            tracing::warn!(vm = %self.0.id(), error = %e, "failed to stop template vm");
        }
    }
}

/// Boot configuration for the VM that becomes the template.
pub fn template_boot_config(base: &VmConfig, store: &Path) -> VmConfig {
    let mut config = base.clone();
    config.boot_to_be_template = true;
    config.boot_from_template = false;
    config.memory_path = Some(store.join(crate::storage::MEMORY_FILE));
    config.devices_state_path = Some(base.devices_state_path_in(store));

    // The hybrid vsock socket is created under the VM store path.
    if base.hypervisor.uses_hybrid_vsock() {
        config.vm_store_path = Some(store.to_path_buf());
    }

    config
}

/// Boot configuration for a clone of the template.
///
/// Frozen state comes from the template directory; runtime directories come
/// from the request, so the clone lives in the caller's namespace.
pub fn clone_boot_config(template: &VmConfig, store: &Path, request: &VmConfig) -> VmConfig {
    let mut config = template.clone();
    config.id = request.id.clone();
    config.boot_to_be_template = false;
    config.boot_from_template = true;
    config.memory_path = Some(store.join(crate::storage::MEMORY_FILE));
    config.devices_state_path = Some(template.devices_state_path_in(store));
    config.shared_path = request.shared_path.clone();
    config.vm_store_path = request.vm_store_path.clone();
    config.run_store_path = request.run_store_path.clone();
    config
}

/// Boot a VM, bring it to agent-ready, then pause and save it into `store`.
///
/// The VM is stopped on every path once it has booted. Releasing the store
/// after a failure is left to the caller.
pub fn create_template(
    backend: &dyn VmBackend,
    base: &VmConfig,
    store: &Path,
    agent_grace: Duration,
) -> Result<()> {
    let config = template_boot_config(base, store);
    let id = config.id.clone();

    tracing::debug!(vm = %id, backend = backend.name(), stage = %TemplateStage::Booting, "booting template vm");
    let vm = backend
        .boot(config)
        .map_err(|e| Error::boot(format!("template vm {}: {}", id, e)))?;
    let mut vm = StopOnDrop(vm);
    tracing::debug!(vm = %id, stage = %TemplateStage::AgentReady, "template vm agent ready");

    vm.disconnect()
        .map_err(|e| Error::Disconnect(format!("template vm {}: {}", id, e)))?;
    tracing::debug!(vm = %id, stage = %TemplateStage::Disconnected, "closed agent connection");

    // The agent drops and reopens its listener after the host disconnects.
    // A clone resumes exactly here, so wait for the listener to come back.
    std::thread::sleep(agent_grace);

    vm.pause()
        .map_err(|e| Error::Pause(format!("template vm {}: {}", id, e)))?;
    tracing::debug!(vm = %id, stage = %TemplateStage::Paused, "template vm paused");

    vm.save()
        .map_err(|e| Error::Save(format!("template vm {}: {}", id, e)))?;
    tracing::info!(vm = %id, stage = %TemplateStage::Saved, store = %store.display(), "template vm saved");

    Ok(())
}

/// Boot a new VM from the template saved in `store`.
pub fn clone_from_template(
    backend: &dyn VmBackend,
    template: &VmConfig,
    store: &Path,
    request: &VmConfig,
) -> Result<Box<dyn VmHandle>> {
    let config = clone_boot_config(template, store, request);
    let id = config.id.clone();

    let vm = backend.boot(config).map_err(|e| {
        Error::clone_failed(format!("vm {} from {}: {}", id, store.display(), e))
    })?;
    tracing::debug!(vm = %id, store = %store.display(), "booted vm from template");

    Ok(vm)
}
