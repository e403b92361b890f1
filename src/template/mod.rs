//! VM template factory.
//!
//! A template factory boots one VM, waits for its agent, pauses it and saves
//! its memory and device state into a tmpfs [`StateStore`]. Every
//! [`get_base_vm`](FactoryBase::get_base_vm) then boots a clone that maps
//! those files instead of running the guest boot again.
//!
//! The factory keeps no record of its clones. The saved files are never
//! written after creation, so clones may be spawned from many threads at once.

pub mod lifecycle;

use crate::error::{Error, Result};
use crate::factory::{FactoryBase, FactoryContext};
use crate::storage::{store_size_mib, StateStore, DEVICE_STATE_RESERVE_MIB};
use crate::vm::{VmBackend, VmConfig, VmHandle};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub use lifecycle::{TemplateStage, DEFAULT_AGENT_GRACE};

/// Template creation tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateOptions {
    /// Wait between closing the agent connection and pausing the template VM.
    #[serde(with = "crate::vm::config::humantime_serde")]
    pub agent_grace: Duration,

    /// Store headroom for the device state file, in MiB.
    pub device_state_reserve_mib: u64,
}

impl Default for TemplateOptions {
    fn default() -> Self {
        Self {
            agent_grace: DEFAULT_AGENT_GRACE,
            device_state_reserve_mib: DEVICE_STATE_RESERVE_MIB,
        }
    }
}

/// Factory that clones VMs from a saved template.
pub struct TemplateFactory {
    config: VmConfig,
    store: StateStore,
    backend: Arc<dyn VmBackend>,
    span: tracing::Span,
}

impl std::fmt::Debug for TemplateFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateFactory")
            .field("path", &self.store.path())
            .field("hypervisor", &self.config.hypervisor)
            .finish()
    }
}

impl TemplateFactory {
    fn attach(ctx: &FactoryContext, config: VmConfig, path: PathBuf) -> Self {
        let span = tracing::info_span!(parent: &ctx.span, "template", path = %path.display());
        Self {
            config,
            store: StateStore::new(path, ctx.mounter.clone()),
            backend: ctx.backend.clone(),
            span,
        }
    }

    /// Attach to a template that already exists at `path`.
    ///
    /// Fails with [`Error::NotFound`] unless both the memory image and the
    /// device state file are present. Nothing is created on disk.
    pub fn fetch(ctx: &FactoryContext, config: VmConfig, path: impl Into<PathBuf>) -> Result<Self> {
        let factory = Self::attach(ctx, config, path.into());
        {
            let _enter = factory.span.enter();
            factory.store.check_established(factory.state_file())?;
            tracing::debug!("attached to existing vm template");
        }
        Ok(factory)
    }

    /// Create a new template at `path`.
    ///
    /// Fails with [`Error::AlreadyExists`] without side effects if a template
    /// is already there. If creation fails midway the store is released
    /// before the error is returned.
    pub fn new(ctx: &FactoryContext, config: VmConfig, path: impl Into<PathBuf>) -> Result<Self> {
        let factory = Self::attach(ctx, config, path.into());
        {
            let _enter = factory.span.enter();

            if factory.store.is_established(factory.state_file()) {
                return Err(Error::AlreadyExists {
                    path: factory.store.path().to_path_buf(),
                });
            }
            factory.config.validate()?;

            let size_mib = store_size_mib(
                factory.config.resources.memory_mib,
                ctx.options.device_state_reserve_mib,
            );
            factory.store.prepare(size_mib)?;

            if let Err(e) = lifecycle::create_template(
                factory.backend.as_ref(),
                &factory.config,
                factory.store.path(),
                ctx.options.agent_grace,
            ) {
                tracing::error!(error = %e, "failed to create vm template");
                factory.store.release();
                return Err(e);
            }

            tracing::info!(
                hypervisor = %factory.config.hypervisor,
                memory_mib = factory.config.resources.memory_mib,
                "vm template created"
            );
        }
        Ok(factory)
    }

    /// Template directory.
    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Whether the template files are still present.
    pub fn is_established(&self) -> bool {
        self.store.is_established(self.state_file())
    }

    fn state_file(&self) -> &'static str {
        self.config.hypervisor.device_state_file()
    }
}

impl FactoryBase for TemplateFactory {
    fn config(&self) -> &VmConfig {
        &self.config
    }

    fn get_base_vm(&self, request: &VmConfig) -> Result<Box<dyn VmHandle>> {
        let _enter = self.span.enter();
        lifecycle::clone_from_template(
            self.backend.as_ref(),
            &self.config,
            self.store.path(),
            request,
        )
    }

    fn close_factory(&self) {
        let _enter = self.span.enter();
        tracing::info!("closing vm template");
        self.store.release();
    }
}
