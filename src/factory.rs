//! Factory strategies.
//!
//! Callers obtain VMs through [`FactoryBase`] without knowing how they are
//! produced:
//! - [`TemplateFactory`]: clones a paused, saved template VM
//! - [`DirectFactory`]: cold-boots every VM
//!
//! [`new_factory`] picks the strategy from a [`FactoryConfig`].

use crate::config::FactoryConfig;
use crate::error::{Error, Result};
use crate::storage::{MountBackend, Tmpfs};
use crate::template::{TemplateFactory, TemplateOptions};
use crate::vm::{VmBackend, VmConfig, VmHandle, VmId, VmState};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Status of a VM owned by a factory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmStatus {
    /// VM ID.
    pub id: VmId,
    /// Current state.
    pub state: VmState,
    /// Memory in MiB.
    pub memory_mib: u32,
}

/// Produces base VMs for sandboxes.
pub trait FactoryBase: Send + Sync {
    /// Configuration this factory was built with.
    fn config(&self) -> &VmConfig;

    /// Produce a new VM for the request.
    fn get_base_vm(&self, request: &VmConfig) -> Result<Box<dyn VmHandle>>;

    /// Release everything the factory holds.
    fn close_factory(&self);

    /// Status of the VMs the factory keeps.
    ///
    /// Only strategies that keep VMs around can answer; the rest return
    /// [`Error::Unsupported`].
    fn vm_status(&self) -> Result<Vec<VmStatus>> {
        Err(Error::Unsupported("vm status"))
    }
}

/// Collaborators shared by every factory.
///
/// The span is the parent of all factory log events; there is no global
/// logger to swap out.
#[derive(Clone)]
pub struct FactoryContext {
    /// Boots VMs.
    pub backend: Arc<dyn VmBackend>,
    /// Mounts template state stores.
    pub mounter: Arc<dyn MountBackend>,
    /// Template tuning.
    pub options: TemplateOptions,
    /// Parent span for factory events.
    pub span: tracing::Span,
}

impl FactoryContext {
    /// Create a context that mounts real tmpfs stores.
    pub fn new(backend: Arc<dyn VmBackend>) -> Self {
        Self {
            backend,
            mounter: Arc::new(Tmpfs),
            options: TemplateOptions::default(),
            span: tracing::info_span!("vmfactory"),
        }
    }

    /// Use a different mount primitive.
    pub fn with_mounter(mut self, mounter: Arc<dyn MountBackend>) -> Self {
        self.mounter = mounter;
        self
    }

    /// Set template options.
    pub fn with_options(mut self, options: TemplateOptions) -> Self {
        self.options = options;
        self
    }

    /// Record factory events under `span`.
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }
}

impl std::fmt::Debug for FactoryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactoryContext")
            .field("backend", &self.backend.name())
            .field("options", &self.options)
            .finish()
    }
}

/// Cold-boots every requested VM.
pub struct DirectFactory {
    config: VmConfig,
    backend: Arc<dyn VmBackend>,
    span: tracing::Span,
}

impl DirectFactory {
    /// Create a direct factory.
    pub fn new(ctx: &FactoryContext, config: VmConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            backend: ctx.backend.clone(),
            span: tracing::info_span!(parent: &ctx.span, "direct"),
        })
    }
}

impl FactoryBase for DirectFactory {
    fn config(&self) -> &VmConfig {
        &self.config
    }

    fn get_base_vm(&self, request: &VmConfig) -> Result<Box<dyn VmHandle>> {
        let _enter = self.span.enter();
        tracing::debug!(vm = %request.id, "cold booting vm");
        self.backend
            .boot(request.clone())
            .map_err(|e| Error::boot(format!("vm {}: {}", request.id, e)))
    }

    fn close_factory(&self) {}
}

/// Build the factory strategy selected by `config`.
///
/// With templating enabled, `fetch_only` attaches to an existing template
/// and fails if there is none; otherwise a new template is created. Template
/// options come from `config`, overriding those in `ctx`.
pub fn new_factory(
    ctx: &FactoryContext,
    config: &FactoryConfig,
    fetch_only: bool,
) -> Result<Box<dyn FactoryBase>> {
    if !config.template {
        return Ok(Box::new(DirectFactory::new(ctx, config.vm.clone())?));
    }

    let ctx = ctx.clone().with_options(config.template_options());
    let factory = if fetch_only {
        TemplateFactory::fetch(&ctx, config.vm.clone(), &config.template_path)?
    } else {
        TemplateFactory::new(&ctx, config.vm.clone(), &config.template_path)?
    };
    Ok(Box::new(factory))
}
