//! vmfactory - VM template factory.
//!
//! Booting a guest kernel and agent dominates sandbox start-up time. A
//! template factory pays that cost once: it boots a VM, pauses it, saves its
//! memory and device state into a tmpfs, and starts every later VM by
//! mapping the saved state.
//!
//! ```no_run
//! use std::sync::Arc;
//! use vmfactory::{FactoryBase, FactoryContext, TemplateFactory, VmBackend, VmConfig};
//!
//! fn spawn(backend: Arc<dyn VmBackend>, base: VmConfig, request: &VmConfig) -> vmfactory::Result<()> {
//!     let ctx = FactoryContext::new(backend);
//!     let factory = match TemplateFactory::fetch(&ctx, base.clone(), "/run/vm-template-A") {
//!         Ok(factory) => factory,
//!         Err(_) => TemplateFactory::new(&ctx, base, "/run/vm-template-A")?,
//!     };
//!     let _vm = factory.get_base_vm(request)?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod factory;
pub mod storage;
pub mod template;
pub mod vm;

#[cfg(test)]
pub(crate) mod testing;

pub use config::FactoryConfig;
pub use error::{Error, Result};
pub use factory::{new_factory, DirectFactory, FactoryBase, FactoryContext, VmStatus};
pub use storage::{MountBackend, StateStore, Tmpfs};
pub use template::{TemplateFactory, TemplateOptions};
pub use vm::{HypervisorKind, VmBackend, VmConfig, VmHandle, VmId, VmState};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
