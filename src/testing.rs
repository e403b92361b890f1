//! In-process fakes for the VM backend and the mount primitive.

use crate::error::{Error, Result};
use crate::storage::MountBackend;
use crate::vm::{VmBackend, VmConfig, VmHandle, VmId, VmState};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Records mounts instead of performing them.
#[derive(Debug, Default)]
pub struct FakeMounter {
    fail: bool,
    occupy: Option<&'static str>,
    mounts: Mutex<Vec<(PathBuf, u64)>>,
    unmounts: Mutex<Vec<PathBuf>>,
}

impl FakeMounter {
    /// A mounter whose every call fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    /// A mounter that leaves a directory named `name` in every mount.
    pub fn occupying(name: &'static str) -> Self {
        Self {
            occupy: Some(name),
            ..Default::default()
        }
    }

    pub fn mounts(&self) -> Vec<(PathBuf, u64)> {
        self.mounts.lock().clone()
    }

    pub fn unmounts(&self) -> Vec<PathBuf> {
        self.unmounts.lock().clone()
    }
}

impl MountBackend for FakeMounter {
    fn mount(&self, target: &Path, size_mib: u64) -> std::io::Result<()> {
        if self.fail {
            return Err(std::io::Error::from_raw_os_error(libc::EPERM));
        }
        self.mounts.lock().push((target.to_path_buf(), size_mib));
        if let Some(name) = self.occupy {
            std::fs::create_dir(target.join(name))?;
        }
        Ok(())
    }

    fn unmount(&self, target: &Path) -> std::io::Result<()> {
        if self.fail {
            return Err(std::io::Error::from_raw_os_error(libc::EINVAL));
        }
        self.unmounts.lock().push(target.to_path_buf());
        Ok(())
    }
}

/// Lifecycle call observed by [`FakeBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Boot,
    Disconnect,
    Pause,
    Save,
    Stop,
}

/// Where a [`FakeBackend`] VM should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Boot,
    Disconnect,
    Pause,
    Save,
}

/// VM backend that simulates boot, pause and save on the local filesystem.
///
/// `save` writes the memory and device state files; booting from a template
/// requires both to exist.
#[derive(Debug, Default)]
pub struct FakeBackend {
    fail_at: Option<FailAt>,
    events: Arc<Mutex<Vec<Event>>>,
    booted: Mutex<Vec<VmConfig>>,
}

impl FakeBackend {
    pub fn failing_at(stage: FailAt) -> Self {
        Self {
            fail_at: Some(stage),
            ..Default::default()
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn booted(&self) -> Vec<VmConfig> {
        self.booted.lock().clone()
    }

    fn fail(&self, stage: FailAt) -> bool {
        self.fail_at == Some(stage)
    }
}

impl VmBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn boot(&self, config: VmConfig) -> Result<Box<dyn VmHandle>> {
        self.events.lock().push(Event::Boot);
        self.booted.lock().push(config.clone());

        if self.fail(FailAt::Boot) {
            return Err(Error::Io(std::io::Error::other("simulated boot failure")));
        }

        let state = if config.boot_from_template {
            for path in [&config.memory_path, &config.devices_state_path] {
                let path = path
                    .as_ref()
                    .ok_or_else(|| Error::invalid_config("template path not set"))?;
                std::fs::metadata(path)?;
            }
            VmState::Running
        } else {
            VmState::Ready
        };

        Ok(Box::new(FakeVm {
            id: config.id.clone(),
            config,
            state,
            fail_at: self.fail_at,
            events: self.events.clone(),
        }))
    }
}

#[derive(Debug)]
struct FakeVm {
    id: VmId,
    config: VmConfig,
    state: VmState,
    fail_at: Option<FailAt>,
    events: Arc<Mutex<Vec<Event>>>,
}

impl FakeVm {
    fn step(&mut self, event: Event, stage: FailAt) -> Result<()> {
        self.events.lock().push(event);
        if self.fail_at == Some(stage) {
            return Err(Error::Io(std::io::Error::other(format!(
                "simulated {:?} failure",
                stage
            ))));
        }
        Ok(())
    }
}

impl VmHandle for FakeVm {
    fn id(&self) -> &VmId {
        &self.id
    }

    fn config(&self) -> &VmConfig {
        &self.config
    }

    fn state(&self) -> VmState {
        self.state.clone()
    }

    fn disconnect(&mut self) -> Result<()> {
        self.step(Event::Disconnect, FailAt::Disconnect)?;
        self.state = VmState::Running;
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.step(Event::Pause, FailAt::Pause)?;
        self.state = VmState::Paused;
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        self.step(Event::Save, FailAt::Save)?;
        if let Some(path) = &self.config.memory_path {
            std::fs::write(path, vec![0u8; 4096])?;
        }
        if let Some(path) = &self.config.devices_state_path {
            std::fs::write(path, b"{\"vcpus\":1}")?;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.events.lock().push(Event::Stop);
        self.state = VmState::Stopped;
        Ok(())
    }
}
