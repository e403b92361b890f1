//! Template state store.
//!
//! A template's frozen VM lives in a tmpfs mounted at a caller-chosen
//! directory:
//!
//! ```text
//! <template path>/          # tmpfs, size = guest memory + device state reserve
//! ├── memory                # raw guest memory image
//! └── state | state.json    # device state (state.json for Cloud Hypervisor)
//! ```
//!
//! There is no manifest. A template is established iff both files exist, so
//! a store left behind by a crash between the two writes reads as "no
//! template" unless a previous run already produced both files.

use crate::error::{Error, Result};
use std::fs::DirBuilder;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Guest memory image filename.
pub const MEMORY_FILE: &str = "memory";

/// Headroom reserved next to guest memory for the device state file, in MiB.
pub const DEVICE_STATE_RESERVE_MIB: u64 = 8;

/// Mount primitive used by the state store.
pub trait MountBackend: Send + Sync {
    /// Mount a memory-backed filesystem of `size_mib` at `target`.
    fn mount(&self, target: &Path, size_mib: u64) -> std::io::Result<()>;

    /// Lazily detach whatever is mounted at `target`.
    fn unmount(&self, target: &Path) -> std::io::Result<()>;
}

/// tmpfs mounts via mount(2) and umount2(2).
#[derive(Debug, Clone, Copy, Default)]
pub struct Tmpfs;

#[cfg(target_os = "linux")]
impl MountBackend for Tmpfs {
    fn mount(&self, target: &Path, size_mib: u64) -> std::io::Result<()> {
        use std::ffi::CString;

        let source = CString::new("tmpfs")?;
        let target = path_to_cstring(target)?;
        let data = CString::new(format!("size={}M", size_mib))?;
        let flags = libc::MS_NOSUID | libc::MS_NODEV;

        let ret = unsafe {
            libc::mount(
                source.as_ptr(),
                target.as_ptr(),
                source.as_ptr(),
                flags,
                data.as_ptr() as *const libc::c_void,
            )
        };
        if ret < 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }

    fn unmount(&self, target: &Path) -> std::io::Result<()> {
        let target = path_to_cstring(target)?;
        let ret = unsafe { libc::umount2(target.as_ptr(), libc::MNT_DETACH) };
        if ret < 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }
}

#[cfg(not(target_os = "linux"))]
impl MountBackend for Tmpfs {
    fn mount(&self, _target: &Path, _size_mib: u64) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "tmpfs mounts require linux",
        ))
    }

    fn unmount(&self, _target: &Path) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "tmpfs mounts require linux",
        ))
    }
}

#[cfg(target_os = "linux")]
fn path_to_cstring(path: &Path) -> std::io::Result<std::ffi::CString> {
    use std::os::unix::ffi::OsStrExt;
    Ok(std::ffi::CString::new(path.as_os_str().as_bytes())?)
}

/// Store size in MiB for a guest with `memory_mib` of RAM.
pub fn store_size_mib(memory_mib: u32, reserve_mib: u64) -> u64 {
    u64::from(memory_mib) + reserve_mib
}

/// Memory-backed directory holding one template's artifacts.
#[derive(Clone)]
pub struct StateStore {
    path: PathBuf,
    mounter: Arc<dyn MountBackend>,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore").field("path", &self.path).finish()
    }
}

impl StateStore {
    /// Attach to a store directory without touching the filesystem.
    pub fn new(path: impl Into<PathBuf>, mounter: Arc<dyn MountBackend>) -> Self {
        Self {
            path: path.into(),
            mounter,
        }
    }

    /// Create the directory, mount a tmpfs of `size_mib` on it and create an
    /// empty memory file.
    ///
    /// On failure nothing is left mounted, and the directory is removed if
    /// this call created it.
    pub fn prepare(&self, size_mib: u64) -> Result<()> {
        tracing::info!(path = %self.path.display(), size_mib, "preparing template state store");

        let created = !self.path.exists();
        DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(&self.path)
            .map_err(|e| Error::storage(&self.path, format!("create directory: {}", e)))?;

        if let Err(e) = self.mounter.mount(&self.path, size_mib) {
            self.unwind(created, false);
            return Err(Error::storage(
                &self.path,
                format!("mount tmpfs (size={}M): {}", size_mib, e),
            ));
        }

        if let Err(e) = std::fs::File::create(self.memory_path()) {
            self.unwind(created, true);
            return Err(Error::storage(
                &self.path,
                format!("create {}: {}", MEMORY_FILE, e),
            ));
        }

        Ok(())
    }

    fn unwind(&self, created: bool, mounted: bool) {
        if mounted {
            if let Err(e) = self.mounter.unmount(&self.path) {
                tracing::error!(
                    path = %self.path.display(),
                    error = %e,
                    "failed to unmount state store"
                );
            }
        }
        if created {
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                tracing::error!(
                    path = %self.path.display(),
                    error = %e,
                    "failed to remove state store"
                );
            }
        }
    }

    /// Unmount and remove the store directory.
    ///
    /// Best effort: failures are logged, never returned. Releasing a store
    /// whose directory is already gone is a no-op.
    pub fn release(&self) {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "state store already released");
            return;
        }

        if let Err(e) = self.mounter.unmount(&self.path) {
            tracing::error!(path = %self.path.display(), error = %e, "failed to unmount state store");
        }

        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            tracing::error!(path = %self.path.display(), error = %e, "failed to remove state store");
        }
    }

    /// Check that both template artifacts are present.
    ///
    /// Returns [`Error::NotFound`] naming the first missing file.
    pub fn check_established(&self, state_file: &str) -> Result<()> {
        for file in [MEMORY_FILE, state_file] {
            let path = self.path.join(file);
            if let Err(e) = std::fs::metadata(&path) {
                tracing::debug!(path = %path.display(), error = %e, "template artifact missing");
                return Err(Error::NotFound {
                    path: self.path.clone(),
                    missing: path,
                });
            }
        }
        Ok(())
    }

    /// True iff both template artifacts are present.
    pub fn is_established(&self, state_file: &str) -> bool {
        self.check_established(state_file).is_ok()
    }

    /// Store directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Guest memory image path.
    pub fn memory_path(&self) -> PathBuf {
        self.path.join(MEMORY_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeMounter;

    fn store_in(dir: &Path, mounter: &Arc<FakeMounter>) -> StateStore {
        StateStore::new(dir.join("template"), mounter.clone())
    }

    #[test]
    fn test_store_size_includes_device_state_reserve() {
        assert_eq!(store_size_mib(2048, DEVICE_STATE_RESERVE_MIB), 2056);
        assert_eq!(store_size_mib(0, 8), 8);
    }

    #[test]
    fn test_prepare_creates_private_dir_and_memory_file() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().unwrap();
        let mounter = Arc::new(FakeMounter::default());
        let store = store_in(temp.path(), &mounter);

        store.prepare(2056).unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
        let memory = std::fs::metadata(store.memory_path()).unwrap();
        assert_eq!(memory.len(), 0);
        assert_eq!(mounter.mounts(), vec![(store.path().to_path_buf(), 2056)]);
    }

    #[test]
    fn test_prepare_unwinds_when_mount_fails() {
        let temp = tempfile::tempdir().unwrap();
        let mounter = Arc::new(FakeMounter::failing());
        let store = store_in(temp.path(), &mounter);

        let err = store.prepare(64).unwrap_err();

        assert!(matches!(err, Error::Storage { .. }));
        assert!(err.to_string().contains("mount tmpfs"));
        assert!(!store.path().exists());
    }

    #[test]
    fn test_prepare_unmounts_when_memory_file_cannot_be_created() {
        let temp = tempfile::tempdir().unwrap();
        // A directory in the way of the memory image makes File::create fail.
        let mounter = Arc::new(FakeMounter::occupying(MEMORY_FILE));
        let store = store_in(temp.path(), &mounter);

        let err = store.prepare(64).unwrap_err();

        assert!(matches!(err, Error::Storage { .. }));
        assert!(err.to_string().contains("create memory"));
        assert_eq!(mounter.unmounts(), vec![store.path().to_path_buf()]);
        assert!(!store.path().exists());
    }

    #[test]
    fn test_prepare_failure_keeps_existing_directory() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("template");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("notes.txt"), b"keep me").unwrap();

        let mounter = Arc::new(FakeMounter::failing());
        let store = StateStore::new(&dir, mounter.clone());
        let err = store.prepare(64).unwrap_err();

        assert!(matches!(err, Error::Storage { .. }));
        assert!(mounter.unmounts().is_empty());
        assert_eq!(std::fs::read(dir.join("notes.txt")).unwrap(), b"keep me");
    }

    #[test]
    fn test_release_is_idempotent() {
        let temp = tempfile::tempdir().unwrap();
        let mounter = Arc::new(FakeMounter::default());
        let store = store_in(temp.path(), &mounter);
        store.prepare(64).unwrap();

        store.release();
        assert!(!store.path().exists());
        assert_eq!(mounter.unmounts().len(), 1);

        // Second release finds nothing to do
        store.release();
        assert_eq!(mounter.unmounts().len(), 1);
    }

    #[test]
    fn test_release_removes_dir_even_if_unmount_fails() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("template");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(MEMORY_FILE), b"").unwrap();

        let store = StateStore::new(&dir, Arc::new(FakeMounter::failing()));
        store.release();

        assert!(!dir.exists());
    }

    #[test]
    fn test_established_requires_both_files() {
        let temp = tempfile::tempdir().unwrap();
        let mounter = Arc::new(FakeMounter::default());
        let store = store_in(temp.path(), &mounter);
        store.prepare(64).unwrap();

        // Crash between writing the memory image and the device state:
        // only `memory` exists, which reads as "no template".
        let err = store.check_established("state").unwrap_err();
        match err {
            Error::NotFound { missing, .. } => assert_eq!(missing, store.path().join("state")),
            other => panic!("unexpected error: {other}"),
        }

        std::fs::write(store.path().join("state.json"), b"{}").unwrap();
        assert!(!store.is_established("state"));
        assert!(store.is_established("state.json"));
    }

    #[test]
    fn test_check_on_missing_dir_does_not_create_it() {
        let temp = tempfile::tempdir().unwrap();
        let mounter = Arc::new(FakeMounter::default());
        let store = store_in(temp.path(), &mounter);

        assert!(!store.is_established("state"));
        assert!(!store.path().exists());
    }
}
