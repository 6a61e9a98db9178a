//! Linux resctrl filesystem backend
//!
//! Probes for a mounted `resctrl` filesystem and keeps one control group
//! directory per configured class. Schemata programming belongs to the
//! kernel interface and is not done here.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use vortex_core::{Error, Result};

use crate::backend::RdtBackend;
use crate::config::{RdtConfig, ROOT_CLASS};

/// Where the kernel lists mounted filesystems
pub const PROC_MOUNTS: &str = "/proc/mounts";

/// Directories under the resctrl root that are not control groups
const RESERVED_DIRS: [&str; 3] = ["info", "mon_groups", "mon_data"];

/// Production backend driving `/sys/fs/resctrl`
#[derive(Debug)]
pub struct ResctrlBackend {
    /// File listing mounts, `/proc/mounts` outside of tests
    mounts_file: PathBuf,

    /// Set by a successful `initialize`
    state: Mutex<Option<Resctrl>>,
}

#[derive(Debug, Clone)]
struct Resctrl {
    root: PathBuf,
    prefix: String,
}

impl Resctrl {
    fn group_dir(&self, class: &str) -> PathBuf {
        self.root.join(format!("{}{class}", self.prefix))
    }
}

impl Default for ResctrlBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ResctrlBackend {
    /// Backend reading the host mount table
    #[must_use]
    pub fn new() -> Self {
        Self::with_mounts_file(PROC_MOUNTS)
    }

    /// Backend reading an alternative mount table
    #[must_use]
    pub fn with_mounts_file(mounts_file: impl Into<PathBuf>) -> Self {
        Self {
            mounts_file: mounts_file.into(),
            state: Mutex::new(None),
        }
    }

    /// Mount point of the resctrl filesystem, once initialized
    pub async fn root(&self) -> Option<PathBuf> {
        self.state.lock().await.as_ref().map(|s| s.root.clone())
    }

    /// Find the resctrl mount point in a mount table
    fn find_mount_point(mounts: &str) -> Option<PathBuf> {
        mounts.lines().find_map(|line| {
            let mut fields = line.split_whitespace();
            let _device = fields.next()?;
            let mount_point = fields.next()?;
            let fs_type = fields.next()?;
            (fs_type == "resctrl").then(|| PathBuf::from(mount_point))
        })
    }

    /// List the control groups owned by `prefix`
    async fn existing_groups(root: &Path, prefix: &str) -> Result<HashSet<String>> {
        let mut groups = HashSet::new();
        let mut entries = fs::read_dir(root).await.map_err(|e| {
            Error::apply(format!("Failed to list {}: {e}", root.display()))
        })?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::apply(format!("Failed to list {}: {e}", root.display())))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if RESERVED_DIRS.contains(&name.as_str()) {
                continue;
            }
            let is_dir = entry.file_type().await.is_ok_and(|t| t.is_dir());
            if is_dir && name.starts_with(prefix) {
                groups.insert(name);
            }
        }

        Ok(groups)
    }
}

#[async_trait]
impl RdtBackend for ResctrlBackend {
    async fn initialize(&self, prefix: &str) -> Result<()> {
        let mounts = fs::read_to_string(&self.mounts_file).await.map_err(|e| {
            Error::CapabilityUnavailable {
                reason: format!("Failed to read {}: {e}", self.mounts_file.display()),
            }
        })?;

        let root = Self::find_mount_point(&mounts).ok_or_else(|| Error::CapabilityUnavailable {
            reason: "resctrl filesystem not mounted".to_string(),
        })?;

        if !root.join("info").is_dir() {
            return Err(Error::CapabilityUnavailable {
                reason: format!("{} has no info directory", root.display()),
            });
        }

        if !nix::unistd::geteuid().is_root() {
            debug!("Not running as root, resctrl writes may be refused");
        }

        info!(root = %root.display(), prefix, "RDT initialized");

        *self.state.lock().await = Some(Resctrl {
            root,
            prefix: prefix.to_string(),
        });

        Ok(())
    }

    async fn set_config(&self, config: &RdtConfig, force: bool) -> Result<()> {
        let state = self
            .state
            .lock()
            .await
            .clone()
            .ok_or_else(|| Error::apply("RDT not initialized"))?;

        config.validate()?;

        let wanted: HashSet<String> = config
            .class_names()
            .filter(|name| *name != ROOT_CLASS)
            .map(|name| format!("{}{name}", state.prefix))
            .collect();

        let existing = Self::existing_groups(&state.root, &state.prefix).await?;

        for class in config.class_names().filter(|name| *name != ROOT_CLASS) {
            let dir = state.group_dir(class);
            if dir.is_dir() {
                continue;
            }
            debug!(class, dir = %dir.display(), "Creating resctrl group");
            fs::create_dir(&dir).await.map_err(|e| {
                Error::apply(format!("Failed to create class {class:?}: {e}"))
            })?;
        }

        for stale in existing.difference(&wanted) {
            let dir = state.root.join(stale);
            if !force {
                warn!(group = %stale, "Keeping resctrl group not in config");
                continue;
            }
            debug!(dir = %dir.display(), "Removing stale resctrl group");
            fs::remove_dir(&dir).await.map_err(|e| {
                Error::apply(format!("Failed to remove group {stale:?}: {e}"))
            })?;
        }

        Ok(())
    }
}
