//! Mount table access on the OCI runtime spec

use oci_spec::runtime::{Mount, Spec};

/// Mutation capability the classifier needs over a spec
///
/// Implementors hand out exclusive access for the duration of one call; the
/// classifier only ever touches mount entries and root propagation.
pub trait MountTable {
    /// Current mount entries
    fn mount_entries(&self) -> &[Mount];

    /// Keep only the entries for which `keep` returns true
    fn retain_mounts<F: FnMut(&Mount) -> bool>(&mut self, keep: F);

    /// Append a mount entry
    fn add_mount(&mut self, mount: Mount);

    /// Root filesystem propagation, if set
    fn root_propagation(&self) -> Option<&str>;

    /// Set the root filesystem propagation
    fn set_root_propagation(&mut self, propagation: &str);

    /// Entries targeting `destination` (compared after cleaning)
    fn mounts_at(&self, destination: &str) -> impl Iterator<Item = &Mount> {
        let destination = clean_path(destination);
        self.mount_entries()
            .iter()
            .filter(move |m| destination_of(m) == destination)
    }
}

impl MountTable for Spec {
    fn mount_entries(&self) -> &[Mount] {
        self.mounts().as_deref().unwrap_or_default()
    }

    fn retain_mounts<F: FnMut(&Mount) -> bool>(&mut self, keep: F) {
        let mut mounts = self.mounts().clone().unwrap_or_default();
        mounts.retain(keep);
        self.set_mounts(Some(mounts));
    }

    fn add_mount(&mut self, mount: Mount) {
        let mut mounts = self.mounts().clone().unwrap_or_default();
        mounts.push(mount);
        self.set_mounts(Some(mounts));
    }

    fn root_propagation(&self) -> Option<&str> {
        self.linux()
            .as_ref()
            .and_then(|linux| linux.rootfs_propagation().as_deref())
    }

    fn set_root_propagation(&mut self, propagation: &str) {
        let mut linux = self.linux().clone().unwrap_or_default();
        linux.set_rootfs_propagation(Some(propagation.to_string()));
        self.set_linux(Some(linux));
    }
}

/// Cleaned destination of a spec entry
#[must_use]
pub fn destination_of(mount: &Mount) -> String {
    clean_path(&mount.destination().to_string_lossy())
}

/// Lexically clean an absolute or relative path
///
/// Collapses repeated separators, `.` and `..` without touching the
/// filesystem. `..` never climbs above the root.
#[must_use]
pub fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            _ => parts.push(part),
        }
    }

    let joined = parts.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Number of components of a cleaned path, `/` counting as one
#[must_use]
pub fn path_depth(path: &str) -> usize {
    clean_path(path).split('/').count()
}
