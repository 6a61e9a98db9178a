//! Bind mount classification
//!
//! Requested host paths are split between the spec mount list and the
//! explicit binds the runtime performs itself. Well-known kernel paths
//! (`/dev`, `/sys`, `/proc`) always become binds and replace whatever the
//! generated spec declared for them, so each destination ends up mounted
//! exactly once.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use oci_spec::runtime::{Mount, MountBuilder};
use serde::Serialize;
use tracing::debug;
use vortex_core::{Error, Result};

use crate::request::{ContainerVolume, MountRequest, Propagation};
use crate::spec::{MountTable, clean_path, destination_of, path_depth};

/// Container paths that are always emitted as explicit binds
pub const SPECIAL_PATHS: [&str; 3] = ["/dev", "/sys", "/proc"];

/// Spec entries below a special path that survive its bind
///
/// The host `/sys` bind would otherwise expose the host cgroup hierarchy.
const KEPT_BELOW_SPECIAL: [&str; 1] = ["/sys/fs/cgroup"];

/// A bind mount the runtime performs itself, outside the spec mount list
///
/// Binds never carry a filesystem type.
pub type Bind = Mount;

/// Outcome of a classification
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Classification {
    /// Every requested host path, as mounted
    pub volumes: Vec<ContainerVolume>,
    /// Special paths the runtime must bind itself
    pub binds: Vec<Bind>,
}

/// Splits requested mounts between the spec and explicit binds
#[derive(Debug, Clone, Default)]
pub struct MountClassifier {
    /// Prepended to every host path (image or rootless root)
    bind_mount_prefix: PathBuf,

    /// Host paths that must exist; they are never created on demand
    absent_sources_to_reject: Vec<PathBuf>,
}

/// Check whether `path` is always emitted as a bind
#[must_use]
pub fn is_special_path(path: &str) -> bool {
    SPECIAL_PATHS.contains(&clean_path(path).as_str())
}

impl MountClassifier {
    /// Classifier resolving host paths as-is
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve host paths under `prefix`
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.bind_mount_prefix = prefix.into();
        self
    }

    /// Fail instead of creating these host paths when they are missing
    #[must_use]
    pub fn with_absent_sources_to_reject(mut self, paths: Vec<PathBuf>) -> Self {
        self.absent_sources_to_reject = paths;
        self
    }

    /// Classify `requests` against `spec`
    ///
    /// Requests are handled parents first. Each one is validated before the
    /// spec is touched for it; an error aborts the batch, keeping spec edits
    /// already made for earlier requests and returning no binds.
    /// `container_id` only labels log lines and may be empty.
    ///
    /// # Errors
    /// - [`Error::InvalidMount`] for a request missing a path, a missing
    ///   host path that may not be created, or a source leaving the prefix
    /// - [`Error::Io`] if a missing host path cannot be created
    pub fn classify<T: MountTable>(
        &self,
        container_id: &str,
        requests: &[MountRequest],
        spec: &mut T,
    ) -> Result<Classification> {
        let mut ordered: Vec<&MountRequest> = requests.iter().collect();
        ordered.sort_by_key(|request| path_depth(&request.container_path));

        let mut result = Classification::default();

        for request in ordered {
            request.validate()?;
            let source = self.resolve_source(&request.host_path)?;
            let destination = clean_path(&request.container_path);
            let special = is_special_path(&destination);

            // A later request for the same destination wins
            result.binds.retain(|b| destination_of(b) != destination);
            result.volumes.retain(|v| clean_path(&v.container_path) != destination);

            let subtree = format!("{destination}/");
            spec.retain_mounts(|m| {
                let dst = destination_of(m);
                let below = special
                    && dst.starts_with(&subtree)
                    && !KEPT_BELOW_SPECIAL.contains(&dst.as_str());
                dst != destination && !below
            });

            let options = Self::options(request, spec);
            let source = source.to_string_lossy().into_owned();

            debug!(
                container = container_id,
                destination = %destination,
                source = %source,
                special,
                "Classified mount"
            );

            result.volumes.push(ContainerVolume {
                container_path: destination.clone(),
                host_path: source.clone(),
                readonly: request.readonly,
            });

            let mut builder = MountBuilder::default()
                .destination(destination.as_str())
                .source(source.as_str())
                .options(options);
            if !special {
                builder = builder.typ("bind");
            }
            let mount = builder.build().map_err(|e| {
                Error::invalid_mount(format!("cannot build mount for {destination}: {e}"))
            })?;

            if special {
                result.binds.push(mount);
            } else {
                spec.add_mount(mount);
            }
        }

        Ok(result)
    }

    /// Mount options for `request`, raising root propagation when needed
    fn options<T: MountTable>(request: &MountRequest, spec: &mut T) -> Vec<String> {
        let mode = if request.readonly { "ro" } else { "rw" };

        match request.propagation {
            Propagation::Private => {}
            Propagation::HostToContainer => {
                if !matches!(spec.root_propagation(), Some("rshared" | "rslave")) {
                    spec.set_root_propagation("rslave");
                }
            }
            Propagation::Bidirectional => spec.set_root_propagation("rshared"),
        }

        vec![
            mode.to_string(),
            "rbind".to_string(),
            request.propagation.option().to_string(),
        ]
    }

    /// Host path backing a request, created if missing
    fn resolve_source(&self, host_path: &str) -> Result<PathBuf> {
        let source = self.join_prefix(host_path);

        match std::fs::symlink_metadata(&source) {
            Ok(meta) if meta.file_type().is_symlink() || self.has_prefix() => {
                self.resolve_within_prefix(&source)
            }
            Ok(_) => Ok(source),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if self.absent_sources_to_reject.iter().any(|p| *p == source) {
                    return Err(Error::invalid_mount(format!(
                        "cannot mount {}: path does not exist and will cause issues as a directory",
                        source.display()
                    )));
                }

                // Directories are created through whatever already exists
                if self.has_prefix()
                    && let Some(existing) = source
                        .ancestors()
                        .skip(1)
                        .take_while(|a| a.starts_with(&self.bind_mount_prefix))
                        .find(|a| a.exists())
                {
                    self.resolve_within_prefix(existing)?;
                }

                debug!(path = %source.display(), "Creating missing mount source");
                std::fs::create_dir_all(&source).map_err(|e| Error::Io {
                    path: source.clone(),
                    source: e,
                })?;
                Ok(source)
            }
            Err(e) => Err(Error::invalid_mount(format!(
                "failed to resolve symlink {}: {e}",
                source.display()
            ))),
        }
    }

    fn has_prefix(&self) -> bool {
        !self.bind_mount_prefix.as_os_str().is_empty()
    }

    /// `prefix` + `host_path`, without `host_path` replacing the prefix
    fn join_prefix(&self, host_path: &str) -> PathBuf {
        let prefix = self.bind_mount_prefix.to_string_lossy();
        if prefix.is_empty() {
            return PathBuf::from(clean_path(host_path));
        }
        PathBuf::from(clean_path(&format!("{prefix}/{host_path}")))
    }

    /// Resolve every symlink in `path`, refusing to leave the prefix
    fn resolve_within_prefix(&self, path: &Path) -> Result<PathBuf> {
        let resolved = std::fs::canonicalize(path).map_err(|e| {
            Error::invalid_mount(format!("failed to resolve symlink {}: {e}", path.display()))
        })?;

        if !self.has_prefix() {
            return Ok(resolved);
        }

        let prefix = std::fs::canonicalize(&self.bind_mount_prefix)
            .unwrap_or_else(|_| self.bind_mount_prefix.clone());
        if resolved.starts_with(&prefix) {
            Ok(resolved)
        } else {
            Err(Error::invalid_mount(format!(
                "{} resolves to {}, outside {}",
                path.display(),
                resolved.display(),
                prefix.display()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oci_spec::runtime::Spec;

    fn dest(mount: &Mount) -> String {
        destination_of(mount)
    }

    #[test]
    fn test_special_paths() {
        assert!(is_special_path("/dev"));
        assert!(is_special_path("/sys/"));
        assert!(is_special_path("/proc"));
        assert!(!is_special_path("/dev/shm"));
        assert!(!is_special_path("/data"));
    }

    #[test]
    fn test_add_oci_binds_for_dev() {
        let mut spec = Spec::default();
        let requests = [MountRequest::new("/dev", "/dev")];

        let result = MountClassifier::new()
            .classify("", &requests, &mut spec)
            .unwrap();

        assert!(
            spec.mount_entries().iter().all(|m| dest(m) != "/dev"),
            "/dev shouldn't be in the spec if it's bind mounted from kube"
        );
        assert!(spec.mount_entries().iter().all(|m| !dest(m).starts_with("/dev/")));
        let dev: Vec<_> = result.binds.iter().filter(|b| dest(b) == "/dev").collect();
        assert_eq!(dev.len(), 1);
        assert!(dev[0].typ().is_none());
    }

    #[test]
    fn test_add_oci_binds_for_sys() {
        let mut spec = Spec::default();
        let requests = [MountRequest::new("/sys", "/sys")];

        let result = MountClassifier::new()
            .classify("", &requests, &mut spec)
            .unwrap();

        let how_many_sys = result
            .binds
            .iter()
            .filter(|b| dest(b) == "/sys" && b.typ().as_deref() != Some("sysfs"))
            .count();
        assert_eq!(how_many_sys, 1, "there is not a single /sys bind mount");
        assert_eq!(spec.mounts_at("/sys").count(), 0);
    }

    #[test]
    fn test_sys_bind_keeps_read_only_cgroup_entry() {
        let mut spec = Spec::default();
        let before: Vec<_> = spec.mounts_at("/sys/fs/cgroup").cloned().collect();
        assert_eq!(before.len(), 1);

        MountClassifier::new()
            .classify("", &[MountRequest::new("/sys", "/sys")], &mut spec)
            .unwrap();

        let cgroup: Vec<_> = spec.mounts_at("/sys/fs/cgroup").collect();
        assert_eq!(cgroup.len(), 1);
        assert_eq!(cgroup[0], &before[0]);
        assert_eq!(cgroup[0].typ().as_deref(), Some("cgroup"));
        let options = cgroup[0].options().clone().unwrap_or_default();
        assert!(options.iter().any(|o| o == "ro"), "{options:?}");
    }

    #[test]
    fn test_options() {
        let mut spec = Spec::default();
        spec.set_linux(None);

        let ro = MountRequest::new("/data", "/srv").with_readonly(true);
        assert_eq!(
            MountClassifier::options(&ro, &mut spec),
            vec!["ro", "rbind", "rprivate"]
        );
        assert!(spec.root_propagation().is_none());

        let slave = MountRequest::new("/data", "/srv").with_propagation(Propagation::HostToContainer);
        assert_eq!(
            MountClassifier::options(&slave, &mut spec),
            vec!["rw", "rbind", "rslave"]
        );
        assert_eq!(spec.root_propagation(), Some("rslave"));

        let shared = MountRequest::new("/data", "/srv").with_propagation(Propagation::Bidirectional);
        let _ = MountClassifier::options(&shared, &mut spec);
        assert_eq!(spec.root_propagation(), Some("rshared"));

        // rslave never downgrades rshared
        let _ = MountClassifier::options(&slave, &mut spec);
        assert_eq!(spec.root_propagation(), Some("rshared"));
    }

    #[test]
    fn test_join_prefix() {
        let plain = MountClassifier::new();
        assert_eq!(plain.join_prefix("/var/lib/x/"), PathBuf::from("/var/lib/x"));

        let prefixed = MountClassifier::new().with_prefix("/run/rootless");
        assert_eq!(
            prefixed.join_prefix("/var/lib/x"),
            PathBuf::from("/run/rootless/var/lib/x")
        );
    }
}
