//! Mount requests coming from the workload and what they turn into

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use vortex_core::{Error, Result};

/// Mount propagation requested for a host path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Propagation {
    /// No propagation in either direction
    #[default]
    Private,
    /// Host mounts show up in the container
    HostToContainer,
    /// Mounts propagate both ways
    Bidirectional,
}

impl Propagation {
    /// Recursive mount option for this propagation
    #[must_use]
    pub const fn option(self) -> &'static str {
        match self {
            Self::Private => "rprivate",
            Self::HostToContainer => "rslave",
            Self::Bidirectional => "rshared",
        }
    }
}

impl fmt::Display for Propagation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Private => write!(f, "private"),
            Self::HostToContainer => write!(f, "host-to-container"),
            Self::Bidirectional => write!(f, "bidirectional"),
        }
    }
}

impl FromStr for Propagation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "private" | "rprivate" => Ok(Self::Private),
            "host-to-container" | "rslave" => Ok(Self::HostToContainer),
            "bidirectional" | "rshared" => Ok(Self::Bidirectional),
            other => Err(Error::invalid_mount(format!(
                "unknown propagation mode {other:?}"
            ))),
        }
    }
}

/// A host path the workload wants mounted into the container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountRequest {
    /// Path inside the container
    pub container_path: String,

    /// Path on the host
    pub host_path: String,

    /// Mount read-only
    #[serde(default)]
    pub readonly: bool,

    /// Mount propagation
    #[serde(default)]
    pub propagation: Propagation,
}

impl MountRequest {
    /// Read-write, private bind of `host_path` at `container_path`
    #[must_use]
    pub fn new(container_path: impl Into<String>, host_path: impl Into<String>) -> Self {
        Self {
            container_path: container_path.into(),
            host_path: host_path.into(),
            readonly: false,
            propagation: Propagation::Private,
        }
    }

    /// Mount read-only
    #[must_use]
    pub const fn with_readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }

    /// Set mount propagation
    #[must_use]
    pub const fn with_propagation(mut self, propagation: Propagation) -> Self {
        self.propagation = propagation;
        self
    }

    /// Reject requests missing either side of the mapping
    ///
    /// # Errors
    /// Returns [`Error::InvalidMount`] if a path is empty
    pub fn validate(&self) -> Result<()> {
        if self.container_path.is_empty() {
            return Err(Error::invalid_mount("mount.ContainerPath is empty"));
        }
        if self.host_path.is_empty() {
            return Err(Error::invalid_mount(format!(
                "mount.HostPath is empty for {}",
                self.container_path
            )));
        }
        Ok(())
    }
}

/// Parses `container:host[:ro|rw]`
impl FromStr for MountRequest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.splitn(3, ':');
        let container_path = parts.next().unwrap_or_default();
        let host_path = parts.next().unwrap_or_default();
        let readonly = match parts.next() {
            None | Some("rw") => false,
            Some("ro") => true,
            Some(other) => {
                return Err(Error::invalid_mount(format!(
                    "unknown mount mode {other:?} in {s:?}"
                )));
            }
        };

        let request = Self::new(container_path, host_path).with_readonly(readonly);
        request.validate()?;
        Ok(request)
    }
}

/// A host path exposed to the container, as reported back to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerVolume {
    /// Path inside the container
    pub container_path: String,
    /// Resolved host path
    pub host_path: String,
    /// Mounted read-only
    pub readonly: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(MountRequest::new("/dev", "/dev").validate().is_ok());

        let err = MountRequest::new("", "/dev").validate().unwrap_err();
        assert!(err.to_string().contains("ContainerPath"));

        let err = MountRequest::new("/dev", "").validate().unwrap_err();
        assert!(err.to_string().contains("HostPath"));
    }

    #[test]
    fn test_parse_request() {
        let request: MountRequest = "/data:/srv/data:ro".parse().unwrap();
        assert_eq!(request.container_path, "/data");
        assert_eq!(request.host_path, "/srv/data");
        assert!(request.readonly);

        let request: MountRequest = "/dev:/dev".parse().unwrap();
        assert!(!request.readonly);

        assert!("/data".parse::<MountRequest>().is_err());
        assert!("/data:/srv:rx".parse::<MountRequest>().is_err());
    }

    #[test]
    fn test_propagation() {
        assert_eq!(Propagation::default(), Propagation::Private);
        assert_eq!(Propagation::HostToContainer.option(), "rslave");
        assert_eq!(
            "bidirectional".parse::<Propagation>().unwrap(),
            Propagation::Bidirectional
        );
        assert!("sideways".parse::<Propagation>().is_err());
    }
}
