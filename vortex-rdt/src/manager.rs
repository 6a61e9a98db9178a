//! RDT configuration lifecycle
//!
//! The manager owns the enabled flag and the active [`RdtConfig`]. It is
//! built once per runtime and handed to whatever creates containers.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};
use vortex_core::{Error, Result};

use crate::backend::RdtBackend;
use crate::config::RdtConfig;
use crate::resolver::ClassResolver;

/// Default RDT config file path (none)
pub const DEFAULT_CONFIG_FILE: &str = "";

/// Default prefix for class directories under the resctrl filesystem
pub const DEFAULT_RESCTRL_PREFIX: &str = "";

/// Lifecycle state of an [`RdtManager`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RdtState {
    /// The probe failed at construction; permanent
    Disabled,
    /// RDT is available but no config file was loaded yet
    Unconfigured,
    /// A config file was loaded and applied
    Configured,
}

/// Owns the RDT enablement flag and the active configuration
pub struct RdtManager {
    backend: Arc<dyn RdtBackend>,
    enabled: bool,
    configured: bool,
    config: RdtConfig,
}

impl std::fmt::Debug for RdtManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RdtManager")
            .field("enabled", &self.enabled)
            .field("configured", &self.configured)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RdtManager {
    /// Probe `backend` with the default prefix
    pub async fn new(backend: Arc<dyn RdtBackend>) -> Self {
        Self::with_prefix(backend, DEFAULT_RESCTRL_PREFIX).await
    }

    /// Probe `backend`, namespacing class directories with `prefix`
    ///
    /// A failing probe disables RDT for the lifetime of the manager. This is
    /// logged, not returned: RDT is optional.
    pub async fn with_prefix(backend: Arc<dyn RdtBackend>, prefix: &str) -> Self {
        let enabled = match backend.initialize(prefix).await {
            Ok(()) => true,
            Err(e) => {
                info!("RDT is not enabled: {e}");
                false
            }
        };

        Self {
            backend,
            enabled,
            configured: false,
            config: RdtConfig::default(),
        }
    }

    /// Whether RDT is usable on this system
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> RdtState {
        match (self.enabled, self.configured) {
            (false, _) => RdtState::Disabled,
            (true, false) => RdtState::Unconfigured,
            (true, true) => RdtState::Configured,
        }
    }

    /// The active configuration, exactly as parsed
    #[must_use]
    pub const fn config(&self) -> &RdtConfig {
        &self.config
    }

    /// Load, validate and apply the config file at `path`
    ///
    /// Succeeds without doing anything when RDT is disabled or `path` is
    /// empty. On failure the previously active config stays in place.
    ///
    /// # Errors
    /// - [`Error::Io`] if the file cannot be read
    /// - [`Error::Parse`] if it is not a valid document
    /// - [`Error::Apply`] if the system rejects it
    pub async fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if !self.enabled {
            info!("RDT is disabled");
            return Ok(());
        }

        if path.as_os_str().is_empty() {
            info!("No RDT config file specified, RDT not configured");
            return Ok(());
        }

        let data = tokio::fs::read(path).await.map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let parsed = RdtConfig::from_yaml_slice(&data).map_err(|source| Error::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        self.backend.set_config(&parsed, true).await?;

        info!(
            path = %path.display(),
            classes = parsed.class_count(),
            "RDT config successfully loaded"
        );
        self.config = parsed;
        self.configured = true;

        Ok(())
    }

    /// Re-apply the active configuration to the system
    ///
    /// Before any successful [`load`](Self::load) this applies the empty
    /// configuration. No-op when RDT is disabled.
    ///
    /// # Errors
    /// Returns [`Error::Apply`] if the system rejects the configuration
    pub async fn apply(&self) -> Result<()> {
        if !self.enabled {
            debug!("RDT is disabled, nothing to apply");
            return Ok(());
        }

        self.backend.set_config(&self.config, true).await?;
        info!("RDT successfully configured");
        Ok(())
    }

    /// Check whether `class` exists in the active configuration
    #[must_use]
    pub fn has_class(&self, class: &str) -> bool {
        self.config.has_class(class)
    }

    /// Resolver restricted by the active configuration's annotation switches
    #[must_use]
    pub fn resolver(&self) -> ClassResolver {
        ClassResolver::from_options(&self.config.kubernetes)
    }

    /// Resolve the class of a container and check it can be honored
    ///
    /// `Ok(None)` means the container stays in the default class.
    ///
    /// # Errors
    /// - [`Error::RdtDisabled`] if a class is requested but RDT is disabled
    /// - [`Error::UnknownClass`] if the class is not in the active configuration
    /// - [`Error::ClassNotAllowed`] if the class denies the annotation it came from
    pub fn container_class(
        &self,
        container_name: &str,
        container_annotations: &HashMap<String, String>,
        pod_annotations: &HashMap<String, String>,
    ) -> Result<Option<String>> {
        let Some((source, class)) = self.resolver().resolve_with_source(
            container_name,
            container_annotations,
            pod_annotations,
        ) else {
            return Ok(None);
        };

        if !self.enabled {
            return Err(Error::RdtDisabled {
                container: container_name.to_string(),
                class,
            });
        }

        if !self.has_class(&class) {
            return Err(Error::UnknownClass { class });
        }

        // Classes may narrow the sources allowed to select them
        if let Some(config) = self.config.class(&class)
            && !source.allowed_by(&config.kubernetes)
        {
            return Err(Error::ClassNotAllowed {
                class,
                origin: source.to_string(),
            });
        }

        debug!(container = container_name, %class, %source, "Resolved RDT class");
        Ok(Some(class))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockBackend;

    #[tokio::test]
    async fn test_states() {
        let manager = RdtManager::new(Arc::new(MockBackend::new())).await;
        assert!(manager.enabled());
        assert_eq!(manager.state(), RdtState::Unconfigured);

        let manager = RdtManager::new(Arc::new(MockBackend::unavailable("no resctrl"))).await;
        assert!(!manager.enabled());
        assert_eq!(manager.state(), RdtState::Disabled);
    }

    #[tokio::test]
    async fn test_prefix_reaches_backend() {
        let backend = MockBackend::new();
        let _manager = RdtManager::with_prefix(Arc::new(backend.clone()), "crio-").await;
        assert_eq!(backend.prefix().await.as_deref(), Some("crio-"));
    }

    #[tokio::test]
    async fn test_empty_path_is_noop() {
        let backend = MockBackend::new();
        let mut manager = RdtManager::new(Arc::new(backend.clone())).await;

        manager.load("").await.unwrap();
        assert_eq!(manager.state(), RdtState::Unconfigured);
        assert_eq!(backend.apply_count().await, 0);
    }

    #[tokio::test]
    async fn test_disabled_load_is_noop() {
        let mut manager =
            RdtManager::new(Arc::new(MockBackend::unavailable("no resctrl"))).await;

        // Never even touches the (missing) file
        manager.load("/nonexistent/rdt.yaml").await.unwrap();
        manager.apply().await.unwrap();
        assert_eq!(manager.state(), RdtState::Disabled);
    }

    #[tokio::test]
    async fn test_apply_before_load_applies_default() {
        let backend = MockBackend::new();
        let manager = RdtManager::new(Arc::new(backend.clone())).await;

        manager.apply().await.unwrap();
        assert_eq!(backend.applied_config().await, Some(RdtConfig::default()));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let mut manager = RdtManager::new(Arc::new(MockBackend::new())).await;
        let err = manager.load("/nonexistent/rdt.yaml").await.unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
        assert_eq!(manager.state(), RdtState::Unconfigured);
    }
}
