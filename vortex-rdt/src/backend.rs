//! RDT backend trait for pluggable implementations

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use vortex_core::{Error, Result};

use crate::config::RdtConfig;

/// Trait for the system-side RDT capability
///
/// This allows for different implementations:
/// - [`ResctrlBackend`](crate::ResctrlBackend) - Linux resctrl filesystem
/// - [`MockBackend`] - Testing without filesystem
///
/// # Thread Safety
/// All implementations must be `Send + Sync` for use across async tasks.
#[async_trait]
pub trait RdtBackend: Send + Sync {
    /// Probe the system and prepare the class namespace
    ///
    /// `prefix` is prepended to every class directory the backend manages.
    ///
    /// # Errors
    /// Returns [`Error::CapabilityUnavailable`] if RDT is not usable
    async fn initialize(&self, prefix: &str) -> Result<()>;

    /// Validate `config` and program it into the system
    ///
    /// With `force`, classes not present in `config` are torn down.
    ///
    /// # Errors
    /// Returns [`Error::Apply`] if the system rejects the configuration
    async fn set_config(&self, config: &RdtConfig, force: bool) -> Result<()>;
}

/// Mock backend for testing (doesn't touch filesystem)
///
/// # Example
/// ```
/// use vortex_rdt::{MockBackend, RdtBackend, RdtConfig};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let backend = MockBackend::new();
/// backend.initialize("").await.unwrap();
/// backend.set_config(&RdtConfig::default(), true).await.unwrap();
///
/// assert_eq!(backend.apply_count().await, 1);
/// # });
/// ```
#[derive(Clone)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    unavailable: Option<String>,
    reject: Option<String>,
    initialized: bool,
    prefix: Option<String>,
    applied: Option<RdtConfig>,
    apply_count: usize,
    call_count: usize,
}

impl MockBackend {
    /// Create a new mock backend on a system with RDT support
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Create a mock backend whose probe fails with `reason`
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        let state = MockState {
            unavailable: Some(reason.into()),
            ..MockState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Make every following `set_config` fail with `message` (`None` to stop)
    pub async fn set_reject(&self, message: Option<String>) {
        self.state.lock().await.reject = message;
    }

    /// Get the number of backend calls made (for testing)
    pub async fn call_count(&self) -> usize {
        self.state.lock().await.call_count
    }

    /// Get the number of configurations successfully applied
    pub async fn apply_count(&self) -> usize {
        self.state.lock().await.apply_count
    }

    /// Get the last configuration successfully applied
    pub async fn applied_config(&self) -> Option<RdtConfig> {
        self.state.lock().await.applied.clone()
    }

    /// Get the prefix passed to `initialize`
    pub async fn prefix(&self) -> Option<String> {
        self.state.lock().await.prefix.clone()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBackend").finish_non_exhaustive()
    }
}

#[async_trait]
impl RdtBackend for MockBackend {
    async fn initialize(&self, prefix: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.call_count += 1;

        if let Some(reason) = &state.unavailable {
            return Err(Error::CapabilityUnavailable {
                reason: reason.clone(),
            });
        }

        state.initialized = true;
        state.prefix = Some(prefix.to_string());

        tracing::debug!(prefix, "Mock: Initialized RDT");

        Ok(())
    }

    async fn set_config(&self, config: &RdtConfig, force: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        state.call_count += 1;

        if !state.initialized {
            return Err(Error::apply("RDT not initialized"));
        }
        if let Some(message) = &state.reject {
            return Err(Error::apply(message.clone()));
        }
        config.validate()?;

        // Each apply replaces the previous one wholesale
        state.applied = Some(config.clone());
        state.apply_count += 1;

        tracing::debug!(
            classes = config.class_count(),
            force,
            "Mock: Applied RDT config"
        );

        Ok(())
    }
}
