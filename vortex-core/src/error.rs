//! Error types for Vortex

use std::path::PathBuf;

use thiserror::Error;

/// Vortex error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The resource-control capability is not available on this system
    #[error("Resource control unavailable: {reason}")]
    CapabilityUnavailable {
        /// Why the probe failed
        reason: String,
    },

    /// A file operation failed
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// Path the operation was on
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A configuration document is malformed
    #[error("Parsing RDT config {} failed: {source}", path.display())]
    Parse {
        /// Path of the document
        path: PathBuf,
        /// Underlying deserialization error
        #[source]
        source: serde_yaml::Error,
    },

    /// The system rejected a configuration
    #[error("Configuring RDT failed: {message}")]
    Apply {
        /// Error message
        message: String,
    },

    /// A mount request is malformed
    #[error("Invalid mount: {message}")]
    InvalidMount {
        /// Error message
        message: String,
    },

    /// A class was requested while RDT is disabled
    #[error("RDT disabled, refusing to set RDT class of container {container:?} to {class:?}")]
    RdtDisabled {
        /// Container name
        container: String,
        /// Requested class
        class: String,
    },

    /// A class is not part of the active configuration
    #[error("Unknown RDT class {class:?}")]
    UnknownClass {
        /// Requested class
        class: String,
    },

    /// A class exists but may not be selected from where it was requested
    #[error("RDT class {class:?} cannot be set from {origin}")]
    ClassNotAllowed {
        /// Requested class
        class: String,
        /// Annotation source the class came from
        origin: String,
    },
}

impl Error {
    /// Build an [`Error::Apply`] from anything printable
    #[must_use]
    pub fn apply(message: impl Into<String>) -> Self {
        Self::Apply {
            message: message.into(),
        }
    }

    /// Build an [`Error::InvalidMount`] from anything printable
    #[must_use]
    pub fn invalid_mount(message: impl Into<String>) -> Self {
        Self::InvalidMount {
            message: message.into(),
        }
    }
}

/// Result type alias for Vortex operations
pub type Result<T> = std::result::Result<T, Error>;
