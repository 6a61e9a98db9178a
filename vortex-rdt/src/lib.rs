//! RDT class management with pluggable backends
//!
//! This crate decides which RDT class (CLOS) a container joins and owns the
//! lifecycle of the system-wide RDT configuration. The kernel side is
//! reached through the [`RdtBackend`] trait, with production and mock
//! implementations.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod backend;
pub mod config;
pub mod manager;
pub mod resctrl;
pub mod resolver;

pub use backend::{MockBackend, RdtBackend};
pub use config::{KubernetesOptions, RdtConfig, ROOT_CLASS};
pub use manager::{RdtManager, RdtState};
pub use resctrl::ResctrlBackend;
pub use resolver::{ClassResolver, ClassSource, resolve};
