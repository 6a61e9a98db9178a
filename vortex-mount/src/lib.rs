//! Mount classification for container creation
//!
//! This crate decides how the host paths a workload requests are mounted:
//! - Ordinary paths are declared in the OCI spec mount list
//! - Kernel-exposed paths (`/dev`, `/sys`, `/proc`) become explicit binds
//!   that replace the spec's generated entries

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod classifier;
pub mod request;
pub mod spec;

pub use classifier::{Bind, Classification, MountClassifier, SPECIAL_PATHS, is_special_path};
pub use oci_spec::runtime::{Mount, Spec};
pub use request::{ContainerVolume, MountRequest, Propagation};
pub use spec::{MountTable, clean_path, destination_of};
