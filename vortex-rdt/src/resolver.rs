//! RDT class resolution from container and pod annotations
//!
//! The precedence is an ordered list of [`ClassSource`]s. The first source
//! that holds a value wins; later sources are never consulted.

use std::collections::HashMap;
use std::fmt;

use vortex_core::annotations::{RDT_CONTAINER, RDT_POD, rdt_pod_container_key};

use crate::config::KubernetesOptions;

/// Where a container's RDT class can come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassSource {
    /// Container annotation `io.kubernetes.cri.rdt-class`
    ContainerAnnotation,
    /// Pod annotation `rdt.resources.beta.kubernetes.io/container.<name>`
    PodContainerAnnotation,
    /// Pod annotation `rdt.resources.beta.kubernetes.io/pod`
    PodAnnotation,
}

impl ClassSource {
    /// All sources, highest precedence first
    pub const PRECEDENCE: [Self; 3] = [
        Self::ContainerAnnotation,
        Self::PodContainerAnnotation,
        Self::PodAnnotation,
    ];

    /// Whether `options` lets this source select a class
    #[must_use]
    pub const fn allowed_by(self, options: &KubernetesOptions) -> bool {
        match self {
            Self::ContainerAnnotation => !options.deny_container_annotations,
            Self::PodContainerAnnotation | Self::PodAnnotation => !options.deny_pod_annotations,
        }
    }

    /// Look the class up in this source
    #[must_use]
    pub fn lookup<'a>(
        self,
        container_name: &str,
        container_annotations: &'a HashMap<String, String>,
        pod_annotations: &'a HashMap<String, String>,
    ) -> Option<&'a str> {
        let value = match self {
            Self::ContainerAnnotation => container_annotations.get(RDT_CONTAINER),
            Self::PodContainerAnnotation => {
                pod_annotations.get(&rdt_pod_container_key(container_name))
            }
            Self::PodAnnotation => pod_annotations.get(RDT_POD),
        };
        value.map(String::as_str)
    }
}

impl fmt::Display for ClassSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContainerAnnotation => write!(f, "container annotation"),
            Self::PodContainerAnnotation => write!(f, "per-container pod annotation"),
            Self::PodAnnotation => write!(f, "pod annotation"),
        }
    }
}

/// Resolves the RDT class of a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassResolver {
    sources: Vec<ClassSource>,
}

impl Default for ClassResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassResolver {
    /// Resolver consulting every source in [`ClassSource::PRECEDENCE`] order
    #[must_use]
    pub fn new() -> Self {
        Self {
            sources: ClassSource::PRECEDENCE.to_vec(),
        }
    }

    /// Resolver honoring the deny switches of the active configuration
    #[must_use]
    pub fn from_options(options: &KubernetesOptions) -> Self {
        let sources = ClassSource::PRECEDENCE
            .into_iter()
            .filter(|source| source.allowed_by(options))
            .collect();
        Self { sources }
    }

    /// Sources consulted, highest precedence first
    #[must_use]
    pub fn sources(&self) -> &[ClassSource] {
        &self.sources
    }

    /// Resolve the class and report which source supplied it
    #[must_use]
    pub fn resolve_with_source(
        &self,
        container_name: &str,
        container_annotations: &HashMap<String, String>,
        pod_annotations: &HashMap<String, String>,
    ) -> Option<(ClassSource, String)> {
        self.sources.iter().find_map(|&source| {
            source
                .lookup(container_name, container_annotations, pod_annotations)
                .map(|class| (source, class.to_string()))
        })
    }

    /// Resolve the class, `None` meaning the container stays in the default class
    #[must_use]
    pub fn resolve(
        &self,
        container_name: &str,
        container_annotations: &HashMap<String, String>,
        pod_annotations: &HashMap<String, String>,
    ) -> Option<String> {
        self.resolve_with_source(container_name, container_annotations, pod_annotations)
            .map(|(_, class)| class)
    }
}

/// Resolve with the full precedence list
#[must_use]
pub fn resolve(
    container_name: &str,
    container_annotations: &HashMap<String, String>,
    pod_annotations: &HashMap<String, String>,
) -> Option<String> {
    ClassResolver::new().resolve(container_name, container_annotations, pod_annotations)
}
