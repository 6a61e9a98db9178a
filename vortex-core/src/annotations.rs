//! Annotations understood by the runtime
//!
//! Keys are a stable wire contract with the orchestrator. Only keys in
//! [`ALL_ALLOWED`] may flow from request metadata into runtime behavior;
//! anything else is ignored.

use std::collections::HashMap;

/// User namespace mode to use
pub const USERNS_MODE: &str = "io.kubernetes.cri-o.userns-mode";

/// Unified configuration for cgroup v2
pub const UNIFIED_CGROUP: &str = "io.kubernetes.cri-o.UnifiedCgroup";

/// Marks a container the runtime spoofed
pub const SPOOFED_CONTAINER: &str = "io.kubernetes.cri-o.Spoofed";

/// Custom `/dev/shm` size
pub const SHM_SIZE: &str = "io.kubernetes.cri-o.ShmSize";

/// Devices to give to the container
pub const DEVICES: &str = "io.kubernetes.cri-o.Devices";

/// Disable load balancing for the CPUs used by the container
pub const CPU_LOAD_BALANCING: &str = "cpu-load-balancing.crio.io";

/// Disable CPU quota for the CPUs used by the container
pub const CPU_QUOTA: &str = "cpu-quota.crio.io";

/// Disable IRQ load balancing for the CPUs used by the container
pub const IRQ_LOAD_BALANCING: &str = "irq-load-balancing.crio.io";

/// Used by the OCI seccomp BPF hook to trace container syscalls
pub const OCI_SECCOMP_BPF_HOOK: &str = "io.containers.trace-syscall";

/// Container-level annotation selecting the RDT class (CLOS) of the container
pub const RDT_CONTAINER: &str = "io.kubernetes.cri.rdt-class";

/// Pod annotation selecting the RDT class of every container in the pod
pub const RDT_POD: &str = "rdt.resources.beta.kubernetes.io/pod";

/// Prefix of the per-container pod annotation selecting one container's RDT class
pub const RDT_POD_CONTAINER_PREFIX: &str = "rdt.resources.beta.kubernetes.io/container.";

/// Annotations allowed to influence runtime behavior
pub const ALL_ALLOWED: &[&str] = &[
    USERNS_MODE,
    UNIFIED_CGROUP,
    SHM_SIZE,
    DEVICES,
    CPU_LOAD_BALANCING,
    CPU_QUOTA,
    IRQ_LOAD_BALANCING,
    OCI_SECCOMP_BPF_HOOK,
    RDT_CONTAINER,
];

/// Check whether `key` is in the allow-list
#[must_use]
pub fn is_allowed(key: &str) -> bool {
    ALL_ALLOWED.contains(&key)
}

/// Copy of `annotations` restricted to allowed keys
///
/// Unrecognized keys are dropped, never reported.
#[must_use]
pub fn filter_allowed(annotations: &HashMap<String, String>) -> HashMap<String, String> {
    annotations
        .iter()
        .filter(|(key, _)| is_allowed(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Pod annotation key carrying the RDT class of `container_name`
#[must_use]
pub fn rdt_pod_container_key(container_name: &str) -> String {
    format!("{RDT_POD_CONTAINER_PREFIX}{container_name}")
}
