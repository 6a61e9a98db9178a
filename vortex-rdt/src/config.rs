//! RDT configuration document
//!
//! The document layout is owned by the resource-control system. It is
//! deserialized as-is and handed to an [`RdtBackend`](crate::RdtBackend),
//! which validates it as part of applying it.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;
use vortex_core::{Error, Result};

/// Name of the class every container without an explicit class belongs to
pub const ROOT_CLASS: &str = "system/default";

/// Top-level RDT configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RdtConfig {
    /// Per-resource behavior options
    #[serde(skip_serializing_if = "Options::is_empty")]
    pub options: Options,

    /// Cache/bandwidth partitions and the classes inside them
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub partitions: BTreeMap<String, Partition>,

    /// Which annotation sources Kubernetes workloads may use
    #[serde(skip_serializing_if = "KubernetesOptions::is_default")]
    pub kubernetes: KubernetesOptions,
}

/// Per-resource options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// L2 cache allocation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub l2: Option<ResourceOptions>,
    /// L3 cache allocation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub l3: Option<ResourceOptions>,
    /// Memory bandwidth allocation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mb: Option<ResourceOptions>,
}

impl Options {
    fn is_empty(&self) -> bool {
        self.l2.is_none() && self.l3.is_none() && self.mb.is_none()
    }
}

/// Options for one resource kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceOptions {
    /// Tolerate the resource being absent on the host
    pub optional: bool,
}

/// Controls which annotations can select a class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KubernetesOptions {
    /// Ignore the pod-level class annotations
    pub deny_pod_annotations: bool,
    /// Ignore the container-level class annotation
    pub deny_container_annotations: bool,
}

impl KubernetesOptions {
    #[allow(clippy::trivially_copy_pass_by_ref)]
    fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// A slice of the cache/bandwidth shared by a set of classes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Partition {
    /// L2 share of the partition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub l2_allocation: Option<CatAllocation>,
    /// L3 share of the partition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub l3_allocation: Option<CatAllocation>,
    /// Memory bandwidth share of the partition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mb_allocation: Option<MbaAllocation>,
    /// Classes carved out of the partition
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub classes: BTreeMap<String, ClassConfig>,
}

/// Allocations of one class, relative to its partition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClassConfig {
    /// L2 share of the class
    #[serde(skip_serializing_if = "Option::is_none")]
    pub l2_allocation: Option<CatAllocation>,
    /// L3 share of the class
    #[serde(skip_serializing_if = "Option::is_none")]
    pub l3_allocation: Option<CatAllocation>,
    /// Memory bandwidth share of the class
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mb_allocation: Option<MbaAllocation>,
    /// Annotation sources allowed to select this class
    #[serde(skip_serializing_if = "KubernetesOptions::is_default")]
    pub kubernetes: KubernetesOptions,
}

/// Cache allocation, either for all cache ids or per cache id range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CatAllocation {
    /// Same allocation on every cache id
    Uniform(CacheAllocation),
    /// Keyed by `all`, `0`, `1-3`, `0,2`...
    PerCacheId(BTreeMap<String, CacheAllocation>),
}

/// A single cache allocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CacheAllocation {
    /// `60%`, `20-80%` or `0xff`
    Value(String),
    /// Code/data prioritization
    Split(CdpAllocation),
}

/// Code and data prioritized cache allocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CdpAllocation {
    /// Allocation used when CDP is not enabled
    pub unified: String,
    /// Code allocation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Data allocation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// Memory bandwidth allocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MbaAllocation {
    /// Same allocation on every cache id
    Uniform(MbaValues),
    /// Keyed by cache id range
    PerCacheId(BTreeMap<String, MbaValues>),
}

/// One or more bandwidth values (`50%`, `1000MBps`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MbaValues {
    /// Single value
    One(String),
    /// Alternatives; the system picks the one matching its unit
    Many(Vec<String>),
}

impl MbaValues {
    fn iter(&self) -> impl Iterator<Item = &str> {
        let values: &[String] = match self {
            Self::One(value) => std::slice::from_ref(value),
            Self::Many(values) => values,
        };
        values.iter().map(String::as_str)
    }
}

impl RdtConfig {
    /// Parse a YAML document
    ///
    /// An empty document is the empty configuration. Unknown keys are
    /// skipped and logged.
    pub fn from_yaml_slice(data: &[u8]) -> std::result::Result<Self, serde_yaml::Error> {
        let (config, ignored) = Self::parse_with_unknown_keys(data)?;
        if !ignored.is_empty() {
            debug!(keys = ?ignored, "Ignoring unknown RDT config keys");
        }
        Ok(config)
    }

    /// Parse, also returning the dotted paths of the keys that were skipped
    fn parse_with_unknown_keys(
        data: &[u8],
    ) -> std::result::Result<(Self, Vec<String>), serde_yaml::Error> {
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok((Self::default(), Vec::new()));
        }

        let mut ignored = Vec::new();
        let config = serde_ignored::deserialize(serde_yaml::Deserializer::from_slice(data), |path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    /// Look up a class by name
    #[must_use]
    pub fn class(&self, name: &str) -> Option<&ClassConfig> {
        self.partitions
            .values()
            .find_map(|partition| partition.classes.get(name))
    }

    /// Check whether `name` is a class containers can be placed into
    ///
    /// The root class always exists.
    #[must_use]
    pub fn has_class(&self, name: &str) -> bool {
        name == ROOT_CLASS || self.class(name).is_some()
    }

    /// Names of all configured classes, in partition order
    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.partitions
            .values()
            .flat_map(|partition| partition.classes.keys().map(String::as_str))
    }

    /// Number of configured classes
    #[must_use]
    pub fn class_count(&self) -> usize {
        self.partitions.values().map(|p| p.classes.len()).sum()
    }

    /// Validate the configuration the way the kernel interface would
    ///
    /// # Errors
    /// Returns [`Error::Apply`] describing the first violation found
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        let mut l2_total = 0;
        let mut l3_total = 0;

        for (partition_name, partition) in &self.partitions {
            if partition_name.is_empty() {
                return Err(Error::apply("partition name cannot be empty"));
            }
            let ctx = format!("partition {partition_name:?}");

            if let Some(alloc) = &partition.l2_allocation {
                validate_cat(alloc, &ctx)?;
                l2_total += alloc.uniform_share();
            }
            if let Some(alloc) = &partition.l3_allocation {
                validate_cat(alloc, &ctx)?;
                l3_total += alloc.uniform_share();
            }
            if let Some(alloc) = &partition.mb_allocation {
                validate_mba(alloc, &ctx)?;
            }

            for (class_name, class) in &partition.classes {
                validate_class_name(class_name)?;
                if !seen.insert(class_name.as_str()) {
                    return Err(Error::apply(format!(
                        "class {class_name:?} defined more than once"
                    )));
                }

                let ctx = format!("class {class_name:?}");
                if let Some(alloc) = &class.l2_allocation {
                    validate_cat(alloc, &ctx)?;
                }
                if let Some(alloc) = &class.l3_allocation {
                    validate_cat(alloc, &ctx)?;
                }
                if let Some(alloc) = &class.mb_allocation {
                    validate_mba(alloc, &ctx)?;
                }
            }
        }

        if l2_total > 100 {
            return Err(Error::apply(format!(
                "partitions request {l2_total}% of L2 cache"
            )));
        }
        if l3_total > 100 {
            return Err(Error::apply(format!(
                "partitions request {l3_total}% of L3 cache"
            )));
        }

        Ok(())
    }
}

impl CatAllocation {
    /// Percentage of the whole cache claimed on all ids, 0 if not expressed that way
    fn uniform_share(&self) -> u32 {
        let alloc = match self {
            Self::Uniform(alloc) => alloc,
            Self::PerCacheId(map) => match map.get("all") {
                Some(alloc) => alloc,
                None => return 0,
            },
        };
        let value = match alloc {
            CacheAllocation::Value(value) => value,
            CacheAllocation::Split(split) => &split.unified,
        };
        match parse_percentage(value) {
            Ok(Some((low, high))) if low == high => high,
            Ok(Some((low, high))) => high - low,
            _ => 0,
        }
    }
}

fn validate_class_name(name: &str) -> Result<()> {
    if name == ROOT_CLASS {
        return Ok(());
    }
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(Error::apply(format!("invalid class name {name:?}")));
    }
    Ok(())
}

fn validate_cat(alloc: &CatAllocation, ctx: &str) -> Result<()> {
    match alloc {
        CatAllocation::Uniform(value) => validate_cache_allocation(value, ctx),
        CatAllocation::PerCacheId(map) => {
            for (ids, value) in map {
                validate_cache_ids(ids, ctx)?;
                validate_cache_allocation(value, ctx)?;
            }
            Ok(())
        }
    }
}

fn validate_cache_allocation(alloc: &CacheAllocation, ctx: &str) -> Result<()> {
    match alloc {
        CacheAllocation::Value(value) => validate_cache_value(value, ctx),
        CacheAllocation::Split(split) => {
            validate_cache_value(&split.unified, ctx)?;
            for value in [&split.code, &split.data].into_iter().flatten() {
                validate_cache_value(value, ctx)?;
            }
            Ok(())
        }
    }
}

fn validate_cache_value(value: &str, ctx: &str) -> Result<()> {
    if let Some(hex) = value.strip_prefix("0x") {
        return match u64::from_str_radix(hex, 16) {
            Ok(0) => Err(Error::apply(format!("{ctx}: empty cache bitmask {value:?}"))),
            Ok(_) => Ok(()),
            Err(e) => Err(Error::apply(format!(
                "{ctx}: invalid cache bitmask {value:?}: {e}"
            ))),
        };
    }

    match parse_percentage(value) {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(Error::apply(format!(
            "{ctx}: cache allocation {value:?} is neither a percentage nor a bitmask"
        ))),
        Err(message) => Err(Error::apply(format!("{ctx}: {message}"))),
    }
}

/// Parse `N%` or `A-B%` into an inclusive `(low, high)` range
///
/// Returns `Ok(None)` when `value` is not a percentage at all.
fn parse_percentage(value: &str) -> std::result::Result<Option<(u32, u32)>, String> {
    let Some(body) = value.strip_suffix('%') else {
        return Ok(None);
    };

    let parse = |s: &str| {
        s.trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid percentage {value:?}: {e}"))
    };

    let (low, high) = match body.split_once('-') {
        Some((low, high)) => (parse(low)?, parse(high)?),
        None => {
            let pct = parse(body)?;
            (pct, pct)
        }
    };

    if high > 100 {
        return Err(format!("percentage {value:?} exceeds 100%"));
    }
    if low > high {
        return Err(format!("percentage range {value:?} is reversed"));
    }
    Ok(Some((low, high)))
}

fn validate_cache_ids(ids: &str, ctx: &str) -> Result<()> {
    if ids == "all" {
        return Ok(());
    }

    let bad = || Error::apply(format!("{ctx}: invalid cache id list {ids:?}"));
    for part in ids.split(',') {
        let (low, high) = match part.split_once('-') {
            Some((low, high)) => (low, high),
            None => (part, part),
        };
        let low: u32 = low.trim().parse().map_err(|_| bad())?;
        let high: u32 = high.trim().parse().map_err(|_| bad())?;
        if low > high {
            return Err(bad());
        }
    }
    Ok(())
}

fn validate_mba(alloc: &MbaAllocation, ctx: &str) -> Result<()> {
    match alloc {
        MbaAllocation::Uniform(values) => validate_mba_values(values, ctx),
        MbaAllocation::PerCacheId(map) => {
            for (ids, values) in map {
                validate_cache_ids(ids, ctx)?;
                validate_mba_values(values, ctx)?;
            }
            Ok(())
        }
    }
}

fn validate_mba_values(values: &MbaValues, ctx: &str) -> Result<()> {
    let mut any = false;
    for value in values.iter() {
        any = true;
        if let Some(mbps) = value.strip_suffix("MBps") {
            if mbps.trim().parse::<u64>().is_err() {
                return Err(Error::apply(format!(
                    "{ctx}: invalid bandwidth {value:?}"
                )));
            }
            continue;
        }
        match value
            .strip_suffix('%')
            .map(|pct| pct.trim().parse::<u32>())
        {
            Some(Ok(pct)) if pct <= 100 => {}
            _ => {
                return Err(Error::apply(format!(
                    "{ctx}: invalid bandwidth {value:?}"
                )));
            }
        }
    }

    if any {
        Ok(())
    } else {
        Err(Error::apply(format!("{ctx}: empty bandwidth allocation")))
    }
}
