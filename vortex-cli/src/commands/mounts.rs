//! `vortex mounts` subcommands

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::json;
use vortex_mount::{Mount, MountClassifier, MountRequest, MountTable, Spec};

fn show(value: Option<&std::path::Path>) -> String {
    value.map_or_else(|| "-".to_string(), |p| p.display().to_string())
}

fn print_mount(mount: &Mount) {
    println!(
        "  {:<16} {:<8} {} [{}]",
        mount.destination().display(),
        mount.typ().as_deref().unwrap_or("-"),
        show(mount.source().as_deref()),
        mount.options().as_deref().unwrap_or_default().join(",")
    );
}

pub fn classify(
    id: &str,
    mounts: &[String],
    prefix: Option<PathBuf>,
    reject: Vec<PathBuf>,
    json: bool,
) -> Result<()> {
    let requests = mounts
        .iter()
        .map(|m| m.parse::<MountRequest>())
        .collect::<Result<Vec<_>, _>>()
        .context("Invalid mount request")?;

    let mut classifier = MountClassifier::new().with_absent_sources_to_reject(reject);
    if let Some(prefix) = prefix {
        classifier = classifier.with_prefix(prefix);
    }

    let mut spec = Spec::default();
    let classification = classifier
        .classify(id, &requests, &mut spec)
        .context("Failed to classify mounts")?;

    if json {
        let output = json!({
            "spec": spec,
            "classification": classification,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if !id.is_empty() {
        println!("📦 Container {id}");
    }
    println!("Spec mounts:");
    spec.mount_entries().iter().for_each(print_mount);
    println!("Binds:");
    classification.binds.iter().for_each(print_mount);

    Ok(())
}
