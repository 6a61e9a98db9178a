//! `vortex rdt` subcommands

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::debug;
use vortex_core::annotations;
use vortex_rdt::{MockBackend, RdtBackend, RdtManager, RdtState, ResctrlBackend};

use crate::cli::BackendArgs;

/// Manager over the backend selected on the command line, config loaded
async fn load_manager(args: &BackendArgs) -> Result<RdtManager> {
    let backend: Arc<dyn RdtBackend> = if args.mock {
        Arc::new(MockBackend::new())
    } else {
        Arc::new(ResctrlBackend::new())
    };

    let config = args.config_path();
    let mut manager = RdtManager::with_prefix(backend, args.prefix()).await;
    manager
        .load(&config)
        .await
        .with_context(|| format!("Failed to load RDT config {}", config.display()))?;

    Ok(manager)
}

pub async fn check(args: &BackendArgs) -> Result<()> {
    let manager = load_manager(args).await?;

    match manager.state() {
        RdtState::Disabled => println!("⚠️  RDT is not available on this host"),
        RdtState::Unconfigured => println!("ℹ️  RDT enabled, no config loaded"),
        RdtState::Configured => {
            manager.apply().await.context("Failed to apply RDT config")?;
            let config = manager.config();
            println!("✅ RDT config applied ({} classes)", config.class_count());
            for class in config.class_names() {
                println!("  • {class}");
            }
        }
    }

    Ok(())
}

pub async fn resolve(
    name: &str,
    container_annotations: Vec<(String, String)>,
    pod_annotations: HashMap<String, String>,
    args: &BackendArgs,
) -> Result<()> {
    let container_annotations: HashMap<String, String> =
        container_annotations.into_iter().collect();

    // Containers may only carry annotations the runtime allows
    let allowed = annotations::filter_allowed(&container_annotations);
    let dropped = container_annotations.len() - allowed.len();
    if dropped > 0 {
        debug!(dropped, "Ignoring container annotations outside the allow-list");
    }

    let manager = load_manager(args).await?;
    let class = manager
        .container_class(name, &allowed, &pod_annotations)
        .with_context(|| format!("Cannot assign an RDT class to container {name}"))?;

    match class {
        Some(class) => println!("{class}"),
        None => println!("{}", vortex_rdt::ROOT_CLASS),
    }

    Ok(())
}
