//! Subcommand handlers

use crate::cli::{Commands, MountCommands, RdtCommands};
use anyhow::Result;

pub mod annotations;
pub mod mounts;
pub mod rdt;

/// Dispatch command to appropriate handler
pub async fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Rdt(RdtCommands::Check { backend }) => rdt::check(&backend).await,
        Commands::Rdt(RdtCommands::Resolve {
            name,
            container_annotations,
            pod_annotations,
            backend,
        }) => {
            rdt::resolve(
                &name,
                container_annotations,
                pod_annotations.into_iter().collect(),
                &backend,
            )
            .await
        }
        Commands::Mounts(MountCommands::Classify {
            id,
            mounts,
            prefix,
            reject,
            json,
        }) => mounts::classify(&id, &mounts, prefix, reject, json),
        Commands::Annotations => {
            annotations::list();
            Ok(())
        }
    }
}
