//! CLI argument definitions

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use vortex_rdt::manager::{DEFAULT_CONFIG_FILE, DEFAULT_RESCTRL_PREFIX};

#[derive(Parser)]
#[command(name = "vortex")]
#[command(about = "Vortex container isolation pipeline", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// RDT class configuration and resolution
    #[command(subcommand)]
    Rdt(RdtCommands),

    /// Mount classification
    #[command(subcommand)]
    Mounts(MountCommands),

    /// List the annotations allowed to influence the runtime
    Annotations,
}

#[derive(Subcommand)]
pub enum RdtCommands {
    /// Load, validate and apply an RDT config file
    Check {
        #[command(flatten)]
        backend: BackendArgs,
    },

    /// Resolve the RDT class of a container from its annotations
    Resolve {
        /// Container name
        #[arg(short, long)]
        name: String,

        /// Container annotation (key=value)
        #[arg(short = 'c', long = "container-annotation", value_parser = parse_key_val)]
        container_annotations: Vec<(String, String)>,

        /// Pod annotation (key=value)
        #[arg(short = 'p', long = "pod-annotation", value_parser = parse_key_val)]
        pod_annotations: Vec<(String, String)>,

        #[command(flatten)]
        backend: BackendArgs,
    },
}

#[derive(Args)]
pub struct BackendArgs {
    /// RDT config file
    #[arg(long, env = "VORTEX_RDT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Prefix for class directories under the resctrl filesystem
    #[arg(long)]
    pub prefix: Option<String>,

    /// Use an in-memory backend instead of the resctrl filesystem
    #[arg(long)]
    pub mock: bool,
}

impl BackendArgs {
    /// Config file to load, empty when none was given
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Class directory prefix
    pub fn prefix(&self) -> &str {
        self.prefix.as_deref().unwrap_or(DEFAULT_RESCTRL_PREFIX)
    }
}

#[derive(Subcommand)]
pub enum MountCommands {
    /// Classify requested mounts against a default Linux spec
    Classify {
        /// Container ID, only used to label log lines
        #[arg(short, long, default_value = "")]
        id: String,

        /// Requested mount (container:host[:ro|rw])
        #[arg(short, long = "mount", required = true)]
        mounts: Vec<String>,

        /// Resolve host paths under this directory
        #[arg(long)]
        prefix: Option<PathBuf>,

        /// Host path that must already exist
        #[arg(long)]
        reject: Vec<PathBuf>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid key=value: no `=` found in `{s}`"))?;
    Ok((key.to_string(), value.to_string()))
}
