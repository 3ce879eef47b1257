//! Configuration sourced from the CLI. The commands are thin shells over
//! [`crate::controller::Controller`].

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "lode", version, about = "Workspace and dependency resolver for a schema registry")]
pub struct Cli {
    /// Workspace root directory
    #[arg(long, global = true, default_value = ".")]
    pub dir: PathBuf,

    /// Sub-directory within the workspace to target
    #[arg(long, global = true, default_value = "")]
    pub path: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve configured dependencies and rewrite the lock file
    Update {
        /// Restrict the update to the named dependencies (not implemented)
        #[arg(long)]
        only: Vec<String>,
    },

    /// Drop lock entries that are no longer configured
    Prune,

    /// Print the dependency graph of the target modules
    Deps,

    /// Resolve a ref to a pinned key
    Resolve {
        /// `registry/owner/name[:ref]`
        reference: String,

        /// Digest type to resolve at
        #[arg(long, default_value = "b5")]
        digest_type: String,
    },

    /// Upload a plugin, policy, or module
    Push {
        /// `registry/owner/name` of the entity
        reference: String,

        /// Wasm binary to push as a plugin
        #[arg(long)]
        binary: Option<PathBuf>,

        /// Policy document to push
        #[arg(long)]
        policy: Option<PathBuf>,

        /// Labels to attach to the new commit; may repeat
        #[arg(long = "label")]
        labels: Vec<String>,

        /// Create the entity first when it does not exist
        #[arg(long)]
        create: bool,

        /// Visibility used with --create
        #[arg(long, default_value = "private")]
        create_visibility: String,

        /// VCS link to embed in the upload metadata
        #[arg(long)]
        source_control_url: Option<String>,
    },
}
