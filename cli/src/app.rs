use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// patchscope - module container merging and hook injection
#[derive(Debug, Parser)]
#[command(name = "patchscope", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared across all subcommands.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a full two-pass patch described by a plan file.
    Patch {
        /// Path to the JSON patch plan.
        #[arg(value_name = "PLAN")]
        plan: PathBuf,
    },

    /// Display container overview: name, entry point, and counts.
    Info {
        /// Path to the module container.
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },

    /// Load a container and check its structural soundness.
    Verify {
        /// Path to the module container.
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
}
