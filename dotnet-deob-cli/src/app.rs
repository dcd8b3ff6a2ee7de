use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use dotnet_deob::{job::DEFAULT_MAX_CONTENT_SIZE, tools::DEFAULT_TOOL_KEYS};

/// dotnet-deob - run a chain of .NET deobfuscators over an assembly
#[derive(Debug, Parser)]
#[command(name = "dotnet-deob", version, about, long_about = None)]
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

/// Where the wrapped tools and their runtimes live.
#[derive(Debug, Args)]
pub struct ToolchainArgs {
    /// Tool directory (default: `bin/` next to this executable).
    #[arg(long, value_name = "DIR", env = "DOTNET_DEOB_BIN_DIR")]
    pub bin_dir: Option<PathBuf>,

    /// Mono launcher.
    #[arg(long, value_name = "PROGRAM", default_value = "mono")]
    pub mono: PathBuf,

    /// .NET launcher.
    #[arg(long, value_name = "PROGRAM", default_value = "dotnet")]
    pub dotnet: PathBuf,

    /// Per-tool timeout in seconds.
    #[arg(long, value_name = "SECS", default_value_t = 60)]
    pub timeout: u64,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the deobfuscators over an assembly and write the result.
    Run {
        /// Path to the .NET assembly file (or directory with --recursive).
        #[arg(value_name = "FILE")]
        path: PathBuf,

        #[command(flatten)]
        toolchain: ToolchainArgs,

        /// Tools to run, in order (see `dotnet-deob tools`).
        #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_TOOL_KEYS.map(String::from))]
        tools: Vec<String>,

        /// Skip inputs larger than this many bytes.
        #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_MAX_CONTENT_SIZE)]
        max_size: u64,

        /// Process inputs of any size.
        #[arg(long, conflicts_with = "max_size")]
        no_size_limit: bool,

        /// Output file or directory.
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Output filename suffix (default: "_deobfuscated").
        #[arg(long, default_value = "_deobfuscated")]
        suffix: String,

        /// Recursively process directory for .exe/.dll files.
        #[arg(long)]
        recursive: bool,

        /// Write JSON report.
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,
    },

    /// Check whether a file is a .NET assembly without running any tool.
    Check {
        /// Path to the file.
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },

    /// List the available deobfuscators and whether they are installed.
    Tools {
        #[command(flatten)]
        toolchain: ToolchainArgs,
    },
}
