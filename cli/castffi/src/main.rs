//! castffi CLI: extract platform-annotated ASTs from C headers.

mod commands;
mod config;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "castffi", version, about = "Cross-platform C header AST extraction")]
struct Cli {
    /// Log pipeline progress (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract and merge the AST for every configured platform
    Extract {
        /// Configuration file
        #[arg(long, default_value = "castffi.toml")]
        config: PathBuf,
        /// Directory holding one `<triple>.json` cursor dump per platform
        /// (default: `cursors/` next to the configuration file)
        #[arg(long)]
        cursors: Option<PathBuf>,
        /// Write the merged tree here instead of `[output] file`
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Summarize an extracted AST file
    Inspect {
        /// AST JSON file
        file: PathBuf,
        /// Only show declarations present on this target triple
        #[arg(long)]
        platform: Option<String>,
    },
    /// Describe the C ABI model of a target triple
    Platform {
        /// Target triple (e.g., x86_64-unknown-linux-gnu)
        triple: String,
        /// Output format (text, toml)
        #[arg(long)]
        format: Option<String>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = run(cli);
    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Extract {
            config,
            cursors,
            output,
        } => commands::extract::run(&config, cursors.as_deref(), output.as_deref()),

        Commands::Inspect { file, platform } => commands::inspect::run(&file, platform.as_deref()),

        Commands::Platform { triple, format } => {
            commands::platform::run(&triple, format.as_deref())
        }
    }
}
