//! pipestack CLI tool.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "pipestack")]
#[command(about = "Declare and synthesize the delivery pipeline stack", long_about = None)]
struct Cli {
    /// Path to the stack configuration (defaults to ./pipestack.kdl when present)
    #[arg(long, global = true, env = "PIPESTACK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize the stack template
    Synth {
        /// Write `<stack>.template.json` into this directory instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Fail when the authorization audit reports gaps
        #[arg(long)]
        strict: bool,
    },
    /// Validate the configuration, synthesis and authorization
    Validate,
    /// Show resource creation order
    Graph,
    /// Report permissions each role is missing
    Audit,
    /// Walk the pipeline stages in order
    Simulate {
        /// Stage to report as failed
        #[arg(long)]
        fail: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so template output on stdout stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Synth { output, strict } => {
            commands::synth::synth(config, output.as_deref(), strict)?;
        }
        Commands::Validate => {
            commands::validate(config)?;
        }
        Commands::Graph => {
            commands::inspect::graph(config)?;
        }
        Commands::Audit => {
            commands::inspect::audit(config)?;
        }
        Commands::Simulate { fail } => {
            commands::simulate::simulate(config, fail.as_deref())?;
        }
    }

    Ok(())
}
