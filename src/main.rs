//! Stackplan - declarative cloud stacks from the command line
//!
//! This is the main entry point for the Stackplan CLI.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use stackplan::manifest::StackManifest;
use stackplan::prelude::*;

/// Application version information
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "stackplan", version = VERSION, about = "Typed cloud stack declarations")]
struct Cli {
    /// Increase output verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and validate a stack manifest without realizing it
    Validate {
        /// Path to the YAML manifest
        manifest: PathBuf,
    },
    /// Print the reference graph of a manifest in Graphviz DOT format
    Graph {
        /// Path to the YAML manifest
        manifest: PathBuf,
    },
    /// Realize a manifest against the simulated provider and print outputs
    Preview {
        /// Path to the YAML manifest
        manifest: PathBuf,
        /// Print every resolved entity, not just the declared outputs
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {}", "error:".red().bold(), err);
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Validate { manifest } => {
            let stack = StackManifest::from_path(&manifest)?.lower()?;
            println!(
                "{} stack '{}' is valid: {} entities, {} outputs",
                "ok:".green().bold(),
                stack.name(),
                stack.entity_count(),
                stack.outputs().len()
            );
            Ok(())
        }
        Commands::Graph { manifest } => {
            let stack = StackManifest::from_path(&manifest)?.lower()?;
            println!("{}", stack.to_dot());
            Ok(())
        }
        Commands::Preview { manifest, all } => {
            let stack = StackManifest::from_path(&manifest)?.lower()?;
            let provider = seeded_provider(&stack);
            let realized = Realizer::new(&provider).realize(&stack).await?;

            if all {
                for id in stack.realization_order()? {
                    if let Some(attrs) = realized.resolved(&id) {
                        println!("{}", id.bold());
                        for (key, value) in attrs.iter() {
                            println!("  {key}: {value}");
                        }
                    }
                }
            }

            println!("{}", "outputs:".bold());
            for (name, value) in realized.outputs() {
                println!("  {}: {}", name.green(), value);
            }
            Ok(())
        }
    }
}

/// Builds a simulated provider that can satisfy every image query the
/// stack will make, by publishing one image per distinct selector.
fn seeded_provider(stack: &Stack) -> SimulatedProvider {
    let provider = SimulatedProvider::new();
    let mut seeded = Vec::new();
    for entity in stack.entities() {
        if let stackplan::stack::Entity::Instance(spec) = entity {
            if seeded.contains(&spec.image) {
                continue;
            }
            let name = spec.image.name_pattern.replace('*', "2024.03.0.x86_64-gp2");
            provider.publish_image(&name, &spec.image.owner);
            seeded.push(spec.image.clone());
        }
    }
    provider
}

/// Initialize logging based on verbosity level
fn init_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(verbosity >= 3))
        .with(env_filter)
        .init();
}
