//! Replay a session script and print the declarations each step produced
//!
//! Run with: cargo run --bin markergen -- run session.json

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use schema_markers::script::Script;
use schema_markers::SessionConfig;

#[derive(Parser)]
#[command(name = "markergen")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a script against a fresh session
    Run {
        #[arg(value_name = "SCRIPT")]
        script: PathBuf,

        /// Session config file; overrides the script's own config
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,

        /// Also list every marker in the registry once the script is done
        #[arg(long)]
        registry: bool,
    },
    /// Parse a script without running it
    Check {
        #[arg(value_name = "SCRIPT")]
        script: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            script,
            config,
            format,
            registry,
        } => {
            let mut parsed = Script::load(&script)
                .with_context(|| format!("Failed to load {}", script.display()))?;
            if let Some(path) = config {
                let config = SessionConfig::load(&path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?;
                parsed.config = Some(config);
            }

            let mut session = parsed.session()?;
            log::info!("running {} steps in session {}", parsed.steps.len(), session.id());
            let outcomes = parsed.run(&mut session)?;

            match format {
                Format::Text => {
                    for outcome in &outcomes {
                        println!("// step {}: {}", outcome.step, outcome.description);
                        if !outcome.result.is_empty() {
                            println!("{}", outcome.result.code());
                        }
                    }
                    if registry {
                        println!("// registry");
                        for marker in session.registry().markers() {
                            println!(
                                "// {} {:?} {} bases={:?}",
                                marker.qualified_name, marker.origin, marker.schema, marker.bases
                            );
                        }
                    }
                }
                Format::Json => {
                    let registry_dump = registry.then(|| session.registry().markers().collect::<Vec<_>>());
                    let output = serde_json::json!({
                        "session": session.id(),
                        "steps": outcomes,
                        "registry": registry_dump,
                    });
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
            }
        }
        Command::Check { script } => {
            let parsed = Script::load(&script)
                .with_context(|| format!("Failed to load {}", script.display()))?;
            parsed.session()?;
            println!(
                "{}: {} markers, {} steps",
                script.display(),
                parsed.markers.len(),
                parsed.steps.len()
            );
        }
    }

    Ok(())
}
