use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing::{info, warn};

use crate::config::MinifyLevel;
use crate::core::{discover_projects, BuildOptions, Engine, ProjectOutcome};

#[derive(Parser)]
#[command(name = "scriptfold")]
#[command(about = "Folds a multi-file script project into one minified source file")]
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
    /// Write a starter scriptfold.toml
    Init {
        /// Target directory (defaults to current directory)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Compose projects into single scripts
    Build {
        /// Project directories
        #[arg(required = true)]
        projects: Vec<PathBuf>,

        /// Path to configuration file, used for every project
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Minification level
        #[arg(short, long, value_enum)]
        minify: Option<MinifyLevel>,

        /// Remove declarations unreachable from the entry type
        #[arg(long)]
        trim: bool,

        /// Output root directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Maximum line width of minified output
        #[arg(long)]
        line_width: Option<usize>,

        /// Treat each directory as a tree and build every configured project in it
        #[arg(long)]
        all: bool,

        /// Print build reports as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Init { path } => {
                Engine::new(BuildOptions::default()).init(path).await?;
                Ok(())
            }
            Commands::Build { projects, config, minify, trim, output, line_width, all, json } => {
                let projects = if all {
                    let mut found = Vec::new();
                    for root in &projects {
                        found.extend(discover_projects(root)?);
                    }
                    if found.is_empty() {
                        bail!("no scriptfold.toml found below the given directories");
                    }
                    found
                } else {
                    projects
                };

                let engine = Engine::new(BuildOptions {
                    config_path: config,
                    minify,
                    trim,
                    output,
                    line_width,
                });

                let cancel = engine.cancel_flag();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        warn!("Interrupted, stopping after the current stage");
                        cancel.store(true, Ordering::Relaxed);
                    }
                });

                let outcomes = engine.build_all(projects).await;
                report(&outcomes, json)?;

                let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
                if failed > 0 {
                    bail!("{} of {} project(s) failed", failed, outcomes.len());
                }
                Ok(())
            }
        }
    }
}

fn report(outcomes: &[ProjectOutcome], as_json: bool) -> Result<()> {
    if as_json {
        let entries: Vec<_> = outcomes
            .iter()
            .map(|o| match &o.result {
                Ok(report) => json!({ "directory": o.directory, "status": "ok", "report": report }),
                Err(e) => json!({ "directory": o.directory, "status": "failed", "error": e.to_string() }),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for outcome in outcomes {
        match &outcome.result {
            Ok(report) => {
                info!(
                    "📦 {} -> {} ({} chars, sha256 {})",
                    report.project,
                    report.output.display(),
                    report.characters,
                    &report.sha256[..12]
                );
                for warning in &report.warnings {
                    warn!("{}", warning);
                }
            }
            Err(e) => warn!("{}: {}", outcome.directory.display(), e),
        }
    }
    Ok(())
}
