// src/core/engine.rs
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::config::{Config, MinifyLevel};
use crate::error::{ScriptfoldError, Result};
use super::composer::ProgramComposer;
use super::parser::CSharpParser;
use super::pipeline::Pipeline;
use super::project::ScriptProject;
use super::writer::OutputWriter;

/// Command-line overrides applied on top of each project's configuration
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub config_path: Option<PathBuf>,
    pub minify: Option<MinifyLevel>,
    pub trim: bool,
    pub output: Option<PathBuf>,
    pub line_width: Option<usize>,
}

impl BuildOptions {
    fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(level) = self.minify {
            config.minify.level = level;
        }
        if self.trim {
            config.minify.trim_types = true;
        }
        if let Some(output) = &self.output {
            config.project.output_path = output.clone();
        }
        if let Some(width) = self.line_width {
            config.minify.line_width = width;
        }
        config.validate()
    }
}

/// Summary of one successful project build
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub project: String,
    pub output: PathBuf,
    pub characters: usize,
    pub sha256: String,
    pub minify_level: MinifyLevel,
    pub trimmed: bool,
    pub hooks: Vec<String>,
    pub thumbnail: Option<PathBuf>,
    pub warnings: Vec<String>,
}

/// Result of one project, successful or not
#[derive(Debug)]
pub struct ProjectOutcome {
    pub directory: PathBuf,
    pub result: Result<BuildReport>,
}

/// Main orchestration engine: builds projects concurrently, each on its
/// own blocking worker
pub struct Engine {
    options: BuildOptions,
    cancel: Arc<AtomicBool>,
}

impl Engine {
    pub fn new(options: BuildOptions) -> Self {
        Self {
            options,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Setting this flag stops every running build at its next stage
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Build all projects; one failure never stops the others
    pub async fn build_all(&self, projects: Vec<PathBuf>) -> Vec<ProjectOutcome> {
        info!("🚀 Building {} project(s)", projects.len());

        let mut workers = JoinSet::new();
        for (index, directory) in projects.iter().cloned().enumerate() {
            let options = self.options.clone();
            let cancel = self.cancel.clone();
            workers.spawn_blocking(move || {
                let result = build_project(&directory, &options, cancel);
                (index, result)
            });
        }

        let mut results: Vec<Option<Result<BuildReport>>> = projects.iter().map(|_| None).collect();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((index, result)) => results[index] = Some(result),
                Err(e) => error!("Build worker failed: {}", e),
            }
        }

        projects
            .into_iter()
            .zip(results)
            .map(|(directory, result)| {
                let result = result.unwrap_or_else(|| {
                    Err(ScriptfoldError::FileSystem(format!(
                        "build worker for {} stopped unexpectedly",
                        directory.display()
                    )))
                });
                if let Err(e) = &result {
                    error!("❌ {}: {}", directory.display(), e);
                }
                ProjectOutcome { directory, result }
            })
            .collect()
    }

    /// Write a starter configuration into a project directory
    pub async fn init(&self, path: Option<PathBuf>) -> Result<PathBuf> {
        let target_dir = match path {
            Some(p) => p,
            None => std::env::current_dir().map_err(|e| ScriptfoldError::io(".", e))?,
        };
        info!("Initializing scriptfold in: {}", target_dir.display());

        let config_path = target_dir.join(Config::FILE_NAME);
        if config_path.exists() {
            return Err(ScriptfoldError::Config(format!(
                "{} already exists",
                config_path.display()
            )));
        }

        std::fs::create_dir_all(&target_dir).map_err(|e| ScriptfoldError::io(&target_dir, e))?;
        let config = Config::load_or_default(None, &target_dir)?;
        config.save(&config_path)?;
        info!("✅ Wrote {}", config_path.display());
        Ok(config_path)
    }
}

/// Compose, transform and write one project
pub fn build_project(directory: &Path, options: &BuildOptions, cancel: Arc<AtomicBool>) -> Result<BuildReport> {
    let mut project = ScriptProject::open(directory, options.config_path.as_deref())?;
    options.apply(&mut project.config)?;
    let config = Arc::new(project.config.clone());
    debug!("Configuration for {}: {:?}", project.name(), config);

    let units = project.load_units()?;
    info!("📂 {}: {} source files", project.name(), units.len());

    let mut parser = CSharpParser::new()?;
    let composition = ProgramComposer::new(config.clone())
        .compose(&units, &mut parser)
        .map_err(|e| e.in_stage("composition"))?;

    let hooks: Vec<String> = composition.hooks().iter().cloned().collect();
    let pipeline = Pipeline::for_config(&config.minify).with_cancel_flag(cancel);
    debug!("Stages for {}: {:?}", project.name(), pipeline.stage_names());
    let result = pipeline.run(composition, &mut parser)?;

    let written = OutputWriter::write(result.text(), &project.output_file(), &project.root)
        .map_err(|e| e.in_stage("output"))?;

    info!("✅ {} built: {} characters", project.name(), written.characters);
    Ok(BuildReport {
        project: project.name().to_string(),
        output: written.path,
        characters: written.characters,
        sha256: written.sha256,
        minify_level: config.minify.level,
        trimmed: config.minify.trim_types,
        hooks,
        thumbnail: written.thumbnail,
        warnings: written.warnings,
    })
}
