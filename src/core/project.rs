// src/core/project.rs
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{ScriptfoldError, Result};
use super::classifier::SourceUnit;

/// Build output folders never hold project sources
const ALWAYS_IGNORED: &[&str] = &["bin", "obj"];

/// A script project on disk together with its configuration
#[derive(Debug, Clone)]
pub struct ScriptProject {
    pub root: PathBuf,
    pub config: Config,
}

impl ScriptProject {
    pub fn open(root: &Path, config_path: Option<&Path>) -> Result<Self> {
        if !root.is_dir() {
            return Err(ScriptfoldError::FileSystem(format!(
                "project directory {} does not exist",
                root.display()
            )));
        }
        let config = Config::load_or_default(config_path, root)?;
        Ok(Self {
            root: root.to_path_buf(),
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.project.name
    }

    /// Read every C# source of the project, in path order
    pub fn load_units(&self) -> Result<Vec<SourceUnit>> {
        let walker = WalkBuilder::new(&self.root)
            .hidden(false)
            .git_ignore(true)
            .sort_by_file_path(|a, b| a.cmp(b))
            .build();

        let mut units = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| ScriptfoldError::FileSystem(e.to_string()))?;
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("cs") {
                continue;
            }

            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            if self.is_ignored(relative) || path.starts_with(self.output_root()) {
                debug!("Skipping ignored source {}", relative.display());
                continue;
            }

            let text = std::fs::read_to_string(path).map_err(|e| ScriptfoldError::io(path, e))?;
            units.push(SourceUnit::new(relative, &text));
        }

        if units.is_empty() {
            warn!("⚠️ No C# sources found in {}", self.root.display());
        }
        Ok(units)
    }

    fn is_ignored(&self, relative: &Path) -> bool {
        let project = &self.config.project;
        let in_folder = |folder: &Path| relative.starts_with(folder);

        ALWAYS_IGNORED.iter().any(|f| in_folder(Path::new(f)))
            || project.ignored_folders.iter().any(|f| in_folder(f))
            || project.ignored_files.iter().any(|f| relative == f.as_path())
    }

    fn output_root(&self) -> PathBuf {
        let base = &self.config.project.output_path;
        if base.is_absolute() { base.clone() } else { self.root.join(base) }
    }

    /// Destination of the composed script
    pub fn output_file(&self) -> PathBuf {
        self.output_root()
            .join(self.name())
            .join(super::writer::SCRIPT_FILE_NAME)
    }
}

/// Directories below `root` that carry a `scriptfold.toml`
pub fn discover_projects(root: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| ScriptfoldError::FileSystem(e.to_string()))?;
        if entry.file_type().is_file() && entry.file_name() == Config::FILE_NAME {
            if let Some(dir) = entry.path().parent() {
                found.push(dir.to_path_buf());
            }
        }
    }
    Ok(found)
}
