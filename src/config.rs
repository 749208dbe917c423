use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ScriptfoldError, Result};

/// Synthetic names are drawn from these characters, shortest first
pub const DEFAULT_RENAME_ALPHABET: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Graduated minification intensity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MinifyLevel {
    /// Emit the composed script as written
    #[default]
    None,
    /// Drop comments, keep layout
    StripComments,
    /// Strip modifiers, comments and whitespace, then re-wrap lines
    Lite,
    /// Everything in `Lite` plus symbol renaming
    Full,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Minification settings
    pub minify: MinifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Project name, used for the output folder
    pub name: String,

    /// Name of the type the host runtime instantiates
    pub entry_type: String,

    /// Canonical file stem that holds the entry type
    pub entry_file: String,

    /// Member names the host runtime invokes on the entry type
    pub hooks: Vec<String>,

    /// Hooks the entry type must declare for the script to run
    pub required_hooks: Vec<String>,

    /// Namespace to wrap the composed declarations in
    pub namespace: Option<String>,

    /// Root directory the composed script is written under
    pub output_path: PathBuf,

    /// Files (relative to the project) left out of composition
    pub ignored_files: Vec<PathBuf>,

    /// Folders (relative to the project) left out of composition
    pub ignored_folders: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MinifyConfig {
    /// Minification level
    pub level: MinifyLevel,

    /// Remove declarations unreachable from the entry type
    pub trim_types: bool,

    /// Maximum output line width for wrapped output
    pub line_width: usize,

    /// Names that must never be renamed or trimmed
    pub preserve_names: Vec<String>,

    /// Characters synthetic names are built from
    pub rename_alphabet: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "Script".to_string(),
            entry_type: "Program".to_string(),
            entry_file: "Program".to_string(),
            hooks: vec!["Program".to_string(), "Main".to_string(), "Save".to_string()],
            required_hooks: vec!["Main".to_string()],
            namespace: None,
            output_path: PathBuf::from("dist"),
            ignored_files: vec![],
            ignored_folders: vec![PathBuf::from("bin"), PathBuf::from("obj")],
        }
    }
}

impl Default for MinifyConfig {
    fn default() -> Self {
        Self {
            level: MinifyLevel::None,
            trim_types: false,
            line_width: 120,
            preserve_names: vec![],
            rename_alphabet: DEFAULT_RENAME_ALPHABET.to_string(),
        }
    }
}

impl Config {
    /// Config file looked up inside a project directory
    pub const FILE_NAME: &'static str = "scriptfold.toml";

    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ScriptfoldError::io(path, e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| ScriptfoldError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| ScriptfoldError::Config(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ScriptfoldError::io(path, e))?;
        Ok(())
    }

    /// Load configuration with fallback to default
    ///
    /// An explicit path must exist. Without one, the project directory is
    /// searched for `scriptfold.toml` and the project name defaults to the
    /// directory name.
    pub fn load_or_default(path: Option<&Path>, project_dir: &Path) -> Result<Self> {
        if let Some(p) = path {
            return Self::load(p);
        }

        let candidate = project_dir.join(Self::FILE_NAME);
        if candidate.exists() {
            return Self::load(candidate);
        }

        let mut config = Self::default();
        if let Some(dir_name) = project_dir.file_name().and_then(|n| n.to_str()) {
            config.project.name = dir_name.to_string();
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.project.entry_type.trim().is_empty() {
            return Err(ScriptfoldError::Config("project.entry_type must not be empty".to_string()));
        }
        if let Some(hook) = self.project.required_hooks.iter().find(|h| !self.project.hooks.contains(h)) {
            return Err(ScriptfoldError::Config(format!(
                "required hook `{}` is not listed in project.hooks",
                hook
            )));
        }
        if self.minify.line_width < 20 {
            return Err(ScriptfoldError::Config(format!(
                "minify.line_width {} is too small (minimum 20)",
                self.minify.line_width
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(Config::FILE_NAME);

        let mut config = Config::default();
        config.minify.level = MinifyLevel::StripComments;
        config.project.namespace = Some("IngameScript".to_string());
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.minify.level, MinifyLevel::StripComments);
        assert_eq!(loaded.project.namespace.as_deref(), Some("IngameScript"));
        assert!(std::fs::read_to_string(&path).unwrap().contains("strip-comments"));
    }

    #[test]
    fn test_default_takes_project_dir_name() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("AirlockController");
        std::fs::create_dir(&project).unwrap();

        let config = Config::load_or_default(None, &project).unwrap();
        assert_eq!(config.project.name, "AirlockController");
        assert_eq!(config.minify.line_width, 120);
    }

    #[test]
    fn test_partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(Config::FILE_NAME);
        std::fs::write(&path, "[minify]\nlevel = \"full\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.minify.level, MinifyLevel::Full);
        assert_eq!(config.project.entry_type, "Program");
        assert_eq!(config.minify.line_width, 120);
    }

    #[test]
    fn test_required_hooks_must_be_hooks() {
        let mut config = Config::default();
        assert_eq!(config.project.required_hooks, vec!["Main"]);
        config.project.required_hooks.push("Tick".to_string());
        assert!(matches!(config.validate(), Err(ScriptfoldError::Config(m)) if m.contains("Tick")));
    }

    #[test]
    fn test_rejects_tiny_line_width() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(Config::FILE_NAME);
        let mut config = Config::default();
        config.minify.line_width = 4;
        config.save(&path).unwrap();

        assert!(matches!(Config::load(&path), Err(ScriptfoldError::Config(_))));
    }
}
