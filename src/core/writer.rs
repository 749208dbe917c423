// src/core/writer.rs
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::error::{ScriptfoldError, Result};
use super::classifier::normalize_newlines;

pub const SCRIPT_FILE_NAME: &str = "Script.cs";
pub const THUMBNAIL_FILE_NAME: &str = "thumb.png";

/// Scripts at or above this many characters may be rejected by the host
pub const SIZE_WARNING_THRESHOLD: usize = 100_000;

/// What ended up on disk
#[derive(Debug, Clone, Serialize)]
pub struct WrittenScript {
    pub path: PathBuf,
    pub characters: usize,
    pub sha256: String,
    pub thumbnail: Option<PathBuf>,
    pub warnings: Vec<String>,
}

/// Persists a composed script and its sibling assets
pub struct OutputWriter;

impl OutputWriter {
    /// Atomically write `text` to `destination`, copying the project's
    /// thumbnail next to it when one exists
    pub fn write(text: &str, destination: &Path, project_root: &Path) -> Result<WrittenScript> {
        let text = normalize_newlines(text);
        let dir = destination.parent().ok_or_else(|| {
            ScriptfoldError::FileSystem(format!("{} has no parent directory", destination.display()))
        })?;
        std::fs::create_dir_all(dir).map_err(|e| ScriptfoldError::io(dir, e))?;

        let mut temp = NamedTempFile::new_in(dir).map_err(|e| ScriptfoldError::io(dir, e))?;
        temp.write_all(text.as_bytes())
            .map_err(|e| ScriptfoldError::io(temp.path(), e))?;
        temp.persist(destination)
            .map_err(|e| ScriptfoldError::io(destination, e.error))?;

        let characters = text.chars().count();
        let mut warnings = Vec::new();
        if characters >= SIZE_WARNING_THRESHOLD {
            let message = format!(
                "{} is {} characters, at or above the {} character limit",
                destination.display(),
                characters,
                SIZE_WARNING_THRESHOLD
            );
            warn!("⚠️ {}", message);
            warnings.push(message);
        }

        let thumbnail = Self::copy_thumbnail(project_root, dir)?;

        info!("💾 Wrote {} ({} characters)", destination.display(), characters);
        Ok(WrittenScript {
            path: destination.to_path_buf(),
            characters,
            sha256: content_hash(&text),
            thumbnail,
            warnings,
        })
    }

    fn copy_thumbnail(project_root: &Path, dir: &Path) -> Result<Option<PathBuf>> {
        let source = project_root.join(THUMBNAIL_FILE_NAME);
        if !source.is_file() {
            return Ok(None);
        }
        let target = dir.join(THUMBNAIL_FILE_NAME);
        std::fs::copy(&source, &target).map_err(|e| ScriptfoldError::io(&target, e))?;
        Ok(Some(target))
    }
}

/// Calculate SHA256 hash of content
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use predicates::prelude::*;

    #[test]
    fn test_writes_script_and_thumbnail() {
        let project = assert_fs::TempDir::new().unwrap();
        project.child(THUMBNAIL_FILE_NAME).write_binary(&[0x89, b'P', b'N', b'G']).unwrap();
        let destination = project.path().join("dist/Airlock").join(SCRIPT_FILE_NAME);

        let written = OutputWriter::write("class Program { }\r\n", &destination, project.path()).unwrap();

        project
            .child("dist/Airlock/Script.cs")
            .assert(predicate::str::diff("class Program { }\n"));
        project.child("dist/Airlock/thumb.png").assert(predicate::path::exists());
        assert_eq!(written.characters, 18);
        assert_eq!(written.sha256, content_hash("class Program { }\n"));
        assert!(written.warnings.is_empty());
    }

    #[test]
    fn test_oversized_script_warns_but_is_written() {
        let project = assert_fs::TempDir::new().unwrap();
        let destination = project.path().join("out").join(SCRIPT_FILE_NAME);
        let text = "x".repeat(SIZE_WARNING_THRESHOLD + 1);

        let written = OutputWriter::write(&text, &destination, project.path()).unwrap();

        assert_eq!(written.warnings.len(), 1);
        assert!(written.thumbnail.is_none());
        assert_eq!(std::fs::read_to_string(&destination).unwrap().len(), SIZE_WARNING_THRESHOLD + 1);
    }

    #[test]
    fn test_size_warning_starts_at_threshold() {
        let project = assert_fs::TempDir::new().unwrap();
        let destination = project.path().join("out").join(SCRIPT_FILE_NAME);

        let at_limit = "x".repeat(SIZE_WARNING_THRESHOLD);
        let written = OutputWriter::write(&at_limit, &destination, project.path()).unwrap();
        assert_eq!(written.characters, SIZE_WARNING_THRESHOLD);
        assert_eq!(written.warnings.len(), 1);

        let below = "x".repeat(SIZE_WARNING_THRESHOLD - 1);
        let written = OutputWriter::write(&below, &destination, project.path()).unwrap();
        assert!(written.warnings.is_empty());
    }

    #[test]
    fn test_size_counts_characters_not_bytes() {
        let project = assert_fs::TempDir::new().unwrap();
        let destination = project.path().join("out").join(SCRIPT_FILE_NAME);

        // two bytes per character
        let text = "é".repeat(SIZE_WARNING_THRESHOLD - 1);
        let written = OutputWriter::write(&text, &destination, project.path()).unwrap();
        assert_eq!(written.characters, SIZE_WARNING_THRESHOLD - 1);
        assert!(written.warnings.is_empty());
    }

    #[test]
    fn test_replaces_existing_output() {
        let project = assert_fs::TempDir::new().unwrap();
        project.child("out/Script.cs").write_str("old contents").unwrap();
        let destination = project.path().join("out").join(SCRIPT_FILE_NAME);

        OutputWriter::write("new", &destination, project.path()).unwrap();

        project.child("out/Script.cs").assert("new");
        // no temporary files left behind
        let entries = std::fs::read_dir(project.path().join("out")).unwrap().count();
        assert_eq!(entries, 1);
    }
}
