use std::path::PathBuf;
use thiserror::Error;

/// Main error type for scriptfold operations
#[derive(Error, Debug)]
pub enum ScriptfoldError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parser error: {0}")]
    Parser(String),

    #[error("Cannot classify {file}: {message}")]
    Classification { file: String, message: String },

    #[error("Composition invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Type trimming did not converge after {iterations} passes")]
    TrimmerCycle { iterations: usize },

    #[error("Symbol renaming failed: {0}")]
    RenameCollision(String),

    #[error("Permission denied writing {}: {source}", path.display())]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Build cancelled before {stage}")]
    Cancelled { stage: &'static str },

    #[error("{stage} failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: Box<ScriptfoldError>,
    },
}

impl ScriptfoldError {
    /// Wrap an IO failure, keeping permission problems distinguishable
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            Self::PermissionDenied { path, source }
        } else {
            Self::Io { path, source }
        }
    }

    /// Attach the name of the pipeline stage that produced this error
    pub fn in_stage(self, stage: &'static str) -> Self {
        match self {
            already @ Self::Stage { .. } => already,
            other => Self::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, ScriptfoldError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_is_distinguished() {
        let err = ScriptfoldError::io(
            "out/Script.cs",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope"),
        );
        assert!(matches!(err, ScriptfoldError::PermissionDenied { .. }));

        let err = ScriptfoldError::io(
            "out/Script.cs",
            std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        );
        assert!(matches!(err, ScriptfoldError::Io { .. }));
    }

    #[test]
    fn test_stage_is_attached_once() {
        let err = ScriptfoldError::RenameCollision("exhausted".to_string())
            .in_stage("rename")
            .in_stage("pipeline");
        assert_eq!(err.to_string(), "rename failed: Symbol renaming failed: exhausted");
    }
}
