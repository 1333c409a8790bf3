use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors produced while projecting datasets or driving the SVM toolchain
#[derive(Debug, Error)]
pub enum AblateError {
    /// A file could not be opened, created, read or written
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A dataset line or accuracy report did not match the expected grammar
    #[error("parse error{}: {message}", location(.path.as_deref(), .line))]
    Parse {
        path: Option<PathBuf>,
        line: Option<usize>,
        message: String,
    },

    /// An external subset/train/predict step failed or produced no output
    #[error("{tool} failed ({status}){}", stderr_suffix(.stderr))]
    ExternalTool {
        tool: String,
        status: String,
        stderr: String,
    },

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AblateError>;

impl AblateError {
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        AblateError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        AblateError::Parse {
            path: None,
            line: None,
            message: message.into(),
        }
    }

    pub fn parse_at(path: impl AsRef<Path>, line: usize, message: impl Into<String>) -> Self {
        AblateError::Parse {
            path: Some(path.as_ref().to_path_buf()),
            line: Some(line),
            message: message.into(),
        }
    }

    /// Attaches a file path to a parse error raised without one
    pub fn with_path(self, file: impl AsRef<Path>) -> Self {
        match self {
            AblateError::Parse {
                path: None,
                line,
                message,
            } => AblateError::Parse {
                path: Some(file.as_ref().to_path_buf()),
                line,
                message,
            },
            other => other,
        }
    }
}

fn location(path: Option<&Path>, line: &Option<usize>) -> String {
    match (path, *line) {
        (Some(path), Some(line)) => format!(" in {} line {}", path.display(), line),
        (Some(path), None) => format!(" in {}", path.display()),
        (None, Some(line)) => format!(" on line {}", line),
        (None, None) => String::new(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {}", trimmed)
    }
}
