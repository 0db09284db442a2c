//! Error types shared across the grid, scripting and watcher layers.

use std::path::PathBuf;

use thiserror::Error;

use crate::script_diagnostics::ScriptLocation;

/// Why a script evaluation produced no color.
///
/// None of these are fatal: the reload is abandoned (or the cell skipped)
/// and whatever was displayed before stays on screen.
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("syntax error{}: {message}", fmt_location(.location))]
    Syntax {
        message: String,
        location: Option<ScriptLocation>,
    },

    #[error("runtime error{}: {message}", fmt_location(.location))]
    Runtime {
        message: String,
        location: Option<ScriptLocation>,
    },

    #[error("type mismatch: expected a color map with R, G, B, found {found}")]
    TypeMismatch { found: String },

    #[error("cannot read script {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ScriptError {
    /// Short tag for logs and snapshots.
    pub fn kind(&self) -> &'static str {
        match self {
            ScriptError::Syntax { .. } => "syntax_error",
            ScriptError::Runtime { .. } => "runtime_error",
            ScriptError::TypeMismatch { .. } => "type_mismatch",
            ScriptError::Read { .. } => "read_error",
        }
    }
}

fn fmt_location(location: &Option<ScriptLocation>) -> String {
    match location {
        Some(loc) => format!(" at line {}, column {}", loc.line, loc.column),
        None => String::new(),
    }
}

/// Failure to establish observation of the script file.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("script file not found: {}", .path.display())]
    MissingFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("watch error: {0}")]
    Notify(#[from] notify::Error),

    #[error("failed to spawn watcher thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Grid addressing failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    #[error("no cell named '{0}'")]
    UnknownName(String),

    #[error("cell ({x}, {y}, {z}) is outside a grid of size {size}")]
    OutOfBounds {
        x: usize,
        y: usize,
        z: usize,
        size: usize,
    },

    #[error("invalid grid configuration: {0}")]
    InvalidConfig(String),
}
