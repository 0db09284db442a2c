//! Turns Rhai parse and evaluation failures into [`ScriptError`]s.
//!
//! Rhai errors carry a position; we keep it as a 1-based line/column so the
//! log line points at the spot in the watched file.

use std::time::Duration;

use rhai::EvalAltResult;
use serde::Serialize;

use crate::error::ScriptError;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ScriptLocation {
    /// 1-based line number in the script file.
    pub line: u32,
    /// 1-based column number.
    pub column: u32,
}

/// Outcome of the latest reload, in a form that can be written to a snapshot.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReloadStatus {
    pub ok: bool,
    /// Error tag when `ok` is false (`syntax_error`, `runtime_error`, ...).
    pub kind: Option<String>,
    pub message: Option<String>,
    pub location: Option<ScriptLocation>,
}

impl ReloadStatus {
    pub fn success() -> Self {
        Self {
            ok: true,
            kind: None,
            message: None,
            location: None,
        }
    }

    pub fn failure(err: &ScriptError) -> Self {
        let location = match err {
            ScriptError::Syntax { location, .. } | ScriptError::Runtime { location, .. } => {
                location.clone()
            }
            _ => None,
        };
        Self {
            ok: false,
            kind: Some(err.kind().to_string()),
            message: Some(err.to_string()),
            location,
        }
    }
}

fn location_of(pos: rhai::Position) -> Option<ScriptLocation> {
    let line = pos.line()? as u32;
    if line == 0 {
        return None;
    }
    let column = pos.position().unwrap_or(0) as u32;
    Some(ScriptLocation {
        line,
        column: column.max(1),
    })
}

pub fn from_parse_error(err: &rhai::ParseError) -> ScriptError {
    ScriptError::Syntax {
        message: err.err_type().to_string(),
        location: location_of(err.position()),
    }
}

/// `timeout` is reported when the evaluation was stopped by the deadline.
pub fn from_eval_error(err: &EvalAltResult, timeout: Duration) -> ScriptError {
    let message = match err {
        EvalAltResult::ErrorTerminated(..) => {
            format!("script exceeded its {} ms deadline", timeout.as_millis())
        }
        EvalAltResult::ErrorTooManyOperations(..) => {
            "script exceeded its operation budget".to_string()
        }
        // Rhai reports syntax problems found at run time (e.g. in `eval`) this way
        EvalAltResult::ErrorParsing(parse_err, pos) => {
            return ScriptError::Syntax {
                message: parse_err.to_string(),
                location: location_of(*pos),
            };
        }
        other => other.to_string(),
    };

    ScriptError::Runtime {
        message,
        location: location_of(err.position()),
    }
}
