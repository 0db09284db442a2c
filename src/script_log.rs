//! Logging from inside scripts.
//!
//! `print`, `debug` and the `log_info` / `log_warn` / `log_error` functions all
//! end up in the `log` crate under the `script` target. Per-cell mode runs
//! the script once per cell, so a single `print` would otherwise repeat N³
//! times on every save; messages are capped per reload.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Maximum number of log messages allowed per reload.
const MAX_LOGS_PER_RELOAD: u32 = 64;

/// Log level for script messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Info => log::Level::Info,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Error => log::Level::Error,
        }
    }
}

/// Per-reload message budget shared by the engine's logging callbacks.
#[derive(Debug, Clone, Default)]
pub struct LogBudget {
    count: Arc<AtomicU32>,
    warned: Arc<AtomicBool>,
}

impl LogBudget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the counter. Called at the start of every reload.
    pub fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
        self.warned.store(false, Ordering::Relaxed);
    }

    fn can_log(&self) -> bool {
        let count = self.count.fetch_add(1, Ordering::Relaxed);
        if count >= MAX_LOGS_PER_RELOAD {
            if !self.warned.swap(true, Ordering::Relaxed) {
                log::warn!(
                    target: "script",
                    "Script log limit exceeded ({} messages/reload). Further logs dropped.",
                    MAX_LOGS_PER_RELOAD
                );
            }
            false
        } else {
            true
        }
    }

    /// Log a message from a script, respecting the limit.
    pub fn log(&self, level: LogLevel, message: &str) {
        if self.can_log() {
            log::log!(target: "script", log::Level::from(level), "{}", message);
        }
    }
}

/// Convert a Rhai value to a log-friendly string. Never panics.
pub fn stringify_dynamic(value: &rhai::Dynamic) -> String {
    if let Ok(s) = value.clone().into_string() {
        return s;
    }

    if let Some(arr) = value.clone().try_cast::<rhai::Array>() {
        let parts: Vec<String> = arr.iter().map(stringify_dynamic).collect();
        return parts.join(" ");
    }

    if let Some(map) = value.clone().try_cast::<rhai::Map>() {
        let parts: Vec<String> = map
            .iter()
            .map(|(k, v)| format!("{}: {}", k, stringify_dynamic(v)))
            .collect();
        return format!("{{{}}}", parts.join(", "));
    }

    if let Ok(i) = value.as_int() {
        return i.to_string();
    }
    if let Ok(f) = value.as_float() {
        return f.to_string();
    }
    if let Ok(b) = value.as_bool() {
        return b.to_string();
    }
    if value.is_unit() {
        return "()".to_string();
    }

    format!("{:?}", value)
}

/// Register `log_info`, `log_warn` and `log_error`, and route `print` / `debug`.
pub fn register_log_api(engine: &mut rhai::Engine, budget: &LogBudget) {
    let b = budget.clone();
    engine.register_fn("log_info", move |value: rhai::Dynamic| {
        b.log(LogLevel::Info, &stringify_dynamic(&value));
    });
    let b = budget.clone();
    engine.register_fn("log_warn", move |value: rhai::Dynamic| {
        b.log(LogLevel::Warn, &stringify_dynamic(&value));
    });
    let b = budget.clone();
    engine.register_fn("log_error", move |value: rhai::Dynamic| {
        b.log(LogLevel::Error, &stringify_dynamic(&value));
    });

    let b = budget.clone();
    engine.on_print(move |text| b.log(LogLevel::Info, text));
    let b = budget.clone();
    engine.on_debug(move |text, _source, pos| match pos.line() {
        Some(line) => b.log(LogLevel::Debug, &format!("line {line}: {text}")),
        None => b.log(LogLevel::Debug, text),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stringify_values() {
        assert_eq!(stringify_dynamic(&rhai::Dynamic::from("hello")), "hello");
        assert_eq!(stringify_dynamic(&rhai::Dynamic::from(42_i64)), "42");
        assert_eq!(stringify_dynamic(&rhai::Dynamic::from(0.5_f32)), "0.5");
        assert_eq!(stringify_dynamic(&rhai::Dynamic::from(true)), "true");
        assert_eq!(stringify_dynamic(&rhai::Dynamic::UNIT), "()");
    }

    #[test]
    fn test_stringify_array() {
        let mut arr = rhai::Array::new();
        arr.push(rhai::Dynamic::from("cell"));
        arr.push(rhai::Dynamic::from(3_i64));
        assert_eq!(stringify_dynamic(&rhai::Dynamic::from(arr)), "cell 3");
    }

    #[test]
    fn test_reload_log_limit() {
        let budget = LogBudget::new();
        for _ in 0..MAX_LOGS_PER_RELOAD {
            assert!(budget.can_log());
        }
        assert!(!budget.can_log());

        budget.reset();
        assert!(budget.can_log());
    }

    #[test]
    fn test_budget_shared_between_clones() {
        let budget = LogBudget::new();
        let clone = budget.clone();
        for _ in 0..MAX_LOGS_PER_RELOAD {
            clone.log(LogLevel::Debug, "tick");
        }
        assert!(!budget.can_log());
    }
}
