//! Rhai scripting integration.
//!
//! A color script is a plain Rhai program whose value (last expression or
//! `return`) is a color map:
//!
//! ```text
//! if (x + y + z) % 2 == 0 { red } else { blue }
//! ```
//!
//! Available to every script:
//! - `red`, `green`, `blue`, `yellow`, `black`, `white`, `transparent` - palette constants
//! - `rgb(r, g, b)`, `rgba(r, g, b, a)` - build a color map
//! - `#{ R: 1.0, G: 0.5, B: 0.0, A: 1.0 }` - color map literal (`A` optional, lowercase keys accepted)
//! - `log_info(v)`, `log_warn(v)`, `log_error(v)`, `print(v)`, `debug(v)` - logging
//!
//! In per-cell mode `x`, `y` and `z` hold the cell's integer coordinates
//! relative to the grid center.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::IVec3;
use parking_lot::Mutex;
use rhai::{Dynamic, Engine, Scope, AST, FLOAT, INT};

use crate::color::{Color, NAMED_COLORS};
use crate::error::ScriptError;
use crate::script_diagnostics::{from_eval_error, from_parse_error};
use crate::script_log::{register_log_api, LogBudget};

/// Result of evaluating a script: a color, or why there is none.
pub type ScriptResult = Result<Color, ScriptError>;

/// How a reload maps script results onto cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum EvalMode {
    /// One evaluation colors every cell.
    Uniform,
    /// One evaluation per cell, with `x`, `y`, `z` bound.
    #[default]
    PerCell,
}

/// What a single evaluation is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalTarget {
    Uniform,
    /// Centered cell coordinates.
    Cell(IVec3),
}

/// Limits applied to script execution.
#[derive(Debug, Clone)]
pub struct ScriptConfig {
    /// Wall-clock budget for one reload.
    pub timeout: Duration,
    /// Operation cap for a single evaluation; 0 disables it.
    pub max_operations: u64,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            max_operations: 1_000_000,
        }
    }
}

/// Scripting engine. Owned by the reload thread and never shared with the
/// frame loop.
pub struct ScriptEngine {
    engine: Engine,
    config: ScriptConfig,
    deadline: Arc<Mutex<Option<Instant>>>,
    log_budget: LogBudget,
    /// Palette maps, built once and cloned into each fresh scope.
    palette: Vec<(&'static str, rhai::Map)>,
}

impl ScriptEngine {
    pub fn new(config: ScriptConfig) -> Self {
        let mut engine = Engine::new();

        engine.set_max_expr_depths(64, 64);
        engine.set_max_call_levels(64);
        engine.set_max_operations(config.max_operations);
        engine.set_max_string_size(10_000);
        engine.set_max_array_size(10_000);
        engine.set_max_map_size(500);

        engine
            .register_fn("rgb", |r: FLOAT, g: FLOAT, b: FLOAT| {
                color_to_map(Color::rgb(r, g, b))
            })
            .register_fn("rgba", |r: FLOAT, g: FLOAT, b: FLOAT, a: FLOAT| {
                color_to_map(Color::rgba(r, g, b, a))
            });

        let log_budget = LogBudget::new();
        register_log_api(&mut engine, &log_budget);

        // Stop evaluation once the armed deadline has passed
        let deadline: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));
        let watched = Arc::clone(&deadline);
        engine.on_progress(move |_ops| match *watched.lock() {
            Some(limit) if Instant::now() >= limit => Some(Dynamic::from("deadline")),
            _ => None,
        });

        let palette = NAMED_COLORS
            .iter()
            .map(|(name, color)| (*name, color_to_map(*color)))
            .collect();

        Self {
            engine,
            config,
            deadline,
            log_budget,
            palette,
        }
    }

    pub fn config(&self) -> &ScriptConfig {
        &self.config
    }

    /// Start the per-reload deadline and log budget. Both are cleared when
    /// the returned guard is dropped.
    pub fn begin_reload(&self) -> ReloadGuard<'_> {
        self.log_budget.reset();
        *self.deadline.lock() = Some(Instant::now() + self.config.timeout);
        ReloadGuard { engine: self }
    }

    pub fn compile(&self, source: &str) -> Result<AST, ScriptError> {
        self.engine
            .compile(source)
            .map_err(|e| from_parse_error(&e))
    }

    /// Run a compiled script once in a fresh scope.
    pub fn run(&self, ast: &AST, target: EvalTarget) -> ScriptResult {
        let mut scope = Scope::new();
        for (name, map) in &self.palette {
            scope.push_constant(*name, map.clone());
        }
        if let EvalTarget::Cell(coords) = target {
            scope.push("x", coords.x as INT);
            scope.push("y", coords.y as INT);
            scope.push("z", coords.z as INT);
        }

        let value = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, ast)
            .map_err(|e| from_eval_error(&e, self.config.timeout))?;

        color_from_dynamic(&value)
    }

    /// Read, compile and run the script at `path` once.
    pub fn evaluate(&self, path: &Path, target: EvalTarget) -> ScriptResult {
        let source = read_script(path)?;
        let _reload = self.begin_reload();
        let ast = self.compile(&source)?;
        self.run(&ast, target)
    }
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new(ScriptConfig::default())
    }
}

/// Active reload; disarms the deadline on drop.
pub struct ReloadGuard<'a> {
    engine: &'a ScriptEngine,
}

impl Drop for ReloadGuard<'_> {
    fn drop(&mut self) {
        *self.engine.deadline.lock() = None;
    }
}

pub fn read_script(path: &Path) -> Result<String, ScriptError> {
    std::fs::read_to_string(path).map_err(|source| ScriptError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn color_to_map(color: Color) -> rhai::Map {
    let mut map = rhai::Map::new();
    map.insert("R".into(), Dynamic::from(color.r));
    map.insert("G".into(), Dynamic::from(color.g));
    map.insert("B".into(), Dynamic::from(color.b));
    map.insert("A".into(), Dynamic::from(color.a));
    map
}

/// Numeric channel from a map, accepting `R` or `r`, floats or integers.
fn channel(map: &rhai::Map, upper: &str, lower: &str) -> Result<Option<f32>, ScriptError> {
    let Some(value) = map.get(upper).or_else(|| map.get(lower)) else {
        return Ok(None);
    };
    if let Ok(f) = value.as_float() {
        return Ok(Some(f));
    }
    if let Ok(i) = value.as_int() {
        return Ok(Some(i as f32));
    }
    Err(ScriptError::TypeMismatch {
        found: format!("{} for field {}", value.type_name(), upper),
    })
}

/// Decide once whether a script value is a usable color.
pub fn color_from_dynamic(value: &Dynamic) -> ScriptResult {
    if value.is_unit() {
        return Err(ScriptError::TypeMismatch {
            found: "no value".into(),
        });
    }

    let Some(map) = value.clone().try_cast::<rhai::Map>() else {
        return Err(ScriptError::TypeMismatch {
            found: value.type_name().to_string(),
        });
    };

    let mut rgb = [0.0_f32; 3];
    for (slot, (upper, lower)) in rgb.iter_mut().zip([("R", "r"), ("G", "g"), ("B", "b")]) {
        *slot = channel(&map, upper, lower)?.ok_or_else(|| ScriptError::TypeMismatch {
            found: format!("map without {upper}"),
        })?;
    }
    let a = channel(&map, "A", "a")?.unwrap_or(1.0);

    Ok(Color::rgba(rgb[0], rgb[1], rgb[2], a))
}
