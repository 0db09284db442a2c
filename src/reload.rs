//! Re-evaluating the script and committing its colors to the grid.

use std::path::Path;
use std::sync::Arc;

use crate::color::Color;
use crate::error::ScriptError;
use crate::grid::{CellCoord, CellIndex, Grid};
use crate::script_diagnostics::ReloadStatus;
use crate::scripting::{read_script, EvalMode, EvalTarget, ScriptEngine};

/// Counts from one successful reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReloadReport {
    /// Interpreter invocations performed.
    pub evaluated: usize,
    /// Cells whose color actually changed.
    pub changed: usize,
    /// Cells left alone (no color returned, or not present in the grid).
    pub skipped: usize,
}

/// Owns the script engine and applies reload results to a shared grid.
pub struct ColorReloader {
    engine: ScriptEngine,
    grid: Arc<Grid>,
    mode: EvalMode,
    /// Size of the coordinate space the script is evaluated over.
    extent: usize,
    last_status: Option<ReloadStatus>,
}

impl ColorReloader {
    pub fn new(engine: ScriptEngine, grid: Arc<Grid>, mode: EvalMode) -> Self {
        let extent = grid.size();
        Self {
            engine,
            grid,
            mode,
            extent,
            last_status: None,
        }
    }

    /// Evaluate per-cell scripts over an `extent`³ coordinate space instead of
    /// the grid's own size. Coordinates the grid does not have are skipped.
    pub fn with_extent(mut self, extent: usize) -> Self {
        self.extent = extent.max(1);
        self
    }

    pub fn mode(&self) -> EvalMode {
        self.mode
    }

    pub fn grid(&self) -> &Arc<Grid> {
        &self.grid
    }

    /// Outcome of the most recent reload, if any.
    pub fn last_status(&self) -> Option<&ReloadStatus> {
        self.last_status.as_ref()
    }

    /// Reload and log the outcome. Errors never escape; the grid keeps its
    /// previous colors when the reload fails.
    pub fn reload_and_log(&mut self, path: &Path) {
        match self.reload(path) {
            Ok(report) => log::info!(
                "Reloaded {}: {} evaluations, {} cells changed, {} skipped",
                path.display(),
                report.evaluated,
                report.changed,
                report.skipped
            ),
            Err(e) => log::warn!("Reload of {} abandoned: {}", path.display(), e),
        }
    }

    /// Read the script, run it in the configured mode and commit the result.
    pub fn reload(&mut self, path: &Path) -> Result<ReloadReport, ScriptError> {
        let result = read_script(path).and_then(|source| self.reload_source(&source));
        self.last_status = Some(match &result {
            Ok(_) => ReloadStatus::success(),
            Err(e) => ReloadStatus::failure(e),
        });
        result
    }

    /// Same as [`reload`](Self::reload) for script text already in memory.
    pub fn reload_source(&mut self, source: &str) -> Result<ReloadReport, ScriptError> {
        let _reload = self.engine.begin_reload();
        let ast = self.engine.compile(source)?;

        let mut report = ReloadReport::default();
        let mut updates: Vec<(CellIndex, Color)> = Vec::with_capacity(self.grid.len());

        match self.mode {
            EvalMode::Uniform => {
                report.evaluated = 1;
                let color = self.engine.run(&ast, EvalTarget::Uniform)?;
                updates.extend(self.grid.iter().map(|cell| (cell.index, color)));
            }
            EvalMode::PerCell => {
                // One interpreter invocation per cell; nothing is committed
                // unless the whole pass completes.
                for coord in CellCoord::all(self.extent) {
                    report.evaluated += 1;
                    let target = EvalTarget::Cell(coord.centered(self.extent));
                    let color = match self.engine.run(&ast, target) {
                        Ok(color) => color,
                        Err(ScriptError::TypeMismatch { found }) => {
                            log::debug!("{}: no color ({})", coord.name(), found);
                            report.skipped += 1;
                            continue;
                        }
                        Err(e) => return Err(e),
                    };

                    match self.grid.lookup_coord(coord) {
                        Ok(cell) => updates.push((cell.index, color)),
                        Err(e) => {
                            log::debug!("Skipping {}: {}", coord.name(), e);
                            report.skipped += 1;
                        }
                    }
                }
            }
        }

        report.changed = self.grid.apply_colors(&updates);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridConfig;

    const CHECKERBOARD: &str = "if (x + y + z) % 2 == 0 { red } else { blue }";

    fn reloader(size: usize, mode: EvalMode) -> ColorReloader {
        let grid = Grid::build(GridConfig {
            size,
            cell_size: 0.2,
            gap: 0.01,
        })
        .unwrap();
        ColorReloader::new(ScriptEngine::default(), Arc::new(grid), mode)
    }

    #[test]
    fn test_uniform_red_colors_every_cell() {
        let red = Color::rgb(1.0, 0.0, 0.0);
        for n in 1..=4 {
            let mut r = reloader(n, EvalMode::Uniform);
            let report = r.reload_source("#{ R: 1.0, G: 0.0, B: 0.0 }").unwrap();
            assert_eq!(report.evaluated, 1);
            assert_eq!(report.changed, n * n * n);
            assert!(r.grid().colors().colors.iter().all(|c| *c == red));
        }
    }

    #[test]
    fn test_per_cell_evaluates_every_cell() {
        let mut r = reloader(3, EvalMode::PerCell);
        let report = r.reload_source("green").unwrap();
        assert_eq!(report.evaluated, 27);
        assert_eq!(report.changed, 27);
        assert_eq!(report.skipped, 0);
    }

    #[test]
    fn test_reload_is_idempotent() {
        let mut r = reloader(5, EvalMode::PerCell);
        r.reload_source(CHECKERBOARD).unwrap();
        let first = r.grid().colors();

        let report = r.reload_source(CHECKERBOARD).unwrap();
        let second = r.grid().colors();

        assert_eq!(report.changed, 0);
        assert_eq!(first.revision, second.revision);
        assert_eq!(first.colors, second.colors);
    }

    #[test]
    fn test_checkerboard_neighbours_differ() {
        let mut r = reloader(5, EvalMode::PerCell);
        r.reload_source(CHECKERBOARD).unwrap();
        let grid = r.grid();

        for cell in grid.iter() {
            let c = cell.coord;
            let neighbours = [
                CellCoord::new(c.x + 1, c.y, c.z),
                CellCoord::new(c.x, c.y + 1, c.z),
                CellCoord::new(c.x, c.y, c.z + 1),
            ];
            for n in neighbours {
                if let Ok(other) = grid.lookup_coord(n) {
                    assert_ne!(grid.color(cell), grid.color(other), "{} vs {}", cell.name, other.name);
                }
            }
        }

        // The center cell (0, 0, 0 centered) is even
        let center = grid.lookup("cube 2 2 2").unwrap();
        assert_eq!(grid.color(center), Color::rgb(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_syntax_error_keeps_previous_colors() {
        let mut r = reloader(3, EvalMode::PerCell);
        r.reload_source(CHECKERBOARD).unwrap();
        let before = r.grid().colors();

        let err = r.reload_source("if (x + { red").unwrap_err();
        assert!(matches!(err, ScriptError::Syntax { .. }));

        let after = r.grid().colors();
        assert_eq!(before.revision, after.revision);
        assert_eq!(before.colors, after.colors);
    }

    #[test]
    fn test_runtime_error_midway_commits_nothing() {
        let mut r = reloader(3, EvalMode::PerCell);
        // Succeeds for the first cells, fails once x reaches the far side
        let err = r
            .reload_source("if x > 0 { throw \"bad cell\" } else { yellow }")
            .unwrap_err();
        assert!(matches!(err, ScriptError::Runtime { .. }));
        assert_eq!(r.grid().revision(), 0);
        assert!(r
            .grid()
            .colors()
            .colors
            .iter()
            .all(|c| *c == Color::NEUTRAL_GRAY));
    }

    #[test]
    fn test_type_mismatch_skips_only_that_cell() {
        let mut r = reloader(3, EvalMode::PerCell);
        let report = r
            .reload_source("if x == 0 && y == 0 && z == 0 { 42 } else { white }")
            .unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.changed, 26);

        let grid = r.grid();
        assert_eq!(grid.color(grid.lookup("cube 1 1 1").unwrap()), Color::NEUTRAL_GRAY);
        assert_eq!(grid.color(grid.lookup("cube 0 0 0").unwrap()), Color::rgb(1.0, 1.0, 1.0));
    }

    #[test]
    fn test_uniform_type_mismatch_abandons_reload() {
        let mut r = reloader(2, EvalMode::Uniform);
        let err = r.reload_source("let a = 1;").unwrap_err();
        assert!(matches!(err, ScriptError::TypeMismatch { .. }));
        assert_eq!(r.grid().revision(), 0);
    }

    #[test]
    fn test_cells_outside_grid_are_skipped() {
        let mut r = reloader(2, EvalMode::PerCell).with_extent(3);
        let report = r.reload_source("blue").unwrap();
        assert_eq!(report.evaluated, 27);
        assert_eq!(report.changed, 8);
        assert_eq!(report.skipped, 19);
    }

    #[test]
    fn test_reload_from_path_records_status() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cube.rhai");
        std::fs::write(&path, CHECKERBOARD).unwrap();

        let mut r = reloader(3, EvalMode::PerCell);
        r.reload(&path).unwrap();
        assert!(r.last_status().unwrap().ok);

        std::fs::write(&path, "red +").unwrap();
        assert!(r.reload(&path).is_err());
        let status = r.last_status().unwrap();
        assert!(!status.ok);
        assert_eq!(status.kind.as_deref(), Some("syntax_error"));
    }
}
