//! The N×N×N cell grid.
//!
//! Cells live in a flat arena in x-major order (then y, then z). Identity and
//! base geometry are fixed when the grid is built; only colors change, and
//! they sit behind a single lock so a reload is committed as one unit and a
//! frame never observes half of it.

use std::collections::HashMap;

use glam::{IVec3, Vec3};
use parking_lot::RwLock;

use crate::color::Color;
use crate::error::GridError;

/// Geometry parameters for building a grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridConfig {
    /// Cells per axis (N).
    pub size: usize,
    /// Edge length of one cell.
    pub cell_size: f32,
    /// Empty space between neighbouring cells.
    pub gap: f32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            size: 5,
            cell_size: 0.2,
            gap: 0.01,
        }
    }
}

/// Upper bound on N³; one drawable is registered per cell.
pub const MAX_CELLS: usize = 1_000_000;

impl GridConfig {
    pub fn validate(&self) -> Result<(), GridError> {
        if self.size == 0 {
            return Err(GridError::InvalidConfig("size must be at least 1".into()));
        }
        if self.cell_count().is_none() {
            return Err(GridError::InvalidConfig(format!(
                "size {} gives more than {} cells",
                self.size, MAX_CELLS
            )));
        }
        if !self.cell_size.is_finite() || self.cell_size <= 0.0 {
            return Err(GridError::InvalidConfig(format!(
                "cell size must be positive, got {}",
                self.cell_size
            )));
        }
        if !self.gap.is_finite() || self.gap < 0.0 {
            return Err(GridError::InvalidConfig(format!(
                "gap must be non-negative, got {}",
                self.gap
            )));
        }
        Ok(())
    }

    /// N³, or `None` if it overflows or exceeds [`MAX_CELLS`].
    pub fn cell_count(&self) -> Option<usize> {
        self.size
            .checked_pow(3)
            .filter(|&count| count <= MAX_CELLS)
    }

    /// Distance between the centers of two adjacent cells.
    pub fn pitch(&self) -> f32 {
        self.cell_size + self.gap
    }

    /// Edge length of the whole structure.
    pub fn total_extent(&self) -> f32 {
        self.size as f32 * self.pitch() - self.gap
    }

    /// Base coordinate of axis index `i`, centered on the origin.
    pub fn axis_position(&self, i: usize) -> f32 {
        let half = self.total_extent() / 2.0;
        i as f32 * self.pitch() - half + self.cell_size / 2.0
    }
}

/// Integer identity of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellCoord {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl CellCoord {
    pub fn new(x: usize, y: usize, z: usize) -> Self {
        Self { x, y, z }
    }

    /// Coordinates relative to the grid center: `i - (n - 1) / 2` with
    /// integer division on every axis.
    pub fn centered(&self, n: usize) -> IVec3 {
        let offset = ((n.max(1) - 1) / 2) as i32;
        IVec3::new(
            self.x as i32 - offset,
            self.y as i32 - offset,
            self.z as i32 - offset,
        )
    }

    /// Name shared with the scene renderer.
    pub fn name(&self) -> String {
        format!("cube {} {} {}", self.x, self.y, self.z)
    }

    /// Every coordinate of an `n`-sized grid in x-major order.
    pub fn all(n: usize) -> impl Iterator<Item = CellCoord> {
        (0..n).flat_map(move |x| {
            (0..n).flat_map(move |y| (0..n).map(move |z| CellCoord::new(x, y, z)))
        })
    }
}

/// Position of a cell in the grid arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellIndex(pub usize);

/// One cell. Everything here is immutable; color is held by the grid.
#[derive(Debug, Clone)]
pub struct Cell {
    pub index: CellIndex,
    pub coord: CellCoord,
    pub name: String,
    pub base_position: Vec3,
}

#[derive(Debug)]
struct ColorState {
    colors: Vec<Color>,
    /// Bumped whenever a commit changes at least one color.
    revision: u64,
}

/// Copy of every cell color taken under one lock.
#[derive(Debug, Clone)]
pub struct ColorSnapshot {
    pub colors: Vec<Color>,
    pub revision: u64,
}

#[derive(Debug)]
pub struct Grid {
    config: GridConfig,
    cells: Vec<Cell>,
    by_name: HashMap<String, CellIndex>,
    colors: RwLock<ColorState>,
}

impl Grid {
    /// Allocate all N³ cells and compute their base positions.
    pub fn build(config: GridConfig) -> Result<Self, GridError> {
        config.validate()?;

        let n = config.size;
        let count = config.cell_count().unwrap_or_default();
        let mut cells = Vec::with_capacity(count);
        let mut by_name = HashMap::with_capacity(count);

        for coord in CellCoord::all(n) {
            let index = CellIndex(cells.len());
            let name = coord.name();
            let base_position = Vec3::new(
                config.axis_position(coord.x),
                config.axis_position(coord.y),
                config.axis_position(coord.z),
            );
            by_name.insert(name.clone(), index);
            cells.push(Cell {
                index,
                coord,
                name,
                base_position,
            });
        }

        log::debug!(
            "Built {}³ grid: {} cells, extent {:.3}",
            n,
            cells.len(),
            config.total_extent()
        );

        let colors = ColorState {
            colors: vec![Color::default(); cells.len()],
            revision: 0,
        };

        Ok(Self {
            config,
            cells,
            by_name,
            colors: RwLock::new(colors),
        })
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Cells per axis.
    pub fn size(&self) -> usize {
        self.config.size
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cells in x-major order. Calling again restarts the traversal.
    pub fn iter(&self) -> std::slice::Iter<'_, Cell> {
        self.cells.iter()
    }

    pub fn cell(&self, index: CellIndex) -> Option<&Cell> {
        self.cells.get(index.0)
    }

    pub fn lookup(&self, name: &str) -> Result<&Cell, GridError> {
        self.by_name
            .get(name)
            .map(|&idx| &self.cells[idx.0])
            .ok_or_else(|| GridError::UnknownName(name.to_string()))
    }

    pub fn lookup_coord(&self, coord: CellCoord) -> Result<&Cell, GridError> {
        let n = self.config.size;
        if coord.x >= n || coord.y >= n || coord.z >= n {
            return Err(GridError::OutOfBounds {
                x: coord.x,
                y: coord.y,
                z: coord.z,
                size: n,
            });
        }
        Ok(&self.cells[(coord.x * n + coord.y) * n + coord.z])
    }

    pub fn color(&self, cell: &Cell) -> Color {
        self.colors.read().colors[cell.index.0]
    }

    /// Overwrite a single cell's color. Returns whether the value changed.
    pub fn set_color(&self, cell: &Cell, color: Color) -> bool {
        self.apply_colors(&[(cell.index, color)]) > 0
    }

    /// Commit a batch of color updates under one write lock.
    /// Returns the number of cells whose color actually changed.
    pub fn apply_colors(&self, updates: &[(CellIndex, Color)]) -> usize {
        let mut state = self.colors.write();
        let mut changed = 0;
        for &(index, color) in updates {
            if let Some(slot) = state.colors.get_mut(index.0) {
                if *slot != color {
                    *slot = color;
                    changed += 1;
                }
            }
        }
        if changed > 0 {
            state.revision += 1;
        }
        changed
    }

    /// Current color revision.
    pub fn revision(&self) -> u64 {
        self.colors.read().revision
    }

    /// All colors together with the revision they belong to.
    pub fn colors(&self) -> ColorSnapshot {
        let state = self.colors.read();
        ColorSnapshot {
            colors: state.colors.clone(),
            revision: state.revision,
        }
    }
}
