//! Rigid rotation of the whole grid.
//!
//! Each tick advances a single angle by a fixed step and recomputes every
//! displayed transform from the cells' immutable base positions, so no error
//! accumulates across frames. Cells also spin in place by the same angle.

use std::time::Duration;

use glam::{Mat3, Quat, Vec3};

use crate::grid::Grid;

/// Axis the grid spins around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum RotationAxis {
    X,
    #[default]
    Y,
    Z,
}

impl RotationAxis {
    pub fn unit(self) -> Vec3 {
        match self {
            RotationAxis::X => Vec3::X,
            RotationAxis::Y => Vec3::Y,
            RotationAxis::Z => Vec3::Z,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationConfig {
    pub axis: RotationAxis,
    /// Radians added per tick, regardless of frame duration.
    pub step: f32,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            axis: RotationAxis::Y,
            step: 0.01,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RotationState {
    /// Accumulated angle in radians. Not wrapped.
    pub angle: f32,
}

/// Displayed transform of one cell for the current frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellTransform {
    pub position: Vec3,
    pub orientation: Quat,
}

pub struct RotationAnimator {
    config: RotationConfig,
    state: RotationState,
    transforms: Vec<CellTransform>,
}

impl RotationAnimator {
    pub fn new(config: RotationConfig) -> Self {
        Self {
            config,
            state: RotationState::default(),
            transforms: Vec::new(),
        }
    }

    pub fn state(&self) -> RotationState {
        self.state
    }

    pub fn config(&self) -> &RotationConfig {
        &self.config
    }

    /// Advance one step and return the transforms of every cell, in grid order.
    ///
    /// `dt` is ignored: speed is tied to frame count.
    pub fn tick(&mut self, grid: &Grid, _dt: Duration) -> &[CellTransform] {
        self.state.angle += self.config.step;
        self.compute(grid)
    }

    /// Transforms at the current angle without advancing.
    pub fn compute(&mut self, grid: &Grid) -> &[CellTransform] {
        let axis = self.config.axis.unit();
        let angle = self.state.angle;
        let matrix = Mat3::from_axis_angle(axis, angle);
        let orientation = Quat::from_axis_angle(axis, angle);

        self.transforms.clear();
        self.transforms.extend(grid.iter().map(|cell| CellTransform {
            position: matrix * cell.base_position,
            orientation,
        }));
        &self.transforms
    }
}
