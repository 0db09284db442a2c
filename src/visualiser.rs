//! Per-frame loop: rotate the grid and hand the result to the renderer.

use std::sync::Arc;
use std::time::Duration;

use crate::grid::Grid;
use crate::rotation::{RotationAnimator, RotationConfig};
use crate::scene_graph::{Geometry, SceneAdapter};

pub struct Visualiser<S: SceneAdapter> {
    grid: Arc<Grid>,
    animator: RotationAnimator,
    scene: S,
    /// Color revision last pushed to the scene.
    pushed_revision: Option<u64>,
    frame: u64,
}

impl<S: SceneAdapter> Visualiser<S> {
    pub fn new(grid: Arc<Grid>, rotation: RotationConfig, scene: S) -> Self {
        Self {
            grid,
            animator: RotationAnimator::new(rotation),
            scene,
            pushed_revision: None,
            frame: 0,
        }
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn animator(&self) -> &RotationAnimator {
        &self.animator
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Register one cube drawable per cell at its base transform.
    pub fn register(&mut self) {
        let geometry = Geometry::Cube {
            size: self.grid.config().cell_size,
        };
        let transforms = self.animator.compute(&self.grid);
        for (cell, t) in self.grid.iter().zip(transforms) {
            self.scene.register_drawable(&cell.name, &geometry);
            self.scene.set_transform(&cell.name, t.position, t.orientation);
        }
        self.push_appearance();
        log::info!("Registered {} drawables", self.grid.len());
    }

    /// Advance the rotation, push transforms and any new colors, render.
    pub fn step(&mut self, dt: Duration) {
        self.frame += 1;

        let transforms = self.animator.tick(&self.grid, dt);
        for (cell, t) in self.grid.iter().zip(transforms) {
            self.scene.set_transform(&cell.name, t.position, t.orientation);
        }

        if self.pushed_revision != Some(self.grid.revision()) {
            self.push_appearance();
        }

        if let Err(e) = self.scene.render_frame() {
            log::warn!("Frame {} failed to render: {:#}", self.frame, e);
        }
    }

    fn push_appearance(&mut self) {
        let snapshot = self.grid.colors();
        for (cell, color) in self.grid.iter().zip(&snapshot.colors) {
            self.scene.set_appearance(&cell.name, *color, color.opacity());
        }
        if self.pushed_revision.is_some() {
            log::debug!("Pushed color revision {}", snapshot.revision);
        }
        self.pushed_revision = Some(snapshot.revision);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;
    use crate::grid::GridConfig;
    use crate::scene_graph::SceneGraph;
    use glam::{Mat3, Vec3};

    /// Counts appearance pushes on top of the in-memory scene.
    #[derive(Default)]
    struct CountingScene {
        inner: SceneGraph,
        appearance_calls: usize,
        fail_render: bool,
    }

    impl SceneAdapter for CountingScene {
        fn register_drawable(&mut self, name: &str, geometry: &Geometry) {
            self.inner.register_drawable(name, geometry);
        }

        fn set_transform(&mut self, name: &str, position: Vec3, orientation: glam::Quat) {
            self.inner.set_transform(name, position, orientation);
        }

        fn set_appearance(&mut self, name: &str, color: Color, opacity: f32) {
            self.appearance_calls += 1;
            self.inner.set_appearance(name, color, opacity);
        }

        fn render_frame(&mut self) -> anyhow::Result<()> {
            self.inner.render_frame()?;
            if self.fail_render {
                anyhow::bail!("device lost");
            }
            Ok(())
        }
    }

    fn setup(scene: CountingScene) -> (Arc<Grid>, Visualiser<CountingScene>) {
        let grid = Arc::new(Grid::build(GridConfig { size: 3, ..GridConfig::default() }).unwrap());
        let mut vis = Visualiser::new(Arc::clone(&grid), RotationConfig::default(), scene);
        vis.register();
        (grid, vis)
    }

    #[test]
    fn test_register_places_cells_at_base() {
        let (grid, vis) = setup(CountingScene::default());
        assert_eq!(vis.scene().inner.len(), 27);
        for cell in grid.iter() {
            let d = vis.scene().inner.get(&cell.name).unwrap();
            assert_eq!(d.transform.position, cell.base_position);
            assert_eq!(d.color, Color::NEUTRAL_GRAY);
        }
    }

    #[test]
    fn test_step_rotates_from_base_positions() {
        let (grid, mut vis) = setup(CountingScene::default());
        for _ in 0..10 {
            vis.step(Duration::from_millis(16));
        }
        let rot = Mat3::from_rotation_y(vis.animator().state().angle);
        for cell in grid.iter() {
            let d = vis.scene().inner.get(&cell.name).unwrap();
            assert!((d.transform.position - rot * cell.base_position).length() < 1e-5);
        }
        assert_eq!(vis.scene().inner.frames_rendered(), 10);
    }

    #[test]
    fn test_colors_pushed_only_after_change() {
        let (grid, mut vis) = setup(CountingScene::default());
        let after_register = vis.scene().appearance_calls;
        assert_eq!(after_register, 27);

        vis.step(Duration::ZERO);
        vis.step(Duration::ZERO);
        assert_eq!(vis.scene().appearance_calls, after_register);

        let cell = grid.lookup("cube 1 1 1").unwrap();
        grid.set_color(cell, Color::rgb(0.0, 1.0, 0.0));
        vis.step(Duration::ZERO);
        assert_eq!(vis.scene().appearance_calls, after_register + 27);
        assert_eq!(
            vis.scene().inner.get("cube 1 1 1").unwrap().color,
            Color::rgb(0.0, 1.0, 0.0)
        );
    }

    #[test]
    fn test_render_failure_does_not_stop_loop() {
        let (_grid, mut vis) = setup(CountingScene {
            fail_render: true,
            ..CountingScene::default()
        });
        vis.step(Duration::ZERO);
        vis.step(Duration::ZERO);
        assert_eq!(vis.frame(), 2);
        assert_eq!(vis.scene().inner.frames_rendered(), 2);
    }
}
