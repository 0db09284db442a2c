//! The scene renderer boundary.
//!
//! The core only ever talks to a renderer through [`SceneAdapter`]: drawables
//! are addressed by name, and everything set before `render_frame` belongs to
//! that frame. [`SceneGraph`] is the in-memory implementation used headless
//! and in tests; it can also dump periodic JSON snapshots of what it would
//! draw.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use glam::{Quat, Vec3};
use serde::Serialize;

use crate::color::Color;

/// Geometry a drawable is created with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Geometry {
    Cube { size: f32 },
}

/// Operations the core needs from a renderer.
pub trait SceneAdapter {
    /// Register a drawable under a stable name.
    fn register_drawable(&mut self, name: &str, geometry: &Geometry);

    fn set_transform(&mut self, name: &str, position: Vec3, orientation: Quat);

    fn set_appearance(&mut self, name: &str, color: Color, opacity: f32);

    /// Present everything set since the previous frame.
    fn render_frame(&mut self) -> Result<()>;
}

/// Position and orientation of a drawable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
        }
    }
}

/// One registered drawable.
#[derive(Debug, Clone)]
pub struct Drawable {
    pub geometry: Geometry,
    pub transform: Transform,
    pub color: Color,
    pub opacity: f32,
    /// Hidden drawables are skipped when drawing and do not write depth.
    pub visible: bool,
}

impl Drawable {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            transform: Transform::default(),
            color: Color::default(),
            opacity: 1.0,
            visible: true,
        }
    }
}

/// Where and how often frame snapshots are written.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    pub path: PathBuf,
    /// Frames between snapshots; 0 is treated as 1.
    pub every: u64,
}

#[derive(Debug, Serialize)]
pub struct DrawableSnapshot<'a> {
    pub name: &'a str,
    pub geometry: Geometry,
    pub position: [f32; 3],
    /// Quaternion as `[x, y, z, w]`.
    pub orientation: [f32; 4],
    pub color: Color,
    pub opacity: f32,
    pub visible: bool,
}

/// Serializable view of one frame.
#[derive(Debug, Serialize)]
pub struct SceneSnapshot<'a> {
    pub frame: u64,
    pub drawables: Vec<DrawableSnapshot<'a>>,
}

/// Headless scene: keeps the latest state of every drawable in memory.
#[derive(Debug, Default)]
pub struct SceneGraph {
    /// Registration order, used for stable snapshot output.
    order: Vec<String>,
    drawables: HashMap<String, Drawable>,
    frames_rendered: u64,
    snapshot: Option<SnapshotConfig>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshots(mut self, config: SnapshotConfig) -> Self {
        self.snapshot = Some(config);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Drawable> {
        self.drawables.get(name)
    }

    pub fn len(&self) -> usize {
        self.drawables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drawables.is_empty()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Drawables in registration order.
    pub fn drawables(&self) -> impl Iterator<Item = (&str, &Drawable)> {
        self.order
            .iter()
            .filter_map(|name| self.drawables.get(name).map(|d| (name.as_str(), d)))
    }

    pub fn snapshot(&self) -> SceneSnapshot<'_> {
        SceneSnapshot {
            frame: self.frames_rendered,
            drawables: self
                .drawables()
                .map(|(name, d)| DrawableSnapshot {
                    name,
                    geometry: d.geometry,
                    position: d.transform.position.to_array(),
                    orientation: d.transform.orientation.to_array(),
                    color: d.color,
                    opacity: d.opacity,
                    visible: d.visible,
                })
                .collect(),
        }
    }

    /// Write the current snapshot as JSON, replacing the file atomically.
    pub fn write_snapshot(&self, config: &SnapshotConfig) -> Result<()> {
        let tmp = config.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)
                .with_context(|| format!("creating {}", tmp.display()))?;
            serde_json::to_writer_pretty(&mut file, &self.snapshot())?;
            file.write_all(b"\n")?;
        }
        fs::rename(&tmp, &config.path)
            .with_context(|| format!("replacing {}", config.path.display()))?;
        Ok(())
    }
}

impl SceneAdapter for SceneGraph {
    fn register_drawable(&mut self, name: &str, geometry: &Geometry) {
        if self
            .drawables
            .insert(name.to_string(), Drawable::new(*geometry))
            .is_none()
        {
            self.order.push(name.to_string());
        }
    }

    fn set_transform(&mut self, name: &str, position: Vec3, orientation: Quat) {
        match self.drawables.get_mut(name) {
            Some(d) => d.transform = Transform { position, orientation },
            None => log::debug!("set_transform on unknown drawable '{}'", name),
        }
    }

    fn set_appearance(&mut self, name: &str, color: Color, opacity: f32) {
        match self.drawables.get_mut(name) {
            Some(d) => {
                d.color = color;
                d.opacity = opacity;
                d.visible = opacity > 0.0;
            }
            None => log::debug!("set_appearance on unknown drawable '{}'", name),
        }
    }

    fn render_frame(&mut self) -> Result<()> {
        self.frames_rendered += 1;
        if let Some(config) = &self.snapshot {
            if self.frames_rendered % config.every.max(1) == 0 {
                self.write_snapshot(config)?;
            }
        }
        Ok(())
    }
}
