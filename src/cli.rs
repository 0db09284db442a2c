use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;

use crate::grid::{Grid, GridConfig};
use crate::reload::ColorReloader;
use crate::rotation::{RotationAxis, RotationConfig};
use crate::scene_graph::{SceneGraph, SnapshotConfig};
use crate::scripting::{EvalMode, ScriptConfig, ScriptEngine};
use crate::visualiser::Visualiser;
use crate::watcher::{ReloadWatcher, WatchConfig};

/// Live-color a rotating cube of cubes from a Rhai script.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Script file to watch
    pub script: PathBuf,

    /// Cells per axis
    #[arg(long, default_value_t = 5)]
    pub size: usize,

    /// Edge length of one cell
    #[arg(long, default_value_t = 0.2)]
    pub cell_size: f32,

    /// Space between cells
    #[arg(long, default_value_t = 0.01)]
    pub gap: f32,

    /// Evaluate the script once for the whole grid or once per cell
    #[arg(long, value_enum, default_value_t = EvalMode::PerCell)]
    pub mode: EvalMode,

    /// Rotation axis
    #[arg(long, value_enum, default_value_t = RotationAxis::Y)]
    pub axis: RotationAxis,

    /// Radians of rotation per frame
    #[arg(long, default_value_t = 0.01)]
    pub step: f32,

    /// Frames per second
    #[arg(long, default_value_t = 60.0)]
    pub fps: f32,

    /// Stop after this many frames
    #[arg(long)]
    pub frames: Option<u64>,

    /// Script deadline per reload, in milliseconds
    #[arg(long, default_value_t = 2000)]
    pub timeout_ms: u64,

    /// Write a JSON snapshot of the scene to this file
    #[arg(long)]
    pub snapshot: Option<PathBuf>,

    /// Frames between snapshots
    #[arg(long, default_value_t = 60)]
    pub snapshot_every: u64,
}

impl Cli {
    pub fn grid_config(&self) -> GridConfig {
        GridConfig {
            size: self.size,
            cell_size: self.cell_size,
            gap: self.gap,
        }
    }

    pub fn script_config(&self) -> ScriptConfig {
        ScriptConfig {
            timeout: Duration::from_millis(self.timeout_ms),
            ..ScriptConfig::default()
        }
    }

    pub fn rotation_config(&self) -> RotationConfig {
        RotationConfig {
            axis: self.axis,
            step: self.step,
        }
    }

    pub fn snapshot_config(&self) -> Option<SnapshotConfig> {
        self.snapshot.as_ref().map(|path| SnapshotConfig {
            path: path.clone(),
            every: self.snapshot_every,
        })
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    run_with(cli)
}

pub fn run_with(cli: Cli) -> Result<()> {
    let grid = Arc::new(Grid::build(cli.grid_config())?);
    log::info!(
        "Grid {}³ (cell {}, gap {}), {:?} mode",
        cli.size,
        cli.cell_size,
        cli.gap,
        cli.mode
    );

    let mut reloader = ColorReloader::new(
        ScriptEngine::new(cli.script_config()),
        Arc::clone(&grid),
        cli.mode,
    );
    let watcher = ReloadWatcher::start(&cli.script, WatchConfig::default(), move |path| {
        reloader.reload_and_log(path)
    })
    .with_context(|| format!("cannot watch {}", cli.script.display()))?;

    let mut scene = SceneGraph::new();
    if let Some(config) = cli.snapshot_config() {
        log::info!("Writing snapshots to {} every {} frames", config.path.display(), config.every);
        scene = scene.with_snapshots(config);
    }

    let mut visualiser = Visualiser::new(Arc::clone(&grid), cli.rotation_config(), scene);
    visualiser.register();

    let frame_time = Duration::from_secs_f32(1.0 / cli.fps.max(1.0));
    let mut last = Instant::now();
    loop {
        if cli.frames.is_some_and(|limit| visualiser.frame() >= limit) {
            break;
        }

        let now = Instant::now();
        visualiser.step(now - last);
        last = now;

        if let Some(remaining) = frame_time.checked_sub(last.elapsed()) {
            std::thread::sleep(remaining);
        }
    }

    log::info!("Rendered {} frames", visualiser.frame());
    watcher.close();
    Ok(())
}
