pub mod color;
pub mod error;
pub mod grid;
pub mod rotation;
pub mod scene_graph;
pub mod visualiser;

// Scripting and hot reload
pub mod scripting;
pub mod script_diagnostics;
pub mod script_log;
pub mod reload;
pub mod watcher;

pub mod cli;
