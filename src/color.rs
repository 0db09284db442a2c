//! Cell colors and the named palette exposed to scripts.

use serde::Serialize;

/// RGBA color with components conventionally in 0-1.
/// Alpha doubles as the cell opacity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    /// Light gray every cell starts with before the first reload.
    pub const NEUTRAL_GRAY: Color = Color::rgb(0.827, 0.827, 0.827);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn opacity(&self) -> f32 {
        self.a
    }

    /// Fully transparent cells are hidden and stop writing depth.
    pub fn is_transparent(&self) -> bool {
        self.a <= 0.0
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::NEUTRAL_GRAY
    }
}

/// Colors pre-bound as script constants.
///
/// `transparent` keeps a red tint so that a cell faded back in shows up.
pub const NAMED_COLORS: &[(&str, Color)] = &[
    ("red", Color::rgb(1.0, 0.0, 0.0)),
    ("green", Color::rgb(0.0, 1.0, 0.0)),
    ("blue", Color::rgb(0.0, 0.0, 1.0)),
    ("yellow", Color::rgb(1.0, 1.0, 0.0)),
    ("black", Color::rgb(0.0, 0.0, 0.0)),
    ("white", Color::rgb(1.0, 1.0, 1.0)),
    ("transparent", Color::rgba(1.0, 0.0, 0.0, 0.0)),
];

/// Look up a palette entry by name.
pub fn named(name: &str) -> Option<Color> {
    NAMED_COLORS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, c)| *c)
}
