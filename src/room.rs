use std::f32::consts::FRAC_PI_2;
use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use glam::{EulerRot, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::grid_layout::GridLayout;

/// Fallback texture edge used when a surface has not reported its size yet.
pub const BASE_TEXTURE_SIZE: u32 = 1024;
pub const DEFAULT_INSET: f32 = 0.01;

/// Letter-bearing interior faces of the room. The back wall is a destination
/// grid only and is modelled separately by [`BackWallGrid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Surface {
    Ceiling,
    Floor,
    Left,
    Right,
}

impl Surface {
    /// Scan order used when sourcing letters from wall cells.
    pub const SOURCES: [Surface; 4] = [
        Surface::Ceiling,
        Surface::Floor,
        Surface::Left,
        Surface::Right,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Surface::Ceiling => "ceiling",
            Surface::Floor => "floor",
            Surface::Left => "left",
            Surface::Right => "right",
        }
    }

    pub fn index(self) -> usize {
        match self {
            Surface::Ceiling => 0,
            Surface::Floor => 1,
            Surface::Left => 2,
            Surface::Right => 3,
        }
    }

    /// Orientation of a glyph lying flat against this surface. Glyphs end
    /// their flight at identity (facing the camera from the back wall).
    pub fn start_rotation(self) -> Quat {
        let (x, y) = match self {
            Surface::Ceiling => (FRAC_PI_2, 0.0),
            Surface::Floor => (-FRAC_PI_2, 0.0),
            Surface::Left => (0.0, -FRAC_PI_2),
            Surface::Right => (0.0, FRAC_PI_2),
        };
        Quat::from_euler(EulerRot::XYZ, x, y, 0.0)
    }

    pub fn text_color(self) -> &'static str {
        match self {
            Surface::Ceiling => "rgb(140, 140, 145)",
            Surface::Floor => "#4b5563",
            Surface::Left | Surface::Right => "#6b7280",
        }
    }

    /// Patch colour for a cell whose glyph has left.
    pub fn empty_color(self) -> &'static str {
        match self {
            Surface::Ceiling => "#9ca3af",
            Surface::Floor => "#4b5563",
            Surface::Left | Surface::Right => "#6b7280",
        }
    }

    /// Points from the surface plane into the room.
    pub fn emerge_offset(self) -> Vec3 {
        const DEPTH: f32 = 0.4;
        match self {
            Surface::Ceiling => Vec3::new(0.0, DEPTH, 0.0),
            Surface::Floor => Vec3::new(0.0, -DEPTH, 0.0),
            Surface::Left => Vec3::new(DEPTH, 0.0, 0.0),
            Surface::Right => Vec3::new(-DEPTH, 0.0, 0.0),
        }
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Surface {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ceiling" => Ok(Surface::Ceiling),
            "floor" => Ok(Surface::Floor),
            "left" => Ok(Surface::Left),
            "right" => Ok(Surface::Right),
            other => bail!("unknown surface '{other}' (expected ceiling, floor, left or right)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TextureSize {
    pub w: u32,
    pub h: u32,
}

impl TextureSize {
    pub const UNBUILT: TextureSize = TextureSize { w: 0, h: 0 };

    pub fn new(w: u32, h: u32) -> Self {
        Self { w, h }
    }

    pub fn is_built(&self) -> bool {
        self.w > 0 && self.h > 0
    }

    pub fn scaled(&self, factor: f32) -> Self {
        let scale = |value: u32| ((value as f32 * factor).round() as u32).max(1);
        Self {
            w: scale(self.w),
            h: scale(self.h),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RoomDimensions {
    pub width: f32,
    pub height: f32,
    pub depth: f32,
}

impl Default for RoomDimensions {
    fn default() -> Self {
        Self {
            width: 30.0,
            height: 10.0,
            depth: 30.0,
        }
    }
}

impl RoomDimensions {
    pub fn validate(&self) -> Result<()> {
        for (label, value) in [
            ("room.width", self.width),
            ("room.height", self.height),
            ("room.depth", self.depth),
        ] {
            if !value.is_finite() || value <= 0.0 {
                bail!("{label} must be finite and > 0, got {value}");
            }
        }
        Ok(())
    }

    /// Texture pixel on `surface` to world space.
    ///
    /// `u = px / w`, `v = 1 - py / h`: pixel row 0 is the top of the canvas.
    /// A zero-sized texture falls back to [`BASE_TEXTURE_SIZE`]. The returned
    /// point sits `inset` in front of the surface plane.
    pub fn pixel_to_world(
        &self,
        surface: Surface,
        px: f32,
        py: f32,
        size: TextureSize,
        inset: f32,
    ) -> Vec3 {
        let w = if size.w > 0 { size.w } else { BASE_TEXTURE_SIZE } as f32;
        let h = if size.h > 0 { size.h } else { BASE_TEXTURE_SIZE } as f32;
        let u = px / w;
        let v = 1.0 - py / h;
        self.surface_point(surface, u, v, inset)
    }

    /// Normalized `(u, v)` on `surface` to world space.
    pub fn surface_point(&self, surface: Surface, u: f32, v: f32, inset: f32) -> Vec3 {
        let (hw, hh, hd) = (self.width / 2.0, self.height / 2.0, self.depth / 2.0);
        match surface {
            Surface::Ceiling => Vec3::new(lerp(-hw, hw, u), hh - inset, lerp(-hd, hd, v)),
            Surface::Floor => Vec3::new(lerp(-hw, hw, u), -hh + inset, lerp(hd, -hd, v)),
            Surface::Left => Vec3::new(-hw + inset, lerp(-hh, hh, v), lerp(-hd, hd, u)),
            Surface::Right => Vec3::new(hw - inset, lerp(-hh, hh, v), lerp(hd, -hd, u)),
        }
    }
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Destination grid on the back wall (`z = -depth / 2`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BackWallGrid {
    pub rows: u32,
    pub cols: u32,
    pub texture: TextureSize,
    pub line_width: f32,
    pub target_offset: [f32; 3],
    pub flying_font_size: f32,
    pub font_scale_x: f32,
    pub font_scale_y: f32,
}

impl Default for BackWallGrid {
    fn default() -> Self {
        Self {
            rows: 20,
            cols: 60,
            texture: TextureSize::new(3000, 1000),
            line_width: 5.0,
            target_offset: [0.0, 0.0, 0.0],
            flying_font_size: 1.0,
            font_scale_x: 1.0,
            font_scale_y: 1.0,
        }
    }
}

impl BackWallGrid {
    pub fn validate(&self) -> Result<()> {
        if self.rows == 0 || self.cols == 0 {
            bail!(
                "back_wall grid must be at least 1x1, got {}x{}",
                self.rows,
                self.cols
            );
        }
        if !self.texture.is_built() {
            bail!(
                "back_wall.texture must be positive, got {}x{}",
                self.texture.w,
                self.texture.h
            );
        }
        if !self.flying_font_size.is_finite() || self.flying_font_size <= 0.0 {
            bail!("back_wall.flying_font_size must be finite and > 0");
        }
        for (label, value) in [
            ("back_wall.line_width", self.line_width),
            ("back_wall.font_scale_x", self.font_scale_x),
            ("back_wall.font_scale_y", self.font_scale_y),
        ] {
            if !value.is_finite() || value < 0.0 {
                bail!("{label} must be finite and >= 0, got {value}");
            }
        }
        if self.target_offset.iter().any(|value| !value.is_finite()) {
            bail!("back_wall.target_offset must be finite");
        }
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.rows as usize * self.cols as usize
    }

    pub fn layout(&self) -> GridLayout {
        GridLayout::new(
            self.texture.w as f32,
            self.texture.h as f32,
            self.rows,
            self.cols,
            self.line_width,
        )
    }

    /// `(row, col)` of the back-wall cell assigned to the `index`-th letter.
    pub fn cell_for_index(&self, index: usize) -> (u32, u32) {
        let cols = self.cols.max(1) as usize;
        ((index / cols) as u32, (index % cols) as u32)
    }

    /// World-space centre of the cell a letter with ordinal `index` lands in.
    pub fn target(&self, room: &RoomDimensions, index: usize) -> Vec3 {
        let (row, col) = self.cell_for_index(index);
        let cell_w = room.width / self.cols.max(1) as f32;
        let cell_h = room.height / self.rows.max(1) as f32;
        let [ox, oy, oz] = self.target_offset;
        Vec3::new(
            -room.width / 2.0 + (col as f32 + 0.5) * cell_w + ox,
            room.height / 2.0 - (row as f32 + 0.5) * cell_h + oy,
            -room.depth / 2.0 + 0.02 + oz,
        )
    }

    /// Per-axis scale that fits a flying glyph into one cell's content area.
    pub fn content_scale(&self, room: &RoomDimensions) -> (f32, f32) {
        let grid = self.layout();
        let content_w = grid.content_width * (room.width / self.texture.w.max(1) as f32);
        let content_h = grid.content_height * (room.height / self.texture.h.max(1) as f32);
        (
            content_w / self.flying_font_size * self.font_scale_x,
            content_h / self.flying_font_size * self.font_scale_y,
        )
    }
}
