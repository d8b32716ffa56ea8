use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::color::{parse_color, Rgb};
use crate::flight::{FlightGeometry, FlightTimings};
use crate::fracture::FractureLayout;
use crate::registry::{count_grid_letters, merge_counts, LetterCounts};
use crate::room::{BackWallGrid, RoomDimensions, Surface, TextureSize, DEFAULT_INSET};
use crate::store::{StoreSettings, DEFAULT_MAX_LIVE_LETTERS};
use crate::texture::GridLines;

pub const CURRENT_VERSION: u32 = 1;

const CEILING_TEXT: &str = "THE QUICK BROWN FOX JUMPS OVER THE LAZY DOG ";
const FLOOR_TEXT: &str = "PACK MY BOX WITH FIVE DOZEN LIQUOR JUGS ";
const LEFT_TEXT: &str = "SPHINX OF BLACK QUARTZ JUDGE MY VOW ";
const RIGHT_TEXT: &str = "HOW VEXINGLY QUICK DAFT ZEBRAS JUMP ";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SurfaceConfig {
    /// Flat wall text, repeated row-major across the grid.
    pub text: String,
    pub texture: TextureSize,
    pub rows: u32,
    pub cols: u32,
    pub line_width: f32,
    pub font_scale_x: f32,
    pub font_scale_y: f32,
    /// Overrides the surface's default glyph colour.
    pub text_color: Option<String>,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            text: CEILING_TEXT.to_string(),
            texture: TextureSize::new(1024, 1024),
            rows: 25,
            cols: 25,
            line_width: 5.0,
            font_scale_x: 1.0,
            font_scale_y: 1.0,
            text_color: None,
        }
    }
}

impl SurfaceConfig {
    fn wall(text: &str) -> Self {
        Self {
            text: text.to_string(),
            texture: TextureSize::new(1536, 512),
            rows: 10,
            cols: 30,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            bail!("text must contain at least one glyph");
        }
        if self.rows == 0 || self.cols == 0 {
            bail!("grid must be at least 1x1, got {}x{}", self.rows, self.cols);
        }
        if !self.texture.is_built() {
            bail!(
                "texture must be positive, got {}x{}",
                self.texture.w,
                self.texture.h
            );
        }
        if !self.line_width.is_finite() || self.line_width < 0.0 {
            bail!("line_width must be finite and >= 0");
        }
        for (label, value) in [
            ("font_scale_x", self.font_scale_x),
            ("font_scale_y", self.font_scale_y),
        ] {
            if !value.is_finite() || value <= 0.0 {
                bail!("{label} must be finite and > 0, got {value}");
            }
        }
        Ok(())
    }

    pub fn text_color(&self, surface: Surface) -> Rgb {
        parse_color(self.text_color.as_deref().unwrap_or(surface.text_color()))
    }

    pub fn capacity(&self) -> LetterCounts {
        count_grid_letters(&self.text, self.rows, self.cols)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SurfaceSet {
    pub ceiling: SurfaceConfig,
    pub floor: SurfaceConfig,
    pub left: SurfaceConfig,
    pub right: SurfaceConfig,
}

impl Default for SurfaceSet {
    fn default() -> Self {
        Self {
            ceiling: SurfaceConfig::default(),
            floor: SurfaceConfig {
                text: FLOOR_TEXT.to_string(),
                ..SurfaceConfig::default()
            },
            left: SurfaceConfig::wall(LEFT_TEXT),
            right: SurfaceConfig::wall(RIGHT_TEXT),
        }
    }
}

impl SurfaceSet {
    pub fn get(&self, surface: Surface) -> &SurfaceConfig {
        match surface {
            Surface::Ceiling => &self.ceiling,
            Surface::Floor => &self.floor,
            Surface::Left => &self.left,
            Surface::Right => &self.right,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct GridLineConfig {
    pub color: String,
    /// 0 hides the lines.
    pub alpha: f32,
}

impl Default for GridLineConfig {
    fn default() -> Self {
        Self {
            color: "rgb(100, 100, 105)".to_string(),
            alpha: 0.0,
        }
    }
}

impl GridLineConfig {
    pub fn to_grid_lines(&self) -> GridLines {
        GridLines {
            color: parse_color(&self.color),
            alpha: (self.alpha.clamp(0.0, 1.0) * 255.0).round() as u8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SceneConfig {
    pub version: u32,
    pub room: RoomDimensions,
    pub inset: f32,
    pub max_live_letters: usize,
    pub timings: FlightTimings,
    pub back_wall: BackWallGrid,
    pub surfaces: SurfaceSet,
    pub grid_lines: GridLineConfig,
    /// Directory holding `A.png` .. `Z.png`. Relative paths resolve against
    /// the config file.
    pub glyph_dir: Option<PathBuf>,
    pub fracture: FractureLayout,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            room: RoomDimensions::default(),
            inset: DEFAULT_INSET,
            max_live_letters: DEFAULT_MAX_LIVE_LETTERS,
            timings: FlightTimings::default(),
            back_wall: BackWallGrid::default(),
            surfaces: SurfaceSet::default(),
            grid_lines: GridLineConfig::default(),
            glyph_dir: None,
            fracture: FractureLayout::default(),
        }
    }
}

impl SceneConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != CURRENT_VERSION {
            bail!(
                "unsupported scene version {} (expected {CURRENT_VERSION})",
                self.version
            );
        }
        self.room.validate()?;
        self.back_wall.validate()?;
        if !self.inset.is_finite() || self.inset < 0.0 {
            bail!("inset must be finite and >= 0, got {}", self.inset);
        }
        for (label, value) in [
            ("timings.prepare", self.timings.prepare),
            ("timings.fly", self.timings.fly),
        ] {
            if !value.is_finite() || value < 0.0 {
                bail!("{label} must be finite and >= 0, got {value}");
            }
        }
        if self.max_live_letters == 0 {
            bail!("max_live_letters must be > 0");
        }
        if self.max_live_letters > self.back_wall.capacity() {
            bail!(
                "max_live_letters ({}) exceeds the {}x{} back wall ({} cells); affixed letters would overlap",
                self.max_live_letters,
                self.back_wall.rows,
                self.back_wall.cols,
                self.back_wall.capacity()
            );
        }
        if !self.grid_lines.alpha.is_finite() || !(0.0..=1.0).contains(&self.grid_lines.alpha) {
            bail!("grid_lines.alpha must be within [0, 1]");
        }
        for surface in Surface::SOURCES {
            self.surfaces
                .get(surface)
                .validate()
                .with_context(|| format!("invalid surfaces.{surface}"))?;
        }
        let f = &self.fracture;
        if [f.side, f.ceiling, f.floor]
            .iter()
            .any(|value| !value.is_finite() || *value < 0.0)
        {
            bail!("fracture dimensions must be finite and >= 0");
        }
        if f.side * 2.0 >= 100.0 || f.ceiling + f.floor >= 100.0 {
            bail!("fracture layout does not fit inside the viewport");
        }
        Ok(())
    }

    /// How many of each letter the four walls can supply in total.
    pub fn letter_capacity(&self) -> LetterCounts {
        let mut total = LetterCounts::new();
        for surface in Surface::SOURCES {
            merge_counts(&mut total, &self.surfaces.get(surface).capacity());
        }
        total
    }

    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            room: self.room,
            inset: self.inset,
            max_live_letters: self.max_live_letters,
        }
    }

    pub fn flight_geometry(&self) -> FlightGeometry {
        FlightGeometry {
            room: self.room,
            back_wall: self.back_wall,
            timings: self.timings,
            inset: self.inset,
        }
    }
}

/// Parses `contents` as a scene document. `origin` names the source in errors.
pub fn parse_scene_config(contents: &str, origin: &str) -> Result<SceneConfig> {
    if contents.trim().is_empty() {
        return Ok(SceneConfig::default());
    }
    serde_yaml::from_str(contents).map_err(|error| {
        let location = error
            .location()
            .map(|location| format!("line {}, column {}", location.line(), location.column()))
            .unwrap_or_else(|| "unknown location".to_owned());
        anyhow!("failed to parse yaml in {origin} at {location}: {error}")
    })
}

pub fn load_scene_config(path: &Path) -> Result<SceneConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read scene {}", path.display()))?;
    let mut config = parse_scene_config(&contents, &path.display().to_string())?;

    if let Some(dir) = &config.glyph_dir {
        if dir.is_relative() {
            let base = path
                .parent()
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
            config.glyph_dir = Some(base.join(dir));
        }
    }
    config
        .validate()
        .with_context(|| format!("invalid scene {}", path.display()))?;
    Ok(config)
}
