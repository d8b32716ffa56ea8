use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::{ImageReader, RgbaImage};
use log::warn;
use tiny_skia::{Pixmap, PremultipliedColorU8};

use crate::color::Rgb;

/// Edge length of a recoloured glyph tile.
pub const GLYPH_TILE_SIZE: u32 = 64;

/// `A.png` .. `Z.png` under `dir`.
pub fn glyph_path(dir: &Path, ch: char) -> PathBuf {
    dir.join(format!("{ch}.png"))
}

pub fn load_glyph_image(path: &Path) -> Result<RgbaImage> {
    let image = ImageReader::open(path)
        .with_context(|| format!("failed to open glyph image {}", path.display()))?
        .decode()
        .with_context(|| format!("failed to decode glyph image {}", path.display()))?;
    Ok(image.to_rgba8())
}

/// Turns a dark-on-light glyph into a `GLYPH_TILE_SIZE` tile where the ink is
/// `color` and everything else is transparent.
///
/// Pixels are composited over white first, so transparent backgrounds count
/// as light.
pub fn recolor_glyph(source: &RgbaImage, color: Rgb) -> Option<Pixmap> {
    let resized = imageops::resize(source, GLYPH_TILE_SIZE, GLYPH_TILE_SIZE, FilterType::Triangle);
    let mut tile = Pixmap::new(GLYPH_TILE_SIZE, GLYPH_TILE_SIZE)?;
    let ink = PremultipliedColorU8::from_rgba(color.r, color.g, color.b, 255)?;
    for (pixel, out) in resized.pixels().zip(tile.pixels_mut()) {
        let [r, g, b, a] = pixel.0;
        let over_white = |channel: u8| {
            (u32::from(channel) * u32::from(a) + 255 * (255 - u32::from(a))) / 255
        };
        let brightness = (over_white(r) + over_white(g) + over_white(b)) / 3;
        *out = if brightness < 128 {
            ink
        } else {
            PremultipliedColorU8::TRANSPARENT
        };
    }
    Some(tile)
}

/// Append-only cache of recoloured glyph tiles keyed by `(char, colour)`.
#[derive(Debug, Default)]
pub struct GlyphCache {
    dir: Option<PathBuf>,
    sources: HashMap<char, Option<RgbaImage>>,
    tiles: HashMap<(char, Rgb), Option<Pixmap>>,
    warned: HashSet<char>,
}

impl GlyphCache {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self {
            dir,
            ..Self::default()
        }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn len(&self) -> usize {
        self.tiles.values().filter(|tile| tile.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tile for `ch` in `color`, or `None` when the asset is unavailable.
    pub fn tile(&mut self, ch: char, color: Rgb) -> Option<&Pixmap> {
        if !self.tiles.contains_key(&(ch, color)) {
            let tile = self
                .source(ch)
                .and_then(|image| recolor_glyph(image, color));
            self.tiles.insert((ch, color), tile);
        }
        self.tiles.get(&(ch, color)).and_then(Option::as_ref)
    }

    fn source(&mut self, ch: char) -> Option<&RgbaImage> {
        if !self.sources.contains_key(&ch) {
            let loaded = match &self.dir {
                Some(dir) => match load_glyph_image(&glyph_path(dir, ch)) {
                    Ok(image) => Some(image),
                    Err(err) => {
                        if self.warned.insert(ch) {
                            warn!("glyph '{ch}' unavailable, skipping: {err:#}");
                        }
                        None
                    }
                },
                None => None,
            };
            self.sources.insert(ch, loaded);
        }
        self.sources.get(&ch).and_then(Option::as_ref)
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgba, RgbaImage};

    use super::{glyph_path, recolor_glyph, GlyphCache, GLYPH_TILE_SIZE};
    use crate::color::Rgb;

    fn half_ink() -> RgbaImage {
        RgbaImage::from_fn(32, 32, |x, _| {
            if x < 16 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        })
    }

    #[test]
    fn dark_pixels_take_the_target_colour() {
        let tile = recolor_glyph(&half_ink(), Rgb::new(200, 10, 20)).expect("tile");
        assert_eq!(tile.width(), GLYPH_TILE_SIZE);
        let left = tile.pixel(4, 10).expect("left pixel");
        assert_eq!((left.red(), left.green(), left.blue(), left.alpha()), (200, 10, 20, 255));
        let right = tile.pixel(60, 10).expect("right pixel");
        assert_eq!(right.alpha(), 0);
    }

    #[test]
    fn cache_loads_from_disk_once_per_colour() {
        let dir = tempfile::tempdir().expect("tempdir");
        half_ink()
            .save(glyph_path(dir.path(), 'A'))
            .expect("write glyph");

        let mut cache = GlyphCache::new(Some(dir.path().to_path_buf()));
        assert!(cache.tile('A', Rgb::new(1, 2, 3)).is_some());
        assert!(cache.tile('A', Rgb::new(4, 5, 6)).is_some());
        assert!(cache.tile('A', Rgb::new(1, 2, 3)).is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn missing_assets_degrade_to_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cache = GlyphCache::new(Some(dir.path().to_path_buf()));
        assert!(cache.tile('Q', Rgb::new(1, 2, 3)).is_none());
        assert!(cache.tile('Q', Rgb::new(1, 2, 3)).is_none());
        assert!(GlyphCache::new(None).tile('Q', Rgb::new(0, 0, 0)).is_none());
        assert!(cache.is_empty());
    }
}
