//! Rasterizes surface glyph grids.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use log::debug;
use tiny_skia::{FilterQuality, Paint, Pixmap, PixmapPaint, Rect, Transform};

use crate::color::Rgb;
use crate::glyphs::GlyphCache;
use crate::grid_layout::{CellRect, GridLayout};
use crate::registry::{layout_grid_cells, GridCell};
use crate::room::{BackWallGrid, Surface, TextureSize};

/// Share of a cell's content area a glyph covers at font scale 1.
pub const GLYPH_FILL: f32 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLines {
    pub color: Rgb,
    pub alpha: u8,
}

impl GridLines {
    pub const HIDDEN: GridLines = GridLines {
        color: Rgb::new(100, 100, 105),
        alpha: 0,
    };

    pub fn is_visible(&self) -> bool {
        self.alpha > 0
    }
}

#[derive(Debug, Clone)]
pub struct SurfaceTextureRequest<'a> {
    pub surface: Surface,
    pub text: &'a str,
    pub size: TextureSize,
    pub rows: u32,
    pub cols: u32,
    pub line_width: f32,
    pub grid_lines: GridLines,
    pub text_color: Rgb,
    pub font_scale: (f32, f32),
    /// `(row, col)` cells to leave empty.
    pub removed: &'a BTreeSet<(u32, u32)>,
}

impl SurfaceTextureRequest<'_> {
    pub fn layout(&self) -> GridLayout {
        GridLayout::new(
            self.size.w as f32,
            self.size.h as f32,
            self.rows,
            self.cols,
            self.line_width,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackWallGlyph {
    pub index: usize,
    pub ch: char,
    pub color: Rgb,
}

#[derive(Debug)]
pub struct BuiltTexture {
    pub surface: Surface,
    pub size: TextureSize,
    pub cells: Vec<GridCell>,
    pub image: Option<Pixmap>,
}

pub trait SurfaceTextureBuilder {
    fn build(&mut self, request: &SurfaceTextureRequest<'_>) -> Result<BuiltTexture>;

    /// Flat image of the back-wall grid with `glyphs` in their cells.
    fn compose_back_wall(
        &mut self,
        _grid: &BackWallGrid,
        _grid_lines: GridLines,
        _glyphs: &[BackWallGlyph],
    ) -> Result<Option<Pixmap>> {
        Ok(None)
    }
}

/// Registers cells without drawing anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct LayoutOnlyBuilder;

impl SurfaceTextureBuilder for LayoutOnlyBuilder {
    fn build(&mut self, request: &SurfaceTextureRequest<'_>) -> Result<BuiltTexture> {
        Ok(BuiltTexture {
            surface: request.surface,
            size: request.size,
            cells: layout_grid_cells(request.text, &request.layout()),
            image: None,
        })
    }
}

#[derive(Debug, Default)]
pub struct PixmapTextureBuilder {
    glyphs: GlyphCache,
}

impl PixmapTextureBuilder {
    pub fn new(glyphs: GlyphCache) -> Self {
        Self { glyphs }
    }

    pub fn glyphs(&self) -> &GlyphCache {
        &self.glyphs
    }
}

impl SurfaceTextureBuilder for PixmapTextureBuilder {
    fn build(&mut self, request: &SurfaceTextureRequest<'_>) -> Result<BuiltTexture> {
        let grid = request.layout();
        let cells = layout_grid_cells(request.text, &grid);
        let mut pixmap = Pixmap::new(request.size.w, request.size.h).with_context(|| {
            format!(
                "failed to create {}x{} pixmap for {}",
                request.size.w, request.size.h, request.surface
            )
        })?;

        let mut drawn = 0_usize;
        for cell in &cells {
            if cell.ch == ' ' || request.removed.contains(&(cell.row, cell.col)) {
                continue;
            }
            let Some(tile) = self.glyphs.tile(cell.ch, request.text_color) else {
                continue;
            };
            draw_tile(
                &mut pixmap,
                tile,
                grid.content_rect(cell.row, cell.col),
                request.font_scale,
            );
            drawn += 1;
        }
        if request.grid_lines.is_visible() {
            stroke_grid(&mut pixmap, &grid, request.grid_lines);
        }
        debug!(
            "rasterized {} texture {}x{}: {drawn} glyph(s), {} removed",
            request.surface,
            request.size.w,
            request.size.h,
            request.removed.len()
        );

        Ok(BuiltTexture {
            surface: request.surface,
            size: request.size,
            cells,
            image: Some(pixmap),
        })
    }

    fn compose_back_wall(
        &mut self,
        grid: &BackWallGrid,
        grid_lines: GridLines,
        glyphs: &[BackWallGlyph],
    ) -> Result<Option<Pixmap>> {
        let layout = grid.layout();
        let mut pixmap = Pixmap::new(grid.texture.w, grid.texture.h).with_context(|| {
            format!(
                "failed to create {}x{} back wall pixmap",
                grid.texture.w, grid.texture.h
            )
        })?;
        for glyph in glyphs {
            if glyph.index >= grid.capacity() {
                continue;
            }
            let (row, col) = grid.cell_for_index(glyph.index);
            if let Some(tile) = self.glyphs.tile(glyph.ch, glyph.color) {
                draw_tile(
                    &mut pixmap,
                    tile,
                    layout.content_rect(row, col),
                    (grid.font_scale_x, grid.font_scale_y),
                );
            }
        }
        if grid_lines.is_visible() {
            stroke_grid(&mut pixmap, &layout, grid_lines);
        }
        Ok(Some(pixmap))
    }
}

/// Draws `tile` centred in `content`, covering [`GLYPH_FILL`] of it per axis.
fn draw_tile(pixmap: &mut Pixmap, tile: &Pixmap, content: CellRect, (scale_x, scale_y): (f32, f32)) {
    let glyph_w = content.width * scale_x * GLYPH_FILL;
    let glyph_h = content.height * scale_y * GLYPH_FILL;
    if glyph_w <= 0.0 || glyph_h <= 0.0 {
        return;
    }
    let x = content.x + (content.width - glyph_w) / 2.0;
    let y = content.y + (content.height - glyph_h) / 2.0;
    let paint = PixmapPaint {
        quality: FilterQuality::Bilinear,
        ..PixmapPaint::default()
    };
    let transform = Transform::from_row(
        glyph_w / tile.width() as f32,
        0.0,
        0.0,
        glyph_h / tile.height() as f32,
        x,
        y,
    );
    pixmap.draw_pixmap(0, 0, tile.as_ref(), &paint, transform, None);
}

/// Lines on every cell boundary, outer edges included.
fn stroke_grid(pixmap: &mut Pixmap, grid: &GridLayout, lines: GridLines) {
    if grid.line_width <= 0.0 {
        return;
    }
    let mut paint = Paint::default();
    paint.set_color(lines.color.to_color(lines.alpha));
    let (width, height) = (pixmap.width() as f32, pixmap.height() as f32);
    let half = grid.line_width / 2.0;

    for col in 0..=grid.cols {
        let x = col as f32 * grid.cell_width;
        if let Some(rect) = Rect::from_xywh(x - half, 0.0, grid.line_width, height) {
            pixmap.fill_rect(rect, &paint, Transform::identity(), None);
        }
    }
    for row in 0..=grid.rows {
        let y = row as f32 * grid.cell_height;
        if let Some(rect) = Rect::from_xywh(0.0, y - half, width, grid.line_width) {
            pixmap.fill_rect(rect, &paint, Transform::identity(), None);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use image::{Rgba, RgbaImage};

    use super::{
        BackWallGlyph, GridLines, LayoutOnlyBuilder, PixmapTextureBuilder, SurfaceTextureBuilder,
        SurfaceTextureRequest,
    };
    use crate::color::Rgb;
    use crate::glyphs::{glyph_path, GlyphCache};
    use crate::room::{BackWallGrid, Surface, TextureSize};

    fn request<'a>(removed: &'a BTreeSet<(u32, u32)>) -> SurfaceTextureRequest<'a> {
        SurfaceTextureRequest {
            surface: Surface::Left,
            text: "AB A",
            size: TextureSize::new(200, 100),
            rows: 2,
            cols: 4,
            line_width: 0.0,
            grid_lines: GridLines::HIDDEN,
            text_color: Rgb::new(10, 20, 30),
            font_scale: (1.0, 1.0),
            removed,
        }
    }

    fn solid_glyphs() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        for ch in ['A', 'B'] {
            RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255]))
                .save(glyph_path(dir.path(), ch))
                .expect("write glyph");
        }
        dir
    }

    #[test]
    fn layout_only_registers_every_cell() {
        let removed = BTreeSet::from([(0, 0)]);
        let built = LayoutOnlyBuilder.build(&request(&removed)).expect("build");
        assert_eq!(built.cells.len(), 8);
        assert!(built.image.is_none());
        // removed cells stay registered
        assert_eq!(built.cells[0].ch, 'A');
        assert_eq!((built.cells[0].px, built.cells[0].py), (25.0, 25.0));
    }

    #[test]
    fn removed_and_blank_cells_stay_transparent() {
        let glyphs = solid_glyphs();
        let mut builder =
            PixmapTextureBuilder::new(GlyphCache::new(Some(glyphs.path().to_path_buf())));
        let removed = BTreeSet::from([(0, 1)]);
        let built = builder.build(&request(&removed)).expect("build");
        let image = built.image.expect("pixmap");

        let drawn = image.pixel(25, 25).expect("pixel");
        assert_eq!(drawn.alpha(), 255);
        assert_eq!((drawn.red(), drawn.green(), drawn.blue()), (10, 20, 30));
        assert_eq!(image.pixel(75, 25).expect("removed").alpha(), 0);
        assert_eq!(image.pixel(125, 25).expect("space").alpha(), 0);
        // glyph margin: 5% of the content area on each side
        assert_eq!(image.pixel(1, 25).expect("margin").alpha(), 0);
    }

    #[test]
    fn visible_grid_lines_are_stroked() {
        let mut builder = PixmapTextureBuilder::default();
        let removed = BTreeSet::new();
        let mut req = request(&removed);
        req.line_width = 4.0;
        req.grid_lines = GridLines {
            color: Rgb::new(255, 0, 0),
            alpha: 255,
        };
        let image = builder.build(&req).expect("build").image.expect("pixmap");
        assert_eq!(image.pixel(50, 10).expect("line").red(), 255);
        assert_eq!(image.pixel(25, 25).expect("cell").alpha(), 0);
    }

    #[test]
    fn back_wall_places_glyphs_by_index() {
        let glyphs = solid_glyphs();
        let mut builder =
            PixmapTextureBuilder::new(GlyphCache::new(Some(glyphs.path().to_path_buf())));
        let grid = BackWallGrid {
            rows: 2,
            cols: 3,
            texture: TextureSize::new(300, 200),
            ..BackWallGrid::default()
        };
        let placed = [BackWallGlyph {
            index: 4,
            ch: 'B',
            color: Rgb::new(0, 200, 0),
        }];
        let image = builder
            .compose_back_wall(&grid, GridLines::HIDDEN, &placed)
            .expect("compose")
            .expect("pixmap");
        assert_eq!(image.pixel(150, 150).expect("cell 4").green(), 200);
        assert_eq!(image.pixel(50, 50).expect("cell 0").alpha(), 0);

        let none = LayoutOnlyBuilder
            .compose_back_wall(&grid, GridLines::HIDDEN, &placed)
            .expect("compose");
        assert!(none.is_none());
    }
}
