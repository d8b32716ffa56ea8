/// Pixel geometry of a uniform glyph grid drawn into a texture.
///
/// Each cell is `cell_width x cell_height`; the drawable content area is the
/// cell shrunk by half a grid line on every side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLayout {
    pub rows: u32,
    pub cols: u32,
    pub cell_width: f32,
    pub cell_height: f32,
    pub content_inset: f32,
    pub content_width: f32,
    pub content_height: f32,
    pub line_width: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl CellRect {
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

impl GridLayout {
    pub fn new(width: f32, height: f32, rows: u32, cols: u32, line_width: f32) -> Self {
        let rows = rows.max(1);
        let cols = cols.max(1);
        let line_width = if line_width.is_finite() {
            line_width.max(0.0)
        } else {
            0.0
        };
        let cell_width = width / cols as f32;
        let cell_height = height / rows as f32;

        Self {
            rows,
            cols,
            cell_width,
            cell_height,
            content_inset: line_width / 2.0,
            content_width: (cell_width - line_width).max(0.0),
            content_height: (cell_height - line_width).max(0.0),
            line_width,
        }
    }

    pub fn cell_count(&self) -> usize {
        self.rows as usize * self.cols as usize
    }

    pub fn cell_rect(&self, row: u32, col: u32) -> CellRect {
        CellRect {
            x: col as f32 * self.cell_width,
            y: row as f32 * self.cell_height,
            width: self.cell_width,
            height: self.cell_height,
        }
    }

    pub fn content_rect(&self, row: u32, col: u32) -> CellRect {
        let cell = self.cell_rect(row, col);
        CellRect {
            x: cell.x + self.content_inset,
            y: cell.y + self.content_inset,
            width: self.content_width,
            height: self.content_height,
        }
    }

    pub fn cell_center(&self, row: u32, col: u32) -> (f32, f32) {
        self.cell_rect(row, col).center()
    }

    /// Row-major walk over every `(row, col)` in the grid.
    pub fn positions(&self) -> impl Iterator<Item = (u32, u32)> {
        let cols = self.cols;
        (0..self.rows).flat_map(move |row| (0..cols).map(move |col| (row, col)))
    }
}

pub fn cell_key(row: u32, col: u32) -> String {
    format!("{row},{col}")
}
