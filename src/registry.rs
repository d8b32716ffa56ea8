//! Per-surface glyph registries: which character occupies which grid cell.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::grid_layout::GridLayout;
use crate::room::TextureSize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    pub row: u32,
    pub col: u32,
    pub ch: char,
    /// Cell centre in texture pixels.
    pub px: f32,
    pub py: f32,
}

/// A surface's registry together with the resolution it was laid out for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SurfaceCells {
    pub cells: Vec<GridCell>,
    pub texture: TextureSize,
}

impl SurfaceCells {
    pub fn new(cells: Vec<GridCell>, texture: TextureSize) -> Self {
        Self { cells, texture }
    }

    pub fn get(&self, row: u32, col: u32) -> Option<&GridCell> {
        self.cells
            .iter()
            .find(|cell| cell.row == row && cell.col == col)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Occurrences of each letter `A`..=`Z`.
pub type LetterCounts = BTreeMap<char, usize>;

pub fn is_source_letter(ch: char) -> bool {
    ch.is_ascii_uppercase()
}

/// Uppercases wall text and folds any whitespace to a single-cell space.
pub fn wall_chars(text: &str) -> Vec<char> {
    text.chars()
        .map(|ch| {
            if ch.is_whitespace() {
                ' '
            } else {
                ch.to_ascii_uppercase()
            }
        })
        .collect()
}

/// Fills `grid` row-major from `text`, repeating it until every cell is taken.
pub fn layout_grid_cells(text: &str, grid: &GridLayout) -> Vec<GridCell> {
    let chars = wall_chars(text);
    if chars.is_empty() {
        return Vec::new();
    }
    grid.positions()
        .enumerate()
        .map(|(index, (row, col))| {
            let (px, py) = grid.cell_center(row, col);
            GridCell {
                row,
                col,
                ch: chars[index % chars.len()],
                px,
                py,
            }
        })
        .collect()
}

/// How many times each letter appears when `text` is cycled over a
/// `rows x cols` grid.
pub fn count_grid_letters(text: &str, rows: u32, cols: u32) -> LetterCounts {
    let chars = wall_chars(text);
    let mut counts = LetterCounts::new();
    if chars.is_empty() {
        return counts;
    }
    let total = rows as usize * cols as usize;
    for index in 0..total {
        let ch = chars[index % chars.len()];
        if is_source_letter(ch) {
            *counts.entry(ch).or_default() += 1;
        }
    }
    counts
}

pub fn count_letters(text: &str) -> LetterCounts {
    let mut counts = LetterCounts::new();
    for ch in text.chars().map(|ch| ch.to_ascii_uppercase()) {
        if is_source_letter(ch) {
            *counts.entry(ch).or_default() += 1;
        }
    }
    counts
}

pub fn merge_counts(into: &mut LetterCounts, from: &LetterCounts) {
    for (ch, count) in from {
        *into.entry(*ch).or_default() += count;
    }
}
