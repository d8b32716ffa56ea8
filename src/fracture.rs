//! Flat cement ceiling that shatters into Voronoi cells on click.
//!
//! The ceiling is the trapezoid between the top edge of the viewport and the
//! line `y = ceiling`, narrowed by `side` at the bottom for perspective.
//! Everything is stepped in whole frames with plain Euler integration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tiny_skia::{Color, FillRule, Paint, PathBuilder, Pixmap, Stroke, Transform};

use crate::hash::SeededRng;

pub type Point = (f32, f32);

pub const SEED_ROWS: u32 = 10;
pub const IMPACT_RADIUS: f32 = 100.0;
/// Cells out to this multiple of the impact radius break half the time.
pub const OUTER_IMPACT_FACTOR: f32 = 1.3;
pub const GRAVITY: f32 = 0.6;
pub const AIR_DRAG: f32 = 0.98;
pub const FLOOR_FRICTION: f32 = 0.5;
/// Debris rests this far above the floor line.
pub const FLOOR_CLEARANCE: f32 = 10.0;
pub const OFFSCREEN_MARGIN: f32 = 100.0;

/// Room outline in `vmin` units (1 vmin = 1% of the shorter viewport edge).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FractureLayout {
    pub side: f32,
    pub ceiling: f32,
    pub floor: f32,
}

impl Default for FractureLayout {
    fn default() -> Self {
        Self {
            side: 12.0,
            ceiling: 35.0,
            floor: 6.0,
        }
    }
}

/// [`FractureLayout`] resolved to pixels for one viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CeilingGeometry {
    pub width: f32,
    pub height: f32,
    pub side: f32,
    pub ceiling: f32,
    pub floor: f32,
}

impl CeilingGeometry {
    pub fn new(width: u32, height: u32, layout: &FractureLayout) -> Self {
        let vmin = width.min(height) as f32 / 100.0;
        Self {
            width: width as f32,
            height: height as f32,
            side: layout.side * vmin,
            ceiling: layout.ceiling * vmin,
            floor: layout.floor * vmin,
        }
    }

    /// Whether `(x, y)` lies on the ceiling trapezoid.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        if y < 0.0 || y > self.ceiling || self.ceiling <= 0.0 {
            return false;
        }
        let t = y / self.ceiling;
        x >= self.side * t && x <= self.width - self.side * t
    }

    pub fn outline(&self) -> [Point; 4] {
        [
            (0.0, 0.0),
            (self.width, 0.0),
            (self.width - self.side, self.ceiling),
            (self.side, self.ceiling),
        ]
    }

    /// y coordinate debris comes to rest on.
    pub fn rest_line(&self) -> f32 {
        self.height - self.floor - FLOOR_CLEARANCE
    }
}

/// Cheap value noise in `[0, 1)`.
pub fn noise(x: f32, y: f32) -> f32 {
    let n = (f64::from(x) * 12.9898 + f64::from(y) * 78.233).sin() * 43758.5453;
    (n - n.floor()) as f32
}

fn cement_brightness(center: Point, depth: f32) -> f32 {
    110.0 + (noise(center.0 * 0.1, center.1 * 0.1) * 30.0).floor() - depth * 20.0
}

/// Seeds laid out in rows that widen toward the viewer.
pub fn generate_seeds(geometry: &CeilingGeometry, rng: &mut SeededRng) -> Vec<Point> {
    let mut seeds = Vec::new();
    let last_row = (SEED_ROWS - 1) as f32;
    for row in 0..SEED_ROWS {
        let y = row as f32 / last_row * geometry.ceiling;
        let t = row as f32 / last_row;
        let x_min = geometry.side * t;
        let row_width = geometry.width - 2.0 * geometry.side * t;
        let count = 3 + (row as f32 / last_row * 5.0).floor() as u32;
        for col in 0..count {
            let x = x_min + col as f32 / (count - 1) as f32 * row_width;
            let jitter = rng.centered(0.25 * row_width / count as f32);
            seeds.push((x + jitter, y + rng.centered(5.0)));
        }
    }
    seeds
}

/// Keeps the part of `polygon` where `a * x + b * y <= c`.
fn clip_half_plane(polygon: &[Point], a: f32, b: f32, c: f32) -> Vec<Point> {
    let side = |p: Point| a * p.0 + b * p.1 - c;
    let mut clipped = Vec::with_capacity(polygon.len() + 1);
    for (index, &current) in polygon.iter().enumerate() {
        let next = polygon[(index + 1) % polygon.len()];
        let (sc, sn) = (side(current), side(next));
        if sc <= 0.0 {
            clipped.push(current);
        }
        if (sc <= 0.0) != (sn <= 0.0) {
            let t = sc / (sc - sn);
            clipped.push((
                current.0 + (next.0 - current.0) * t,
                current.1 + (next.1 - current.1) * t,
            ));
        }
    }
    clipped
}

/// Voronoi cell of every seed, clipped to the `width x height` rectangle.
pub fn voronoi_cells(seeds: &[Point], width: f32, height: f32) -> Vec<Vec<Point>> {
    let bounds = vec![(0.0, 0.0), (width, 0.0), (width, height), (0.0, height)];
    seeds
        .iter()
        .enumerate()
        .map(|(i, &(sx, sy))| {
            let mut cell = bounds.clone();
            for (j, &(ox, oy)) in seeds.iter().enumerate() {
                if i == j || (ox == sx && oy == sy) {
                    continue;
                }
                // closer to seed i than to seed j
                let a = ox - sx;
                let b = oy - sy;
                let c = (ox * ox + oy * oy - sx * sx - sy * sy) / 2.0;
                cell = clip_half_plane(&cell, a, b, c);
                if cell.is_empty() {
                    break;
                }
            }
            cell
        })
        .collect()
}

/// Clips `polygon` to a convex, clockwise (screen space) `outline`.
pub fn clip_to_convex(polygon: &[Point], outline: &[Point]) -> Vec<Point> {
    let mut clipped = polygon.to_vec();
    for (index, &(x0, y0)) in outline.iter().enumerate() {
        if clipped.is_empty() {
            break;
        }
        let (x1, y1) = outline[(index + 1) % outline.len()];
        // inside is to the right of the edge direction in y-down space
        let a = y0 - y1;
        let b = x1 - x0;
        clipped = clip_half_plane(&clipped, -a, -b, -(a * x0 + b * y0));
    }
    clipped
}

pub fn centroid(polygon: &[Point]) -> Point {
    if polygon.is_empty() {
        return (0.0, 0.0);
    }
    let (sx, sy) = polygon
        .iter()
        .fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
    let n = polygon.len() as f32;
    (sx / n, sy / n)
}

pub fn point_in_polygon(polygon: &[Point], (x, y): Point) -> bool {
    let mut inside = false;
    let mut j = polygon.len().wrapping_sub(1);
    for i in 0..polygon.len() {
        let (xi, yi) = polygon[i];
        let (xj, yj) = polygon[j];
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellState {
    Intact,
    Fractured,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Debris {
    /// Outline relative to the piece's centre.
    pub shape: Vec<Point>,
    pub x: f32,
    pub y: f32,
    pub depth: f32,
    pub vx: f32,
    pub vy: f32,
    pub rotation: f32,
    pub rotation_speed: f32,
    pub base_scale: f32,
    pub scale: f32,
    pub brightness: f32,
}

/// Result of advancing one debris piece by a frame.
enum DebrisStep {
    Moving,
    Removed,
}

impl Debris {
    fn step(&mut self, geometry: &CeilingGeometry) -> DebrisStep {
        let barrier = geometry.height - geometry.floor;
        self.vy += GRAVITY;
        self.vx *= AIR_DRAG;
        self.y += self.vy;
        self.x += self.vx;

        let progress = if barrier > 0.0 {
            (self.y / barrier).clamp(0.0, 1.0)
        } else {
            1.0
        };
        self.scale = self.base_scale * (1.0 + progress * 0.3);

        let rest = geometry.rest_line();
        if self.y >= rest {
            self.y = rest;
            self.vx *= FLOOR_FRICTION;
            if self.vy.abs() < 1.0 {
                return DebrisStep::Removed;
            }
            self.vy = -self.vy * FLOOR_FRICTION;
        }

        if self.y > geometry.height + OFFSCREEN_MARGIN
            || self.x < -OFFSCREEN_MARGIN
            || self.x > geometry.width + OFFSCREEN_MARGIN
        {
            return DebrisStep::Removed;
        }
        self.rotation += self.rotation_speed;
        DebrisStep::Moving
    }

    /// Outline in viewport pixels after rotation and scaling.
    pub fn outline(&self) -> Vec<Point> {
        let (sin, cos) = self.rotation.sin_cos();
        self.shape
            .iter()
            .map(|&(px, py)| {
                let (px, py) = (px * self.scale, py * self.scale);
                (self.x + px * cos - py * sin, self.y + px * sin + py * cos)
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct CeilingFracture {
    geometry: CeilingGeometry,
    seeds: Vec<Point>,
    cells: Vec<Vec<Point>>,
    states: Vec<CellState>,
    debris: Vec<Debris>,
    rng: SeededRng,
}

impl CeilingFracture {
    pub fn new(width: u32, height: u32, layout: &FractureLayout, seed: u64) -> Self {
        let geometry = CeilingGeometry::new(width, height, layout);
        let mut rng = SeededRng::new(seed);
        let seeds = generate_seeds(&geometry, &mut rng);
        let cells = voronoi_cells(&seeds, geometry.width, geometry.height);
        let states = vec![CellState::Intact; seeds.len()];
        Self {
            geometry,
            seeds,
            cells,
            states,
            debris: Vec::new(),
            rng,
        }
    }

    pub fn geometry(&self) -> &CeilingGeometry {
        &self.geometry
    }

    pub fn seeds(&self) -> &[Point] {
        &self.seeds
    }

    pub fn cells(&self) -> &[Vec<Point>] {
        &self.cells
    }

    pub fn states(&self) -> &[CellState] {
        &self.states
    }

    pub fn debris(&self) -> &[Debris] {
        &self.debris
    }

    pub fn intact_count(&self) -> usize {
        self.states
            .iter()
            .filter(|state| **state == CellState::Intact)
            .count()
    }

    /// Breaks intact cells around a click. Returns how many broke; clicks off
    /// the ceiling do nothing.
    pub fn click(&mut self, x: f32, y: f32) -> usize {
        if !self.geometry.contains(x, y) {
            return 0;
        }
        let outline = self.geometry.outline();
        let mut broken = 0;
        for index in 0..self.seeds.len() {
            if self.states[index] == CellState::Fractured {
                continue;
            }
            let (sx, sy) = self.seeds[index];
            let distance = ((sx - x).powi(2) + (sy - y).powi(2)).sqrt();
            let breaks = distance < IMPACT_RADIUS
                || (distance < IMPACT_RADIUS * OUTER_IMPACT_FACTOR && self.rng.chance(0.5));
            if !breaks {
                continue;
            }
            self.states[index] = CellState::Fractured;
            broken += 1;

            let visible = clip_to_convex(&self.cells[index], &outline);
            if visible.len() < 3 {
                continue;
            }
            let center = centroid(&visible);
            let depth = if self.geometry.ceiling > 0.0 {
                center.1 / self.geometry.ceiling
            } else {
                0.0
            };
            let angle = (center.1 - y).atan2(center.0 - x);
            let force = (1.0 - distance / IMPACT_RADIUS).max(0.0) * 6.0;
            let scale = 1.0 + depth * 0.2;
            self.debris.push(Debris {
                shape: visible
                    .iter()
                    .map(|&(px, py)| (px - center.0, py - center.1))
                    .collect(),
                x: center.0,
                y: center.1,
                depth,
                vx: angle.cos() * force + self.rng.centered(1.5),
                vy: angle.sin() * force - 3.0,
                rotation: 0.0,
                rotation_speed: self.rng.centered(0.075),
                base_scale: scale,
                scale,
                brightness: cement_brightness(center, depth),
            });
        }
        broken
    }

    /// Advances all debris by one frame.
    pub fn step(&mut self) {
        let geometry = self.geometry;
        self.debris
            .retain_mut(|piece| matches!(piece.step(&geometry), DebrisStep::Moving));
    }

    pub fn render(&self) -> Result<Pixmap> {
        let mut pixmap = Pixmap::new(self.geometry.width as u32, self.geometry.height as u32)
            .context("failed to create fracture pixmap")?;
        let outline = self.geometry.outline();
        let border = Stroke {
            width: 2.0,
            ..Stroke::default()
        };

        for (index, cell) in self.cells.iter().enumerate() {
            if self.states[index] != CellState::Intact {
                continue;
            }
            let visible = clip_to_convex(cell, &outline);
            let seed = self.seeds[index];
            let depth = if self.geometry.ceiling > 0.0 {
                seed.1 / self.geometry.ceiling
            } else {
                0.0
            };
            let shade = cement_brightness(seed, depth);
            fill_polygon(&mut pixmap, &visible, cement(shade, 1.0), Some((&border, cement_edge(0.9))));
        }

        let piece_border = Stroke {
            width: 1.5,
            ..Stroke::default()
        };
        for piece in &self.debris {
            fill_polygon(
                &mut pixmap,
                &piece.outline(),
                cement(piece.brightness, 1.0),
                Some((&piece_border, cement_edge(0.8))),
            );
        }
        Ok(pixmap)
    }
}

fn cement(shade: f32, alpha: f32) -> Color {
    let level = |value: f32| (value.clamp(0.0, 255.0)) / 255.0;
    Color::from_rgba(level(shade), level(shade), level(shade - 5.0), alpha)
        .unwrap_or(Color::BLACK)
}

fn cement_edge(alpha: f32) -> Color {
    Color::from_rgba8(40, 40, 35, (alpha * 255.0).round() as u8)
}

fn fill_polygon(pixmap: &mut Pixmap, polygon: &[Point], fill: Color, edge: Option<(&Stroke, Color)>) {
    let Some((&(x0, y0), rest)) = polygon.split_first() else {
        return;
    };
    let mut pb = PathBuilder::new();
    pb.move_to(x0, y0);
    for &(x, y) in rest {
        pb.line_to(x, y);
    }
    pb.close();
    let Some(path) = pb.finish() else {
        return;
    };

    let mut paint = Paint::default();
    paint.set_color(fill);
    paint.anti_alias = true;
    pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);

    if let Some((stroke, color)) = edge {
        paint.set_color(color);
        pixmap.stroke_path(&path, &paint, stroke, Transform::identity(), None);
    }
}

#[cfg(test)]
mod tests {
    use super::{
        centroid, clip_to_convex, generate_seeds, noise, point_in_polygon, voronoi_cells,
        CeilingFracture, CeilingGeometry, CellState, FractureLayout,
    };
    use crate::hash::SeededRng;

    #[test]
    fn geometry_scales_with_vmin() {
        let geometry = CeilingGeometry::new(1000, 800, &FractureLayout::default());
        assert_eq!(geometry.side, 96.0);
        assert_eq!(geometry.ceiling, 280.0);
        assert_eq!(geometry.floor, 48.0);
        assert!(geometry.contains(500.0, 10.0));
        assert!(geometry.contains(100.0, 280.0));
        assert!(!geometry.contains(20.0, 270.0));
        assert!(!geometry.contains(500.0, 281.0));
    }

    #[test]
    fn seed_rows_widen_toward_the_viewer() {
        let geometry = CeilingGeometry::new(1000, 800, &FractureLayout::default());
        let seeds = generate_seeds(&geometry, &mut SeededRng::new(1));
        assert_eq!(seeds.len(), 51);
        assert!(seeds.iter().all(|&(_, y)| y >= -5.0 && y <= 285.0));
    }

    #[test]
    fn voronoi_cells_contain_their_seeds() {
        let geometry = CeilingGeometry::new(640, 480, &FractureLayout::default());
        let seeds = generate_seeds(&geometry, &mut SeededRng::new(9));
        let cells = voronoi_cells(&seeds, geometry.width, geometry.height);
        for (seed, cell) in seeds.iter().zip(&cells) {
            if seed.0 < 0.0 || seed.1 < 0.0 || seed.0 > 640.0 || seed.1 > 480.0 {
                continue;
            }
            assert!(cell.len() >= 3);
            assert!(point_in_polygon(cell, *seed), "{seed:?} outside its cell");
        }
        // the cells tile the viewport
        let area = cells.iter().map(|cell| polygon_area(cell)).sum::<f32>();
        assert!((area - 640.0 * 480.0).abs() < 10.0, "area {area}");
    }

    fn polygon_area(polygon: &[(f32, f32)]) -> f32 {
        let mut twice = 0.0;
        for (index, &(x0, y0)) in polygon.iter().enumerate() {
            let (x1, y1) = polygon[(index + 1) % polygon.len()];
            twice += x0 * y1 - x1 * y0;
        }
        (twice / 2.0).abs()
    }

    #[test]
    fn convex_clip_keeps_only_the_inside() {
        let square = [(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)];
        let right_half = [(5.0, -1.0), (20.0, -1.0), (20.0, 20.0), (5.0, 20.0)];
        let clipped = clip_to_convex(&square, &right_half);
        assert_eq!(centroid(&clipped).0, 7.5);
        assert!((polygon_area(&clipped) - 50.0).abs() < 1e-3);
    }

    #[test]
    fn clicking_off_the_ceiling_does_nothing() {
        let mut fracture = CeilingFracture::new(800, 600, &FractureLayout::default(), 3);
        let total = fracture.intact_count();
        assert_eq!(fracture.click(400.0, 590.0), 0);
        assert_eq!(fracture.click(1.0, 200.0), 0);
        assert_eq!(fracture.intact_count(), total);
        assert!(fracture.debris().is_empty());
    }

    #[test]
    fn click_breaks_nearby_cells_and_debris_clears() {
        let mut fracture = CeilingFracture::new(800, 600, &FractureLayout::default(), 3);
        let broken = fracture.click(400.0, 100.0);
        assert!(broken > 0);
        assert_eq!(
            fracture
                .states()
                .iter()
                .filter(|state| **state == CellState::Fractured)
                .count(),
            broken
        );
        assert!(!fracture.debris().is_empty());
        for (seed, state) in fracture.seeds().iter().zip(fracture.states()) {
            let distance = ((seed.0 - 400.0).powi(2) + (seed.1 - 100.0).powi(2)).sqrt();
            if distance < 100.0 {
                assert_eq!(*state, CellState::Fractured);
            }
            if distance >= 130.0 {
                assert_eq!(*state, CellState::Intact);
            }
        }

        // a second click only breaks cells that were still intact
        let total = fracture.states().len();
        let again = fracture.click(400.0, 100.0);
        assert_eq!(fracture.intact_count(), total - broken - again);

        for _ in 0..600 {
            fracture.step();
        }
        assert!(fracture.debris().is_empty());
    }

    #[test]
    fn same_seed_same_fracture() {
        let mut a = CeilingFracture::new(640, 480, &FractureLayout::default(), 77);
        let mut b = CeilingFracture::new(640, 480, &FractureLayout::default(), 77);
        a.click(320.0, 60.0);
        b.click(320.0, 60.0);
        for _ in 0..20 {
            a.step();
            b.step();
        }
        assert_eq!(a.debris(), b.debris());
        assert_eq!(a.seeds(), b.seeds());
    }

    #[test]
    fn render_draws_the_ceiling_only() {
        let fracture = CeilingFracture::new(320, 240, &FractureLayout::default(), 5);
        let pixmap = fracture.render().expect("render");
        assert_eq!((pixmap.width(), pixmap.height()), (320, 240));
        assert!(pixmap.pixel(160, 20).expect("ceiling").alpha() > 0);
        assert_eq!(pixmap.pixel(160, 200).expect("below").alpha(), 0);
        assert!(noise(1.0, 2.0) >= 0.0 && noise(1.0, 2.0) < 1.0);
    }
}
