//! Authoritative scene state.
//!
//! Every mutation swaps in a fresh [`SceneSnapshot`]; snapshots already handed
//! out keep the state they were taken from.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use glam::Vec3;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, MonotonicClock};
use crate::registry::{is_source_letter, GridCell, LetterCounts, SurfaceCells};
use crate::room::{RoomDimensions, Surface, TextureSize, DEFAULT_INSET};
use crate::sourcing::{source_letters, SourcingContext};

pub const DEFAULT_MAX_LIVE_LETTERS: usize = 1200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellRef {
    pub surface: Surface,
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    pub fn new(surface: Surface, row: u32, col: u32) -> Self {
        Self { surface, row, col }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceSpot {
    pub position: Vec3,
    pub surface: Surface,
    pub row: Option<u32>,
    pub col: Option<u32>,
}

impl SourceSpot {
    pub fn cell(&self) -> Option<CellRef> {
        match (self.row, self.col) {
            (Some(row), Some(col)) => Some(CellRef::new(self.surface, row, col)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LetterInstance {
    pub id: String,
    pub ch: char,
    pub created_at: f64,
    pub source_spot: Option<SourceSpot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovedSpot {
    pub id: String,
    pub position: Vec3,
    pub surface: Surface,
    pub row: Option<u32>,
    pub col: Option<u32>,
    pub emerged: bool,
}

impl RemovedSpot {
    pub fn cell(&self) -> Option<CellRef> {
        match (self.row, self.col) {
            (Some(row), Some(col)) => Some(CellRef::new(self.surface, row, col)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WallLetter {
    pub id: String,
    pub surface: Surface,
    pub row: u32,
    pub col: u32,
    pub ch: char,
    pub position: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraPosition {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Default for CameraPosition {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 25.0,
        }
    }
}

impl CameraPosition {
    pub fn as_vec3(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SceneSnapshot {
    pub letters: Arc<Vec<LetterInstance>>,
    pub removed_spots: Arc<Vec<RemovedSpot>>,
    pub wall_letters: Arc<Vec<WallLetter>>,
    pub registries: Arc<BTreeMap<Surface, SurfaceCells>>,
    pub camera: CameraPosition,
    /// Bumped by every mutation that changed something.
    pub version: u64,
}

impl SceneSnapshot {
    pub fn letter_index(&self, id: &str) -> Option<usize> {
        self.letters.iter().position(|letter| letter.id == id)
    }

    pub fn used_letter_counts(&self) -> LetterCounts {
        let mut counts = LetterCounts::new();
        for letter in self.letters.iter() {
            *counts.entry(letter.ch).or_default() += 1;
        }
        counts
    }

    /// Cells on `surface` whose glyph has visibly left the wall.
    pub fn removed_cells(&self, surface: Surface) -> BTreeSet<(u32, u32)> {
        self.removed_spots
            .iter()
            .filter(|spot| spot.emerged && spot.surface == surface)
            .filter_map(|spot| spot.cell().map(|cell| (cell.row, cell.col)))
            .collect()
    }

    /// Every cell claimed by a removed spot, emerged or not.
    pub fn claimed_cells(&self) -> BTreeSet<CellRef> {
        self.removed_spots
            .iter()
            .filter_map(RemovedSpot::cell)
            .collect()
    }

    pub fn registry(&self, surface: Surface) -> Option<&SurfaceCells> {
        self.registries.get(&surface)
    }

    pub fn texture_size(&self, surface: Surface) -> TextureSize {
        self.registry(surface)
            .map(|registry| registry.texture)
            .unwrap_or_default()
    }

    pub fn live_letter_count(&self) -> usize {
        self.letters.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoreSettings {
    pub room: RoomDimensions,
    pub inset: f32,
    pub max_live_letters: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            room: RoomDimensions::default(),
            inset: DEFAULT_INSET,
            max_live_letters: DEFAULT_MAX_LIVE_LETTERS,
        }
    }
}

pub struct SceneStore {
    settings: StoreSettings,
    clock: Box<dyn Clock>,
    current: Arc<SceneSnapshot>,
    /// Id ordinal for the next letter; survives `reset_letters`.
    next_ordinal: u64,
}

impl std::fmt::Debug for SceneStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneStore")
            .field("settings", &self.settings)
            .field("version", &self.current.version)
            .field("letters", &self.current.letters.len())
            .finish()
    }
}

impl Default for SceneStore {
    fn default() -> Self {
        Self::new(StoreSettings::default())
    }
}

impl SceneStore {
    pub fn new(settings: StoreSettings) -> Self {
        Self::with_clock(settings, Box::new(MonotonicClock::new()))
    }

    pub fn with_clock(settings: StoreSettings, clock: Box<dyn Clock>) -> Self {
        Self {
            settings,
            clock,
            current: Arc::new(SceneSnapshot::default()),
            next_ordinal: 0,
        }
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn snapshot(&self) -> Arc<SceneSnapshot> {
        Arc::clone(&self.current)
    }

    pub fn remaining_capacity(&self) -> usize {
        self.settings
            .max_live_letters
            .saturating_sub(self.current.letters.len())
    }

    fn take_ordinal(&mut self) -> u64 {
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        ordinal
    }

    fn commit(&mut self, mut next: SceneSnapshot) {
        next.version = self.current.version + 1;
        self.current = Arc::new(next);
    }

    pub fn set_letter_cells(&mut self, surface: Surface, cells: Vec<GridCell>, width: u32, height: u32) {
        let mut next = (*self.current).clone();
        Arc::make_mut(&mut next.registries).insert(
            surface,
            SurfaceCells::new(cells, TextureSize::new(width, height)),
        );
        self.commit(next);
    }

    /// Sources and spawns every letter in `chars`. Anything that is not
    /// `A`..=`Z` after uppercasing is ignored, and letters past the live cap
    /// are dropped. Returns the instances that were created.
    pub fn add_letters(&mut self, chars: &str) -> Vec<LetterInstance> {
        let mut accepted = chars
            .chars()
            .map(|ch| ch.to_ascii_uppercase())
            .filter(|ch| is_source_letter(*ch))
            .collect::<Vec<_>>();
        let room_left = self.remaining_capacity();
        if accepted.len() > room_left {
            warn!(
                "live letter cap {} reached, dropping {} character(s)",
                self.settings.max_live_letters,
                accepted.len() - room_left
            );
            accepted.truncate(room_left);
        }
        if accepted.is_empty() {
            return Vec::new();
        }

        let created_at = self.clock.now();
        let requests = accepted
            .iter()
            .map(|ch| (letter_id(created_at, self.take_ordinal(), *ch), *ch))
            .collect::<Vec<_>>();

        let mut next = (*self.current).clone();
        let sourced = {
            let mut ctx = SourcingContext::new(
                &self.settings.room,
                self.settings.inset,
                &self.current.registries,
                self.current.wall_letters.as_ref().clone(),
                self.current.claimed_cells(),
            );
            let sourced = source_letters(&requests, &mut ctx);
            if ctx.pool.len() != self.current.wall_letters.len() {
                next.wall_letters = Arc::new(ctx.pool);
            }
            sourced
        };

        let mut created = Vec::with_capacity(sourced.len());
        {
            let letters = Arc::make_mut(&mut next.letters);
            let spots = Arc::make_mut(&mut next.removed_spots);
            for letter in sourced {
                let spot = letter.resolution.spot;
                if spot.cell().is_some() {
                    spots.push(RemovedSpot {
                        id: letter.id.clone(),
                        position: spot.position,
                        surface: spot.surface,
                        row: spot.row,
                        col: spot.col,
                        emerged: false,
                    });
                }
                let instance = LetterInstance {
                    id: letter.id,
                    ch: letter.ch,
                    created_at,
                    source_spot: Some(spot),
                };
                letters.push(instance.clone());
                created.push(instance);
            }
        }
        debug!("added {} letter(s) at t={created_at:.3}", created.len());
        self.commit(next);
        created
    }

    /// Spawns one letter without sourcing it from a wall cell.
    pub fn add_letter(&mut self, ch: char) -> Option<LetterInstance> {
        let ch = ch.to_ascii_uppercase();
        if !is_source_letter(ch) || self.remaining_capacity() == 0 {
            return None;
        }
        let created_at = self.clock.now();
        let instance = LetterInstance {
            id: letter_id(created_at, self.take_ordinal(), ch),
            ch,
            created_at,
            source_spot: None,
        };
        let mut next = (*self.current).clone();
        Arc::make_mut(&mut next.letters).push(instance.clone());
        self.commit(next);
        Some(instance)
    }

    /// Records `spot` as given. Returns false, changing nothing, when its cell
    /// is already claimed.
    pub fn add_removed_spot(&mut self, spot: RemovedSpot) -> bool {
        if let Some(cell) = spot.cell() {
            if self.current.removed_spots.iter().any(|existing| existing.cell() == Some(cell)) {
                debug!("refusing duplicate removed spot for {:?}", cell);
                return false;
            }
        }
        let mut next = (*self.current).clone();
        Arc::make_mut(&mut next.removed_spots).push(spot);
        self.commit(next);
        true
    }

    /// Marks the spot vacated by letter `id` as emerged. Returns whether
    /// anything changed.
    pub fn set_spot_emerged(&mut self, id: &str) -> bool {
        let Some(index) = self
            .current
            .removed_spots
            .iter()
            .position(|spot| spot.id == id && !spot.emerged)
        else {
            return false;
        };
        let mut next = (*self.current).clone();
        Arc::make_mut(&mut next.removed_spots)[index].emerged = true;
        self.commit(next);
        true
    }

    pub fn set_camera_position(&mut self, x: f32, y: f32, z: f32) {
        let camera = CameraPosition { x, y, z };
        if self.current.camera == camera {
            return;
        }
        let mut next = (*self.current).clone();
        next.camera = camera;
        self.commit(next);
    }

    /// Replaces the pool entries belonging to `surface`.
    pub fn init_wall_letters(&mut self, surface: Surface, letters: Vec<WallLetter>) {
        let mut next = (*self.current).clone();
        let pool = Arc::make_mut(&mut next.wall_letters);
        pool.retain(|letter| letter.surface != surface);
        pool.extend(letters.into_iter().map(|mut letter| {
            letter.surface = surface;
            letter
        }));
        self.commit(next);
    }

    pub fn remove_wall_letter(&mut self, id: &str) -> bool {
        if !self.current.wall_letters.iter().any(|letter| letter.id == id) {
            return false;
        }
        let mut next = (*self.current).clone();
        Arc::make_mut(&mut next.wall_letters).retain(|letter| letter.id != id);
        self.commit(next);
        true
    }

    pub fn reset_letters(&mut self) {
        let mut next = (*self.current).clone();
        next.letters = Arc::default();
        next.removed_spots = Arc::default();
        next.wall_letters = Arc::default();
        self.commit(next);
    }
}

/// `"{createdAt in ms}-{ordinal}-{char}"`.
pub fn letter_id(created_at: f64, ordinal: u64, ch: char) -> String {
    format!("{:.3}-{ordinal}-{ch}", created_at * 1000.0)
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::{letter_id, RemovedSpot, SceneStore, StoreSettings, WallLetter};
    use crate::clock::ManualClock;
    use crate::registry::GridCell;
    use crate::room::Surface;

    fn store_at(seconds: f64) -> SceneStore {
        SceneStore::with_clock(StoreSettings::default(), Box::new(ManualClock::new(seconds)))
    }

    fn cells(chars: &str) -> Vec<GridCell> {
        chars
            .chars()
            .enumerate()
            .map(|(index, ch)| GridCell {
                row: 0,
                col: index as u32,
                ch,
                px: index as f32 * 100.0 + 50.0,
                py: 50.0,
            })
            .collect()
    }

    #[test]
    fn ids_encode_time_ordinal_and_char() {
        assert_eq!(letter_id(1.5, 3, 'K'), "1500.000-3-K");
        let mut store = store_at(2.0);
        let created = store.add_letters("hi");
        assert_eq!(created[0].id, "2000.000-0-H");
        assert_eq!(created[1].id, "2000.000-1-I");
    }

    #[test]
    fn non_letters_are_filtered_before_sourcing() {
        let mut store = store_at(0.0);
        store.set_letter_cells(Surface::Floor, cells("CAT"), 300, 100);
        let created = store.add_letters("c-a 7t!");
        assert_eq!(created.iter().map(|l| l.ch).collect::<String>(), "CAT");
        assert!(store.add_letters("123 ?!").is_empty());
        assert_eq!(store.snapshot().live_letter_count(), 3);
    }

    #[test]
    fn live_cap_truncates_a_batch() {
        let settings = StoreSettings {
            max_live_letters: 4,
            ..StoreSettings::default()
        };
        let mut store = SceneStore::with_clock(settings, Box::new(ManualClock::new(0.0)));
        assert_eq!(store.add_letters("ABC").len(), 3);
        assert_eq!(store.add_letters("DEF").len(), 1);
        assert_eq!(store.remaining_capacity(), 0);
        assert!(store.add_letters("G").is_empty());
        assert!(store.add_letter('G').is_none());
    }

    #[test]
    fn emerged_flag_flips_once() {
        let mut store = store_at(0.0);
        store.set_letter_cells(Surface::Ceiling, cells("A"), 100, 100);
        let id = store.add_letters("A")[0].id.clone();
        assert!(store.snapshot().removed_cells(Surface::Ceiling).is_empty());

        let version = store.snapshot().version;
        assert!(store.set_spot_emerged(&id));
        assert!(!store.set_spot_emerged(&id));
        assert!(!store.set_spot_emerged("missing"));
        assert_eq!(store.snapshot().version, version + 1);
        assert!(store.snapshot().removed_cells(Surface::Ceiling).contains(&(0, 0)));
    }

    #[test]
    fn duplicate_removed_spot_is_refused() {
        let mut store = store_at(0.0);
        let spot = RemovedSpot {
            id: "x".to_string(),
            position: Vec3::ZERO,
            surface: Surface::Left,
            row: Some(1),
            col: Some(2),
            emerged: true,
        };
        assert!(store.add_removed_spot(spot.clone()));
        assert!(!store.add_removed_spot(RemovedSpot {
            id: "y".to_string(),
            ..spot.clone()
        }));
        assert!(store.add_removed_spot(RemovedSpot {
            row: None,
            ..spot
        }));
        assert_eq!(store.snapshot().removed_spots.len(), 2);
    }

    #[test]
    fn snapshots_are_isolated_from_later_mutations() {
        let mut store = store_at(0.0);
        let before = store.snapshot();
        store.add_letter('q');
        store.set_camera_position(1.0, 2.0, 3.0);
        assert!(before.letters.is_empty());
        assert_eq!(before.camera.z, 25.0);
        let after = store.snapshot();
        assert_eq!(after.letters[0].ch, 'Q');
        assert!(after.letters[0].source_spot.is_none());
        assert_eq!(after.camera.as_vec3(), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn wall_letter_pool_is_per_surface() {
        let mut store = store_at(0.0);
        let entry = |id: &str, ch: char| WallLetter {
            id: id.to_string(),
            surface: Surface::Left,
            row: 0,
            col: 0,
            ch,
            position: Vec3::ZERO,
        };
        store.init_wall_letters(Surface::Left, vec![entry("l1", 'A'), entry("l2", 'B')]);
        store.init_wall_letters(Surface::Right, vec![entry("r1", 'C')]);
        store.init_wall_letters(Surface::Left, vec![entry("l3", 'D')]);
        let ids = store
            .snapshot()
            .wall_letters
            .iter()
            .map(|letter| letter.id.clone())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["r1", "l3"]);
        assert!(store.remove_wall_letter("r1"));
        assert!(!store.remove_wall_letter("r1"));

        store.add_letters("D");
        assert!(store.snapshot().wall_letters.is_empty());
        store.reset_letters();
        let snapshot = store.snapshot();
        assert!(snapshot.letters.is_empty() && snapshot.removed_spots.is_empty());
    }

    #[test]
    fn ids_stay_unique_across_reset_at_the_same_instant() {
        let mut store = store_at(1.0);
        let before = store.add_letters("A")[0].id.clone();
        store.reset_letters();
        let after = store.add_letters("A")[0].id.clone();
        let single = store.add_letter('a').expect("capacity left").id;
        assert_eq!(before, "1000.000-0-A");
        assert_eq!(after, "1000.000-1-A");
        assert_eq!(single, "1000.000-2-A");
    }
}
