//! Wall-to-back-wall flight of a single glyph.
//!
//! A pose is a pure function of the letter and its age. The only stateful
//! piece is [`FlightDriver`], which remembers which letters already told the
//! store that their wall cell is empty.

use std::collections::HashSet;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::hash::hash_with_suffix;
use crate::room::{BackWallGrid, RoomDimensions, Surface, DEFAULT_INSET};
use crate::sourcing::hashed_fallback_position;
use crate::store::{LetterInstance, SceneSnapshot, SceneStore};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FlightTimings {
    /// Seconds a new letter holds still, invisible, at its source.
    pub prepare: f64,
    pub fly: f64,
}

impl Default for FlightTimings {
    fn default() -> Self {
        Self {
            prepare: 1.0,
            fly: 3.0,
        }
    }
}

impl FlightTimings {
    pub fn total(&self) -> f64 {
        self.prepare + self.fly
    }

    pub fn phase_at(&self, age: f64) -> FlightPhase {
        if age < self.prepare {
            FlightPhase::Holding
        } else if age < self.total() {
            FlightPhase::Flying
        } else {
            FlightPhase::Affixed
        }
    }

    /// Linear flight progress in `[0, 1]`; a zero-length flight is complete.
    pub fn progress(&self, age: f64) -> f64 {
        if self.fly <= 0.0 {
            return 1.0;
        }
        ((age - self.prepare) / self.fly).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightPhase {
    Holding,
    Flying,
    Affixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LetterPose {
    pub phase: FlightPhase,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub visible: bool,
}

pub fn ease_out_cubic(t: f32) -> f32 {
    let inv = 1.0 - t.clamp(0.0, 1.0);
    1.0 - inv * inv * inv
}

/// Control point the flight bends through, scattered around the room centre.
pub fn mid_point(id: &str) -> Vec3 {
    Vec3::new(
        (hash_with_suffix(id, "-midX") as f32 - 0.5) * 1.5,
        (hash_with_suffix(id, "-midY") as f32 - 0.5) * 1.0,
        (hash_with_suffix(id, "-midZ") as f32 - 0.5) * 1.0,
    )
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlightPath {
    pub start: Vec3,
    pub mid: Vec3,
    pub target: Vec3,
}

impl FlightPath {
    /// Quadratic Bezier at eased progress `e`.
    pub fn point_at(&self, e: f32) -> Vec3 {
        let inv = 1.0 - e;
        self.start * (inv * inv) + self.mid * (2.0 * inv * e) + self.target * (e * e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlightGeometry {
    pub room: RoomDimensions,
    pub back_wall: BackWallGrid,
    pub timings: FlightTimings,
    /// Offset off the source surface for letters spawned without a spot.
    pub inset: f32,
}

impl Default for FlightGeometry {
    fn default() -> Self {
        Self {
            room: RoomDimensions::default(),
            back_wall: BackWallGrid::default(),
            timings: FlightTimings::default(),
            inset: DEFAULT_INSET,
        }
    }
}

impl FlightGeometry {
    pub fn start_position(&self, letter: &LetterInstance) -> Vec3 {
        match &letter.source_spot {
            Some(spot) => spot.position,
            None => hashed_fallback_position(&letter.id, &self.room, self.inset),
        }
    }

    pub fn source_surface(letter: &LetterInstance) -> Surface {
        letter
            .source_spot
            .as_ref()
            .map(|spot| spot.surface)
            .unwrap_or(Surface::Ceiling)
    }

    pub fn path(&self, letter: &LetterInstance, index: usize) -> FlightPath {
        FlightPath {
            start: self.start_position(letter),
            mid: mid_point(&letter.id),
            target: self.back_wall.target(&self.room, index),
        }
    }

    /// Pose of `letter`, sitting at `index` in the letter list, at time `now`.
    pub fn evaluate(&self, letter: &LetterInstance, index: usize, now: f64) -> LetterPose {
        let age = now - letter.created_at;
        let phase = self.timings.phase_at(age);
        let start_rotation = Self::source_surface(letter).start_rotation();
        let path = self.path(letter, index);

        if phase == FlightPhase::Holding {
            return LetterPose {
                phase,
                position: path.start,
                rotation: start_rotation,
                scale: Vec3::ONE,
                visible: false,
            };
        }

        let eased = ease_out_cubic(self.timings.progress(age) as f32);
        let (back_x, back_y) = self.back_wall.content_scale(&self.room);
        LetterPose {
            phase,
            position: path.point_at(eased),
            rotation: start_rotation.slerp(Quat::IDENTITY, eased),
            scale: Vec3::new(
                1.0 + (back_x - 1.0) * eased,
                1.0 + (back_y - 1.0) * eased,
                1.0,
            ),
            visible: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluatedLetter {
    pub id: String,
    pub ch: char,
    pub index: usize,
    pub pose: LetterPose,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrameOutput {
    pub letters: Vec<EvaluatedLetter>,
    /// Letters whose emerged signal fired during this frame.
    pub emerged: Vec<String>,
}

/// Per-frame pass over every live letter.
#[derive(Debug, Clone, Default)]
pub struct FlightDriver {
    signalled: HashSet<String>,
}

impl FlightDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_signalled(&self, id: &str) -> bool {
        self.signalled.contains(id)
    }

    /// Evaluates every letter at `now` and fires `set_spot_emerged` for
    /// letters that just left their holding phase.
    pub fn tick(&mut self, store: &mut SceneStore, geometry: &FlightGeometry, now: f64) -> FrameOutput {
        let snapshot = store.snapshot();
        let mut output = FrameOutput::default();
        for (index, letter) in snapshot.letters.iter().enumerate() {
            let pose = geometry.evaluate(letter, index, now);
            if pose.phase != FlightPhase::Holding
                && letter.source_spot.is_some()
                && self.signalled.insert(letter.id.clone())
            {
                store.set_spot_emerged(&letter.id);
                output.emerged.push(letter.id.clone());
            }
            output.letters.push(EvaluatedLetter {
                id: letter.id.clone(),
                ch: letter.ch,
                index,
                pose,
            });
        }
        output
    }

    /// Forgets latches for letters no longer in `snapshot`.
    pub fn retain_live(&mut self, snapshot: &SceneSnapshot) {
        let live = snapshot
            .letters
            .iter()
            .map(|letter| letter.id.as_str())
            .collect::<HashSet<_>>();
        self.signalled.retain(|id| live.contains(id.as_str()));
    }
}

#[cfg(test)]
mod tests {
    use glam::{Quat, Vec3};

    use super::{ease_out_cubic, mid_point, FlightDriver, FlightGeometry, FlightPhase, FlightTimings};
    use crate::clock::ManualClock;
    use crate::registry::GridCell;
    use crate::room::Surface;
    use crate::store::{LetterInstance, SceneStore, SourceSpot, StoreSettings};

    fn letter(created_at: f64) -> LetterInstance {
        LetterInstance {
            id: "1000.000-0-A".to_string(),
            ch: 'A',
            created_at,
            source_spot: Some(SourceSpot {
                position: Vec3::new(-3.0, 4.99, 2.0),
                surface: Surface::Ceiling,
                row: Some(0),
                col: Some(0),
            }),
        }
    }

    #[test]
    fn easing_hits_endpoints() {
        assert_eq!(ease_out_cubic(0.0), 0.0);
        assert_eq!(ease_out_cubic(1.0), 1.0);
        assert_eq!(ease_out_cubic(0.5), 0.875);
        assert_eq!(ease_out_cubic(2.0), 1.0);
    }

    #[test]
    fn holding_pose_is_invisible_at_start() {
        let geometry = FlightGeometry::default();
        let pose = geometry.evaluate(&letter(1.0), 0, 1.5);
        assert_eq!(pose.phase, FlightPhase::Holding);
        assert!(!pose.visible);
        assert_eq!(pose.position, Vec3::new(-3.0, 4.99, 2.0));
        assert_eq!(pose.scale, Vec3::ONE);
        assert_eq!(pose.rotation, Surface::Ceiling.start_rotation());
    }

    #[test]
    fn flying_starts_at_source_and_ends_on_target() {
        let geometry = FlightGeometry::default();
        let at_prepare = geometry.evaluate(&letter(0.0), 0, 1.0);
        assert_eq!(at_prepare.phase, FlightPhase::Flying);
        assert!(at_prepare.visible);
        assert!((at_prepare.position - Vec3::new(-3.0, 4.99, 2.0)).length() < 1e-5);

        let done = geometry.evaluate(&letter(0.0), 0, 10.0);
        assert_eq!(done.phase, FlightPhase::Affixed);
        let target = geometry.back_wall.target(&geometry.room, 0);
        assert!((done.position - target).length() < 1e-5);
        assert!(done.rotation.angle_between(Quat::IDENTITY) < 1e-3);
        let (sx, sy) = geometry.back_wall.content_scale(&geometry.room);
        assert!((done.scale.x - sx).abs() < 1e-5 && (done.scale.y - sy).abs() < 1e-5);
    }

    #[test]
    fn zero_length_flight_is_complete_immediately() {
        let geometry = FlightGeometry {
            timings: FlightTimings {
                prepare: 0.0,
                fly: 0.0,
            },
            ..FlightGeometry::default()
        };
        let pose = geometry.evaluate(&letter(5.0), 3, 5.0);
        assert_eq!(pose.phase, FlightPhase::Affixed);
        let target = geometry.back_wall.target(&geometry.room, 3);
        assert!((pose.position - target).length() < 1e-5);
    }

    #[test]
    fn spotless_letter_starts_at_the_geometry_inset() {
        let geometry = FlightGeometry {
            inset: 0.5,
            ..FlightGeometry::default()
        };
        let spotless = LetterInstance {
            source_spot: None,
            ..letter(0.0)
        };
        let pose = geometry.evaluate(&spotless, 0, 0.0);
        assert!((pose.position.y - 4.5).abs() < 1e-5);
    }

    #[test]
    fn mid_point_stays_near_the_centre() {
        for index in 0..200 {
            let mid = mid_point(&format!("{index}.000-{index}-M"));
            assert!(mid.x.abs() <= 0.75 && mid.y.abs() <= 0.5 && mid.z.abs() <= 0.5);
        }
    }

    #[test]
    fn driver_signals_emergence_once() {
        let clock = ManualClock::new(0.0);
        let mut store = SceneStore::with_clock(StoreSettings::default(), Box::new(clock.clone()));
        store.set_letter_cells(
            Surface::Floor,
            vec![GridCell {
                row: 2,
                col: 3,
                ch: 'Z',
                px: 10.0,
                py: 10.0,
            }],
            100,
            100,
        );
        let id = store.add_letters("Z")[0].id.clone();
        let geometry = FlightGeometry::default();
        let mut driver = FlightDriver::new();

        assert!(driver.tick(&mut store, &geometry, 0.5).emerged.is_empty());
        assert_eq!(driver.tick(&mut store, &geometry, 1.0).emerged, vec![id.clone()]);
        assert!(driver.tick(&mut store, &geometry, 1.1).emerged.is_empty());
        assert!(driver.has_signalled(&id));
        assert!(store.snapshot().removed_cells(Surface::Floor).contains(&(2, 3)));

        store.reset_letters();
        driver.retain_live(&store.snapshot());
        assert!(!driver.has_signalled(&id));
    }
}
