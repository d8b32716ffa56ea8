use std::collections::BTreeSet;
use std::str::FromStr;

use anyhow::bail;
use glam::{EulerRot, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::store::{CameraPosition, SceneStore};

pub const CAMERA_SPEED: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveKey {
    #[serde(alias = "w")]
    Forward,
    #[serde(alias = "s")]
    Back,
    #[serde(alias = "a")]
    Left,
    #[serde(alias = "d")]
    Right,
    #[serde(alias = "space")]
    Up,
    #[serde(alias = "shift")]
    Down,
}

impl MoveKey {
    fn direction(self) -> Vec3 {
        match self {
            MoveKey::Forward => Vec3::NEG_Z,
            MoveKey::Back => Vec3::Z,
            MoveKey::Left => Vec3::NEG_X,
            MoveKey::Right => Vec3::X,
            MoveKey::Up => Vec3::Y,
            MoveKey::Down => Vec3::NEG_Y,
        }
    }
}

impl FromStr for MoveKey {
    type Err = anyhow::Error;

    /// Accepts the key names (`w`, `space`, `shift`, ...) as well as the
    /// direction names.
    fn from_str(value: &str) -> anyhow::Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "w" | "forward" => Ok(MoveKey::Forward),
            "s" | "back" => Ok(MoveKey::Back),
            "a" | "left" => Ok(MoveKey::Left),
            "d" | "right" => Ok(MoveKey::Right),
            "space" | "up" => Ok(MoveKey::Up),
            "shift" | "down" => Ok(MoveKey::Down),
            other => bail!("unknown camera key '{other}'"),
        }
    }
}

/// Free-fly camera: held keys move it along its own axes.
#[derive(Debug, Clone)]
pub struct CameraController {
    pub position: Vec3,
    /// Radians about +y.
    pub yaw: f32,
    /// Radians about the camera's x axis.
    pub pitch: f32,
    pub speed: f32,
    held: BTreeSet<MoveKey>,
}

impl Default for CameraController {
    fn default() -> Self {
        Self::new(CameraPosition::default().as_vec3())
    }
}

impl CameraController {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            yaw: 0.0,
            pitch: 0.0,
            speed: CAMERA_SPEED,
            held: BTreeSet::new(),
        }
    }

    pub fn press(&mut self, key: MoveKey) {
        self.held.insert(key);
    }

    pub fn release(&mut self, key: MoveKey) {
        self.held.remove(&key);
    }

    pub fn release_all(&mut self) {
        self.held.clear();
    }

    pub fn set_orientation(&mut self, yaw: f32, pitch: f32) {
        self.yaw = yaw;
        self.pitch = pitch;
    }

    pub fn orientation(&self) -> Quat {
        Quat::from_euler(EulerRot::YXZ, self.yaw, self.pitch, 0.0)
    }

    /// Moves for `delta` seconds and reports the new position to `store`.
    pub fn update(&mut self, delta: f32, store: &mut SceneStore) -> Vec3 {
        let direction = self
            .held
            .iter()
            .fold(Vec3::ZERO, |sum, key| sum + key.direction());
        if direction.length_squared() > 0.0 {
            let step = direction.normalize() * self.speed * delta;
            self.position += self.orientation() * step;
        }
        store.set_camera_position(self.position.x, self.position.y, self.position.z);
        self.position
    }
}
