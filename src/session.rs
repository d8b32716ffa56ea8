//! Headless playback of a scene: scripted commands on a fixed frame clock.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use glam::Vec3;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tiny_skia::Pixmap;

use crate::camera::{CameraController, MoveKey};
use crate::clock::ManualClock;
use crate::color::parse_color;
use crate::config::SceneConfig;
use crate::flight::{EvaluatedLetter, FlightDriver, FlightGeometry, FlightPhase, FrameOutput};
use crate::grid_layout::cell_key;
use crate::intake::CommandIntake;
use crate::registry::LetterCounts;
use crate::room::Surface;
use crate::store::{CameraPosition, LetterInstance, RemovedSpot, SceneStore, SourceSpot};
use crate::texture::{BackWallGlyph, SurfaceTextureBuilder, SurfaceTextureRequest};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScriptAction {
    /// Typed input: capped by the intake, then submitted.
    Command { text: String },
    /// Submitted straight to the store.
    Uncapped { text: String },
    Camera {
        #[serde(default)]
        press: Vec<MoveKey>,
        #[serde(default)]
        release: Vec<MoveKey>,
        yaw: Option<f32>,
        pitch: Option<f32>,
    },
    Reset,
    /// Rebuilds every surface texture at `scale` times its configured size.
    Resize { scale: f32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptEvent {
    /// Seconds from the start of the run.
    pub at: f64,
    #[serde(flatten)]
    pub action: ScriptAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SessionScript {
    pub fps: u32,
    pub duration: f64,
    pub events: Vec<ScriptEvent>,
}

impl Default for SessionScript {
    fn default() -> Self {
        Self {
            fps: 30,
            duration: 6.0,
            events: Vec::new(),
        }
    }
}

impl SessionScript {
    pub fn validate(&self) -> Result<()> {
        if self.fps == 0 || self.fps > 240 {
            bail!("fps must be within 1..=240, got {}", self.fps);
        }
        if !self.duration.is_finite() || self.duration < 0.0 {
            bail!("duration must be finite and >= 0, got {}", self.duration);
        }
        for (index, event) in self.events.iter().enumerate() {
            if !event.at.is_finite() || event.at < 0.0 {
                bail!("events[{index}].at must be finite and >= 0, got {}", event.at);
            }
            if event.at > self.duration {
                bail!(
                    "events[{index}].at {} is past the script duration {}",
                    event.at,
                    self.duration
                );
            }
            if let ScriptAction::Resize { scale } = event.action {
                if !scale.is_finite() || scale <= 0.0 || scale > 4.0 {
                    bail!("events[{index}] resize scale must be within (0, 4], got {scale}");
                }
            }
        }
        Ok(())
    }

    pub fn frame_count(&self) -> u64 {
        (self.duration * f64::from(self.fps)).ceil() as u64
    }

    /// Events ordered by time; ties keep script order.
    pub fn ordered_events(&self) -> Vec<ScriptEvent> {
        let mut events = self.events.clone();
        events.sort_by(|a, b| a.at.total_cmp(&b.at));
        events
    }
}

pub fn parse_session_script(contents: &str, origin: &str) -> Result<SessionScript> {
    if contents.trim().is_empty() {
        return Ok(SessionScript::default());
    }
    let script: SessionScript = serde_yaml::from_str(contents).map_err(|error| {
        let location = error
            .location()
            .map(|location| format!("line {}, column {}", location.line(), location.column()))
            .unwrap_or_else(|| "unknown location".to_owned());
        anyhow!("failed to parse yaml in {origin} at {location}: {error}")
    })?;
    script
        .validate()
        .with_context(|| format!("invalid script {origin}"))?;
    Ok(script)
}

pub fn load_session_script(path: &Path) -> Result<SessionScript> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read script {}", path.display()))?;
    parse_session_script(&contents, &path.display().to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LetterReport {
    pub id: String,
    pub ch: char,
    pub index: usize,
    pub created_at: f64,
    pub source: Option<SourceSpot>,
    pub phase: FlightPhase,
    pub position: Vec3,
    pub rotation: glam::Quat,
    pub scale: Vec3,
    pub visible: bool,
}

/// Hole left in a wall after a glyph emerged from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmptyPatch {
    pub surface: Surface,
    pub cell: String,
    pub color: String,
    pub position: Vec3,
    /// Point just inside the room the glyph came out through.
    pub emerge_point: Vec3,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextureReport {
    pub surface: Surface,
    pub width: u32,
    pub height: u32,
    pub cells: usize,
    pub removed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionReport {
    pub frames: u64,
    pub fps: u32,
    pub elapsed: f64,
    pub letters: Vec<LetterReport>,
    pub removed_spots: Vec<RemovedSpot>,
    pub patches: Vec<EmptyPatch>,
    pub used_letter_counts: LetterCounts,
    pub remaining_capacity: usize,
    pub texture_rebuilds: usize,
    pub command_log: Vec<String>,
    pub camera: CameraPosition,
    pub textures: Vec<TextureReport>,
}

pub fn pixmap_digest(pixmap: &Pixmap) -> String {
    format!("{:x}", Sha256::digest(pixmap.data()))
}

#[derive(Debug)]
struct SurfaceState {
    removed: BTreeSet<(u32, u32)>,
    cells: usize,
    width: u32,
    height: u32,
    image: Option<Pixmap>,
}

/// One playback of a scene against a texture builder.
pub struct Session<B: SurfaceTextureBuilder> {
    config: SceneConfig,
    builder: B,
    clock: ManualClock,
    store: SceneStore,
    intake: CommandIntake,
    driver: FlightDriver,
    camera: CameraController,
    geometry: FlightGeometry,
    texture_scale: f32,
    surfaces: BTreeMap<Surface, SurfaceState>,
    rebuilds: usize,
    frames: u64,
    last_frame: FrameOutput,
}

impl<B: SurfaceTextureBuilder> Session<B> {
    pub fn new(config: SceneConfig, builder: B) -> Result<Self> {
        config.validate()?;
        let clock = ManualClock::new(0.0);
        let store = SceneStore::with_clock(config.store_settings(), Box::new(clock.clone()));
        let mut session = Self {
            intake: CommandIntake::new(config.letter_capacity()),
            geometry: config.flight_geometry(),
            camera: CameraController::new(store.snapshot().camera.as_vec3()),
            config,
            builder,
            clock,
            store,
            driver: FlightDriver::new(),
            texture_scale: 1.0,
            surfaces: BTreeMap::new(),
            rebuilds: 0,
            frames: 0,
            last_frame: FrameOutput::default(),
        };
        for surface in Surface::SOURCES {
            session.build_surface(surface)?;
        }
        Ok(session)
    }

    pub fn store(&self) -> &SceneStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SceneStore {
        &mut self.store
    }

    pub fn intake(&self) -> &CommandIntake {
        &self.intake
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    pub fn now(&self) -> f64 {
        self.store.now()
    }

    pub fn texture_rebuilds(&self) -> usize {
        self.rebuilds
    }

    pub fn surface_image(&self, surface: Surface) -> Option<&Pixmap> {
        self.surfaces
            .get(&surface)
            .and_then(|state| state.image.as_ref())
    }

    fn build_surface(&mut self, surface: Surface) -> Result<()> {
        let surface_config = self.config.surfaces.get(surface);
        let removed = self.store.snapshot().removed_cells(surface);
        let request = SurfaceTextureRequest {
            surface,
            text: &surface_config.text,
            size: surface_config.texture.scaled(self.texture_scale),
            rows: surface_config.rows,
            cols: surface_config.cols,
            line_width: surface_config.line_width * self.texture_scale,
            grid_lines: self.config.grid_lines.to_grid_lines(),
            text_color: surface_config.text_color(surface),
            font_scale: (surface_config.font_scale_x, surface_config.font_scale_y),
            removed: &removed,
        };
        let built = self
            .builder
            .build(&request)
            .with_context(|| format!("failed to build {surface} texture"))?;

        self.store
            .set_letter_cells(surface, built.cells.clone(), built.size.w, built.size.h);
        self.surfaces.insert(
            surface,
            SurfaceState {
                cells: built.cells.len(),
                removed,
                width: built.size.w,
                height: built.size.h,
                image: built.image,
            },
        );
        Ok(())
    }

    /// Rebuilds every surface whose set of emptied cells changed since its
    /// last build. Returns how many were rebuilt.
    pub fn rebuild_changed(&mut self) -> Result<usize> {
        let snapshot = self.store.snapshot();
        let stale = Surface::SOURCES
            .into_iter()
            .filter(|surface| {
                self.surfaces
                    .get(surface)
                    .map_or(true, |state| state.removed != snapshot.removed_cells(*surface))
            })
            .collect::<Vec<_>>();
        for surface in &stale {
            debug!("rebuilding {surface} texture");
            self.build_surface(*surface)?;
        }
        self.rebuilds += stale.len();
        Ok(stale.len())
    }

    /// Rebuilds all textures at `scale` times their configured size. Letters
    /// already spawned keep the positions they were sourced at.
    pub fn resize(&mut self, scale: f32) -> Result<()> {
        if !scale.is_finite() || scale <= 0.0 {
            bail!("resize scale must be finite and > 0, got {scale}");
        }
        self.texture_scale = scale;
        for surface in Surface::SOURCES {
            self.build_surface(surface)?;
        }
        self.rebuilds += Surface::SOURCES.len();
        info!("textures resized to {scale}x");
        Ok(())
    }

    pub fn submit(&mut self, text: &str) -> Vec<LetterInstance> {
        let used = self.store.snapshot().used_letter_counts();
        self.intake.set_input(text, &used);
        self.intake.submit(&mut self.store)
    }

    pub fn submit_uncapped(&mut self, text: &str) -> Vec<LetterInstance> {
        self.intake.submit_uncapped(text, &mut self.store)
    }

    pub fn apply(&mut self, action: &ScriptAction) -> Result<()> {
        match action {
            ScriptAction::Command { text } => {
                self.submit(text);
            }
            ScriptAction::Uncapped { text } => {
                self.submit_uncapped(text);
            }
            ScriptAction::Camera {
                press,
                release,
                yaw,
                pitch,
            } => {
                for key in release {
                    self.camera.release(*key);
                }
                for key in press {
                    self.camera.press(*key);
                }
                if yaw.is_some() || pitch.is_some() {
                    self.camera.set_orientation(
                        yaw.unwrap_or(self.camera.yaw),
                        pitch.unwrap_or(self.camera.pitch),
                    );
                }
            }
            ScriptAction::Reset => {
                self.store.reset_letters();
                self.driver.retain_live(&self.store.snapshot());
                self.rebuild_changed()?;
                info!("letters reset");
            }
            ScriptAction::Resize { scale } => self.resize(*scale)?,
        }
        Ok(())
    }

    /// Evaluates one frame at time `now`, `delta` seconds after the last.
    pub fn frame(&mut self, now: f64, delta: f32) -> Result<&FrameOutput> {
        self.clock.set(now);
        self.camera.update(delta, &mut self.store);
        self.last_frame = self.driver.tick(&mut self.store, &self.geometry, now);
        if !self.last_frame.emerged.is_empty() {
            self.rebuild_changed()?;
        }
        self.frames += 1;
        Ok(&self.last_frame)
    }

    pub fn run(&mut self, script: &SessionScript) -> Result<SessionReport> {
        script.validate()?;
        let events = script.ordered_events();
        let frame_count = script.frame_count();
        let delta = 1.0 / f64::from(script.fps);
        info!(
            "session start: {frame_count} frame(s) at {} fps, {} event(s)",
            script.fps,
            events.len()
        );

        let mut pending = events.iter().peekable();
        for frame in 0..=frame_count {
            let now = frame as f64 * delta;
            while let Some(event) = pending.next_if(|event| event.at <= now) {
                self.clock.set(event.at);
                self.apply(&event.action)
                    .with_context(|| format!("failed applying event at {:.3}s", event.at))?;
            }
            self.frame(now, if frame == 0 { 0.0 } else { delta as f32 })?;
        }

        let report = self.report(script.fps);
        info!(
            "session finished: {} letter(s), {} texture rebuild(s)",
            report.letters.len(),
            report.texture_rebuilds
        );
        Ok(report)
    }

    pub fn report(&self, fps: u32) -> SessionReport {
        let snapshot = self.store.snapshot();
        let by_id = snapshot
            .letters
            .iter()
            .map(|letter| (letter.id.as_str(), letter))
            .collect::<BTreeMap<_, _>>();
        let letters = self
            .last_frame
            .letters
            .iter()
            .filter_map(|evaluated| {
                by_id
                    .get(evaluated.id.as_str())
                    .map(|letter| letter_report(letter, evaluated))
            })
            .collect();

        let patches = snapshot
            .removed_spots
            .iter()
            .filter(|spot| spot.emerged)
            .filter_map(|spot| {
                let cell = spot.cell()?;
                Some(EmptyPatch {
                    surface: spot.surface,
                    cell: cell_key(cell.row, cell.col),
                    color: spot.surface.empty_color().to_string(),
                    position: spot.position,
                    emerge_point: spot.position + spot.surface.emerge_offset(),
                })
            })
            .collect();

        let textures = self
            .surfaces
            .iter()
            .map(|(surface, state)| TextureReport {
                surface: *surface,
                width: state.width,
                height: state.height,
                cells: state.cells,
                removed: state.removed.len(),
                sha256: state.image.as_ref().map(pixmap_digest),
            })
            .collect();

        SessionReport {
            frames: self.frames,
            fps,
            elapsed: self.now(),
            letters,
            removed_spots: snapshot.removed_spots.as_ref().clone(),
            patches,
            used_letter_counts: snapshot.used_letter_counts(),
            remaining_capacity: self.store.remaining_capacity(),
            texture_rebuilds: self.rebuilds,
            command_log: self.intake.log().to_vec(),
            camera: snapshot.camera,
            textures,
        }
    }

    /// Affixed letters laid out on the back wall.
    pub fn compose_back_wall(&mut self) -> Result<Option<Pixmap>> {
        let snapshot = self.store.snapshot();
        let glyphs = self
            .last_frame
            .letters
            .iter()
            .filter(|evaluated| evaluated.pose.phase == FlightPhase::Affixed)
            .filter_map(|evaluated| {
                let letter = snapshot.letters.get(evaluated.index)?;
                Some(BackWallGlyph {
                    index: evaluated.index,
                    ch: letter.ch,
                    color: parse_color(FlightGeometry::source_surface(letter).text_color()),
                })
            })
            .collect::<Vec<_>>();
        let grid_lines = self.config.grid_lines.to_grid_lines();
        self.builder
            .compose_back_wall(&self.config.back_wall, grid_lines, &glyphs)
    }

    /// Writes `<surface>.png` for every rasterized surface plus
    /// `back_wall.png`. Returns the written paths.
    pub fn write_pngs(&mut self, dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create png directory {}", dir.display()))?;
        let mut written = Vec::new();
        for (surface, state) in &self.surfaces {
            let Some(image) = &state.image else {
                continue;
            };
            let path = dir.join(format!("{surface}.png"));
            image
                .save_png(&path)
                .with_context(|| format!("failed to write {}", path.display()))?;
            written.push(path);
        }
        if let Some(back) = self.compose_back_wall()? {
            let path = dir.join("back_wall.png");
            back.save_png(&path)
                .with_context(|| format!("failed to write {}", path.display()))?;
            written.push(path);
        }
        Ok(written)
    }
}

fn letter_report(letter: &LetterInstance, evaluated: &EvaluatedLetter) -> LetterReport {
    LetterReport {
        id: letter.id.clone(),
        ch: letter.ch,
        index: evaluated.index,
        created_at: letter.created_at,
        source: letter.source_spot,
        phase: evaluated.pose.phase,
        position: evaluated.pose.position,
        rotation: evaluated.pose.rotation,
        scale: evaluated.pose.scale,
        visible: evaluated.pose.visible,
    }
}

/// Poses of the letters `command` spawns at t = 0, evaluated at `at` seconds.
pub fn evaluate_command<B: SurfaceTextureBuilder>(
    config: SceneConfig,
    builder: B,
    command: &str,
    at: f64,
) -> Result<Vec<LetterReport>> {
    if !at.is_finite() || at < 0.0 {
        bail!("--at must be finite and >= 0, got {at}");
    }
    let mut session = Session::new(config, builder)?;
    session.submit(command);
    session.frame(at, 0.0)?;
    Ok(session.report(0).letters)
}
