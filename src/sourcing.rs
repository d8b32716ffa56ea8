//! Decides which wall cell supplies each requested character.
//!
//! Strategies are tried in [`SourceStrategy::CHAIN`] order. Whatever a
//! strategy returns is committed to the context before the next character is
//! looked at, so a cell or pool entry can only be handed out once per batch.

use std::collections::{BTreeMap, BTreeSet};

use glam::Vec3;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::hash::hash_with_suffix;
use crate::registry::SurfaceCells;
use crate::room::{RoomDimensions, Surface};
use crate::store::{CellRef, SourceSpot, WallLetter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStrategy {
    WallLetterPool,
    RegistryScan,
    HashedFallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub strategy: SourceStrategy,
    pub spot: SourceSpot,
    /// Pool entry to consume, for [`SourceStrategy::WallLetterPool`].
    pub pool_entry: Option<String>,
}

/// Mutable view of everything sourcing is allowed to consume.
#[derive(Debug)]
pub struct SourcingContext<'a> {
    pub room: &'a RoomDimensions,
    pub inset: f32,
    pub registries: &'a BTreeMap<Surface, SurfaceCells>,
    pub pool: Vec<WallLetter>,
    pub used: BTreeSet<CellRef>,
}

impl<'a> SourcingContext<'a> {
    pub fn new(
        room: &'a RoomDimensions,
        inset: f32,
        registries: &'a BTreeMap<Surface, SurfaceCells>,
        pool: Vec<WallLetter>,
        used: BTreeSet<CellRef>,
    ) -> Self {
        Self {
            room,
            inset,
            registries,
            pool,
            used,
        }
    }

    fn commit(&mut self, resolution: &Resolution) {
        if let Some(entry) = &resolution.pool_entry {
            self.pool.retain(|letter| &letter.id != entry);
        }
        if let Some(cell) = resolution.spot.cell() {
            self.used.insert(cell);
        }
    }
}

impl SourceStrategy {
    pub const CHAIN: [SourceStrategy; 3] = [
        SourceStrategy::WallLetterPool,
        SourceStrategy::RegistryScan,
        SourceStrategy::HashedFallback,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SourceStrategy::WallLetterPool => "wall_letter_pool",
            SourceStrategy::RegistryScan => "registry_scan",
            SourceStrategy::HashedFallback => "hashed_fallback",
        }
    }

    pub fn try_resolve(self, id: &str, ch: char, ctx: &SourcingContext<'_>) -> Option<Resolution> {
        match self {
            SourceStrategy::WallLetterPool => ctx
                .pool
                .iter()
                .find(|letter| {
                    letter.ch == ch
                        && !ctx.used.contains(&CellRef::new(letter.surface, letter.row, letter.col))
                })
                .map(|letter| Resolution {
                    strategy: self,
                    spot: SourceSpot {
                        position: letter.position,
                        surface: letter.surface,
                        row: Some(letter.row),
                        col: Some(letter.col),
                    },
                    pool_entry: Some(letter.id.clone()),
                }),
            SourceStrategy::RegistryScan => {
                for surface in Surface::SOURCES {
                    let Some(registry) = ctx.registries.get(&surface) else {
                        continue;
                    };
                    let found = registry.cells.iter().find(|cell| {
                        cell.ch == ch
                            && !ctx.used.contains(&CellRef::new(surface, cell.row, cell.col))
                    });
                    if let Some(cell) = found {
                        let position = ctx.room.pixel_to_world(
                            surface,
                            cell.px,
                            cell.py,
                            registry.texture,
                            ctx.inset,
                        );
                        return Some(Resolution {
                            strategy: self,
                            spot: SourceSpot {
                                position,
                                surface,
                                row: Some(cell.row),
                                col: Some(cell.col),
                            },
                            pool_entry: None,
                        });
                    }
                }
                None
            }
            SourceStrategy::HashedFallback => Some(Resolution {
                strategy: self,
                spot: SourceSpot {
                    position: hashed_fallback_position(id, ctx.room, ctx.inset),
                    surface: Surface::Ceiling,
                    row: None,
                    col: None,
                },
                pool_entry: None,
            }),
        }
    }
}

/// Ceiling point picked from the letter id alone. Used when no cell is left.
pub fn hashed_fallback_position(id: &str, room: &RoomDimensions, inset: f32) -> Vec3 {
    let u = hash_with_suffix(id, "-x") as f32;
    let v = hash_with_suffix(id, "-z") as f32;
    room.surface_point(Surface::Ceiling, u, v, inset)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourcedLetter {
    pub id: String,
    pub ch: char,
    pub resolution: Resolution,
}

/// Resolves `(id, char)` requests in order against `ctx`.
pub fn source_letters(requests: &[(String, char)], ctx: &mut SourcingContext<'_>) -> Vec<SourcedLetter> {
    let mut sourced = Vec::with_capacity(requests.len());
    for (id, ch) in requests {
        let resolution = SourceStrategy::CHAIN
            .iter()
            .find_map(|strategy| strategy.try_resolve(id, *ch, ctx));
        // the chain ends in an infallible strategy
        let Some(resolution) = resolution else {
            continue;
        };
        debug!(
            "sourced {ch} for {id} via {} ({})",
            resolution.strategy.as_str(),
            resolution.spot.surface
        );
        ctx.commit(&resolution);
        sourced.push(SourcedLetter {
            id: id.clone(),
            ch: *ch,
            resolution,
        });
    }
    sourced
}
