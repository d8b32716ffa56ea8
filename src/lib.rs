pub mod camera;
pub mod clock;
pub mod color;
pub mod config;
pub mod error_codes;
pub mod flight;
pub mod fracture;
pub mod glyphs;
pub mod grid_layout;
pub mod hash;
pub mod intake;
pub mod registry;
pub mod room;
pub mod session;
pub mod sourcing;
pub mod store;
pub mod texture;
