//! Rotating random wallpapers for compositor outputs.
//!
//! Each output gets a [`WallpaperCoordinator`] holding one [`Tile`] per
//! workspace cell. The coordinator starts a fetch worker per tile, collects
//! the results on the caller's event loop, and only when every tile has a
//! fresh image swaps them all in at once behind a crossfade. Failed fetches
//! are retried right away a few times, then the output waits for the retry
//! timer. [`OutputRegistry`] owns the coordinators of all outputs and routes
//! compositor events to them.

mod coordinator;
mod registry;
#[cfg(test)]
mod testing;
mod tile;

pub use coordinator::{fade_curve, OutputLayout, WallpaperCoordinator};
pub use registry::{OutputEvent, OutputRegistry};
pub use tile::{Cell, FetchState, Tile, TileFailure};
