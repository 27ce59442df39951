use std::fmt;

use picsum::{FetchError, FetchJob};
use renderer::{DecodeError, GpuError, Rect, Size, TextureSlots};

/// Grid coordinates of a workspace cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cell {
    pub column: u32,
    pub row: u32,
}

impl Cell {
    pub const fn new(column: u32, row: u32) -> Self {
        Self { column, row }
    }

    /// Where this cell's wallpaper sits for an output of `size`.
    pub fn geometry(&self, size: Size) -> Rect {
        let offset = |index: u32, extent: u32| {
            i32::try_from(index.saturating_mul(extent)).unwrap_or(i32::MAX)
        };
        Rect::new(
            offset(self.column, size.width),
            offset(self.row, size.height),
            size.width,
            size.height,
        )
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.column, self.row)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Idle,
    Fetching,
    Ready,
    Failed,
}

/// Why a tile's fetch did not produce a displayable texture.
#[derive(Debug, thiserror::Error)]
pub enum TileFailure {
    #[error("transport failure: {0}")]
    Transport(#[source] FetchError),
    #[error("fetch aborted by shutdown")]
    ShutdownAborted,
    #[error("output changed from {requested} to {current} while fetching")]
    GeometryStale { requested: Size, current: Size },
    #[error("image server sent an empty body")]
    EmptyPayload,
    #[error("could not decode image: {0}")]
    Decode(#[from] DecodeError),
    #[error("could not upload image: {0}")]
    Upload(#[from] GpuError),
}

impl From<FetchError> for TileFailure {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::ShutdownAborted => TileFailure::ShutdownAborted,
            other => TileFailure::Transport(other),
        }
    }
}

/// Wallpaper state for one workspace cell of an output.
#[derive(Debug)]
pub struct Tile<T> {
    cell: Cell,
    geometry: Rect,
    pub(crate) state: FetchState,
    pub(crate) failures: u32,
    pub(crate) slots: TextureSlots<T>,
    pub(crate) job: Option<FetchJob>,
}

impl<T> Tile<T> {
    pub fn new(cell: Cell, output: Size) -> Self {
        Self {
            cell,
            geometry: cell.geometry(output),
            state: FetchState::Idle,
            failures: 0,
            slots: TextureSlots::new(),
            job: None,
        }
    }

    pub fn cell(&self) -> Cell {
        self.cell
    }

    pub fn geometry(&self) -> Rect {
        self.geometry
    }

    pub(crate) fn set_output_size(&mut self, output: Size) {
        self.geometry = self.cell.geometry(output);
    }

    pub fn state(&self) -> FetchState {
        self.state
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn slots(&self) -> &TextureSlots<T> {
        &self.slots
    }

    pub fn is_ready(&self) -> bool {
        self.state == FetchState::Ready
    }

    /// True while a worker thread is attached.
    pub fn is_busy(&self) -> bool {
        self.job.is_some()
    }
}
