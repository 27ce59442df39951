//! Random image acquisition for the wallpaper tiles.
//!
//! `client` talks to a Lorem Picsum style endpoint (`/<width>/<height>/`)
//! over HTTP, waiting on the network in short slices so a cancelled fetch
//! winds down promptly. `worker` runs one fetch per thread and hands the
//! raw bytes back through a one-shot channel so a cooperative event loop can
//! pick them up without blocking.

mod client;
mod worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use client::{PicsumClient, PicsumConfig};
pub use worker::{FetchJob, FetchReport};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid fetch request: {0}")]
    InvalidRequest(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("image server answered with status {0}")]
    Status(reqwest::StatusCode),
    #[error("failed to read response body: {0}")]
    Io(#[from] std::io::Error),
    #[error("fetch abandoned because shutdown was requested")]
    ShutdownAborted,
    #[error("failed to start fetch worker: {0}")]
    ResourceExhaustion(std::io::Error),
    #[error("fetch worker exited without reporting")]
    WorkerLost,
}

/// Target resolution of a single tile fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FetchRequest {
    pub width: u32,
    pub height: u32,
}

impl FetchRequest {
    pub fn new(width: u32, height: u32) -> Result<Self, FetchError> {
        if width == 0 || height == 0 {
            return Err(FetchError::InvalidRequest(format!(
                "image dimensions must be positive, got {width}x{height}"
            )));
        }
        Ok(Self { width, height })
    }
}

/// Process-wide shutdown flag shared between the event loop and every worker.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Cancellation view handed to a single fetch: global shutdown or a
/// per-job cancel (tile removed while fetching).
#[derive(Debug, Clone)]
pub struct CancelToken {
    shutdown: ShutdownFlag,
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new(shutdown: ShutdownFlag) -> Self {
        Self {
            shutdown,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.shutdown.is_requested() || self.cancelled.load(Ordering::SeqCst)
    }
}

/// Bounds how many loop iterations a fetch may still run once cancelled.
#[derive(Debug, Clone, Copy)]
pub struct ShutdownGrace {
    limit: u32,
    used: u32,
}

impl ShutdownGrace {
    pub fn new(limit: u32) -> Self {
        Self { limit, used: 0 }
    }

    /// Returns `false` once the loop has to stop.
    pub fn allow(&mut self, cancelled: bool) -> bool {
        if !cancelled {
            return true;
        }
        if self.used >= self.limit {
            return false;
        }
        self.used += 1;
        true
    }
}

/// Anything that can produce encoded image bytes for a tile.
pub trait ImageSource: Send + Sync {
    /// Appends the encoded image to `buffer`. Must observe `cancel`.
    fn fetch_into(
        &self,
        request: &FetchRequest,
        buffer: &mut Vec<u8>,
        cancel: &CancelToken,
    ) -> Result<(), FetchError>;
}
