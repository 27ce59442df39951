use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use image::{ImageFormat, Rgb, RgbImage};
use picsum::{CancelToken, FetchError, FetchRequest, ImageSource};
use renderer::Gpu;

use crate::WallpaperCoordinator;

#[derive(Debug, Clone, Copy)]
pub enum Step {
    /// A PNG of the requested size filled with one colour.
    Image([u8; 3]),
    Fail,
    Empty,
    Garbage,
    /// Blocks until cancelled.
    Hold,
    /// Blocks until `open_gate` releases it, then behaves like `Image`.
    Gate,
}

pub struct ScriptedSource {
    script: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
    gate_tx: Sender<()>,
    gate_rx: Receiver<()>,
}

impl ScriptedSource {
    /// Steps are consumed in call order; once exhausted every fetch succeeds.
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        let (gate_tx, gate_rx) = unbounded();
        Arc::new(Self {
            script: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
            gate_tx,
            gate_rx,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn open_gate(&self, count: usize) {
        for _ in 0..count {
            self.gate_tx.send(()).unwrap();
        }
    }
}

impl ImageSource for ScriptedSource {
    fn fetch_into(
        &self,
        request: &FetchRequest,
        buffer: &mut Vec<u8>,
        cancel: &CancelToken,
    ) -> Result<(), FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Step::Image([90, 90, 90]));

        match step {
            Step::Image(color) => {
                buffer.extend(png(request.width, request.height, color));
                Ok(())
            }
            Step::Fail => Err(FetchError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            ))),
            Step::Empty => Ok(()),
            Step::Garbage => {
                buffer.extend_from_slice(b"<html>not an image</html>");
                Ok(())
            }
            Step::Hold => {
                while !cancel.is_cancelled() {
                    std::thread::sleep(Duration::from_millis(2));
                }
                Err(FetchError::ShutdownAborted)
            }
            Step::Gate => loop {
                if cancel.is_cancelled() {
                    return Err(FetchError::ShutdownAborted);
                }
                if self.gate_rx.recv_timeout(Duration::from_millis(2)).is_ok() {
                    buffer.extend(png(request.width, request.height, [90, 90, 90]));
                    return Ok(());
                }
            },
        }
    }
}

pub fn png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb(color));
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png).unwrap();
    bytes.into_inner()
}

/// Polls at a fixed `now` until `done` holds, failing after a few seconds.
pub fn drive<T, G>(
    coordinator: &mut WallpaperCoordinator<T>,
    gpu: &mut G,
    now: Instant,
    mut done: impl FnMut(&WallpaperCoordinator<T>) -> bool,
) where
    G: Gpu<Texture = T>,
{
    let give_up = Instant::now() + Duration::from_secs(10);
    while !done(coordinator) {
        assert!(Instant::now() < give_up, "wallpaper did not settle");
        coordinator.poll(gpu, now);
        std::thread::sleep(Duration::from_millis(2));
    }
}
