use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Select;
use picsum::ImageSource;
use renderer::Gpu;
use wallconfig::WallConfig;

use crate::coordinator::{OutputLayout, WallpaperCoordinator};

/// Compositor notifications addressed to one output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputEvent {
    Reconfigured(OutputLayout),
    WorkareaChanged,
    FramePre,
    FramePost,
}

/// Per-output coordinators, keyed by output name.
pub struct OutputRegistry<T> {
    outputs: BTreeMap<String, WallpaperCoordinator<T>>,
}

impl<T> Default for OutputRegistry<T> {
    fn default() -> Self {
        Self {
            outputs: BTreeMap::new(),
        }
    }
}

impl<T> OutputRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Registers a coordinator and activates it. A coordinator already
    /// registered under the same name is deactivated and returned.
    pub fn insert(
        &mut self,
        mut coordinator: WallpaperCoordinator<T>,
        now: Instant,
    ) -> Option<WallpaperCoordinator<T>> {
        coordinator.activate(now);
        let mut previous = self
            .outputs
            .insert(coordinator.output().to_string(), coordinator);
        if let Some(old) = previous.as_mut() {
            old.deactivate();
        }
        previous
    }

    pub fn remove(&mut self, output: &str) -> Option<WallpaperCoordinator<T>> {
        let mut removed = self.outputs.remove(output)?;
        removed.deactivate();
        tracing::info!(output, "output removed");
        Some(removed)
    }

    pub fn get(&self, output: &str) -> Option<&WallpaperCoordinator<T>> {
        self.outputs.get(output)
    }

    pub fn get_mut(&mut self, output: &str) -> Option<&mut WallpaperCoordinator<T>> {
        self.outputs.get_mut(output)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WallpaperCoordinator<T>> {
        self.outputs.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut WallpaperCoordinator<T>> {
        self.outputs.values_mut()
    }

    /// Delivers `event` to the named output. Returns false when no such
    /// output is registered.
    pub fn route(&mut self, output: &str, event: OutputEvent, now: Instant) -> bool {
        let Some(coordinator) = self.outputs.get_mut(output) else {
            tracing::debug!(output, ?event, "event for unknown output");
            return false;
        };
        match event {
            OutputEvent::Reconfigured(layout) => coordinator.reconfigure(layout, now),
            OutputEvent::WorkareaChanged => coordinator.workarea_changed(now),
            OutputEvent::FramePre => coordinator.frame_pre(),
            OutputEvent::FramePost => {
                coordinator.frame_post(now);
            }
        }
        true
    }

    pub fn apply_options(&mut self, config: &WallConfig, now: Instant) {
        for coordinator in self.outputs.values_mut() {
            coordinator.apply_options(config, now);
        }
    }

    pub fn set_source(&mut self, source: Arc<dyn ImageSource>) {
        for coordinator in self.outputs.values_mut() {
            coordinator.set_source(Arc::clone(&source));
        }
    }

    pub fn poll_all<G>(&mut self, gpu: &mut G, now: Instant) -> usize
    where
        G: Gpu<Texture = T>,
    {
        self.outputs
            .values_mut()
            .map(|coordinator| coordinator.poll(gpu, now))
            .sum()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        scheduler::earliest(self.outputs.values().map(|output| output.next_deadline()))
    }

    /// Blocks until some worker reports or `timeout` elapses. Returns true
    /// when a completion is waiting.
    pub fn wait(&self, timeout: Duration) -> bool {
        let mut select = Select::new();
        let mut waiting = 0;
        for receiver in self.outputs.values().flat_map(|output| output.receivers()) {
            select.recv(receiver);
            waiting += 1;
        }
        if waiting == 0 {
            std::thread::sleep(timeout);
            return false;
        }
        select.ready_timeout(timeout).is_ok()
    }

    /// Deactivates every output, joining all workers.
    pub fn shutdown_all(&mut self) {
        for coordinator in self.outputs.values_mut() {
            coordinator.deactivate();
        }
    }
}
