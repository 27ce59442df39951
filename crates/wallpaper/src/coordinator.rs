use std::collections::BTreeMap;
use std::mem;
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Receiver;
use picsum::{FetchJob, FetchReport, FetchRequest, ImageSource, ShutdownFlag};
use renderer::{decode, render_tile, Crossfade, CrossfadeCurve, DecodedImage, Gpu, Rect, Size};
use scheduler::{RetryDecision, RetryPolicy, Timer, TimerPurpose};
use wallconfig::{FadeCurve, WallConfig, WallpaperOptions};

use crate::tile::{Cell, FetchState, Tile, TileFailure};

/// Output size plus the workspace grid laid over it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputLayout {
    pub size: Size,
    /// Columns by rows.
    pub grid: Size,
}

impl OutputLayout {
    pub const fn new(size: Size, grid: Size) -> Self {
        Self { size, grid }
    }

    pub fn contains(&self, cell: Cell) -> bool {
        cell.column < self.grid.width && cell.row < self.grid.height
    }

    /// Cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = Cell> {
        let grid = self.grid;
        (0..grid.height)
            .flat_map(move |row| (0..grid.width).map(move |column| Cell::new(column, row)))
    }

    /// The whole workspace plane of the output.
    pub fn extent(&self) -> Rect {
        Rect::new(
            0,
            0,
            self.size.width.saturating_mul(self.grid.width),
            self.size.height.saturating_mul(self.grid.height),
        )
    }

    fn is_usable(&self) -> bool {
        !self.size.is_empty() && !self.grid.is_empty()
    }
}

pub fn fade_curve(curve: FadeCurve) -> CrossfadeCurve {
    match curve {
        FadeCurve::Linear => CrossfadeCurve::Linear,
        FadeCurve::Smoothstep => CrossfadeCurve::Smoothstep,
        FadeCurve::EaseInOut => CrossfadeCurve::EaseInOut,
    }
}

/// Drives the wallpapers of one output.
///
/// Every mutation happens on the caller's thread: workers only fill byte
/// buffers and report back through their completion channel, which
/// [`poll`](Self::poll) drains. New images are held back in the tiles'
/// pending slots until the whole grid is ready, then promoted together and
/// crossfaded in.
pub struct WallpaperCoordinator<T> {
    output: String,
    layout: OutputLayout,
    tiles: Vec<Tile<T>>,
    retired: Vec<FetchJob>,
    source: Arc<dyn ImageSource>,
    shutdown: ShutdownFlag,
    timer: Timer,
    fade: Crossfade,
    options: WallpaperOptions,
    retry: RetryPolicy,
    hooks_installed: bool,
    active: bool,
    damage: Vec<Rect>,
}

impl<T> WallpaperCoordinator<T> {
    pub fn new(
        output: impl Into<String>,
        layout: OutputLayout,
        config: &WallConfig,
        source: Arc<dyn ImageSource>,
    ) -> Self {
        let options = config.wallpaper.clone();
        Self {
            output: output.into(),
            layout,
            tiles: Vec::new(),
            retired: Vec::new(),
            source,
            shutdown: ShutdownFlag::new(),
            timer: Timer::new(),
            fade: Crossfade::new(options.fade_duration, fade_curve(options.fade_curve)),
            options,
            retry: RetryPolicy::from_options(&config.retry),
            hooks_installed: false,
            active: false,
            damage: Vec::new(),
        }
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn layout(&self) -> OutputLayout {
        self.layout
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn hooks_installed(&self) -> bool {
        self.hooks_installed
    }

    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    pub fn fade(&self) -> &Crossfade {
        &self.fade
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile<T>> {
        self.tiles.iter()
    }

    pub fn tile(&self, cell: Cell) -> Option<&Tile<T>> {
        self.tiles.iter().find(|tile| tile.cell() == cell)
    }

    /// Workers still attached, including those of removed tiles.
    pub fn live_workers(&self) -> usize {
        self.tiles.iter().filter(|tile| tile.is_busy()).count() + self.retired.len()
    }

    pub fn retired_workers(&self) -> usize {
        self.retired.len()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    /// Completion channels of every attached worker, for a blocking `Select`.
    pub fn receivers(&self) -> impl Iterator<Item = &Receiver<FetchReport>> {
        self.tiles
            .iter()
            .filter_map(|tile| tile.job.as_ref())
            .chain(self.retired.iter())
            .map(FetchJob::receiver)
    }

    /// Swaps the image source used by fetches started from now on.
    pub fn set_source(&mut self, source: Arc<dyn ImageSource>) {
        self.source = source;
    }

    /// Creates the tile grid and starts the first round of fetches.
    pub fn activate(&mut self, now: Instant) {
        if self.active {
            return;
        }
        self.active = true;
        self.shutdown = ShutdownFlag::new();
        let size = self.layout.size;
        self.tiles = self.layout.cells().map(|cell| Tile::new(cell, size)).collect();
        tracing::info!(
            output = %self.output,
            size = %self.layout.size,
            grid = %self.layout.grid,
            "activating wallpaper"
        );
        self.refresh_all(now);
    }

    /// Requests a new image for every tile that does not already hold one.
    pub fn refresh_all(&mut self, now: Instant) {
        if !self.active || self.shutdown.is_requested() {
            return;
        }
        self.timer.disarm();
        for index in 0..self.tiles.len() {
            self.tiles[index].failures = 0;
            if !self.tiles[index].is_ready() {
                self.start_fetch(index, now);
            }
        }
        // A shrunken grid can leave only tiles that are already waiting.
        if !self.tiles.is_empty() && self.tiles.iter().all(Tile::is_ready) {
            self.promote(now);
        }
        self.damage_whole();
    }

    pub fn workarea_changed(&mut self, now: Instant) {
        tracing::debug!(output = %self.output, "reserved workarea changed");
        self.refresh_all(now);
    }

    /// Adopts a new output size or workspace grid.
    ///
    /// Surviving cells keep their state. Removed cells drop their textures
    /// and their in-flight worker is cancelled and parked until it reports.
    pub fn reconfigure(&mut self, layout: OutputLayout, now: Instant) {
        if !layout.is_usable() {
            tracing::warn!(
                output = %self.output,
                size = %layout.size,
                grid = %layout.grid,
                "ignoring unusable output layout"
            );
            return;
        }
        if !self.active {
            self.layout = layout;
            return;
        }

        let mut kept = BTreeMap::new();
        for mut tile in mem::take(&mut self.tiles) {
            if layout.contains(tile.cell()) {
                kept.insert(tile.cell(), tile);
                continue;
            }
            if let Some(job) = tile.job.take() {
                tracing::debug!(
                    output = %self.output,
                    cell = %tile.cell(),
                    "cancelling fetch for removed tile"
                );
                job.cancel();
                self.retired.push(job);
            }
        }

        tracing::info!(
            output = %self.output,
            from_size = %self.layout.size,
            to_size = %layout.size,
            from_grid = %self.layout.grid,
            to_grid = %layout.grid,
            "output reconfigured"
        );
        self.layout = layout;
        self.tiles = layout
            .cells()
            .map(|cell| {
                let mut tile = kept.remove(&cell).unwrap_or_else(|| Tile::new(cell, layout.size));
                tile.set_output_size(layout.size);
                tile
            })
            .collect();
        self.refresh_all(now);
    }

    /// Picks up new fade settings, retry policy and the cycling switch.
    pub fn apply_options(&mut self, config: &WallConfig, now: Instant) {
        let cycle_changed = self.options.cycle != config.wallpaper.cycle;
        self.fade.configure(
            config.wallpaper.fade_duration,
            fade_curve(config.wallpaper.fade_curve),
        );
        self.options = config.wallpaper.clone();
        self.retry = RetryPolicy::from_options(&config.retry);

        if cycle_changed {
            tracing::info!(output = %self.output, cycle = self.options.cycle, "cycling toggled");
            self.timer.disarm();
            if self.options.cycle {
                self.refresh_all(now);
            }
        }
    }

    /// Handles finished fetches and a due timer. Returns the number of
    /// completions processed for live tiles.
    pub fn poll<G>(&mut self, gpu: &mut G, now: Instant) -> usize
    where
        G: Gpu<Texture = T>,
    {
        self.reap_retired();

        let mut handled = 0;
        for index in 0..self.tiles.len() {
            let Some(report) = self.tiles[index].job.as_ref().and_then(FetchJob::try_complete)
            else {
                continue;
            };
            handled += 1;
            self.complete(index, report, gpu, now);
        }

        if let Some(purpose) = self.timer.fire_if_due(now) {
            tracing::debug!(output = %self.output, ?purpose, "wallpaper timer fired");
            self.refresh_all(now);
        }
        handled
    }

    /// Damages every tile while the crossfade hooks are installed.
    pub fn frame_pre(&mut self) {
        if self.hooks_installed {
            self.damage_tiles();
        }
    }

    /// Once the fade is over, drops the faded-out textures and removes the
    /// hooks. Returns true when the hooks were removed.
    pub fn frame_post(&mut self, now: Instant) -> bool {
        if !self.hooks_installed || self.fade.running(now) {
            return false;
        }
        for tile in &mut self.tiles {
            tile.slots.release_previous();
        }
        self.hooks_installed = false;
        self.damage_whole();
        tracing::debug!(output = %self.output, "crossfade finished");
        true
    }

    /// Damage accumulated since the last call, in workspace-plane coordinates.
    pub fn take_damage(&mut self) -> Vec<Rect> {
        mem::take(&mut self.damage)
    }

    /// Draws every tile visible through `view`. `view` is a rectangle of the
    /// workspace plane; `damage` is relative to the framebuffer it maps onto.
    pub fn render<G>(&self, gpu: &mut G, now: Instant, view: Rect, damage: &[Rect]) -> usize
    where
        G: Gpu<Texture = T>,
    {
        self.tiles
            .iter()
            .filter(|tile| tile.geometry().intersect(&view).is_some())
            .map(|tile| {
                let target = tile.geometry().translate(-view.x, -view.y);
                render_tile(gpu, &tile.slots, &self.fade, now, target, damage)
            })
            .sum()
    }

    /// Stops everything: hooks, timer and workers. Joins every worker and
    /// drops all textures before returning.
    pub fn deactivate(&mut self) {
        if !self.active {
            return;
        }
        tracing::info!(output = %self.output, "deactivating wallpaper");
        self.hooks_installed = false;
        self.timer.disarm();
        self.shutdown.request();

        for tile in &mut self.tiles {
            if let Some(job) = tile.job.take() {
                let report = job.finish();
                tracing::debug!(
                    output = %self.output,
                    cell = %tile.cell(),
                    bytes = report.buffer.len(),
                    "joined fetch worker"
                );
            }
            tile.slots.clear();
        }
        for job in self.retired.drain(..) {
            job.finish();
        }
        self.tiles.clear();
        self.damage_whole();
        self.active = false;
    }

    fn start_fetch(&mut self, index: usize, now: Instant) {
        let tile = &mut self.tiles[index];
        if tile.job.is_some() {
            tracing::debug!(
                output = %self.output,
                cell = %tile.cell(),
                "fetch already running; retrying later"
            );
            self.timer.arm(self.retry.backoff, TimerPurpose::Retry, now);
            return;
        }

        let request = match FetchRequest::new(self.layout.size.width, self.layout.size.height) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(output = %self.output, %err, "cannot fetch a wallpaper");
                return;
            }
        };
        let label = format!("{}-{}", self.output, tile.cell());
        match FetchJob::spawn(Arc::clone(&self.source), request, &self.shutdown, label) {
            Ok(job) => {
                tile.job = Some(job);
                tile.state = FetchState::Fetching;
            }
            Err(err) => {
                tracing::error!(
                    output = %self.output,
                    cell = %tile.cell(),
                    %err,
                    "could not start wallpaper fetch"
                );
                self.timer.disarm();
            }
        }
    }

    fn complete<G>(&mut self, index: usize, report: FetchReport, gpu: &mut G, now: Instant)
    where
        G: Gpu<Texture = T>,
    {
        let Some(job) = self.tiles[index].job.take() else {
            return;
        };
        let cell = self.tiles[index].cell();

        if self.shutdown.is_requested() {
            tracing::debug!(
                output = %self.output,
                %cell,
                "discarding fetch finished during shutdown"
            );
            job.release();
            return;
        }

        let bytes = report.buffer.len();
        let elapsed = report.elapsed;
        let outcome = self.accept(report).and_then(|image| {
            let size = image.size();
            Ok((gpu.upload(&image)?, size))
        });

        match outcome {
            Err(failure) => {
                job.release();
                self.fail(index, failure, now);
            }
            Ok((texture, size)) => {
                let tile = &mut self.tiles[index];
                tile.slots.set_pending(texture);
                tile.state = FetchState::Ready;
                tile.failures = 0;
                tracing::info!(
                    output = %self.output,
                    %cell,
                    image = %size,
                    bytes,
                    ?elapsed,
                    "downloaded random wallpaper"
                );
                if self.tiles.iter().all(Tile::is_ready) {
                    self.promote(now);
                }
                job.release();
            }
        }
    }

    fn accept(&self, report: FetchReport) -> Result<DecodedImage, TileFailure> {
        let FetchReport {
            request,
            buffer,
            result,
            ..
        } = report;
        result?;
        let requested = Size::new(request.width, request.height);
        if requested != self.layout.size {
            return Err(TileFailure::GeometryStale {
                requested,
                current: self.layout.size,
            });
        }
        if buffer.is_empty() {
            return Err(TileFailure::EmptyPayload);
        }
        Ok(decode(&buffer)?)
    }

    fn fail(&mut self, index: usize, failure: TileFailure, now: Instant) {
        let tile = &mut self.tiles[index];
        tile.state = FetchState::Failed;
        tile.failures += 1;
        let failures = tile.failures;
        let cell = tile.cell();
        tracing::warn!(
            output = %self.output,
            %cell,
            failures,
            error = %failure,
            "wallpaper fetch failed"
        );

        match self.retry.decide(failures) {
            RetryDecision::Backoff(delay) => {
                if self.timer.arm_if_idle(delay, TimerPurpose::Retry, now) {
                    tracing::warn!(
                        output = %self.output,
                        %cell,
                        ?delay,
                        "too many failed downloads; backing off"
                    );
                }
            }
            RetryDecision::Immediate => {
                tracing::info!(output = %self.output, %cell, "retrying wallpaper download");
                self.start_fetch(index, now);
            }
        }
    }

    fn promote(&mut self, now: Instant) {
        for tile in &mut self.tiles {
            tile.slots.promote();
            tile.state = FetchState::Idle;
        }
        self.fade.start(now);
        self.install_hooks();
        if self.options.cycle {
            self.timer.arm(self.options.cycle_time, TimerPurpose::Cycle, now);
        }
        tracing::info!(
            output = %self.output,
            tiles = self.tiles.len(),
            fade = ?self.fade.duration(),
            "showing new wallpapers"
        );
    }

    fn reap_retired(&mut self) {
        let mut index = 0;
        while index < self.retired.len() {
            let Some(report) = self.retired[index].try_complete() else {
                index += 1;
                continue;
            };
            let job = self.retired.swap_remove(index);
            tracing::debug!(
                output = %self.output,
                job = %job.label(),
                bytes = report.buffer.len(),
                "dropping fetch for a removed tile"
            );
            job.release();
        }
    }

    fn install_hooks(&mut self) {
        if self.hooks_installed {
            return;
        }
        self.hooks_installed = true;
        self.damage_tiles();
    }

    fn damage_tiles(&mut self) {
        self.damage.extend(self.tiles.iter().map(Tile::geometry));
    }

    fn damage_whole(&mut self) {
        self.damage.push(self.layout.extent());
    }
}

impl<T> Drop for WallpaperCoordinator<T> {
    fn drop(&mut self) {
        self.deactivate();
    }
}
