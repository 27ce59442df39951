use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use anyhow::{Context, Result};
use picsum::{ImageSource, PicsumClient, PicsumConfig};
use renderer::{Rect, Size, SoftwareGpu, SoftwareTexture};
use tracing_subscriber::EnvFilter;
use wallconfig::WallConfig;
use wallpaper::{OutputLayout, OutputRegistry, WallpaperCoordinator};

use crate::cli::{OutputSpec, RunArgs};
use crate::paths::AppPaths;

const FRAME_INTERVAL: Duration = Duration::from_millis(33);
const CONFIG_POLL_INTERVAL: Duration = Duration::from_secs(1);

type Registry = OutputRegistry<SoftwareTexture>;

pub fn run(args: RunArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    let config_path = config_path(&paths, &args);
    let mut config = effective_config(&config_path, &args)?;
    let source = build_source(&config)?;

    let outputs = if args.outputs.is_empty() {
        vec![OutputSpec::default()]
    } else {
        args.outputs.clone()
    };
    tracing::debug!(
        config = %config_path.display(),
        outputs = outputs.len(),
        endpoint = %config.fetch.endpoint,
        cycle = config.wallpaper.cycle,
        cycle_time = ?config.wallpaper.cycle_time,
        "resolved picsumwall settings"
    );

    let mut exporter = args.export_dir.as_deref().map(FrameExporter::new).transpose()?;
    let mut watcher = ConfigWatcher::new(config_path, Instant::now());
    let mut gpu = SoftwareGpu::new(Size::new(1, 1));
    let mut registry: Registry = OutputRegistry::new();

    let started = Instant::now();
    for spec in &outputs {
        tracing::info!(output = %spec.name, size = %spec.size, grid = %spec.grid, "adding output");
        let coordinator = WallpaperCoordinator::new(
            spec.name.clone(),
            OutputLayout::new(spec.size, spec.grid),
            &config,
            Arc::clone(&source),
        );
        registry.insert(coordinator, started);
    }

    let stop_at = args.run_for.map(|duration| started + duration);
    let mut shown = BTreeSet::new();

    loop {
        let now = Instant::now();
        if stop_at.is_some_and(|at| now >= at) {
            tracing::info!("run duration elapsed; exiting");
            break;
        }

        registry.poll_all(&mut gpu, now);

        if watcher.changed(now) {
            match effective_config(watcher.path(), &args) {
                Ok(next) => reload(&mut registry, &mut config, next, now),
                Err(err) => {
                    tracing::warn!(error = %format!("{err:#}"), "keeping previous configuration")
                }
            }
        }

        for output in registry.iter_mut() {
            let animating = output.hooks_installed();
            if animating {
                output.frame_pre();
            }
            // The headless daemon repaints whole frames, so damage is only drained.
            output.take_damage();
            if animating && output.frame_post(now) {
                shown.insert(output.output().to_string());
                if let Some(exporter) = exporter.as_mut() {
                    if let Err(err) = exporter.export(output, &mut gpu, now) {
                        tracing::warn!(
                            output = %output.output(),
                            error = %format!("{err:#}"),
                            "failed to export frame"
                        );
                    }
                }
            }
        }

        if args.once && registry.iter().all(|output| shown.contains(output.output())) {
            tracing::info!("every output is showing a wallpaper; exiting");
            break;
        }

        let animating = registry.iter().any(|output| output.hooks_installed());
        let mut timeout = if animating {
            FRAME_INTERVAL
        } else {
            CONFIG_POLL_INTERVAL
        };
        if let Some(deadline) = registry.next_deadline() {
            timeout = timeout.min(deadline.saturating_duration_since(now));
        }
        if let Some(at) = stop_at {
            timeout = timeout.min(at.saturating_duration_since(now));
        }
        registry.wait(timeout);
    }

    registry.shutdown_all();
    Ok(())
}

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

pub fn config_path(paths: &AppPaths, args: &RunArgs) -> PathBuf {
    args.config.clone().unwrap_or_else(|| paths.config_file())
}

/// Loads the config file (defaults when it does not exist) and applies the
/// command line overrides on top.
pub fn effective_config(path: &Path, args: &RunArgs) -> Result<WallConfig> {
    let mut config = load_config(path)?;
    apply_overrides(&mut config, args);
    config.validate().with_context(|| {
        format!(
            "invalid configuration after applying overrides to {}",
            path.display()
        )
    })?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<WallConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file; using defaults");
        return Ok(WallConfig::default());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    WallConfig::from_toml_str(&contents)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

fn apply_overrides(config: &mut WallConfig, args: &RunArgs) {
    if args.no_cycle {
        config.wallpaper.cycle = false;
    }
    if let Some(cycle_time) = args.cycle_time {
        config.wallpaper.cycle_time = cycle_time;
    }
    if let Some(fade) = args.fade {
        config.wallpaper.fade_duration = fade;
    }
    if let Some(endpoint) = &args.endpoint {
        config.fetch.endpoint = endpoint.clone();
    }
}

fn build_source(config: &WallConfig) -> Result<Arc<dyn ImageSource>> {
    let client_config =
        PicsumConfig::from_options(&config.fetch).context("invalid fetch settings")?;
    let client = PicsumClient::new(client_config).context("failed to build HTTP client")?;
    Ok(Arc::new(client))
}

fn reload(registry: &mut Registry, current: &mut WallConfig, next: WallConfig, now: Instant) {
    let changes = next.changes_from(current);
    if !changes.any() {
        tracing::debug!("config file touched without effective changes");
        return;
    }
    if changes.fetch {
        match build_source(&next) {
            Ok(source) => registry.set_source(source),
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "keeping previous configuration");
                return;
            }
        }
    }
    registry.apply_options(&next, now);
    tracing::info!(?changes, "configuration reloaded");
    *current = next;
}

/// Notices edits to the config file by polling its modification time.
struct ConfigWatcher {
    path: PathBuf,
    modified: Option<SystemTime>,
    next_check: Instant,
}

impl ConfigWatcher {
    fn new(path: PathBuf, now: Instant) -> Self {
        let modified = modified_time(&path);
        Self {
            path,
            modified,
            next_check: now + CONFIG_POLL_INTERVAL,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn changed(&mut self, now: Instant) -> bool {
        if now < self.next_check {
            return false;
        }
        self.next_check = now + CONFIG_POLL_INTERVAL;
        let modified = modified_time(&self.path);
        if modified == self.modified {
            return false;
        }
        self.modified = modified;
        tracing::debug!(path = %self.path.display(), "config file changed");
        true
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

/// Writes the whole workspace plane of an output as a PNG.
struct FrameExporter {
    dir: PathBuf,
    frames: u64,
}

impl FrameExporter {
    fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create export directory {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            frames: 0,
        })
    }

    fn export(
        &mut self,
        output: &WallpaperCoordinator<SoftwareTexture>,
        gpu: &mut SoftwareGpu,
        now: Instant,
    ) -> Result<PathBuf> {
        let plane = output.layout().extent();
        gpu.resize(plane.size());
        gpu.clear([0, 0, 0, 255]);
        output.render(gpu, now, plane, &[Rect::from_size(plane.size())]);

        let path = self
            .dir
            .join(format!("{}-{:04}.png", output.output(), self.frames));
        self.frames += 1;
        gpu.save_png(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!(path = %path.display(), "exported frame");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_config_uses_defaults_with_overrides() {
        let dir = TempDir::new().unwrap();
        let args = RunArgs {
            no_cycle: true,
            fade: Some(Duration::from_millis(250)),
            endpoint: Some("http://127.0.0.1:9/".into()),
            ..RunArgs::default()
        };
        let config = effective_config(&dir.path().join("picsumwall.toml"), &args).unwrap();
        assert!(!config.wallpaper.cycle);
        assert_eq!(config.wallpaper.fade_duration, Duration::from_millis(250));
        assert_eq!(config.fetch.endpoint, "http://127.0.0.1:9/");
    }

    #[test]
    fn invalid_override_is_rejected() {
        let dir = TempDir::new().unwrap();
        let args = RunArgs {
            endpoint: Some("ftp://example.org/".into()),
            ..RunArgs::default()
        };
        assert!(effective_config(&dir.path().join("picsumwall.toml"), &args).is_err());
    }

    #[test]
    fn watcher_reports_edits_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("picsumwall.toml");
        let start = Instant::now();
        let mut watcher = ConfigWatcher::new(path.clone(), start);
        assert!(!watcher.changed(start));

        fs::write(&path, "version = 1\n").unwrap();
        assert!(watcher.changed(start + CONFIG_POLL_INTERVAL));
        assert!(!watcher.changed(start + CONFIG_POLL_INTERVAL * 2));
    }

    #[test]
    fn exporter_writes_workspace_plane() {
        let dir = TempDir::new().unwrap();
        let mut exporter = FrameExporter::new(&dir.path().join("frames")).unwrap();
        let config = WallConfig::default();
        let source = build_source(&config).unwrap();
        let output: WallpaperCoordinator<SoftwareTexture> = WallpaperCoordinator::new(
            "DP-1",
            OutputLayout::new(Size::new(4, 3), Size::new(2, 1)),
            &config,
            source,
        );
        let mut gpu = SoftwareGpu::new(Size::new(1, 1));
        let path = exporter.export(&output, &mut gpu, Instant::now()).unwrap();
        assert!(path.ends_with("DP-1-0000.png"));
        assert_eq!(gpu.size(), Size::new(8, 3));
        assert!(path.exists());
    }
}
