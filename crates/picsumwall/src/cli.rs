use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use renderer::Size;

#[derive(Parser, Debug)]
#[command(
    name = "picsumwall",
    author,
    version,
    about = "Random picsum.photos wallpapers with crossfades",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Configuration file; defaults to `picsumwall.toml` in the config directory.
    #[arg(long, value_name = "FILE", env = "PICSUMWALL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Simulated output as `NAME:WIDTHxHEIGHT[:COLUMNSxROWS]`; repeatable.
    #[arg(long = "output", value_name = "SPEC", value_parser = parse_output)]
    pub outputs: Vec<OutputSpec>,

    /// Disable periodic cycling regardless of the config file.
    #[arg(long)]
    pub no_cycle: bool,

    /// Override the cycle interval (seconds or e.g. `90s`, `5m`).
    #[arg(long, value_name = "DURATION", value_parser = parse_duration_arg)]
    pub cycle_time: Option<Duration>,

    /// Override the crossfade duration (seconds or e.g. `750ms`).
    #[arg(long = "fade", value_name = "DURATION", value_parser = parse_duration_arg)]
    pub fade: Option<Duration>,

    /// Override the image endpoint (e.g. `https://picsum.photos/`).
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Write a PNG of each output whenever a crossfade completes.
    #[arg(long, value_name = "DIR")]
    pub export_dir: Option<PathBuf>,

    /// Exit once every output has shown its first wallpaper.
    #[arg(long)]
    pub once: bool,

    /// Exit after the given duration.
    #[arg(long, value_name = "DURATION", value_parser = parse_duration_arg)]
    pub run_for: Option<Duration>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Inspect the configuration.
    Config(ConfigCommand),
}

#[derive(Parser, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the resolved configuration directory and file.
    Where,
    /// Validate the configuration (with command line overrides) and print it.
    Check,
}

/// A headless output: its name, pixel size and workspace grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSpec {
    pub name: String,
    pub size: Size,
    pub grid: Size,
}

impl Default for OutputSpec {
    fn default() -> Self {
        Self {
            name: "HEADLESS-1".to_string(),
            size: Size::new(1920, 1080),
            grid: Size::new(1, 1),
        }
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_output(value: &str) -> Result<OutputSpec, String> {
    let trimmed = value.trim();
    let mut parts = trimmed.split(':');
    let name = parts.next().unwrap_or_default().trim();
    if name.is_empty() {
        return Err("output name must not be empty".into());
    }
    let Some(size) = parts.next() else {
        return Err(format!(
            "output '{name}' needs a size (e.g. {name}:1920x1080)"
        ));
    };
    let (width, height) = parse_dimensions(size, "output size")?;
    let grid = match parts.next() {
        Some(grid) => parse_dimensions(grid, "workspace grid")?,
        None => (1, 1),
    };
    if parts.next().is_some() {
        return Err("expected NAME:WIDTHxHEIGHT[:COLUMNSxROWS]".into());
    }
    Ok(OutputSpec {
        name: name.to_string(),
        size: Size::new(width, height),
        grid: Size::new(grid.0, grid.1),
    })
}

pub fn parse_duration_arg(value: &str) -> Result<Duration, String> {
    wallconfig::parse_duration(value).map_err(|err| err.to_string())
}

fn parse_dimensions(value: &str, what: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT for {what}"))?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid width in {what}"))?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid height in {what}"))?;
    if width == 0 || height == 0 {
        return Err(format!("{what} must be greater than zero"));
    }
    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_output_specs() {
        assert_eq!(
            parse_output("DP-1:2560x1440").unwrap(),
            OutputSpec {
                name: "DP-1".into(),
                size: Size::new(2560, 1440),
                grid: Size::new(1, 1),
            }
        );
        assert_eq!(
            parse_output("HDMI-A-1:1920X1080:3x2").unwrap().grid,
            Size::new(3, 2)
        );
        assert!(parse_output("DP-1").is_err());
        assert!(parse_output(":1920x1080").is_err());
        assert!(parse_output("DP-1:0x1080").is_err());
        assert!(parse_output("DP-1:1920x1080:2x2:extra").is_err());
    }

    #[test]
    fn parses_duration_overrides() {
        assert_eq!(parse_duration_arg("90").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration_arg("750ms").unwrap(), Duration::from_millis(750));
        assert!(parse_duration_arg("soon").is_err());
    }

    #[test]
    fn cli_accepts_repeated_outputs() {
        let cli = Cli::try_parse_from([
            "picsumwall",
            "--output",
            "DP-1:800x600",
            "--output",
            "DP-2:1024x768:2x1",
            "--no-cycle",
            "--fade",
            "2s",
        ])
        .unwrap();
        assert_eq!(cli.run.outputs.len(), 2);
        assert!(cli.run.no_cycle);
        assert_eq!(cli.run.fade, Some(Duration::from_secs(2)));
        assert!(cli.command.is_none());
    }
}
