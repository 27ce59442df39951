mod cli;
mod paths;
mod run;

use anyhow::Result;
use cli::{Command, ConfigAction, RunArgs};
use paths::AppPaths;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Some(Command::Config(config_cmd)) => handle_config_command(config_cmd.action, &cli.run),
        None => run::run(cli.run),
    }
}

fn handle_config_command(action: ConfigAction, args: &RunArgs) -> Result<()> {
    let paths = AppPaths::discover()?;
    match action {
        ConfigAction::Where => run_config_where(&paths, args),
        ConfigAction::Check => run_config_check(&paths, args),
    }
}

fn run_config_where(paths: &AppPaths, args: &RunArgs) -> Result<()> {
    let file = run::config_path(paths, args);
    println!("Configuration:");
    println!("  dir:   {}", paths.config_dir().display());
    println!(
        "  file:  {}{}",
        file.display(),
        if file.exists() { "" } else { " (missing)" }
    );
    Ok(())
}

fn run_config_check(paths: &AppPaths, args: &RunArgs) -> Result<()> {
    let file = run::config_path(paths, args);
    let config = run::effective_config(&file, args)?;
    println!("Configuration OK: {}", file.display());
    println!("  cycle:                     {}", config.wallpaper.cycle);
    println!("  cycle_time:                {:?}", config.wallpaper.cycle_time);
    println!("  fade_duration:             {:?}", config.wallpaper.fade_duration);
    println!("  fade_curve:                {:?}", config.wallpaper.fade_curve);
    println!("  endpoint:                  {}", config.fetch.endpoint);
    println!("  connect_timeout:           {:?}", config.fetch.connect_timeout);
    println!("  request_timeout:           {:?}", config.fetch.request_timeout);
    println!(
        "  shutdown_grace_iterations: {}",
        config.fetch.shutdown_grace_iterations
    );
    println!("  retry_threshold:           {}", config.retry.threshold);
    println!("  retry_backoff:             {:?}", config.retry.backoff);
    Ok(())
}
