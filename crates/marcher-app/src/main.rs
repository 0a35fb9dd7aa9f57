use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use marcher_engine::display::{Display, DisplayConfig};
use marcher_engine::logging::{LoggingConfig, init_logging};

fn main() -> ExitCode {
    init_logging(LoggingConfig::default());

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Directory holding `shaders/` and `res/`, when set.
const ASSETS_ENV: &str = "MARCHER_ASSETS";

fn run() -> Result<()> {
    let config = DisplayConfig::default();
    let root = asset_root(&config, candidate_roots());
    log::info!("loading assets from '{}'", root.display());

    let mut display =
        Display::open(config.rooted_at(&root)).context("failed to open the display")?;

    while !display.should_close() {
        if let Err(e) = display.update() {
            display.cleanup();
            return Err(e);
        }
    }

    display.cleanup();
    Ok(())
}

/// Asset roots to try, in order: `MARCHER_ASSETS`, the working directory,
/// the directory of the executable.
fn candidate_roots() -> Vec<PathBuf> {
    if let Some(dir) = std::env::var_os(ASSETS_ENV) {
        return vec![PathBuf::from(dir)];
    }

    let mut roots = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd);
    }
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        roots.push(dir);
    }
    roots
}

/// First candidate containing the shader directory. Falls back to an empty
/// root, which leaves the configured paths relative to the working directory.
fn asset_root(config: &DisplayConfig, candidates: impl IntoIterator<Item = PathBuf>) -> PathBuf {
    candidates
        .into_iter()
        .find(|root| root.join(&config.shader_dir).is_dir())
        .unwrap_or_default()
}
