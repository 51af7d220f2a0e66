//! Save files: the persisted market state as a JSON document on disk.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use bazaar_core::{MarketConfig, MarketEngine, PersistedState};
use chrono::Utc;
use tracing::info;

/// Write `engine`'s state to `path`, stamping the save time.
///
/// The document goes to a sibling temp file first and is renamed into
/// place, so a crash mid-write leaves the previous save intact.
pub fn save_engine(engine: &MarketEngine, path: &Path) -> Result<PersistedState> {
    let mut state = engine.save_state();
    state.saved_at = Some(Utc::now());
    write_state(&state, path)?;
    Ok(state)
}

pub fn write_state(state: &PersistedState, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create save dir: {}", dir.display()))?;
    }
    let json = state
        .to_json()
        .context("failed to serialize market state to JSON")?;

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("failed to move save into place at {}", path.display()))?;

    info!(
        path = %path.display(),
        ticks = state.ticks_processed,
        balance = state.balance,
        "market saved"
    );
    Ok(())
}

/// Read a save file without checking it against any configuration.
pub fn load_state(path: &Path) -> Result<PersistedState> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    PersistedState::from_json(&json)
        .with_context(|| format!("failed to parse save file {}", path.display()))
}

/// Rebuild an engine from `config` and the save file at `path`.
pub fn restore_engine(config: MarketConfig, path: &Path) -> Result<MarketEngine> {
    let state = load_state(path)?;
    MarketEngine::restore(config, state)
        .with_context(|| format!("save file {} does not fit the market config", path.display()))
}
