//! Runtime settings
//!
//! Loaded from a JSON file, then overridden from the command line. Gameplay
//! balance lives in the nested `formulae` table.

use std::fs;
use std::io::ErrorKind;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::thread;

use serde::{Deserialize, Serialize};

use crate::consts::CLOCK_TICK_MS;
use crate::economy::Formulae;
use crate::error::PersistenceError;

/// Default bullet count at or below which workers are not worth waking
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // === Clock ===
    /// Milliseconds per frame
    pub tick_ms: u64,
    /// Ticks per frame for each fast-forward setting, cycled in order
    pub fast_modes: Vec<u32>,
    /// Log rolling per-phase tick timings
    pub debug_timing: bool,

    // === Bullet workers ===
    /// Worker threads; unset uses the available parallelism
    pub workers: Option<usize>,
    pub parallel_threshold: usize,

    // === Game ===
    /// Fixed RNG seed; unset picks one per run
    pub seed: Option<u64>,
    /// JSON map to play; unset uses the built-in map
    pub map_path: Option<PathBuf>,
    pub high_scores_path: PathBuf,
    pub formulae: Formulae,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tick_ms: CLOCK_TICK_MS,
            fast_modes: vec![1, 2, 5],
            debug_timing: false,

            workers: None,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,

            seed: None,
            map_path: None,
            high_scores_path: PathBuf::from("creep-defence-scores.json"),
            formulae: Formulae::default(),
        }
    }
}

impl Settings {
    /// Read settings; a missing file yields the defaults
    pub fn try_load(path: &Path) -> Result<Self, PersistenceError> {
        match fs::read_to_string(path) {
            Ok(json) => Ok(serde_json::from_str(&json)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Like `try_load`, but a broken file is logged and replaced by defaults
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(settings) => {
                log::info!("Settings loaded from {}", path.display());
                settings
            }
            Err(e) => {
                log::warn!("Ignoring settings file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        log::info!("Settings saved to {}", path.display());
        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        self.workers
            .unwrap_or_else(|| thread::available_parallelism().map_or(1, NonZeroUsize::get))
    }

    /// Fast-forward multipliers with zeros dropped; never empty
    pub fn fast_modes(&self) -> Vec<u32> {
        let modes: Vec<u32> = self.fast_modes.iter().copied().filter(|m| *m > 0).collect();
        if modes.is_empty() { vec![1] } else { modes }
    }
}
