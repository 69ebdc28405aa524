//! High score leaderboard
//!
//! One table per map, ranked by the level reached. Persisted as JSON.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;

/// Maximum number of high scores kept per map
pub const MAX_HIGH_SCORES: usize = 10;

/// A single high score entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighScoreEntry {
    /// Level reached when the game ended
    pub level: u32,
    /// Unix timestamp (ms) when achieved
    pub timestamp: u64,
}

/// High score tables keyed by map name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HighScores {
    maps: HashMap<String, Vec<HighScoreEntry>>,
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

impl HighScores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self, map: &str) -> &[HighScoreEntry] {
        self.maps.get(map).map_or(&[], Vec::as_slice)
    }

    /// Check if a level qualifies for the map's table
    pub fn qualifies(&self, map: &str, level: u32) -> bool {
        if level == 0 {
            return false;
        }
        let entries = self.entries(map);
        entries.len() < MAX_HIGH_SCORES || entries.last().is_none_or(|e| level > e.level)
    }

    /// Rank a level would achieve (1-indexed, None if it doesn't qualify).
    /// Ties rank below existing entries.
    pub fn potential_rank(&self, map: &str, level: u32) -> Option<usize> {
        if !self.qualifies(map, level) {
            return None;
        }
        let entries = self.entries(map);
        let rank = entries.iter().position(|e| level > e.level);
        Some(rank.unwrap_or(entries.len()) + 1)
    }

    /// Add a result. Returns the rank achieved or None if it didn't qualify.
    pub fn record(&mut self, map: &str, level: u32, timestamp: u64) -> Option<usize> {
        let rank = self.potential_rank(map, level)?;
        let entries = self.maps.entry(map.to_string()).or_default();
        entries.insert(rank - 1, HighScoreEntry { level, timestamp });
        entries.truncate(MAX_HIGH_SCORES);
        Some(rank)
    }

    /// Best level reached on a map
    pub fn top(&self, map: &str) -> Option<u32> {
        self.entries(map).first().map(|e| e.level)
    }

    pub fn map_names(&self) -> impl Iterator<Item = &str> {
        self.maps.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.maps.values().all(Vec::is_empty)
    }

    /// Load from `path`; a missing file is an empty leaderboard
    pub fn load(path: &Path) -> Result<Self, PersistenceError> {
        match fs::read_to_string(path) {
            Ok(json) => {
                let scores: Self = serde_json::from_str(&json)?;
                log::info!("Loaded high scores for {} maps", scores.maps.len());
                Ok(scores)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::info!("No high scores found, starting fresh");
                Ok(Self::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        log::info!("High scores saved to {}", path.display());
        Ok(())
    }
}
