//! Error taxonomy
//!
//! Precondition violations surface as typed errors at the call site. Races
//! during hit resolution are not errors (see `Creep::hit`), and threading
//! failures are logged and absorbed by the resolver.

use std::io;

use thiserror::Error;

/// Malformed geometry handed to the kernel
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("circle radius must be non-negative, got {0}")]
    NegativeRadius(f64),
    #[error("arc framing box must be square, got {width}x{height}")]
    NonCircularArc { width: f64, height: f64 },
    #[error("polygon needs at least three vertices, got {0}")]
    DegeneratePolygon(usize),
}

/// Invalid status effect parameters
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EffectError {
    #[error("slow factor must lie in (0, 1), got {0}")]
    SlowFactorOutOfRange(f64),
    #[error("weaken multiplier must be greater than 1, got {0}")]
    WeakenMultiplierTooLow(f64),
    #[error("effect duration must be at least one tick")]
    ZeroDuration,
}

/// Failures of simulation-level commands and threads
#[derive(Debug, Error)]
pub enum SimError {
    #[error("failed to spawn bullet worker: {0}")]
    WorkerSpawn(#[source] io::Error),
    #[error("failed to spawn clock thread: {0}")]
    ClockSpawn(#[source] io::Error),
    #[error("clock has already been started")]
    ClockAlreadyStarted,
    #[error("cannot place a tower at ({x:.1}, {y:.1})")]
    InvalidPlacement { x: f64, y: f64 },
    #[error("costs {cost} but only {available} available")]
    InsufficientFunds { cost: u64, available: u64 },
    #[error("no end-of-level upgrades left")]
    NoEndLevelUpgrades,
    #[error("no tower with id {0}")]
    UnknownTower(u32),
    #[error(transparent)]
    Effect(#[from] EffectError),
    #[error("a level is already in progress")]
    LevelInProgress,
    #[error("the game is over")]
    GameOver,
}

/// Failures loading or storing settings, maps and high scores
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid map: {0}")]
    InvalidMap(String),
}
