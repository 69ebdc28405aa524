//! Creep Defence - a tick-driven tower defence simulation
//!
//! Core modules:
//! - `sim`: Geometry kernel, creeps, bullets, towers and the tick scheduler
//! - `economy`: Money, lives and the tunable reward formulae
//! - `map`: Waypoints, path bounds and tower placement
//! - `assets`: Quantised rotation cache for the drawing collaborator
//! - `highscores`: Per-map best levels reached
//! - `settings`: Runtime configuration

pub mod assets;
pub mod economy;
pub mod error;
pub mod highscores;
pub mod map;
pub mod settings;
pub mod sim;

pub use economy::{Economy, EconomyObserver, Formulae};
pub use error::{EffectError, GeometryError, PersistenceError, SimError};
pub use highscores::HighScores;
pub use map::GameMap;
pub use settings::Settings;

use glam::DVec2;

/// Game configuration constants
pub mod consts {
    /// Milliseconds per simulation tick
    pub const CLOCK_TICK_MS: u64 = 30;
    /// Simulation ticks per second (fractional, 33.3)
    pub const CLOCK_TICKS_PER_SECOND: f64 = 1000.0 / CLOCK_TICK_MS as f64;

    /// Play area dimensions
    pub const MAP_WIDTH: f64 = 600.0;
    pub const MAP_HEIGHT: f64 = 600.0;

    /// Distance past the play area a bullet may travel before it is dropped
    pub const FUDGE_DISTANCE: f64 = 50.0;
    pub const BULLET_RADIUS: f64 = 3.0;

    /// Creep defaults
    pub const CREEP_WIDTH: f64 = 20.0;
    pub const CREEP_BASE_SPEED: f64 = 2.0;
    /// Upper bound (exclusive) of the random speed/health trade-off
    pub const CREEP_MAX_SPEED_MULT: f64 = 2.0;
    /// Width lost per tick while a dead creep shrinks away
    pub const CREEP_DEATH_SHRINK: f64 = 4.0;
    /// Damage bonus per distinct tower type in the combo streak
    pub const COMBO_BONUS: f64 = 1.1;
    /// Magnitudes closer than this count as equal when stacking effects
    pub const EFFECT_TOLERANCE: f64 = 0.01;

    /// Compounding factor of a purchased attribute upgrade
    pub const UPGRADE_FACTOR: f64 = 1.05;
    pub const TOWER_WIDTH: f64 = 50.0;
}

/// Normalized angle to [-π, π)
#[inline]
pub fn normalize_angle(mut angle: f64) -> f64 {
    use std::f64::consts::PI;
    while angle >= PI {
        angle -= 2.0 * PI;
    }
    while angle < -PI {
        angle += 2.0 * PI;
    }
    angle
}

/// Angle of a vector measured counter-clockwise from +x
#[inline]
pub fn vector_angle(v: DVec2) -> f64 {
    v.y.atan2(v.x)
}

/// Convert polar (r, theta) to cartesian (x, y) around `center`
#[inline]
pub fn polar_to_cartesian(center: DVec2, r: f64, theta: f64) -> DVec2 {
    center + DVec2::new(r * theta.cos(), r * theta.sin())
}
