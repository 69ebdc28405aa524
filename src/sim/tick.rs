//! Fixed timestep simulation tick
//!
//! One tick runs the phases in a fixed order: spawn, creeps, towers,
//! bullets, bookkeeping. Only the bullet phase fans out to worker threads.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::creep::{Creep, CreepTick};
use super::pool::BulletResolver;
use super::state::{GameEvent, GamePhase, GameState};
use crate::consts::CLOCK_TICKS_PER_SECOND;

/// Outcome of a single tick
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickReport {
    /// Whole money units credited this tick
    pub money: u64,
    pub escaped: u32,
    pub bullets_fired: usize,
    pub level_complete: bool,
    pub game_over: bool,
}

/// Rolling average phase durations, in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimingAverages {
    pub total: f64,
    pub creeps: f64,
    pub towers: f64,
    pub bullets: f64,
}

/// Per-phase tick timings averaged over half a second of ticks
#[derive(Debug, Clone)]
pub struct TickTimings {
    /// Log the averages at debug level once per window
    pub enabled: bool,
    window: usize,
    samples: VecDeque<[Duration; 4]>,
    recorded: u64,
}

impl Default for TickTimings {
    fn default() -> Self {
        let window = (CLOCK_TICKS_PER_SECOND / 2.0) as usize;
        Self {
            enabled: false,
            window,
            samples: VecDeque::with_capacity(window),
            recorded: 0,
        }
    }
}

impl TickTimings {
    fn record(&mut self, sample: [Duration; 4]) {
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        self.recorded += 1;
        if self.enabled && self.recorded % self.window as u64 == 0 {
            let avg = self.averages();
            log::debug!(
                "tick {:.2}ms (creeps {:.2}, towers {:.2}, bullets {:.2})",
                avg.total,
                avg.creeps,
                avg.towers,
                avg.bullets
            );
        }
    }

    pub fn averages(&self) -> TimingAverages {
        if self.samples.is_empty() {
            return TimingAverages::default();
        }
        let mut sums = [0.0; 4];
        for sample in &self.samples {
            for (sum, d) in sums.iter_mut().zip(sample) {
                *sum += d.as_secs_f64() * 1000.0;
            }
        }
        let n = self.samples.len() as f64;
        TimingAverages {
            total: sums[0] / n,
            creeps: sums[1] / n,
            towers: sums[2] / n,
            bullets: sums[3] / n,
        }
    }
}

/// Order creeps first-along-path first. Towers rely on this for stable
/// tie-breaking.
fn sort_first_along_path(creeps: &mut Vec<Arc<Creep>>) {
    let mut keyed: Vec<(f64, Arc<Creep>)> = creeps.drain(..).map(|c| (c.total_distance(), c)).collect();
    keyed.sort_by(|a, b| b.0.total_cmp(&a.0));
    creeps.extend(keyed.into_iter().map(|(_, c)| c));
}

/// Advance the game state by one tick. Does nothing unless a level is
/// running.
pub fn tick(state: &mut GameState, resolver: &BulletResolver) -> TickReport {
    let mut report = TickReport::default();
    if state.phase != GamePhase::Running {
        return report;
    }
    let started = Instant::now();
    state.time_ticks += 1;

    if state.spawner.tick(&mut state.rng) {
        state.spawn_creep();
    }

    // Creeps
    let mut escaped = Vec::new();
    state.creeps.retain(|creep| match creep.tick() {
        CreepTick::Active => true,
        CreepTick::Finished => {
            escaped.push(creep.id());
            false
        }
        CreepTick::Despawned => false,
    });
    if !escaped.is_empty() {
        report.escaped = escaped.len() as u32;
        state.economy.lose_lives(report.escaped);
        state.lives_lost += report.escaped;
        state.observer.lives_changed(state.economy.lives());
        state
            .events
            .extend(escaped.into_iter().map(|id| GameEvent::CreepEscaped { id }));
        if state.economy.is_dead() {
            state.game_over();
            report.game_over = true;
            return report;
        }
    }
    let creeps_done = Instant::now();

    // Towers
    sort_first_along_path(&mut state.creeps);
    for tower in &state.towers {
        tower.tick(&state.creeps, state.map.path_bounds());
        let fired = tower.drain_bullets();
        report.bullets_fired += fired.len();
        state.bullets.extend(fired);
    }
    let towers_done = Instant::now();

    // Bullets
    let resolution = resolver.resolve(&mut state.bullets, &state.creeps);
    report.money = state.economy.earn(resolution.money);
    if report.money > 0 {
        state.observer.money_changed(state.economy.money());
    }
    let bullets_done = Instant::now();

    for tower in &state.towers {
        if let Some(level) = tower.take_level_up() {
            log::debug!("Tower {} reached level {}", tower.id(), level);
            state.observer.experience_changed(tower.id(), level);
            state.observer.stats_changed(tower.id(), &tower.stats());
            state.events.push(GameEvent::TowerLevelUp {
                tower_id: tower.id(),
                level,
            });
        }
    }

    if state.is_level_complete() {
        state.end_level();
        report.level_complete = true;
    }

    state.timings.record([
        bullets_done - started,
        creeps_done - started,
        towers_done - creeps_done,
        bullets_done - towers_done,
    ]);
    report
}
