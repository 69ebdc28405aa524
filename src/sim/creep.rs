//! Creeps: the hostile units walking the path
//!
//! A creep is shared between the scheduler and the bullet workers, so its
//! mutable state lives behind a per-creep mutex. `Creep::hit` decides kills
//! under that lock, which makes concurrent hits against one creep safe: only
//! one of them can take health past zero and report the kill.

use std::fmt;
use std::sync::Arc;

use glam::DVec2;
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::geometry::{Circle, Segment};
use super::tower::TowerKind;
use crate::consts::*;
use crate::economy::Formulae;
use crate::error::EffectError;
use crate::vector_angle;

/// Lifecycle of a creep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreepPhase {
    /// Walking onto the map towards the first waypoint
    Spawning,
    /// Following the path
    Traveling,
    /// Past the last waypoint, walking off the visible area
    Exiting,
    /// Left the map alive; costs a life
    Finished,
    /// Killed, shrinking away
    Dying,
    /// Gone from the game
    Despawned,
}

/// Result of advancing a creep by one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreepTick {
    /// Still in play (walking or shrinking)
    Active,
    /// Reached the end of the path this tick
    Finished,
    /// Death animation complete
    Despawned,
}

/// Outcome of one successful hit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DamageReport {
    /// Damage attributed to the attacker
    pub damage: f64,
    /// Money earned by the hit
    pub money: f64,
    /// Whether the attacker is credited with the kill
    pub kill: bool,
}

/// Receives damage and kills caused indirectly, e.g. by a weaken effect
/// amplifying someone else's hit.
pub trait DamageNotifier: Send + Sync {
    fn notify_damage(&self, damage: f64);
    fn notify_kill(&self);
}

/// Speed reduction; `factor` in (0, 1)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Slow {
    factor: f64,
    ticks: u32,
}

impl Slow {
    pub fn new(factor: f64, ticks: u32) -> Result<Self, EffectError> {
        if !(factor > 0.0 && factor < 1.0) {
            return Err(EffectError::SlowFactorOutOfRange(factor));
        }
        if ticks == 0 {
            return Err(EffectError::ZeroDuration);
        }
        Ok(Self { factor, ticks })
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }
}

/// Damage amplification; `multiplier` > 1. The optional notifier is told
/// about the extra damage it causes.
#[derive(Clone)]
pub struct Weaken {
    multiplier: f64,
    ticks: u32,
    notifier: Option<Arc<dyn DamageNotifier>>,
}

impl fmt::Debug for Weaken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Weaken")
            .field("multiplier", &self.multiplier)
            .field("ticks", &self.ticks)
            .field("notifier", &self.notifier.is_some())
            .finish()
    }
}

impl Weaken {
    pub fn new(multiplier: f64, ticks: u32) -> Result<Self, EffectError> {
        if !(multiplier > 1.0) {
            return Err(EffectError::WeakenMultiplierTooLow(multiplier));
        }
        if ticks == 0 {
            return Err(EffectError::ZeroDuration);
        }
        Ok(Self {
            multiplier,
            ticks,
            notifier: None,
        })
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn DamageNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }
}

/// Whether a new effect should replace the active one. A stronger effect
/// always wins, even if shorter. One that is not stronger but within
/// tolerance wins only if it lasts longer.
fn supersedes(current: Option<(f64, u32)>, new: (f64, u32), stronger: fn(f64, f64) -> bool) -> bool {
    match current {
        None => true,
        Some((magnitude, ticks_left)) => {
            stronger(new.0, magnitude)
                || ((new.0 - magnitude).abs() < EFFECT_TOLERANCE && new.1 > ticks_left)
        }
    }
}

/// Fixed attributes a creep is created with
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CreepStats {
    pub hp: f64,
    /// Health of an average creep this level; rewards scale with it
    pub level_hp: f64,
    /// Pixels per tick
    pub speed: f64,
    pub width: f64,
}

/// Money rules captured at spawn time
#[derive(Debug, Clone, Copy, PartialEq)]
struct Rewards {
    money_per_hp: f64,
    kill_bonus: f64,
    split_weaken_credit: bool,
}

impl Rewards {
    fn new(formulae: &Formulae, stats: &CreepStats) -> Self {
        let hp_factor = stats.level_hp / stats.hp;
        Self {
            money_per_hp: formulae.damage_money(1.0, hp_factor),
            kill_bonus: formulae.kill_bonus(stats.level_hp),
            split_weaken_credit: formulae.split_weaken_credit,
        }
    }
}

/// Point-in-time copy of a creep for drawing and ordering
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CreepView {
    pub id: u32,
    pub pos: DVec2,
    pub angle: f64,
    pub half_width: f64,
    pub hp: f64,
    pub speed: f64,
    pub total_distance: f64,
    pub phase: CreepPhase,
}

#[derive(Debug)]
struct CreepState {
    phase: CreepPhase,
    pos: DVec2,
    angle: f64,
    width: f64,
    hp: f64,

    /// Waypoint currently walked towards
    goal: DVec2,
    next_waypoint: usize,
    /// Per-tick displacement at full speed
    step: DVec2,
    /// Steps needed to reach `goal`, and steps taken so far
    segment_steps: f64,
    steps: f64,
    total_distance: f64,

    speed_factor: f64,
    slow: Option<Slow>,
    weaken: Option<Weaken>,
    poison_ticks: u32,

    /// Recent attacker kinds, most recent last, no duplicates
    attackers: Vec<TowerKind>,
}

impl CreepState {
    fn is_alive(&self) -> bool {
        !matches!(
            self.phase,
            CreepPhase::Dying | CreepPhase::Despawned | CreepPhase::Finished
        )
    }

    fn half_width(&self) -> f64 {
        self.width / 2.0
    }

    /// Bonus for a rotating streak of distinct attacker kinds
    fn combo_multiplier(&mut self, attacker: Option<TowerKind>) -> f64 {
        let Some(kind) = attacker else {
            return 1.0;
        };
        let streak = match self.attackers.iter().rposition(|k| *k == kind) {
            Some(i) => {
                let n = self.attackers.len() - i - 1;
                self.attackers.remove(i);
                n
            }
            None => self.attackers.len(),
        };
        self.attackers.push(kind);
        COMBO_BONUS.powi(streak as i32)
    }

    /// Move along the current segment; false once the creep has left the map
    fn advance(&mut self, path: &[DVec2], speed: f64) -> bool {
        self.pos += self.step * self.speed_factor;
        self.total_distance += self.step.length() * self.speed_factor;
        self.steps += self.speed_factor;
        if self.steps + 1.0 > self.segment_steps {
            return self.next_move(path, speed);
        }
        true
    }

    fn next_move(&mut self, path: &[DVec2], speed: f64) -> bool {
        if self.next_waypoint < path.len() {
            self.head_towards_next(path, speed);
            true
        } else if self.phase != CreepPhase::Exiting && self.step != DVec2::ZERO {
            // Keep walking until fully off screen
            self.phase = CreepPhase::Exiting;
            self.segment_steps += (self.half_width() + 1.0) / self.step.length();
            true
        } else {
            false
        }
    }

    fn head_towards_next(&mut self, path: &[DVec2], speed: f64) {
        self.pos = self.goal;
        self.goal = path[self.next_waypoint];
        self.next_waypoint += 1;
        let line = self.goal - self.pos;
        self.step = line.normalize_or_zero() * speed;
        self.segment_steps = if speed > 0.0 {
            line.length() / speed
        } else {
            f64::INFINITY
        };
        self.steps = 0.0;
        if self.step != DVec2::ZERO {
            self.angle = vector_angle(self.step);
        }
        self.phase = if self.next_waypoint <= 1 {
            CreepPhase::Spawning
        } else {
            CreepPhase::Traveling
        };
    }

    fn decrement_effects(&mut self) {
        if let Some(slow) = &mut self.slow {
            slow.ticks -= 1;
            if slow.ticks == 0 {
                self.slow = None;
                self.speed_factor = 1.0;
            }
        }
        if let Some(weaken) = &mut self.weaken {
            weaken.ticks -= 1;
            if weaken.ticks == 0 {
                self.weaken = None;
            }
        }
        self.poison_ticks = self.poison_ticks.saturating_sub(1);
    }
}

/// A hostile unit following the map path
pub struct Creep {
    id: u32,
    max_hp: f64,
    speed: f64,
    rewards: Rewards,
    path: Arc<[DVec2]>,
    state: Mutex<CreepState>,
}

impl fmt::Debug for Creep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Creep")
            .field("id", &self.id)
            .field("max_hp", &self.max_hp)
            .field("speed", &self.speed)
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl Creep {
    /// Spawn a creep for a level. Health and speed are scaled inversely by
    /// the same random factor, so fast creeps are proportionally weaker.
    pub fn spawn(
        id: u32,
        level_hp: f64,
        formulae: &Formulae,
        path: Arc<[DVec2]>,
        rng: &mut impl Rng,
    ) -> Self {
        let mult = rng.random_range(1.0..CREEP_MAX_SPEED_MULT);
        let (hp, speed) = if rng.random_bool(0.5) {
            (level_hp / mult, CREEP_BASE_SPEED * mult)
        } else {
            (level_hp * mult, CREEP_BASE_SPEED / mult)
        };
        let stats = CreepStats {
            hp,
            level_hp,
            speed,
            width: CREEP_WIDTH,
        };
        Self::new(id, stats, formulae, path)
    }

    /// Creep with explicit stats. It starts just before the first waypoint,
    /// off the visible area, and walks onto the map.
    pub fn new(id: u32, stats: CreepStats, formulae: &Formulae, path: Arc<[DVec2]>) -> Self {
        let start = match path.as_ref() {
            [first, second, ..] => {
                let line = *second - *first;
                let len = line.length();
                if len > 0.0 {
                    *first - line * ((stats.width / 2.0 + 1.0) / len)
                } else {
                    *first
                }
            }
            [only] => *only,
            [] => DVec2::ZERO,
        };
        let mut state = CreepState {
            phase: CreepPhase::Spawning,
            pos: start,
            angle: 0.0,
            width: stats.width,
            hp: stats.hp,
            goal: start,
            next_waypoint: 0,
            step: DVec2::ZERO,
            segment_steps: 0.0,
            steps: 0.0,
            total_distance: 0.0,
            speed_factor: 1.0,
            slow: None,
            weaken: None,
            poison_ticks: 0,
            attackers: Vec::new(),
        };
        if path.len() >= 2 {
            state.head_towards_next(&path, stats.speed);
        } else {
            state.phase = CreepPhase::Traveling;
        }
        Self {
            id,
            max_hp: stats.hp,
            speed: stats.speed,
            rewards: Rewards::new(formulae, &stats),
            path,
            state: Mutex::new(state),
        }
    }

    /// A creep that never moves, e.g. a target placed for a scenario
    pub fn stationary(id: u32, pos: DVec2, stats: CreepStats, formulae: &Formulae) -> Self {
        Self::new(id, stats, formulae, Arc::from(vec![pos]))
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn max_hp(&self) -> f64 {
        self.max_hp
    }

    pub fn kill_bonus(&self) -> f64 {
        self.rewards.kill_bonus
    }

    /// Money paid for removing `hp` health
    pub fn damage_money(&self, hp: f64) -> f64 {
        self.rewards.money_per_hp * hp
    }

    pub fn position(&self) -> DVec2 {
        self.state.lock().pos
    }

    pub fn half_width(&self) -> f64 {
        self.state.lock().half_width()
    }

    pub fn hp(&self) -> f64 {
        self.state.lock().hp
    }

    /// Current speed including any slow
    pub fn speed(&self) -> f64 {
        self.speed * self.state.lock().speed_factor
    }

    pub fn total_distance(&self) -> f64 {
        self.state.lock().total_distance
    }

    pub fn phase(&self) -> CreepPhase {
        self.state.lock().phase
    }

    pub fn is_alive(&self) -> bool {
        self.state.lock().is_alive()
    }

    pub fn speed_factor(&self) -> f64 {
        self.state.lock().speed_factor
    }

    pub fn slow_effect(&self) -> Option<Slow> {
        self.state.lock().slow
    }

    pub fn weaken_multiplier(&self) -> f64 {
        self.state
            .lock()
            .weaken
            .as_ref()
            .map_or(1.0, |w| w.multiplier)
    }

    pub fn weaken_ticks(&self) -> u32 {
        self.state.lock().weaken.as_ref().map_or(0, |w| w.ticks)
    }

    pub fn is_poisoned(&self) -> bool {
        self.state.lock().poison_ticks > 0
    }

    pub fn view(&self) -> CreepView {
        let s = self.state.lock();
        CreepView {
            id: self.id,
            pos: s.pos,
            angle: s.angle,
            half_width: s.half_width(),
            hp: s.hp,
            speed: self.speed * s.speed_factor,
            total_distance: s.total_distance,
            phase: s.phase,
        }
    }

    /// Collision bounds
    pub fn bounds(&self) -> Circle {
        let s = self.state.lock();
        Circle::from_parts(s.pos, s.half_width().max(0.0))
    }

    /// Where `segment` first enters a live creep's bounds
    pub fn segment_entry(&self, segment: &Segment) -> Option<DVec2> {
        let s = self.state.lock();
        if !s.is_alive() {
            return None;
        }
        Circle::from_parts(s.pos, s.half_width().max(0.0)).segment_entry(segment)
    }

    /// Whether a live creep overlaps `circle`
    pub fn intersects_circle(&self, circle: &Circle) -> bool {
        let s = self.state.lock();
        s.is_alive() && Circle::from_parts(s.pos, s.half_width().max(0.0)).intersects_circle(circle)
    }

    /// Advance one tick
    pub fn tick(&self) -> CreepTick {
        let mut s = self.state.lock();
        match s.phase {
            CreepPhase::Spawning | CreepPhase::Traveling | CreepPhase::Exiting => {
                if self.path.len() >= 2 && !s.advance(&self.path, self.speed) {
                    s.phase = CreepPhase::Finished;
                    return CreepTick::Finished;
                }
                s.decrement_effects();
                CreepTick::Active
            }
            CreepPhase::Dying => {
                s.width -= CREEP_DEATH_SHRINK;
                if s.half_width() < 0.0 {
                    s.phase = CreepPhase::Despawned;
                    CreepTick::Despawned
                } else {
                    CreepTick::Active
                }
            }
            CreepPhase::Finished => CreepTick::Finished,
            CreepPhase::Despawned => CreepTick::Despawned,
        }
    }

    /// Apply a hit. Returns `None` if the creep is already dead, which is
    /// expected when several bullets race for the same creep.
    pub fn hit(&self, damage: f64, attacker: Option<TowerKind>) -> Option<DamageReport> {
        let mut indirect = None;
        let report = {
            let mut s = self.state.lock();
            if !s.is_alive() {
                return None;
            }
            let damage = damage * s.combo_multiplier(attacker);
            let (adjusted, notifier) = match &s.weaken {
                Some(w) => (damage * w.multiplier, w.notifier.clone()),
                None => (damage, None),
            };
            let split = self.rewards.split_weaken_credit && adjusted > damage;
            let hp = s.hp;
            if hp - adjusted <= 0.0 {
                s.hp = 0.0;
                s.phase = CreepPhase::Dying;
                let money = self.damage_money(hp) + self.rewards.kill_bonus;
                match notifier {
                    // The unweakened hit would not have killed
                    Some(notifier) if split && hp > damage => {
                        indirect = Some((notifier, hp - damage, true));
                        DamageReport {
                            damage,
                            money,
                            kill: false,
                        }
                    }
                    _ => DamageReport {
                        damage: hp,
                        money,
                        kill: true,
                    },
                }
            } else {
                s.hp -= adjusted;
                let money = self.damage_money(adjusted);
                if let Some(notifier) = notifier.filter(|_| split) {
                    indirect = Some((notifier, adjusted - damage, false));
                    DamageReport {
                        damage,
                        money,
                        kill: false,
                    }
                } else {
                    DamageReport {
                        damage: adjusted,
                        money,
                        kill: false,
                    }
                }
            }
        };
        // Notify outside the lock; the notifier locks its own tower
        if let Some((notifier, damage, kill)) = indirect {
            notifier.notify_damage(damage);
            if kill {
                notifier.notify_kill();
            }
        }
        Some(report)
    }

    /// Slow the creep unless a better slow is active
    pub fn slow(&self, slow: Slow) {
        let mut s = self.state.lock();
        if !s.is_alive() {
            return;
        }
        let current = s.slow.map(|c| (c.factor, c.ticks));
        if supersedes(current, (slow.factor, slow.ticks), |new, old| new < old) {
            s.speed_factor = slow.factor;
            s.slow = Some(slow);
        }
    }

    /// Weaken the creep unless a better weaken is active
    pub fn weaken(&self, weaken: Weaken) {
        let mut s = self.state.lock();
        if !s.is_alive() {
            return;
        }
        let current = s.weaken.as_ref().map(|c| (c.multiplier, c.ticks));
        if supersedes(current, (weaken.multiplier, weaken.ticks), |new, old| new > old) {
            s.weaken = Some(weaken);
        }
    }

    /// Mark the creep poisoned for at least `ticks`
    pub fn poison(&self, ticks: u32) -> Result<(), EffectError> {
        if ticks == 0 {
            return Err(EffectError::ZeroDuration);
        }
        let mut s = self.state.lock();
        s.poison_ticks = s.poison_ticks.max(ticks);
        Ok(())
    }
}
