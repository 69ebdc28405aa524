//! Towers: targeting, cooldown, upgrades and experience
//!
//! Tower kinds are data, not subclasses: a `TowerSpec` fixes the base stats
//! and a `Special` strategy decides what a bullet does on hit.

use std::sync::Arc;

use glam::DVec2;
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::bullet::{Bullet, OnHit, Shot};
use super::creep::{Creep, CreepPhase, CreepView, DamageNotifier, DamageReport, Slow, Weaken};
use super::geometry::{Circle, Shape};
use crate::consts::*;
use crate::error::EffectError;
use crate::vector_angle;

/// Tower types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TowerKind {
    Basic,
    Slow,
    Weaken,
    Poison,
    Bomber,
    Piercer,
    MultiShot,
}

impl TowerKind {
    pub const ALL: [TowerKind; 7] = [
        TowerKind::Basic,
        TowerKind::Slow,
        TowerKind::Weaken,
        TowerKind::Poison,
        TowerKind::Bomber,
        TowerKind::Piercer,
        TowerKind::MultiShot,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TowerKind::Basic => "Basic",
            TowerKind::Slow => "Slow",
            TowerKind::Weaken => "Weaken",
            TowerKind::Poison => "Poison",
            TowerKind::Bomber => "Bomber",
            TowerKind::Piercer => "Piercer",
            TowerKind::MultiShot => "Multi Shot",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        let s = s.to_lowercase().replace([' ', '-', '_'], "");
        Self::ALL
            .into_iter()
            .find(|k| k.name().to_lowercase().replace(' ', "") == s)
    }
}

/// Independently upgradeable tower attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Attribute {
    Damage,
    Range,
    Rate,
    Speed,
    Special,
}

impl Attribute {
    pub const ALL: [Attribute; 5] = [
        Attribute::Damage,
        Attribute::Range,
        Attribute::Rate,
        Attribute::Speed,
        Attribute::Special,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// Which creep a tower prefers among those in range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Targeting {
    /// Furthest along the path
    #[default]
    First,
    Last,
    Fastest,
    Slowest,
    MostHp,
    LeastHp,
    Closest,
    Farthest,
    Random,
}

impl Targeting {
    pub const ALL: [Targeting; 9] = [
        Targeting::First,
        Targeting::Last,
        Targeting::Fastest,
        Targeting::Slowest,
        Targeting::MostHp,
        Targeting::LeastHp,
        Targeting::Closest,
        Targeting::Farthest,
        Targeting::Random,
    ];

    pub fn next(self) -> Self {
        Self::ALL[(self as usize + 1) % Self::ALL.len()]
    }

    pub fn previous(self) -> Self {
        Self::ALL[(self as usize + Self::ALL.len() - 1) % Self::ALL.len()]
    }

    /// Sort key, ascending is preferred
    fn key(self, creep: &CreepView, tower: DVec2) -> f64 {
        match self {
            Targeting::First => -creep.total_distance,
            Targeting::Last => creep.total_distance,
            Targeting::Fastest => -creep.speed,
            Targeting::Slowest => creep.speed,
            Targeting::MostHp => -creep.hp,
            Targeting::LeastHp => creep.hp,
            Targeting::Closest => creep.pos.distance_squared(tower),
            Targeting::Farthest => -creep.pos.distance_squared(tower),
            Targeting::Random => 0.0,
        }
    }
}

/// Kind-specific behaviour, grown by the Special attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Special {
    None,
    Slow {
        factor: f64,
        ticks: f64,
        ticks_per_upgrade: f64,
    },
    Weaken {
        multiplier: f64,
        ticks: f64,
        ticks_per_upgrade: f64,
    },
    /// Total poison damage equals the tower's damage, spread over a second
    Poison { ticks: f64, ticks_per_upgrade: f64 },
    Splash {
        radius: f64,
        radius_per_upgrade: f64,
        damage_divisor: f64,
    },
    Pierce { count: u32 },
    MultiShot { shots: u32, speed_factor: f64 },
}

impl Special {
    fn upgrade(&mut self) {
        match self {
            Special::None => {}
            Special::Slow {
                ticks,
                ticks_per_upgrade,
                ..
            }
            | Special::Weaken {
                ticks,
                ticks_per_upgrade,
                ..
            }
            | Special::Poison {
                ticks,
                ticks_per_upgrade,
            } => *ticks += *ticks_per_upgrade,
            Special::Splash {
                radius,
                radius_per_upgrade,
                ..
            } => *radius += *radius_per_upgrade,
            Special::Pierce { count } => *count += 1,
            Special::MultiShot { shots, .. } => *shots += 1,
        }
    }

    /// Build the on-hit behaviour for a bullet fired now
    fn on_hit(
        &self,
        damage: f64,
        notifier: Arc<dyn DamageNotifier>,
    ) -> Result<OnHit, EffectError> {
        Ok(match *self {
            Special::None | Special::MultiShot { .. } => OnHit::None,
            Special::Slow { factor, ticks, .. } => OnHit::Slow(Slow::new(factor, ticks as u32)?),
            Special::Weaken {
                multiplier, ticks, ..
            } => OnHit::Weaken(Weaken::new(multiplier, ticks as u32)?.with_notifier(notifier)),
            Special::Poison { ticks, .. } => {
                let ticks = ticks as u32;
                if ticks == 0 {
                    return Err(EffectError::ZeroDuration);
                }
                OnHit::Poison {
                    damage_per_tick: damage / CLOCK_TICKS_PER_SECOND,
                    ticks,
                }
            }
            Special::Splash {
                radius,
                damage_divisor,
                ..
            } => OnHit::Splash {
                radius,
                damage_divisor,
            },
            Special::Pierce { count } => OnHit::Pierce { count },
        })
    }

    fn describe(&self) -> String {
        match self {
            Special::None => "none".to_string(),
            Special::Slow { factor, ticks, .. } => format!(
                "{:.0}% for {:.1}s",
                factor * 100.0,
                ticks / CLOCK_TICKS_PER_SECOND
            ),
            Special::Weaken {
                multiplier, ticks, ..
            } => format!("x{:.1} for {:.1}s", multiplier, ticks / CLOCK_TICKS_PER_SECOND),
            Special::Poison { ticks, .. } => format!("{:.1}s", ticks / CLOCK_TICKS_PER_SECOND),
            Special::Splash { radius, .. } => format!("{:.0}px", radius),
            Special::Pierce { count } => count.to_string(),
            Special::MultiShot { shots, .. } => shots.to_string(),
        }
    }
}

/// Base stats for a tower kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TowerSpec {
    pub kind: TowerKind,
    /// Ticks between shots
    pub fire_rate: f64,
    pub range: f64,
    /// Pixels per tick
    pub bullet_speed: f64,
    pub damage: f64,
    pub width: f64,
    /// Distance from the tower center to the muzzle
    pub turret_width: f64,
    /// Turret tracks its target every tick, not only when firing. Towers
    /// without a turret only aim as they shoot.
    pub rotates: bool,
    pub special: Special,
}

impl TowerSpec {
    pub fn for_kind(kind: TowerKind) -> Self {
        let tps = CLOCK_TICKS_PER_SECOND;
        let base = |damage: f64, bullet_speed: f64, turret_width: f64, special: Special| Self {
            kind,
            fire_rate: 40.0,
            range: 100.0,
            bullet_speed,
            damage,
            width: TOWER_WIDTH,
            turret_width,
            rotates: turret_width > 0.0,
            special,
        };
        match kind {
            TowerKind::Basic => base(13.0, 5.0, 25.0, Special::None),
            TowerKind::Slow => base(
                1.0,
                5.0,
                23.0,
                Special::Slow {
                    factor: 0.5,
                    ticks: tps,
                    ticks_per_upgrade: tps * 0.2,
                },
            ),
            TowerKind::Weaken => base(
                1.0,
                5.0,
                19.0,
                Special::Weaken {
                    multiplier: 2.0,
                    ticks: tps / 2.0,
                    ticks_per_upgrade: tps / 10.0,
                },
            ),
            TowerKind::Poison => base(
                10.0,
                5.0,
                20.0,
                Special::Poison {
                    ticks: tps,
                    ticks_per_upgrade: tps / 10.0,
                },
            ),
            TowerKind::Bomber => base(
                10.0,
                5.0,
                15.0,
                Special::Splash {
                    radius: 30.0,
                    radius_per_upgrade: 3.0,
                    damage_divisor: 2.0,
                },
            ),
            TowerKind::Piercer => base(8.0, 5.0, 20.0, Special::Pierce { count: 1 }),
            TowerKind::MultiShot => base(
                1.5,
                3.0,
                5.0,
                Special::MultiShot {
                    shots: 5,
                    speed_factor: 1.1,
                },
            ),
        }
    }
}

/// Kills needed to leave kill level `level`
fn kills_for_level(level: u32) -> u32 {
    level * level * 10
}

/// Damage needed to leave damage level `level`
fn damage_for_level(level: u32) -> u64 {
    2u64.pow(level - 1) * 100
}

#[derive(Debug)]
struct TowerState {
    damage: f64,
    range: f64,
    fire_rate: f64,
    bullet_speed: f64,
    special: Special,
    levels: [u32; 5],

    targeting: Targeting,
    cooldown: f64,
    turret_angle: f64,

    kills: u32,
    kills_level: u32,
    damage_dealt: u64,
    /// Fraction of a damage point not yet counted
    damage_carry: f64,
    damage_level: u32,
    reported_level: u32,

    rng: Pcg32,
    /// Bullets fired but not yet handed to the simulation
    queued: Vec<Bullet>,
}

impl TowerState {
    fn upgrade(&mut self, attribute: Attribute) {
        match attribute {
            Attribute::Damage => self.damage *= UPGRADE_FACTOR,
            Attribute::Range => self.range *= UPGRADE_FACTOR,
            Attribute::Rate => self.fire_rate /= UPGRADE_FACTOR,
            Attribute::Speed => self.bullet_speed *= UPGRADE_FACTOR,
            Attribute::Special => self.special.upgrade(),
        }
        self.levels[attribute.index()] += 1;
    }

    fn upgrade_all(&mut self) {
        for attribute in Attribute::ALL {
            self.upgrade(attribute);
        }
    }

    fn experience_level(&self) -> u32 {
        self.kills_level + self.damage_level - 1
    }
}

/// A stationary tower. Shared with its bullets and any creep it has
/// weakened, so its mutable state is behind a mutex.
#[derive(Debug)]
pub struct Tower {
    id: u32,
    kind: TowerKind,
    pos: DVec2,
    width: f64,
    turret_width: f64,
    rotates: bool,
    state: Mutex<TowerState>,
}

impl Tower {
    /// Errors if the spec's special effect is invalid
    pub fn new(id: u32, pos: DVec2, spec: &TowerSpec, seed: u64) -> Result<Self, EffectError> {
        struct Probe;
        impl DamageNotifier for Probe {
            fn notify_damage(&self, _damage: f64) {}
            fn notify_kill(&self) {}
        }
        spec.special.on_hit(spec.damage, Arc::new(Probe))?;

        Ok(Self {
            id,
            kind: spec.kind,
            pos,
            width: spec.width,
            turret_width: spec.turret_width,
            rotates: spec.rotates,
            state: Mutex::new(TowerState {
                damage: spec.damage,
                range: spec.range,
                fire_rate: spec.fire_rate,
                bullet_speed: spec.bullet_speed,
                special: spec.special.clone(),
                levels: [1; 5],
                targeting: Targeting::default(),
                cooldown: 0.0,
                turret_angle: 0.0,
                kills: 0,
                kills_level: 1,
                damage_dealt: 0,
                damage_carry: 0.0,
                damage_level: 1,
                reported_level: 1,
                rng: Pcg32::seed_from_u64(seed),
                queued: Vec::new(),
            }),
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn kind(&self) -> TowerKind {
        self.kind
    }

    pub fn position(&self) -> DVec2 {
        self.pos
    }

    /// Area the tower occupies on the map
    pub fn footprint(&self) -> Circle {
        Circle::from_parts(self.pos, self.width / 2.0)
    }

    pub fn damage(&self) -> f64 {
        self.state.lock().damage
    }

    pub fn range(&self) -> f64 {
        self.state.lock().range
    }

    pub fn fire_rate(&self) -> f64 {
        self.state.lock().fire_rate
    }

    pub fn bullet_speed(&self) -> f64 {
        self.state.lock().bullet_speed
    }

    pub fn special(&self) -> Special {
        self.state.lock().special.clone()
    }

    pub fn turret_angle(&self) -> f64 {
        self.state.lock().turret_angle
    }

    pub fn targeting(&self) -> Targeting {
        self.state.lock().targeting
    }

    pub fn set_targeting(&self, targeting: Targeting) {
        self.state.lock().targeting = targeting;
    }

    pub fn attribute_level(&self, attribute: Attribute) -> u32 {
        self.state.lock().levels[attribute.index()]
    }

    pub fn kills(&self) -> u32 {
        self.state.lock().kills
    }

    pub fn damage_dealt(&self) -> u64 {
        self.state.lock().damage_dealt
    }

    pub fn experience_level(&self) -> u32 {
        self.state.lock().experience_level()
    }

    /// Purchased or granted upgrade of one attribute
    pub fn upgrade(&self, attribute: Attribute) {
        self.state.lock().upgrade(attribute);
    }

    pub fn upgrade_times(&self, attribute: Attribute, times: u32) {
        let mut s = self.state.lock();
        for _ in 0..times {
            s.upgrade(attribute);
        }
    }

    /// Display strings for every attribute
    pub fn stats(&self) -> Vec<(Attribute, String)> {
        let s = self.state.lock();
        Attribute::ALL
            .into_iter()
            .map(|a| {
                let text = match a {
                    Attribute::Damage => format!("{:.2}", s.damage),
                    Attribute::Range => format!("{:.0}", s.range),
                    Attribute::Rate => format!("{:.2}s", s.fire_rate / CLOCK_TICKS_PER_SECOND),
                    Attribute::Speed => format!("{:.1}", s.bullet_speed),
                    Attribute::Special => s.special.describe(),
                };
                (a, text)
            })
            .collect()
    }

    /// Count damage towards experience, carrying fractions
    pub fn record_damage(&self, damage: f64) {
        let mut s = self.state.lock();
        s.damage_carry += damage;
        let whole = s.damage_carry.floor();
        s.damage_carry -= whole;
        s.damage_dealt += whole as u64;
        while s.damage_dealt >= damage_for_level(s.damage_level) {
            s.damage_level += 1;
            s.upgrade_all();
        }
    }

    pub fn record_kill(&self) {
        let mut s = self.state.lock();
        s.kills += 1;
        while s.kills >= kills_for_level(s.kills_level) {
            s.kills_level += 1;
            s.upgrade_all();
        }
    }

    /// Book a hit against this tower's stats and return the money it earned.
    /// Every bullet variant credits through here.
    pub fn credit(&self, report: DamageReport) -> f64 {
        if report.kill {
            self.record_kill();
        }
        self.record_damage(report.damage);
        report.money
    }

    /// Experience level if it changed since the last call
    pub fn take_level_up(&self) -> Option<u32> {
        let mut s = self.state.lock();
        let level = s.experience_level();
        (level != s.reported_level).then(|| {
            s.reported_level = level;
            level
        })
    }

    /// Bullets fired since the last call
    pub fn drain_bullets(&self) -> Vec<Bullet> {
        std::mem::take(&mut self.state.lock().queued)
    }

    /// One firing pass over `creeps`, which must be sorted first-along-path.
    /// Fired bullets are queued; collect them with `drain_bullets`.
    pub fn tick(self: &Arc<Self>, creeps: &[Arc<Creep>], path_bounds: &[Shape]) {
        let mut s = self.state.lock();
        s.cooldown -= 1.0;
        if !self.rotates && s.cooldown > 0.0 {
            return;
        }
        let Some(target) = self.select_target(&mut s, creeps, path_bounds) else {
            return;
        };
        let dir = (target.pos - self.pos).normalize_or_zero();
        if dir == DVec2::ZERO {
            return;
        }
        s.turret_angle = vector_angle(dir);
        if s.cooldown <= 0.0 {
            let bullets = self.fire(&s, dir);
            s.queued.extend(bullets);
            s.cooldown = s.fire_rate;
        }
    }

    fn select_target(
        &self,
        s: &mut TowerState,
        creeps: &[Arc<Creep>],
        path_bounds: &[Shape],
    ) -> Option<CreepView> {
        let mut candidates: Vec<(f64, CreepView)> = creeps
            .iter()
            .map(|c| {
                let view = c.view();
                (s.targeting.key(&view, self.pos), view)
            })
            .collect();
        if s.targeting == Targeting::Random {
            candidates.shuffle(&mut s.rng);
        } else {
            candidates.sort_by(|a, b| a.0.total_cmp(&b.0));
        }
        let range = s.range;
        candidates.into_iter().map(|(_, view)| view).find(|view| {
            let alive = matches!(
                view.phase,
                CreepPhase::Spawning | CreepPhase::Traveling | CreepPhase::Exiting
            );
            let reach = range + view.half_width;
            alive
                && view.pos.distance_squared(self.pos) < reach * reach
                && (path_bounds.is_empty() || path_bounds.iter().any(|b| b.contains(view.pos)))
        })
    }

    fn fire(self: &Arc<Self>, s: &TowerState, dir: DVec2) -> Vec<Bullet> {
        let shot = Shot {
            owner: Arc::clone(self),
            start: self.pos + dir * self.turret_width,
            dir,
            speed: s.bullet_speed,
            range: s.range - (self.turret_width + BULLET_RADIUS),
            damage: s.damage,
        };
        if let Special::MultiShot {
            shots,
            speed_factor,
        } = s.special
        {
            return (0..shots)
                .map(|i| {
                    let speed = shot.speed * speed_factor.powi(i as i32);
                    Bullet::new(Shot { speed, ..shot.clone() }, OnHit::None)
                })
                .collect();
        }
        let notifier: Arc<dyn DamageNotifier> = Arc::clone(self) as Arc<dyn DamageNotifier>;
        match s.special.on_hit(s.damage, notifier) {
            Ok(on_hit) => vec![Bullet::new(shot, on_hit)],
            Err(e) => {
                log::error!("tower {} has an invalid special: {}", self.id, e);
                vec![Bullet::new(shot, OnHit::None)]
            }
        }
    }
}

impl DamageNotifier for Tower {
    fn notify_damage(&self, damage: f64) {
        self.record_damage(damage);
    }

    fn notify_kill(&self) {
        self.record_kill();
    }
}
