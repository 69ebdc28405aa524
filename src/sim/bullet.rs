//! Bullets: flight, collision and hit resolution
//!
//! A bullet moves a fixed distance per tick and tests the segment it swept
//! against every creep, so fast bullets cannot tunnel through targets.
//! Bullets are independent of each other and may be ticked on any thread.

use std::fmt;
use std::sync::Arc;

use glam::DVec2;

use super::creep::{Creep, Slow, Weaken};
use super::geometry::{Circle, Segment};
use super::tower::Tower;
use crate::consts::*;

/// Frames a splash takes to reach full radius; it shrinks twice as fast
const SPLASH_FRAMES: f64 = 5.0;

/// Launch parameters shared by every bullet kind
#[derive(Debug, Clone)]
pub struct Shot {
    pub owner: Arc<Tower>,
    pub start: DVec2,
    /// Unit direction
    pub dir: DVec2,
    /// Pixels per tick
    pub speed: f64,
    /// Maximum flight distance
    pub range: f64,
    pub damage: f64,
}

/// What happens when a bullet strikes a creep
#[derive(Debug, Clone)]
pub enum OnHit {
    None,
    Slow(Slow),
    Weaken(Weaken),
    /// Stick to the creep and hurt it every tick
    Poison { damage_per_tick: f64, ticks: u32 },
    /// Explode into an expanding blast
    Splash { radius: f64, damage_divisor: f64 },
    /// Pass through up to `count` more creeps
    Pierce { count: u32 },
}

/// Outcome of advancing a bullet by one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BulletTick {
    /// Still in play
    Flying,
    /// Done; total money earned over the bullet's life
    Finished { money: f64 },
    /// Done without earning anything
    Expired,
}

#[derive(Debug, Clone, Copy)]
struct Blast {
    center: DVec2,
    radius: f64,
    max_radius: f64,
    increment: f64,
    damage_divisor: f64,
    expanding: bool,
}

#[derive(Debug, Clone)]
struct Attached {
    creep: Arc<Creep>,
    damage_per_tick: f64,
    ticks_left: u32,
}

#[derive(Debug, Clone)]
enum Flight {
    Flying,
    Exploding(Blast),
    Poisoning(Attached),
}

/// Point-in-time copy of a bullet for drawing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BulletView {
    pub pos: DVec2,
    /// Radius of the blast while exploding
    pub blast_radius: Option<f64>,
}

pub struct Bullet {
    owner: Arc<Tower>,
    pos: DVec2,
    last_pos: DVec2,
    /// Displacement per tick
    step: DVec2,
    speed: f64,
    travelled: f64,
    range: f64,
    damage: f64,
    on_hit: OnHit,
    flight: Flight,
    /// Creeps this bullet has already struck
    hit_ids: Vec<u32>,
    pierces_left: u32,
    earned: f64,
}

impl fmt::Debug for Bullet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bullet")
            .field("owner", &self.owner.id())
            .field("pos", &self.pos)
            .field("travelled", &self.travelled)
            .field("range", &self.range)
            .field("flight", &self.flight)
            .field("earned", &self.earned)
            .finish()
    }
}

impl Bullet {
    pub fn new(shot: Shot, on_hit: OnHit) -> Self {
        let pierces_left = match on_hit {
            OnHit::Pierce { count } => count,
            _ => 0,
        };
        Self {
            owner: shot.owner,
            pos: shot.start,
            last_pos: shot.start,
            step: shot.dir.normalize_or_zero() * shot.speed,
            speed: shot.speed,
            travelled: 0.0,
            range: shot.range,
            damage: shot.damage,
            on_hit,
            flight: Flight::Flying,
            hit_ids: Vec::new(),
            pierces_left,
            earned: 0.0,
        }
    }

    pub fn owner(&self) -> &Arc<Tower> {
        &self.owner
    }

    pub fn position(&self) -> DVec2 {
        self.pos
    }

    pub fn direction(&self) -> DVec2 {
        self.step.normalize_or_zero()
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn earned(&self) -> f64 {
        self.earned
    }

    pub fn view(&self) -> BulletView {
        match &self.flight {
            Flight::Exploding(blast) => BulletView {
                pos: blast.center,
                blast_radius: Some(blast.radius),
            },
            _ => BulletView {
                pos: self.pos,
                blast_radius: None,
            },
        }
    }

    /// Advance one tick against `creeps`
    pub fn tick(&mut self, creeps: &[Arc<Creep>]) -> BulletTick {
        match std::mem::replace(&mut self.flight, Flight::Flying) {
            Flight::Flying => self.fly(creeps),
            Flight::Exploding(blast) => self.explode(blast, creeps),
            Flight::Poisoning(attached) => self.poison(attached),
        }
    }

    fn finish(&self) -> BulletTick {
        if self.earned > 0.0 {
            BulletTick::Finished { money: self.earned }
        } else {
            BulletTick::Expired
        }
    }

    fn off_screen(&self) -> bool {
        let margin = FUDGE_DISTANCE + BULLET_RADIUS;
        self.pos.x < -margin
            || self.pos.y < -margin
            || self.pos.x > MAP_WIDTH + margin
            || self.pos.y > MAP_HEIGHT + margin
    }

    fn fly(&mut self, creeps: &[Arc<Creep>]) -> BulletTick {
        if self.speed <= 0.0 || self.travelled >= self.range || self.off_screen() {
            return self.finish();
        }
        self.last_pos = self.pos;
        self.travelled += self.speed;
        self.pos += self.step;
        if self.travelled > self.range {
            // Pull back onto the range boundary
            let overshoot = (self.travelled - self.range) / self.speed;
            self.pos = self.last_pos + self.step * (1.0 - overshoot);
        }

        let swept = Segment::new(self.last_pos, self.pos);
        while let Some(money) = self.strike(&swept, creeps) {
            self.earned += money;
            match self.on_hit {
                OnHit::Pierce { .. } if self.pierces_left > 0 => self.pierces_left -= 1,
                OnHit::Splash { .. } | OnHit::Poison { .. } => return BulletTick::Flying,
                _ => return self.finish(),
            }
        }
        BulletTick::Flying
    }

    /// Hit the first creep the swept segment enters. A creep that dies
    /// between the collision test and the hit is skipped.
    fn strike(&mut self, swept: &Segment, creeps: &[Arc<Creep>]) -> Option<f64> {
        for creep in creeps {
            if self.hit_ids.contains(&creep.id()) {
                continue;
            }
            let Some(point) = creep.segment_entry(swept) else {
                continue;
            };
            let Some(report) = creep.hit(self.damage, Some(self.owner.kind())) else {
                continue;
            };
            let money = self.owner.credit(report);
            self.apply(creep, point);
            return Some(money);
        }
        None
    }

    fn apply(&mut self, creep: &Arc<Creep>, point: DVec2) {
        match &self.on_hit {
            OnHit::None => {}
            OnHit::Slow(slow) => creep.slow(*slow),
            OnHit::Weaken(weaken) => creep.weaken(weaken.clone()),
            OnHit::Poison {
                damage_per_tick,
                ticks,
            } => {
                if let Err(e) = creep.poison(*ticks) {
                    log::warn!("poison bullet from tower {}: {}", self.owner.id(), e);
                }
                self.flight = Flight::Poisoning(Attached {
                    creep: Arc::clone(creep),
                    damage_per_tick: *damage_per_tick,
                    ticks_left: *ticks,
                });
            }
            OnHit::Splash {
                radius,
                damage_divisor,
            } => {
                self.hit_ids.push(creep.id());
                self.flight = Flight::Exploding(Blast {
                    center: point,
                    radius: 0.0,
                    max_radius: *radius,
                    increment: radius / SPLASH_FRAMES,
                    damage_divisor: *damage_divisor,
                    expanding: true,
                });
            }
            OnHit::Pierce { .. } => self.hit_ids.push(creep.id()),
        }
    }

    fn explode(&mut self, mut blast: Blast, creeps: &[Arc<Creep>]) -> BulletTick {
        if blast.expanding {
            blast.radius = (blast.radius + blast.increment).min(blast.max_radius);
            blast.expanding = blast.radius < blast.max_radius;
        } else {
            let radius = blast.radius - blast.increment * 2.0;
            if blast.increment <= 0.0 || radius < 0.0 {
                return self.finish();
            }
            blast.radius = radius;
        }

        let area = Circle::from_parts(blast.center, blast.radius);
        let damage = self.damage / blast.damage_divisor;
        for creep in creeps {
            if self.hit_ids.contains(&creep.id()) || !creep.intersects_circle(&area) {
                continue;
            }
            // Each creep is caught by a blast at most once
            self.hit_ids.push(creep.id());
            if let Some(report) = creep.hit(damage, Some(self.owner.kind())) {
                self.earned += self.owner.credit(report);
            }
        }
        self.flight = Flight::Exploding(blast);
        BulletTick::Flying
    }

    fn poison(&mut self, mut attached: Attached) -> BulletTick {
        if attached.ticks_left == 0 || !attached.creep.is_alive() {
            return self.finish();
        }
        attached.ticks_left -= 1;
        // Poison damage is not a tower-kind hit and does not affect combos
        if let Some(report) = attached.creep.hit(attached.damage_per_tick, None) {
            self.earned += self.owner.credit(report);
        }
        self.flight = Flight::Poisoning(attached);
        BulletTick::Flying
    }
}
