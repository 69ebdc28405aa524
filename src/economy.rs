//! Economy: money, lives, interest and the tunable formulae behind them
//!
//! Money is earned fractionally by bullets and carried over between ticks;
//! only whole units are spendable.

use serde::{Deserialize, Serialize};

use crate::consts::CLOCK_TICKS_PER_SECOND;
use crate::sim::tower::Attribute;

/// Gameplay tuning constants. All reward and cost formulae read from here so
/// balance can be changed from the settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Formulae {
    pub starting_money: u64,
    pub starting_lives: i32,
    pub starting_interest_rate: f64,

    /// Damage money is `hp_factor * hp_lost / money_divisor`
    pub money_divisor: f64,
    /// Kill bonus is `level_hp / kill_bonus_divisor`
    pub kill_bonus_divisor: f64,
    /// When a weaken multiplier turns a hit into a kill, credit the weakening
    /// tower with the kill and report the hit as kill-free
    pub split_weaken_credit: bool,

    pub base_tower_cost: f64,
    /// Cost growth per tower already built
    pub tower_count_factor: f64,
    /// Extra cost growth per tower of the same kind already built
    pub same_kind_factor: f64,
    pub sell_fraction: f64,

    pub upgrade_base_cost: f64,
    pub upgrade_cost_factor: f64,

    pub base_creeps: u32,
    pub creeps_per_level: u32,
    pub base_level_hp: f64,
    pub level_hp_factor: f64,
    /// Average spawn gap on level 1, in ticks
    pub base_spawn_gap: f64,
    /// Spawn gap shrink per level
    pub spawn_gap_factor: f64,

    pub level_end_bonus_base: u64,
    pub level_end_bonus_step: u64,
    pub perfect_level_bonus_step: u64,

    pub lives_upgrade: i32,
    pub interest_upgrade: f64,
    pub money_upgrade: u64,
}

impl Default for Formulae {
    fn default() -> Self {
        Self {
            starting_money: 4000,
            starting_lives: 25,
            starting_interest_rate: 0.03,

            money_divisor: 10.0,
            kill_bonus_divisor: 10.0,
            split_weaken_credit: true,

            base_tower_cost: 1000.0,
            tower_count_factor: 1.05,
            same_kind_factor: 1.1,
            sell_fraction: 0.8,

            upgrade_base_cost: 100.0,
            upgrade_cost_factor: 1.5,

            base_creeps: 20,
            creeps_per_level: 2,
            base_level_hp: 10.0,
            level_hp_factor: 1.4,
            base_spawn_gap: CLOCK_TICKS_PER_SECOND,
            spawn_gap_factor: 0.97,

            level_end_bonus_base: 1000,
            level_end_bonus_step: 100,
            perfect_level_bonus_step: 100,

            lives_upgrade: 5,
            interest_upgrade: 0.01,
            money_upgrade: 1000,
        }
    }
}

impl Formulae {
    pub fn num_creeps(&self, level: u32) -> u32 {
        self.base_creeps + self.creeps_per_level * level.saturating_sub(1)
    }

    /// Health of an average creep on `level`, truncated to whole points
    pub fn level_hp(&self, level: u32) -> f64 {
        (self.level_hp_factor.powi(level as i32 - 1) * self.base_level_hp).floor()
    }

    /// Mean gap between spawns; actual gaps are drawn from `0..=2 * mean`
    pub fn ticks_between_creeps(&self, level: u32) -> u32 {
        let gap = self.base_spawn_gap * self.spawn_gap_factor.powi(level as i32 - 1);
        (gap.round() as u32).max(1)
    }

    pub fn damage_money(&self, hp_lost: f64, hp_factor: f64) -> f64 {
        hp_factor * hp_lost / self.money_divisor
    }

    pub fn kill_bonus(&self, level_hp: f64) -> f64 {
        level_hp / self.kill_bonus_divisor
    }

    pub fn level_end_bonus(&self, level: u32) -> u64 {
        self.level_end_bonus_base + self.level_end_bonus_step * u64::from(level.saturating_sub(1))
    }

    pub fn perfect_level_bonus(&self, level: u32) -> u64 {
        self.perfect_level_bonus_step * u64::from(level)
    }

    /// Cost of raising an attribute from `current_level`
    pub fn upgrade_cost(&self, current_level: u32) -> u64 {
        (self.upgrade_base_cost * self.upgrade_cost_factor.powi(current_level as i32 - 1)) as u64
    }

    /// Cost of the next tower given how many exist in total and of its kind
    pub fn tower_cost(&self, num_towers: usize, num_same_kind: usize) -> u64 {
        (self.base_tower_cost
            * self.tower_count_factor.powi(num_towers as i32)
            * self.same_kind_factor.powi(num_same_kind as i32)) as u64
    }

    /// Refund for a tower, valued as if it had been the last one built
    pub fn sell_value(&self, num_towers: usize, num_same_kind: usize) -> u64 {
        let cost = self.tower_cost(num_towers.saturating_sub(1), num_same_kind.saturating_sub(1));
        (cost as f64 * self.sell_fraction) as u64
    }
}

/// Receives economy and tower changes for display. The simulation never
/// reads anything back.
pub trait EconomyObserver: Send {
    fn money_changed(&mut self, _money: u64) {}
    fn lives_changed(&mut self, _lives: i32) {}
    fn experience_changed(&mut self, _tower_id: u32, _level: u32) {}
    fn stats_changed(&mut self, _tower_id: u32, _stats: &[(Attribute, String)]) {}
    fn level_ended(&mut self, _level: u32, _summary: &LevelSummary) {}
}

/// Observer that ignores everything
#[derive(Debug, Default)]
pub struct NoopObserver;

impl EconomyObserver for NoopObserver {}

/// One-off upgrade granted after each completed level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndLevelUpgrade {
    Lives,
    Interest,
    Money,
    /// Free level of this attribute for every tower, present and future
    Attribute(Attribute),
}

/// Money paid out when a level completes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSummary {
    pub interest: u64,
    pub level_bonus: u64,
    pub perfect_bonus: u64,
}

impl LevelSummary {
    pub fn total(&self) -> u64 {
        self.interest + self.level_bonus + self.perfect_bonus
    }
}

/// Player ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Economy {
    money: u64,
    /// Fractional earnings not yet credited
    carry: f64,
    lives: i32,
    interest_rate: f64,
    /// Exact sum of everything bullets have earned
    total_earned: f64,
}

impl Economy {
    pub fn new(formulae: &Formulae) -> Self {
        Self {
            money: formulae.starting_money,
            carry: 0.0,
            lives: formulae.starting_lives,
            interest_rate: formulae.starting_interest_rate,
            total_earned: 0.0,
        }
    }

    pub fn money(&self) -> u64 {
        self.money
    }

    pub fn lives(&self) -> i32 {
        self.lives
    }

    pub fn interest_rate(&self) -> f64 {
        self.interest_rate
    }

    pub fn total_earned(&self) -> f64 {
        self.total_earned
    }

    /// Credit bullet earnings, carrying the fraction to the next call.
    /// Returns the whole units added.
    pub fn earn(&mut self, amount: f64) -> u64 {
        if amount <= 0.0 {
            return 0;
        }
        self.total_earned += amount;
        let total = self.carry + amount;
        let whole = total.floor();
        self.carry = total - whole;
        self.money += whole as u64;
        whole as u64
    }

    pub fn deposit(&mut self, amount: u64) {
        self.money += amount;
    }

    /// Spend `cost` if affordable
    pub fn spend(&mut self, cost: u64) -> bool {
        if cost > self.money {
            return false;
        }
        self.money -= cost;
        true
    }

    pub fn lose_lives(&mut self, count: u32) {
        self.lives -= count as i32;
    }

    pub fn is_dead(&self) -> bool {
        self.lives <= 0
    }

    /// Pay interest and bonuses for a finished level
    pub fn end_level(&mut self, formulae: &Formulae, level: u32, lives_lost: u32) -> LevelSummary {
        let summary = LevelSummary {
            interest: (self.money as f64 * self.interest_rate) as u64,
            level_bonus: formulae.level_end_bonus(level),
            perfect_bonus: if lives_lost == 0 {
                formulae.perfect_level_bonus(level)
            } else {
                0
            },
        };
        self.money += summary.total();
        summary
    }

    /// Apply the non-tower end-of-level upgrades. Returns false for
    /// attribute upgrades, which the caller applies to towers.
    pub fn apply_upgrade(&mut self, formulae: &Formulae, upgrade: EndLevelUpgrade) -> bool {
        match upgrade {
            EndLevelUpgrade::Lives => self.lives += formulae.lives_upgrade,
            EndLevelUpgrade::Interest => self.interest_rate += formulae.interest_upgrade,
            EndLevelUpgrade::Money => self.money += formulae.money_upgrade,
            EndLevelUpgrade::Attribute(_) => return false,
        }
        true
    }
}
