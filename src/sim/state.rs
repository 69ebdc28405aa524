//! Game state and player commands
//!
//! Everything the tick mutates lives here. Player commands (build, sell,
//! upgrade, start level) validate and return typed errors; the tick itself
//! never fails.

use std::path::PathBuf;
use std::sync::Arc;

use glam::DVec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::bullet::{Bullet, BulletView};
use super::creep::{Creep, CreepView};
use super::tick::TickTimings;
use super::tower::{Attribute, Tower, TowerKind, TowerSpec};
use crate::economy::{Economy, EconomyObserver, EndLevelUpgrade, Formulae, LevelSummary, NoopObserver};
use crate::error::SimError;
use crate::highscores::{self, HighScores};
use crate::map::GameMap;

/// Current phase of gameplay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GamePhase {
    /// Between levels; towers may be built and upgraded
    Building,
    /// A level is being played
    Running,
    /// Out of lives
    GameOver,
}

/// Notable things that happened during a tick, for the caller to present
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    CreepEscaped { id: u32 },
    TowerLevelUp { tower_id: u32, level: u32 },
    LevelComplete { level: u32, summary: LevelSummary },
    GameOver { level: u32, rank: Option<usize> },
}

/// Releases a level's creeps at random intervals
#[derive(Debug, Clone)]
pub struct Spawner {
    remaining: u32,
    countdown: u32,
    mean_gap: u32,
    level_hp: f64,
}

impl Spawner {
    fn idle() -> Self {
        Self {
            remaining: 0,
            countdown: 0,
            mean_gap: 1,
            level_hp: 0.0,
        }
    }

    fn for_level(formulae: &Formulae, level: u32) -> Self {
        Self {
            remaining: formulae.num_creeps(level),
            countdown: 0,
            mean_gap: formulae.ticks_between_creeps(level),
            level_hp: formulae.level_hp(level),
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn is_done(&self) -> bool {
        self.remaining == 0
    }

    /// Whether a creep should appear this tick
    pub(crate) fn tick(&mut self, rng: &mut impl Rng) -> bool {
        if self.remaining == 0 {
            return false;
        }
        if self.countdown > 0 {
            self.countdown -= 1;
            return false;
        }
        self.remaining -= 1;
        self.countdown = rng.random_range(0..=2 * self.mean_gap);
        true
    }
}

/// Point-in-time copy of a tower for drawing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TowerView {
    pub id: u32,
    pub kind: TowerKind,
    pub pos: DVec2,
    pub turret_angle: f64,
    pub range: f64,
    pub level: u32,
}

/// Everything a drawing collaborator needs for one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Drawables {
    pub creeps: Vec<CreepView>,
    pub towers: Vec<TowerView>,
    pub bullets: Vec<BulletView>,
}

/// Complete game state
pub struct GameState {
    pub seed: u64,
    pub(crate) rng: Pcg32,
    pub map: GameMap,
    pub(crate) path: Arc<[DVec2]>,
    pub formulae: Formulae,
    /// Current level, 0 before the first
    pub level: u32,
    pub phase: GamePhase,
    pub economy: Economy,
    /// Live creeps, kept first-along-path first during a tick
    pub creeps: Vec<Arc<Creep>>,
    pub towers: Vec<Arc<Tower>>,
    pub bullets: Vec<Bullet>,
    pub(crate) spawner: Spawner,
    pub(crate) lives_lost: u32,
    end_level_upgrades: u32,
    /// End-of-level attribute upgrades taken so far, by attribute
    free_upgrades: [u32; 5],
    pub timings: TickTimings,
    pub time_ticks: u64,
    pub(crate) events: Vec<GameEvent>,
    pub(crate) observer: Box<dyn EconomyObserver>,
    high_scores: Option<(HighScores, PathBuf)>,
    next_id: u32,
}

impl GameState {
    pub fn new(seed: u64, map: GameMap, formulae: Formulae) -> Self {
        Self {
            seed,
            rng: Pcg32::seed_from_u64(seed),
            path: map.path(),
            map,
            economy: Economy::new(&formulae),
            formulae,
            level: 0,
            phase: GamePhase::Building,
            creeps: Vec::new(),
            towers: Vec::new(),
            bullets: Vec::new(),
            spawner: Spawner::idle(),
            lives_lost: 0,
            end_level_upgrades: 0,
            free_upgrades: [0; 5],
            timings: TickTimings::default(),
            time_ticks: 0,
            events: Vec::new(),
            observer: Box::new(NoopObserver),
            high_scores: None,
            next_id: 1,
        }
    }

    pub fn with_observer(mut self, observer: Box<dyn EconomyObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Record the final level in `scores`, saved to `path`, at game over
    pub fn with_high_scores(mut self, scores: HighScores, path: PathBuf) -> Self {
        self.high_scores = Some((scores, path));
        self
    }

    pub fn high_scores(&self) -> Option<&HighScores> {
        self.high_scores.as_ref().map(|(scores, _)| scores)
    }

    /// Allocate a new entity ID
    pub fn next_entity_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn spawner(&self) -> &Spawner {
        &self.spawner
    }

    pub fn end_level_upgrades(&self) -> u32 {
        self.end_level_upgrades
    }

    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    /// All creeps are spawned and gone, and every bullet has reported its
    /// money
    pub fn is_level_complete(&self) -> bool {
        self.phase == GamePhase::Running
            && self.spawner.is_done()
            && self.creeps.is_empty()
            && self.bullets.is_empty()
    }

    pub fn tower(&self, id: u32) -> Result<&Arc<Tower>, SimError> {
        self.towers
            .iter()
            .find(|t| t.id() == id)
            .ok_or(SimError::UnknownTower(id))
    }

    fn count_kind(&self, kind: TowerKind) -> usize {
        self.towers.iter().filter(|t| t.kind() == kind).count()
    }

    pub fn start_level(&mut self) -> Result<(), SimError> {
        match self.phase {
            GamePhase::GameOver => return Err(SimError::GameOver),
            GamePhase::Running => return Err(SimError::LevelInProgress),
            GamePhase::Building => {}
        }
        self.level += 1;
        self.spawner = Spawner::for_level(&self.formulae, self.level);
        self.lives_lost = 0;
        self.phase = GamePhase::Running;
        log::info!(
            "Level {} started: {} creeps of {} hp",
            self.level,
            self.spawner.remaining,
            self.spawner.level_hp
        );
        Ok(())
    }

    /// Spawn one creep of the current level
    pub(crate) fn spawn_creep(&mut self) {
        let id = self.next_entity_id();
        let creep = Creep::spawn(
            id,
            self.spawner.level_hp,
            &self.formulae,
            Arc::clone(&self.path),
            &mut self.rng,
        );
        self.creeps.push(Arc::new(creep));
    }

    pub fn tower_cost(&self, kind: TowerKind) -> u64 {
        self.formulae.tower_cost(self.towers.len(), self.count_kind(kind))
    }

    pub fn build_tower(&mut self, kind: TowerKind, pos: DVec2) -> Result<Arc<Tower>, SimError> {
        self.build_tower_with(&TowerSpec::for_kind(kind), pos)
    }

    /// Build a tower with custom stats. New towers receive half of the
    /// attribute upgrades granted at level ends so far.
    pub fn build_tower_with(&mut self, spec: &TowerSpec, pos: DVec2) -> Result<Arc<Tower>, SimError> {
        if self.phase == GamePhase::GameOver {
            return Err(SimError::GameOver);
        }
        if !self.map.can_place(pos, spec.width, &self.towers) {
            return Err(SimError::InvalidPlacement { x: pos.x, y: pos.y });
        }
        let cost = self.tower_cost(spec.kind);
        if cost > self.economy.money() {
            return Err(SimError::InsufficientFunds {
                cost,
                available: self.economy.money(),
            });
        }
        let id = self.next_entity_id();
        let tower = Arc::new(Tower::new(id, pos, spec, self.rng.random())?);
        self.economy.spend(cost);
        for attribute in Attribute::ALL {
            tower.upgrade_times(attribute, self.free_upgrades[attribute.index()] / 2);
        }
        self.towers.push(Arc::clone(&tower));
        log::debug!("Built {} tower {} at {} for {}", spec.kind.name(), id, pos, cost);
        self.observer.money_changed(self.economy.money());
        self.observer.stats_changed(id, &tower.stats());
        Ok(tower)
    }

    /// Sell a tower. Returns the refund.
    pub fn sell_tower(&mut self, id: u32) -> Result<u64, SimError> {
        let index = self
            .towers
            .iter()
            .position(|t| t.id() == id)
            .ok_or(SimError::UnknownTower(id))?;
        let kind = self.towers[index].kind();
        let value = self.formulae.sell_value(self.towers.len(), self.count_kind(kind));
        self.towers.remove(index);
        self.economy.deposit(value);
        self.observer.money_changed(self.economy.money());
        Ok(value)
    }

    pub fn upgrade_cost(&self, id: u32, attribute: Attribute) -> Result<u64, SimError> {
        let tower = self.tower(id)?;
        Ok(self.formulae.upgrade_cost(tower.attribute_level(attribute)))
    }

    /// Buy one level of `attribute` for a tower. Returns the price paid.
    pub fn upgrade_tower(&mut self, id: u32, attribute: Attribute) -> Result<u64, SimError> {
        let cost = self.upgrade_cost(id, attribute)?;
        if !self.economy.spend(cost) {
            return Err(SimError::InsufficientFunds {
                cost,
                available: self.economy.money(),
            });
        }
        let tower = Arc::clone(self.tower(id)?);
        tower.upgrade(attribute);
        self.observer.money_changed(self.economy.money());
        self.observer.stats_changed(id, &tower.stats());
        Ok(cost)
    }

    /// Buy one level of `attribute` for every tower, or for none if the
    /// total is unaffordable
    pub fn upgrade_all(&mut self, attribute: Attribute) -> Result<u64, SimError> {
        let cost: u64 = self
            .towers
            .iter()
            .map(|t| self.formulae.upgrade_cost(t.attribute_level(attribute)))
            .sum();
        if !self.economy.spend(cost) {
            return Err(SimError::InsufficientFunds {
                cost,
                available: self.economy.money(),
            });
        }
        for tower in &self.towers {
            tower.upgrade(attribute);
            self.observer.stats_changed(tower.id(), &tower.stats());
        }
        self.observer.money_changed(self.economy.money());
        Ok(cost)
    }

    /// Spend one of the upgrades earned by finishing levels
    pub fn apply_end_level_upgrade(&mut self, upgrade: EndLevelUpgrade) -> Result<(), SimError> {
        if self.end_level_upgrades == 0 {
            return Err(SimError::NoEndLevelUpgrades);
        }
        self.end_level_upgrades -= 1;
        if !self.economy.apply_upgrade(&self.formulae, upgrade) {
            if let EndLevelUpgrade::Attribute(attribute) = upgrade {
                self.free_upgrades[attribute.index()] += 1;
                for tower in &self.towers {
                    tower.upgrade(attribute);
                    self.observer.stats_changed(tower.id(), &tower.stats());
                }
            }
        }
        self.observer.money_changed(self.economy.money());
        self.observer.lives_changed(self.economy.lives());
        Ok(())
    }

    /// Close the current level and pay out its bonuses
    pub(crate) fn end_level(&mut self) -> LevelSummary {
        self.bullets.clear();
        self.creeps.clear();
        let summary = self
            .economy
            .end_level(&self.formulae, self.level, self.lives_lost);
        self.end_level_upgrades += 1;
        self.phase = GamePhase::Building;
        log::info!(
            "Level {} complete: {} lives lost, {} paid out",
            self.level,
            self.lives_lost,
            summary.total()
        );
        self.observer.level_ended(self.level, &summary);
        self.observer.money_changed(self.economy.money());
        self.events.push(GameEvent::LevelComplete {
            level: self.level,
            summary,
        });
        summary
    }

    pub(crate) fn game_over(&mut self) {
        self.phase = GamePhase::GameOver;
        self.bullets.clear();
        let rank = self.high_scores.as_mut().and_then(|(scores, path)| {
            let rank = scores.record(&self.map.name, self.level, highscores::now_millis());
            if rank.is_some() {
                if let Err(e) = scores.save(path) {
                    log::error!("Failed to save high scores: {}", e);
                }
            }
            rank
        });
        log::info!("Game over on level {}", self.level);
        self.events.push(GameEvent::GameOver {
            level: self.level,
            rank,
        });
    }

    pub fn drawables(&self) -> Drawables {
        Drawables {
            creeps: self.creeps.iter().map(|c| c.view()).collect(),
            towers: self
                .towers
                .iter()
                .map(|t| TowerView {
                    id: t.id(),
                    kind: t.kind(),
                    pos: t.position(),
                    turret_angle: t.turret_angle(),
                    range: t.range(),
                    level: t.experience_level(),
                })
                .collect(),
            bullets: self.bullets.iter().map(Bullet::view).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn state() -> GameState {
        GameState::new(7, GameMap::default(), Formulae::default())
    }

    const SPOT: DVec2 = DVec2::new(300.0, 200.0);

    #[test]
    fn test_build_charges_and_rejects() {
        let mut game = state();
        let tower = game.build_tower(TowerKind::Basic, SPOT).unwrap();
        assert_eq!(game.economy.money(), 3000);
        assert_eq!(tower.kind(), TowerKind::Basic);

        assert!(matches!(
            game.build_tower(TowerKind::Basic, DVec2::new(300.0, 100.0)),
            Err(SimError::InvalidPlacement { .. })
        ));
        assert!(matches!(
            game.build_tower(TowerKind::Basic, SPOT),
            Err(SimError::InvalidPlacement { .. })
        ));
        // Second tower of the same kind costs 1000 * 1.05 * 1.1
        assert_eq!(game.tower_cost(TowerKind::Basic), 1155);
        assert_eq!(game.tower_cost(TowerKind::Slow), 1050);
    }

    #[test]
    fn test_insufficient_funds() {
        let formulae = Formulae {
            starting_money: 10,
            ..Default::default()
        };
        let mut game = GameState::new(1, GameMap::default(), formulae);
        assert!(matches!(
            game.build_tower(TowerKind::Basic, SPOT),
            Err(SimError::InsufficientFunds {
                cost: 1000,
                available: 10
            })
        ));
        assert!(game.towers.is_empty());
    }

    #[test]
    fn test_sell_refunds() {
        let mut game = state();
        let id = game.build_tower(TowerKind::Basic, SPOT).unwrap().id();
        assert_eq!(game.sell_tower(id).unwrap(), 800);
        assert_eq!(game.economy.money(), 3800);
        assert!(matches!(game.sell_tower(id), Err(SimError::UnknownTower(_))));
    }

    #[test]
    fn test_upgrades_cost_and_apply() {
        let mut game = state();
        let id = game.build_tower(TowerKind::Basic, SPOT).unwrap().id();
        assert_eq!(game.upgrade_tower(id, Attribute::Damage).unwrap(), 100);
        assert_eq!(game.upgrade_cost(id, Attribute::Damage).unwrap(), 150);
        assert_eq!(game.tower(id).unwrap().attribute_level(Attribute::Damage), 2);

        game.build_tower(TowerKind::Slow, DVec2::new(400.0, 200.0)).unwrap();
        let before = game.economy.money();
        assert_eq!(game.upgrade_all(Attribute::Range).unwrap(), 200);
        assert_eq!(game.economy.money(), before - 200);
    }

    #[test]
    fn test_level_cycle_and_end_level_upgrades() {
        let mut game = state();
        assert!(matches!(
            game.apply_end_level_upgrade(EndLevelUpgrade::Money),
            Err(SimError::NoEndLevelUpgrades)
        ));
        game.start_level().unwrap();
        assert!(matches!(game.start_level(), Err(SimError::LevelInProgress)));
        assert_eq!(game.spawner().remaining(), 20);

        let summary = game.end_level();
        assert_eq!(game.phase, GamePhase::Building);
        assert_eq!(summary.level_bonus, 1000);
        assert_eq!(game.end_level_upgrades(), 1);
        assert!(matches!(game.take_events()[0], GameEvent::LevelComplete { level: 1, .. }));

        let tower = game.build_tower(TowerKind::Basic, SPOT).unwrap();
        game.apply_end_level_upgrade(EndLevelUpgrade::Attribute(Attribute::Damage))
            .unwrap();
        assert_eq!(tower.attribute_level(Attribute::Damage), 2);
        game.end_level_upgrades = 2;
        game.apply_end_level_upgrade(EndLevelUpgrade::Attribute(Attribute::Damage))
            .unwrap();
        game.apply_end_level_upgrade(EndLevelUpgrade::Lives).unwrap();
        assert_eq!(game.economy.lives(), 30);

        // Two free damage levels so far: a new tower gets one of them
        let late = game.build_tower(TowerKind::Slow, DVec2::new(400.0, 200.0)).unwrap();
        assert_eq!(late.attribute_level(Attribute::Damage), 2);
    }

    #[test]
    fn test_spawner_releases_every_creep() {
        let mut game = state();
        game.start_level().unwrap();
        let mut ticks = 0;
        while !game.spawner.is_done() {
            if game.spawner.tick(&mut game.rng) {
                game.spawn_creep();
            }
            ticks += 1;
        }
        assert_eq!(game.creeps.len(), 20);
        // Gaps average about a second
        assert!(ticks > 20);
        let ids: Vec<u32> = game.creeps.iter().map(|c| c.id()).collect();
        let mut sorted = ids.clone();
        sorted.dedup();
        assert_eq!(ids, sorted);
    }

    #[derive(Default, Clone)]
    struct Tally(Arc<Mutex<Vec<u64>>>);

    impl EconomyObserver for Tally {
        fn money_changed(&mut self, money: u64) {
            self.0.lock().unwrap().push(money);
        }
    }

    #[test]
    fn test_observer_sees_money() {
        let tally = Tally::default();
        let mut game = state().with_observer(Box::new(tally.clone()));
        game.build_tower(TowerKind::Basic, SPOT).unwrap();
        assert_eq!(*tally.0.lock().unwrap(), vec![3000]);
    }

    #[test]
    fn test_game_over_blocks_commands() {
        let mut game = state();
        game.game_over();
        assert!(matches!(game.start_level(), Err(SimError::GameOver)));
        assert!(matches!(
            game.build_tower(TowerKind::Basic, SPOT),
            Err(SimError::GameOver)
        ));
        assert!(matches!(
            game.take_events().as_slice(),
            [GameEvent::GameOver { level: 0, rank: None }]
        ));
    }
}
