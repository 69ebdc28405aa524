//! Whole-game scenarios driven through the public API

mod common;

use std::sync::Arc;

use creep_defence::economy::{EndLevelUpgrade, Formulae};
use creep_defence::sim::{
    Attribute, BulletResolver, Clock, ClockStatus, GameEvent, GamePhase, TowerKind, TowerSpec, tick,
};
use creep_defence::{HighScores, SimError};
use glam::DVec2;
use parking_lot::Mutex;

use common::{game_with, overwhelming_spec, run_level, scratch_file};

#[test]
fn test_clean_level_pays_every_creep_in_full() {
    let formulae = Formulae {
        base_creeps: 6,
        ..Default::default()
    };
    let level_hp = formulae.level_hp(1);
    let creeps = formulae.num_creeps(1);
    let per_creep = formulae.kill_bonus(level_hp) + formulae.damage_money(level_hp, 1.0);
    let mut game = game_with(formulae);
    game.build_tower_with(&overwhelming_spec(), DVec2::new(300.0, 200.0)).unwrap();
    game.start_level().unwrap();

    let reports = run_level(&mut game, &BulletResolver::sequential());
    assert!(reports.last().unwrap().level_complete);
    assert_eq!(reports.iter().map(|r| r.escaped).sum::<u32>(), 0);
    assert!((game.economy.total_earned() - per_creep * creeps as f64).abs() < 1e-6);

    let events = game.take_events();
    let Some(GameEvent::LevelComplete { level, summary }) = events.last() else {
        panic!("expected a level completion, got {:?}", events);
    };
    assert_eq!(*level, 1);
    // No lives lost earns the perfect bonus
    assert_eq!(summary.perfect_bonus, game.formulae.perfect_level_bonus(1));
    assert_eq!(game.end_level_upgrades(), 1);
}

#[test]
fn test_level_waits_for_blasts_to_pay_out() {
    let formulae = Formulae {
        base_creeps: 1,
        creeps_per_level: 0,
        ..Default::default()
    };
    let level_hp = formulae.level_hp(1);
    let expected = formulae.kill_bonus(level_hp) + formulae.damage_money(level_hp, 1.0);
    let mut game = game_with(formulae);
    let bomber = TowerSpec {
        kind: TowerKind::Bomber,
        special: TowerSpec::for_kind(TowerKind::Bomber).special,
        ..overwhelming_spec()
    };
    let tower = game.build_tower_with(&bomber, DVec2::new(300.0, 200.0)).unwrap();
    game.start_level().unwrap();

    let reports = run_level(&mut game, &BulletResolver::sequential());
    assert!(reports.last().unwrap().level_complete);
    assert_eq!(tower.kills(), 1);
    // The blast outlives its target; its money still lands before the level ends
    assert!(game.bullets.is_empty());
    assert!((game.economy.total_earned() - expected).abs() < 1e-6);
}

#[test]
fn test_builder_phase_rules() {
    let mut game = game_with(Formulae::default());
    // On the path
    assert!(matches!(
        game.build_tower_with(&overwhelming_spec(), DVec2::new(250.0, 100.0)),
        Err(SimError::InvalidPlacement { .. })
    ));
    let tower = game.build_tower_with(&overwhelming_spec(), DVec2::new(300.0, 200.0)).unwrap();
    assert!(matches!(
        game.build_tower_with(&overwhelming_spec(), DVec2::new(310.0, 200.0)),
        Err(SimError::InvalidPlacement { .. })
    ));
    assert!(matches!(
        game.apply_end_level_upgrade(EndLevelUpgrade::Lives),
        Err(SimError::NoEndLevelUpgrades)
    ));

    let before = game.economy.money();
    let refund = game.sell_tower(tower.id()).unwrap();
    assert_eq!(game.economy.money(), before + refund);
    assert!(matches!(game.sell_tower(tower.id()), Err(SimError::UnknownTower(_))));

    game.start_level().unwrap();
    assert!(matches!(game.start_level(), Err(SimError::LevelInProgress)));
}

#[test]
fn test_end_level_attribute_upgrade_reaches_later_towers() {
    let formulae = Formulae {
        base_creeps: 2,
        ..Default::default()
    };
    let mut game = game_with(formulae);
    let first = game.build_tower_with(&overwhelming_spec(), DVec2::new(300.0, 200.0)).unwrap();
    for _ in 0..2 {
        game.start_level().unwrap();
        run_level(&mut game, &BulletResolver::sequential());
        game.apply_end_level_upgrade(EndLevelUpgrade::Attribute(Attribute::Damage))
            .unwrap();
    }
    assert_eq!(first.attribute_level(Attribute::Damage), 3);
    let late = game.build_tower_with(&overwhelming_spec(), DVec2::new(300.0, 420.0)).unwrap();
    // Half of the free upgrades granted so far
    assert_eq!(late.attribute_level(Attribute::Damage), 2);
}

#[test]
fn test_game_over_records_high_score() {
    let path = scratch_file("game-over");
    let _ = std::fs::remove_file(&path);
    let formulae = Formulae {
        starting_lives: 1,
        base_creeps: 2,
        ..Default::default()
    };
    let mut game = game_with(formulae).with_high_scores(HighScores::new(), path.clone());
    game.start_level().unwrap();
    let reports = run_level(&mut game, &BulletResolver::sequential());

    assert!(reports.last().unwrap().game_over);
    assert_eq!(game.phase, GamePhase::GameOver);
    assert!(matches!(
        game.take_events().last(),
        Some(GameEvent::GameOver { level: 1, rank: Some(1) })
    ));
    assert!(matches!(game.start_level(), Err(SimError::GameOver)));
    // Ticking a finished game does nothing
    assert_eq!(tick(&mut game, &BulletResolver::sequential()).escaped, 0);

    let saved = HighScores::load(&path).unwrap();
    assert_eq!(saved.top(&game.map.name), Some(1));
    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_clock_plays_consecutive_levels_in_parallel() {
    let formulae = Formulae {
        base_creeps: 8,
        ..Default::default()
    };
    let mut game = game_with(formulae);
    game.build_tower_with(&overwhelming_spec(), DVec2::new(300.0, 200.0)).unwrap();
    let state = Arc::new(Mutex::new(game));
    let resolver = Arc::new(BulletResolver::new(3, 1));

    for level in 1..=2 {
        state.lock().start_level().unwrap();
        let mut clock = Clock::new(Arc::clone(&state), Arc::clone(&resolver), 1, &[1, 20]);
        assert_eq!(clock.cycle_fast_mode(), 20);
        clock.start().unwrap();
        clock.wait();
        assert_eq!(clock.status(), ClockStatus::Stopped);

        let mut game = state.lock();
        assert_eq!(game.phase, GamePhase::Building);
        assert_eq!(game.level, level);
        assert_eq!(game.economy.lives(), game.formulae.starting_lives);
        assert!(game
            .take_events()
            .iter()
            .any(|e| matches!(e, GameEvent::LevelComplete { level: l, .. } if *l == level)));
    }
}
