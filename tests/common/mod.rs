#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use creep_defence::economy::Formulae;
use creep_defence::sim::{BulletResolver, Creep, CreepStats, GameState, TickReport, TowerKind, TowerSpec, tick};
use creep_defence::GameMap;
use glam::DVec2;

/// Basic tower that kills anything on the map in one hit
pub fn overwhelming_spec() -> TowerSpec {
    TowerSpec {
        damage: 1e6,
        range: 1e6,
        fire_rate: 1.0,
        bullet_speed: 1000.0,
        ..TowerSpec::for_kind(TowerKind::Basic)
    }
}

pub fn game_with(formulae: Formulae) -> GameState {
    GameState::new(17, GameMap::default(), formulae)
}

pub fn target(id: u32, pos: DVec2, hp: f64) -> Arc<Creep> {
    let stats = CreepStats {
        hp,
        level_hp: hp,
        speed: 2.0,
        width: 20.0,
    };
    Arc::new(Creep::stationary(id, pos, stats, &Formulae::default()))
}

/// Tick until the level ends or the game is over, summing the reports
pub fn run_level(state: &mut GameState, resolver: &BulletResolver) -> Vec<TickReport> {
    let mut reports = Vec::new();
    for _ in 0..200_000 {
        let report = tick(state, resolver);
        reports.push(report);
        if report.level_complete || report.game_over {
            break;
        }
    }
    reports
}

pub fn scratch_file(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("creep-defence-{}-{}.json", name, std::process::id()))
}
