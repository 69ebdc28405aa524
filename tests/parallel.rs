//! Bullet resolution must not depend on how many threads run it

mod common;

use std::sync::Arc;

use creep_defence::sim::{Bullet, BulletResolver, Creep, Tower, TowerKind, TowerSpec};
use glam::DVec2;

use common::target;

const LANES: u32 = 48;

/// One tower per lane, each with its own creep 60px to its right. Lanes
/// sit in a 4x12 grid spaced so bullets only ever meet their own creep.
fn lanes(kind: TowerKind) -> (Vec<Arc<Tower>>, Vec<Arc<Creep>>) {
    let spec = TowerSpec::for_kind(kind);
    (0..LANES)
        .map(|i| {
            let x = 20.0 + 150.0 * (i % 4) as f64;
            let y = 30.0 + 40.0 * (i / 4) as f64;
            let tower = Arc::new(Tower::new(i, DVec2::new(x, y), &spec, u64::from(i)).unwrap());
            let creep = target(1000 + i, DVec2::new(x + 60.0, y), 500.0);
            (tower, creep)
        })
        .unzip()
}

/// Fire and resolve for `ticks`; returns money earned and each creep's hp
fn play(resolver: &BulletResolver, kind: TowerKind, ticks: u32) -> (f64, Vec<f64>) {
    let (towers, creeps) = lanes(kind);
    let mut bullets: Vec<Bullet> = Vec::new();
    let mut money = 0.0;
    for _ in 0..ticks {
        for (tower, creep) in towers.iter().zip(&creeps) {
            tower.tick(std::slice::from_ref(creep), &[]);
            bullets.extend(tower.drain_bullets());
        }
        money += resolver.resolve(&mut bullets, &creeps).money;
    }
    (money, creeps.iter().map(|c| c.hp()).collect())
}

#[test]
fn test_parallel_matches_sequential() {
    for kind in [TowerKind::Basic, TowerKind::Piercer, TowerKind::Poison, TowerKind::MultiShot] {
        let (seq_money, seq_hp) = play(&BulletResolver::sequential(), kind, 200);
        let (par_money, par_hp) = play(&BulletResolver::new(4, 1), kind, 200);
        assert!(seq_money > 0.0, "{:?} never scored", kind);
        assert!((seq_money - par_money).abs() < 1e-6, "{:?}: {} vs {}", kind, seq_money, par_money);
        for (a, b) in seq_hp.iter().zip(&par_hp) {
            assert!((a - b).abs() < 1e-9, "{:?}: {} vs {}", kind, a, b);
        }
    }
}

#[test]
fn test_below_threshold_stays_on_caller() {
    // A threshold no tick reaches keeps everything sequential
    let resolver = BulletResolver::new(4, usize::MAX);
    let (money, hp) = play(&resolver, TowerKind::Basic, 100);
    let (expected_money, expected_hp) = play(&BulletResolver::sequential(), TowerKind::Basic, 100);
    assert!((money - expected_money).abs() < 1e-6);
    assert!(hp.iter().zip(&expected_hp).all(|(a, b)| (a - b).abs() < 1e-9));
}
