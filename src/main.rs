//! Creep Defence entry point
//!
//! Plays the game headlessly with a simple build-and-upgrade strategy, one
//! clock run per level, and keeps the high score tables.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use glam::DVec2;
use parking_lot::Mutex;

use creep_defence::assets::{ArrowGlyphs, DEFAULT_PRECISION, EntityTag, RotationCache};
use creep_defence::consts::{MAP_HEIGHT, MAP_WIDTH};
use creep_defence::economy::{EconomyObserver, EndLevelUpgrade, LevelSummary};
use creep_defence::sim::geometry::Segment;
use creep_defence::sim::{
    Attribute, BulletResolver, Clock, Drawables, GameEvent, GamePhase, GameState, TowerKind,
};
use creep_defence::{GameMap, HighScores, Settings};

/// Creep Defence simulation
#[derive(Parser)]
#[command(name = "creep-defence")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file
    #[arg(short, long, default_value = "creep-defence.json")]
    settings: PathBuf,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play until the game is over or the level limit is reached
    Run {
        /// Stop after this many levels
        #[arg(short, long)]
        levels: Option<u32>,

        /// RNG seed
        #[arg(long)]
        seed: Option<u64>,

        /// JSON map file
        #[arg(short, long)]
        map: Option<PathBuf>,

        /// Bullet worker threads
        #[arg(short, long)]
        workers: Option<usize>,

        /// Milliseconds per frame
        #[arg(long)]
        tick_ms: Option<u64>,

        /// Run at the fastest configured speed
        #[arg(long)]
        fast: bool,

        /// Log rolling tick timings
        #[arg(long)]
        debug_timing: bool,

        /// Print the board after every level
        #[arg(long)]
        show: bool,
    },

    /// Print the high score tables
    Scores {
        /// Only this map
        map: Option<String>,
    },

    /// Write the effective settings to the settings file
    InitSettings,
}

/// Logs economy changes worth a line
struct LogObserver;

impl EconomyObserver for LogObserver {
    fn lives_changed(&mut self, lives: i32) {
        log::debug!("Lives: {}", lives);
    }

    fn experience_changed(&mut self, tower_id: u32, level: u32) {
        log::debug!("Tower {} is now level {}", tower_id, level);
    }

    fn level_ended(&mut self, level: u32, summary: &LevelSummary) {
        log::info!(
            "Level {} bonuses: interest {}, level {}, perfect {}",
            level,
            summary.interest,
            summary.level_bonus,
            summary.perfect_bonus
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let mut settings = Settings::load(&cli.settings);
    match cli.command {
        Commands::Run {
            levels,
            seed,
            map,
            workers,
            tick_ms,
            fast,
            debug_timing,
            show,
        } => {
            settings.seed = seed.or(settings.seed);
            settings.map_path = map.or(settings.map_path);
            settings.workers = workers.or(settings.workers);
            settings.tick_ms = tick_ms.unwrap_or(settings.tick_ms);
            settings.debug_timing |= debug_timing;
            run(&settings, levels, fast, show)
        }
        Commands::Scores { map } => {
            print_scores(&settings, map.as_deref())
        }
        Commands::InitSettings => {
            settings.save(&cli.settings)?;
            println!("Wrote {}", cli.settings.display());
            Ok(())
        }
    }
}

fn run(settings: &Settings, max_levels: Option<u32>, fast: bool, show: bool) -> Result<()> {
    let seed = settings.seed.unwrap_or_else(rand::random);
    let map = match &settings.map_path {
        Some(path) => GameMap::load(path).with_context(|| format!("loading map {}", path.display()))?,
        None => GameMap::default(),
    };
    let scores = HighScores::load(&settings.high_scores_path).unwrap_or_else(|e| {
        log::warn!("Starting with empty high scores: {}", e);
        HighScores::new()
    });
    log::info!("Creep Defence starting on '{}' with seed {}", map.name, seed);

    let mut game = GameState::new(seed, map, settings.formulae.clone())
        .with_observer(Box::new(LogObserver))
        .with_high_scores(scores, settings.high_scores_path.clone());
    game.timings.enabled = settings.debug_timing;
    let state = Arc::new(Mutex::new(game));
    let resolver = Arc::new(BulletResolver::new(
        settings.worker_count(),
        settings.parallel_threshold,
    ));
    log::info!("Resolving bullets on {} threads", resolver.workers());

    let fast_modes = settings.fast_modes();
    let mut sprites = RotationCache::new(ArrowGlyphs, DEFAULT_PRECISION);
    loop {
        {
            let mut game = state.lock();
            prepare_level(&mut game);
            game.start_level()?;
        }
        let mut clock = Clock::new(Arc::clone(&state), Arc::clone(&resolver), settings.tick_ms, &fast_modes);
        if fast {
            for _ in 1..fast_modes.len() {
                clock.cycle_fast_mode();
            }
        }
        clock.start()?;
        clock.wait();

        let mut game = state.lock();
        if show {
            println!("{}", render(&game.drawables(), &mut sprites));
        }
        sprites.clear();
        for event in game.take_events() {
            match event {
                GameEvent::LevelComplete { level, summary } => println!(
                    "Level {:>3} complete: money {:>7}, lives {:>3}, towers {:>2}, bonus {}",
                    level,
                    game.economy.money(),
                    game.economy.lives(),
                    game.towers.len(),
                    summary.total()
                ),
                GameEvent::GameOver { level, rank } => {
                    println!("Game over on level {}", level);
                    if let Some(rank) = rank {
                        println!("New high score: rank {}", rank);
                    }
                }
                GameEvent::CreepEscaped { .. } | GameEvent::TowerLevelUp { .. } => {}
            }
        }
        if game.phase == GamePhase::GameOver || max_levels.is_some_and(|max| game.level >= max) {
            break;
        }
    }
    Ok(())
}

/// Spend the free upgrade and the money between levels
fn prepare_level(game: &mut GameState) {
    while game.end_level_upgrades() > 0 {
        let upgrade = if game.level % 2 == 0 {
            EndLevelUpgrade::Interest
        } else {
            EndLevelUpgrade::Attribute(Attribute::Damage)
        };
        if let Err(e) = game.apply_end_level_upgrade(upgrade) {
            log::warn!("Could not take end-of-level upgrade: {}", e);
            break;
        }
    }

    let kind = TowerKind::ALL[game.towers.len() % TowerKind::ALL.len()];
    if game.tower_cost(kind) <= game.economy.money() {
        if let Some(spot) = find_spot(game) {
            match game.build_tower(kind, spot) {
                Ok(tower) => log::info!("Built {} tower {} at {}", kind.name(), tower.id(), spot),
                Err(e) => log::warn!("Could not build {}: {}", kind.name(), e),
            }
        }
    }

    for attribute in [Attribute::Damage, Attribute::Rate, Attribute::Range] {
        if game.upgrade_all(attribute).is_err() {
            break;
        }
    }
}

/// Free grid point closest to the path
fn find_spot(game: &GameState) -> Option<DVec2> {
    let legs: Vec<Segment> = game
        .map
        .waypoints()
        .windows(2)
        .map(|w| Segment::new(w[0], w[1]))
        .collect();
    let step = 25.0;
    let width = creep_defence::consts::TOWER_WIDTH;
    (1..(MAP_HEIGHT / step) as u32)
        .flat_map(|row| (1..(MAP_WIDTH / step) as u32).map(move |col| DVec2::new(col as f64 * step, row as f64 * step)))
        .filter(|p| game.map.can_place(*p, width, &game.towers))
        .map(|p| {
            let dist = legs.iter().map(|l| l.distance_sq_to(p)).fold(f64::INFINITY, f64::min);
            (dist, p)
        })
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, p)| p)
}

/// Text rendering of a frame, one cell per 20 pixels
fn render(frame: &Drawables, sprites: &mut RotationCache<ArrowGlyphs>) -> String {
    const CELL: f64 = 20.0;
    let cols = (MAP_WIDTH / CELL) as usize;
    let rows = (MAP_HEIGHT / CELL) as usize;
    let mut grid = vec![vec!['.'; cols]; rows];
    let mut plot = |pos: DVec2, glyph: char| {
        let (c, r) = ((pos.x / CELL).floor(), (pos.y / CELL).floor());
        if c >= 0.0 && r >= 0.0 && (c as usize) < cols && (r as usize) < rows {
            grid[r as usize][c as usize] = glyph;
        }
    };
    for tower in &frame.towers {
        plot(tower.pos, *sprites.sprite(EntityTag::Tower(tower.kind), tower.turret_angle));
    }
    for creep in &frame.creeps {
        plot(creep.pos, *sprites.sprite(EntityTag::Creep, creep.angle));
    }
    grid.into_iter()
        .map(|row| row.into_iter().collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}

fn print_scores(settings: &Settings, only: Option<&str>) -> Result<()> {
    let scores = HighScores::load(&settings.high_scores_path)
        .with_context(|| format!("reading {}", settings.high_scores_path.display()))?;
    let mut maps: Vec<&str> = match only {
        Some(map) => vec![map],
        None => scores.map_names().collect(),
    };
    maps.sort_unstable();
    if maps.is_empty() {
        println!("No high scores yet");
    }
    for map in maps {
        println!("{}", map);
        for (rank, entry) in scores.entries(map).iter().enumerate() {
            println!("  {:>2}. level {:>3}  ({})", rank + 1, entry.level, entry.timestamp);
        }
    }
    Ok(())
}
