//! Simulation module
//!
//! All gameplay logic lives here:
//! - Fixed timestep only, driven by `tick` or the `Clock` thread
//! - Seeded RNG only
//! - Creeps are ordered first-along-path before towers pick targets
//! - Bullets may resolve on worker threads; everything else runs on the tick thread

pub mod bullet;
pub mod clock;
pub mod creep;
pub mod geometry;
pub mod pool;
pub mod state;
pub mod tick;
pub mod tower;

pub use bullet::{Bullet, BulletTick, BulletView, OnHit, Shot};
pub use clock::{Clock, ClockStatus};
pub use creep::{Creep, CreepPhase, CreepStats, CreepTick, CreepView, DamageNotifier, DamageReport, Slow, Weaken};
pub use geometry::{ArcKind, ArcSegment, Circle, Polygon, Rect, Segment, Shape};
pub use pool::{BulletResolver, BulletWorkerPool, Resolution};
pub use state::{Drawables, GameEvent, GamePhase, GameState, TowerView};
pub use tick::{TickReport, TickTimings, TimingAverages, tick};
pub use tower::{Attribute, Special, Targeting, Tower, TowerKind, TowerSpec};
