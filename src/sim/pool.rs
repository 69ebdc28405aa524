//! Parallel bullet resolution
//!
//! Bullets are partitioned into contiguous ranges, one per worker. Workers
//! are long-lived threads fed over channels; each reports its money and the
//! indices of finished bullets into a shared accumulator, and the last one
//! to report wakes the tick thread. Removal happens only after every range
//! has reported, so indices stay valid while workers run.

use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, SendError, Sender};
use parking_lot::{Condvar, Mutex};

use super::bullet::{Bullet, BulletTick};
use super::creep::Creep;
use crate::error::SimError;

/// How long the tick thread waits before complaining about slow workers
pub const REPORT_TIMEOUT: Duration = Duration::from_secs(1);

/// Money and removals produced by one resolution pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub money: f64,
    /// Indices, before removal, of bullets that finished; ascending
    pub removed: Vec<usize>,
}

/// Split `n` items into `k` contiguous ranges whose sizes differ by at most
/// one, larger ranges first.
pub fn partition(n: usize, k: usize) -> Vec<Range<usize>> {
    if k == 0 {
        return Vec::new();
    }
    let base = n / k;
    let extra = n % k;
    let mut start = 0;
    (0..k)
        .map(|i| {
            let len = base + usize::from(i < extra);
            let range = start..start + len;
            start += len;
            range
        })
        .collect()
}

/// Tick `bullets`, which start at global index `offset`
pub fn resolve_range(offset: usize, bullets: &mut [Bullet], creeps: &[Arc<Creep>]) -> Resolution {
    let mut resolution = Resolution::default();
    for (i, bullet) in bullets.iter_mut().enumerate() {
        match bullet.tick(creeps) {
            BulletTick::Flying => {}
            BulletTick::Finished { money } => {
                resolution.money += money;
                resolution.removed.push(offset + i);
            }
            BulletTick::Expired => resolution.removed.push(offset + i),
        }
    }
    resolution
}

/// Remove the bullets at `sorted` indices, keeping the rest in order
fn remove_indices(bullets: &mut Vec<Bullet>, sorted: &[usize]) {
    let mut doomed = sorted.iter().copied().peekable();
    let mut index = 0;
    bullets.retain(|_| {
        let remove = doomed.peek() == Some(&index);
        if remove {
            doomed.next();
        }
        index += 1;
        !remove
    });
}

struct Job {
    slot: usize,
    offset: usize,
    bullets: Vec<Bullet>,
    creeps: Arc<[Arc<Creep>]>,
}

#[derive(Default)]
struct Accumulator {
    money: f64,
    removed: Vec<usize>,
    /// Bullets handed back by each job, in slot order
    chunks: Vec<Option<Vec<Bullet>>>,
    pending: usize,
}

#[derive(Default)]
struct Shared {
    acc: Mutex<Accumulator>,
    done: Condvar,
}

impl Shared {
    fn report(&self, slot: usize, bullets: Vec<Bullet>, resolution: Resolution) {
        let mut acc = self.acc.lock();
        acc.money += resolution.money;
        acc.removed.extend(resolution.removed);
        acc.chunks[slot] = Some(bullets);
        acc.pending -= 1;
        if acc.pending == 0 {
            self.done.notify_one();
        }
    }
}

/// Resolve one job. A panicking bullet loses its range's results for this
/// tick but not the bullets themselves or the worker.
fn run_job(mut job: Job, shared: &Shared) {
    let offset = job.offset;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        resolve_range(offset, &mut job.bullets, &job.creeps)
    }));
    let resolution = outcome.unwrap_or_else(|_| {
        log::error!(
            "bullet range starting at {} panicked; its results are dropped this tick",
            offset
        );
        Resolution::default()
    });
    shared.report(job.slot, job.bullets, resolution);
}

fn worker_loop(jobs: Receiver<Job>, shared: Arc<Shared>) {
    while let Ok(job) = jobs.recv() {
        run_job(job, &shared);
    }
}

/// Fixed set of bullet worker threads
pub struct BulletWorkerPool {
    senders: Vec<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    shared: Arc<Shared>,
}

impl BulletWorkerPool {
    pub fn new(size: usize) -> Result<Self, SimError> {
        let shared = Arc::new(Shared::default());
        let mut senders = Vec::with_capacity(size);
        let mut workers = Vec::with_capacity(size);
        for i in 0..size {
            let (tx, rx) = channel::unbounded();
            let worker_shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("bullet-worker-{}", i))
                .spawn(move || worker_loop(rx, worker_shared))
                .map_err(SimError::WorkerSpawn)?;
            senders.push(tx);
            workers.push(handle);
        }
        log::debug!("Started {} bullet workers", size);
        Ok(Self {
            senders,
            workers,
            shared,
        })
    }

    pub fn size(&self) -> usize {
        self.senders.len()
    }

    /// Tick every bullet across the workers and drop the finished ones
    pub fn resolve(&self, bullets: &mut Vec<Bullet>, creeps: &[Arc<Creep>]) -> Resolution {
        let ranges = partition(bullets.len(), self.size().min(bullets.len()));
        if ranges.is_empty() {
            return Resolution::default();
        }
        let creeps: Arc<[Arc<Creep>]> = Arc::from(creeps);

        let mut rest = std::mem::take(bullets);
        let mut chunks: Vec<Vec<Bullet>> = ranges.iter().rev().map(|r| rest.split_off(r.start)).collect();
        chunks.reverse();

        {
            let mut acc = self.shared.acc.lock();
            acc.money = 0.0;
            acc.removed.clear();
            acc.chunks = (0..ranges.len()).map(|_| None).collect();
            acc.pending = ranges.len();
        }

        for (slot, (range, chunk)) in ranges.iter().zip(chunks).enumerate() {
            let job = Job {
                slot,
                offset: range.start,
                bullets: chunk,
                creeps: Arc::clone(&creeps),
            };
            if let Err(SendError(job)) = self.senders[slot].send(job) {
                log::warn!("bullet worker {} is gone; resolving its range inline", slot);
                run_job(job, &self.shared);
            }
        }

        let mut acc = self.shared.acc.lock();
        while acc.pending > 0 {
            if self.shared.done.wait_for(&mut acc, REPORT_TIMEOUT).timed_out() {
                log::warn!("Still waiting on {} bullet ranges", acc.pending);
            }
        }
        for chunk in acc.chunks.drain(..) {
            bullets.extend(chunk.unwrap_or_default());
        }
        let money = std::mem::take(&mut acc.money);
        let mut removed = std::mem::take(&mut acc.removed);
        drop(acc);

        removed.sort_unstable();
        remove_indices(bullets, &removed);
        Resolution { money, removed }
    }
}

impl Drop for BulletWorkerPool {
    fn drop(&mut self) {
        // Closing the channels ends the worker loops
        self.senders.clear();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("bullet worker exited with a panic");
            }
        }
    }
}

/// Chooses between the worker pool and the tick thread
pub struct BulletResolver {
    pool: Option<BulletWorkerPool>,
    /// Bullet counts at or below this are resolved sequentially
    threshold: usize,
}

impl BulletResolver {
    /// With one worker or fewer everything runs on the tick thread. A pool
    /// that fails to start degrades to the same.
    pub fn new(workers: usize, threshold: usize) -> Self {
        let pool = if workers > 1 {
            match BulletWorkerPool::new(workers) {
                Ok(pool) => Some(pool),
                Err(e) => {
                    log::warn!("{}; resolving bullets on the tick thread", e);
                    None
                }
            }
        } else {
            None
        };
        Self { pool, threshold }
    }

    pub fn sequential() -> Self {
        Self {
            pool: None,
            threshold: 0,
        }
    }

    pub fn workers(&self) -> usize {
        self.pool.as_ref().map_or(1, BulletWorkerPool::size)
    }

    pub fn resolve(&self, bullets: &mut Vec<Bullet>, creeps: &[Arc<Creep>]) -> Resolution {
        match &self.pool {
            Some(pool) if bullets.len() > self.threshold => pool.resolve(bullets, creeps),
            _ => {
                let resolution = resolve_range(0, bullets, creeps);
                remove_indices(bullets, &resolution.removed);
                resolution
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::economy::Formulae;
    use crate::sim::bullet::{OnHit, Shot};
    use crate::sim::creep::CreepStats;
    use crate::sim::tower::{Tower, TowerKind, TowerSpec};
    use glam::DVec2;

    #[test]
    fn test_partition() {
        assert_eq!(partition(10, 3), vec![0..4, 4..7, 7..10]);
        assert_eq!(partition(4, 4), vec![0..1, 1..2, 2..3, 3..4]);
        assert_eq!(partition(2, 3), vec![0..1, 1..2, 2..2]);
        assert!(partition(5, 0).is_empty());
    }

    /// 40 lanes of bullets flying along +x; every even lane has a creep in
    /// the way, so exactly the even bullets finish on the first tick.
    fn lanes() -> (Vec<Bullet>, Vec<Arc<Creep>>) {
        let spec = TowerSpec::for_kind(TowerKind::Basic);
        let owner = Arc::new(Tower::new(1, DVec2::ZERO, &spec, 0).unwrap());
        let stats = CreepStats {
            hp: 100.0,
            level_hp: 100.0,
            speed: 0.0,
            width: 10.0,
        };
        let mut bullets = Vec::new();
        let mut creeps = Vec::new();
        for lane in 0..40u32 {
            let y = 10.0 + lane as f64 * 12.0;
            let shot = Shot {
                owner: Arc::clone(&owner),
                start: DVec2::new(100.0, y),
                dir: DVec2::X,
                speed: 10.0,
                range: 400.0,
                damage: 10.0,
            };
            bullets.push(Bullet::new(shot, OnHit::None));
            if lane % 2 == 0 {
                let creep = Creep::stationary(lane, DVec2::new(105.0, y), stats, &Formulae::default());
                creeps.push(Arc::new(creep));
            }
        }
        (bullets, creeps)
    }

    fn check(resolver: &BulletResolver) {
        let (mut bullets, creeps) = lanes();
        let resolution = resolver.resolve(&mut bullets, &creeps);
        assert_eq!(resolution.removed, (0..40).step_by(2).collect::<Vec<_>>());
        assert!((resolution.money - 20.0).abs() < 1e-9);
        assert_eq!(bullets.len(), 20);
        // Survivors keep their order
        for (i, bullet) in bullets.iter().enumerate() {
            let lane = 2 * i + 1;
            assert!((bullet.position().y - (10.0 + lane as f64 * 12.0)).abs() < 1e-9);
        }
        for creep in &creeps {
            assert!((creep.hp() - 90.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_sequential_resolution() {
        check(&BulletResolver::sequential());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let resolver = BulletResolver::new(4, 0);
        assert_eq!(resolver.workers(), 4);
        check(&resolver);
        // The pool is reusable across ticks
        check(&resolver);
    }

    #[test]
    fn test_below_threshold_stays_on_tick_thread() {
        let resolver = BulletResolver::new(3, 100);
        check(&resolver);
    }

    #[test]
    fn test_more_workers_than_bullets() {
        let resolver = BulletResolver::new(8, 0);
        let (mut bullets, creeps) = lanes();
        bullets.truncate(3);
        let resolution = resolver.resolve(&mut bullets, &creeps);
        assert_eq!(resolution.removed, vec![0, 2]);
        assert_eq!(bullets.len(), 1);
    }

    #[test]
    fn test_empty_resolution() {
        let resolver = BulletResolver::new(2, 0);
        let mut bullets = Vec::new();
        assert_eq!(resolver.resolve(&mut bullets, &[]), Resolution::default());
    }

    #[test]
    fn test_remove_indices_keeps_order() {
        let (mut bullets, _) = lanes();
        bullets.truncate(5);
        remove_indices(&mut bullets, &[0, 3]);
        let ys: Vec<f64> = bullets.iter().map(|b| b.position().y).collect();
        assert_eq!(ys, vec![22.0, 34.0, 58.0]);
    }
}
