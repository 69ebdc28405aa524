//! Real-time clock driving the simulation
//!
//! The clock owns a thread that ticks the shared game state at a fixed
//! frame rate. Fast-forward runs several ticks per frame. The thread exits
//! by itself when the level completes or the game ends, or when stopped.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use super::pool::BulletResolver;
use super::state::{GamePhase, GameState};
use super::tick::tick;
use crate::error::SimError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockStatus {
    Idle,
    Running,
    Stopped,
}

pub struct Clock {
    state: Arc<Mutex<GameState>>,
    resolver: Arc<BulletResolver>,
    frame: Duration,
    fast_modes: Arc<[u32]>,
    fast_index: Arc<AtomicUsize>,
    status: Arc<Mutex<ClockStatus>>,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Clock {
    /// `fast_modes` lists ticks per frame for each speed; an empty list
    /// means normal speed only
    pub fn new(
        state: Arc<Mutex<GameState>>,
        resolver: Arc<BulletResolver>,
        tick_ms: u64,
        fast_modes: &[u32],
    ) -> Self {
        let modes: Vec<u32> = fast_modes.iter().copied().filter(|m| *m > 0).collect();
        let modes = if modes.is_empty() { vec![1] } else { modes };
        Self {
            state,
            resolver,
            frame: Duration::from_millis(tick_ms),
            fast_modes: Arc::from(modes),
            fast_index: Arc::new(AtomicUsize::new(0)),
            status: Arc::new(Mutex::new(ClockStatus::Idle)),
            stop_tx: None,
            handle: None,
        }
    }

    pub fn status(&self) -> ClockStatus {
        *self.status.lock()
    }

    /// Ticks per frame at the current speed
    pub fn fast_mode(&self) -> u32 {
        self.fast_modes[self.fast_index.load(Ordering::Relaxed) % self.fast_modes.len()]
    }

    /// Switch to the next speed, wrapping around. Takes effect next frame.
    pub fn cycle_fast_mode(&self) -> u32 {
        let len = self.fast_modes.len();
        let next = (self.fast_index.load(Ordering::Relaxed) + 1) % len;
        self.fast_index.store(next, Ordering::Relaxed);
        self.fast_modes[next]
    }

    /// Start ticking. A clock runs once.
    pub fn start(&mut self) -> Result<(), SimError> {
        if self.handle.is_some() || self.status() != ClockStatus::Idle {
            return Err(SimError::ClockAlreadyStarted);
        }
        let (stop_tx, stop_rx) = channel::bounded(1);
        let runner = Runner {
            state: Arc::clone(&self.state),
            resolver: Arc::clone(&self.resolver),
            frame: self.frame,
            fast_modes: Arc::clone(&self.fast_modes),
            fast_index: Arc::clone(&self.fast_index),
            status: Arc::clone(&self.status),
            stop_rx,
        };
        *self.status.lock() = ClockStatus::Running;
        let handle = thread::Builder::new()
            .name("sim-clock".to_string())
            .spawn(move || runner.run())
            .map_err(|e| {
                *self.status.lock() = ClockStatus::Idle;
                SimError::ClockSpawn(e)
            })?;
        self.stop_tx = Some(stop_tx);
        self.handle = Some(handle);
        Ok(())
    }

    /// Signal the thread and wait for it to exit
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            // The thread may already have exited and dropped its receiver
            let _ = tx.try_send(());
        }
        self.join();
    }

    /// Wait until the thread exits by itself
    pub fn wait(&mut self) {
        self.join();
        self.stop_tx = None;
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("clock thread panicked");
                *self.status.lock() = ClockStatus::Stopped;
            }
        }
    }
}

impl Drop for Clock {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Runner {
    state: Arc<Mutex<GameState>>,
    resolver: Arc<BulletResolver>,
    frame: Duration,
    fast_modes: Arc<[u32]>,
    fast_index: Arc<AtomicUsize>,
    status: Arc<Mutex<ClockStatus>>,
    stop_rx: Receiver<()>,
}

impl Runner {
    fn run(self) {
        log::debug!("Clock started at {:?} per frame", self.frame);
        loop {
            let frame_start = Instant::now();
            if !self.frame_ticks() {
                break;
            }
            let remaining = self.frame.saturating_sub(frame_start.elapsed());
            match self.stop_rx.recv_timeout(remaining) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        *self.status.lock() = ClockStatus::Stopped;
        log::debug!("Clock stopped");
    }

    /// Run one frame's worth of ticks; false once there is nothing to run
    fn frame_ticks(&self) -> bool {
        let ticks = self.fast_modes[self.fast_index.load(Ordering::Relaxed) % self.fast_modes.len()];
        let mut state = self.state.lock();
        for _ in 0..ticks {
            if state.phase != GamePhase::Running {
                return false;
            }
            let report = tick(&mut state, &self.resolver);
            if report.level_complete || report.game_over {
                return false;
            }
        }
        true
    }
}
