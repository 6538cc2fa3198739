//! The run-loop state machine.
//!
//! `RunLoop` is either running (an interval handle is held) or stopped. A
//! stop is either a user `stop()`, which sets `paused`, or an automatic
//! suspension after the system has stayed calm for `settle_ms`. Mutations
//! restart a suspended loop but never override a user stop.

use std::collections::VecDeque;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::physics::{Change, NodeId, NodeMods, PhysicsEngine, PhysicsParams};

/// Host clock and periodic scheduler.
pub trait Timer {
    type Handle;

    /// Wall-clock milliseconds.
    fn now_ms(&self) -> f64;

    /// Start calling the loop every `period_ms`. `None` if the host refused.
    fn set_interval(&mut self, period_ms: u32) -> Option<Self::Handle>;

    fn clear_interval(&mut self, handle: Self::Handle);
}

/// Run-loop policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunLoopConfig {
    /// Tick interval in milliseconds.
    pub timeout: u32,
    /// Energy level below which the system counts as calm.
    pub energy_threshold: f32,
    /// How long the system must stay calm before the loop suspends.
    pub settle_ms: f64,
    /// Number of tick intervals averaged for `fps`.
    pub fps_window: usize,
}

impl Default for RunLoopConfig {
    fn default() -> Self {
        Self {
            timeout: 18,
            energy_threshold: 0.05,
            settle_ms: 1000.0,
            fps_window: 50,
        }
    }
}

/// Rolling window of the gaps between consecutive ticks.
#[derive(Debug, Clone)]
pub struct FpsWindow {
    samples: VecDeque<f64>,
    capacity: usize,
    last: Option<f64>,
}

impl FpsWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            last: None,
        }
    }

    /// Note a tick at `now`.
    pub fn record(&mut self, now: f64) {
        if let Some(last) = self.last {
            if self.samples.len() == self.capacity {
                self.samples.pop_front();
            }
            self.samples.push_back(now - last);
        }
        self.last = Some(now);
    }

    /// Forget the previous tick so an idle gap is not sampled.
    pub fn restart(&mut self) {
        self.last = None;
    }

    /// Ticks per second over the window, 0 with no samples.
    pub fn fps(&self) -> u32 {
        if self.samples.is_empty() {
            return 0;
        }
        let mean = self.samples.iter().sum::<f64>() / self.samples.len() as f64;
        if mean > 0.0 {
            (1000.0 / mean).round() as u32
        } else {
            0
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Drives a `PhysicsEngine` from a host timer.
pub struct RunLoop<T: Timer> {
    engine: PhysicsEngine,
    timer: T,
    interval: Option<T::Handle>,
    paused: bool,
    low_energy_since: Option<f64>,
    config: RunLoopConfig,
    fps: FpsWindow,
}

impl<T: Timer> RunLoop<T> {
    /// A stopped loop. Nothing ticks until the first `start` or mutation.
    pub fn new(engine: PhysicsEngine, timer: T, config: RunLoopConfig) -> Self {
        let fps = FpsWindow::new(config.fps_window);
        Self {
            engine,
            timer,
            interval: None,
            paused: false,
            low_energy_since: None,
            config,
            fps,
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Begin ticking.
    ///
    /// Does nothing while already running, or while paused by `stop()` unless
    /// `unpause` is set.
    pub fn start(&mut self, unpause: bool) {
        if self.interval.is_some() {
            return;
        }
        if self.paused && !unpause {
            return;
        }

        self.paused = false;
        self.low_energy_since = None;
        self.fps.restart();

        match self.timer.set_interval(self.config.timeout) {
            Some(handle) => {
                self.interval = Some(handle);
                info!("run loop started, ticking every {} ms", self.config.timeout);
            }
            None => warn!("host refused a {} ms interval", self.config.timeout),
        }
    }

    /// Stop ticking until `start(true)`.
    pub fn stop(&mut self) {
        self.paused = true;
        if let Some(handle) = self.interval.take() {
            self.timer.clear_interval(handle);
            info!("run loop stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    /// Whether the loop was stopped by the user rather than suspended.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// One timer callback: tick the engine, then check for convergence.
    ///
    /// Returns `false` without ticking when the loop is not running.
    pub fn on_interval(&mut self) -> bool {
        if self.interval.is_none() {
            return false;
        }

        let now = self.timer.now_ms();
        self.fps.record(now);
        let energy = self.engine.tick();

        if energy.level() < self.config.energy_threshold {
            let low_energy_since = self.low_energy_since;
            match low_energy_since {
                None => self.low_energy_since = Some(now),
                Some(since) if now - since > self.config.settle_ms => self.suspend(),
                Some(_) => {}
            }
        } else {
            self.low_energy_since = None;
        }
        true
    }

    /// Stop after convergence. Unlike `stop`, the next mutation restarts.
    fn suspend(&mut self) {
        if let Some(handle) = self.interval.take() {
            self.timer.clear_interval(handle);
            info!(
                "system settled at epoch {}, suspending run loop",
                self.engine.epoch()
            );
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Apply a change batch and wake the loop. Returns the new epoch.
    pub fn apply_changes(&mut self, changes: &[Change]) -> u64 {
        let epoch = self.engine.apply_changes(changes);
        self.start(false);
        epoch
    }

    pub fn modify_node(&mut self, id: NodeId, mods: &NodeMods) -> bool {
        let found = self.engine.modify_node(id, mods);
        self.start(false);
        found
    }

    /// Update physics parameters. A `timeout` reschedules the interval.
    pub fn modify_physics(&mut self, params: &PhysicsParams) {
        if let Some(timeout) = params.timeout_ms() {
            self.config.timeout = timeout;
            if let Some(handle) = self.interval.take() {
                self.timer.clear_interval(handle);
            }
        }
        self.engine.modify_physics(params);
        self.start(false);
    }

    // =========================================================================
    // Frame Rate
    // =========================================================================

    /// Realized ticks per second.
    pub fn fps(&self) -> u32 {
        self.fps.fps()
    }

    /// Retarget the tick rate.
    pub fn set_fps(&mut self, target: f32) {
        self.modify_physics(&PhysicsParams {
            timeout: Some(1000.0 / f64::from(target.max(1.0))),
            ..PhysicsParams::default()
        });
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn engine(&self) -> &PhysicsEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut PhysicsEngine {
        &mut self.engine
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }

    pub fn config(&self) -> &RunLoopConfig {
        &self.config
    }
}

impl<T: Timer> Drop for RunLoop<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.interval.take() {
            self.timer.clear_interval(handle);
        }
    }
}
