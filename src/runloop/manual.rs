//! A host-driven clock for native embedding and tests.

use super::controller::{RunLoop, Timer};

/// Timer whose clock only moves when told to.
///
/// At most one interval is scheduled at a time, matching how `RunLoop`
/// uses its timer.
#[derive(Debug, Clone, Default)]
pub struct ManualTimer {
    now: f64,
    next_handle: u32,
    active: Option<(u32, u32)>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward by `ms`.
    pub fn advance(&mut self, ms: f64) {
        self.now += ms.max(0.0);
    }

    /// Period of the scheduled interval, if any.
    pub fn period(&self) -> Option<u32> {
        self.active.map(|(_, period)| period)
    }
}

impl Timer for ManualTimer {
    type Handle = u32;

    fn now_ms(&self) -> f64 {
        self.now
    }

    fn set_interval(&mut self, period_ms: u32) -> Option<u32> {
        self.next_handle += 1;
        self.active = Some((self.next_handle, period_ms.max(1)));
        Some(self.next_handle)
    }

    fn clear_interval(&mut self, handle: u32) {
        if matches!(self.active, Some((active, _)) if active == handle) {
            self.active = None;
        }
    }
}

impl RunLoop<ManualTimer> {
    /// Let `ms` of simulated time pass, firing every interval that falls due.
    ///
    /// Returns the number of ticks run.
    pub fn advance(&mut self, ms: f64) -> u32 {
        let end = self.timer().now_ms() + ms.max(0.0);
        let mut ticks = 0;

        while let Some(period) = self.timer().period() {
            let due = self.timer().now_ms() + f64::from(period);
            if due > end {
                break;
            }
            self.timer_mut().now = due;
            if self.on_interval() {
                ticks += 1;
            }
        }

        let now = self.timer().now_ms();
        self.timer_mut().advance(end - now);
        ticks
    }
}
