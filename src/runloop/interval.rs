//! Browser timer built on `window.setInterval`.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use log::warn;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

use super::controller::{RunLoop, RunLoopConfig, Timer};
use crate::physics::PhysicsEngine;

/// A run loop shared between the JS facade and its interval callback.
pub type SharedRunLoop = Rc<RefCell<RunLoop<IntervalTimer>>>;

/// Schedules ticks through the browser window.
///
/// The callback is created once and reused for every interval, so restarting
/// the loop does not allocate a new JS closure.
pub struct IntervalTimer {
    window: Option<web_sys::Window>,
    callback: Option<Closure<dyn FnMut()>>,
}

impl IntervalTimer {
    pub fn new() -> Self {
        Self {
            window: web_sys::window(),
            callback: None,
        }
    }

    pub fn set_callback(&mut self, callback: Closure<dyn FnMut()>) {
        self.callback = Some(callback);
    }

    /// Build a run loop whose interval ticks it through a weak handle.
    ///
    /// A tick that finds the loop already borrowed (a JS callback re-entering
    /// mid-tick) is skipped.
    pub fn run_loop(engine: PhysicsEngine, config: RunLoopConfig) -> SharedRunLoop {
        Rc::new_cyclic(|weak: &Weak<RefCell<RunLoop<IntervalTimer>>>| {
            let weak = weak.clone();
            let callback = Closure::<dyn FnMut()>::new(move || {
                let Some(run_loop) = weak.upgrade() else {
                    return;
                };
                match run_loop.try_borrow_mut() {
                    Ok(mut run_loop) => {
                        run_loop.on_interval();
                    }
                    Err(_) => warn!("tick skipped: run loop is busy"),
                }
            });

            let mut timer = IntervalTimer::new();
            timer.set_callback(callback);
            RefCell::new(RunLoop::new(engine, timer, config))
        })
    }
}

impl Default for IntervalTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer for IntervalTimer {
    type Handle = i32;

    fn now_ms(&self) -> f64 {
        js_sys::Date::now()
    }

    fn set_interval(&mut self, period_ms: u32) -> Option<i32> {
        let (Some(window), Some(callback)) = (self.window.as_ref(), self.callback.as_ref()) else {
            warn!("no window or tick callback to schedule an interval with");
            return None;
        };
        let timeout = i32::try_from(period_ms).unwrap_or(i32::MAX);
        window
            .set_interval_with_callback_and_timeout_and_arguments_0(
                callback.as_ref().unchecked_ref(),
                timeout,
            )
            .map_err(|err| warn!("setInterval failed: {err:?}"))
            .ok()
    }

    fn clear_interval(&mut self, handle: i32) {
        if let Some(window) = self.window.as_ref() {
            window.clear_interval_with_handle(handle);
        }
    }
}
