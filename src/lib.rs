//! Particle Graph - WASM Module
//!
//! A force-directed layout engine that simulates graph nodes as particles:
//! nodes repel one another, edges act as springs, and the layout relaxes
//! toward a low-energy configuration that a separate renderer draws. It is
//! compiled to WebAssembly and exposes a JavaScript-friendly API via
//! wasm-bindgen.
//!
//! # Architecture
//!
//! - `geometry`: 2D vector and bounding box value types
//! - `physics`: particles, springs, change batches, forces and integration
//! - `spatial`: Barnes-Hut quadtree for repulsion, R-tree for hit testing
//! - `runloop`: timer-driven scheduling with auto-suspend on convergence
//! - `logging`: `log` backend for the browser console

use log::{LevelFilter, warn};
use serde::Serialize;
use wasm_bindgen::prelude::*;

pub mod geometry;
pub mod logging;
pub mod physics;
pub mod runloop;
pub mod spatial;

use geometry::Vector;
use physics::{
    Change, Frame, FrameCallback, NodeId, NodeMods, PhysicsConfig, PhysicsEngine, PhysicsParams,
};
use runloop::{IntervalTimer, RunLoop, RunLoopConfig, SharedRunLoop};

/// Initialize the WASM module.
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
    logging::init(LevelFilter::Info);
}

/// Main entry point for the particle system.
///
/// Wraps a `RunLoop` driven by `window.setInterval`. Every mutation wakes
/// the loop; it suspends itself once the layout has settled.
///
/// Calls made from inside the `onUpdate` callback fail with an error, since
/// the system is mid-tick at that point.
#[wasm_bindgen]
pub struct ParticleGraphWasm {
    run_loop: SharedRunLoop,
}

#[wasm_bindgen]
impl ParticleGraphWasm {
    /// Create a stopped particle system.
    ///
    /// # Arguments
    ///
    /// * `params` - Optional `{stiffness, repulsion, friction, gravity, dt,
    ///   precision, integrator, timeout}`; omitted fields take defaults
    #[wasm_bindgen(constructor)]
    pub fn new(params: JsValue) -> Result<ParticleGraphWasm, JsValue> {
        let params: PhysicsParams = if params.is_undefined() || params.is_null() {
            PhysicsParams::default()
        } else {
            serde_wasm_bindgen::from_value(params)?
        };

        let config = PhysicsConfig::default().with_params(&params);
        let mut run_config = RunLoopConfig::default();
        if let Some(timeout) = params.timeout_ms() {
            run_config.timeout = timeout;
        }

        let seed = (js_sys::Math::random() * u64::MAX as f64) as u64;
        let engine = PhysicsEngine::with_seed(config, seed);
        Ok(Self {
            run_loop: IntervalTimer::run_loop(engine, run_config),
        })
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Apply an array of change records and return the new epoch.
    ///
    /// Records look like `{type: "addNode", id, x?, y?, m, f}`,
    /// `{type: "addSpring", id, fm, to, l}`, `{type: "dropNode", id}`, etc.
    /// Unknown types are ignored.
    #[wasm_bindgen(js_name = applyChanges)]
    pub fn apply_changes(&self, changes: JsValue) -> Result<f64, JsValue> {
        let changes: Vec<Change> = serde_wasm_bindgen::from_value(changes)?;
        self.with_loop(|run_loop| run_loop.apply_changes(&changes) as f64)
    }

    /// Patch one node with `{x?, y?, m?, f?, overrideMass?}`.
    ///
    /// Returns false if the node does not exist.
    #[wasm_bindgen(js_name = modifyNode)]
    pub fn modify_node(&self, node_id: u32, mods: JsValue) -> Result<bool, JsValue> {
        let mods: NodeMods = serde_wasm_bindgen::from_value(mods)?;
        self.with_loop(|run_loop| run_loop.modify_node(NodeId(node_id), &mods))
    }

    /// Update physics parameters. Omitted fields are left unchanged.
    #[wasm_bindgen(js_name = modifyPhysics)]
    pub fn modify_physics(&self, params: JsValue) -> Result<(), JsValue> {
        let params: PhysicsParams = serde_wasm_bindgen::from_value(params)?;
        self.with_loop(|run_loop| run_loop.modify_physics(&params))
    }

    /// Remove every node and spring.
    pub fn clear(&self) -> Result<(), JsValue> {
        self.with_loop(|run_loop| run_loop.engine_mut().clear())
    }

    // =========================================================================
    // Run Loop
    // =========================================================================

    /// Start ticking. After `stop()`, only `start(true)` resumes.
    pub fn start(&self, unpause: Option<bool>) -> Result<(), JsValue> {
        self.with_loop(|run_loop| run_loop.start(unpause.unwrap_or(false)))
    }

    pub fn stop(&self) -> Result<(), JsValue> {
        self.with_loop(|run_loop| run_loop.stop())
    }

    #[wasm_bindgen(js_name = isRunning)]
    pub fn is_running(&self) -> Result<bool, JsValue> {
        self.with_loop(|run_loop| run_loop.is_running())
    }

    /// Realized ticks per second over recent ticks.
    pub fn fps(&self) -> Result<u32, JsValue> {
        self.with_loop(|run_loop| run_loop.fps())
    }

    /// Retarget the tick rate.
    #[wasm_bindgen(js_name = setFps)]
    pub fn set_fps(&self, target: f32) -> Result<(), JsValue> {
        self.with_loop(|run_loop| run_loop.set_fps(target))
    }

    /// Register the per-tick callback, or remove it with `undefined`.
    ///
    /// The callback receives `{geometry: [id, x, y, ...], epoch, energy:
    /// {sum, max, mean, n}, bounds: {topLeft, bottomRight}}`.
    #[wasm_bindgen(js_name = onUpdate)]
    pub fn on_update(&self, callback: Option<js_sys::Function>) -> Result<(), JsValue> {
        let callback = callback.map(frame_callback);
        self.with_loop(|run_loop| run_loop.engine_mut().set_on_update(callback))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// The node closest to `(x, y)` as `{id, distance}`, or undefined when empty.
    #[wasm_bindgen(js_name = nearestNode)]
    pub fn nearest_node(&self, x: f32, y: f32) -> Result<JsValue, JsValue> {
        let nearest = self.with_loop(|run_loop| run_loop.engine_mut().nearest(Vector::new(x, y)))?;
        to_js(&nearest)
    }

    /// `{sum, max, mean, n}` of squared speeds from the last tick.
    pub fn energy(&self) -> Result<JsValue, JsValue> {
        let energy = self.with_loop(|run_loop| run_loop.engine().energy())?;
        to_js(&energy)
    }

    /// `{topLeft, bottomRight}` of all nodes after the last tick.
    pub fn bounds(&self) -> Result<JsValue, JsValue> {
        let bounds = self.with_loop(|run_loop| run_loop.engine().bounds())?;
        to_js(&bounds)
    }

    pub fn epoch(&self) -> Result<f64, JsValue> {
        self.with_loop(|run_loop| run_loop.engine().epoch() as f64)
    }

    #[wasm_bindgen(js_name = nodeCount)]
    pub fn node_count(&self) -> Result<u32, JsValue> {
        self.with_loop(|run_loop| run_loop.engine().node_count() as u32)
    }

    #[wasm_bindgen(js_name = springCount)]
    pub fn spring_count(&self) -> Result<u32, JsValue> {
        self.with_loop(|run_loop| run_loop.engine().spring_count() as u32)
    }

    /// The current nodes and springs as a change batch for `applyChanges`.
    pub fn snapshot(&self) -> Result<JsValue, JsValue> {
        let snapshot = self.with_loop(|run_loop| run_loop.engine().snapshot())?;
        to_js(&snapshot)
    }
}

impl ParticleGraphWasm {
    fn with_loop<R>(
        &self,
        f: impl FnOnce(&mut RunLoop<IntervalTimer>) -> R,
    ) -> Result<R, JsValue> {
        let mut run_loop = self.run_loop.try_borrow_mut().map_err(|_| {
            JsValue::from(JsError::new(
                "particle system is mid-tick; call it outside the onUpdate callback",
            ))
        })?;
        Ok(f(&mut run_loop))
    }
}

fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value).map_err(JsValue::from)
}

fn frame_callback(function: js_sys::Function) -> FrameCallback {
    Box::new(move |frame: &Frame| {
        let value = match serde_wasm_bindgen::to_value(frame) {
            Ok(value) => value,
            Err(err) => {
                warn!("could not convert frame: {err}");
                return;
            }
        };
        if let Err(err) = function.call1(&JsValue::NULL, &value) {
            warn!("onUpdate callback threw: {err:?}");
        }
    })
}
