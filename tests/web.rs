//! Browser tests for the JS facade. Run with `wasm-pack test --headless --firefox`.

#![cfg(target_arch = "wasm32")]

use std::cell::RefCell;
use std::rc::Rc;

use js_sys::{Array, Function, Reflect};
use particle_graph_wasm::ParticleGraphWasm;
use wasm_bindgen::JsValue;
use wasm_bindgen::prelude::*;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

fn parse(json: &str) -> JsValue {
    js_sys::JSON::parse(json).unwrap()
}

fn system() -> ParticleGraphWasm {
    ParticleGraphWasm::new(parse(r#"{"integrator": "euler", "timeout": 10}"#)).unwrap()
}

#[wasm_bindgen_test]
fn test_apply_changes_starts_loop() {
    let system = system();
    assert!(!system.is_running().unwrap());

    let epoch = system
        .apply_changes(parse(
            r#"[
                {"type": "addNode", "id": 1, "x": -5, "y": 0, "m": 1, "f": 0},
                {"type": "addNode", "id": 2, "x": 5, "y": 0, "m": 1, "f": 0},
                {"type": "addSpring", "id": 9, "fm": 1, "to": 2, "l": 10},
                {"type": "somethingElse", "id": 3}
            ]"#,
        ))
        .unwrap();

    assert_eq!(epoch, 1.0);
    assert_eq!(system.node_count().unwrap(), 2);
    assert_eq!(system.spring_count().unwrap(), 1);
    assert!(system.is_running().unwrap());

    system.stop().unwrap();
    assert!(!system.is_running().unwrap());
}

#[wasm_bindgen_test]
fn test_stop_is_not_overridden_by_mutations() {
    let system = system();
    system.stop().unwrap();

    system
        .apply_changes(parse(r#"[{"type": "addNode", "id": 1, "x": 0, "y": 0}]"#))
        .unwrap();
    assert!(!system.is_running().unwrap());
    assert!(system.modify_node(1, parse(r#"{"x": 3, "_m": 20}"#)).unwrap());
    assert!(!system.is_running().unwrap());

    system.start(Some(true)).unwrap();
    assert!(system.is_running().unwrap());
    system.stop().unwrap();
}

#[wasm_bindgen_test]
fn test_snapshot_and_nearest() {
    let system = system();
    system
        .apply_changes(parse(
            r#"[
                {"type": "addNode", "id": 4, "x": 0, "y": 0},
                {"type": "addNode", "id": 5, "x": 10, "y": 0}
            ]"#,
        ))
        .unwrap();
    system.stop().unwrap();

    let snapshot = Array::from(&system.snapshot().unwrap());
    assert_eq!(snapshot.length(), 2);
    let first = snapshot.get(0);
    assert_eq!(
        Reflect::get(&first, &"type".into()).unwrap(),
        JsValue::from_str("addNode")
    );

    let nearest = system.nearest_node(9.0, 1.0).unwrap();
    assert_eq!(
        Reflect::get(&nearest, &"id".into()).unwrap().as_f64(),
        Some(5.0)
    );
}

#[wasm_bindgen_test]
fn test_invalid_input_is_an_error() {
    let system = system();
    assert!(system.apply_changes(JsValue::from_str("nope")).is_err());
    assert!(system.modify_physics(parse(r#"{"integrator": "rk4"}"#)).is_err());
    system.stop().unwrap();
}

#[wasm_bindgen_test]
fn test_on_update_receives_frames() {
    let system = system();
    let frames = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&frames);
    let callback = Closure::<dyn FnMut(JsValue)>::new(move |frame: JsValue| {
        sink.borrow_mut().push(frame);
    });
    let function: Function = callback.as_ref().clone().unchecked_into();
    system.on_update(Some(function)).unwrap();
    system.set_fps(100.0).unwrap();

    system
        .apply_changes(parse(r#"[{"type": "addNode", "id": 1, "x": 1, "y": 2}]"#))
        .unwrap();
    assert!(system.is_running().unwrap());
    system.stop().unwrap();

    // No tick has fired synchronously; the callback is only wired, not called.
    assert!(frames.borrow().is_empty());
    callback.forget();
}
