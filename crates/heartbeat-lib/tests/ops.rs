mod common;

use common::{beat_times, render_ecg};
use heartbeat_lib::{
    detect_heartbeats, squared_moving_integration, CallArgs, EcgPipelineConfig,
    ErrorKind, OpRegistry,
};
use serde_json::{json, Value};
use std::error::Error;

fn x_fixture() -> Value {
    json!([0, 0, 1, 1, 1, 1, 2, 2, 3, 3, 2, 2, 1, 1, 0, 0, 0, 0, 0, 0])
}

fn error_kind(reg: &OpRegistry, op: &str, params: Value) -> ErrorKind {
    reg.execute_json(op, Some(params))
        .expect_err("call should fail")
        .kind()
}

#[test]
fn supported_ops_are_listed() {
    let ops = OpRegistry::supported_ops();
    for name in [
        "squared_moving_integration",
        "thresholding",
        "detect_heartbeats",
        "compare_heartbeats",
        "rri_similarity",
    ] {
        assert!(ops.contains(&name), "{} missing", name);
    }
}

#[test]
fn integration_matches_typed_call() -> Result<(), Box<dyn Error>> {
    let reg = OpRegistry::default();
    let out = reg.execute_json("squared_moving_integration", Some(json!([x_fixture(), 10])))?;
    let x: Vec<f64> = serde_json::from_value(x_fixture())?;
    let expected = squared_moving_integration(&x, 10)?;
    let actual: Vec<f64> = serde_json::from_value(out)?;
    assert_eq!(actual, expected);
    Ok(())
}

#[test]
fn argument_forms_agree() -> Result<(), Box<dyn Error>> {
    let reg = OpRegistry::default();
    let beats = beat_times(8, 2);
    let ecg = render_ecg(&beats, 200, 0.0, 0);
    let positional = reg.execute_json("detect_heartbeats", Some(json!([ecg, 200])))?;
    let named = reg.execute_json("detect_heartbeats", Some(json!({"fs": 200, "ecg": ecg})))?;
    let mixed_args = CallArgs::new().arg(json!(ecg)).kwarg("fs", 200);
    let mixed = reg.execute("detect_heartbeats", &mixed_args)?;
    assert_eq!(positional, named);
    assert_eq!(positional, mixed);
    let beats: Vec<usize> = serde_json::from_value(positional)?;
    assert_eq!(beats, detect_heartbeats(&ecg, 200)?);
    Ok(())
}

#[test]
fn integration_argument_checks() {
    let reg = OpRegistry::default();
    let op = "squared_moving_integration";
    assert_eq!(error_kind(&reg, op, json!(["abc", 3])), ErrorKind::Type);
    assert_eq!(error_kind(&reg, op, json!([5, 3])), ErrorKind::Value);
    assert_eq!(error_kind(&reg, op, json!([[[1, 2], [3, 4]], 1])), ErrorKind::Value);
    assert_eq!(error_kind(&reg, op, json!([x_fixture(), 15.0])), ErrorKind::Type);
    assert_eq!(error_kind(&reg, op, json!([x_fixture(), -5])), ErrorKind::Value);
    assert_eq!(error_kind(&reg, op, json!([x_fixture(), 0])), ErrorKind::Value);
    assert_eq!(error_kind(&reg, op, json!([x_fixture(), 21])), ErrorKind::Value);
    assert_eq!(error_kind(&reg, op, json!([[], 1])), ErrorKind::Value);
    assert_eq!(error_kind(&reg, op, json!({"x": x_fixture(), "window": 3})), ErrorKind::Type);
}

#[test]
fn thresholding_argument_checks() {
    let reg = OpRegistry::default();
    let op = "thresholding";
    let sig = json!([0.0, 1.0, 0.0, 2.0, 0.0]);
    assert!(reg.execute_json(op, Some(json!([sig, sig, 100]))).is_ok());
    assert_eq!(error_kind(&reg, op, json!(["a", sig, 100])), ErrorKind::Type);
    assert_eq!(error_kind(&reg, op, json!([sig, "a", 100])), ErrorKind::Type);
    assert_eq!(error_kind(&reg, op, json!([sig, sig, 100.5])), ErrorKind::Type);
    assert_eq!(error_kind(&reg, op, json!([sig, sig, 0])), ErrorKind::Value);
    assert_eq!(error_kind(&reg, op, json!([sig, [0.0, 1.0], 100])), ErrorKind::Value);
    assert_eq!(error_kind(&reg, op, json!([3, sig, 100])), ErrorKind::Value);
}

#[test]
fn wrong_kinds_are_reported_before_bad_shapes() {
    let reg = OpRegistry::default();
    let cases = [
        ("thresholding", json!([[[1, 2], [3, 4]], [0, 1], "x"]), "fs"),
        ("thresholding", json!([[], "abc", 100]), "integrated_ecg"),
        ("squared_moving_integration", json!([5, 15.0]), "window_length"),
        ("squared_moving_integration", json!({"x": [], "window_length": "3"}), "window_length"),
        ("detect_heartbeats", json!([[[0.0]], 250.5]), "fs"),
        ("rri_similarity", json!([[1], [2], 0, null]), "fs_resample"),
    ];
    for (op, params, arg) in cases {
        let err = reg.execute_json(op, Some(params)).expect_err("call should fail");
        assert_eq!((err.kind(), err.arg()), (ErrorKind::Type, arg), "{}", op);
    }
}

#[test]
fn comparison_and_similarity_through_registry() -> Result<(), Box<dyn Error>> {
    let reg = OpRegistry::default();
    let out = reg.execute_json(
        "compare_heartbeats",
        Some(json!({"detection": [100, 200, 300], "annotation": [101, 260], "max_distance": 2})),
    )?;
    assert_eq!(out, json!({"tp": [100], "fp": [200, 300], "fn": [260]}));

    let beats = json!([100, 350, 580, 850, 1090, 1360, 1590]);
    let r = reg.execute_json("rri_similarity", Some(json!([beats, beats, 250])))?;
    assert!((r.as_f64().unwrap_or(0.0) - 1.0).abs() < 1e-9);
    assert_eq!(
        error_kind(&reg, "rri_similarity", json!([beats, beats, 250, "4"])),
        ErrorKind::Type
    );
    Ok(())
}

#[test]
fn registry_uses_its_pipeline_config() -> Result<(), Box<dyn Error>> {
    let cfg = EcgPipelineConfig::from_toml_str(
        "integration_window_s = 0.12\n[threshold]\nrefractory_s = 0.25\n",
    )?;
    let reg = OpRegistry::new(cfg);
    assert_eq!(reg.pipeline().threshold.refractory_s, 0.25);
    let bad = EcgPipelineConfig {
        lowcut_hz: 20.0,
        ..EcgPipelineConfig::default()
    };
    let reg = OpRegistry::new(bad);
    assert_eq!(
        error_kind(&reg, "detect_heartbeats", json!([[0.0, 1.0, 0.0], 100])),
        ErrorKind::Value
    );
    Ok(())
}
