use std::path::Path;
use std::process::{Command, Output};

use serde_json::{json, Value};

fn facematch(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_facematch"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env("RUST_LOG", "off")
        .output()
        .expect("run facematch")
}

fn stdout_json(output: &Output) -> Value {
    let text = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(text.trim()).expect("stdout is one JSON object")
}

fn write_config(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("config.toml");
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn compare_prints_result_object() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("absent.toml");
    let output = facematch(&config, &["compare", "[1.0, 0.0]", "[1.0, 0.0]"]);

    assert_eq!(output.status.code(), Some(0));
    let result = stdout_json(&output);
    assert_eq!(result["success"], json!(true));
    assert_eq!(result["similarity"], json!(1.0));
    assert_eq!(result["distance"], json!(0.0));
}

#[test]
fn compare_mismatch_exits_with_failure() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("absent.toml");
    let output = facematch(&config, &["compare", "[1.0, 0.0]", "[1.0]"]);

    assert_eq!(output.status.code(), Some(1));
    let result = stdout_json(&output);
    assert_eq!(result["success"], json!(false));
    assert!(result["error"].as_str().unwrap().contains("dimension"));
}

#[test]
fn match_uses_configured_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        "[matching]\nthreshold = 0.5\nmode = \"best-per-photo\"\n",
    );
    let photos = json!([
        {"id": "a", "faces": [{"embedding": [1.0, 0.1]}, {"embedding": [1.0, 0.0]}]},
        {"id": "b", "faces": [{"embedding": [0.0, 1.0]}]}
    ])
    .to_string();
    let output = facematch(&config, &["match", "[1.0, 0.0]", &photos]);

    assert_eq!(output.status.code(), Some(0));
    let result = stdout_json(&output);
    assert_eq!(result["totalMatches"], json!(1));
    assert_eq!(result["totalFacesSearched"], json!(3));
    assert_eq!(result["matchedPhotos"][0]["faceIndex"], json!(1));
    assert_eq!(result["mode"], json!("best-per-photo"));
    assert_eq!(result["thresholdUsed"], json!(0.5));
}

#[test]
fn missing_models_exit_with_init_code() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        "[models]\ndetector = \"/nonexistent/det.onnx\"\nrecognizer = \"/nonexistent/rec.onnx\"\n",
    );
    let image = dir.path().join("selfie.png");
    image::RgbImage::new(8, 8).save(&image).unwrap();

    let output = facematch(&config, &["extract-selfie", image.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(2));
    let result = stdout_json(&output);
    assert_eq!(result["success"], json!(false));
    assert!(result["error"]
        .as_str()
        .unwrap()
        .contains("Model initialization failed"));
}

#[test]
fn config_print_shows_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "[server]\nworkers = 3\n");
    let output = facematch(&config, &["config", "--print"]);

    assert_eq!(output.status.code(), Some(0));
    let printed: toml::Value = toml::from_str(&String::from_utf8_lossy(&output.stdout)).unwrap();
    assert_eq!(printed["server"]["workers"].as_integer(), Some(3));
    assert_eq!(printed["server"]["eager_init"].as_bool(), Some(true));
}
