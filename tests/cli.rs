//! Runs the `ies` binary against JSON files in a temp directory.

use std::path::Path;
use std::process::Command;

use ies_smoother::io::{MatrixFile, read_matrix_json, write_matrix_json};
use nalgebra::DMatrix;

fn ies() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_ies"));
    cmd.env_remove("IES_LOG");
    cmd
}

fn write(dir: &Path, name: &str, m: &DMatrix<f64>) -> std::path::PathBuf {
    let path = dir.join(name);
    write_matrix_json(&path, m).unwrap();
    path
}

fn inputs(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf, std::path::PathBuf) {
    let y = DMatrix::from_row_slice(3, 2, &[1.0, -0.5, 0.3, 0.8, -0.6, 0.4]);
    let e = DMatrix::from_row_slice(3, 2, &[0.2, -0.2, -0.1, 0.1, 0.15, -0.15]);
    let d = DMatrix::from_row_slice(3, 2, &[0.5, -0.3, 0.1, 0.4, -0.2, 0.6]);
    (
        write(dir, "y.json", &y),
        write(dir, "e.json", &e),
        write(dir, "d.json", &d),
    )
}

#[test]
fn update_writes_coefficients_and_prints_summary() {
    let dir = tempfile::tempdir().unwrap();
    let (y, e, d) = inputs(dir.path());
    let out = dir.path().join("w.json");

    let output = ies()
        .arg("update")
        .arg("--responses")
        .arg(&y)
        .arg("--perturbations")
        .arg(&e)
        .arg("--residual")
        .arg(&d)
        .args(["--inversion", "subspace-re", "--truncation", "1.0"])
        .arg("--out")
        .arg(&out)
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("subspace-re"));
    assert!(stdout.contains("2 of 2"));

    let w = read_matrix_json(&out).unwrap();
    assert_eq!(w.shape(), (2, 2));
    assert!(w.iter().all(|v| v.is_finite()));
}

#[test]
fn covariance_mode_without_r_exits_with_config_code() {
    let dir = tempfile::tempdir().unwrap();
    let (y, e, d) = inputs(dir.path());
    let out = dir.path().join("w.json");

    let output = ies()
        .arg("update")
        .arg("--responses")
        .arg(&y)
        .arg("--perturbations")
        .arg(&e)
        .arg("--residual")
        .arg(&d)
        .args(["--inversion", "subspace-exact-r"])
        .arg("--out")
        .arg(&out)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    assert!(!out.exists());
}

#[test]
fn residual_subcommand_matches_formula() {
    let dir = tempfile::tempdir().unwrap();
    let (y, e, _) = inputs(dir.path());
    let obs = dir.path().join("obs.json");
    std::fs::write(&obs, r#"{"values": [0.4, 0.9, -0.1]}"#).unwrap();
    let out = dir.path().join("d.json");

    let status = ies()
        .arg("residual")
        .arg("--observations")
        .arg(&obs)
        .arg("--perturbations")
        .arg(&e)
        .arg("--responses")
        .arg(&y)
        .arg("--out")
        .arg(&out)
        .status()
        .unwrap();
    assert!(status.success());

    let d: MatrixFile = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!((d.rows, d.cols), (3, 2));
    // Row 0: E - Y + obs.
    assert!((d.data[0] - (0.2 - 1.0 + 0.4)).abs() < 1e-12);
    assert!((d.data[1] - (-0.2 + 0.5 + 0.4)).abs() < 1e-12);
}

#[test]
fn smooth_updates_parameters_from_settings_file() {
    let dir = tempfile::tempdir().unwrap();
    let y = DMatrix::from_row_slice(2, 4, &[1.0, 2.0, 0.5, -0.3, 0.2, -1.0, 0.7, 1.1]);
    let x = DMatrix::from_row_slice(1, 4, &[0.1, 0.4, -0.2, 0.3]);
    let y_path = write(dir.path(), "y.json", &y);
    let x_path = write(dir.path(), "x.json", &x);
    let obs = dir.path().join("obs.json");
    std::fs::write(&obs, r#"{"values": [0.8, 0.3]}"#).unwrap();
    let errors = dir.path().join("sd.json");
    std::fs::write(&errors, r#"{"values": [0.5, 0.5]}"#).unwrap();
    let config = dir.path().join("settings.json");
    std::fs::write(
        &config,
        r#"{"inversion": "subspace-re", "truncation": {"fraction": 0.99}, "step_length": 1.0}"#,
    )
    .unwrap();
    let out = dir.path().join("x_post.json");

    let output = ies()
        .arg("smooth")
        .arg("--responses")
        .arg(&y_path)
        .arg("--parameters")
        .arg(&x_path)
        .arg("--observations")
        .arg(&obs)
        .arg("--errors")
        .arg(&errors)
        .arg("--config")
        .arg(&config)
        .args(["--seed", "7"])
        .arg("--out")
        .arg(&out)
        .output()
        .unwrap();

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let posterior = read_matrix_json(&out).unwrap();
    assert_eq!(posterior.shape(), (1, 4));
    assert!(posterior.iter().all(|v| v.is_finite()));
}
