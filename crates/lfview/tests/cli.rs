use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use image::{Rgba, RgbaImage};
use tempfile::TempDir;

/// Writes a 2x2 grid of 4x4 views; camera (1, 1) is white, the rest black.
fn write_grid(dir: &Path, prefix: &str) {
    fs::create_dir_all(dir).unwrap();
    for column in 0..2 {
        for row in 0..2 {
            let value = if (column, row) == (1, 1) { 255 } else { 0 };
            let view = RgbaImage::from_pixel(4, 4, Rgba([value, value, value, 255]));
            view.save(dir.join(format!("{prefix}{column}_{row}.png")))
                .unwrap();
        }
    }
}

fn lfview(config_dir: &Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_lfview"));
    command
        .env("LFVIEW_CONFIG_DIR", config_dir)
        .env_remove("LFVIEW_CONFIG")
        .env("RUST_LOG", "warn");
    command
}

fn grid_args<'a>(source: &'a str) -> Vec<&'a str> {
    vec![
        "--source", source, "--directory", "lf/", "--prefix", "view_", "--columns", "2",
        "--rows", "2", "--width", "4", "--height", "4",
    ]
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn load_reports_the_packed_size() {
    let root = TempDir::new().unwrap();
    write_grid(&root.path().join("lf"), "view_");
    let source = root.path().to_str().unwrap();

    let output = lfview(&root.path().join("config"))
        .arg("load")
        .args(grid_args(source))
        .output()
        .expect("failed to run lfview load");

    assert!(output.status.success(), "{output:?}");
    let text = stdout(&output);
    assert!(text.contains("loaded 4 views (256 bytes)"), "{text}");
    assert!(!text.contains("gap"), "{text}");
}

#[test]
fn missing_view_aborts_by_default_and_is_skipped_on_request() {
    let root = TempDir::new().unwrap();
    write_grid(&root.path().join("lf"), "view_");
    fs::remove_file(root.path().join("lf/view_0_1.png")).unwrap();
    let source = root.path().to_str().unwrap();
    let config_dir = root.path().join("config");

    let aborted = lfview(&config_dir)
        .arg("load")
        .args(grid_args(source))
        .output()
        .unwrap();
    assert!(!aborted.status.success());

    let skipped = lfview(&config_dir)
        .arg("load")
        .args(grid_args(source))
        .args(["--on-error", "skip"])
        .output()
        .unwrap();
    assert!(skipped.status.success(), "{skipped:?}");
    let text = stdout(&skipped);
    assert!(text.contains("gap (0, 1)"), "{text}");
}

#[test]
fn render_writes_the_nearest_view_as_png() {
    let root = TempDir::new().unwrap();
    write_grid(&root.path().join("lf"), "view_");
    let source = root.path().to_str().unwrap();
    let target = root.path().join("frame.png");

    let output = lfview(&root.path().join("config"))
        .arg("render")
        .args(grid_args(source))
        .args(["--aperture", "0", "--backend", "cpu", "-o"])
        .arg(&target)
        .output()
        .expect("failed to run lfview render");

    assert!(output.status.success(), "{output:?}");
    let frame = image::open(&target).unwrap().to_rgba8();
    assert_eq!(frame.dimensions(), (4, 4));
    assert_eq!(frame.get_pixel(2, 2), &Rgba([255, 255, 255, 255]));
}

#[test]
fn config_prints_defaults_and_honours_the_config_file() {
    let root = TempDir::new().unwrap();
    let config_dir = root.path().join("config");

    let output = lfview(&config_dir).arg("config").output().unwrap();
    assert!(output.status.success(), "{output:?}");
    assert!(stdout(&output).contains("version = 1"));

    fs::create_dir_all(&config_dir).unwrap();
    fs::write(
        config_dir.join("config.toml"),
        "version = 1\n[render]\naperture = 1.5\n",
    )
    .unwrap();
    let output = lfview(&config_dir).arg("config").output().unwrap();
    assert!(output.status.success(), "{output:?}");
    assert!(stdout(&output).contains("aperture = 1.5"));
}

#[test]
fn session_rates_every_sample_from_stdin() {
    let root = TempDir::new().unwrap();
    write_grid(&root.path().join("scene_a"), "a_");
    write_grid(&root.path().join("scene_b"), "b_");
    let sequence = root.path().join("sequence.csv");
    fs::write(
        &sequence,
        "sample_id,directory,file_prefix,columns,rows,width,height,zoom_factor,presentation_time\n\
         a,scene_a/,a_,2,2,4,4,1.0,0\n\
         b,scene_b/,b_,2,2,4,4,1.0,0\n",
    )
    .unwrap();
    let previews = root.path().join("previews");

    let mut child = lfview(&root.path().join("config"))
        .arg("session")
        .arg("--sequence")
        .arg(&sequence)
        .args(["--test-id", "p01", "--seed", "7", "--source"])
        .arg(root.path())
        .arg("--previews")
        .arg(&previews)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to run lfview session");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"1\n5\n")
        .unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success(), "{output:?}");
    let reply: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(reply["testID"], "p01");
    assert_eq!(reply["sceneID"].as_array().unwrap().len(), 2);
    assert_eq!(reply["rating"][0], "5 - Excellent");
    assert_eq!(reply["rating"][1], "1 - Bad");
    assert!(previews.join("a.png").is_file());
    assert!(previews.join("b.png").is_file());
}

#[test]
fn session_fails_when_input_ends_early() {
    let root = TempDir::new().unwrap();
    write_grid(&root.path().join("scene_a"), "a_");
    let sequence = root.path().join("sequence.csv");
    fs::write(
        &sequence,
        "sample_id,directory,file_prefix,columns,rows,width,height,zoom_factor,presentation_time\n\
         a,scene_a/,a_,2,2,4,4,1.0,0\n",
    )
    .unwrap();

    let output = lfview(&root.path().join("config"))
        .arg("session")
        .arg("--sequence")
        .arg(&sequence)
        .args(["--test-id", "p01", "--source"])
        .arg(root.path())
        .stdin(Stdio::null())
        .output()
        .unwrap();
    assert!(!output.status.success());
}

#[test]
fn render_rejects_zero_focus() {
    let root = TempDir::new().unwrap();
    write_grid(&root.path().join("lf"), "view_");
    let source = root.path().to_str().unwrap();
    let target = root.path().join("frame.png");

    let output = lfview(&root.path().join("config"))
        .arg("render")
        .args(grid_args(source))
        .args(["--focus", "0", "-o"])
        .arg(&target)
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(!target.exists());
}
