use std::path::Path;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use clap::Parser;
use image::{Rgba, RgbaImage};

use stratapaint::canvas::StrokeMode;
use stratapaint::cli::{self, CliArgs};
use stratapaint::io;
use stratapaint::ops::scripting::{self, SharedProject};
use stratapaint::project::Project;
use stratapaint::settings::EditorSettings;

fn write(path: &Path, contents: &str) {
    std::fs::write(path, contents).expect("write fixture");
}

fn default_config(dir: &Path) -> String {
    let path = dir.join("settings.cfg");
    EditorSettings {
        canvas_width: 40,
        canvas_height: 30,
        ..EditorSettings::default()
    }
    .save_to(&path)
    .expect("save settings");
    path.to_string_lossy().to_string()
}

fn arg(p: &Path) -> String {
    p.to_string_lossy().to_string()
}

#[test]
fn script_stroke_is_exported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = dir.path().join("stroke.rhai");
    let out = dir.path().join("out.png");
    write(
        &script,
        r##"
            add_layer("ink");
            set_color("#ff0000");
            set_size(6);
            pointer_down(10, 10);
            pointer_move(20, 10);
            pointer_up();
            print(layer_count());
        "##,
    );

    let args = CliArgs::parse_from([
        "stratapaint",
        "-c",
        &default_config(dir.path()),
        "-s",
        &arg(&script),
        "-o",
        &arg(&out),
    ]);
    let summary = cli::run_session(&args).expect("run");
    assert_eq!((summary.width, summary.height), (40, 30));
    assert_eq!(summary.layer_count, 2);
    assert_eq!(summary.console_output, vec!["2".to_string()]);
    // Open, Add Layer, Brush Stroke
    assert_eq!(summary.history_len, 3);

    let img = io::load_image(&out).expect("decode output");
    assert_eq!(img.dimensions(), (40, 30));
    assert_eq!(*img.get_pixel(15, 10), Rgba([255, 0, 0, 255]));
    assert_eq!(*img.get_pixel(15, 25), Rgba([255, 255, 255, 255]));
}

#[test]
fn input_image_sizes_canvas_and_can_be_filtered() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("photo.png");
    let script = dir.path().join("invert.rhai");
    let out = dir.path().join("inverted.png");
    io::write_png(&RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 255])), &input).expect("fixture");
    write(&script, r#"apply_filter(active_layer(), "invert");"#);

    let args = CliArgs::parse_from([
        "stratapaint",
        "-c",
        &default_config(dir.path()),
        "-i",
        &arg(&input),
        "-s",
        &arg(&script),
        "-o",
        &arg(&out),
    ]);
    assert_eq!(cli::run(args), ExitCode::SUCCESS);

    let img = io::load_image(&out).expect("decode output");
    assert_eq!(img.dimensions(), (4, 3));
    assert_eq!(*img.get_pixel(3, 2), Rgba([245, 235, 225, 255]));
}

#[test]
fn failing_script_writes_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = dir.path().join("bad.rhai");
    let out = dir.path().join("never.png");
    write(&script, "add_layer(\"x\");\ndelete_layer(12345);\n");

    let args = CliArgs::parse_from([
        "stratapaint",
        "-c",
        &default_config(dir.path()),
        "-s",
        &arg(&script),
        "-o",
        &arg(&out),
    ]);
    assert_eq!(cli::run(args), ExitCode::FAILURE);
    assert!(!out.exists());
}

#[test]
fn transparent_background_without_script() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("blank.png");
    let args = CliArgs::parse_from([
        "stratapaint",
        "-c",
        &default_config(dir.path()),
        "-W",
        "8",
        "-H",
        "5",
        "--background",
        "#00000000",
        "-o",
        &arg(&out),
    ]);
    let summary = cli::run_session(&args).expect("run");
    assert_eq!(summary.history_len, 1);
    let img = io::load_image(&out).expect("decode");
    assert_eq!(img.dimensions(), (8, 5));
    assert!(img.pixels().all(|p| p.0[3] == 0));
}

#[test]
fn scripted_merge_keeps_stroke_order_and_undoes() {
    let project: SharedProject = Arc::new(Mutex::new(Project::new(32, 32)));
    scripting::execute_script(
        &project,
        r#"
            let a = add_layer("a");
            pointer_down(2, 2);
            pointer_move(12, 2);
            pointer_up();
            let b = add_layer("b");
            set_tool("eraser");
            pointer_down(4, 2);
            pointer_move(6, 2);
            pointer_up();
            merge_down(b);
        "#,
    )
    .expect("script");

    let mut lock = project.lock().expect("lock");
    assert_eq!(lock.stack().len(), 2);
    let merged = lock.layer(lock.active_layer_id()).expect("merged");
    assert_eq!(merged.name, "a");
    let modes: Vec<_> = merged.strokes.iter().map(|s| s.mode).collect();
    assert_eq!(modes, vec![StrokeMode::Paint, StrokeMode::Erase]);

    assert!(lock.undo());
    assert_eq!(lock.stack().len(), 3);
    assert!(lock.redo());
    assert_eq!(lock.stack().len(), 2);
}

#[test]
fn merging_a_hidden_layer_leaves_the_render_unchanged() {
    let project: SharedProject = Arc::new(Mutex::new(Project::new(32, 32)));
    scripting::execute_script(
        &project,
        r##"
            add_layer("a");
            let b = add_layer("b");
            set_color("#ff0000");
            pointer_down(4, 10);
            pointer_move(20, 10);
            pointer_up();
            toggle_visibility(b);
        "##,
    )
    .expect("setup");
    let before = project.lock().expect("lock").render();
    assert_eq!(*before.get_pixel(10, 10), Rgba([255, 255, 255, 255]));

    scripting::execute_script(&project, "merge_down(active_layer());").expect("merge");
    let lock = project.lock().expect("lock");
    assert_eq!(lock.stack().len(), 2);
    assert_eq!(lock.render(), before);
}
