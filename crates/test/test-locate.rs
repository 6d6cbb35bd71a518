//! Localization against synthetic screens served by the stub desktop.
//!
//!   cargo run -p clickflow-test --bin test-locate

use std::path::Path;
use std::sync::{mpsc, Arc, Mutex};

use image::{Rgba, RgbaImage, imageops};
use libtest_mimic::{Arguments, Failed, Trial};

use clickflow_core::control::RunControl;
use clickflow_core::events::{ExecutorEvent, NullSink};
use clickflow_core::executor::Executor;
use clickflow_core::locate::Locator;
use clickflow_core::platform::stub::{Action, ActionLog, StubDesktop};
use clickflow_core::settings::Settings;
use clickflow_core::step::*;
use clickflow_core::telemetry::Telemetry;
use clickflow_core::types::{Capture, MouseButton, Point};

// Busy desktop-like background: gradients with a few flat "windows".
fn screen(w: u32, h: u32) -> RgbaImage {
    let mut img = RgbaImage::from_fn(w, h, |x, y| {
        let r = (x * 255 / w) as u8;
        let g = (y * 255 / h) as u8;
        let b = ((x ^ y) & 0xff) as u8;
        Rgba([r, g, b, 255])
    });
    for (x0, y0, c) in [(20, 20, 200u8), (200, 140, 60)] {
        for y in y0..y0 + 60 {
            for x in x0..x0 + 90 {
                img.put_pixel(x, y, Rgba([c, c, c, 255]));
            }
        }
    }
    img
}

// A button with a label-like pattern pasted at (x, y).
fn paste_button(img: &mut RgbaImage, x: u32, y: u32) -> RgbaImage {
    let button = RgbaImage::from_fn(48, 20, |bx, by| {
        let edge = bx < 2 || by < 2 || bx > 45 || by > 17;
        let glyph = (8..40).contains(&bx) && (7..13).contains(&by) && (bx / 3) % 2 == 0;
        if edge || glyph {
            Rgba([30, 30, 160, 255])
        } else {
            Rgba([235, 235, 235, 255])
        }
    });
    imageops::overlay(img, &button, x as i64, y as i64);
    button
}

fn save(dir: &Path, name: &str, img: &RgbaImage) -> Result<String, Failed> {
    let path = dir.join(name);
    img.save(&path)?;
    Ok(path.display().to_string())
}

fn locate_button_with_origin() -> Result<(), Failed> {
    let dir = tempfile::tempdir()?;
    let mut img = screen(320, 240);
    let button = paste_button(&mut img, 150, 60);
    let path = save(dir.path(), "button.png", &button)?;

    let mut desktop = StubDesktop::new().with_screen(Capture::from_rgba(img, Point::new(1920, 0)));
    let telemetry = Telemetry::new(Box::new(NullSink), dir.path().to_path_buf(), true);
    let found = Locator::new(None).find_image(&mut desktop, &telemetry, Path::new(&path), 0.9)?;

    if found != Some(Point::new(1920 + 150 + 24, 60 + 10)) {
        return Err(format!("found {:?}", found).into());
    }
    for artifact in ["current_screen.png", "template.png", "match_result.png"] {
        if !dir.path().join(artifact).exists() {
            return Err(format!("{} not written", artifact).into());
        }
    }
    Ok(())
}

fn absent_button_is_not_found() -> Result<(), Failed> {
    let dir = tempfile::tempdir()?;
    let mut other = screen(320, 240);
    let button = paste_button(&mut other, 10, 10);
    let path = save(dir.path(), "button.png", &button)?;

    let mut desktop = StubDesktop::new().with_screen(Capture::from_rgba(screen(320, 240), Point::default()));
    let telemetry = Telemetry::new(Box::new(NullSink), dir.path().to_path_buf(), false);
    let found = Locator::new(None).find_image(&mut desktop, &telemetry, Path::new(&path), 0.9)?;
    if found.is_some() {
        return Err(format!("unexpected match {:?}", found).into());
    }
    Ok(())
}

fn image_click_clicks_match_center() -> Result<(), Failed> {
    let dir = tempfile::tempdir()?;
    let mut img = screen(320, 240);
    let button = paste_button(&mut img, 40, 150);
    save(dir.path(), "ok.png", &button)?;

    let log: ActionLog = Arc::new(Mutex::new(Vec::new()));
    let desktop = StubDesktop::recording(log.clone()).with_screen(Capture::from_rgba(img, Point::default()));
    let settings = Settings {
        debug_mode: false,
        images_dir: dir.path().to_path_buf(),
        key_settle_ms: 0,
        ..Settings::default()
    };
    let (tx, rx) = mpsc::channel();
    let mut executor = Executor::new(Box::new(desktop), RunControl::new(), Box::new(tx), settings)
        .with_locator(Locator::new(None));

    // relative reference: resolved by file name inside images_dir
    let step = Step::new(StepKind::MouseClick(MouseClick {
        duration: 0.0,
        ..MouseClick::on_image("somewhere/else/ok.png", 0.9)
    }));
    executor.execute(&[step], 1);
    drop(executor);

    if let Some(err) = rx.iter().find_map(|e| match e {
        ExecutorEvent::StepError { message, .. } => Some(message),
        _ => None,
    }) {
        return Err(err.into());
    }
    let actions = log.lock().unwrap().clone();
    let input: Vec<Action> = actions.into_iter().filter(|a| *a != Action::Capture).collect();
    if input != vec![Action::Move(Point::new(64, 160)), Action::Click(MouseButton::Left)] {
        return Err(format!("actions {:?}", input).into());
    }
    Ok(())
}

fn image_list_rotates() -> Result<(), Failed> {
    let dir = tempfile::tempdir()?;
    let mut img = screen(320, 240);
    let button = paste_button(&mut img, 200, 30);
    save(dir.path(), "a.png", &button)?;

    let log: ActionLog = Arc::new(Mutex::new(Vec::new()));
    let desktop = StubDesktop::recording(log.clone()).with_screen(Capture::from_rgba(img, Point::default()));
    let settings = Settings { debug_mode: false, images_dir: dir.path().to_path_buf(), ..Settings::default() };
    let (tx, rx) = mpsc::channel();
    let mut executor = Executor::new(Box::new(desktop), RunControl::new(), Box::new(tx), settings)
        .with_locator(Locator::new(None));

    let step = Step::new(StepKind::MouseClick(MouseClick {
        input_type: InputMode::Multiple,
        image_list: vec!["a.png".into(), "missing.png".into()],
        duration: 0.0,
        ..MouseClick::on_image("", 0.9)
    }));
    executor.execute(&[Step::new(StepKind::LoopStart(LoopStart { iterations: 3 })), step, Step::new(StepKind::LoopEnd)], 1);
    drop(executor);

    // a.png, missing.png, a.png
    let errors = rx
        .iter()
        .filter(|e| matches!(e, ExecutorEvent::StepError { .. }))
        .count();
    let clicks = log.lock().unwrap().iter().filter(|a| matches!(a, Action::Click(_))).count();
    if errors != 1 || clicks != 2 {
        return Err(format!("errors {}, clicks {}", errors, clicks).into());
    }
    Ok(())
}

fn main() {
    let args = Arguments::from_args();
    let trials = vec![
        Trial::test("locate_button_with_origin", locate_button_with_origin),
        Trial::test("absent_button_is_not_found", absent_button_is_not_found),
        Trial::test("image_click_clicks_match_center", image_click_clicks_match_center),
        Trial::test("image_list_rotates", image_list_rotates),
    ];
    libtest_mimic::run(&args, trials).exit();
}
