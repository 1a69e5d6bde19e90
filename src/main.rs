#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // hide console window on Windows in release

use eframe::egui;

mod application;

use application::Application;
use gyroglove::{
    constants::{APP_MIN_HEIGHT, APP_MIN_WIDTH, APP_NAME},
    log_info,
};

fn main() -> eframe::Result {
    env_logger::init(); // Log to stderr (if you run with `RUST_LOG=debug`).

    log_info!("Starting {}...", APP_NAME);

    let app = Application::default();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([APP_MIN_WIDTH as f32, APP_MIN_HEIGHT as f32])
            .with_min_inner_size([APP_MIN_WIDTH as f32, APP_MIN_HEIGHT as f32])
            .with_clamp_size_to_monitor_size(false),
        ..Default::default()
    };

    eframe::run_native(
        format!(
            "{}{}",
            if cfg!(debug_assertions) {
                "[DEBUG] "
            } else {
                ""
            },
            APP_NAME
        )
        .as_str(),
        options,
        Box::new(|_cc| Ok(Box::new(app))),
    )
}
