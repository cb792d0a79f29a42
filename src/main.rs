mod app;
mod state;
mod ui;

use std::path::PathBuf;

use app::SpectraAnalyzerApp;
use eframe::egui;
use spectra_analyzer::config::AnalyzerConfig;

fn main() -> eframe::Result {
    env_logger::init();

    let config = AnalyzerConfig::load().unwrap_or_else(|e| {
        log::error!("Ignoring config: {e:#}");
        AnalyzerConfig::default()
    });
    // Optional spectrum to open right away.
    let initial_file = std::env::args_os().nth(1).map(PathBuf::from);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 900.0])
            .with_min_inner_size([640.0, 400.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Spectra Analyzer",
        options,
        Box::new(move |cc| {
            // Install image loaders so egui can decode the rendered PNGs.
            egui_extras::install_image_loaders(&cc.egui_ctx);
            let mut app = SpectraAnalyzerApp::new(config);
            if let Some(path) = initial_file {
                app.state.open_file(&path);
            }
            Ok(Box::new(app))
        }),
    )
}
