use eframe::egui::{self, Color32, RichText, Ui};
use spectra_analyzer::data::loader::SUPPORTED_EXTENSIONS;

use crate::state::AppState;

// ---------------------------------------------------------------------------
// Left side panel – window controls
// ---------------------------------------------------------------------------

/// Render the left panel with the suppression window sliders.
pub fn side_panel(ui: &mut Ui, state: &mut AppState) {
    ui.heading("Window");
    ui.separator();

    let Some(spectrum) = state.spectrum() else {
        ui.label("No spectrum loaded.");
        return;
    };

    let scales = spectrum.scale_count() as i64;
    let last = (scales - 1).max(0);
    let mut freq0 = spectrum.freq0() as i64;
    let mut w_size = spectrum.w_size() as i64;
    ui.label(format!("{} samples, {scales} scales", spectrum.len()));
    ui.add_space(4.0);

    let freq0_changed = ui
        .add(egui::Slider::new(&mut freq0, 0..=last).text("Frequency shift"))
        .changed();
    let w_size_changed = ui
        .add(egui::Slider::new(&mut w_size, 0..=(last - freq0).max(0)).text("Window size"))
        .changed();
    if freq0_changed || w_size_changed {
        state.set_window(freq0, w_size);
    }

    ui.add_space(4.0);
    ui.label(format!(
        "Suppressed scale rows: {}..{}",
        freq0,
        freq0 + w_size.min((last - freq0).max(0))
    ));
    ui.separator();

    let mut overlay = state.overlay_original;
    if ui.checkbox(&mut overlay, "Overlay original").changed() {
        state.set_overlay(overlay);
    }
}

// ---------------------------------------------------------------------------
// Top bar
// ---------------------------------------------------------------------------

/// Render the top menu / toolbar.
pub fn top_bar(ui: &mut Ui, state: &mut AppState) {
    egui::menu::bar(ui, |ui: &mut Ui| {
        ui.menu_button("File", |ui: &mut Ui| {
            if ui.button("Open…").clicked() {
                open_file_dialog(state);
                ui.close_menu();
            }
            let has_spectrum = state.spectrum().is_some();
            if ui
                .add_enabled(has_spectrum, egui::Button::new("Export report…"))
                .clicked()
            {
                export_report_dialog(state);
                ui.close_menu();
            }
        });

        ui.separator();

        if let Some(name) = state.file_name() {
            ui.label(name.to_string());
        }

        if let Some(msg) = &state.status_message {
            ui.label(RichText::new(msg).color(Color32::RED));
        }
    });
}

// ---------------------------------------------------------------------------
// File dialogs
// ---------------------------------------------------------------------------

pub fn open_file_dialog(state: &mut AppState) {
    let mut dialog = rfd::FileDialog::new()
        .set_title("Open spectrum")
        .add_filter("Supported files", SUPPORTED_EXTENSIONS)
        .add_filter("FITS", &["fit", "fits"])
        .add_filter("VOTable", &["vot"])
        .add_filter("Text", &["asc", "csv", "txt"])
        .add_filter("Parquet", &["parquet", "pq"]);
    if let Some(dir) = &state.config.start_directory {
        dialog = dialog.set_directory(dir);
    }

    if let Some(path) = dialog.pick_file() {
        state.open_file(&path);
    }
}

pub fn export_report_dialog(state: &mut AppState) {
    let stem = state
        .file_name()
        .and_then(|n| n.rsplit_once('.').map(|(stem, _)| stem.to_string()))
        .unwrap_or_else(|| "spectrum".to_string());
    let file = rfd::FileDialog::new()
        .set_title("Export analysis report")
        .add_filter("JSON", &["json"])
        .set_file_name(format!("{stem}-report.json"))
        .save_file();

    if let Some(path) = file {
        if let Err(e) = state.export_report(&path) {
            log::error!("Failed to export report: {e:#}");
            state.status_message = Some(format!("Error: {e:#}"));
        }
    }
}
