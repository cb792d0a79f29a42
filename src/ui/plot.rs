use std::sync::Arc;

use eframe::egui::{self, ScrollArea, Ui};

use crate::state::AppState;

// ---------------------------------------------------------------------------
// Analysis view (central panel)
// ---------------------------------------------------------------------------

fn png(ui: &mut Ui, uri: String, bytes: &Arc<[u8]>) {
    ui.add(egui::Image::from_bytes(uri, Arc::clone(bytes)).max_width(ui.available_width()));
}

/// Render the three views of the analyzed spectrum.
pub fn analysis_view(ui: &mut Ui, state: &AppState) {
    let images = match &state.images {
        Some(images) => images,
        None => {
            ui.centered_and_justified(|ui: &mut Ui| {
                ui.heading("Open a spectrum to analyze  (File → Open…)");
            });
            return;
        }
    };

    ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui: &mut Ui| {
            ui.strong("Spectrum");
            png(ui, state.image_uri("spectrum"), &images.spectrum);
            ui.separator();

            ui.strong("Wavelet transform |W| (scale ↓, sample →)");
            png(ui, state.image_uri("transform"), &images.transform);
            ui.separator();

            ui.strong("Reconstruction");
            png(ui, state.image_uri("reconstruction"), &images.reconstruction);
        });
}
