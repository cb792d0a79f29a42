use eframe::egui;
use spectra_analyzer::config::AnalyzerConfig;

use crate::state::AppState;
use crate::ui::{panels, plot};

// ---------------------------------------------------------------------------
// eframe App implementation
// ---------------------------------------------------------------------------

pub struct SpectraAnalyzerApp {
    pub state: AppState,
}

impl SpectraAnalyzerApp {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            state: AppState::new(config),
        }
    }
}

impl eframe::App for SpectraAnalyzerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        for uri in self.state.stale_uris.drain(..) {
            ctx.forget_image(&uri);
        }

        // ---- Top panel: menu bar ----
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            panels::top_bar(ui, &mut self.state);
        });

        // ---- Left side panel: window controls ----
        egui::SidePanel::left("window_panel")
            .default_width(240.0)
            .resizable(true)
            .show(ctx, |ui| {
                panels::side_panel(ui, &mut self.state);
            });

        // ---- Central panel: renders ----
        egui::CentralPanel::default().show(ctx, |ui| {
            plot::analysis_view(ui, &self.state);
        });
    }
}
