use eframe::egui::{self, Align, Color32, Context, Layout, RichText};

use super::super::graph::NodeKind;
use super::super::{LiveView, StatusKind};

fn status_color(kind: StatusKind) -> Color32 {
    match kind {
        StatusKind::Idle => Color32::from_gray(210),
        StatusKind::Loading => Color32::from_rgb(246, 206, 104),
        StatusKind::Error => Color32::from_rgb(241, 110, 94),
    }
}

impl LiveView {
    /// Draws one frame. Returns `true` when the user asked for a reload.
    pub(in crate::app) fn show(&mut self, ctx: &Context, now: f64) -> bool {
        let mut refresh_requested = false;

        egui::TopBottomPanel::top("top_bar")
            .resizable(false)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.heading("hubscope");
                    ui.separator();
                    ui.label(format!("api: {}", self.endpoint_label));
                    let (hubs, devices) = self.node_counts();
                    ui.label(format!("hubs: {hubs}"));
                    ui.label(format!("devices: {devices}"));
                    ui.label(format!("links: {}", self.graph.edges.len()));

                    let refresh_button =
                        ui.add_enabled(!self.refreshing, egui::Button::new("Refresh"));
                    if refresh_button.clicked() {
                        refresh_requested = true;
                    }
                    ui.checkbox(&mut self.live_physics, "Live physics");
                    if ui.button("Reset view").clicked() {
                        self.reset_view();
                    }

                    ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                        ui.label(
                            RichText::new(self.status.text.as_str())
                                .color(status_color(self.status.kind)),
                        );
                        ui.separator();
                        ui.label(format!("updates: {}", self.state_stream_label()));
                        if !self.overlay.is_empty() {
                            ui.separator();
                            ui.label(format!("packets in flight: {}", self.overlay.len()));
                        }
                    });
                });
            });

        egui::SidePanel::right("details")
            .resizable(true)
            .default_width(380.0)
            .show(ctx, |ui| self.draw_details(ui));

        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| self.draw_graph(ui, now));

        if refresh_requested {
            self.begin_refresh();
        }
        refresh_requested
    }

    fn node_counts(&self) -> (usize, usize) {
        self.graph
            .nodes
            .iter()
            .fold((0, 0), |(hubs, devices), node| match node.kind {
                NodeKind::Hub => (hubs + 1, devices),
                NodeKind::Device => (hubs, devices + 1),
            })
    }

    fn state_stream_label(&self) -> &'static str {
        if self.live_updates {
            self.streams.state_status().label()
        } else {
            "off"
        }
    }
}
