use std::f64::consts::TAU;

use eframe::egui::{self, Align2, Color32, FontId, Pos2, Sense, Stroke, Ui, vec2};

use super::super::LiveView;
use super::super::render_utils::{
    DEVICE_EDGE_COLOR, HUB_EDGE_COLOR, SELECTED_COLOR, blend_color, circle_visible, device_color,
    dim_color, draw_background, edge_visible, hub_color, with_alpha, world_to_screen,
};
use super::{EdgeKind, NodeKind};

const PACKET_RADIUS: f32 = 5.0;
const STREAMING_PULSE_PERIOD: f64 = 2.0;
const STREAMING_HALO_OFFSET: f32 = 8.0;
const STREAMING_HALO_RANGE: f32 = 10.0;

/// 0 at the start of a streaming run, 1 half a period later.
pub(in crate::app) fn streaming_pulse(now: f64, since: Option<f64>) -> f32 {
    let elapsed = (now - since.unwrap_or(now)).max(0.0);
    let phase = (elapsed % STREAMING_PULSE_PERIOD) / STREAMING_PULSE_PERIOD * TAU;
    ((1.0 - phase.cos()) * 0.5) as f32
}

impl LiveView {
    pub(in crate::app) fn draw_graph(&mut self, ui: &mut Ui, now: f64) {
        let (rect, response) = ui.allocate_exact_size(ui.available_size(), Sense::click_and_drag());
        let painter = ui.painter_at(rect);
        if rect.width() > 1.0 && rect.height() > 1.0 {
            self.bounds = rect.size();
        }

        draw_background(&painter, rect, self.pan, self.zoom);

        self.handle_graph_zoom(ui, rect, &response);
        self.handle_graph_pan(&response);
        self.tick(now);

        if self.graph.is_empty() {
            painter.text(
                rect.center(),
                Align2::CENTER_CENTER,
                "No hubs or devices yet",
                FontId::proportional(15.0),
                Color32::from_gray(170),
            );
            return;
        }

        let (pan, zoom) = (self.pan, self.zoom);
        let screen_positions = self
            .graph
            .nodes
            .iter()
            .map(|node| world_to_screen(rect, pan, zoom, node.pos))
            .collect::<Vec<Pos2>>();
        let screen_radii = self
            .graph
            .nodes
            .iter()
            .map(|node| (node.radius * zoom).clamp(3.0, 64.0))
            .collect::<Vec<f32>>();

        let hovered = Self::hovered_index(ui, rect, &screen_positions, &screen_radii);
        if hovered.is_some() {
            ui.output_mut(|output| {
                output.cursor_icon = egui::CursorIcon::PointingHand;
            });
        }

        let selected_index = self
            .selected
            .as_deref()
            .and_then(|id| self.graph.index_of(id));
        let zoom_sqrt = zoom.sqrt();

        for edge in &self.graph.edges {
            let (Some(&start), Some(&end)) = (
                screen_positions.get(edge.source),
                screen_positions.get(edge.target),
            ) else {
                continue;
            };
            if !edge_visible(rect, start, end, 4.0) {
                continue;
            }

            let strength = self
                .graph
                .edge_key(edge)
                .map(|key| self.overlay.highlight(&key))
                .unwrap_or(0.0)
                .clamp(0.0, 1.0);
            let (base, alpha) = match edge.kind {
                EdgeKind::Hub => (HUB_EDGE_COLOR, 0.5 + strength * 0.45),
                EdgeKind::Device => (DEVICE_EDGE_COLOR, 0.45 + strength * 0.5),
            };
            let mut color = with_alpha(base, alpha);
            if let Some(selected) = selected_index
                && edge.source != selected
                && edge.target != selected
                && strength <= 0.0
            {
                color = dim_color(color, 0.55);
            }

            let width = (1.4 + strength * 2.4) * zoom_sqrt;
            painter.line_segment([start, end], Stroke::new(width, color));
        }

        for animation in self.overlay.animations() {
            let (Some(source), Some(target)) = (
                self.graph.index_of(&animation.source_id),
                self.graph.index_of(&animation.target_id),
            ) else {
                continue;
            };
            let start = screen_positions[source];
            let end = screen_positions[target];
            let position = start + (end - start) * animation.progress.clamp(0.0, 1.0);
            let radius = PACKET_RADIUS * zoom_sqrt;
            if !circle_visible(rect, position, radius) {
                continue;
            }

            painter.circle_filled(position, radius, animation.color);
            painter.circle_stroke(
                position,
                radius,
                Stroke::new(1.0, Color32::from_rgba_unmultiplied(255, 255, 255, 128)),
            );
        }

        let mut selection_animating = false;
        for (index, node) in self.graph.nodes.iter().enumerate() {
            let is_hovered = hovered == Some(index);
            let is_selected = selected_index == Some(index);
            let radius = screen_radii[index]
                + if is_hovered { 4.0 } else { 0.0 }
                + if is_selected { 2.0 } else { 0.0 };
            let position = screen_positions[index];
            let halo_room = STREAMING_HALO_OFFSET + STREAMING_HALO_RANGE + 4.0;
            if !circle_visible(rect, position, radius + halo_room) {
                continue;
            }

            if node.kind == NodeKind::Device && node.streaming {
                let pulse = streaming_pulse(now, node.streaming_since);
                painter.circle_stroke(
                    position,
                    radius + STREAMING_HALO_OFFSET + pulse * STREAMING_HALO_RANGE,
                    Stroke::new(
                        2.0 + pulse * 2.0,
                        with_alpha(Color32::WHITE, 0.18 + pulse * 0.22),
                    ),
                );
            }

            let base = match node.kind {
                NodeKind::Hub => hub_color(node.empty_hub),
                NodeKind::Device => device_color(),
            };
            let selection_mix = ui.ctx().animate_bool(
                ui.make_persistent_id(("node-selection", node.id.as_str())),
                is_selected,
            );
            if selection_mix > 0.0 && selection_mix < 1.0 {
                selection_animating = true;
            }

            let fill = blend_color(base, SELECTED_COLOR, selection_mix * 0.55);
            painter.circle_filled(position, radius, fill);
            painter.circle_filled(
                position,
                radius * 0.45,
                with_alpha(Color32::WHITE, if node.empty_hub { 0.35 } else { 0.6 }),
            );
            if selection_mix > 0.0 {
                painter.circle_stroke(
                    position,
                    radius + 3.0 + ((1.0 - selection_mix) * 6.0),
                    Stroke::new(1.0 + selection_mix * 1.2, with_alpha(SELECTED_COLOR, 0.8)),
                );
            }

            let label_alpha = match node.kind {
                NodeKind::Hub if node.empty_hub => 0.45,
                NodeKind::Hub => 0.85,
                NodeKind::Device => 0.8,
            };
            painter.text(
                position - vec2(0.0, radius + 12.0),
                Align2::CENTER_CENTER,
                &node.label,
                FontId::proportional(12.0),
                with_alpha(Color32::WHITE, label_alpha),
            );
        }

        if selection_animating {
            ui.ctx().request_repaint();
        }

        if let Some(node) = hovered.and_then(|index| self.graph.nodes.get(index)) {
            let mut summary = format!("{}  |  {}  |  {}", node.label, node.kind.label(), node.id);
            if node.streaming {
                summary.push_str("  |  replying");
            }
            painter.text(
                rect.left_top() + vec2(10.0, 10.0),
                Align2::LEFT_TOP,
                summary,
                FontId::proportional(13.0),
                Color32::from_gray(240),
            );
        }

        if response.clicked_by(egui::PointerButton::Primary) {
            let picked = hovered
                .and_then(|index| self.graph.nodes.get(index))
                .map(|node| node.id.clone());
            self.set_selected(picked);
        }
        if response.double_clicked() && hovered.is_none() {
            self.reset_view();
        }
    }
}
