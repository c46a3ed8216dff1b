use eframe::egui::{self, Pos2, Rect, Ui};

use super::super::LiveView;
use super::super::render_utils::{circle_visible, screen_to_world};

/// Extra pick radius so small devices stay clickable when zoomed out.
const HIT_SLOP: f32 = 4.0;

impl LiveView {
    pub(in crate::app) fn handle_graph_zoom(
        &mut self,
        ui: &Ui,
        rect: Rect,
        response: &egui::Response,
    ) {
        if !response.hovered() {
            return;
        }

        let scroll = ui.input(|input| input.raw_scroll_delta.y);
        if scroll.abs() <= f32::EPSILON {
            return;
        }

        let pointer = ui
            .input(|input| input.pointer.hover_pos())
            .unwrap_or_else(|| rect.center());
        let world_before = screen_to_world(rect, self.pan, self.zoom, pointer);

        let zoom_factor = (1.0 + (scroll * 0.0018)).clamp(0.85, 1.15);
        self.zoom = (self.zoom * zoom_factor).clamp(0.2, 4.0);
        self.pan = pointer - rect.center() - ((world_before - rect.size() * 0.5) * self.zoom);
    }

    pub(in crate::app) fn handle_graph_pan(&mut self, response: &egui::Response) {
        if response.dragged_by(egui::PointerButton::Primary)
            || response.dragged_by(egui::PointerButton::Secondary)
            || response.dragged_by(egui::PointerButton::Middle)
        {
            self.pan += response.drag_delta();
        }
    }

    pub(in crate::app) fn reset_view(&mut self) {
        self.pan = egui::Vec2::ZERO;
        self.zoom = 1.0;
    }

    /// Closest node under the pointer, ignoring nodes outside `rect`.
    pub(in crate::app) fn hovered_index(
        ui: &Ui,
        rect: Rect,
        screen_positions: &[Pos2],
        screen_radii: &[f32],
    ) -> Option<usize> {
        let pointer = ui.input(|input| input.pointer.hover_pos())?;
        if !rect.contains(pointer) {
            return None;
        }
        pick_node(pointer, rect, screen_positions, screen_radii)
    }
}

fn pick_node(pointer: Pos2, rect: Rect, positions: &[Pos2], radii: &[f32]) -> Option<usize> {
    positions
        .iter()
        .zip(radii)
        .enumerate()
        .filter(|(_, (position, radius))| circle_visible(rect, **position, **radius))
        .filter_map(|(index, (position, radius))| {
            let distance = position.distance(pointer);
            (distance <= radius + HIT_SLOP).then_some((index, distance))
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(index, _)| index)
}
