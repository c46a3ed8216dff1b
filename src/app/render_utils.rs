use eframe::egui::{Color32, Painter, Pos2, Rect, Stroke, Vec2};

pub(super) const HUB_EDGE_COLOR: Color32 = Color32::from_rgb(88, 213, 255);
pub(super) const DEVICE_EDGE_COLOR: Color32 = Color32::from_rgb(255, 110, 199);
pub(super) const SELECTED_COLOR: Color32 = Color32::from_rgb(245, 206, 93);

pub(super) fn hub_color(empty: bool) -> Color32 {
    Color32::from_rgba_unmultiplied(88, 213, 255, if empty { 102 } else { 242 })
}

pub(super) fn device_color() -> Color32 {
    Color32::from_rgba_unmultiplied(255, 110, 199, 242)
}

/// Pulse colour by packet type, case-insensitive.
pub(super) fn packet_color(packet_type: &str) -> Color32 {
    let [r, g, b, a] = match packet_type.to_ascii_uppercase().as_str() {
        "TALK" => [102, 217, 239, 224],
        "WHISPER" => [174, 129, 255, 224],
        "TEXT" => [133, 255, 214, 230],
        "PING" => [255, 196, 92, 230],
        "JOIN" => [124, 255, 164, 224],
        "LEAVE" => [255, 140, 140, 224],
        _ => [255, 255, 255, 199],
    };
    Color32::from_rgba_unmultiplied(r, g, b, a)
}

pub(super) fn blend_color(base: Color32, overlay: Color32, amount: f32) -> Color32 {
    let amount = amount.clamp(0.0, 1.0);
    let inverse = 1.0 - amount;

    Color32::from_rgba_unmultiplied(
        ((base.r() as f32 * inverse) + (overlay.r() as f32 * amount)) as u8,
        ((base.g() as f32 * inverse) + (overlay.g() as f32 * amount)) as u8,
        ((base.b() as f32 * inverse) + (overlay.b() as f32 * amount)) as u8,
        ((base.a() as f32 * inverse) + (overlay.a() as f32 * amount)) as u8,
    )
}

pub(super) fn with_alpha(color: Color32, alpha: f32) -> Color32 {
    let [r, g, b, _] = color.to_srgba_unmultiplied();
    Color32::from_rgba_unmultiplied(r, g, b, (alpha.clamp(0.0, 1.0) * 255.0) as u8)
}

pub(super) fn dim_color(color: Color32, factor: f32) -> Color32 {
    let factor = factor.clamp(0.0, 1.0);
    Color32::from_rgba_unmultiplied(
        (color.r() as f32 * factor) as u8,
        (color.g() as f32 * factor) as u8,
        (color.b() as f32 * factor) as u8,
        (color.a() as f32 * (0.45 + (factor * 0.55))) as u8,
    )
}

pub(super) fn draw_background(painter: &Painter, rect: Rect, pan: Vec2, zoom: f32) {
    painter.rect_filled(rect, 0.0, Color32::from_rgb(12, 16, 24));

    let step = (56.0 * zoom.clamp(0.6, 1.8)).max(20.0);
    let origin = rect.center() + pan;
    let stroke = Stroke::new(1.0, Color32::from_rgba_unmultiplied(60, 70, 90, 60));

    let mut x = rect.left() + (origin.x - rect.left()).rem_euclid(step);
    while x < rect.right() {
        painter.line_segment([Pos2::new(x, rect.top()), Pos2::new(x, rect.bottom())], stroke);
        x += step;
    }

    let mut y = rect.top() + (origin.y - rect.top()).rem_euclid(step);
    while y < rect.bottom() {
        painter.line_segment([Pos2::new(rect.left(), y), Pos2::new(rect.right(), y)], stroke);
        y += step;
    }
}

pub(super) fn circle_visible(rect: Rect, position: Pos2, radius: f32) -> bool {
    !(position.x + radius < rect.left()
        || position.x - radius > rect.right()
        || position.y + radius < rect.top()
        || position.y - radius > rect.bottom())
}

pub(super) fn edge_visible(rect: Rect, start: Pos2, end: Pos2, padding: f32) -> bool {
    let min_x = start.x.min(end.x) - padding;
    let max_x = start.x.max(end.x) + padding;
    let min_y = start.y.min(end.y) - padding;
    let max_y = start.y.max(end.y) + padding;

    !(max_x < rect.left() || min_x > rect.right() || max_y < rect.top() || min_y > rect.bottom())
}

/// World space spans `[0, rect.size()]`; at zoom 1 with no pan it lines up
/// with the canvas.
pub(super) fn world_to_screen(rect: Rect, pan: Vec2, zoom: f32, world: Vec2) -> Pos2 {
    rect.center() + pan + (world - rect.size() * 0.5) * zoom
}

pub(super) fn screen_to_world(rect: Rect, pan: Vec2, zoom: f32, screen: Pos2) -> Vec2 {
    (screen - rect.center() - pan) / zoom + rect.size() * 0.5
}
