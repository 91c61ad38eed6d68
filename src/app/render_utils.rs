use eframe::egui::{Color32, Painter, Pos2, Rect, Stroke, Vec2};

pub(super) const MAIN_COLOR: Color32 = Color32::from_rgb(92, 132, 240);
pub(super) const INFLOW_COLOR: Color32 = Color32::from_rgb(76, 186, 120);
pub(super) const OUTFLOW_COLOR: Color32 = Color32::from_rgb(226, 92, 86);
pub(super) const SHARED_COLOR: Color32 = Color32::from_rgb(245, 206, 93);

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

pub(super) fn dim_color(color: Color32, factor: f32) -> Color32 {
    let factor = factor.clamp(0.0, 1.0);
    Color32::from_rgba_unmultiplied(
        (color.r() as f32 * factor) as u8,
        (color.g() as f32 * factor) as u8,
        (color.b() as f32 * factor) as u8,
        (color.a() as f32 * (0.45 + (factor * 0.55))) as u8,
    )
}

pub(super) fn flow_color(value: f64) -> Color32 {
    if value > 0.0 {
        INFLOW_COLOR
    } else if value < 0.0 {
        OUTFLOW_COLOR
    } else {
        Color32::from_gray(150)
    }
}

pub(super) fn flow_width(value: f64, zoom: f32) -> f32 {
    let magnitude = value.abs().ln_1p() as f32;
    ((0.6 + magnitude * 0.22) * zoom.sqrt()).clamp(0.5, 7.0)
}

pub(super) fn draw_background(painter: &Painter, rect: Rect, pan: Vec2, zoom: f32) {
    painter.rect_filled(rect, 0.0, Color32::from_rgb(19, 23, 29));

    let step = (56.0 * zoom.clamp(0.6, 1.8)).max(20.0);
    let origin = rect.center() + pan;
    let stroke = Stroke::new(1.0, Color32::from_rgba_unmultiplied(60, 70, 80, 70));

    let mut x = origin.x.rem_euclid(step);
    while x < rect.right() {
        painter.line_segment([Pos2::new(x, rect.top()), Pos2::new(x, rect.bottom())], stroke);
        x += step;
    }

    let mut y = origin.y.rem_euclid(step);
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

pub(super) fn path_visible(rect: Rect, points: &[Pos2], padding: f32) -> bool {
    let Some(first) = points.first() else {
        return false;
    };
    let mut bounds = Rect::from_min_max(*first, *first);
    for point in &points[1..] {
        bounds.extend_with(*point);
    }
    bounds.expand(padding).intersects(rect)
}

pub(super) fn world_to_screen(rect: Rect, pan: Vec2, zoom: f32, world: Vec2) -> Pos2 {
    rect.center() + pan + world * zoom
}

pub(super) fn screen_to_world(rect: Rect, pan: Vec2, zoom: f32, screen: Pos2) -> Vec2 {
    (screen - rect.center() - pan) / zoom
}
