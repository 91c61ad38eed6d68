use std::collections::HashSet;

use eframe::egui::epaint::QuadraticBezierShape;
use eframe::egui::{self, Align2, Color32, FontId, Pos2, Sense, Shape, Stroke, Ui, vec2};
use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;

use flowmap::geometry::{LinkPath, link_geometries};
use flowmap::util::{format_usd, short_address};

use super::super::ViewModel;
use super::super::render_utils::{
    MAIN_COLOR, SHARED_COLOR, blend_color, dim_color, draw_background, flow_color, flow_width,
    path_visible, world_to_screen,
};

fn fuzzy_match_score(matcher: &SkimMatcherV2, text: &str, query: &str) -> Option<i64> {
    matcher
        .fuzzy_match(text, query)
        .or_else(|| matcher.fuzzy_match(&text.to_ascii_lowercase(), &query.to_ascii_lowercase()))
}

impl ViewModel {
    fn search_matches(&self) -> Option<HashSet<String>> {
        let query = self.search.trim();
        if query.is_empty() {
            return None;
        }

        let matcher = SkimMatcherV2::default();
        let matches = self
            .session
            .graph()
            .nodes
            .iter()
            .filter(|node| {
                fuzzy_match_score(&matcher, &node.id, query).is_some()
                    || node
                        .label
                        .as_deref()
                        .is_some_and(|label| fuzzy_match_score(&matcher, label, query).is_some())
            })
            .map(|node| node.id.clone())
            .collect();
        Some(matches)
    }

    pub(in crate::app) fn draw_graph(&mut self, ui: &mut Ui) {
        self.session.poll();

        let (rect, response) = ui.allocate_exact_size(ui.available_size(), Sense::click_and_drag());
        let painter = ui.painter_at(rect);
        draw_background(&painter, rect, self.pan, self.zoom);

        self.handle_graph_zoom(ui, rect, &response);

        if self.session.graph().is_empty() {
            ui.label("No counterparties matched the current filters.");
            return;
        }

        let moving = self.live_physics && !self.session.simulation().is_settled();
        if moving {
            self.session.tick();
        }
        if moving || self.session.expansions().has_in_flight() || response.dragged() {
            ui.ctx().request_repaint();
        }

        let pan = self.pan;
        let zoom = self.zoom;
        let simulation = self.session.simulation();
        let nodes = simulation.nodes();
        let screen_positions = nodes
            .iter()
            .map(|node| world_to_screen(rect, pan, zoom, node.position))
            .collect::<Vec<_>>();
        let screen_radii = nodes
            .iter()
            .map(|node| (node.radius * zoom).max(2.0))
            .collect::<Vec<_>>();
        let visible = Self::visible_indices(rect, &screen_positions, &screen_radii);
        let hovered = Self::hovered_index(ui, &visible, &screen_positions, &screen_radii);
        let hovered_id = hovered.map(|index| nodes[index].id.clone());
        self.visible_node_count = visible.len();

        let matches = self.search_matches();
        let search_active = matches.as_ref().is_some_and(|found| !found.is_empty());
        let selected = self.selected.as_deref();
        let neighbours = selected
            .map(|id| {
                self.session
                    .links()
                    .iter()
                    .filter_map(|link| {
                        if link.source() == id {
                            Some(link.target().to_owned())
                        } else if link.target() == id {
                            Some(link.source().to_owned())
                        } else {
                            None
                        }
                    })
                    .collect::<HashSet<_>>()
            })
            .unwrap_or_default();

        let config = simulation.config();
        let to_screen = |point| world_to_screen(rect, pan, zoom, point);
        let mut visible_link_count = 0usize;
        for (sim_link, geometry) in simulation
            .links()
            .iter()
            .zip(link_geometries(nodes, simulation.links(), config))
        {
            let Some(geometry) = geometry else {
                continue;
            };
            let Some(link) = self.session.links().get(sim_link.origin) else {
                continue;
            };

            let touches_selection =
                selected.is_some_and(|id| link.source() == id || link.target() == id);
            let base = flow_color(link.value());
            let color = if touches_selection {
                base
            } else if selected.is_some() || search_active {
                dim_color(base, 0.4)
            } else {
                Color32::from_rgba_unmultiplied(base.r(), base.g(), base.b(), 170)
            };
            let stroke = Stroke::new(flow_width(link.value(), zoom), color);

            match geometry.path {
                LinkPath::Line { from, to } => {
                    let points = [to_screen(from), to_screen(to)];
                    if !path_visible(rect, &points, 4.0) {
                        continue;
                    }
                    painter.line_segment(points, stroke);
                }
                LinkPath::Quadratic { from, control, to } => {
                    let points = [to_screen(from), to_screen(control), to_screen(to)];
                    if !path_visible(rect, &points, 4.0) {
                        continue;
                    }
                    painter.add(QuadraticBezierShape::from_points_stroke(
                        points,
                        false,
                        Color32::TRANSPARENT,
                        stroke,
                    ));
                }
            }

            if let Some(arrow) = geometry.arrow {
                painter.add(Shape::convex_polygon(
                    vec![to_screen(arrow.left), to_screen(arrow.tip), to_screen(arrow.right)],
                    color,
                    Stroke::NONE,
                ));
            }
            visible_link_count += 1;
        }
        self.visible_link_count = visible_link_count;

        let graph = self.session.graph();
        for &index in &visible {
            let sim_node = &nodes[index];
            let Some(node) = graph.node(&sim_node.id) else {
                continue;
            };
            let position: Pos2 = screen_positions[index];
            let radius = screen_radii[index];

            let is_selected = selected == Some(node.id.as_str());
            let is_hovered = hovered == Some(index);
            let is_match = matches
                .as_ref()
                .is_some_and(|found| found.contains(&node.id));
            let related = is_selected || neighbours.contains(&node.id);

            let base = if node.is_main {
                MAIN_COLOR
            } else {
                flow_color(node.net_usd_flow)
            };
            let base = match self.session.highlight(&node.id) {
                Some([r, g, b]) => Color32::from_rgb(r, g, b),
                None => base,
            };
            let fill = if is_hovered {
                blend_color(base, Color32::WHITE, 0.3)
            } else if is_match {
                blend_color(base, Color32::from_rgb(103, 196, 255), 0.6)
            } else if (selected.is_some() && !related) || (search_active && !is_match) {
                dim_color(base, 0.45)
            } else {
                base
            };

            painter.circle_filled(position, radius, fill);
            let outline = if is_selected {
                Stroke::new(2.6, Color32::from_rgb(245, 245, 245))
            } else if node.highlight_shared() {
                Stroke::new(2.0, SHARED_COLOR)
            } else {
                Stroke::new(1.0, Color32::from_rgba_unmultiplied(15, 15, 15, 190))
            };
            painter.circle_stroke(position, radius, outline);
            if sim_node.locked {
                painter.circle_stroke(
                    position,
                    radius + 3.0,
                    Stroke::new(1.0, Color32::from_gray(200)),
                );
            }

            let draw_label = node.is_main || is_selected || is_hovered || is_match || zoom > 1.2;
            if draw_label {
                let text = node
                    .label
                    .clone()
                    .unwrap_or_else(|| short_address(&node.id));
                painter.text(
                    position + vec2(radius + 5.0, 0.0),
                    Align2::LEFT_CENTER,
                    text,
                    FontId::proportional(12.0),
                    Color32::from_gray(238),
                );
            }
        }

        if let Some(node) = hovered_id.as_deref().and_then(|id| graph.node(id)) {
            let summary = format!(
                "{}  |  net {}  |  in {}  |  out {}",
                node.label.clone().unwrap_or_else(|| short_address(&node.id)),
                format_usd(node.net_usd_flow),
                format_usd(node.volume_in),
                format_usd(node.volume_out),
            );
            painter.text(
                rect.left_top() + vec2(10.0, 10.0),
                Align2::LEFT_TOP,
                summary,
                FontId::proportional(13.0),
                Color32::from_gray(240),
            );
        }

        if hovered_id.is_some() {
            ui.output_mut(|output| output.cursor_icon = egui::CursorIcon::PointingHand);
        }

        self.handle_node_drag(rect, &response, hovered_id.as_deref());
        self.handle_graph_pan(&response);

        if response.clicked_by(egui::PointerButton::Primary) {
            self.set_selected(hovered_id);
        }
    }
}
