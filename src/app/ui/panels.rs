use eframe::egui::{self, Align, Context, Layout, Vec2};

use flowmap::session::FlowSession;

use super::super::{LoadRequest, ViewModel};

impl ViewModel {
    pub(in crate::app) fn new(session: FlowSession) -> Self {
        let sizing = session.sizing();
        let usd_range = session.filter().usd_range;

        Self {
            session,
            search: String::new(),
            selected: None,
            pan: Vec2::ZERO,
            zoom: 0.8,
            live_physics: true,
            size_damping: sizing.damping,
            usd_range_enabled: usd_range.is_some(),
            usd_range: usd_range.unwrap_or((0.0, 1_000_000.0)),
            new_wallet: String::new(),
            label_draft: String::new(),
            status: None,
            dragging: None,
            visible_node_count: 0,
            visible_link_count: 0,
        }
    }

    pub(in crate::app) fn show(
        &mut self,
        ctx: &Context,
        request: &LoadRequest,
        reload_requested: &mut bool,
    ) {
        egui::TopBottomPanel::top("top_bar")
            .resizable(false)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.heading("flowmap");
                    ui.separator();
                    ui.label(format!("dataset: {}", request.dataset.display()));
                    ui.label(format!("timeframe: {}", self.session.timeframe().label()));
                    ui.label(format!("wallets: {}", self.session.wallets().count()));
                    ui.label(format!("nodes: {}", self.session.graph().node_count()));
                    ui.label(format!("links: {}", self.session.links().len()));
                    if ui.button("Reload dataset").clicked() {
                        *reload_requested = true;
                    }
                    ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                        ui.label(format!(
                            "visible {} nodes / {} links",
                            self.visible_node_count, self.visible_link_count
                        ));
                        if let Some(status) = &self.status {
                            ui.label(status.as_str());
                        }
                    });
                });
            });

        egui::SidePanel::left("controls")
            .resizable(true)
            .default_width(320.0)
            .show(ctx, |ui| self.draw_controls(ui));

        egui::SidePanel::right("details")
            .resizable(true)
            .default_width(340.0)
            .show(ctx, |ui| self.draw_details(ui));

        egui::CentralPanel::default().show(ctx, |ui| self.draw_graph(ui));
    }

    pub(in crate::app) fn set_selected(&mut self, selected: Option<String>) {
        if self.selected == selected {
            return;
        }

        self.label_draft = selected
            .as_deref()
            .and_then(|id| self.session.graph().node(id))
            .and_then(|node| node.label.clone())
            .unwrap_or_default();
        self.selected = selected;
    }
}
