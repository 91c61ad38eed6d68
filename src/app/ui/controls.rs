use eframe::egui::{self, RichText, Ui};

use flowmap::flow::{FlowFilter, SizeMetric, Timeframe};
use flowmap::util::short_address;

use super::super::ViewModel;

impl ViewModel {
    pub(in crate::app) fn draw_controls(&mut self, ui: &mut Ui) {
        egui::ScrollArea::vertical().show(ui, |ui| {
            ui.heading("Controls");
            ui.add_space(6.0);

            ui.label("Search address or label");
            ui.text_edit_singleline(&mut self.search);

            ui.separator();
            self.draw_timeframe_controls(ui);

            ui.separator();
            self.draw_sizing_controls(ui);

            ui.separator();
            self.draw_filter_controls(ui);

            ui.separator();
            ui.checkbox(&mut self.live_physics, "Live layout");
            let simulation = self.session.simulation();
            ui.small(format!(
                "alpha {:.3}  |  energy {:.1}",
                simulation.alpha(),
                simulation.kinetic_energy()
            ));

            ui.separator();
            self.draw_wallet_controls(ui);
        });
    }

    fn draw_timeframe_controls(&mut self, ui: &mut Ui) {
        let current = self.session.timeframe();
        let mut timeframe = current;
        egui::ComboBox::from_label("Timeframe")
            .selected_text(timeframe.label())
            .show_ui(ui, |ui| {
                for option in Timeframe::ALL {
                    ui.selectable_value(&mut timeframe, option, option.label());
                }
            });
        if timeframe != current {
            self.session.set_timeframe(timeframe);
            self.status = Some(format!("Timeframe set to {}", timeframe.label()));
        }
    }

    fn draw_sizing_controls(&mut self, ui: &mut Ui) {
        ui.label(RichText::new("Node size").strong());
        let mut metric = self.session.sizing().metric;
        egui::ComboBox::from_id_salt("size_metric")
            .selected_text(metric.label())
            .show_ui(ui, |ui| {
                for option in SizeMetric::ALL {
                    ui.selectable_value(&mut metric, option, option.label());
                }
            });
        if metric != self.session.sizing().metric {
            self.session.set_size_metric(metric);
        }

        let response = ui.add(
            egui::Slider::new(&mut self.size_damping, 0.0..=4.0).text("Size damping"),
        );
        if response.changed() {
            self.session.set_size_damping(self.size_damping);
        }
    }

    fn draw_filter_controls(&mut self, ui: &mut Ui) {
        ui.label(RichText::new("Filters").strong());
        let mut filter = self.session.filter().clone();

        ui.checkbox(&mut filter.show_smart_contracts, "Show smart contracts");
        ui.checkbox(&mut filter.show_exchanges, "Show exchanges");
        ui.horizontal(|ui| {
            ui.label("Min volume (USD)");
            ui.add(
                egui::DragValue::new(&mut filter.min_total_volume)
                    .speed(50.0)
                    .range(0.0..=f64::MAX),
            );
        });

        ui.checkbox(&mut self.usd_range_enabled, "Limit |net flow|");
        ui.add_enabled_ui(self.usd_range_enabled, |ui| {
            ui.horizontal(|ui| {
                ui.add(
                    egui::DragValue::new(&mut self.usd_range.0)
                        .speed(50.0)
                        .range(0.0..=self.usd_range.1)
                        .prefix("$"),
                );
                ui.label("to");
                ui.add(
                    egui::DragValue::new(&mut self.usd_range.1)
                        .speed(50.0)
                        .range(self.usd_range.0..=f64::MAX)
                        .prefix("$"),
                );
            });
        });
        filter.usd_range = self.usd_range_enabled.then_some(self.usd_range);

        if ui.button("Reset filters").clicked() {
            filter = FlowFilter::default();
            self.usd_range_enabled = false;
        }
        self.session.set_filter(filter);
    }

    fn draw_wallet_controls(&mut self, ui: &mut Ui) {
        ui.label(RichText::new("Main wallets").strong());

        let wallets = self.session.wallets().map(str::to_owned).collect::<Vec<_>>();
        let mut clicked = None;
        let mut removed = None;
        for wallet in wallets {
            ui.horizontal(|ui| {
                let is_selected = self.selected.as_deref() == Some(wallet.as_str());
                if ui
                    .selectable_label(is_selected, short_address(&wallet))
                    .on_hover_text(wallet.as_str())
                    .clicked()
                {
                    clicked = Some(wallet.clone());
                }
                if ui.small_button("Remove").clicked() {
                    removed = Some(wallet.clone());
                }
            });
        }
        if clicked.is_some() {
            self.set_selected(clicked);
        }
        if let Some(wallet) = removed {
            self.session.remove_wallet(&wallet);
            if self.selected.as_deref() == Some(wallet.as_str()) {
                self.set_selected(None);
            }
        }

        ui.horizontal(|ui| {
            ui.text_edit_singleline(&mut self.new_wallet);
            if ui.button("Add").clicked() {
                let address = self.new_wallet.trim().to_owned();
                self.status = Some(match self.session.add_wallet(&address) {
                    Ok(count) => {
                        self.new_wallet.clear();
                        format!("Added {} ({count} counterparties)", short_address(&address))
                    }
                    Err(error) => format!("Could not add {}: {error}", short_address(&address)),
                });
            }
        });

        let mut deleted = self.session.deleted().iter().cloned().collect::<Vec<_>>();
        if deleted.is_empty() {
            return;
        }
        deleted.sort();

        ui.add_space(6.0);
        ui.label(RichText::new("Deleted nodes").strong());
        for id in deleted {
            ui.horizontal(|ui| {
                ui.label(short_address(&id)).on_hover_text(id.as_str());
                if ui.small_button("Restore").clicked() {
                    self.session.restore_node(&id);
                }
            });
        }
    }
}
