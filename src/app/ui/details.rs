use eframe::egui::{self, Color32, RichText, Ui};

use flowmap::expansion::{ToggleRequest, infer_direction};
use flowmap::util::{format_usd, short_address};

use super::super::ViewModel;

impl ViewModel {
    pub(in crate::app) fn draw_details(&mut self, ui: &mut Ui) {
        ui.heading("Selection Details");
        ui.add_space(6.0);

        let Some(selected_id) = self.selected.clone() else {
            ui.label("Select a node in the graph or a wallet in the list.");
            return;
        };

        let Some(node) = self.session.graph().node(&selected_id).cloned() else {
            ui.label("Selected node is not part of the current graph.");
            return;
        };

        let title = node
            .label
            .clone()
            .unwrap_or_else(|| short_address(&node.id));
        ui.label(RichText::new(title).strong());
        ui.small(node.id.as_str());
        ui.add_space(6.0);

        ui.label(if node.is_main {
            "Main wallet"
        } else if node.highlight_shared() {
            "Shared counterparty"
        } else {
            "Counterparty"
        });
        if let Some(chain) = &node.chain {
            ui.label(format!("Chain: {chain}"));
        }
        if node.is_exchange {
            ui.label("Exchange");
        }
        if node.is_contract {
            ui.label("Smart contract");
        }
        ui.label(format!("Net flow: {}", format_usd(node.net_usd_flow)));
        ui.label(format!("Inflow: {}", format_usd(node.volume_in)));
        ui.label(format!("Outflow: {}", format_usd(node.volume_out)));

        ui.separator();
        self.draw_node_commands(ui, &node.id, node.is_main);

        if node.is_main {
            return;
        }

        ui.separator();
        ui.label(RichText::new("Transactions").strong());
        for main in &node.connected_main_addresses {
            self.draw_pair_expansion(ui, main, &node.id);
        }
    }

    fn draw_node_commands(&mut self, ui: &mut Ui, id: &str, is_main: bool) {
        ui.horizontal(|ui| {
            ui.label("Label");
            ui.text_edit_singleline(&mut self.label_draft);
        });
        ui.horizontal(|ui| {
            if ui.button("Set label").clicked() {
                self.session
                    .set_custom_label(id, Some(self.label_draft.clone()));
            }
            if ui.button("Clear label").clicked() {
                self.session.set_custom_label(id, None);
                self.label_draft.clear();
            }
        });

        ui.horizontal(|ui| {
            let current = self.session.highlight(id);
            let mut color = current.unwrap_or([245, 206, 93]);
            ui.label("Highlight");
            if ui.color_edit_button_srgb(&mut color).changed() {
                self.session.set_custom_highlight(id, Some(color));
            }
            if current.is_some() && ui.small_button("Clear").clicked() {
                self.session.set_custom_highlight(id, None);
            }
        });

        ui.horizontal(|ui| {
            if !is_main {
                if self.session.is_locked(id) {
                    if ui.button("Unlock").clicked() {
                        self.session.unlock(id);
                    }
                } else if ui.button("Lock in place").clicked() {
                    self.session.lock(id);
                }
            }

            let delete_text = if is_main { "Remove wallet" } else { "Delete node" };
            if ui
                .button(RichText::new(delete_text).color(Color32::from_rgb(226, 92, 86)))
                .clicked()
                && self.session.delete_node(id)
            {
                self.status = Some(format!("Removed {}", short_address(id)));
                self.set_selected(None);
            }
        });
    }

    fn draw_pair_expansion(&mut self, ui: &mut Ui, main: &str, counterparty: &str) {
        let expansions = self.session.expansions();
        let fetching = expansions.is_fetching(main, counterparty);
        let expanded = expansions.is_expanded(main, counterparty);

        ui.horizontal(|ui| {
            ui.label(format!("with {}", short_address(main)));
            if fetching {
                ui.spinner();
                return;
            }
            let text = if expanded { "Collapse" } else { "Expand" };
            if ui.button(text).clicked() {
                match self.session.toggle_expansion(main, counterparty) {
                    ToggleRequest::Fetching => {
                        self.status = Some(format!(
                            "Fetching transactions for {}",
                            short_address(counterparty)
                        ));
                    }
                    ToggleRequest::Collapsed => self.status = None,
                    ToggleRequest::AlreadyFetching => {}
                }
            }
        });

        let Some(transactions) = self.session.expansions().transactions(main, counterparty) else {
            return;
        };
        egui::CollapsingHeader::new(format!("{} transactions", transactions.len()))
            .id_salt((main, counterparty))
            .show(ui, |ui| {
                for transaction in transactions {
                    let direction = infer_direction(transaction, main, counterparty);
                    let value = direction.signed(transaction.usd_volume());
                    let hash = if transaction.transaction_hash.is_empty() {
                        "unknown hash".to_owned()
                    } else {
                        short_address(&transaction.transaction_hash)
                    };
                    let timestamp = transaction
                        .block_timestamp
                        .as_deref()
                        .unwrap_or("no timestamp");
                    ui.label(format!("{} {}  {hash}", direction.label(), format_usd(value)))
                        .on_hover_text(timestamp);
                }
            });
    }
}
