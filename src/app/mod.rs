use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use anyhow::{Context as _, Result, bail};
use eframe::egui::{self, Context, Vec2};

use flowmap::config::LayoutConfig;
use flowmap::flow::{FixtureSource, Timeframe};
use flowmap::session::FlowSession;

mod graph;
mod render_utils;
mod ui;

#[derive(Clone, Debug)]
pub struct LoadRequest {
    pub dataset: PathBuf,
    pub config: Option<PathBuf>,
    pub wallets: Vec<String>,
    pub timeframe: Timeframe,
}

pub struct FlowmapApp {
    request: LoadRequest,
    state: AppState,
}

enum AppState {
    Loading {
        rx: Receiver<Result<FlowSession, String>>,
    },
    Ready(Box<ViewModel>),
    Error(String),
}

struct ViewModel {
    session: FlowSession,
    search: String,
    selected: Option<String>,
    pan: Vec2,
    zoom: f32,
    live_physics: bool,
    size_damping: f32,
    usd_range_enabled: bool,
    usd_range: (f64, f64),
    new_wallet: String,
    label_draft: String,
    status: Option<String>,
    dragging: Option<String>,
    visible_node_count: usize,
    visible_link_count: usize,
}

fn load_session(request: &LoadRequest) -> Result<FlowSession> {
    let config = match &request.config {
        Some(path) => LayoutConfig::from_json_file(path)?,
        None => LayoutConfig::default(),
    };
    let source = FixtureSource::from_path(&request.dataset)?;

    let wallets = if request.wallets.is_empty() {
        source.wallets().to_vec()
    } else {
        request.wallets.clone()
    };
    if wallets.is_empty() {
        bail!("dataset {} lists no wallets", request.dataset.display());
    }

    let mut session = FlowSession::new(Arc::new(source), config, request.timeframe);
    let mut loaded = 0usize;
    for wallet in &wallets {
        match session.add_wallet(wallet) {
            Ok(count) => {
                log::info!("loaded {count} counterparties for {wallet}");
                loaded += 1;
            }
            Err(error) => log::warn!("skipping wallet {wallet}: {error}"),
        }
    }
    if loaded == 0 {
        return Err(anyhow::anyhow!("none of the requested wallets could be loaded"))
            .with_context(|| format!("dataset {}", request.dataset.display()));
    }

    Ok(session)
}

impl FlowmapApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, request: LoadRequest) -> Self {
        let state = Self::start_load(request.clone());
        Self { request, state }
    }

    fn spawn_load(request: LoadRequest) -> Receiver<Result<FlowSession, String>> {
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let result = load_session(&request).map_err(|error| format!("{error:#}"));
            let _ = tx.send(result);
        });

        rx
    }

    fn start_load(request: LoadRequest) -> AppState {
        AppState::Loading {
            rx: Self::spawn_load(request),
        }
    }
}

impl eframe::App for FlowmapApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        let mut transition = None;

        match &mut self.state {
            AppState::Loading { rx } => {
                match rx.try_recv() {
                    Ok(result) => {
                        transition = Some(match result {
                            Ok(session) => AppState::Ready(Box::new(ViewModel::new(session))),
                            Err(error) => AppState::Error(error),
                        });
                    }
                    Err(TryRecvError::Empty) => ctx.request_repaint(),
                    Err(TryRecvError::Disconnected) => {
                        transition = Some(AppState::Error(
                            "Background load worker disconnected".to_owned(),
                        ));
                    }
                }

                egui::CentralPanel::default().show(ctx, |ui| {
                    ui.vertical_centered(|ui| {
                        ui.add_space(120.0);
                        ui.heading("Loading wallet counterparties...");
                        ui.add_space(8.0);
                        ui.spinner();
                    });
                });
            }
            AppState::Error(error) => {
                egui::CentralPanel::default().show(ctx, |ui| {
                    ui.heading("Failed to load flow data");
                    ui.add_space(6.0);
                    ui.label(error.as_str());
                    ui.add_space(10.0);
                    if ui.button("Retry").clicked() {
                        transition = Some(Self::start_load(self.request.clone()));
                    }
                });
            }
            AppState::Ready(model) => {
                let mut reload_requested = false;
                model.show(ctx, &self.request, &mut reload_requested);
                if reload_requested {
                    transition = Some(Self::start_load(self.request.clone()));
                }
            }
        }

        if let Some(next_state) = transition {
            self.state = next_state;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn request(dataset: PathBuf, wallets: Vec<String>) -> LoadRequest {
        LoadRequest {
            dataset,
            config: None,
            wallets,
            timeframe: Timeframe::Month,
        }
    }

    #[test]
    fn loads_every_fixture_wallet_by_default() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"{"counterparties": {
                "0xA": [{"interacting_address": "0xC", "volume_in_usd": 10, "usd_netflow": 10}],
                "0xB": [{"interacting_address": "0xC", "volume_out_usd": 4, "usd_netflow": -4}]
            }}"#,
        )
        .unwrap();

        let session = load_session(&request(file.path().to_path_buf(), Vec::new())).unwrap();
        assert_eq!(session.graph().node_count(), 3);
        assert_eq!(session.links().len(), 2);
    }

    #[test]
    fn unknown_wallets_fail_the_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"counterparties": {"0xA": []}}"#).unwrap();

        let error = load_session(&request(
            file.path().to_path_buf(),
            vec!["0xNope".to_owned()],
        ))
        .err()
        .expect("load should fail");
        assert!(format!("{error:#}").contains("could be loaded"));
    }
}
