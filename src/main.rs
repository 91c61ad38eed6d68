mod app;

use std::path::PathBuf;

use clap::Parser;
use flowmap::flow::Timeframe;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// JSON file with counterparty and transaction records per wallet.
    #[arg(long)]
    dataset: PathBuf,

    /// Optional JSON file overriding layout constants.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Main wallet to load; repeat for several. Defaults to every wallet in the dataset.
    #[arg(long = "wallet")]
    wallets: Vec<String>,

    #[arg(long, value_enum, default_value_t = Timeframe::Month)]
    timeframe: Timeframe,
}

fn main() -> eframe::Result<()> {
    env_logger::init();

    let args = Args::parse();
    let options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default().with_inner_size([1440.0, 920.0]),
        ..Default::default()
    };

    let request = app::LoadRequest {
        dataset: args.dataset,
        config: args.config,
        wallets: args.wallets,
        timeframe: args.timeframe,
    };

    eframe::run_native(
        "flowmap",
        options,
        Box::new(move |cc| Ok(Box::new(app::FlowmapApp::new(cc, request)))),
    )
}
