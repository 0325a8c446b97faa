use std::process::ExitCode;

use eframe::egui;

use genbrush::app::GenBrushApp;
use genbrush::{cli, logger};

fn main() -> ExitCode {
    // -- CLI / headless mode ------------------------------------------------
    // Routed before any window is created; nothing graphical is touched.
    if cli::CliArgs::is_cli_mode() {
        use clap::Parser;
        let args = cli::CliArgs::parse();
        return cli::run(args);
    }

    // -- GUI mode -----------------------------------------------------------

    // Session log (overwrites the previous session's file).
    logger::init();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 720.0])
            .with_title("GenBrush"),
        ..Default::default()
    };

    match eframe::run_native(
        "GenBrush",
        options,
        Box::new(|cc| Box::new(GenBrushApp::new(cc))),
    ) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("failed to start GenBrush: {e}");
            ExitCode::FAILURE
        }
    }
}
