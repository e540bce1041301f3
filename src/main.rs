#![allow(clippy::too_many_arguments)]

use eframe::egui;
use insectmask::app::InsectMaskApp;
use insectmask::{cli, logger};

fn main() -> Result<(), eframe::Error> {
    // -- CLI / headless mode ---------------------------------------------
    if cli::CliArgs::is_cli_mode() {
        use clap::Parser;
        let args = cli::CliArgs::parse();
        if args.verbose {
            logger::init();
        }
        let code = cli::run(args);
        std::process::exit(if code == std::process::ExitCode::SUCCESS {
            0
        } else {
            1
        });
    }

    // -- GUI mode -----------------------------------------------------

    // Initialize session log (overwrites previous session log)
    logger::init();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 800.0])
            .with_min_inner_size([640.0, 480.0])
            .with_title("InsectMask"),
        ..Default::default()
    };

    eframe::run_native(
        "InsectMask",
        options,
        Box::new(|cc| Box::new(InsectMaskApp::new(cc))),
    )
}
