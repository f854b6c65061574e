#![cfg_attr(target_os = "windows", windows_subsystem = "windows")]
use eframe::egui::ViewportBuilder;
use host_scout::gui;

fn main() {
    host_scout::init_logging();

    let options = eframe::NativeOptions {
        viewport: ViewportBuilder::default()
            .with_inner_size([950.0, 650.0])
            .with_min_inner_size([850.0, 550.0]),
        ..Default::default()
    };

    if let Err(e) = gui::run(options) {
        eprintln!("GUI failed: {}", e);
        std::process::exit(1);
    }
}
