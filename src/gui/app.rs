use std::{
    error::Error,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::Duration,
};

use eframe::egui::{self, Color32, RichText};
use tracing::{info, warn};

use crate::{
    config::{parse_target, validate_city, ScrapeConfig, CONFIG_FILE},
    controller::{Controller, RunSummary},
};

use super::progress::{Console, GuiProgress};

const ACCENT: Color32 = Color32::from_rgb(0xFF, 0x5A, 0x5F);
const TEAL: Color32 = Color32::from_rgb(0x00, 0xA6, 0x99);
const CONSOLE_GREEN: Color32 = Color32::from_rgb(0x10, 0xB9, 0x81);

pub fn run(options: eframe::NativeOptions) -> Result<(), Box<dyn Error>> {
    eframe::run_native(
        "Airbnb Host Scout",
        options,
        Box::new(|_cc| Ok(Box::new(App::new(ScrapeConfig::load_json(CONFIG_FILE))))),
    )?;
    Ok(())
}

struct Worker {
    handle: JoinHandle<Result<RunSummary, String>>,
    cancel: Arc<AtomicBool>,
}

/// Modal message shown after validation failures and finished runs
struct Alert {
    title: &'static str,
    message: String,
}

pub struct App {
    config: ScrapeConfig,

    // form fields, validated on Start
    city_text: String,
    count_text: String,
    output_dir_text: String,

    console: Console,
    worker: Option<Worker>,
    alert: Option<Alert>,
}

impl App {
    pub fn new(config: ScrapeConfig) -> Self {
        let console = Console::default();
        console.set_status("Waiting for a command...");

        Self {
            city_text: config.city.clone(),
            count_text: config.target.to_string(),
            output_dir_text: config.output_dir.to_string_lossy().into_owned(),
            config,
            console,
            worker: None,
            alert: None,
        }
    }

    fn running(&self) -> bool {
        self.worker.is_some()
    }

    fn show_alert(&mut self, title: &'static str, message: impl Into<String>) {
        self.alert = Some(Alert {
            title,
            message: message.into(),
        });
    }

    fn output_dir(&self) -> PathBuf {
        let text = self.output_dir_text.trim();
        if text.is_empty() {
            ScrapeConfig::default().output_dir
        } else {
            PathBuf::from(text)
        }
    }

    fn start(&mut self) {
        if self.running() {
            return;
        }

        let city = match validate_city(&self.city_text) {
            Ok(city) => city,
            Err(_) => {
                self.show_alert("Invalid city", "Type the full city name (at least 3 letters).");
                return;
            }
        };
        let target = match parse_target(&self.count_text) {
            Ok(n) => n,
            Err(_) => {
                self.show_alert("Invalid count", "The count must be a positive whole number.");
                return;
            }
        };

        self.config.city = city;
        self.config.target = target;
        self.config.output_dir = self.output_dir();
        if let Err(e) = self.config.save_json(CONFIG_FILE) {
            warn!("Could not save {}: {:#}", CONFIG_FILE, e);
        }

        self.console.clear();
        self.console.push(&format!(
            "--- STARTING RUN FOR: {} ({} profiles) ---\nSaving to: {}",
            self.config.city,
            self.config.target,
            self.config.output_dir.display()
        ));
        self.console.set_status("RUNNING");
        info!(city = %self.config.city, target, "GUI run started");

        let config = self.config.clone();
        let cancel = Arc::new(AtomicBool::new(false));
        let mut progress = GuiProgress::new(self.console.clone());
        let worker_cancel = cancel.clone();

        let handle = std::thread::spawn(move || -> Result<RunSummary, String> {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| format!("Failed to start runtime: {}", e))?;

            runtime.block_on(async move {
                let settings = config.run_settings().map_err(|e| e.to_string())?;
                let fetcher = config.build_fetcher().map_err(|e| format!("{:#}", e))?;
                Controller::new(fetcher, settings)
                    .with_cancel(worker_cancel)
                    .run(&mut progress)
                    .await
                    .map_err(|e| format!("{:#}", e))
            })
        });

        self.worker = Some(Worker { handle, cancel });
    }

    fn stop(&mut self) {
        if let Some(worker) = &self.worker {
            worker.cancel.store(true, Ordering::Relaxed);
            self.console.push("Stop requested, finishing the current page...");
            self.console.set_status("STOPPING");
        }
    }

    /// Collect the worker's result once its thread has exited
    fn poll_worker(&mut self) {
        let finished = self
            .worker
            .as_ref()
            .is_some_and(|w| w.handle.is_finished());
        if !finished {
            return;
        }
        let Some(worker) = self.worker.take() else {
            return;
        };

        match worker.handle.join() {
            Ok(Ok(summary)) if summary.cancelled => {
                self.console.push("--- RUN STOPPED ---");
                self.show_alert("Stopped", format!("Stopped after {} profile(s).", summary.written));
            }
            Ok(Ok(summary)) => {
                self.console.push("--- RUN COMPLETED SUCCESSFULLY ---");
                self.show_alert(
                    "Done",
                    format!(
                        "Scraping finished: {} new profile(s), {} in total.",
                        summary.written, summary.total_rows
                    ),
                );
            }
            Ok(Err(e)) => {
                self.console.push(&format!("FATAL ERROR: {}", e));
                self.show_alert("Error", format!("An error occurred: {}", e));
            }
            Err(_) => {
                self.console.push("FATAL ERROR: worker thread panicked");
                self.show_alert("Error", "The scraper stopped unexpectedly.");
            }
        }
        self.console.set_status("Waiting...");
    }

    fn open_output_folder(&mut self) {
        let dir = self.output_dir();
        if let Err(e) = std::fs::create_dir_all(&dir).and_then(|_| open::that(&dir)) {
            self.show_alert("Error", format!("Could not open {}: {}", dir.display(), e));
        }
    }

    fn draw_sidebar(&mut self, ui: &mut egui::Ui) {
        ui.add_space(20.0);
        ui.label(RichText::new("Airbnb\nHost Scout").size(26.0).strong().color(ACCENT));
        ui.add_space(20.0);

        ui.label(RichText::new("SETTINGS").small().strong().color(Color32::GRAY));
        let editable = !self.running();

        ui.add_enabled(
            editable,
            egui::TextEdit::singleline(&mut self.city_text)
                .hint_text("City - UF (e.g. Manaus - AM)")
                .desired_width(f32::INFINITY),
        );
        ui.add_enabled(
            editable,
            egui::TextEdit::singleline(&mut self.count_text)
                .hint_text("Profiles (e.g. 50)")
                .desired_width(f32::INFINITY),
        );

        ui.add_space(8.0);
        ui.label("Output folder:");
        ui.add_enabled(
            editable,
            egui::TextEdit::singleline(&mut self.output_dir_text)
                .hint_text("data")
                .font(egui::TextStyle::Monospace)
                .desired_width(f32::INFINITY),
        );

        ui.add_space(12.0);
        ui.add_enabled(
            editable,
            egui::Checkbox::new(&mut self.config.headless, "Fast mode (no browser window)"),
        );

        ui.add_space(16.0);
        let start_label = if self.running() { "RUNNING..." } else { "START SCRAPING" };
        let start = egui::Button::new(RichText::new(start_label).strong())
            .fill(if self.running() { Color32::DARK_GRAY } else { TEAL })
            .min_size(egui::vec2(ui.available_width(), 44.0));
        if ui.add_enabled(!self.running(), start).clicked() {
            self.start();
        }
        if ui
            .add_enabled(self.running(), egui::Button::new("Stop"))
            .clicked()
        {
            self.stop();
        }

        ui.add_space(8.0);
        let status = self.console.status();
        let color = if self.running() { CONSOLE_GREEN } else { Color32::GRAY };
        ui.colored_label(color, format!("Status: {}", status));

        ui.with_layout(egui::Layout::bottom_up(egui::Align::Min), |ui| {
            ui.add_space(16.0);
            if ui.button("Open output folder").clicked() {
                self.open_output_folder();
            }
        });
    }

    fn draw_console(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.heading("Live console");
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.button("Clear console").clicked() {
                    self.console.clear();
                }
            });
        });
        ui.separator();

        egui::ScrollArea::vertical()
            .stick_to_bottom(true)
            .auto_shrink([false, false])
            .show(ui, |ui| {
                for line in self.console.lines() {
                    ui.label(RichText::new(line).monospace().color(CONSOLE_GREEN));
                }
            });
    }

    fn draw_alert(&mut self, ctx: &egui::Context) {
        let mut close = false;
        if let Some(alert) = &self.alert {
            egui::Window::new(alert.title)
                .collapsible(false)
                .resizable(false)
                .anchor(egui::Align2::CENTER_CENTER, egui::vec2(0.0, 0.0))
                .show(ctx, |ui| {
                    ui.label(&alert.message);
                    if ui.button("OK").clicked() {
                        close = true;
                    }
                });
        }
        if close {
            self.alert = None;
        }
    }
}

impl eframe::App for App {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_worker();

        egui::SidePanel::left("settings")
            .resizable(false)
            .exact_width(280.0)
            .show(ctx, |ui| self.draw_sidebar(ui));

        egui::CentralPanel::default().show(ctx, |ui| self.draw_console(ui));

        self.draw_alert(ctx);

        if self.running() {
            ctx.request_repaint_after(Duration::from_millis(200));
        }
    }
}
