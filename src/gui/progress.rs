use crate::controller::RunSummary;
use crate::models::HostProfile;
use crate::progress::Progress;
use chrono::Local;
use std::sync::{Arc, Mutex};

/// Console lines and the status label, shared with the UI thread
#[derive(Clone, Default)]
pub struct Console {
    lines: Arc<Mutex<Vec<String>>>,
    status: Arc<Mutex<String>>,
}

impl Console {
    /// Append a line, stamped with the local time unless it already carries a tag
    pub fn push(&self, msg: &str) {
        let mut lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        for line in msg.lines() {
            if line.trim_start().starts_with('[') {
                lines.push(line.to_string());
            } else {
                lines.push(format!("{} {}", Local::now().format("[%H:%M:%S]"), line));
            }
        }
    }

    pub fn clear(&self) {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set_status(&self, msg: impl Into<String>) {
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = msg.into();
    }

    pub fn status(&self) -> String {
        self.status.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

pub struct GuiProgress {
    console: Console,
}

impl GuiProgress {
    pub fn new(console: Console) -> Self {
        Self { console }
    }
}

impl Progress for GuiProgress {
    fn begin(&mut self, total: usize) {
        self.console
            .push(&format!("--- Looking for {} profile(s) ---", total));
    }

    fn log(&mut self, msg: &str) {
        self.console.push(msg);
    }

    fn item_done(&mut self, profile: &HostProfile, done: usize, total: usize) {
        self.console.push(&format!("  -> Saved: {}", profile.summary()));
        self.console
            .set_status(format!("Running: {}/{} profiles", done, total));
    }

    fn item_failed(&mut self, url: &str, error: &str) {
        self.console
            .push(&format!("  -> Failed: {} ({})", url, error));
    }

    fn finish(&mut self, summary: &RunSummary) {
        self.console.push(&format!(
            "Saved {} profile(s) to {} (total {})",
            summary.written,
            summary.spreadsheet.display(),
            summary.total_rows
        ));
        if summary.failed > 0 {
            self.console
                .push(&format!("{} listing(s) failed, see the debug folder", summary.failed));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_stamps_untagged_lines() {
        let console = Console::default();
        console.push("hello\n[1/2] https://www.airbnb.com.br/rooms/1");
        let lines = console.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('[') && lines[0].ends_with("] hello"));
        assert_eq!(lines[1], "[1/2] https://www.airbnb.com.br/rooms/1");

        console.clear();
        assert!(console.lines().is_empty());
    }

    #[test]
    fn progress_updates_status() {
        let console = Console::default();
        let mut progress = GuiProgress::new(console.clone());
        progress.begin(2);
        let mut profile = HostProfile::new("https://www.airbnb.com.br/rooms/1");
        profile.host_name = Some("Ana".into());
        progress.item_done(&profile, 1, 2);

        assert_eq!(console.status(), "Running: 1/2 profiles");
        assert!(console.lines().iter().any(|l| l.contains("Saved: Ana")));
    }
}
