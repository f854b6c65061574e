use crate::controller::RunSummary;
use crate::models::HostProfile;
use tracing::{info, warn};

/// Lightweight progress reporting used by the run loop.
/// Frontends (GUI/CLI) implement this to surface status to users.
pub trait Progress {
    /// Called once the batch to scrape is known
    fn begin(&mut self, _total: usize) {}

    /// Free-form status line for human eyes
    fn log(&mut self, _msg: &str) {}

    /// Called when a profile row has been saved
    fn item_done(&mut self, _profile: &HostProfile, _done: usize, _total: usize) {}

    /// Called when a listing could not be scraped
    fn item_failed(&mut self, _url: &str, _error: &str) {}

    /// Called at the end of a run that did not hit a fatal error
    fn finish(&mut self, _summary: &RunSummary) {}
}

/// A no-op progress sink.
pub struct NullProgress;
impl Progress for NullProgress {}

/// Forwards progress to the tracing subscriber; used by the CLI
pub struct LogProgress;

impl Progress for LogProgress {
    fn begin(&mut self, total: usize) {
        info!("Processing {} listing(s)", total);
    }

    fn log(&mut self, msg: &str) {
        info!("{}", msg);
    }

    fn item_done(&mut self, profile: &HostProfile, done: usize, total: usize) {
        info!("✅ [{}/{}] {}", done, total, profile.summary());
    }

    fn item_failed(&mut self, url: &str, error: &str) {
        warn!(url, "Extraction failed: {}", error);
    }

    fn finish(&mut self, summary: &RunSummary) {
        info!(
            "Run complete: {} written, {} failed, {} newly discovered, {} still pending",
            summary.written, summary.failed, summary.discovered, summary.pending_left
        );
        info!("💾 Profiles: {}", summary.spreadsheet.display());
        info!("💾 URLs: {}", summary.url_log.display());
    }
}
