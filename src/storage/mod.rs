pub mod debug;
pub mod spreadsheet;
pub mod url_log;

pub use debug::DebugArtifacts;
pub use spreadsheet::ProfileSheet;
pub use url_log::UrlLog;
