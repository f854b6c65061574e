pub mod config;
pub mod controller;
#[cfg(feature = "gui")]
pub mod gui;
pub mod models;
pub mod progress;
pub mod scrapers;
pub mod storage;

use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber; `RUST_LOG` overrides the default `info` level
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
