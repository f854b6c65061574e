use crate::controller::{DelayRange, RunSettings};
use crate::scrapers::types::DEFAULT_BASE_URL;
use crate::scrapers::{
    BrowserFetcher, BrowserOptions, HttpFetcher, PageFetcher, RetryPolicy, SearchParams,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// File the GUI remembers its last inputs in
pub const CONFIG_FILE: &str = "config.json";

pub const DEFAULT_TARGET: usize = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("city name must have at least 3 characters")]
    InvalidCity,

    #[error("profile count must be a positive integer, got {0:?}")]
    InvalidTarget(String),

    #[error("invalid base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

/// Which fetch engine loads pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// Headless Chrome; renders scripts
    Browser,
    /// Plain HTTP requests; server-rendered HTML only
    Http,
}

/// Everything a run can be tuned with, shared by the CLI and the GUI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    pub city: String,
    pub target: usize,
    pub headless: bool,
    pub engine: Engine,
    pub output_dir: PathBuf,
    pub debug_dir: PathBuf,
    pub base_url: String,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_search_pages: usize,
    pub retries: u32,
    pub backoff_ms: u64,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            city: String::new(),
            target: DEFAULT_TARGET,
            headless: true,
            engine: Engine::Browser,
            output_dir: PathBuf::from("data"),
            debug_dir: PathBuf::from("debug"),
            base_url: DEFAULT_BASE_URL.to_string(),
            min_delay_ms: 2000,
            max_delay_ms: 4000,
            max_search_pages: 10,
            retries: 3,
            backoff_ms: 5000,
        }
    }
}

impl ScrapeConfig {
    /// Load saved settings. A missing or malformed file gives the defaults.
    pub fn load_json(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                debug!(path = %path.display(), "Ignoring unreadable config: {}", e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Check the inputs and resolve everything a run needs
    pub fn run_settings(&self) -> Result<RunSettings, ConfigError> {
        let city = validate_city(&self.city)?;
        if self.target == 0 {
            return Err(ConfigError::InvalidTarget(self.target.to_string()));
        }

        let search = SearchParams {
            city: city.clone(),
            base_url: self.base_url.clone(),
        };
        let invalid_base = |reason: String| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason,
        };
        let base = search.base().map_err(|e| invalid_base(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(invalid_base("not a base URL".to_string()));
        }

        let (min, max) = if self.min_delay_ms <= self.max_delay_ms {
            (self.min_delay_ms, self.max_delay_ms)
        } else {
            (self.max_delay_ms, self.min_delay_ms)
        };

        Ok(RunSettings {
            paths: OutputPaths::for_city(&self.output_dir, &self.debug_dir, &city),
            search,
            base,
            target: self.target,
            delay: DelayRange {
                min: Duration::from_millis(min),
                max: Duration::from_millis(max),
            },
            retry: RetryPolicy {
                max_attempts: self.retries.max(1),
                initial_backoff: Duration::from_millis(self.backoff_ms),
                multiplier: 2,
            },
            max_search_pages: self.max_search_pages.max(1),
        })
    }

    /// Start the configured fetch engine
    pub fn build_fetcher(&self) -> Result<Box<dyn PageFetcher>> {
        Ok(match self.engine {
            Engine::Browser => Box::new(BrowserFetcher::new(BrowserOptions {
                headless: self.headless,
                ..BrowserOptions::default()
            })?),
            Engine::Http => Box::new(HttpFetcher::new(Duration::from_secs(60))?),
        })
    }
}

/// Where a city's artifacts go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub spreadsheet: PathBuf,
    pub url_log: PathBuf,
    pub debug_dir: PathBuf,
}

impl OutputPaths {
    pub fn for_city(output_dir: &Path, debug_dir: &Path, city: &str) -> Self {
        let slug = city_file_slug(city);
        Self {
            spreadsheet: output_dir.join(format!("perfis_airbnb_{}.xlsx", slug)),
            url_log: output_dir.join(format!("urls_descobertas_{}.txt", slug)),
            debug_dir: debug_dir.to_path_buf(),
        }
    }
}

/// Trimmed city name, at least 3 characters long
pub fn validate_city(city: &str) -> Result<String, ConfigError> {
    let city = city.trim();
    if city.chars().count() < 3 {
        return Err(ConfigError::InvalidCity);
    }
    Ok(city.to_string())
}

/// Positive profile count typed by a user
pub fn parse_target(raw: &str) -> Result<usize, ConfigError> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidTarget(raw.trim().to_string())),
    }
}

/// File-name form of a city: "Jacareí - SP" becomes "jacarei_sp"
pub fn city_file_slug(city: &str) -> String {
    let mut slug = String::with_capacity(city.len());
    for c in city.to_lowercase().chars().map(fold_accent) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        "cidade".to_string()
    } else {
        slug.to_string()
    }
}

fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}
