//! The run loop: discover listings for a city, visit each one, follow it to
//! the host's profile and save a row per listing as soon as it is scraped.

use crate::config::OutputPaths;
use crate::models::{HostProfile, PageKind, SearchSession};
use crate::progress::Progress;
use crate::scrapers::airbnb::{self, ExtractError};
use crate::scrapers::{fetch_with_retry, FetchError, PageFetcher, RetryPolicy, SearchParams};
use crate::storage::{DebugArtifacts, ProfileSheet, UrlLog};
use anyhow::{Context, Result};
use rand::Rng;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

/// Random pause between profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let ms = rand::thread_rng().gen_range(self.min.as_millis()..=self.max.as_millis());
        Duration::from_millis(ms as u64)
    }
}

/// Validated inputs of one run
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub search: SearchParams,
    /// Parsed `search.base_url`
    pub base: Url,
    pub target: usize,
    pub paths: OutputPaths,
    pub delay: DelayRange,
    pub retry: RetryPolicy,
    pub max_search_pages: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Rows saved by this run
    pub written: usize,
    /// Listings that failed and were skipped
    pub failed: usize,
    /// URLs added to the log by this run
    pub discovered: usize,
    /// Logged URLs still without a row
    pub pending_left: usize,
    /// Rows in the spreadsheet after the run
    pub total_rows: usize,
    pub cancelled: bool,
    pub spreadsheet: PathBuf,
    pub url_log: PathBuf,
}

/// Why one listing could not be turned into a row
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("{url}: {source}")]
    Extract {
        url: String,
        #[source]
        source: ExtractError,
    },
}

impl DocumentError {
    fn is_fatal(&self) -> bool {
        matches!(self, DocumentError::Fetch(e) if e.is_fatal())
    }

    fn snapshot_reason(&self) -> &'static str {
        match self {
            DocumentError::Fetch(FetchError::Blocked { .. })
            | DocumentError::Fetch(FetchError::RateLimited { .. }) => "blocked",
            DocumentError::Fetch(_) => "fetch_error",
            DocumentError::Extract { .. } => "extract_error",
        }
    }
}

pub struct Controller {
    fetcher: Box<dyn PageFetcher>,
    settings: RunSettings,
    cancel: Arc<AtomicBool>,
}

impl Controller {
    pub fn new(fetcher: Box<dyn PageFetcher>, settings: RunSettings) -> Self {
        Self {
            fetcher,
            settings,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share a flag that stops the run before the next page when set
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub async fn run(&self, progress: &mut dyn Progress) -> Result<RunSummary> {
        let settings = &self.settings;
        let paths = &settings.paths;

        let mut sheet = ProfileSheet::open(&paths.spreadsheet)?;
        let mut log = UrlLog::open(&paths.url_log)?;
        let artifacts = DebugArtifacts::new(&paths.debug_dir);
        debug!(dir = %artifacts.dir().display(), "Snapshots of failed pages go here");

        let mut session = SearchSession::new(&settings.search.city, settings.target);
        for url in sheet.source_urls() {
            session.visit(url);
        }

        let mut summary = RunSummary {
            spreadsheet: paths.spreadsheet.clone(),
            url_log: paths.url_log.clone(),
            ..RunSummary::default()
        };

        info!(
            city = %session.city,
            engine = self.fetcher.engine_name(),
            target = session.target,
            "Starting run"
        );

        let pending = pending_urls(&log, &session);
        progress.log(&format!(
            "{}: {} processed, {} known, {} pending",
            session.city,
            session.visited_count(),
            log.len(),
            pending.len()
        ));
        progress.begin(session.target);

        // Pending URLs are tried in log order until enough rows are saved.
        // Search runs at most once, when what is left cannot cover the target.
        let mut searched = false;
        let mut attempted = 0;
        'run: loop {
            let mut pending = pending_urls(&log, &session);

            if pending.len() < session.remaining() && !searched {
                searched = true;
                let needed = session.remaining() - pending.len();
                let max_new = (needed + 10).max(20);
                progress.log(&format!(
                    "Queue is short, searching for at least {} more listings",
                    needed
                ));

                let found = self
                    .discover(&mut log, max_new, &artifacts, progress)
                    .await?;
                summary.discovered += found;
                pending = pending_urls(&log, &session);

                if found == 0 {
                    progress.log("No new listings found in search");
                } else {
                    progress.log(&format!("URL list updated, {} known", log.len()));
                }
            }

            if pending.is_empty() {
                if attempted == 0 && !self.cancelled() {
                    progress.log("No pending URLs to process");
                }
                break;
            }

            for url in &pending {
                if self.cancelled() {
                    info!("Run cancelled");
                    break 'run;
                }
                if attempted > 0 {
                    sleep(settings.delay.sample()).await;
                }
                attempted += 1;

                session.visit(url);
                progress.log(&format!(
                    "[{}/{}] {}",
                    session.collected + 1,
                    session.target,
                    url
                ));

                match self.scrape_listing(url).await {
                    Ok(profile) => {
                        if sheet.append(profile.clone())? {
                            session.collected += 1;
                            summary.written += 1;
                            progress.item_done(&profile, session.collected, session.target);
                        }
                    }
                    Err(e) if e.is_fatal() => {
                        self.capture(&artifacts, e.snapshot_reason(), progress).await;
                        progress.log(&format!("Fatal error, stopping: {}", e));
                        return Err(e).context(format!(
                            "Run stopped after {} profile(s) were saved",
                            summary.written
                        ));
                    }
                    Err(e) => {
                        summary.failed += 1;
                        self.capture(&artifacts, e.snapshot_reason(), progress).await;
                        progress.item_failed(url, &e.to_string());
                    }
                }

                if session.is_complete() {
                    break 'run;
                }
            }
        }

        summary.cancelled = self.cancelled() && !session.is_complete();
        summary.total_rows = sheet.len();
        summary.pending_left = log.urls().iter().filter(|u| !sheet.contains(u)).count();
        progress.finish(&summary);
        Ok(summary)
    }

    /// Walk search result pages, logging listing URLs not seen before.
    /// Returns how many were added.
    async fn discover(
        &self,
        log: &mut UrlLog,
        max_new: usize,
        artifacts: &DebugArtifacts,
        progress: &mut dyn Progress,
    ) -> Result<usize> {
        let settings = &self.settings;
        let first = settings
            .search
            .search_url()
            .context("Failed to build search URL")?;

        let mut next = Some(first.to_string());
        let mut visited_pages = HashSet::new();
        let mut found = 0;

        while let Some(url) = next.take() {
            if found >= max_new
                || visited_pages.len() >= settings.max_search_pages
                || self.cancelled()
            {
                break;
            }
            if !visited_pages.insert(url.clone()) {
                debug!(url, "Search page already visited");
                break;
            }

            progress.log(&format!("Scanning search page {}", visited_pages.len()));

            let page = match fetch_with_retry(
                self.fetcher.as_ref(),
                &url,
                PageKind::Search,
                &settings.retry,
            )
            .await
            {
                Ok(page) => page,
                Err(e) => {
                    warn!(url, error = %e, "Search failed, keeping what was found");
                    let reason = match e {
                        FetchError::Blocked { .. } | FetchError::RateLimited { .. } => "blocked",
                        _ => "search_error",
                    };
                    self.capture(artifacts, reason, progress).await;
                    progress.log(&format!("Search stopped: {}", e));
                    break;
                }
            };

            let results = airbnb::parse_search_page(&page.html, &settings.base);
            let before = found;
            for listing in &results.listing_urls {
                if log.append(listing)? {
                    found += 1;
                }
            }
            progress.log(&format!(
                "Found {} new listing(s) on this page ({} links)",
                found - before,
                results.listing_urls.len()
            ));

            if results.next_page.is_none() {
                progress.log("Reached the last search page");
            }
            next = results.next_page;
            if next.is_some() && found < max_new {
                sleep(settings.delay.sample()).await;
            }
        }

        Ok(found)
    }

    /// Listing page, then the host profile it links to
    async fn scrape_listing(&self, url: &str) -> Result<HostProfile, DocumentError> {
        let settings = &self.settings;
        let fetcher = self.fetcher.as_ref();

        let page = fetch_with_retry(fetcher, url, PageKind::Listing, &settings.retry).await?;
        if page.url != url {
            debug!(url, landed = %page.url, "Listing redirected");
        }
        debug!(url, title = %page.title, "Listing loaded");
        let listing = airbnb::parse_listing_page(&page.html, &settings.base).map_err(|source| {
            DocumentError::Extract {
                url: url.to_string(),
                source,
            }
        })?;

        let mut profile = HostProfile::new(url);
        profile.listing_title = Some(listing.title);

        let Some(host_url) = listing.host_profile_url else {
            warn!(url, "Host profile link not found");
            return Ok(profile);
        };

        debug!(url, host = %host_url, "Following host link");
        let page = fetch_with_retry(fetcher, &host_url, PageKind::Profile, &settings.retry).await?;
        debug!(url = %host_url, title = %page.title, "Profile loaded");
        let host = airbnb::parse_profile_page(&page.html).map_err(|source| {
            DocumentError::Extract {
                url: host_url.clone(),
                source,
            }
        })?;

        profile.host_profile_url = Some(host_url);
        profile.host_name = host.name;
        profile.host_listings_count = host.listings_count;
        profile.rating = host.rating;
        profile.review_count = host.review_count;
        profile.location = host.location;
        profile.joined = host.joined;
        Ok(profile)
    }

    async fn capture(&self, artifacts: &DebugArtifacts, reason: &str, progress: &mut dyn Progress) {
        match self.fetcher.snapshot().await {
            Ok(Some(snapshot)) => match artifacts.save(reason, &snapshot) {
                Ok(path) => progress.log(&format!("Snapshot saved to {}", path.display())),
                Err(e) => warn!("Could not save snapshot: {:#}", e),
            },
            Ok(None) => debug!("Engine has no page to snapshot"),
            Err(e) => warn!("Could not capture snapshot: {:#}", e),
        }
    }
}

/// Logged URLs without a row yet, in discovery order
fn pending_urls(log: &UrlLog, session: &SearchSession) -> Vec<String> {
    log.urls()
        .iter()
        .filter(|url| !session.is_visited(url))
        .cloned()
        .collect()
}
