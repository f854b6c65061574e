use crate::models::PageKind;
use crate::scrapers::traits::PageFetcher;
use crate::scrapers::types::{looks_blocked, FetchError, FetchedPage, Snapshot, USER_AGENT};
use anyhow::{Context, Result};
use async_trait::async_trait;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Tuning for the headless Chrome engine
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub headless: bool,
    /// How long to wait for the element that marks a page as loaded
    pub wait_timeout: Duration,
    /// Pause after each scroll step so lazy content can arrive
    pub scroll_pause: Duration,
    /// Extra wait on profile pages, which render their sections late
    pub settle: Duration,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            wait_timeout: Duration::from_secs(30),
            scroll_pause: Duration::from_secs(1),
            settle: Duration::from_secs(3),
        }
    }
}

/// Browser-based fetcher using headless Chrome
pub struct BrowserFetcher {
    // Keeps the Chrome process alive for as long as the tab is in use
    _browser: Browser,
    tab: Arc<Tab>,
    options: BrowserOptions,
}

impl BrowserFetcher {
    /// Launch Chrome and open the tab every page is loaded into
    pub fn new(options: BrowserOptions) -> Result<Self> {
        info!(headless = options.headless, "Launching Chrome...");

        let launch = LaunchOptions::default_builder()
            .headless(options.headless)
            .window_size(Some((1280, 720)))
            // Images are never parsed, skip downloading them
            .args(vec![OsStr::new("--blink-settings=imagesEnabled=false")])
            .idle_browser_timeout(Duration::from_secs(300))
            .build()
            .context("Failed to build launch options")?;

        let browser = Browser::new(launch).context("Failed to launch Chrome browser")?;
        let tab = browser.new_tab().context("Failed to open browser tab")?;
        tab.set_user_agent(USER_AGENT, Some("pt-BR,pt;q=0.9,en;q=0.8"), None)
            .context("Failed to set user agent")?;

        Ok(Self {
            _browser: browser,
            tab,
            options,
        })
    }
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn fetch(&self, url: &str, kind: PageKind) -> Result<FetchedPage, FetchError> {
        let tab = Arc::clone(&self.tab);
        let options = self.options.clone();
        let url = url.to_string();

        // CDP calls block; keep them off the async worker threads
        tokio::task::spawn_blocking(move || load_page(&tab, &url, kind, &options))
            .await
            .map_err(|e| FetchError::Other(anyhow::anyhow!("browser task failed: {}", e)))?
    }

    async fn snapshot(&self) -> Result<Option<Snapshot>> {
        let tab = Arc::clone(&self.tab);
        let png = tokio::task::spawn_blocking(move || {
            tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
        })
        .await
        .context("Screenshot task failed")?
        .context("Failed to capture screenshot")?;

        Ok(Some(Snapshot::Png(png)))
    }

    fn engine_name(&self) -> &'static str {
        "browser"
    }
}

fn load_page(
    tab: &Tab,
    url: &str,
    kind: PageKind,
    options: &BrowserOptions,
) -> Result<FetchedPage, FetchError> {
    debug!(url, kind = kind.as_str(), "Navigating");

    tab.navigate_to(url)
        .and_then(|tab| tab.wait_until_navigated())
        .map_err(|e| navigation_error(url, e))?;

    match kind {
        PageKind::Search => {
            if tab
                .wait_for_element_with_custom_timeout(r#"div[role="main"]"#, options.wait_timeout)
                .is_err()
            {
                warn!(url, "Main container is slow to appear, falling back to body");
                wait_for(tab, url, "body", options.wait_timeout)?;
            }
            check_blocked(tab, url)?;
            scroll(tab, 5, 1000, options.scroll_pause);
        }
        PageKind::Listing => {
            wait_for(tab, url, "h1", options.wait_timeout)?;
            check_blocked(tab, url)?;
            // Translation and cookie dialogs cover the host section
            if let Ok(close) = tab.wait_for_element_with_custom_timeout(
                "button[aria-label='Fechar']",
                Duration::from_secs(2),
            ) {
                let _ = close.click();
            }
            scroll(tab, 2, 3000, options.scroll_pause);
        }
        PageKind::Profile => {
            wait_for(tab, url, "body", options.wait_timeout)?;
            thread::sleep(options.settle);
            check_blocked(tab, url)?;
            scroll(tab, 3, 1500, options.scroll_pause);
        }
    }

    let html = tab
        .get_content()
        .map_err(|e| FetchError::Other(e.context("Failed to read page HTML")))?;
    let title = tab.get_title().unwrap_or_default();

    debug!(url, bytes = html.len(), "Page loaded");

    Ok(FetchedPage {
        url: tab.get_url(),
        title,
        html,
    })
}

fn wait_for(tab: &Tab, url: &str, selector: &str, timeout: Duration) -> Result<(), FetchError> {
    tab.wait_for_element_with_custom_timeout(selector, timeout)
        .map(|_| ())
        .map_err(|_| FetchError::Timeout {
            url: url.to_string(),
            what: selector.to_string(),
        })
}

fn check_blocked(tab: &Tab, url: &str) -> Result<(), FetchError> {
    let current = tab.get_url();
    let title = tab.get_title().unwrap_or_default();
    if looks_blocked(&current, &title) {
        warn!(url, current = %current, "Captcha or challenge page detected");
        return Err(FetchError::Blocked {
            url: url.to_string(),
        });
    }
    Ok(())
}

fn scroll(tab: &Tab, steps: usize, pixels: u32, pause: Duration) {
    let script = format!("window.scrollBy(0, {})", pixels);
    for _ in 0..steps {
        if let Err(e) = tab.evaluate(&script, false) {
            debug!("Scroll failed: {}", e);
            break;
        }
        thread::sleep(pause);
    }
}

/// Chrome reports connectivity problems as `net::ERR_*`; anything else is page specific
fn navigation_error(url: &str, err: anyhow::Error) -> FetchError {
    let message = err.to_string();
    if message.contains("net::ERR") {
        FetchError::Network {
            url: url.to_string(),
            message,
        }
    } else {
        FetchError::Other(err.context(format!("Failed to navigate to {}", url)))
    }
}
