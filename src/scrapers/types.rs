use thiserror::Error;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://www.airbnb.com.br";

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Search parameters for a city run
#[derive(Debug, Clone)]
pub struct SearchParams {
    /// City as typed by the user, e.g. "Jacareí - SP"
    pub city: String,
    /// Site root every relative link is resolved against
    pub base_url: String,
}

impl SearchParams {
    pub fn new(city: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn base(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.base_url)
    }

    /// Path segment Airbnb uses for a place: "Jacareí - SP" becomes "Jacareí-~-SP".
    /// Only a trailing two-letter state code is split off, so hyphens inside
    /// the city name stay as they are.
    pub fn place_slug(&self) -> String {
        let words = |s: &str| s.split_whitespace().collect::<Vec<_>>().join("-");

        match self.city.rsplit_once('-') {
            Some((place, state)) if is_state_code(state.trim()) && !place.trim().is_empty() => {
                format!("{}-~-{}", words(place), state.trim())
            }
            _ => words(&self.city),
        }
    }

    /// First page of the city's home search
    pub fn search_url(&self) -> Result<Url, url::ParseError> {
        self.base()?
            .join(&format!("/s/{}/homes", self.place_slug()))
    }
}

impl Default for SearchParams {
    fn default() -> Self {
        Self::new("Jacareí - SP")
    }
}

/// Document returned by a fetch engine
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after redirects
    pub url: String,
    pub title: String,
    pub html: String,
}

/// Diagnostic capture of the page an engine last loaded
#[derive(Debug, Clone)]
pub enum Snapshot {
    Png(Vec<u8>),
    Html(String),
}

impl Snapshot {
    pub fn extension(&self) -> &'static str {
        match self {
            Snapshot::Png(_) => "png",
            Snapshot::Html(_) => "html",
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            Snapshot::Png(data) => data,
            Snapshot::Html(html) => html.as_bytes(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("blocked by the site (captcha or challenge) at {url}")]
    Blocked { url: String },

    #[error("rate limited (HTTP {status}) at {url}")]
    RateLimited { url: String, status: u16 },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("timed out waiting for {what} on {url}")]
    Timeout { url: String, what: String },

    #[error("network error on {url}: {message}")]
    Network { url: String, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FetchError {
    /// Whether waiting and trying again has a chance of succeeding
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Blocked { .. }
            | FetchError::RateLimited { .. }
            | FetchError::Timeout { .. }
            | FetchError::Network { .. } => true,
            FetchError::Status { status, .. } => *status >= 500,
            FetchError::Other(_) => false,
        }
    }

    /// Errors that end the whole run once retries are spent
    pub fn is_fatal(&self) -> bool {
        matches!(self, FetchError::Network { .. })
    }
}

fn is_state_code(s: &str) -> bool {
    s.chars().count() == 2 && s.chars().all(|c| c.is_ascii_alphabetic())
}

/// Captcha and challenge pages replace the requested document without an error status
pub fn looks_blocked(url: &str, title: &str) -> bool {
    url.to_lowercase().contains("captcha") || title.to_lowercase().contains("challenge")
}
