use crate::models::PageKind;
use crate::scrapers::traits::PageFetcher;
use crate::scrapers::types::{FetchError, FetchedPage};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

/// Exponential backoff applied to retryable fetch errors
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total tries including the first one
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(5),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Wait before the retry following `attempt` (0-based), saturating
    /// instead of overflowing for huge settings
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .checked_mul(self.multiplier.saturating_pow(attempt))
            .unwrap_or(Duration::MAX)
    }
}

pub async fn fetch_with_retry(
    fetcher: &dyn PageFetcher,
    url: &str,
    kind: PageKind,
    policy: &RetryPolicy,
) -> Result<FetchedPage, FetchError> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        debug!(url, attempt, "Fetch attempt {}/{}", attempt + 1, attempts);

        match fetcher.fetch(url, kind).await {
            Ok(page) => return Ok(page),
            Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                let wait = policy.backoff(attempt);
                warn!(url, attempt, error = %e, "Fetch failed, retrying in {:?}", wait);
                sleep(wait).await;
                attempt += 1;
            }
            Err(e) => {
                error!(url, attempts = attempt + 1, error = %e, "Giving up on page");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::testing::{Canned, ScriptedFetcher};

    const URL: &str = "https://www.airbnb.com.br/rooms/1";

    fn quick(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::ZERO,
            multiplier: 2,
        }
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(5));
        assert_eq!(policy.backoff(1), Duration::from_secs(10));
        assert_eq!(policy.backoff(2), Duration::from_secs(20));
    }

    #[test]
    fn backoff_saturates_on_huge_settings() {
        let policy = RetryPolicy {
            max_attempts: u32::MAX,
            initial_backoff: Duration::from_millis(u64::MAX),
            multiplier: 2,
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(u64::MAX));
        assert_eq!(policy.backoff(40), Duration::MAX);
        assert_eq!(policy.backoff(u32::MAX), Duration::MAX);
    }

    #[tokio::test]
    async fn recovers_after_transient_block() {
        let fetcher = ScriptedFetcher::new().with_sequence(
            URL,
            vec![
                Canned::Blocked,
                Canned::Blocked,
                Canned::Html("<h1>ok</h1>".into()),
            ],
        );

        let page = fetch_with_retry(&fetcher, URL, PageKind::Listing, &quick(3))
            .await
            .unwrap();
        assert!(page.html.contains("ok"));
        assert_eq!(fetcher.calls(URL), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let fetcher = ScriptedFetcher::new().with(URL, Canned::NetworkDown);

        let err = fetch_with_retry(&fetcher, URL, PageKind::Listing, &quick(2))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(fetcher.calls(URL), 2);
    }

    #[tokio::test]
    async fn does_not_retry_missing_pages() {
        let fetcher = ScriptedFetcher::new().with(URL, Canned::Status(404));

        let err = fetch_with_retry(&fetcher, URL, PageKind::Listing, &quick(3))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
        assert_eq!(fetcher.calls(URL), 1);
    }
}
