pub mod airbnb;
pub mod browser;
pub mod http;
pub mod retry;
pub mod traits;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use browser::{BrowserFetcher, BrowserOptions};
pub use http::HttpFetcher;
pub use retry::{fetch_with_retry, RetryPolicy};
pub use traits::PageFetcher;
pub use types::{FetchError, FetchedPage, SearchParams, Snapshot};
