use crate::models::PageKind;
use crate::scrapers::types::{FetchError, FetchedPage, Snapshot};
use anyhow::Result;
use async_trait::async_trait;

/// Common trait for all fetch engines
/// The controller only sees this, so browser and plain HTTP engines are interchangeable
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Load a page and return its rendered HTML
    async fn fetch(&self, url: &str, kind: PageKind) -> Result<FetchedPage, FetchError>;

    /// Capture the page most recently loaded, if the engine has one
    async fn snapshot(&self) -> Result<Option<Snapshot>>;

    /// Get the name of the engine
    fn engine_name(&self) -> &'static str;
}
