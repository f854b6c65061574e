use chrono::{Local, NaiveDateTime};
use std::collections::HashSet;

/// Timestamp layout used for the `scraped_at` column
pub const SCRAPED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Kind of page being fetched; engines use it to decide how long to wait
/// and whether to scroll for lazy-loaded content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Search,
    Listing,
    Profile,
}

impl PageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageKind::Search => "search",
            PageKind::Listing => "listing",
            PageKind::Profile => "profile",
        }
    }
}

/// One spreadsheet row: a host reached through one of their listings
#[derive(Debug, Clone, PartialEq)]
pub struct HostProfile {
    /// Listing URL the host was reached from; unique per city
    pub source_url: String,
    pub listing_title: Option<String>,
    pub host_name: Option<String>,
    pub host_profile_url: Option<String>,
    pub host_listings_count: Option<u32>,
    pub rating: Option<f32>,
    pub review_count: Option<u32>,
    pub location: Option<String>,
    pub joined: Option<String>,
    /// Always set for rows scraped by us; rows loaded from a sheet edited
    /// elsewhere may carry a value we cannot parse
    pub scraped_at: Option<NaiveDateTime>,
}

impl HostProfile {
    /// Empty row for a listing, stamped with the current local time
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            listing_title: None,
            host_name: None,
            host_profile_url: None,
            host_listings_count: None,
            rating: None,
            review_count: None,
            location: None,
            joined: None,
            scraped_at: Some(Local::now().naive_local()),
        }
    }

    pub fn scraped_at_text(&self) -> Option<String> {
        self.scraped_at
            .map(|ts| ts.format(SCRAPED_AT_FORMAT).to_string())
    }

    /// Short human description used in progress lines
    pub fn summary(&self) -> String {
        let name = self.host_name.as_deref().unwrap_or("unknown host");
        match self.host_listings_count {
            Some(n) => format!("{} ({} listings)", name, n),
            None => name.to_string(),
        }
    }
}

/// State of one city run
#[derive(Debug, Clone)]
pub struct SearchSession {
    pub city: String,
    pub target: usize,
    /// Profiles written during this run
    pub collected: usize,
    visited: HashSet<String>,
}

impl SearchSession {
    pub fn new(city: impl Into<String>, target: usize) -> Self {
        Self {
            city: city.into(),
            target,
            collected: 0,
            visited: HashSet::new(),
        }
    }

    /// Marks a URL as visited. Returns false if it already was.
    pub fn visit(&mut self, url: &str) -> bool {
        self.visited.insert(url.to_string())
    }

    pub fn is_visited(&self, url: &str) -> bool {
        self.visited.contains(url)
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    pub fn remaining(&self) -> usize {
        self.target.saturating_sub(self.collected)
    }

    pub fn is_complete(&self) -> bool {
        self.collected >= self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_tracks_visits_and_remaining() {
        let mut session = SearchSession::new("Jacareí - SP", 2);
        assert!(session.visit("https://www.airbnb.com.br/rooms/1"));
        assert!(!session.visit("https://www.airbnb.com.br/rooms/1"));
        assert!(session.is_visited("https://www.airbnb.com.br/rooms/1"));
        assert_eq!(session.visited_count(), 1);

        session.collected = 1;
        assert_eq!(session.remaining(), 1);
        assert!(!session.is_complete());
        session.collected = 3;
        assert_eq!(session.remaining(), 0);
        assert!(session.is_complete());
    }

    #[test]
    fn summary_mentions_listing_count_when_known() {
        let mut profile = HostProfile::new("https://www.airbnb.com.br/rooms/1");
        assert_eq!(profile.summary(), "unknown host");
        profile.host_name = Some("Ana".into());
        profile.host_listings_count = Some(4);
        assert_eq!(profile.summary(), "Ana (4 listings)");
        assert!(profile.scraped_at_text().is_some());
    }
}
