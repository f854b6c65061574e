//! In-memory fetcher for exercising the controller without a network.

use crate::models::PageKind;
use crate::scrapers::traits::PageFetcher;
use crate::scrapers::types::{FetchError, FetchedPage, Snapshot};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub enum Canned {
    Html(String),
    Blocked,
    Status(u16),
    NetworkDown,
}

#[derive(Default)]
pub struct ScriptedFetcher {
    // Per URL: responses served in order, the last one repeats
    pages: HashMap<String, Vec<Canned>>,
    calls: Mutex<HashMap<String, usize>>,
    last: Mutex<Option<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, url: &str, response: Canned) -> Self {
        self.with_sequence(url, vec![response])
    }

    pub fn with_sequence(mut self, url: &str, responses: Vec<Canned>) -> Self {
        self.pages.insert(url.to_string(), responses);
        self
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str, _kind: PageKind) -> Result<FetchedPage, FetchError> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            let n = calls.entry(url.to_string()).or_insert(0);
            *n += 1;
            *n
        };
        *self.last.lock().unwrap() = Some(url.to_string());

        let response = match self.pages.get(url) {
            Some(seq) => seq[(n - 1).min(seq.len() - 1)].clone(),
            None => Canned::Status(404),
        };

        match response {
            Canned::Html(html) => Ok(FetchedPage {
                url: url.to_string(),
                title: String::new(),
                html,
            }),
            Canned::Blocked => Err(FetchError::Blocked { url: url.to_string() }),
            Canned::Status(status) => Err(FetchError::Status {
                url: url.to_string(),
                status,
            }),
            Canned::NetworkDown => Err(FetchError::Network {
                url: url.to_string(),
                message: "connection refused".to_string(),
            }),
        }
    }

    async fn snapshot(&self) -> Result<Option<Snapshot>> {
        let last = self.last.lock().unwrap().clone();
        Ok(last.map(|url| Snapshot::Html(format!("<!-- {} -->", url))))
    }

    fn engine_name(&self) -> &'static str {
        "scripted"
    }
}
