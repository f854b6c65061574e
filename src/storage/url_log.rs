use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use tracing::{debug, info};

/// Append-only log of discovered listing URLs, one per line
pub struct UrlLog {
    path: PathBuf,
    urls: Vec<String>,
    seen: HashSet<String>,
}

impl UrlLog {
    /// Open the log, loading any URLs already in it. Blank and repeated
    /// lines in an existing file are ignored.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let mut log = Self {
            path,
            urls: Vec::new(),
            seen: HashSet::new(),
        };

        if log.path.exists() {
            let file = File::open(&log.path)
                .with_context(|| format!("Failed to open {}", log.path.display()))?;
            for line in BufReader::new(file).lines() {
                let line = line.with_context(|| format!("Failed to read {}", log.path.display()))?;
                let url = line.trim();
                if !url.is_empty() && log.seen.insert(url.to_string()) {
                    log.urls.push(url.to_string());
                }
            }
            info!(path = %log.path.display(), urls = log.urls.len(), "Loaded discovered URLs");
        }

        Ok(log)
    }

    /// URLs in the order they were discovered
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    /// Append a URL unless it is already logged. Returns whether it was new.
    pub fn append(&mut self, url: &str) -> Result<bool> {
        let url = url.trim();
        if url.is_empty() || self.seen.contains(url) {
            return Ok(false);
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        writeln!(file, "{}", url)
            .and_then(|_| file.flush())
            .with_context(|| format!("Failed to append to {}", self.path.display()))?;

        debug!(url, "Logged discovered URL");
        self.seen.insert(url.to_string());
        self.urls.push(url.to_string());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_only_new_urls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls_descobertas_jacarei_sp.txt");

        let mut log = UrlLog::open(&path).unwrap();
        assert!(log.append("https://www.airbnb.com.br/rooms/1").unwrap());
        assert!(log.append("https://www.airbnb.com.br/rooms/2").unwrap());
        assert!(!log.append("https://www.airbnb.com.br/rooms/1").unwrap());
        assert!(!log.append("   ").unwrap());

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "https://www.airbnb.com.br/rooms/1\nhttps://www.airbnb.com.br/rooms/2\n"
        );
    }

    #[test]
    fn reopen_keeps_order_and_skips_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.txt");
        std::fs::write(&path, "b\n\na\nb\n").unwrap();

        let mut log = UrlLog::open(&path).unwrap();
        assert_eq!(log.urls(), &["b".to_string(), "a".to_string()]);
        assert!(!log.append("a").unwrap());
        assert!(log.append("c").unwrap());

        let reopened = UrlLog::open(&path).unwrap();
        assert_eq!(reopened.len(), 3);
        assert_eq!(reopened.urls()[2], "c");
    }
}
