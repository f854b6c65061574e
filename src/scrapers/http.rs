use crate::models::PageKind;
use crate::scrapers::airbnb::page_title;
use crate::scrapers::traits::PageFetcher;
use crate::scrapers::types::{looks_blocked, FetchError, FetchedPage, Snapshot, USER_AGENT};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// Plain HTTP fetcher. Only sees server-rendered HTML, no scripts run.
pub struct HttpFetcher {
    client: Client,
    // Body of the latest response, whatever its status
    last_body: Mutex<Option<String>>,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            last_body: Mutex::new(None),
        })
    }

    fn remember(&self, body: Option<String>) {
        if let Ok(mut last) = self.last_body.lock() {
            *last = body;
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, kind: PageKind) -> Result<FetchedPage, FetchError> {
        debug!(url, kind = kind.as_str(), "Fetching URL");

        let response = match self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT_LANGUAGE, "pt-BR,pt;q=0.9,en;q=0.8")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.remember(None);
                return Err(network_error(url, e));
            }
        };

        let status = response.status();
        let final_url = response.url().to_string();

        let html = match response.text().await {
            Ok(html) => html,
            Err(e) => {
                self.remember(None);
                return Err(network_error(url, e));
            }
        };
        self.remember(Some(html.clone()));

        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::FORBIDDEN {
            warn!(url, %status, "Request refused by the site");
            return Err(FetchError::RateLimited {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            warn!(url, %status, "Unexpected status");
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let title = page_title(&html).unwrap_or_default();
        if looks_blocked(&final_url, &title) {
            return Err(FetchError::Blocked {
                url: url.to_string(),
            });
        }

        debug!(url, bytes = html.len(), "Downloaded HTML");

        Ok(FetchedPage {
            url: final_url,
            title,
            html,
        })
    }

    async fn snapshot(&self) -> Result<Option<Snapshot>> {
        let last = self
            .last_body
            .lock()
            .map_err(|_| anyhow::anyhow!("snapshot lock poisoned"))?;
        Ok(last.clone().map(Snapshot::Html))
    }

    fn engine_name(&self) -> &'static str {
        "http"
    }
}

fn network_error(url: &str, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
            what: "response".to_string(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves fixed responses by path until the test ends
    async fn serve(routes: Vec<(&'static str, u16, &'static str)>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };

                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                let request = String::from_utf8_lossy(&request);
                let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();
                let (status, body) = routes
                    .iter()
                    .find(|(p, _, _)| *p == path)
                    .map(|(_, s, b)| (*s, *b))
                    .unwrap_or((404, "<html>missing</html>"));

                let response = format!(
                    "HTTP/1.1 {} X\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        addr
    }

    // Direct to the local listener even when the environment sets a proxy
    fn fetcher() -> HttpFetcher {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .user_agent(USER_AGENT)
            .no_proxy()
            .build()
            .unwrap();
        HttpFetcher {
            client,
            last_body: Mutex::new(None),
        }
    }

    async fn snapshot_html(fetcher: &HttpFetcher) -> Option<String> {
        match fetcher.snapshot().await.unwrap() {
            Some(Snapshot::Html(html)) => Some(html),
            Some(Snapshot::Png(_)) => panic!("http engine has no screenshots"),
            None => None,
        }
    }

    #[tokio::test]
    async fn returns_page_with_title() {
        let addr = serve(vec![(
            "/rooms/1",
            200,
            "<html><head><title>Casa no centro</title></head><body><h1>Casa</h1></body></html>",
        )])
        .await;
        let url = format!("http://{}/rooms/1", addr);

        let page = fetcher().fetch(&url, PageKind::Listing).await.unwrap();
        assert_eq!(page.url, url);
        assert_eq!(page.title, "Casa no centro");
        assert!(page.html.contains("<h1>Casa</h1>"));
    }

    #[tokio::test]
    async fn refused_requests_are_rate_limited() {
        let addr = serve(vec![
            ("/forbidden", 403, "<html>nope</html>"),
            ("/slow-down", 429, "<html>later</html>"),
        ])
        .await;
        let fetcher = fetcher();

        for (path, code) in [("/forbidden", 403), ("/slow-down", 429)] {
            let err = fetcher
                .fetch(&format!("http://{}{}", addr, path), PageKind::Search)
                .await
                .unwrap_err();
            assert!(
                matches!(err, FetchError::RateLimited { status, .. } if status == code),
                "{} gave {:?}",
                path,
                err
            );
        }
    }

    #[tokio::test]
    async fn other_failures_keep_their_status() {
        let addr = serve(vec![("/broken", 503, "<html>down</html>")]).await;
        let fetcher = fetcher();

        let err = fetcher
            .fetch(&format!("http://{}/broken", addr), PageKind::Listing)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503, .. }));
        assert!(err.is_retryable());

        let err = fetcher
            .fetch(&format!("http://{}/rooms/404", addr), PageKind::Listing)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn challenge_pages_are_blocked() {
        let addr = serve(vec![
            ("/captcha", 200, "<html><title>Verificação</title></html>"),
            (
                "/rooms/2",
                200,
                "<html><head><title>Security Challenge</title></head></html>",
            ),
        ])
        .await;
        let fetcher = fetcher();

        for path in ["/captcha", "/rooms/2"] {
            let err = fetcher
                .fetch(&format!("http://{}{}", addr, path), PageKind::Listing)
                .await
                .unwrap_err();
            assert!(matches!(err, FetchError::Blocked { .. }), "{} gave {:?}", path, err);
        }
        let html = snapshot_html(&fetcher).await.unwrap();
        assert!(html.contains("Security Challenge"));
    }

    #[tokio::test]
    async fn snapshot_shows_the_failed_response() {
        let addr = serve(vec![
            ("/ok", 200, "<html>PAGE-OK</html>"),
            ("/blocked", 403, "<html>CAPTCHA-WALL</html>"),
        ])
        .await;
        let fetcher = fetcher();

        assert_eq!(snapshot_html(&fetcher).await, None);

        fetcher
            .fetch(&format!("http://{}/ok", addr), PageKind::Search)
            .await
            .unwrap();
        assert_eq!(snapshot_html(&fetcher).await.as_deref(), Some("<html>PAGE-OK</html>"));

        fetcher
            .fetch(&format!("http://{}/blocked", addr), PageKind::Search)
            .await
            .unwrap_err();
        assert_eq!(
            snapshot_html(&fetcher).await.as_deref(),
            Some("<html>CAPTCHA-WALL</html>")
        );
    }

    #[tokio::test]
    async fn connection_failure_is_network_error_and_clears_snapshot() {
        let addr = serve(vec![("/ok", 200, "<html>PAGE-OK</html>")]).await;
        let fetcher = fetcher();
        fetcher
            .fetch(&format!("http://{}/ok", addr), PageKind::Search)
            .await
            .unwrap();

        // Grab a free port and close it again so nothing is listening there
        let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead = closed.local_addr().unwrap();
        drop(closed);

        let err = fetcher
            .fetch(&format!("http://{}/rooms/1", dead), PageKind::Listing)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Network { .. }), "got {:?}", err);
        assert!(err.is_fatal());
        assert_eq!(snapshot_html(&fetcher).await, None);
    }
}
