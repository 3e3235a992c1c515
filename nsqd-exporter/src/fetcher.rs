//! Snapshot fetcher: HTTP GET of a nsqd stats document.
//!
//! The orchestrator only sees the `SnapshotFetcher` trait, so tests can plug in
//! scripted fetchers. Deadlines are enforced by the caller dropping the future.

use crate::models::Snapshot;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;

/// Upstream failures, all downgraded to `scrape_success 0` by the orchestrator
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("invalid stats document from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0}")]
    Other(String),
}

pub trait SnapshotFetcher: Send + Sync {
    fn fetch<'a>(&'a self, target: &'a str) -> BoxFuture<'a, Result<Snapshot, FetchError>>;
}

pub type SharedFetcher = Arc<dyn SnapshotFetcher>;

/// `nsqd:4151`, `http://nsqd:4151/` -> `http://nsqd:4151`
pub fn normalize_target(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    stats_path: String,
}

impl HttpFetcher {
    pub fn new(stats_path: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            stats_path: stats_path.into(),
        }
    }

    pub fn stats_url(&self, target: &str) -> String {
        let path = self.stats_path.trim_start_matches('/');
        format!("{}/{}", normalize_target(target), path)
    }

    async fn get(&self, target: &str) -> Result<Snapshot, FetchError> {
        let url = self.stats_url(target);
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.clone(),
                source,
            })?;
        Snapshot::from_json(&body).map_err(|source| FetchError::Decode { url, source })
    }
}

impl SnapshotFetcher for HttpFetcher {
    fn fetch<'a>(&'a self, target: &'a str) -> BoxFuture<'a, Result<Snapshot, FetchError>> {
        self.get(target).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_target() {
        assert_eq!(normalize_target("nsqd:4151"), "http://nsqd:4151");
        assert_eq!(normalize_target(" http://nsqd:4151/ "), "http://nsqd:4151");
        assert_eq!(normalize_target("https://nsqd"), "https://nsqd");
    }

    #[test]
    fn test_stats_url() {
        let fetcher = HttpFetcher::new("/stats?format=json");
        assert_eq!(
            fetcher.stats_url("nsqd:4151"),
            "http://nsqd:4151/stats?format=json"
        );
    }

    #[tokio::test]
    async fn test_unreachable_target_is_transport_error() {
        // port 9 (discard) : connexion refusée en local
        let fetcher = HttpFetcher::new("/stats?format=json");
        let err = fetcher.fetch("127.0.0.1:9").await.unwrap_err();
        assert!(matches!(err, FetchError::Transport { .. }), "got {err}");
    }
}
