//! Retrieval of remote documents for data layers

use crate::prelude::{Arc, HashMap, Mutex};
use crate::{MapError, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::time::Duration;

/// Shared async HTTP client for document fetching
pub(crate) static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .user_agent(concat!("maplet-bridge/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(30))
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .unwrap_or_else(|e| {
            log::warn!("falling back to default HTTP client: {}", e);
            reqwest::Client::new()
        })
});

/// Fetches the raw text of a document
///
/// Failures must be reported as [`MapError::Network`]; parsing is not the
/// fetcher's concern.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Fetcher backed by reqwest
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: Option<reqwest::Client>,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client: Some(client),
        }
    }

    fn client(&self) -> &reqwest::Client {
        self.client.as_ref().unwrap_or(&*HTTP_CLIENT)
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        log::debug!("fetching document {}", url);
        let response = self.client().get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MapError::Network(format!("{} returned HTTP {}", url, status)));
        }
        Ok(response.text().await?)
    }
}

/// In-memory fetcher keyed by url
///
/// Each url can optionally be delayed to simulate slow responses; unknown urls
/// fail with a network error.
#[derive(Debug, Clone, Default)]
pub struct MemoryFetcher {
    documents: Arc<Mutex<HashMap<String, MemoryDocument>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

#[derive(Debug, Clone)]
struct MemoryDocument {
    body: Result<String>,
    delay: Duration,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: impl Into<String>, body: impl Into<String>) -> &Self {
        self.insert_with_delay(url, body, Duration::ZERO)
    }

    pub fn insert_with_delay(
        &self,
        url: impl Into<String>,
        body: impl Into<String>,
        delay: Duration,
    ) -> &Self {
        self.put(url.into(), Ok(body.into()), delay);
        self
    }

    /// Makes `url` fail with a network error
    pub fn insert_failure(&self, url: impl Into<String>, message: impl Into<String>) -> &Self {
        self.put(url.into(), Err(MapError::Network(message.into())), Duration::ZERO);
        self
    }

    /// Every url requested so far, in request order
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn put(&self, url: String, body: Result<String>, delay: Duration) {
        if let Ok(mut documents) = self.documents.lock() {
            documents.insert(url, MemoryDocument { body, delay });
        }
    }
}

#[async_trait]
impl DocumentFetcher for MemoryFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.to_string());
        }
        let document = self
            .documents
            .lock()
            .ok()
            .and_then(|documents| documents.get(url).cloned());

        match document {
            Some(document) => {
                if !document.delay.is_zero() {
                    tokio::time::sleep(document.delay).await;
                }
                document.body
            }
            None => Err(MapError::Network(format!("{} is unreachable", url))),
        }
    }
}
