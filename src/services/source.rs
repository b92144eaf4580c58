// src/services/source.rs

//! Access to the bulletin listing and bulletin files.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::HttpConfig;
use crate::utils::http::create_async_client;

/// Source of listing pages and bulletin files.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Fetch a listing page as text.
    async fn fetch_text(&self, url: &str) -> Result<String>;

    /// Fetch a bulletin file as raw bytes.
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>>;
}

/// Caps on requests in flight, overall and per host.
///
/// A request holds one permit from its host's semaphore and one from the
/// global semaphore until the permit is dropped.
pub struct RequestGate {
    global: Arc<Semaphore>,
    max_per_host: usize,
    hosts: Mutex<HashMap<String, Arc<Semaphore>>>,
}

/// Both permits of an admitted request.
pub struct GatePermit {
    _host: OwnedSemaphorePermit,
    _global: OwnedSemaphorePermit,
}

impl RequestGate {
    pub fn new(max_connections: usize, max_per_host: usize) -> Self {
        Self {
            global: Arc::new(Semaphore::new(max_connections.max(1))),
            max_per_host: max_per_host.max(1),
            hosts: Mutex::new(HashMap::new()),
        }
    }

    fn host_semaphore(&self, host: &str) -> Arc<Semaphore> {
        self.hosts
            .lock()
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.max_per_host)))
            .clone()
    }

    /// Wait until a request to `url` fits under both caps.
    ///
    /// The host permit is taken first so a request queued behind a busy host
    /// does not hold a global slot.
    pub async fn acquire(&self, url: &str) -> Result<GatePermit> {
        let parsed = Url::parse(url)?;
        let host = parsed
            .host_str()
            .ok_or_else(|| AppError::fetch(url, "URL has no host"))?;

        let host_permit = self
            .host_semaphore(host)
            .acquire_owned()
            .await
            .map_err(|e| AppError::fetch(url, e))?;
        let global_permit = self
            .global
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| AppError::fetch(url, e))?;

        Ok(GatePermit {
            _host: host_permit,
            _global: global_permit,
        })
    }
}

/// HTTP-backed listing source.
///
/// A [`RequestGate`] caps requests in flight across every pipeline sharing
/// this source, independently of the pipeline concurrency.
#[derive(Clone)]
pub struct HttpListingSource {
    client: Client,
    gate: Arc<RequestGate>,
}

impl HttpListingSource {
    /// Build a source with a fresh client from the HTTP settings.
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = create_async_client(config)?;
        Ok(Self::with_client(
            client,
            RequestGate::new(config.max_connections, config.max_per_host),
        ))
    }

    /// Wrap an existing client.
    pub fn with_client(client: Client, gate: RequestGate) -> Self {
        Self {
            client,
            gate: Arc::new(gate),
        }
    }

    async fn acquire(&self, url: &str) -> Result<GatePermit> {
        self.gate.acquire(url).await
    }
}

#[async_trait]
impl ListingSource for HttpListingSource {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        let _permit = self.acquire(url).await?;
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let _permit = self.acquire(url).await?;
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// In-flight counter that remembers its high-water mark.
    #[derive(Default)]
    struct Peak {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Peak {
        fn enter(&self) {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
        }

        fn leave(&self) {
            self.current.fetch_sub(1, Ordering::SeqCst);
        }

        fn peak(&self) -> usize {
            self.peak.load(Ordering::SeqCst)
        }
    }

    /// Hold a gate permit for a while, tracking the host and the total.
    async fn slow_request(
        gate: Arc<RequestGate>,
        url: String,
        host: Arc<Peak>,
        total: Arc<Peak>,
    ) {
        let _permit = gate.acquire(&url).await.unwrap();
        host.enter();
        total.enter();
        tokio::time::sleep(Duration::from_millis(20)).await;
        total.leave();
        host.leave();
    }

    #[tokio::test]
    async fn test_single_host_stays_under_per_host_cap() {
        let gate = Arc::new(RequestGate::new(100, 3));
        let host = Arc::new(Peak::default());
        let total = Arc::new(Peak::default());

        let tasks: Vec<_> = (0..12)
            .map(|i| {
                tokio::spawn(slow_request(
                    gate.clone(),
                    format!("https://spimex.com/upload/reports/oil_xls/{i}.xls"),
                    host.clone(),
                    total.clone(),
                ))
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(host.peak(), 3);
    }

    #[tokio::test]
    async fn test_hosts_share_the_global_cap() {
        let gate = Arc::new(RequestGate::new(4, 3));
        let spimex = Arc::new(Peak::default());
        let mirror = Arc::new(Peak::default());
        let total = Arc::new(Peak::default());

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let (base, host) = if i % 2 == 0 {
                    ("https://spimex.com", spimex.clone())
                } else {
                    ("https://mirror.spimex.com", mirror.clone())
                };
                tokio::spawn(slow_request(
                    gate.clone(),
                    format!("{base}/markets/oil_products/trades/results/?page=page-{i}"),
                    host,
                    total.clone(),
                ))
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert!(spimex.peak() <= 3);
        assert!(mirror.peak() <= 3);
        assert_eq!(total.peak(), 4);
    }

    #[tokio::test]
    async fn test_http_source_applies_configured_caps() {
        let config = HttpConfig {
            max_connections: 5,
            max_per_host: 2,
            ..HttpConfig::default()
        };
        let source = Arc::new(HttpListingSource::new(&config).unwrap());
        let peak = Arc::new(Peak::default());

        let tasks: Vec<_> = (0..10)
            .map(|i| {
                let source = source.clone();
                let peak = peak.clone();
                tokio::spawn(async move {
                    let url = format!("https://spimex.com/upload/reports/oil_xls/{i}.xls");
                    let _permit = source.acquire(&url).await.unwrap();
                    peak.enter();
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    peak.leave();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(peak.peak(), 2);
    }

    #[tokio::test]
    async fn test_url_without_host_is_rejected() {
        let gate = RequestGate::new(1, 1);
        assert!(gate.acquire("not a url").await.is_err());
        assert!(gate.acquire("data:text/plain,bulletin").await.is_err());
    }
}
