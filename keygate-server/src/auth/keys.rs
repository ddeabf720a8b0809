use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use keygate_core::{Jwks, JWKS_PATH};
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

/// Upper bound on a key set request, including connect and body.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_millis(2000);

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} responded with HTTP {status}")]
    Status { url: String, status: StatusCode },
    #[error("{url} did not return a valid key set: {source}")]
    InvalidKeySet {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Transport { source, .. } if source.is_timeout())
    }
}

/// URL of the key set an issuer publishes. A single trailing slash on the
/// issuer is dropped first.
pub fn jwks_url(issuer: &str) -> String {
    format!("{}{}", issuer.strip_suffix('/').unwrap_or(issuer), JWKS_PATH)
}

/// Retrieves key sets over HTTP.
#[derive(Clone, Debug)]
pub struct KeyFetcher {
    client: reqwest::Client,
}

impl KeyFetcher {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(DEFAULT_FETCH_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client })
    }

    pub async fn fetch(&self, issuer: &str) -> Result<Jwks, FetchError> {
        let url = jwks_url(issuer);
        tracing::debug!(url = url.as_str(), "fetching issuer signing keys");

        let response = match self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(source) => return Err(FetchError::Transport { url, source }),
        };

        let status = response.status();
        if status.as_u16() >= 300 {
            return Err(FetchError::Status { url, status });
        }

        match response.json::<Jwks>().await {
            Ok(jwks) => Ok(jwks),
            Err(source) if source.is_timeout() => Err(FetchError::Transport { url, source }),
            Err(source) => Err(FetchError::InvalidKeySet { url, source }),
        }
    }
}

/// Key sets by issuer, fetched on first use and kept for the life of the
/// cache. Entries are never replaced or evicted, and failed fetches are not
/// remembered, so the next request for that issuer tries again.
#[derive(Debug)]
pub struct KeyCache {
    fetcher: KeyFetcher,
    keys: RwLock<HashMap<String, Arc<Jwks>>>,
    fetch_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyCache {
    pub fn new(fetcher: KeyFetcher) -> Self {
        Self {
            fetcher,
            keys: RwLock::new(HashMap::new()),
            fetch_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the key set for `issuer`, fetching it if it is not cached yet.
    ///
    /// Concurrent callers missing the same issuer wait for a single fetch.
    pub async fn ensure_keys(&self, issuer: &str) -> Result<Arc<Jwks>, FetchError> {
        if let Some(jwks) = self.cached(issuer).await {
            tracing::trace!(issuer = issuer, "signing keys cached");
            return Ok(jwks);
        }

        let issuer_lock = self
            .fetch_locks
            .lock()
            .await
            .entry(issuer.to_string())
            .or_default()
            .clone();
        let _guard = issuer_lock.lock().await;

        // Someone else may have populated it while we waited.
        if let Some(jwks) = self.cached(issuer).await {
            return Ok(jwks);
        }

        let jwks = match self.fetcher.fetch(issuer).await {
            Ok(jwks) => Arc::new(jwks),
            Err(e) => {
                tracing::warn!(issuer = issuer, err = %e, "failed to fetch signing keys");
                return Err(e);
            }
        };

        let jwks = self
            .keys
            .write()
            .await
            .entry(issuer.to_string())
            .or_insert(jwks)
            .clone();

        let key_ids = jwks.key_ids();
        tracing::debug!(
            issuer = issuer,
            "cached {} signing key(s): {}",
            key_ids.len(),
            key_ids.join(", ")
        );

        Ok(jwks)
    }

    pub async fn cached(&self, issuer: &str) -> Option<Arc<Jwks>> {
        self.keys.read().await.get(issuer).cloned()
    }

    /// Seeds the cache, e.g. with keys distributed out of band. An issuer
    /// that already has keys keeps them.
    pub async fn insert(&self, issuer: &str, jwks: Jwks) -> Arc<Jwks> {
        self.keys
            .write()
            .await
            .entry(issuer.to_string())
            .or_insert_with(|| Arc::new(jwks))
            .clone()
    }

    pub async fn len(&self) -> usize {
        self.keys.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.keys.read().await.is_empty()
    }
}
