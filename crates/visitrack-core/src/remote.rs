//! Remote tracking service client
//!
//! The backend is an external collaborator speaking JSON over HTTP:
//!
//! | Operation | Method | Path |
//! |---|---|---|
//! | create visitor | POST | `user-tracking/` |
//! | fetch visitor | GET | `user-details/{id}/` |
//! | update visit | PATCH | `user-details/{id}/update/` |
//! | fetch aggregate | GET | `total-visits/` |
//!
//! Paths resolve against the configured base URL.

use crate::config::TrackingConfig;
use crate::error::{ConfigError, RemoteError};
use crate::types::{AggregateStats, VisitPatch, VisitorId, VisitorRecord};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;

/// Operations offered by the remote tracking service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteTracking: Send + Sync + std::fmt::Debug {
    /// Create a visitor; returns the stored record
    async fn create_visitor(&self, record: &VisitorRecord) -> Result<VisitorRecord, RemoteError>;

    /// Fetch a visitor; `Ok(None)` if the service has no such record
    async fn fetch_visitor(&self, id: &VisitorId) -> Result<Option<VisitorRecord>, RemoteError>;

    /// Apply a partial update; returns the updated record
    async fn update_visit(
        &self,
        id: &VisitorId,
        patch: &VisitPatch,
    ) -> Result<VisitorRecord, RemoteError>;

    /// Fetch site-wide statistics
    async fn fetch_aggregate(&self) -> Result<AggregateStats, RemoteError>;
}

/// Run a remote call, failing with `RemoteError::Timeout` after `timeout`
pub(crate) async fn bounded<T, F>(timeout: Duration, call: F) -> Result<T, RemoteError>
where
    F: Future<Output = Result<T, RemoteError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(RemoteError::Timeout {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

/// `reqwest`-backed implementation
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: Url,
}

impl HttpRemote {
    /// Create client for `base_url` with a per-request timeout
    ///
    /// # Errors
    /// - `RemoteError::InvalidUrl` if `base_url` does not parse or cannot carry paths
    /// - `RemoteError::Transport` if the HTTP client cannot be built
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let mut base_url =
            Url::parse(base_url).map_err(|e| RemoteError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::InvalidUrl(base_url.to_string()));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("visitrack/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, base_url })
    }

    /// Create client from configuration
    ///
    /// # Errors
    /// - `ConfigError::Invalid` if the configured base URL is unusable
    pub fn from_config(config: &TrackingConfig) -> Result<Self, ConfigError> {
        Self::new(&config.api_base_url, config.request_timeout())
            .map_err(|e| ConfigError::invalid("api_base_url", e.to_string()))
    }

    /// Base URL all paths resolve against
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve segments under the base URL, keeping a trailing slash.
    ///
    /// Each segment is percent-encoded, so an id cannot escape its slot.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| RemoteError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments)
            .push("");
        Ok(url)
    }

    async fn send<B, T>(&self, method: Method, url: Url, body: Option<&B>) -> Result<Option<T>, RemoteError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let mut request = self.client.request(method.clone(), url.clone());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                tracing::debug!(%url, "remote request timed out");
            }
            RemoteError::Transport(e)
        })?;

        let status = response.status();
        tracing::debug!(%method, %url, status = status.as_u16(), "remote response");
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| RemoteError::Decode(format!("{url}: {e}")))
    }
}

#[async_trait]
impl RemoteTracking for HttpRemote {
    async fn create_visitor(&self, record: &VisitorRecord) -> Result<VisitorRecord, RemoteError> {
        let url = self.endpoint(&["user-tracking"])?;
        self.send(Method::POST, url.clone(), Some(record))
            .await?
            .ok_or_else(|| RemoteError::Status {
                status: StatusCode::NOT_FOUND.as_u16(),
                url: url.to_string(),
            })
    }

    async fn fetch_visitor(&self, id: &VisitorId) -> Result<Option<VisitorRecord>, RemoteError> {
        let url = self.endpoint(&["user-details", id.as_str()])?;
        self.send::<(), _>(Method::GET, url, None).await
    }

    async fn update_visit(
        &self,
        id: &VisitorId,
        patch: &VisitPatch,
    ) -> Result<VisitorRecord, RemoteError> {
        let url = self.endpoint(&["user-details", id.as_str(), "update"])?;
        self.send(Method::PATCH, url, Some(patch))
            .await?
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))
    }

    async fn fetch_aggregate(&self) -> Result<AggregateStats, RemoteError> {
        let url = self.endpoint(&["total-visits"])?;
        self.send::<(), _>(Method::GET, url.clone(), None)
            .await?
            .ok_or_else(|| RemoteError::Status {
                status: StatusCode::NOT_FOUND.as_u16(),
                url: url.to_string(),
            })
    }
}
