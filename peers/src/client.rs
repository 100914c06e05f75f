//! Shared HTTP plumbing for every peer.

use crate::jsonapi;
use realm_core::Tenant;
use realm_core::peer::PeerError;
use realm_core::tenant::{MAJOR_VERSION_HEADER, MINOR_VERSION_HEADER, REGION_HEADER, TENANT_ID_HEADER};
use realm_runtime::retry::{RetryPolicy, retry_with_predicate};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Default root of the peer services.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api/";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const JSON_API: &str = "application/vnd.api+json";

/// JSON:API client with tenant headers, timeout and retry.
///
/// Reads and deletes are retried while the peer is unavailable. Creates are
/// sent once.
#[derive(Clone, Debug)]
pub struct PeerClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl PeerClient {
    /// Client rooted at `base_url` with the default timeout and retry policy.
    ///
    /// # Errors
    ///
    /// Returns the reqwest error if the TLS backend cannot be initialized.
    pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Client with an explicit request timeout.
    ///
    /// # Errors
    ///
    /// Returns the reqwest error if the TLS backend cannot be initialized.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Ok(Self {
            client,
            base_url,
            retry: RetryPolicy::default(),
        })
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Root every path is resolved against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Fetch one resource. A 404 becomes [`PeerError::NotFound`] carrying `id`.
    ///
    /// # Errors
    ///
    /// Returns [`PeerError::NotFound`] on 404, [`PeerError::Decode`] for an
    /// unreadable body and [`PeerError::Unavailable`] once retries are spent.
    pub async fn get_one<T: DeserializeOwned>(
        &self,
        peer: &'static str,
        tenant: &Tenant,
        path: &str,
        id: impl ToString,
    ) -> Result<T, PeerError> {
        let id = id.to_string();
        let body = self.get_with_retry(peer, tenant, path, &id).await?;
        jsonapi::decode_one(&body).map_err(|e| decode_error(peer, &e))
    }

    /// Fetch a collection. A 404 is an empty collection.
    ///
    /// # Errors
    ///
    /// Returns [`PeerError::Decode`] for an unreadable body and
    /// [`PeerError::Unavailable`] once retries are spent.
    pub async fn get_many<T: DeserializeOwned>(
        &self,
        peer: &'static str,
        tenant: &Tenant,
        path: &str,
    ) -> Result<Vec<T>, PeerError> {
        match self.get_with_retry(peer, tenant, path, path).await {
            Ok(body) => jsonapi::decode_many(&body).map_err(|e| decode_error(peer, &e)),
            Err(PeerError::NotFound { .. }) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Create a resource of `kind` under `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PeerError::Decode`] when the attributes cannot be encoded and
    /// [`PeerError::Unavailable`] when the peer refuses or cannot be reached.
    pub async fn post<T: Serialize>(
        &self,
        peer: &'static str,
        tenant: &Tenant,
        path: &str,
        kind: &str,
        attributes: &T,
    ) -> Result<(), PeerError> {
        let body = jsonapi::encode(kind, attributes).map_err(|e| decode_error(peer, &e))?;
        let url = self.url(path);
        tracing::trace!(peer, url = %url, "Peer create");
        let response = self
            .request(Method::POST, tenant, &url)
            .header(CONTENT_TYPE, JSON_API)
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| unavailable(peer, &e))?;
        expect_success(peer, response.status(), path)
    }

    /// Delete whatever lives at `path`. A 404 counts as deleted.
    ///
    /// # Errors
    ///
    /// Returns [`PeerError::Unavailable`] once retries are spent.
    pub async fn delete(&self, peer: &'static str, tenant: &Tenant, path: &str) -> Result<(), PeerError> {
        let url = self.url(path);
        let attempt = || async {
            tracing::trace!(peer, url = %url, "Peer delete");
            let response = self
                .request(Method::DELETE, tenant, &url)
                .send()
                .await
                .map_err(|e| unavailable(peer, &e))?;
            match expect_success(peer, response.status(), path) {
                Err(PeerError::NotFound { .. }) => Ok(()),
                other => other,
            }
        };
        retry_with_predicate(&self.retry, peer, attempt, |e| {
            matches!(e, PeerError::Unavailable { .. })
        })
        .await
    }

    fn request(&self, method: Method, tenant: &Tenant, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(ACCEPT, JSON_API)
            .header(TENANT_ID_HEADER, tenant.id.to_string())
            .header(REGION_HEADER, &tenant.region)
            .header(MAJOR_VERSION_HEADER, tenant.major_version.to_string())
            .header(MINOR_VERSION_HEADER, tenant.minor_version.to_string())
    }

    async fn get_with_retry(
        &self,
        peer: &'static str,
        tenant: &Tenant,
        path: &str,
        id: &str,
    ) -> Result<Vec<u8>, PeerError> {
        let url = self.url(path);
        retry_with_predicate(
            &self.retry,
            peer,
            || self.get(peer, tenant, &url, id),
            |e| matches!(e, PeerError::Unavailable { .. }),
        )
        .await
    }

    async fn get(&self, peer: &'static str, tenant: &Tenant, url: &str, id: &str) -> Result<Vec<u8>, PeerError> {
        tracing::trace!(peer, url, "Peer request");
        let response = self
            .request(Method::GET, tenant, url)
            .send()
            .await
            .map_err(|e| unavailable(peer, &e))?;

        match response.status() {
            StatusCode::OK => response
                .bytes()
                .await
                .map(|bytes| bytes.to_vec())
                .map_err(|e| unavailable(peer, &e)),
            StatusCode::NOT_FOUND => Err(PeerError::NotFound {
                peer,
                id: id.to_string(),
            }),
            status => Err(PeerError::Unavailable {
                peer,
                reason: format!("HTTP {}", status.as_u16()),
            }),
        }
    }
}

fn expect_success(peer: &'static str, status: StatusCode, path: &str) -> Result<(), PeerError> {
    if status.is_success() {
        Ok(())
    } else if status == StatusCode::NOT_FOUND {
        Err(PeerError::NotFound {
            peer,
            id: path.to_string(),
        })
    } else {
        Err(PeerError::Unavailable {
            peer,
            reason: format!("HTTP {}", status.as_u16()),
        })
    }
}

fn unavailable(peer: &'static str, err: &reqwest::Error) -> PeerError {
    PeerError::Unavailable {
        peer,
        reason: err.to_string(),
    }
}

fn decode_error(peer: &'static str, err: &serde_json::Error) -> PeerError {
    PeerError::Decode {
        peer,
        reason: err.to_string(),
    }
}
