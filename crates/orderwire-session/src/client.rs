//! [`SessionClient`]: authenticated calls with refresh-and-retry and
//! coalescing of identical reads.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use reqwest::Method;
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{Instrument, debug, instrument, warn};

use orderwire_core::{CredentialStore, RelayError, Result};

use crate::classify::{Classified, classify, parse_body};
use crate::config::SessionConfig;
use crate::refresh::PendingRefresh;
use crate::signature::{RequestSignature, is_coalescable};
use crate::types::ApiResponse;

type SharedCall = Shared<BoxFuture<'static, Result<ApiResponse>>>;

struct InFlight {
    id: u64,
    call: SharedCall,
}

/// Authenticated HTTP client.
///
/// Cheap to clone; clones share credentials, the refresh slot and the
/// in-flight request table. Must be used from within a tokio runtime.
#[derive(Clone)]
pub struct SessionClient {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    pub(crate) http: reqwest::Client,
    pub(crate) config: SessionConfig,
    pub(crate) credentials: CredentialStore,
    pub(crate) refresh: Mutex<Option<PendingRefresh>>,
    /// Access token whose last refresh attempt failed. Locked after `refresh`.
    pub(crate) refresh_failed: Mutex<Option<String>>,
    in_flight: Mutex<HashMap<RequestSignature, InFlight>>,
    next_id: AtomicU64,
}

impl SessionClient {
    /// Client with its own connection pool.
    pub fn new(config: SessionConfig, credentials: CredentialStore) -> Self {
        Self::with_http_client(config, credentials, reqwest::Client::new())
    }

    /// Client reusing an existing `reqwest` pool.
    pub fn with_http_client(
        config: SessionConfig,
        credentials: CredentialStore,
        http: reqwest::Client,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                http,
                config,
                credentials,
                refresh: Mutex::new(None),
                refresh_failed: Mutex::new(None),
                in_flight: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Shared credential store.
    pub fn credentials(&self) -> &CredentialStore {
        &self.inner.credentials
    }

    /// Client configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Number of coalesced reads currently awaiting a response.
    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight.lock().len()
    }

    /// Issue an authenticated request.
    ///
    /// `GET` and `HEAD` calls with the same URL and body share one network
    /// request while it is outstanding. An auth failure triggers a refresh
    /// (shared with every other caller) and exactly one retry.
    #[instrument(skip_all, fields(method = %method, path = %path))]
    pub async fn call(&self, method: Method, path: &str, body: Option<Value>) -> Result<ApiResponse> {
        let url = self.inner.config.url(path);
        if !is_coalescable(&method) {
            return self.inner.execute(&method, &url, body.as_ref()).await;
        }
        let signature = RequestSignature::new(&method, &url, body.as_ref());
        self.inner.join_or_start(signature, method, url, body).await
    }

    /// `GET path`.
    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.call(Method::GET, path, None).await
    }

    /// `POST path` with a JSON body.
    pub async fn post(&self, path: &str, body: Value) -> Result<ApiResponse> {
        self.call(Method::POST, path, Some(body)).await
    }

    /// `GET path`, decoding the body into `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get(path).await?.json()
    }

    /// `POST path`, decoding the body into `T`.
    pub async fn post_json<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T> {
        self.post(path, body).await?.json()
    }

    /// Refresh the access token, joining a refresh already in flight.
    ///
    /// Resolves `true` once a new credential is stored; `false` when there is
    /// no refresh token or the refresh endpoint rejects it. A failed refresh
    /// leaves the credential untouched.
    pub async fn refresh_if_needed(&self) -> bool {
        self.inner.refresh_shared().await
    }

    pub(crate) fn inner(&self) -> &Arc<ClientInner> {
        &self.inner
    }
}

impl ClientInner {
    fn join_or_start(
        self: &Arc<Self>,
        signature: RequestSignature,
        method: Method,
        url: String,
        body: Option<Value>,
    ) -> SharedCall {
        let mut in_flight = self.in_flight.lock();
        if let Some(entry) = in_flight.get(&signature) {
            debug!("joining in-flight request");
            return entry.call.clone();
        }

        let id = self.next_id();
        let inner = Arc::clone(self);
        let key = signature.clone();
        // The entry is inserted before the lock is released, so `settle`
        // cannot run ahead of it.
        let task = tokio::spawn(
            async move {
                let result = inner.execute(&method, &url, body.as_ref()).await;
                inner.settle(&key, id);
                result
            }
            .instrument(tracing::Span::current()),
        );
        let call = async move {
            task.await
                .unwrap_or_else(|e| Err(RelayError::network(format!("request task failed: {e}"))))
        }
        .boxed()
        .shared();

        let _ = in_flight.insert(
            signature,
            InFlight {
                id,
                call: call.clone(),
            },
        );
        call
    }

    fn settle(&self, signature: &RequestSignature, id: u64) {
        let mut in_flight = self.in_flight.lock();
        if in_flight.get(signature).is_some_and(|entry| entry.id == id) {
            let _ = in_flight.remove(signature);
        }
    }

    pub(crate) fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn execute(
        self: &Arc<Self>,
        method: &Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<ApiResponse> {
        let Some(credential) = self.credentials.current() else {
            return Err(RelayError::unauthorized("no credential available"));
        };

        let message = match self.send(method, url, body, &credential.access_token).await? {
            Classified::Success(response) => return Ok(response),
            Classified::Failure(err) => return Err(err),
            Classified::AuthFailure { message } => message,
        };

        debug!(%message, "request rejected as unauthorized, refreshing");
        if !self.refresh_after_rejection(&credential.access_token).await {
            return Err(RelayError::unauthorized(message));
        }
        let Some(token) = self.credentials.access_token() else {
            return Err(RelayError::unauthorized("credential cleared during refresh"));
        };

        match self.send(method, url, body, &token).await? {
            Classified::Success(response) => Ok(response),
            Classified::Failure(err) => Err(err),
            Classified::AuthFailure { message } => {
                warn!(%message, "request still unauthorized after refresh");
                Err(RelayError::unauthorized(message))
            }
        }
    }

    async fn send(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Value>,
        token: &str,
    ) -> Result<Classified> {
        let mut request = self
            .http
            .request(method.clone(), url)
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .timeout(self.config.request_timeout);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RelayError::network(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| RelayError::network(e.to_string()))?;

        debug!(status, "response received");
        Ok(classify(status, parse_body(&text), &self.config.auth_failure))
    }
}
