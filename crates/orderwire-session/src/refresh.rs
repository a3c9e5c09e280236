//! Single-flight token refresh.
//!
//! At most one refresh runs at a time. Callers arriving while it runs share
//! its outcome. The slot is cleared once the refresh settles, including the
//! settling pause after success. A failed refresh is remembered against the
//! access token it tried to replace, so late rejections of that token fail
//! without another refresh call.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::{debug, info, instrument, warn};

use crate::client::ClientInner;
use crate::types::{RefreshRequest, TokenEnvelope};

type SharedOutcome = Shared<BoxFuture<'static, bool>>;

pub(crate) struct PendingRefresh {
    id: u64,
    outcome: SharedOutcome,
}

impl ClientInner {
    /// Refresh after the server rejected `rejected_token`.
    ///
    /// When no refresh is running and the stored token has already moved on
    /// from `rejected_token`, the caller retries with the current token
    /// instead of refreshing again. When a refresh of `rejected_token` has
    /// already failed, the caller fails too.
    pub(crate) async fn refresh_after_rejection(self: &Arc<Self>, rejected_token: &str) -> bool {
        let outcome = {
            let mut slot = self.refresh.lock();
            if let Some(pending) = slot.as_ref() {
                pending.outcome.clone()
            } else if self
                .credentials
                .access_token()
                .is_some_and(|current| current != rejected_token)
            {
                debug!("credential rotated while request was in flight");
                return true;
            } else if self.refresh_failed.lock().as_deref() == Some(rejected_token) {
                debug!("refresh already failed for this token");
                return false;
            } else {
                self.start_refresh(&mut slot)
            }
        };
        outcome.await
    }

    /// Join the running refresh or start one.
    pub(crate) async fn refresh_shared(self: &Arc<Self>) -> bool {
        let outcome = {
            let mut slot = self.refresh.lock();
            match slot.as_ref() {
                Some(pending) => pending.outcome.clone(),
                None => self.start_refresh(&mut slot),
            }
        };
        outcome.await
    }

    fn start_refresh(self: &Arc<Self>, slot: &mut Option<PendingRefresh>) -> SharedOutcome {
        let id = self.next_id();
        let inner = Arc::clone(self);
        let attempted = self.credentials.access_token();
        let task = tokio::spawn(async move {
            let refreshed = inner.perform_refresh().await;
            if refreshed && !inner.config.refresh_settle.is_zero() {
                tokio::time::sleep(inner.config.refresh_settle).await;
            }
            inner.finish_refresh(id, if refreshed { None } else { attempted });
            refreshed
        });
        let outcome = async move { task.await.unwrap_or(false) }.boxed().shared();
        *slot = Some(PendingRefresh {
            id,
            outcome: outcome.clone(),
        });
        outcome
    }

    fn finish_refresh(&self, id: u64, failed_token: Option<String>) {
        let mut slot = self.refresh.lock();
        if slot.as_ref().is_some_and(|pending| pending.id == id) {
            *self.refresh_failed.lock() = failed_token;
            *slot = None;
        }
    }

    #[instrument(skip_all)]
    async fn perform_refresh(&self) -> bool {
        let Some(current) = self.credentials.current() else {
            debug!("no credential to refresh");
            return false;
        };
        let Some(refresh_token) = current.refresh_token.as_deref() else {
            debug!("no refresh token available");
            return false;
        };

        let url = self.config.url(&self.config.refresh_path);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&current.access_token)
            .timeout(self.config.request_timeout)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await;
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "token refresh request failed");
                return false;
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "token refresh rejected");
            return false;
        }
        let envelope: TokenEnvelope = match response.json().await {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "token refresh response unreadable");
                return false;
            }
        };

        match envelope.into_credential(Some(refresh_token)) {
            Ok(credential) => {
                self.credentials.replace(credential);
                info!("access token refreshed");
                true
            }
            Err(message) => {
                warn!(%message, "token refresh unsuccessful");
                false
            }
        }
    }
}
