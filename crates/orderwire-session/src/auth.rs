//! Login and logout.

use std::sync::Arc;

use reqwest::header::ACCEPT;
use tracing::{info, instrument, warn};

use orderwire_core::{Credential, RelayError, Result};

use crate::classify::{VALIDATION_ERROR, error_message, parse_body};
use crate::client::SessionClient;
use crate::types::{LoginRequest, LogoutRequest, TokenEnvelope};

impl SessionClient {
    /// Exchange login details for a credential and store it.
    #[instrument(skip_all, fields(clientcode = %request.clientcode))]
    pub async fn login(&self, request: &LoginRequest) -> Result<Arc<Credential>> {
        let inner = self.inner();
        let url = inner.config.url(&inner.config.login_path);
        let response = inner
            .http
            .post(&url)
            .header(ACCEPT, "application/json")
            .timeout(inner.config.request_timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| RelayError::network(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| RelayError::network(e.to_string()))?;
        let envelope: TokenEnvelope =
            serde_json::from_value(parse_body(&text)).map_err(|_| RelayError::Server {
                status,
                code: None,
                message: "unexpected login response".to_string(),
            })?;

        let code = envelope.errorcode.clone().filter(|c| !c.is_empty());
        let failure = |message: String| match (status, code.as_deref()) {
            (_, Some(VALIDATION_ERROR)) => RelayError::Validation { message },
            (200..=299 | 401 | 403, _) => RelayError::unauthorized(message),
            _ => RelayError::Server {
                status,
                code: code.clone(),
                message,
            },
        };
        if !(200..=299).contains(&status) {
            let message = envelope
                .message
                .clone()
                .unwrap_or_else(|| "login failed".to_string());
            warn!(status, "login rejected");
            return Err(failure(message));
        }

        let credential = envelope.into_credential(None).map_err(failure)?;
        inner.credentials.replace(credential);
        info!("logged in");
        inner
            .credentials
            .current()
            .ok_or_else(|| RelayError::unauthorized("credential cleared during login"))
    }

    /// End the session.
    ///
    /// The local credential is cleared whether or not the server call
    /// succeeds; the server's answer is still reported.
    #[instrument(skip_all, fields(clientcode = %clientcode))]
    pub async fn logout(&self, clientcode: &str) -> Result<()> {
        let inner = self.inner();
        let Some(credential) = inner.credentials.current() else {
            return Ok(());
        };
        inner.credentials.clear();

        let url = inner.config.url(&inner.config.logout_path);
        let response = inner
            .http
            .post(&url)
            .bearer_auth(&credential.access_token)
            .header(ACCEPT, "application/json")
            .timeout(inner.config.request_timeout)
            .json(&LogoutRequest { clientcode })
            .send()
            .await
            .map_err(|e| RelayError::network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            info!("logged out");
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        let body = parse_body(&text);
        warn!(status = status.as_u16(), "logout rejected by server");
        Err(RelayError::Server {
            status: status.as_u16(),
            code: None,
            message: error_message(&body, "logout failed"),
        })
    }
}
