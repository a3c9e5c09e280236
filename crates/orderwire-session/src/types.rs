//! Request and response payloads.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use orderwire_core::{Credential, RelayError, Result};

/// Successful HTTP response with its decoded body.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Body as JSON; non-JSON bodies are wrapped in a string value, empty
    /// bodies are `null`.
    pub body: Value,
}

impl ApiResponse {
    /// The `data` member of an envelope body, if present.
    pub fn data(&self) -> Option<&Value> {
        self.body.get("data")
    }

    /// Decode the body into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        T::deserialize(&self.body).map_err(|e| RelayError::Server {
            status: self.status,
            code: None,
            message: format!("unexpected response body: {e}"),
        })
    }
}

/// Login payload.
#[derive(Clone, Serialize)]
pub struct LoginRequest {
    /// Broker client code.
    pub clientcode: String,
    /// Account password or PIN.
    pub password: String,
    /// Current one-time code.
    pub totp: String,
    /// Opaque state echoed back by the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("clientcode", &self.clientcode)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshRequest<'a> {
    pub(crate) refresh_token: &'a str,
}

#[derive(Serialize)]
pub(crate) struct LogoutRequest<'a> {
    pub(crate) clientcode: &'a str,
}

/// `{status, message, errorcode, data: {jwtToken, refreshToken, feedToken}}`
#[derive(Debug, Deserialize)]
pub(crate) struct TokenEnvelope {
    #[serde(default)]
    pub(crate) status: bool,
    #[serde(default)]
    pub(crate) message: Option<String>,
    #[serde(default)]
    pub(crate) errorcode: Option<String>,
    #[serde(default)]
    data: Option<TokenData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenData {
    #[serde(default)]
    jwt_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    feed_token: Option<String>,
}

impl TokenEnvelope {
    /// Build the credential carried by a successful envelope.
    ///
    /// A response without a refresh token keeps `previous_refresh`.
    pub(crate) fn into_credential(
        self,
        previous_refresh: Option<&str>,
    ) -> std::result::Result<Credential, String> {
        if !self.status {
            return Err(self
                .message
                .unwrap_or_else(|| "request unsuccessful".to_string()));
        }
        let data = self
            .data
            .ok_or_else(|| "response carried no token data".to_string())?;
        let access_token = data
            .jwt_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| "response carried no access token".to_string())?;
        Ok(Credential {
            access_token,
            refresh_token: data
                .refresh_token
                .filter(|t| !t.is_empty())
                .or_else(|| previous_refresh.map(str::to_owned)),
            feed_token: data.feed_token,
        })
    }
}
