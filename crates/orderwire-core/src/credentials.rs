//! Shared credential slot.
//!
//! A [`CredentialStore`] holds at most one [`Credential`]. Writers replace the
//! whole record at once, so a reader observes either the value before or the
//! value after a refresh, never a mix of the two.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

/// Access token plus the optional tokens issued alongside it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Bearer token attached to every authenticated request.
    pub access_token: String,
    /// Token exchanged for a new access token when the current one expires.
    pub refresh_token: Option<String>,
    /// Token used by market-data feeds.
    pub feed_token: Option<String>,
}

impl Credential {
    /// Credential with only an access token.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            feed_token: None,
        }
    }

    /// Attach a refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Attach a feed token.
    #[must_use]
    pub fn with_feed_token(mut self, feed_token: impl Into<String>) -> Self {
        self.feed_token = Some(feed_token.into());
        self
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("has_feed_token", &self.feed_token.is_some())
            .finish()
    }
}

/// Process-scoped credential slot. Clones share the same slot.
#[derive(Clone, Debug, Default)]
pub struct CredentialStore {
    slot: Arc<RwLock<Option<Arc<Credential>>>>,
}

impl CredentialStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `credential`.
    pub fn with_credential(credential: Credential) -> Self {
        let store = Self::new();
        store.replace(credential);
        store
    }

    /// Snapshot of the current credential.
    pub fn current(&self) -> Option<Arc<Credential>> {
        self.slot.read().clone()
    }

    /// Current access token, if any.
    pub fn access_token(&self) -> Option<String> {
        self.slot.read().as_ref().map(|c| c.access_token.clone())
    }

    /// Current refresh token, if any.
    pub fn refresh_token(&self) -> Option<String> {
        self.slot
            .read()
            .as_ref()
            .and_then(|c| c.refresh_token.clone())
    }

    /// Replace the stored credential as a whole.
    pub fn replace(&self, credential: Credential) {
        *self.slot.write() = Some(Arc::new(credential));
    }

    /// Drop the stored credential.
    pub fn clear(&self) {
        *self.slot.write() = None;
    }

    /// Whether a credential is present.
    pub fn is_authenticated(&self) -> bool {
        self.slot.read().is_some()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
