//! # Authentication Session Manager
//!
//! Single source of truth for the current [`Credential`] of one application
//! scope. The credential is cached in memory and persisted into exactly one
//! tier of the [`SessionStore`]: durable when "remember me" is set, volatile
//! otherwise. A manager created over an existing store (a process restart)
//! recovers the credential lazily on first read, durable tier first.

use crate::action::ActionDef;
use crate::config::SdkConfig;
use crate::error::{Result, SdkError};
use crate::store::{SessionStore, StoreTier};
use crate::transport::HttpRequest;
use parking_lot::Mutex;
use reqwest::header::{HeaderName, HeaderValue};
use serde_json::Value;
use tracing::{debug, info, warn};

const ACCESS_TOKEN_ID: &str = "accessTokenId";
const CURRENT_USER_ID: &str = "currentUserId";

/// An access token and the user it belongs to, or neither.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Credential {
    access_token_id: Option<String>,
    current_user_id: Option<String>,
    remember_me: bool,
}

impl Credential {
    pub fn new(
        access_token_id: impl Into<String>,
        current_user_id: impl Into<String>,
        remember_me: bool,
    ) -> Self {
        Self {
            access_token_id: Some(access_token_id.into()),
            current_user_id: Some(current_user_id.into()),
            remember_me,
        }
    }

    /// The logged-out credential.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn access_token_id(&self) -> Option<&str> {
        self.access_token_id.as_deref()
    }

    pub fn current_user_id(&self) -> Option<&str> {
        self.current_user_id.as_deref()
    }

    pub fn remember_me(&self) -> bool {
        self.remember_me
    }

    pub fn is_present(&self) -> bool {
        self.access_token_id.is_some()
    }
}

#[derive(Debug, Default)]
struct SessionState {
    credential: Credential,
    current_user: Option<Value>,
}

pub struct SessionManager {
    store: SessionStore,
    prefix: String,
    auth_header: HeaderName,
    /// `None` until the tiers have been read once.
    state: Mutex<Option<SessionState>>,
}

impl SessionManager {
    pub fn new(store: SessionStore, config: &SdkConfig) -> Result<Self> {
        let auth_header = HeaderName::from_bytes(config.auth_header.as_bytes()).map_err(|_| {
            SdkError::InvalidArgument(format!("auth header {}", config.auth_header))
        })?;
        Ok(Self {
            store,
            prefix: config.storage_prefix.clone(),
            auth_header,
            state: Mutex::new(None),
        })
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Replaces the credential, persisting it into the tier `remember_me`
    /// selects and clearing the other tier.
    pub fn set_credential(
        &self,
        access_token_id: impl Into<String>,
        current_user_id: impl Into<String>,
        remember_me: bool,
    ) {
        let credential = Credential::new(access_token_id, current_user_id, remember_me);
        let tier = StoreTier::for_remember_me(remember_me);

        // Held across the tier writes so concurrent writers apply whole.
        let mut state = self.state.lock();
        let chosen = self.store.tier(tier);
        chosen.set(
            &self.key(ACCESS_TOKEN_ID),
            credential.access_token_id().unwrap_or_default(),
        );
        chosen.set(
            &self.key(CURRENT_USER_ID),
            credential.current_user_id().unwrap_or_default(),
        );
        let stale = self.store.tier(tier.other());
        stale.remove(&self.key(ACCESS_TOKEN_ID));
        stale.remove(&self.key(CURRENT_USER_ID));

        info!(?tier, user_id = credential.current_user_id(), "Credential stored");
        *state = Some(SessionState {
            credential,
            current_user: None,
        });
    }

    /// The current credential, loading it from the tiers on first use.
    pub fn credential(&self) -> Credential {
        let mut state = self.state.lock();
        state
            .get_or_insert_with(|| SessionState {
                credential: self.load(),
                current_user: None,
            })
            .credential
            .clone()
    }

    /// Forgets the credential everywhere. Clearing an empty session is a no-op.
    pub fn clear_credential(&self) {
        let mut state = self.state.lock();
        for tier in [StoreTier::Durable, StoreTier::Volatile] {
            let storage = self.store.tier(tier);
            storage.remove(&self.key(ACCESS_TOKEN_ID));
            storage.remove(&self.key(CURRENT_USER_ID));
        }
        *state = Some(SessionState::default());
        info!("Credential cleared");
    }

    pub fn is_authenticated(&self) -> bool {
        self.credential().is_present()
    }

    /// Attaches the access token when authenticated.
    pub fn decorate_request(&self, mut request: HttpRequest) -> HttpRequest {
        if let Some(token) = self.credential().access_token_id() {
            match HeaderValue::from_str(token) {
                Ok(value) => {
                    request.headers.insert(self.auth_header.clone(), value);
                }
                Err(_) => warn!("Access token is not a valid header value; sending anonymously"),
            }
        }
        request
    }

    /// Whether `action` can be answered locally with a 401 stub.
    pub fn should_stub(&self, action: &ActionDef) -> bool {
        action.requires_current_user && !self.is_authenticated()
    }

    /// The last user record seen for the current credential.
    pub fn current_user_data(&self) -> Option<Value> {
        self.state
            .lock()
            .as_ref()
            .and_then(|state| state.current_user.clone())
    }

    pub(crate) fn set_current_user_data(&self, user: Value) {
        // Loads the credential first so a lazily loaded session keeps the record.
        let _ = self.credential();
        if let Some(state) = self.state.lock().as_mut() {
            if state.credential.is_present() {
                state.current_user = Some(user);
            }
        }
    }

    fn load(&self) -> Credential {
        for tier in [StoreTier::Durable, StoreTier::Volatile] {
            let storage = self.store.tier(tier);
            let token = storage.get(&self.key(ACCESS_TOKEN_ID));
            let user_id = storage.get(&self.key(CURRENT_USER_ID));
            match (token, user_id) {
                (Some(token), Some(user_id)) => {
                    debug!(?tier, "Credential recovered from storage");
                    return Credential::new(token, user_id, tier == StoreTier::Durable);
                }
                (None, None) => {}
                _ => warn!(?tier, "Ignoring partially stored credential"),
            }
        }
        Credential::anonymous()
    }

    fn key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }
}
