use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError};
use crate::models::{RegisterRequest, TokenResponse, UserProfile};

use super::store::KeyValueStore;

/// Storage key holding the raw bearer credential
pub const TOKEN_KEY: &str = "access_token";

/// Recorded in place of the server message whenever a credential fails validation
pub const SESSION_EXPIRED_MESSAGE: &str = "your session has expired or the credential is invalid";

const TOKEN_ENDPOINT: &str = "/token";
const CURRENT_USER_ENDPOINT: &str = "/users/me/";
const REGISTER_ENDPOINT: &str = "/register";

/// Observable session state.
///
/// `user` is only set while a stored credential has been validated against it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct SessionState {
    pub user: Option<UserProfile>,
    pub loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    /// No credential
    Anonymous,
    /// Credential held, profile not confirmed yet
    Validating,
    /// Credential confirmed by the server
    Authenticated,
}

/// Owns the bearer credential, the confirmed profile and the loading/error flags.
///
/// Built with [`SessionManager::activate`], or [`SessionManager::new`] followed
/// by [`SessionManager::start`]. Startup validation of the stored credential
/// runs exactly once. Failures never leave a credential without a
/// profile behind: credential, profile and storage entry are cleared together.
pub struct SessionManager<S> {
    api: ApiClient,
    store: S,
    token: Option<String>,
    state: SessionState,
    notifier: watch::Sender<SessionState>,
    started: bool,
}

impl<S: KeyValueStore> SessionManager<S> {
    /// Create the manager and validate whatever credential is in `store`
    pub async fn activate(api: ApiClient, store: S) -> Self {
        let mut manager = Self::new(api, store);
        manager.start().await;
        manager
    }

    /// Create the manager without touching storage. It reports `loading`
    /// until [`start`](Self::start) has run.
    pub fn new(api: ApiClient, store: S) -> Self {
        let initial = SessionState {
            loading: true,
            ..SessionState::default()
        };
        let (notifier, _) = watch::channel(initial.clone());

        Self {
            api,
            store,
            token: None,
            state: initial,
            notifier,
            started: false,
        }
    }

    /// Startup validation. Only the first call does anything.
    pub async fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        self.validate_stored_session().await;
    }

    // =========================================================================
    // State accessors
    // =========================================================================

    pub fn state(&self) -> SessionState {
        self.state.clone()
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.state.user.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.state.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.state.error.as_deref()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn phase(&self) -> SessionPhase {
        match (&self.token, &self.state.user) {
            (None, _) => SessionPhase::Anonymous,
            (Some(_), None) => SessionPhase::Validating,
            (Some(_), Some(_)) => SessionPhase::Authenticated,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase() == SessionPhase::Authenticated
    }

    /// Watch state changes. The receiver starts at the current state.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.notifier.subscribe()
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Log in with username and password.
    ///
    /// Runs two steps strictly in order: [`acquire_token`](Self::acquire_token),
    /// then validation of the new credential against `/users/me/`. The login
    /// only succeeds once the profile has been fetched. A failure in either step
    /// tears the session down and the transport error is returned unchanged.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<UserProfile, ApiError> {
        self.begin_operation();

        let token = match self.acquire_token(username, password).await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Login failed");
                self.clear_credential();
                self.state.error = Some(e.to_string());
                self.finish_operation();
                return Err(e);
            }
        };

        self.persist_credential(&token);

        match self.confirm_session(token).await {
            Ok(user) => {
                info!(username = %user.username, "Login successful");
                Ok(user)
            }
            Err(e) => {
                warn!(error = %e, "Login rejected: issued credential could not fetch its profile");
                Err(e)
            }
        }
    }

    /// Exchange username and password for a credential. Does not touch session state.
    pub async fn acquire_token(&self, username: &str, password: &str) -> Result<String, ApiError> {
        let body = self
            .api
            .login_post(TOKEN_ENDPOINT, &[("username", username), ("password", password)])
            .await?;
        let response: TokenResponse = ApiClient::decode(body)?;
        debug!(token_type = %response.token_type, "Credential issued");
        Ok(response.access_token)
    }

    /// Create an account. Registration never logs the user in.
    pub async fn register(
        &mut self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<UserProfile, ApiError> {
        self.begin_operation();

        let request = RegisterRequest {
            username,
            email,
            password,
        };
        let result = match self.api.post(REGISTER_ENDPOINT, &request).await {
            Ok(body) => ApiClient::decode::<UserProfile>(body),
            Err(e) => Err(e),
        };

        match &result {
            Ok(user) => info!(username = %user.username, "Registered new user"),
            Err(e) => {
                warn!(error = %e, "Registration failed");
                self.state.error = Some(e.to_string());
            }
        }

        self.finish_operation();
        result
    }

    /// End the session locally. No network call.
    pub fn logout(&mut self) {
        self.clear_credential();
        self.state.error = None;
        info!("Logged out");
        self.publish();
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn validate_stored_session(&mut self) {
        let stored = match self.store.get(TOKEN_KEY) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!(error = %e, "Failed to read stored credential");
                None
            }
        };

        match stored {
            Some(token) => {
                debug!("Stored credential found, validating");
                if let Ok(user) = self.confirm_session(token).await {
                    info!(username = %user.username, "Restored session");
                }
            }
            None => {
                debug!("No stored credential");
                self.finish_operation();
            }
        }
    }

    /// Make `token` the current credential and confirm it against `/users/me/`.
    ///
    /// Any failure clears credential, profile and storage entry, and records
    /// [`SESSION_EXPIRED_MESSAGE`] rather than the server's message.
    async fn confirm_session(&mut self, token: String) -> Result<UserProfile, ApiError> {
        self.token = Some(token.clone());
        self.state.loading = true;
        debug!(phase = ?self.phase(), "Validating credential");
        self.publish();

        let result = match self.api.auth_get(CURRENT_USER_ENDPOINT, &token).await {
            Ok(body) => ApiClient::decode::<UserProfile>(body),
            Err(e) => Err(e),
        };

        match &result {
            Ok(user) => {
                self.state.user = Some(user.clone());
                self.state.error = None;
            }
            Err(e) => {
                warn!(error = %e, "Credential validation failed");
                self.clear_credential();
                self.state.error = Some(SESSION_EXPIRED_MESSAGE.to_string());
            }
        }

        debug!(phase = ?self.phase(), "Validation finished");
        self.finish_operation();
        result
    }

    fn persist_credential(&mut self, token: &str) {
        if let Err(e) = self.store.set(TOKEN_KEY, token) {
            warn!(error = %e, "Failed to persist credential");
        }
        self.token = Some(token.to_string());
    }

    /// Drop credential and profile together, including the storage entry
    fn clear_credential(&mut self) {
        self.token = None;
        self.state.user = None;
        if let Err(e) = self.store.remove(TOKEN_KEY) {
            warn!(error = %e, "Failed to remove stored credential");
        }
    }

    fn begin_operation(&mut self) {
        self.state.loading = true;
        self.state.error = None;
        self.publish();
    }

    fn finish_operation(&mut self) {
        self.state.loading = false;
        self.publish();
    }

    fn publish(&self) {
        self.notifier.send_replace(self.state.clone());
    }
}
