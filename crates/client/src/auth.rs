//! Login state and the registry of transfers that block logout.

use std::sync::{Arc, PoisonError, RwLock, Weak};

use filemail_protocol::messages::decode;
use filemail_protocol::{Action, LoginResponse, ProtocolError, RequestParams};
use tracing::{info, warn};

use crate::config::{ClientConfig, Source};
use crate::error::Error;
use crate::gateway::Gateway;
use crate::transfer::TransferStatus;

/// Shared status cell of one transfer session.
pub(crate) type StatusCell = RwLock<TransferStatus>;

/// Credentials as of one moment, attached to outgoing requests.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
    username: String,
    login_token: Option<String>,
    source: Source,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("logged_in", &self.login_token.is_some())
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn is_logged_in(&self) -> bool {
        self.login_token.is_some()
    }

    /// Base parameters for `action`: the API key, plus the login token
    /// whenever there is one.
    ///
    /// Fails with [`Error::AuthRequired`] for account actions made while
    /// logged out, before anything touches the network.
    pub fn params_for(&self, action: Action) -> Result<RequestParams, Error> {
        if action.requires_login() && self.login_token.is_none() {
            return Err(Error::AuthRequired);
        }
        let mut params = RequestParams::new();
        params
            .set("apikey", &self.api_key)
            .set_opt("logintoken", self.login_token.as_deref());
        Ok(params)
    }
}

struct TrackedTransfer {
    id: String,
    status: Weak<StatusCell>,
}

#[derive(Default)]
struct AuthState {
    login_token: Option<String>,
    transfers: Vec<TrackedTransfer>,
}

struct AuthInner {
    gateway: Arc<dyn Gateway>,
    config: ClientConfig,
    state: RwLock<AuthState>,
}

/// One user's login session.
///
/// Cheap to clone; clones share the token and the transfer registry.
#[derive(Clone)]
pub struct AuthSession {
    inner: Arc<AuthInner>,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("username", &self.inner.config.username)
            .field("logged_in", &self.is_logged_in())
            .finish_non_exhaustive()
    }
}

impl AuthSession {
    pub fn new(gateway: Arc<dyn Gateway>, config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(AuthInner {
                gateway,
                config,
                state: RwLock::new(AuthState::default()),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn username(&self) -> &str {
        &self.inner.config.username
    }

    pub(crate) fn gateway(&self) -> Arc<dyn Gateway> {
        Arc::clone(&self.inner.gateway)
    }

    pub fn is_logged_in(&self) -> bool {
        self.read_state().login_token.is_some()
    }

    pub fn login_token(&self) -> Option<String> {
        self.read_state().login_token.clone()
    }

    /// Snapshot of the current credentials.
    pub fn credentials(&self) -> Credentials {
        Credentials {
            api_key: self.inner.config.api_key.clone(),
            username: self.inner.config.username.clone(),
            login_token: self.login_token(),
            source: self.inner.config.source,
        }
    }

    /// Logs in and stores the returned token.
    ///
    /// Any failure payload is reported as [`Error::Auth`] with the remote
    /// code kept; the session stays logged out.
    pub async fn login(&self, password: &str) -> Result<String, Error> {
        let mut params = self.credentials().params_for(Action::Login)?;
        params
            .set("username", &self.inner.config.username)
            .set("password", password)
            .set("source", self.inner.config.source.as_str());

        let body = match self.inner.gateway.call(Action::Login, params).await {
            Ok(body) => body,
            Err(Error::Remote(api)) => return Err(Error::Auth(api)),
            Err(e) => return Err(e),
        };
        let resp: LoginResponse = decode(body)?;
        if resp.logintoken.is_empty() {
            return Err(ProtocolError::MissingField("logintoken").into());
        }

        self.write_state().login_token = Some(resp.logintoken.clone());
        info!(user = %self.inner.config.username, "logged in");
        Ok(resp.logintoken)
    }

    /// Logs out.
    ///
    /// Refused with [`Error::Precondition`] while any tracked transfer is
    /// neither complete nor cancelled. The token is only cleared once the
    /// service accepts the logout.
    pub async fn logout(&self) -> Result<(), Error> {
        let params = self.credentials().params_for(Action::Logout)?;

        if let Some((id, status)) = self.first_open_transfer() {
            warn!(transfer = %id, %status, "logout refused: transfer still open");
            return Err(Error::Precondition(format!(
                "transfer {id} is {status}; complete or cancel it before logging out"
            )));
        }

        self.inner.gateway.call(Action::Logout, params).await?;

        let mut state = self.write_state();
        state.login_token = None;
        state.transfers.retain(|t| t.status.strong_count() > 0);
        info!(user = %self.inner.config.username, "logged out");
        Ok(())
    }

    /// Number of live transfers that would currently block logout.
    pub fn open_transfers(&self) -> usize {
        self.read_state()
            .transfers
            .iter()
            .filter(|t| is_open(&t.status).is_some())
            .count()
    }

    /// Starts tracking a session's status. Dropped sessions fall out on
    /// the next call.
    pub(crate) fn track(&self, id: &str, status: &Arc<StatusCell>) {
        let mut state = self.write_state();
        state.transfers.retain(|t| t.status.strong_count() > 0);
        state.transfers.push(TrackedTransfer {
            id: id.to_string(),
            status: Arc::downgrade(status),
        });
    }

    fn first_open_transfer(&self) -> Option<(String, TransferStatus)> {
        self.read_state()
            .transfers
            .iter()
            .find_map(|t| is_open(&t.status).map(|s| (t.id.clone(), s)))
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, AuthState> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, AuthState> {
        self.inner.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Status of a live, non-terminal transfer; `None` otherwise.
fn is_open(cell: &Weak<StatusCell>) -> Option<TransferStatus> {
    let cell = cell.upgrade()?;
    let status = *cell.read().unwrap_or_else(PoisonError::into_inner);
    (!status.is_terminal()).then_some(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockGateway;
    use filemail_protocol::ErrorCode;
    use serde_json::json;

    fn session(mock: &Arc<MockGateway>) -> AuthSession {
        let config = ClientConfig::new("key-1", "me@example.com").unwrap();
        AuthSession::new(mock.clone(), config)
    }

    #[tokio::test]
    async fn login_stores_token() {
        let mock = Arc::new(MockGateway::new());
        mock.push(json!({"logintoken": "tok-1", "responsestatus": "ok"}));
        let auth = session(&mock);

        let token = auth.login("pw").await.unwrap();
        assert_eq!(token, "tok-1");
        assert!(auth.is_logged_in());

        let call = mock.last_call().unwrap();
        assert_eq!(call.action, Some(Action::Login));
        assert_eq!(call.params.get("apikey"), Some("key-1"));
        assert_eq!(call.params.get("username"), Some("me@example.com"));
        assert_eq!(call.params.get("password"), Some("pw"));
        assert_eq!(call.params.get("source"), Some("Desktop"));
        assert!(!call.params.contains("logintoken"));
    }

    #[tokio::test]
    async fn wrong_password_is_auth_error() {
        let mock = Arc::new(MockGateway::new());
        mock.push(json!({"errorcode": 2001, "errormessage": "Wrong username or password"}));
        let auth = session(&mock);

        let err = auth.login("bad").await.unwrap_err();
        match &err {
            Error::Auth(api) => assert_eq!(api.error_code(), ErrorCode::WRONG_USERNAME_PASSWORD),
            other => panic!("expected Auth, got {other:?}"),
        }
        assert!(!auth.is_logged_in());
    }

    #[tokio::test]
    async fn login_failure_outside_auth_range_is_still_auth() {
        let mock = Arc::new(MockGateway::new());
        mock.push(json!({"errorcode": 1003, "errormessage": "password missing"}));
        let auth = session(&mock);
        let err = auth.login("").await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
        assert_eq!(err.code(), Some(ErrorCode::INPUT_PARAMETER_MISSING));
    }

    #[tokio::test]
    async fn login_without_token_is_protocol_error() {
        let mock = Arc::new(MockGateway::new());
        mock.push(json!({"logintoken": "", "responsestatus": "ok"}));
        let auth = session(&mock);
        assert!(matches!(
            auth.login("pw").await,
            Err(Error::Protocol(ProtocolError::MissingField("logintoken")))
        ));
        assert!(!auth.is_logged_in());
    }

    #[tokio::test]
    async fn logout_clears_token() {
        let mock = Arc::new(MockGateway::new());
        mock.push(json!({"logintoken": "tok", "responsestatus": "ok"}));
        let auth = session(&mock);
        auth.login("pw").await.unwrap();

        auth.logout().await.unwrap();
        assert!(!auth.is_logged_in());
        let call = mock.last_call().unwrap();
        assert_eq!(call.action, Some(Action::Logout));
        assert_eq!(call.params.get("logintoken"), Some("tok"));
    }

    #[tokio::test]
    async fn logout_when_logged_out_needs_no_request() {
        let mock = Arc::new(MockGateway::new());
        let auth = session(&mock);
        assert!(matches!(auth.logout().await, Err(Error::AuthRequired)));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn open_transfer_blocks_logout() {
        let mock = Arc::new(MockGateway::new());
        mock.push(json!({"logintoken": "tok", "responsestatus": "ok"}));
        let auth = session(&mock);
        auth.login("pw").await.unwrap();

        let cell = Arc::new(RwLock::new(TransferStatus::Uploading));
        auth.track("t1", &cell);
        assert_eq!(auth.open_transfers(), 1);

        let calls_before = mock.call_count();
        let err = auth.logout().await.unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
        assert!(err.to_string().contains("t1"));
        assert_eq!(auth.login_token().as_deref(), Some("tok"));
        assert_eq!(mock.call_count(), calls_before);

        *cell.write().unwrap() = TransferStatus::Complete;
        auth.logout().await.unwrap();
    }

    #[tokio::test]
    async fn dropped_transfer_does_not_block_logout() {
        let mock = Arc::new(MockGateway::new());
        mock.push(json!({"logintoken": "tok", "responsestatus": "ok"}));
        let auth = session(&mock);
        auth.login("pw").await.unwrap();

        let cell = Arc::new(RwLock::new(TransferStatus::Initialized));
        auth.track("t1", &cell);
        drop(cell);
        assert_eq!(auth.open_transfers(), 0);
        auth.logout().await.unwrap();
    }

    #[test]
    fn account_actions_need_token() {
        let mock = Arc::new(MockGateway::new());
        let auth = session(&mock);
        let creds = auth.credentials();
        assert!(matches!(
            creds.params_for(Action::SentGet),
            Err(Error::AuthRequired)
        ));
        let params = creds.params_for(Action::Initialize).unwrap();
        assert_eq!(params.get("apikey"), Some("key-1"));
        assert!(!params.contains("logintoken"));
    }

    #[test]
    fn credentials_debug_hides_secrets() {
        let mock = Arc::new(MockGateway::new());
        let auth = session(&mock);
        let dbg = format!("{:?}", auth.credentials());
        assert!(!dbg.contains("key-1"));
    }
}
