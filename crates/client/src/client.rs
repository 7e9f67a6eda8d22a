//! Account-level entry point: login, history, contacts and new transfers.

use std::sync::Arc;

use chrono::{Duration, Utc};
use filemail_protocol::messages::decode;
use filemail_protocol::{
    Action, Contact, ContactAddResponse, ContactsResponse, RequestParams, TransferListResponse,
    TransferSummary, UserInfo, UserInfoResponse,
};
use serde_json::Value;
use tracing::{debug, info};

use crate::auth::AuthSession;
use crate::config::ClientConfig;
use crate::error::Error;
use crate::gateway::{Gateway, HttpGateway};
use crate::recipients::{Recipients, is_valid_email};
use crate::transfer::{DEFAULT_DAYS, TransferMetadata, TransferSession};

/// Oldest history the service keeps, in days.
pub const MAX_AGE_DAYS: i64 = 90;

/// A configured Filemail account.
///
/// Cheap to clone; clones share the login state.
#[derive(Debug, Clone)]
pub struct Client {
    auth: AuthSession,
}

impl Client {
    /// Builds a client talking HTTP to `config.base_url`.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        config.validate()?;
        let gateway = HttpGateway::new(&config)?;
        Ok(Self::with_gateway(Arc::new(gateway), config))
    }

    /// Builds a client over any [`Gateway`].
    pub fn with_gateway(gateway: Arc<dyn Gateway>, config: ClientConfig) -> Self {
        Self {
            auth: AuthSession::new(gateway, config),
        }
    }

    pub fn auth(&self) -> &AuthSession {
        &self.auth
    }

    pub fn config(&self) -> &ClientConfig {
        self.auth.config()
    }

    pub fn is_logged_in(&self) -> bool {
        self.auth.is_logged_in()
    }

    /// Logs in with the configured password.
    pub async fn login(&self) -> Result<String, Error> {
        let password = self
            .config()
            .password
            .clone()
            .ok_or_else(|| Error::Config("no password configured".into()))?;
        self.auth.login(&password).await
    }

    pub async fn login_with_password(&self, password: &str) -> Result<String, Error> {
        self.auth.login(password).await
    }

    pub async fn logout(&self) -> Result<(), Error> {
        self.auth.logout().await
    }

    /// Transfer metadata seeded from the configured defaults.
    pub fn transfer_metadata(&self, to: impl Into<Recipients>) -> TransferMetadata {
        let config = self.config();
        TransferMetadata {
            to: to.into(),
            days: config.default_days().unwrap_or(DEFAULT_DAYS),
            downloads: config.default_downloads(),
            notify: config.notify().unwrap_or(false),
            confirmation: config.confirmation().unwrap_or(false),
            signature: config.signature().map(str::to_string),
            ..TransferMetadata::default()
        }
    }

    /// Initializes a new transfer.
    pub async fn new_transfer(&self, metadata: TransferMetadata) -> Result<TransferSession, Error> {
        TransferSession::initialize(&self.auth, metadata).await
    }

    /// Attaches a transfer from [`sent_transfers`](Self::sent_transfers) or
    /// [`received_transfers`](Self::received_transfers).
    pub fn open_transfer(&self, summary: &TransferSummary) -> TransferSession {
        TransferSession::from_summary(&self.auth, summary)
    }

    /// Transfers sent from this account. Expired ones are included on request.
    pub async fn sent_transfers(&self, include_expired: bool) -> Result<Vec<TransferSummary>, Error> {
        let mut params = self.auth.credentials().params_for(Action::SentGet)?;
        params.set("getall", include_expired);
        let body = self.call(Action::SentGet, params).await?;
        let list: TransferListResponse = decode(body)?;
        debug!(count = list.transfers.len(), "sent transfers");
        Ok(list.transfers)
    }

    /// Transfers received in the last `age_days` days; 0 means no limit.
    ///
    /// `age_days` must lie in `0..=90`. With `for_all_users` a company
    /// admin sees every user's inbox.
    pub async fn received_transfers(
        &self,
        age_days: i64,
        for_all_users: bool,
    ) -> Result<Vec<TransferSummary>, Error> {
        let from = age_to_timestamp(age_days)?;
        let mut params = self.auth.credentials().params_for(Action::ReceivedGet)?;
        params
            .set("getForAllUsers", for_all_users)
            .set_opt("from", from);
        let body = self.call(Action::ReceivedGet, params).await?;
        let list: TransferListResponse = decode(body)?;
        debug!(count = list.transfers.len(), age_days, "received transfers");
        Ok(list.transfers)
    }

    pub async fn user_info(&self) -> Result<UserInfo, Error> {
        let params = self.auth.credentials().params_for(Action::UserGet)?;
        let body = self.call(Action::UserGet, params).await?;
        Ok(decode::<UserInfoResponse>(body)?.user)
    }

    pub async fn contacts(&self) -> Result<Vec<Contact>, Error> {
        let params = self.auth.credentials().params_for(Action::ContactsGet)?;
        let body = self.call(Action::ContactsGet, params).await?;
        Ok(decode::<ContactsResponse>(body)?.contacts)
    }

    pub async fn add_contact(&self, name: &str, email: &str) -> Result<Contact, Error> {
        let email = email.trim();
        if !is_valid_email(email) {
            return Err(Error::Validation(format!("invalid email: {email}")));
        }
        let mut params = self.auth.credentials().params_for(Action::ContactsAdd)?;
        params.set_non_empty("name", name.trim()).set("email", email);
        let body = self.call(Action::ContactsAdd, params).await?;
        let contact = decode::<ContactAddResponse>(body)?.contact;
        info!(contact = %contact.contactid, "contact added");
        Ok(contact)
    }

    pub async fn delete_contact(&self, contact: &Contact) -> Result<(), Error> {
        if contact.contactid.is_empty() {
            return Err(Error::Precondition("contact has no id".into()));
        }
        let mut params = self.auth.credentials().params_for(Action::ContactsDelete)?;
        params.set("contactid", &contact.contactid);
        self.call(Action::ContactsDelete, params).await?;
        info!(contact = %contact.contactid, "contact deleted");
        Ok(())
    }

    async fn call(&self, action: Action, params: RequestParams) -> Result<Value, Error> {
        self.auth.gateway().call(action, params).await
    }
}

/// Converts a history age into the `from` unix timestamp.
fn age_to_timestamp(age_days: i64) -> Result<Option<i64>, Error> {
    if !(0..=MAX_AGE_DAYS).contains(&age_days) {
        return Err(Error::Validation(format!(
            "age must be between 0 and {MAX_AGE_DAYS} days, got {age_days}"
        )));
    }
    if age_days == 0 {
        return Ok(None);
    }
    Ok(Some((Utc::now() - Duration::days(age_days)).timestamp()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Extension;
    use crate::testing::MockGateway;
    use crate::transfer::TransferStatus;
    use filemail_protocol::ErrorCode;
    use serde_json::json;

    fn client(mock: &Arc<MockGateway>) -> Client {
        let mut config = ClientConfig::new("api-1", "me@example.com").unwrap();
        config.password = Some("secret".into());
        Client::with_gateway(mock.clone(), config)
    }

    async fn logged_in(mock: &Arc<MockGateway>) -> Client {
        let client = client(mock);
        mock.push(json!({"logintoken": "tok"}));
        client.login().await.unwrap();
        client
    }

    #[tokio::test]
    async fn login_uses_configured_password() {
        let mock = Arc::new(MockGateway::new());
        let client = logged_in(&mock).await;
        assert!(client.is_logged_in());
        let call = mock.last_call().unwrap();
        assert_eq!(call.action, Some(Action::Login));
        assert_eq!(call.params.get("password"), Some("secret"));
    }

    #[tokio::test]
    async fn login_without_password_is_config_error() {
        let mock = Arc::new(MockGateway::new());
        let config = ClientConfig::new("api-1", "me@example.com").unwrap();
        let client = Client::with_gateway(mock.clone(), config);
        assert!(matches!(client.login().await, Err(Error::Config(_))));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn wrong_password_keeps_client_logged_out() {
        let mock = Arc::new(MockGateway::new());
        let client = client(&mock);
        mock.push(json!({"errorcode": 2001, "errormessage": "Wrong username or password"}));
        let err = client.login().await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
        assert_eq!(err.code(), Some(ErrorCode::WRONG_USERNAME_PASSWORD));
        assert!(!client.is_logged_in());
    }

    #[tokio::test]
    async fn received_age_out_of_range_is_rejected_locally() {
        let mock = Arc::new(MockGateway::new());
        let client = logged_in(&mock).await;
        let before = mock.call_count();

        for age in [91, -1] {
            let err = client.received_transfers(age, false).await.unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "age {age}");
        }
        assert_eq!(mock.call_count(), before);
    }

    #[tokio::test]
    async fn received_age_bounds_are_accepted() {
        let mock = Arc::new(MockGateway::new());
        let client = logged_in(&mock).await;

        mock.push(json!({"transfers": [{"transferid": "r1", "from": "x@y.com"}]}));
        let list = client.received_transfers(0, false).await.unwrap();
        assert_eq!(list.len(), 1);
        let call = mock.last_call().unwrap();
        assert_eq!(call.action, Some(Action::ReceivedGet));
        assert!(!call.params.contains("from"));
        assert_eq!(call.params.get("getForAllUsers"), Some("false"));

        client.received_transfers(90, true).await.unwrap();
        let call = mock.last_call().unwrap();
        let from: i64 = call.params.get("from").unwrap().parse().unwrap();
        let expected = (Utc::now() - Duration::days(90)).timestamp();
        assert!((expected - from).abs() < 60);
        assert_eq!(call.params.get("getForAllUsers"), Some("true"));
    }

    #[tokio::test]
    async fn history_needs_login() {
        let mock = Arc::new(MockGateway::new());
        let client = client(&mock);
        assert!(matches!(client.sent_transfers(false).await, Err(Error::AuthRequired)));
        assert!(matches!(client.received_transfers(7, false).await, Err(Error::AuthRequired)));
        assert!(matches!(client.contacts().await, Err(Error::AuthRequired)));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn sent_transfers_decode_and_open() {
        let mock = Arc::new(MockGateway::new());
        let client = logged_in(&mock).await;
        mock.push(json!({
            "transfers": [
                {"transferid": "s1", "transferkey": "k1", "to": "a@x.com, b@y.com", "days": "7"},
                {"id": 42, "subject": "old"}
            ]
        }));

        let list = client.sent_transfers(true).await.unwrap();
        assert_eq!(mock.last_call().unwrap().params.get("getall"), Some("true"));
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].transferid, "42");

        let session = client.open_transfer(&list[0]);
        assert_eq!(session.status(), TransferStatus::Complete);
        assert_eq!(session.transfer_key(), "k1");
        assert_eq!(session.metadata().to.len(), 2);
        assert_eq!(session.metadata().days, 7);
        // Attached sessions do not block logout.
        client.logout().await.unwrap();
    }

    #[tokio::test]
    async fn contacts_round_trip() {
        let mock = Arc::new(MockGateway::new());
        let client = logged_in(&mock).await;

        mock.push(json!({"contacts": [{"contactid": 7, "name": "Ann", "email": "ann@x.com"}]}));
        let contacts = client.contacts().await.unwrap();
        assert_eq!(contacts[0].contactid, "7");

        assert!(matches!(
            client.add_contact("Bob", "not-an-email").await,
            Err(Error::Validation(_))
        ));

        mock.push(json!({"contact": {"contactid": "8", "name": "Bob", "email": "bob@y.com"}}));
        let bob = client.add_contact(" Bob ", "bob@y.com").await.unwrap();
        let add = mock.last_call().unwrap();
        assert_eq!(add.params.get("name"), Some("Bob"));
        assert_eq!(add.params.get("email"), Some("bob@y.com"));

        client.delete_contact(&bob).await.unwrap();
        let delete = mock.last_call().unwrap();
        assert_eq!(delete.action, Some(Action::ContactsDelete));
        assert_eq!(delete.params.get("contactid"), Some("8"));
    }

    #[tokio::test]
    async fn user_info_decodes() {
        let mock = Arc::new(MockGateway::new());
        let client = logged_in(&mock).await;
        mock.push(json!({"user": {"username": "me@example.com", "name": "Me", "plan": "pro"}}));
        let user = client.user_info().await.unwrap();
        assert_eq!(user.name, "Me");
        assert_eq!(user.extra.get("plan"), Some(&json!("pro")));
    }

    #[test]
    fn metadata_uses_configured_defaults() {
        let mock = Arc::new(MockGateway::new());
        let mut config = ClientConfig::new("api-1", "me@example.com").unwrap();
        config.set_extension(Extension::DefaultDays, "14").unwrap();
        config.set_extension(Extension::Notify, "true").unwrap();
        config.set_extension(Extension::Signature, "-- me").unwrap();
        let client = Client::with_gateway(mock, config);

        let meta = client.transfer_metadata("r@example.com");
        assert_eq!(meta.days, 14);
        assert!(meta.notify);
        assert!(!meta.confirmation);
        assert_eq!(meta.signature.as_deref(), Some("-- me"));
        assert_eq!(meta.downloads, None);
    }

    #[test]
    fn age_conversion() {
        assert_eq!(age_to_timestamp(0).unwrap(), None);
        assert!(age_to_timestamp(1).unwrap().is_some());
        assert!(age_to_timestamp(MAX_AGE_DAYS + 1).is_err());
    }
}
