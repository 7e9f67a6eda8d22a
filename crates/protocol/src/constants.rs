use serde::{Deserialize, Serialize};

/// Production API host.
pub const DEFAULT_BASE_URL: &str = "https://www.filemail.com";

/// Placeholder the service's sample configs ship instead of a real key.
pub const API_KEY_PLACEHOLDER_PREFIX: &str = "GET KEY FROM";

/// HTTP verb used by an [`Action`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
}

/// Every remote operation the client knows how to perform.
///
/// The endpoint table is an exhaustive `match`, so adding a variant
/// without a route is a compile error rather than a runtime lookup miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    // Authentication
    Login,
    Logout,

    // Transfer lifecycle
    Initialize,
    TransferGet,
    Complete,
    Cancel,
    Delete,
    Update,
    Forward,
    Share,
    Zip,
    FileRename,
    FileDelete,

    // History
    SentGet,
    ReceivedGet,

    // Account
    UserGet,
    ContactsGet,
    ContactsAdd,
    ContactsDelete,
}

impl Action {
    /// Returns the HTTP method and path (relative to the base URL).
    pub const fn endpoint(self) -> (HttpMethod, &'static str) {
        use HttpMethod::Post;
        match self {
            Action::Login => (Post, "api/authentication/login"),
            Action::Logout => (Post, "api/authentication/logout"),
            Action::Initialize => (Post, "api/transfer/initialize"),
            Action::TransferGet => (Post, "api/transfer/get"),
            Action::Complete => (Post, "api/transfer/complete"),
            Action::Cancel => (Post, "api/transfer/cancel"),
            Action::Delete => (Post, "api/transfer/delete"),
            Action::Update => (Post, "api/transfer/update"),
            Action::Forward => (Post, "api/transfer/forward"),
            Action::Share => (Post, "api/transfer/share"),
            Action::Zip => (Post, "api/transfer/zip"),
            Action::FileRename => (Post, "api/transfer/file/rename"),
            Action::FileDelete => (Post, "api/transfer/file/delete"),
            Action::SentGet => (Post, "api/transfer/sent/get"),
            Action::ReceivedGet => (Post, "api/transfer/received/get"),
            Action::UserGet => (Post, "api/user/get"),
            Action::ContactsGet => (Post, "api/contacts/get"),
            Action::ContactsAdd => (Post, "api/contacts/add"),
            Action::ContactsDelete => (Post, "api/contacts/delete"),
        }
    }

    /// Builds the absolute URL for this action.
    pub fn url(self, base_url: &str) -> String {
        let (_, path) = self.endpoint();
        format!("{}/{}", base_url.trim_end_matches('/'), path)
    }

    /// Whether the action needs a login token.
    ///
    /// Actions outside this set work for anonymous transfers: they are
    /// authorized by the transfer key alone (or, for `Initialize`, attach
    /// the token only when one exists).
    pub const fn requires_login(self) -> bool {
        matches!(
            self,
            Action::Logout
                | Action::TransferGet
                | Action::Delete
                | Action::Update
                | Action::Share
                | Action::FileRename
                | Action::FileDelete
                | Action::SentGet
                | Action::ReceivedGet
                | Action::UserGet
                | Action::ContactsGet
                | Action::ContactsAdd
                | Action::ContactsDelete
        )
    }

    /// Short name used in logs.
    pub const fn name(self) -> &'static str {
        match self {
            Action::Login => "login",
            Action::Logout => "logout",
            Action::Initialize => "init",
            Action::TransferGet => "get",
            Action::Complete => "complete",
            Action::Cancel => "cancel",
            Action::Delete => "delete",
            Action::Update => "update",
            Action::Forward => "forward",
            Action::Share => "share",
            Action::Zip => "zip",
            Action::FileRename => "file_rename",
            Action::FileDelete => "file_delete",
            Action::SentGet => "sent_get",
            Action::ReceivedGet => "received_get",
            Action::UserGet => "user_get",
            Action::ContactsGet => "contacts_get",
            Action::ContactsAdd => "contacts_add",
            Action::ContactsDelete => "contacts_delete",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
