//! Remote error payloads and the numeric error-code taxonomy.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Errors raised while interpreting wire data.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing field in response: {0}")]
    MissingField(&'static str),
}

/// Coarse grouping of [`ErrorCode`]s by their thousands digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    General,
    Authentication,
    TransferInit,
    TransferFile,
    Subscription,
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCategory::General => "general",
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::TransferInit => "transfer initialization",
            ErrorCategory::TransferFile => "transfer file",
            ErrorCategory::Subscription => "subscription",
            ErrorCategory::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Numeric error code as returned in `errorcode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(pub i64);

impl ErrorCode {
    pub const UNKNOWN_ERROR: ErrorCode = ErrorCode(1001);
    pub const INVALID_PARAMETER: ErrorCode = ErrorCode(1002);
    pub const INPUT_PARAMETER_MISSING: ErrorCode = ErrorCode(1003);
    pub const INVALID_EMAIL: ErrorCode = ErrorCode(1004);
    pub const NOT_FOUND: ErrorCode = ErrorCode(1005);

    pub const WRONG_USERNAME_PASSWORD: ErrorCode = ErrorCode(2001);
    pub const PASSWORD_TOO_WEAK: ErrorCode = ErrorCode(2002);
    pub const INVALID_OR_EXPIRED_LOGIN_TOKEN: ErrorCode = ErrorCode(2003);
    pub const ACCOUNT_EXPIRED: ErrorCode = ErrorCode(2004);
    pub const CAPTCHA_REQUIRED_FOR_NEXT_LOGIN: ErrorCode = ErrorCode(2005);
    pub const LDAP_UNABLE_TO_CREATE_USER: ErrorCode = ErrorCode(2006);
    pub const LDAP_WRONG_USERNAME_PASSWORD: ErrorCode = ErrorCode(2007);
    pub const ACCESS_DENIED: ErrorCode = ErrorCode(2008);

    pub const BUSINESS_ACCOUNT_EXISTS_REGISTRATION_REQUIRED: ErrorCode = ErrorCode(3001);
    pub const USER_ACCOUNT_EXISTS_LOGIN_REQUIRED: ErrorCode = ErrorCode(3002);
    pub const BLOCKED: ErrorCode = ErrorCode(3003);
    pub const ALL_FILESERVERS_BUSY: ErrorCode = ErrorCode(3004);
    pub const FREE_LIMIT_REACHED: ErrorCode = ErrorCode(3005);

    pub const TRANSFER_EXPIRED: ErrorCode = ErrorCode(4001);
    pub const PASSWORD_REQUIRED: ErrorCode = ErrorCode(4002);
    pub const UPLOAD_NOT_COMPLETE: ErrorCode = ErrorCode(4003);
    pub const FILE_IS_DELETED: ErrorCode = ErrorCode(4004);

    pub const SUBSCRIPTION_NOT_FOUND: ErrorCode = ErrorCode(5001);
    pub const EMAIL_ALREADY_REGISTERED: ErrorCode = ErrorCode(5002);
    pub const SIGNUP_FORM_NOT_ACCEPTED: ErrorCode = ErrorCode(5003);
    pub const SESSION_PASSWORD_NOT_FOUND: ErrorCode = ErrorCode(5004);
    pub const SESSION_CUST_REF_NOT_FOUND: ErrorCode = ErrorCode(5005);
    pub const ALL_USER_LICENCES_IN_USE: ErrorCode = ErrorCode(5006);

    /// Category implied by the code's range.
    pub const fn category(self) -> ErrorCategory {
        match self.0 {
            1000..=1999 => ErrorCategory::General,
            2000..=2999 => ErrorCategory::Authentication,
            3000..=3999 => ErrorCategory::TransferInit,
            4000..=4999 => ErrorCategory::TransferFile,
            5000..=5999 => ErrorCategory::Subscription,
            _ => ErrorCategory::Unknown,
        }
    }

    /// Symbolic name for documented codes.
    pub const fn name(self) -> Option<&'static str> {
        let name = match self.0 {
            1001 => "UnknownError",
            1002 => "InvalidParameter",
            1003 => "InputParameterMissing",
            1004 => "InvalidEmail",
            1005 => "NotFound",
            2001 => "WrongUsernamePassword",
            2002 => "PasswordTooWeak",
            2003 => "InvalidOrExpiredLoginToken",
            2004 => "AccountExpired",
            2005 => "CaptchaRequiredForNextLogin",
            2006 => "LDAPUnableToCreateUser",
            2007 => "LDAPWrongUsernamePassword",
            2008 => "AccessDenied",
            3001 => "BusinessAccountExistsRegistrationRequired",
            3002 => "UserAccountExistsLoginRequired",
            3003 => "Blocked",
            3004 => "AllFileserversBusy",
            3005 => "FreeLimitReached",
            4001 => "TransferExpired",
            4002 => "PasswordRequired",
            4003 => "UploadNotComplete",
            4004 => "FileIsDeleted",
            5001 => "SubscriptionNotFound",
            5002 => "EmailAlreadyRegistered",
            5003 => "SignupFormNotAccepted",
            5004 => "SessionPasswordNotFound",
            5005 => "SessionCustRefNotFound",
            5006 => "AllUserLicencesesInUse",
            _ => return None,
        };
        Some(name)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} ({})", self.0),
            None => write!(f, "error {}", self.0),
        }
    }
}

/// Structured failure body: `{"errorcode": 2001, "errormessage": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(rename = "errorcode", deserialize_with = "crate::de::int")]
    pub code: i64,
    #[serde(rename = "errormessage", default, deserialize_with = "crate::de::string")]
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.0,
            message: message.into(),
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        ErrorCode(self.code)
    }

    pub fn category(&self) -> ErrorCategory {
        self.error_code().category()
    }

    /// Extracts a failure from a decoded response body, if it carries one.
    ///
    /// A body fails when it has a non-zero `errorcode`, or a
    /// `responsestatus` other than `ok`.
    pub fn from_value(body: &Value) -> Option<ApiError> {
        let obj = body.as_object()?;

        if obj.contains_key("errorcode")
            && let Ok(err) = serde_json::from_value::<ApiError>(body.clone())
            && err.code != 0
        {
            return Some(err);
        }

        match obj.get("responsestatus").and_then(Value::as_str) {
            Some(status) if !status.eq_ignore_ascii_case("ok") => Some(ApiError::new(
                ErrorCode::UNKNOWN_ERROR,
                format!("response status: {status}"),
            )),
            _ => None,
        }
    }

    /// Decodes a failure body from raw bytes (for non-2xx responses).
    pub fn from_body(body: &[u8]) -> Option<ApiError> {
        let value: Value = serde_json::from_slice(body).ok()?;
        ApiError::from_value(&value)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message)
    }
}

impl std::error::Error for ApiError {}
