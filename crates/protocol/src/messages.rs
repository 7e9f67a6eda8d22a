use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtocolError;

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

/// Body of a successful `login`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub logintoken: String,
}

// ---------------------------------------------------------------------------
// Transfers
// ---------------------------------------------------------------------------

/// Body of a successful `initialize`.
///
/// Older deployments return the id as `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializeResponse {
    #[serde(alias = "id", deserialize_with = "crate::de::string")]
    pub transferid: String,
    pub transferkey: String,
    pub transferurl: String,
}

/// File metadata as the service lists it for an existing transfer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteFile {
    #[serde(default, deserialize_with = "crate::de::string")]
    pub fileid: String,
    #[serde(default, alias = "thefilename")]
    pub filename: String,
    #[serde(default, alias = "totalsize", deserialize_with = "crate::de::uint")]
    pub filesize: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    #[serde(default, deserialize_with = "crate::de::flag")]
    pub compressed: bool,
    #[serde(default, alias = "content-type", alias = "filetype")]
    pub contenttype: String,
    #[serde(default)]
    pub downloadurl: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The `transfer` object returned by `get`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferDetails {
    #[serde(default, alias = "id", deserialize_with = "crate::de::string")]
    pub transferid: String,
    #[serde(default)]
    pub files: Vec<RemoteFile>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of a successful `get`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferGetResponse {
    pub transfer: TransferDetails,
}

/// One entry of the sent/received history lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferSummary {
    #[serde(alias = "id", deserialize_with = "crate::de::string")]
    pub transferid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transferkey: Option<String>,
    #[serde(default)]
    pub from: String,
    #[serde(default, deserialize_with = "crate::de::string")]
    pub to: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "crate::de::opt_int")]
    pub days: Option<i64>,
    #[serde(default, deserialize_with = "crate::de::opt_int")]
    pub downloads: Option<i64>,
    #[serde(default, deserialize_with = "crate::de::flag")]
    pub notify: bool,
    #[serde(default)]
    pub url: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body of `sent/get` and `received/get`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransferListResponse {
    #[serde(default)]
    pub transfers: Vec<TransferSummary>,
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// Account details from `user/get`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfoResponse {
    pub user: UserInfo,
}

/// Address book entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(deserialize_with = "crate::de::string")]
    pub contactid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactsResponse {
    #[serde(default)]
    pub contacts: Vec<Contact>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactAddResponse {
    pub contact: Contact,
}

/// Decodes a typed payload out of an already-validated response body.
pub fn decode<T: serde::de::DeserializeOwned>(body: Value) -> Result<T, ProtocolError> {
    Ok(serde_json::from_value(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_response_accepts_id_alias() {
        let json = serde_json::json!({
            "id": "tid-1",
            "transferkey": "key",
            "transferurl": "https://up1.filemail.com/savefile.ashx"
        });
        let r: InitializeResponse = decode(json).unwrap();
        assert_eq!(r.transferid, "tid-1");
        assert_eq!(r.transferkey, "key");
    }

    #[test]
    fn initialize_response_requires_url() {
        let json = serde_json::json!({"transferid": "t", "transferkey": "k"});
        assert!(decode::<InitializeResponse>(json).is_err());
    }

    #[test]
    fn remote_file_lenient_scalars() {
        let json = serde_json::json!({
            "fileid": 12345,
            "filename": "photos/a.jpg",
            "filesize": "2048",
            "compressed": "false",
            "filetype": "image/jpeg",
            "downloadurl": "https://dl.filemail.com/a",
            "smallpreview": "x"
        });
        let f: RemoteFile = decode(json).unwrap();
        assert_eq!(f.fileid, "12345");
        assert_eq!(f.filesize, 2048);
        assert!(!f.compressed);
        assert_eq!(f.contenttype, "image/jpeg");
        assert!(f.md5.is_none());
        assert_eq!(f.extra.get("smallpreview").unwrap(), "x");
    }

    #[test]
    fn transfer_get_response_lists_files() {
        let json = serde_json::json!({
            "responsestatus": "ok",
            "transfer": {
                "id": "t1",
                "subject": "hello",
                "files": [
                    {"fileid": "f1", "filename": "a.txt", "filesize": 3},
                    {"fileid": "f2", "filename": "b.txt", "filesize": 4}
                ]
            }
        });
        let r: TransferGetResponse = decode(json).unwrap();
        assert_eq!(r.transfer.transferid, "t1");
        assert_eq!(r.transfer.files.len(), 2);
        assert_eq!(r.transfer.extra.get("subject").unwrap(), "hello");
    }

    #[test]
    fn transfer_list_defaults() {
        let json = serde_json::json!({
            "transfers": [{"transferid": "t1", "days": "7", "notify": true}]
        });
        let r: TransferListResponse = decode(json).unwrap();
        assert_eq!(r.transfers[0].days, Some(7));
        assert!(r.transfers[0].notify);
        assert!(r.transfers[0].downloads.is_none());
        assert!(r.transfers[0].transferkey.is_none());
    }

    #[test]
    fn contacts_decode() {
        let json = serde_json::json!({
            "contacts": [{"contactid": 7, "name": "Ann", "email": "ann@example.com"}]
        });
        let r: ContactsResponse = decode(json).unwrap();
        assert_eq!(r.contacts[0].contactid, "7");
        assert_eq!(r.contacts[0].email, "ann@example.com");
    }
}
