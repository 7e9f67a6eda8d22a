//! Wire vocabulary for the Filemail REST API.
//!
//! Everything in this crate is pure data: which endpoint an action hits,
//! which query parameters a request carries, how responses and error
//! payloads decode. Networking lives in `filemail-client`.

pub mod constants;
pub mod error;
pub mod messages;
pub mod params;

mod de;

pub use constants::{Action, DEFAULT_BASE_URL};
pub use error::{ApiError, ErrorCategory, ErrorCode, ProtocolError};
pub use messages::{
    Contact, ContactAddResponse, ContactsResponse, InitializeResponse, LoginResponse, RemoteFile,
    TransferDetails, TransferGetResponse, TransferListResponse, TransferSummary, UserInfo,
    UserInfoResponse,
};
pub use params::RequestParams;
