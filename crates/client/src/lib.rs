//! Async client for the Filemail REST API.
//!
//! [`Client`] holds the account and its login; [`TransferSession`] drives
//! one transfer from `initialize` through chunked upload to `complete`.
//! All network traffic goes through the [`Gateway`] trait.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod recipients;
pub mod transfer;

#[cfg(test)]
mod testing;

pub use auth::{AuthSession, Credentials};
pub use client::{Client, MAX_AGE_DAYS};
pub use config::{ClientConfig, ConfigSource, DEFAULT_TIMEOUT, Extension, Source};
pub use error::Error;
pub use gateway::{Download, Gateway, GatewayFuture, HttpGateway};
pub use recipients::{Recipients, is_valid_email};
pub use transfer::{
    DEFAULT_DAYS, DownloadOptions, DownloadOutcome, MAX_DAYS, SendOptions, StatusHandle,
    TransferMetadata, TransferSession, TransferStatus, TransferUpdate,
};

pub use filemail_protocol::{ApiError, Contact, ErrorCategory, ErrorCode, TransferSummary, UserInfo};
pub use filemail_transfer::{FileDescriptor, FileSource, SpeedCalculator, TransferProgress};
