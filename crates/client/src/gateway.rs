//! Network boundary.
//!
//! [`Gateway`] is the only way sessions reach the service. [`HttpGateway`]
//! implements it with reqwest; tests substitute an in-memory mock.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use filemail_protocol::constants::HttpMethod;
use filemail_protocol::{Action, ApiError, RequestParams};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use serde_json::Value;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::Error;

/// Boxed future returned by [`Gateway`] methods.
pub type GatewayFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, Error>> + Send + 'a>>;

/// Body of a download, streamed.
pub struct Download {
    /// Length announced by the server, if any.
    pub content_length: Option<u64>,
    pub body: BoxStream<'static, Result<Bytes, Error>>,
}

/// Abstract connection to the service.
///
/// Every response is checked before it is returned: a failure payload
/// comes back as [`Error::Auth`] or [`Error::Remote`], never as `Ok`.
pub trait Gateway: Send + Sync {
    /// Performs an API action and returns the decoded JSON body.
    fn call(&self, action: Action, params: RequestParams) -> GatewayFuture<'_, Value>;

    /// Posts one raw chunk to a transfer's upload URL.
    fn upload_chunk(
        &self,
        url: &str,
        params: RequestParams,
        body: Bytes,
    ) -> GatewayFuture<'_, Value>;

    /// Starts a download.
    fn download(&self, url: &str) -> GatewayFuture<'_, Download>;
}

/// Checks a decoded body for a failure payload.
pub(crate) fn check_body(body: Value) -> Result<Value, Error> {
    match ApiError::from_value(&body) {
        Some(err) => Err(Error::from_api(err)),
        None => Ok(body),
    }
}

/// Interprets a raw HTTP response.
///
/// A JSON failure payload wins over the status code. Upload responses may
/// be empty or plain text on success, so `require_json` is relaxed there.
pub(crate) fn interpret(status: u16, body: &[u8], require_json: bool) -> Result<Value, Error> {
    let parsed = if body.iter().all(u8::is_ascii_whitespace) {
        Ok(Value::Null)
    } else {
        serde_json::from_slice::<Value>(body)
    };

    if let Ok(value) = &parsed
        && let Some(err) = ApiError::from_value(value)
    {
        return Err(Error::from_api(err));
    }

    if !(200..300).contains(&status) {
        return Err(Error::Status {
            status,
            body: String::from_utf8_lossy(body).into_owned(),
        });
    }

    match parsed {
        Ok(value) => Ok(value),
        Err(_) if !require_json => Ok(Value::Null),
        Err(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------------------
// HttpGateway
// ---------------------------------------------------------------------------

const USER_AGENT: &str = concat!("filemail-rs/", env!("CARGO_PKG_VERSION"));

/// [`Gateway`] over HTTPS.
///
/// API calls and chunk uploads are bounded by `timeout` end to end.
/// Downloads can run for as long as bytes keep arriving: `timeout` only
/// bounds connecting and each wait for the next read.
pub struct HttpGateway {
    http: reqwest::Client,
    download_http: reqwest::Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(config: &ClientConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()?;
        let download_http = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .read_timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            download_http,
            base_url: config.base_url.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Gateway for HttpGateway {
    fn call(&self, action: Action, params: RequestParams) -> GatewayFuture<'_, Value> {
        Box::pin(async move {
            let (method, _) = action.endpoint();
            let url = action.url(&self.base_url);
            let request = match method {
                HttpMethod::Get => self.http.get(&url),
                HttpMethod::Post => self.http.post(&url),
            };

            let resp = request.query(params.as_slice()).send().await?;
            let status = resp.status().as_u16();
            let body = resp.bytes().await?;
            debug!(action = %action, status, bytes = body.len(), "api response");

            interpret(status, &body, true)
        })
    }

    fn upload_chunk(
        &self,
        url: &str,
        params: RequestParams,
        body: Bytes,
    ) -> GatewayFuture<'_, Value> {
        let url = url.to_string();
        Box::pin(async move {
            let resp = self
                .http
                .post(&url)
                .query(params.as_slice())
                .header(
                    CONTENT_TYPE,
                    HeaderValue::from_static("application/octet-stream"),
                )
                .body(body)
                .send()
                .await?;
            let status = resp.status().as_u16();
            let body = resp.bytes().await?;
            interpret(status, &body, false)
        })
    }

    fn download(&self, url: &str) -> GatewayFuture<'_, Download> {
        let url = url.to_string();
        Box::pin(async move {
            let resp = self.download_http.get(&url).send().await?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.bytes().await.unwrap_or_default();
                return Err(interpret(status.as_u16(), &body, false)
                    .err()
                    .unwrap_or(Error::Status {
                        status: status.as_u16(),
                        body: "download failed".into(),
                    }));
            }

            let content_length = resp.content_length();
            let body = resp.bytes_stream().map(|r| r.map_err(Error::from)).boxed();
            Ok(Download {
                content_length,
                body,
            })
        })
    }
}
