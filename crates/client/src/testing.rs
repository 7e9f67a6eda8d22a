//! In-memory [`Gateway`] for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use bytes::Bytes;
use filemail_protocol::{Action, RequestParams};
use futures_util::StreamExt;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::gateway::{Download, Gateway, GatewayFuture, check_body};

/// One recorded request. `action` is `None` for uploads and downloads.
#[derive(Debug, Clone)]
pub(crate) struct Recorded {
    pub action: Option<Action>,
    pub url: String,
    pub params: RequestParams,
    pub body: Bytes,
}

/// Replays scripted JSON bodies and records every request.
///
/// Calls with nothing scripted succeed with `{"responsestatus": "ok"}`.
#[derive(Default)]
pub(crate) struct MockGateway {
    calls: Mutex<Vec<Recorded>>,
    responses: Mutex<VecDeque<Value>>,
    upload_failures: Mutex<HashMap<usize, Value>>,
    cancel_after: Mutex<Option<(usize, CancellationToken)>>,
    downloads: Mutex<HashMap<String, (Vec<u8>, usize)>>,
    uploads: Mutex<usize>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the body returned by the next API call.
    pub fn push(&self, body: Value) {
        self.responses.lock().unwrap().push_back(body);
    }

    /// Makes the `n`th upload request (0-based) answer with `body`.
    pub fn fail_upload(&self, n: usize, body: Value) {
        self.upload_failures.lock().unwrap().insert(n, body);
    }

    /// Cancels `token` once `n` uploads have been acknowledged.
    pub fn cancel_after_uploads(&self, n: usize, token: CancellationToken) {
        *self.cancel_after.lock().unwrap() = Some((n, token));
    }

    /// Serves `data` at `url`, split into `chunk` sized pieces.
    pub fn serve(&self, url: &str, data: &[u8], chunk: usize) {
        self.downloads
            .lock()
            .unwrap()
            .insert(url.to_string(), (data.to_vec(), chunk));
    }

    pub fn calls(&self) -> Vec<Recorded> {
        self.calls.lock().unwrap().clone()
    }

    pub fn api_calls(&self) -> Vec<Recorded> {
        self.calls()
            .into_iter()
            .filter(|c| c.action.is_some())
            .collect()
    }

    pub fn uploads(&self) -> Vec<Recorded> {
        self.calls()
            .into_iter()
            .filter(|c| c.action.is_none() && !c.params.is_empty())
            .collect()
    }

    pub fn last_call(&self) -> Option<Recorded> {
        self.calls.lock().unwrap().last().cloned()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn record(&self, action: Option<Action>, url: &str, params: RequestParams, body: Bytes) {
        self.calls.lock().unwrap().push(Recorded {
            action,
            url: url.to_string(),
            params,
            body,
        });
    }
}

impl Gateway for MockGateway {
    fn call(&self, action: Action, params: RequestParams) -> GatewayFuture<'_, Value> {
        self.record(Some(action), &action.url("mock://api"), params, Bytes::new());
        let body = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| json!({"responsestatus": "ok"}));
        Box::pin(async move { check_body(body) })
    }

    fn upload_chunk(
        &self,
        url: &str,
        params: RequestParams,
        body: Bytes,
    ) -> GatewayFuture<'_, Value> {
        self.record(None, url, params, body);
        let index = {
            let mut n = self.uploads.lock().unwrap();
            let index = *n;
            *n += 1;
            index
        };
        let failure = self.upload_failures.lock().unwrap().remove(&index);
        let result = match failure {
            Some(body) => check_body(body),
            None => Ok(json!({"responsestatus": "ok"})),
        };
        if result.is_ok()
            && let Some((n, token)) = self.cancel_after.lock().unwrap().as_ref()
            && index + 1 >= *n
        {
            token.cancel();
        }
        Box::pin(async move { result })
    }

    fn download(&self, url: &str) -> GatewayFuture<'_, Download> {
        self.record(None, url, RequestParams::new(), Bytes::new());
        let served = self.downloads.lock().unwrap().get(url).cloned();
        Box::pin(async move {
            let (data, chunk) = served.ok_or(Error::Status {
                status: 404,
                body: "not found".into(),
            })?;
            let content_length = Some(data.len() as u64);
            let pieces: Vec<Result<Bytes, Error>> = data
                .chunks(chunk.max(1))
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect();
            Ok(Download {
                content_length,
                body: futures_util::stream::iter(pieces).boxed(),
            })
        })
    }
}
