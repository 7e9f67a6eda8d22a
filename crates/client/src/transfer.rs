//! Transfer session: one remote transfer and the files that belong to it.
//!
//! ```text
//! INITIALIZED ──send──▶ UPLOADING ──complete──▶ COMPLETE
//!      │                    │
//!      └──────cancel────────┴──────────────────▶ CANCELLED
//! ```
//!
//! COMPLETE and CANCELLED are final. Uploads run one file at a time, one
//! HTTP request per chunk; a file's chunk position only advances once the
//! service has acknowledged the chunk.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;
use filemail_protocol::messages::decode;
use filemail_protocol::{
    Action, InitializeResponse, ProtocolError, RequestParams, TransferGetResponse, TransferSummary,
};
use filemail_transfer::{
    ChunkReader, FileDescriptor, FileError, PartFile, TransferProgress, build_archive, chunk_count,
    scan_dir, validate_relative_path,
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::auth::{AuthSession, StatusCell};
use crate::error::Error;
use crate::gateway::{Download, Gateway};
use crate::recipients::{Recipients, is_valid_email};

/// Longest availability the service accepts, in days.
pub const MAX_DAYS: u32 = 90;

/// Availability used when none is given.
pub const DEFAULT_DAYS: u32 = 3;

/// Lifecycle state of a [`TransferSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    Initialized,
    Uploading,
    Complete,
    Cancelled,
}

impl TransferStatus {
    /// COMPLETE and CANCELLED allow no further transitions.
    pub const fn is_terminal(self) -> bool {
        matches!(self, TransferStatus::Complete | TransferStatus::Cancelled)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            TransferStatus::Initialized => "INITIALIZED",
            TransferStatus::Uploading => "UPLOADING",
            TransferStatus::Complete => "COMPLETE",
            TransferStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of a session's status, usable from other tasks.
#[derive(Debug, Clone)]
pub struct StatusHandle(Arc<StatusCell>);

impl StatusHandle {
    pub fn get(&self) -> TransferStatus {
        *self.0.read().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Everything `initialize` sends about a new transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferMetadata {
    /// Sender address. Defaults to the account username.
    pub from: Option<String>,
    pub to: Recipients,
    pub subject: String,
    pub message: String,
    /// Appended to the message, separated by a blank line.
    pub signature: Option<String>,
    /// Notify the sender when recipients download.
    pub notify: bool,
    /// Send the sender a confirmation once the upload is complete.
    pub confirmation: bool,
    pub days: u32,
    pub downloads: Option<u32>,
    pub password: Option<String>,
}

impl Default for TransferMetadata {
    fn default() -> Self {
        Self {
            from: None,
            to: Recipients::new(),
            subject: String::new(),
            message: String::new(),
            signature: None,
            notify: false,
            confirmation: false,
            days: DEFAULT_DAYS,
            downloads: None,
            password: None,
        }
    }
}

impl TransferMetadata {
    pub fn new(to: impl Into<Recipients>) -> Self {
        Self {
            to: to.into(),
            ..Self::default()
        }
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn days(mut self, days: u32) -> Self {
        self.days = days;
        self
    }

    pub fn downloads(mut self, downloads: u32) -> Self {
        self.downloads = Some(downloads);
        self
    }

    pub fn notify(mut self, notify: bool) -> Self {
        self.notify = notify;
        self
    }

    pub fn confirmation(mut self, confirmation: bool) -> Self {
        self.confirmation = confirmation;
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn sender(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Local checks, run before anything is sent.
    pub fn validate(&self) -> Result<(), Error> {
        self.to.validate()?;
        validate_days(self.days)?;
        validate_downloads(self.downloads)?;
        if let Some(from) = &self.from
            && !is_valid_email(from)
        {
            return Err(Error::Validation(format!("invalid sender: {from}")));
        }
        Ok(())
    }

    /// Message text as sent, with the signature appended.
    pub fn full_message(&self) -> String {
        match self.signature.as_deref().filter(|s| !s.is_empty()) {
            Some(sig) if self.message.is_empty() => sig.to_string(),
            Some(sig) => format!("{}\n\n{sig}", self.message),
            None => self.message.clone(),
        }
    }

    fn write_params(&self, params: &mut RequestParams, default_from: &str) {
        params
            .set("from", self.from.as_deref().unwrap_or(default_from))
            .set("to", self.to.to_wire())
            .set_non_empty("subject", &self.subject)
            .set_non_empty("message", &self.full_message())
            .set("notify", self.notify)
            .set("confirmation", self.confirmation)
            .set("days", self.days)
            .set_opt("downloads", self.downloads)
            .set_non_empty("password", self.password.as_deref().unwrap_or_default());
    }
}

/// Fields `update` may change on a completed transfer. `None` leaves a
/// field as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferUpdate {
    pub message: Option<String>,
    pub days: Option<u32>,
    pub downloads: Option<u32>,
    pub notify: Option<bool>,
}

impl TransferUpdate {
    pub fn is_empty(&self) -> bool {
        self.message.is_none()
            && self.days.is_none()
            && self.downloads.is_none()
            && self.notify.is_none()
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.is_empty() {
            return Err(Error::Validation("nothing to update".into()));
        }
        if let Some(days) = self.days {
            validate_days(days)?;
        }
        validate_downloads(self.downloads)
    }
}

/// Options for [`TransferSession::send`].
#[derive(Debug, Clone)]
pub struct SendOptions {
    /// Call `complete` once every file is uploaded.
    pub auto_complete: bool,
    /// Passed to `complete`; keeping the key allows later `update` calls.
    pub keep_transfer_key: bool,
    pub cancel: Option<CancellationToken>,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            auto_complete: true,
            keep_transfer_key: true,
            cancel: None,
        }
    }
}

/// Options for [`TransferSession::download`].
#[derive(Debug, Clone, Default)]
pub struct DownloadOptions {
    /// Replace an existing file instead of skipping it.
    pub overwrite: bool,
    pub cancel: Option<CancellationToken>,
}

/// What a download did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Downloaded(PathBuf),
    /// The target existed and overwrite was off.
    Skipped(PathBuf),
}

impl DownloadOutcome {
    pub fn path(&self) -> &Path {
        match self {
            DownloadOutcome::Downloaded(p) | DownloadOutcome::Skipped(p) => p,
        }
    }
}

fn validate_days(days: u32) -> Result<(), Error> {
    if (1..=MAX_DAYS).contains(&days) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "days must be between 1 and {MAX_DAYS}, got {days}"
        )))
    }
}

fn validate_downloads(downloads: Option<u32>) -> Result<(), Error> {
    match downloads {
        Some(0) => Err(Error::Validation("downloads must be at least 1".into())),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// TransferSession
// ---------------------------------------------------------------------------

/// One remote transfer.
///
/// Owns its files and status; nothing else mutates them. The status cell
/// is shared read-only with the [`AuthSession`] so logout can refuse while
/// the transfer is still open.
pub struct TransferSession {
    auth: AuthSession,
    gateway: Arc<dyn Gateway>,
    transfer_id: String,
    transfer_key: String,
    transfer_url: String,
    metadata: TransferMetadata,
    status: Arc<StatusCell>,
    files: Vec<FileDescriptor>,
    chunk_size: usize,
    checksum: bool,
    info: Map<String, Value>,
    /// Temporary folders holding archives built by `add_archive`.
    archives: Vec<tempfile::TempDir>,
    span: tracing::Span,
}

impl std::fmt::Debug for TransferSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferSession")
            .field("transfer_id", &self.transfer_id)
            .field("status", &self.status())
            .field("files", &self.files.len())
            .finish_non_exhaustive()
    }
}

impl TransferSession {
    /// Creates the transfer on the service and returns it INITIALIZED.
    ///
    /// Works without a login; the token is attached when there is one.
    pub async fn initialize(auth: &AuthSession, metadata: TransferMetadata) -> Result<Self, Error> {
        metadata.validate()?;

        let creds = auth.credentials();
        let mut params = creds.params_for(Action::Initialize)?;
        params.set("source", creds.source().as_str());
        metadata.write_params(&mut params, creds.username());

        let gateway = auth.gateway();
        let body = gateway.call(Action::Initialize, params).await?;
        let resp: InitializeResponse = decode(body.clone())?;
        for (field, value) in [
            ("transferid", &resp.transferid),
            ("transferkey", &resp.transferkey),
            ("transferurl", &resp.transferurl),
        ] {
            if value.is_empty() {
                return Err(ProtocolError::MissingField(field).into());
            }
        }

        let status = Arc::new(RwLock::new(TransferStatus::Initialized));
        auth.track(&resp.transferid, &status);

        let span = info_span!("transfer", id = %resp.transferid);
        span.in_scope(|| {
            info!(
                to = %metadata.to.to_wire(),
                days = metadata.days,
                anonymous = !creds.is_logged_in(),
                "transfer initialized"
            )
        });

        Ok(Self {
            auth: auth.clone(),
            gateway,
            transfer_id: resp.transferid,
            transfer_key: resp.transferkey,
            transfer_url: resp.transferurl,
            metadata,
            status,
            files: Vec::new(),
            chunk_size: auth.config().chunk_size,
            checksum: auth.config().checksum,
            info: body.as_object().cloned().unwrap_or_default(),
            archives: Vec::new(),
            span,
        })
    }

    /// Attaches an already-sent transfer from a history listing.
    ///
    /// The session starts COMPLETE; its files come from [`get_files`](Self::get_files).
    pub(crate) fn from_summary(auth: &AuthSession, summary: &TransferSummary) -> Self {
        let metadata = TransferMetadata {
            from: Some(summary.from.clone()).filter(|f| !f.is_empty()),
            to: Recipients::from(summary.to.as_str()),
            subject: summary.subject.clone(),
            message: summary.message.clone(),
            notify: summary.notify,
            days: summary
                .days
                .and_then(|d| u32::try_from(d).ok())
                .unwrap_or(DEFAULT_DAYS),
            downloads: summary.downloads.and_then(|d| u32::try_from(d).ok()),
            ..TransferMetadata::default()
        };
        Self {
            auth: auth.clone(),
            gateway: auth.gateway(),
            transfer_id: summary.transferid.clone(),
            transfer_key: summary.transferkey.clone().unwrap_or_default(),
            transfer_url: String::new(),
            metadata,
            status: Arc::new(RwLock::new(TransferStatus::Complete)),
            files: Vec::new(),
            chunk_size: auth.config().chunk_size,
            checksum: auth.config().checksum,
            info: summary.extra.clone(),
            archives: Vec::new(),
            span: info_span!("transfer", id = %summary.transferid),
        }
    }

    pub fn transfer_id(&self) -> &str {
        &self.transfer_id
    }

    pub fn transfer_key(&self) -> &str {
        &self.transfer_key
    }

    pub fn transfer_url(&self) -> &str {
        &self.transfer_url
    }

    pub fn metadata(&self) -> &TransferMetadata {
        &self.metadata
    }

    /// Extra fields the service returned about this transfer.
    pub fn info(&self) -> &Map<String, Value> {
        &self.info
    }

    pub fn files(&self) -> &[FileDescriptor] {
        &self.files
    }

    pub fn file(&self, file_id: &str) -> Option<&FileDescriptor> {
        self.files.iter().find(|f| f.file_id() == file_id)
    }

    pub fn status(&self) -> TransferStatus {
        *self.status.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status_handle(&self) -> StatusHandle {
        StatusHandle(Arc::clone(&self.status))
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    fn set_status(&self, next: TransferStatus) {
        let prev = {
            let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *status, next)
        };
        if prev != next {
            self.span
                .in_scope(|| info!(from = %prev, to = %next, "status changed"));
        }
    }

    fn ensure_open(&self, what: &str) -> Result<(), Error> {
        match self.status() {
            TransferStatus::Initialized | TransferStatus::Uploading => Ok(()),
            status => Err(Error::Precondition(format!(
                "cannot {what}: transfer {} is {status}",
                self.transfer_id
            ))),
        }
    }

    fn require_id(&self) -> Result<(), Error> {
        if self.transfer_id.is_empty() {
            return Err(Error::Precondition("transfer has no id".into()));
        }
        Ok(())
    }

    fn require_key(&self) -> Result<(), Error> {
        self.require_id()?;
        if self.transfer_key.is_empty() {
            return Err(Error::Precondition(format!(
                "transfer {} has no transfer key",
                self.transfer_id
            )));
        }
        Ok(())
    }

    /// Parameters shared by transfer-scoped calls.
    fn scoped_params(&self, action: Action, with_key: bool) -> Result<RequestParams, Error> {
        let mut params = self.auth.credentials().params_for(action)?;
        params.set("transferid", &self.transfer_id);
        if with_key {
            params.set_non_empty("transferkey", &self.transfer_key);
        }
        Ok(params)
    }

    async fn call(&self, action: Action, params: RequestParams) -> Result<Value, Error> {
        self.gateway
            .call(action, params)
            .instrument(self.span.clone())
            .await
    }

    fn merge_info(&mut self, body: &Value) {
        if let Some(obj) = body.as_object() {
            for (k, v) in obj {
                if k != "responsestatus" {
                    self.info.insert(k.clone(), v.clone());
                }
            }
        }
    }

    // -- files ---------------------------------------------------------------

    /// Adds one local file, hashing it off the async runtime.
    pub async fn add_file(&mut self, path: impl AsRef<Path>) -> Result<(), Error> {
        self.ensure_open("add files")?;
        let path = path.as_ref().to_path_buf();
        let checksum = self.checksum;
        let fd =
            tokio::task::spawn_blocking(move || FileDescriptor::from_path(&path, checksum)).await??;
        self.add_descriptor(fd)
    }

    /// Adds a prepared descriptor.
    pub fn add_descriptor(&mut self, fd: FileDescriptor) -> Result<(), Error> {
        self.ensure_open("add files")?;
        if self.file(fd.file_id()).is_some() {
            return Err(Error::Validation(format!(
                "duplicate file id {}",
                fd.file_id()
            )));
        }
        self.span.in_scope(|| {
            debug!(
                file = %fd.file_name(),
                size = fd.total_size(),
                content_type = %fd.content_type(),
                "file added"
            )
        });
        self.files.push(fd);
        Ok(())
    }

    /// Adds files and folders in order.
    ///
    /// Folders are walked recursively; each file keeps its path under the
    /// folder as its remote name, and zero-byte files are skipped. Returns
    /// the number of files added.
    pub async fn add_files<I, P>(&mut self, paths: I) -> Result<usize, Error>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.ensure_open("add files")?;
        let paths: Vec<PathBuf> = paths.into_iter().map(|p| p.as_ref().to_path_buf()).collect();
        let mut added = 0;

        for path in paths {
            if !path.is_dir() {
                self.add_file(&path).await?;
                added += 1;
                continue;
            }

            let checksum = self.checksum;
            let descriptors = tokio::task::spawn_blocking(move || {
                scan_dir(&path)?
                    .into_iter()
                    .map(|f| FileDescriptor::with_name(&f.path, f.remote_name, checksum))
                    .collect::<Result<Vec<_>, FileError>>()
            })
            .await??;
            for fd in descriptors {
                self.add_descriptor(fd)?;
                added += 1;
            }
        }
        Ok(added)
    }

    /// Packs files and folders into one zip archive and adds it as a
    /// single file named `filemail_transfer_<date>.zip`.
    ///
    /// Folder structure is kept inside the archive, empty files and
    /// folders included. The archive lives in a temporary folder removed
    /// with the session. Returns the number of files packed.
    pub async fn add_archive<I, P>(&mut self, paths: I) -> Result<usize, Error>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.ensure_open("add files")?;
        let paths: Vec<PathBuf> = paths.into_iter().map(|p| p.as_ref().to_path_buf()).collect();
        if paths.is_empty() {
            return Err(Error::Validation("nothing to archive".into()));
        }

        let name = archive_name(chrono::Local::now().naive_local());
        let checksum = self.checksum;
        let (dir, packed, fd) = tokio::task::spawn_blocking(move || {
            let dir = tempfile::Builder::new().prefix("filemail-").tempdir()?;
            let archive = dir.path().join(&name);
            let packed = build_archive(&paths, &archive)?;
            let fd = FileDescriptor::with_name(&archive, name, checksum)?;
            Ok::<_, FileError>((dir, packed, fd))
        })
        .await??;

        self.add_descriptor(fd)?;
        self.archives.push(dir);
        Ok(packed)
    }

    // -- upload --------------------------------------------------------------

    /// Uploads every pending file, then completes the transfer if
    /// `auto_complete` is set.
    ///
    /// `progress` runs once per acknowledged chunk. Its percentage counts
    /// chunks across all files of the session. A failing file is reported
    /// as [`Error::UploadFailed`]; the session stays UPLOADING and a later
    /// call resumes from each file's chunk position.
    pub async fn send<F>(&mut self, options: SendOptions, mut progress: F) -> Result<(), Error>
    where
        F: FnMut(&TransferProgress) + Send,
    {
        let span = self.span.clone();
        self.send_inner(options, &mut progress).instrument(span).await
    }

    async fn send_inner(
        &mut self,
        options: SendOptions,
        progress: &mut (dyn FnMut(&TransferProgress) + Send),
    ) -> Result<(), Error> {
        self.ensure_open("send")?;
        if !self.files.iter().any(FileDescriptor::is_local) {
            return Err(Error::Precondition("no files to send".into()));
        }
        self.set_status(TransferStatus::Uploading);

        let chunk_size = self.chunk_size;
        let mut tally = TransferProgress {
            file_name: String::new(),
            total_bytes: 0,
            transferred_bytes: 0,
            chunks_sent: 0,
            total_chunks: 0,
        };
        for fd in self.files.iter().filter(|f| f.is_local()) {
            let chunks = chunk_count(fd.total_size(), chunk_size);
            tally.total_bytes += fd.total_size();
            tally.transferred_bytes += fd.chunk_position();
            tally.total_chunks += chunks;
            tally.chunks_sent += if fd.is_sent() {
                chunks
            } else {
                fd.chunk_position() / chunk_size as u64
            };
        }

        for index in 0..self.files.len() {
            let fd = &self.files[index];
            if !fd.is_local() || fd.is_sent() {
                continue;
            }
            if let Err(e) = self
                .upload_file(index, options.cancel.as_ref(), &mut tally, progress)
                .await
            {
                let fd = &self.files[index];
                if e.is_cancelled() {
                    info!(
                        file = %fd.file_name(),
                        position = fd.chunk_position(),
                        "upload cancelled"
                    );
                    return Err(Error::Cancelled);
                }
                warn!(file = %fd.file_name(), error = %e, "upload failed");
                return Err(Error::UploadFailed {
                    file: fd.file_name().to_string(),
                    source: Box::new(e),
                });
            }
        }

        info!(bytes = tally.total_bytes, chunks = tally.total_chunks, "all files uploaded");
        if options.auto_complete {
            self.complete(options.keep_transfer_key).await?;
        }
        Ok(())
    }

    async fn upload_file(
        &mut self,
        index: usize,
        cancel: Option<&CancellationToken>,
        tally: &mut TransferProgress,
        progress: &mut (dyn FnMut(&TransferProgress) + Send),
    ) -> Result<(), Error> {
        let fd = &self.files[index];
        let name = fd.file_name().to_string();
        let path = fd
            .local_path()
            .ok_or_else(|| FileError::NotLocal(name.clone()))?
            .to_path_buf();
        let expected = fd.total_size();
        let start = fd.chunk_position();

        let mut reader = ChunkReader::open(&path, self.chunk_size).await?;
        if reader.file_size() != expected {
            return Err(FileError::SizeMismatch(format!(
                "{name} was {expected} bytes when added, now {}",
                reader.file_size()
            ))
            .into());
        }
        if let Some(token) = cancel {
            reader = reader.with_cancel(token.clone());
        }
        reader.seek_to(start).await?;
        info!(file = %name, size = expected, resume_from = start, "uploading file");

        if expected == 0 {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return Err(Error::Cancelled);
            }
            let params = self.files[index].upload_params(&self.transfer_id, &self.transfer_key, 0);
            self.gateway
                .upload_chunk(&self.transfer_url, params, Bytes::new())
                .await?;
            self.files[index].mark_sent();
            return Ok(());
        }

        tally.file_name = name;
        while let Some(chunk) = reader.next_chunk().await? {
            let offset = self.files[index].chunk_position();
            let len = chunk.len() as u64;
            let params =
                self.files[index].upload_params(&self.transfer_id, &self.transfer_key, offset);
            self.gateway
                .upload_chunk(&self.transfer_url, params, chunk)
                .await?;

            self.files[index].advance(len);
            tally.chunks_sent += 1;
            tally.transferred_bytes += len;
            debug!(file = %tally.file_name, offset, len, "chunk acknowledged");
            progress(tally);
        }

        if !self.files[index].is_sent() {
            return Err(FileError::SizeMismatch(format!(
                "{} ended at {} of {expected} bytes",
                tally.file_name,
                self.files[index].chunk_position()
            ))
            .into());
        }
        Ok(())
    }

    // -- lifecycle -----------------------------------------------------------

    /// Marks the transfer complete on the service, which notifies recipients.
    ///
    /// Refused when already complete or cancelled, and while any local file
    /// is only partly uploaded. On failure the status is left unchanged.
    pub async fn complete(&mut self, keep_transfer_key: bool) -> Result<(), Error> {
        match self.status() {
            TransferStatus::Complete => {
                return Err(Error::Precondition(format!(
                    "transfer {} is already complete",
                    self.transfer_id
                )));
            }
            TransferStatus::Cancelled => {
                return Err(Error::Precondition(format!(
                    "transfer {} was cancelled",
                    self.transfer_id
                )));
            }
            TransferStatus::Initialized | TransferStatus::Uploading => {}
        }
        if let Some(fd) = self.files.iter().find(|f| f.is_local() && !f.is_sent()) {
            return Err(Error::Precondition(format!(
                "{} is not fully uploaded ({} of {} bytes)",
                fd.file_name(),
                fd.chunk_position(),
                fd.total_size()
            )));
        }

        let mut params = self.scoped_params(Action::Complete, true)?;
        params.set("keep_transfer_key", keep_transfer_key);
        let body = self.call(Action::Complete, params).await?;

        self.merge_info(&body);
        self.set_status(TransferStatus::Complete);
        Ok(())
    }

    /// Cancels an open transfer.
    pub async fn cancel(&mut self) -> Result<(), Error> {
        self.ensure_open("cancel")?;
        let params = self.scoped_params(Action::Cancel, true)?;
        self.call(Action::Cancel, params).await?;
        self.set_status(TransferStatus::Cancelled);
        Ok(())
    }

    /// Deletes the transfer from the account. An open session becomes
    /// CANCELLED.
    pub async fn delete(&mut self) -> Result<(), Error> {
        self.require_id()?;
        let params = self.scoped_params(Action::Delete, false)?;
        self.call(Action::Delete, params).await?;
        if !self.status().is_terminal() {
            self.set_status(TransferStatus::Cancelled);
        }
        Ok(())
    }

    /// Asks the service to build a zip archive of the transfer.
    pub async fn zip(&mut self) -> Result<(), Error> {
        self.require_key()?;
        let params = self.scoped_params(Action::Zip, true)?;
        let body = self.call(Action::Zip, params).await?;
        self.merge_info(&body);
        Ok(())
    }

    /// Changes message, availability, download limit or notification of a
    /// completed transfer.
    pub async fn update(&mut self, fields: TransferUpdate) -> Result<(), Error> {
        fields.validate()?;
        let status = self.status();
        if status != TransferStatus::Complete {
            return Err(Error::Precondition(format!(
                "only a completed transfer can be updated; {} is {status}",
                self.transfer_id
            )));
        }

        let mut params = self.scoped_params(Action::Update, true)?;
        params
            .set_opt("message", fields.message.as_deref())
            .set_opt("days", fields.days)
            .set_opt("downloads", fields.downloads)
            .set_opt("notify", fields.notify);
        let body = self.call(Action::Update, params).await?;

        if let Some(message) = fields.message {
            self.metadata.message = message;
        }
        if let Some(days) = fields.days {
            self.metadata.days = days;
        }
        if fields.downloads.is_some() {
            self.metadata.downloads = fields.downloads;
        }
        if let Some(notify) = fields.notify {
            self.metadata.notify = notify;
        }
        self.merge_info(&body);
        Ok(())
    }

    // -- remote files --------------------------------------------------------

    /// Fetches the service's file list and merges it into the session.
    ///
    /// Listed files replace local entries with the same id, except files
    /// still waiting to be uploaded; unknown ones are appended.
    pub async fn get_files(&mut self) -> Result<&[FileDescriptor], Error> {
        self.require_id()?;
        let params = self.scoped_params(Action::TransferGet, false)?;
        let body = self.call(Action::TransferGet, params).await?;
        let resp: TransferGetResponse = decode(body)?;

        for remote in &resp.transfer.files {
            let fd = FileDescriptor::from_remote_data(remote);
            match self.files.iter_mut().find(|f| f.file_id() == fd.file_id()) {
                Some(slot) if slot.is_local() && !slot.is_sent() => {}
                Some(slot) => *slot = fd,
                None => self.files.push(fd),
            }
        }
        self.info.extend(resp.transfer.extra);
        Ok(&self.files)
    }

    /// Downloads one file into `dest_dir`.
    ///
    /// Remote folders are recreated below `dest_dir`. An existing file is
    /// left alone unless `overwrite` is set; that is reported as
    /// [`DownloadOutcome::Skipped`], not as an error.
    pub async fn download<F>(
        &self,
        file: &FileDescriptor,
        dest_dir: &Path,
        options: DownloadOptions,
        mut progress: F,
    ) -> Result<DownloadOutcome, Error>
    where
        F: FnMut(&TransferProgress) + Send,
    {
        download_file(
            self.gateway.as_ref(),
            file,
            dest_dir,
            &options,
            self.chunk_size,
            &mut progress,
        )
        .instrument(self.span.clone())
        .await
    }

    /// Shares the transfer with new recipients and an optional message.
    pub async fn share(
        &self,
        recipients: impl Into<Recipients>,
        message: Option<&str>,
        sender: Option<&str>,
    ) -> Result<(), Error> {
        self.require_id()?;
        let to = recipients.into();
        to.validate()?;
        if let Some(s) = sender
            && !is_valid_email(s)
        {
            return Err(Error::Validation(format!("invalid sender: {s}")));
        }

        let mut params = self.scoped_params(Action::Share, false)?;
        params
            .set("to", to.to_wire())
            .set("from", sender.unwrap_or(self.auth.username()))
            .set_opt("message", message);
        self.call(Action::Share, params).await?;
        Ok(())
    }

    /// Forwards the original transfer to new recipients.
    pub async fn forward(&self, recipients: impl Into<Recipients>) -> Result<(), Error> {
        self.require_key()?;
        let to = recipients.into();
        to.validate()?;
        let mut params = self.scoped_params(Action::Forward, true)?;
        params.set("to", to.to_wire());
        self.call(Action::Forward, params).await?;
        Ok(())
    }

    /// Renames a file of the transfer on the service.
    pub async fn rename_file(&self, file: &FileDescriptor, new_name: &str) -> Result<(), Error> {
        self.require_id()?;
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(Error::Validation("file name must not be empty".into()));
        }
        let mut params = self.scoped_params(Action::FileRename, true)?;
        params.set("fileid", file.file_id()).set("filename", new_name);
        self.call(Action::FileRename, params).await?;
        Ok(())
    }

    /// Deletes a file from the transfer and from the local list.
    pub async fn delete_file(&mut self, file: &FileDescriptor) -> Result<(), Error> {
        self.require_id()?;
        let mut params = self.scoped_params(Action::FileDelete, true)?;
        params.set("fileid", file.file_id());
        self.call(Action::FileDelete, params).await?;
        self.files.retain(|f| f.file_id() != file.file_id());
        Ok(())
    }
}

async fn download_file(
    gateway: &dyn Gateway,
    file: &FileDescriptor,
    dest_dir: &Path,
    options: &DownloadOptions,
    chunk_size: usize,
    progress: &mut (dyn FnMut(&TransferProgress) + Send),
) -> Result<DownloadOutcome, Error> {
    let url = file.download_url().ok_or_else(|| {
        Error::Precondition(format!("{} has no download URL", file.file_name()))
    })?;
    validate_relative_path(file.file_name())?;
    let target = file
        .file_name()
        .split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != ".")
        .fold(dest_dir.to_path_buf(), |path, part| path.join(part));

    if !options.overwrite && tokio::fs::try_exists(&target).await? {
        warn!(path = %target.display(), "file exists, skipping download");
        return Ok(DownloadOutcome::Skipped(target));
    }
    let cancelled = || options.cancel.as_ref().is_some_and(|t| t.is_cancelled());
    if cancelled() {
        return Err(Error::Cancelled);
    }

    let mut download = gateway.download(url).await?;
    let total = download.content_length.unwrap_or(file.total_size());
    let mut part = PartFile::create(&target).await?;
    let mut tally = TransferProgress {
        file_name: file.file_name().to_string(),
        total_bytes: total,
        transferred_bytes: 0,
        chunks_sent: 0,
        total_chunks: chunk_count(total, chunk_size),
    };
    info!(file = %tally.file_name, size = total, "downloading file");

    let result = copy_body(
        &mut download,
        &mut part,
        &mut tally,
        chunk_size,
        &cancelled,
        progress,
    )
    .await;
    match result {
        Ok(()) => {
            let path = part.finish().await?;
            info!(path = %path.display(), "download finished");
            Ok(DownloadOutcome::Downloaded(path))
        }
        Err(e) => {
            part.discard().await;
            Err(e)
        }
    }
}

/// Streams a download body into `part`, reporting one progress step per
/// `chunk_size` bytes written.
async fn copy_body(
    download: &mut Download,
    part: &mut PartFile,
    tally: &mut TransferProgress,
    chunk_size: usize,
    cancelled: &(dyn Fn() -> bool + Sync),
    progress: &mut (dyn FnMut(&TransferProgress) + Send),
) -> Result<(), Error> {
    while let Some(chunk) = download.body.next().await {
        if cancelled() {
            return Err(Error::Cancelled);
        }
        part.write_chunk(&chunk?).await?;

        tally.transferred_bytes = part.written();
        let done = part
            .written()
            .div_ceil(chunk_size as u64)
            .min(tally.total_chunks);
        if done > tally.chunks_sent {
            tally.chunks_sent = done;
            progress(tally);
        }
    }
    if part.written() != tally.total_bytes {
        return Err(FileError::SizeMismatch(format!(
            "{}: received {} of {} bytes",
            tally.file_name,
            part.written(),
            tally.total_bytes
        ))
        .into());
    }
    Ok(())
}

/// Remote name of a locally built archive.
fn archive_name(now: chrono::NaiveDateTime) -> String {
    format!("filemail_transfer_{}.zip", now.format("%Y_%m_%d-%H%M%S"))
}
