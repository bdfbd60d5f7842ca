//! Audit log for gated requests.
//!
//! # Responsibilities
//! - Build one record per request passing through the auth gate
//! - Optionally capture small JSON request bodies
//! - Write records as JSON lines from many concurrent requests
//!
//! # Data Flow
//! ```text
//! AuthGate → PendingAudit ──finish / drop──▶ channel ──▶ audit-writer thread ──▶ file | stdout
//! ```
//!
//! # Design Decisions
//! - Each record is serialized on the request task and handed to a dedicated
//!   writer thread as one line, so file I/O never runs on a runtime worker and
//!   concurrent requests never interleave partial lines
//! - A `PendingAudit` that is dropped before it is finished still writes its
//!   record: 408 once the request deadline has passed, otherwise 499
//! - Levels: 0 off, 1 metadata, 2 metadata + request body

use axum::{
    body::Body,
    http::{header, request::Parts, HeaderMap, StatusCode},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use uuid::Uuid;

use crate::security::AuthContext;

/// Bodies above this size are never captured.
pub const MAX_AUDITED_BODY: usize = 64 * 1024;

/// Written for a request whose handler was dropped before the deadline,
/// which only happens when the client goes away.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// How much of each request is written to the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Deserialize, Serialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum AuditLevel {
    #[default]
    Off = 0,
    Metadata = 1,
    RequestBody = 2,
}

impl TryFrom<u8> for AuditLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(AuditLevel::Off),
            1 => Ok(AuditLevel::Metadata),
            2 => Ok(AuditLevel::RequestBody),
            other => Err(format!("audit level must be 0, 1 or 2, got {other}")),
        }
    }
}

impl From<AuditLevel> for u8 {
    fn from(level: AuditLevel) -> Self {
        level as u8
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub audit_id: Uuid,
    pub request_id: Option<String>,
    pub method: String,
    pub request_uri: String,
    pub user: Option<AuditUser>,
    pub response_code: Option<u16>,
    pub request_timestamp: DateTime<Utc>,
    pub response_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub request_body: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuditUser {
    pub id: String,
    pub name: String,
    pub groups: Vec<String>,
}

impl From<&AuthContext> for AuditUser {
    fn from(ctx: &AuthContext) -> Self {
        Self {
            id: ctx.user_id.clone(),
            name: ctx.username.clone(),
            groups: ctx.groups.clone(),
        }
    }
}

/// Instant after which the outer request timeout answers 408.
///
/// Stamped into the request extensions outside the timeout layer.
#[derive(Debug, Clone, Copy)]
pub struct RequestDeadline(pub Instant);

/// The request body could not be read while capturing it.
#[derive(Debug, Error)]
#[error("failed to read request body: {0}")]
pub struct BodyReadError(#[from] axum::Error);

enum WriterCommand {
    Line(Vec<u8>),
    Flush(oneshot::Sender<()>),
}

/// Concurrent-safe audit writer.
pub struct AuditLog {
    level: AuditLevel,
    writer: Option<mpsc::UnboundedSender<WriterCommand>>,
}

impl AuditLog {
    /// Start the writer thread for `writer`. Nothing is started at level 0.
    pub fn new(level: AuditLevel, writer: impl Write + Send + 'static) -> io::Result<Self> {
        if level == AuditLevel::Off {
            return Ok(Self::disabled());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::Builder::new()
            .name("audit-writer".to_string())
            .spawn(move || write_lines(writer, rx))?;

        Ok(Self {
            level,
            writer: Some(tx),
        })
    }

    pub fn disabled() -> Self {
        Self {
            level: AuditLevel::Off,
            writer: None,
        }
    }

    /// Open the configured destination: a file in append mode, or stdout.
    pub fn open(level: AuditLevel, path: Option<&Path>) -> io::Result<Self> {
        if level == AuditLevel::Off {
            return Ok(Self::disabled());
        }
        match path {
            Some(path) => {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                tracing::info!(path = %path.display(), level = ?level, "Audit log opened");
                Self::new(level, file)
            }
            None => Self::new(level, io::stdout()),
        }
    }

    pub fn level(&self) -> AuditLevel {
        self.level
    }

    /// Start a record from the request head.
    pub fn begin(&self, parts: &Parts) -> AuditRecord {
        AuditRecord {
            audit_id: Uuid::new_v4(),
            request_id: parts
                .headers
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned),
            method: parts.method.to_string(),
            request_uri: parts.uri.to_string(),
            user: None,
            response_code: None,
            request_timestamp: Utc::now(),
            response_timestamp: None,
            request_body: None,
        }
    }

    /// Start a record that is written even if the request future is dropped.
    pub fn track(self: &Arc<Self>, parts: &Parts) -> PendingAudit {
        PendingAudit {
            log: Arc::clone(self),
            record: self.begin(parts),
            deadline: parts.extensions.get::<RequestDeadline>().map(|d| d.0),
            status: None,
        }
    }

    /// Capture a small JSON body into `record`, handing back an equivalent body.
    pub async fn capture_request_body(
        &self,
        record: &mut AuditRecord,
        headers: &HeaderMap,
        body: Body,
    ) -> Result<Body, BodyReadError> {
        if self.level < AuditLevel::RequestBody || !is_small_json(headers) {
            return Ok(body);
        }

        let bytes = axum::body::to_bytes(body, MAX_AUDITED_BODY).await?;
        record.request_body = serde_json::from_slice(&bytes).ok();
        Ok(Body::from(bytes))
    }

    /// Stamp the response and write the record.
    pub fn finish(&self, mut record: AuditRecord, status: StatusCode) {
        self.write(&mut record, status.as_u16());
    }

    /// Wait until every record handed over so far has reached the destination.
    pub async fn flush(&self) {
        let Some(writer) = &self.writer else {
            return;
        };
        let (tx, rx) = oneshot::channel();
        if writer.send(WriterCommand::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    fn write(&self, record: &mut AuditRecord, status: u16) {
        let Some(writer) = &self.writer else {
            return;
        };

        record.response_code = Some(status);
        record.response_timestamp = Some(Utc::now());

        let mut line = match serde_json::to_vec(&*record) {
            Ok(line) => line,
            Err(err) => {
                tracing::error!(audit_id = %record.audit_id, error = %err, "Failed to serialize audit record");
                return;
            }
        };
        line.push(b'\n');

        if writer.send(WriterCommand::Line(line)).is_err() {
            tracing::error!(audit_id = %record.audit_id, "Audit writer has stopped");
        }
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog").field("level", &self.level).finish()
    }
}

fn write_lines(mut writer: impl Write, mut rx: mpsc::UnboundedReceiver<WriterCommand>) {
    while let Some(command) = rx.blocking_recv() {
        match command {
            WriterCommand::Line(line) => {
                if let Err(err) = writer.write_all(&line).and_then(|_| writer.flush()) {
                    tracing::error!(error = %err, "Failed to write audit record");
                }
            }
            WriterCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

/// An in-flight audit record.
///
/// Exactly one line is written per `PendingAudit`: on [`PendingAudit::finish`],
/// or on drop when the request never produced a response of its own.
pub struct PendingAudit {
    log: Arc<AuditLog>,
    record: AuditRecord,
    deadline: Option<Instant>,
    status: Option<u16>,
}

impl PendingAudit {
    pub fn record_mut(&mut self) -> &mut AuditRecord {
        &mut self.record
    }

    pub fn finish(mut self, status: StatusCode) {
        self.status = Some(status.as_u16());
    }

    fn cancelled_status(&self) -> u16 {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => StatusCode::REQUEST_TIMEOUT.as_u16(),
            _ => CLIENT_CLOSED_REQUEST,
        }
    }
}

impl Drop for PendingAudit {
    fn drop(&mut self) {
        let status = match self.status {
            Some(status) => status,
            None => {
                let status = self.cancelled_status();
                tracing::debug!(audit_id = %self.record.audit_id, status, "Request dropped before completion");
                status
            }
        };
        self.log.write(&mut self.record, status);
    }
}

fn is_small_json(headers: &HeaderMap) -> bool {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        .unwrap_or(false);
    let small = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
        .map(|len| len <= MAX_AUDITED_BODY)
        .unwrap_or(false);
    is_json && small
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuffer {
        fn records(&self) -> Vec<AuditRecord> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        }
    }

    fn parts(uri: &str) -> Parts {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("x-request-id", "req-1")
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    fn json_headers(len: usize) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        headers.insert(header::CONTENT_LENGTH, len.to_string().parse().unwrap());
        headers
    }

    #[tokio::test]
    async fn test_record_written_as_json_line() {
        let buffer = SharedBuffer::default();
        let log = AuditLog::new(AuditLevel::Metadata, buffer.clone()).unwrap();

        let record = log.begin(&parts("/v3/clusters?limit=5"));
        log.finish(record, StatusCode::UNAUTHORIZED);
        log.flush().await;

        let records = buffer.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].method, "POST");
        assert_eq!(records[0].request_uri, "/v3/clusters?limit=5");
        assert_eq!(records[0].request_id.as_deref(), Some("req-1"));
        assert_eq!(records[0].response_code, Some(401));
        assert!(records[0].user.is_none());
    }

    #[tokio::test]
    async fn test_disabled_log_writes_nothing() {
        let buffer = SharedBuffer::default();
        let log = AuditLog::new(AuditLevel::Off, buffer.clone()).unwrap();
        let record = log.begin(&parts("/v3"));
        log.finish(record, StatusCode::OK);
        log.flush().await;
        assert!(buffer.records().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_writers_do_not_interleave() {
        let buffer = SharedBuffer::default();
        let log = Arc::new(AuditLog::new(AuditLevel::Metadata, buffer.clone()).unwrap());

        let threads: Vec<_> = (0..8)
            .map(|t| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let record = log.begin(&parts(&format!("/v3/thread/{t}/{i}")));
                        log.finish(record, StatusCode::OK);
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        log.flush().await;

        assert_eq!(buffer.records().len(), 400);
    }

    #[tokio::test]
    async fn test_finish_does_not_wait_for_the_destination() {
        struct Stalled(Arc<Mutex<()>>);

        impl Write for Stalled {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                let _held = self.0.lock().unwrap();
                Ok(buf.len())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let gate = Arc::new(Mutex::new(()));
        let held = gate.lock().unwrap();
        let log = AuditLog::new(AuditLevel::Metadata, Stalled(gate.clone())).unwrap();

        let started = std::time::Instant::now();
        for _ in 0..3 {
            log.finish(log.begin(&parts("/v3")), StatusCode::OK);
        }
        assert!(started.elapsed() < Duration::from_millis(500));

        drop(held);
        tokio::time::timeout(Duration::from_secs(5), log.flush())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_dropped_pending_audit_still_writes() {
        let buffer = SharedBuffer::default();
        let log = Arc::new(AuditLog::new(AuditLevel::Metadata, buffer.clone()).unwrap());

        let mut expired = parts("/v3/expired");
        expired
            .extensions
            .insert(RequestDeadline(Instant::now() - Duration::from_secs(1)));
        drop(log.track(&expired));

        let mut live = parts("/v3/live");
        live.extensions
            .insert(RequestDeadline(Instant::now() + Duration::from_secs(60)));
        drop(log.track(&live));

        log.track(&parts("/v3/done")).finish(StatusCode::CREATED);
        log.flush().await;

        let codes: Vec<_> = buffer
            .records()
            .into_iter()
            .map(|r| (r.request_uri, r.response_code))
            .collect();
        assert_eq!(
            codes,
            vec![
                ("/v3/expired".to_string(), Some(408)),
                ("/v3/live".to_string(), Some(CLIENT_CLOSED_REQUEST)),
                ("/v3/done".to_string(), Some(201)),
            ]
        );
    }

    #[tokio::test]
    async fn test_request_body_captured_at_level_two() {
        let log = AuditLog::new(AuditLevel::RequestBody, SharedBuffer::default()).unwrap();

        let mut record = log.begin(&parts("/v3/clusters"));
        let body = log
            .capture_request_body(&mut record, &json_headers(13), Body::from(r#"{"name":"c1"}"#))
            .await
            .unwrap();

        assert_eq!(record.request_body, Some(serde_json::json!({"name": "c1"})));
        let replay = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        assert_eq!(&replay[..], br#"{"name":"c1"}"#);
    }

    #[tokio::test]
    async fn test_request_body_read_error_is_returned() {
        let log = AuditLog::new(AuditLevel::RequestBody, SharedBuffer::default()).unwrap();
        let chunks: Vec<Result<&'static str, io::Error>> = vec![
            Ok(r#"{"na"#),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ];
        let body = Body::from_stream(futures_util::stream::iter(chunks));

        let mut record = log.begin(&parts("/v3/clusters"));
        let result = log.capture_request_body(&mut record, &json_headers(13), body).await;

        assert!(result.is_err());
        assert!(record.request_body.is_none());
    }

    #[tokio::test]
    async fn test_request_body_skipped_at_metadata_level() {
        let log = AuditLog::new(AuditLevel::Metadata, SharedBuffer::default()).unwrap();

        let mut record = log.begin(&parts("/v3/clusters"));
        let _ = log
            .capture_request_body(&mut record, &json_headers(2), Body::from("{}"))
            .await
            .unwrap();
        assert!(record.request_body.is_none());
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!(AuditLevel::try_from(2), Ok(AuditLevel::RequestBody));
        assert!(AuditLevel::try_from(3).is_err());
    }
}
