//! Append-only audit trail
//!
//! Every gated tool call produces one [`AuditRecord`], written as a single
//! JSON line. The trail is never read back by the server.

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Audit write failures
#[derive(Debug, Error)]
pub enum AuditError {
    /// Logger was built without a destination
    #[error("audit logger has no sink")]
    NilSink,

    #[error("failed to serialize audit record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write audit record: {0}")]
    Io(#[from] std::io::Error),
}

/// Terminal (or awaiting-confirmation) result of a gated call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Denied,
    ConfirmationRequired,
    Error(String),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Ok => write!(f, "ok"),
            Outcome::Denied => write!(f, "denied"),
            Outcome::ConfirmationRequired => write!(f, "confirmation_required"),
            Outcome::Error(detail) => write!(f, "error: {}", detail),
        }
    }
}

impl Serialize for Outcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One line of the audit trail
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    /// When the call finished, RFC 3339 with nanoseconds
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Utc>,

    /// Operation name
    pub operation: String,

    /// Resource the call targeted, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,

    /// Call parameters, without the confirmation token
    pub params: Map<String, Value>,

    /// Outcome string
    pub outcome: Outcome,

    /// Identifier of a resource created by the call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_id: Option<String>,

    /// Time spent in the gate
    pub duration_ns: u64,
}

impl AuditRecord {
    /// Create a record stamped with the current time
    pub fn new(
        operation: impl Into<String>,
        params: Map<String, Value>,
        outcome: Outcome,
        elapsed: Duration,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            operation: operation.into(),
            resource: None,
            params,
            outcome,
            created_id: None,
            duration_ns: u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX),
        }
    }

    pub fn with_resource(mut self, resource: Option<&str>) -> Self {
        self.resource = resource.map(str::to_string);
        self
    }

    pub fn with_created_id(mut self, id: Option<String>) -> Self {
        self.created_id = id;
        self
    }
}

fn serialize_timestamp<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Nanos, true))
}

/// Serialized writer for audit records
///
/// Records are encoded before the sink lock is taken; the lock only covers
/// the write and flush of one complete line.
pub struct AuditLogger {
    sink: Option<Mutex<Box<dyn Write + Send>>>,
}

impl AuditLogger {
    /// Audit into any writer
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            sink: Some(Mutex::new(Box::new(writer))),
        }
    }

    /// Audit into a file, opened for create and append
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(file))
    }

    /// A logger with no sink; every write fails with [`AuditError::NilSink`]
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    /// Append one record
    pub fn log(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let sink = self.sink.as_ref().ok_or(AuditError::NilSink)?;

        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut sink = sink.lock();
        sink.write_all(&line)?;
        sink.flush()?;
        Ok(())
    }
}

impl fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditLogger")
            .field("enabled", &self.sink.is_some())
            .finish()
    }
}
