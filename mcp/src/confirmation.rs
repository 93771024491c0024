//! Confirmation tokens for destructive operations
//!
//! A destructive call first receives a token instead of executing. The
//! caller has to repeat the call with that token within [`CONFIRMATION_TTL`]
//! for the action to run. Tokens are single-use: presenting one removes it,
//! whether or not it was still valid.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::debug;

/// Lifetime of an unconsumed confirmation token
pub const CONFIRMATION_TTL: Duration = Duration::from_secs(5 * 60);

/// Random bytes per token (128 bits)
const TOKEN_BYTES: usize = 16;

/// An outstanding request to confirm a destructive action
#[derive(Debug, Clone)]
pub struct PendingConfirmation {
    /// Capability string handed to the caller
    pub token: String,

    /// Operation awaiting confirmation
    pub operation: String,

    /// Resource the operation targets
    pub resource: String,

    /// Consequences, as shown to the caller
    pub description: String,

    /// When the token was issued
    pub created_at: DateTime<Utc>,

    /// Monotonic issue time, used for expiry
    issued: Instant,
}

impl PendingConfirmation {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.issued.elapsed() > ttl
    }
}

/// Issues and consumes confirmation tokens for one family of operations
///
/// The destructive set is fixed at construction. The token map sits behind
/// a single mutex that is only held for map operations.
#[derive(Debug)]
pub struct ConfirmationTracker {
    destructive: HashSet<String>,
    pending: Mutex<HashMap<String, PendingConfirmation>>,
    ttl: Duration,
}

impl ConfirmationTracker {
    /// Create a tracker for the given destructive operation names
    pub fn new<I, S>(destructive: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            destructive: destructive.into_iter().map(Into::into).collect(),
            pending: Mutex::new(HashMap::new()),
            ttl: CONFIRMATION_TTL,
        }
    }

    /// Override the token lifetime
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Whether `operation` must be confirmed before it runs
    pub fn needs_confirmation(&self, operation: &str) -> bool {
        self.destructive.contains(operation)
    }

    /// Operation names that require confirmation
    pub fn destructive_operations(&self) -> impl Iterator<Item = &str> {
        self.destructive.iter().map(String::as_str)
    }

    /// Token lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a fresh token for `operation` on `resource`
    ///
    /// Expired entries are swept before the new one is inserted.
    pub fn request_confirmation(
        &self,
        operation: &str,
        resource: &str,
        description: &str,
    ) -> String {
        let token = generate_token();
        let entry = PendingConfirmation {
            token: token.clone(),
            operation: operation.to_string(),
            resource: resource.to_string(),
            description: description.to_string(),
            created_at: Utc::now(),
            issued: Instant::now(),
        };

        let mut pending = self.pending.lock();
        let ttl = self.ttl;
        pending.retain(|_, p| !p.is_expired(ttl));
        pending.insert(token.clone(), entry);
        drop(pending);

        debug!(
            operation = operation,
            resource = resource,
            token_prefix = %&token[..8],
            "Issued confirmation token"
        );

        token
    }

    /// Consume `token`
    ///
    /// Returns `true` only for a known, unexpired token. A known token is
    /// removed before its age is checked, so an expired token is also
    /// consumed and cannot be presented again.
    pub fn confirm(&self, token: &str) -> bool {
        self.take(token).is_some()
    }

    /// Consume `token` on behalf of `operation` on `resource`
    ///
    /// Acceptance is the same as [`confirm`](Self::confirm): any live token
    /// of this family confirms any of its destructive operations. A token
    /// spent on a call other than the one it was issued for is logged.
    pub fn confirm_for(&self, token: &str, operation: &str, resource: &str) -> bool {
        let Some(entry) = self.take(token) else {
            return false;
        };

        if entry.operation != operation || entry.resource != resource {
            debug!(
                issued_operation = %entry.operation,
                issued_resource = %entry.resource,
                operation = operation,
                resource = resource,
                "Confirmation token issued for a different call"
            );
        }
        true
    }

    fn take(&self, token: &str) -> Option<PendingConfirmation> {
        if token.is_empty() {
            return None;
        }

        let entry = self.pending.lock().remove(token)?;

        if entry.is_expired(self.ttl) {
            debug!(operation = %entry.operation, "Rejected expired confirmation token");
            return None;
        }

        debug!(
            operation = %entry.operation,
            resource = %entry.resource,
            "Confirmation token consumed"
        );
        Some(entry)
    }

    /// Number of tokens issued and not yet consumed or swept
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
