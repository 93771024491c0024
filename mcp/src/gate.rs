//! Operation gate
//!
//! Every tool call runs through [`OperationGate::invoke`], which applies the
//! same sequence regardless of backend:
//!
//! 1. extract the resource identifier from the parameters
//! 2. access filter check (denied calls never reach the tracker or backend)
//! 3. for destructive operations, consume the supplied confirmation token
//!    or mint a new one and return a prompt
//! 4. run the backend action
//! 5. translate the result and write exactly one audit record
//!
//! The gate holds no per-call state. A call awaiting confirmation exists
//! only as a token in the family's [`ConfirmationTracker`].

use crate::access::AccessFilter;
use crate::audit::{AuditLogger, AuditRecord, Outcome};
use crate::backend::BackendError;
use crate::confirmation::ConfirmationTracker;
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Argument carrying the confirmation token
pub const TOKEN_PARAM: &str = "confirmation_token";

/// Boxed backend future
pub type ActionFuture = Pin<Box<dyn Future<Output = Result<ActionOutput, BackendError>> + Send>>;

/// Backend action bound to its backend
pub type Action = Arc<dyn Fn(Params) -> ActionFuture + Send + Sync>;

/// Tool call arguments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Map<String, Value>);

impl Params {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Non-empty string argument
    pub fn str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    /// Required non-empty string argument
    pub fn require_str(&self, key: &str) -> Result<&str, BackendError> {
        self.str(key)
            .ok_or_else(|| BackendError::MissingParam(key.to_string()))
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    /// List of strings; non-string entries are skipped
    pub fn str_list(&self, key: &str) -> Vec<String> {
        self.0
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Remove and return the confirmation token
    pub fn take_token(&mut self) -> Option<String> {
        match self.0.remove(TOKEN_PARAM) {
            Some(Value::String(token)) => Some(token),
            _ => None,
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// What a successful backend action produced
#[derive(Debug, Clone, Default)]
pub struct ActionOutput {
    /// Structured data shown to the caller as JSON
    pub data: Option<Value>,
    /// Free text shown verbatim (e.g. logs)
    pub text: Option<String>,
    /// Identifier of a created resource
    pub created_id: Option<String>,
}

impl ActionOutput {
    /// Action completed with nothing to report
    pub fn done() -> Self {
        Self::default()
    }

    pub fn data(data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::default()
        }
    }

    pub fn text(text: String) -> Self {
        Self {
            text: Some(text),
            ..Self::default()
        }
    }

    pub fn created(id: String) -> Self {
        Self {
            created_id: Some(id),
            ..Self::default()
        }
    }
}

/// Descriptor of one exposed operation
#[derive(Clone)]
pub struct Operation {
    /// Tool name
    pub name: &'static str,
    /// Tool description for `tools/list`
    pub description: &'static str,
    /// JSON Schema properties for the tool arguments
    pub properties: Value,
    /// Required argument names
    pub required: &'static [&'static str],
    /// Argument holding the resource identifier
    pub resource: Option<&'static str>,
    /// Further arguments whose values are access-filtered when present
    pub also_filtered: &'static [&'static str],
    /// Consequences shown in the confirmation prompt
    pub consequences: &'static str,
    /// Success message; `{resource}` and `{id}` are substituted
    pub success: &'static str,
    /// Backend call
    pub action: Action,
}

impl Operation {
    pub fn new<F, Fut>(name: &'static str, description: &'static str, action: F) -> Self
    where
        F: Fn(Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ActionOutput, BackendError>> + Send + 'static,
    {
        Self {
            name,
            description,
            properties: Value::Object(Map::new()),
            required: &[],
            resource: None,
            also_filtered: &[],
            consequences: "",
            success: "",
            action: Arc::new(move |params| -> ActionFuture { Box::pin(action(params)) }),
        }
    }

    /// Access-filtered argument naming the target resource
    pub fn resource(mut self, key: &'static str) -> Self {
        self.resource = Some(key);
        self
    }

    pub fn also_filter(mut self, keys: &'static [&'static str]) -> Self {
        self.also_filtered = keys;
        self
    }

    pub fn schema(mut self, properties: Value, required: &'static [&'static str]) -> Self {
        self.properties = properties;
        self.required = required;
        self
    }

    pub fn consequences(mut self, text: &'static str) -> Self {
        self.consequences = text;
        self
    }

    pub fn success(mut self, template: &'static str) -> Self {
        self.success = template;
        self
    }

    fn success_message(&self, resource: Option<&str>, output: &ActionOutput) -> String {
        let mut message = self
            .success
            .replace("{resource}", resource.unwrap_or_default())
            .replace("{id}", output.created_id.as_deref().unwrap_or_default());

        if let Some(data) = &output.data {
            let rendered =
                serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string());
            push_block(&mut message, &rendered);
        }
        if let Some(text) = &output.text {
            push_block(&mut message, text);
        }
        message
    }
}

fn push_block(message: &mut String, block: &str) {
    if !message.is_empty() {
        message.push('\n');
    }
    message.push_str(block);
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("resource", &self.resource)
            .finish()
    }
}

/// Prompt returned when a destructive call lacks a valid token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationPrompt {
    pub operation: String,
    pub resource: String,
    pub description: String,
    pub token: String,
    pub ttl: Duration,
}

impl ConfirmationPrompt {
    /// Pull the token out of a rendered prompt
    ///
    /// Anchored on the closing instruction, which follows the quoted
    /// resource, so a resource name cannot supply a token of its own.
    pub fn extract_token(text: &str) -> Option<&str> {
        let marker = format!("again with {}=", TOKEN_PARAM);
        let rest = &text[text.rfind(&marker)? + marker.len()..];
        let token: &str = rest
            .split(|c: char| !c.is_ascii_alphanumeric())
            .next()
            .unwrap_or_default();
        (!token.is_empty()).then_some(token)
    }
}

impl fmt::Display for ConfirmationPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "CONFIRMATION REQUIRED: {} on '{}'.",
            self.operation, self.resource
        )?;
        writeln!(f, "{}", self.description)?;
        write!(
            f,
            "To proceed, call {} again with {}={} (expires in {}).",
            self.operation,
            TOKEN_PARAM,
            self.token,
            format_ttl(self.ttl)
        )
    }
}

fn format_ttl(ttl: Duration) -> String {
    match ttl.as_secs() {
        60 => "1 minute".to_string(),
        secs if secs >= 60 && secs % 60 == 0 => format!("{} minutes", secs / 60),
        1 => "1 second".to_string(),
        secs => format!("{} seconds", secs),
    }
}

/// Caller-visible result of a gated call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateResponse {
    /// Resource rejected by the access filter
    Denied { resource: String },
    /// Destructive call parked until the caller confirms
    ConfirmationRequired(ConfirmationPrompt),
    /// Backend action succeeded
    Ok { message: String },
    /// Backend action failed
    Error { message: String },
    /// Call was cancelled before the gate changed any state
    Cancelled,
}

impl GateResponse {
    /// Text payload; each variant has a distinct prefix
    pub fn text(&self) -> String {
        match self {
            GateResponse::Denied { resource } => format!(
                "ACCESS DENIED: '{}' is not permitted by the configured access rules.",
                resource
            ),
            GateResponse::ConfirmationRequired(prompt) => prompt.to_string(),
            GateResponse::Ok { message } => message.clone(),
            GateResponse::Error { message } => format!("ERROR: {}", message),
            GateResponse::Cancelled => "ERROR: request cancelled".to_string(),
        }
    }

    /// Whether the tool result should be flagged as an error
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            GateResponse::Denied { .. } | GateResponse::Error { .. } | GateResponse::Cancelled
        )
    }
}

/// Shared gate state: the access filter, the optional audit sink and the
/// backend call deadline
#[derive(Debug, Clone)]
pub struct OperationGate {
    filter: Arc<AccessFilter>,
    audit: Option<Arc<AuditLogger>>,
    call_timeout: Duration,
}

impl OperationGate {
    pub fn new(filter: AccessFilter, audit: Option<Arc<AuditLogger>>, call_timeout: Duration) -> Self {
        Self {
            filter: Arc::new(filter),
            audit,
            call_timeout,
        }
    }

    pub fn filter(&self) -> &AccessFilter {
        &self.filter
    }

    pub fn audit_enabled(&self) -> bool {
        self.audit.is_some()
    }

    /// Run `op` with `params` through the full gate sequence
    pub async fn invoke(
        &self,
        tracker: &ConfirmationTracker,
        op: &Operation,
        mut params: Params,
        cancel: &CancellationToken,
    ) -> GateResponse {
        let started = Instant::now();
        let token = params.take_token();

        if cancel.is_cancelled() {
            return GateResponse::Cancelled;
        }

        let resource = match op.resource {
            Some(key) => match params.require_str(key) {
                Ok(r) => Some(r.to_string()),
                Err(e) => {
                    let message = e.to_string();
                    let outcome = Outcome::Error(message.clone());
                    self.record(op, &params, None, outcome, None, started);
                    return GateResponse::Error { message };
                }
            },
            None => None,
        };

        let missing = op
            .required
            .iter()
            .find(|k| params.as_map().get(**k).map_or(true, Value::is_null));
        if let Some(key) = missing {
            let message = BackendError::MissingParam(key.to_string()).to_string();
            self.record(
                op,
                &params,
                resource.as_deref(),
                Outcome::Error(message.clone()),
                None,
                started,
            );
            return GateResponse::Error { message };
        }

        let filtered = resource
            .iter()
            .map(String::as_str)
            .chain(op.also_filtered.iter().filter_map(|k| params.str(k)));
        for name in filtered {
            if !self.filter.is_allowed(name) {
                info!(operation = op.name, resource = name, "Access denied");
                let denied = name.to_string();
                self.record(op, &params, resource.as_deref(), Outcome::Denied, None, started);
                return GateResponse::Denied { resource: denied };
            }
        }

        if tracker.needs_confirmation(op.name) {
            if cancel.is_cancelled() {
                return GateResponse::Cancelled;
            }
            let target = resource.as_deref().unwrap_or_default();
            if !tracker.confirm_for(token.as_deref().unwrap_or_default(), op.name, target) {
                let token = tracker.request_confirmation(op.name, target, op.consequences);
                info!(operation = op.name, resource = target, "Confirmation required");
                self.record(
                    op,
                    &params,
                    resource.as_deref(),
                    Outcome::ConfirmationRequired,
                    None,
                    started,
                );
                return GateResponse::ConfirmationRequired(ConfirmationPrompt {
                    operation: op.name.to_string(),
                    resource: target.to_string(),
                    description: op.consequences.to_string(),
                    token,
                    ttl: tracker.ttl(),
                });
            }
            info!(operation = op.name, resource = target, "Confirmed destructive operation");
        }

        let result = self.run_action(op, params.clone(), cancel).await;

        match result {
            Ok(output) => {
                debug!(operation = op.name, "Operation succeeded");
                let message = op.success_message(resource.as_deref(), &output);
                self.record(
                    op,
                    &params,
                    resource.as_deref(),
                    Outcome::Ok,
                    output.created_id,
                    started,
                );
                GateResponse::Ok { message }
            }
            Err(e) => {
                let message = e.to_string();
                warn!(operation = op.name, error = %message, "Operation failed");
                self.record(
                    op,
                    &params,
                    resource.as_deref(),
                    Outcome::Error(message.clone()),
                    None,
                    started,
                );
                GateResponse::Error { message }
            }
        }
    }

    /// Run the backend action on its own task so a panic or a hang cannot
    /// escape the gate
    async fn run_action(
        &self,
        op: &Operation,
        params: Params,
        cancel: &CancellationToken,
    ) -> Result<ActionOutput, BackendError> {
        let mut handle = tokio::spawn((op.action)(params));

        tokio::select! {
            joined = &mut handle => match joined {
                Ok(result) => result,
                Err(e) if e.is_panic() => {
                    Err(BackendError::Internal("backend action panicked".to_string()))
                }
                Err(e) => Err(BackendError::Internal(format!("backend task failed: {}", e))),
            },
            _ = tokio::time::sleep(self.call_timeout) => {
                handle.abort();
                Err(BackendError::Timeout(self.call_timeout))
            }
            _ = cancel.cancelled() => {
                handle.abort();
                Err(BackendError::Cancelled)
            }
        }
    }

    fn record(
        &self,
        op: &Operation,
        params: &Params,
        resource: Option<&str>,
        outcome: Outcome,
        created_id: Option<String>,
        started: Instant,
    ) {
        let Some(audit) = &self.audit else {
            return;
        };

        let record = AuditRecord::new(op.name, params.as_map().clone(), outcome, started.elapsed())
            .with_resource(resource)
            .with_created_id(created_id);

        if let Err(e) = audit.log(&record) {
            warn!(operation = op.name, error = %e, "Failed to write audit record");
        }
    }
}
