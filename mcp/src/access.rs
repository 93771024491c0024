//! Resource access filtering
//!
//! Decides whether a named resource (container, network, VM, image) may be
//! touched, using shell-style allow and deny glob lists.

use glob::Pattern;
use tracing::warn;

/// A single configured glob.
///
/// `pattern` is `None` when the glob failed to compile; such a rule never
/// matches.
#[derive(Debug, Clone)]
struct Rule {
    raw: String,
    pattern: Option<Pattern>,
}

impl Rule {
    fn new(raw: &str) -> Self {
        let pattern = match Pattern::new(raw) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!(pattern = %raw, error = %e, "Ignoring malformed access pattern");
                None
            }
        };
        Self {
            raw: raw.to_string(),
            pattern,
        }
    }

    fn matches(&self, name: &str) -> bool {
        self.pattern.as_ref().is_some_and(|p| p.matches(name))
    }
}

/// Allow/deny filter over resource names
///
/// Immutable after construction, so it can be shared across tasks without
/// locking.
#[derive(Debug, Clone, Default)]
pub struct AccessFilter {
    allow: Vec<Rule>,
    deny: Vec<Rule>,
}

impl AccessFilter {
    /// Build a filter from allow and deny glob lists
    pub fn new<A, D>(allow: A, deny: D) -> Self
    where
        A: IntoIterator,
        A::Item: AsRef<str>,
        D: IntoIterator,
        D::Item: AsRef<str>,
    {
        Self {
            allow: allow.into_iter().map(|p| Rule::new(p.as_ref())).collect(),
            deny: deny.into_iter().map(|p| Rule::new(p.as_ref())).collect(),
        }
    }

    /// Build a filter from the `[access]` configuration section
    pub fn from_config(access: &warden_config::AccessSection) -> Self {
        Self::new(&access.allow, &access.deny)
    }

    /// Check whether `name` may be operated on
    ///
    /// Deny patterns are checked first and always win. With an empty allow
    /// list everything not denied is allowed; otherwise `name` must match
    /// at least one allow pattern.
    pub fn is_allowed(&self, name: &str) -> bool {
        if self.deny.iter().any(|r| r.matches(name)) {
            return false;
        }
        if self.allow.is_empty() {
            return true;
        }
        self.allow.iter().any(|r| r.matches(name))
    }

    /// Configured allow patterns, as written
    pub fn allow_patterns(&self) -> impl Iterator<Item = &str> {
        self.allow.iter().map(|r| r.raw.as_str())
    }

    /// Configured deny patterns, as written
    pub fn deny_patterns(&self) -> impl Iterator<Item = &str> {
        self.deny.iter().map(|r| r.raw.as_str())
    }
}
