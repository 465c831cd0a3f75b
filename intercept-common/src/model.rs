//! Session and Engine Model Types
//!
//! Identifiers, session configuration, and engine statistics shared between
//! the service layer, the session manager, and external consumers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Unique identifier of an interception session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

/// Identifier of a browser target (typically a page/tab).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(pub String);

/// Identifier of a rule inside a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(SessionId);
string_id!(TargetId);
string_id!(RuleId);

/// Default worker pool size.
pub const DEFAULT_CONCURRENCY: usize = 8;
/// Default maximum response body size fetched for matching/rewriting (4 MiB).
pub const DEFAULT_BODY_SIZE_THRESHOLD: i64 = 4 * 1024 * 1024;
/// Default per-event processing budget in milliseconds.
pub const DEFAULT_PROCESS_TIMEOUT_MS: u64 = 3000;
/// Default capacity reserved for pending items (unused by the core).
pub const DEFAULT_PENDING_CAPACITY: usize = 64;
/// Default intercept event channel capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 128;

/// Immutable creation parameters of a session.
///
/// All fields except `devtools_url` are optional on the wire; zero or
/// negative values are replaced by defaults in [`SessionConfig::normalized`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// DevTools endpoint, typically `http://127.0.0.1:9222`.
    #[serde(rename = "devToolsURL")]
    pub devtools_url: String,

    /// Worker pool size for paused-event processing.
    #[serde(default)]
    pub concurrency: i64,

    /// Maximum response body size (bytes) fetched at the response stage.
    #[serde(rename = "bodySizeThreshold", default)]
    pub body_size_threshold: i64,

    /// Per-event processing budget in milliseconds.
    #[serde(rename = "processTimeoutMS", default)]
    pub process_timeout_ms: i64,

    /// Reserved capacity for pending items; not used by the core.
    #[serde(rename = "pendingCapacity", default)]
    pub pending_capacity: i64,

    /// Intercept event channel capacity.
    #[serde(rename = "eventCapacity", default)]
    pub event_capacity: i64,
}

impl SessionConfig {
    /// Create a config for the given DevTools endpoint with default tuning.
    pub fn new(devtools_url: impl Into<String>) -> Self {
        Self {
            devtools_url: devtools_url.into(),
            concurrency: 0,
            body_size_threshold: 0,
            process_timeout_ms: 0,
            pending_capacity: 0,
            event_capacity: 0,
        }
    }

    /// Return a copy with defaults applied to all non-positive fields.
    pub fn normalized(&self) -> Self {
        let mut cfg = self.clone();
        if cfg.concurrency <= 0 {
            cfg.concurrency = DEFAULT_CONCURRENCY as i64;
        }
        if cfg.body_size_threshold <= 0 {
            cfg.body_size_threshold = DEFAULT_BODY_SIZE_THRESHOLD;
        }
        if cfg.process_timeout_ms <= 0 {
            cfg.process_timeout_ms = DEFAULT_PROCESS_TIMEOUT_MS as i64;
        }
        if cfg.pending_capacity <= 0 {
            cfg.pending_capacity = DEFAULT_PENDING_CAPACITY as i64;
        }
        if cfg.event_capacity <= 0 {
            cfg.event_capacity = DEFAULT_EVENT_CAPACITY as i64;
        }
        cfg
    }
}

/// Rule engine hit counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    /// Number of evaluations performed.
    pub total: u64,
    /// Number of evaluations with at least one matching rule.
    pub matched: u64,
    /// Per-rule hit counters.
    pub by_rule: HashMap<RuleId, u64>,
}

/// A browser page target as reported by DevTools discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    pub id: TargetId,
    #[serde(rename = "type")]
    pub target_type: String,
    pub url: String,
    pub title: String,
    /// True when this target is currently attached to the session.
    pub is_current: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_fills_defaults() {
        let cfg = SessionConfig::new("http://127.0.0.1:9222").normalized();
        assert_eq!(cfg.concurrency, 8);
        assert_eq!(cfg.body_size_threshold, 4 * 1024 * 1024);
        assert_eq!(cfg.process_timeout_ms, 3000);
        assert_eq!(cfg.pending_capacity, 64);
        assert_eq!(cfg.event_capacity, 128);
    }

    #[test]
    fn normalized_keeps_explicit_values() {
        let mut cfg = SessionConfig::new("http://127.0.0.1:9222");
        cfg.concurrency = 2;
        cfg.process_timeout_ms = 500;
        let cfg = cfg.normalized();
        assert_eq!(cfg.concurrency, 2);
        assert_eq!(cfg.process_timeout_ms, 500);
    }

    #[test]
    fn session_config_wire_names() {
        let json = r#"{"devToolsURL":"http://localhost:9222","processTimeoutMS":1000}"#;
        let cfg: SessionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.devtools_url, "http://localhost:9222");
        assert_eq!(cfg.process_timeout_ms, 1000);
        assert_eq!(cfg.concurrency, 0);
    }
}
