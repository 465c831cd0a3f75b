//! Intercept Event Stream Model
//!
//! Every paused network event that passes through the pipeline produces at
//! most one [`InterceptEvent`] on the session's event channel: `Matched`
//! when at least one rule matched (with the final outcome and rule
//! summaries), `Unmatched` otherwise. Snapshots are best-effort captures of
//! what the browser saw.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::model::{RuleId, SessionId, TargetId};

/// Best-effort capture of a request at interception time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSnapshot {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_type: String,
}

/// Best-effort capture of a response at interception time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseSnapshot {
    pub status_code: u16,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: String,
}

/// One matched rule with the action types that actually executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleMatchSummary {
    pub rule_id: RuleId,
    pub rule_name: String,
    pub actions: Vec<String>,
}

/// Outcome of a matched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalResult {
    /// A terminal `block` action synthesized the response.
    Blocked,
    /// The aggregated mutation changed the request or response.
    Modified,
    /// Rules matched but produced no effective change.
    Passed,
}

/// The full network snapshot carried by both event variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkEvent {
    pub session: SessionId,
    pub target: TargetId,
    /// Unix milliseconds.
    pub timestamp: i64,
    pub is_matched: bool,
    pub request: RequestSnapshot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_result: Option<FinalResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matched_rules: Vec<RuleMatchSummary>,
}

/// Event published to subscribers for each processed paused event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "NetworkEvent", into = "NetworkEvent")]
pub enum InterceptEvent {
    Matched(NetworkEvent),
    Unmatched(NetworkEvent),
}

impl InterceptEvent {
    pub fn is_matched(&self) -> bool {
        matches!(self, InterceptEvent::Matched(_))
    }

    pub fn network(&self) -> &NetworkEvent {
        match self {
            InterceptEvent::Matched(ev) | InterceptEvent::Unmatched(ev) => ev,
        }
    }

    pub fn into_network(self) -> NetworkEvent {
        match self {
            InterceptEvent::Matched(ev) | InterceptEvent::Unmatched(ev) => ev,
        }
    }
}

impl From<NetworkEvent> for InterceptEvent {
    fn from(ev: NetworkEvent) -> Self {
        if ev.is_matched {
            InterceptEvent::Matched(ev)
        } else {
            InterceptEvent::Unmatched(ev)
        }
    }
}

impl From<InterceptEvent> for NetworkEvent {
    fn from(ev: InterceptEvent) -> Self {
        ev.into_network()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(matched: bool) -> NetworkEvent {
        NetworkEvent {
            session: SessionId::from("s1"),
            target: TargetId::from("t1"),
            timestamp: 1_700_000_000_000,
            is_matched: matched,
            request: RequestSnapshot {
                url: "https://example.com".into(),
                method: "GET".into(),
                ..Default::default()
            },
            response: None,
            final_result: matched.then_some(FinalResult::Modified),
            matched_rules: Vec::new(),
        }
    }

    #[test]
    fn variant_follows_is_matched() {
        assert!(InterceptEvent::from(sample(true)).is_matched());
        assert!(!InterceptEvent::from(sample(false)).is_matched());
    }

    #[test]
    fn serializes_final_result_lowercase() {
        let json = serde_json::to_value(InterceptEvent::from(sample(true))).unwrap();
        assert_eq!(json["finalResult"], "modified");
        assert_eq!(json["isMatched"], true);
    }

    #[test]
    fn round_trips_through_json() {
        let ev = InterceptEvent::from(sample(false));
        let json = serde_json::to_string(&ev).unwrap();
        let back: InterceptEvent = serde_json::from_str(&json).unwrap();
        assert!(!back.is_matched());
        assert_eq!(back.network().request.url, "https://example.com");
    }
}
