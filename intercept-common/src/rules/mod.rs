//! Rule Configuration Specification
//!
//! Declarative types for the JSON `Config` document: an ordered list of
//! rules, each pairing a match expression with a sequence of actions, bound
//! to the request or response stage. The wire format uses camelCase tags
//! exactly as authored by rule editors; see [`Condition`] and [`Action`] for
//! the per-variant payloads.

mod action;
mod condition;

pub use action::{Action, BodyEncoding, JsonPatchOp, PatchOp};
pub use condition::Condition;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::model::RuleId;

/// Current configuration schema version.
pub const CONFIG_VERSION: &str = "1.0";

/// Config ID length bounds.
pub const CONFIG_ID_MIN_LEN: usize = 3;
pub const CONFIG_ID_MAX_LEN: usize = 64;
/// Rule ID length bounds.
pub const RULE_ID_MIN_LEN: usize = 1;
pub const RULE_ID_MAX_LEN: usize = 64;

/// Validation failures surfaced to rule-loading callers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("config id `{0}` must be {CONFIG_ID_MIN_LEN}-{CONFIG_ID_MAX_LEN} characters of [A-Za-z0-9_-]")]
    InvalidConfigId(String),
    #[error("rule id `{0}` must be {RULE_ID_MIN_LEN}-{RULE_ID_MAX_LEN} characters of [A-Za-z0-9_-]")]
    InvalidRuleId(String),
    #[error("duplicate rule id `{0}`")]
    DuplicateRuleId(String),
}

/// Lifecycle stage a rule is bound to.
///
/// Conditions always evaluate against request fields regardless of stage; a
/// response rule still matches on the originating request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Request,
    Response,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Request => f.write_str("request"),
            Stage::Response => f.write_str("response"),
        }
    }
}

/// Match expression: `all_of` is AND, `any_of` is OR.
///
/// A match succeeds iff (allOf empty or all true) AND (anyOf empty or at
/// least one true). Both empty is a universal match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    #[serde(default)]
    pub all_of: Vec<Condition>,
    #[serde(default)]
    pub any_of: Vec<Condition>,
}

/// A declarative interception rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub name: String,
    pub enabled: bool,
    /// Higher priority runs first; ties preserve configuration order.
    pub priority: i32,
    pub stage: Stage,
    #[serde(rename = "match", default)]
    pub matcher: Match,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Rule {
    /// Create an empty enabled request-stage rule with a generated
    /// `rule-NNN` id from its list index.
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            id: RuleId(format!("rule-{:03}", index + 1)),
            name: name.into(),
            enabled: true,
            priority: 0,
            stage: Stage::Request,
            matcher: Match::default(),
            actions: Vec::new(),
        }
    }
}

/// Root configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    /// Reserved settings bag.
    #[serde(default)]
    pub settings: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl Config {
    /// Create an empty config with a generated id and the current version.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Self::generate_id(),
            name: name.into(),
            version: CONFIG_VERSION.to_string(),
            description: String::new(),
            settings: serde_json::Map::new(),
            rules: Vec::new(),
        }
    }

    /// Generate a config id in the `config-YYYYMMDD-xxxxxx` format.
    pub fn generate_id() -> String {
        let date = Utc::now().format("%Y%m%d");
        let uid = uuid::Uuid::new_v4().simple().to_string();
        format!("config-{}-{}", date, &uid[..6])
    }

    /// Validate id formats and rule-id uniqueness.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !id_within(&self.id, CONFIG_ID_MIN_LEN, CONFIG_ID_MAX_LEN) {
            return Err(ConfigError::InvalidConfigId(self.id.clone()));
        }
        let mut seen = HashSet::with_capacity(self.rules.len());
        for rule in &self.rules {
            if !id_within(rule.id.as_str(), RULE_ID_MIN_LEN, RULE_ID_MAX_LEN) {
                return Err(ConfigError::InvalidRuleId(rule.id.to_string()));
            }
            if !seen.insert(rule.id.as_str()) {
                return Err(ConfigError::DuplicateRuleId(rule.id.to_string()));
            }
        }
        Ok(())
    }
}

fn id_within(id: &str, min: usize, max: usize) -> bool {
    (min..=max).contains(&id.len())
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config_with_rule_ids(ids: &[&str]) -> Config {
        let mut cfg = Config::new("test");
        for (i, id) in ids.iter().enumerate() {
            let mut rule = Rule::new(format!("rule {i}"), i);
            rule.id = RuleId::from(*id);
            cfg.rules.push(rule);
        }
        cfg
    }

    #[test]
    fn generated_config_id_is_valid() {
        let cfg = Config::new("demo");
        assert!(cfg.id.starts_with("config-"));
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.version, CONFIG_VERSION);
    }

    #[test]
    fn duplicate_rule_ids_rejected() {
        let cfg = config_with_rule_ids(&["r1", "r1"]);
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::DuplicateRuleId("r1".into()))
        );
    }

    #[test]
    fn bad_rule_id_charset_rejected() {
        let cfg = config_with_rule_ids(&["has space"]);
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidRuleId(_))));
    }

    #[test]
    fn short_config_id_rejected() {
        let mut cfg = Config::new("demo");
        cfg.id = "ab".into();
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidConfigId(_))
        ));
    }

    #[test]
    fn config_round_trips_wire_format() {
        let json = r#"{
            "id": "config-20250101-abc123",
            "name": "sample",
            "version": "1.0",
            "rules": [{
                "id": "r-1",
                "name": "inject header",
                "enabled": true,
                "priority": 100,
                "stage": "request",
                "match": {"allOf": [{"type": "urlPrefix", "value": "https://api.example.com"}]},
                "actions": [{"type": "setHeader", "name": "X-Debug", "value": "true"}]
            }]
        }"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.rules[0].stage, Stage::Request);
        assert_eq!(cfg.rules[0].matcher.all_of.len(), 1);

        let back = serde_json::to_string(&cfg).unwrap();
        let cfg2: Config = serde_json::from_str(&back).unwrap();
        assert_eq!(cfg2.rules[0].id, cfg.rules[0].id);
        assert_eq!(cfg2.rules[0].actions.len(), 1);
    }

    proptest! {
        #[test]
        fn valid_charset_ids_accepted(id in "[A-Za-z0-9_-]{1,64}") {
            let cfg = config_with_rule_ids(&[id.as_str()]);
            prop_assert!(cfg.validate().is_ok());
        }

        #[test]
        fn oversized_ids_rejected(id in "[A-Za-z0-9_-]{65,80}") {
            let cfg = config_with_rule_ids(&[id.as_str()]);
            prop_assert!(cfg.validate().is_err());
        }
    }
}
