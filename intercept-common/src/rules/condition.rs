//! Match conditions.
//!
//! Each variant carries exactly the fields it needs; the `type` tag on the
//! wire selects the variant. Conditions are grouped in six families: URL,
//! method/resource-type, header, query, cookie, and body matchers.

use serde::{Deserialize, Serialize};

/// A single match condition, evaluated against request fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Condition {
    // URL matchers compare against the full request URL as captured.
    UrlEquals { value: String },
    UrlPrefix { value: String },
    UrlSuffix { value: String },
    UrlContains { value: String },
    UrlRegex { pattern: String },

    /// True when any listed method equals the request method
    /// (case-insensitive).
    Method { values: Vec<String> },
    /// True when any listed resource type equals the request's.
    ResourceType { values: Vec<String> },

    HeaderExists { name: String },
    HeaderNotExists { name: String },
    HeaderEquals { name: String, value: String },
    HeaderContains { name: String, value: String },
    HeaderRegex { name: String, pattern: String },

    QueryExists { name: String },
    QueryNotExists { name: String },
    QueryEquals { name: String, value: String },
    QueryContains { name: String, value: String },
    QueryRegex { name: String, pattern: String },

    CookieExists { name: String },
    CookieNotExists { name: String },
    CookieEquals { name: String, value: String },
    CookieContains { name: String, value: String },
    CookieRegex { name: String, pattern: String },

    /// False when the request body is empty.
    BodyContains { value: String },
    /// False when the body is empty or the pattern fails to compile.
    BodyRegex { pattern: String },
    /// Navigates the body as JSON by pointer and compares the stringified
    /// leaf against `value`.
    BodyJsonPath { path: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_names_are_camel_case() {
        let c = Condition::UrlPrefix {
            value: "https://a".into(),
        };
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["type"], "urlPrefix");

        let c = Condition::HeaderNotExists { name: "X-A".into() };
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["type"], "headerNotExists");

        let c = Condition::BodyJsonPath {
            path: "/a/b".into(),
            value: "1".into(),
        };
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["type"], "bodyJsonPath");
        assert_eq!(json["path"], "/a/b");
    }

    #[test]
    fn parses_multi_value_matchers() {
        let c: Condition =
            serde_json::from_str(r#"{"type":"method","values":["GET","POST"]}"#).unwrap();
        match c {
            Condition::Method { values } => assert_eq!(values, vec!["GET", "POST"]),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        let res: Result<Condition, _> =
            serde_json::from_str(r#"{"type":"urlGlob","value":"*"}"#);
        assert!(res.is_err());
    }
}
