//! Evaluation context built from a paused network event.
//!
//! Conditions always evaluate against request fields, so the context is
//! request-shaped even for response-stage rules. Header, query, and cookie
//! keys are lowercased once at build time so condition lookups stay
//! case-insensitive without repeated normalization.

use std::collections::HashMap;

use serde_json::Value;
use url::Url;

/// Request fields a [`crate::RuleEngine`] evaluates conditions against.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    pub url: String,
    pub method: String,
    /// Lowercased CDP resource type (`document`, `xhr`, ...).
    pub resource_type: String,
    /// Header map with lowercased keys.
    pub headers: HashMap<String, String>,
    /// First query value per key, lowercased key.
    pub query: HashMap<String, String>,
    /// Cookie map parsed from the `Cookie` header, lowercased names.
    pub cookies: HashMap<String, String>,
    pub body: String,
    pub content_type: String,
}

impl EvalContext {
    /// Build a context from the raw pieces of a `Fetch.requestPaused` event.
    ///
    /// `headers` is the CDP request headers field, which may be a JSON
    /// object or a JSON string containing one.
    pub fn from_request(
        url: &str,
        method: &str,
        resource_type: &str,
        headers: &Value,
        body: String,
    ) -> Self {
        let mut header_map = HashMap::new();
        for (k, v) in headers_as_pairs(headers) {
            header_map.insert(k.to_lowercase(), v);
        }

        let mut query = HashMap::new();
        if let Ok(parsed) = Url::parse(url) {
            for (k, v) in parsed.query_pairs() {
                // First value per key wins.
                query
                    .entry(k.to_lowercase())
                    .or_insert_with(|| v.into_owned());
            }
        }

        let mut cookies = HashMap::new();
        if let Some(raw) = header_map.get("cookie") {
            for (name, value) in parse_cookie_pairs(raw) {
                cookies.insert(name.to_lowercase(), value);
            }
        }

        let content_type = header_map.get("content-type").cloned().unwrap_or_default();

        Self {
            url: url.to_string(),
            method: method.to_string(),
            resource_type: resource_type.to_lowercase(),
            headers: header_map,
            query,
            cookies,
            body,
            content_type,
        }
    }
}

/// Flatten a CDP headers field into name/value pairs. Tolerates the field
/// being an object or a JSON blob serialized as a string.
pub fn headers_as_pairs(headers: &Value) -> Vec<(String, String)> {
    let obj = match headers {
        Value::Object(map) => Some(map.clone()),
        Value::String(s) => serde_json::from_str::<Value>(s)
            .ok()
            .and_then(|v| v.as_object().cloned()),
        _ => None,
    };
    let Some(obj) = obj else {
        return Vec::new();
    };
    obj.into_iter()
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (k, value)
        })
        .collect()
}

/// Parse a `Cookie` header (`k1=v1; k2=v2`) into name/value pairs,
/// preserving the original name casing.
pub fn parse_cookie_pairs(raw: &str) -> Vec<(String, String)> {
    raw.split(';')
        .filter_map(|part| {
            let (name, value) = part.trim().split_once('=')?;
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_lowercased_maps() {
        let headers = json!({
            "Accept": "*/*",
            "Content-Type": "application/json",
            "Cookie": "Session=abc; theme=dark"
        });
        let ctx = EvalContext::from_request(
            "https://api.example.com/v1/users?Page=2&page=3&q=x",
            "POST",
            "XHR",
            &headers,
            r#"{"a":1}"#.to_string(),
        );

        assert_eq!(ctx.headers.get("accept").unwrap(), "*/*");
        assert_eq!(ctx.content_type, "application/json");
        assert_eq!(ctx.resource_type, "xhr");
        assert_eq!(ctx.cookies.get("session").unwrap(), "abc");
        assert_eq!(ctx.cookies.get("theme").unwrap(), "dark");
        // First value per key after lowercasing.
        assert_eq!(ctx.query.get("page").unwrap(), "2");
        assert_eq!(ctx.query.get("q").unwrap(), "x");
    }

    #[test]
    fn tolerates_headers_as_json_blob() {
        let headers = Value::String(r#"{"X-Token":"t1"}"#.to_string());
        let ctx = EvalContext::from_request("https://a.example", "GET", "", &headers, String::new());
        assert_eq!(ctx.headers.get("x-token").unwrap(), "t1");
    }

    #[test]
    fn unparseable_headers_yield_empty_map() {
        let ctx = EvalContext::from_request(
            "https://a.example",
            "GET",
            "",
            &Value::String("not json".into()),
            String::new(),
        );
        assert!(ctx.headers.is_empty());
    }

    #[test]
    fn cookie_values_keep_equals_signs() {
        let pairs = parse_cookie_pairs("token=a=b=c; plain=1");
        assert_eq!(pairs[0], ("token".to_string(), "a=b=c".to_string()));
        assert_eq!(pairs[1], ("plain".to_string(), "1".to_string()));
    }
}
