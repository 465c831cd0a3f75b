//! Mutation application: the CDP half.
//!
//! Takes the mutation records computed by the rule engine and turns them
//! into exactly one Fetch-domain call per paused event. URL, header, and
//! cookie rebuilds happen here, against the original request data, so that
//! the browser receives one coherent replacement.

use std::collections::BTreeMap;
use std::time::Duration;

use rule_engine::context::{headers_as_pairs, parse_cookie_pairs};
use rule_engine::{RequestMutation, ResponseMutation};
use tracing::debug;
use url::Url;

use intercept_common::model::DEFAULT_BODY_SIZE_THRESHOLD;

use crate::protocol::{HeaderEntry, RequestPausedEvent};
use crate::transport::TargetClient;
use crate::Result;

/// Budget for one `Fetch.getResponseBody` round-trip.
const BODY_FETCH_TIMEOUT: Duration = Duration::from_millis(500);

/// Applies mutations to paused events over a target's CDP connection.
#[derive(Debug, Clone)]
pub struct ActionApplier {
    body_size_threshold: i64,
}

impl ActionApplier {
    pub fn new(body_size_threshold: i64) -> Self {
        Self {
            body_size_threshold,
        }
    }

    /// Resolve a request-stage event: fulfill when blocked, otherwise
    /// continue with the rebuilt URL, method, header set, and body.
    pub async fn apply_request_mutation(
        &self,
        client: &TargetClient,
        ev: &RequestPausedEvent,
        mutation: &RequestMutation,
    ) -> Result<()> {
        if let Some(block) = &mutation.block {
            let headers = sorted_entries(block.headers.iter());
            let body = (!block.body.is_empty()).then_some(block.body.as_slice());
            return client
                .fulfill_request(&ev.request_id, block.status_code, &headers, body)
                .await;
        }

        let url = build_final_url(&ev.request.url, mutation);
        let headers = build_final_request_headers(ev, mutation);
        let body = mutation.body.as_ref().map(|b| b.as_bytes());
        client
            .continue_request(
                &ev.request_id,
                url.as_deref(),
                mutation.method.as_deref(),
                Some(&headers),
                body,
            )
            .await
    }

    /// Resolve a response-stage event: a changed body forces a fulfill,
    /// status/header tweaks continue the original response.
    pub async fn apply_response_mutation(
        &self,
        client: &TargetClient,
        ev: &RequestPausedEvent,
        mutation: &ResponseMutation,
    ) -> Result<()> {
        if let Some(body) = &mutation.body {
            let code = mutation
                .status_code
                .or(ev.response_status_code)
                .unwrap_or(200);
            let headers = build_final_response_headers(ev, mutation);
            return client
                .fulfill_request(&ev.request_id, code, &headers, Some(body.as_bytes()))
                .await;
        }

        let headers = (!mutation.headers.is_empty() || !mutation.remove_headers.is_empty())
            .then(|| build_final_response_headers(ev, mutation));
        client
            .continue_response(&ev.request_id, mutation.status_code, headers.as_deref())
            .await
    }

    /// Fetch the paused response body when the gate allows it. Any failure
    /// or timeout degrades to "body unavailable".
    pub async fn fetch_response_body(
        &self,
        client: &TargetClient,
        ev: &RequestPausedEvent,
    ) -> Option<String> {
        let content_type = ev.response_header("content-type").unwrap_or_default();
        let content_length = ev
            .response_header("content-length")
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);
        if !should_fetch_body(content_type, content_length, self.body_size_threshold) {
            return None;
        }
        match tokio::time::timeout(BODY_FETCH_TIMEOUT, client.get_response_body(&ev.request_id))
            .await
        {
            Ok(Ok(body)) => Some(body),
            Ok(Err(err)) => {
                debug!(%err, request_id = %ev.request_id, "response body unavailable");
                None
            }
            Err(_) => {
                debug!(request_id = %ev.request_id, "response body fetch timed out");
                None
            }
        }
    }
}

/// Whether a response body is worth fetching: textual content types only,
/// and only under the size threshold when the length is known.
pub fn should_fetch_body(content_type: &str, content_length: i64, threshold: i64) -> bool {
    let threshold = if threshold <= 0 {
        DEFAULT_BODY_SIZE_THRESHOLD
    } else {
        threshold
    };
    if content_length > 0 && content_length > threshold {
        return false;
    }
    let ct = content_type.to_lowercase();
    ct.starts_with("text/") || ct.starts_with("application/json")
}

/// Final URL for a continue: `mutation.url` (or the original) with query
/// sets/removes folded in. `None` means the URL is untouched.
fn build_final_url(original: &str, mutation: &RequestMutation) -> Option<String> {
    if mutation.url.is_none() && mutation.query.is_empty() && mutation.remove_query.is_empty() {
        return None;
    }
    let base = mutation
        .url
        .clone()
        .unwrap_or_else(|| original.to_string());
    if mutation.query.is_empty() && mutation.remove_query.is_empty() {
        return Some(base);
    }
    let Ok(mut url) = Url::parse(&base) else {
        return Some(base);
    };

    let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    pairs.retain(|(k, _)| !mutation.remove_query.iter().any(|r| r == k));
    let sets: BTreeMap<&String, &String> = mutation.query.iter().collect();
    for (k, v) in sets {
        pairs.retain(|(pk, _)| pk != k);
        pairs.push((k.clone(), v.clone()));
    }
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    if pairs.is_empty() {
        url.set_query(None);
    } else {
        let mut qp = url.query_pairs_mut();
        qp.clear();
        for (k, v) in &pairs {
            qp.append_pair(k, v);
        }
    }
    Some(url.to_string())
}

/// Rebuild the full request header set: removes first, then sets, then the
/// cookie rebuild collapsed into a single `Cookie` header.
fn build_final_request_headers(
    ev: &RequestPausedEvent,
    mutation: &RequestMutation,
) -> Vec<HeaderEntry> {
    let mut headers: BTreeMap<String, String> =
        headers_as_pairs(&ev.request.headers).into_iter().collect();

    for name in &mutation.remove_headers {
        remove_ci(&mut headers, name);
    }
    for (name, value) in sorted(&mutation.headers) {
        remove_ci(&mut headers, name);
        headers.insert(name.clone(), value.clone());
    }

    if !mutation.cookies.is_empty() || !mutation.remove_cookies.is_empty() {
        let raw = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("cookie"))
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        let mut cookies = parse_cookie_pairs(&raw);
        for name in &mutation.remove_cookies {
            cookies.retain(|(k, _)| k != name);
        }
        for (name, value) in sorted(&mutation.cookies) {
            match cookies.iter_mut().find(|(k, _)| k == name) {
                Some(pair) => pair.1 = value.clone(),
                None => cookies.push((name.clone(), value.clone())),
            }
        }
        remove_ci(&mut headers, "cookie");
        if !cookies.is_empty() {
            let joined = cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; ");
            headers.insert("Cookie".to_string(), joined);
        }
    }

    to_entries(headers)
}

/// Rebuild the full response header set: removes first, then sets.
fn build_final_response_headers(
    ev: &RequestPausedEvent,
    mutation: &ResponseMutation,
) -> Vec<HeaderEntry> {
    let mut headers: BTreeMap<String, String> = ev
        .response_headers
        .iter()
        .map(|h| (h.name.clone(), h.value.clone()))
        .collect();

    for name in &mutation.remove_headers {
        remove_ci(&mut headers, name);
    }
    for (name, value) in sorted(&mutation.headers) {
        remove_ci(&mut headers, name);
        headers.insert(name.clone(), value.clone());
    }

    to_entries(headers)
}

fn remove_ci(headers: &mut BTreeMap<String, String>, name: &str) {
    headers.retain(|k, _| !k.eq_ignore_ascii_case(name));
}

fn sorted(map: &std::collections::HashMap<String, String>) -> BTreeMap<&String, &String> {
    map.iter().collect()
}

fn sorted_entries<'a>(
    iter: impl Iterator<Item = (&'a String, &'a String)>,
) -> Vec<HeaderEntry> {
    let sorted: BTreeMap<&String, &String> = iter.collect();
    sorted
        .into_iter()
        .map(|(name, value)| HeaderEntry {
            name: name.clone(),
            value: value.clone(),
        })
        .collect()
}

fn to_entries(headers: BTreeMap<String, String>) -> Vec<HeaderEntry> {
    headers
        .into_iter()
        .map(|(name, value)| HeaderEntry { name, value })
        .collect()
}
