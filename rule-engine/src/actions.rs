//! Action execution: the pure half.
//!
//! Turns one rule's ordered action list into a mutation record. Body
//! actions chain: each reads the in-progress body, not the original. All
//! decode/parse failures fail closed: the action no-ops and the body is
//! preserved.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use intercept_common::{Action, BodyEncoding};
use url::form_urlencoded;

use crate::jsonpatch;
use crate::mutation::{BlockResponse, RequestMutation, ResponseMutation};

/// Run a request-stage action list. Returns the mutation plus the wire
/// names of the actions that actually executed (a terminal `block` stops
/// the list).
pub fn run_request_actions(
    actions: &[Action],
    original_body: &str,
    content_type: &str,
) -> (RequestMutation, Vec<&'static str>) {
    let mut mutation = RequestMutation::default();
    let mut executed = Vec::with_capacity(actions.len());
    let mut body = original_body.to_string();

    for action in actions {
        executed.push(action.type_name());
        match action {
            Action::SetUrl { value } => mutation.url = Some(value.clone()),
            Action::SetMethod { value } => mutation.method = Some(value.clone()),
            Action::SetHeader { name, value } => {
                mutation.headers.insert(name.clone(), value.clone());
            }
            Action::RemoveHeader { name } => mutation.remove_headers.push(name.clone()),
            Action::SetQueryParam { name, value } => {
                mutation.query.insert(name.clone(), value.clone());
            }
            Action::RemoveQueryParam { name } => mutation.remove_query.push(name.clone()),
            Action::SetCookie { name, value } => {
                mutation.cookies.insert(name.clone(), value.clone());
            }
            Action::RemoveCookie { name } => mutation.remove_cookies.push(name.clone()),
            Action::SetBody { value, encoding } => {
                if let Some(decoded) = decode_body(value, *encoding) {
                    body = decoded;
                    mutation.body = Some(body.clone());
                }
            }
            Action::ReplaceBodyText {
                search,
                replace,
                replace_all,
            } => {
                body = replace_text(&body, search, replace, *replace_all);
                mutation.body = Some(body.clone());
            }
            Action::PatchBodyJson { patches } => {
                if let Some(patched) = jsonpatch::apply_patches(&body, patches) {
                    body = patched;
                    mutation.body = Some(body.clone());
                }
            }
            Action::SetFormField { name, value } => {
                if is_urlencoded_form(content_type) {
                    body = set_urlencoded_field(&body, name, Some(value));
                    mutation.body = Some(body.clone());
                }
                // multipart/form-data is accepted but not rewritten.
            }
            Action::RemoveFormField { name } => {
                if is_urlencoded_form(content_type) {
                    body = set_urlencoded_field(&body, name, None);
                    mutation.body = Some(body.clone());
                }
            }
            Action::Block {
                status_code,
                headers,
                body: block_body,
                body_encoding,
            } => {
                mutation.block = Some(BlockResponse {
                    status_code: *status_code,
                    headers: headers.clone(),
                    body: decode_block_body(block_body, *body_encoding),
                });
                return (mutation, executed);
            }
            // Response-only actions are ignored at the request stage.
            Action::SetStatus { .. } => {
                executed.pop();
            }
        }
    }

    (mutation, executed)
}

/// Run a response-stage action list against the current response body.
pub fn run_response_actions(
    actions: &[Action],
    response_body: &str,
) -> (ResponseMutation, Vec<&'static str>) {
    let mut mutation = ResponseMutation::default();
    let mut executed = Vec::with_capacity(actions.len());
    let mut body = response_body.to_string();

    for action in actions {
        executed.push(action.type_name());
        match action {
            Action::SetStatus { value } => mutation.status_code = Some(*value),
            Action::SetHeader { name, value } => {
                mutation.headers.insert(name.clone(), value.clone());
            }
            Action::RemoveHeader { name } => mutation.remove_headers.push(name.clone()),
            Action::SetBody { value, encoding } => {
                if let Some(decoded) = decode_body(value, *encoding) {
                    body = decoded;
                    mutation.body = Some(body.clone());
                }
            }
            Action::ReplaceBodyText {
                search,
                replace,
                replace_all,
            } => {
                body = replace_text(&body, search, replace, *replace_all);
                mutation.body = Some(body.clone());
            }
            Action::PatchBodyJson { patches } => {
                if let Some(patched) = jsonpatch::apply_patches(&body, patches) {
                    body = patched;
                    mutation.body = Some(body.clone());
                }
            }
            // Request-only actions are ignored at the response stage.
            _ => {
                executed.pop();
            }
        }
    }

    (mutation, executed)
}

/// Decode a literal body payload. Base64 decode failure yields `None` and
/// the action no-ops.
fn decode_body(value: &str, encoding: BodyEncoding) -> Option<String> {
    match encoding {
        BodyEncoding::Text => Some(value.to_string()),
        BodyEncoding::Base64 => BASE64
            .decode(value)
            .ok()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()),
    }
}

/// Decode a block body to raw bytes; an undecodable base64 payload falls
/// back to the literal text.
fn decode_block_body(body: &str, encoding: BodyEncoding) -> Vec<u8> {
    match encoding {
        BodyEncoding::Text => body.as_bytes().to_vec(),
        BodyEncoding::Base64 => BASE64
            .decode(body)
            .unwrap_or_else(|_| body.as_bytes().to_vec()),
    }
}

fn replace_text(body: &str, search: &str, replace: &str, replace_all: bool) -> String {
    if replace_all {
        body.replace(search, replace)
    } else {
        body.replacen(search, replace, 1)
    }
}

fn is_urlencoded_form(content_type: &str) -> bool {
    content_type.contains("application/x-www-form-urlencoded")
}

/// Set (`Some`) or delete (`None`) one field of a urlencoded form body.
/// The target key collapses to a single value; other keys keep all their
/// values. Keys are re-encoded in sorted order.
fn set_urlencoded_field(body: &str, name: &str, value: Option<&str>) -> String {
    let mut pairs: Vec<(String, String)> = form_urlencoded::parse(body.as_bytes())
        .into_owned()
        .collect();
    pairs.retain(|(k, _)| k != name);
    if let Some(v) = value {
        pairs.push((name.to_string(), v.to_string()));
    }
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    let mut ser = form_urlencoded::Serializer::new(String::new());
    for (k, v) in &pairs {
        ser.append_pair(k, v);
    }
    ser.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use intercept_common::{JsonPatchOp, PatchOp};
    use serde_json::json;

    fn set_header(name: &str, value: &str) -> Action {
        Action::SetHeader {
            name: name.into(),
            value: value.into(),
        }
    }

    #[test]
    fn header_and_query_actions_accumulate() {
        let actions = vec![
            set_header("X-Debug", "true"),
            Action::RemoveHeader {
                name: "X-Trace".into(),
            },
            Action::SetQueryParam {
                name: "page".into(),
                value: "1".into(),
            },
        ];
        let (mutation, executed) = run_request_actions(&actions, "", "");
        assert_eq!(mutation.headers.get("X-Debug").unwrap(), "true");
        assert_eq!(mutation.remove_headers, vec!["X-Trace".to_string()]);
        assert_eq!(mutation.query.get("page").unwrap(), "1");
        assert_eq!(executed, vec!["setHeader", "removeHeader", "setQueryParam"]);
    }

    #[test]
    fn body_actions_chain_within_a_rule() {
        let actions = vec![
            Action::SetBody {
                value: r#"{"a":1}"#.into(),
                encoding: BodyEncoding::Text,
            },
            Action::PatchBodyJson {
                patches: vec![JsonPatchOp {
                    op: PatchOp::Replace,
                    path: "/a".into(),
                    from: None,
                    value: Some(json!(2)),
                }],
            },
            Action::ReplaceBodyText {
                search: "2".into(),
                replace: "3".into(),
                replace_all: false,
            },
        ];
        let (mutation, _) = run_request_actions(&actions, "ignored original", "");
        assert_eq!(mutation.body.as_deref(), Some(r#"{"a":3}"#));
    }

    #[test]
    fn block_is_terminal() {
        let actions = vec![
            Action::Block {
                status_code: 403,
                headers: [("Content-Type".to_string(), "text/plain".to_string())].into(),
                body: "no".into(),
                body_encoding: BodyEncoding::Text,
            },
            set_header("X-Never", "1"),
        ];
        let (mutation, executed) = run_request_actions(&actions, "", "");
        let block = mutation.block.unwrap();
        assert_eq!(block.status_code, 403);
        assert_eq!(block.body, b"no".to_vec());
        assert!(mutation.headers.is_empty());
        assert_eq!(executed, vec!["block"]);
    }

    #[test]
    fn set_body_base64_decode_failure_noops() {
        let actions = vec![Action::SetBody {
            value: "!!! not base64 !!!".into(),
            encoding: BodyEncoding::Base64,
        }];
        let (mutation, _) = run_request_actions(&actions, "original", "");
        assert!(mutation.body.is_none());
    }

    #[test]
    fn set_body_base64_decodes() {
        let actions = vec![Action::SetBody {
            value: BASE64.encode("decoded!"),
            encoding: BodyEncoding::Base64,
        }];
        let (mutation, _) = run_request_actions(&actions, "", "");
        assert_eq!(mutation.body.as_deref(), Some("decoded!"));
    }

    #[test]
    fn set_body_twice_equals_once() {
        let set = Action::SetBody {
            value: "same".into(),
            encoding: BodyEncoding::Text,
        };
        let (once, _) = run_request_actions(std::slice::from_ref(&set), "", "");
        let (twice, _) = run_request_actions(&[set.clone(), set], "", "");
        assert_eq!(once.body, twice.body);
    }

    #[test]
    fn replace_body_text_first_vs_all() {
        let first = vec![Action::ReplaceBodyText {
            search: "x".into(),
            replace: "y".into(),
            replace_all: false,
        }];
        let (m, _) = run_request_actions(&first, "x-x-x", "");
        assert_eq!(m.body.as_deref(), Some("y-x-x"));

        let all = vec![Action::ReplaceBodyText {
            search: "x".into(),
            replace: "y".into(),
            replace_all: true,
        }];
        let (m, _) = run_request_actions(&all, "x-x-x", "");
        assert_eq!(m.body.as_deref(), Some("y-y-y"));
    }

    #[test]
    fn form_field_requires_urlencoded_content_type() {
        let actions = vec![Action::SetFormField {
            name: "user".into(),
            value: "admin".into(),
        }];

        let (m, _) = run_request_actions(&actions, "user=guest&keep=1", "application/x-www-form-urlencoded");
        assert_eq!(m.body.as_deref(), Some("keep=1&user=admin"));

        // multipart accepted, body untouched
        let (m, executed) = run_request_actions(
            &actions,
            "--boundary...",
            "multipart/form-data; boundary=boundary",
        );
        assert!(m.body.is_none());
        assert_eq!(executed, vec!["setFormField"]);
    }

    #[test]
    fn remove_form_field() {
        let actions = vec![Action::RemoveFormField {
            name: "token".into(),
        }];
        let (m, _) = run_request_actions(
            &actions,
            "a=1&token=secret",
            "application/x-www-form-urlencoded",
        );
        assert_eq!(m.body.as_deref(), Some("a=1"));
    }

    #[test]
    fn response_actions_ignore_request_only_types() {
        let actions = vec![
            Action::SetStatus { value: 418 },
            Action::SetUrl {
                value: "https://nope".into(),
            },
            set_header("X-R", "1"),
        ];
        let (mutation, executed) = run_response_actions(&actions, "");
        assert_eq!(mutation.status_code, Some(418));
        assert_eq!(mutation.headers.get("X-R").unwrap(), "1");
        assert_eq!(executed, vec!["setStatus", "setHeader"]);
    }

    #[test]
    fn response_json_patch_reads_current_body() {
        let actions = vec![
            Action::PatchBodyJson {
                patches: vec![JsonPatchOp {
                    op: PatchOp::Replace,
                    path: "/a".into(),
                    from: None,
                    value: Some(json!(2)),
                }],
            },
            Action::PatchBodyJson {
                patches: vec![JsonPatchOp {
                    op: PatchOp::Add,
                    path: "/b".into(),
                    from: None,
                    value: Some(json!(3)),
                }],
            },
        ];
        let (mutation, _) = run_response_actions(&actions, r#"{"a":1}"#);
        let body: serde_json::Value =
            serde_json::from_str(mutation.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({"a": 2, "b": 3}));
    }

    #[test]
    fn unparseable_json_patch_preserves_body() {
        let actions = vec![Action::PatchBodyJson {
            patches: vec![JsonPatchOp {
                op: PatchOp::Replace,
                path: "/a".into(),
                from: None,
                value: Some(json!(1)),
            }],
        }];
        let (mutation, _) = run_response_actions(&actions, "<html>not json</html>");
        assert!(mutation.body.is_none());
    }
}
