//! JSON Patch (RFC 6902) over dynamically typed bodies.
//!
//! Operates on owned `serde_json::Value` copies and fails closed: a body
//! that does not parse, a `test` that does not hold, or a `move`/`copy`
//! whose `from` does not resolve discards the whole batch and the caller
//! keeps the original body. `add`/`replace` create missing parent objects;
//! `remove` on a missing path is a no-op. Array indices must be in-bounds
//! non-negative integers.

use intercept_common::{JsonPatchOp, PatchOp};
use serde_json::{Map, Value};

/// Apply a patch batch to `body`. Returns the re-serialized document, or
/// `None` when the batch must be discarded (caller preserves the body).
pub fn apply_patches(body: &str, patches: &[JsonPatchOp]) -> Option<String> {
    if body.is_empty() || patches.is_empty() {
        return None;
    }
    let mut doc: Value = serde_json::from_str(body).ok()?;

    for patch in patches {
        let tokens = split_pointer(&patch.path)?;
        match patch.op {
            PatchOp::Add | PatchOp::Replace => {
                let value = patch.value.clone().unwrap_or(Value::Null);
                doc = set_rec(doc, &tokens, &value);
            }
            PatchOp::Remove => {
                doc = remove_rec(doc, &tokens);
            }
            PatchOp::Copy => {
                let from = split_pointer(patch.from.as_deref()?)?;
                let src = get_by_tokens(&doc, &from)?;
                doc = set_rec(doc, &tokens, &src);
            }
            PatchOp::Move => {
                let from = split_pointer(patch.from.as_deref()?)?;
                let src = get_by_tokens(&doc, &from)?;
                doc = remove_rec(doc, &from);
                doc = set_rec(doc, &tokens, &src);
            }
            PatchOp::Test => {
                let expected = patch.value.clone().unwrap_or(Value::Null);
                let actual = get_by_tokens(&doc, &tokens)?;
                if actual != expected {
                    return None;
                }
            }
        }
    }

    serde_json::to_string(&doc).ok()
}

/// Navigate `body` as JSON by pointer and return the leaf stringified the
/// way rule values are written: bare strings, compact numbers, `true`/
/// `false`, JSON text for composites.
pub fn pointer_lookup_string(body: &str, pointer: &str) -> Option<String> {
    let doc: Value = serde_json::from_str(body).ok()?;
    let tokens = split_pointer(pointer)?;
    let leaf = get_by_tokens(&doc, &tokens)?;
    Some(match leaf {
        Value::String(s) => s,
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    })
}

/// Split an RFC 6901 pointer into unescaped tokens. `""` and pointers not
/// starting with `/` are rejected.
fn split_pointer(pointer: &str) -> Option<Vec<String>> {
    if !pointer.starts_with('/') {
        return None;
    }
    Some(
        pointer[1..]
            .split('/')
            .map(|tok| tok.replace("~1", "/").replace("~0", "~"))
            .collect(),
    )
}

fn parse_index(token: &str) -> Option<usize> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

fn get_by_tokens(doc: &Value, tokens: &[String]) -> Option<Value> {
    let mut cur = doc;
    for tok in tokens {
        cur = match cur {
            Value::Object(map) => map.get(tok)?,
            Value::Array(arr) => arr.get(parse_index(tok)?)?,
            _ => return None,
        };
    }
    Some(cur.clone())
}

fn set_rec(cur: Value, tokens: &[String], value: &Value) -> Value {
    let Some(tok) = tokens.first() else {
        return value.clone();
    };
    match cur {
        Value::Object(mut map) => {
            let child = map.remove(tok).unwrap_or(Value::Object(Map::new()));
            map.insert(tok.clone(), set_rec(child, &tokens[1..], value));
            Value::Object(map)
        }
        Value::Array(mut arr) => {
            if let Some(idx) = parse_index(tok) {
                if idx < arr.len() {
                    let child = arr[idx].take();
                    arr[idx] = set_rec(child, &tokens[1..], value);
                }
            }
            Value::Array(arr)
        }
        other => {
            // Leaf in the way: only a direct overwrite goes through.
            if tokens.len() == 1 {
                value.clone()
            } else {
                other
            }
        }
    }
}

fn remove_rec(cur: Value, tokens: &[String]) -> Value {
    let Some(tok) = tokens.first() else {
        return cur;
    };
    match cur {
        Value::Object(mut map) => {
            if tokens.len() == 1 {
                map.remove(tok);
            } else if let Some(child) = map.remove(tok) {
                map.insert(tok.clone(), remove_rec(child, &tokens[1..]));
            }
            Value::Object(map)
        }
        Value::Array(mut arr) => {
            if let Some(idx) = parse_index(tok) {
                if idx < arr.len() {
                    if tokens.len() == 1 {
                        arr.remove(idx);
                    } else {
                        let child = arr[idx].take();
                        arr[idx] = remove_rec(child, &tokens[1..]);
                    }
                }
            }
            Value::Array(arr)
        }
        other => other,
    }
}
