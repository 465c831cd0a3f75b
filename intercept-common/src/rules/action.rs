//! Rule actions and JSON Patch operations.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::Stage;

/// Encoding of a literal body payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyEncoding {
    #[default]
    Text,
    Base64,
}

/// A single RFC 6902 patch operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonPatchOp {
    pub op: PatchOp,
    /// RFC 6901 JSON Pointer.
    pub path: String,
    /// Source pointer for `move`/`copy`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Payload for `add`/`replace`/`test`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Remove,
    Replace,
    Move,
    Copy,
    Test,
}

/// A rule action. Actions in a rule run in the order given; `block` is
/// terminal and ends evaluation of the whole event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Action {
    SetUrl {
        value: String,
    },
    SetMethod {
        value: String,
    },
    SetHeader {
        name: String,
        value: String,
    },
    RemoveHeader {
        name: String,
    },
    SetQueryParam {
        name: String,
        value: String,
    },
    RemoveQueryParam {
        name: String,
    },
    SetCookie {
        name: String,
        value: String,
    },
    RemoveCookie {
        name: String,
    },
    /// Rewrites `application/x-www-form-urlencoded` bodies. Accepted for
    /// `multipart/form-data` but leaves the body unchanged.
    SetFormField {
        name: String,
        value: String,
    },
    RemoveFormField {
        name: String,
    },
    /// Replace the body. With base64 encoding, a decode failure makes the
    /// action a no-op.
    SetBody {
        value: String,
        #[serde(default)]
        encoding: BodyEncoding,
    },
    ReplaceBodyText {
        search: String,
        replace: String,
        #[serde(default)]
        replace_all: bool,
    },
    PatchBodyJson {
        patches: Vec<JsonPatchOp>,
    },
    /// Response stage only.
    SetStatus {
        value: u16,
    },
    /// Terminal: synthesize a response instead of sending the request.
    Block {
        status_code: u16,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default)]
        body: String,
        #[serde(default)]
        body_encoding: BodyEncoding,
    },
}

impl Action {
    /// The wire tag, used in rule-match summaries.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::SetUrl { .. } => "setUrl",
            Action::SetMethod { .. } => "setMethod",
            Action::SetHeader { .. } => "setHeader",
            Action::RemoveHeader { .. } => "removeHeader",
            Action::SetQueryParam { .. } => "setQueryParam",
            Action::RemoveQueryParam { .. } => "removeQueryParam",
            Action::SetCookie { .. } => "setCookie",
            Action::RemoveCookie { .. } => "removeCookie",
            Action::SetFormField { .. } => "setFormField",
            Action::RemoveFormField { .. } => "removeFormField",
            Action::SetBody { .. } => "setBody",
            Action::ReplaceBodyText { .. } => "replaceBodyText",
            Action::PatchBodyJson { .. } => "patchBodyJson",
            Action::SetStatus { .. } => "setStatus",
            Action::Block { .. } => "block",
        }
    }

    /// Whether this action ends rule evaluation for the event.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Action::Block { .. })
    }

    /// Whether this action may appear in a rule bound to `stage`.
    pub fn valid_for_stage(&self, stage: Stage) -> bool {
        match self {
            Action::SetUrl { .. }
            | Action::SetMethod { .. }
            | Action::SetQueryParam { .. }
            | Action::RemoveQueryParam { .. }
            | Action::SetCookie { .. }
            | Action::RemoveCookie { .. }
            | Action::SetFormField { .. }
            | Action::RemoveFormField { .. }
            | Action::Block { .. } => stage == Stage::Request,
            Action::SetStatus { .. } => stage == Stage::Response,
            Action::SetHeader { .. }
            | Action::RemoveHeader { .. }
            | Action::SetBody { .. }
            | Action::ReplaceBodyText { .. }
            | Action::PatchBodyJson { .. } => true,
        }
    }
}
