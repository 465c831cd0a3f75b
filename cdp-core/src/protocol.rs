//! CDP protocol types and message framing.

use intercept_common::Stage;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outgoing CDP command.
#[derive(Debug, Serialize)]
pub struct CdpCommand {
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Incoming CDP frame: either a command response (`id`) or an event
/// (`method` + `params`).
#[derive(Debug, Deserialize)]
pub struct CdpMessage {
    pub id: Option<u64>,
    pub result: Option<Value>,
    pub error: Option<CdpRpcError>,
    pub method: Option<String>,
    pub params: Option<Value>,
}

/// Error payload of a failed command.
#[derive(Debug, Deserialize)]
pub struct CdpRpcError {
    pub code: i64,
    pub message: String,
}

/// One header on the Fetch domain wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderEntry {
    pub name: String,
    pub value: String,
}

/// A page entry from DevTools `/json` discovery.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageTarget {
    pub id: String,
    #[serde(rename = "type")]
    pub target_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    pub web_socket_debugger_url: Option<String>,
}

/// The `Fetch.requestPaused` event payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPausedEvent {
    pub request_id: String,
    pub request: PausedRequest,
    #[serde(default)]
    pub resource_type: String,
    pub response_status_code: Option<u16>,
    #[serde(default)]
    pub response_headers: Vec<HeaderEntry>,
    pub network_id: Option<String>,
}

impl RequestPausedEvent {
    /// Response stage iff the browser attached a status code.
    pub fn stage(&self) -> Stage {
        if self.response_status_code.is_some() {
            Stage::Response
        } else {
            Stage::Request
        }
    }

    /// Value of a response header, case-insensitive.
    pub fn response_header(&self, name: &str) -> Option<&str> {
        self.response_headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

/// The request half of a paused event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PausedRequest {
    pub url: String,
    pub method: String,
    /// CDP serializes this as an object; some producers send a JSON blob.
    #[serde(default)]
    pub headers: Value,
    pub post_data: Option<String>,
    #[serde(default)]
    pub post_data_entries: Vec<PostDataEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDataEntry {
    pub bytes: Option<String>,
}

impl PausedRequest {
    /// Request body: concatenation of all post-data entries, or the single
    /// `postData` string when entries are absent.
    pub fn body_text(&self) -> String {
        if !self.post_data_entries.is_empty() {
            self.post_data_entries
                .iter()
                .filter_map(|e| e.bytes.as_deref())
                .collect()
        } else {
            self.post_data.clone().unwrap_or_default()
        }
    }
}
