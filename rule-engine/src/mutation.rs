//! Mutation records produced by the action executor.
//!
//! One mutation accumulates all changes for a single paused event. When
//! several rules match, their per-rule mutations are merged in priority
//! order: scalars are last-write-wins, map sets override per key, and
//! remove lists concatenate.

use std::collections::HashMap;

/// Synthetic response carried by a terminal `block` action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockResponse {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// Accumulated changes to a paused request.
#[derive(Debug, Clone, Default)]
pub struct RequestMutation {
    pub url: Option<String>,
    pub method: Option<String>,
    pub headers: HashMap<String, String>,
    pub remove_headers: Vec<String>,
    pub query: HashMap<String, String>,
    pub remove_query: Vec<String>,
    pub cookies: HashMap<String, String>,
    pub remove_cookies: Vec<String>,
    pub body: Option<String>,
    /// Terminal: when set, the event is fulfilled with this response and
    /// every other field is ignored.
    pub block: Option<BlockResponse>,
}

impl RequestMutation {
    /// Merge a later rule's mutation into this one.
    pub fn merge_from(&mut self, other: RequestMutation) {
        if other.url.is_some() {
            self.url = other.url;
        }
        if other.method.is_some() {
            self.method = other.method;
        }
        self.headers.extend(other.headers);
        self.query.extend(other.query);
        self.cookies.extend(other.cookies);
        self.remove_headers.extend(other.remove_headers);
        self.remove_query.extend(other.remove_query);
        self.remove_cookies.extend(other.remove_cookies);
        if other.body.is_some() {
            self.body = other.body;
        }
        if other.block.is_some() {
            self.block = other.block;
        }
    }

    /// True when applying this mutation would change the request.
    pub fn has_changes(&self) -> bool {
        self.url.is_some()
            || self.method.is_some()
            || !self.headers.is_empty()
            || !self.remove_headers.is_empty()
            || !self.query.is_empty()
            || !self.remove_query.is_empty()
            || !self.cookies.is_empty()
            || !self.remove_cookies.is_empty()
            || self.body.is_some()
            || self.block.is_some()
    }
}

/// Accumulated changes to a paused response.
#[derive(Debug, Clone, Default)]
pub struct ResponseMutation {
    pub status_code: Option<u16>,
    pub headers: HashMap<String, String>,
    pub remove_headers: Vec<String>,
    pub body: Option<String>,
}

impl ResponseMutation {
    pub fn merge_from(&mut self, other: ResponseMutation) {
        if other.status_code.is_some() {
            self.status_code = other.status_code;
        }
        self.headers.extend(other.headers);
        self.remove_headers.extend(other.remove_headers);
        if other.body.is_some() {
            self.body = other.body;
        }
    }

    pub fn has_changes(&self) -> bool {
        self.status_code.is_some()
            || !self.headers.is_empty()
            || !self.remove_headers.is_empty()
            || self.body.is_some()
    }
}
