//! Rule Engine
//!
//! The pure half of the interception pipeline: compiles a declarative
//! [`intercept_common::Config`] into an evaluable rule set, matches paused
//! requests against it, and turns matched rules' action lists into mutation
//! records. No I/O happens here; applying mutations to the browser is the
//! CDP layer's job.

pub mod actions;
pub mod context;
pub mod engine;
pub mod jsonpatch;
pub mod mutation;
pub mod regex_cache;

pub use actions::{run_request_actions, run_response_actions};
pub use context::EvalContext;
pub use engine::RuleEngine;
pub use mutation::{BlockResponse, RequestMutation, ResponseMutation};
pub use regex_cache::RegexCache;
