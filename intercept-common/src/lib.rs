//! Common Types for the Interception Engine
//!
//! This crate defines the data model shared across the workspace:
//! session/target identifiers and configuration, the intercept event stream
//! emitted to subscribers, and the declarative rule specification (the JSON
//! `Config` document with its conditions and actions).

pub mod event;
pub mod model;
pub mod rules;

pub use event::{
    FinalResult, InterceptEvent, NetworkEvent, RequestSnapshot, ResponseSnapshot,
    RuleMatchSummary,
};
pub use model::{EngineStats, RuleId, SessionConfig, SessionId, TargetId, TargetInfo};
pub use rules::{
    Action, BodyEncoding, Condition, Config, ConfigError, JsonPatchOp, Match, PatchOp, Rule,
    Stage,
};
