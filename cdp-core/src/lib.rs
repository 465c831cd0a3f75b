//! CDP Core
//!
//! The operational heart of the interception engine: raw DevTools protocol
//! transport over per-target WebSockets, the Fetch-domain interception
//! surface, the bounded worker pool, the target session manager, and the
//! service layer external callers talk to.
//!
//! The pipeline is deliberately lossy under pressure: a full worker queue or
//! a blown processing budget degrades to passing traffic through untouched.
//! The browser is never stalled to preserve an interception opportunity.

pub mod applier;
pub mod discovery;
pub mod error;
mod fetch;
mod handler;
pub mod manager;
pub mod pool;
pub mod protocol;
pub mod service;
pub mod transport;

pub use applier::ActionApplier;
pub use error::CdpError;
pub use manager::SessionManager;
pub use pool::{PoolStats, WorkerPool};
pub use service::{InterceptService, Service};
pub use transport::TargetClient;

/// Result type alias for CDP operations.
pub type Result<T> = std::result::Result<T, CdpError>;
