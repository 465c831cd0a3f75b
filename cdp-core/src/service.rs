//! Service layer.
//!
//! Maps external session ids to live sessions and exposes the operations
//! callers drive the engine with: session lifecycle, target attachment,
//! rule loading, stats, and the intercept event subscription.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::info;
use uuid::Uuid;

use intercept_common::{
    Config, EngineStats, InterceptEvent, SessionConfig, SessionId, TargetId, TargetInfo,
};
use rule_engine::RuleEngine;

use crate::discovery;
use crate::error::CdpError;
use crate::manager::SessionManager;
use crate::Result;

/// DevTools validation budget when starting a session.
const START_TIMEOUT: Duration = Duration::from_secs(3);

/// Operations external callers drive the interception engine with.
#[async_trait]
pub trait InterceptService: Send + Sync {
    /// Create a session after validating the DevTools endpoint.
    async fn start_session(&self, config: SessionConfig) -> Result<SessionId>;
    /// Disable interception, detach all targets, close the event stream.
    async fn stop_session(&self, id: &SessionId) -> Result<()>;
    /// Attach a target; `None` selects the first page target.
    async fn attach_target(&self, id: &SessionId, target: Option<TargetId>) -> Result<TargetId>;
    async fn detach_target(&self, id: &SessionId, target: &TargetId) -> Result<()>;
    async fn list_targets(&self, id: &SessionId) -> Result<Vec<TargetInfo>>;
    async fn enable_interception(&self, id: &SessionId) -> Result<()>;
    async fn disable_interception(&self, id: &SessionId) -> Result<()>;
    /// Validate and load a rule configuration into the session's engine.
    async fn load_rules(&self, id: &SessionId, config: &Config) -> Result<()>;
    /// Hit counters; empty defaults when the session is unknown.
    async fn get_rule_stats(&self, id: &SessionId) -> Result<EngineStats>;
    /// Hand out the session's event receiver. One subscriber per session.
    async fn subscribe_events(
        &self,
        id: &SessionId,
    ) -> Result<mpsc::Receiver<InterceptEvent>>;
}

struct SessionHandle {
    manager: SessionManager,
    events_rx: Option<mpsc::Receiver<InterceptEvent>>,
}

/// Default [`InterceptService`] implementation.
#[derive(Default)]
pub struct Service {
    sessions: Mutex<HashMap<SessionId, SessionHandle>>,
}

impl Service {
    pub fn new() -> Self {
        Self::default()
    }

    async fn manager(&self, id: &SessionId) -> Result<SessionManager> {
        self.sessions
            .lock()
            .await
            .get(id)
            .map(|handle| handle.manager.clone())
            .ok_or_else(|| CdpError::SessionNotFound(id.clone()))
    }
}

#[async_trait]
impl InterceptService for Service {
    async fn start_session(&self, config: SessionConfig) -> Result<SessionId> {
        let config = config.normalized();

        // One discovery round-trip proves the endpoint is real before the
        // session exists.
        tokio::time::timeout(START_TIMEOUT, discovery::list_pages(&config.devtools_url))
            .await
            .map_err(|_| CdpError::Timeout("devtools discovery".into()))??;

        let id = SessionId::from(Uuid::new_v4().to_string());
        let (events_tx, events_rx) = mpsc::channel(config.event_capacity as usize);
        let engine = Arc::new(RuleEngine::empty());
        let manager = SessionManager::new(id.clone(), config.clone(), engine, events_tx);

        info!(
            session = %id,
            devtools = %config.devtools_url,
            concurrency = config.concurrency,
            "session started"
        );
        self.sessions.lock().await.insert(
            id.clone(),
            SessionHandle {
                manager,
                events_rx: Some(events_rx),
            },
        );
        Ok(id)
    }

    async fn stop_session(&self, id: &SessionId) -> Result<()> {
        let handle = self
            .sessions
            .lock()
            .await
            .remove(id)
            .ok_or_else(|| CdpError::SessionNotFound(id.clone()))?;
        handle.manager.stop().await;
        info!(session = %id, "session stopped");
        Ok(())
    }

    async fn attach_target(&self, id: &SessionId, target: Option<TargetId>) -> Result<TargetId> {
        self.manager(id).await?.attach_target(target).await
    }

    async fn detach_target(&self, id: &SessionId, target: &TargetId) -> Result<()> {
        self.manager(id).await?.detach_target(target).await
    }

    async fn list_targets(&self, id: &SessionId) -> Result<Vec<TargetInfo>> {
        self.manager(id).await?.list_targets().await
    }

    async fn enable_interception(&self, id: &SessionId) -> Result<()> {
        self.manager(id).await?.enable().await
    }

    async fn disable_interception(&self, id: &SessionId) -> Result<()> {
        self.manager(id).await?.disable().await;
        Ok(())
    }

    async fn load_rules(&self, id: &SessionId, config: &Config) -> Result<()> {
        config.validate()?;
        let manager = self.manager(id).await?;
        manager.update_rules(config);
        info!(session = %id, config = %config.id, rules = config.rules.len(), "rules loaded");
        Ok(())
    }

    async fn get_rule_stats(&self, id: &SessionId) -> Result<EngineStats> {
        match self.sessions.lock().await.get(id) {
            Some(handle) => Ok(handle.manager.stats()),
            None => Ok(EngineStats::default()),
        }
    }

    async fn subscribe_events(
        &self,
        id: &SessionId,
    ) -> Result<mpsc::Receiver<InterceptEvent>> {
        let mut sessions = self.sessions.lock().await;
        let handle = sessions
            .get_mut(id)
            .ok_or_else(|| CdpError::SessionNotFound(id.clone()))?;
        handle.events_rx.take().ok_or(CdpError::AlreadySubscribed)
    }
}
