//! Target session manager.
//!
//! Owns the set of attached browser targets for one session: per-target CDP
//! connections, the consumer tasks reading their `Fetch.requestPaused`
//! streams, and the enable/disable lifecycle of interception. Losing one
//! target's stream removes that target only; nothing else in the session is
//! disturbed, and no automatic reattach happens.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use intercept_common::{
    Config, EngineStats, InterceptEvent, SessionConfig, SessionId, TargetId, TargetInfo,
};
use rule_engine::RuleEngine;

use crate::applier::ActionApplier;
use crate::discovery;
use crate::error::CdpError;
use crate::handler;
use crate::pool::WorkerPool;
use crate::protocol::RequestPausedEvent;
use crate::transport::TargetClient;
use crate::Result;

/// DevTools discovery budget when resolving a target to attach.
const ATTACH_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(3);
/// DevTools discovery budget when enumerating targets.
const LIST_TIMEOUT: Duration = Duration::from_secs(2);

/// State shared between the manager and the per-event pipeline tasks.
pub(crate) struct SessionShared {
    pub(crate) session_id: SessionId,
    pub(crate) config: SessionConfig,
    pub(crate) engine: Arc<RuleEngine>,
    pub(crate) applier: ActionApplier,
    pub(crate) events: mpsc::Sender<InterceptEvent>,
}

struct TargetSession {
    client: Arc<TargetClient>,
    /// Taken by the consumer; `None` while one is running.
    paused_rx: Option<mpsc::UnboundedReceiver<RequestPausedEvent>>,
    consumer: Option<JoinHandle<()>>,
}

impl TargetSession {
    async fn shutdown(self, abort_consumer: bool) {
        if abort_consumer {
            if let Some(handle) = &self.consumer {
                handle.abort();
            }
        }
        self.client.close().await;
    }
}

struct ManagerInner {
    devtools_url: String,
    shared: Arc<SessionShared>,
    targets: Mutex<HashMap<TargetId, TargetSession>>,
    enabled: AtomicBool,
    pool: WorkerPool,
}

/// One session's view of the browser: attach/detach targets, flip
/// interception, and keep the consumer loops alive.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

impl SessionManager {
    /// `config` must already be normalized.
    pub fn new(
        session_id: SessionId,
        config: SessionConfig,
        engine: Arc<RuleEngine>,
        events: mpsc::Sender<InterceptEvent>,
    ) -> Self {
        let pool = WorkerPool::new(config.concurrency);
        let applier = ActionApplier::new(config.body_size_threshold);
        let shared = Arc::new(SessionShared {
            session_id,
            config,
            engine,
            applier,
            events,
        });
        Self {
            inner: Arc::new(ManagerInner {
                devtools_url: shared.config.devtools_url.clone(),
                shared,
                targets: Mutex::new(HashMap::new()),
                enabled: AtomicBool::new(false),
                pool,
            }),
        }
    }

    /// Attach to a target, or to the first `page` target when `target` is
    /// empty. Idempotent for already-attached targets. When interception is
    /// enabled at the session level, the new target is enabled immediately.
    pub async fn attach_target(&self, target: Option<TargetId>) -> Result<TargetId> {
        if let Some(id) = &target {
            if self.inner.targets.lock().await.contains_key(id) {
                return Ok(id.clone());
            }
        }

        let pages = tokio::time::timeout(
            ATTACH_DISCOVERY_TIMEOUT,
            discovery::list_pages(&self.inner.devtools_url),
        )
        .await
        .map_err(|_| CdpError::Timeout("devtools discovery".into()))??;

        let selected = discovery::select_target(&pages, target.as_ref().map(|t| t.as_str()))
            .ok_or(CdpError::NoTarget)?;
        let target_id = TargetId::from(selected.id.as_str());
        let ws_url = selected
            .web_socket_debugger_url
            .clone()
            .ok_or_else(|| CdpError::NoDebuggerUrl(target_id.clone()))?;

        let mut targets = self.inner.targets.lock().await;
        if targets.contains_key(&target_id) {
            return Ok(target_id);
        }

        let (client, paused_rx) = TargetClient::connect(&ws_url).await?;
        let mut session = TargetSession {
            client: Arc::new(client),
            paused_rx: Some(paused_rx),
            consumer: None,
        };
        info!(target = %target_id, "target attached");

        if self.inner.enabled.load(Ordering::SeqCst) {
            session.client.enable_network().await?;
            session.client.enable_fetch().await?;
            spawn_consumer(&self.inner, &target_id, &mut session);
        }
        targets.insert(target_id.clone(), session);
        Ok(target_id)
    }

    /// Detach one target: cancel its consumer and close its connection.
    pub async fn detach_target(&self, target: &TargetId) -> Result<()> {
        let removed = self.inner.targets.lock().await.remove(target);
        if let Some(session) = removed {
            session.shutdown(true).await;
            info!(target = %target, "target detached");
        }
        Ok(())
    }

    /// Detach every target.
    pub async fn detach_all(&self) {
        let mut targets = self.inner.targets.lock().await;
        for (id, session) in targets.drain() {
            session.shutdown(true).await;
            info!(target = %id, "target detached");
        }
    }

    /// Enable interception on every attached target and start the pool.
    pub async fn enable(&self) -> Result<()> {
        self.inner.enabled.store(true, Ordering::SeqCst);
        self.inner.pool.start();

        let mut targets = self.inner.targets.lock().await;
        for (id, session) in targets.iter_mut() {
            session.client.enable_network().await?;
            session.client.enable_fetch().await?;
            spawn_consumer(&self.inner, id, session);
        }
        info!(targets = targets.len(), "interception enabled");
        Ok(())
    }

    /// Disable interception. Connections stay open; consumers exit quietly
    /// if their streams terminate.
    pub async fn disable(&self) {
        self.inner.enabled.store(false, Ordering::SeqCst);
        let targets = self.inner.targets.lock().await;
        for (id, session) in targets.iter() {
            if let Err(err) = session.client.disable_fetch().await {
                warn!(%err, target = %id, "fetch disable failed");
            }
        }
        info!("interception disabled");
    }

    /// Enumerate the browser's current `page` targets, marking the ones
    /// this session is attached to.
    pub async fn list_targets(&self) -> Result<Vec<TargetInfo>> {
        let pages = tokio::time::timeout(
            LIST_TIMEOUT,
            discovery::list_pages(&self.inner.devtools_url),
        )
        .await
        .map_err(|_| CdpError::Timeout("devtools discovery".into()))??;

        let targets = self.inner.targets.lock().await;
        Ok(pages
            .into_iter()
            .filter(|p| p.target_type == "page")
            .map(|p| {
                let id = TargetId::from(p.id.as_str());
                let is_current = targets.contains_key(&id);
                TargetInfo {
                    id,
                    target_type: p.target_type,
                    url: p.url,
                    title: p.title,
                    is_current,
                }
            })
            .collect())
    }

    /// Swap the engine's rule set.
    pub fn update_rules(&self, config: &Config) {
        self.inner.shared.engine.update(config);
    }

    /// Engine hit counters.
    pub fn stats(&self) -> EngineStats {
        self.inner.shared.engine.stats()
    }

    /// Worker pool counters.
    pub fn pool_stats(&self) -> crate::pool::PoolStats {
        self.inner.pool.stats()
    }

    /// Full shutdown: disable, detach everything, stop the pool.
    pub async fn stop(&self) {
        self.disable().await;
        self.detach_all().await;
        self.inner.pool.stop();
    }
}

/// Start the per-target consumer unless one is already running.
fn spawn_consumer(inner: &Arc<ManagerInner>, target: &TargetId, session: &mut TargetSession) {
    let Some(paused_rx) = session.paused_rx.take() else {
        return;
    };
    let handle = tokio::spawn(consume(
        inner.clone(),
        target.clone(),
        session.client.clone(),
        paused_rx,
    ));
    session.consumer = Some(handle);
}

/// Read the paused-event stream and hand each event to the pool. When the
/// stream dies while the session is enabled, remove this target (and only
/// this target); the caller decides whether to reattach.
async fn consume(
    inner: Arc<ManagerInner>,
    target: TargetId,
    client: Arc<TargetClient>,
    mut paused_rx: mpsc::UnboundedReceiver<RequestPausedEvent>,
) {
    info!(target = %target, "consuming paused events");

    while let Some(ev) = paused_rx.recv().await {
        let submitted = inner.pool.submit(handler::handle_paused_event(
            inner.shared.clone(),
            target.clone(),
            client.clone(),
            ev.clone(),
        ));
        if !submitted {
            handler::degrade_and_continue(&inner.shared, &target, &client, &ev, "worker queue full")
                .await;
        }
    }

    if !inner.enabled.load(Ordering::SeqCst) {
        info!(target = %target, "interception disabled, consumer exiting");
        return;
    }

    warn!(target = %target, "paused event stream lost, removing target");
    let mut targets = inner.targets.lock().await;
    let same_session = targets
        .get(&target)
        .is_some_and(|ts| Arc::ptr_eq(&ts.client, &client));
    if same_session {
        if let Some(session) = targets.remove(&target) {
            // This task *is* the consumer; only the connection needs closing.
            session.shutdown(false).await;
        }
    }
}
