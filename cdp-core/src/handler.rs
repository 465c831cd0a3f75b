//! Per-event processing pipeline.
//!
//! Each paused event runs under the session's processing budget and ends in
//! exactly one Fetch-domain resolution call plus at most one intercept
//! event. Every failure path degrades to passing the original traffic
//! through: the browser never waits on a broken pipeline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use intercept_common::{
    Action, FinalResult, NetworkEvent, RequestSnapshot, ResponseSnapshot, Rule,
    RuleMatchSummary, Stage, TargetId,
};
use rule_engine::{run_request_actions, run_response_actions, EvalContext, RequestMutation};

use crate::manager::SessionShared;
use crate::protocol::RequestPausedEvent;
use crate::transport::TargetClient;

/// Budget for the degraded continue when the queue overflows.
const DEGRADE_TIMEOUT: Duration = Duration::from_secs(1);

/// Entry point for pooled tasks: process one event under the session's
/// timeout, degrading to pass-through when the budget is exhausted.
pub(crate) async fn handle_paused_event(
    shared: Arc<SessionShared>,
    target: TargetId,
    client: Arc<TargetClient>,
    ev: RequestPausedEvent,
) {
    let budget = Duration::from_millis(shared.config.process_timeout_ms as u64);
    if tokio::time::timeout(budget, process(&shared, &target, &client, &ev))
        .await
        .is_err()
    {
        warn!(
            target = %target,
            url = %ev.request.url,
            "processing budget exhausted"
        );
        degrade_and_continue(&shared, &target, &client, &ev, "processing budget exhausted").await;
    }
}

async fn process(
    shared: &SessionShared,
    target: &TargetId,
    client: &TargetClient,
    ev: &RequestPausedEvent,
) {
    let stage = ev.stage();
    let started = Instant::now();
    debug!(stage = %stage, url = %ev.request.url, method = %ev.request.method, "paused event");

    let body_text = ev.request.body_text();
    let ctx = EvalContext::from_request(
        &ev.request.url,
        &ev.request.method,
        &ev.resource_type,
        &ev.request.headers,
        body_text.clone(),
    );

    let matched = shared.engine.eval_for_stage(&ctx, stage);
    if matched.is_empty() {
        emit_unmatched(shared, target, ev, stage);
        continue_untouched(client, ev, stage).await;
        debug!(stage = %stage, elapsed = ?started.elapsed(), "no matching rules");
        return;
    }

    let request = request_snapshot(ev, body_text);
    match stage {
        Stage::Request => {
            run_request_stage(shared, target, client, ev, &ctx, &matched, request).await
        }
        Stage::Response => {
            run_response_stage(shared, target, client, ev, &matched, request).await
        }
    }
    debug!(stage = %stage, elapsed = ?started.elapsed(), "paused event resolved");
}

async fn run_request_stage(
    shared: &SessionShared,
    target: &TargetId,
    client: &TargetClient,
    ev: &RequestPausedEvent,
    ctx: &EvalContext,
    matched: &[Arc<Rule>],
    request: RequestSnapshot,
) {
    let mut aggregated = RequestMutation::default();
    let mut summaries = Vec::with_capacity(matched.len());

    for rule in matched {
        let (mutation, executed) = run_request_actions(&rule.actions, &ctx.body, &ctx.content_type);
        summaries.push(summary(rule, executed));

        if mutation.block.is_some() {
            if let Err(err) = shared
                .applier
                .apply_request_mutation(client, ev, &mutation)
                .await
            {
                warn!(%err, rule = %rule.id, "block fulfill failed");
            }
            info!(rule = %rule.id, url = %ev.request.url, "request blocked");
            emit_matched(shared, target, FinalResult::Blocked, summaries, request, None);
            return;
        }
        aggregated.merge_from(mutation);
    }

    if aggregated.has_changes() {
        if let Err(err) = shared
            .applier
            .apply_request_mutation(client, ev, &aggregated)
            .await
        {
            warn!(%err, "continue with mutation failed");
        }
        let modified = modified_request_snapshot(request, &aggregated);
        emit_matched(shared, target, FinalResult::Modified, summaries, modified, None);
    } else {
        if let Err(err) = client
            .continue_request(&ev.request_id, None, None, None, None)
            .await
        {
            warn!(%err, "continue request failed");
        }
        emit_matched(shared, target, FinalResult::Passed, summaries, request, None);
    }
}

async fn run_response_stage(
    shared: &SessionShared,
    target: &TargetId,
    client: &TargetClient,
    ev: &RequestPausedEvent,
    matched: &[Arc<Rule>],
    request: RequestSnapshot,
) {
    let original_body = if wants_response_body(matched) {
        shared
            .applier
            .fetch_response_body(client, ev)
            .await
            .unwrap_or_default()
    } else {
        String::new()
    };
    let response = response_snapshot(ev, original_body.clone());

    let mut current_body = original_body;
    let mut aggregated = rule_engine::ResponseMutation::default();
    let mut summaries = Vec::with_capacity(matched.len());

    for rule in matched {
        let (mutation, executed) = run_response_actions(&rule.actions, &current_body);
        summaries.push(summary(rule, executed));
        // Later rules see the body produced so far.
        if let Some(body) = &mutation.body {
            current_body = body.clone();
        }
        aggregated.merge_from(mutation);
    }

    if aggregated.has_changes() {
        if let Err(err) = shared
            .applier
            .apply_response_mutation(client, ev, &aggregated)
            .await
        {
            warn!(%err, "apply response mutation failed");
        }
        let modified = modified_response_snapshot(response, &aggregated, current_body);
        emit_matched(
            shared,
            target,
            FinalResult::Modified,
            summaries,
            request,
            Some(modified),
        );
    } else {
        if let Err(err) = client.continue_response(&ev.request_id, None, None).await {
            warn!(%err, "continue response failed");
        }
        emit_matched(
            shared,
            target,
            FinalResult::Passed,
            summaries,
            request,
            Some(response),
        );
    }
}

/// Queue overflow / budget exhaustion path: pass the event through within a
/// short budget and record it as unmatched.
pub(crate) async fn degrade_and_continue(
    shared: &SessionShared,
    target: &TargetId,
    client: &TargetClient,
    ev: &RequestPausedEvent,
    reason: &str,
) {
    warn!(target = %target, request_id = %ev.request_id, reason, "degrading to pass-through");
    let stage = ev.stage();
    let _ = tokio::time::timeout(DEGRADE_TIMEOUT, continue_untouched(client, ev, stage)).await;
    emit_unmatched(shared, target, ev, stage);
}

async fn continue_untouched(client: &TargetClient, ev: &RequestPausedEvent, stage: Stage) {
    let result = match stage {
        Stage::Request => {
            client
                .continue_request(&ev.request_id, None, None, None, None)
                .await
        }
        Stage::Response => client.continue_response(&ev.request_id, None, None).await,
    };
    if let Err(err) = result {
        warn!(%err, request_id = %ev.request_id, "pass-through continue failed");
    }
}

/// Response-stage rules need the body only when one of them rewrites it.
fn wants_response_body(matched: &[Arc<Rule>]) -> bool {
    matched.iter().flat_map(|r| r.actions.iter()).any(|a| {
        matches!(
            a,
            Action::SetBody { .. } | Action::ReplaceBodyText { .. } | Action::PatchBodyJson { .. }
        )
    })
}

fn summary(rule: &Rule, executed: Vec<&'static str>) -> RuleMatchSummary {
    RuleMatchSummary {
        rule_id: rule.id.clone(),
        rule_name: rule.name.clone(),
        actions: executed.into_iter().map(String::from).collect(),
    }
}

fn request_snapshot(ev: &RequestPausedEvent, body: String) -> RequestSnapshot {
    let headers: HashMap<String, String> =
        rule_engine::context::headers_as_pairs(&ev.request.headers)
            .into_iter()
            .collect();
    RequestSnapshot {
        url: ev.request.url.clone(),
        method: ev.request.method.clone(),
        headers,
        body,
        resource_type: ev.resource_type.clone(),
    }
}

fn response_snapshot(ev: &RequestPausedEvent, body: String) -> ResponseSnapshot {
    ResponseSnapshot {
        status_code: ev.response_status_code.unwrap_or(0),
        headers: ev
            .response_headers
            .iter()
            .map(|h| (h.name.clone(), h.value.clone()))
            .collect(),
        body,
    }
}

fn modified_request_snapshot(
    mut snapshot: RequestSnapshot,
    mutation: &RequestMutation,
) -> RequestSnapshot {
    if let Some(url) = &mutation.url {
        snapshot.url = url.clone();
    }
    if let Some(method) = &mutation.method {
        snapshot.method = method.clone();
    }
    for name in &mutation.remove_headers {
        snapshot
            .headers
            .retain(|k, _| !k.eq_ignore_ascii_case(name));
    }
    for (name, value) in &mutation.headers {
        snapshot.headers.insert(name.clone(), value.clone());
    }
    if let Some(body) = &mutation.body {
        snapshot.body = body.clone();
    }
    snapshot
}

fn modified_response_snapshot(
    mut snapshot: ResponseSnapshot,
    mutation: &rule_engine::ResponseMutation,
    final_body: String,
) -> ResponseSnapshot {
    if let Some(code) = mutation.status_code {
        snapshot.status_code = code;
    }
    for name in &mutation.remove_headers {
        snapshot
            .headers
            .retain(|k, _| !k.eq_ignore_ascii_case(name));
    }
    for (name, value) in &mutation.headers {
        snapshot.headers.insert(name.clone(), value.clone());
    }
    snapshot.body = final_body;
    snapshot
}

fn emit_matched(
    shared: &SessionShared,
    target: &TargetId,
    final_result: FinalResult,
    matched_rules: Vec<RuleMatchSummary>,
    request: RequestSnapshot,
    response: Option<ResponseSnapshot>,
) {
    publish(
        shared,
        NetworkEvent {
            session: shared.session_id.clone(),
            target: target.clone(),
            timestamp: Utc::now().timestamp_millis(),
            is_matched: true,
            request,
            response,
            final_result: Some(final_result),
            matched_rules,
        },
    );
}

pub(crate) fn emit_unmatched(
    shared: &SessionShared,
    target: &TargetId,
    ev: &RequestPausedEvent,
    stage: Stage,
) {
    let response = (stage == Stage::Response).then(|| response_snapshot(ev, String::new()));
    publish(
        shared,
        NetworkEvent {
            session: shared.session_id.clone(),
            target: target.clone(),
            timestamp: Utc::now().timestamp_millis(),
            is_matched: false,
            request: request_snapshot(ev, ev.request.body_text()),
            response,
            final_result: None,
            matched_rules: Vec::new(),
        },
    );
}

/// Non-blocking publish; a full channel drops the event rather than stall
/// the pipeline.
fn publish(shared: &SessionShared, event: NetworkEvent) {
    if shared.events.try_send(event.into()).is_err() {
        debug!("event channel full, dropping intercept event");
    }
}
