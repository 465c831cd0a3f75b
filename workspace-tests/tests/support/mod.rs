//! Mock DevTools endpoint for end-to-end tests.
//!
//! Serves `GET /json` discovery plus one WebSocket per page at
//! `/devtools/page/{id}`. Every CDP command is recorded and answered with
//! an empty result (`Fetch.getResponseBody` answers with a configurable
//! body). Tests inject `Fetch.requestPaused` events and can sever a page's
//! socket to simulate stream death. Per-method reply delays simulate slow
//! browsers without blocking the socket loop.

// Each test binary uses a subset of the harness.
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};
use tokio::sync::mpsc;

enum WsCommand {
    Send(String),
    Close,
}

#[derive(Default)]
struct MockState {
    ws_base: Mutex<String>,
    pages: Vec<String>,
    calls: Mutex<Vec<Value>>,
    bodies: Mutex<HashMap<String, (String, bool)>>,
    delays: Mutex<HashMap<String, Duration>>,
    conns: Mutex<HashMap<String, mpsc::UnboundedSender<WsCommand>>>,
}

/// A running mock DevTools server.
pub struct MockDevTools {
    state: Arc<MockState>,
    addr: SocketAddr,
}

impl MockDevTools {
    /// Bind on an ephemeral port and expose the given page ids.
    pub async fn start(pages: &[&str]) -> Self {
        let state = Arc::new(MockState {
            pages: pages.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        });

        let app = Router::new()
            .route("/json", get(list_pages))
            .route("/devtools/page/{id}", get(page_socket))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock devtools");
        let addr = listener.local_addr().expect("mock devtools addr");
        *state.ws_base.lock().unwrap() = format!("ws://{addr}");

        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { state, addr }
    }

    /// HTTP endpoint to hand to `SessionConfig::new`.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Debugger WebSocket URL of one page, for direct transport tests.
    pub fn page_ws_url(&self, page: &str) -> String {
        format!("ws://{}/devtools/page/{page}", self.addr)
    }

    /// Inject a request-stage `Fetch.requestPaused` event on a page.
    pub fn send_request_paused(
        &self,
        page: &str,
        request_id: &str,
        url: &str,
        method: &str,
        headers: Value,
        post_data: Option<&str>,
    ) {
        let mut request = json!({"url": url, "method": method, "headers": headers});
        if let Some(body) = post_data {
            request["postData"] = json!(body);
        }
        self.send_event(
            page,
            json!({
                "requestId": request_id,
                "request": request,
                "resourceType": "XHR",
            }),
        );
    }

    /// Inject a response-stage `Fetch.requestPaused` event on a page.
    pub fn send_response_paused(
        &self,
        page: &str,
        request_id: &str,
        url: &str,
        status: u16,
        response_headers: &[(&str, &str)],
    ) {
        let headers: Vec<Value> = response_headers
            .iter()
            .map(|(name, value)| json!({"name": name, "value": value}))
            .collect();
        self.send_event(
            page,
            json!({
                "requestId": request_id,
                "request": {"url": url, "method": "GET", "headers": {}},
                "resourceType": "XHR",
                "responseStatusCode": status,
                "responseHeaders": headers,
            }),
        );
    }

    fn send_event(&self, page: &str, params: Value) {
        let frame = json!({"method": "Fetch.requestPaused", "params": params}).to_string();
        if let Some(tx) = self.state.conns.lock().unwrap().get(page) {
            let _ = tx.send(WsCommand::Send(frame));
        }
    }

    /// Sever a page's WebSocket, as a crashed tab would.
    pub fn close_page_socket(&self, page: &str) {
        if let Some(tx) = self.state.conns.lock().unwrap().get(page) {
            let _ = tx.send(WsCommand::Close);
        }
    }

    /// Configure the reply to `Fetch.getResponseBody` for one request id.
    pub fn set_response_body(&self, request_id: &str, body: &str, base64_encoded: bool) {
        self.state
            .bodies
            .lock()
            .unwrap()
            .insert(request_id.to_string(), (body.to_string(), base64_encoded));
    }

    /// Delay replies to one method; the delay runs off the socket loop so
    /// other traffic keeps flowing.
    pub fn set_reply_delay(&self, method: &str, delay: Duration) {
        self.state
            .delays
            .lock()
            .unwrap()
            .insert(method.to_string(), delay);
    }

    /// Params of every recorded call to `method`, in arrival order.
    pub fn calls_for(&self, method: &str) -> Vec<Value> {
        self.state
            .calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c["method"] == method)
            .map(|c| c["params"].clone())
            .collect()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls_for(method).len()
    }

    /// Wait until `method` has been called at least `count` times.
    pub async fn wait_for_calls(&self, method: &str, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.call_count(method) >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

async fn list_pages(State(state): State<Arc<MockState>>) -> impl IntoResponse {
    let ws_base = state.ws_base.lock().unwrap().clone();
    let pages: Vec<Value> = state
        .pages
        .iter()
        .map(|id| {
            json!({
                "id": id,
                "type": "page",
                "title": format!("page {id}"),
                "url": "https://example.com",
                "webSocketDebuggerUrl": format!("{ws_base}/devtools/page/{id}"),
            })
        })
        .collect();
    axum::Json(pages)
}

async fn page_socket(
    ws: WebSocketUpgrade,
    Path(id): Path<String>,
    State(state): State<Arc<MockState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_page_socket(socket, id, state))
}

async fn run_page_socket(mut socket: WebSocket, page: String, state: Arc<MockState>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<WsCommand>();
    state.conns.lock().unwrap().insert(page.clone(), tx.clone());

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                let Some(Ok(message)) = incoming else { break };
                let Message::Text(text) = message else { continue };
                let Ok(command) = serde_json::from_str::<Value>(&text) else { continue };

                let method = command["method"].as_str().unwrap_or_default().to_string();
                let id = command["id"].as_u64();
                state.calls.lock().unwrap().push(command.clone());

                let Some(id) = id else { continue };
                let result = build_result(&state, &method, &command);
                let delay = state.delays.lock().unwrap().get(&method).copied();
                let reply = json!({"id": id, "result": result}).to_string();
                match delay {
                    // Delayed replies go through the outbound channel so the
                    // socket loop stays responsive.
                    Some(delay) => {
                        let tx = tx.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            let _ = tx.send(WsCommand::Send(reply));
                        });
                    }
                    None => {
                        if socket.send(Message::Text(reply.into())).await.is_err() {
                            break;
                        }
                    }
                }
            }
            outbound = rx.recv() => match outbound {
                Some(WsCommand::Send(frame)) => {
                    if socket.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Some(WsCommand::Close) | None => {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    }

    state.conns.lock().unwrap().remove(&page);
}

fn build_result(state: &MockState, method: &str, command: &Value) -> Value {
    if method == "Fetch.getResponseBody" {
        let request_id = command["params"]["requestId"].as_str().unwrap_or_default();
        let bodies = state.bodies.lock().unwrap();
        return match bodies.get(request_id) {
            Some((body, base64_encoded)) => {
                json!({"body": body, "base64Encoded": base64_encoded})
            }
            None => json!({"body": "", "base64Encoded": false}),
        };
    }
    json!({})
}
