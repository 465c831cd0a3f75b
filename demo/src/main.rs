//! Interception engine demo.
//!
//! Attaches to a running browser's first page target, loads a rule
//! configuration (a built-in sample unless `--rules` points at a JSON
//! file), enables interception, and prints the intercept event stream for a
//! while. Start a browser with `--remote-debugging-port=9222` first.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cdp_core::{InterceptService, Service};
use intercept_common::{Config, InterceptEvent, SessionConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// DevTools endpoint of the running browser
    #[arg(long, default_value = "http://127.0.0.1:9222")]
    devtools_url: String,

    /// Path to a rule configuration JSON file
    #[arg(long)]
    rules: Option<String>,

    /// How long to watch the event stream, in seconds
    #[arg(long, default_value_t = 30)]
    duration_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "intercept_demo=info,cdp_core=info,rule_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match &args.rules {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => sample_config(),
    };

    let service = Service::new();
    let session = service
        .start_session(SessionConfig::new(&args.devtools_url))
        .await?;
    println!("session started: {session}");

    let target = service.attach_target(&session, None).await?;
    println!("attached target: {target}");

    service.load_rules(&session, &config).await?;
    println!("loaded config `{}` with {} rule(s)", config.id, config.rules.len());

    let mut events = service.subscribe_events(&session).await?;
    service.enable_interception(&session).await?;
    println!("interception enabled, watching for {}s...", args.duration_secs);

    let deadline = tokio::time::sleep(std::time::Duration::from_secs(args.duration_secs));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = events.recv() => match event {
                Some(event) => print_event(&event),
                None => break,
            },
        }
    }

    let stats = service.get_rule_stats(&session).await?;
    println!(
        "engine stats: total={} matched={} rules-hit={}",
        stats.total,
        stats.matched,
        stats.by_rule.len()
    );

    service.stop_session(&session).await?;
    println!("session stopped");
    Ok(())
}

fn print_event(event: &InterceptEvent) {
    let net = event.network();
    match event {
        InterceptEvent::Matched(_) => {
            let result = net
                .final_result
                .map(|r| format!("{r:?}").to_lowercase())
                .unwrap_or_default();
            let rules: Vec<&str> = net
                .matched_rules
                .iter()
                .map(|m| m.rule_id.as_str())
                .collect();
            println!(
                "[matched:{result}] {} {} rules={rules:?}",
                net.request.method, net.request.url
            );
        }
        InterceptEvent::Unmatched(_) => {
            println!("[unmatched] {} {}", net.request.method, net.request.url);
        }
    }
}

/// A small starter config: tag API requests and block a tracking path.
fn sample_config() -> Config {
    serde_json::from_str(
        r#"{
        "id": "config-20250102-sample",
        "name": "demo rules",
        "version": "1.0",
        "rules": [
            {
                "id": "tag-api",
                "name": "tag api requests",
                "enabled": true,
                "priority": 100,
                "stage": "request",
                "match": {"allOf": [{"type": "urlContains", "value": "/api/"}]},
                "actions": [{"type": "setHeader", "name": "X-Intercepted", "value": "1"}]
            },
            {
                "id": "block-tracking",
                "name": "block tracking pixels",
                "enabled": true,
                "priority": 200,
                "stage": "request",
                "match": {"anyOf": [
                    {"type": "urlContains", "value": "/track"},
                    {"type": "urlContains", "value": "/analytics"}
                ]},
                "actions": [{"type": "block", "statusCode": 204}]
            }
        ]
    }"#,
    )
    .expect("sample config is valid")
}
