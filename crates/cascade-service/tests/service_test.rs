//! Service wiring: TOML on disk through to JSONL decisions.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use cascade::escalation::{GenerativeProvider, ProviderRequest, ProviderResponse, ProviderResult};
use cascade::events::{ReasonCode, RecordingNotifier};
use cascade::types::{CallContext, TenantId};
use cascade_service::jsonl::{self, ErrorLine};
use cascade_service::{build_router_with, build_router_with_sink, ServiceConfig};

const CONFIG: &str = r#"
[provider]
url = "http://127.0.0.1:1/route"

[[tenants]]
tenant_id = "acme"
monthly_budget = "5"
fallback_response = "Let me get someone for you."

[[tenants.scenarios]]
id = "hold"
trigger_phrases = ["hold"]
quick_reply = "Sure, take your time."
priority = 10

[[tenants.scenarios]]
id = "hours"
trigger_phrases = ["opening hours"]
quick_reply = "We open at nine."

[[tenants]]
tenant_id = "quiet"
escalation_enabled = false

[[tenants.scenarios]]
id = "hold"
trigger_phrases = ["hold"]
quick_reply = "One moment."
"#;

#[derive(Default)]
struct CountingProvider {
    calls: AtomicUsize,
}

#[async_trait]
impl GenerativeProvider for CountingProvider {
    fn name(&self) -> &str {
        "counting"
    }

    async fn complete(&self, _request: ProviderRequest) -> ProviderResult<ProviderResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ProviderResponse::default())
    }
}

fn write_config() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CONFIG.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_from_disk() {
    let file = write_config();
    let config = ServiceConfig::load(file.path()).unwrap();
    assert_eq!(config.routing.tenants.len(), 2);
    assert!(!config.routing.tenants[1].config.escalation_enabled);
}

#[test]
fn test_missing_file_is_a_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ServiceConfig::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(err.to_string().contains("absent.toml"));
}

#[tokio::test]
async fn test_jsonl_round_trip() {
    let file = write_config();
    let config = ServiceConfig::load(file.path()).unwrap();
    let provider = Arc::new(CountingProvider::default());
    let router = build_router_with(&config, provider.clone()).await.unwrap();

    let input = concat!(
        r#"{"tenant_id":"acme","utterance":"hold please","call_id":"c1"}"#,
        "\n\n",
        r#"{"tenant_id":"acme","utterance":"can you spell my surname","call_id":"c2","turn_index":3}"#,
        "\n",
        r#"{"tenant_id":"nobody","utterance":"hold"}"#,
        "\n",
        "not json\n",
        r#"{"tenant_id":"quiet","utterance":"where do I park"}"#,
        "\n",
    );
    let mut out = Vec::new();
    let stats = jsonl::serve(&router, input.as_bytes(), &mut out).await.unwrap();
    assert_eq!(stats.requests, 5);
    assert_eq!(stats.errors, 2);

    let lines: Vec<serde_json::Value> = String::from_utf8(out)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 5);

    assert_eq!(lines[0]["call_id"], "c1");
    assert_eq!(lines[0]["scenario_id"], "hold");
    assert_eq!(lines[0]["response_text"], "Sure, take your time.");

    assert_eq!(lines[1]["call_id"], "c2");
    assert_eq!(lines[1]["turn_index"], 3);
    assert_eq!(lines[1]["matched"], false);
    assert_eq!(lines[1]["response_text"], "Let me get someone for you.");

    let unknown: ErrorLine = serde_json::from_value(lines[2].clone()).unwrap();
    assert_eq!(unknown.kind, "unknown_tenant");
    let bad: ErrorLine = serde_json::from_value(lines[3].clone()).unwrap();
    assert_eq!(bad.kind, "bad_request");

    assert_eq!(lines[4]["matched"], false);

    // Only the acme miss reached the provider; the quiet tenant has escalation off.
    router.flush_learning().await.unwrap();
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
}

const BROKE_CONFIG: &str = r#"
[[tenants]]
tenant_id = "broke"
monthly_budget = "0"

[[tenants.scenarios]]
id = "hold"
trigger_phrases = ["hold"]
quick_reply = "One moment."

[[tenants]]
tenant_id = "quiet"
escalation_enabled = false

[[tenants.scenarios]]
id = "hold"
trigger_phrases = ["hold"]
quick_reply = "One moment."
"#;

#[tokio::test]
async fn test_only_warning_notifications_are_forwarded() {
    let config = ServiceConfig::from_toml(BROKE_CONFIG).unwrap();
    let provider = Arc::new(CountingProvider::default());
    let sink = RecordingNotifier::new().shared();
    let router = build_router_with_sink(&config, provider.clone(), sink.clone())
        .await
        .unwrap();

    // Info-level no_match first, then a critical budget_exhausted.
    router
        .route("where do I park", &TenantId::from("quiet"), CallContext::new("q1", 0))
        .await
        .unwrap();
    router
        .route("where do I park", &TenantId::from("broke"), CallContext::new("b1", 0))
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        while !sink
            .notifications()
            .iter()
            .any(|n| n.reason == ReasonCode::BudgetExhausted)
        {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let seen = sink.notifications();
    assert!(seen.iter().all(|n| n.reason != ReasonCode::NoMatch));
    assert_eq!(seen[0].call_id.as_deref(), Some("b1"));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
}
