//! Line-delimited JSON front end.
//!
//! Each input line is a [`RouteRequest`]; each output line is either a
//! serialized `RoutingDecision` or an [`ErrorLine`]. Blank lines are skipped.
//! Requests are answered in order.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use cascade::router::RouterOrchestrator;
use cascade::types::{CallContext, TenantId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRequest {
    pub tenant_id: String,
    pub utterance: String,
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub turn_index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLine {
    pub error: String,
    /// `bad_request` for unparseable lines, otherwise the routing error kind
    pub kind: String,
}

impl ErrorLine {
    fn new(kind: impl Into<String>, error: impl ToString) -> Self {
        Self {
            error: error.to_string(),
            kind: kind.into(),
        }
    }
}

/// Counters for one `serve` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeStats {
    pub requests: u64,
    pub errors: u64,
}

/// Route one request and render the reply line (without newline).
pub async fn handle_line(router: &RouterOrchestrator, line: &str, seq: u64) -> (String, bool) {
    let request: RouteRequest = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            warn!(seq, error = %e, "Unparseable request line");
            return (render(&ErrorLine::new("bad_request", e)), false);
        }
    };
    let call_id = request
        .call_id
        .unwrap_or_else(|| format!("line-{}", seq));
    let context = CallContext::new(call_id, request.turn_index);
    let tenant = TenantId::from(request.tenant_id.as_str());

    match router.route(&request.utterance, &tenant, context).await {
        Ok(decision) => {
            debug!(seq, tenant = %tenant, summary = %decision.summary(), "Routed");
            (render(&decision), true)
        }
        Err(e) => {
            warn!(seq, tenant = %tenant, kind = %e.kind(), error = %e, "Routing failed");
            (render(&ErrorLine::new(e.kind().to_string(), &e)), false)
        }
    }
}

fn render<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        // Only reachable for non-string map keys, which none of our types have.
        format!(r#"{{"error":"{}","kind":"internal"}}"#, e)
    })
}

/// Read requests from `reader` until EOF, writing one reply line per request.
pub async fn serve<R, W>(
    router: &RouterOrchestrator,
    reader: R,
    mut writer: W,
) -> std::io::Result<ServeStats>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut stats = ServeStats::default();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        stats.requests += 1;
        let (reply, ok) = handle_line(router, line, stats.requests).await;
        if !ok {
            stats.errors += 1;
        }
        writer.write_all(reply.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(stats)
}
