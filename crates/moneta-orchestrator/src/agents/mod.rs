//! Worker agents.
//!
//! All five agents share one contract: `process(query, snapshot) → payload`.
//! Agents are pure with respect to the state record — they read the
//! snapshot, talk to collaborators, and return a payload the executor
//! installs. Collaborator failures marked transient are retried here with
//! exponential backoff before the agent gives up.

mod analysis;
mod data;
mod knowledge;
mod news;
mod visualization;

pub use analysis::AnalysisAgent;
pub use data::DataAgent;
pub use knowledge::KnowledgeAgent;
pub use news::NewsAgent;
pub use visualization::VisualizationAgent;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::context::NodeCtx;
use crate::error::{AgentError, CapabilityError};
use crate::types::{AgentName, AgentPayload, StateSnapshot};

/// Appended to every data/analysis reply.
pub(crate) const DISCLAIMER: &str =
    "⚠️ 주의사항: 이 정보는 참고용이며, 투자 결정은 신중히 하시기 바랍니다.";

/// One domain-specific worker.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> AgentName;

    async fn process(
        &self,
        query: &str,
        snapshot: &StateSnapshot,
        ctx: &NodeCtx,
    ) -> Result<AgentPayload, AgentError>;
}

/// Retry budget for transient collaborator failures: the first call plus
/// two retries, backing off 200 ms then 400 ms.
const EXTRA_ATTEMPTS: u32 = 2;
const BASE_BACKOFF_MS: u64 = 200;

/// Run a collaborator call, retrying transient failures. Permanent and
/// not-found failures return immediately.
pub(crate) async fn with_retry<T, F, Fut>(
    operation: &str,
    mut call: F,
) -> Result<T, CapabilityError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CapabilityError>>,
{
    let mut attempt = 0u32;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < EXTRA_ATTEMPTS => {
                attempt += 1;
                let backoff = BASE_BACKOFF_MS * 2u64.pow(attempt - 1);
                tracing::debug!(operation, attempt, backoff_ms = backoff, "retrying");
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Thousands-grouped integer formatting for Korean-style price strings.
pub(crate) fn comma_separated(n: i64) -> String {
    let digits = n.abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        grouped.push('-');
    }
    let offset = digits.len() % 3;
    for (i, ch) in digits.chars().enumerate() {
        if i != 0 && (i + 3 - offset) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}
