//! The per-request state record carried through the graph.
//!
//! The record is single-owner: exactly one node mutates it at a time, and
//! nodes only add fields keyed by their role. `agent_results` is
//! insert-once per agent, and `trace` is append-only with the runtime as
//! the single writer.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorKind;

use super::agent::{
    AgentName, AgentPayload, AgentResult, AnalysisReport, ChartArtifact, FinancialData,
    KnowledgeContext, NewsDigest,
};
use super::analysis::QueryAnalysis;
use super::plan::ExecutionPlan;
use super::response::{ChatRequest, ChatResponse, Grade};

// ---------------------------------------------------------------------------
// Sub-records
// ---------------------------------------------------------------------------

/// Set by the data agent when a cheap, confident answer already exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortCircuit {
    pub active: bool,
    pub reply: String,
}

/// The fused reply produced by the result combiner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedReply {
    pub text: String,
    /// Agents whose payloads contributed, in presentation order.
    pub sources: Vec<AgentName>,
    /// True when the deterministic template was used instead of the LM.
    pub degraded: bool,
}

/// Per-rubric sub-scores, each in `0..=25`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SubScores {
    pub completeness: u32,
    pub consistency: u32,
    pub accuracy: u32,
    pub usefulness: u32,
}

impl SubScores {
    pub fn total(&self) -> u32 {
        self.completeness + self.consistency + self.accuracy + self.usefulness
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceReport {
    /// Normalized score in `[0, 1]`.
    pub score: f64,
    pub grade: Grade,
    pub subscores: SubScores,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// A recorded failure. `recoverable = false` forces the error path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub node: String,
    pub message: String,
    pub recoverable: bool,
}

/// One entry per executed node, appended by the runtime only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub node: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub outcome: TraceOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceOutcome {
    Ok,
    Error,
}

// ---------------------------------------------------------------------------
// State record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateRecord {
    pub request_id: Uuid,
    pub query: String,
    pub session_id: String,
    pub user_id: String,
    pub analysis: Option<QueryAnalysis>,
    pub plan: Option<ExecutionPlan>,
    /// Uniform result envelope per dispatched agent. Insert-once.
    pub agent_results: BTreeMap<AgentName, AgentResult>,
    pub financial_data: Option<FinancialData>,
    pub news_data: Option<NewsDigest>,
    pub analysis_result: Option<AnalysisReport>,
    pub knowledge_context: Option<KnowledgeContext>,
    pub chart: Option<ChartArtifact>,
    pub simple_short_circuit: Option<ShortCircuit>,
    pub combined: Option<CombinedReply>,
    pub confidence_report: Option<ConfidenceReport>,
    pub error: Option<ErrorInfo>,
    pub trace: Vec<TraceEntry>,
    /// Final packed response, written by the responder.
    pub response: Option<ChatResponse>,
}

impl StateRecord {
    pub fn new(request: &ChatRequest) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            query: request.query.clone(),
            session_id: request.session_id.clone(),
            user_id: request.user_id.clone(),
            analysis: None,
            plan: None,
            agent_results: BTreeMap::new(),
            financial_data: None,
            news_data: None,
            analysis_result: None,
            knowledge_context: None,
            chart: None,
            simple_short_circuit: None,
            combined: None,
            confidence_report: None,
            error: None,
            trace: Vec::new(),
            response: None,
        }
    }

    /// Install an agent result and mirror its typed payload into the shared
    /// fields. A second result for the same agent is dropped — once a key
    /// exists it is never overwritten.
    pub fn record_agent_result(&mut self, result: AgentResult) {
        if self.agent_results.contains_key(&result.agent) {
            return;
        }
        if let Some(payload) = &result.payload {
            match payload {
                AgentPayload::Data(out) => {
                    self.financial_data = Some(out.data.clone());
                    if let Some(reply) = &out.simple_reply {
                        self.simple_short_circuit = Some(ShortCircuit {
                            active: true,
                            reply: reply.clone(),
                        });
                    }
                }
                AgentPayload::Analysis(report) => {
                    self.analysis_result = Some(report.clone());
                }
                AgentPayload::News(digest) => {
                    self.news_data = Some(digest.clone());
                }
                AgentPayload::Knowledge(ctx) => {
                    self.knowledge_context = Some(ctx.clone());
                }
                AgentPayload::Visualization(chart) => {
                    self.chart = Some(chart.clone());
                }
            }
        }
        self.agent_results.insert(result.agent, result);
    }

    /// Record a failure. The first failure wins; later ones are kept out so
    /// the error path reports the root cause.
    pub fn record_error(
        &mut self,
        kind: ErrorKind,
        node: &str,
        message: impl Into<String>,
        recoverable: bool,
    ) {
        if self.error.is_some() {
            return;
        }
        self.error = Some(ErrorInfo {
            kind,
            node: node.to_string(),
            message: message.into(),
            recoverable,
        });
    }

    pub fn has_fatal_error(&self) -> bool {
        self.error.as_ref().is_some_and(|e| !e.recoverable)
    }

    pub fn short_circuit_active(&self) -> bool {
        self.simple_short_circuit
            .as_ref()
            .is_some_and(|s| s.active)
    }

    /// Read-only view handed to agents so they stay pure with respect to
    /// the record; the executor installs whatever they return.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            query: self.query.clone(),
            analysis: self.analysis.clone(),
            financial_data: self.financial_data.clone(),
            news_data: self.news_data.clone(),
            knowledge_context: self.knowledge_context.clone(),
            completed_agents: self.agent_results.keys().copied().collect(),
        }
    }
}

/// Immutable per-stage view of the state record.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    pub query: String,
    pub analysis: Option<QueryAnalysis>,
    pub financial_data: Option<FinancialData>,
    pub news_data: Option<NewsDigest>,
    pub knowledge_context: Option<KnowledgeContext>,
    /// Agents whose results were already installed (stages 1..N-1).
    pub completed_agents: Vec<AgentName>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;
    use crate::types::agent::{DataOutput, NewsItem, NewsOrigin};

    fn request() -> ChatRequest {
        ChatRequest::new("삼성전자 주가 알려줘", "sess-1", "user-1")
    }

    fn sample_data_output(simple_reply: Option<String>) -> AgentPayload {
        AgentPayload::Data(DataOutput {
            data: FinancialData {
                symbol: "005930.KS".into(),
                company_name: "삼성전자".into(),
                price: 71_500.0,
                change_pct: 2.1,
                volume: 12_345_678,
                per: Some(13.2),
                pbr: None,
                roe: None,
                market_cap: None,
                sector: Some("Technology".into()),
                history: vec![],
            },
            simple_reply,
        })
    }

    #[test]
    fn agent_results_are_insert_once() {
        let mut state = StateRecord::new(&request());
        state.record_agent_result(AgentResult::success(
            AgentName::Data,
            sample_data_output(None),
            10,
        ));
        state.record_agent_result(AgentResult::failure(
            AgentName::Data,
            AgentError::new(ErrorKind::Timeout, "late duplicate"),
            99,
        ));

        let kept = &state.agent_results[&AgentName::Data];
        assert!(kept.success, "first result must win");
        assert_eq!(kept.elapsed_ms, 10);
    }

    #[test]
    fn payload_mirrors_into_shared_fields() {
        let mut state = StateRecord::new(&request());
        state.record_agent_result(AgentResult::success(
            AgentName::Data,
            sample_data_output(Some("삼성전자 현재가 71,500원".into())),
            10,
        ));
        assert_eq!(
            state.financial_data.as_ref().unwrap().symbol,
            "005930.KS"
        );
        assert!(state.short_circuit_active());

        state.record_agent_result(AgentResult::success(
            AgentName::News,
            AgentPayload::News(NewsDigest {
                items: vec![NewsItem {
                    title: "삼성전자 실적 발표".into(),
                    url: "https://news.example.com/1".into(),
                    summary: String::new(),
                    origin: NewsOrigin::LiveFeed,
                    published_at: None,
                    relevance: 0.9,
                    score: 0.9,
                }],
            }),
            20,
        ));
        assert_eq!(state.news_data.as_ref().unwrap().items.len(), 1);
    }

    #[test]
    fn first_error_wins() {
        let mut state = StateRecord::new(&request());
        state.record_error(ErrorKind::SymbolNotFound, "data", "no symbol", false);
        state.record_error(ErrorKind::Internal, "combiner", "later", false);
        let err = state.error.as_ref().unwrap();
        assert_eq!(err.kind, ErrorKind::SymbolNotFound);
        assert!(state.has_fatal_error());
    }
}
