//! Responder: packs the state record into the response shape.
//!
//! Formatting only — no network or model calls. Error kinds map to short
//! user-safe Korean strings; internal messages never leak.

use async_trait::async_trait;
use serde_json::json;

use crate::context::NodeCtx;
use crate::error::{AgentError, ErrorKind};
use crate::graph::{GraphNode, RESPONDER};
use crate::types::{
    ActionType, ChatResponse, Grade, Intent, StateRecord,
};

/// Confidence assigned to a short-circuited quote lookup: a direct quote
/// from the market-data source needs no rubric pass.
const SHORT_CIRCUIT_CONFIDENCE: f64 = 0.85;

/// Confidence for the canned general greeting.
const GENERAL_CONFIDENCE: f64 = 0.75;

const GENERAL_GREETING: &str = "안녕하세요! 금융 전문가 챗봇입니다.\n\
    주식 정보, 투자 분석, 금융 뉴스, 금융 지식에 대해 도움을 드릴 수 있습니다.\n\
    구체적인 질문을 해주시면 더 정확한 답변을 드릴 수 있습니다.";

/// User-safe message for each failure kind.
pub(crate) fn user_message(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::InvalidInput => "질문을 입력해주세요. 입력한 내용을 다시 확인해주세요.",
        ErrorKind::SymbolNotFound => "죄송합니다. 요청하신 종목을 찾을 수 없습니다.",
        ErrorKind::NoContext => "관련 자료를 찾지 못했습니다. 다른 질문으로 시도해보세요.",
        ErrorKind::TransientExternal | ErrorKind::PermanentExternal => {
            "외부 서비스 연결에 문제가 있습니다. 잠시 후 다시 시도해주세요."
        }
        ErrorKind::Timeout => "처리 시간이 초과되었습니다. 잠시 후 다시 시도해주세요.",
        ErrorKind::Cancelled => "요청이 취소되었습니다.",
        ErrorKind::RequiredAgentFailed => {
            "죄송합니다. 필요한 데이터를 가져오지 못했습니다. 잠시 후 다시 시도해주세요."
        }
        ErrorKind::RenderFailed => "차트를 생성하지 못했습니다. 잠시 후 다시 시도해주세요.",
        ErrorKind::Internal => "예상치 못한 오류가 발생했습니다. 다시 시도해주세요.",
    }
}

pub struct Responder;

#[async_trait]
impl GraphNode for Responder {
    fn name(&self) -> &'static str {
        RESPONDER
    }

    async fn run(&self, state: &mut StateRecord, ctx: &NodeCtx) -> Result<(), AgentError> {
        let response = if state.has_fatal_error() {
            error_response(state)
        } else if state.short_circuit_active() {
            short_circuit_response(state, ctx)
        } else {
            composed_response(state, ctx)
        };
        state.response = Some(response);
        Ok(())
    }
}

fn error_response(state: &StateRecord) -> ChatResponse {
    let kind = state
        .error
        .as_ref()
        .map(|e| e.kind)
        .unwrap_or(ErrorKind::Internal);
    ChatResponse {
        reply: user_message(kind).to_string(),
        action_type: ActionType::Error,
        action_payload: Some(json!({ "error_kind": kind.as_str() })),
        chart: None,
        retrieved_documents: Vec::new(),
        confidence: 0.0,
        grade: Grade::F,
    }
}

fn short_circuit_response(state: &StateRecord, ctx: &NodeCtx) -> ChatResponse {
    let reply = state
        .simple_short_circuit
        .as_ref()
        .map(|s| s.reply.clone())
        .unwrap_or_default();
    ChatResponse {
        reply,
        action_type: ActionType::Data,
        action_payload: state
            .financial_data
            .as_ref()
            .and_then(|d| serde_json::to_value(d).ok()),
        chart: None,
        retrieved_documents: Vec::new(),
        confidence: SHORT_CIRCUIT_CONFIDENCE,
        grade: Grade::from_score(SHORT_CIRCUIT_CONFIDENCE, ctx.config.confidence_thresholds),
    }
}

fn composed_response(state: &StateRecord, ctx: &NodeCtx) -> ChatResponse {
    let intent = state
        .analysis
        .as_ref()
        .map(|a| a.primary_intent)
        .unwrap_or(Intent::General);

    let (reply, confidence, grade) = match (&state.combined, &state.confidence_report) {
        (Some(combined), Some(report)) => {
            (combined.text.clone(), report.score, report.grade)
        }
        (Some(combined), None) => {
            let score = 0.7;
            (
                combined.text.clone(),
                score,
                Grade::from_score(score, ctx.config.confidence_thresholds),
            )
        }
        // General intent: the planner routed straight here.
        _ => (
            GENERAL_GREETING.to_string(),
            GENERAL_CONFIDENCE,
            Grade::from_score(GENERAL_CONFIDENCE, ctx.config.confidence_thresholds),
        ),
    };

    let mut payload = json!({
        "query_type": intent.as_str(),
    });
    if let Some(combined) = &state.combined {
        payload["sources"] = json!(combined.sources);
        payload["degraded"] = json!(combined.degraded);
    }
    if let Some(data) = &state.financial_data {
        payload["financial_data"] = serde_json::to_value(data).unwrap_or_default();
    }
    if let Some(report) = &state.analysis_result {
        payload["rating"] = json!(report.rating);
    }
    if let Some(digest) = &state.news_data {
        payload["news_count"] = json!(digest.items.len());
    }
    if let Some(chart) = &state.chart {
        payload["chart_kind"] = json!(chart.kind);
        payload["chart_caption"] = json!(chart.caption);
    }
    if let Some(report) = &state.confidence_report {
        payload["warnings"] = json!(report.warnings);
    }

    ChatResponse {
        reply,
        action_type: ActionType::from(intent),
        action_payload: Some(payload),
        chart: state.chart.as_ref().map(|c| c.png.clone()),
        retrieved_documents: state
            .knowledge_context
            .as_ref()
            .map(|k| k.hits.clone())
            .unwrap_or_default(),
        confidence,
        grade,
    }
}
