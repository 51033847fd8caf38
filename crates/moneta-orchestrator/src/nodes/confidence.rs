//! Confidence calculator: four-subscore rubric with LM scoring and a
//! deterministic fallback.

use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::with_retry;
use crate::context::NodeCtx;
use crate::error::AgentError;
use crate::graph::{GraphNode, CONFIDENCE_CALCULATOR};
use crate::parse::parse_json_lenient;
use crate::traits::CompletionRequest;
use crate::types::{
    AgentName, ConfidenceReport, Grade, StateRecord, SubScores, CONFIDENCE_DENOMINATOR,
    SUBSCORE_MAX,
};

const SCORER_SYSTEM: &str = "당신은 금융 답변 품질 평가자입니다. \
    질문과 답변을 보고 JSON 객체 하나만 출력하세요: \
    {\"completeness\": 0~25, \"consistency\": 0~25, \
    \"accuracy\": 0~25, \"usefulness\": 0~25}. 설명은 출력하지 마세요.";

/// Replies shorter than this earn a warning.
const SHORT_REPLY_CHARS: usize = 80;

pub struct ConfidenceCalculator;

#[async_trait]
impl GraphNode for ConfidenceCalculator {
    fn name(&self) -> &'static str {
        CONFIDENCE_CALCULATOR
    }

    async fn run(&self, state: &mut StateRecord, ctx: &NodeCtx) -> Result<(), AgentError> {
        let combined = state
            .combined
            .as_ref()
            .ok_or_else(|| AgentError::internal("confidence ran before the combiner"))?;

        let mut warnings = collect_warnings(state, &combined.text);

        let report = match score_with_lm(&state.query, &combined.text, ctx).await {
            Some(subscores) => {
                let score = f64::from(subscores.total()) / f64::from(CONFIDENCE_DENOMINATOR);
                let score = score.clamp(0.0, 1.0);
                ConfidenceReport {
                    score,
                    grade: Grade::from_score(score, ctx.config.confidence_thresholds),
                    subscores,
                    warnings: warnings.clone(),
                }
            }
            None => {
                // Malformed or unavailable scorer: fixed midpoint, grade C.
                warnings.push("score_parse_fallback".into());
                ConfidenceReport {
                    score: 0.5,
                    grade: Grade::C,
                    subscores: SubScores {
                        completeness: 13,
                        consistency: 12,
                        accuracy: 13,
                        usefulness: 12,
                    },
                    warnings,
                }
            }
        };

        tracing::info!(score = report.score, grade = ?report.grade, "reply scored");
        state.confidence_report = Some(report);
        Ok(())
    }
}

async fn score_with_lm(query: &str, reply: &str, ctx: &NodeCtx) -> Option<SubScores> {
    let user = format!("질문: {query}\n\n답변:\n{reply}");
    let llm = Arc::clone(&ctx.caps.llm);
    let text = with_retry("llm.complete", || {
        let llm = Arc::clone(&llm);
        let request = CompletionRequest::new(SCORER_SYSTEM, user.clone()).max_tokens(200);
        async move { llm.complete(request).await }
    })
    .await
    .ok()?;

    let value = parse_json_lenient(&text)?;
    let read = |key: &str| -> Option<u32> {
        value
            .get(key)
            .and_then(|v| v.as_u64())
            .map(|n| (n as u32).min(SUBSCORE_MAX))
    };
    Some(SubScores {
        completeness: read("completeness")?,
        consistency: read("consistency")?,
        accuracy: read("accuracy")?,
        usefulness: read("usefulness")?,
    })
}

fn collect_warnings(state: &StateRecord, reply: &str) -> Vec<String> {
    let mut warnings = Vec::new();

    if state.agent_results.values().any(|r| !r.success) {
        warnings.push("agent_failures".into());
    }

    let news_planned = state
        .plan
        .as_ref()
        .is_some_and(|p| p.agents().any(|a| a == AgentName::News));
    let news_count = state.news_data.as_ref().map_or(0, |d| d.items.len());
    if news_planned && news_count == 0 {
        warnings.push("no_news".into());
    }

    let needs_disclaimer = [AgentName::Data, AgentName::Analysis]
        .iter()
        .any(|a| state.agent_results.get(a).is_some_and(|r| r.success));
    if needs_disclaimer && !reply.contains("참고용") {
        warnings.push("missing_disclaimer".into());
    }

    if reply.chars().count() < SHORT_REPLY_CHARS {
        warnings.push("short_reply".into());
    }

    warnings
}
