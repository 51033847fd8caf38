//! Result combiner: fuses surviving agent payloads into one reply.
//!
//! Successful payloads are rendered into tagged sections in fixed order
//! (data → analysis → news → knowledge, chart caption last) and handed to
//! the LM for synthesis. If the LM fails, the deterministic template is
//! the reply — a degraded success, never an error.

use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::{comma_separated, with_retry, DISCLAIMER};
use crate::context::NodeCtx;
use crate::error::AgentError;
use crate::graph::{GraphNode, RESULT_COMBINER};
use crate::traits::CompletionRequest;
use crate::types::{AgentName, CombinedReply, StateRecord};

const SYNTHESIS_SYSTEM: &str = "당신은 금융 어시스턴트의 응답 합성기입니다. \
    아래 소스 섹션들을 하나의 자연스러운 한국어 답변으로 합성하세요. \
    섹션 순서(시세 → 분석 → 뉴스 → 지식)를 유지하고, 중복된 내용은 한 번만 \
    말하며, 소스에 없는 내용은 추가하지 마세요. 시세나 분석이 포함되면 \
    마지막에 투자 유의 문구를 넣으세요.";

struct Section {
    agent: AgentName,
    title: &'static str,
    body: String,
}

pub struct ResultCombiner;

#[async_trait]
impl GraphNode for ResultCombiner {
    fn name(&self) -> &'static str {
        RESULT_COMBINER
    }

    async fn run(&self, state: &mut StateRecord, ctx: &NodeCtx) -> Result<(), AgentError> {
        // Defensive: the router skips the combiner on a short-circuit, but
        // bypass anyway if one is active.
        if let Some(sc) = state.simple_short_circuit.as_ref().filter(|s| s.active) {
            state.combined = Some(CombinedReply {
                text: sc.reply.clone(),
                sources: vec![AgentName::Data],
                degraded: false,
            });
            return Ok(());
        }

        let sections = build_sections(state);
        if sections.is_empty() {
            state.combined = Some(CombinedReply {
                text: "요청하신 정보를 찾지 못했습니다. 다른 질문으로 시도해보세요.".into(),
                sources: Vec::new(),
                degraded: true,
            });
            return Ok(());
        }

        let sources: Vec<AgentName> = sections.iter().map(|s| s.agent).collect();
        let needs_disclaimer = sources
            .iter()
            .any(|a| matches!(a, AgentName::Data | AgentName::Analysis));

        let synthesized = synthesize_with_lm(&state.query, &sections, ctx).await;
        let (text, degraded) = match synthesized {
            Some(text) => {
                let text = if needs_disclaimer && !text.contains("참고용") {
                    format!("{text}\n\n{DISCLAIMER}")
                } else {
                    text
                };
                (text, false)
            }
            None => {
                tracing::warn!("synthesis LM failed, using deterministic template");
                (render_template(&sections, needs_disclaimer), true)
            }
        };

        state.combined = Some(CombinedReply {
            text,
            sources,
            degraded,
        });
        Ok(())
    }
}

async fn synthesize_with_lm(
    query: &str,
    sections: &[Section],
    ctx: &NodeCtx,
) -> Option<String> {
    let mut user = format!("사용자 질문: {query}\n");
    for section in sections {
        user.push_str(&format!(
            "\n[{}] {}\n{}\n",
            section.agent, section.title, section.body
        ));
    }

    let llm = Arc::clone(&ctx.caps.llm);
    let text = with_retry("llm.complete", || {
        let llm = Arc::clone(&llm);
        let request = CompletionRequest::new(SYNTHESIS_SYSTEM, user.clone())
            .temperature(0.3)
            .max_tokens(1200);
        async move { llm.complete(request).await }
    })
    .await
    .ok()?;

    let text = text.trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// Sections in fixed presentation order, only for agents that succeeded.
fn build_sections(state: &StateRecord) -> Vec<Section> {
    let succeeded =
        |agent: AgentName| state.agent_results.get(&agent).is_some_and(|r| r.success);
    let mut sections = Vec::new();

    if succeeded(AgentName::Data) {
        if let Some(data) = &state.financial_data {
            sections.push(Section {
                agent: AgentName::Data,
                title: "📊 실시간 시세",
                body: format!(
                    "{} ({}) 현재가 {}원, 전일대비 {:+.2}%, 거래량 {}주",
                    data.company_name,
                    data.symbol,
                    comma_separated(data.price.round() as i64),
                    data.change_pct,
                    comma_separated(data.volume as i64),
                ),
            });
        }
    }
    if succeeded(AgentName::Analysis) {
        if let Some(report) = &state.analysis_result {
            sections.push(Section {
                agent: AgentName::Analysis,
                title: "🔍 투자 분석",
                body: format!("등급: {}\n{}", report.rating.korean(), report.rationale),
            });
        }
    }
    if succeeded(AgentName::News) {
        if let Some(digest) = &state.news_data {
            if !digest.items.is_empty() {
                let mut body = String::new();
                for (i, item) in digest.items.iter().enumerate().take(5) {
                    body.push_str(&format!("{}. {} ({})\n", i + 1, item.title, item.url));
                }
                sections.push(Section {
                    agent: AgentName::News,
                    title: "📰 최신 뉴스",
                    body: body.trim_end().to_string(),
                });
            }
        }
    }
    if succeeded(AgentName::Knowledge) {
        if let Some(knowledge) = &state.knowledge_context {
            sections.push(Section {
                agent: AgentName::Knowledge,
                title: "📚 금융 지식",
                body: knowledge.explanation.clone(),
            });
        }
    }
    if succeeded(AgentName::Visualization) {
        if let Some(chart) = &state.chart {
            sections.push(Section {
                agent: AgentName::Visualization,
                title: "📈 차트",
                body: chart.caption.clone(),
            });
        }
    }
    sections
}

/// Fixed-order headed sections. Deterministic and idempotent: combining
/// the output again yields the same ordering and no new duplicates.
fn render_template(sections: &[Section], needs_disclaimer: bool) -> String {
    let mut out = String::new();
    for section in sections {
        out.push_str(section.title);
        out.push('\n');
        out.push_str(&section.body);
        out.push_str("\n\n");
    }
    if needs_disclaimer {
        out.push_str(DISCLAIMER);
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestHarness;
    use crate::types::{
        AgentPayload, AgentResult, AnalysisReport, ChatRequest, DataOutput, FinancialData,
        NewsDigest, NewsItem, NewsOrigin, Rating, ShortCircuit,
    };

    fn state_with_results() -> StateRecord {
        let mut state = StateRecord::new(&ChatRequest::new("네이버 분석", "s", "u"));
        state.record_agent_result(AgentResult::success(
            AgentName::Data,
            AgentPayload::Data(DataOutput {
                data: FinancialData {
                    symbol: "035420.KS".into(),
                    company_name: "네이버".into(),
                    price: 180_000.0,
                    change_pct: -1.2,
                    volume: 900_000,
                    per: Some(20.0),
                    pbr: None,
                    roe: None,
                    market_cap: None,
                    sector: None,
                    history: vec![],
                },
                simple_reply: None,
            }),
            10,
        ));
        state.record_agent_result(AgentResult::success(
            AgentName::Analysis,
            AgentPayload::Analysis(AnalysisReport {
                rating: Rating::Hold,
                rationale: "변동성이 큰 구간입니다.".into(),
                sources: vec![],
                disclaimer: DISCLAIMER.into(),
            }),
            20,
        ));
        state.record_agent_result(AgentResult::success(
            AgentName::News,
            AgentPayload::News(NewsDigest {
                items: vec![NewsItem {
                    title: "네이버 AI 투자 확대".into(),
                    url: "https://news.example.com/naver-ai".into(),
                    summary: String::new(),
                    origin: NewsOrigin::LiveFeed,
                    published_at: None,
                    relevance: 0.8,
                    score: 0.8,
                }],
            }),
            30,
        ));
        state
    }

    #[tokio::test]
    async fn short_circuit_bypasses_combination() {
        let harness = TestHarness::new();
        let mut state = StateRecord::new(&ChatRequest::new("삼성전자 주가", "s", "u"));
        state.simple_short_circuit = Some(ShortCircuit {
            active: true,
            reply: "📊 삼성전자 현재가 71,500원".into(),
        });

        ResultCombiner.run(&mut state, &harness.ctx()).await.unwrap();
        let combined = state.combined.unwrap();
        assert_eq!(combined.text, "📊 삼성전자 현재가 71,500원");
        assert!(!combined.degraded);
    }

    #[tokio::test]
    async fn lm_failure_degrades_to_template() {
        let harness = TestHarness::new(); // no scripted synthesis → LM error
        let mut state = state_with_results();
        ResultCombiner.run(&mut state, &harness.ctx()).await.unwrap();

        let combined = state.combined.unwrap();
        assert!(combined.degraded);
        assert!(combined.text.contains("실시간 시세"));
        assert!(combined.text.contains("투자 분석"));
        assert!(combined.text.contains("최신 뉴스"));
        assert!(combined.text.contains("참고용"), "disclaimer required");
        assert_eq!(
            combined.sources,
            vec![AgentName::Data, AgentName::Analysis, AgentName::News]
        );
        // Sections follow the fixed order regardless of completion order.
        let data_pos = combined.text.find("실시간 시세").unwrap();
        let analysis_pos = combined.text.find("투자 분석").unwrap();
        let news_pos = combined.text.find("최신 뉴스").unwrap();
        assert!(data_pos < analysis_pos && analysis_pos < news_pos);
    }

    #[tokio::test]
    async fn lm_synthesis_gets_disclaimer_appended() {
        let mut harness = TestHarness::new();
        harness.script_completion("응답 합성기", "네이버는 현재 보합세입니다.");
        let mut state = state_with_results();
        ResultCombiner.run(&mut state, &harness.ctx()).await.unwrap();

        let combined = state.combined.unwrap();
        assert!(!combined.degraded);
        assert!(combined.text.starts_with("네이버는 현재 보합세입니다."));
        assert!(combined.text.contains("참고용"));
    }

    #[tokio::test]
    async fn no_successful_agents_is_still_a_reply() {
        let harness = TestHarness::new();
        let mut state = StateRecord::new(&ChatRequest::new("뉴스", "s", "u"));
        ResultCombiner.run(&mut state, &harness.ctx()).await.unwrap();

        let combined = state.combined.unwrap();
        assert!(combined.degraded);
        assert!(combined.sources.is_empty());
    }

    #[test]
    fn template_is_idempotent() {
        let sections = vec![
            Section {
                agent: AgentName::Data,
                title: "📊 실시간 시세",
                body: "네이버 180,000원".into(),
            },
            Section {
                agent: AgentName::News,
                title: "📰 최신 뉴스",
                body: "1. 네이버 AI 투자 확대".into(),
            },
        ];
        let once = render_template(&sections, true);
        let again = render_template(
            &[Section {
                agent: AgentName::Data,
                title: "📊 실시간 시세",
                body: "네이버 180,000원".into(),
            },
            Section {
                agent: AgentName::News,
                title: "📰 최신 뉴스",
                body: "1. 네이버 AI 투자 확대".into(),
            }],
            true,
        );
        assert_eq!(once, again);
    }
}
