//! Analysis agent: retrieval-grounded investment judgement.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::NodeCtx;
use crate::error::AgentError;
use crate::parse::parse_json_lenient;
use crate::traits::CompletionRequest;
use crate::types::{
    AgentName, AgentPayload, AnalysisReport, FinancialData, Rating, StateSnapshot,
};

use super::{with_retry, Agent, DISCLAIMER};

const ANALYST_SYSTEM: &str = "당신은 전문 금융 애널리스트입니다. \
    제공된 시세, 검색 컨텍스트, 관련 기사만 근거로 투자 판단을 내리세요. \
    반드시 JSON 객체 {\"rating\": \"strong_buy|buy|hold|sell|strong_sell\", \
    \"rationale\": \"근거 요약\"} 하나만 출력하세요. \
    rationale에는 투자 판단의 근거와 유의사항을 포함하세요.";

/// PER bands used by the deterministic fallback commentary.
const PER_UNDERVALUED: f64 = 15.0;
const PER_OVERVALUED: f64 = 25.0;

pub struct AnalysisAgent;

#[async_trait]
impl Agent for AnalysisAgent {
    fn name(&self) -> AgentName {
        AgentName::Analysis
    }

    async fn process(
        &self,
        query: &str,
        snapshot: &StateSnapshot,
        ctx: &NodeCtx,
    ) -> Result<AgentPayload, AgentError> {
        // The planner schedules this agent strictly after the data agent.
        let data = snapshot.financial_data.as_ref().ok_or_else(|| {
            AgentError::internal("analysis scheduled without financial data")
        })?;

        let mut sources: Vec<String> = Vec::new();

        // Analytical context from the semantic index. Failures here degrade
        // the analysis but do not fail the agent.
        let index = Arc::clone(&ctx.caps.index);
        let text = query.to_string();
        let top_k = ctx.config.knowledge_top_k;
        let min_score = ctx.config.knowledge_min_score;
        let snippets = with_retry("index.search", || {
            let index = Arc::clone(&index);
            let text = text.clone();
            async move { index.search(&text, top_k, min_score).await }
        })
        .await
        .unwrap_or_else(|err| {
            tracing::warn!(error = %err, "semantic context lookup failed");
            Vec::new()
        });
        sources.extend(snippets.iter().map(|s| s.source.clone()));

        // Similar articles from the news knowledge graph, by embedding.
        let articles = match self.similar_articles(query, ctx).await {
            Ok(articles) => articles,
            Err(err) => {
                tracing::warn!(error = %err, "news graph context lookup failed");
                Vec::new()
            }
        };
        sources.extend(articles.iter().map(|a| a.url.clone()));

        let mut prompt = format!(
            "질문: {query}\n\n시세:\n{}\n",
            describe_financials(data)
        );
        if !snippets.is_empty() {
            prompt.push_str("\n검색 컨텍스트:\n");
            for s in &snippets {
                prompt.push_str(&format!("- [{}] {}\n", s.source, s.snippet));
            }
        }
        if !articles.is_empty() {
            prompt.push_str("\n관련 기사:\n");
            for a in &articles {
                prompt.push_str(&format!("- {} ({})\n", a.title, a.url));
            }
        }

        let llm = Arc::clone(&ctx.caps.llm);
        let completion = with_retry("llm.complete", || {
            let llm = Arc::clone(&llm);
            let request = CompletionRequest::new(ANALYST_SYSTEM, prompt.clone()).max_tokens(800);
            async move { llm.complete(request).await }
        })
        .await;

        let (rating, rationale) = match completion {
            Ok(text) => parse_judgement(&text).unwrap_or_else(|| {
                tracing::warn!("analysis output unparseable, using rule-based fallback");
                fallback_judgement(data)
            }),
            Err(err) => {
                tracing::warn!(error = %err, "analysis LM failed, using rule-based fallback");
                fallback_judgement(data)
            }
        };

        Ok(AgentPayload::Analysis(AnalysisReport {
            rating,
            rationale,
            sources,
            disclaimer: DISCLAIMER.to_string(),
        }))
    }
}

impl AnalysisAgent {
    async fn similar_articles(
        &self,
        query: &str,
        ctx: &NodeCtx,
    ) -> Result<Vec<crate::traits::GraphArticle>, crate::error::CapabilityError> {
        let llm = Arc::clone(&ctx.caps.llm);
        let text = query.to_string();
        let embedding = with_retry("llm.embed", || {
            let llm = Arc::clone(&llm);
            let text = text.clone();
            async move { llm.embed(&text).await }
        })
        .await?;

        let graph = Arc::clone(&ctx.caps.news_graph);
        let top_k = ctx.config.knowledge_top_k;
        let min_score = ctx.config.news_min_score;
        with_retry("news_graph.similar", || {
            let graph = Arc::clone(&graph);
            let embedding = embedding.clone();
            async move { graph.similar(&embedding, top_k, min_score).await }
        })
        .await
    }
}

fn describe_financials(data: &FinancialData) -> String {
    let mut lines = format!(
        "{} ({}) 현재가 {:.0}원, 전일대비 {:+.2}%, 거래량 {}주",
        data.company_name, data.symbol, data.price, data.change_pct, data.volume
    );
    if let Some(per) = data.per {
        lines.push_str(&format!(", PER {per:.1}"));
    }
    if let Some(pbr) = data.pbr {
        lines.push_str(&format!(", PBR {pbr:.2}"));
    }
    if let Some(roe) = data.roe {
        lines.push_str(&format!(", ROE {roe:.1}%"));
    }
    if let Some(sector) = &data.sector {
        lines.push_str(&format!(", 섹터 {sector}"));
    }
    lines
}

fn parse_judgement(text: &str) -> Option<(Rating, String)> {
    let value = parse_json_lenient(text)?;
    let rating = Rating::parse(value.get("rating")?.as_str()?)?;
    let rationale = value.get("rationale")?.as_str()?.trim().to_string();
    if rationale.is_empty() {
        return None;
    }
    Some((rating, rationale))
}

/// Rule-based judgement mirroring the price-direction / PER-band / volume
/// commentary used when the LM is unavailable.
fn fallback_judgement(data: &FinancialData) -> (Rating, String) {
    let mut parts: Vec<String> = Vec::new();
    if data.change_pct >= 0.0 {
        parts.push(format!("📈 주가가 전일 대비 {:.2}% 상승했습니다.", data.change_pct));
    } else {
        parts.push(format!(
            "📉 주가가 전일 대비 {:.2}% 하락했습니다.",
            data.change_pct.abs()
        ));
    }

    let rating = match data.per {
        Some(per) if per < PER_UNDERVALUED => {
            parts.push(format!("💰 PER {per:.1}는 상대적으로 저평가된 수준입니다."));
            Rating::Buy
        }
        Some(per) if per > PER_OVERVALUED => {
            parts.push(format!("⚠️ PER {per:.1}는 상대적으로 고평가된 수준입니다."));
            Rating::Sell
        }
        Some(per) => {
            parts.push(format!("📊 PER {per:.1}는 적정 수준입니다."));
            Rating::Hold
        }
        None => Rating::Hold,
    };

    if data.volume > 1_000_000 {
        parts.push(format!("🔥 거래량 {}주로 관심도가 높습니다.", data.volume));
    }

    (rating, parts.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(change_pct: f64, per: Option<f64>) -> FinancialData {
        FinancialData {
            symbol: "035420.KS".into(),
            company_name: "네이버".into(),
            price: 180_000.0,
            change_pct,
            volume: 2_000_000,
            per,
            pbr: None,
            roe: None,
            market_cap: None,
            sector: Some("Technology".into()),
            history: vec![],
        }
    }

    #[test]
    fn judgement_parses_from_json() {
        let (rating, rationale) =
            parse_judgement(r#"{"rating": "buy", "rationale": "실적 개선 기대"}"#).unwrap();
        assert_eq!(rating, Rating::Buy);
        assert_eq!(rationale, "실적 개선 기대");
    }

    #[test]
    fn judgement_rejects_empty_rationale() {
        assert!(parse_judgement(r#"{"rating": "buy", "rationale": "  "}"#).is_none());
        assert!(parse_judgement("등급: 매수").is_none());
    }

    #[test]
    fn fallback_rates_by_per_band() {
        let (rating, rationale) = fallback_judgement(&data(1.5, Some(11.0)));
        assert_eq!(rating, Rating::Buy);
        assert!(rationale.contains("저평가"));

        let (rating, _) = fallback_judgement(&data(-0.5, Some(30.0)));
        assert_eq!(rating, Rating::Sell);

        let (rating, _) = fallback_judgement(&data(0.2, None));
        assert_eq!(rating, Rating::Hold);
    }
}
