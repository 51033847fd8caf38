//! Query analyzer: LM-primary intent classification with a deterministic
//! keyword fallback.

use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::with_retry;
use crate::context::NodeCtx;
use crate::error::AgentError;
use crate::graph::{GraphNode, QUERY_ANALYZER};
use crate::parse::parse_json_lenient;
use crate::traits::CompletionRequest;
use crate::types::{
    AgentName, Complexity, Intent, QueryAnalysis, StateRecord, MAX_QUERY_CHARS,
};

const CLASSIFIER_SYSTEM: &str = "당신은 금융 질문 의도 분류기입니다. \
    사용자 질문을 분류해 JSON 객체 하나만 출력하세요: \
    {\"intent\": \"data|analysis|news|knowledge|visualization|general\", \
    \"complexity\": \"simple|moderate|complex\", \
    \"required_agents\": [\"data\",\"analysis\",\"news\",\"knowledge\",\"visualization\"], \
    \"confidence\": 0.0~1.0, \"is_investment\": true|false}. \
    설명 없이 JSON만 출력하세요.";

// Keyword tables for the deterministic fallback. Checked in priority
// order: chart hints, news, term definitions, stock-name + analysis,
// price words, bare stock name.
const VIZ_KEYWORDS: &[&str] = &["차트", "그래프", "시각화", "캔들", "chart", "graph", "candle"];
const NEWS_KEYWORDS: &[&str] = &["뉴스", "소식", "이슈", "공시", "news"];
const KNOWLEDGE_KEYWORDS: &[&str] = &[
    "뜻", "설명", "의미", "무엇", "뭐야", "뭐지", "이해", "원리", "what is", "explain",
];
const ANALYSIS_KEYWORDS: &[&str] = &[
    "분석", "전망", "투자", "추천", "의견", "전략", "analysis", "analyze", "invest", "outlook",
];
const DATA_KEYWORDS: &[&str] = &["주가", "가격", "현재가", "시세", "price", "quote"];
const STOCK_NAMES: &[&str] = &[
    "삼성전자", "sk하이닉스", "하이닉스", "네이버", "카카오", "현대차", "기아", "lg전자",
    "삼성바이오", "포스코", "sk텔레콤", "삼성sdi", "samsung", "hynix", "naver", "kakao",
    "hyundai", "kia",
];

const FALLBACK_CONFIDENCE: f64 = 0.6;

pub struct QueryAnalyzer;

#[async_trait]
impl GraphNode for QueryAnalyzer {
    fn name(&self) -> &'static str {
        QUERY_ANALYZER
    }

    async fn run(&self, state: &mut StateRecord, ctx: &NodeCtx) -> Result<(), AgentError> {
        let query = state.query.trim().to_string();
        if query.is_empty() {
            return Err(AgentError::invalid_input("query is empty"));
        }
        if state.query.chars().count() > MAX_QUERY_CHARS {
            return Err(AgentError::invalid_input(format!(
                "query exceeds {MAX_QUERY_CHARS} characters"
            )));
        }

        let analysis = match classify_with_lm(&query, ctx).await {
            Some(analysis) => analysis,
            None => {
                tracing::info!("classifier LM unavailable or unparseable, using keywords");
                classify_with_keywords(&query)
            }
        };

        tracing::info!(
            intent = %analysis.primary_intent,
            complexity = ?analysis.complexity,
            agents = ?analysis.required_agents,
            confidence = analysis.confidence,
            "query classified"
        );
        state.analysis = Some(analysis);
        Ok(())
    }
}

async fn classify_with_lm(query: &str, ctx: &NodeCtx) -> Option<QueryAnalysis> {
    let llm = Arc::clone(&ctx.caps.llm);
    let user = query.to_string();
    let text = with_retry("llm.complete", || {
        let llm = Arc::clone(&llm);
        let request = CompletionRequest::new(CLASSIFIER_SYSTEM, user.clone()).max_tokens(300);
        async move { llm.complete(request).await }
    })
    .await
    .ok()?;

    let value = parse_json_lenient(&text)?;
    let intent = value
        .get("intent")
        .and_then(|v| v.as_str())
        .map(Intent::parse_lossy)
        .unwrap_or(Intent::General);
    let complexity = value
        .get("complexity")
        .and_then(|v| v.as_str())
        .map(Complexity::parse_lossy)
        .unwrap_or(Complexity::Moderate);
    let mut required: Vec<AgentName> = value
        .get("required_agents")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().and_then(AgentName::parse))
                .collect()
        })
        .unwrap_or_default();
    if required.is_empty() {
        required = default_agents_for(intent, query);
    }
    let confidence = value
        .get("confidence")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.7)
        .clamp(0.0, 1.0);
    let is_investment = value
        .get("is_investment")
        .and_then(|v| v.as_bool())
        .unwrap_or(intent == Intent::Analysis);

    Some(finish(intent, complexity, required, confidence, is_investment))
}

fn classify_with_keywords(query: &str) -> QueryAnalysis {
    let q = query.to_lowercase();
    let contains = |keys: &[&str]| keys.iter().any(|k| q.contains(k));
    let has_stock = contains(STOCK_NAMES);

    let intent = if contains(VIZ_KEYWORDS) {
        Intent::Visualization
    } else if contains(NEWS_KEYWORDS) {
        Intent::News
    } else if contains(KNOWLEDGE_KEYWORDS) {
        Intent::Knowledge
    } else if has_stock && contains(ANALYSIS_KEYWORDS) {
        Intent::Analysis
    } else if contains(DATA_KEYWORDS) || has_stock {
        Intent::Data
    } else {
        Intent::General
    };

    let required = default_agents_for(intent, query);
    let complexity = match required.len() {
        0 | 1 => Complexity::Simple,
        2 => Complexity::Moderate,
        _ => Complexity::Complex,
    };
    let is_investment = contains(&["투자", "invest"]) || intent == Intent::Analysis;

    finish(intent, complexity, required, FALLBACK_CONFIDENCE, is_investment)
}

/// Deterministic agent set for an intent, used when the classifier output
/// omits or garbles `required_agents`.
fn default_agents_for(intent: Intent, query: &str) -> Vec<AgentName> {
    let q = query.to_lowercase();
    match intent {
        Intent::Data => vec![AgentName::Data],
        Intent::News => vec![AgentName::News],
        Intent::Knowledge => vec![AgentName::Knowledge],
        Intent::Visualization => vec![AgentName::Data, AgentName::Visualization],
        Intent::Analysis => {
            let mut agents = vec![AgentName::Data, AgentName::Analysis];
            if NEWS_KEYWORDS.iter().any(|k| q.contains(k)) {
                agents.push(AgentName::News);
            }
            agents
        }
        Intent::General => Vec::new(),
    }
}

/// Normalize the classification: dependencies of the intent are always
/// scheduled, the agent list is deduplicated into stage order, and the
/// dispatch hint points at the earliest agent.
fn finish(
    intent: Intent,
    complexity: Complexity,
    mut required: Vec<AgentName>,
    confidence: f64,
    is_investment: bool,
) -> QueryAnalysis {
    for dep in intent.required_agents() {
        if !required.contains(dep) {
            required.push(*dep);
        }
    }
    if let Some(primary) = intent.primary_agent() {
        if !required.contains(&primary) {
            required.push(primary);
        }
    }
    required.sort();
    required.dedup();

    QueryAnalysis {
        primary_intent: intent,
        complexity,
        next_agent: required.first().copied(),
        required_agents: required,
        confidence,
        is_investment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestHarness;
    use crate::types::ChatRequest;

    fn state(query: &str) -> StateRecord {
        StateRecord::new(&ChatRequest::new(query, "s", "u"))
    }

    #[tokio::test]
    async fn empty_query_fails_fast() {
        let harness = TestHarness::new();
        let mut state = state("   ");
        let err = QueryAnalyzer
            .run(&mut state, &harness.ctx())
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InvalidInput);
        assert!(state.analysis.is_none());
    }

    #[tokio::test]
    async fn oversized_query_fails_fast() {
        let harness = TestHarness::new();
        let mut state = state(&"가".repeat(MAX_QUERY_CHARS + 1));
        let err = QueryAnalyzer
            .run(&mut state, &harness.ctx())
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn lm_classification_is_primary() {
        let mut harness = TestHarness::new();
        harness.script_completion(
            "의도 분류기",
            r#"{"intent": "analysis", "complexity": "complex",
                "required_agents": ["data", "news", "analysis"],
                "confidence": 0.92, "is_investment": true}"#,
        );
        let mut state = state("네이버 투자 분석하고 최근 뉴스도 알려줘");
        QueryAnalyzer.run(&mut state, &harness.ctx()).await.unwrap();

        let analysis = state.analysis.unwrap();
        assert_eq!(analysis.primary_intent, Intent::Analysis);
        assert_eq!(analysis.complexity, Complexity::Complex);
        assert!(analysis.is_investment);
        assert_eq!(analysis.next_agent, Some(AgentName::Data));
        assert!(analysis.required_agents.contains(&AgentName::News));
    }

    #[tokio::test]
    async fn lm_confidence_is_clamped() {
        let mut harness = TestHarness::new();
        harness.script_completion(
            "의도 분류기",
            r#"{"intent": "data", "complexity": "simple",
                "required_agents": ["data"], "confidence": 1.7}"#,
        );
        let mut state = state("삼성전자 주가");
        QueryAnalyzer.run(&mut state, &harness.ctx()).await.unwrap();
        assert_eq!(state.analysis.unwrap().confidence, 1.0);
    }

    #[tokio::test]
    async fn unknown_intent_coerces_to_general() {
        let mut harness = TestHarness::new();
        harness.script_completion(
            "의도 분류기",
            r#"{"intent": "portfolio", "complexity": "simple", "confidence": 0.8}"#,
        );
        let mut state = state("포트폴리오 짜줘");
        QueryAnalyzer.run(&mut state, &harness.ctx()).await.unwrap();
        let analysis = state.analysis.unwrap();
        assert_eq!(analysis.primary_intent, Intent::General);
        assert!(analysis.required_agents.is_empty());
        assert!(analysis.next_agent.is_none());
    }

    #[tokio::test]
    async fn malformed_lm_output_falls_back_to_keywords() {
        let mut harness = TestHarness::new();
        harness.script_completion("의도 분류기", "주가 조회로 보입니다");
        let mut state = state("삼성전자 주가 알려줘");
        QueryAnalyzer.run(&mut state, &harness.ctx()).await.unwrap();

        let analysis = state.analysis.unwrap();
        assert_eq!(analysis.primary_intent, Intent::Data);
        assert_eq!(analysis.complexity, Complexity::Simple);
        assert_eq!(analysis.required_agents, vec![AgentName::Data]);
    }

    #[test]
    fn keyword_priorities() {
        assert_eq!(
            classify_with_keywords("삼성전자 캔들 차트 보여줘").primary_intent,
            Intent::Visualization
        );
        assert_eq!(
            classify_with_keywords("반도체 뉴스 알려줘").primary_intent,
            Intent::News
        );
        assert_eq!(
            classify_with_keywords("PER이 뭐야?").primary_intent,
            Intent::Knowledge
        );
        assert_eq!(
            classify_with_keywords("카카오 분석").primary_intent,
            Intent::Analysis
        );
        assert_eq!(
            classify_with_keywords("삼성전자 주가 알려줘").primary_intent,
            Intent::Data
        );
        assert_eq!(
            classify_with_keywords("안녕하세요").primary_intent,
            Intent::General
        );
    }

    #[test]
    fn visualization_always_schedules_data_first() {
        let analysis = classify_with_keywords("삼성전자 차트 보여줘");
        assert_eq!(
            analysis.required_agents,
            vec![AgentName::Data, AgentName::Visualization]
        );
        assert_eq!(analysis.next_agent, Some(AgentName::Data));
    }
}
