//! Knowledge agent: semantic retrieval turned into an explanation.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::NodeCtx;
use crate::error::{AgentError, ErrorKind};
use crate::traits::CompletionRequest;
use crate::types::{AgentName, AgentPayload, KnowledgeContext, StateSnapshot};

use super::{with_retry, Agent};

const EXPLAINER_SYSTEM: &str = "당신은 금융 지식 설명 도우미입니다. \
    제공된 검색 결과만 근거로 용어를 쉽게 설명하세요. \
    구체적인 예시를 하나 이상 들고, 마지막에 한 줄로 유의사항을 덧붙이세요.";

pub struct KnowledgeAgent;

#[async_trait]
impl Agent for KnowledgeAgent {
    fn name(&self) -> AgentName {
        AgentName::Knowledge
    }

    async fn process(
        &self,
        query: &str,
        _snapshot: &StateSnapshot,
        ctx: &NodeCtx,
    ) -> Result<AgentPayload, AgentError> {
        let index = Arc::clone(&ctx.caps.index);
        let text = query.to_string();
        let top_k = ctx.config.knowledge_top_k;
        let min_score = ctx.config.knowledge_min_score;
        let hits = with_retry("index.search", || {
            let index = Arc::clone(&index);
            let text = text.clone();
            async move { index.search(&text, top_k, min_score).await }
        })
        .await
        .map_err(AgentError::from)?;

        if hits.is_empty() {
            return Err(AgentError::new(
                ErrorKind::NoContext,
                "no retrieval hit above the minimum score",
            ));
        }

        let mut prompt = format!("질문: {query}\n\n검색 결과:\n");
        for hit in &hits {
            prompt.push_str(&format!("- [{}] {}\n", hit.source, hit.snippet));
        }

        let llm = Arc::clone(&ctx.caps.llm);
        let explanation = with_retry("llm.complete", || {
            let llm = Arc::clone(&llm);
            let request =
                CompletionRequest::new(EXPLAINER_SYSTEM, prompt.clone()).max_tokens(600);
            async move { llm.complete(request).await }
        })
        .await
        .unwrap_or_else(|err| {
            tracing::warn!(error = %err, "knowledge LM failed, returning raw snippets");
            fallback_explanation(&hits)
        });

        Ok(AgentPayload::Knowledge(KnowledgeContext { explanation, hits }))
    }
}

/// Raw snippet listing used when the LM is unavailable.
fn fallback_explanation(hits: &[crate::traits::ScoredSnippet]) -> String {
    let mut text = String::from("📚 관련 자료를 찾았습니다:\n");
    for hit in hits {
        text.push_str(&format!("- {}\n", hit.snippet));
    }
    text.push_str("※ 검색 결과를 그대로 정리한 내용입니다.");
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestHarness;
    use crate::traits::ScoredSnippet;

    fn snapshot() -> StateSnapshot {
        StateSnapshot {
            query: "PER이 뭐야?".into(),
            analysis: None,
            financial_data: None,
            news_data: None,
            knowledge_context: None,
            completed_agents: vec![],
        }
    }

    #[tokio::test]
    async fn empty_retrieval_yields_no_context() {
        let harness = TestHarness::new();
        let err = KnowledgeAgent
            .process("PER이 뭐야?", &snapshot(), &harness.ctx())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NoContext);
    }

    #[tokio::test]
    async fn lm_failure_degrades_to_snippets() {
        let mut harness = TestHarness::new();
        harness.set_index_snippets(vec![ScoredSnippet {
            source: "glossary".into(),
            score: 0.83,
            snippet: "PER(주가수익비율)은 주가를 주당순이익으로 나눈 값입니다.".into(),
        }]);
        // No scripted completion: the LM fails and the agent degrades.
        let payload = KnowledgeAgent
            .process("PER이 뭐야?", &snapshot(), &harness.ctx())
            .await
            .unwrap();
        let AgentPayload::Knowledge(ctx) = payload else {
            panic!("expected knowledge payload");
        };
        assert!(ctx.explanation.contains("주가수익비율"));
        assert_eq!(ctx.hits.len(), 1);
    }
}
