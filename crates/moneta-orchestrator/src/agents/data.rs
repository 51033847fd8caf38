//! Data agent: symbol resolution, quote fetch, simple short-circuit.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::NodeCtx;
use crate::error::{AgentError, CapabilityError, ErrorKind};
use crate::types::{
    AgentName, AgentPayload, Complexity, DataOutput, FinancialData, Intent, StateSnapshot,
};

use super::{comma_separated, with_retry, Agent};

/// History window fetched when a downstream agent will draw a chart.
const CHART_HISTORY_DAYS: u32 = 30;

pub struct DataAgent;

#[async_trait]
impl Agent for DataAgent {
    fn name(&self) -> AgentName {
        AgentName::Data
    }

    async fn process(
        &self,
        query: &str,
        snapshot: &StateSnapshot,
        ctx: &NodeCtx,
    ) -> Result<AgentPayload, AgentError> {
        let Some(symbol) = ctx.caps.symbols.resolve(query).await else {
            return Err(AgentError::new(
                ErrorKind::SymbolNotFound,
                "no recognizable ticker in query",
            ));
        };

        let market = Arc::clone(&ctx.caps.market);
        let code = symbol.code.clone();
        let quote = with_retry("market.quote", || {
            let market = Arc::clone(&market);
            let code = code.clone();
            async move { market.quote(&code).await }
        })
        .await
        .map_err(|err| match err {
            CapabilityError::NotFound { .. } => AgentError::new(
                ErrorKind::SymbolNotFound,
                format!("no quote for {}", symbol.code),
            ),
            other => other.into(),
        })?;

        // Pull OHLCV history up front only when the plan will chart it.
        let wants_chart = snapshot
            .analysis
            .as_ref()
            .is_some_and(|a| a.required_agents.contains(&AgentName::Visualization));
        let history = if wants_chart {
            let market = Arc::clone(&ctx.caps.market);
            let code = symbol.code.clone();
            with_retry("market.history", || {
                let market = Arc::clone(&market);
                let code = code.clone();
                async move { market.history(&code, CHART_HISTORY_DAYS).await }
            })
            .await
            .unwrap_or_else(|err| {
                tracing::warn!(symbol = %symbol.code, error = %err, "history fetch failed");
                Vec::new()
            })
        } else {
            Vec::new()
        };

        let data = FinancialData {
            symbol: symbol.code,
            company_name: symbol.company_name,
            price: quote.price,
            change_pct: quote.change_pct,
            volume: quote.volume,
            per: quote.per,
            pbr: quote.pbr,
            roe: quote.roe,
            market_cap: quote.market_cap,
            sector: quote.sector,
            history,
        };

        let simple_reply = is_simple_request(snapshot).then(|| format_simple_reply(&data));
        Ok(AgentPayload::Data(DataOutput { data, simple_reply }))
    }
}

/// A request is "simple" when the analyzer saw a plain single-symbol data
/// lookup: nothing else in the plan, so the quote line is the answer.
fn is_simple_request(snapshot: &StateSnapshot) -> bool {
    snapshot.analysis.as_ref().is_some_and(|a| {
        a.primary_intent == Intent::Data
            && a.complexity == Complexity::Simple
            && a.required_agents == [AgentName::Data]
    })
}

fn format_simple_reply(data: &FinancialData) -> String {
    format!(
        "📊 {} ({}) 현재가 {}원 ({:+.1}%) · 거래량 {}주",
        data.company_name,
        data.symbol,
        comma_separated(data.price.round() as i64),
        data.change_pct,
        comma_separated(data.volume as i64),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestHarness;
    use crate::types::QueryAnalysis;

    fn snapshot_for(analysis: Option<QueryAnalysis>) -> StateSnapshot {
        StateSnapshot {
            query: "삼성전자 주가 알려줘".into(),
            analysis,
            financial_data: None,
            news_data: None,
            knowledge_context: None,
            completed_agents: vec![],
        }
    }

    fn simple_data_analysis() -> QueryAnalysis {
        QueryAnalysis {
            primary_intent: Intent::Data,
            complexity: Complexity::Simple,
            required_agents: vec![AgentName::Data],
            confidence: 0.9,
            is_investment: false,
            next_agent: Some(AgentName::Data),
        }
    }

    #[tokio::test]
    async fn resolves_symbol_and_short_circuits() {
        let harness = TestHarness::with_samsung_quote();
        let snapshot = snapshot_for(Some(simple_data_analysis()));

        let payload = DataAgent
            .process("삼성전자 주가 알려줘", &snapshot, &harness.ctx())
            .await
            .unwrap();

        let AgentPayload::Data(out) = payload else {
            panic!("expected data payload");
        };
        assert_eq!(out.data.symbol, "005930.KS");
        let reply = out.simple_reply.expect("simple request must short-circuit");
        assert!(reply.contains("71,500"), "reply: {reply}");
        assert!(reply.contains("+2.1%"), "reply: {reply}");
    }

    #[tokio::test]
    async fn unknown_symbol_fails_with_symbol_not_found() {
        let harness = TestHarness::with_samsung_quote();
        let snapshot = snapshot_for(Some(simple_data_analysis()));

        let err = DataAgent
            .process("어디서도 못 듣던 회사 주가", &snapshot, &harness.ctx())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::SymbolNotFound);
    }

    #[tokio::test]
    async fn moderate_request_skips_short_circuit() {
        let harness = TestHarness::with_samsung_quote();
        let analysis = QueryAnalysis {
            primary_intent: Intent::Analysis,
            complexity: Complexity::Moderate,
            required_agents: vec![AgentName::Data, AgentName::Analysis],
            confidence: 0.8,
            is_investment: true,
            next_agent: Some(AgentName::Data),
        };
        let snapshot = snapshot_for(Some(analysis));

        let payload = DataAgent
            .process("삼성전자 분석해줘", &snapshot, &harness.ctx())
            .await
            .unwrap();
        let AgentPayload::Data(out) = payload else {
            panic!("expected data payload");
        };
        assert!(out.simple_reply.is_none());
    }
}
