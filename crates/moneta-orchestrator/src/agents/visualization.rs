//! Visualization agent: chart-kind selection and PNG rendering.

use std::sync::Arc;

use async_trait::async_trait;

use crate::context::NodeCtx;
use crate::error::{AgentError, ErrorKind};
use crate::types::{AgentName, AgentPayload, ChartArtifact, ChartKind, StateSnapshot};

use super::{with_retry, Agent};

const HISTORY_DAYS: u32 = 30;

pub struct VisualizationAgent;

#[async_trait]
impl Agent for VisualizationAgent {
    fn name(&self) -> AgentName {
        AgentName::Visualization
    }

    async fn process(
        &self,
        query: &str,
        snapshot: &StateSnapshot,
        ctx: &NodeCtx,
    ) -> Result<AgentPayload, AgentError> {
        let data = snapshot.financial_data.as_ref().ok_or_else(|| {
            AgentError::internal("visualization scheduled without financial data")
        })?;

        let series = if data.history.is_empty() {
            let market = Arc::clone(&ctx.caps.market);
            let symbol = data.symbol.clone();
            with_retry("market.history", || {
                let market = Arc::clone(&market);
                let symbol = symbol.clone();
                async move { market.history(&symbol, HISTORY_DAYS).await }
            })
            .await
            .map_err(|err| AgentError::new(ErrorKind::RenderFailed, err.to_string()))?
        } else {
            data.history.clone()
        };

        let kind = choose_kind(query, &series);
        let png = match ctx.caps.charts.render(&series, kind).await {
            Ok(png) => png,
            Err(err) => {
                // Rendering failures are absorbed, never raised.
                return Err(AgentError::new(ErrorKind::RenderFailed, err.to_string()));
            }
        };

        let caption = format!(
            "{} ({}) 최근 {}일 {} 차트",
            data.company_name,
            data.symbol,
            series.len().min(HISTORY_DAYS as usize),
            kind_korean(kind)
        );

        Ok(AgentPayload::Visualization(ChartArtifact { kind, png, caption }))
    }
}

/// Explicit hints in the query win; otherwise multi-bar history defaults to
/// a candlestick and anything shorter to a line.
fn choose_kind(query: &str, series: &[crate::traits::Candle]) -> ChartKind {
    let q = query.to_lowercase();
    if ["캔들", "candle"].iter().any(|k| q.contains(k)) {
        ChartKind::Candlestick
    } else if ["막대", "bar"].iter().any(|k| q.contains(k)) {
        ChartKind::Bar
    } else if ["선", "라인", "line"].iter().any(|k| q.contains(k)) {
        ChartKind::Line
    } else if series.len() >= 5 {
        ChartKind::Candlestick
    } else {
        ChartKind::Line
    }
}

fn kind_korean(kind: ChartKind) -> &'static str {
    match kind {
        ChartKind::Line => "선",
        ChartKind::Bar => "막대",
        ChartKind::Candlestick => "캔들스틱",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn candles(n: usize) -> Vec<crate::traits::Candle> {
        (0..n)
            .map(|i| crate::traits::Candle {
                date: Utc::now(),
                open: 100.0 + i as f64,
                high: 105.0 + i as f64,
                low: 95.0 + i as f64,
                close: 102.0 + i as f64,
                volume: 1_000,
            })
            .collect()
    }

    #[test]
    fn explicit_hint_wins() {
        assert_eq!(
            choose_kind("삼성전자 캔들 차트 보여줘", &candles(2)),
            ChartKind::Candlestick
        );
        assert_eq!(choose_kind("막대 그래프로", &candles(30)), ChartKind::Bar);
        assert_eq!(choose_kind("line chart please", &candles(30)), ChartKind::Line);
    }

    #[test]
    fn history_shape_decides_default() {
        assert_eq!(choose_kind("차트 보여줘", &candles(30)), ChartKind::Candlestick);
        assert_eq!(choose_kind("차트 보여줘", &candles(2)), ChartKind::Line);
    }
}
