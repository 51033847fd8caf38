//! Worker-agent identity, uniform result envelope, and typed payloads.

use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::traits::{Candle, ScoredSnippet};

// ---------------------------------------------------------------------------
// Agent identity
// ---------------------------------------------------------------------------

/// The fixed set of worker agents. `Ord` so stage sets and result maps
/// serialize deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentName {
    Data,
    Analysis,
    News,
    Knowledge,
    Visualization,
}

impl AgentName {
    pub const ALL: [AgentName; 5] = [
        Self::Data,
        Self::Analysis,
        Self::News,
        Self::Knowledge,
        Self::Visualization,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Analysis => "analysis",
            Self::News => "news",
            Self::Knowledge => "knowledge",
            Self::Visualization => "visualization",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "data" => Some(Self::Data),
            "analysis" => Some(Self::Analysis),
            "news" => Some(Self::News),
            "knowledge" => Some(Self::Knowledge),
            "visualization" | "chart" => Some(Self::Visualization),
            _ => None,
        }
    }
}

impl std::fmt::Display for AgentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Uniform agent result
// ---------------------------------------------------------------------------

/// The envelope the executor collects for every dispatched agent. Uniform
/// across agents so the executor never needs to know payload types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent: AgentName,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<AgentPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<AgentError>,
    pub elapsed_ms: u64,
}

impl AgentResult {
    pub fn success(agent: AgentName, payload: AgentPayload, elapsed_ms: u64) -> Self {
        Self {
            agent,
            success: true,
            payload: Some(payload),
            error: None,
            elapsed_ms,
        }
    }

    pub fn failure(agent: AgentName, error: AgentError, elapsed_ms: u64) -> Self {
        Self {
            agent,
            success: false,
            payload: None,
            error: Some(error),
            elapsed_ms,
        }
    }
}

/// Agent payloads, discriminated by the producing agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "agent", rename_all = "snake_case")]
#[non_exhaustive]
pub enum AgentPayload {
    Data(DataOutput),
    Analysis(AnalysisReport),
    News(NewsDigest),
    Knowledge(KnowledgeContext),
    Visualization(ChartArtifact),
}

// ---------------------------------------------------------------------------
// Data agent
// ---------------------------------------------------------------------------

/// Output of the data agent: the quote plus, when the request qualifies,
/// a pre-formatted one-line reply enabling the simple short-circuit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataOutput {
    pub data: FinancialData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simple_reply: Option<String>,
}

/// Quote snapshot shared between agents through the state record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialData {
    pub symbol: String,
    pub company_name: String,
    pub price: f64,
    pub change_pct: f64,
    pub volume: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pbr: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roe: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    /// Recent OHLCV history, populated when a downstream agent needs it.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<Candle>,
}

// ---------------------------------------------------------------------------
// Analysis agent
// ---------------------------------------------------------------------------

/// Five-point investment rating scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

impl Rating {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "strong_buy" | "적극_매수" => Some(Self::StrongBuy),
            "buy" | "매수" => Some(Self::Buy),
            "hold" | "중립" | "보유" => Some(Self::Hold),
            "sell" | "매도" => Some(Self::Sell),
            "strong_sell" | "적극_매도" => Some(Self::StrongSell),
            _ => None,
        }
    }

    pub fn korean(&self) -> &'static str {
        match self {
            Self::StrongBuy => "적극 매수",
            Self::Buy => "매수",
            Self::Hold => "중립",
            Self::Sell => "매도",
            Self::StrongSell => "적극 매도",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub rating: Rating,
    pub rationale: String,
    /// Sources consulted (semantic index + news graph), for citation.
    #[serde(default)]
    pub sources: Vec<String>,
    pub disclaimer: String,
}

// ---------------------------------------------------------------------------
// News agent
// ---------------------------------------------------------------------------

/// Where a merged news item originally came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NewsOrigin {
    KnowledgeGraph,
    LiveFeed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub url: String,
    pub summary: String,
    pub origin: NewsOrigin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<chrono::DateTime<chrono::Utc>>,
    pub relevance: f64,
    /// Blended relevance/recency score used for ordering.
    pub score: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewsDigest {
    pub items: Vec<NewsItem>,
}

// ---------------------------------------------------------------------------
// Knowledge agent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeContext {
    pub explanation: String,
    pub hits: Vec<ScoredSnippet>,
}

// ---------------------------------------------------------------------------
// Visualization agent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Line,
    Bar,
    Candlestick,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartArtifact {
    pub kind: ChartKind,
    /// PNG bytes.
    pub png: Vec<u8>,
    pub caption: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AgentError, ErrorKind};

    #[test]
    fn agent_name_round_trip() {
        for name in AgentName::ALL {
            assert_eq!(AgentName::parse(name.as_str()), Some(name));
        }
        assert_eq!(AgentName::parse("Chart"), Some(AgentName::Visualization));
        assert_eq!(AgentName::parse("unknown"), None);
    }

    #[test]
    fn rating_parses_korean_and_english() {
        assert_eq!(Rating::parse("Strong Buy"), Some(Rating::StrongBuy));
        assert_eq!(Rating::parse("매수"), Some(Rating::Buy));
        assert_eq!(Rating::parse("hold"), Some(Rating::Hold));
        assert_eq!(Rating::parse("??"), None);
    }

    #[test]
    fn agent_result_envelope() {
        let ok = AgentResult::success(
            AgentName::News,
            AgentPayload::News(NewsDigest::default()),
            12,
        );
        assert!(ok.success);
        assert!(ok.error.is_none());

        let err = AgentResult::failure(
            AgentName::Data,
            AgentError::new(ErrorKind::SymbolNotFound, "no symbol in query"),
            3,
        );
        assert!(!err.success);
        assert_eq!(err.error.unwrap().kind, ErrorKind::SymbolNotFound);
    }

    #[test]
    fn payload_tagged_by_agent() {
        let payload = AgentPayload::Knowledge(KnowledgeContext {
            explanation: "PER은 주가수익비율입니다.".into(),
            hits: vec![],
        });
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["agent"], "knowledge");
    }
}
