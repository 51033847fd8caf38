//! Collaborator capability interfaces.
//!
//! Every external dependency of the orchestrator is defined as a narrow
//! async trait and injected as `Arc<dyn …>` through the capability bundle
//! at request entry. Nodes perform no external I/O outside these traits,
//! which is what makes the whole engine testable with scripted fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CapabilityError;
use crate::types::{ChartKind, TraceEntry};

// ---------------------------------------------------------------------------
// LanguageModel
// ---------------------------------------------------------------------------

/// A chat completion request. All prompting in the engine goes through this
/// one shape so fakes can route on the system prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: 0.1,
            max_tokens: 1024,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// The language-model capability: chat completion plus text embedding (the
/// news knowledge graph is queried by embedding similarity).
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CapabilityError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, CapabilityError>;

    /// Provider name for diagnostics.
    fn name(&self) -> &str {
        "lm"
    }
}

// ---------------------------------------------------------------------------
// SymbolLookup
// ---------------------------------------------------------------------------

/// A resolved ticker symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    /// Exchange-qualified code, e.g. `005930.KS`.
    pub code: String,
    pub company_name: String,
}

/// Free-text to ticker-symbol resolution. Misses are not errors.
#[async_trait]
pub trait SymbolLookup: Send + Sync {
    async fn resolve(&self, text: &str) -> Option<Symbol>;
}

// ---------------------------------------------------------------------------
// MarketData
// ---------------------------------------------------------------------------

/// A real-time quote with valuation ratios.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
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
}

/// One OHLCV bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub date: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

#[async_trait]
pub trait MarketData: Send + Sync {
    /// `CapabilityError::NotFound` when the symbol has no quote.
    async fn quote(&self, symbol: &str) -> Result<Quote, CapabilityError>;

    /// Recent daily OHLCV history, newest last.
    async fn history(&self, symbol: &str, days: u32) -> Result<Vec<Candle>, CapabilityError>;
}

// ---------------------------------------------------------------------------
// SemanticIndex
// ---------------------------------------------------------------------------

/// A scored retrieval hit. Also the wire shape of
/// [`ChatResponse::retrieved_documents`](crate::types::ChatResponse).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredSnippet {
    pub source: String,
    pub score: f64,
    pub snippet: String,
}

#[async_trait]
pub trait SemanticIndex: Send + Sync {
    async fn search(
        &self,
        text: &str,
        top_k: usize,
        min_score: f64,
    ) -> Result<Vec<ScoredSnippet>, CapabilityError>;
}

// ---------------------------------------------------------------------------
// NewsGraph
// ---------------------------------------------------------------------------

/// An article retrieved from the news knowledge graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphArticle {
    pub title: String,
    pub url: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    /// Embedding similarity in `[0, 1]`.
    pub relevance: f64,
}

#[async_trait]
pub trait NewsGraph: Send + Sync {
    async fn similar(
        &self,
        embedding: &[f32],
        top_k: usize,
        min_score: f64,
    ) -> Result<Vec<GraphArticle>, CapabilityError>;
}

// ---------------------------------------------------------------------------
// NewsFeed
// ---------------------------------------------------------------------------

/// A raw article from the real-time feed, possibly untranslated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedItem {
    pub title: String,
    pub url: String,
    pub body: String,
    /// ISO 639-1 language code of title/body.
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait NewsFeed: Send + Sync {
    async fn fetch(&self, keywords: &str, limit: usize) -> Result<Vec<FeedItem>, CapabilityError>;
}

// ---------------------------------------------------------------------------
// Translator
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String, CapabilityError>;
}

/// Passthrough translator, the default when none is injected.
pub struct NoopTranslator;

#[async_trait]
impl Translator for NoopTranslator {
    async fn translate(&self, text: &str, _target_lang: &str) -> Result<String, CapabilityError> {
        Ok(text.to_string())
    }
}

// ---------------------------------------------------------------------------
// ChartRenderer
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ChartRenderer: Send + Sync {
    /// Render an OHLCV series to PNG bytes.
    async fn render(&self, series: &[Candle], kind: ChartKind) -> Result<Vec<u8>, CapabilityError>;
}

// ---------------------------------------------------------------------------
// Tracer
// ---------------------------------------------------------------------------

/// Where node spans go. Synchronous and infallible: implementations must
/// never block the runtime or panic.
pub trait Tracer: Send + Sync {
    fn emit(&self, span: &TraceEntry);
}

/// Discards all spans.
pub struct NoopTracer;

impl Tracer for NoopTracer {
    fn emit(&self, _span: &TraceEntry) {}
}

/// Forwards spans to the `tracing` subscriber.
pub struct LogTracer;

impl Tracer for LogTracer {
    fn emit(&self, span: &TraceEntry) {
        tracing::debug!(
            node = %span.node,
            elapsed_ms = span.elapsed_ms,
            outcome = ?span.outcome,
            "node span"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TraceOutcome;

    #[test]
    fn completion_request_builder() {
        let req = CompletionRequest::new("sys", "user")
            .temperature(0.7)
            .max_tokens(256);
        assert_eq!(req.temperature, 0.7);
        assert_eq!(req.max_tokens, 256);
    }

    #[test]
    fn noop_tracer_accepts_spans() {
        let now = Utc::now();
        NoopTracer.emit(&TraceEntry {
            node: "query_analyzer".into(),
            started_at: now,
            ended_at: now,
            elapsed_ms: 0,
            outcome: TraceOutcome::Ok,
        });
    }

    #[tokio::test]
    async fn noop_translator_is_identity() {
        let out = NoopTranslator.translate("그대로", "ko").await.unwrap();
        assert_eq!(out, "그대로");
    }
}
