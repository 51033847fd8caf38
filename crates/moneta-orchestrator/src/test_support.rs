//! Scripted fakes for every collaborator capability.
//!
//! Public (behind the `test-support` feature) so downstream crates can
//! drive the orchestrator deterministically in their own tests.
//!
//! ```ignore
//! let mut harness = TestHarness::with_samsung_quote();
//! harness.script_completion("의도 분류기", r#"{"intent": "data", ...}"#);
//! my_node.run(&mut state, &harness.ctx()).await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;

use crate::config::OrchestratorConfig;
use crate::context::{Capabilities, NodeCtx};
use crate::error::{CapabilityError, ErrorKind};
use crate::pool::WorkerPool;
use crate::traits::{
    Candle, ChartRenderer, CompletionRequest, FeedItem, GraphArticle, LanguageModel, MarketData,
    NewsFeed, NewsGraph, NoopTranslator, Quote, ScoredSnippet, SemanticIndex, Symbol,
    SymbolLookup, Tracer,
};
use crate::types::{ChartKind, TraceEntry};

// ---------------------------------------------------------------------------
// ScriptedLm
// ---------------------------------------------------------------------------

/// Language-model fake that routes on substrings of the system prompt.
/// Unrouted completions fail permanently, which is how tests exercise the
/// deterministic fallbacks.
#[derive(Default)]
pub struct ScriptedLm {
    routes: RwLock<Vec<(String, String)>>,
    embed_fails: RwLock<bool>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(self, marker: &str, response: &str) -> Self {
        self.add_route(marker, response);
        self
    }

    pub fn add_route(&self, marker: &str, response: &str) {
        self.routes
            .write()
            .push((marker.to_string(), response.to_string()));
    }

    pub fn fail_embeddings(&self) {
        *self.embed_fails.write() = true;
    }

    pub fn completion_calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedLm {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CapabilityError> {
        self.calls.lock().push(request.clone());
        let routes = self.routes.read();
        for (marker, response) in routes.iter() {
            if request.system.contains(marker.as_str()) {
                return Ok(response.clone());
            }
        }
        Err(CapabilityError::permanent("no scripted completion"))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, CapabilityError> {
        if *self.embed_fails.read() {
            return Err(CapabilityError::permanent("embeddings disabled"));
        }
        // Deterministic pseudo-embedding derived from the text bytes.
        let mut v = vec![0.0f32; 8];
        for (i, b) in text.bytes().enumerate() {
            v[i % 8] += f32::from(b) / 255.0;
        }
        Ok(v)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// ---------------------------------------------------------------------------
// FakeSymbols
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeSymbols {
    entries: RwLock<HashMap<String, Symbol>>,
}

impl FakeSymbols {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, keyword: &str, code: &str, company_name: &str) -> Self {
        self.entries.write().insert(
            keyword.to_lowercase(),
            Symbol {
                code: code.to_string(),
                company_name: company_name.to_string(),
            },
        );
        self
    }
}

#[async_trait]
impl SymbolLookup for FakeSymbols {
    async fn resolve(&self, text: &str) -> Option<Symbol> {
        let lowered = text.to_lowercase();
        self.entries
            .read()
            .iter()
            .find(|(keyword, _)| lowered.contains(keyword.as_str()))
            .map(|(_, symbol)| symbol.clone())
    }
}

// ---------------------------------------------------------------------------
// FakeMarket
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeMarket {
    quotes: RwLock<HashMap<String, Quote>>,
    histories: RwLock<HashMap<String, Vec<Candle>>>,
    fail_with: RwLock<Option<CapabilityError>>,
}

impl FakeMarket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quote(self, symbol: &str, quote: Quote) -> Self {
        self.quotes.write().insert(symbol.to_string(), quote);
        self
    }

    pub fn with_history(self, symbol: &str, candles: Vec<Candle>) -> Self {
        self.histories.write().insert(symbol.to_string(), candles);
        self
    }

    /// Every subsequent call fails with this error.
    pub fn fail_with(&self, err: CapabilityError) {
        *self.fail_with.write() = Some(err);
    }
}

#[async_trait]
impl MarketData for FakeMarket {
    async fn quote(&self, symbol: &str) -> Result<Quote, CapabilityError> {
        if let Some(err) = self.fail_with.read().clone() {
            return Err(err);
        }
        self.quotes
            .read()
            .get(symbol)
            .cloned()
            .ok_or_else(|| CapabilityError::not_found(symbol))
    }

    async fn history(&self, symbol: &str, days: u32) -> Result<Vec<Candle>, CapabilityError> {
        if let Some(err) = self.fail_with.read().clone() {
            return Err(err);
        }
        Ok(self
            .histories
            .read()
            .get(symbol)
            .map(|candles| {
                let take = candles.len().min(days as usize);
                candles[candles.len() - take..].to_vec()
            })
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// FakeIndex / FakeNewsGraph / FakeFeed
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeIndex {
    snippets: RwLock<Vec<ScoredSnippet>>,
}

impl FakeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, snippets: Vec<ScoredSnippet>) {
        *self.snippets.write() = snippets;
    }
}

#[async_trait]
impl SemanticIndex for FakeIndex {
    async fn search(
        &self,
        _text: &str,
        top_k: usize,
        min_score: f64,
    ) -> Result<Vec<ScoredSnippet>, CapabilityError> {
        Ok(self
            .snippets
            .read()
            .iter()
            .filter(|s| s.score >= min_score)
            .take(top_k)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct FakeNewsGraph {
    articles: RwLock<Vec<GraphArticle>>,
}

impl FakeNewsGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, articles: Vec<GraphArticle>) {
        *self.articles.write() = articles;
    }
}

#[async_trait]
impl NewsGraph for FakeNewsGraph {
    async fn similar(
        &self,
        _embedding: &[f32],
        top_k: usize,
        min_score: f64,
    ) -> Result<Vec<GraphArticle>, CapabilityError> {
        Ok(self
            .articles
            .read()
            .iter()
            .filter(|a| a.relevance >= min_score)
            .take(top_k)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct FakeFeed {
    items: RwLock<Vec<FeedItem>>,
    delay: RwLock<Option<Duration>>,
}

impl FakeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, items: Vec<FeedItem>) {
        *self.items.write() = items;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.write() = Some(delay);
    }
}

#[async_trait]
impl NewsFeed for FakeFeed {
    async fn fetch(&self, _keywords: &str, limit: usize) -> Result<Vec<FeedItem>, CapabilityError> {
        let delay = *self.delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.items.read().iter().take(limit).cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// FakeRenderer / CapturingTracer
// ---------------------------------------------------------------------------

/// Minimal PNG signature so renderer output is recognizable in asserts.
pub const FAKE_PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Default)]
pub struct FakeRenderer {
    fail: RwLock<bool>,
}

impl FakeRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_rendering(&self) {
        *self.fail.write() = true;
    }
}

#[async_trait]
impl ChartRenderer for FakeRenderer {
    async fn render(
        &self,
        _series: &[Candle],
        _kind: ChartKind,
    ) -> Result<Vec<u8>, CapabilityError> {
        if *self.fail.read() {
            return Err(CapabilityError::permanent("render backend down"));
        }
        Ok(FAKE_PNG.to_vec())
    }
}

#[derive(Default)]
pub struct CapturingTracer {
    spans: Mutex<Vec<TraceEntry>>,
}

impl CapturingTracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> Vec<String> {
        self.spans.lock().iter().map(|s| s.node.clone()).collect()
    }
}

impl Tracer for CapturingTracer {
    fn emit(&self, span: &TraceEntry) {
        self.spans.lock().push(span.clone());
    }
}

// ---------------------------------------------------------------------------
// TestHarness
// ---------------------------------------------------------------------------

/// Bundles one of each fake plus config and the cancel channel, and builds
/// `NodeCtx` values for node-level tests.
pub struct TestHarness {
    pub llm: Arc<ScriptedLm>,
    pub symbols: Arc<FakeSymbols>,
    pub market: Arc<FakeMarket>,
    pub index: Arc<FakeIndex>,
    pub news_graph: Arc<FakeNewsGraph>,
    pub news_feed: Arc<FakeFeed>,
    pub renderer: Arc<FakeRenderer>,
    pub tracer: Arc<CapturingTracer>,
    pub config: OrchestratorConfig,
    cancel_tx: Arc<watch::Sender<Option<ErrorKind>>>,
    cancel_rx: watch::Receiver<Option<ErrorKind>>,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    pub fn new() -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(None);
        Self {
            llm: Arc::new(ScriptedLm::new()),
            symbols: Arc::new(FakeSymbols::new()),
            market: Arc::new(FakeMarket::new()),
            index: Arc::new(FakeIndex::new()),
            news_graph: Arc::new(FakeNewsGraph::new()),
            news_feed: Arc::new(FakeFeed::new()),
            renderer: Arc::new(FakeRenderer::new()),
            tracer: Arc::new(CapturingTracer::new()),
            config: OrchestratorConfig::default(),
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
        }
    }

    /// Harness preloaded with the Samsung Electronics quote used across
    /// the scenario tests.
    pub fn with_samsung_quote() -> Self {
        let harness = Self::new();
        harness.symbols.entries.write().insert(
            "삼성전자".into(),
            Symbol {
                code: "005930.KS".into(),
                company_name: "삼성전자".into(),
            },
        );
        harness.symbols.entries.write().insert(
            "samsung".into(),
            Symbol {
                code: "005930.KS".into(),
                company_name: "삼성전자".into(),
            },
        );
        harness.market.quotes.write().insert(
            "005930.KS".into(),
            Quote {
                price: 71_500.0,
                change_pct: 2.1,
                volume: 12_345_678,
                per: Some(13.2),
                pbr: Some(1.4),
                roe: Some(9.8),
                market_cap: Some(4.2e14),
                sector: Some("Technology".into()),
            },
        );
        harness.market.histories.write().insert(
            "005930.KS".into(),
            (0..30)
                .map(|i| Candle {
                    date: Utc::now() - ChronoDuration::days(30 - i),
                    open: 69_000.0 + (i as f64) * 80.0,
                    high: 70_000.0 + (i as f64) * 80.0,
                    low: 68_500.0 + (i as f64) * 80.0,
                    close: 69_500.0 + (i as f64) * 80.0,
                    volume: 10_000_000,
                })
                .collect(),
        );
        harness
    }

    pub fn ctx(&self) -> NodeCtx {
        NodeCtx {
            caps: Arc::new(Capabilities {
                llm: Arc::clone(&self.llm) as Arc<dyn LanguageModel>,
                symbols: Arc::clone(&self.symbols) as Arc<dyn SymbolLookup>,
                market: Arc::clone(&self.market) as Arc<dyn MarketData>,
                index: Arc::clone(&self.index) as Arc<dyn SemanticIndex>,
                news_graph: Arc::clone(&self.news_graph) as Arc<dyn NewsGraph>,
                news_feed: Arc::clone(&self.news_feed) as Arc<dyn NewsFeed>,
                translator: Arc::new(NoopTranslator),
                charts: Arc::clone(&self.renderer) as Arc<dyn ChartRenderer>,
                tracer: Arc::clone(&self.tracer) as Arc<dyn Tracer>,
            }),
            config: Arc::new(self.config.clone()),
            pool: Arc::new(WorkerPool::new(self.config.worker_pool_size)),
            cancel: self.cancel_rx.clone(),
        }
    }

    pub fn cancel(&self, kind: ErrorKind) {
        let _ = self.cancel_tx.send(Some(kind));
    }

    pub fn cancel_sender(&self) -> Arc<watch::Sender<Option<ErrorKind>>> {
        Arc::clone(&self.cancel_tx)
    }

    pub fn script_completion(&mut self, marker: &str, response: &str) {
        self.llm.add_route(marker, response);
    }

    pub fn set_index_snippets(&mut self, snippets: Vec<ScoredSnippet>) {
        self.index.set(snippets);
    }

    pub fn set_feed_delay(&mut self, delay: Duration) {
        self.news_feed.set_delay(delay);
    }
}
