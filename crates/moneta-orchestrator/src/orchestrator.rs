//! Public entry point: builder, graph wiring, and `orchestrate()`.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

use crate::config::OrchestratorConfig;
use crate::context::{Capabilities, NodeCtx};
use crate::error::{BuildError, ErrorKind};
use crate::graph::{
    FlowGraph, CONFIDENCE_CALCULATOR, ERROR_HANDLER, PARALLEL_EXECUTOR, QUERY_ANALYZER,
    RESPONDER, RESULT_COMBINER, SERVICE_PLANNER,
};
use crate::nodes::{
    user_message, ConfidenceCalculator, ErrorHandler, ParallelExecutor, QueryAnalyzer,
    Responder, ResultCombiner, ServicePlanner,
};
use crate::pool::WorkerPool;
use crate::traits::{
    ChartRenderer, LanguageModel, MarketData, NewsFeed, NewsGraph, NoopTracer, NoopTranslator,
    SemanticIndex, SymbolLookup, Tracer, Translator,
};
use crate::types::{ActionType, ChatRequest, ChatResponse, Grade, StateRecord};

// ---------------------------------------------------------------------------
// Routing functions
// ---------------------------------------------------------------------------

/// General intent produces an empty plan; the responder handles it alone.
fn route_after_planner(state: &StateRecord) -> &'static str {
    match &state.plan {
        Some(plan) if !plan.is_empty() => PARALLEL_EXECUTOR,
        _ => RESPONDER,
    }
}

/// The simple-data short-circuit jumps straight to the responder.
fn route_after_executor(state: &StateRecord) -> &'static str {
    if state.short_circuit_active() {
        RESPONDER
    } else {
        RESULT_COMBINER
    }
}

fn build_graph() -> FlowGraph {
    FlowGraph::new(QUERY_ANALYZER)
        .node(Arc::new(QueryAnalyzer))
        .node(Arc::new(ServicePlanner))
        .node(Arc::new(ParallelExecutor::new()))
        .node(Arc::new(ResultCombiner))
        .node(Arc::new(ConfidenceCalculator))
        .node(Arc::new(Responder))
        .node(Arc::new(ErrorHandler))
        .edge(QUERY_ANALYZER, SERVICE_PLANNER)
        .router(SERVICE_PLANNER, route_after_planner)
        .router(PARALLEL_EXECUTOR, route_after_executor)
        .edge(RESULT_COMBINER, CONFIDENCE_CALCULATOR)
        .edge(CONFIDENCE_CALCULATOR, RESPONDER)
        .edge(ERROR_HANDLER, RESPONDER)
        .terminal(RESPONDER)
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assembles an [`Orchestrator`]. All collaborators except the translator
/// and tracer are required.
pub struct OrchestratorBuilder {
    llm: Option<Arc<dyn LanguageModel>>,
    symbols: Option<Arc<dyn SymbolLookup>>,
    market: Option<Arc<dyn MarketData>>,
    index: Option<Arc<dyn SemanticIndex>>,
    news_graph: Option<Arc<dyn NewsGraph>>,
    news_feed: Option<Arc<dyn NewsFeed>>,
    translator: Option<Arc<dyn Translator>>,
    charts: Option<Arc<dyn ChartRenderer>>,
    tracer: Option<Arc<dyn Tracer>>,
    config: OrchestratorConfig,
}

impl OrchestratorBuilder {
    fn new() -> Self {
        Self {
            llm: None,
            symbols: None,
            market: None,
            index: None,
            news_graph: None,
            news_feed: None,
            translator: None,
            charts: None,
            tracer: None,
            config: OrchestratorConfig::default(),
        }
    }

    pub fn language_model(mut self, llm: impl LanguageModel + 'static) -> Self {
        self.llm = Some(Arc::new(llm));
        self
    }

    pub fn language_model_arc(mut self, llm: Arc<dyn LanguageModel>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn symbol_lookup(mut self, symbols: impl SymbolLookup + 'static) -> Self {
        self.symbols = Some(Arc::new(symbols));
        self
    }

    pub fn symbol_lookup_arc(mut self, symbols: Arc<dyn SymbolLookup>) -> Self {
        self.symbols = Some(symbols);
        self
    }

    pub fn market_data(mut self, market: impl MarketData + 'static) -> Self {
        self.market = Some(Arc::new(market));
        self
    }

    pub fn market_data_arc(mut self, market: Arc<dyn MarketData>) -> Self {
        self.market = Some(market);
        self
    }

    pub fn semantic_index(mut self, index: impl SemanticIndex + 'static) -> Self {
        self.index = Some(Arc::new(index));
        self
    }

    pub fn semantic_index_arc(mut self, index: Arc<dyn SemanticIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn news_graph(mut self, graph: impl NewsGraph + 'static) -> Self {
        self.news_graph = Some(Arc::new(graph));
        self
    }

    pub fn news_graph_arc(mut self, graph: Arc<dyn NewsGraph>) -> Self {
        self.news_graph = Some(graph);
        self
    }

    pub fn news_feed(mut self, feed: impl NewsFeed + 'static) -> Self {
        self.news_feed = Some(Arc::new(feed));
        self
    }

    pub fn news_feed_arc(mut self, feed: Arc<dyn NewsFeed>) -> Self {
        self.news_feed = Some(feed);
        self
    }

    /// Optional; defaults to the passthrough translator.
    pub fn translator(mut self, translator: impl Translator + 'static) -> Self {
        self.translator = Some(Arc::new(translator));
        self
    }

    pub fn chart_renderer(mut self, charts: impl ChartRenderer + 'static) -> Self {
        self.charts = Some(Arc::new(charts));
        self
    }

    pub fn chart_renderer_arc(mut self, charts: Arc<dyn ChartRenderer>) -> Self {
        self.charts = Some(charts);
        self
    }

    /// Optional; defaults to the no-op tracer.
    pub fn tracer(mut self, tracer: impl Tracer + 'static) -> Self {
        self.tracer = Some(Arc::new(tracer));
        self
    }

    pub fn tracer_arc(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Orchestrator, BuildError> {
        fn required<T: ?Sized>(
            value: Option<Arc<T>>,
            name: &'static str,
        ) -> Result<Arc<T>, BuildError> {
            value.ok_or(BuildError::MissingCapability { name })
        }

        let caps = Capabilities {
            llm: required(self.llm, "language_model")?,
            symbols: required(self.symbols, "symbol_lookup")?,
            market: required(self.market, "market_data")?,
            index: required(self.index, "semantic_index")?,
            news_graph: required(self.news_graph, "news_graph")?,
            news_feed: required(self.news_feed, "news_feed")?,
            translator: self.translator.unwrap_or_else(|| Arc::new(NoopTranslator)),
            charts: required(self.charts, "chart_renderer")?,
            tracer: self.tracer.unwrap_or_else(|| Arc::new(NoopTracer)),
        };

        Ok(Orchestrator {
            pool: Arc::new(WorkerPool::new(self.config.worker_pool_size)),
            config: Arc::new(self.config),
            caps: Arc::new(caps),
            graph: build_graph(),
        })
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// The engine. One instance serves many concurrent requests; each request
/// owns its state record, while the worker pool and collaborator clients
/// are shared.
pub struct Orchestrator {
    caps: Arc<Capabilities>,
    config: Arc<OrchestratorConfig>,
    pool: Arc<WorkerPool>,
    graph: FlowGraph,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator").finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Answer a request. Always returns a response: failures surface as
    /// `action_type = error` with a user-safe reply.
    pub async fn orchestrate(&self, request: ChatRequest) -> ChatResponse {
        self.orchestrate_with_cancel(request, std::future::pending())
            .await
    }

    /// Like [`orchestrate`](Self::orchestrate), with an external cancel
    /// signal: when `cancel` resolves, all in-flight agent tasks stop
    /// within one collaborator-call quantum.
    pub async fn orchestrate_with_cancel(
        &self,
        request: ChatRequest,
        cancel: impl Future<Output = ()> + Send,
    ) -> ChatResponse {
        let (cancel_tx, cancel_rx) = watch::channel(None);
        let ctx = NodeCtx {
            caps: Arc::clone(&self.caps),
            config: Arc::clone(&self.config),
            pool: Arc::clone(&self.pool),
            cancel: cancel_rx,
        };

        let mut state = StateRecord::new(&request);
        let request_id = state.request_id;
        tracing::info!(
            request_id = %request_id,
            session_id = %state.session_id,
            "request accepted"
        );

        {
            let run = self.graph.run(&mut state, &ctx);
            tokio::pin!(run);
            let deadline = tokio::time::sleep(self.config.request_timeout);
            tokio::pin!(deadline);
            tokio::pin!(cancel);
            let mut deadline_fired = false;
            let mut cancel_fired = false;

            loop {
                tokio::select! {
                    biased;
                    _ = &mut deadline, if !deadline_fired => {
                        deadline_fired = true;
                        tracing::warn!(request_id = %request_id, "request timeout reached");
                        let _ = cancel_tx.send(Some(ErrorKind::Timeout));
                    }
                    _ = &mut cancel, if !cancel_fired => {
                        cancel_fired = true;
                        tracing::info!(request_id = %request_id, "request cancelled upstream");
                        let _ = cancel_tx.send(Some(ErrorKind::Cancelled));
                    }
                    _ = &mut run => break,
                }
            }
        }

        let response = state.response.take().unwrap_or_else(|| ChatResponse {
            reply: user_message(ErrorKind::Internal).to_string(),
            action_type: ActionType::Error,
            action_payload: None,
            chart: None,
            retrieved_documents: Vec::new(),
            confidence: 0.0,
            grade: Grade::F,
        });

        tracing::info!(
            request_id = %state.request_id,
            action = ?response.action_type,
            confidence = response.confidence,
            nodes = state.trace.len(),
            "request finished"
        );
        response
    }
}
