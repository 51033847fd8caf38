//! Moneta orchestrator — graph-based multi-agent orchestration for
//! natural-language financial questions.
//!
//! A request flows through a fixed graph of meta-nodes: the query analyzer
//! classifies intent and complexity, the planner turns that into a staged
//! schedule, the parallel executor runs worker agents with bounded
//! concurrency and per-agent deadlines, and the combiner, confidence
//! calculator, and responder fuse the surviving results into one scored
//! reply. Every external dependency — language model, market data,
//! retrieval, news, charts, tracing — is a narrow injected capability, so
//! the whole engine runs deterministically against scripted fakes.
//!
//! The crate is a library with no web-server, database, or process-global
//! state; embed it and call [`Orchestrator::orchestrate`].

pub mod agents;
pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod nodes;
pub mod orchestrator;
pub(crate) mod parse;
pub mod pool;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod traits;
pub mod types;

// Re-export the public surface at the crate level.

pub use config::OrchestratorConfig;
pub use context::{Capabilities, NodeCtx};
pub use error::{AgentError, BuildError, CapabilityError, ErrorKind};
pub use graph::{FlowGraph, GraphNode};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use pool::WorkerPool;
pub use traits::{
    Candle, ChartRenderer, CompletionRequest, FeedItem, GraphArticle, LanguageModel, LogTracer,
    MarketData, NewsFeed, NewsGraph, NoopTracer, NoopTranslator, Quote, ScoredSnippet,
    SemanticIndex, Symbol, SymbolLookup, Tracer, Translator,
};
pub use types::{
    ActionType, AgentName, AgentPayload, AgentResult, AnalysisReport, ChartArtifact, ChartKind,
    ChatRequest, ChatResponse, CombinedReply, Complexity, ConfidenceReport, DataOutput,
    ExecutionPlan, FinancialData, Grade, Intent, KnowledgeContext, NewsDigest, NewsItem,
    NewsOrigin, PlanMode, QueryAnalysis, Rating, Stage, StateRecord, StateSnapshot, SubScores,
    TraceEntry, TraceOutcome,
};
