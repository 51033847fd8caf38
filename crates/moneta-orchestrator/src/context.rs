//! Per-request execution context: the capability bundle, configuration,
//! worker pool, and cancellation signal handed to every node and agent.

use std::sync::Arc;

use tokio::sync::watch;

use crate::config::OrchestratorConfig;
use crate::error::ErrorKind;
use crate::pool::WorkerPool;
use crate::traits::{
    ChartRenderer, LanguageModel, MarketData, NewsFeed, NewsGraph, SemanticIndex, SymbolLookup,
    Tracer, Translator,
};

/// All injected collaborators. Built once at orchestrator construction;
/// no static state anywhere in the engine.
pub struct Capabilities {
    pub llm: Arc<dyn LanguageModel>,
    pub symbols: Arc<dyn SymbolLookup>,
    pub market: Arc<dyn MarketData>,
    pub index: Arc<dyn SemanticIndex>,
    pub news_graph: Arc<dyn NewsGraph>,
    pub news_feed: Arc<dyn NewsFeed>,
    pub translator: Arc<dyn Translator>,
    pub charts: Arc<dyn ChartRenderer>,
    pub tracer: Arc<dyn Tracer>,
}

/// Cheap-to-clone context passed to nodes and into spawned agent tasks.
///
/// The cancel channel carries `None` while the request is live and
/// `Some(kind)` (timeout or cancelled) once the request must stop; tasks
/// select on it between collaborator calls.
#[derive(Clone)]
pub struct NodeCtx {
    pub caps: Arc<Capabilities>,
    pub config: Arc<OrchestratorConfig>,
    pub pool: Arc<WorkerPool>,
    pub cancel: watch::Receiver<Option<ErrorKind>>,
}

impl NodeCtx {
    /// The cancellation kind, if the request has been cancelled.
    pub fn cancelled(&self) -> Option<ErrorKind> {
        *self.cancel.borrow()
    }
}
