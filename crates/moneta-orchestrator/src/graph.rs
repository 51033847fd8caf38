//! Graph runtime — drives the state record through nodes.
//!
//! The graph is a node table plus unconditional edges plus per-node routing
//! functions. Execution is a single loop: invoke the current node, append
//! its trace entry, then pick the next node. Any node failure (or a fresh
//! unrecoverable error written into the state) diverts to the error
//! handler; a hop counter guards against accidental cycles.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::context::NodeCtx;
use crate::error::{AgentError, ErrorKind};
use crate::types::{StateRecord, TraceEntry, TraceOutcome};

// ---------------------------------------------------------------------------
// Node names
// ---------------------------------------------------------------------------

pub const QUERY_ANALYZER: &str = "query_analyzer";
pub const SERVICE_PLANNER: &str = "service_planner";
pub const PARALLEL_EXECUTOR: &str = "parallel_executor";
pub const RESULT_COMBINER: &str = "result_combiner";
pub const CONFIDENCE_CALCULATOR: &str = "confidence_calculator";
pub const RESPONDER: &str = "responder";
pub const ERROR_HANDLER: &str = "error_handler";

// ---------------------------------------------------------------------------
// Node trait
// ---------------------------------------------------------------------------

/// A meta-node in the orchestration graph. Nodes read their inputs from the
/// state record and write their outputs back; the runtime owns the trace.
#[async_trait]
pub trait GraphNode: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, state: &mut StateRecord, ctx: &NodeCtx) -> Result<(), AgentError>;
}

/// Dynamic routing: given the state after a node ran, pick the next node.
pub type RouterFn = fn(&StateRecord) -> &'static str;

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

pub struct FlowGraph {
    nodes: HashMap<&'static str, Arc<dyn GraphNode>>,
    edges: HashMap<&'static str, &'static str>,
    routers: HashMap<&'static str, RouterFn>,
    entry: &'static str,
    terminals: HashSet<&'static str>,
}

impl FlowGraph {
    pub fn new(entry: &'static str) -> Self {
        Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            routers: HashMap::new(),
            entry,
            terminals: HashSet::new(),
        }
    }

    pub fn node(mut self, node: Arc<dyn GraphNode>) -> Self {
        self.nodes.insert(node.name(), node);
        self
    }

    pub fn edge(mut self, from: &'static str, to: &'static str) -> Self {
        self.edges.insert(from, to);
        self
    }

    pub fn router(mut self, from: &'static str, route: RouterFn) -> Self {
        self.routers.insert(from, route);
        self
    }

    pub fn terminal(mut self, name: &'static str) -> Self {
        self.terminals.insert(name);
        self
    }

    /// Run the state record through the graph until a terminal node
    /// completes or the error path is exhausted.
    pub async fn run(&self, state: &mut StateRecord, ctx: &NodeCtx) {
        let mut current = self.entry;
        let mut hops = 0u32;
        // Once diverted, only error_handler and responder may run.
        let mut diverted = false;

        loop {
            hops += 1;
            // The error path is two fixed hops, so the guard only needs to
            // watch the normal path.
            if !diverted && hops > ctx.config.max_graph_hops {
                tracing::error!(node = current, hops, "max graph hops exceeded");
                state.record_error(
                    ErrorKind::Internal,
                    current,
                    "max graph hops exceeded",
                    false,
                );
                diverted = true;
                current = ERROR_HANDLER;
            }

            // Cancellation check between nodes; the error path is allowed
            // to finish so the caller still gets a packed response.
            if !diverted {
                if let Some(kind) = ctx.cancelled() {
                    let message = if kind == ErrorKind::Timeout {
                        "request deadline reached"
                    } else {
                        "request cancelled"
                    };
                    state.record_error(kind, current, message, false);
                    diverted = true;
                    current = ERROR_HANDLER;
                }
            }

            let Some(node) = self.nodes.get(current) else {
                state.record_error(
                    ErrorKind::Internal,
                    current,
                    format!("no node registered for '{current}'"),
                    false,
                );
                if diverted {
                    break;
                }
                diverted = true;
                current = ERROR_HANDLER;
                continue;
            };

            let started_at = Utc::now();
            let start = std::time::Instant::now();
            let result = node.run(state, ctx).await;

            let entry = TraceEntry {
                node: current.to_string(),
                started_at,
                ended_at: Utc::now(),
                elapsed_ms: start.elapsed().as_millis() as u64,
                outcome: if result.is_ok() {
                    TraceOutcome::Ok
                } else {
                    TraceOutcome::Error
                },
            };
            ctx.caps.tracer.emit(&entry);
            state.trace.push(entry);

            match result {
                Err(err) => {
                    tracing::warn!(node = current, error = %err, "node failed");
                    state.record_error(err.kind, current, err.message, false);
                    current = match current {
                        RESPONDER => break,
                        ERROR_HANDLER => RESPONDER,
                        _ => {
                            if diverted {
                                RESPONDER
                            } else {
                                diverted = true;
                                ERROR_HANDLER
                            }
                        }
                    };
                }
                Ok(()) => {
                    if self.terminals.contains(current) {
                        break;
                    }
                    if !diverted && state.has_fatal_error() {
                        diverted = true;
                        current = ERROR_HANDLER;
                        continue;
                    }
                    current = if let Some(route) = self.routers.get(current) {
                        route(state)
                    } else if let Some(next) = self.edges.get(current) {
                        *next
                    } else {
                        tracing::error!(node = current, "node has no outgoing edge");
                        break;
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestHarness;
    use crate::types::ChatRequest;

    struct TagNode {
        name: &'static str,
    }

    #[async_trait]
    impl GraphNode for TagNode {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn run(&self, _state: &mut StateRecord, _ctx: &NodeCtx) -> Result<(), AgentError> {
            Ok(())
        }
    }

    struct FailNode;

    #[async_trait]
    impl GraphNode for FailNode {
        fn name(&self) -> &'static str {
            "fail"
        }

        async fn run(&self, _state: &mut StateRecord, _ctx: &NodeCtx) -> Result<(), AgentError> {
            Err(AgentError::internal("boom"))
        }
    }

    fn state() -> StateRecord {
        StateRecord::new(&ChatRequest::new("q", "s", "u"))
    }

    fn traced(state: &StateRecord) -> Vec<&str> {
        state.trace.iter().map(|t| t.node.as_str()).collect()
    }

    #[tokio::test]
    async fn linear_run_halts_at_terminal() {
        let graph = FlowGraph::new("a")
            .node(Arc::new(TagNode { name: "a" }))
            .node(Arc::new(TagNode { name: "b" }))
            .node(Arc::new(TagNode { name: RESPONDER }))
            .edge("a", "b")
            .edge("b", RESPONDER)
            .terminal(RESPONDER);

        let harness = TestHarness::new();
        let mut state = state();
        graph.run(&mut state, &harness.ctx()).await;

        assert_eq!(traced(&state), vec!["a", "b", RESPONDER]);
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn failure_diverts_to_error_handler() {
        let graph = FlowGraph::new("fail")
            .node(Arc::new(FailNode))
            .node(Arc::new(TagNode {
                name: ERROR_HANDLER,
            }))
            .node(Arc::new(TagNode { name: RESPONDER }))
            .edge(ERROR_HANDLER, RESPONDER)
            .terminal(RESPONDER);

        let harness = TestHarness::new();
        let mut state = state();
        graph.run(&mut state, &harness.ctx()).await;

        assert_eq!(traced(&state), vec!["fail", ERROR_HANDLER, RESPONDER]);
        let err = state.error.as_ref().unwrap();
        assert_eq!(err.kind, ErrorKind::Internal);
        assert_eq!(err.node, "fail");
    }

    #[tokio::test]
    async fn routing_function_wins_over_edge() {
        fn route(_: &StateRecord) -> &'static str {
            RESPONDER
        }

        let graph = FlowGraph::new("a")
            .node(Arc::new(TagNode { name: "a" }))
            .node(Arc::new(TagNode { name: "b" }))
            .node(Arc::new(TagNode { name: RESPONDER }))
            .router("a", route)
            .edge("a", "b")
            .terminal(RESPONDER);

        let harness = TestHarness::new();
        let mut state = state();
        graph.run(&mut state, &harness.ctx()).await;

        assert_eq!(traced(&state), vec!["a", RESPONDER]);
    }

    #[tokio::test]
    async fn hop_guard_catches_cycles() {
        let graph = FlowGraph::new("a")
            .node(Arc::new(TagNode { name: "a" }))
            .node(Arc::new(TagNode { name: "b" }))
            .node(Arc::new(TagNode {
                name: ERROR_HANDLER,
            }))
            .node(Arc::new(TagNode { name: RESPONDER }))
            .edge("a", "b")
            .edge("b", "a")
            .edge(ERROR_HANDLER, RESPONDER)
            .terminal(RESPONDER);

        let harness = TestHarness::new();
        let mut state = state();
        graph.run(&mut state, &harness.ctx()).await;

        let err = state.error.as_ref().unwrap();
        assert_eq!(err.kind, ErrorKind::Internal);
        assert!(err.message.contains("hops"));
        // Error path still ran to completion.
        assert_eq!(state.trace.last().unwrap().node, RESPONDER);
    }

    #[tokio::test]
    async fn cancellation_between_nodes_diverts() {
        let graph = FlowGraph::new("a")
            .node(Arc::new(TagNode { name: "a" }))
            .node(Arc::new(TagNode { name: "b" }))
            .node(Arc::new(TagNode {
                name: ERROR_HANDLER,
            }))
            .node(Arc::new(TagNode { name: RESPONDER }))
            .edge("a", "b")
            .edge("b", RESPONDER)
            .edge(ERROR_HANDLER, RESPONDER)
            .terminal(RESPONDER);

        let harness = TestHarness::new();
        harness.cancel(ErrorKind::Cancelled);
        let mut state = state();
        graph.run(&mut state, &harness.ctx()).await;

        assert_eq!(state.error.as_ref().unwrap().kind, ErrorKind::Cancelled);
        assert_eq!(traced(&state), vec![ERROR_HANDLER, RESPONDER]);
    }
}
