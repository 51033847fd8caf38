//! Parallel executor: runs plan stages with bounded concurrency, per-agent
//! deadlines, cooperative cancellation, and partial-failure tolerance.
//!
//! Each agent in a stage becomes a tokio task that first takes a worker
//! pool slot (FIFO when saturated), then races its work against the
//! agent's deadline and the request cancel signal. The stage completes
//! when every task has produced an `AgentResult`; a failed agent only
//! aborts the request when the intent marks it required.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::watch;

use crate::agents::{
    Agent, AnalysisAgent, DataAgent, KnowledgeAgent, NewsAgent, VisualizationAgent,
};
use crate::context::NodeCtx;
use crate::error::{AgentError, ErrorKind};
use crate::graph::{GraphNode, PARALLEL_EXECUTOR};
use crate::types::{AgentName, AgentResult, StateRecord, StateSnapshot};

type AgentFuture = Pin<Box<dyn Future<Output = AgentResult> + Send>>;

pub struct ParallelExecutor {
    agents: HashMap<AgentName, Arc<dyn Agent>>,
}

impl ParallelExecutor {
    pub fn new() -> Self {
        let mut agents: HashMap<AgentName, Arc<dyn Agent>> = HashMap::new();
        agents.insert(AgentName::Data, Arc::new(DataAgent));
        agents.insert(AgentName::Analysis, Arc::new(AnalysisAgent));
        agents.insert(AgentName::News, Arc::new(NewsAgent));
        agents.insert(AgentName::Knowledge, Arc::new(KnowledgeAgent));
        agents.insert(AgentName::Visualization, Arc::new(VisualizationAgent));
        Self { agents }
    }
}

impl Default for ParallelExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphNode for ParallelExecutor {
    fn name(&self) -> &'static str {
        PARALLEL_EXECUTOR
    }

    async fn run(&self, state: &mut StateRecord, ctx: &NodeCtx) -> Result<(), AgentError> {
        let Some(plan) = state.plan.clone() else {
            return Ok(());
        };
        if plan.is_empty() {
            return Ok(());
        }

        let required: Vec<AgentName> = state
            .analysis
            .as_ref()
            .map(|a| a.primary_intent.required_agents().to_vec())
            .unwrap_or_default();

        for (stage_index, stage) in plan.stages.iter().enumerate() {
            if let Some(kind) = ctx.cancelled() {
                state.record_error(kind, PARALLEL_EXECUTOR, "cancelled between stages", false);
                return Ok(());
            }

            tracing::debug!(stage = stage_index, agents = ?stage.agents, "stage started");
            let snapshot = Arc::new(state.snapshot());
            let mut running: FuturesUnordered<AgentFuture> = FuturesUnordered::new();

            for &agent_name in &stage.agents {
                // Insert-once: a name already present is never re-run.
                if state.agent_results.contains_key(&agent_name) {
                    continue;
                }
                let Some(agent) = self.agents.get(&agent_name) else {
                    state.record_agent_result(AgentResult::failure(
                        agent_name,
                        AgentError::internal("no agent registered for this name"),
                        0,
                    ));
                    continue;
                };
                running.push(spawn_agent(
                    Arc::clone(agent),
                    agent_name,
                    state.query.clone(),
                    Arc::clone(&snapshot),
                    ctx.clone(),
                ));
            }

            // Ordering within the stage is indeterminate by design.
            while let Some(result) = running.next().await {
                tracing::debug!(
                    agent = %result.agent,
                    success = result.success,
                    elapsed_ms = result.elapsed_ms,
                    "agent finished"
                );
                state.record_agent_result(result);
            }

            if let Some(kind) = ctx.cancelled() {
                state.record_error(kind, PARALLEL_EXECUTOR, "cancelled during stage", false);
                return Ok(());
            }

            for name in &required {
                if let Some(result) = state.agent_results.get(name) {
                    if !result.success {
                        let detail = result
                            .error
                            .as_ref()
                            .map(|e| e.message.clone())
                            .unwrap_or_default();
                        state.record_error(
                            ErrorKind::RequiredAgentFailed,
                            PARALLEL_EXECUTOR,
                            format!("required agent '{name}' failed: {detail}"),
                            false,
                        );
                        return Ok(());
                    }
                }
            }

            if state.short_circuit_active() {
                tracing::info!("simple short-circuit active, skipping remaining stages");
                break;
            }
        }

        Ok(())
    }
}

/// Run one agent as a task: pool slot first, then the work itself, both
/// raced against the agent deadline and the request cancel signal.
fn spawn_agent(
    agent: Arc<dyn Agent>,
    name: AgentName,
    query: String,
    snapshot: Arc<StateSnapshot>,
    ctx: NodeCtx,
) -> AgentFuture {
    let handle = tokio::spawn(async move {
        let start = Instant::now();
        let timeout = ctx.config.agent_timeout(name);
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        let mut cancel = ctx.cancel.clone();

        // Queueing for a pool slot counts against the agent's deadline.
        let permit = tokio::select! {
            biased;
            kind = wait_cancelled(&mut cancel) => return cancelled_result(name, kind, start),
            _ = &mut deadline => return timeout_result(name, timeout, start),
            permit = ctx.pool.acquire() => permit,
        };
        let _permit = match permit {
            Ok(permit) => permit,
            Err(_) => {
                return AgentResult::failure(
                    name,
                    AgentError::internal("worker pool closed"),
                    elapsed_ms(start),
                )
            }
        };

        let work = agent.process(&query, &snapshot, &ctx);
        tokio::pin!(work);
        tokio::select! {
            biased;
            kind = wait_cancelled(&mut cancel) => cancelled_result(name, kind, start),
            _ = &mut deadline => timeout_result(name, timeout, start),
            result = &mut work => match result {
                Ok(payload) => AgentResult::success(name, payload, elapsed_ms(start)),
                Err(error) => {
                    tracing::warn!(agent = %name, error = %error, "agent failed");
                    AgentResult::failure(name, error, elapsed_ms(start))
                }
            },
        }
    });

    Box::pin(async move {
        match handle.await {
            Ok(result) => result,
            Err(err) => AgentResult::failure(
                name,
                AgentError::internal(format!("agent task panicked: {err}")),
                0,
            ),
        }
    })
}

async fn wait_cancelled(rx: &mut watch::Receiver<Option<ErrorKind>>) -> ErrorKind {
    loop {
        let current = *rx.borrow();
        if let Some(kind) = current {
            return kind;
        }
        if rx.changed().await.is_err() {
            return ErrorKind::Cancelled;
        }
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

fn cancelled_result(name: AgentName, kind: ErrorKind, start: Instant) -> AgentResult {
    AgentResult::failure(
        name,
        AgentError::new(kind, "cancelled before completion"),
        elapsed_ms(start),
    )
}

fn timeout_result(name: AgentName, timeout: Duration, start: Instant) -> AgentResult {
    AgentResult::failure(
        name,
        AgentError::new(
            ErrorKind::Timeout,
            format!("deadline of {} ms elapsed", timeout.as_millis()),
        ),
        elapsed_ms(start),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestHarness;
    use crate::traits::ScoredSnippet;
    use crate::types::{
        ChatRequest, Complexity, ExecutionPlan, Intent, PlanMode, QueryAnalysis, Stage,
    };

    fn state_with_plan(
        query: &str,
        intent: Intent,
        agents: Vec<AgentName>,
        stages: Vec<Stage>,
    ) -> StateRecord {
        let mut state = StateRecord::new(&ChatRequest::new(query, "s", "u"));
        state.analysis = Some(QueryAnalysis {
            primary_intent: intent,
            complexity: Complexity::Moderate,
            next_agent: agents.first().copied(),
            required_agents: agents,
            confidence: 0.9,
            is_investment: false,
        });
        state.plan = Some(ExecutionPlan {
            mode: PlanMode::Hybrid,
            stages,
            estimated_ms: 0,
        });
        state
    }

    #[tokio::test]
    async fn stage_collects_all_results() {
        let mut harness = TestHarness::new();
        harness.set_index_snippets(vec![ScoredSnippet {
            source: "glossary".into(),
            score: 0.8,
            snippet: "PER 설명".into(),
        }]);
        let mut state = state_with_plan(
            "반도체 뉴스하고 PER 설명",
            Intent::News,
            vec![AgentName::News, AgentName::Knowledge],
            vec![Stage::of([AgentName::News, AgentName::Knowledge])],
        );

        ParallelExecutor::new()
            .run(&mut state, &harness.ctx())
            .await
            .unwrap();

        assert_eq!(state.agent_results.len(), 2);
        assert!(state.agent_results[&AgentName::News].success);
        assert!(state.agent_results[&AgentName::Knowledge].success);
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn non_required_failure_does_not_abort() {
        let harness = TestHarness::new();
        // Knowledge has no snippets scripted, so it fails with no_context.
        let mut state = state_with_plan(
            "용어 설명",
            Intent::News,
            vec![AgentName::News, AgentName::Knowledge],
            vec![Stage::of([AgentName::News, AgentName::Knowledge])],
        );

        ParallelExecutor::new()
            .run(&mut state, &harness.ctx())
            .await
            .unwrap();

        let knowledge = &state.agent_results[&AgentName::Knowledge];
        assert!(!knowledge.success);
        assert_eq!(
            knowledge.error.as_ref().unwrap().kind,
            ErrorKind::NoContext
        );
        assert!(state.error.is_none(), "stage must absorb the failure");
    }

    #[tokio::test]
    async fn required_failure_sets_fatal_error() {
        let harness = TestHarness::new(); // no quotes scripted → symbol_not_found
        let mut state = state_with_plan(
            "삼성전자 주가",
            Intent::Data,
            vec![AgentName::Data],
            vec![Stage::of([AgentName::Data])],
        );

        ParallelExecutor::new()
            .run(&mut state, &harness.ctx())
            .await
            .unwrap();

        let err = state.error.as_ref().expect("fatal error expected");
        assert_eq!(err.kind, ErrorKind::RequiredAgentFailed);
        assert!(!err.recoverable);
    }

    #[tokio::test]
    async fn slow_agent_times_out() {
        let mut harness = TestHarness::new();
        harness.set_feed_delay(Duration::from_millis(500));
        harness.config.agent_timeouts.insert(AgentName::News, Duration::from_millis(50));
        let mut state = state_with_plan(
            "뉴스 알려줘",
            Intent::News,
            vec![AgentName::News],
            vec![Stage::of([AgentName::News])],
        );

        ParallelExecutor::new()
            .run(&mut state, &harness.ctx())
            .await
            .unwrap();

        let news = &state.agent_results[&AgentName::News];
        assert!(!news.success);
        assert_eq!(news.error.as_ref().unwrap().kind, ErrorKind::Timeout);
        assert!(state.error.is_none(), "news is not required for news intent");
    }

    #[tokio::test]
    async fn cancellation_marks_results_and_state() {
        let mut harness = TestHarness::new();
        harness.set_feed_delay(Duration::from_millis(500));
        let mut state = state_with_plan(
            "뉴스 알려줘",
            Intent::News,
            vec![AgentName::News],
            vec![Stage::of([AgentName::News])],
        );

        let executor = ParallelExecutor::new();
        let ctx = harness.ctx();
        let cancel_handle = {
            let harness_cancel = harness.cancel_sender();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                let _ = harness_cancel.send(Some(ErrorKind::Cancelled));
            })
        };

        executor.run(&mut state, &ctx).await.unwrap();
        cancel_handle.await.unwrap();

        let news = &state.agent_results[&AgentName::News];
        assert_eq!(news.error.as_ref().unwrap().kind, ErrorKind::Cancelled);
        assert_eq!(state.error.as_ref().unwrap().kind, ErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn later_stage_sees_earlier_results() {
        let harness = TestHarness::with_samsung_quote();
        let mut state = state_with_plan(
            "삼성전자 분석",
            Intent::Analysis,
            vec![AgentName::Data, AgentName::Analysis],
            vec![
                Stage::of([AgentName::Data]),
                Stage::of([AgentName::Analysis]),
            ],
        );

        ParallelExecutor::new()
            .run(&mut state, &harness.ctx())
            .await
            .unwrap();

        assert!(state.agent_results[&AgentName::Data].success);
        let analysis = &state.agent_results[&AgentName::Analysis];
        assert!(analysis.success, "error: {:?}", analysis.error);
        assert!(state.analysis_result.is_some());
    }
}
