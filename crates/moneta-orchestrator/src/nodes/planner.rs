//! Service planner: turns the analysis into a stage schedule.
//!
//! Stage construction honors the independence invariants: `analysis` and
//! `visualization` consume `financial_data`, so they never share a stage
//! with `data`; `news` and `knowledge` are mutually independent and run
//! side by side.

use async_trait::async_trait;

use crate::context::NodeCtx;
use crate::error::AgentError;
use crate::graph::{GraphNode, SERVICE_PLANNER};
use crate::types::{
    AgentName, ExecutionPlan, PlanMode, QueryAnalysis, Stage, StateRecord,
};

/// Static per-agent duration estimates in milliseconds. Informational
/// only; the executor works off real deadlines.
fn estimate_ms(agent: AgentName) -> u64 {
    match agent {
        AgentName::Data => 800,
        AgentName::News => 1_500,
        AgentName::Knowledge => 1_200,
        AgentName::Analysis => 2_000,
        AgentName::Visualization => 1_000,
    }
}

pub struct ServicePlanner;

#[async_trait]
impl GraphNode for ServicePlanner {
    fn name(&self) -> &'static str {
        SERVICE_PLANNER
    }

    async fn run(&self, state: &mut StateRecord, _ctx: &NodeCtx) -> Result<(), AgentError> {
        let analysis = state
            .analysis
            .as_ref()
            .ok_or_else(|| AgentError::internal("planner ran before the query analyzer"))?;

        let plan = build_plan(analysis);
        tracing::info!(
            mode = ?plan.mode,
            stages = plan.stages.len(),
            estimated_ms = plan.estimated_ms,
            "plan built"
        );
        state.plan = Some(plan);
        Ok(())
    }
}

fn build_plan(analysis: &QueryAnalysis) -> ExecutionPlan {
    let required = &analysis.required_agents;
    if required.is_empty() {
        // General intent: the responder handles it alone.
        return ExecutionPlan::empty();
    }

    let mut stages: Vec<Stage> = Vec::new();
    if required.contains(&AgentName::Data) {
        stages.push(Stage::of([AgentName::Data]));
    }
    let gather: Vec<AgentName> = [AgentName::News, AgentName::Knowledge]
        .into_iter()
        .filter(|a| required.contains(a))
        .collect();
    if !gather.is_empty() {
        stages.push(Stage::of(gather));
    }
    let dependent: Vec<AgentName> = [AgentName::Analysis, AgentName::Visualization]
        .into_iter()
        .filter(|a| required.contains(a))
        .collect();
    if !dependent.is_empty() {
        stages.push(Stage::of(dependent));
    }

    let mode = if stages.len() == 1 && stages[0].agents.len() == 1 {
        PlanMode::Single
    } else if stages.iter().any(|s| s.agents.len() > 1) {
        PlanMode::Hybrid
    } else {
        PlanMode::Sequential
    };

    let estimated_ms = stages
        .iter()
        .map(|s| s.agents.iter().map(|a| estimate_ms(*a)).max().unwrap_or(0))
        .sum();

    ExecutionPlan {
        mode,
        stages,
        estimated_ms,
    }
}
