//! Execution plans: ordered stages of concurrently-run agents.

use serde::{Deserialize, Serialize};

use super::agent::AgentName;

/// Overall shape of the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanMode {
    Single,
    Sequential,
    Hybrid,
}

/// One unit of the plan: every agent in a stage runs concurrently, and the
/// stage completes when all of them finish or time out. Agents within a
/// stage must be mutually independent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub agents: Vec<AgentName>,
}

impl Stage {
    pub fn of(agents: impl IntoIterator<Item = AgentName>) -> Self {
        let mut agents: Vec<AgentName> = agents.into_iter().collect();
        agents.sort();
        agents.dedup();
        Self { agents }
    }

    pub fn contains(&self, agent: AgentName) -> bool {
        self.agents.contains(&agent)
    }
}

/// The schedule the planner hands to the parallel executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub mode: PlanMode,
    pub stages: Vec<Stage>,
    /// Sum of per-stage maxima of static agent estimates. Informational.
    pub estimated_ms: u64,
}

impl ExecutionPlan {
    pub fn empty() -> Self {
        Self {
            mode: PlanMode::Single,
            stages: Vec::new(),
            estimated_ms: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// All agents across all stages, in stage order.
    pub fn agents(&self) -> impl Iterator<Item = AgentName> + '_ {
        self.stages.iter().flat_map(|s| s.agents.iter().copied())
    }
}
