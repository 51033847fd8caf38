//! Orchestrator configuration and its production defaults.

use std::collections::HashMap;
use std::time::Duration;

use crate::types::AgentName;

/// Every recognized tuning knob. Construct with `..Default::default()` and
/// override what you need; the defaults are the documented production
/// values.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Parallelism for agent tasks across all in-flight requests.
    pub worker_pool_size: usize,
    /// Per-agent deadline overrides; agents not listed use
    /// [`default_agent_timeout`](Self::default_agent_timeout).
    pub agent_timeouts: HashMap<AgentName, Duration>,
    pub default_agent_timeout: Duration,
    /// Whole-request hard ceiling.
    pub request_timeout: Duration,
    /// Cycle guard: max node invocations per request.
    pub max_graph_hops: u32,
    pub news_top_k: usize,
    pub news_min_score: f64,
    pub knowledge_top_k: usize,
    /// Minimum retrieval score for a knowledge hit to count.
    pub knowledge_min_score: f64,
    /// Title-Jaccard cutoff for news dedup.
    pub similarity_dedup_threshold: f64,
    /// Descending grade thresholds for A/B/C/D.
    pub confidence_thresholds: [f64; 4],
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        let mut agent_timeouts = HashMap::new();
        agent_timeouts.insert(AgentName::Data, Duration::from_secs(10));
        agent_timeouts.insert(AgentName::Visualization, Duration::from_secs(20));
        Self {
            worker_pool_size: 8,
            agent_timeouts,
            default_agent_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(120),
            max_graph_hops: 32,
            news_top_k: 10,
            news_min_score: 0.0,
            knowledge_top_k: 3,
            knowledge_min_score: 0.5,
            similarity_dedup_threshold: 0.9,
            confidence_thresholds: [0.90, 0.75, 0.60, 0.45],
        }
    }
}

impl OrchestratorConfig {
    pub fn agent_timeout(&self, agent: AgentName) -> Duration {
        self.agent_timeouts
            .get(&agent)
            .copied()
            .unwrap_or(self.default_agent_timeout)
    }
}
