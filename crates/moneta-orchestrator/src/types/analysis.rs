//! Query-analysis output: intent, complexity, and the dispatch hint.

use serde::{Deserialize, Serialize};

use super::agent::AgentName;

/// Primary intent of the user query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Data,
    Analysis,
    News,
    Knowledge,
    Visualization,
    General,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Analysis => "analysis",
            Self::News => "news",
            Self::Knowledge => "knowledge",
            Self::Visualization => "visualization",
            Self::General => "general",
        }
    }

    /// Unknown strings coerce to [`Intent::General`] instead of failing.
    pub fn parse_lossy(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "data" => Self::Data,
            "analysis" => Self::Analysis,
            "news" => Self::News,
            "knowledge" => Self::Knowledge,
            "visualization" | "chart" => Self::Visualization,
            _ => Self::General,
        }
    }

    /// The worker agent that owns this intent, if any.
    pub fn primary_agent(&self) -> Option<AgentName> {
        match self {
            Self::Data => Some(AgentName::Data),
            Self::Analysis => Some(AgentName::Analysis),
            Self::News => Some(AgentName::News),
            Self::Knowledge => Some(AgentName::Knowledge),
            Self::Visualization => Some(AgentName::Visualization),
            Self::General => None,
        }
    }

    /// Agents whose failure must abort the request for this intent.
    pub fn required_agents(&self) -> &'static [AgentName] {
        match self {
            Self::Data | Self::Analysis | Self::Visualization => &[AgentName::Data],
            _ => &[],
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much orchestration the query needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

impl Complexity {
    pub fn parse_lossy(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Self::Simple,
            "complex" => Self::Complex,
            _ => Self::Moderate,
        }
    }
}

/// What the query analyzer writes into the state record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub primary_intent: Intent,
    pub complexity: Complexity,
    /// Agents the planner must schedule. Empty only for `general`.
    pub required_agents: Vec<AgentName>,
    /// Classifier confidence in `[0, 1]`.
    pub confidence: f64,
    /// Did the user ask for an investment judgement?
    pub is_investment: bool,
    /// First worker agent to dispatch; `None` for `general`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_agent: Option<AgentName>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_intent_coerces_to_general() {
        assert_eq!(Intent::parse_lossy("portfolio"), Intent::General);
        assert_eq!(Intent::parse_lossy("Visualization"), Intent::Visualization);
    }

    #[test]
    fn required_agents_follow_intent() {
        assert_eq!(Intent::Analysis.required_agents(), &[AgentName::Data]);
        assert_eq!(Intent::Visualization.required_agents(), &[AgentName::Data]);
        assert!(Intent::News.required_agents().is_empty());
        assert!(Intent::General.required_agents().is_empty());
    }

    #[test]
    fn complexity_defaults_to_moderate() {
        assert_eq!(Complexity::parse_lossy("medium"), Complexity::Moderate);
        assert_eq!(Complexity::parse_lossy("SIMPLE"), Complexity::Simple);
    }
}
