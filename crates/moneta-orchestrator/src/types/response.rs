//! Public request/response shapes for `orchestrate()`.

use serde::{Deserialize, Serialize};

use crate::traits::ScoredSnippet;

/// An incoming user request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    pub session_id: String,
    pub user_id: String,
}

impl ChatRequest {
    pub fn new(
        query: impl Into<String>,
        session_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            query: query.into(),
            session_id: session_id.into(),
            user_id: user_id.into(),
        }
    }
}

/// Discriminator telling the caller what kind of answer this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Data,
    Analysis,
    News,
    Knowledge,
    Visualization,
    General,
    Error,
}

impl From<super::Intent> for ActionType {
    fn from(intent: super::Intent) -> Self {
        match intent {
            super::Intent::Data => Self::Data,
            super::Intent::Analysis => Self::Analysis,
            super::Intent::News => Self::News,
            super::Intent::Knowledge => Self::Knowledge,
            super::Intent::Visualization => Self::Visualization,
            super::Intent::General => Self::General,
        }
    }
}

/// Letter grade derived from the normalized confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    /// Map a score in `[0, 1]` to a grade using descending thresholds
    /// `[a, b, c, d]`.
    pub fn from_score(score: f64, thresholds: [f64; 4]) -> Self {
        let [a, b, c, d] = thresholds;
        if score >= a {
            Self::A
        } else if score >= b {
            Self::B
        } else if score >= c {
            Self::C
        } else if score >= d {
            Self::D
        } else {
            Self::F
        }
    }
}

/// The structured answer returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
    pub action_type: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_payload: Option<serde_json::Value>,
    /// PNG bytes when a chart was rendered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retrieved_documents: Vec<ScoredSnippet>,
    pub confidence: f64,
    pub grade: Grade,
}
