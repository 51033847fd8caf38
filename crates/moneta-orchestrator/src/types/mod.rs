//! Foundational types for the orchestration state model.
//!
//! Every type here is `Serialize + Deserialize + Debug + Clone`. Enums are
//! serialized `snake_case` and marked `#[non_exhaustive]` where downstream
//! crates match on them, so adding variants is never a breaking change.

pub mod agent;
pub mod analysis;
pub mod plan;
pub mod response;
pub mod state;

pub use agent::*;
pub use analysis::*;
pub use plan::*;
pub use response::*;
pub use state::*;

/// Hard cap on query length, enforced at request entry.
pub const MAX_QUERY_CHARS: usize = 4096;

/// Denominator for the confidence rubric: four sub-scores of
/// [`SUBSCORE_MAX`] each.
pub const CONFIDENCE_DENOMINATOR: u32 = 100;

/// Maximum value of a single confidence sub-score. All four sub-scores
/// carry equal weight; re-tuning is a one-line change here.
pub const SUBSCORE_MAX: u32 = 25;
