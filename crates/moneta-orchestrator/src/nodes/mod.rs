//! Meta-nodes: planning and composition stages of the graph.

mod analyzer;
mod combiner;
mod confidence;
mod error_handler;
mod executor;
mod planner;
mod responder;

pub(crate) use responder::user_message;

pub use analyzer::QueryAnalyzer;
pub use combiner::ResultCombiner;
pub use confidence::ConfidenceCalculator;
pub use error_handler::ErrorHandler;
pub use executor::ParallelExecutor;
pub use planner::ServicePlanner;
pub use responder::Responder;
