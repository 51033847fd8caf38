//! Error handler: classifies the recorded failure and logs it.
//!
//! Recoverable failures are only recorded — the runtime never diverts for
//! them, so reaching this node means either an unrecoverable error or a
//! node that raised. Either way the next stop is the responder, which
//! turns the kind into a user-safe reply.

use async_trait::async_trait;

use crate::context::NodeCtx;
use crate::error::AgentError;
use crate::graph::{ERROR_HANDLER, GraphNode};
use crate::types::StateRecord;

pub struct ErrorHandler;

#[async_trait]
impl GraphNode for ErrorHandler {
    fn name(&self) -> &'static str {
        ERROR_HANDLER
    }

    async fn run(&self, state: &mut StateRecord, _ctx: &NodeCtx) -> Result<(), AgentError> {
        match &state.error {
            Some(err) if err.recoverable => {
                tracing::warn!(
                    kind = %err.kind,
                    node = %err.node,
                    message = %err.message,
                    "recoverable error recorded"
                );
            }
            Some(err) => {
                tracing::error!(
                    kind = %err.kind,
                    node = %err.node,
                    message = %err.message,
                    "unrecoverable error, responding with error reply"
                );
            }
            None => {
                tracing::warn!("error handler invoked without a recorded error");
            }
        }
        Ok(())
    }
}
