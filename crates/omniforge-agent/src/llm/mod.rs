//! The reasoning boundary.
//!
//! The execution engine never talks to a model provider directly; it calls
//! a [`ReasoningEngine`] with the transcript so far, the visible tool
//! catalogue, and per-call options.
//!
//! - [`types`] -- transcript, tool and response types.
//! - [`anthropic`] -- an engine backed by the Anthropic Messages API.

pub mod anthropic;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;

pub use anthropic::{AnthropicConfig, AnthropicEngine};
pub use types::{
    Message, ReasoningOptions, ReasoningResponse, Role, StopReason, ToolCall, ToolDefinition,
    Usage,
};

/// Produces one reasoning step from a transcript.
///
/// Implementations must be safe to share across concurrently executing
/// skills.  Transient failures should be returned as errors; the caller
/// owns retry and backoff.
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    async fn call_llm(
        &self,
        transcript: &[Message],
        tools: &[ToolDefinition],
        options: &ReasoningOptions,
    ) -> Result<ReasoningResponse>;
}
