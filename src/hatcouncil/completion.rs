//! A CompletionService is the seam between the council and whichever LLM gateway
//! serves the member and moderator models.
//! It is stateless from the council's point of view: every call carries the full
//! prompt, the model to route to and the sampling parameters.
// src/hatcouncil/completion.rs

use crate::error::UpstreamError;
use async_trait::async_trait;
use serde::Serialize;

/// Represents the possible roles for a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Role {
    /// Set by the council to pin the speaker's stance.
    System,
    /// Turn-specific instructions and transcript excerpts.
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// How many tokens were spent on prompt vs. completion.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

impl TokenUsage {
    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Represents a generic message to be sent to an LLM.
#[derive(Clone, Debug)]
pub struct Message {
    /// The role associated with the message.
    pub role: Role,
    /// The actual content of the message.
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// One call to the completion endpoint.
#[derive(Clone, Debug)]
pub struct CompletionRequest {
    /// Real model identifier, e.g. `"anthropic/claude-sonnet-4.5"`.
    pub model_id: String,
    pub messages: Vec<Message>,
    pub max_tokens: usize,
    pub temperature: f32,
}

impl CompletionRequest {
    /// Concatenated prompt text, handy for logging and for assertions in tests.
    pub fn prompt_text(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// The assistant text returned by a completion call.
#[derive(Clone, Debug)]
pub struct Completion {
    pub content: String,
    /// `None` when the provider did not report usage.
    pub usage: Option<TokenUsage>,
}

impl Completion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: None,
        }
    }
}

/// Trait defining the interface to the model-completion gateway.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Request a completion for `request.messages` from `request.model_id`.
    ///
    /// Implementations classify failures: [`UpstreamError::RateLimited`] for
    /// overload/transient conditions and [`UpstreamError::PermanentFailure`] for
    /// everything retrying cannot fix.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, UpstreamError>;
}
