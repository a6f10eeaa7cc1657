//! Error taxonomy for council sessions.
//!
//! Two layers of errors exist:
//!
//! * [`UpstreamError`] is what a [`CompletionService`](crate::completion::CompletionService)
//!   reports. It only distinguishes *retryable* overload from *permanent* failures.
//! * [`CouncilError`] is what the orchestration core reports. Its variants map onto the
//!   propagation policy: member failures are absorbed by the session controller,
//!   moderator failures abort the session and search failures never escape
//!   [`Moderator::finalize`](crate::moderator::Moderator::finalize).
//!
//! # Examples
//!
//! ```
//! use hatcouncil::error::{CouncilError, UpstreamError};
//!
//! let err = CouncilError::from(UpstreamError::RateLimited("429".into()));
//! assert!(err.is_transient());
//! assert_eq!(err.to_string(), "Transient upstream error: 429");
//! ```

use serde::Serialize;
use std::error::Error;
use std::fmt;

/// Failure reported by an external completion endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// Rate limited or transiently overloaded. Safe to retry after a delay.
    RateLimited(String),
    /// Malformed request, unknown model, auth failure. Retrying cannot help.
    PermanentFailure(String),
}

impl UpstreamError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, UpstreamError::RateLimited(_))
    }
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamError::RateLimited(msg) => write!(f, "rate limited: {}", msg),
            UpstreamError::PermanentFailure(msg) => write!(f, "permanent failure: {}", msg),
        }
    }
}

impl Error for UpstreamError {}

/// Which moderator operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ModeratorStage {
    Opening,
    Synthesis,
    FinalSummary,
}

impl fmt::Display for ModeratorStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModeratorStage::Opening => write!(f, "opening"),
            ModeratorStage::Synthesis => write!(f, "synthesis"),
            ModeratorStage::FinalSummary => write!(f, "final summary"),
        }
    }
}

/// Errors surfaced by the council orchestration core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CouncilError {
    /// Invalid session configuration (duplicate members, zero rounds, ...).
    /// Raised before the session starts.
    Configuration(String),

    /// A retryable upstream failure. Invisible to the session when a retry succeeds.
    TransientUpstream(String),

    /// A non-retryable upstream failure. Deactivates a member, aborts on the moderator.
    PermanentUpstream(String),

    /// The moderator could not complete one of its calls within its retry budget.
    ModeratorUnavailable {
        stage: ModeratorStage,
        attempts: u32,
        source: String,
    },

    /// Every member has been deactivated.
    NoActiveParticipants,

    /// The search backend failed. Never fatal; reported through events and logs.
    SearchUnavailable(String),

    /// An operation was invoked in a state that does not allow it.
    InvalidState(String),
}

impl CouncilError {
    /// `true` for errors the retry wrapper may try again.
    pub fn is_transient(&self) -> bool {
        matches!(self, CouncilError::TransientUpstream(_))
    }

    /// `true` for errors that end the session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CouncilError::Configuration(_)
                | CouncilError::ModeratorUnavailable { .. }
                | CouncilError::InvalidState(_)
        )
    }
}

impl From<UpstreamError> for CouncilError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::RateLimited(msg) => CouncilError::TransientUpstream(msg),
            UpstreamError::PermanentFailure(msg) => CouncilError::PermanentUpstream(msg),
        }
    }
}

impl fmt::Display for CouncilError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CouncilError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            CouncilError::TransientUpstream(msg) => {
                write!(f, "Transient upstream error: {}", msg)
            }
            CouncilError::PermanentUpstream(msg) => {
                write!(f, "Permanent upstream error: {}", msg)
            }
            CouncilError::ModeratorUnavailable {
                stage,
                attempts,
                source,
            } => write!(
                f,
                "Moderator unavailable during {} after {} attempt(s): {}",
                stage, attempts, source
            ),
            CouncilError::NoActiveParticipants => {
                write!(f, "No active participants remain in the session")
            }
            CouncilError::SearchUnavailable(msg) => write!(f, "Search unavailable: {}", msg),
            CouncilError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
        }
    }
}

impl Error for CouncilError {}
