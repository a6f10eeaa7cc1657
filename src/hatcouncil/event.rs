//! Live session events for the UI.
//!
//! Implement [`EventHandler`] and register it with
//! [`Session::with_event_handler`](crate::session::Session::with_event_handler) to
//! follow a discussion as it unfolds: every appended turn, lens draw, deactivation
//! and search is reported as a [`SessionEvent`].
//!
//! The default [`on_session_event`](EventHandler::on_session_event) is a no-op, so a
//! handler only matches the variants it cares about.
//!
//! # Example
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use hatcouncil::event::{EventHandler, SessionEvent};
//!
//! struct ConsoleFeed;
//!
//! #[async_trait]
//! impl EventHandler for ConsoleFeed {
//!     async fn on_session_event(&self, event: &SessionEvent) {
//!         if let SessionEvent::TurnAppended { turn } = event {
//!             println!("{}: {}", turn.speaker_name, turn.text);
//!         }
//!     }
//! }
//! ```

use crate::error::CouncilError;
use crate::identity::ParticipantId;
use crate::lens::Lens;
use crate::phase::Phase;
use crate::transcript::Turn;
use async_trait::async_trait;

/// Events emitted by a [`Session`](crate::session::Session) while it runs.
///
/// ```text
/// SessionStarted
///   TurnAppended (opening)
///   RoundStarted { round: 1 }
///     LensAssigned, TurnAppended        (per active member)
///     ParticipantDeactivated            (on member failure)
///     TurnAppended (synthesis)
///   RoundCompleted { round: 1 }
///   ...
///   SearchPerformed / SearchFailed      (during the final summary)
///   TurnAppended (final summary)
/// SessionFinished
/// ```
#[derive(Debug, Clone)]
pub enum SessionEvent {
    SessionStarted {
        session_id: String,
        topic: String,
        pseudonyms: Vec<String>,
        total_rounds: usize,
    },
    RoundStarted {
        round: usize,
        total_rounds: usize,
        phase: Phase,
    },
    LensAssigned {
        participant: ParticipantId,
        pseudonym: String,
        round: usize,
        lens: Lens,
    },
    TurnAppended {
        turn: Turn,
    },
    ParticipantDeactivated {
        participant: ParticipantId,
        pseudonym: String,
        round: usize,
        attempts: u32,
        reason: String,
    },
    SearchPerformed {
        query: String,
        result_count: usize,
    },
    SearchFailed {
        query: String,
        error: String,
    },
    RoundCompleted {
        round: usize,
        active_participants: usize,
    },
    EarlySummaryTriggered {
        after_round: usize,
    },
    CancellationObserved {
        round: usize,
    },
    NoActiveParticipants {
        round: usize,
        error: CouncilError,
    },
    SessionFinished {
        session_id: String,
        rounds_completed: usize,
        aborted: bool,
    },
}

/// Receives [`SessionEvent`]s.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_session_event(&self, _event: &SessionEvent) {}
}
