//! The append-only discussion record.
//!
//! Every utterance, by the moderator or a member, becomes one immutable [`Turn`].
//! Turns are only ever appended, so a turn's [`index`](Turn::index) is its position
//! in speaking order for the rest of the session.

use crate::identity::ParticipantId;
use crate::lens::Lens;
use crate::phase::Phase;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Speaker {
    Moderator,
    Member(ParticipantId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TurnKind {
    /// The moderator's provocative opening frame.
    Opening,
    /// A member's lens-constrained contribution.
    Speech,
    /// The moderator's end-of-round synthesis, tagged with its tone.
    Synthesis { phase: Phase },
    /// The moderator's closing summary.
    FinalSummary,
}

#[derive(Clone, Debug, Serialize)]
pub struct Turn {
    /// 0-based position in the transcript.
    pub index: usize,
    pub speaker: Speaker,
    /// Pseudonym for members, moderator display name otherwise.
    pub speaker_name: String,
    /// 0 for the opening, 1-based round for everything else.
    pub round_index: usize,
    /// Set for member speeches only.
    pub lens: Option<Lens>,
    pub kind: TurnKind,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn is_member_speech(&self) -> bool {
        matches!(self.kind, TurnKind::Speech)
    }

    /// `"**Alice** (⚪ White hat)"` style heading used in moderator prompts.
    pub fn heading(&self) -> String {
        match self.lens {
            Some(lens) => format!("**{}** ({})", self.speaker_name, lens.label()),
            None => format!("**{}**", self.speaker_name),
        }
    }
}

/// Ordered, append-only sequence of turns.
#[derive(Clone, Debug, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn and return it. The index and timestamp are assigned here.
    pub fn append(
        &mut self,
        speaker: Speaker,
        speaker_name: impl Into<String>,
        round_index: usize,
        lens: Option<Lens>,
        kind: TurnKind,
        text: impl Into<String>,
    ) -> &Turn {
        let index = self.turns.len();
        self.turns.push(Turn {
            index,
            speaker,
            speaker_name: speaker_name.into(),
            round_index,
            lens,
            kind,
            text: text.into(),
            timestamp: Utc::now(),
        });
        &self.turns[index]
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last_member_speech(&self) -> Option<&Turn> {
        self.turns.iter().rev().find(|t| t.is_member_speech())
    }

    pub fn latest_synthesis(&self) -> Option<&Turn> {
        self.turns
            .iter()
            .rev()
            .find(|t| matches!(t.kind, TurnKind::Synthesis { .. }))
    }

    pub fn member_speech_count(&self) -> usize {
        self.turns.iter().filter(|t| t.is_member_speech()).count()
    }

    /// Member speeches of one round, in order.
    pub fn round_speeches(&self, round_index: usize) -> Vec<&Turn> {
        self.turns
            .iter()
            .filter(|t| t.is_member_speech() && t.round_index == round_index)
            .collect()
    }

    pub fn final_summary(&self) -> Option<&Turn> {
        self.turns
            .iter()
            .rev()
            .find(|t| matches!(t.kind, TurnKind::FinalSummary))
    }
}

/// The last question a turn ends on, if any.
///
/// Splits on `?` and the full-width `？`, keeps the last sentence ending in one, and
/// trims it to its final line.
///
/// ```
/// use hatcouncil::transcript::extract_question;
///
/// let text = "Cars pollute.\nBut who pays for transit?";
/// assert_eq!(extract_question(text).as_deref(), Some("But who pays for transit?"));
/// assert_eq!(extract_question("No question here."), None);
/// ```
pub fn extract_question(text: &str) -> Option<String> {
    let mut questions = Vec::new();
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if c == '?' || c == '？' {
            let end = i + c.len_utf8();
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                questions.push(sentence);
            }
            start = end;
        }
    }
    questions.last().and_then(|q| {
        q.lines()
            .last()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
    })
}
