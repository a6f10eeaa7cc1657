//! Moderator tone as a pure function of the round.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Rounds that are always provocative when the session is long enough.
const PROVOCATIVE_ROUNDS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Surface and amplify tension between positions.
    Provocative,
    /// Find common ground and narrow the remaining disagreement.
    Convergent,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Provocative => write!(f, "provocative"),
            Phase::Convergent => write!(f, "convergent"),
        }
    }
}

/// Phase of 1-based `round` in a session of `total_rounds`.
///
/// Rounds 1 and 2 are provocative and later rounds convergent, except that the last
/// round of a session shorter than three rounds is always convergent.
///
/// ```
/// use hatcouncil::phase::{phase_for_round, Phase};
///
/// assert_eq!(phase_for_round(1, 1), Phase::Convergent);
/// assert_eq!(phase_for_round(1, 2), Phase::Provocative);
/// assert_eq!(phase_for_round(2, 2), Phase::Convergent);
/// assert_eq!(phase_for_round(2, 5), Phase::Provocative);
/// assert_eq!(phase_for_round(3, 5), Phase::Convergent);
/// ```
pub fn phase_for_round(round: usize, total_rounds: usize) -> Phase {
    if total_rounds < 3 && round >= total_rounds {
        return Phase::Convergent;
    }
    if round <= PROVOCATIVE_ROUNDS {
        Phase::Provocative
    } else {
        Phase::Convergent
    }
}
