//! Thinking hats: the rhetorical lens each member turn must adopt.
//!
//! Five lenses exist, one per hat colour. A [`LensAllocator`] draws a lens for every
//! member turn, favouring lenses the session has used least:
//!
//! ```text
//! weight(lens) = 1 / (1 + usage_count)
//! ```
//!
//! The very first member turn may only wear the white ([`Lens::Fact`]) or green
//! ([`Lens::Alternative`]) hat, since nothing exists yet to criticise or defend.
//!
//! # Example
//!
//! ```
//! use hatcouncil::lens::{Lens, LensAllocator, LensUsageCounter};
//! use rand::SeedableRng;
//! use rand::rngs::StdRng;
//!
//! let mut rng = StdRng::seed_from_u64(7);
//! let mut usage = LensUsageCounter::new();
//!
//! let first = LensAllocator::assign(&usage, true, &mut rng);
//! assert!(matches!(first, Lens::Fact | Lens::Alternative));
//!
//! usage.record(first);
//! assert_eq!(usage.total(), 1);
//! ```

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Lens {
    /// White hat: facts and data.
    Fact,
    /// Red hat: feelings and intuition.
    Affect,
    /// Black hat: criticism and risk.
    Risk,
    /// Yellow hat: optimism and value.
    Value,
    /// Green hat: creativity and alternatives.
    Alternative,
}

impl Lens {
    pub const ALL: [Lens; 5] = [
        Lens::Fact,
        Lens::Affect,
        Lens::Risk,
        Lens::Value,
        Lens::Alternative,
    ];

    /// Lenses allowed on the first member turn of a session.
    pub const OPENING: [Lens; 2] = [Lens::Fact, Lens::Alternative];

    pub fn hat_color(&self) -> &'static str {
        match self {
            Lens::Fact => "white",
            Lens::Affect => "red",
            Lens::Risk => "black",
            Lens::Value => "yellow",
            Lens::Alternative => "green",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Lens::Fact => "⚪",
            Lens::Affect => "🔴",
            Lens::Risk => "⚫",
            Lens::Value => "🟡",
            Lens::Alternative => "🟢",
        }
    }

    pub fn hat_name(&self) -> &'static str {
        match self {
            Lens::Fact => "White hat",
            Lens::Affect => "Red hat",
            Lens::Risk => "Black hat",
            Lens::Value => "Yellow hat",
            Lens::Alternative => "Green hat",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Lens::Fact => "facts and data",
            Lens::Affect => "feelings and intuition",
            Lens::Risk => "criticism and risk",
            Lens::Value => "optimism and value",
            Lens::Alternative => "creativity and alternatives",
        }
    }

    /// Stance instruction placed in the member's system prompt.
    pub fn instruction(&self) -> &'static str {
        match self {
            Lens::Fact => {
                "You are wearing the WHITE hat.\n\n\
                 How you think:\n\
                 - State only objective facts, data and information\n\
                 - Leave out personal feelings and judgement\n\
                 - Say what we know and what we still need to find out\n\
                 - Cite concrete sources or figures where you have them\n\n\
                 Tone: calm and objective, like a scientist or a reporter"
            }
            Lens::Affect => {
                "You are wearing the RED hat.\n\n\
                 How you think:\n\
                 - Voice gut reactions, emotions and hunches\n\
                 - You do not need to justify or rationalise what you feel\n\
                 - Say things like \"I feel...\", \"My instinct is...\", \"This worries me...\"\n\
                 - Being subjective and emotional is allowed\n\n\
                 Tone: direct, emotional, unafraid to show likes and dislikes"
            }
            Lens::Risk => {
                "You are wearing the BLACK hat.\n\n\
                 How you think:\n\
                 - Point out weaknesses, risks and latent problems\n\
                 - Assume the worst case\n\
                 - Question feasibility and hunt for logical gaps\n\
                 - Play devil's advocate\n\n\
                 Tone: sharp and sceptical, like a strict auditor"
            }
            Lens::Value => {
                "You are wearing the YELLOW hat.\n\n\
                 How you think:\n\
                 - Stress benefits, opportunities and upside\n\
                 - Find the reasons this could work\n\
                 - Look toward the best outcome\n\
                 - Defend ideas and surface their value\n\n\
                 Tone: optimistic and encouraging, like an enthusiastic backer"
            }
            Lens::Alternative => {
                "You are wearing the GREEN hat.\n\n\
                 How you think:\n\
                 - Propose novel, unconventional ideas\n\
                 - Think outside the frame\n\
                 - \"What if we looked at it from...\", \"Why not try...\"\n\
                 - Ignore existing constraints and brainstorm freely\n\n\
                 Tone: open and curious, like a creative director"
            }
        }
    }

    /// `"⚪ White hat"` style label for transcripts and prompts.
    pub fn label(&self) -> String {
        format!("{} {}", self.emoji(), self.hat_name())
    }
}

impl fmt::Display for Lens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.hat_name(), self.description())
    }
}

/// How many times each lens has been worn this session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LensUsageCounter {
    counts: BTreeMap<Lens, u32>,
}

impl Default for LensUsageCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl LensUsageCounter {
    pub fn new() -> Self {
        Self {
            counts: Lens::ALL.iter().map(|lens| (*lens, 0)).collect(),
        }
    }

    pub fn count(&self, lens: Lens) -> u32 {
        self.counts.get(&lens).copied().unwrap_or(0)
    }

    /// Record one successful turn wearing `lens`.
    pub fn record(&mut self, lens: Lens) {
        *self.counts.entry(lens).or_insert(0) += 1;
    }

    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }

    pub fn unused(&self) -> Vec<Lens> {
        Lens::ALL
            .iter()
            .copied()
            .filter(|lens| self.count(*lens) == 0)
            .collect()
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Sampling weight for `lens`: `1 / (1 + usage_count)`.
    pub fn weight(&self, lens: Lens) -> f64 {
        1.0 / (1.0 + f64::from(self.count(lens)))
    }

    /// `"⚪ White hat: 2 | 🔴 Red hat: 0 | ..."`, shown to the moderator.
    pub fn distribution_summary(&self) -> String {
        Lens::ALL
            .iter()
            .map(|lens| format!("{}: {}", lens.label(), self.count(*lens)))
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

/// Draws lenses for member turns.
pub struct LensAllocator;

impl LensAllocator {
    /// Candidate lenses for a turn.
    pub fn candidates(is_first_turn: bool) -> &'static [Lens] {
        if is_first_turn {
            &Lens::OPENING
        } else {
            &Lens::ALL
        }
    }

    /// Pick a lens, weighting candidates by `1 / (1 + usage_count)`.
    ///
    /// Does not touch `usage`; the caller records the lens once the turn succeeds.
    pub fn assign<R: Rng + ?Sized>(usage: &LensUsageCounter, is_first_turn: bool, rng: &mut R) -> Lens {
        let candidates = Self::candidates(is_first_turn);
        let weights: Vec<f64> = candidates.iter().map(|lens| usage.weight(*lens)).collect();

        match WeightedIndex::new(&weights) {
            Ok(index) => {
                let pick = index.sample(rng);
                log::debug!("lens draw: {:?} (weights {:?})", candidates[pick], weights);
                candidates[pick]
            }
            Err(e) => {
                // Weights are always in (0, 1].
                log::warn!("lens weights {:?} rejected ({}), drawing uniformly", weights, e);
                candidates[rng.gen_range(0..candidates.len())]
            }
        }
    }
}
