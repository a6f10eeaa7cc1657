//! Pseudonymous identities for council members.
//!
//! Members never learn which provider stands behind another member. At session start
//! each selected model receives a pseudonym drawn without replacement from
//! [`RANDOM_NAMES`] in random order, so the name-to-model mapping differs from one
//! session to the next. The real ids are only exposed to the UI reference panel.

use crate::config::ModelRoster;
use crate::error::CouncilError;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::collections::HashSet;

/// Names handed out to members.
pub const RANDOM_NAMES: [&str; 15] = [
    "Alice", "Bob", "Carol", "David", "Eve", "Frank", "Grace", "Henry", "Iris", "Jack",
    "Kate", "Leo", "Mia", "Noah", "Olivia",
];

#[derive(Clone, Debug, PartialEq, Eq, Hash, Copy, PartialOrd, Ord, Serialize)]
pub struct ParticipantId(pub usize);

/// A council member for the lifetime of one session.
///
/// Never removed: a member that fails for good is only marked inactive so earlier
/// transcript attribution stays valid.
#[derive(Clone, Debug)]
pub struct Participant {
    pub id: ParticipantId,
    pub model_id: String,
    pub pseudonym: String,
    pub persona: Option<String>,
    is_active: bool,
}

impl Participant {
    pub fn new(
        id: ParticipantId,
        model_id: impl Into<String>,
        pseudonym: impl Into<String>,
        persona: Option<String>,
    ) -> Self {
        Self {
            id,
            model_id: model_id.into(),
            pseudonym: pseudonym.into(),
            persona,
            is_active: true,
        }
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// One-way: there is no reactivation.
    pub fn deactivate(&mut self) {
        self.is_active = false;
    }

    pub fn info(&self) -> ParticipantInfo {
        ParticipantInfo {
            id: self.id,
            model_id: self.model_id.clone(),
            pseudonym: self.pseudonym.clone(),
            is_active: self.is_active,
        }
    }
}

/// Snapshot of a participant for the UI.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ParticipantInfo {
    pub id: ParticipantId,
    pub model_id: String,
    pub pseudonym: String,
    pub is_active: bool,
}

/// One row of the anonymization map.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IdentityEntry {
    pub model_id: String,
    pub model_name: String,
    pub pseudonym: String,
}

/// Bijection between real model ids and pseudonyms.
#[derive(Clone, Debug, Default)]
pub struct AnonymizationMap {
    entries: Vec<IdentityEntry>,
}

impl AnonymizationMap {
    /// Assign pseudonyms to `model_ids`, in input order.
    ///
    /// # Errors
    ///
    /// [`CouncilError::Configuration`] when the list is empty, holds duplicates, or is
    /// longer than [`RANDOM_NAMES`].
    ///
    /// ```
    /// use hatcouncil::config::ModelRoster;
    /// use hatcouncil::identity::AnonymizationMap;
    /// use rand::SeedableRng;
    ///
    /// let mut rng = rand::rngs::StdRng::seed_from_u64(1);
    /// let ids = vec!["openai/gpt-5.2".to_string(), "x-ai/grok-4.1-fast".to_string()];
    /// let map = AnonymizationMap::assign(&ids, &ModelRoster::default_catalog(), &mut rng).unwrap();
    ///
    /// let name = map.pseudonym_for("openai/gpt-5.2").unwrap();
    /// assert_eq!(map.model_for(name), Some("openai/gpt-5.2"));
    /// ```
    pub fn assign<R: Rng + ?Sized>(
        model_ids: &[String],
        roster: &ModelRoster,
        rng: &mut R,
    ) -> Result<Self, CouncilError> {
        if model_ids.is_empty() {
            return Err(CouncilError::Configuration(
                "no models selected for the council".into(),
            ));
        }
        if model_ids.len() > RANDOM_NAMES.len() {
            return Err(CouncilError::Configuration(format!(
                "at most {} members are supported, got {}",
                RANDOM_NAMES.len(),
                model_ids.len()
            )));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = model_ids.iter().find(|id| !seen.insert(id.as_str())) {
            return Err(CouncilError::Configuration(format!(
                "model '{}' selected more than once",
                dup
            )));
        }

        let mut names = RANDOM_NAMES.to_vec();
        names.shuffle(rng);

        let entries = model_ids
            .iter()
            .zip(names)
            .map(|(model_id, name)| IdentityEntry {
                model_id: model_id.clone(),
                model_name: roster.display_name(model_id).to_string(),
                pseudonym: name.to_string(),
            })
            .collect();

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rows for the UI reference panel. Never include these in prompts.
    pub fn entries(&self) -> &[IdentityEntry] {
        &self.entries
    }

    pub fn pseudonym_for(&self, model_id: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.model_id == model_id)
            .map(|e| e.pseudonym.as_str())
    }

    pub fn model_for(&self, pseudonym: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.pseudonym == pseudonym)
            .map(|e| e.model_id.as_str())
    }

    /// Replace every real model id and roster name in `text` with its pseudonym.
    pub fn scrub(&self, text: &str) -> String {
        let mut replacements: Vec<(&str, &str)> = Vec::with_capacity(self.entries.len() * 2);
        for entry in &self.entries {
            replacements.push((entry.model_id.as_str(), entry.pseudonym.as_str()));
            if entry.model_name != entry.model_id {
                replacements.push((entry.model_name.as_str(), entry.pseudonym.as_str()));
            }
        }
        // Longest first so "Kimi K2 Thinking" wins over "Kimi K2".
        replacements.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        let mut scrubbed = text.to_string();
        for (needle, pseudonym) in replacements {
            if !needle.is_empty() && scrubbed.contains(needle) {
                scrubbed = scrubbed.replace(needle, pseudonym);
            }
        }
        scrubbed
    }
}
