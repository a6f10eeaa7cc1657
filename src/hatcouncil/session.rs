//! The session controller.
//!
//! A [`Session`] owns everything one discussion needs: the anonymized participants,
//! the moderator, the transcript, the lens usage counter and a seedable RNG. Calling
//! [`Session::run`] drives the whole discussion to completion:
//!
//! 1. The moderator opens.
//! 2. For each round, every active member speaks once under a freshly drawn lens,
//!    then the moderator synthesizes the round.
//! 3. The moderator writes the final summary.
//!
//! Members that keep failing are deactivated and the discussion carries on without
//! them. A moderator failure aborts the session. The UI steers a running session
//! through [`SessionControls`], which can be cloned and used from any task.
//!
//! # Example
//!
//! ```rust,no_run
//! use hatcouncil::clients::openrouter::OpenRouterClient;
//! use hatcouncil::clients::tavily::TavilyClient;
//! use hatcouncil::config::{ModelRoster, ProviderConfig, SessionConfig};
//! use hatcouncil::session::Session;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     hatcouncil::init_logger();
//!     let providers = ProviderConfig::from_env();
//!     let config = SessionConfig::new("Should cities ban cars from their centres?")
//!         .with_member("anthropic/claude-sonnet-4.5")
//!         .with_member("x-ai/grok-4.1-fast")
//!         .with_member("deepseek/deepseek-v3.2")
//!         .with_rounds(3);
//!
//!     let mut session = Session::new(
//!         config,
//!         &ModelRoster::default_catalog(),
//!         Arc::new(OpenRouterClient::from_config(&providers)),
//!         Arc::new(TavilyClient::from_config(&providers)),
//!     )?;
//!
//!     let report = session.run().await;
//!     for turn in &report.transcript {
//!         println!("{}: {}", turn.speaker_name, turn.text);
//!     }
//!     Ok(())
//! }
//! ```

use crate::completion::{CompletionService, TokenUsage};
use crate::config::{ModelRoster, SessionConfig, SpeakingOrder};
use crate::error::CouncilError;
use crate::event::{EventHandler, SessionEvent};
use crate::identity::{AnonymizationMap, Participant, ParticipantId, ParticipantInfo};
use crate::lens::{LensAllocator, LensUsageCounter};
use crate::member::{MemberTurnGenerator, TurnContext};
use crate::moderator::{Moderator, ModeratorState, ModeratorTurn, SearchOutcome};
use crate::phase::phase_for_round;
use crate::retry::{RetryPolicy, Sleeper};
use crate::search::SearchService;
use crate::transcript::{Speaker, Transcript, Turn, TurnKind};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Cross-task control inputs for a running session.
///
/// Flags are only observed at round starts, turn starts and round boundaries, so a
/// request never interrupts a call in flight.
#[derive(Clone, Debug, Default)]
pub struct SessionControls {
    early_summary: Arc<AtomicBool>,
    cancellation: Arc<AtomicBool>,
}

impl SessionControls {
    /// Skip the remaining rounds once the current round's synthesis is done.
    pub fn request_early_summary(&self) {
        self.early_summary.store(true, Ordering::SeqCst);
    }

    /// Stop the discussion at the next turn or round boundary.
    pub fn request_cancellation(&self) {
        self.cancellation.store(true, Ordering::SeqCst);
    }

    pub fn early_summary_requested(&self) -> bool {
        self.early_summary.load(Ordering::SeqCst)
    }

    pub fn cancellation_requested(&self) -> bool {
        self.cancellation.load(Ordering::SeqCst)
    }
}

/// A member dropped from the discussion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Deactivation {
    pub participant: ParticipantId,
    pub pseudonym: String,
    pub round: usize,
    pub attempts: u32,
    pub reason: String,
}

/// What caused the final summary to be written.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CloseTrigger {
    AllRounds,
    EarlySummary,
    Cancelled,
    NoActiveParticipants,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The moderator wrote a final summary.
    Completed { trigger: CloseTrigger },
    /// Cancelled before any round completed. No summary was written.
    Cancelled,
    /// A fatal error ended the session.
    Aborted { error: CouncilError },
}

/// Everything the UI needs once a session is over.
#[derive(Clone, Debug)]
pub struct SessionReport {
    pub session_id: String,
    pub outcome: SessionOutcome,
    pub transcript: Vec<Turn>,
    pub participants: Vec<ParticipantInfo>,
    pub deactivations: Vec<Deactivation>,
    pub lens_usage: LensUsageCounter,
    pub rounds_completed: usize,
    pub total_usage: TokenUsage,
    /// Markdown links to the sources the final summary was checked against.
    pub sources: Vec<String>,
}

impl SessionReport {
    pub fn is_aborted(&self) -> bool {
        matches!(self.outcome, SessionOutcome::Aborted { .. })
    }

    pub fn final_summary(&self) -> Option<&Turn> {
        self.transcript
            .iter()
            .rev()
            .find(|t| matches!(t.kind, TurnKind::FinalSummary))
    }

    /// The error the UI should show, if any.
    pub fn surfaced_error(&self) -> Option<CouncilError> {
        match &self.outcome {
            SessionOutcome::Aborted { error } => Some(error.clone()),
            SessionOutcome::Completed {
                trigger: CloseTrigger::NoActiveParticipants,
            } => Some(CouncilError::NoActiveParticipants),
            _ => None,
        }
    }
}

pub struct Session {
    id: String,
    config: SessionConfig,
    identities: AnonymizationMap,
    participants: Vec<Participant>,
    moderator: Moderator,
    members: MemberTurnGenerator,
    transcript: Transcript,
    lens_usage: LensUsageCounter,
    deactivations: Vec<Deactivation>,
    controls: SessionControls,
    rng: StdRng,
    event_handler: Option<Arc<dyn EventHandler>>,
    current_round: usize,
    rounds_completed: usize,
    total_usage: TokenUsage,
    sources: Vec<String>,
    started: bool,
}

impl Session {
    /// Validate `config`, assign pseudonyms and build the participants.
    ///
    /// # Errors
    ///
    /// [`CouncilError::Configuration`] when the config is invalid.
    pub fn new(
        config: SessionConfig,
        roster: &ModelRoster,
        completion: Arc<dyn CompletionService>,
        search: Arc<dyn SearchService>,
    ) -> Result<Self, CouncilError> {
        config.validate()?;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let model_ids: Vec<String> = config.members.iter().map(|m| m.model_id.clone()).collect();
        let identities = AnonymizationMap::assign(&model_ids, roster, &mut rng)?;

        let participants = config
            .members
            .iter()
            .zip(identities.entries())
            .enumerate()
            .map(|(i, (member, entry))| {
                Participant::new(
                    ParticipantId(i),
                    member.model_id.clone(),
                    entry.pseudonym.clone(),
                    member.persona.clone(),
                )
            })
            .collect();

        let moderator = Moderator::new(
            config.moderator.clone(),
            Arc::clone(&completion),
            search,
            identities.clone(),
        )
        .with_limits(config.max_tokens, config.summary_max_tokens, config.temperature);
        let members = MemberTurnGenerator::new(
            completion,
            identities.clone(),
            config.max_tokens,
            config.temperature,
        );

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            config,
            identities,
            participants,
            moderator,
            members,
            transcript: Transcript::new(),
            lens_usage: LensUsageCounter::new(),
            deactivations: Vec::new(),
            controls: SessionControls::default(),
            rng,
            event_handler: None,
            current_round: 0,
            rounds_completed: 0,
            total_usage: TokenUsage::default(),
            sources: Vec::new(),
            started: false,
        })
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Route every backoff delay through `sleeper`.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.members = self
            .members
            .with_policy(RetryPolicy::member().with_sleeper(Arc::clone(&sleeper)));
        self.moderator = self
            .moderator
            .with_policy(RetryPolicy::moderator().with_sleeper(sleeper));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn controls(&self) -> SessionControls {
        self.controls.clone()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Real model to pseudonym table, for the UI reference panel only.
    pub fn identities(&self) -> &AnonymizationMap {
        &self.identities
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn deactivations(&self) -> &[Deactivation] {
        &self.deactivations
    }

    pub fn lens_usage(&self) -> &LensUsageCounter {
        &self.lens_usage
    }

    pub fn current_round(&self) -> usize {
        self.current_round
    }

    pub fn moderator_state(&self) -> ModeratorState {
        self.moderator.state()
    }

    fn active_count(&self) -> usize {
        self.participants.iter().filter(|p| p.is_active()).count()
    }

    async fn emit(&self, event: SessionEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_session_event(&event).await;
        }
    }

    async fn emit_turn(&self, index: usize) {
        if let Some(turn) = self.transcript.turns().get(index) {
            self.emit(SessionEvent::TurnAppended { turn: turn.clone() }).await;
        }
    }

    fn add_usage(&mut self, usage: Option<&TokenUsage>) {
        if let Some(usage) = usage {
            self.total_usage.accumulate(usage);
        }
    }

    async fn append_moderator_turn(&mut self, turn: ModeratorTurn, round: usize, kind: TurnKind) {
        self.add_usage(turn.usage.as_ref());
        let index = self
            .transcript
            .append(
                Speaker::Moderator,
                self.moderator.display_name().to_string(),
                round,
                None,
                kind,
                turn.text,
            )
            .index;
        self.emit_turn(index).await;
    }

    fn speaking_order(&mut self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.participants.len()).collect();
        if self.config.speaking_order == SpeakingOrder::ShuffledPerRound {
            order.shuffle(&mut self.rng);
        }
        order
    }

    async fn member_turn(&mut self, index: usize, round: usize) {
        let is_first_turn = self.transcript.member_speech_count() == 0;
        let lens = LensAllocator::assign(&self.lens_usage, is_first_turn, &mut self.rng);
        let (participant_id, pseudonym) = {
            let p = &self.participants[index];
            (p.id, p.pseudonym.clone())
        };
        self.emit(SessionEvent::LensAssigned {
            participant: participant_id,
            pseudonym: pseudonym.clone(),
            round,
            lens,
        })
        .await;

        let context = TurnContext {
            topic: &self.config.topic,
            transcript: &mut self.transcript,
            usage: &mut self.lens_usage,
        };
        let result = self
            .members
            .speak(&mut self.participants[index], lens, round, context)
            .await;

        match result {
            Ok(spoken) => {
                self.add_usage(spoken.usage.as_ref());
                self.emit_turn(spoken.turn_index).await;
            }
            Err(failure) => {
                let deactivation = Deactivation {
                    participant: participant_id,
                    pseudonym,
                    round,
                    attempts: failure.attempts,
                    reason: failure.error.to_string(),
                };
                self.emit(SessionEvent::ParticipantDeactivated {
                    participant: deactivation.participant,
                    pseudonym: deactivation.pseudonym.clone(),
                    round,
                    attempts: deactivation.attempts,
                    reason: deactivation.reason.clone(),
                })
                .await;
                self.deactivations.push(deactivation);
            }
        }
    }

    async fn observe_cancellation(&self, round: usize) {
        log::info!("session {}: cancellation observed in round {}", self.id, round);
        self.emit(SessionEvent::CancellationObserved { round }).await;
    }

    /// Run the discussion to the end and report what happened.
    ///
    /// A session runs once. Calling `run` again reports
    /// [`CouncilError::InvalidState`] without touching the transcript.
    pub async fn run(&mut self) -> SessionReport {
        if self.started {
            return self.report(SessionOutcome::Aborted {
                error: CouncilError::InvalidState("session has already run".into()),
            });
        }
        self.started = true;

        let total_rounds = self.config.total_rounds;
        let pseudonyms: Vec<String> = self.participants.iter().map(|p| p.pseudonym.clone()).collect();
        log::info!(
            "session {} starting: {} member(s), {} round(s)",
            self.id,
            pseudonyms.len(),
            total_rounds
        );
        self.emit(SessionEvent::SessionStarted {
            session_id: self.id.clone(),
            topic: self.config.topic.clone(),
            pseudonyms: pseudonyms.clone(),
            total_rounds,
        })
        .await;

        match self.moderator.open(&self.config.topic, &pseudonyms).await {
            Ok(turn) => self.append_moderator_turn(turn, 0, TurnKind::Opening).await,
            Err(error) => return self.finish(SessionOutcome::Aborted { error }).await,
        }

        let mut trigger = CloseTrigger::AllRounds;
        for round in 1..=total_rounds {
            if self.controls.cancellation_requested() {
                self.observe_cancellation(round).await;
                trigger = CloseTrigger::Cancelled;
                break;
            }

            self.current_round = round;
            let phase = phase_for_round(round, total_rounds);
            log::info!("session {}: round {}/{} ({})", self.id, round, total_rounds, phase);
            self.emit(SessionEvent::RoundStarted {
                round,
                total_rounds,
                phase,
            })
            .await;

            let mut cancelled = false;
            for index in self.speaking_order() {
                if self.controls.cancellation_requested() {
                    cancelled = true;
                    break;
                }
                if self.participants[index].is_active() {
                    self.member_turn(index, round).await;
                }
            }
            // The last speech of the round may have raised the flag.
            if cancelled || self.controls.cancellation_requested() {
                self.observe_cancellation(round).await;
                trigger = CloseTrigger::Cancelled;
                break;
            }

            if self.active_count() == 0 {
                let error = CouncilError::NoActiveParticipants;
                log::warn!("session {}: {} in round {}", self.id, error, round);
                self.emit(SessionEvent::NoActiveParticipants { round, error })
                    .await;
                trigger = CloseTrigger::NoActiveParticipants;
                break;
            }

            let lens_summary = self.lens_usage.distribution_summary();
            let round_turns = self.transcript.round_speeches(round);
            let synthesis = self
                .moderator
                .synthesize(round, total_rounds, &round_turns, &lens_summary)
                .await;
            match synthesis {
                Ok(turn) => {
                    self.append_moderator_turn(turn, round, TurnKind::Synthesis { phase })
                        .await
                }
                Err(error) => return self.finish(SessionOutcome::Aborted { error }).await,
            }

            self.rounds_completed = round;
            self.emit(SessionEvent::RoundCompleted {
                round,
                active_participants: self.active_count(),
            })
            .await;

            if round < total_rounds && self.controls.early_summary_requested() {
                log::info!("session {}: early summary after round {}", self.id, round);
                self.emit(SessionEvent::EarlySummaryTriggered { after_round: round })
                    .await;
                trigger = CloseTrigger::EarlySummary;
                break;
            }
            if self.controls.cancellation_requested() {
                self.observe_cancellation(round).await;
                trigger = CloseTrigger::Cancelled;
                break;
            }
        }

        if trigger == CloseTrigger::Cancelled && self.rounds_completed == 0 {
            self.moderator.close();
            return self.finish(SessionOutcome::Cancelled).await;
        }

        let summary = self
            .moderator
            .finalize(&self.config.topic, &self.transcript, self.config.search_enabled)
            .await;
        match summary {
            Ok(summary) => {
                for record in &summary.searches {
                    let event = match &record.outcome {
                        SearchOutcome::Found { result_count } => SessionEvent::SearchPerformed {
                            query: record.query.clone(),
                            result_count: *result_count,
                        },
                        SearchOutcome::Failed { error } => SessionEvent::SearchFailed {
                            query: record.query.clone(),
                            error: error.clone(),
                        },
                    };
                    self.emit(event).await;
                }
                self.sources = summary.sources;
                let round = self.current_round;
                self.append_moderator_turn(summary.turn, round, TurnKind::FinalSummary)
                    .await;
                self.finish(SessionOutcome::Completed { trigger }).await
            }
            Err(error) => self.finish(SessionOutcome::Aborted { error }).await,
        }
    }

    async fn finish(&mut self, outcome: SessionOutcome) -> SessionReport {
        match &outcome {
            SessionOutcome::Aborted { error } => {
                log::error!("session {} aborted: {}", self.id, error);
                self.moderator.close();
            }
            other => log::info!(
                "session {} finished after {} round(s): {:?}",
                self.id,
                self.rounds_completed,
                other
            ),
        }
        self.emit(SessionEvent::SessionFinished {
            session_id: self.id.clone(),
            rounds_completed: self.rounds_completed,
            aborted: matches!(outcome, SessionOutcome::Aborted { .. }),
        })
        .await;
        self.report(outcome)
    }

    fn report(&self, outcome: SessionOutcome) -> SessionReport {
        SessionReport {
            session_id: self.id.clone(),
            outcome,
            transcript: self.transcript.turns().to_vec(),
            participants: self.participants.iter().map(Participant::info).collect(),
            deactivations: self.deactivations.clone(),
            lens_usage: self.lens_usage.clone(),
            rounds_completed: self.rounds_completed,
            total_usage: self.total_usage.clone(),
            sources: self.sources.clone(),
        }
    }
}
