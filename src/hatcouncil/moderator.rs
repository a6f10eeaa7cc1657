//! The moderator and its state machine.
//!
//! ```text
//! Opening ──open()──▶ Synthesizing ──finalize()──▶ FinalSummary ──▶ Closed
//!                       │      ▲
//!                       └──────┘ synthesize()
//! ```
//!
//! Every moderator call goes through the moderator [`RetryPolicy`]. Running out of
//! attempts, or hitting a permanent upstream error, is reported as
//! [`CouncilError::ModeratorUnavailable`] and ends the session. Search failures
//! inside [`Moderator::finalize`] are the exception: they are absorbed and the
//! summary falls back to the transcript alone.

use crate::completion::{CompletionRequest, CompletionService, Message, TokenUsage};
use crate::config::ModeratorConfig;
use crate::error::{CouncilError, ModeratorStage};
use crate::identity::AnonymizationMap;
use crate::phase::phase_for_round;
use crate::prompts::{
    final_summary_prompt, moderator_system_prompt, opening_prompt, parse_search_queries,
    render_turns, search_planning_prompt, SynthesisPrompt,
};
use crate::retry::RetryPolicy;
use crate::search::SearchService;
use crate::transcript::{Transcript, Turn};
use std::fmt;
use std::sync::Arc;

/// Token cap for the search planning call.
const PLANNING_MAX_TOKENS: usize = 200;
const PLANNING_TEMPERATURE: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeratorState {
    Opening,
    Synthesizing,
    FinalSummary,
    Closed,
}

impl fmt::Display for ModeratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModeratorState::Opening => write!(f, "opening"),
            ModeratorState::Synthesizing => write!(f, "synthesizing"),
            ModeratorState::FinalSummary => write!(f, "final summary"),
            ModeratorState::Closed => write!(f, "closed"),
        }
    }
}

/// Text produced by one moderator operation.
#[derive(Debug, Clone)]
pub struct ModeratorTurn {
    pub text: String,
    pub attempts: u32,
    pub usage: Option<TokenUsage>,
}

/// Outcome of one verification search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Found { result_count: usize },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRecord {
    pub query: String,
    pub outcome: SearchOutcome,
}

/// The closing summary and the searches that informed it.
#[derive(Debug, Clone)]
pub struct FinalSummary {
    pub turn: ModeratorTurn,
    pub searches: Vec<SearchRecord>,
    /// Markdown links to every source that returned results.
    pub sources: Vec<String>,
}

pub struct Moderator {
    config: ModeratorConfig,
    completion: Arc<dyn CompletionService>,
    search: Arc<dyn SearchService>,
    identities: AnonymizationMap,
    policy: RetryPolicy,
    max_tokens: usize,
    summary_max_tokens: usize,
    temperature: f32,
    state: ModeratorState,
    topic: String,
    latest_synthesis: Option<String>,
}

impl Moderator {
    pub fn new(
        config: ModeratorConfig,
        completion: Arc<dyn CompletionService>,
        search: Arc<dyn SearchService>,
        identities: AnonymizationMap,
    ) -> Self {
        Self {
            config,
            completion,
            search,
            identities,
            policy: RetryPolicy::moderator(),
            max_tokens: crate::config::DEFAULT_MAX_TOKENS,
            summary_max_tokens: crate::config::DEFAULT_SUMMARY_MAX_TOKENS,
            temperature: crate::config::DEFAULT_TEMPERATURE,
            state: ModeratorState::Opening,
            topic: String::new(),
            latest_synthesis: None,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_limits(mut self, max_tokens: usize, summary_max_tokens: usize, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.summary_max_tokens = summary_max_tokens;
        self.temperature = temperature;
        self
    }

    pub fn state(&self) -> ModeratorState {
        self.state
    }

    pub fn display_name(&self) -> &str {
        &self.config.display_name
    }

    pub fn latest_synthesis(&self) -> Option<&str> {
        self.latest_synthesis.as_deref()
    }

    /// Mark the moderator closed without a summary.
    pub fn close(&mut self) {
        self.state = ModeratorState::Closed;
    }

    fn expect_state(&self, expected: ModeratorState, operation: &str) -> Result<(), CouncilError> {
        if self.state != expected {
            return Err(CouncilError::InvalidState(format!(
                "moderator cannot {} while {}",
                operation, self.state
            )));
        }
        Ok(())
    }

    fn request(&self, prompt: String, max_tokens: usize, temperature: f32) -> CompletionRequest {
        CompletionRequest {
            model_id: self.config.model_id.clone(),
            messages: vec![
                Message::system(moderator_system_prompt(self.config.persona.as_deref())),
                Message::user(prompt),
            ],
            max_tokens,
            temperature,
        }
    }

    async fn call(
        &self,
        stage: ModeratorStage,
        request: CompletionRequest,
    ) -> Result<ModeratorTurn, CouncilError> {
        let label = format!("moderator {}", stage);
        let completion = Arc::clone(&self.completion);
        self.policy
            .run(&label, |_| {
                let completion = Arc::clone(&completion);
                let request = request.clone();
                async move {
                    completion
                        .complete(&request)
                        .await
                        .map_err(CouncilError::from)
                }
            })
            .await
            .map(|retried| ModeratorTurn {
                text: retried.value.content,
                attempts: retried.attempts,
                usage: retried.value.usage,
            })
            .map_err(|failure| {
                log::error!(
                    "moderator {} failed after {} attempt(s): {}",
                    stage,
                    failure.attempts,
                    failure.error
                );
                CouncilError::ModeratorUnavailable {
                    stage,
                    attempts: failure.attempts,
                    source: failure.error.to_string(),
                }
            })
    }

    /// Provocative opening for `topic`, naming the members by pseudonym.
    pub async fn open(
        &mut self,
        topic: &str,
        member_pseudonyms: &[String],
    ) -> Result<ModeratorTurn, CouncilError> {
        self.expect_state(ModeratorState::Opening, "open")?;
        self.topic = self.identities.scrub(topic);
        let request = self.request(
            opening_prompt(&self.topic, member_pseudonyms),
            self.max_tokens,
            self.temperature,
        );
        let turn = self.call(ModeratorStage::Opening, request).await?;
        self.state = ModeratorState::Synthesizing;
        Ok(turn)
    }

    /// Interim synthesis of one round. The tone follows the round's phase.
    pub async fn synthesize(
        &mut self,
        round_index: usize,
        total_rounds: usize,
        round_turns: &[&Turn],
        lens_summary: &str,
    ) -> Result<ModeratorTurn, CouncilError> {
        self.expect_state(ModeratorState::Synthesizing, "synthesize")?;
        let phase = phase_for_round(round_index, total_rounds);
        let round_text = self.identities.scrub(&render_turns(round_turns.iter().copied()));
        let previous = self.latest_synthesis.as_deref().map(|s| self.identities.scrub(s));

        let prompt = SynthesisPrompt {
            topic: &self.topic,
            round_index,
            total_rounds,
            phase,
            round_text: &round_text,
            previous_synthesis: previous.as_deref(),
            lens_summary,
        }
        .render();
        log::debug!("round {} synthesis ({}), {} prompt chars", round_index, phase, prompt.len());

        let request = self.request(prompt, self.max_tokens, self.temperature);
        let turn = self.call(ModeratorStage::Synthesis, request).await?;
        self.latest_synthesis = Some(turn.text.clone());
        Ok(turn)
    }

    /// Closing summary over the whole transcript.
    ///
    /// With `search_enabled`, the moderator first plans up to
    /// [`MAX_VERIFICATION_QUERIES`](crate::prompts::MAX_VERIFICATION_QUERIES)
    /// verification queries and runs each through the search service. A failed
    /// planning call or search only narrows what the summary can cite.
    pub async fn finalize(
        &mut self,
        topic: &str,
        transcript: &Transcript,
        search_enabled: bool,
    ) -> Result<FinalSummary, CouncilError> {
        self.expect_state(ModeratorState::Synthesizing, "finalize")?;
        self.state = ModeratorState::FinalSummary;

        let topic = self.identities.scrub(topic);
        let transcript_text = self.identities.scrub(&render_turns(transcript.turns()));

        let mut searches = Vec::new();
        let mut search_context = Vec::new();
        let mut sources = Vec::new();
        if search_enabled {
            for query in self.plan_searches(&topic, &transcript_text).await {
                match self.search.query(&query).await {
                    Ok(response) => {
                        log::info!("search '{}' returned {} result(s)", query, response.results.len());
                        searches.push(SearchRecord {
                            query: query.clone(),
                            outcome: SearchOutcome::Found {
                                result_count: response.results.len(),
                            },
                        });
                        if !response.is_empty() {
                            search_context.push(response.format_for_prompt(&query));
                            sources.extend(response.format_sources().lines().map(String::from));
                        }
                    }
                    Err(e) => {
                        let error = CouncilError::SearchUnavailable(e.0);
                        log::warn!("search '{}' failed, continuing without it: {}", query, error);
                        searches.push(SearchRecord {
                            query,
                            outcome: SearchOutcome::Failed {
                                error: error.to_string(),
                            },
                        });
                    }
                }
            }
        }

        let request = self.request(
            final_summary_prompt(&topic, &transcript_text, &search_context),
            self.summary_max_tokens,
            self.temperature,
        );
        let result = self.call(ModeratorStage::FinalSummary, request).await;
        self.state = ModeratorState::Closed;
        let turn = result?;

        Ok(FinalSummary {
            turn,
            searches,
            sources,
        })
    }

    /// Ask the moderator model which claims deserve a search. Empty on failure.
    async fn plan_searches(&self, topic: &str, transcript_text: &str) -> Vec<String> {
        let request = self.request(
            search_planning_prompt(topic, transcript_text),
            PLANNING_MAX_TOKENS,
            PLANNING_TEMPERATURE,
        );
        match self.completion.complete(&request).await {
            Ok(reply) => {
                let queries = parse_search_queries(&reply.content);
                log::debug!("planned {} verification search(es)", queries.len());
                queries
            }
            Err(e) => {
                log::warn!("search planning failed, summarizing from the transcript only: {}", e);
                Vec::new()
            }
        }
    }
}
