//! Member turn generation.
//!
//! A [`MemberTurnGenerator`] builds the lens-aware prompt for one member, calls the
//! completion service through the member [`RetryPolicy`] and records the outcome:
//! a successful turn is appended to the transcript and counted against its lens, a
//! failed one deactivates the member.

use crate::completion::{CompletionRequest, CompletionService, Message, TokenUsage};
use crate::error::CouncilError;
use crate::identity::{AnonymizationMap, Participant};
use crate::lens::{Lens, LensUsageCounter};
use crate::prompts::{member_system_prompt, MemberPrompt, PriorTurn};
use crate::retry::{RetryFailure, RetryPolicy};
use crate::transcript::{extract_question, Speaker, Transcript, TurnKind};
use std::sync::Arc;

/// Mutable session state a member turn reads from and writes to.
pub struct TurnContext<'a> {
    pub topic: &'a str,
    pub transcript: &'a mut Transcript,
    pub usage: &'a mut LensUsageCounter,
}

/// A member turn that made it into the transcript.
#[derive(Debug, Clone)]
pub struct SpokenTurn {
    pub turn_index: usize,
    pub attempts: u32,
    pub usage: Option<TokenUsage>,
}

pub struct MemberTurnGenerator {
    completion: Arc<dyn CompletionService>,
    identities: AnonymizationMap,
    policy: RetryPolicy,
    max_tokens: usize,
    temperature: f32,
}

impl MemberTurnGenerator {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        identities: AnonymizationMap,
        max_tokens: usize,
        temperature: f32,
    ) -> Self {
        Self {
            completion,
            identities,
            policy: RetryPolicy::member(),
            max_tokens,
            temperature,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Build the request `participant` would send wearing `lens`.
    ///
    /// The previous member speech is quoted (scrubbed) together with its closing
    /// question; on the very first member turn there is nothing to quote and that
    /// part of the prompt is left out.
    pub fn build_request(
        &self,
        participant: &Participant,
        lens: Lens,
        topic: &str,
        transcript: &Transcript,
    ) -> CompletionRequest {
        let prior = transcript.last_member_speech().map(|turn| {
            let text = self.identities.scrub(&turn.text);
            let question = extract_question(&text);
            (turn.speaker_name.clone(), text, question)
        });
        let synthesis = transcript
            .latest_synthesis()
            .map(|turn| self.identities.scrub(&turn.text));
        let topic = self.identities.scrub(topic);

        let user = MemberPrompt {
            topic: &topic,
            speaker_name: &participant.pseudonym,
            lens,
            prior: prior.as_ref().map(|(name, text, question)| PriorTurn {
                speaker_name: name,
                text,
                question: question.as_deref(),
            }),
            latest_synthesis: synthesis.as_deref(),
        }
        .render();

        CompletionRequest {
            model_id: participant.model_id.clone(),
            messages: vec![
                Message::system(member_system_prompt(lens, participant.persona.as_deref())),
                Message::user(user),
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    /// Generate one turn for `participant` in `round_index`.
    ///
    /// # Errors
    ///
    /// [`CouncilError::InvalidState`] (zero attempts) when the participant is already
    /// inactive. Otherwise the last upstream error once the member policy gives up;
    /// the participant has been deactivated by then and nothing was appended.
    pub async fn speak(
        &self,
        participant: &mut Participant,
        lens: Lens,
        round_index: usize,
        context: TurnContext<'_>,
    ) -> Result<SpokenTurn, RetryFailure> {
        if !participant.is_active() {
            return Err(RetryFailure {
                error: CouncilError::InvalidState(format!(
                    "{} is inactive and cannot speak",
                    participant.pseudonym
                )),
                attempts: 0,
            });
        }

        let request = self.build_request(participant, lens, context.topic, context.transcript);
        log::debug!(
            "{} speaking in round {} as {:?} ({} prompt chars)",
            participant.pseudonym,
            round_index,
            lens,
            request.prompt_text().len()
        );

        let label = format!("member {}", participant.pseudonym);
        let completion = Arc::clone(&self.completion);
        let outcome = self
            .policy
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
            .await;

        match outcome {
            Ok(retried) => {
                let turn = context.transcript.append(
                    Speaker::Member(participant.id),
                    participant.pseudonym.clone(),
                    round_index,
                    Some(lens),
                    TurnKind::Speech,
                    retried.value.content,
                );
                let turn_index = turn.index;
                context.usage.record(lens);
                Ok(SpokenTurn {
                    turn_index,
                    attempts: retried.attempts,
                    usage: retried.value.usage,
                })
            }
            Err(failure) => {
                log::warn!(
                    "deactivating {} after {} attempt(s): {}",
                    participant.pseudonym,
                    failure.attempts,
                    failure.error
                );
                participant.deactivate();
                Err(failure)
            }
        }
    }
}
