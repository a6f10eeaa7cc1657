use async_trait::async_trait;
use hatcouncil::completion::{Completion, CompletionRequest, CompletionService, TokenUsage};
use hatcouncil::config::{ModelRoster, SessionConfig, SpeakingOrder};
use hatcouncil::error::{CouncilError, ModeratorStage, UpstreamError};
use hatcouncil::event::{EventHandler, SessionEvent};
use hatcouncil::lens::Lens;
use hatcouncil::moderator::ModeratorState;
use hatcouncil::phase::Phase;
use hatcouncil::retry::RecordingSleeper;
use hatcouncil::search::{SearchError, SearchHit, SearchResponse, SearchService};
use hatcouncil::session::{CloseTrigger, Session, SessionControls, SessionOutcome};
use hatcouncil::transcript::{Speaker, TurnKind};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const MODERATOR: &str = "mod/moderator";
const ALPHA: &str = "m/alpha";
const BRAVO: &str = "m/bravo";
const CHARLIE: &str = "m/charlie";

/// Completion service scripted per model. Unscripted calls get a generic reply.
struct ScriptedCompletion {
    scripts: Mutex<HashMap<String, VecDeque<Result<String, UpstreamError>>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    counter: Mutex<usize>,
}

impl ScriptedCompletion {
    fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            counter: Mutex::new(0),
        }
    }

    fn script(mut self, model: &str, replies: Vec<Result<&str, UpstreamError>>) -> Self {
        self.scripts.get_mut().insert(
            model.to_string(),
            replies
                .into_iter()
                .map(|r| r.map(|s| s.to_string()))
                .collect(),
        );
        self
    }

    async fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }

    async fn requests_for(&self, model: &str) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .await
            .iter()
            .filter(|r| r.model_id == model)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, UpstreamError> {
        self.requests.lock().await.push(request.clone());
        let scripted = self
            .scripts
            .lock()
            .await
            .get_mut(&request.model_id)
            .and_then(|queue| queue.pop_front());
        let text = match scripted {
            Some(reply) => reply?,
            None => {
                let mut counter = self.counter.lock().await;
                *counter += 1;
                format!("Reply {} on the record. What assumption are we missing?", *counter)
            }
        };
        Ok(Completion {
            content: text,
            usage: Some(TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
                total_tokens: 15,
            }),
        })
    }
}

struct FailingSearch {
    queries: Mutex<Vec<String>>,
}

#[async_trait]
impl SearchService for FailingSearch {
    async fn query(&self, text: &str) -> Result<SearchResponse, SearchError> {
        self.queries.lock().await.push(text.to_string());
        Err(SearchError("backend down".into()))
    }
}

struct StaticSearch;

#[async_trait]
impl SearchService for StaticSearch {
    async fn query(&self, text: &str) -> Result<SearchResponse, SearchError> {
        if text.contains("broken") {
            return Err(SearchError("quota exceeded".into()));
        }
        Ok(SearchResponse {
            answer: Some("Congestion fell by a fifth.".into()),
            results: vec![SearchHit {
                title: "City study".into(),
                url: "https://study.example/congestion".into(),
                content: "Measured traffic before and after the charge.".into(),
            }],
        })
    }
}

/// Collects every event and can pull a control lever when a round starts
/// or cancel once a given turn lands.
#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<SessionEvent>>,
    on_round_start: Option<(usize, SessionControls, Lever)>,
    cancel_on_turn: Option<(CancelPoint, SessionControls)>,
}

#[derive(Clone, Copy)]
enum CancelPoint {
    /// The n-th member speech of the session.
    Speech(usize),
    /// The synthesis closing the given round.
    Synthesis(usize),
}

#[derive(Clone, Copy)]
enum Lever {
    EarlySummary,
    Cancel,
}

impl Recorder {
    fn pulling(round: usize, controls: SessionControls, lever: Lever) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            on_round_start: Some((round, controls, lever)),
            cancel_on_turn: None,
        }
    }

    fn cancelling_at(point: CancelPoint, controls: SessionControls) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            on_round_start: None,
            cancel_on_turn: Some((point, controls)),
        }
    }

    async fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventHandler for Recorder {
    async fn on_session_event(&self, event: &SessionEvent) {
        if let (SessionEvent::RoundStarted { round, .. }, Some((target, controls, lever))) =
            (event, &self.on_round_start)
        {
            if round == target {
                match lever {
                    Lever::EarlySummary => controls.request_early_summary(),
                    Lever::Cancel => controls.request_cancellation(),
                }
            }
        }
        let mut events = self.events.lock().await;
        events.push(event.clone());
        if let (SessionEvent::TurnAppended { turn }, Some((point, controls))) =
            (event, &self.cancel_on_turn)
        {
            let hit = match *point {
                CancelPoint::Speech(nth) => {
                    turn.is_member_speech()
                        && events
                            .iter()
                            .filter(|e| matches!(e, SessionEvent::TurnAppended { turn } if turn.is_member_speech()))
                            .count()
                            == nth
                }
                CancelPoint::Synthesis(round) => {
                    matches!(turn.kind, TurnKind::Synthesis { .. }) && turn.round_index == round
                }
            };
            if hit {
                controls.request_cancellation();
            }
        }
    }
}

fn three_member_config(rounds: usize) -> SessionConfig {
    SessionConfig::new("Should cities ban private cars from their centres?")
        .with_member(ALPHA)
        .with_member(BRAVO)
        .with_member(CHARLIE)
        .with_moderator(MODERATOR)
        .with_rounds(rounds)
        .with_search(false)
        .with_seed(7)
}

fn build(
    config: SessionConfig,
    completion: Arc<ScriptedCompletion>,
    search: Arc<dyn SearchService>,
    sleeper: Arc<RecordingSleeper>,
) -> Session {
    Session::new(config, &ModelRoster::default_catalog(), completion, search)
        .unwrap()
        .with_sleeper(sleeper)
}

fn no_search() -> Arc<dyn SearchService> {
    Arc::new(FailingSearch {
        queries: Mutex::new(Vec::new()),
    })
}

#[tokio::test]
async fn three_members_two_rounds_produce_ten_turns() {
    let completion = Arc::new(ScriptedCompletion::new());
    let sleeper = Arc::new(RecordingSleeper::new());
    let mut session = build(three_member_config(2), completion.clone(), no_search(), sleeper.clone());

    let report = session.run().await;

    assert_eq!(
        report.outcome,
        SessionOutcome::Completed {
            trigger: CloseTrigger::AllRounds
        }
    );
    assert_eq!(report.transcript.len(), 10);
    let kinds: Vec<TurnKind> = report.transcript.iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TurnKind::Opening,
            TurnKind::Speech,
            TurnKind::Speech,
            TurnKind::Speech,
            TurnKind::Synthesis {
                phase: Phase::Provocative
            },
            TurnKind::Speech,
            TurnKind::Speech,
            TurnKind::Speech,
            TurnKind::Synthesis {
                phase: Phase::Convergent
            },
            TurnKind::FinalSummary,
        ]
    );
    for (i, turn) in report.transcript.iter().enumerate() {
        assert_eq!(turn.index, i);
        assert_eq!(turn.lens.is_some(), turn.kind == TurnKind::Speech);
    }
    assert_eq!(report.rounds_completed, 2);
    assert_eq!(report.lens_usage.total(), 6);
    assert!(report.deactivations.is_empty());
    assert_eq!(report.total_usage.total_tokens, 15 * 10);
    assert!(sleeper.delays().is_empty());
    assert_eq!(session.moderator_state(), ModeratorState::Closed);
    assert_eq!(completion.requests().await.len(), 10);
}

#[tokio::test]
async fn transient_member_failure_retries_once_after_two_seconds() {
    let completion = Arc::new(
        ScriptedCompletion::new().script(
            ALPHA,
            vec![
                Err(UpstreamError::RateLimited("429".into())),
                Ok("Cars cost cities more than they pay. Who pays for transit?"),
            ],
        ),
    );
    let sleeper = Arc::new(RecordingSleeper::new());
    let config = SessionConfig::new("topic")
        .with_member(ALPHA)
        .with_moderator(MODERATOR)
        .with_rounds(1)
        .with_search(false);
    let mut session = build(config, completion.clone(), no_search(), sleeper.clone());

    let report = session.run().await;

    assert_eq!(sleeper.delays(), vec![Duration::from_secs(2)]);
    assert!(report.deactivations.is_empty());
    assert_eq!(completion.requests_for(ALPHA).await.len(), 2);
    let speech = report
        .transcript
        .iter()
        .find(|t| t.kind == TurnKind::Speech)
        .unwrap();
    assert!(speech.text.starts_with("Cars cost cities"));
}

#[tokio::test]
async fn member_failing_twice_is_deactivated_and_skipped_afterwards() {
    let completion = Arc::new(ScriptedCompletion::new().script(
        BRAVO,
        vec![
            Err(UpstreamError::RateLimited("overloaded".into())),
            Err(UpstreamError::RateLimited("overloaded".into())),
        ],
    ));
    let sleeper = Arc::new(RecordingSleeper::new());
    let mut session = build(three_member_config(3), completion.clone(), no_search(), sleeper.clone());
    let bravo_id = session
        .participants()
        .iter()
        .find(|p| p.model_id == BRAVO)
        .map(|p| p.id)
        .unwrap();

    let report = session.run().await;

    assert!(!report.is_aborted());
    assert_eq!(report.deactivations.len(), 1);
    let deactivation = &report.deactivations[0];
    assert_eq!(deactivation.participant, bravo_id);
    assert_eq!(deactivation.round, 1);
    assert_eq!(deactivation.attempts, 2);
    assert_eq!(sleeper.delays(), vec![Duration::from_secs(2)]);

    let bravo_turns = report
        .transcript
        .iter()
        .filter(|t| t.speaker == Speaker::Member(bravo_id))
        .count();
    assert_eq!(bravo_turns, 0);
    assert_eq!(completion.requests_for(BRAVO).await.len(), 2);
    for round in 2..=3 {
        let speeches = report
            .transcript
            .iter()
            .filter(|t| t.kind == TurnKind::Speech && t.round_index == round)
            .count();
        assert_eq!(speeches, 2, "round {}", round);
    }
    let bravo_info = report.participants.iter().find(|p| p.id == bravo_id).unwrap();
    assert!(!bravo_info.is_active);
}

#[tokio::test]
async fn permanent_member_failure_is_not_retried() {
    let completion = Arc::new(
        ScriptedCompletion::new()
            .script(CHARLIE, vec![Err(UpstreamError::PermanentFailure("unknown model".into()))]),
    );
    let sleeper = Arc::new(RecordingSleeper::new());
    let mut session = build(three_member_config(2), completion.clone(), no_search(), sleeper.clone());

    let report = session.run().await;

    assert_eq!(report.deactivations.len(), 1);
    assert_eq!(report.deactivations[0].attempts, 1);
    assert!(report.deactivations[0].reason.contains("unknown model"));
    assert!(sleeper.delays().is_empty());
    assert_eq!(completion.requests_for(CHARLIE).await.len(), 1);
}

#[tokio::test]
async fn early_summary_during_round_two_finalizes_after_its_synthesis() {
    let completion = Arc::new(ScriptedCompletion::new());
    let sleeper = Arc::new(RecordingSleeper::new());
    let session = build(three_member_config(5), completion.clone(), no_search(), sleeper);
    let recorder = Arc::new(Recorder::pulling(2, session.controls(), Lever::EarlySummary));
    let mut session = session.with_event_handler(recorder.clone());

    let report = session.run().await;

    assert_eq!(
        report.outcome,
        SessionOutcome::Completed {
            trigger: CloseTrigger::EarlySummary
        }
    );
    assert_eq!(report.rounds_completed, 2);
    let syntheses = report
        .transcript
        .iter()
        .filter(|t| matches!(t.kind, TurnKind::Synthesis { .. }))
        .count();
    assert_eq!(syntheses, 2);
    let last = report.transcript.last().unwrap();
    assert_eq!(last.kind, TurnKind::FinalSummary);
    let before_last = &report.transcript[report.transcript.len() - 2];
    assert_eq!(
        before_last.kind,
        TurnKind::Synthesis {
            phase: Phase::Provocative
        }
    );
    assert_eq!(before_last.round_index, 2);

    let events = recorder.events().await;
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::EarlySummaryTriggered { after_round: 2 })));
    assert!(!events
        .iter()
        .any(|e| matches!(e, SessionEvent::RoundStarted { round: 3, .. })));
}

#[tokio::test]
async fn cancellation_before_any_round_ends_without_summary() {
    let completion = Arc::new(ScriptedCompletion::new());
    let sleeper = Arc::new(RecordingSleeper::new());
    let mut session = build(three_member_config(3), completion.clone(), no_search(), sleeper);
    session.controls().request_cancellation();

    let report = session.run().await;

    assert_eq!(report.outcome, SessionOutcome::Cancelled);
    assert!(report.final_summary().is_none());
    assert_eq!(report.transcript.len(), 1);
    assert_eq!(report.transcript[0].kind, TurnKind::Opening);
    assert_eq!(report.rounds_completed, 0);
    assert_eq!(completion.requests().await.len(), 1);
    assert_eq!(session.moderator_state(), ModeratorState::Closed);
}

#[tokio::test]
async fn cancellation_after_a_completed_round_still_summarizes() {
    let completion = Arc::new(ScriptedCompletion::new());
    let sleeper = Arc::new(RecordingSleeper::new());
    let session = build(three_member_config(4), completion.clone(), no_search(), sleeper);
    let recorder = Arc::new(Recorder::pulling(2, session.controls(), Lever::Cancel));
    let mut session = session.with_event_handler(recorder.clone());

    let report = session.run().await;

    assert_eq!(
        report.outcome,
        SessionOutcome::Completed {
            trigger: CloseTrigger::Cancelled
        }
    );
    assert_eq!(report.rounds_completed, 1);
    assert!(report.final_summary().is_some());
    assert!(report
        .transcript
        .iter()
        .all(|t| t.kind != TurnKind::Speech || t.round_index == 1));
    assert!(recorder
        .events()
        .await
        .iter()
        .any(|e| matches!(e, SessionEvent::CancellationObserved { round: 2 })));
}

#[tokio::test]
async fn cancellation_on_the_last_speech_of_round_one_skips_every_summary() {
    for rounds in [1, 3] {
        let completion = Arc::new(ScriptedCompletion::new());
        let sleeper = Arc::new(RecordingSleeper::new());
        let session = build(three_member_config(rounds), completion.clone(), no_search(), sleeper);
        let recorder = Arc::new(Recorder::cancelling_at(CancelPoint::Speech(3), session.controls()));
        let mut session = session.with_event_handler(recorder.clone());

        let report = session.run().await;

        assert_eq!(report.outcome, SessionOutcome::Cancelled, "{} round(s)", rounds);
        assert_eq!(report.rounds_completed, 0);
        assert!(report.final_summary().is_none());
        let kinds: Vec<TurnKind> = report.transcript.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![TurnKind::Opening, TurnKind::Speech, TurnKind::Speech, TurnKind::Speech]
        );
        // Opening plus three speeches, no synthesis request.
        assert_eq!(completion.requests().await.len(), 4);
        assert!(recorder
            .events()
            .await
            .iter()
            .any(|e| matches!(e, SessionEvent::CancellationObserved { round: 1 })));
    }
}

#[tokio::test]
async fn cancellation_after_the_only_round_is_reported() {
    let completion = Arc::new(ScriptedCompletion::new());
    let sleeper = Arc::new(RecordingSleeper::new());
    let session = build(three_member_config(1), completion.clone(), no_search(), sleeper);
    let recorder = Arc::new(Recorder::cancelling_at(CancelPoint::Synthesis(1), session.controls()));
    let mut session = session.with_event_handler(recorder.clone());

    let report = session.run().await;

    assert_eq!(
        report.outcome,
        SessionOutcome::Completed {
            trigger: CloseTrigger::Cancelled
        }
    );
    assert_eq!(report.rounds_completed, 1);
    assert!(report.final_summary().is_some());
    assert!(recorder
        .events()
        .await
        .iter()
        .any(|e| matches!(e, SessionEvent::CancellationObserved { round: 1 })));
}

#[tokio::test]
async fn moderator_exhausting_retries_aborts_the_session() {
    let overloaded = || Err(UpstreamError::RateLimited("503".into()));
    let completion = Arc::new(ScriptedCompletion::new().script(
        MODERATOR,
        vec![overloaded(), overloaded(), overloaded(), overloaded(), overloaded()],
    ));
    let sleeper = Arc::new(RecordingSleeper::new());
    let mut session = build(three_member_config(2), completion.clone(), no_search(), sleeper.clone());

    let report = session.run().await;

    match &report.outcome {
        SessionOutcome::Aborted {
            error: CouncilError::ModeratorUnavailable { stage, attempts, .. },
        } => {
            assert_eq!(*stage, ModeratorStage::Opening);
            assert_eq!(*attempts, 5);
        }
        other => panic!("expected an aborted session, got {:?}", other),
    }
    assert!(report.transcript.is_empty());
    assert_eq!(
        sleeper.delays(),
        vec![
            Duration::from_secs(2),
            Duration::from_secs(4),
            Duration::from_secs(8),
            Duration::from_secs(16)
        ]
    );
    assert!(report.surfaced_error().is_some());
}

#[tokio::test]
async fn permanent_synthesis_failure_aborts_after_round_one() {
    let completion = Arc::new(ScriptedCompletion::new().script(
        MODERATOR,
        vec![
            Ok("Let the fight begin."),
            Err(UpstreamError::PermanentFailure("content policy".into())),
        ],
    ));
    let sleeper = Arc::new(RecordingSleeper::new());
    let mut session = build(three_member_config(3), completion, no_search(), sleeper);

    let report = session.run().await;

    assert!(matches!(
        report.outcome,
        SessionOutcome::Aborted {
            error: CouncilError::ModeratorUnavailable {
                stage: ModeratorStage::Synthesis,
                attempts: 1,
                ..
            }
        }
    ));
    assert_eq!(report.rounds_completed, 0);
    assert_eq!(report.transcript.len(), 4);
    assert!(report.final_summary().is_none());
}

#[tokio::test]
async fn losing_every_member_surfaces_no_active_participants_and_still_summarizes() {
    let fail = || Err(UpstreamError::PermanentFailure("revoked key".into()));
    let completion = Arc::new(
        ScriptedCompletion::new()
            .script(ALPHA, vec![fail()])
            .script(BRAVO, vec![fail()])
            .script(CHARLIE, vec![fail()]),
    );
    let sleeper = Arc::new(RecordingSleeper::new());
    let recorder = Arc::new(Recorder::default());
    let mut session = build(three_member_config(3), completion.clone(), no_search(), sleeper)
        .with_event_handler(recorder.clone());

    let report = session.run().await;

    assert_eq!(
        report.outcome,
        SessionOutcome::Completed {
            trigger: CloseTrigger::NoActiveParticipants
        }
    );
    assert_eq!(report.surfaced_error(), Some(CouncilError::NoActiveParticipants));
    assert_eq!(report.deactivations.len(), 3);
    assert!(report.final_summary().is_some());
    assert!(!report
        .transcript
        .iter()
        .any(|t| matches!(t.kind, TurnKind::Synthesis { .. })));
    assert_eq!(completion.requests_for(MODERATOR).await.len(), 2);
    assert!(recorder
        .events()
        .await
        .iter()
        .any(|e| matches!(e, SessionEvent::NoActiveParticipants { round: 1, .. })));
}

#[tokio::test]
async fn failed_searches_fall_back_to_the_transcript() {
    let completion = Arc::new(ScriptedCompletion::new().script(
        MODERATOR,
        vec![
            Ok("Opening."),
            Ok("Synthesis."),
            Ok("1. private car bans in city centres\n2. congestion charge results"),
            Ok("Final summary from the discussion alone."),
        ],
    ));
    let search = Arc::new(FailingSearch {
        queries: Mutex::new(Vec::new()),
    });
    let sleeper = Arc::new(RecordingSleeper::new());
    let recorder = Arc::new(Recorder::default());
    let config = three_member_config(1).with_search(true);
    let mut session = build(config, completion.clone(), search.clone(), sleeper)
        .with_event_handler(recorder.clone());

    let report = session.run().await;

    assert_eq!(
        report.outcome,
        SessionOutcome::Completed {
            trigger: CloseTrigger::AllRounds
        }
    );
    assert_eq!(
        report.final_summary().map(|t| t.text.as_str()),
        Some("Final summary from the discussion alone.")
    );
    assert_eq!(search.queries.lock().await.len(), 2);
    let failures = recorder
        .events()
        .await
        .iter()
        .filter(|e| matches!(e, SessionEvent::SearchFailed { .. }))
        .count();
    assert_eq!(failures, 2);

    let summary_request = completion.requests_for(MODERATOR).await.pop().unwrap();
    assert!(!summary_request.prompt_text().contains("Verification searches"));
    assert_eq!(summary_request.max_tokens, 1000);
    assert!(report.sources.is_empty());
}

#[tokio::test]
async fn successful_searches_are_cited_in_the_summary_prompt() {
    let completion = Arc::new(ScriptedCompletion::new().script(
        MODERATOR,
        vec![
            Ok("Opening."),
            Ok("Synthesis."),
            Ok("congestion charge results\nbroken query"),
            Ok("Final summary with sources."),
        ],
    ));
    let sleeper = Arc::new(RecordingSleeper::new());
    let recorder = Arc::new(Recorder::default());
    let config = three_member_config(1).with_search(true);
    let mut session = build(config, completion.clone(), Arc::new(StaticSearch), sleeper)
        .with_event_handler(recorder.clone());

    let report = session.run().await;

    let summary_request = completion.requests_for(MODERATOR).await.pop().unwrap();
    let prompt = summary_request.prompt_text();
    assert!(prompt.contains("Verification searches"));
    assert!(prompt.contains("https://study.example/congestion"));
    assert_eq!(report.sources, vec!["- [City study](https://study.example/congestion)".to_string()]);

    let events = recorder.events().await;
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::SearchPerformed { result_count: 1, .. }
    )));
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::SearchFailed { .. })));
}

#[tokio::test]
async fn first_member_turn_wears_white_or_green_hat() {
    for seed in 0..25 {
        let completion = Arc::new(ScriptedCompletion::new());
        let config = three_member_config(1).with_seed(seed);
        let mut session = build(config, completion, no_search(), Arc::new(RecordingSleeper::new()));

        let report = session.run().await;

        let first = report
            .transcript
            .iter()
            .find(|t| t.kind == TurnKind::Speech)
            .unwrap();
        assert!(
            matches!(first.lens, Some(Lens::Fact) | Some(Lens::Alternative)),
            "seed {} opened with {:?}",
            seed,
            first.lens
        );
    }
}

#[tokio::test]
async fn prompts_never_reveal_real_model_identities() {
    let gpt = "openai/gpt-5.2";
    let grok = "x-ai/grok-4.1-fast";
    let deepseek = "deepseek/deepseek-v3.2";
    let completion = Arc::new(
        ScriptedCompletion::new()
            .script(gpt, vec![Ok("Speaking as GPT-5.2: cars must go. Does x-ai/grok-4.1-fast agree?")])
            .script(grok, vec![Ok("Grok 4.1 Fast here. DeepSeek V3.2 will object, won't it?")])
            .script(deepseek, vec![Ok("I am deepseek/deepseek-v3.2 and I object. Why ban at all?")]),
    );
    let config = SessionConfig::new("Should cities ban private cars?")
        .with_member(gpt)
        .with_member(grok)
        .with_member(deepseek)
        .with_moderator(MODERATOR)
        .with_rounds(2)
        .with_search(false)
        .with_seed(11);
    let mut session = build(config, completion.clone(), no_search(), Arc::new(RecordingSleeper::new()));

    let report = session.run().await;
    assert!(!report.is_aborted());

    let forbidden = [gpt, grok, deepseek, "GPT-5.2", "Grok 4.1 Fast", "DeepSeek V3.2"];
    for request in completion.requests().await {
        let prompt = request.prompt_text();
        for needle in forbidden {
            assert!(
                !prompt.contains(needle),
                "prompt for {} leaked {}",
                request.model_id,
                needle
            );
        }
    }

    // The quoted prior speech reaches the next member under its pseudonym.
    let identities = session.identities();
    let gpt_name = identities.pseudonym_for(gpt).unwrap();
    let prompts_mentioning_gpt = completion
        .requests()
        .await
        .iter()
        .filter(|r| r.prompt_text().contains(&format!("Speaking as {}", gpt_name)))
        .count();
    assert!(prompts_mentioning_gpt > 0);
}

#[tokio::test]
async fn shuffled_order_gives_every_member_one_turn_per_round() {
    let completion = Arc::new(ScriptedCompletion::new());
    let config = three_member_config(3).with_speaking_order(SpeakingOrder::ShuffledPerRound);
    let mut session = build(config, completion, no_search(), Arc::new(RecordingSleeper::new()));

    let report = session.run().await;

    for round in 1..=3 {
        let mut speakers: Vec<Speaker> = report
            .transcript
            .iter()
            .filter(|t| t.kind == TurnKind::Speech && t.round_index == round)
            .map(|t| t.speaker)
            .collect();
        speakers.sort_by_key(|s| match s {
            Speaker::Member(id) => id.0,
            Speaker::Moderator => usize::MAX,
        });
        speakers.dedup();
        assert_eq!(speakers.len(), 3, "round {}", round);
    }
}

#[tokio::test]
async fn events_mirror_the_transcript() {
    let completion = Arc::new(ScriptedCompletion::new());
    let recorder = Arc::new(Recorder::default());
    let mut session = build(three_member_config(2), completion, no_search(), Arc::new(RecordingSleeper::new()))
        .with_event_handler(recorder.clone());

    let report = session.run().await;
    let events = recorder.events().await;

    assert!(matches!(events.first(), Some(SessionEvent::SessionStarted { .. })));
    assert!(matches!(
        events.last(),
        Some(SessionEvent::SessionFinished {
            aborted: false,
            rounds_completed: 2,
            ..
        })
    ));
    let appended: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::TurnAppended { turn } => Some(turn.index),
            _ => None,
        })
        .collect();
    assert_eq!(appended, (0..report.transcript.len()).collect::<Vec<_>>());
    let lens_events = events
        .iter()
        .filter(|e| matches!(e, SessionEvent::LensAssigned { .. }))
        .count();
    assert_eq!(lens_events, 6);
}

#[tokio::test]
async fn a_session_runs_only_once() {
    let completion = Arc::new(ScriptedCompletion::new());
    let mut session = build(three_member_config(1), completion, no_search(), Arc::new(RecordingSleeper::new()));

    let first = session.run().await;
    let second = session.run().await;

    assert!(!first.is_aborted());
    assert!(matches!(
        second.outcome,
        SessionOutcome::Aborted {
            error: CouncilError::InvalidState(_)
        }
    ));
    assert_eq!(second.transcript.len(), first.transcript.len());
}

#[test]
fn invalid_configuration_is_rejected_before_start() {
    let completion: Arc<dyn CompletionService> = Arc::new(ScriptedCompletion::new());
    let config = SessionConfig::new("topic")
        .with_member(ALPHA)
        .with_member(ALPHA);
    let result = Session::new(config, &ModelRoster::default_catalog(), completion, no_search());
    assert!(matches!(result, Err(CouncilError::Configuration(_))));
}
