//! Prompt text for the moderator and the members.
//!
//! Every function here is pure string assembly. Callers are responsible for passing
//! transcript excerpts that have already been through
//! [`AnonymizationMap::scrub`](crate::identity::AnonymizationMap::scrub).

use crate::lens::Lens;
use crate::phase::Phase;
use crate::transcript::Turn;

/// Base system prompt of the provocative moderator.
pub const MODERATOR_SYSTEM_PROMPT: &str = "You moderate a discussion held by a council of AI members.

Core attitude:
- You are not a neutral referee. You are the catalyst of the discussion.
- Your job is to make sparks fly, not to keep the peace.
- When positions sound too alike, draw out the disagreement.
- When positions drift too far apart, force them to confront each other.

Duties:
1. Opening: frame the topic as a challenge and foreshadow where the conflicts will be.
2. Round syntheses:
   - Early rounds: call out contradictions, name the clashes, raise the tension.
   - Later rounds: converge, integrate the positions, prepare the conclusion.
3. Watch the hat distribution and point out which angle of thought is still missing.
   Hats are assigned to members at random; you cannot choose them.

Output rules:
1. Be brief and forceful. No pleasantries.
2. Keep syntheses to two or three sentences.
3. You may criticise members by name: \"Alice's optimism ignores the risk Bob raised.\"";

/// Rules every member follows regardless of hat.
const SOCRATIC_RULES: &str = "Socratic rules (mandatory):
1. Quote first: open by quoting one specific claim from the previous speaker verbatim and challenge it.
2. Question last: end with one pointed question to the next speaker that exposes an unstated assumption in your own position.
3. No pleasantries: never say \"thank you\", \"good point\" or \"I agree\" as filler.
4. Get to the point in the very first sentence.";

/// Verification queries the moderator may request before its final summary.
pub const MAX_VERIFICATION_QUERIES: usize = 3;

pub fn moderator_system_prompt(persona: Option<&str>) -> String {
    match persona {
        Some(persona) if !persona.trim().is_empty() => {
            format!("{}\n\n{}", persona.trim(), MODERATOR_SYSTEM_PROMPT)
        }
        _ => MODERATOR_SYSTEM_PROMPT.to_string(),
    }
}

pub fn opening_prompt(topic: &str, member_names: &[String]) -> String {
    format!(
        "Open the discussion of the following topic.

**Topic**: {topic}

**Members**: {members}

Please:
1. Introduce the topic in one or two sentences.
2. Frame it as a challenge and name at least one conflict you expect to surface.
3. Set expectations: every member will speak under a randomly assigned thinking hat.",
        topic = topic,
        members = member_names.join(", ")
    )
}

/// Render turns as `heading:\ntext` blocks separated by blank lines.
pub fn render_turns<'a, I>(turns: I) -> String
where
    I: IntoIterator<Item = &'a Turn>,
{
    turns
        .into_iter()
        .map(|turn| format!("{}:\n{}", turn.heading(), turn.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Inputs for an interim synthesis prompt.
pub struct SynthesisPrompt<'a> {
    pub topic: &'a str,
    pub round_index: usize,
    pub total_rounds: usize,
    pub phase: Phase,
    /// The round's member speeches, already rendered and scrubbed.
    pub round_text: &'a str,
    pub previous_synthesis: Option<&'a str>,
    pub lens_summary: &'a str,
}

impl SynthesisPrompt<'_> {
    pub fn render(&self) -> String {
        let style = match self.phase {
            Phase::Provocative => {
                "Style for this round: SHARPEN THE CONFLICT
- Point out where positions collide
- Question any agreement that came too easily
- Challenge the blind spots of individual speakers
- Foreshadow the confrontations still to come"
            }
            Phase::Convergent => {
                "Style for this round: CONVERGE
- Summarise where the council agrees and where it still disagrees
- Steer the discussion toward a conclusion
- Name the questions that remain unresolved
- Prepare the ground for the final summary"
            }
        };

        let mut prompt = String::new();
        if let Some(previous) = self.previous_synthesis {
            prompt.push_str(&format!("**Previous synthesis**:\n{}\n\n", previous.trim()));
        }
        if !self.lens_summary.is_empty() {
            prompt.push_str(&format!("**Hat distribution**: {}\n\n", self.lens_summary));
        }
        prompt.push_str(&format!(
            "**Topic**: {}\n**Round**: {} of {}\n\n**This round's contributions**:\n{}\n\n{}\n\n\
             Write your synthesis of the round (two or three sentences):\n\
             1. The core positions that were put forward\n\
             2. Where members clash or echo each other\n\
             3. A hint or a challenge for the next round",
            self.topic, self.round_index, self.total_rounds, self.round_text, style
        ));
        prompt
    }
}

pub fn search_planning_prompt(topic: &str, transcript_text: &str) -> String {
    format!(
        "The discussion below is over. Before you write the final summary you may verify \
         factual claims with a web search.

**Topic**: {topic}

**Full discussion**:
{transcript}

List up to {max} short web search queries, one per line, that would verify the most \
important factual claims made above. Reply with the queries only. Reply with NONE if \
nothing needs verifying.",
        topic = topic,
        transcript = transcript_text,
        max = MAX_VERIFICATION_QUERIES
    )
}

/// Pull queries out of a planning reply. Bullets and numbering are stripped.
///
/// ```
/// use hatcouncil::prompts::parse_search_queries;
///
/// let reply = "1. EU car ban results\n- congestion charge London data\n\nNONE";
/// assert_eq!(
///     parse_search_queries(reply),
///     vec!["EU car ban results", "congestion charge London data"]
/// );
/// assert!(parse_search_queries("NONE").is_empty());
/// ```
pub fn parse_search_queries(reply: &str) -> Vec<String> {
    reply
        .lines()
        .map(|line| strip_list_marker(line.trim()).trim().trim_matches('"').to_string())
        .filter(|line| !line.is_empty() && !line.eq_ignore_ascii_case("none"))
        .take(MAX_VERIFICATION_QUERIES)
        .collect()
}

/// Drops a leading bullet or `1.` / `1)` marker. Digits that are part of the
/// query itself ("2024 results", "3.5 million") stay.
fn strip_list_marker(line: &str) -> &str {
    if let Some(rest) = line.strip_prefix(['-', '*', '•']) {
        return rest;
    }
    let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return line;
    }
    let rest = &line[digits..];
    match rest.strip_prefix(['.', ')']) {
        Some(after) if after.is_empty() || after.starts_with(char::is_whitespace) => after,
        _ => line,
    }
}

pub fn final_summary_prompt(topic: &str, transcript_text: &str, search_context: &[String]) -> String {
    let mut prompt = format!(
        "The discussion is over. Write the final summary.\n\n\
         **Topic**: {}\n\n**Full discussion**:\n{}\n\n",
        topic, transcript_text
    );
    if !search_context.is_empty() {
        prompt.push_str("**Verification searches**:\n");
        prompt.push_str(&search_context.join("\n\n"));
        prompt.push_str("\n\nWhere a claim is confirmed or contradicted by these results, say so and cite the source.\n\n");
    }
    prompt.push_str(
        "Provide:\n\
         1. **Core conclusion**: the main conclusion drawn from all positions\n\
         2. **Consensus**: where the council agrees\n\
         3. **Open disagreements**: where views still differ, if anywhere\n\
         4. **Recommendations**: suggested next steps based on the discussion\n\n\
         Make sure the summary reflects every side fairly.",
    );
    prompt
}

pub fn member_system_prompt(lens: Lens, persona: Option<&str>) -> String {
    let mut prompt = String::from("You are a member of an AI council discussion.\n\n");
    if let Some(persona) = persona.filter(|p| !p.trim().is_empty()) {
        prompt.push_str(&format!("Your persona: {}\n\n", persona.trim()));
    }
    prompt.push_str(lens.instruction());
    prompt.push_str("\n\n");
    prompt.push_str(SOCRATIC_RULES);
    prompt.push_str(&format!(
        "\n\nStructure (no headings, flow naturally):\n\
         1. Your response to the previous speaker (one or two sentences)\n\
         2. Your {} perspective (the body)\n\
         3. Your challenge question for the next speaker (ending with \"?\")\n\n\
         Stay under 250 tokens.",
        lens.hat_name()
    ));
    prompt
}

/// The member turn that came immediately before, already scrubbed.
pub struct PriorTurn<'a> {
    pub speaker_name: &'a str,
    pub text: &'a str,
    pub question: Option<&'a str>,
}

/// Inputs for a member's user prompt.
pub struct MemberPrompt<'a> {
    pub topic: &'a str,
    pub speaker_name: &'a str,
    pub lens: Lens,
    /// `None` on the first member turn of the session.
    pub prior: Option<PriorTurn<'a>>,
    pub latest_synthesis: Option<&'a str>,
}

impl MemberPrompt<'_> {
    pub fn render(&self) -> String {
        let lens = self.lens;
        let mut prompt = format!(
            "**Topic**: {}\n\n**Your hat**: {} ({})\n\n---\n\n",
            self.topic,
            lens.label(),
            lens.description()
        );

        match &self.prior {
            None => {
                prompt.push_str(&format!(
                    "You are {}, wearing the {}.\n\n\
                     The discussion is just starting and you speak first.\n\n\
                     From the {} perspective:\n\
                     1. Give your opening position on the topic\n\
                     2. Close with one question to the next speaker that challenges an unstated assumption in your own position\n\n\
                     Get straight to the point.",
                    self.speaker_name,
                    lens.label(),
                    lens.hat_name()
                ));
                return prompt;
            }
            Some(prior) => {
                prompt.push_str(&format!(
                    "**What {} said**:\n{}\n\n",
                    prior.speaker_name,
                    prior.text.trim()
                ));
                if let Some(question) = prior.question {
                    prompt.push_str(&format!(
                        "**{}'s question to you**:\n\"{}\"\n\n---\n\n",
                        prior.speaker_name, question
                    ));
                }
            }
        }

        if let Some(synthesis) = self.latest_synthesis {
            prompt.push_str(&format!(
                "**Moderator's latest synthesis**:\n{}\n\n---\n\n",
                synthesis.trim()
            ));
        }

        let previous_name = self
            .prior
            .as_ref()
            .map(|p| p.speaker_name)
            .unwrap_or("the previous speaker");
        prompt.push_str(&format!(
            "You are {}, wearing the {}.\n\n\
             Speak from the {} perspective:\n\
             1. Open by quoting one specific claim of {} verbatim and challenge it (or answer their question)\n\
             2. Give your {} view\n\
             3. Close with one question to the next speaker that challenges an unstated assumption in your own position\n\n\
             Get straight to the point.",
            self.speaker_name,
            lens.label(),
            lens.hat_name(),
            previous_name,
            lens.hat_name()
        ));
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_member_prompt_has_no_quote_instruction() {
        let prompt = MemberPrompt {
            topic: "Four-day week",
            speaker_name: "Iris",
            lens: Lens::Fact,
            prior: None,
            latest_synthesis: Some("ignored on the first turn"),
        }
        .render();
        assert!(prompt.contains("you speak first"));
        assert!(!prompt.contains("verbatim"));
        assert!(!prompt.contains("ignored on the first turn"));
    }

    #[test]
    fn later_member_prompt_quotes_and_forwards_the_question() {
        let prompt = MemberPrompt {
            topic: "Four-day week",
            speaker_name: "Iris",
            lens: Lens::Risk,
            prior: Some(PriorTurn {
                speaker_name: "Leo",
                text: "Output rises 20%.",
                question: Some("Who covers the Friday shifts?"),
            }),
            latest_synthesis: Some("Productivity versus coverage."),
        }
        .render();
        assert!(prompt.contains("Output rises 20%."));
        assert!(prompt.contains("\"Who covers the Friday shifts?\""));
        assert!(prompt.contains("verbatim"));
        assert!(prompt.contains("Productivity versus coverage."));
        assert!(prompt.contains("⚫ Black hat"));
    }

    #[test]
    fn synthesis_style_follows_phase() {
        let base = SynthesisPrompt {
            topic: "t",
            round_index: 1,
            total_rounds: 3,
            phase: Phase::Provocative,
            round_text: "text",
            previous_synthesis: None,
            lens_summary: "",
        };
        assert!(base.render().contains("SHARPEN THE CONFLICT"));
        let convergent = SynthesisPrompt {
            phase: Phase::Convergent,
            ..base
        };
        assert!(convergent.render().contains("CONVERGE"));
    }

    #[test]
    fn moderator_persona_precedes_base_prompt() {
        let prompt = moderator_system_prompt(Some("You are a retired judge."));
        assert!(prompt.starts_with("You are a retired judge."));
        assert!(prompt.ends_with(MODERATOR_SYSTEM_PROMPT));
    }

    #[test]
    fn queries_starting_with_digits_keep_them() {
        let reply = "2024 congestion charge results\n3D printed housing costs\n2) 3.5 million cars registered";
        assert_eq!(
            parse_search_queries(reply),
            vec![
                "2024 congestion charge results",
                "3D printed housing costs",
                "3.5 million cars registered",
            ]
        );
    }
}
