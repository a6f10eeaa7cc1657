//! Configuration for council sessions.
//!
//! Everything here is a plain struct the embedding application builds however it
//! wants. No config-file format is imposed; [`ProviderConfig::from_env`] is the only
//! helper that reads the environment.
//!
//! # Example
//!
//! ```rust
//! use hatcouncil::config::SessionConfig;
//!
//! let config = SessionConfig::new("Should cities ban cars from their centres?")
//!     .with_member("openai/gpt-5.2")
//!     .with_member("anthropic/claude-sonnet-4.5")
//!     .with_member_persona("deepseek/deepseek-v3.2", "A transport economist")
//!     .with_moderator("google/gemini-3-pro-preview")
//!     .with_rounds(3);
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.members.len(), 3);
//! ```

use crate::error::CouncilError;
use crate::identity::RANDOM_NAMES;
use std::collections::HashSet;

pub const DEFAULT_ROUNDS: usize = 3;
pub const DEFAULT_MAX_TOKENS: usize = 500;
pub const DEFAULT_SUMMARY_MAX_TOKENS: usize = 1000;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const MODERATOR_NAME: &str = "Max";
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const TAVILY_BASE_URL: &str = "https://api.tavily.com";

/// A selectable model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
}

/// Immutable table of models offered to the user, loaded once at startup and passed
/// by reference into session construction.
#[derive(Debug, Clone, Default)]
pub struct ModelRoster {
    models: Vec<ModelInfo>,
}

impl ModelRoster {
    pub fn new(models: Vec<ModelInfo>) -> Self {
        Self { models }
    }

    /// The OpenRouter catalog the council ships with.
    pub fn default_catalog() -> Self {
        let entries: [(&str, &str); 15] = [
            ("openai/gpt-5.2", "GPT-5.2"),
            ("anthropic/claude-sonnet-4.5", "Claude Sonnet 4.5"),
            ("google/gemini-3-pro-preview", "Gemini 3 Pro"),
            ("google/gemini-3-flash-preview", "Gemini 3 Flash"),
            ("x-ai/grok-4.1-fast", "Grok 4.1 Fast"),
            ("deepseek/deepseek-v3.2", "DeepSeek V3.2"),
            ("moonshotai/kimi-k2-thinking", "Kimi K2 Thinking"),
            ("allenai/olmo-3.1-32b-think:free", "Olmo 3.1 32b Think"),
            ("xiaomi/mimo-v2-flash:free", "Mimo V2 Flash"),
            ("mistralai/devstral-2512:free", "Devstral 2512"),
            ("openai/gpt-oss-120b:free", "GPT-OSS 120b"),
            ("z-ai/glm-4.5-air:free", "GLM 4.5 Air"),
            ("moonshotai/kimi-k2:free", "Kimi K2"),
            ("deepseek/deepseek-r1-0528:free", "DeepSeek R1 0528"),
            ("qwen/qwen3-coder:free", "Qwen 3 Coder"),
        ];
        Self::new(
            entries
                .iter()
                .map(|(id, name)| ModelInfo {
                    id: id.to_string(),
                    name: name.to_string(),
                })
                .collect(),
        )
    }

    pub fn models(&self) -> &[ModelInfo] {
        &self.models
    }

    pub fn get(&self, model_id: &str) -> Option<&ModelInfo> {
        self.models.iter().find(|m| m.id == model_id)
    }

    /// Display name for `model_id`, or the id itself when it is not in the table.
    pub fn display_name<'a>(&'a self, model_id: &'a str) -> &'a str {
        self.get(model_id).map(|m| m.name.as_str()).unwrap_or(model_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberConfig {
    pub model_id: String,
    /// Optional persona appended to the member's system prompt.
    pub persona: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModeratorConfig {
    pub model_id: String,
    pub display_name: String,
    /// Optional persona placed ahead of the moderator's base system prompt.
    pub persona: Option<String>,
}

impl Default for ModeratorConfig {
    fn default() -> Self {
        Self {
            model_id: "openai/gpt-5.2".to_string(),
            display_name: MODERATOR_NAME.to_string(),
            persona: None,
        }
    }
}

/// Order in which active members speak within a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakingOrder {
    /// Configuration order, every round.
    Fixed,
    /// A fresh random permutation each round, drawn from the session RNG.
    ShuffledPerRound,
}

/// Everything needed to start a session. Immutable once the session is created.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub topic: String,
    pub members: Vec<MemberConfig>,
    pub moderator: ModeratorConfig,
    pub total_rounds: usize,
    /// Token cap for member turns, the opening and interim syntheses.
    pub max_tokens: usize,
    /// Token cap for the final summary.
    pub summary_max_tokens: usize,
    pub temperature: f32,
    /// Let the moderator verify claims through the search service before summarizing.
    pub search_enabled: bool,
    pub speaking_order: SpeakingOrder,
    /// Seed for pseudonyms, lens draws and shuffles. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl SessionConfig {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            members: Vec::new(),
            moderator: ModeratorConfig::default(),
            total_rounds: DEFAULT_ROUNDS,
            max_tokens: DEFAULT_MAX_TOKENS,
            summary_max_tokens: DEFAULT_SUMMARY_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            search_enabled: true,
            speaking_order: SpeakingOrder::Fixed,
            seed: None,
        }
    }

    pub fn with_member(mut self, model_id: impl Into<String>) -> Self {
        self.members.push(MemberConfig {
            model_id: model_id.into(),
            persona: None,
        });
        self
    }

    pub fn with_member_persona(
        mut self,
        model_id: impl Into<String>,
        persona: impl Into<String>,
    ) -> Self {
        self.members.push(MemberConfig {
            model_id: model_id.into(),
            persona: Some(persona.into()),
        });
        self
    }

    pub fn with_moderator(mut self, model_id: impl Into<String>) -> Self {
        self.moderator.model_id = model_id.into();
        self
    }

    pub fn with_moderator_persona(mut self, persona: impl Into<String>) -> Self {
        self.moderator.persona = Some(persona.into());
        self
    }

    pub fn with_rounds(mut self, rounds: usize) -> Self {
        self.total_rounds = rounds;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_summary_max_tokens(mut self, max_tokens: usize) -> Self {
        self.summary_max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_search(mut self, enabled: bool) -> Self {
        self.search_enabled = enabled;
        self
    }

    pub fn with_speaking_order(mut self, order: SpeakingOrder) -> Self {
        self.speaking_order = order;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Fail fast on anything the session cannot run with.
    pub fn validate(&self) -> Result<(), CouncilError> {
        if self.topic.trim().is_empty() {
            return Err(CouncilError::Configuration("topic cannot be empty".into()));
        }
        if self.members.is_empty() {
            return Err(CouncilError::Configuration(
                "at least one member must be selected".into(),
            ));
        }
        if self.members.len() > RANDOM_NAMES.len() {
            return Err(CouncilError::Configuration(format!(
                "{} members selected but only {} pseudonyms exist",
                self.members.len(),
                RANDOM_NAMES.len()
            )));
        }
        let mut seen = HashSet::new();
        for member in &self.members {
            if member.model_id.trim().is_empty() {
                return Err(CouncilError::Configuration(
                    "member model id cannot be empty".into(),
                ));
            }
            if !seen.insert(member.model_id.as_str()) {
                return Err(CouncilError::Configuration(format!(
                    "model '{}' selected more than once",
                    member.model_id
                )));
            }
        }
        if self.moderator.model_id.trim().is_empty() {
            return Err(CouncilError::Configuration(
                "moderator model id cannot be empty".into(),
            ));
        }
        if self.total_rounds < 1 {
            return Err(CouncilError::Configuration(
                "round count must be at least 1".into(),
            ));
        }
        if self.max_tokens == 0 || self.summary_max_tokens == 0 {
            return Err(CouncilError::Configuration(
                "token limits must be positive".into(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(CouncilError::Configuration(format!(
                "temperature {} outside [0, 2]",
                self.temperature
            )));
        }
        Ok(())
    }
}

/// Credentials and endpoints for the bundled HTTP clients.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub openrouter_api_key: String,
    pub openrouter_base_url: String,
    pub tavily_api_key: Option<String>,
    pub tavily_base_url: String,
}

impl ProviderConfig {
    /// Read `OPENROUTER_API_KEY`, `OPENROUTER_BASE_URL` and `TAVILY_API_KEY`.
    pub fn from_env() -> Self {
        Self {
            openrouter_api_key: std::env::var("OPENROUTER_API_KEY").unwrap_or_default(),
            openrouter_base_url: std::env::var("OPENROUTER_BASE_URL")
                .unwrap_or_else(|_| OPENROUTER_BASE_URL.to_string()),
            tavily_api_key: std::env::var("TAVILY_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            tavily_base_url: TAVILY_BASE_URL.to_string(),
        }
    }

    /// Human-readable warnings for missing credentials. Empty when all is set.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.openrouter_api_key.is_empty() {
            warnings.push("OPENROUTER_API_KEY is not set".to_string());
        }
        if self.tavily_api_key.is_none() {
            warnings.push("TAVILY_API_KEY is not set (web search will be unavailable)".to_string());
        }
        warnings
    }
}
