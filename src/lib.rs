//! # hatcouncil
//!
//! hatcouncil runs moderated council discussions between several Large Language Models.
//! A pool of anonymized members debates a topic over a fixed number of rounds. Every
//! member turn is filtered through a randomly drawn thinking hat ([`Lens`]), must quote
//! and challenge the previous speaker, and ends with a question for the next one. A
//! moderator opens the discussion, synthesizes each round and writes the final
//! summary, shifting from provocative to convergent as the rounds advance.
//!
//! The crate provides:
//!
//! * **Sessions**: [`Session`] drives a discussion end to end and returns a
//!   [`SessionReport`](session::SessionReport) with the transcript, deactivations and
//!   lens usage.
//! * **Anonymization**: [`identity::AnonymizationMap`] gives every model a pseudonym and
//!   scrubs real model names out of every prompt.
//! * **Lens allocation**: [`lens::LensAllocator`] favours hats the session has used least.
//! * **Resilient calls**: [`retry::RetryPolicy`] retries transient upstream failures with
//!   exponential backoff; members that keep failing are dropped, a failing moderator
//!   ends the session.
//! * **Provider clients**: [`clients::openrouter::OpenRouterClient`] and
//!   [`clients::tavily::TavilyClient`] implement the [`CompletionService`] and
//!   [`SearchService`] traits over HTTP.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use hatcouncil::clients::openrouter::OpenRouterClient;
//! use hatcouncil::clients::tavily::TavilyClient;
//! use hatcouncil::config::{ModelRoster, ProviderConfig, SessionConfig};
//! use hatcouncil::Session;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     hatcouncil::init_logger();
//!     let providers = ProviderConfig::from_env();
//!     for warning in providers.validate() {
//!         log::warn!("{}", warning);
//!     }
//!
//!     let config = SessionConfig::new("Is remote work here to stay?")
//!         .with_member("openai/gpt-5.2")
//!         .with_member("google/gemini-3-flash-preview")
//!         .with_member("moonshotai/kimi-k2-thinking")
//!         .with_moderator("anthropic/claude-sonnet-4.5");
//!
//!     let mut session = Session::new(
//!         config,
//!         &ModelRoster::default_catalog(),
//!         Arc::new(OpenRouterClient::from_config(&providers)),
//!         Arc::new(TavilyClient::from_config(&providers)),
//!     )?;
//!     let report = session.run().await;
//!     if let Some(summary) = report.final_summary() {
//!         println!("{}", summary.text);
//!     }
//!     Ok(())
//! }
//! ```

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// ```rust
/// hatcouncil::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

// Import the top-level `hatcouncil` module.
pub mod hatcouncil;

// Re-exporting key items for easier external access.
pub use hatcouncil::clients;
pub use hatcouncil::completion;
pub use hatcouncil::completion::{Completion, CompletionRequest, CompletionService, Message, Role};
pub use hatcouncil::config;
pub use hatcouncil::config::{ModelRoster, SessionConfig};
pub use hatcouncil::error;
pub use hatcouncil::error::{CouncilError, UpstreamError};
pub use hatcouncil::event;
pub use hatcouncil::event::{EventHandler, SessionEvent};
pub use hatcouncil::identity;
pub use hatcouncil::lens;
pub use hatcouncil::lens::Lens;
pub use hatcouncil::member;
pub use hatcouncil::moderator;
pub use hatcouncil::phase;
pub use hatcouncil::phase::Phase;
pub use hatcouncil::prompts;
pub use hatcouncil::retry;
pub use hatcouncil::search;
pub use hatcouncil::search::SearchService;
pub use hatcouncil::session;
pub use hatcouncil::session::{Session, SessionControls, SessionReport};
pub use hatcouncil::transcript;
