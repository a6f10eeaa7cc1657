//! Web search used by the moderator to verify claims before its final summary.
//!
//! The search backend is best-effort. [`SearchService::query`] may fail at any time
//! and the moderator must degrade to transcript-only summarization when it does.
//!
//! # Example
//!
//! ```
//! use hatcouncil::search::{SearchHit, SearchResponse};
//!
//! let response = SearchResponse {
//!     answer: Some("Yes.".into()),
//!     results: vec![SearchHit {
//!         title: "Source".into(),
//!         url: "https://example.com".into(),
//!         content: "Body".into(),
//!     }],
//! };
//! let text = response.format_for_prompt("is it?");
//! assert!(text.contains("https://example.com"));
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

/// Characters of each hit's body forwarded to the model.
const HIT_PREVIEW_CHARS: usize = 200;

/// A single ranked search result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub content: String,
}

/// Ranked results for one query, plus an optional provider-written answer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub answer: Option<String>,
    pub results: Vec<SearchHit>,
}

impl SearchResponse {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty() && self.answer.as_deref().map_or(true, |a| a.is_empty())
    }

    /// Render the response as a prompt block for the moderator.
    pub fn format_for_prompt(&self, query: &str) -> String {
        let mut out = format!("### Search results for \"{}\"\n", query);
        if let Some(answer) = self.answer.as_deref().filter(|a| !a.is_empty()) {
            out.push_str(&format!("\n**Summary**: {}\n", answer));
        }
        out.push_str("\n**Sources**:");
        for (i, hit) in self.results.iter().enumerate() {
            let preview: String = hit.content.chars().take(HIT_PREVIEW_CHARS).collect();
            out.push_str(&format!(
                "\n{}. **{}**\n   - URL: {}\n   - Content: {}...",
                i + 1,
                hit.title,
                hit.url,
                preview
            ));
        }
        out
    }

    /// Markdown source links, one per line.
    pub fn format_sources(&self) -> String {
        self.results
            .iter()
            .map(|hit| format!("- [{}]({})", hit.title, hit.url))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchError(pub String);

impl fmt::Display for SearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "search failed: {}", self.0)
    }
}

impl Error for SearchError {}

/// Trait defining the interface to a web search backend.
#[async_trait]
pub trait SearchService: Send + Sync {
    async fn query(&self, text: &str) -> Result<SearchResponse, SearchError>;
}

/// A search backend that is never available. Used when no search key is configured.
pub struct NoSearch;

#[async_trait]
impl SearchService for NoSearch {
    async fn query(&self, _text: &str) -> Result<SearchResponse, SearchError> {
        Err(SearchError("no search backend configured".into()))
    }
}
