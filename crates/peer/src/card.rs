//! Agent card discovery.
//!
//! Every peer publishes a JSON descriptor at
//! `<base>/.well-known/agent-card.json` declaring its message endpoint
//! and capabilities.  Absent fields default conservatively: no streaming,
//! message endpoint = discovery base.

use serde::{Deserialize, Serialize};

/// Path appended to the discovery base URL.
pub const WELL_KNOWN_CARD_PATH: &str = "/.well-known/agent-card.json";

/// A peer's self-description.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentCard {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    /// The actual message endpoint; may differ from the discovery base.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub capabilities: Capabilities,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct Capabilities {
    #[serde(default)]
    pub streaming: bool,
}

impl AgentCard {
    /// Where to send messages: the declared `url`, or the discovery base
    /// when the card does not declare one.
    pub fn message_endpoint<'a>(&'a self, discovery_base: &'a str) -> &'a str {
        match self.url.as_deref() {
            Some(url) if !url.is_empty() => url,
            _ => discovery_base,
        }
    }
}

/// Build the full card URL for a discovery base.
pub fn card_url(base: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), WELL_KNOWN_CARD_PATH)
}
