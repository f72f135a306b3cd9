use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentIdentity,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub booking: BookingConfig,
    #[serde(default)]
    pub peer: PeerConfig,
}

impl Config {
    /// Load and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(Error::Io)?;
        let config: Config = toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.booking.max_turns == 0 {
            return Err(Error::Config("booking.max_turns must be at least 1".into()));
        }
        // The overall budget must strictly bound every inner deadline,
        // or the layering does nothing.
        let overall = self.booking.overall_timeout_secs;
        for (name, secs) in [
            ("agent_init_timeout_secs", self.booking.agent_init_timeout_secs),
            ("agent_timeout_secs", self.booking.agent_timeout_secs),
            ("send_timeout_secs", self.booking.send_timeout_secs),
            (
                "autonomous_step_timeout_secs",
                self.booking.autonomous_step_timeout_secs,
            ),
        ] {
            if secs > overall {
                return Err(Error::Config(format!(
                    "booking.{name} ({secs}s) exceeds the overall budget ({overall}s)"
                )));
            }
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent identity
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentIdentity {
    /// Identifier advertised to peers as the calendar owner.
    #[serde(default = "d_owner")]
    pub owner_id: String,
    #[serde(default = "d_agent_name")]
    pub name: String,
}

impl Default for AgentIdentity {
    fn default() -> Self {
        Self {
            owner_id: d_owner(),
            name: d_agent_name(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding `events.json` and `preferences.json`.
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            state_path: d_state_path(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LM provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Which wire format the endpoint speaks.
    #[serde(default)]
    pub kind: ProviderKind,
    /// Base URL of the chat endpoint.
    #[serde(default = "d_llm_base_url")]
    pub base_url: String,
    #[serde(default = "d_llm_model")]
    pub model: String,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default = "d_llm_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Sampling temperature; booking flows want deterministic output.
    #[serde(default)]
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            base_url: d_llm_base_url(),
            model: d_llm_model(),
            auth: AuthConfig::default(),
            request_timeout_ms: d_llm_timeout_ms(),
            temperature: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    OpenaiCompat,
    Anthropic,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    /// Direct key (for config-only setups; prefer env or keychain).
    #[serde(default)]
    pub key: Option<String>,
    /// Env var containing the key.
    #[serde(default)]
    pub env: Option<String>,
    /// Keychain service name (e.g., "calagent").
    #[serde(default)]
    pub service: Option<String>,
    /// Keychain account name (e.g., "llm-api-key").
    #[serde(default)]
    pub account: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    #[default]
    ApiKey,
    Keychain,
    None,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Booking flow deadlines
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Deadline layering for the outbound negotiation.  The overall budget
/// strictly bounds every inner step so one slow peer cannot consume the
/// turns reserved for recovery.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BookingConfig {
    #[serde(default = "d_max_turns")]
    pub max_turns: u32,
    #[serde(default = "d_overall_secs")]
    pub overall_timeout_secs: u64,
    /// One-time booking-agent initialization.
    #[serde(default = "d_init_secs")]
    pub agent_init_timeout_secs: u64,
    /// Per-turn agent utterance deadline (supervised loop).
    #[serde(default = "d_agent_secs")]
    pub agent_timeout_secs: u64,
    /// Per-turn peer send deadline (supervised loop).
    #[serde(default = "d_send_secs")]
    pub send_timeout_secs: u64,
    /// Per-turn agent/send deadline once running autonomously.
    #[serde(default = "d_autonomous_secs")]
    pub autonomous_step_timeout_secs: u64,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            max_turns: d_max_turns(),
            overall_timeout_secs: d_overall_secs(),
            agent_init_timeout_secs: d_init_secs(),
            agent_timeout_secs: d_agent_secs(),
            send_timeout_secs: d_send_secs(),
            autonomous_step_timeout_secs: d_autonomous_secs(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Peer transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Deadline for fetching the agent card descriptor.
    #[serde(default = "d_card_secs")]
    pub card_timeout_secs: u64,
    /// Allow disabling streaming even when the peer advertises it.
    #[serde(default = "d_true")]
    pub use_streaming: bool,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            card_timeout_secs: d_card_secs(),
            use_streaming: true,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_owner() -> String {
    "calagent-owner".into()
}
fn d_agent_name() -> String {
    "calagent".into()
}
fn d_state_path() -> PathBuf {
    PathBuf::from("state")
}
fn d_llm_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn d_llm_model() -> String {
    "gpt-4o-mini".into()
}
fn d_llm_timeout_ms() -> u64 {
    30_000
}
fn d_max_turns() -> u32 {
    5
}
fn d_overall_secs() -> u64 {
    120
}
fn d_init_secs() -> u64 {
    30
}
fn d_agent_secs() -> u64 {
    10
}
fn d_send_secs() -> u64 {
    10
}
fn d_autonomous_secs() -> u64 {
    15
}
fn d_card_secs() -> u64 {
    30
}
fn d_true() -> bool {
    true
}
