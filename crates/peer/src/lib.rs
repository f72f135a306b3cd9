//! Peer-agent transport client.
//!
//! Discovers a peer's agent card, sends a message, and reconstructs the
//! user-visible text from the heterogeneous multi-framed response stream
//! while preserving the opaque conversation-continuity id.  The parser is
//! deliberately lenient: unknown frame shapes are skipped, never errors.

pub mod card;
pub mod client;
pub mod frame;
pub(crate) mod sse;

pub use card::AgentCard;
pub use client::{PeerClient, PeerReply, PeerTransport};
pub use frame::{Frame, FrameKind, Part};

/// Returned when a peer response carried no extractable text.  Surfaced
/// to the caller as content, not as an error — the turn is still recorded.
pub const EMPTY_RESPONSE_PLACEHOLDER: &str = "[no text content extracted from peer response]";
