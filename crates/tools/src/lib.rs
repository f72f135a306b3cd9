//! Inbound tool surface.
//!
//! Structured callers invoke the calendar operations directly through
//! [`ToolDispatcher::dispatch`]; free-form text goes through the
//! LM-mediated [`NlDispatcher`], which interprets intent against the
//! tool catalog and routes to the same operations.

pub mod catalog;
pub mod dispatch;
pub mod nl;

pub use dispatch::ToolDispatcher;
pub use nl::NlDispatcher;
