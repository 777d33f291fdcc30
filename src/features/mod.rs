//! # Features Layer
//!
//! Feature modules of the actor bot. Each module owns one concern and
//! talks to the store and the completion backend through injected
//! handles, never through globals.

pub mod actors;
pub mod completion;
pub mod delivery;
pub mod rate_limiting;

// Re-export the items the application layer wires together
pub use actors::{CompactionSettings, ContextSettings};
pub use completion::{ChatMessage, ChatRole, CompletionBackend, CompletionReply, OpenAiBackend};
pub use rate_limiting::RateLimiter;
