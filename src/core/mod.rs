//! # Core Module
//!
//! Configuration and shared text utilities for the actor bot.

pub mod config;
pub mod response;

// Re-export commonly used items
pub use config::Config;
pub use response::{chunk_for_message, chunk_text, compact_inline, MESSAGE_LIMIT};
