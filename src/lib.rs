// Core layer - configuration and shared text utilities
pub mod core;

// Features layer - actor resolution, context assembly, memory, delivery
pub mod features;

// Infrastructure - the SQLite-backed actor store
pub mod database;

// Application layer
pub mod command_handler;
pub mod commands;

// Re-export core config for convenience
pub use crate::core::Config;

// Re-export feature items used by the binary
pub use features::{
    // Actors
    CompactionSettings, ContextSettings,
    // Completion
    CompletionBackend, OpenAiBackend,
    // Rate limiting
    RateLimiter,
};

pub use command_handler::CommandHandler;
pub use database::{Actor, Database};
