//! Environment-driven bot configuration
//!
//! Every tunable of the context assembler, compactor, and delivery path
//! is read once at startup. Missing optional values fall back to the
//! defaults below; `DISCORD_TOKEN` and `OPENAI_API_KEY` are required.

use anyhow::{Context as _, Result};
use std::env;
use std::fmt::Debug;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub openai_api_key: String,
    pub openai_model: String,
    /// When set, slash commands register to this guild only (instant updates).
    pub discord_guild_id: Option<String>,
    pub database_path: String,
    pub log_level: String,

    /// Guild role required for all actor administration commands.
    pub manager_role: String,
    /// Display name used when creating channel webhooks.
    pub webhook_name: String,

    // Context assembly
    pub max_context_tokens: usize,
    pub max_history_messages: i64,
    pub max_history_age_seconds: i64,
    pub max_reply_chain: usize,
    pub background_window_seconds: i64,
    pub background_max_messages: usize,
    pub background_max_chars: usize,

    // History compaction
    pub summary_compact_threshold: i64,
    pub summary_compact_batch: i64,
    pub max_summary_tokens: usize,

    // Reactions
    pub max_emoji_reactions: usize,

    // Rate limiting
    pub rate_limit_max_requests: usize,
    pub rate_limit_window_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            discord_token: env::var("DISCORD_TOKEN")
                .context("DISCORD_TOKEN environment variable is required")?,
            openai_api_key: env::var("OPENAI_API_KEY")
                .context("OPENAI_API_KEY environment variable is required")?,
            openai_model: env_or("OPENAI_MODEL", "gpt-4o-mini"),
            discord_guild_id: env::var("DISCORD_GUILD_ID").ok(),
            database_path: env_or("ACTOR_DB_PATH", "troupe.db"),
            log_level: env_or("LOG_LEVEL", "info"),
            manager_role: env_or("ACTOR_MANAGER_ROLE", "Actor Manager"),
            webhook_name: env_or("ACTOR_WEBHOOK_NAME", "troupe"),
            max_context_tokens: env_parse("MAX_CONTEXT_TOKENS", 1200),
            max_history_messages: env_parse("MAX_HISTORY_MESSAGES", 25),
            max_history_age_seconds: env_parse("MAX_HISTORY_AGE_SECONDS", 86_400),
            max_reply_chain: env_parse("MAX_REPLY_CHAIN", 20),
            background_window_seconds: env_parse("BACKGROUND_WINDOW_SECONDS", 600),
            background_max_messages: env_parse("BACKGROUND_MAX_MESSAGES", 8),
            background_max_chars: env_parse("BACKGROUND_MAX_CHARS", 240),
            summary_compact_threshold: env_parse("SUMMARY_COMPACT_THRESHOLD", 40),
            summary_compact_batch: env_parse("SUMMARY_COMPACT_BATCH", 25),
            max_summary_tokens: env_parse("MAX_SUMMARY_TOKENS", 800),
            max_emoji_reactions: env_parse("MAX_EMOJI_REACTIONS", 3),
            rate_limit_max_requests: env_parse("RATE_LIMIT_MAX_REQUESTS", 5),
            rate_limit_window_seconds: env_parse("RATE_LIMIT_WINDOW_SECONDS", 60),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Debug,
{
    match env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                log::warn!("Ignoring unparseable {key}={raw}, using default {default:?}");
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_or_default() {
        env::remove_var("TROUPE_TEST_MISSING");
        assert_eq!(env_or("TROUPE_TEST_MISSING", "fallback"), "fallback");
    }

    #[test]
    fn test_env_parse_default_on_missing() {
        env::remove_var("TROUPE_TEST_NUM");
        let value: usize = env_parse("TROUPE_TEST_NUM", 1200);
        assert_eq!(value, 1200);
    }

    #[test]
    fn test_env_parse_default_on_garbage() {
        env::set_var("TROUPE_TEST_GARBAGE", "not-a-number");
        let value: i64 = env_parse("TROUPE_TEST_GARBAGE", 40);
        assert_eq!(value, 40);
        env::remove_var("TROUPE_TEST_GARBAGE");
    }

    #[test]
    fn test_env_parse_reads_value() {
        env::set_var("TROUPE_TEST_VALUE", "17");
        let value: usize = env_parse("TROUPE_TEST_VALUE", 3);
        assert_eq!(value, 17);
        env::remove_var("TROUPE_TEST_VALUE");
    }
}
