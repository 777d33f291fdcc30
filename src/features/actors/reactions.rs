//! Emoji reactions driven by per-actor emoji contexts
//!
//! Actors with emoji trigger words get a dedicated completion call that
//! picks reactions for a matching message. The model must answer with a
//! JSON array; anything else silently yields no reactions.

use anyhow::Result;
use log::{debug, warn};
use serenity::model::channel::{Message, ReactionType};
use serenity::prelude::Context;

use super::prompt;
use crate::features::completion::{ChatMessage, CompletionBackend, CompletionReply};

/// Parse the model's reaction payload: a JSON array of objects with an
/// `emoji` key (a `reason` key may ride along and is ignored). Invalid
/// JSON, a non-array, or malformed items produce no reactions rather
/// than an error.
pub fn parse_emoji_reactions(payload: &str, max_reactions: usize) -> Vec<String> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(payload) else {
        return Vec::new();
    };
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    let mut emojis = Vec::new();
    for item in items {
        let Some(emoji) = item.get("emoji").and_then(|e| e.as_str()) else {
            continue;
        };
        let emoji = emoji.trim();
        if !emoji.is_empty() {
            emojis.push(emoji.to_string());
        }
        if emojis.len() >= max_reactions {
            break;
        }
    }
    emojis
}

/// Ask the completion engine for reactions to a message. Quota
/// exhaustion and empty answers both come back as no reactions.
pub async fn generate_reactions(
    completion: &dyn CompletionBackend,
    emoji_context: &str,
    author_name: &str,
    content: &str,
    max_reactions: usize,
) -> Result<Vec<String>> {
    let messages = vec![
        ChatMessage::system(prompt::build_emoji_system_prompt(emoji_context)),
        ChatMessage::user(format!("Message from {author_name}:\n{content}")),
    ];
    match completion.complete(messages).await? {
        CompletionReply::Text(payload) => Ok(parse_emoji_reactions(&payload, max_reactions)),
        CompletionReply::QuotaExhausted => Ok(Vec::new()),
    }
}

/// Apply reactions to a message, deduplicating and capping. A failed
/// reaction is logged and the rest still go out.
pub async fn apply_reactions(ctx: &Context, msg: &Message, emojis: &[String], max_reactions: usize) {
    let mut seen = std::collections::HashSet::new();
    for emoji in emojis.iter().take(max_reactions) {
        if !seen.insert(emoji.clone()) {
            continue;
        }
        if let Err(e) = msg
            .react(&ctx.http, ReactionType::Unicode(emoji.clone()))
            .await
        {
            warn!("Failed to add reaction {emoji}: {e}");
        } else {
            debug!("Added reaction {emoji} to message {}", msg.id.0);
        }
    }
}
