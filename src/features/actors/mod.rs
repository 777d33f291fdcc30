//! # Feature: Actor Engine
//!
//! Role-bound roleplay actors with bounded conversational memory.
//! Covers resolution (which actors answer a message), budgeted context
//! assembly from reply chain, channel background, and stored history,
//! summarization-based history compaction, and emoji reactions.
//!
//! - **Version**: 1.2.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.2.0: Emoji reaction triggers with independent resolution list
//! - 1.1.0: Rolling-summary compaction of stored history
//! - 1.0.0: Initial release with reply-link and trigger-word resolution

pub mod compactor;
pub mod context;
pub mod prompt;
pub mod reactions;
pub mod resolver;

pub use compactor::{compact_history, CompactionSettings};
pub use context::{approx_tokens, build_context, ContextSettings};
pub use resolver::{fetch_reply_chain, resolve_actors, Resolution, ResolveInput};

use serenity::model::channel::Message;
use serenity::prelude::Context;

/// Rewrite raw role mentions (`<@&id>`) into readable text so stored
/// history and assembled context never leak opaque ids to the model.
pub fn resolve_role_mentions(ctx: &Context, msg: &Message) -> String {
    let mut content = msg.content.clone();
    if content.is_empty() {
        return content;
    }
    for role_id in &msg.mention_roles {
        if let Some(role) = role_id.to_role_cached(&ctx.cache) {
            content = content.replace(
                &format!("<@&{}>", role_id.0),
                &format!("<Role mentioned: {}>", role.name),
            );
        }
    }
    content
}
