//! Actor resolution for inbound messages
//!
//! Decides which actors answer a message and, independently, which
//! actors react to it with emojis. Text-response resolution follows a
//! fixed precedence:
//!
//! 1. a tracked reply to one of our delivered messages wins outright,
//! 2. otherwise role mentions on the message, falling back to the
//!    mentions on the root of its reply chain,
//! 3. otherwise trigger-word matching, but only when no role was
//!    mentioned at all.
//!
//! Automated authors only resolve through the reply-link path; their
//! messages never trip role or trigger resolution. The emoji-reaction
//! list is computed for every author regardless of the above.

use anyhow::Result;
use log::debug;
use serenity::model::channel::Message;
use serenity::prelude::Context;

use crate::database::{Actor, Database};

/// The facts of an inbound message that resolution cares about,
/// extracted up front so the decision logic stays free of gateway types.
#[derive(Debug, Default)]
pub struct ResolveInput {
    pub author_is_automated: bool,
    pub content: String,
    /// Message id this message directly replies to, if any.
    pub replied_to: Option<u64>,
    pub direct_role_mentions: Vec<String>,
    /// Role mentions on the root of the reply chain.
    pub root_role_mentions: Vec<String>,
}

impl ResolveInput {
    /// Extract resolution facts from a gateway message and its
    /// already-fetched reply chain (nearest reference first).
    pub fn from_message(msg: &Message, chain: &[Message]) -> Self {
        let root = chain.last().unwrap_or(msg);
        ResolveInput {
            author_is_automated: msg.author.bot,
            content: msg.content.clone(),
            replied_to: msg
                .message_reference
                .as_ref()
                .and_then(|r| r.message_id)
                .map(|id| id.0),
            direct_role_mentions: msg.mention_roles.iter().map(|r| r.0.to_string()).collect(),
            root_role_mentions: root.mention_roles.iter().map(|r| r.0.to_string()).collect(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Resolution {
    /// Actors that answer with text, in resolution order, deduplicated.
    pub responders: Vec<Actor>,
    /// Actors that react with emojis; independent of `responders`.
    pub reactors: Vec<Actor>,
}

/// Case-insensitive substring match of any space-separated trigger word.
/// `content_lower` must already be lower-cased.
pub fn trigger_match(content_lower: &str, trigger_words: &str) -> bool {
    trigger_words
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .any(|w| !w.is_empty() && content_lower.contains(&w))
}

pub async fn resolve_actors(database: &Database, input: &ResolveInput) -> Result<Resolution> {
    let content_lower = input.content.to_lowercase();
    let all_actors = database.list_actors().await?;

    let mut reactors = Vec::new();
    if !content_lower.is_empty() {
        for actor in &all_actors {
            if let Some(words) = actor.emoji_trigger_words.as_deref() {
                if trigger_match(&content_lower, words) {
                    reactors.push(actor.clone());
                }
            }
        }
    }

    let mut responders: Vec<Actor> = Vec::new();

    // 1. Reply to a tracked delivered message wins over everything else.
    if let Some(replied_to) = input.replied_to {
        if let Some(actor_id) = database.response_actor(replied_to).await? {
            if let Some(actor) = database.actor_by_id(actor_id).await? {
                debug!("Resolved '{}' via reply link {replied_to}", actor.name);
                responders.push(actor);
            }
        }
    }

    if responders.is_empty() && !input.author_is_automated {
        // 2. Role mentions, direct ones shadowing the chain root's.
        let mentioned = if !input.direct_role_mentions.is_empty() {
            &input.direct_role_mentions
        } else {
            &input.root_role_mentions
        };
        if !mentioned.is_empty() {
            for role_id in mentioned {
                if let Some(actor) = database.actor_by_role(role_id).await? {
                    responders.push(actor);
                }
            }
        } else if !content_lower.is_empty() {
            // 3. Trigger words, only when no role was mentioned at all.
            for actor in &all_actors {
                if let Some(words) = actor.trigger_words.as_deref() {
                    if trigger_match(&content_lower, words) {
                        responders.push(actor.clone());
                    }
                }
            }
        }
    }

    dedup_by_id(&mut responders);
    dedup_by_id(&mut reactors);
    Ok(Resolution {
        responders,
        reactors,
    })
}

/// Walk reply references upward from `msg`, at most `max_depth` hops.
/// Returns the chain nearest-reference first; the root (or the deepest
/// reachable message) is last. A failed fetch truncates the walk there.
pub async fn fetch_reply_chain(ctx: &Context, msg: &Message, max_depth: usize) -> Vec<Message> {
    let mut chain: Vec<Message> = Vec::new();
    let mut current = msg.clone();
    for _ in 0..max_depth {
        let Some(reference) = current.message_reference.clone() else {
            break;
        };
        let Some(ref_id) = reference.message_id else {
            break;
        };
        let next = match current.referenced_message.take().filter(|m| m.id == ref_id) {
            Some(resolved) => *resolved,
            None => match reference.channel_id.message(&ctx.http, ref_id).await {
                Ok(fetched) => fetched,
                Err(e) => {
                    debug!("Reply-chain walk truncated at {}: {e}", ref_id.0);
                    break;
                }
            },
        };
        chain.push(next.clone());
        current = next;
    }
    chain
}

fn dedup_by_id(actors: &mut Vec<Actor>) {
    let mut seen = std::collections::HashSet::new();
    actors.retain(|a| seen.insert(a.id));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::NewActor;

    async fn seeded_db() -> Database {
        let db = Database::new(":memory:").await.unwrap();
        db.register_actor(&NewActor {
            name: "Mordo",
            role_id: "42",
            context: "A grumpy wizard.",
            trigger_words: Some("wizard"),
            extended_context: None,
            emoji_trigger_words: Some("magic"),
            emoji_context: Some("Reacts with sparkles."),
            avatar_url: None,
            owner_id: None,
        })
        .await
        .unwrap();
        db.register_actor(&NewActor {
            name: "Zelda",
            role_id: "43",
            context: "A princess.",
            trigger_words: Some("princess castle"),
            extended_context: None,
            emoji_trigger_words: None,
            emoji_context: None,
            avatar_url: None,
            owner_id: None,
        })
        .await
        .unwrap();
        db
    }

    fn plain_message(content: &str) -> ResolveInput {
        ResolveInput {
            content: content.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_trigger_match_case_insensitive_substring() {
        assert!(trigger_match("the wizard waved", "Wizard"));
        assert!(trigger_match("wizardry abounds", "wizard"));
        assert!(!trigger_match("nothing here", "wizard"));
        assert!(!trigger_match("anything", ""));
    }

    #[tokio::test]
    async fn test_reply_link_beats_role_mention() {
        let db = seeded_db().await;
        let mordo = db.actor_by_name("Mordo").await.unwrap().unwrap();
        db.link_response(900, mordo.id).await.unwrap();

        // reply to Mordo's delivered message while mentioning Zelda's role
        let input = ResolveInput {
            content: "hey <@&43>".to_string(),
            replied_to: Some(900),
            direct_role_mentions: vec!["43".to_string()],
            ..Default::default()
        };
        let resolution = resolve_actors(&db, &input).await.unwrap();
        assert_eq!(resolution.responders.len(), 1);
        assert_eq!(resolution.responders[0].name, "Mordo");
    }

    #[tokio::test]
    async fn test_unrelated_role_mention_suppresses_trigger_fallback() {
        let db = seeded_db().await;
        // mentions an unbound role while containing Zelda's trigger word
        let input = ResolveInput {
            content: "the princess is nice <@&999>".to_string(),
            direct_role_mentions: vec!["999".to_string()],
            ..Default::default()
        };
        let resolution = resolve_actors(&db, &input).await.unwrap();
        assert!(resolution.responders.is_empty());
    }

    #[tokio::test]
    async fn test_trigger_fallback_without_mentions() {
        let db = seeded_db().await;
        let resolution = resolve_actors(&db, &plain_message("that wizard again"))
            .await
            .unwrap();
        assert_eq!(resolution.responders.len(), 1);
        assert_eq!(resolution.responders[0].name, "Mordo");
    }

    #[tokio::test]
    async fn test_root_mentions_used_when_message_has_none() {
        let db = seeded_db().await;
        let input = ResolveInput {
            content: "what do you think?".to_string(),
            root_role_mentions: vec!["43".to_string()],
            ..Default::default()
        };
        let resolution = resolve_actors(&db, &input).await.unwrap();
        assert_eq!(resolution.responders.len(), 1);
        assert_eq!(resolution.responders[0].name, "Zelda");
    }

    #[tokio::test]
    async fn test_direct_mentions_shadow_root_mentions() {
        let db = seeded_db().await;
        let input = ResolveInput {
            content: "<@&42>".to_string(),
            direct_role_mentions: vec!["42".to_string()],
            root_role_mentions: vec!["43".to_string()],
            ..Default::default()
        };
        let resolution = resolve_actors(&db, &input).await.unwrap();
        assert_eq!(resolution.responders.len(), 1);
        assert_eq!(resolution.responders[0].name, "Mordo");
    }

    #[tokio::test]
    async fn test_automated_author_skips_role_and_trigger_resolution() {
        let db = seeded_db().await;
        let input = ResolveInput {
            author_is_automated: true,
            content: "the wizard speaks of magic".to_string(),
            direct_role_mentions: vec!["42".to_string()],
            ..Default::default()
        };
        let resolution = resolve_actors(&db, &input).await.unwrap();
        assert!(resolution.responders.is_empty());
        // reaction resolution still applies to automated authors
        assert_eq!(resolution.reactors.len(), 1);
        assert_eq!(resolution.reactors[0].name, "Mordo");
    }

    #[tokio::test]
    async fn test_automated_author_still_resolves_reply_link() {
        let db = seeded_db().await;
        let mordo = db.actor_by_name("Mordo").await.unwrap().unwrap();
        db.link_response(901, mordo.id).await.unwrap();

        let input = ResolveInput {
            author_is_automated: true,
            content: "beep boop".to_string(),
            replied_to: Some(901),
            ..Default::default()
        };
        let resolution = resolve_actors(&db, &input).await.unwrap();
        assert_eq!(resolution.responders.len(), 1);
    }

    #[tokio::test]
    async fn test_reaction_list_independent_of_responders() {
        let db = seeded_db().await;
        let resolution = resolve_actors(&db, &plain_message("pure magic, that princess"))
            .await
            .unwrap();
        // Zelda responds (trigger), Mordo reacts (emoji trigger)
        assert_eq!(resolution.responders.len(), 1);
        assert_eq!(resolution.responders[0].name, "Zelda");
        assert_eq!(resolution.reactors.len(), 1);
        assert_eq!(resolution.reactors[0].name, "Mordo");
    }

    #[tokio::test]
    async fn test_duplicate_mentions_resolve_once() {
        let db = seeded_db().await;
        let input = ResolveInput {
            content: "<@&42> <@&42>".to_string(),
            direct_role_mentions: vec!["42".to_string(), "42".to_string()],
            ..Default::default()
        };
        let resolution = resolve_actors(&db, &input).await.unwrap();
        assert_eq!(resolution.responders.len(), 1);
    }
}
