//! # Feature: Response Delivery
//!
//! Posts completion text back to the channel as the actor, using a
//! per-channel webhook so the message carries the actor's name and
//! avatar. Webhook credentials are cached in the store and created on
//! first use. Every delivered message gets a response link recorded so
//! replies to it re-address the same actor. When the webhook path
//! fails, the bot falls back to a plain reply and still records the
//! link so the thread stays addressable.

use anyhow::Result;
use log::{error, info, warn};
use serde_json::{json, Map, Value};
use serenity::model::channel::Message;
use serenity::prelude::Context;
use std::time::Duration;
use tokio::time::timeout;

use crate::database::{Actor, Database};

/// Webhook posts are abandoned after this long and treated as failures.
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(15);

/// Fixed notice used whenever a response cannot be delivered as the actor.
pub const DELIVERY_FAILURE_NOTICE: &str = "Error: unable to send actor response.";

/// Build the webhook execution payload for an impersonation post.
pub fn webhook_payload(
    text: &str,
    actor_name: &str,
    avatar_url: Option<&str>,
    reply_to: u64,
) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("content".to_string(), Value::String(text.to_string()));
    payload.insert("username".to_string(), Value::String(actor_name.to_string()));
    if let Some(url) = avatar_url {
        payload.insert("avatar_url".to_string(), Value::String(url.to_string()));
    }
    payload.insert(
        "message_reference".to_string(),
        json!({ "message_id": reply_to.to_string(), "fail_if_not_exists": false }),
    );
    payload
}

/// Deliver completion text as `actor` into the triggering message's
/// channel. Never returns an error for delivery problems; those are
/// handled by the plain-reply fallback.
pub async fn deliver_response(
    ctx: &Context,
    database: &Database,
    webhook_name: &str,
    actor: &Actor,
    trigger: &Message,
    text: &str,
) -> Result<()> {
    let channel_id = trigger.channel_id.0;

    let credentials = match database.webhook_for_channel(channel_id).await? {
        Some(credentials) => credentials,
        None => match create_channel_webhook(ctx, database, trigger, webhook_name).await {
            Ok(credentials) => credentials,
            Err(e) => {
                error!("Failed to create webhook for channel {channel_id}: {e}");
                fallback_reply(ctx, database, actor, trigger).await;
                return Ok(());
            }
        },
    };

    let (webhook_id, token) = credentials;
    let payload = webhook_payload(text, &actor.name, actor.avatar_url.as_deref(), trigger.id.0);

    let delivered = timeout(
        DELIVERY_TIMEOUT,
        ctx.http.execute_webhook(webhook_id, &token, true, &payload),
    )
    .await;

    match delivered {
        Ok(Ok(Some(message))) => {
            database.link_response(message.id.0, actor.id).await?;
            info!(
                "Delivered response as '{}' in channel {channel_id} (message {})",
                actor.name, message.id.0
            );
        }
        Ok(Ok(None)) => {
            warn!("Webhook post returned no message despite wait=true; no link recorded");
        }
        Ok(Err(e)) => {
            error!("Webhook post failed in channel {channel_id}: {e}");
            fallback_reply(ctx, database, actor, trigger).await;
        }
        Err(_) => {
            error!("Webhook post timed out after {DELIVERY_TIMEOUT:?} in channel {channel_id}");
            fallback_reply(ctx, database, actor, trigger).await;
        }
    }
    Ok(())
}

async fn create_channel_webhook(
    ctx: &Context,
    database: &Database,
    trigger: &Message,
    webhook_name: &str,
) -> Result<(u64, String)> {
    let webhook = trigger
        .channel_id
        .create_webhook(&ctx.http, webhook_name)
        .await?;
    let token = webhook
        .token
        .clone()
        .ok_or_else(|| anyhow::anyhow!("created webhook carries no token"))?;
    database
        .save_webhook(trigger.channel_id.0, webhook.id.0, &token)
        .await?;
    info!(
        "Created webhook {} for channel {}",
        webhook.id.0, trigger.channel_id.0
    );
    Ok((webhook.id.0, token))
}

/// Plain reply from the bot's own identity. The response link is still
/// recorded so a user replying to the notice reaches the same actor.
async fn fallback_reply(ctx: &Context, database: &Database, actor: &Actor, trigger: &Message) {
    match trigger.reply(&ctx.http, DELIVERY_FAILURE_NOTICE).await {
        Ok(reply) => {
            if let Err(e) = database.link_response(reply.id.0, actor.id).await {
                error!("Failed to record fallback response link: {e}");
            }
        }
        Err(e) => error!("Fallback reply failed: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_fields() {
        let payload = webhook_payload("hello", "Mordo", Some("https://cdn/x.png"), 123);
        assert_eq!(payload.get("content").unwrap(), "hello");
        assert_eq!(payload.get("username").unwrap(), "Mordo");
        assert_eq!(payload.get("avatar_url").unwrap(), "https://cdn/x.png");
        let reference = payload.get("message_reference").unwrap();
        assert_eq!(reference.get("message_id").unwrap(), "123");
    }

    #[test]
    fn test_payload_omits_missing_avatar() {
        let payload = webhook_payload("hello", "Mordo", None, 123);
        assert!(payload.get("avatar_url").is_none());
    }
}
