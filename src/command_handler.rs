//! Message and interaction orchestration
//!
//! `CommandHandler` owns the wired-together engine: the store handle,
//! the completion backend, the rate limiter, and the settings derived
//! from config. One inbound message flows resolver → (per actor)
//! record turn → assemble context → completion → delivery → opportunistic
//! compaction, with the independent emoji-reaction pass at the end.
//! Failures in any one actor's flow never abort the others.

use anyhow::Result;
use log::{debug, error, info, warn};
use serenity::model::application::interaction::application_command::ApplicationCommandInteraction;
use serenity::model::channel::Message;
use serenity::prelude::Context;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::commands::{AdminCommand, AdminCommands};
use crate::core::Config;
use crate::database::{Actor, Database};
use crate::features::actors::{
    self, build_context, compact_history, fetch_reply_chain, reactions, resolve_actors,
    CompactionSettings, ContextSettings, ResolveInput,
};
use crate::features::completion::{CompletionBackend, CompletionReply};
use crate::features::delivery;
use crate::features::RateLimiter;

/// Fixed apology when the completion engine reports exhausted quota.
pub const QUOTA_NOTICE: &str = "Error: AI quota is exhausted.";
/// Fixed notice when a response attempt fails outright.
pub const REQUEST_FAILED_NOTICE: &str = "Error: request failed.";

pub struct CommandHandler {
    database: Database,
    completion: Arc<dyn CompletionBackend>,
    admin: AdminCommands,
    rate_limiter: RateLimiter,
    context_settings: ContextSettings,
    compaction_settings: CompactionSettings,
    webhook_name: String,
    max_reply_chain: usize,
    max_emoji_reactions: usize,
}

impl CommandHandler {
    pub fn new(
        database: Database,
        completion: Arc<dyn CompletionBackend>,
        config: &Config,
    ) -> Self {
        CommandHandler {
            admin: AdminCommands::new(database.clone(), config.manager_role.clone()),
            rate_limiter: RateLimiter::new(
                config.rate_limit_max_requests,
                Duration::from_secs(config.rate_limit_window_seconds),
            ),
            context_settings: ContextSettings::from_config(config),
            compaction_settings: CompactionSettings::from_config(config),
            webhook_name: config.webhook_name.clone(),
            max_reply_chain: config.max_reply_chain,
            max_emoji_reactions: config.max_emoji_reactions,
            database,
            completion,
        }
    }

    pub async fn handle_message(&self, ctx: &Context, msg: &Message) -> Result<()> {
        // Our own posts never feed back into resolution, and neither do
        // posts from the webhooks we deliver through. Foreign webhook
        // messages fall through as automated authors.
        if msg.author.id == ctx.cache.current_user_id() {
            return Ok(());
        }
        if let Some(webhook_id) = msg.webhook_id {
            if let Some((own_webhook, _)) =
                self.database.webhook_for_channel(msg.channel_id.0).await?
            {
                if own_webhook == webhook_id.0 {
                    return Ok(());
                }
            }
        }

        let chain = fetch_reply_chain(ctx, msg, self.max_reply_chain).await;
        let input = ResolveInput::from_message(msg, &chain);
        let resolution = resolve_actors(&self.database, &input).await?;
        if resolution.responders.is_empty() && resolution.reactors.is_empty() {
            return Ok(());
        }

        let request_id = Uuid::new_v4();
        info!(
            "[{request_id}] 📥 Message {} from {} | {} responder(s), {} reactor(s)",
            msg.id.0,
            msg.author.id,
            resolution.responders.len(),
            resolution.reactors.len()
        );

        let resolved_content = actors::resolve_role_mentions(ctx, msg);

        if !resolution.responders.is_empty() {
            let respond_allowed = if msg.author.bot {
                // automated authors get their turns recorded but no reply
                false
            } else if self.rate_limiter.check(&msg.author.id.to_string()) {
                true
            } else {
                warn!(
                    "[{request_id}] 🚫 Rate limit hit for user {}; responses skipped",
                    msg.author.id
                );
                false
            };

            for actor in &resolution.responders {
                self.database
                    .record_turn(
                        actor.id,
                        &msg.author.id.to_string(),
                        &msg.author.name,
                        &resolved_content,
                    )
                    .await?;

                if respond_allowed {
                    if let Err(e) = self.respond_as_actor(ctx, msg, actor, &chain, request_id).await
                    {
                        error!(
                            "[{request_id}] ❌ Response failed | actor '{}' channel {} author {}: {e}",
                            actor.name, msg.channel_id.0, msg.author.id
                        );
                        match msg.reply(&ctx.http, REQUEST_FAILED_NOTICE).await {
                            Ok(reply) => {
                                if let Err(e) =
                                    self.database.link_response(reply.id.0, actor.id).await
                                {
                                    error!("[{request_id}] Failed to record failure link: {e}");
                                }
                            }
                            Err(e) => error!("[{request_id}] Failure notice failed too: {e}"),
                        }
                    }
                }

                self.spawn_compaction(actor.id);
            }
        }

        for actor in &resolution.reactors {
            let Some(emoji_context) = actor.emoji_context.as_deref() else {
                continue;
            };
            match reactions::generate_reactions(
                self.completion.as_ref(),
                emoji_context,
                &msg.author.name,
                &resolved_content,
                self.max_emoji_reactions,
            )
            .await
            {
                Ok(emojis) if !emojis.is_empty() => {
                    debug!(
                        "[{request_id}] 🎭 Actor '{}' reacting with {emojis:?}",
                        actor.name
                    );
                    reactions::apply_reactions(ctx, msg, &emojis, self.max_emoji_reactions).await;
                }
                Ok(_) => {}
                Err(e) => warn!(
                    "[{request_id}] Emoji reaction failed | actor '{}' channel {}: {e}",
                    actor.name, msg.channel_id.0
                ),
            }
        }

        info!("[{request_id}] ✅ Message processing completed");
        Ok(())
    }

    async fn respond_as_actor(
        &self,
        ctx: &Context,
        msg: &Message,
        actor: &Actor,
        chain: &[Message],
        request_id: Uuid,
    ) -> Result<()> {
        let messages = build_context(
            ctx,
            &self.database,
            &self.context_settings,
            actor,
            msg,
            chain,
        )
        .await?;
        debug!(
            "[{request_id}] 🧠 Assembled {} context lines for '{}'",
            messages.len(),
            actor.name
        );

        match self.completion.complete(messages).await? {
            CompletionReply::Text(text) if !text.is_empty() => {
                delivery::deliver_response(
                    ctx,
                    &self.database,
                    &self.webhook_name,
                    actor,
                    msg,
                    &text,
                )
                .await
            }
            CompletionReply::Text(_) => {
                warn!(
                    "[{request_id}] Empty completion for actor '{}'; nothing delivered",
                    actor.name
                );
                Ok(())
            }
            CompletionReply::QuotaExhausted => {
                warn!("[{request_id}] Quota exhausted; sending fixed apology");
                msg.reply(&ctx.http, QUOTA_NOTICE).await?;
                Ok(())
            }
        }
    }

    /// Best-effort compaction on its own task. The response flow never
    /// waits for it, and its failures stay in the logs.
    fn spawn_compaction(&self, actor_id: i64) {
        let database = self.database.clone();
        let completion = Arc::clone(&self.completion);
        let settings = self.compaction_settings.clone();
        tokio::spawn(async move {
            if let Err(e) =
                compact_history(&database, completion.as_ref(), &settings, actor_id).await
            {
                warn!("History compaction failed for actor {actor_id}: {e}");
            }
        });
    }

    pub async fn handle_slash_command(
        &self,
        ctx: &Context,
        command: &ApplicationCommandInteraction,
    ) -> Result<()> {
        match AdminCommand::from_name(&command.data.name) {
            Some(which) => {
                info!("🎯 /{} from user {}", command.data.name, command.user.id);
                self.admin.handle(ctx, command, which).await
            }
            None => {
                debug!("Ignoring unknown command '{}'", command.data.name);
                Ok(())
            }
        }
    }
}
