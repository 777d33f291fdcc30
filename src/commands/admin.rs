//! Actor administration command handlers
//!
//! All commands are manager-gated; mutating commands additionally
//! require ownership once an actor has an owner. Every reply is
//! ephemeral so actor configuration never leaks into the channel.

use anyhow::Result;
use log::info;
use serenity::model::application::interaction::application_command::ApplicationCommandInteraction;
use serenity::model::application::interaction::InteractionResponseType;
use serenity::model::guild::Role;
use serenity::model::id::GuildId;
use serenity::prelude::Context;

use super::{get_attachment_option, get_string_option, get_user_option, AdminCommand};
use crate::core::response::{chunk_for_message, chunk_text};
use crate::database::{Actor, ActorUpdate, Database, NewActor, RegisterOutcome, UpdateOutcome};

pub struct AdminCommands {
    database: Database,
    manager_role: String,
}

impl AdminCommands {
    pub fn new(database: Database, manager_role: String) -> Self {
        AdminCommands {
            database,
            manager_role,
        }
    }

    pub async fn handle(
        &self,
        ctx: &Context,
        command: &ApplicationCommandInteraction,
        which: AdminCommand,
    ) -> Result<()> {
        match which {
            AdminCommand::Register => self.handle_register(ctx, command).await,
            AdminCommand::Update => self.handle_update(ctx, command).await,
            AdminCommand::Delete => self.handle_delete(ctx, command).await,
            AdminCommand::Migrate => self.handle_migrate(ctx, command).await,
            AdminCommand::List => self.handle_list(ctx, command).await,
            AdminCommand::Info => self.handle_info(ctx, command).await,
        }
    }

    async fn handle_register(
        &self,
        ctx: &Context,
        command: &ApplicationCommandInteraction,
    ) -> Result<()> {
        let Some(guild_id) = self.authorize(ctx, command).await? else {
            return Ok(());
        };
        let options = &command.data.options;
        let Some(name) = get_string_option(options, "name") else {
            return respond_ephemeral(ctx, command, "Missing actor name.").await;
        };
        let Some(context_block) = get_string_option(options, "context") else {
            return respond_ephemeral(ctx, command, "Missing actor context.").await;
        };

        let role = ensure_role(ctx, guild_id, &name).await?;
        let role_id = role.id.0.to_string();
        let owner_id = command.user.id.to_string();
        let avatar = resolve_avatar(
            get_string_option(options, "avatar_url"),
            get_attachment_option(options, "avatar"),
        );
        let trigger_words = get_string_option(options, "trigger_words");
        let extended_context = get_string_option(options, "extended_context");
        let emoji_trigger_words = get_string_option(options, "emoji_trigger_words");
        let emoji_context = get_string_option(options, "emoji_context");

        let outcome = self
            .database
            .register_actor(&NewActor {
                name: &name,
                role_id: &role_id,
                context: &context_block,
                trigger_words: trigger_words.as_deref(),
                extended_context: extended_context.as_deref(),
                emoji_trigger_words: emoji_trigger_words.as_deref(),
                emoji_context: emoji_context.as_deref(),
                avatar_url: avatar.as_deref(),
                owner_id: Some(&owner_id),
            })
            .await?;

        let message = match outcome {
            RegisterOutcome::Created => "Actor registered.",
            RegisterOutcome::NameTaken => "Actor already exists.",
        };
        respond_ephemeral(ctx, command, message).await
    }

    async fn handle_update(
        &self,
        ctx: &Context,
        command: &ApplicationCommandInteraction,
    ) -> Result<()> {
        if self.authorize(ctx, command).await?.is_none() {
            return Ok(());
        }
        let options = &command.data.options;
        let Some(name) = get_string_option(options, "name") else {
            return respond_ephemeral(ctx, command, "Missing actor name.").await;
        };
        let Some(actor) = self.database.actor_by_name(&name).await? else {
            return respond_ephemeral(ctx, command, "Actor not found.").await;
        };
        if !caller_owns(&actor, &command.user.id.to_string()) {
            return respond_ephemeral(ctx, command, "Only the owner can update this actor.").await;
        }

        let context = get_string_option(options, "context");
        let avatar = resolve_avatar(
            get_string_option(options, "avatar_url"),
            get_attachment_option(options, "avatar"),
        );
        let trigger_words = get_string_option(options, "trigger_words");
        let extended_context = get_string_option(options, "extended_context");
        let emoji_trigger_words = get_string_option(options, "emoji_trigger_words");
        let emoji_context = get_string_option(options, "emoji_context");

        let outcome = self
            .database
            .update_actor(
                &name,
                &ActorUpdate {
                    context: context.as_deref(),
                    avatar_url: avatar.as_deref(),
                    trigger_words: trigger_words.as_deref(),
                    extended_context: extended_context.as_deref(),
                    emoji_trigger_words: emoji_trigger_words.as_deref(),
                    emoji_context: emoji_context.as_deref(),
                },
            )
            .await?;

        let message = match outcome {
            UpdateOutcome::Updated => "Actor updated.",
            UpdateOutcome::NotFound => "Actor not found.",
            UpdateOutcome::NoChanges => "No updates provided.",
        };
        respond_ephemeral(ctx, command, message).await
    }

    async fn handle_delete(
        &self,
        ctx: &Context,
        command: &ApplicationCommandInteraction,
    ) -> Result<()> {
        if self.authorize(ctx, command).await?.is_none() {
            return Ok(());
        }
        let Some(name) = get_string_option(&command.data.options, "name") else {
            return respond_ephemeral(ctx, command, "Missing actor name.").await;
        };
        let Some(actor) = self.database.actor_by_name(&name).await? else {
            return respond_ephemeral(ctx, command, "Actor not found.").await;
        };
        if !caller_owns(&actor, &command.user.id.to_string()) {
            return respond_ephemeral(ctx, command, "Only the owner can delete this actor.").await;
        }

        self.database.delete_actor(&name).await?;
        info!("Actor '{name}' deleted by {}", command.user.id);
        respond_ephemeral(ctx, command, "Actor deleted.").await
    }

    async fn handle_migrate(
        &self,
        ctx: &Context,
        command: &ApplicationCommandInteraction,
    ) -> Result<()> {
        if self.authorize(ctx, command).await?.is_none() {
            return Ok(());
        }
        let options = &command.data.options;
        let Some(name) = get_string_option(options, "name") else {
            return respond_ephemeral(ctx, command, "Missing actor name.").await;
        };
        let Some(new_owner) = get_user_option(options, "owner") else {
            return respond_ephemeral(ctx, command, "Missing new owner.").await;
        };
        let Some(actor) = self.database.actor_by_name(&name).await? else {
            return respond_ephemeral(ctx, command, "Actor not found.").await;
        };
        if !caller_owns(&actor, &command.user.id.to_string()) {
            return respond_ephemeral(ctx, command, "Only the owner can migrate this actor.").await;
        }

        self.database
            .transfer_actor(&name, &new_owner.to_string())
            .await?;
        respond_ephemeral(ctx, command, "Actor ownership updated.").await
    }

    async fn handle_list(
        &self,
        ctx: &Context,
        command: &ApplicationCommandInteraction,
    ) -> Result<()> {
        if self.authorize(ctx, command).await?.is_none() {
            return Ok(());
        }
        defer_ephemeral(ctx, command).await?;

        let actors = self.database.list_actors().await?;
        if actors.is_empty() {
            return followup_ephemeral(ctx, command, "No actors registered.").await;
        }

        let lines: Vec<String> = actors
            .iter()
            .map(|actor| {
                format!(
                    "**{}** • role <@&{}> • avatar {}",
                    actor.name,
                    actor.role_id,
                    actor.avatar_url.as_deref().unwrap_or("none")
                )
            })
            .collect();
        for chunk in chunk_for_message(&format!("**Actors**\n{}", lines.join("\n"))) {
            followup_ephemeral(ctx, command, &chunk).await?;
        }
        Ok(())
    }

    async fn handle_info(
        &self,
        ctx: &Context,
        command: &ApplicationCommandInteraction,
    ) -> Result<()> {
        if self.authorize(ctx, command).await?.is_none() {
            return Ok(());
        }
        let Some(name) = get_string_option(&command.data.options, "name") else {
            return respond_ephemeral(ctx, command, "Missing actor name.").await;
        };
        defer_ephemeral(ctx, command).await?;

        let Some(actor) = self.database.actor_by_name(&name).await? else {
            return followup_ephemeral(ctx, command, "Actor not found.").await;
        };

        let owner_mention = actor
            .owner_id
            .as_deref()
            .map(|id| format!("<@{id}>"))
            .unwrap_or_else(|| "none".to_string());
        let info = [
            format!("**Name:** {}", actor.name),
            format!("**Role:** <@&{}>", actor.role_id),
            format!("**Avatar:** {}", actor.avatar_url.as_deref().unwrap_or("none")),
            format!(
                "**Trigger words:** {}",
                actor.trigger_words.as_deref().unwrap_or("none")
            ),
            format!(
                "**Emoji trigger words:** {}",
                actor.emoji_trigger_words.as_deref().unwrap_or("none")
            ),
            format!("**Owner:** {owner_mention}"),
        ]
        .join("\n");
        for chunk in chunk_for_message(&info) {
            followup_ephemeral(ctx, command, &chunk).await?;
        }

        let context_payload = match actor.extended_context.as_deref() {
            Some(extended) => format!("{}\n\nExtended context:\n{}", actor.context, extended),
            None => actor.context.clone(),
        };
        for (index, chunk) in chunk_text(&context_payload, 1800).into_iter().enumerate() {
            let prefix = if index == 0 {
                "**Context:**"
            } else {
                "**Context (continued):**"
            };
            followup_ephemeral(ctx, command, &format!("{prefix}\n```\n{chunk}\n```")).await?;
        }

        if let Some(emoji_context) = actor.emoji_context.as_deref() {
            for (index, chunk) in chunk_text(emoji_context, 1800).into_iter().enumerate() {
                let prefix = if index == 0 {
                    "**Emoji context:**"
                } else {
                    "**Emoji context (continued):**"
                };
                followup_ephemeral(ctx, command, &format!("{prefix}\n```\n{chunk}\n```")).await?;
            }
        }
        Ok(())
    }

    /// Validate the caller: must be in a guild and hold the manager
    /// role. Sends the denial response itself; returns the guild id
    /// when the caller may proceed.
    async fn authorize(
        &self,
        ctx: &Context,
        command: &ApplicationCommandInteraction,
    ) -> Result<Option<GuildId>> {
        let Some(guild_id) = command.guild_id else {
            respond_ephemeral(ctx, command, "This command must be used in a server.").await?;
            return Ok(None);
        };
        let Some(member) = command.member.as_ref() else {
            respond_ephemeral(ctx, command, "Unable to validate permissions.").await?;
            return Ok(None);
        };

        let roles = guild_id.roles(&ctx.http).await?;
        let is_manager = member.roles.iter().any(|role_id| {
            roles
                .get(role_id)
                .map_or(false, |role| role.name == self.manager_role)
        });
        if !is_manager {
            respond_ephemeral(ctx, command, "Missing Actor Manager role.").await?;
            return Ok(None);
        }
        Ok(Some(guild_id))
    }
}

/// Find a guild role by name, creating it when absent.
pub async fn ensure_role(ctx: &Context, guild_id: GuildId, name: &str) -> Result<Role> {
    let roles = guild_id.roles(&ctx.http).await?;
    if let Some(role) = roles.values().find(|role| role.name == name) {
        return Ok(role.clone());
    }
    info!("Creating role '{name}' in guild {guild_id}");
    let role = guild_id
        .create_role(&ctx.http, |role| role.name(name))
        .await?;
    Ok(role)
}

/// Attachment beats URL; URLs must be plain http(s) references.
fn resolve_avatar(avatar_url: Option<String>, attachment_url: Option<String>) -> Option<String> {
    if attachment_url.is_some() {
        return attachment_url;
    }
    avatar_url.filter(|url| url.starts_with("http://") || url.starts_with("https://"))
}

fn caller_owns(actor: &Actor, caller_id: &str) -> bool {
    actor.owner_id.as_deref().map_or(true, |owner| owner == caller_id)
}

async fn respond_ephemeral(
    ctx: &Context,
    command: &ApplicationCommandInteraction,
    content: &str,
) -> Result<()> {
    command
        .create_interaction_response(&ctx.http, |response| {
            response
                .kind(InteractionResponseType::ChannelMessageWithSource)
                .interaction_response_data(|message| message.content(content).ephemeral(true))
        })
        .await?;
    Ok(())
}

async fn defer_ephemeral(ctx: &Context, command: &ApplicationCommandInteraction) -> Result<()> {
    command
        .create_interaction_response(&ctx.http, |response| {
            response
                .kind(InteractionResponseType::DeferredChannelMessageWithSource)
                .interaction_response_data(|message| message.ephemeral(true))
        })
        .await?;
    Ok(())
}

async fn followup_ephemeral(
    ctx: &Context,
    command: &ApplicationCommandInteraction,
    content: &str,
) -> Result<()> {
    command
        .create_followup_message(&ctx.http, |message| message.content(content).ephemeral(true))
        .await?;
    Ok(())
}
