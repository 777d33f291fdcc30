//! # Commands Layer
//!
//! Slash-command definitions, registration, and the administrative
//! handlers for actor management.

pub mod admin;
pub mod slash;

pub use admin::{ensure_role, AdminCommands};

use anyhow::Result;
use log::info;
use serenity::model::application::command::Command;
use serenity::model::application::interaction::application_command::{
    CommandDataOption, CommandDataOptionValue,
};
use serenity::model::id::{GuildId, UserId};
use serenity::prelude::Context;

/// The closed set of administrative commands. Interaction names resolve
/// into this enum once, and dispatch is a plain match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    Register,
    Update,
    Delete,
    Migrate,
    List,
    Info,
}

impl AdminCommand {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "actor-register" => Some(AdminCommand::Register),
            "actor-update" => Some(AdminCommand::Update),
            "actor-delete" => Some(AdminCommand::Delete),
            "actor-migrate" => Some(AdminCommand::Migrate),
            "actor-list" => Some(AdminCommand::List),
            "actor-info" => Some(AdminCommand::Info),
            _ => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            AdminCommand::Register => "actor-register",
            AdminCommand::Update => "actor-update",
            AdminCommand::Delete => "actor-delete",
            AdminCommand::Migrate => "actor-migrate",
            AdminCommand::List => "actor-list",
            AdminCommand::Info => "actor-info",
        }
    }
}

/// Registers all slash commands globally (may take up to an hour to
/// propagate).
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    let definitions = slash::create_slash_commands();
    let count = definitions.len();
    Command::set_global_application_commands(&ctx.http, |commands| {
        for definition in definitions {
            commands.add_application_command(definition);
        }
        commands
    })
    .await?;
    info!("Global slash commands registered successfully ({count} commands)");
    Ok(())
}

/// Registers all slash commands for a specific guild (instant, for
/// development).
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    let definitions = slash::create_slash_commands();
    let count = definitions.len();
    guild_id
        .set_application_commands(&ctx.http, |commands| {
            for definition in definitions {
                commands.add_application_command(definition);
            }
            commands
        })
        .await?;
    info!("Guild slash commands registered for guild {guild_id} ({count} commands)");
    Ok(())
}

/// Utility function to get a string option from a slash command
pub fn get_string_option(options: &[CommandDataOption], name: &str) -> Option<String> {
    options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_ref())
        .and_then(|val| val.as_str())
        .map(|s| s.to_string())
}

/// Utility function to get a user option from a slash command
pub fn get_user_option(options: &[CommandDataOption], name: &str) -> Option<UserId> {
    options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.resolved.as_ref())
        .and_then(|value| match value {
            CommandDataOptionValue::User(user, _) => Some(user.id),
            _ => None,
        })
}

/// Utility function to get an attachment option's URL from a slash command
pub fn get_attachment_option(options: &[CommandDataOption], name: &str) -> Option<String> {
    options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.resolved.as_ref())
        .and_then(|value| match value {
            CommandDataOptionValue::Attachment(attachment) => Some(attachment.url.clone()),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_command_round_trip() {
        for command in [
            AdminCommand::Register,
            AdminCommand::Update,
            AdminCommand::Delete,
            AdminCommand::Migrate,
            AdminCommand::List,
            AdminCommand::Info,
        ] {
            assert_eq!(AdminCommand::from_name(command.name()), Some(command));
        }
    }

    #[test]
    fn test_unknown_command_name() {
        assert_eq!(AdminCommand::from_name("ping"), None);
    }
}
