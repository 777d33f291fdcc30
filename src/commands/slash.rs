//! Slash command definitions for actor administration

use serenity::builder::CreateApplicationCommand;
use serenity::model::application::command::CommandOptionType;

/// Creates all actor administration commands
pub fn create_slash_commands() -> Vec<CreateApplicationCommand> {
    vec![
        create_register_command(),
        create_update_command(),
        create_delete_command(),
        create_migrate_command(),
        create_list_command(),
        create_info_command(),
    ]
}

fn create_register_command() -> CreateApplicationCommand {
    CreateApplicationCommand::default()
        .name("actor-register")
        .description("Register a new actor.")
        .create_option(|option| {
            option
                .name("name")
                .description("Actor name (mentionable)")
                .kind(CommandOptionType::String)
                .required(true)
        })
        .create_option(|option| {
            option
                .name("context")
                .description("Actor context block")
                .kind(CommandOptionType::String)
                .required(true)
        })
        .create_option(|option| {
            option
                .name("trigger_words")
                .description("Optional trigger words (space-separated).")
                .kind(CommandOptionType::String)
        })
        .create_option(|option| {
            option
                .name("extended_context")
                .description("Optional extended context block.")
                .kind(CommandOptionType::String)
        })
        .create_option(|option| {
            option
                .name("emoji_trigger_words")
                .description("Optional emoji trigger words (space-separated).")
                .kind(CommandOptionType::String)
        })
        .create_option(|option| {
            option
                .name("emoji_context")
                .description("Optional emoji context block.")
                .kind(CommandOptionType::String)
        })
        .create_option(|option| {
            option
                .name("avatar_url")
                .description("Optional image URL for the actor avatar")
                .kind(CommandOptionType::String)
        })
        .create_option(|option| {
            option
                .name("avatar")
                .description("Optional image attachment for the actor avatar")
                .kind(CommandOptionType::Attachment)
        })
        .to_owned()
}

fn create_update_command() -> CreateApplicationCommand {
    CreateApplicationCommand::default()
        .name("actor-update")
        .description("Update an actor context.")
        .create_option(|option| {
            option
                .name("name")
                .description("Actor name")
                .kind(CommandOptionType::String)
                .required(true)
        })
        .create_option(|option| {
            option
                .name("context")
                .description("New context block")
                .kind(CommandOptionType::String)
        })
        .create_option(|option| {
            option
                .name("trigger_words")
                .description("Optional trigger words (space-separated).")
                .kind(CommandOptionType::String)
        })
        .create_option(|option| {
            option
                .name("extended_context")
                .description("Optional extended context block.")
                .kind(CommandOptionType::String)
        })
        .create_option(|option| {
            option
                .name("emoji_trigger_words")
                .description("Optional emoji trigger words (space-separated).")
                .kind(CommandOptionType::String)
        })
        .create_option(|option| {
            option
                .name("emoji_context")
                .description("Optional emoji context block.")
                .kind(CommandOptionType::String)
        })
        .create_option(|option| {
            option
                .name("avatar_url")
                .description("Optional image URL for the actor avatar")
                .kind(CommandOptionType::String)
        })
        .create_option(|option| {
            option
                .name("avatar")
                .description("Optional image attachment for the actor avatar")
                .kind(CommandOptionType::Attachment)
        })
        .to_owned()
}

fn create_delete_command() -> CreateApplicationCommand {
    CreateApplicationCommand::default()
        .name("actor-delete")
        .description("Delete an actor.")
        .create_option(|option| {
            option
                .name("name")
                .description("Actor name")
                .kind(CommandOptionType::String)
                .required(true)
        })
        .to_owned()
}

fn create_migrate_command() -> CreateApplicationCommand {
    CreateApplicationCommand::default()
        .name("actor-migrate")
        .description("Transfer actor ownership.")
        .create_option(|option| {
            option
                .name("name")
                .description("Actor name")
                .kind(CommandOptionType::String)
                .required(true)
        })
        .create_option(|option| {
            option
                .name("owner")
                .description("New owner")
                .kind(CommandOptionType::User)
                .required(true)
        })
        .to_owned()
}

fn create_list_command() -> CreateApplicationCommand {
    CreateApplicationCommand::default()
        .name("actor-list")
        .description("List registered actors.")
        .to_owned()
}

fn create_info_command() -> CreateApplicationCommand {
    CreateApplicationCommand::default()
        .name("actor-info")
        .description("Show the actor configuration details.")
        .create_option(|option| {
            option
                .name("name")
                .description("Actor name")
                .kind(CommandOptionType::String)
                .required(true)
        })
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_slash_commands() {
        let commands = create_slash_commands();
        assert_eq!(commands.len(), 6);

        let command_names: Vec<String> = commands
            .iter()
            .map(|cmd| cmd.0.get("name").unwrap().as_str().unwrap().to_string())
            .collect();

        for expected in [
            "actor-register",
            "actor-update",
            "actor-delete",
            "actor-migrate",
            "actor-list",
            "actor-info",
        ] {
            assert!(
                command_names.contains(&expected.to_string()),
                "Missing command: {expected}"
            );
        }
    }
}
