use anyhow::Result;
use dotenvy::dotenv;
use log::{error, info};
use serenity::async_trait;
use serenity::model::application::interaction::{Interaction, InteractionResponseType};
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::model::id::GuildId;
use serenity::prelude::*;
use std::sync::Arc;

use troupe::commands::{ensure_role, register_global_commands, register_guild_commands};
use troupe::core::Config;
use troupe::database::Database;
use troupe::features::completion::OpenAiBackend;
use troupe::CommandHandler;

struct Handler {
    command_handler: Arc<CommandHandler>,
    guild_id: Option<GuildId>,
    manager_role: String,
}

#[async_trait]
impl EventHandler for Handler {
    async fn message(&self, ctx: Context, msg: Message) {
        if let Err(e) = self.command_handler.handle_message(&ctx, &msg).await {
            error!("Error handling message {}: {e}", msg.id.0);
        }
    }

    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🎉 {} is connected and ready!", ready.user.name);
        info!("📡 Connected to {} guilds", ready.guilds.len());
        info!("🤖 Bot ID: {}", ready.user.id);

        for guild in &ready.guilds {
            if let Err(e) = ensure_role(&ctx, guild.id, &self.manager_role).await {
                error!("Failed ensuring manager role for guild {}: {e}", guild.id);
            }
        }

        // Guild commands update instantly; global ones can take up to an hour
        if let Some(guild_id) = self.guild_id {
            info!("🔧 Development mode: Registering commands for guild {guild_id}");
            if let Err(e) = register_guild_commands(&ctx, guild_id).await {
                error!("❌ Failed to register guild slash commands: {e}");
            }
        } else {
            info!("🌍 Production mode: Registering commands globally");
            if let Err(e) = register_global_commands(&ctx).await {
                error!("❌ Failed to register global slash commands: {e}");
            }
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::ApplicationCommand(command) = interaction {
            if let Err(e) = self
                .command_handler
                .handle_slash_command(&ctx, &command)
                .await
            {
                error!(
                    "Error handling slash command '{}': {e}",
                    command.data.name
                );
                let _ = command
                    .create_interaction_response(&ctx.http, |response| {
                        response
                            .kind(InteractionResponseType::ChannelMessageWithSource)
                            .interaction_response_data(|message| {
                                message
                                    .content("❌ Sorry, I encountered an error processing your command. Please try again.")
                                    .ephemeral(true)
                            })
                    })
                    .await;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = Config::from_env()?;

    // The openai crate reads its credentials from env vars, not from our
    // config. Set both spellings for compatibility.
    std::env::set_var("OPENAI_API_KEY", &config.openai_api_key);
    std::env::set_var("OPENAI_KEY", &config.openai_api_key);

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    info!("Starting troupe actor bot...");

    let database = Database::new(&config.database_path).await?;
    let completion = Arc::new(OpenAiBackend::new(config.openai_model.clone()));
    let command_handler = Arc::new(CommandHandler::new(database, completion, &config));

    // Parse guild ID if provided for development mode
    let guild_id = config
        .discord_guild_id
        .as_ref()
        .and_then(|id| id.parse::<u64>().ok())
        .map(GuildId);

    let handler = Handler {
        command_handler,
        guild_id,
        manager_role: config.manager_role.clone(),
    };

    let intents =
        GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT;

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .await
        .map_err(|e| {
            error!("Failed to create Discord client: {e}");
            anyhow::anyhow!("Client creation failed: {}", e)
        })?;

    info!("Bot configured successfully. Connecting to Discord gateway...");

    if let Err(why) = client.start().await {
        error!("Gateway connection failed: {why:?}");
        return Err(anyhow::anyhow!(
            "Failed to establish gateway connection: {}",
            why
        ));
    }

    Ok(())
}
