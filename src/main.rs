// main.rs - General Bot entry point
// Loads configuration from botconfig.txt, wires up the command framework and
// runs the gateway client until shutdown.
//
// Key Features:
// - KEY=VALUE configuration file with environment variable fallthrough
// - Capability gate evaluated before every command dispatch
// - Command failures reported back to the invoking channel
// - Graceful shutdown on Ctrl+C

mod commands;

use serenity::{
    async_trait,
    client::{Client, Context, EventHandler},
    framework::standard::StandardFramework,
    model::gateway::Ready,
    prelude::GatewayIntents,
};
use std::collections::HashMap;
use std::env;
use std::fs;
use tokio::signal;

use crate::commands::gate;
use crate::commands::help::HELP_GROUP;
use crate::commands::moderation::MODERATION_GROUP;
use crate::commands::ping::PING_GROUP;
use crate::commands::weather::{UserLocationMap, WEATHER_GROUP};

struct Handler;

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _: Context, ready: Ready) {
        // log::info!("✅ Bot connected as {}! (ID: {})", ready.user.name, ready.user.id);
        println!("✅ Bot connected as {}!", ready.user.name);
        println!("📊 Serving {} guild(s)", ready.guilds.len());
    }
}

fn load_bot_config() -> Result<HashMap<String, String>, String> {
    let config_paths = [
        "botconfig.txt",
        "../botconfig.txt",
        "../../botconfig.txt",
        "src/botconfig.txt",
    ];

    // Clear any existing relevant environment variables
    env::remove_var("DISCORD_TOKEN");
    env::remove_var("PREFIX");
    env::remove_var("RUST_LOG");
    env::remove_var("GEOCODER_BASE_URL");
    env::remove_var("FORECAST_BASE_URL");

    for config_path in &config_paths {
        match fs::read_to_string(config_path) {
            Ok(content) => {
                // Remove BOM if present
                let content = content.strip_prefix('\u{feff}').unwrap_or(&content);
                let mut config = HashMap::new();

                // Parse the config file line by line
                for line in content.lines() {
                    let line = line.trim();

                    // Skip empty lines and comments
                    if line.is_empty() || line.starts_with('#') {
                        continue;
                    }

                    // Parse KEY=VALUE format
                    if let Some(equals_pos) = line.find('=') {
                        let key = line[..equals_pos].trim().to_string();
                        let value = line[equals_pos + 1..].trim().to_string();

                        // Set environment variable for compatibility
                        env::set_var(&key, &value);
                        config.insert(key, value);
                    }
                }

                println!("✅ Configuration loaded from {}", config_path);
                return Ok(config);
            }
            Err(_) => {
                // Try next path
                continue;
            }
        }
    }

    Err("No botconfig.txt file found in any expected location (., .., ../.., src/)".to_string())
}

#[tokio::main]
async fn main() {
    // Initialize logger - must be done before any logging calls
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("error"))
        .format_timestamp_secs()
        .init();

    // Load configuration from botconfig.txt file
    match load_bot_config() {
        Ok(_) => {
            println!("✅ Configuration loaded from botconfig.txt");
        }
        Err(error) => {
            log::error!("❌ Failed to load botconfig.txt: {}", error);
            eprintln!("❌ Failed to load botconfig.txt: {}", error);
            eprintln!("Create a botconfig.txt file in the project root with: DISCORD_TOKEN=your_token_here and PREFIX=^");
            return;
        }
    };

    // Get Discord token from configuration
    let token = match env::var("DISCORD_TOKEN") {
        Ok(token) => {
            // Validate token is not placeholder
            if token == "YOUR_BOT_TOKEN_HERE" || token.is_empty() {
                log::error!("❌ DISCORD_TOKEN in botconfig.txt is set to placeholder value");
                eprintln!("❌ DISCORD_TOKEN in botconfig.txt is set to placeholder! Replace with your actual Discord bot token.");
                return;
            }
            token
        }
        Err(_) => {
            log::error!("❌ DISCORD_TOKEN not found in botconfig.txt file");
            eprintln!("❌ DISCORD_TOKEN not found in botconfig.txt file!");
            return;
        }
    };

    // Get command prefix from configuration
    let prefix = env::var("PREFIX").unwrap_or_else(|_| "^".to_string());
    println!("🤖 Starting bot with prefix: '{}'", prefix);

    // Set up command framework
    let framework = StandardFramework::new()
        .configure(|c| {
            c.prefix(&prefix)
                .case_insensitivity(true)
                .no_dm_prefix(true)
                .with_whitespace(true)
        })
        .before(|ctx, msg, command_name| Box::pin(async move {
            match gate::enforce(ctx, msg, command_name).await {
                Ok(()) => true,
                Err(denial) => {
                    log::warn!(
                        "🚫 Command '{}' denied for user {} ({}): {}",
                        command_name, msg.author.name, msg.author.id, denial
                    );
                    if let Err(e) = msg.reply(ctx, format!("🚫 {}", denial)).await {
                        log::error!("❌ Failed to send denial reply: {}", e);
                    }
                    false
                }
            }
        }))
        .after(|ctx, msg, command_name, result| Box::pin(async move {
            match result {
                Ok(()) => {
                    // log::info!("✅ Command '{}' executed successfully by user {} ({})",
                    //           command_name, msg.author.name, msg.author.id);
                }
                Err(error) => {
                    log::error!(
                        "❌ Command '{}' failed for user {} ({}): {}",
                        command_name, msg.author.name, msg.author.id, error
                    );
                    // Surface the failure in the channel, the same way
                    // successful commands confirm what they did.
                    if let Err(e) = msg.reply(ctx, format!("❌ {}", error)).await {
                        log::error!("❌ Failed to send failure reply: {}", e);
                    }
                }
            }
        }))
        .unrecognised_command(|_ctx, msg, unrecognised_command_name| Box::pin(async move {
            log::debug!(
                "❓ Unrecognised command '{}' attempted by user {} ({})",
                unrecognised_command_name, msg.author.name, msg.author.id
            );
        }))
        .group(&PING_GROUP)
        .group(&HELP_GROUP)
        .group(&MODERATION_GROUP)
        .group(&WEATHER_GROUP);

    // Configure bot intents. Member data feeds the role hierarchy checks in
    // the command gate.
    let intents = GatewayIntents::non_privileged()
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MEMBERS;

    // Create and start client
    let mut client = match Client::builder(token, intents)
        .event_handler(Handler)
        .framework(framework)
        .await
    {
        Ok(client) => client,
        Err(e) => {
            log::error!("❌ Error creating Discord client: {:?}", e);
            eprintln!("❌ Error creating Discord client: {:?}", e);
            eprintln!("Check your token in botconfig.txt file");
            return;
        }
    };

    // Initialize the saved location map for weather commands. Locations live
    // in memory only and reset on restart.
    {
        let mut data = client.data.write().await;
        data.insert::<UserLocationMap>(HashMap::new());
    }

    // Set up graceful shutdown on CTRL+C
    println!("🚀 Bot is running...");
    println!("💡 Press Ctrl+C to stop gracefully");
    tokio::select! {
        _ = signal::ctrl_c() => {
            println!("\n⏹️ Stopping bot gracefully...");
        }
        result = client.start() => {
            if let Err(why) = result {
                log::error!("❌ Client error: {:?}", why);
                eprintln!("❌ Client error: {:?}", why);
            }
        }
    }

    println!("✅ Bot stopped");
}
