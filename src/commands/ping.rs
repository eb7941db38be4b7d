// ping.rs - Ping Command Module
// This module implements the ^ping command, which measures and displays the
// bot's response time.
//
// Key Features:
// - Measures round-trip latency for message handling
// - Provides immediate feedback to users
//
// Used by: main.rs (command registration)

use serenity::{
    client::Context,
    framework::standard::{macros::command, macros::group, Args, CommandResult},
    model::channel::Message,
};

#[command]
/// Main ^ping command handler
/// Measures and displays the bot's response time in milliseconds
pub async fn ping(ctx: &Context, msg: &Message, _args: Args) -> CommandResult {
    let start_time = std::time::Instant::now();

    let mut response = msg.reply(ctx, "Pong! Measuring delay...").await?;
    let elapsed = start_time.elapsed();

    let updated = format!("Pong! Response time: {}ms", elapsed.as_millis());
    if let Err(e) = response.edit(&ctx.http, |m| m.content(updated)).await {
        // The initial response already went out, so only log the edit failure.
        eprintln!("[PING] Failed to update ping message with delay: {}", e);
    }

    Ok(())
}

#[group]
#[commands(ping)]
pub struct Ping;
