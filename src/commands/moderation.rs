// moderation.rs - Member Moderation Command Module
// This module implements the ^mod command group: kick, ban, softban, nickname,
// block and unblock. Every action that supports it records an audit log reason
// naming the invoking moderator, so the server audit log shows who asked for
// the action and why.
//
// Key Features:
// - Targets accepted as mention (<@id>, <@!id>) or raw user id
// - Bans take an optional delete-message-days argument (0 to 7)
// - Softban is ban plus immediate unban, clearing the target's recent messages
// - Block/unblock manage a per-channel view permission overwrite
//
// Used by: main.rs (command registration); permission checks live in gate.rs

use serenity::{
    client::Context,
    framework::standard::{macros::command, macros::group, Args, CommandResult},
    model::channel::{Message, PermissionOverwrite, PermissionOverwriteType},
    model::id::UserId,
    model::Permissions,
};
use log::info;

use crate::commands::gate::parse_user_tag;
use crate::commands::purge::PURGE_GROUP;

/// Audit log reason in the form the server log shows: invoker tag, invoker id,
/// the free-form reason, and an action marker for actions that share an API
/// call (ban vs softban).
fn audit_reason(invoker_tag: &str, invoker_id: UserId, reason: &str, marker: Option<&str>) -> String {
    match marker {
        Some(marker) => format!("{} ({}): {} {}", invoker_tag, invoker_id, reason, marker),
        None => format!("{} ({}): {}", invoker_tag, invoker_id, reason),
    }
}

/// Reads the target argument and parses it as a user reference. Replies with
/// usage and yields None when the argument is missing or unparseable.
async fn target_argument(
    ctx: &Context,
    msg: &Message,
    args: &mut Args,
    usage: &str,
) -> serenity::Result<Option<UserId>> {
    let raw = match args.single::<String>() {
        Ok(raw) => raw,
        Err(_) => {
            msg.reply(ctx, format!("Please mention a user! Usage: `{}`", usage))
                .await?;
            return Ok(None);
        }
    };
    match parse_user_tag(&raw) {
        Some(target) => Ok(Some(target)),
        None => {
            msg.reply(ctx, format!("Invalid user mention! Usage: `{}`", usage))
                .await?;
            Ok(None)
        }
    }
}

/// Optional delete-message-days argument for bans. A token that does not
/// parse as a number is left in place as the start of the reason.
fn optional_days(args: &mut Args) -> u8 {
    match args.parse::<u8>() {
        Ok(days) => {
            args.advance();
            days
        }
        Err(_) => 0,
    }
}

#[command]
/// ^mod kick <user> [reason] - Kicks the selected user with the given reason
pub async fn kick(ctx: &Context, msg: &Message, mut args: Args) -> CommandResult {
    let guild_id = match msg.guild_id {
        Some(guild_id) => guild_id,
        // DMs are rejected by the gate before the handler runs.
        None => return Ok(()),
    };
    let target = match target_argument(ctx, msg, &mut args, "mod kick @user [reason]").await? {
        Some(target) => target,
        None => return Ok(()),
    };
    let member = match guild_id.member(ctx, target).await {
        Ok(member) => member,
        Err(_) => {
            msg.reply(ctx, "Could not find that member in this server!").await?;
            return Ok(());
        }
    };

    let reason = args.rest().trim().to_string();
    let audit = audit_reason(&msg.author.tag(), msg.author.id, &reason, None);
    info!(
        "[MOD] {} ({}) kicks {} ({}): {}",
        msg.author.tag(),
        msg.author.id,
        member.user.tag(),
        target,
        reason
    );
    guild_id.kick_with_reason(&ctx.http, target, &audit).await?;

    msg.reply(
        ctx,
        format!("User {} has been kicked from the server.", member.user.tag()),
    )
    .await?;
    Ok(())
}

#[command]
/// ^mod ban <user> [days] [reason] - Bans the selected user, optionally
/// deleting their messages from the last 0 to 7 days
pub async fn ban(ctx: &Context, msg: &Message, mut args: Args) -> CommandResult {
    let guild_id = match msg.guild_id {
        Some(guild_id) => guild_id,
        None => return Ok(()),
    };
    let target = match target_argument(ctx, msg, &mut args, "mod ban @user [days] [reason]").await? {
        Some(target) => target,
        None => return Ok(()),
    };
    let days = optional_days(&mut args);
    if days > 7 {
        msg.reply(ctx, "Delete-message days must be between 0 and 7!").await?;
        return Ok(());
    }

    let reason = args.rest().trim().to_string();
    let audit = audit_reason(&msg.author.tag(), msg.author.id, &reason, Some("(BAN)"));

    // Bans work on non-members too (ban by id), so the reply echoes the raw
    // id when no member record exists.
    let display = match guild_id.member(ctx, target).await {
        Ok(member) => member.user.tag(),
        Err(_) => target.to_string(),
    };
    info!(
        "[MOD] {} ({}) bans {} with {} day(s) of deletion: {}",
        msg.author.tag(),
        msg.author.id,
        target,
        days,
        reason
    );
    guild_id.ban_with_reason(&ctx.http, target, days, &audit).await?;

    msg.reply(ctx, format!("User {} has been banned from the server.", display))
        .await?;
    Ok(())
}

#[command]
/// ^mod softban <user> [days] [reason] - Bans and immediately unbans the user.
/// Useful for purging content from the targeted user.
pub async fn softban(ctx: &Context, msg: &Message, mut args: Args) -> CommandResult {
    let guild_id = match msg.guild_id {
        Some(guild_id) => guild_id,
        None => return Ok(()),
    };
    let target =
        match target_argument(ctx, msg, &mut args, "mod softban @user [days] [reason]").await? {
            Some(target) => target,
            None => return Ok(()),
        };
    let days = optional_days(&mut args);
    if days > 7 {
        msg.reply(ctx, "Delete-message days must be between 0 and 7!").await?;
        return Ok(());
    }

    let reason = args.rest().trim().to_string();
    let audit = audit_reason(&msg.author.tag(), msg.author.id, &reason, Some("(SOFTBAN)"));

    let display = match guild_id.member(ctx, target).await {
        Ok(member) => member.user.tag(),
        Err(_) => target.to_string(),
    };
    info!(
        "[MOD] {} ({}) softbans {} with {} day(s) of deletion: {}",
        msg.author.tag(),
        msg.author.id,
        target,
        days,
        reason
    );
    guild_id.ban_with_reason(&ctx.http, target, days, &audit).await?;
    guild_id.unban(&ctx.http, target).await?;

    msg.reply(ctx, format!("User {} has been banned from the server.", display))
        .await?;
    Ok(())
}

#[command]
/// ^mod nickname <user> <new name> - Changes the nickname for the targeted user
pub async fn nickname(ctx: &Context, msg: &Message, mut args: Args) -> CommandResult {
    let guild_id = match msg.guild_id {
        Some(guild_id) => guild_id,
        None => return Ok(()),
    };
    let target =
        match target_argument(ctx, msg, &mut args, "mod nickname @user <new name>").await? {
            Some(target) => target,
            None => return Ok(()),
        };
    let new_nick = args.rest().trim().to_string();
    if new_nick.is_empty() {
        msg.reply(ctx, "Please provide a new name! Usage: `mod nickname @user <new name>`")
            .await?;
        return Ok(());
    }
    let member = match guild_id.member(ctx, target).await {
        Ok(member) => member,
        Err(_) => {
            msg.reply(ctx, "Could not find that member in this server!").await?;
            return Ok(());
        }
    };

    info!(
        "[MOD] {} ({}) renames {} ({}) to {}",
        msg.author.tag(),
        msg.author.id,
        member.user.tag(),
        target,
        new_nick
    );
    guild_id
        .edit_member(&ctx.http, target, |m| m.nickname(new_nick.as_str()))
        .await?;

    msg.reply(
        ctx,
        format!("Successfully changed {}'s name to {}.", member.user.tag(), new_nick),
    )
    .await?;
    Ok(())
}

#[command]
/// ^mod block <user> [reason] - Blocks a user from viewing the current channel
pub async fn block(ctx: &Context, msg: &Message, mut args: Args) -> CommandResult {
    let target = match target_argument(ctx, msg, &mut args, "mod block @user [reason]").await? {
        Some(target) => target,
        None => return Ok(()),
    };
    let reason = args.rest().trim();

    // Overwrite edits carry no audit reason on this endpoint, so the reason
    // goes to the bot log instead.
    let overwrite = PermissionOverwrite {
        allow: Permissions::empty(),
        deny: Permissions::VIEW_CHANNEL,
        kind: PermissionOverwriteType::Member(target),
    };
    msg.channel_id.create_permission(&ctx.http, &overwrite).await?;
    info!(
        "[MOD] {} ({}) blocks {} in channel {}: {}",
        msg.author.tag(),
        msg.author.id,
        target,
        msg.channel_id,
        reason
    );

    msg.reply(ctx, format!("Successfully blocked <@{}>.", target)).await?;
    Ok(())
}

#[command]
/// ^mod unblock <user> [reason] - Removes a channel block placed with ^mod block
pub async fn unblock(ctx: &Context, msg: &Message, mut args: Args) -> CommandResult {
    let target = match target_argument(ctx, msg, &mut args, "mod unblock @user [reason]").await? {
        Some(target) => target,
        None => return Ok(()),
    };
    let reason = args.rest().trim();

    msg.channel_id
        .delete_permission(&ctx.http, PermissionOverwriteType::Member(target))
        .await?;
    info!(
        "[MOD] {} ({}) unblocks {} in channel {}: {}",
        msg.author.tag(),
        msg.author.id,
        target,
        msg.channel_id,
        reason
    );

    msg.reply(ctx, format!("Successfully unblocked <@{}>", target)).await?;
    Ok(())
}

#[group]
#[prefix = "mod"]
#[commands(kick, ban, softban, nickname, block, unblock)]
#[sub_groups(purge)]
pub struct Moderation;
