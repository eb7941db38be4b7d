// gate.rs - Command Precondition Gate
// This module holds the capability checks that run before any moderation or
// purge command handler executes. Instead of repeating permission checks
// inside every handler, each command name maps to a list of requirements and
// the framework's before-hook evaluates them in order, stopping at the first
// failure.
//
// Key Features:
// - Requirement enum: guild-only, invoker permission, bot permission, role hierarchy
// - Static registry mapping command names to their requirement lists
// - Target resolution from the first user mention or raw id in the message
// - Denial text returned to the dispatch layer for a single reply path
//
// Used by: main.rs (before-hook), purge.rs / moderation.rs / weather.rs (target parsing)

use serenity::{client::Context, model::channel::Message, model::id::UserId, model::Permissions};
use log::debug;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// One capability check. A command passes its gate only when every listed
/// requirement passes; evaluation order is the registry order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// The message must come from a guild channel, not a DM.
    GuildOnly,
    /// The invoking member must hold this guild permission (or Administrator).
    UserPermission(Permissions),
    /// The bot's own member must hold this guild permission (or Administrator).
    BotPermission(Permissions),
    /// Both the invoker and the bot must sit strictly above the targeted
    /// member in the role hierarchy. Skipped when the message names no target
    /// or the target is not a guild member.
    HierarchyOverTarget,
}

static COMMAND_REQUIREMENTS: Lazy<HashMap<&'static str, &'static [Requirement]>> = Lazy::new(|| {
    const KICK: &[Requirement] = &[
        Requirement::GuildOnly,
        Requirement::UserPermission(Permissions::KICK_MEMBERS),
        Requirement::BotPermission(Permissions::KICK_MEMBERS),
        Requirement::HierarchyOverTarget,
    ];
    const BAN: &[Requirement] = &[
        Requirement::GuildOnly,
        Requirement::UserPermission(Permissions::BAN_MEMBERS),
        Requirement::BotPermission(Permissions::BAN_MEMBERS),
        Requirement::HierarchyOverTarget,
    ];
    const NICKNAME: &[Requirement] = &[
        Requirement::GuildOnly,
        Requirement::UserPermission(Permissions::MANAGE_NICKNAMES),
        Requirement::BotPermission(Permissions::MANAGE_NICKNAMES),
        Requirement::HierarchyOverTarget,
    ];
    const BLOCK: &[Requirement] = &[
        Requirement::GuildOnly,
        Requirement::UserPermission(Permissions::MANAGE_CHANNELS),
        Requirement::BotPermission(Permissions::MANAGE_CHANNELS),
        Requirement::HierarchyOverTarget,
    ];
    const PURGE: &[Requirement] = &[
        Requirement::GuildOnly,
        Requirement::UserPermission(Permissions::MANAGE_MESSAGES),
        Requirement::BotPermission(Permissions::MANAGE_MESSAGES),
    ];
    const GUILD: &[Requirement] = &[Requirement::GuildOnly];

    let mut map: HashMap<&'static str, &'static [Requirement]> = HashMap::new();
    map.insert("kick", KICK);
    map.insert("ban", BAN);
    map.insert("softban", BAN);
    map.insert("nickname", NICKNAME);
    map.insert("block", BLOCK);
    map.insert("unblock", BLOCK);
    map.insert("all", PURGE);
    map.insert("user", PURGE);
    map.insert("bots", PURGE);
    map.insert("contains", PURGE);
    map.insert("attachments", PURGE);
    map.insert("weather", GUILD);
    map.insert("set", GUILD);
    map
});

/// Evaluates the requirement list registered for `command_name`. Commands
/// without an entry pass unconditionally. On failure the returned string is
/// the denial text shown to the invoker; the handler itself never runs.
pub async fn enforce(ctx: &Context, msg: &Message, command_name: &str) -> Result<(), String> {
    let requirements = match COMMAND_REQUIREMENTS.get(command_name) {
        Some(requirements) => *requirements,
        None => return Ok(()),
    };

    for requirement in requirements {
        check_requirement(ctx, msg, requirement).await?;
    }
    Ok(())
}

async fn check_requirement(
    ctx: &Context,
    msg: &Message,
    requirement: &Requirement,
) -> Result<(), String> {
    match requirement {
        Requirement::GuildOnly => {
            if msg.guild_id.is_none() {
                return Err("This command only works in a server.".to_string());
            }
            Ok(())
        }
        Requirement::UserPermission(required) => {
            let member = msg
                .member(ctx)
                .await
                .map_err(|_| "Could not look up your server membership.".to_string())?;
            let held = member
                .permissions(&ctx.cache)
                .map_err(|_| "Could not resolve your permissions.".to_string())?;
            if has_permission(held, *required) {
                Ok(())
            } else {
                Err(format!(
                    "You need the **{}** permission to use this command.",
                    permission_name(*required)
                ))
            }
        }
        Requirement::BotPermission(required) => {
            let guild_id = match msg.guild_id {
                Some(guild_id) => guild_id,
                None => return Err("This command only works in a server.".to_string()),
            };
            let bot_member = guild_id
                .member(ctx, ctx.cache.current_user_id())
                .await
                .map_err(|_| "Could not look up my own server membership.".to_string())?;
            let held = bot_member
                .permissions(&ctx.cache)
                .map_err(|_| "Could not resolve my permissions.".to_string())?;
            if has_permission(held, *required) {
                Ok(())
            } else {
                Err(format!(
                    "I need the **{}** permission to do that.",
                    permission_name(*required)
                ))
            }
        }
        Requirement::HierarchyOverTarget => {
            let guild = match msg.guild(&ctx.cache) {
                Some(guild) => guild,
                None => return Err("This command only works in a server.".to_string()),
            };
            let target = match first_user_target(&msg.content) {
                Some(target) => target,
                // No target argument yet; the handler reports its own usage.
                None => return Ok(()),
            };
            // Targets outside the guild (ban by id, unban) have no role
            // position to compare.
            if !guild.members.contains_key(&target) {
                debug!(
                    "[GATE] Target {} not in member cache, skipping hierarchy check",
                    target
                );
                return Ok(());
            }

            let invoker = msg.author.id;
            if guild.greater_member_hierarchy(&ctx.cache, invoker, target) != Some(invoker) {
                return Err("You cannot moderate a member with an equal or higher role.".to_string());
            }
            let bot = ctx.cache.current_user_id();
            if guild.greater_member_hierarchy(&ctx.cache, bot, target) != Some(bot) {
                return Err("My highest role is not above that member's.".to_string());
            }
            Ok(())
        }
    }
}

fn has_permission(held: Permissions, required: Permissions) -> bool {
    held.contains(required) || held.contains(Permissions::ADMINISTRATOR)
}

fn permission_name(permission: Permissions) -> &'static str {
    if permission == Permissions::KICK_MEMBERS {
        "Kick Members"
    } else if permission == Permissions::BAN_MEMBERS {
        "Ban Members"
    } else if permission == Permissions::MANAGE_MESSAGES {
        "Manage Messages"
    } else if permission == Permissions::MANAGE_NICKNAMES {
        "Manage Nicknames"
    } else if permission == Permissions::MANAGE_CHANNELS {
        "Manage Channels"
    } else {
        "required"
    }
}

/// Parses one token as a user mention, `<@id>` or `<@!id>`. A bare numeric
/// id is not a mention.
pub fn parse_user_mention(raw: &str) -> Option<UserId> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix("<@!")
        .or_else(|| trimmed.strip_prefix("<@"))?
        .strip_suffix('>')?;
    inner.parse::<u64>().ok().filter(|id| *id > 0).map(UserId)
}

/// Parses one token as a user reference: `<@id>`, `<@!id>`, or a raw id.
pub fn parse_user_tag(raw: &str) -> Option<UserId> {
    parse_user_mention(raw)
        .or_else(|| raw.trim().parse::<u64>().ok().filter(|id| *id > 0).map(UserId))
}

/// First user reference in the raw message. The prefix and command words are
/// never valid user tags, so a plain token scan finds the target argument.
pub fn first_user_target(content: &str) -> Option<UserId> {
    content.split_whitespace().find_map(parse_user_tag)
}
