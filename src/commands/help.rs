// help.rs - Help Command Module
// Provides help information for all bot commands and features

use serenity::{
    client::Context,
    framework::standard::{macros::command, macros::group, CommandResult},
    model::channel::Message,
};

#[command]
#[aliases("h", "commands")]
/// Display help information for all available commands
pub async fn help(ctx: &Context, msg: &Message) -> CommandResult {
    let help_text = r#"**🤖 General Bot - Command Help**

**📝 Basic Commands:**
• `^ping` - Test bot connectivity
• `^help` - Show this help message

**🛡️ Moderation Commands:**
• `^mod kick @user [reason]` - Kick a member
• `^mod ban @user [days] [reason]` - Ban a member, deleting up to 7 days of their messages
• `^mod softban @user [days] [reason]` - Ban and unban to clear a member's recent messages
• `^mod nickname @user <new name>` - Change a member's nickname
• `^mod block @user` - Hide the current channel from a member
• `^mod unblock @user` - Undo a channel block

**🧹 Message Cleanup:**
• `^mod purge all [amount]` - Delete recent messages
• `^mod purge user @user [amount]` - Delete messages from one user
• `^mod purge bots [amount]` - Delete messages from bots
• `^mod purge contains <text> [amount]` - Delete messages containing text
• `^mod purge attachments [amount]` - Delete messages with attachments
• `^mod clean ...` - Same commands under a shorter name

**🌤️ Weather Commands:**
• `^weather` - Weather at your saved location
• `^weather <location>` - Weather anywhere (i.e. Los Angeles)
• `^weather @user` - Weather at another user's saved location
• `^weather set <location>` - Save your location for bare `^weather`

**💡 Notes:**
• Cleanup inspects the most recent 25 messages unless you give an amount
• Moderation commands check your permissions and role position before running

**❓ Need More Help?**
Use `^modhelp` for moderation and cleanup details."#;

    msg.reply(ctx, help_text).await?;
    Ok(())
}

#[command]
#[aliases("mhelp")]
/// Display detailed help for moderation and cleanup commands
pub async fn modhelp(ctx: &Context, msg: &Message) -> CommandResult {
    let mod_help_text = r#"**🛡️ Moderation & Cleanup Commands**

**👢 Member Actions:**
• `^mod kick @user [reason]` - Requires Kick Members
• `^mod ban @user [days] [reason]` - Requires Ban Members; days deletes 0-7 days of messages
• `^mod softban @user [days] [reason]` - Requires Ban Members; the user may rejoin immediately
• `^mod nickname @user <new name>` - Requires Manage Nicknames
• `^mod block @user [reason]` - Requires Manage Channels; hides this channel from the user
• `^mod unblock @user [reason]` - Requires Manage Channels

Targets can be a mention (`@user`) or a raw user id. Bans and softbans accept
an id even when the user is not a member. Reasons are written to the server
audit log together with who issued the command.

**🧹 Message Cleanup** (requires Manage Messages):
• `^mod purge all [amount]`
• `^mod purge user @user [amount]`
• `^mod purge bots [amount]`
• `^mod purge contains <text> [amount]`
• `^mod purge attachments [amount]`

Cleanup fetches the most recent `amount` messages (default 25), keeps the
ones matching the chosen filter and bulk-deletes them. `contains` matches
case-insensitively; quote the text to include spaces. When nothing matches
you get `Found 0 messages!` and nothing is deleted.

**📋 Example Usage:**
```
^mod kick @spammer posting scam links
^mod ban @spammer 7 advertising
^mod purge contains "free nitro" 100
^mod clean bots 50
```

**⚠️ Limits:**
• You and the bot both need the listed permission
• Member actions also require outranking the target's highest role
• Bulk deletion cannot remove messages older than 14 days"#;

    msg.reply(ctx, mod_help_text).await?;
    Ok(())
}

#[group]
#[commands(help, modhelp)]
pub struct Help;
