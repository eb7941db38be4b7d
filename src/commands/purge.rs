// purge.rs - Message Purge Command Module
// This module implements the ^mod purge (alias: ^mod clean) command family for
// bulk message cleanup. All five subcommands share one pipeline: fetch the most
// recent N messages, keep the ones a single filter selects, and delete them in
// as few bulk-delete calls as the platform allows.
//
// Key Features:
// - Tagged PurgeFilter enum instead of five near-identical handlers
// - Paginated history fetch (the platform returns at most 100 messages per request)
// - Chunked bulk deletion at the platform ceiling of 100 ids per call
// - Messages past the 14-day bulk-delete window are skipped, never submitted
// - "Found 0 messages!" short-circuit before any delete call is made
//
// Used by: main.rs (command registration, via the Moderation group)

use serenity::{
    client::Context,
    framework::standard::{macros::command, macros::group, Args, CommandResult},
    http::Http,
    model::channel::Message,
    model::id::{ChannelId, MessageId, UserId},
    model::Timestamp,
};
use async_trait::async_trait;
use log::{debug, info};
use thiserror::Error;

use crate::commands::gate::parse_user_tag;

/// Most message ids the platform accepts in a single bulk-delete call.
pub const BULK_DELETE_CEILING: usize = 100;

/// Oldest a message may be and still be bulk-deleted. The platform rejects a
/// whole bulk-delete call when any id in it is older than two weeks.
pub const BULK_DELETE_WINDOW_SECS: i64 = 14 * 24 * 60 * 60;

/// Most messages the platform returns per history request; larger amounts paginate.
const FETCH_PAGE_LIMIT: usize = 100;

/// Messages inspected when the caller omits an amount.
const DEFAULT_AMOUNT: usize = 25;

/// Snapshot of one fetched message, reduced to the fields the filters inspect.
/// Owned only for the duration of a single purge invocation.
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    pub id: MessageId,
    pub author_id: UserId,
    pub author_is_bot: bool,
    pub content: String,
    pub attachment_count: usize,
    pub timestamp: Timestamp,
}

impl From<&Message> for ChannelMessage {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            author_id: message.author.id,
            author_is_bot: message.author.bot,
            content: message.content.clone(),
            attachment_count: message.attachments.len(),
            timestamp: message.timestamp,
        }
    }
}

/// Selection rule applied to the fetched window. Each invocation uses exactly
/// one variant; adding a filter mode means adding a variant here and a
/// subcommand below, and the match arms keep the two in sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurgeFilter {
    All,
    User(UserId),
    Bots,
    Contains(String),
    Attachments,
}

impl PurgeFilter {
    pub fn matches(&self, message: &ChannelMessage) -> bool {
        match self {
            PurgeFilter::All => true,
            PurgeFilter::User(id) => message.author_id == *id,
            PurgeFilter::Bots => message.author_is_bot,
            PurgeFilter::Contains(needle) => contains_case_insensitive(&message.content, needle),
            PurgeFilter::Attachments => message.attachment_count > 0,
        }
    }

    /// Success reply posted after a completed purge.
    fn success_reply(&self, deleted: usize) -> String {
        match self {
            PurgeFilter::All => format!("Deleted **{}** message(s)!", deleted),
            PurgeFilter::User(id) => {
                format!("Deleted **{}** message(s) from user **<@{}>**!", deleted, id)
            }
            PurgeFilter::Bots => format!("Deleted **{}** message(s) from bots!", deleted),
            PurgeFilter::Contains(text) => {
                format!("Deleted **{}** message(s) containing {}!", deleted, text)
            }
            PurgeFilter::Attachments => {
                format!("Deleted **{}** message(s) containing attachments!", deleted)
            }
        }
    }
}

/// Substring match, not regex. Lowercasing both sides keeps the comparison
/// case-insensitive for non-ASCII content too.
fn contains_case_insensitive(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Whether the platform would still accept this message in a bulk delete.
fn within_bulk_delete_window(message: &ChannelMessage, now_secs: i64) -> bool {
    now_secs - message.timestamp.unix_timestamp() < BULK_DELETE_WINDOW_SECS
}

#[derive(Debug, Error)]
pub enum PurgeError {
    /// The filter selected nothing from the fetched window. No delete call is
    /// made for this case; the user sees it as a "no matches" outcome rather
    /// than "deleted zero".
    #[error("Found 0 messages!")]
    NoMatches,
    #[error("Failed to fetch messages: {0}")]
    Fetch(#[source] serenity::Error),
    #[error("Failed to delete messages: {0}")]
    Delete(#[source] serenity::Error),
    /// A later chunk failed after earlier chunks went through. The earlier
    /// deletions are not rolled back; moderation cleanup is not atomic.
    #[error("Deleted {deleted} message(s) before a delete call failed: {source}")]
    Partial {
        deleted: usize,
        #[source]
        source: serenity::Error,
    },
}

/// Channel operations the pipeline needs from the platform client. The live
/// implementation wraps serenity's HTTP client; tests substitute a recording
/// mock to assert on call counts and batch sizes.
#[async_trait]
pub trait ChannelOps {
    /// Fetch up to `amount` of the newest messages, newest first. Returning
    /// fewer than `amount` means the channel ran out of history and is not an
    /// error.
    async fn recent_messages(
        &self,
        channel: ChannelId,
        amount: usize,
    ) -> Result<Vec<ChannelMessage>, serenity::Error>;

    /// Delete one batch of ids. Callers keep `ids` within BULK_DELETE_CEILING.
    async fn delete_batch(
        &self,
        channel: ChannelId,
        ids: &[MessageId],
    ) -> Result<(), serenity::Error>;
}

/// Live implementation backed by the platform's REST client.
pub struct HttpChannelOps<'a> {
    http: &'a Http,
}

impl<'a> HttpChannelOps<'a> {
    pub fn new(http: &'a Http) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ChannelOps for HttpChannelOps<'_> {
    async fn recent_messages(
        &self,
        channel: ChannelId,
        amount: usize,
    ) -> Result<Vec<ChannelMessage>, serenity::Error> {
        let mut collected: Vec<ChannelMessage> = Vec::with_capacity(amount.min(FETCH_PAGE_LIMIT));
        let mut before: Option<MessageId> = None;

        // The history endpoint caps each response at FETCH_PAGE_LIMIT, so walk
        // backwards with a `before` cursor until the amount is covered or the
        // channel has no older messages.
        while collected.len() < amount {
            let page_size = (amount - collected.len()).min(FETCH_PAGE_LIMIT);
            let page = channel
                .messages(self.http, |retriever| {
                    let retriever = retriever.limit(page_size as u64);
                    match before {
                        Some(cursor) => retriever.before(cursor),
                        None => retriever,
                    }
                })
                .await?;

            if page.is_empty() {
                break;
            }

            let exhausted = page.len() < page_size;
            before = page.last().map(|message| message.id);
            collected.extend(page.iter().map(ChannelMessage::from));
            if exhausted {
                break;
            }
        }

        Ok(collected)
    }

    async fn delete_batch(
        &self,
        channel: ChannelId,
        ids: &[MessageId],
    ) -> Result<(), serenity::Error> {
        channel.delete_messages(self.http, ids).await
    }
}

/// Runs the whole pipeline: fetch, filter, short-circuit on an empty
/// selection, then delete in sequential chunks. Messages older than the
/// bulk-delete window never enter a chunk. Returns how many ids were
/// submitted for deletion; the count is not re-verified against the platform.
pub async fn purge<O>(
    ops: &O,
    channel: ChannelId,
    filter: &PurgeFilter,
    amount: usize,
) -> Result<usize, PurgeError>
where
    O: ChannelOps + Sync,
{
    debug!("[PURGE] Fetching up to {} message(s) from channel {}", amount, channel);
    let fetched = ops
        .recent_messages(channel, amount)
        .await
        .map_err(PurgeError::Fetch)?;

    // Pure, order-preserving selection over the fetched window; the filter
    // never triggers another fetch. One stale id fails an entire bulk-delete
    // call, so anything past the window is dropped during selection.
    let now_secs = Timestamp::now().unix_timestamp();
    let targets: Vec<MessageId> = fetched
        .iter()
        .filter(|message| within_bulk_delete_window(message, now_secs))
        .filter(|message| filter.matches(message))
        .map(|message| message.id)
        .collect();
    debug!(
        "[PURGE] {} of {} fetched message(s) matched {:?}",
        targets.len(),
        fetched.len(),
        filter
    );

    if targets.is_empty() {
        return Err(PurgeError::NoMatches);
    }

    let mut deleted = 0usize;
    for chunk in targets.chunks(BULK_DELETE_CEILING) {
        match ops.delete_batch(channel, chunk).await {
            Ok(()) => deleted += chunk.len(),
            Err(source) if deleted == 0 => return Err(PurgeError::Delete(source)),
            Err(source) => return Err(PurgeError::Partial { deleted, source }),
        }
    }

    info!("[PURGE] Deleted {} message(s) in channel {}", deleted, channel);
    Ok(deleted)
}

/// Shared handler body for the five subcommands: typing indicator up, run the
/// pipeline against the live client, post the per-filter success reply.
/// Failures (including "Found 0 messages!") propagate to the dispatch layer,
/// which reports them back to the channel.
async fn run_purge(ctx: &Context, msg: &Message, filter: PurgeFilter, amount: usize) -> CommandResult {
    info!(
        "[PURGE] {:?} over {} message(s) requested by {} ({}) in channel {}",
        filter, amount, msg.author.name, msg.author.id, msg.channel_id
    );

    let _typing = ctx.http.start_typing(msg.channel_id.0)?;

    let ops = HttpChannelOps::new(&ctx.http);
    let deleted = purge(&ops, msg.channel_id, &filter, amount).await?;

    msg.reply(ctx, filter.success_reply(deleted)).await?;
    Ok(())
}

/// Reads the optional trailing amount argument, falling back to the default.
fn parse_amount(args: &mut Args) -> Result<usize, String> {
    if args.is_empty() {
        return Ok(DEFAULT_AMOUNT);
    }
    match args.single::<usize>() {
        Ok(amount) => Ok(amount),
        Err(_) => Err(format!(
            "`{}` is not a valid message amount.",
            args.current().unwrap_or("")
        )),
    }
}

#[command]
/// ^mod purge all [amount] - Delete the most recent messages unconditionally
pub async fn all(ctx: &Context, msg: &Message, mut args: Args) -> CommandResult {
    let amount = match parse_amount(&mut args) {
        Ok(amount) => amount,
        Err(reply) => {
            msg.reply(ctx, reply).await?;
            return Ok(());
        }
    };
    run_purge(ctx, msg, PurgeFilter::All, amount).await
}

#[command]
/// ^mod purge user <user> [amount] - Delete recent messages from one author
pub async fn user(ctx: &Context, msg: &Message, mut args: Args) -> CommandResult {
    let raw = match args.single::<String>() {
        Ok(raw) => raw,
        Err(_) => {
            msg.reply(ctx, "Please mention a user! Usage: `mod purge user @user [amount]`")
                .await?;
            return Ok(());
        }
    };
    let target = match parse_user_tag(&raw) {
        Some(id) => id,
        None => {
            msg.reply(ctx, "Invalid user mention! Usage: `mod purge user @user [amount]`")
                .await?;
            return Ok(());
        }
    };
    let amount = match parse_amount(&mut args) {
        Ok(amount) => amount,
        Err(reply) => {
            msg.reply(ctx, reply).await?;
            return Ok(());
        }
    };
    run_purge(ctx, msg, PurgeFilter::User(target), amount).await
}

#[command]
/// ^mod purge bots [amount] - Delete recent messages authored by bot accounts
pub async fn bots(ctx: &Context, msg: &Message, mut args: Args) -> CommandResult {
    let amount = match parse_amount(&mut args) {
        Ok(amount) => amount,
        Err(reply) => {
            msg.reply(ctx, reply).await?;
            return Ok(());
        }
    };
    run_purge(ctx, msg, PurgeFilter::Bots, amount).await
}

#[command]
/// ^mod purge contains <text> [amount] - Delete recent messages containing text
/// (case-insensitive substring; quote the text to include spaces)
pub async fn contains(ctx: &Context, msg: &Message, mut args: Args) -> CommandResult {
    let needle = match args.single_quoted::<String>() {
        Ok(text) if !text.trim().is_empty() => text,
        _ => {
            msg.reply(ctx, "Please provide text to match! Usage: `mod purge contains <text> [amount]`")
                .await?;
            return Ok(());
        }
    };
    let amount = match parse_amount(&mut args) {
        Ok(amount) => amount,
        Err(reply) => {
            msg.reply(ctx, reply).await?;
            return Ok(());
        }
    };
    run_purge(ctx, msg, PurgeFilter::Contains(needle), amount).await
}

#[command]
/// ^mod purge attachments [amount] - Delete recent messages carrying attachments
pub async fn attachments(ctx: &Context, msg: &Message, mut args: Args) -> CommandResult {
    let amount = match parse_amount(&mut args) {
        Ok(amount) => amount,
        Err(reply) => {
            msg.reply(ctx, reply).await?;
            return Ok(());
        }
    };
    run_purge(ctx, msg, PurgeFilter::Attachments, amount).await
}

#[group]
#[prefixes("purge", "clean")]
#[commands(all, user, bots, contains, attachments)]
pub struct Purge;

#[cfg(test)]
mod tests {
    use super::*;
    use serenity::framework::standard::Delimiter;
    use std::sync::Mutex;

    fn message(id: u64, author: u64, bot: bool, content: &str, attachments: usize) -> ChannelMessage {
        ChannelMessage {
            id: MessageId(id),
            author_id: UserId(author),
            author_is_bot: bot,
            content: content.to_string(),
            attachment_count: attachments,
            timestamp: Timestamp::now(),
        }
    }

    fn aged_message(id: u64, age_secs: i64) -> ChannelMessage {
        let written = Timestamp::now().unix_timestamp() - age_secs;
        ChannelMessage {
            id: MessageId(id),
            author_id: UserId(10),
            author_is_bot: false,
            content: "spam".to_string(),
            attachment_count: 0,
            timestamp: Timestamp::from_unix_timestamp(written).unwrap(),
        }
    }

    /// Mock platform client that records every delete batch it receives and
    /// can be told to reject the nth delete call.
    struct RecordingOps {
        messages: Vec<ChannelMessage>,
        fail_on_call: Option<usize>,
        deletes: Mutex<Vec<Vec<MessageId>>>,
    }

    impl RecordingOps {
        fn new(messages: Vec<ChannelMessage>) -> Self {
            Self {
                messages,
                fail_on_call: None,
                deletes: Mutex::new(Vec::new()),
            }
        }

        fn failing_on(messages: Vec<ChannelMessage>, call: usize) -> Self {
            Self {
                messages,
                fail_on_call: Some(call),
                deletes: Mutex::new(Vec::new()),
            }
        }

        fn delete_batches(&self) -> Vec<Vec<MessageId>> {
            self.deletes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChannelOps for RecordingOps {
        async fn recent_messages(
            &self,
            _channel: ChannelId,
            amount: usize,
        ) -> Result<Vec<ChannelMessage>, serenity::Error> {
            Ok(self.messages.iter().take(amount).cloned().collect())
        }

        async fn delete_batch(
            &self,
            _channel: ChannelId,
            ids: &[MessageId],
        ) -> Result<(), serenity::Error> {
            let mut deletes = self.deletes.lock().unwrap();
            if self.fail_on_call == Some(deletes.len() + 1) {
                return Err(serenity::Error::Other("delete rejected"));
            }
            deletes.push(ids.to_vec());
            Ok(())
        }
    }

    fn mixed_fixture() -> Vec<ChannelMessage> {
        vec![
            message(1, 10, false, "Hello World", 0),
            message(2, 11, true, "beep boop", 0),
            message(3, 10, false, "look at this", 2),
            message(4, 12, false, "hello again", 0),
            message(5, 11, true, "Hello World", 1),
        ]
    }

    #[test]
    fn filters_select_subsets_and_keep_fetch_order() {
        let fixture = mixed_fixture();
        let filters = [
            PurgeFilter::All,
            PurgeFilter::User(UserId(10)),
            PurgeFilter::Bots,
            PurgeFilter::Contains("hello".to_string()),
            PurgeFilter::Attachments,
        ];

        for filter in &filters {
            let selected: Vec<MessageId> = fixture
                .iter()
                .filter(|m| filter.matches(m))
                .map(|m| m.id)
                .collect();

            // Every selected id comes from the fixture, in fixture order.
            let mut cursor = fixture.iter();
            for id in &selected {
                assert!(
                    cursor.any(|m| m.id == *id),
                    "{:?} selected {:?} out of order or out of set",
                    filter,
                    id
                );
            }
        }
    }

    #[test]
    fn contains_filter_is_case_insensitive_substring_match() {
        let greeting = message(1, 10, false, "Hello World", 0);
        assert!(PurgeFilter::Contains("hello".to_string()).matches(&greeting));
        assert!(PurgeFilter::Contains("O WOR".to_string()).matches(&greeting));
        assert!(!PurgeFilter::Contains("xyz".to_string()).matches(&greeting));
    }

    #[test]
    fn bots_filter_excludes_humans_with_identical_content() {
        let human = message(1, 10, false, "same words", 0);
        let bot = message(2, 11, true, "same words", 0);
        assert!(!PurgeFilter::Bots.matches(&human));
        assert!(PurgeFilter::Bots.matches(&bot));
    }

    #[test]
    fn attachments_filter_requires_a_nonempty_attachment_list() {
        let bare = message(1, 10, false, "attachment attachment", 0);
        let with_file = message(2, 10, false, "", 1);
        assert!(!PurgeFilter::Attachments.matches(&bare));
        assert!(PurgeFilter::Attachments.matches(&with_file));
    }

    #[tokio::test]
    async fn empty_selection_short_circuits_before_any_delete_call() {
        let fixture: Vec<ChannelMessage> =
            (1..=10).map(|i| message(i, 10, false, "hello", 0)).collect();
        let ops = RecordingOps::new(fixture);

        let err = purge(&ops, ChannelId(1), &PurgeFilter::Contains("xyz".to_string()), 10)
            .await
            .unwrap_err();

        assert!(matches!(err, PurgeError::NoMatches));
        assert_eq!(err.to_string(), "Found 0 messages!");
        assert_eq!(ops.delete_batches().len(), 0);
    }

    #[tokio::test]
    async fn large_selection_is_chunked_at_the_bulk_delete_ceiling() {
        let fixture: Vec<ChannelMessage> =
            (1..=250).map(|i| message(i, 10, false, "spam", 0)).collect();
        let ops = RecordingOps::new(fixture);

        let deleted = purge(&ops, ChannelId(1), &PurgeFilter::All, 250).await.unwrap();
        assert_eq!(deleted, 250);

        let batches = ops.delete_batches();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 100);
        assert_eq!(batches[1].len(), 100);
        assert_eq!(batches[2].len(), 50);
        assert!(batches.iter().all(|b| b.len() <= BULK_DELETE_CEILING));
        assert_eq!(batches.iter().map(|b| b.len()).sum::<usize>(), 250);
    }

    #[tokio::test]
    async fn bots_purge_deletes_exactly_the_bot_messages() {
        let mut fixture = Vec::new();
        for i in 1..=30u64 {
            // every sixth message is bot-authored: 6, 12, 18, 24, 30
            fixture.push(message(i, 100 + i, i % 6 == 0, "chatter", 0));
        }
        let ops = RecordingOps::new(fixture);

        let deleted = purge(&ops, ChannelId(1), &PurgeFilter::Bots, 30).await.unwrap();
        assert_eq!(deleted, 5);
        assert_eq!(
            PurgeFilter::Bots.success_reply(deleted),
            "Deleted **5** message(s) from bots!"
        );

        let batches = ops.delete_batches();
        assert_eq!(batches.len(), 1);
        let expected: Vec<MessageId> = [6u64, 12, 18, 24, 30].iter().map(|i| MessageId(*i)).collect();
        assert_eq!(batches[0], expected);
    }

    #[tokio::test]
    async fn shorter_history_than_requested_is_not_an_error() {
        let fixture: Vec<ChannelMessage> =
            (1..=7).map(|i| message(i, 10, false, "short channel", 0)).collect();
        let ops = RecordingOps::new(fixture);

        let deleted = purge(&ops, ChannelId(1), &PurgeFilter::All, 25).await.unwrap();
        assert_eq!(deleted, 7);
    }

    #[test]
    fn the_age_check_cuts_at_fourteen_days() {
        let now = Timestamp::now().unix_timestamp();
        let fresh = aged_message(1, BULK_DELETE_WINDOW_SECS - 60);
        let stale = aged_message(2, BULK_DELETE_WINDOW_SECS + 60);
        assert!(within_bulk_delete_window(&fresh, now));
        assert!(!within_bulk_delete_window(&stale, now));
    }

    #[tokio::test]
    async fn stale_messages_are_skipped_not_submitted() {
        let fixture = vec![
            aged_message(1, 60),
            aged_message(2, BULK_DELETE_WINDOW_SECS + 3600),
            aged_message(3, BULK_DELETE_WINDOW_SECS - 3600),
            aged_message(4, 30 * 24 * 60 * 60),
        ];
        let ops = RecordingOps::new(fixture);

        let deleted = purge(&ops, ChannelId(1), &PurgeFilter::All, 4).await.unwrap();
        assert_eq!(deleted, 2);

        let batches = ops.delete_batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0], vec![MessageId(1), MessageId(3)]);
    }

    #[tokio::test]
    async fn a_window_of_only_stale_messages_is_no_matches() {
        let fixture = vec![
            aged_message(1, 15 * 24 * 60 * 60),
            aged_message(2, 20 * 24 * 60 * 60),
        ];
        let ops = RecordingOps::new(fixture);

        let err = purge(&ops, ChannelId(1), &PurgeFilter::All, 2).await.unwrap_err();
        assert!(matches!(err, PurgeError::NoMatches));
        assert_eq!(ops.delete_batches().len(), 0);
    }

    #[tokio::test]
    async fn later_chunk_failure_reports_partial_deletion() {
        let fixture: Vec<ChannelMessage> =
            (1..=150).map(|i| message(i, 10, false, "spam", 0)).collect();
        let ops = RecordingOps::failing_on(fixture, 2);

        let err = purge(&ops, ChannelId(1), &PurgeFilter::All, 150).await.unwrap_err();
        match err {
            PurgeError::Partial { deleted, .. } => assert_eq!(deleted, 100),
            other => panic!("expected Partial, got {:?}", other),
        }
        assert_eq!(ops.delete_batches().len(), 1);
    }

    #[tokio::test]
    async fn first_chunk_failure_is_a_plain_delete_failure() {
        let fixture: Vec<ChannelMessage> =
            (1..=10).map(|i| message(i, 10, false, "spam", 0)).collect();
        let ops = RecordingOps::failing_on(fixture, 1);

        let err = purge(&ops, ChannelId(1), &PurgeFilter::All, 10).await.unwrap_err();
        assert!(matches!(err, PurgeError::Delete(_)));
    }

    #[test]
    fn amount_argument_defaults_and_validates() {
        let mut empty = Args::new("", &[Delimiter::Single(' ')]);
        assert_eq!(parse_amount(&mut empty).unwrap(), DEFAULT_AMOUNT);

        let mut forty = Args::new("40", &[Delimiter::Single(' ')]);
        assert_eq!(parse_amount(&mut forty).unwrap(), 40);

        let mut garbage = Args::new("lots", &[Delimiter::Single(' ')]);
        assert!(parse_amount(&mut garbage).is_err());
    }

    #[test]
    fn success_replies_name_the_filter() {
        assert_eq!(PurgeFilter::All.success_reply(3), "Deleted **3** message(s)!");
        assert_eq!(
            PurgeFilter::User(UserId(42)).success_reply(2),
            "Deleted **2** message(s) from user **<@42>**!"
        );
        assert_eq!(
            PurgeFilter::Contains("spam".to_string()).success_reply(1),
            "Deleted **1** message(s) containing spam!"
        );
        assert_eq!(
            PurgeFilter::Attachments.success_reply(4),
            "Deleted **4** message(s) containing attachments!"
        );
    }
}
