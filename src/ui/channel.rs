use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serenity::{
    builder::{CreateMessage, EditMessage},
    collector::ReactionCollector,
    model::{
        channel::{Reaction, ReactionType},
        id::{ChannelId, MessageId, UserId},
    },
    prelude::Context,
};

use super::{embeds, paginator::QueuePage};

/// A reaction added to a message by some user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionEvent {
    pub emoji: String,
    pub user_id: Option<UserId>,
}

/// Reactions on one message, in arrival order. Ends when the subscription is
/// dropped.
pub type ReactionStream = BoxStream<'static, ReactionEvent>;

/// Text channel a command was invoked from; all user-visible output goes
/// through it.
#[async_trait]
pub trait ChatChannel: Send + Sync {
    async fn say(&self, text: &str) -> Result<()>;

    async fn send_page(&self, page: &QueuePage) -> Result<MessageId>;

    async fn edit_page(&self, message: MessageId, page: &QueuePage) -> Result<()>;

    async fn add_reaction(&self, message: MessageId, emoji: &str) -> Result<()>;

    /// Subscribes to non-bot reactions on `message` using one of `accepted`.
    /// Reactions arriving while the caller is busy are buffered, not lost.
    async fn watch_reactions(&self, message: MessageId, accepted: &[&str]) -> Result<ReactionStream>;

    async fn remove_reaction(&self, message: MessageId, reaction: &ReactionEvent) -> Result<()>;
}

/// [`ChatChannel`] over a Discord text channel.
#[derive(Clone)]
pub struct DiscordChannel {
    ctx: Context,
    channel_id: ChannelId,
}

impl DiscordChannel {
    pub fn new(ctx: &Context, channel_id: ChannelId) -> Self {
        Self {
            ctx: ctx.clone(),
            channel_id,
        }
    }
}

fn is_human(reaction: &Reaction, bot_id: UserId) -> bool {
    let from_bot = reaction.member.as_ref().is_some_and(|member| member.user.bot);
    !from_bot && reaction.user_id.is_some_and(|user| user != bot_id)
}

#[async_trait]
impl ChatChannel for DiscordChannel {
    async fn say(&self, text: &str) -> Result<()> {
        self.channel_id.say(&self.ctx.http, text).await?;
        Ok(())
    }

    async fn send_page(&self, page: &QueuePage) -> Result<MessageId> {
        let message = self
            .channel_id
            .send_message(
                &self.ctx,
                CreateMessage::new().embed(embeds::queue_page_embed(page)),
            )
            .await?;
        Ok(message.id)
    }

    async fn edit_page(&self, message: MessageId, page: &QueuePage) -> Result<()> {
        self.channel_id
            .edit_message(
                &self.ctx,
                message,
                EditMessage::new().embed(embeds::queue_page_embed(page)),
            )
            .await?;
        Ok(())
    }

    async fn add_reaction(&self, message: MessageId, emoji: &str) -> Result<()> {
        self.channel_id
            .create_reaction(&self.ctx.http, message, ReactionType::Unicode(emoji.to_string()))
            .await?;
        Ok(())
    }

    async fn watch_reactions(&self, message: MessageId, accepted: &[&str]) -> Result<ReactionStream> {
        let bot_id = self.ctx.cache.current_user().id;
        let accepted: Vec<String> = accepted.iter().map(|emoji| emoji.to_string()).collect();

        let reactions = ReactionCollector::new(&self.ctx)
            .message_id(message)
            .filter(move |reaction| {
                let wanted = matches!(
                    &reaction.emoji,
                    ReactionType::Unicode(emoji) if accepted.contains(emoji)
                );
                wanted && is_human(reaction, bot_id)
            })
            .stream()
            .map(|reaction| ReactionEvent {
                emoji: reaction.emoji.to_string(),
                user_id: reaction.user_id,
            });

        Ok(reactions.boxed())
    }

    async fn remove_reaction(&self, message: MessageId, reaction: &ReactionEvent) -> Result<()> {
        self.channel_id
            .delete_reaction(
                &self.ctx.http,
                message,
                reaction.user_id,
                ReactionType::Unicode(reaction.emoji.clone()),
            )
            .await?;
        Ok(())
    }
}
