//! `ChatPlatform` trait: the capability set the bot consumes from the chat
//! service.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::ChatError;

use super::model::{
    ChannelId, ChannelInfo, ChatEvent, ChatMessage, Emoji, GuildId, Member, MessageId, NewChannel,
    OutgoingMessage, Permissions, RelayHandle, RelayMessage, RoleId, UserId,
};

/// Stream of inbound platform events.
pub type EventStream = Pin<Box<dyn Stream<Item = ChatEvent> + Send>>;

/// Backend-agnostic chat operations.
///
/// Every call is a suspend point; implementations map platform failures onto
/// `ChatError` so callers can tell best-effort failures (`Forbidden`,
/// `NotFound`) from real ones.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// The bot's own user id.
    fn bot_user_id(&self) -> UserId;

    // ── Messages ────────────────────────────────────────────────────

    async fn send_message(
        &self,
        channel: ChannelId,
        message: OutgoingMessage,
    ) -> Result<MessageId, ChatError>;

    async fn edit_message(
        &self,
        channel: ChannelId,
        message: MessageId,
        content: OutgoingMessage,
    ) -> Result<(), ChatError>;

    async fn delete_message(&self, channel: ChannelId, message: MessageId)
    -> Result<(), ChatError>;

    /// Fetch up to `limit` messages. `oldest_first` controls ordering of the
    /// returned vector.
    async fn history(
        &self,
        channel: ChannelId,
        limit: usize,
        oldest_first: bool,
    ) -> Result<Vec<ChatMessage>, ChatError>;

    /// Show the "typing…" indicator in a channel.
    async fn trigger_typing(&self, channel: ChannelId) -> Result<(), ChatError>;

    // ── Reactions ───────────────────────────────────────────────────

    async fn add_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: &Emoji,
    ) -> Result<(), ChatError>;

    async fn remove_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: &Emoji,
        user: UserId,
    ) -> Result<(), ChatError>;

    async fn clear_reactions(&self, channel: ChannelId, message: MessageId)
    -> Result<(), ChatError>;

    // ── Identities ──────────────────────────────────────────────────

    /// Resolve a channel. `Ok(None)` when it no longer exists.
    async fn get_channel(&self, channel: ChannelId) -> Result<Option<ChannelInfo>, ChatError>;

    /// Resolve a guild member. `Ok(None)` when the user is not in the guild.
    async fn get_member(&self, guild: GuildId, user: UserId) -> Result<Option<Member>, ChatError>;

    async fn role_name(&self, guild: GuildId, role: RoleId) -> Result<Option<String>, ChatError>;

    async fn add_role(
        &self,
        guild: GuildId,
        user: UserId,
        role: RoleId,
        reason: &str,
    ) -> Result<(), ChatError>;

    /// The bot's effective permissions in a channel.
    async fn permissions_for(&self, channel: ChannelId) -> Result<Permissions, ChatError>;

    // ── Channels ────────────────────────────────────────────────────

    async fn create_channel(&self, request: NewChannel) -> Result<ChannelInfo, ChatError>;

    async fn delete_channel(&self, channel: ChannelId) -> Result<(), ChatError>;

    // ── Relay ───────────────────────────────────────────────────────

    /// Reuse the bot's relay on a channel, creating one if needed.
    async fn get_or_create_relay(
        &self,
        channel: ChannelId,
        name: &str,
    ) -> Result<RelayHandle, ChatError>;

    /// Post a message under another display name/avatar.
    async fn relay(&self, handle: &RelayHandle, message: RelayMessage) -> Result<(), ChatError>;
}
