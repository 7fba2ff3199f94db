//! In-memory chat platform that records every operation.
//!
//! Backs the test suite and works as a dry-run backend: channels, members
//! and history are seeded by the caller, and everything the bot sends is
//! appended to the channel's history as a message authored by the bot.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use futures::stream;
use tokio::sync::mpsc;

use crate::error::ChatError;

use super::model::{
    Author, ChannelId, ChannelInfo, ChatEvent, ChatMessage, Emoji, GuildId, Member, MessageId,
    NewChannel, OutgoingMessage, Permissions, RelayHandle, RelayMessage, RoleId, UserId, WebhookId,
};
use super::platform::{ChatPlatform, EventStream};

#[derive(Default)]
struct State {
    channels: HashMap<ChannelId, ChannelInfo>,
    history: HashMap<ChannelId, Vec<ChatMessage>>,
    members: HashMap<(GuildId, UserId), Member>,
    roles: HashMap<(GuildId, RoleId), String>,
    reactions: HashMap<MessageId, Vec<(Emoji, UserId)>>,
    permissions: HashMap<ChannelId, Permissions>,
    relays: HashMap<ChannelId, RelayHandle>,
    relayed: Vec<(ChannelId, RelayMessage)>,
    created_channels: Vec<NewChannel>,
    deleted_channels: Vec<ChannelId>,
    role_grants: Vec<(GuildId, UserId, RoleId)>,
    typing: HashMap<ChannelId, usize>,
    failing_sends: HashSet<ChannelId>,
    fail_relay_after: Option<usize>,
}

/// In-process `ChatPlatform`.
pub struct MemoryPlatform {
    bot_id: UserId,
    next_id: AtomicU64,
    state: Mutex<State>,
    events_tx: mpsc::UnboundedSender<ChatEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<ChatEvent>>>,
}

impl MemoryPlatform {
    pub fn new(bot_id: UserId) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            bot_id,
            next_id: AtomicU64::new(1_000_000),
            state: Mutex::new(State::default()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn bot_author(&self) -> Author {
        Author {
            id: self.bot_id,
            display_name: "PNBot".to_string(),
            avatar_url: None,
            bot: true,
        }
    }

    // ── Seeding ─────────────────────────────────────────────────────

    pub fn add_channel(&self, guild: GuildId, channel: ChannelId, name: &str) {
        let mut state = self.state();
        state.channels.insert(
            channel,
            ChannelInfo {
                id: channel,
                guild_id: Some(guild),
                name: name.to_string(),
            },
        );
        state.history.entry(channel).or_default();
    }

    pub fn remove_channel(&self, channel: ChannelId) {
        let mut state = self.state();
        state.channels.remove(&channel);
        state.history.remove(&channel);
    }

    pub fn add_member(&self, member: Member) {
        self.state()
            .members
            .insert((member.guild_id, member.id), member);
    }

    pub fn remove_member(&self, guild: GuildId, user: UserId) {
        self.state().members.remove(&(guild, user));
    }

    pub fn add_role(&self, guild: GuildId, role: RoleId, name: &str) {
        self.state().roles.insert((guild, role), name.to_string());
    }

    pub fn set_permissions(&self, channel: ChannelId, permissions: Permissions) {
        self.state().permissions.insert(channel, permissions);
    }

    /// Append a message authored by someone other than the bot.
    pub fn push_history(&self, message: ChatMessage) {
        self.state()
            .history
            .entry(message.channel_id)
            .or_default()
            .push(message);
    }

    /// Make every send to `channel` fail with an HTTP error.
    pub fn fail_sends_to(&self, channel: ChannelId) {
        self.state().failing_sends.insert(channel);
    }

    /// Let `n` relay calls succeed, then fail every subsequent one.
    pub fn fail_relay_after(&self, n: usize) {
        self.state().fail_relay_after = Some(n);
    }

    /// Queue an inbound event for the stream returned by `event_stream`.
    pub fn emit(&self, event: ChatEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Take the inbound event stream. Only the first call gets it.
    pub fn event_stream(&self) -> Option<EventStream> {
        let rx = self.events_rx.lock().ok()?.take()?;
        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });
        Some(Box::pin(stream))
    }

    // ── Inspection ──────────────────────────────────────────────────

    /// Every message in a channel, oldest first.
    pub fn messages(&self, channel: ChannelId) -> Vec<ChatMessage> {
        self.state()
            .history
            .get(&channel)
            .cloned()
            .unwrap_or_default()
    }

    /// Text content of messages the bot sent to a channel, oldest first.
    pub fn bot_texts(&self, channel: ChannelId) -> Vec<String> {
        self.messages(channel)
            .into_iter()
            .filter(|m| m.author.id == self.bot_id)
            .map(|m| m.content)
            .collect()
    }

    /// Embeds the bot sent to a channel, oldest first.
    pub fn bot_embeds(&self, channel: ChannelId) -> Vec<crate::chat::Embed> {
        self.messages(channel)
            .into_iter()
            .filter(|m| m.author.id == self.bot_id)
            .flat_map(|m| m.embeds)
            .collect()
    }

    pub fn last_message(&self, channel: ChannelId) -> Option<ChatMessage> {
        self.messages(channel).pop()
    }

    pub fn reactions(&self, message: MessageId) -> Vec<(Emoji, UserId)> {
        self.state()
            .reactions
            .get(&message)
            .cloned()
            .unwrap_or_default()
    }

    pub fn relayed(&self) -> Vec<(ChannelId, RelayMessage)> {
        self.state().relayed.clone()
    }

    pub fn created_channels(&self) -> Vec<NewChannel> {
        self.state().created_channels.clone()
    }

    pub fn deleted_channels(&self) -> Vec<ChannelId> {
        self.state().deleted_channels.clone()
    }

    pub fn role_grants(&self) -> Vec<(GuildId, UserId, RoleId)> {
        self.state().role_grants.clone()
    }

    pub fn typing_count(&self, channel: ChannelId) -> usize {
        self.state().typing.get(&channel).copied().unwrap_or(0)
    }

    /// Record a user's reaction as present on a message (for removal checks).
    pub fn record_user_reaction(&self, message: MessageId, emoji: Emoji, user: UserId) {
        self.state()
            .reactions
            .entry(message)
            .or_default()
            .push((emoji, user));
    }
}

fn not_found(entity: &str, id: impl std::fmt::Display) -> ChatError {
    ChatError::NotFound {
        entity: entity.to_string(),
        id: id.to_string(),
    }
}

#[async_trait]
impl ChatPlatform for MemoryPlatform {
    fn name(&self) -> &str {
        "memory"
    }

    fn bot_user_id(&self) -> UserId {
        self.bot_id
    }

    async fn send_message(
        &self,
        channel: ChannelId,
        message: OutgoingMessage,
    ) -> Result<MessageId, ChatError> {
        let id = MessageId(self.next_id());
        let author = self.bot_author();
        let mut state = self.state();
        if state.failing_sends.contains(&channel) {
            return Err(ChatError::SendFailed {
                channel: channel.to_string(),
                reason: "injected failure".into(),
            });
        }
        let guild_id = state
            .channels
            .get(&channel)
            .ok_or_else(|| not_found("channel", channel))?
            .guild_id;
        state.history.entry(channel).or_default().push(ChatMessage {
            id,
            channel_id: channel,
            guild_id,
            author,
            content: message.content.unwrap_or_default(),
            embeds: message.embed.into_iter().collect(),
            role_mentions: Vec::new(),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn edit_message(
        &self,
        channel: ChannelId,
        message: MessageId,
        content: OutgoingMessage,
    ) -> Result<(), ChatError> {
        let mut state = self.state();
        let msg = state
            .history
            .get_mut(&channel)
            .and_then(|h| h.iter_mut().find(|m| m.id == message))
            .ok_or_else(|| not_found("message", message))?;
        if let Some(text) = content.content {
            msg.content = text;
        }
        if let Some(embed) = content.embed {
            msg.embeds = vec![embed];
        }
        Ok(())
    }

    async fn delete_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<(), ChatError> {
        let mut state = self.state();
        let history = state
            .history
            .get_mut(&channel)
            .ok_or_else(|| not_found("channel", channel))?;
        let before = history.len();
        history.retain(|m| m.id != message);
        if history.len() == before {
            return Err(not_found("message", message));
        }
        Ok(())
    }

    async fn history(
        &self,
        channel: ChannelId,
        limit: usize,
        oldest_first: bool,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        let state = self.state();
        let history = state
            .history
            .get(&channel)
            .ok_or_else(|| not_found("channel", channel))?;
        let mut out: Vec<ChatMessage> = if oldest_first {
            history.iter().take(limit).cloned().collect()
        } else {
            history.iter().rev().take(limit).cloned().collect()
        };
        if oldest_first {
            out.sort_by_key(|m| m.created_at);
        }
        Ok(out)
    }

    async fn trigger_typing(&self, channel: ChannelId) -> Result<(), ChatError> {
        *self.state().typing.entry(channel).or_default() += 1;
        Ok(())
    }

    async fn add_reaction(
        &self,
        _channel: ChannelId,
        message: MessageId,
        emoji: &Emoji,
    ) -> Result<(), ChatError> {
        let bot = self.bot_id;
        self.state()
            .reactions
            .entry(message)
            .or_default()
            .push((emoji.clone(), bot));
        Ok(())
    }

    async fn remove_reaction(
        &self,
        _channel: ChannelId,
        message: MessageId,
        emoji: &Emoji,
        user: UserId,
    ) -> Result<(), ChatError> {
        let mut state = self.state();
        let reactions = state
            .reactions
            .get_mut(&message)
            .ok_or_else(|| not_found("reaction", emoji))?;
        let before = reactions.len();
        reactions.retain(|(e, u)| !(e == emoji && *u == user));
        if reactions.len() == before {
            return Err(not_found("reaction", emoji));
        }
        Ok(())
    }

    async fn clear_reactions(
        &self,
        _channel: ChannelId,
        message: MessageId,
    ) -> Result<(), ChatError> {
        self.state().reactions.remove(&message);
        Ok(())
    }

    async fn get_channel(&self, channel: ChannelId) -> Result<Option<ChannelInfo>, ChatError> {
        Ok(self.state().channels.get(&channel).cloned())
    }

    async fn get_member(&self, guild: GuildId, user: UserId) -> Result<Option<Member>, ChatError> {
        Ok(self.state().members.get(&(guild, user)).cloned())
    }

    async fn role_name(&self, guild: GuildId, role: RoleId) -> Result<Option<String>, ChatError> {
        Ok(self.state().roles.get(&(guild, role)).cloned())
    }

    async fn add_role(
        &self,
        guild: GuildId,
        user: UserId,
        role: RoleId,
        _reason: &str,
    ) -> Result<(), ChatError> {
        let mut state = self.state();
        if let Some(member) = state.members.get_mut(&(guild, user)) {
            member.roles.push(role);
        }
        state.role_grants.push((guild, user, role));
        Ok(())
    }

    async fn permissions_for(&self, channel: ChannelId) -> Result<Permissions, ChatError> {
        Ok(self
            .state()
            .permissions
            .get(&channel)
            .copied()
            .unwrap_or_else(Permissions::all))
    }

    async fn create_channel(&self, request: NewChannel) -> Result<ChannelInfo, ChatError> {
        let info = ChannelInfo {
            id: ChannelId(self.next_id()),
            guild_id: Some(request.guild_id),
            name: request.name.clone(),
        };
        let mut state = self.state();
        state.channels.insert(info.id, info.clone());
        state.history.entry(info.id).or_default();
        state.created_channels.push(request);
        Ok(info)
    }

    async fn delete_channel(&self, channel: ChannelId) -> Result<(), ChatError> {
        let mut state = self.state();
        if state.channels.remove(&channel).is_none() {
            return Err(not_found("channel", channel));
        }
        state.deleted_channels.push(channel);
        Ok(())
    }

    async fn get_or_create_relay(
        &self,
        channel: ChannelId,
        _name: &str,
    ) -> Result<RelayHandle, ChatError> {
        let id = self.next_id();
        let mut state = self.state();
        if !state.channels.contains_key(&channel) {
            return Err(not_found("channel", channel));
        }
        Ok(state
            .relays
            .entry(channel)
            .or_insert_with(|| RelayHandle {
                id: WebhookId(id),
                channel_id: channel,
            })
            .clone())
    }

    async fn relay(&self, handle: &RelayHandle, message: RelayMessage) -> Result<(), ChatError> {
        let mut state = self.state();
        if let Some(limit) = state.fail_relay_after
            && state.relayed.len() >= limit
        {
            return Err(ChatError::Http("injected relay failure".into()));
        }
        state.relayed.push((handle.channel_id, message));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sent_messages_land_in_history() {
        let platform = MemoryPlatform::new(UserId(1));
        platform.add_channel(GuildId(10), ChannelId(20), "general");

        let id = platform
            .send_message(ChannelId(20), "hello".into())
            .await
            .unwrap();
        platform
            .edit_message(ChannelId(20), id, "edited".into())
            .await
            .unwrap();

        assert_eq!(platform.bot_texts(ChannelId(20)), vec!["edited"]);
    }

    #[tokio::test]
    async fn send_to_missing_channel_is_not_found() {
        let platform = MemoryPlatform::new(UserId(1));
        let err = platform
            .send_message(ChannelId(99), "x".into())
            .await
            .unwrap_err();
        assert!(err.is_best_effort());
    }

    #[tokio::test]
    async fn removing_absent_reaction_is_not_found() {
        let platform = MemoryPlatform::new(UserId(1));
        let err = platform
            .remove_reaction(ChannelId(1), MessageId(2), &Emoji::new("✅"), UserId(3))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::NotFound { .. }));
    }
}
