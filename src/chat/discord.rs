//! Discord backend for `ChatPlatform`, on top of serenity's HTTP client.
//!
//! Conversions between serenity's model and ours live here too; the gateway
//! uses them for inbound events.

use std::collections::HashMap;
use std::fmt::Display;
use std::num::NonZeroU64;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::all as discord;
use tracing::{debug, info};

use crate::error::ChatError;

use super::model::{
    Author, ChannelId, ChannelInfo, ChatMessage, Embed, EmbedAuthor, EmbedField, EmbedImage,
    EmbedText, Emoji, GuildId, Member, MessageId, NewChannel, OutgoingMessage, OverwriteTarget,
    PermissionOverwrite, Permissions, ReactionEvent, RelayHandle, RelayMessage, RoleId, UserId,
    WebhookId,
};
use super::platform::ChatPlatform;

/// Largest page the history endpoint returns.
const HISTORY_PAGE: usize = 100;

// ── Conversions ─────────────────────────────────────────────────────

/// Discord ids are never zero; an unset id in our settings is.
fn snowflake<T: From<NonZeroU64>>(raw: u64, entity: &str) -> Result<T, ChatError> {
    NonZeroU64::new(raw)
        .map(T::from)
        .ok_or_else(|| ChatError::NotFound {
            entity: entity.to_string(),
            id: raw.to_string(),
        })
}

fn timestamp(ts: &discord::Timestamp) -> DateTime<Utc> {
    DateTime::from_timestamp(ts.unix_timestamp(), 0).unwrap_or_default()
}

pub(crate) fn member_from(member: &discord::Member) -> Member {
    Member {
        id: UserId(member.user.id.get()),
        guild_id: GuildId(member.guild_id.get()),
        name: member.user.name.clone(),
        display_name: member.display_name().to_string(),
        avatar_url: Some(member.face()),
        bot: member.user.bot,
        roles: member.roles.iter().map(|r| RoleId(r.get())).collect(),
    }
}

pub(crate) fn message_from(message: &discord::Message) -> ChatMessage {
    let author = &message.author;
    let display_name = message
        .member
        .as_ref()
        .and_then(|m| m.nick.clone())
        .or_else(|| author.global_name.clone())
        .unwrap_or_else(|| author.name.clone());
    ChatMessage {
        id: MessageId(message.id.get()),
        channel_id: ChannelId(message.channel_id.get()),
        guild_id: message.guild_id.map(|g| GuildId(g.get())),
        author: Author {
            id: UserId(author.id.get()),
            display_name,
            avatar_url: Some(author.face()),
            bot: author.bot,
        },
        content: message.content.clone(),
        embeds: message.embeds.iter().map(embed_from).collect(),
        role_mentions: message.mention_roles.iter().map(|r| RoleId(r.get())).collect(),
        created_at: timestamp(&message.timestamp),
    }
}

fn embed_from(embed: &discord::Embed) -> Embed {
    Embed {
        title: embed.title.clone(),
        description: embed.description.clone(),
        color: embed.colour.map(|c| c.0),
        timestamp: embed.timestamp.as_ref().map(timestamp),
        footer: embed.footer.as_ref().map(|f| EmbedText {
            text: f.text.clone(),
        }),
        author: embed.author.as_ref().map(|a| EmbedAuthor {
            name: a.name.clone(),
        }),
        thumbnail: embed.thumbnail.as_ref().map(|t| EmbedImage { url: t.url.clone() }),
        fields: embed
            .fields
            .iter()
            .map(|f| EmbedField {
                name: f.name.clone(),
                value: f.value.clone(),
                inline: f.inline,
            })
            .collect(),
    }
}

fn create_embed(embed: &Embed) -> discord::CreateEmbed {
    let mut out = discord::CreateEmbed::new();
    if let Some(title) = &embed.title {
        out = out.title(title);
    }
    if let Some(description) = &embed.description {
        out = out.description(description);
    }
    if let Some(color) = embed.color {
        out = out.colour(color);
    }
    if let Some(footer) = &embed.footer {
        out = out.footer(discord::CreateEmbedFooter::new(&footer.text));
    }
    if let Some(author) = &embed.author {
        out = out.author(discord::CreateEmbedAuthor::new(&author.name));
    }
    if let Some(thumbnail) = &embed.thumbnail {
        out = out.thumbnail(&thumbnail.url);
    }
    if let Some(ts) = embed.timestamp
        && let Ok(ts) = discord::Timestamp::from_unix_timestamp(ts.timestamp())
    {
        out = out.timestamp(ts);
    }
    out.fields(
        embed
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.value.clone(), f.inline)),
    )
}

fn create_message(message: &OutgoingMessage) -> discord::CreateMessage {
    let mut out = discord::CreateMessage::new();
    if let Some(content) = &message.content {
        out = out.content(content);
    }
    if let Some(embed) = &message.embed {
        out = out.embed(create_embed(embed));
    }
    out
}

/// Both parts are always set so an edit replaces whatever the message
/// showed before.
fn edit_message(message: &OutgoingMessage) -> discord::EditMessage {
    discord::EditMessage::new()
        .content(message.content.clone().unwrap_or_default())
        .embeds(message.embed.iter().map(create_embed).collect())
}

fn reaction_type(emoji: &Emoji) -> Result<discord::ReactionType, ChatError> {
    discord::ReactionType::try_from(emoji.as_str())
        .map_err(|e| ChatError::InvalidPayload(format!("emoji {emoji}: {e}")))
}

/// Rendered form: `<:name:id>` for guild emojis, the grapheme otherwise.
fn emoji_from(reaction: &discord::ReactionType) -> Emoji {
    match reaction {
        discord::ReactionType::Custom { animated, id, name } => {
            let name = name.as_deref().unwrap_or("_");
            if *animated {
                Emoji::new(format!("<a:{name}:{id}>"))
            } else {
                Emoji::new(format!("<:{name}:{id}>"))
            }
        }
        discord::ReactionType::Unicode(grapheme) => Emoji::new(grapheme.clone()),
        other => Emoji::new(other.as_data()),
    }
}

/// `None` for reactions the platform could not attribute to a user.
pub(crate) fn reaction_from(reaction: &discord::Reaction) -> Option<ReactionEvent> {
    Some(ReactionEvent {
        user_id: UserId(reaction.user_id?.get()),
        channel_id: ChannelId(reaction.channel_id.get()),
        message_id: MessageId(reaction.message_id.get()),
        guild_id: reaction.guild_id.map(|g| GuildId(g.get())),
        emoji: emoji_from(&reaction.emoji),
    })
}

/// Overwrites naming an unset (zero) role or member are dropped.
fn permission_overwrite(overwrite: &PermissionOverwrite) -> Option<discord::PermissionOverwrite> {
    let kind = match overwrite.target {
        OverwriteTarget::Role(role) => {
            discord::PermissionOverwriteType::Role(NonZeroU64::new(role.0)?.into())
        }
        OverwriteTarget::Member(user) => {
            discord::PermissionOverwriteType::Member(NonZeroU64::new(user.0)?.into())
        }
    };
    Some(discord::PermissionOverwrite {
        allow: discord::Permissions::from_bits_truncate(overwrite.allow.0),
        deny: discord::Permissions::from_bits_truncate(overwrite.deny.0),
        kind,
    })
}

fn chat_error(action: &str, target: impl Display, err: serenity::Error) -> ChatError {
    if let serenity::Error::Http(http) = &err
        && let Some(status) = http.status_code()
    {
        match status.as_u16() {
            403 => {
                return ChatError::Forbidden {
                    action: action.to_string(),
                };
            }
            404 => {
                return ChatError::NotFound {
                    entity: action.to_string(),
                    id: target.to_string(),
                };
            }
            429 => return ChatError::RateLimited { retry_after: None },
            _ => {}
        }
    }
    ChatError::Http(format!("{action} failed: {err}"))
}

/// Treat "not found" as absence.
fn found<T>(result: Result<T, ChatError>) -> Result<Option<T>, ChatError> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(ChatError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

// ── Client ──────────────────────────────────────────────────────────

/// Discord REST backend. Shares its `Http` with the gateway client.
pub struct DiscordRest {
    http: Arc<discord::Http>,
    bot_id: UserId,
    /// Webhooks handed out as relays, with their tokens.
    relays: Mutex<HashMap<WebhookId, discord::Webhook>>,
}

impl DiscordRest {
    /// Resolve the bot's own user id over `http`.
    pub async fn connect(http: Arc<discord::Http>) -> Result<Self, ChatError> {
        let me = http
            .get_current_user()
            .await
            .map_err(|e| chat_error("get_current_user", "@me", e))?;
        info!(bot_id = %me.id, name = %me.name, "Discord REST client ready");
        Ok(Self {
            bot_id: UserId(me.id.get()),
            http,
            relays: Mutex::new(HashMap::new()),
        })
    }

    fn relays(&self) -> MutexGuard<'_, HashMap<WebhookId, discord::Webhook>> {
        self.relays.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn guild_channel(&self, channel: ChannelId) -> Result<Option<discord::Channel>, ChatError> {
        let Some(id) = NonZeroU64::new(channel.0).map(discord::ChannelId::from) else {
            return Ok(None);
        };
        found(
            id.to_channel(&self.http)
                .await
                .map_err(|e| chat_error("get_channel", channel, e)),
        )
    }
}

#[async_trait]
impl ChatPlatform for DiscordRest {
    fn name(&self) -> &str {
        "discord"
    }

    fn bot_user_id(&self) -> UserId {
        self.bot_id
    }

    async fn send_message(
        &self,
        channel: ChannelId,
        message: OutgoingMessage,
    ) -> Result<MessageId, ChatError> {
        let id: discord::ChannelId = snowflake(channel.0, "channel")?;
        let sent = id
            .send_message(&self.http, create_message(&message))
            .await
            .map_err(|e| match chat_error("send_message", channel, e) {
                ChatError::Http(reason) => ChatError::SendFailed {
                    channel: channel.to_string(),
                    reason,
                },
                other => other,
            })?;
        Ok(MessageId(sent.id.get()))
    }

    async fn edit_message(
        &self,
        channel: ChannelId,
        message: MessageId,
        content: OutgoingMessage,
    ) -> Result<(), ChatError> {
        let id: discord::ChannelId = snowflake(channel.0, "channel")?;
        let message_id: discord::MessageId = snowflake(message.0, "message")?;
        id.edit_message(&self.http, message_id, edit_message(&content))
            .await
            .map_err(|e| chat_error("edit_message", message, e))?;
        Ok(())
    }

    async fn delete_message(&self, channel: ChannelId, message: MessageId) -> Result<(), ChatError> {
        let id: discord::ChannelId = snowflake(channel.0, "channel")?;
        let message_id: discord::MessageId = snowflake(message.0, "message")?;
        id.delete_message(&self.http, message_id)
            .await
            .map_err(|e| chat_error("delete_message", message, e))
    }

    async fn history(
        &self,
        channel: ChannelId,
        limit: usize,
        oldest_first: bool,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        let id: discord::ChannelId = snowflake(channel.0, "channel")?;
        let mut out: Vec<ChatMessage> = Vec::new();
        let mut before: Option<discord::MessageId> = None;

        // Pages arrive newest first.
        while out.len() < limit {
            let page_size = (limit - out.len()).min(HISTORY_PAGE);
            let mut request = discord::GetMessages::new().limit(page_size as u8);
            if let Some(b) = before {
                request = request.before(b);
            }
            let page = id
                .messages(&self.http, request)
                .await
                .map_err(|e| chat_error("history", channel, e))?;

            let fetched = page.len();
            before = page.last().map(|m| m.id);
            out.extend(page.iter().map(message_from));
            if fetched < page_size {
                break;
            }
        }

        if oldest_first {
            out.reverse();
        }
        debug!(channel_id = %channel, count = out.len(), "Fetched channel history");
        Ok(out)
    }

    async fn trigger_typing(&self, channel: ChannelId) -> Result<(), ChatError> {
        let id: discord::ChannelId = snowflake(channel.0, "channel")?;
        id.broadcast_typing(&self.http)
            .await
            .map_err(|e| chat_error("trigger_typing", channel, e))
    }

    async fn add_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: &Emoji,
    ) -> Result<(), ChatError> {
        let id: discord::ChannelId = snowflake(channel.0, "channel")?;
        let message_id: discord::MessageId = snowflake(message.0, "message")?;
        id.create_reaction(&self.http, message_id, reaction_type(emoji)?)
            .await
            .map_err(|e| chat_error("add_reaction", message, e))
    }

    async fn remove_reaction(
        &self,
        channel: ChannelId,
        message: MessageId,
        emoji: &Emoji,
        user: UserId,
    ) -> Result<(), ChatError> {
        let id: discord::ChannelId = snowflake(channel.0, "channel")?;
        let message_id: discord::MessageId = snowflake(message.0, "message")?;
        // `None` removes the bot's own reaction.
        let who = if user == self.bot_id {
            None
        } else {
            Some(snowflake::<discord::UserId>(user.0, "user")?)
        };
        id.delete_reaction(&self.http, message_id, who, reaction_type(emoji)?)
            .await
            .map_err(|e| chat_error("remove_reaction", message, e))
    }

    async fn clear_reactions(&self, channel: ChannelId, message: MessageId) -> Result<(), ChatError> {
        let id: discord::ChannelId = snowflake(channel.0, "channel")?;
        let message_id: discord::MessageId = snowflake(message.0, "message")?;
        id.delete_reactions(&self.http, message_id)
            .await
            .map_err(|e| chat_error("clear_reactions", message, e))
    }

    async fn get_channel(&self, channel: ChannelId) -> Result<Option<ChannelInfo>, ChatError> {
        Ok(self
            .guild_channel(channel)
            .await?
            .map(|resolved| match resolved {
                discord::Channel::Guild(c) => ChannelInfo {
                    id: channel,
                    guild_id: Some(GuildId(c.guild_id.get())),
                    name: c.name.clone(),
                },
                _ => ChannelInfo {
                    id: channel,
                    guild_id: None,
                    name: String::new(),
                },
            }))
    }

    async fn get_member(&self, guild: GuildId, user: UserId) -> Result<Option<Member>, ChatError> {
        let guild_id: discord::GuildId = snowflake(guild.0, "guild")?;
        let Some(user_id) = NonZeroU64::new(user.0).map(discord::UserId::from) else {
            return Ok(None);
        };
        let member = found(
            guild_id
                .member(&self.http, user_id)
                .await
                .map_err(|e| chat_error("get_member", user, e)),
        )?;
        Ok(member.map(|m| member_from(&m)))
    }

    async fn role_name(&self, guild: GuildId, role: RoleId) -> Result<Option<String>, ChatError> {
        let guild_id: discord::GuildId = snowflake(guild.0, "guild")?;
        let Some(role_id) = NonZeroU64::new(role.0).map(discord::RoleId::from) else {
            return Ok(None);
        };
        let roles = guild_id
            .roles(&self.http)
            .await
            .map_err(|e| chat_error("get_roles", guild, e))?;
        Ok(roles.get(&role_id).map(|r| r.name.clone()))
    }

    async fn add_role(
        &self,
        guild: GuildId,
        user: UserId,
        role: RoleId,
        reason: &str,
    ) -> Result<(), ChatError> {
        self.http
            .add_member_role(
                snowflake(guild.0, "guild")?,
                snowflake(user.0, "user")?,
                snowflake(role.0, "role")?,
                Some(reason),
            )
            .await
            .map_err(|e| chat_error("add_role", user, e))
    }

    async fn permissions_for(&self, channel: ChannelId) -> Result<Permissions, ChatError> {
        let resolved = self
            .guild_channel(channel)
            .await?
            .ok_or_else(|| ChatError::NotFound {
                entity: "channel".into(),
                id: channel.to_string(),
            })?;
        let discord::Channel::Guild(guild_channel) = resolved else {
            // DMs carry no permission model.
            return Ok(Permissions::all());
        };

        let guild_id = guild_channel.guild_id;
        let guild = guild_id
            .to_partial_guild(&self.http)
            .await
            .map_err(|e| chat_error("get_guild", guild_id, e))?;
        let me = guild_id
            .member(&self.http, snowflake::<discord::UserId>(self.bot_id.0, "user")?)
            .await
            .map_err(|e| chat_error("get_member", self.bot_id, e))?;
        let permissions = guild.user_permissions_in(&guild_channel, &me);
        Ok(Permissions(permissions.bits()))
    }

    async fn create_channel(&self, request: NewChannel) -> Result<ChannelInfo, ChatError> {
        let guild_id: discord::GuildId = snowflake(request.guild_id.0, "guild")?;
        let overwrites: Vec<discord::PermissionOverwrite> =
            request.overwrites.iter().filter_map(permission_overwrite).collect();

        let mut builder = discord::CreateChannel::new(request.name.clone())
            .kind(discord::ChannelType::Text)
            .permissions(overwrites);
        if let Some(topic) = &request.topic {
            builder = builder.topic(topic);
        }
        if let Some(category) = request
            .category_id
            .and_then(|c| NonZeroU64::new(c.0))
            .map(discord::ChannelId::from)
        {
            builder = builder.category(category);
        }

        let created = guild_id
            .create_channel(&self.http, builder)
            .await
            .map_err(|e| chat_error("create_channel", &request.name, e))?;
        Ok(ChannelInfo {
            id: ChannelId(created.id.get()),
            guild_id: Some(request.guild_id),
            name: created.name.clone(),
        })
    }

    async fn delete_channel(&self, channel: ChannelId) -> Result<(), ChatError> {
        let id: discord::ChannelId = snowflake(channel.0, "channel")?;
        id.delete(&self.http)
            .await
            .map_err(|e| chat_error("delete_channel", channel, e))?;
        Ok(())
    }

    async fn get_or_create_relay(
        &self,
        channel: ChannelId,
        name: &str,
    ) -> Result<RelayHandle, ChatError> {
        let id: discord::ChannelId = snowflake(channel.0, "channel")?;
        let hooks = id
            .webhooks(&self.http)
            .await
            .map_err(|e| chat_error("get_webhooks", channel, e))?;

        let own = hooks.into_iter().find(|h| {
            h.token.is_some() && h.user.as_ref().is_some_and(|u| u.id.get() == self.bot_id.0)
        });
        let hook = match own {
            Some(hook) => hook,
            None => {
                info!(channel_id = %channel, "Creating relay webhook");
                id.create_webhook(&self.http, discord::CreateWebhook::new(name))
                    .await
                    .map_err(|e| chat_error("create_webhook", channel, e))?
            }
        };

        let handle = RelayHandle {
            id: WebhookId(hook.id.get()),
            channel_id: channel,
        };
        self.relays().insert(handle.id, hook);
        Ok(handle)
    }

    async fn relay(&self, handle: &RelayHandle, message: RelayMessage) -> Result<(), ChatError> {
        let hook = self
            .relays()
            .get(&handle.id)
            .cloned()
            .ok_or_else(|| ChatError::NotFound {
                entity: "relay".into(),
                id: handle.id.to_string(),
            })?;

        let mut builder = discord::ExecuteWebhook::new()
            .username(message.username)
            .content(message.content)
            .allowed_mentions(discord::CreateAllowedMentions::new());
        if let Some(avatar) = message.avatar_url {
            builder = builder.avatar_url(avatar);
        }
        if let Some(embed) = &message.embed {
            builder = builder.embed(create_embed(embed));
        }
        hook.execute(&self.http, true, builder)
            .await
            .map_err(|e| chat_error("relay", handle.id, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emojis_survive_the_trip_through_reaction_types() {
        for rendered in ["👥", "<:tupla:652995996468379677>", "<a:wave:12345>"] {
            let emoji = Emoji::new(rendered);
            let reaction = reaction_type(&emoji).unwrap();
            assert_eq!(emoji_from(&reaction), emoji);
        }
    }

    #[test]
    fn custom_reactions_render_with_their_id() {
        let reaction = discord::ReactionType::Custom {
            animated: false,
            id: discord::EmojiId::new(652995996468379677),
            name: Some("tupla".into()),
        };
        assert_eq!(emoji_from(&reaction).as_str(), "<:tupla:652995996468379677>");
    }

    #[test]
    fn overwrites_keep_target_and_bits() {
        let converted = permission_overwrite(&PermissionOverwrite {
            target: OverwriteTarget::Member(UserId(3)),
            allow: Permissions(Permissions::SEND_MESSAGES | Permissions::VIEW_CHANNEL),
            deny: Permissions(Permissions::ADD_REACTIONS),
        })
        .unwrap();
        assert_eq!(
            converted.kind,
            discord::PermissionOverwriteType::Member(discord::UserId::new(3))
        );
        assert!(converted.allow.send_messages());
        assert!(converted.allow.view_channel());
        assert!(converted.deny.add_reactions());

        let role = permission_overwrite(&PermissionOverwrite {
            target: OverwriteTarget::Role(RoleId(9)),
            allow: Permissions::none(),
            deny: Permissions(Permissions::VIEW_CHANNEL),
        })
        .unwrap();
        assert_eq!(
            role.kind,
            discord::PermissionOverwriteType::Role(discord::RoleId::new(9))
        );
    }

    #[test]
    fn unset_ids_are_dropped_or_rejected() {
        assert!(
            permission_overwrite(&PermissionOverwrite {
                target: OverwriteTarget::Role(RoleId(0)),
                allow: Permissions::none(),
                deny: Permissions::none(),
            })
            .is_none()
        );
        let err = snowflake::<discord::ChannelId>(0, "channel").unwrap_err();
        assert!(err.is_best_effort());
        assert_eq!(
            snowflake::<discord::ChannelId>(42, "channel").unwrap(),
            discord::ChannelId::new(42)
        );
    }

    #[test]
    fn not_found_reads_as_absence() {
        let missing: Result<u8, ChatError> = Err(ChatError::NotFound {
            entity: "channel".into(),
            id: "1".into(),
        });
        assert_eq!(found(missing).unwrap(), None);
        assert_eq!(found(Ok::<_, ChatError>(3)).unwrap(), Some(3));
        assert!(found::<u8>(Err(ChatError::Http("boom".into()))).is_err());
    }
}
