//! Chat platform data model: ids, messages, embeds, and inbound events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }
    };
}

snowflake!(
    /// A user (or guild member) id.
    UserId
);
snowflake!(ChannelId);
snowflake!(GuildId);
snowflake!(MessageId);
snowflake!(RoleId);
snowflake!(WebhookId);

/// A reaction emoji in its rendered form: a unicode grapheme (`"👥"`) or a
/// custom guild emoji (`"<:tupla:652995996468379677>"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Emoji(pub String);

impl Emoji {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is a custom (guild) emoji rather than a unicode one.
    pub fn is_custom(&self) -> bool {
        self.0.starts_with("<:") || self.0.starts_with("<a:")
    }
}

impl std::fmt::Display for Emoji {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Emoji {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Brand colour used for bot embeds.
pub const PN_ORANGE: u32 = 0xF7_8C_3B;
pub const LIGHT_GREY: u32 = 0x97_9C_9F;
pub const DARK_GOLD: u32 = 0xC2_7C_0E;
pub const GREET_GREEN: u32 = 0x2E_CC_71;
pub const DARK_RED: u32 = 0x99_2D_22;

/// Zero-width spacer used to pad embed text.
pub const ZERO_WIDTH_SPACE: &str = "\u{200b}";

#[derive(Debug, Clone, PartialEq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbedText {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbedAuthor {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbedImage {
    pub url: String,
}

/// Rich embed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Embed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub color: Option<u32>,
    pub timestamp: Option<DateTime<Utc>>,
    pub footer: Option<EmbedText>,
    pub author: Option<EmbedAuthor>,
    pub thumbnail: Option<EmbedImage>,
    pub fields: Vec<EmbedField>,
}

impl Embed {
    /// A standard bot embed with title and description.
    pub fn std(title: Option<&str>, description: Option<&str>) -> Self {
        Self {
            title: title.map(String::from),
            description: description.map(String::from),
            color: Some(PN_ORANGE),
            ..Default::default()
        }
    }

    pub fn with_color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    pub fn with_footer(mut self, text: impl Into<String>) -> Self {
        self.footer = Some(EmbedText { text: text.into() });
        self
    }

    pub fn with_author(mut self, name: impl Into<String>) -> Self {
        self.author = Some(EmbedAuthor { name: name.into() });
        self
    }

    pub fn with_thumbnail(mut self, url: impl Into<String>) -> Self {
        self.thumbnail = Some(EmbedImage { url: url.into() });
        self
    }

    pub fn with_timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = Some(ts);
        self
    }

    pub fn add_field(&mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
    }

    pub fn clear_fields(&mut self) {
        self.fields.clear();
    }
}

/// An outbound message: text, an embed, or both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutgoingMessage {
    pub content: Option<String>,
    pub embed: Option<Embed>,
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            embed: None,
        }
    }

    pub fn embed(embed: Embed) -> Self {
        Self {
            content: None,
            embed: Some(embed),
        }
    }

    pub fn with_embed(mut self, embed: Embed) -> Self {
        self.embed = Some(embed);
        self
    }
}

impl From<&str> for OutgoingMessage {
    fn from(s: &str) -> Self {
        Self::text(s)
    }
}

impl From<String> for OutgoingMessage {
    fn from(s: String) -> Self {
        Self::text(s)
    }
}

impl From<Embed> for OutgoingMessage {
    fn from(e: Embed) -> Self {
        Self::embed(e)
    }
}

/// Author of a message as seen in history or a message event.
#[derive(Debug, Clone, PartialEq)]
pub struct Author {
    pub id: UserId,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub bot: bool,
}

/// A message received from (or fetched out of) a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub guild_id: Option<GuildId>,
    pub author: Author,
    pub content: String,
    pub embeds: Vec<Embed>,
    pub role_mentions: Vec<RoleId>,
    pub created_at: DateTime<Utc>,
}

/// A guild member.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub id: UserId,
    pub guild_id: GuildId,
    pub name: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub bot: bool,
    pub roles: Vec<RoleId>,
}

impl Member {
    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }

    pub fn has_role(&self, role: RoleId) -> bool {
        self.roles.contains(&role)
    }
}

/// A guild text channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub guild_id: Option<GuildId>,
    pub name: String,
}

/// Reaction add/remove payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ReactionEvent {
    pub user_id: UserId,
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub guild_id: Option<GuildId>,
    pub emoji: Emoji,
}

/// Inbound platform events the bot subscribes to.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    MessageReceived(ChatMessage),
    ReactionAdded(ReactionEvent),
    ReactionRemoved(ReactionEvent),
    MemberJoined(Member),
    MemberLeft { guild_id: GuildId, user_id: UserId },
}

impl ChatEvent {
    /// The channel this event happened in, if it is channel-scoped.
    pub fn channel_id(&self) -> Option<ChannelId> {
        match self {
            Self::MessageReceived(m) => Some(m.channel_id),
            Self::ReactionAdded(r) | Self::ReactionRemoved(r) => Some(r.channel_id),
            Self::MemberJoined(_) | Self::MemberLeft { .. } => None,
        }
    }
}

/// Channel permission bits (subset of the Discord permission bitfield).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permissions(pub u64);

impl Permissions {
    pub const ADMINISTRATOR: u64 = 1 << 3;
    pub const ADD_REACTIONS: u64 = 1 << 6;
    pub const VIEW_CHANNEL: u64 = 1 << 10;
    pub const SEND_MESSAGES: u64 = 1 << 11;
    pub const MANAGE_MESSAGES: u64 = 1 << 13;
    pub const EMBED_LINKS: u64 = 1 << 14;
    pub const READ_MESSAGE_HISTORY: u64 = 1 << 16;
    pub const USE_EXTERNAL_EMOJIS: u64 = 1 << 18;

    pub fn all() -> Self {
        Self(u64::MAX)
    }

    pub fn none() -> Self {
        Self(0)
    }

    pub fn contains(self, bits: u64) -> bool {
        self.0 & bits == bits
    }

    pub fn with(self, bits: u64) -> Self {
        Self(self.0 | bits)
    }

    pub fn without(self, bits: u64) -> Self {
        Self(self.0 & !bits)
    }

    pub fn send_messages(self) -> bool {
        self.contains(Self::SEND_MESSAGES)
    }
    pub fn embed_links(self) -> bool {
        self.contains(Self::EMBED_LINKS)
    }
    pub fn add_reactions(self) -> bool {
        self.contains(Self::ADD_REACTIONS)
    }
    pub fn read_message_history(self) -> bool {
        self.contains(Self::READ_MESSAGE_HISTORY)
    }
    pub fn manage_messages(self) -> bool {
        self.contains(Self::MANAGE_MESSAGES)
    }
    pub fn external_emojis(self) -> bool {
        self.contains(Self::USE_EXTERNAL_EMOJIS)
    }
}

/// Target of a channel permission overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwriteTarget {
    Role(RoleId),
    Member(UserId),
}

/// A per-role or per-member permission overwrite applied on channel creation.
#[derive(Debug, Clone, PartialEq)]
pub struct PermissionOverwrite {
    pub target: OverwriteTarget,
    pub allow: Permissions,
    pub deny: Permissions,
}

/// Request to create a temporary text channel.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChannel {
    pub guild_id: GuildId,
    pub name: String,
    pub topic: Option<String>,
    pub category_id: Option<ChannelId>,
    pub overwrites: Vec<PermissionOverwrite>,
}

/// Relay (webhook) handle for posting under arbitrary display names. The
/// backend that handed it out keeps whatever credentials it needs.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayHandle {
    pub id: WebhookId,
    pub channel_id: ChannelId,
}

/// A message posted through a relay under another identity.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayMessage {
    pub username: String,
    pub avatar_url: Option<String>,
    pub content: String,
    pub embed: Option<Embed>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_emoji_detection() {
        assert!(Emoji::new("<:tupla:652995996468379677>").is_custom());
        assert!(Emoji::new("<a:wave:1>").is_custom());
        assert!(!Emoji::new("👥").is_custom());
    }

    #[test]
    fn permissions_bits() {
        let p = Permissions::none()
            .with(Permissions::SEND_MESSAGES)
            .with(Permissions::ADD_REACTIONS);
        assert!(p.send_messages());
        assert!(p.add_reactions());
        assert!(!p.manage_messages());
        assert!(!p.without(Permissions::SEND_MESSAGES).send_messages());
        assert!(Permissions::all().external_emojis());
    }

    #[test]
    fn snowflake_serde_is_transparent() {
        let id = UserId(42);
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
        assert_eq!(id.to_string(), "42");
    }
}
