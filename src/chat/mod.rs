//! Chat platform abstraction and its implementations.

pub mod discord;
pub mod events;
pub mod gateway;
pub mod memory;
pub mod model;
pub mod platform;

pub use discord::DiscordRest;
pub use events::{EventBus, EventSubscription};
pub use gateway::Gateway;
pub use memory::MemoryPlatform;
pub use model::{
    ChannelId, ChatEvent, ChatMessage, Embed, Emoji, GuildId, Member, MessageId, OutgoingMessage,
    RoleId, UserId,
};
pub use platform::{ChatPlatform, EventStream};
