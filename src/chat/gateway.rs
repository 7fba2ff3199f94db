//! Gateway connection: serenity's client turns the five dispatch events the
//! bot cares about into `ChatEvent`s on an `EventStream`.
//!
//! Reconnects, heartbeats and session resumes are serenity's business; the
//! stream ends when the client gives up.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serenity::all as discord;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info};

use crate::error::ChatError;

use super::discord::{member_from, message_from, reaction_from};
use super::model::{ChatEvent, GuildId, UserId};
use super::platform::EventStream;

/// Guild structure, members, messages with their content, and reactions.
pub fn intents() -> discord::GatewayIntents {
    discord::GatewayIntents::GUILDS
        | discord::GatewayIntents::GUILD_MEMBERS
        | discord::GatewayIntents::GUILD_MESSAGES
        | discord::GatewayIntents::GUILD_MESSAGE_REACTIONS
        | discord::GatewayIntents::MESSAGE_CONTENT
}

/// Forwards dispatch events into the bot's event channel.
struct Forwarder {
    tx: mpsc::UnboundedSender<ChatEvent>,
}

impl Forwarder {
    fn forward(&self, event: ChatEvent) {
        if self.tx.send(event).is_err() {
            debug!("Event consumer gone, dropping event");
        }
    }
}

#[async_trait]
impl discord::EventHandler for Forwarder {
    async fn ready(&self, _ctx: discord::Context, ready: discord::Ready) {
        info!(user = %ready.user.name, guilds = ready.guilds.len(), "Gateway ready");
    }

    async fn message(&self, _ctx: discord::Context, message: discord::Message) {
        self.forward(ChatEvent::MessageReceived(message_from(&message)));
    }

    async fn reaction_add(&self, _ctx: discord::Context, reaction: discord::Reaction) {
        if let Some(event) = reaction_from(&reaction) {
            self.forward(ChatEvent::ReactionAdded(event));
        }
    }

    async fn reaction_remove(&self, _ctx: discord::Context, reaction: discord::Reaction) {
        if let Some(event) = reaction_from(&reaction) {
            self.forward(ChatEvent::ReactionRemoved(event));
        }
    }

    async fn guild_member_addition(&self, _ctx: discord::Context, member: discord::Member) {
        self.forward(ChatEvent::MemberJoined(member_from(&member)));
    }

    async fn guild_member_removal(
        &self,
        _ctx: discord::Context,
        guild_id: discord::GuildId,
        user: discord::User,
        _member: Option<discord::Member>,
    ) {
        self.forward(ChatEvent::MemberLeft {
            guild_id: GuildId(guild_id.get()),
            user_id: UserId(user.id.get()),
        });
    }
}

/// A configured but not yet running gateway client.
pub struct Gateway {
    client: discord::Client,
}

impl Gateway {
    /// Build the client and the stream its events will arrive on.
    pub async fn connect(token: &SecretString) -> Result<(Self, EventStream), ChatError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = discord::Client::builder(token.expose_secret(), intents())
            .event_handler(Forwarder { tx })
            .await
            .map_err(|e| ChatError::Gateway(e.to_string()))?;
        Ok((Self { client }, Box::pin(UnboundedReceiverStream::new(rx))))
    }

    /// The client's HTTP handle, for the REST backend.
    pub fn http(&self) -> Arc<discord::Http> {
        Arc::clone(&self.client.http)
    }

    /// Run the shard in the background. When it stops for good the client,
    /// and with it the event sender, is dropped, which ends the stream.
    pub fn start(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.client.start().await {
                error!(error = %e, "Gateway client stopped");
            }
        })
    }
}
