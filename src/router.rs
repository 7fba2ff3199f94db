//! Event router: fans platform events out to the bus and to the interviews.

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, error, info, warn};

use crate::chat::model::{ChatEvent, ChatMessage, GuildId};
use crate::chat::EventStream;
use crate::commands::CommandHandler;
use crate::error::Result;
use crate::interview::InterviewRegistry;

/// Owns the inbound stream for the lifetime of the bot.
pub struct Router {
    handler: Arc<CommandHandler>,
}

impl Router {
    pub fn new(handler: CommandHandler) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }

    fn registry(&self) -> &Arc<InterviewRegistry> {
        self.handler.registry()
    }

    /// Route events until the stream ends or `shutdown` resolves, then write
    /// every open interview back to the store.
    pub async fn run<S>(self, mut events: EventStream, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!("Router ready and listening");

        loop {
            let event = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                event = events.next() => match event {
                    Some(event) => event,
                    None => {
                        info!("Event stream ended");
                        break;
                    }
                },
            };
            self.dispatch(event).await;
        }

        self.registry().save_to_db().await?;
        let open = self.registry().len().await;
        info!(open, "Interviews saved, router stopped");
        Ok(())
    }

    /// Publish first so pages and question loops see the event, then act on
    /// it. Reactions and rule confirmations run inline to keep their order;
    /// commands and member changes can wait on the bus and run in tasks.
    pub async fn dispatch(&self, event: ChatEvent) {
        let registry = Arc::clone(self.registry());
        registry.deps().bus.publish(event.clone());
        let guild = registry.deps().settings.read().await.guild_id;

        match event {
            ChatEvent::ReactionAdded(reaction) => {
                if reaction.guild_id != Some(guild) {
                    return;
                }
                if let Some(interview) = registry.get_by_channel_id(reaction.channel_id).await {
                    interview.check_add_reactions(&reaction).await;
                }
            }
            ChatEvent::ReactionRemoved(reaction) => {
                if reaction.guild_id != Some(guild) {
                    return;
                }
                if let Some(interview) = registry.get_by_channel_id(reaction.channel_id).await {
                    interview.check_remove_reactions(&reaction).await;
                }
            }
            ChatEvent::MessageReceived(message) => self.on_message(guild, message).await,
            ChatEvent::MemberJoined(member) => {
                if member.guild_id != guild {
                    return;
                }
                tokio::spawn(async move {
                    if let Err(e) = registry.on_member_join(&member).await {
                        error!(member_id = %member.id, error = %e, "Failed to open interview for new member");
                    }
                });
            }
            ChatEvent::MemberLeft { guild_id, user_id } => {
                if guild_id != guild {
                    return;
                }
                tokio::spawn(async move {
                    if let Err(e) = registry.on_member_leave(guild_id, user_id).await {
                        error!(member_id = %user_id, error = %e, "Failed to close interview of departed member");
                    }
                });
            }
        }
    }

    async fn on_message(&self, guild: GuildId, message: ChatMessage) {
        if message.author.bot || message.guild_id != Some(guild) {
            return;
        }
        let prefix = self.registry().deps().prefix.clone();
        if message.content.trim_start().starts_with(&prefix) {
            let handler = Arc::clone(&self.handler);
            tokio::spawn(async move {
                match handler.handle_message(&message).await {
                    Ok(true) => {}
                    Ok(false) => debug!(channel_id = %message.channel_id, "Not a command"),
                    Err(e) => {
                        warn!(channel_id = %message.channel_id, error = %e, "Command failed");
                    }
                }
            });
            return;
        }

        if let Some(interview) = self.registry().get_by_channel_id(message.channel_id).await {
            interview
                .check_rule_confirmation(message.author.id, &message.content, &message.role_mentions)
                .await;
        }
    }
}
