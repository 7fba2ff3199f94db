//! Channel archival: replay an interview channel into the archive channel
//! through a relay, one archival at a time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::chat::ChatPlatform;
use crate::chat::model::{ChannelId, ChatMessage, MessageId, OutgoingMessage, RelayHandle, RelayMessage, UserId};
use crate::config::ArchiveSettings;
use crate::error::{ArchiveError, ChatError};

use super::prompts::{
    self, ARCHIVE_ERROR_NOTICE, ARCHIVE_QUEUED_NOTICE, ARCHIVE_SEPARATOR, EMBED_ONLY_PLACEHOLDER,
    FINAL_ARCHIVE_NOTICE,
};

/// Pause after the final notice, so it is part of the fetched history.
const SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Single-flight archive slot. Waiters are served in arrival order; the
/// flag mirrors whether the slot is held.
#[derive(Debug, Default)]
pub struct ArchiveSlot {
    lock: Mutex<()>,
    in_progress: Arc<AtomicBool>,
}

/// Held for the duration of one archival. Dropping it frees the slot.
pub struct ArchiveGuard<'a> {
    _lock: MutexGuard<'a, ()>,
    in_progress: Arc<AtomicBool>,
}

impl Drop for ArchiveGuard<'_> {
    fn drop(&mut self) {
        self.in_progress.store(false, Ordering::SeqCst);
    }
}

impl ArchiveSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_archiving(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    fn guard<'a>(&'a self, lock: MutexGuard<'a, ()>) -> ArchiveGuard<'a> {
        self.in_progress.store(true, Ordering::SeqCst);
        ArchiveGuard {
            _lock: lock,
            in_progress: Arc::clone(&self.in_progress),
        }
    }

    /// Take the slot if it is free.
    pub fn try_acquire(&self) -> Option<ArchiveGuard<'_>> {
        self.lock.try_lock().ok().map(|lock| self.guard(lock))
    }

    /// Wait for the slot.
    pub async fn acquire(&self) -> ArchiveGuard<'_> {
        let lock = self.lock.lock().await;
        self.guard(lock)
    }
}

/// Whose interview is being archived.
#[derive(Debug, Clone)]
pub struct ArchiveSubject {
    pub user_id: UserId,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// What to relay for a fetched (oldest-first) history.
///
/// Skips the leading bot messages and the bot's own archival notices. A
/// time marker is attached to the first message at least `divider_interval`
/// after the channel opened, then to the first one that far past the
/// previous marker; any other message with no text is relayed as a
/// placeholder.
pub fn plan_relay(history: &[ChatMessage], settings: &ArchiveSettings) -> Vec<RelayMessage> {
    let Some(first) = history.first() else {
        return Vec::new();
    };
    let interval = settings.divider_interval();
    let mut next_marker: DateTime<Utc> = first.created_at + interval;

    history
        .iter()
        .skip(settings.skip_leading_messages)
        .filter(|m| !(m.author.bot && prompts::is_archive_notice(&m.content)))
        .map(|m| {
            let (content, embed) = if m.created_at >= next_marker {
                next_marker = m.created_at + interval;
                (m.content.clone(), Some(prompts::time_marker(m.created_at)))
            } else if m.content.trim().is_empty() {
                (EMBED_ONLY_PLACEHOLDER.to_string(), None)
            } else {
                (m.content.clone(), None)
            };
            RelayMessage {
                username: m.author.display_name.clone(),
                avatar_url: m.author.avatar_url.clone(),
                content,
                embed,
            }
        })
        .collect()
}

fn relay_error(channel: ChannelId) -> impl FnOnce(ChatError) -> ArchiveError {
    move |source| ArchiveError::Relay {
        channel: channel.to_string(),
        source,
    }
}

/// Archive `channel` into the relay's channel.
///
/// Waits for the slot (posting a queued notice if busy), counts down, then
/// relays the history. On failure the slot is released, the channel is told
/// to archive manually, and the error is returned.
pub async fn archive_channel(
    platform: &Arc<dyn ChatPlatform>,
    slot: &ArchiveSlot,
    relay: &RelayHandle,
    settings: &ArchiveSettings,
    channel: ChannelId,
    subject: &ArchiveSubject,
) -> Result<(), ArchiveError> {
    let guard = match slot.try_acquire() {
        Some(guard) => guard,
        None => {
            info!(channel_id = %channel, "Archive slot busy, queuing");
            let notice = platform
                .send_message(channel, ARCHIVE_QUEUED_NOTICE.into())
                .await
                .ok();
            let guard = slot.acquire().await;
            if let Some(id) = notice {
                let _ = platform.delete_message(channel, id).await;
            }
            guard
        }
    };

    let result = run_archive(platform, relay, settings, channel, subject).await;
    drop(guard);

    if let Err(e) = &result {
        error!(channel_id = %channel, error = %e, "Archival failed");
        if let Err(notify) = platform
            .send_message(channel, ARCHIVE_ERROR_NOTICE.into())
            .await
        {
            warn!(channel_id = %channel, error = %notify, "Failed to post archive error notice");
        }
    }
    result
}

async fn countdown(
    platform: &Arc<dyn ChatPlatform>,
    settings: &ArchiveSettings,
    channel: ChannelId,
) -> Result<MessageId, ChatError> {
    let mut minutes = settings.lead_time_minutes;
    if minutes == 0 {
        return platform.send_message(channel, FINAL_ARCHIVE_NOTICE.into()).await;
    }

    let notice = platform
        .send_message(channel, prompts::countdown_notice(minutes).into())
        .await?;
    while minutes > 0 {
        tokio::time::sleep(settings.countdown_step()).await;
        minutes -= 1;
        let text = if minutes > 0 {
            prompts::countdown_notice(minutes)
        } else {
            FINAL_ARCHIVE_NOTICE.to_string()
        };
        platform
            .edit_message(channel, notice, OutgoingMessage::text(text))
            .await?;
    }
    Ok(notice)
}

async fn run_archive(
    platform: &Arc<dyn ChatPlatform>,
    relay: &RelayHandle,
    settings: &ArchiveSettings,
    channel: ChannelId,
    subject: &ArchiveSubject,
) -> Result<(), ArchiveError> {
    let to_err = relay_error(channel);
    if let Err(e) = countdown(platform, settings, channel).await {
        return Err(to_err(e));
    }
    if settings.lead_time_minutes > 0 {
        tokio::time::sleep(SETTLE_DELAY).await;
    }

    let history = platform
        .history(channel, settings.history_limit, true)
        .await
        .map_err(relay_error(channel))?;
    let Some(first) = history.first() else {
        return Err(ArchiveError::EmptyHistory(channel.to_string()));
    };

    let header = prompts::archive_header(
        &subject.display_name,
        subject.user_id,
        subject.avatar_url.as_deref(),
        first.created_at,
    );
    platform
        .send_message(relay.channel_id, ARCHIVE_SEPARATOR.into())
        .await
        .map_err(relay_error(channel))?;
    platform
        .send_message(relay.channel_id, header.into())
        .await
        .map_err(relay_error(channel))?;

    let planned = plan_relay(&history, settings);
    info!(channel_id = %channel, fetched = history.len(), relaying = planned.len(), "Archiving channel");
    for (i, message) in planned.into_iter().enumerate() {
        platform
            .relay(relay, message)
            .await
            .map_err(relay_error(channel))?;
        debug!(channel_id = %channel, index = i, "Relayed message");
        tokio::time::sleep(settings.relay_delay()).await;
    }

    info!(channel_id = %channel, "Archival complete");
    Ok(())
}
