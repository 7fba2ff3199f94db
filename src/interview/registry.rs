//! The set of open interviews of a guild.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::chat::model::{
    ChannelId, GuildId, Member, NewChannel, OutgoingMessage, OverwriteTarget, PermissionOverwrite,
    Permissions, RelayHandle, RoleId, UserId,
};
use crate::error::{ArchiveError, DatabaseError, Result};

use super::archive::{self, ArchiveSlot, ArchiveSubject};
use super::session::{Interview, InterviewDeps};

/// Name of the relay the archive channel is posted through.
pub const ARCHIVE_RELAY_NAME: &str = "PNBot Archiver";

const READ_ONLY: u64 = Permissions::VIEW_CHANNEL | Permissions::READ_MESSAGE_HISTORY;
const READ_WRITE: u64 = READ_ONLY
    | Permissions::SEND_MESSAGES
    | Permissions::ADD_REACTIONS
    | Permissions::EMBED_LINKS;
const BOT_PERMS: u64 = READ_WRITE | Permissions::MANAGE_MESSAGES | Permissions::USE_EXTERNAL_EMOJIS;

/// Owns every open interview and the archive slot.
pub struct InterviewRegistry {
    deps: InterviewDeps,
    interviews: RwLock<Vec<Arc<Interview>>>,
    archive_slot: ArchiveSlot,
    relay: RwLock<Option<RelayHandle>>,
}

impl InterviewRegistry {
    pub fn new(deps: InterviewDeps) -> Self {
        Self {
            deps,
            interviews: RwLock::new(Vec::new()),
            archive_slot: ArchiveSlot::new(),
            relay: RwLock::new(None),
        }
    }

    pub fn deps(&self) -> &InterviewDeps {
        &self.deps
    }

    pub fn is_archiving(&self) -> bool {
        self.archive_slot.is_archiving()
    }

    pub async fn len(&self) -> usize {
        self.interviews.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.interviews.read().await.is_empty()
    }

    pub async fn all(&self) -> Vec<Arc<Interview>> {
        self.interviews.read().await.clone()
    }

    pub async fn get_by_member(&self, member: UserId) -> Option<Arc<Interview>> {
        self.interviews
            .read()
            .await
            .iter()
            .find(|i| i.member_id == member)
            .cloned()
    }

    pub async fn get_by_channel_id(&self, channel: ChannelId) -> Option<Arc<Interview>> {
        self.interviews
            .read()
            .await
            .iter()
            .find(|i| i.channel_id == channel)
            .cloned()
    }

    /// Resolve the archive and log channels and the archive relay.
    pub async fn init_archive_and_log_channel(&self) -> Result<()> {
        let (archive_id, log_id) = {
            let settings = self.deps.settings.read().await;
            (settings.archive_channel_id, settings.log_channel_id)
        };
        let platform = &self.deps.platform;

        if platform.get_channel(archive_id).await?.is_none() {
            warn!(channel_id = %archive_id, "Archive channel not found");
            return Err(ArchiveError::NoArchiveChannel.into());
        }
        if platform.get_channel(log_id).await?.is_none() {
            warn!(channel_id = %log_id, "Log channel not found");
        }

        let handle = platform
            .get_or_create_relay(archive_id, ARCHIVE_RELAY_NAME)
            .await?;
        info!(channel_id = %archive_id, webhook_id = %handle.id, "Archive relay ready");
        *self.relay.write().await = Some(handle);
        Ok(())
    }

    /// Create, persist and register an interview, then post its type prompt.
    pub async fn new_interview(&self, member: &Member, channel: ChannelId) -> Result<Arc<Interview>> {
        let interview = Interview::new(self.deps.clone(), member, channel).await;
        self.deps.db.insert_interview(&interview.to_row()).await?;
        self.interviews.write().await.push(Arc::clone(&interview));
        info!(member_id = %member.id, channel_id = %channel, "Interview created");
        interview.send_type_prompt().await;
        Ok(interview)
    }

    /// Remove an interview: optional final message, optional archival, then
    /// the channel and the row go. A failed archival aborts the close after
    /// the interview has left the registry; the channel stays for manual
    /// cleanup.
    pub async fn close_interview(
        &self,
        interview: &Arc<Interview>,
        archive: bool,
        message: Option<&str>,
    ) -> Result<()> {
        self.interviews
            .write()
            .await
            .retain(|i| !Arc::ptr_eq(i, interview));
        interview.stop();
        info!(member_id = %interview.member_id, channel_id = %interview.channel_id, archive, "Closing interview");

        let platform = &self.deps.platform;
        if let Some(text) = message
            && let Err(e) = platform
                .send_message(interview.channel_id, OutgoingMessage::text(text))
                .await
        {
            warn!(channel_id = %interview.channel_id, error = %e, "Failed to send closing message");
        }

        if archive {
            self.archive(interview).await?;
        }

        match platform.delete_channel(interview.channel_id).await {
            Ok(()) => {}
            Err(e) if e.is_best_effort() => {
                warn!(channel_id = %interview.channel_id, error = %e, "Could not delete interview channel");
            }
            Err(e) => return Err(e.into()),
        }

        match self.deps.db.delete_interview(interview.key()).await {
            Ok(()) | Err(DatabaseError::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }
        self.save_to_db().await
    }

    async fn archive(&self, interview: &Arc<Interview>) -> Result<()> {
        // Bind first: the relay lock must be released before the lazy
        // init below takes it for writing.
        let cached = self.relay.read().await.clone();
        let relay = match cached {
            Some(relay) => relay,
            None => {
                self.init_archive_and_log_channel().await?;
                self.relay
                    .read()
                    .await
                    .clone()
                    .ok_or(ArchiveError::NoArchiveChannel)?
            }
        };

        let member = self
            .deps
            .platform
            .get_member(interview.guild_id, interview.member_id)
            .await
            .ok()
            .flatten();
        let subject = ArchiveSubject {
            user_id: interview.member_id,
            display_name: member
                .as_ref()
                .map_or_else(|| interview.user_name.clone(), |m| m.display_name.clone()),
            avatar_url: member.and_then(|m| m.avatar_url),
        };
        let settings = self.deps.settings.read().await.archive.clone();

        archive::archive_channel(
            &self.deps.platform,
            &self.archive_slot,
            &relay,
            &settings,
            interview.channel_id,
            &subject,
        )
        .await?;
        Ok(())
    }

    /// Write every open interview back to the store.
    pub async fn save_to_db(&self) -> Result<()> {
        for interview in self.all().await {
            let row = interview.to_row();
            match self.deps.db.update_interview_all(&row).await {
                Ok(()) => {}
                Err(DatabaseError::NotFound { .. }) => self.deps.db.insert_interview(&row).await?,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Rebuild interviews from the store. Rows whose channel or member is
    /// gone are deleted. Returns how many interviews were added.
    pub async fn load(&self) -> Result<usize> {
        let rows = self.deps.db.list_all_interviews().await?;
        let platform = &self.deps.platform;
        let mut stale = 0usize;
        let mut duplicates = 0usize;
        let mut added = 0usize;

        for row in &rows {
            let channel = platform.get_channel(row.channel_id).await?;
            let member = match channel {
                Some(_) => platform.get_member(row.guild_id, row.member_id).await?,
                None => None,
            };
            if member.is_none() {
                info!(member_id = %row.member_id, channel_id = %row.channel_id, "Deleting stale interview row");
                self.deps.db.delete_interview(row.key()).await?;
                stale += 1;
                continue;
            }

            let interview = Interview::from_row(self.deps.clone(), row).await;
            {
                let mut interviews = self.interviews.write().await;
                if interviews.iter().any(|i| i.same_identity(&interview)) {
                    info!(member_id = %row.member_id, "Interview already loaded, skipping duplicate");
                    duplicates += 1;
                    continue;
                }
                interviews.push(Arc::clone(&interview));
            }
            interview.prompt_to_resume().await;
            added += 1;
        }

        let expected = rows.len() - stale;
        if added != expected {
            warn!(expected, added, "Loaded interview count does not match");
        }
        info!(added, stale, duplicates, "Interviews loaded");
        Ok(added)
    }

    /// Open an interview channel for a new member and start the interview.
    pub async fn on_member_join(&self, member: &Member) -> Result<Option<Arc<Interview>>> {
        let settings = self.deps.settings.read().await.clone();
        if member.bot || member.guild_id != settings.guild_id {
            return Ok(None);
        }
        if let Some(existing) = self.get_by_member(member.id).await {
            debug!(member_id = %member.id, "Member already has an interview");
            return Ok(Some(existing));
        }

        let everyone = RoleId(settings.guild_id.0);
        let mut overwrites = vec![
            PermissionOverwrite {
                target: OverwriteTarget::Role(everyone),
                allow: Permissions(READ_ONLY),
                deny: Permissions(READ_WRITE & !READ_ONLY),
            },
            PermissionOverwrite {
                target: OverwriteTarget::Role(settings.member_role_id),
                allow: Permissions(READ_ONLY),
                deny: Permissions(READ_WRITE & !READ_ONLY),
            },
            PermissionOverwrite {
                target: OverwriteTarget::Role(settings.team_role_id),
                allow: Permissions(READ_WRITE),
                deny: Permissions::none(),
            },
            PermissionOverwrite {
                target: OverwriteTarget::Member(member.id),
                allow: Permissions(READ_WRITE),
                deny: Permissions::none(),
            },
            PermissionOverwrite {
                target: OverwriteTarget::Member(self.deps.platform.bot_user_id()),
                allow: Permissions(BOT_PERMS),
                deny: Permissions::none(),
            },
        ];
        if let Some(hidden) = settings.hide_interviews_role_id {
            overwrites.push(PermissionOverwrite {
                target: OverwriteTarget::Role(hidden),
                allow: Permissions::none(),
                deny: Permissions(Permissions::VIEW_CHANNEL),
            });
        }

        let channel = self
            .deps
            .platform
            .create_channel(NewChannel {
                guild_id: settings.guild_id,
                name: interview_channel_name(&member.name),
                topic: Some(format!("Interview with {} ({})", member.name, member.id)),
                category_id: Some(settings.interview_category_id),
                overwrites,
            })
            .await?;
        info!(member_id = %member.id, channel_id = %channel.id, "Interview channel created");

        if !settings.welcome_message.is_empty() {
            let welcome = settings.render(&settings.welcome_message, member);
            if let Err(e) = self
                .deps
                .platform
                .send_message(channel.id, OutgoingMessage::text(welcome))
                .await
            {
                warn!(channel_id = %channel.id, error = %e, "Failed to send welcome message");
            }
        }

        self.new_interview(member, channel.id).await.map(Some)
    }

    /// Close (and archive) the interview of a member who left.
    pub async fn on_member_leave(&self, guild: GuildId, user: UserId) -> Result<()> {
        let Some(interview) = self.get_by_member(user).await else {
            return Ok(());
        };
        if interview.guild_id != guild {
            return Ok(());
        }
        info!(member_id = %user, "Member left during interview");
        self.close_interview(&interview, true, None).await
    }
}

/// Channel name for a member's interview: lowercase, spaces to dashes,
/// limited to characters the platform accepts.
pub fn interview_channel_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    let base = if cleaned.is_empty() { "member".to_string() } else { cleaned };
    let base: String = base.chars().take(80).collect();
    format!("{base}-interview")
}
