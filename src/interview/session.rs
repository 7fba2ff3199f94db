//! Live interview: an `InterviewState` bound to a member, a channel and the
//! collaborators that carry out its effects.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, watch};
use tracing::{debug, info, warn};

use crate::chat::model::{
    ChannelId, ChatEvent, Emoji, GuildId, Member, OutgoingMessage, ReactionEvent, UserId,
};
use crate::chat::{ChatPlatform, EventBus};
use crate::config::GuildSettings;
use crate::store::{Database, InterviewField, InterviewKey, InterviewRow};

use super::prompts::{self, NoticeContext};
use super::state::{Effect, InterviewState, InterviewType, Notice, ReplyOutcome, TRACKS};

/// Pauses that make the bot look like it is typing.
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub before_question: Duration,
    pub before_final_message: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            before_question: Duration::from_millis(1100),
            before_final_message: Duration::from_millis(1500),
        }
    }
}

impl Timing {
    /// No delays, for tests and dry runs.
    pub fn instant() -> Self {
        Self {
            before_question: Duration::ZERO,
            before_final_message: Duration::ZERO,
        }
    }
}

/// Collaborators shared by every interview of a guild.
#[derive(Clone)]
pub struct InterviewDeps {
    pub platform: Arc<dyn ChatPlatform>,
    pub db: Arc<dyn Database>,
    pub bus: EventBus,
    pub settings: Arc<RwLock<GuildSettings>>,
    pub prefix: String,
    pub timing: Timing,
}

/// One onboarding conversation.
pub struct Interview {
    pub guild_id: GuildId,
    pub member_id: UserId,
    pub channel_id: ChannelId,
    pub user_name: String,
    pub join_timestamp: DateTime<Utc>,
    questions: BTreeMap<InterviewType, Vec<String>>,
    state: Mutex<InterviewState>,
    question_lock: tokio::sync::Mutex<()>,
    /// Bumped to cancel any running question loop.
    epoch: watch::Sender<u64>,
    deps: InterviewDeps,
}

impl std::fmt::Debug for Interview {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interview")
            .field("member_id", &self.member_id)
            .field("channel_id", &self.channel_id)
            .field("state", &self.state())
            .finish()
    }
}

impl Interview {
    fn build(
        deps: InterviewDeps,
        questions: BTreeMap<InterviewType, Vec<String>>,
        row: &InterviewRow,
        state: InterviewState,
    ) -> Arc<Self> {
        let (epoch, _) = watch::channel(0);
        Arc::new(Self {
            guild_id: row.guild_id,
            member_id: row.member_id,
            channel_id: row.channel_id,
            user_name: row.user_name.clone(),
            join_timestamp: row.join_timestamp,
            questions,
            state: Mutex::new(state),
            question_lock: tokio::sync::Mutex::new(()),
            epoch,
            deps,
        })
    }

    /// A fresh interview for a member who just joined. The question set is
    /// cached from the current settings.
    pub async fn new(deps: InterviewDeps, member: &Member, channel: ChannelId) -> Arc<Self> {
        let questions = deps.settings.read().await.interview_questions.clone();
        let row = InterviewRow {
            guild_id: member.guild_id,
            member_id: member.id,
            channel_id: channel,
            user_name: member.name.clone(),
            question_number: 0,
            interview_finished: false,
            paused: false,
            interview_type: InterviewType::NotStarted,
            read_rules: false,
            join_timestamp: Utc::now(),
        };
        Self::build(deps, questions, &row, InterviewState::default())
    }

    /// Rebuild an interview from its persisted row.
    pub async fn from_row(deps: InterviewDeps, row: &InterviewRow) -> Arc<Self> {
        let questions = deps.settings.read().await.interview_questions.clone();
        let state = InterviewState {
            question_number: row.question_number,
            interview_finished: row.interview_finished,
            paused: row.paused,
            interview_type: row.interview_type,
            // Only the flag survives a restart, not the confirmation text.
            rule_confirmations: if row.read_rules {
                vec![String::new()]
            } else {
                Vec::new()
            },
            waiting_for_messages: false,
        };
        Self::build(deps, questions, row, state)
    }

    fn lock(&self) -> MutexGuard<'_, InterviewState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> InterviewState {
        self.lock().clone()
    }

    pub fn key(&self) -> InterviewKey {
        InterviewKey {
            channel_id: self.channel_id,
            member_id: self.member_id,
        }
    }

    pub fn to_row(&self) -> InterviewRow {
        let state = self.lock();
        InterviewRow {
            guild_id: self.guild_id,
            member_id: self.member_id,
            channel_id: self.channel_id,
            user_name: self.user_name.clone(),
            question_number: state.question_number,
            interview_finished: state.interview_finished,
            paused: state.paused,
            interview_type: state.interview_type,
            read_rules: state.read_rules(),
            join_timestamp: self.join_timestamp,
        }
    }

    /// Same member, channel and guild.
    pub fn same_identity(&self, other: &Interview) -> bool {
        self.member_id == other.member_id
            && self.channel_id == other.channel_id
            && self.guild_id == other.guild_id
    }

    pub fn questions_for(&self, track: InterviewType) -> &[String] {
        self.questions.get(&track).map_or(&[], Vec::as_slice)
    }

    /// Cancel any running question loop without touching the state.
    pub fn stop(&self) {
        self.epoch.send_modify(|e| *e += 1);
    }

    pub fn status_line(&self) -> String {
        self.lock().status_line(self.member_id, self.channel_id)
    }

    // ── Commands ────────────────────────────────────────────────────

    pub async fn pause(self: &Arc<Self>) {
        let effects = self.lock().pause();
        info!(member_id = %self.member_id, "Interview paused");
        self.apply(effects, None).await;
    }

    pub async fn resume(self: &Arc<Self>) {
        let effects = self.lock().resume();
        info!(member_id = %self.member_id, "Interview resumed");
        self.apply(effects, None).await;
    }

    /// Reset to the type prompt and post it again.
    pub async fn restart(self: &Arc<Self>) {
        let effects = self.lock().restart(false);
        info!(member_id = %self.member_id, "Interview restarted");
        self.apply(effects, None).await;
    }

    /// Ask the member to resume after the bot was restarted mid-interview.
    pub async fn prompt_to_resume(self: &Arc<Self>) {
        let effect = self.lock().prompt_to_resume();
        if let Some(effect) = effect {
            self.apply(vec![effect], None).await;
        }
    }

    /// Post the type-selection prompt and its track reactions.
    pub async fn send_type_prompt(&self) {
        let guild_name = self.deps.settings.read().await.guild_name.clone();
        let platform = &self.deps.platform;
        let message = match platform
            .send_message(self.channel_id, OutgoingMessage::embed(prompts::type_prompt(&guild_name)))
            .await
        {
            Ok(id) => id,
            Err(e) => {
                warn!(channel_id = %self.channel_id, error = %e, "Failed to send type prompt");
                return;
            }
        };
        for (emoji, _) in TRACKS {
            if let Err(e) = platform
                .add_reaction(self.channel_id, message, &Emoji::new(emoji))
                .await
            {
                warn!(channel_id = %self.channel_id, %emoji, error = %e, "Failed to add track reaction");
            }
        }
    }

    // ── Events ──────────────────────────────────────────────────────

    pub async fn check_add_reactions(self: &Arc<Self>, reaction: &ReactionEvent) {
        if reaction.user_id == self.deps.platform.bot_user_id() {
            return;
        }
        let effects = self
            .lock()
            .reaction_added(reaction.user_id, self.member_id, &reaction.emoji);
        self.apply(effects, Some(reaction)).await;
    }

    pub async fn check_remove_reactions(self: &Arc<Self>, reaction: &ReactionEvent) {
        let effects = self
            .lock()
            .reaction_removed(reaction.user_id, self.member_id, &reaction.emoji);
        if !effects.is_empty() {
            info!(member_id = %self.member_id, "Interview type reset by reaction removal");
        }
        self.apply(effects, Some(reaction)).await;
    }

    /// A message by the interviewee that pings the team counts as a rule
    /// confirmation.
    pub async fn check_rule_confirmation(
        self: &Arc<Self>,
        author: UserId,
        content: &str,
        role_mentions: &[crate::chat::model::RoleId],
    ) {
        if author != self.member_id {
            return;
        }
        let team_role = self.deps.settings.read().await.team_role_id;
        if !role_mentions.contains(&team_role) {
            return;
        }
        let effect = self.lock().confirm_rules(content);
        if let Some(effect) = effect {
            debug!(member_id = %self.member_id, "Rules confirmed");
            self.apply(vec![effect], None).await;
        }
    }

    // ── Effects ─────────────────────────────────────────────────────

    async fn apply(self: &Arc<Self>, effects: Vec<Effect>, reaction: Option<&ReactionEvent>) {
        for effect in effects {
            match effect {
                Effect::Persist(field) => self.persist(field).await,
                Effect::Notify(notice) => self.notify(notice).await,
                Effect::SendTypePrompt => self.send_type_prompt().await,
                Effect::StartQuestionLoop => {
                    let this = Arc::clone(self);
                    tokio::spawn(async move { this.question_loop().await });
                }
                Effect::AskNextQuestion => self.send_next_question().await,
                Effect::CancelQuestionLoop => {
                    self.epoch.send_modify(|e| *e += 1);
                }
                Effect::StripReaction => {
                    if let Some(r) = reaction {
                        self.strip_reaction(r).await;
                    }
                }
            }
        }
    }

    async fn persist(&self, field: InterviewField) {
        if let Err(e) = self.deps.db.update_interview_field(self.key(), field).await {
            warn!(member_id = %self.member_id, column = field.column(), error = %e, "Failed to persist interview field");
        }
    }

    async fn notify(&self, notice: Notice) {
        let text = {
            let settings = self.deps.settings.read().await;
            let team_role_name = if notice == Notice::TypeReset {
                self.deps
                    .platform
                    .role_name(self.guild_id, settings.team_role_id)
                    .await
                    .ok()
                    .flatten()
            } else {
                None
            };
            let ctx = NoticeContext {
                prefix: &self.deps.prefix,
                guild_name: &settings.guild_name,
                member_display_name: &self.user_name,
                welcome_channel: settings.welcome_channel_id,
                team_role: settings.team_role_id,
                team_role_name: team_role_name.as_deref(),
            };
            prompts::notice_text(notice, &ctx)
        };
        if let Err(e) = self.deps.platform.send_message(self.channel_id, text.into()).await {
            warn!(channel_id = %self.channel_id, ?notice, error = %e, "Failed to send notice");
        }
    }

    async fn strip_reaction(&self, reaction: &ReactionEvent) {
        match self
            .deps
            .platform
            .remove_reaction(reaction.channel_id, reaction.message_id, &reaction.emoji, reaction.user_id)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_best_effort() => {
                debug!(error = %e, "Could not strip reaction");
            }
            Err(e) => warn!(error = %e, "Failed to strip reaction"),
        }
    }

    // ── Question loop ───────────────────────────────────────────────

    /// Send the pending question, if any. Failures are logged and the
    /// counter is left alone.
    async fn send_next_question(&self) {
        let track = self.lock().interview_type;
        let questions = self.questions_for(track);
        let Some(idx) = self.lock().pending_question(questions.len()) else {
            debug!(member_id = %self.member_id, "No question to send");
            return;
        };

        let _ = self.deps.platform.trigger_typing(self.channel_id).await;
        tokio::time::sleep(self.deps.timing.before_question).await;

        let sent = self
            .deps
            .platform
            .send_message(self.channel_id, questions[idx].as_str().into())
            .await;
        match sent {
            Ok(_) => {
                let effect = self.lock().question_sent();
                if let Effect::Persist(field) = effect {
                    self.persist(field).await;
                }
            }
            Err(e) => {
                warn!(member_id = %self.member_id, question = idx, error = %e, "Failed to send question");
            }
        }
    }

    async fn question_loop(self: Arc<Self>) {
        let mut epoch_rx = self.epoch.subscribe();
        let started_epoch = *epoch_rx.borrow_and_update();

        let _guard = self.question_lock.lock().await;
        if *epoch_rx.borrow() != started_epoch {
            debug!(member_id = %self.member_id, "Question loop canceled before it started");
            return;
        }

        let (track, timeout) = {
            let settings = self.deps.settings.read().await;
            (self.lock().interview_type, settings.question_reply_timeout())
        };
        let count = self.questions_for(track).len();

        // Subscribe before the first question so no reply slips past.
        let mut replies = self.deps.bus.subscribe();
        self.lock().waiting_for_messages = true;
        self.send_next_question().await;
        info!(member_id = %self.member_id, %track, questions = count, "Question loop started");

        loop {
            let channel = self.channel_id;
            let member = self.member_id;
            let prefix = self.deps.prefix.clone();
            let filter = |event: &ChatEvent| match event {
                ChatEvent::MessageReceived(m)
                    if m.channel_id == channel
                        && self.lock().accepts_reply(m.author.id, member, &m.content, &prefix) =>
                {
                    Some(())
                }
                _ => None,
            };

            let reply = tokio::select! {
                _ = epoch_rx.changed() => {
                    debug!(member_id = %self.member_id, "Question loop canceled");
                    return;
                }
                reply = tokio::time::timeout(timeout, replies.next_matching(filter)) => reply,
            };

            match reply {
                Ok(Some(())) => {}
                Ok(None) => {
                    warn!(member_id = %self.member_id, "Event bus closed, question loop stops");
                    self.lock().waiting_for_messages = false;
                    return;
                }
                Err(_) => {
                    info!(member_id = %self.member_id, "No reply before timeout, question loop stops");
                    self.lock().waiting_for_messages = false;
                    return;
                }
            }

            let outcome = self.lock().after_reply(track, count);
            match outcome {
                ReplyOutcome::Abort => {
                    debug!(member_id = %self.member_id, "Track changed, question loop aborts");
                    return;
                }
                ReplyOutcome::Finish => {
                    let _ = self.deps.platform.trigger_typing(self.channel_id).await;
                    tokio::time::sleep(self.deps.timing.before_final_message).await;
                    self.notify(Notice::Finished).await;
                    let effect = {
                        let mut state = self.lock();
                        state.waiting_for_messages = false;
                        state.finish()
                    };
                    if let Effect::Persist(field) = effect {
                        self.persist(field).await;
                    }
                    info!(member_id = %self.member_id, "Interview questions finished");
                    return;
                }
                ReplyOutcome::Continue => self.send_next_question().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::MemoryPlatform;
    use crate::chat::model::{Author, ChatMessage, MessageId, RoleId};
    use crate::store::LibSqlBackend;

    const BOT: UserId = UserId(1);
    const GUILD: GuildId = GuildId(10);
    const CHANNEL: ChannelId = ChannelId(20);
    const MEMBER: UserId = UserId(30);

    async fn setup(questions: &[&str]) -> (Arc<MemoryPlatform>, Arc<LibSqlBackend>, Arc<Interview>) {
        let platform = Arc::new(MemoryPlatform::new(BOT));
        platform.add_channel(GUILD, CHANNEL, "alice-interview");
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        db.run_migrations().await.unwrap();

        let mut settings = GuildSettings::new(GUILD);
        settings.team_role_id = RoleId(77);
        settings.interview_questions.insert(
            InterviewType::NewSystem,
            questions.iter().map(|q| q.to_string()).collect(),
        );

        let deps = InterviewDeps {
            platform: platform.clone(),
            db: db.clone(),
            bus: EventBus::new(),
            settings: Arc::new(RwLock::new(settings)),
            prefix: ";".into(),
            timing: Timing::instant(),
        };
        let member = Member {
            id: MEMBER,
            guild_id: GUILD,
            name: "alice".into(),
            display_name: "Alice".into(),
            avatar_url: None,
            bot: false,
            roles: vec![],
        };
        let interview = Interview::new(deps, &member, CHANNEL).await;
        db.insert_interview(&interview.to_row()).await.unwrap();
        (platform, db, interview)
    }

    fn reaction(user: UserId, emoji: &str) -> ReactionEvent {
        ReactionEvent {
            user_id: user,
            channel_id: CHANNEL,
            message_id: MessageId(5),
            guild_id: Some(GUILD),
            emoji: Emoji::new(emoji),
        }
    }

    #[tokio::test]
    async fn type_prompt_gets_every_track_reaction() {
        let (platform, _db, interview) = setup(&[]).await;
        interview.send_type_prompt().await;
        let prompt = platform.last_message(CHANNEL).unwrap();
        let emojis: Vec<String> = platform
            .reactions(prompt.id)
            .into_iter()
            .map(|(e, _)| e.0)
            .collect();
        assert_eq!(emojis.len(), 6);
        assert_eq!(emojis[0], "👥");
    }

    #[tokio::test]
    async fn stranger_reaction_is_stripped() {
        let (platform, _db, interview) = setup(&[]).await;
        platform.record_user_reaction(MessageId(5), Emoji::new("👥"), UserId(99));
        interview.check_add_reactions(&reaction(UserId(99), "👥")).await;
        assert!(platform.reactions(MessageId(5)).is_empty());
        assert_eq!(interview.state().interview_type, InterviewType::NotStarted);
    }

    #[tokio::test]
    async fn other_track_finishes_and_persists() {
        let (platform, db, interview) = setup(&[]).await;
        interview.check_add_reactions(&reaction(MEMBER, "ℹ️")).await;

        let state = interview.state();
        assert_eq!(state.interview_type, InterviewType::Other);
        assert!(state.interview_finished);
        let text = platform.bot_texts(CHANNEL).pop().unwrap();
        assert!(text.contains("<@&77>"));

        let rows = db.list_all_interviews().await.unwrap();
        assert_eq!(rows[0].interview_type, InterviewType::Other);
        assert!(rows[0].interview_finished);
    }

    #[tokio::test]
    async fn rule_confirmation_needs_team_ping() {
        let (_platform, db, interview) = setup(&[]).await;
        interview
            .check_rule_confirmation(MEMBER, "read them", &[])
            .await;
        assert!(!interview.state().read_rules());

        interview
            .check_rule_confirmation(MEMBER, "read them <@&77>", &[RoleId(77)])
            .await;
        assert!(interview.state().read_rules());
        assert!(db.list_all_interviews().await.unwrap()[0].read_rules);
    }

    #[tokio::test]
    async fn restart_cancels_a_waiting_loop() {
        let (platform, _db, interview) = setup(&["q1", "q2"]).await;
        interview.check_add_reactions(&reaction(MEMBER, "👥")).await;
        while interview.state().question_number < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(platform.bot_texts(CHANNEL), vec!["q1".to_string()]);

        interview.restart().await;
        // Give the canceled loop a moment; a late reply must not advance it.
        tokio::time::sleep(Duration::from_millis(20)).await;
        interview.deps.bus.publish(ChatEvent::MessageReceived(ChatMessage {
            id: MessageId(900),
            channel_id: CHANNEL,
            guild_id: Some(GUILD),
            author: Author {
                id: MEMBER,
                display_name: "Alice".into(),
                avatar_url: None,
                bot: false,
            },
            content: "answer".into(),
            embeds: vec![],
            role_mentions: vec![],
            created_at: Utc::now(),
        }));
        tokio::time::sleep(Duration::from_millis(20)).await;

        let state = interview.state();
        assert_eq!(state.question_number, 0);
        assert_eq!(state.interview_type, InterviewType::NotStarted);
        assert!(!platform.bot_texts(CHANNEL).contains(&"q2".to_string()));
        // The type prompt went out again.
        assert!(platform.bot_embeds(CHANNEL).len() >= 1);
    }

    fn member_says(content: &str) -> ChatEvent {
        ChatEvent::MessageReceived(ChatMessage {
            id: MessageId(901),
            channel_id: CHANNEL,
            guild_id: Some(GUILD),
            author: Author {
                id: MEMBER,
                display_name: "Alice".into(),
                avatar_url: None,
                bot: false,
            },
            content: content.into(),
            embeds: vec![],
            role_mentions: vec![],
            created_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn resume_command_is_never_taken_as_an_answer() {
        let (platform, _db, interview) = setup(&["q1", "q2"]).await;
        interview.check_add_reactions(&reaction(MEMBER, "👥")).await;
        while interview.state().question_number < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        interview.pause().await;
        // The command task can unpause before the waiting loop looks at the
        // message that triggered it.
        interview.deps.bus.publish(member_says(";resume"));
        interview.resume().await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let texts = platform.bot_texts(CHANNEL);
        assert_eq!(texts.iter().filter(|t| *t == "q1").count(), 2);
        assert!(!texts.contains(&"q2".to_string()));
        assert_eq!(interview.state().question_number, 1);

        interview.deps.bus.publish(member_says("my answer"));
        while interview.state().question_number < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(platform.bot_texts(CHANNEL).last().map(String::as_str), Some("q2"));
    }

    #[tokio::test]
    async fn from_row_restores_state() {
        let (_platform, _db, interview) = setup(&[]).await;
        let mut row = interview.to_row();
        row.question_number = 2;
        row.interview_type = InterviewType::NewSinglet;
        row.read_rules = true;
        row.paused = true;

        let restored = Interview::from_row(interview.deps.clone(), &row).await;
        let state = restored.state();
        assert_eq!(state.question_number, 2);
        assert!(state.paused && state.read_rules());
        assert!(restored.same_identity(&interview));
        assert_eq!(restored.to_row(), row);
    }
}
