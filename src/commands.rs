//! Prefix commands for the team and interviewees.
//!
//! `CommandParser` turns a message into a `Command`; `CommandHandler` runs it
//! against the interview registry. Replies go to the channel the command was
//! typed in.

use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::chat::model::{ChannelId, ChatMessage, GuildId, Member, OutgoingMessage, UserId};
use crate::error::Result;
use crate::interview::prompts;
use crate::interview::{Interview, InterviewRegistry, InterviewType};
use crate::ui::{PageContext, ReactionMenu, confirm};

/// How long the "approve without rules?" dialog waits.
pub const GREET_CONFIRM_TIMEOUT: Duration = Duration::from_secs(90);

const NO_INTERVIEW_HERE: &str = "No interview is open in this channel!";
const NOT_ALLOWED: &str = "You do not have permission to use this command.";
const NO_QUESTIONS: &str = "There are no interview questions currently setup!";

static MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:<@!?(\d+)>|(\d{5,20}))$").expect("mention pattern"));

/// A parsed prefix command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Pause,
    Resume,
    Restart { member: Option<UserId> },
    Status,
    /// Approve the interviewee; `linked` is the main account of an alt.
    Greet { linked: Option<UserId> },
    Reject { linked: Option<UserId> },
    Close { member: Option<UserId> },
    Open { member: UserId },
    /// Open the question editor.
    Questions,
    QuestionsList,
    /// Recognised command with bad arguments; carries the usage line.
    Usage(&'static str),
}

impl Command {
    /// Commands only the team may run.
    pub fn team_only(&self) -> bool {
        !matches!(self, Self::Pause | Self::Resume | Self::Usage(_))
    }
}

/// Parses message content into commands.
pub struct CommandParser;

impl CommandParser {
    /// `None` when the message is not a command for this bot.
    pub fn parse(content: &str, prefix: &str) -> Option<Command> {
        let body = content.trim().strip_prefix(prefix)?;
        let mut words = body.split_whitespace();
        let name = words.next()?.to_lowercase();
        let args: Vec<&str> = words.collect();

        let command = match name.as_str() {
            "pause" => Command::Pause,
            "resume" => Command::Resume,
            "status" => Command::Status,
            "restart" => Command::Restart {
                member: parse_optional_member(&args)?,
            },
            "close" => Command::Close {
                member: parse_optional_member(&args)?,
            },
            "greet" | "approve" => Command::Greet {
                linked: parse_optional_member(&args)?,
            },
            "reject" | "deny" => Command::Reject {
                linked: parse_optional_member(&args)?,
            },
            "open" => match args.first().and_then(|a| parse_member(a)) {
                Some(member) => Command::Open { member },
                None => Command::Usage("open <@member>"),
            },
            "questions" | "question" => parse_questions(&args),
            _ => return None,
        };
        Some(command)
    }
}

fn parse_questions(args: &[&str]) -> Command {
    match args.first().map(|a| a.to_lowercase()).as_deref() {
        None | Some("edit") => Command::Questions,
        Some("list") => Command::QuestionsList,
        Some(_) => Command::Usage("questions [list]"),
    }
}

/// A mention (`<@id>` / `<@!id>`) or a bare snowflake.
fn parse_member(arg: &str) -> Option<UserId> {
    let caps = MENTION.captures(arg.trim())?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .and_then(|m| m.as_str().parse().ok())
        .map(UserId)
}

/// `Some(None)` without arguments, `Some(Some(id))` for one member argument,
/// `None` when the argument is not a member (the message is then ignored).
fn parse_optional_member(args: &[&str]) -> Option<Option<UserId>> {
    match args.first() {
        None => Some(None),
        Some(arg) => parse_member(arg).map(Some),
    }
}

/// Runs commands against the registry.
pub struct CommandHandler {
    registry: Arc<InterviewRegistry>,
    settings_path: PathBuf,
}

impl CommandHandler {
    pub fn new(registry: Arc<InterviewRegistry>, settings_path: PathBuf) -> Self {
        Self {
            registry,
            settings_path,
        }
    }

    pub fn registry(&self) -> &Arc<InterviewRegistry> {
        &self.registry
    }

    /// Parse and run a message. Returns whether it was a command.
    pub async fn handle_message(&self, message: &ChatMessage) -> Result<bool> {
        if message.author.bot {
            return Ok(false);
        }
        let Some(guild) = message.guild_id else {
            return Ok(false);
        };
        let prefix = self.registry.deps().prefix.clone();
        let Some(command) = CommandParser::parse(&message.content, &prefix) else {
            return Ok(false);
        };
        debug!(?command, user_id = %message.author.id, "Command received");
        self.execute(guild, message.channel_id, message.author.id, command)
            .await?;
        Ok(true)
    }

    pub async fn execute(
        &self,
        guild: GuildId,
        channel: ChannelId,
        author: UserId,
        command: Command,
    ) -> Result<()> {
        if command.team_only() && !self.is_team(guild, author).await? {
            self.reply(channel, NOT_ALLOWED).await;
            return Ok(());
        }

        match command {
            Command::Pause => {
                if let Some(interview) = self.interview_here(channel).await {
                    interview.pause().await;
                }
            }
            Command::Resume => {
                if let Some(interview) = self.interview_here(channel).await {
                    interview.resume().await;
                }
            }
            Command::Restart { member } => {
                if let Some(interview) = self.target(guild, channel, member).await? {
                    interview.restart().await;
                }
            }
            Command::Status => self.status(channel).await,
            Command::Greet { linked } => self.greet(guild, channel, author, linked).await?,
            Command::Reject { linked } => self.reject(guild, channel, author, linked).await?,
            Command::Close { member } => {
                if let Some(interview) = self.target(guild, channel, member).await? {
                    self.reply(channel, "Closing interview.").await;
                    self.registry.close_interview(&interview, true, None).await?;
                }
            }
            Command::Open { member } => self.open(guild, channel, member).await?,
            Command::Questions => self.edit_questions(channel, author).await?,
            Command::QuestionsList => self.list_questions(channel, author).await?,
            Command::Usage(usage) => {
                let prefix = &self.registry.deps().prefix;
                self.reply(channel, &format!("Usage: `{prefix}{usage}`")).await;
            }
        }
        Ok(())
    }

    async fn is_team(&self, guild: GuildId, user: UserId) -> Result<bool> {
        let team_role = self.registry.deps().settings.read().await.team_role_id;
        let member = self.registry.deps().platform.get_member(guild, user).await?;
        Ok(member.is_some_and(|m| m.has_role(team_role)))
    }

    async fn reply(&self, channel: ChannelId, text: &str) {
        if let Err(e) = self
            .registry
            .deps()
            .platform
            .send_message(channel, OutgoingMessage::text(text))
            .await
        {
            warn!(channel_id = %channel, error = %e, "Failed to send command reply");
        }
    }

    async fn interview_here(&self, channel: ChannelId) -> Option<Arc<Interview>> {
        let interview = self.registry.get_by_channel_id(channel).await;
        if interview.is_none() {
            self.reply(channel, NO_INTERVIEW_HERE).await;
        }
        interview
    }

    /// The interview of `member`, or of this channel when no member is given.
    async fn target(
        &self,
        guild: GuildId,
        channel: ChannelId,
        member: Option<UserId>,
    ) -> Result<Option<Arc<Interview>>> {
        let Some(member) = member else {
            return Ok(self.interview_here(channel).await);
        };
        let interview = self.registry.get_by_member(member).await;
        if interview.is_none() {
            let name = self.display_name(guild, member).await?;
            self.reply(channel, &format!("User {name} has no open interview!"))
                .await;
        }
        Ok(interview)
    }

    async fn display_name(&self, guild: GuildId, user: UserId) -> Result<String> {
        let member = self.registry.deps().platform.get_member(guild, user).await?;
        Ok(member.map_or_else(|| format!("<@{user}>"), |m| m.display_name))
    }

    async fn status(&self, channel: ChannelId) {
        let interviews = self.registry.all().await;
        if interviews.is_empty() {
            self.reply(channel, "There are no active interviews.").await;
            return;
        }
        self.reply(channel, "Active Interviews:").await;
        for interview in interviews {
            self.reply(channel, &interview.status_line()).await;
        }
    }

    /// Interviewee, staff member and optional linked account, or `None`
    /// after telling the channel what is missing.
    async fn parties(
        &self,
        guild: GuildId,
        channel: ChannelId,
        staff: UserId,
        linked: Option<UserId>,
    ) -> Result<Option<(Arc<Interview>, Member, Member, Option<Member>)>> {
        let Some(interview) = self.interview_here(channel).await else {
            return Ok(None);
        };
        let platform = &self.registry.deps().platform;
        let Some(member) = platform.get_member(guild, interview.member_id).await? else {
            self.reply(
                channel,
                &format!("{} is no longer in the server.", interview.user_name),
            )
            .await;
            return Ok(None);
        };
        let Some(staff) = platform.get_member(guild, staff).await? else {
            return Ok(None);
        };
        let linked = match linked {
            Some(id) => platform.get_member(guild, id).await?,
            None => None,
        };
        Ok(Some((interview, member, staff, linked)))
    }

    async fn greet(
        &self,
        guild: GuildId,
        channel: ChannelId,
        author: UserId,
        linked: Option<UserId>,
    ) -> Result<()> {
        let Some((interview, member, greeter, linked)) =
            self.parties(guild, channel, author, linked).await?
        else {
            return Ok(());
        };
        let state = interview.state();

        if state.interview_type == InterviewType::ExistingMember {
            // Alts skip the rules but must name their main account.
            match &linked {
                None => {
                    self.reply(
                        channel,
                        "No valid member account was specified! When greeting an alt-account, \
                         the related account must be included in the greet command.",
                    )
                    .await;
                    return Ok(());
                }
                Some(main) if main.id == member.id => {
                    self.reply(
                        channel,
                        "Can not greet alt-account, the member specified is the same as the \
                         member you are trying to greet! When greeting an alt-account, the \
                         related account must be included in the greet command.",
                    )
                    .await;
                    return Ok(());
                }
                Some(_) => {}
            }
        } else if !state.read_rules() {
            let ctx = self.page_context(channel, author);
            let answer = confirm(
                &ctx,
                "Rules not confirmed",
                &format!(
                    "⚠ It does not appear that {} has read the rules yet. Do you wish to approve them anyways?",
                    member.display_name
                ),
                GREET_CONFIRM_TIMEOUT,
            )
            .await?;
            match answer {
                Some(true) => {}
                Some(false) => {
                    self.reply(channel, "Okay.").await;
                    return Ok(());
                }
                None => return Ok(()),
            }
        }

        self.approve(&interview, &member, &greeter, linked.as_ref())
            .await
    }

    async fn approve(
        &self,
        interview: &Arc<Interview>,
        member: &Member,
        greeter: &Member,
        linked: Option<&Member>,
    ) -> Result<()> {
        let deps = self.registry.deps();
        let settings = deps.settings.read().await.clone();

        deps.platform
            .add_role(
                member.guild_id,
                member.id,
                settings.member_role_id,
                &format!("The user was granted membership by {}.", greeter.name),
            )
            .await?;
        info!(member_id = %member.id, greeter_id = %greeter.id, "Member approved");

        if !settings.approved_message.is_empty() {
            let text = settings.render(&settings.approved_message, member);
            self.reply(interview.channel_id, &text).await;
        }
        let log = prompts::log_greet(settings.member_role_id, member, greeter, linked);
        self.log(settings.log_channel_id, log).await;

        self.registry.close_interview(interview, true, None).await
    }

    async fn reject(
        &self,
        guild: GuildId,
        channel: ChannelId,
        author: UserId,
        linked: Option<UserId>,
    ) -> Result<()> {
        let Some((interview, member, staff, linked)) =
            self.parties(guild, channel, author, linked).await?
        else {
            return Ok(());
        };
        let settings = self.registry.deps().settings.read().await.clone();
        info!(member_id = %member.id, staff_id = %staff.id, "Member rejected");

        if !settings.rejection_message.is_empty() {
            let text = settings.render(&settings.rejection_message, &member);
            self.reply(channel, &text).await;
        }
        let log = prompts::log_deny(&member, &staff, linked.as_ref());
        self.log(settings.log_channel_id, log).await;

        self.registry.close_interview(&interview, true, None).await
    }

    async fn log(&self, channel: ChannelId, embed: crate::chat::Embed) {
        if let Err(e) = self
            .registry
            .deps()
            .platform
            .send_message(channel, OutgoingMessage::embed(embed))
            .await
        {
            warn!(channel_id = %channel, error = %e, "Failed to post to the log channel");
        }
    }

    async fn open(&self, guild: GuildId, channel: ChannelId, user: UserId) -> Result<()> {
        if let Some(existing) = self.registry.get_by_member(user).await {
            self.reply(
                channel,
                &format!(
                    "An interview is already open for this user in <#{}>",
                    existing.channel_id
                ),
            )
            .await;
            return Ok(());
        }
        let Some(member) = self.registry.deps().platform.get_member(guild, user).await? else {
            self.reply(channel, &format!("<@{user}> is not a member of this server."))
                .await;
            return Ok(());
        };
        if self.registry.on_member_join(&member).await?.is_none() {
            self.reply(channel, "Can not open an interview for that account.")
                .await;
        }
        Ok(())
    }

    fn page_context(&self, channel: ChannelId, requester: UserId) -> PageContext {
        let deps = self.registry.deps();
        PageContext {
            platform: Arc::clone(&deps.platform),
            bus: deps.bus.clone(),
            channel,
            requester,
            prefix: deps.prefix.clone(),
        }
    }

    async fn question_categories(&self) -> Vec<(String, Vec<String>)> {
        let settings = self.registry.deps().settings.read().await;
        InterviewType::question_tracks()
            .map(|track| (track.to_string(), settings.questions_for(track)))
            .collect()
    }

    async fn list_questions(&self, channel: ChannelId, author: UserId) -> Result<()> {
        let categories = self.question_categories().await;
        if categories.iter().all(|(_, questions)| questions.is_empty()) {
            self.reply(channel, NO_QUESTIONS).await;
            return Ok(());
        }
        let mut menu = ReactionMenu::new(self.page_context(channel, author));
        menu.browse("Interview Questions", &categories).await?;
        Ok(())
    }

    /// Question editor: track, then action, then the edit and a confirmation.
    async fn edit_questions(&self, channel: ChannelId, author: UserId) -> Result<()> {
        let mut menu = ReactionMenu::new(self.page_context(channel, author));
        let tracks: Vec<InterviewType> = InterviewType::question_tracks().collect();
        let labels: Vec<String> = tracks.iter().map(ToString::to_string).collect();

        let Some(track) = menu
            .choose("Interview Questions", "Which interview track do you want to edit?", &labels)
            .await?
            .map(|i| tracks[i])
        else {
            menu.cancel().await;
            return Ok(());
        };

        let actions = [
            "Add a question".to_string(),
            "Remove a question".to_string(),
            "List the questions".to_string(),
        ];
        let title = format!("Questions: {track}");
        match menu
            .choose(&title, "What do you want to do?", &actions)
            .await?
        {
            Some(0) => self.add_question(&mut menu, &title, track).await,
            Some(1) => self.remove_question(&mut menu, &title, track).await,
            Some(2) => {
                let questions = self.registry.deps().settings.read().await.questions_for(track);
                menu.browse("Interview Questions", &[(track.to_string(), questions)])
                    .await?;
                Ok(())
            }
            _ => {
                menu.cancel().await;
                Ok(())
            }
        }
    }

    async fn add_question(
        &self,
        menu: &mut ReactionMenu,
        title: &str,
        track: InterviewType,
    ) -> Result<()> {
        let Some(question) = menu
            .ask_text(title, "Type the question you want to add.")
            .await?
        else {
            menu.cancel().await;
            return Ok(());
        };
        let question = question.trim().to_string();
        if !menu
            .confirm(title, &format!("Add this question?\n\n> {question}"))
            .await?
        {
            menu.cancel().await;
            return Ok(());
        }

        self.update_questions(|settings| {
            settings
                .interview_questions
                .entry(track)
                .or_default()
                .push(question.clone());
        })
        .await?;
        info!(%track, "Interview question added");
        menu.done(title, "Added new interview question!").await;
        Ok(())
    }

    async fn remove_question(
        &self,
        menu: &mut ReactionMenu,
        title: &str,
        track: InterviewType,
    ) -> Result<()> {
        let questions = self.registry.deps().settings.read().await.questions_for(track);
        if questions.is_empty() {
            menu.done(title, NO_QUESTIONS).await;
            return Ok(());
        }

        let mut listing = format!(
            "Enter the number of the question you wish to remove. (Valid entries are 1 - {})\n\n",
            questions.len()
        );
        for (i, q) in questions.iter().enumerate() {
            listing.push_str(&format!("**{}:** {q}\n", i + 1));
        }
        let Some(answer) = menu.ask_text(title, &listing).await? else {
            menu.cancel().await;
            return Ok(());
        };
        let index = match answer.trim().parse::<usize>() {
            Ok(n) if (1..=questions.len()).contains(&n) => n - 1,
            _ => {
                let shown: String = answer.trim().chars().take(1000).collect();
                menu.done(
                    title,
                    &format!("`{shown}` is not a valid number from 1 - {}", questions.len()),
                )
                .await;
                return Ok(());
            }
        };

        let removed = questions[index].clone();
        if !menu
            .confirm(title, &format!("Remove question **{}**?\n\n> {removed}", index + 1))
            .await?
        {
            menu.cancel().await;
            return Ok(());
        }

        self.update_questions(|settings| {
            if let Some(list) = settings.interview_questions.get_mut(&track)
                && list.get(index) == Some(&removed)
            {
                list.remove(index);
            }
        })
        .await?;
        info!(%track, index, "Interview question removed");
        menu.done(
            title,
            &format!("Removed question number **{}**:\n{removed}", index + 1),
        )
        .await;
        Ok(())
    }

    /// Edit the shared settings and write them to disk. Running interviews
    /// keep the questions they started with.
    async fn update_questions<F>(&self, edit: F) -> Result<()>
    where
        F: FnOnce(&mut crate::config::GuildSettings),
    {
        let mut settings = self.registry.deps().settings.write().await;
        edit(&mut *settings);
        settings.save(&self.settings_path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::model::{ChatEvent, Emoji, MessageId, ReactionEvent, RoleId};
    use crate::chat::{EventBus, MemoryPlatform};
    use crate::config::GuildSettings;
    use crate::interview::{InterviewDeps, Timing};
    use crate::store::{Database, LibSqlBackend};
    use tokio::sync::RwLock;

    const BOT: UserId = UserId(1);
    const GUILD: GuildId = GuildId(10);
    const STAFF: UserId = UserId(40);
    const NEWBIE: UserId = UserId(41);
    const TEAM: RoleId = RoleId(77);
    const MEMBER_ROLE: RoleId = RoleId(78);
    const ARCHIVE: ChannelId = ChannelId(500);
    const LOG: ChannelId = ChannelId(501);
    const LOBBY: ChannelId = ChannelId(502);

    #[test]
    fn parses_commands_with_prefix() {
        assert_eq!(CommandParser::parse(";pause", ";"), Some(Command::Pause));
        assert_eq!(CommandParser::parse("  ;Resume ", ";"), Some(Command::Resume));
        assert_eq!(CommandParser::parse(";status", ";"), Some(Command::Status));
        assert_eq!(CommandParser::parse("pause", ";"), None);
        assert_eq!(CommandParser::parse(";dance", ";"), None);
        assert_eq!(CommandParser::parse(";", ";"), None);
    }

    #[test]
    fn parses_member_arguments() {
        assert_eq!(
            CommandParser::parse(";close <@!123456>", ";"),
            Some(Command::Close {
                member: Some(UserId(123456))
            })
        );
        assert_eq!(
            CommandParser::parse(";greet <@98765>", ";"),
            Some(Command::Greet {
                linked: Some(UserId(98765))
            })
        );
        assert_eq!(
            CommandParser::parse(";open 112233445566", ";"),
            Some(Command::Open {
                member: UserId(112233445566)
            })
        );
        assert_eq!(
            CommandParser::parse(";restart", ";"),
            Some(Command::Restart { member: None })
        );
        // Not a member: ignored rather than guessed.
        assert_eq!(CommandParser::parse(";close everyone", ";"), None);
    }

    #[test]
    fn open_without_member_shows_usage() {
        assert_eq!(
            CommandParser::parse(";open", ";"),
            Some(Command::Usage("open <@member>"))
        );
    }

    #[test]
    fn parses_question_subcommands() {
        assert_eq!(CommandParser::parse(";questions", ";"), Some(Command::Questions));
        assert_eq!(
            CommandParser::parse(";questions LIST", ";"),
            Some(Command::QuestionsList)
        );
        assert_eq!(
            CommandParser::parse(";questions shuffle", ";"),
            Some(Command::Usage("questions [list]"))
        );
    }

    #[test]
    fn only_pause_and_resume_are_open_to_everyone() {
        assert!(!Command::Pause.team_only());
        assert!(!Command::Resume.team_only());
        assert!(Command::Status.team_only());
        assert!(Command::Greet { linked: None }.team_only());
    }

    fn member(id: UserId, name: &str, roles: Vec<RoleId>) -> Member {
        Member {
            id,
            guild_id: GUILD,
            name: name.into(),
            display_name: name.into(),
            avatar_url: None,
            bot: false,
            roles,
        }
    }

    async fn setup() -> (Arc<MemoryPlatform>, CommandHandler, tempfile::TempDir) {
        let platform = Arc::new(MemoryPlatform::new(BOT));
        platform.add_channel(GUILD, ARCHIVE, "archive");
        platform.add_channel(GUILD, LOG, "log");
        platform.add_channel(GUILD, LOBBY, "lobby");
        platform.add_member(member(STAFF, "staff", vec![TEAM]));
        platform.add_member(member(NEWBIE, "newbie", vec![]));

        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        db.run_migrations().await.unwrap();

        let mut settings = GuildSettings::new(GUILD);
        settings.team_role_id = TEAM;
        settings.member_role_id = MEMBER_ROLE;
        settings.archive_channel_id = ARCHIVE;
        settings.log_channel_id = LOG;
        settings.approved_message = "Welcome aboard {user}!".into();
        settings.rejection_message = "Sorry {user.name}.".into();
        settings.archive.lead_time_minutes = 0;
        settings.archive.relay_delay_ms = 0;

        let deps = InterviewDeps {
            platform: platform.clone(),
            db,
            bus: EventBus::new(),
            settings: Arc::new(RwLock::new(settings)),
            prefix: ";".into(),
            timing: Timing::instant(),
        };
        let registry = Arc::new(InterviewRegistry::new(deps));
        let dir = tempfile::tempdir().unwrap();
        let handler = CommandHandler::new(registry, dir.path().join("guildSettings.json"));
        (platform, handler, dir)
    }

    async fn open_interview(handler: &CommandHandler) -> Arc<Interview> {
        handler
            .execute(GUILD, LOBBY, STAFF, Command::Open { member: NEWBIE })
            .await
            .unwrap();
        handler.registry().get_by_member(NEWBIE).await.unwrap()
    }

    #[tokio::test]
    async fn non_team_members_are_refused() {
        let (platform, handler, _dir) = setup().await;
        handler
            .execute(GUILD, LOBBY, NEWBIE, Command::Status)
            .await
            .unwrap();
        assert_eq!(platform.bot_texts(LOBBY), vec![NOT_ALLOWED.to_string()]);
    }

    #[tokio::test]
    async fn status_and_missing_interview_replies() {
        let (platform, handler, _dir) = setup().await;
        handler
            .execute(GUILD, LOBBY, STAFF, Command::Status)
            .await
            .unwrap();
        handler
            .execute(GUILD, LOBBY, STAFF, Command::Close { member: None })
            .await
            .unwrap();
        handler
            .execute(GUILD, LOBBY, STAFF, Command::Close { member: Some(NEWBIE) })
            .await
            .unwrap();
        assert_eq!(
            platform.bot_texts(LOBBY),
            vec![
                "There are no active interviews.".to_string(),
                NO_INTERVIEW_HERE.to_string(),
                "User newbie has no open interview!".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn open_twice_points_at_the_existing_channel() {
        let (platform, handler, _dir) = setup().await;
        let interview = open_interview(&handler).await;
        assert_eq!(platform.created_channels().len(), 1);

        handler
            .execute(GUILD, LOBBY, STAFF, Command::Open { member: NEWBIE })
            .await
            .unwrap();
        assert_eq!(
            platform.bot_texts(LOBBY).last().cloned(),
            Some(format!(
                "An interview is already open for this user in <#{}>",
                interview.channel_id
            ))
        );
        assert_eq!(platform.created_channels().len(), 1);
    }

    #[tokio::test]
    async fn greet_after_rules_grants_role_logs_and_closes() {
        let (platform, handler, _dir) = setup().await;
        let interview = open_interview(&handler).await;
        interview
            .check_rule_confirmation(NEWBIE, "I read them <@&77>", &[TEAM])
            .await;

        handler
            .execute(GUILD, interview.channel_id, STAFF, Command::Greet { linked: None })
            .await
            .unwrap();

        assert_eq!(platform.role_grants(), vec![(GUILD, NEWBIE, MEMBER_ROLE)]);
        assert!(
            platform
                .bot_texts(interview.channel_id)
                .contains(&"Welcome aboard <@41>!".to_string())
        );
        let log = platform.bot_embeds(LOG);
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].color, Some(crate::chat::model::GREET_GREEN));
        assert!(platform.deleted_channels().contains(&interview.channel_id));
        assert!(handler.registry().is_empty().await);
    }

    #[tokio::test]
    async fn greet_without_rules_can_be_declined() {
        let (platform, handler, _dir) = setup().await;
        let interview = open_interview(&handler).await;
        let channel = interview.channel_id;
        let bus = handler.registry().deps().bus.clone();

        let handler = Arc::new(handler);
        let running = {
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                handler
                    .execute(GUILD, channel, STAFF, Command::Greet { linked: None })
                    .await
            })
        };

        let dialog = wait_for_dialog(&platform, &bus, channel).await;
        bus.publish(ChatEvent::ReactionAdded(ReactionEvent {
            user_id: STAFF,
            channel_id: channel,
            message_id: dialog,
            guild_id: Some(GUILD),
            emoji: Emoji::new("❌"),
        }));
        running.await.unwrap().unwrap();

        assert!(platform.role_grants().is_empty());
        assert_eq!(platform.bot_texts(channel).last().cloned(), Some("Okay.".to_string()));
        assert!(handler.registry().get_by_member(NEWBIE).await.is_some());
    }

    async fn wait_for_dialog(platform: &MemoryPlatform, bus: &EventBus, channel: ChannelId) -> MessageId {
        for _ in 0..200 {
            if bus.waiter_count() > 0
                && let Some(last) = platform.last_message(channel)
                && last.content.starts_with("**Rules not confirmed**")
            {
                return last.id;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("confirmation dialog never appeared");
    }

    #[tokio::test]
    async fn reject_posts_message_and_deny_log() {
        let (platform, handler, _dir) = setup().await;
        let interview = open_interview(&handler).await;

        handler
            .execute(GUILD, interview.channel_id, STAFF, Command::Reject { linked: None })
            .await
            .unwrap();

        assert!(
            platform
                .bot_texts(interview.channel_id)
                .contains(&"Sorry newbie.".to_string())
        );
        assert_eq!(
            platform.bot_embeds(LOG)[0].color,
            Some(crate::chat::model::DARK_RED)
        );
        assert!(platform.role_grants().is_empty());
        assert!(handler.registry().is_empty().await);
    }

    #[tokio::test]
    async fn alt_greet_requires_the_main_account() {
        let (platform, handler, _dir) = setup().await;
        let interview = open_interview(&handler).await;
        interview
            .check_add_reactions(&ReactionEvent {
                user_id: NEWBIE,
                channel_id: interview.channel_id,
                message_id: MessageId(1),
                guild_id: Some(GUILD),
                emoji: Emoji::new("<:altAccount:652989510996721675>"),
            })
            .await;

        handler
            .execute(GUILD, interview.channel_id, STAFF, Command::Greet { linked: None })
            .await
            .unwrap();
        assert!(platform.role_grants().is_empty());
        assert!(
            platform
                .bot_texts(interview.channel_id)
                .iter()
                .any(|t| t.starts_with("No valid member account was specified!"))
        );

        handler
            .execute(
                GUILD,
                interview.channel_id,
                STAFF,
                Command::Greet {
                    linked: Some(STAFF),
                },
            )
            .await
            .unwrap();
        assert_eq!(platform.role_grants(), vec![(GUILD, NEWBIE, MEMBER_ROLE)]);
    }
}
