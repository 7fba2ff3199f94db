//! Configuration types.
//!
//! Process-level settings come from the environment (`BotConfig`); per-guild
//! settings live in a JSON file (`GuildSettings`) that the `questions` and
//! message commands rewrite in place.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::chat::model::{ChannelId, GuildId, Member, RoleId};
use crate::error::ConfigError;
use crate::interview::InterviewType;

/// Process configuration read from the environment.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Discord bot token.
    pub token: SecretString,
    /// Command prefix (`;` unless overridden).
    pub prefix: String,
    pub db_path: PathBuf,
    pub guild_settings_path: PathBuf,
    /// Directory for the daily rolling log file, if file logging is wanted.
    pub log_dir: Option<PathBuf>,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let token = std::env::var("DISCORD_TOKEN")
            .map_err(|_| ConfigError::MissingEnvVar("DISCORD_TOKEN".into()))?;
        if token.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "DISCORD_TOKEN".into(),
                message: "must not be empty".into(),
            });
        }

        let prefix = std::env::var("PNBOT_PREFIX").unwrap_or_else(|_| ";".to_string());
        let db_path = std::env::var("PNBOT_DB_PATH")
            .unwrap_or_else(|_| "./data/pnbot.db".to_string())
            .into();
        let guild_settings_path = std::env::var("PNBOT_GUILD_SETTINGS")
            .unwrap_or_else(|_| "./guildSettings.json".to_string())
            .into();
        let log_dir = std::env::var("PNBOT_LOG_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            token: SecretString::from(token),
            prefix,
            db_path,
            guild_settings_path,
            log_dir,
        })
    }
}

/// Archival pacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveSettings {
    /// Countdown before the channel is archived.
    pub lead_time_minutes: u64,
    /// How often the countdown notice is refreshed.
    pub countdown_step_secs: u64,
    /// Minimum gap between two timestamp markers in the archive.
    pub divider_interval_minutes: i64,
    pub history_limit: usize,
    /// Delay between relayed messages.
    pub relay_delay_ms: u64,
    /// Leading channel messages (welcome + type prompt) left out of the archive.
    pub skip_leading_messages: usize,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            lead_time_minutes: 5,
            countdown_step_secs: 60,
            divider_interval_minutes: 5,
            history_limit: 500,
            relay_delay_ms: 750,
            skip_leading_messages: 2,
        }
    }
}

impl ArchiveSettings {
    pub fn lead_time(&self) -> Duration {
        Duration::from_secs(self.lead_time_minutes * 60)
    }

    pub fn countdown_step(&self) -> Duration {
        Duration::from_secs(self.countdown_step_secs.max(1))
    }

    pub fn relay_delay(&self) -> Duration {
        Duration::from_millis(self.relay_delay_ms)
    }

    pub fn divider_interval(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.divider_interval_minutes)
    }
}

fn default_guild_name() -> String {
    "the server".to_string()
}

fn default_reply_timeout() -> u64 {
    6 * 60 * 60
}

/// Per-guild settings, persisted as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildSettings {
    pub guild_id: GuildId,
    #[serde(default = "default_guild_name")]
    pub guild_name: String,
    pub interview_category_id: ChannelId,
    pub archive_channel_id: ChannelId,
    pub log_channel_id: ChannelId,
    pub welcome_channel_id: ChannelId,
    pub team_role_id: RoleId,
    pub member_role_id: RoleId,
    #[serde(default)]
    pub hide_interviews_role_id: Option<RoleId>,
    #[serde(default)]
    pub welcome_message: String,
    #[serde(default)]
    pub approved_message: String,
    #[serde(default)]
    pub rejection_message: String,
    #[serde(default)]
    pub interview_questions: BTreeMap<InterviewType, Vec<String>>,
    #[serde(default)]
    pub archive: ArchiveSettings,
    /// How long the question loop waits for one reply before giving up.
    #[serde(default = "default_reply_timeout")]
    pub question_reply_timeout_secs: u64,
}

impl GuildSettings {
    /// Settings with every id set and no questions or messages. Mostly useful
    /// as a starting point for a fresh settings file.
    pub fn new(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            guild_name: default_guild_name(),
            interview_category_id: ChannelId(0),
            archive_channel_id: ChannelId(0),
            log_channel_id: ChannelId(0),
            welcome_channel_id: ChannelId(0),
            team_role_id: RoleId(0),
            member_role_id: RoleId(0),
            hide_interviews_role_id: None,
            welcome_message: String::new(),
            approved_message: String::new(),
            rejection_message: String::new(),
            interview_questions: BTreeMap::new(),
            archive: ArchiveSettings::default(),
            question_reply_timeout_secs: default_reply_timeout(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))
    }

    /// Write the settings back, via a temp file so a crash never leaves a
    /// half-written file behind.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Configured questions for a track (empty for tracks without questions).
    pub fn questions_for(&self, track: InterviewType) -> Vec<String> {
        self.interview_questions
            .get(&track)
            .cloned()
            .unwrap_or_default()
    }

    pub fn question_reply_timeout(&self) -> Duration {
        Duration::from_secs(self.question_reply_timeout_secs)
    }

    /// Fill a message template for a member.
    pub fn render(&self, template: &str, member: &Member) -> String {
        render_template(template, &self.guild_name, member)
    }
}

/// Substitute `{user}`, `{user.mention}`, `{user.name}`,
/// `{user.display_name}`, `{guild}` and `{guild.name}`.
pub fn render_template(template: &str, guild_name: &str, member: &Member) -> String {
    template
        .replace("{user.mention}", &member.mention())
        .replace("{user.display_name}", &member.display_name)
        .replace("{user.name}", &member.name)
        .replace("{user}", &member.mention())
        .replace("{guild.name}", guild_name)
        .replace("{guild}", guild_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::model::UserId;

    fn member() -> Member {
        Member {
            id: UserId(42),
            guild_id: GuildId(1),
            name: "alice".into(),
            display_name: "Alice".into(),
            avatar_url: None,
            bot: false,
            roles: vec![],
        }
    }

    #[test]
    fn archive_defaults() {
        let a = ArchiveSettings::default();
        assert_eq!(a.lead_time(), Duration::from_secs(300));
        assert_eq!(a.history_limit, 500);
        assert_eq!(a.relay_delay(), Duration::from_millis(750));
        assert_eq!(a.divider_interval(), chrono::Duration::minutes(5));
        assert_eq!(a.skip_leading_messages, 2);
    }

    #[test]
    fn template_substitution() {
        let out = render_template(
            "Welcome {user.mention} to {guild.name}! ({user.display_name})",
            "PN",
            &member(),
        );
        assert_eq!(out, "Welcome <@42> to PN! (Alice)");
    }

    #[test]
    fn settings_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guildSettings.json");

        let mut settings = GuildSettings::new(GuildId(7));
        settings
            .interview_questions
            .insert(InterviewType::NewSystem, vec!["Q1".into(), "Q2".into()]);
        settings.save(&path).unwrap();

        let loaded = GuildSettings::load(&path).unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(loaded.questions_for(InterviewType::NewSystem).len(), 2);
        assert!(loaded.questions_for(InterviewType::Other).is_empty());
    }

    #[test]
    fn minimal_json_uses_defaults() {
        let json = r#"{
            "guild_id": 1,
            "interview_category_id": 2,
            "archive_channel_id": 3,
            "log_channel_id": 4,
            "welcome_channel_id": 5,
            "team_role_id": 6,
            "member_role_id": 7,
            "interview_questions": {"new_tulpa": ["Why?"]}
        }"#;
        let settings: GuildSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.archive, ArchiveSettings::default());
        assert_eq!(settings.question_reply_timeout(), Duration::from_secs(21_600));
        assert_eq!(settings.questions_for(InterviewType::NewTulpa), vec!["Why?"]);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = GuildSettings::load(Path::new("/nonexistent/pnbot.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
