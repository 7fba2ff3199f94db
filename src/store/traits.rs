//! `Database` trait: the narrow persistence surface the interview core uses.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::chat::model::{ChannelId, GuildId, UserId};
use crate::error::DatabaseError;
use crate::interview::InterviewType;

/// Primary key of a persisted interview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterviewKey {
    pub channel_id: ChannelId,
    pub member_id: UserId,
}

/// A persisted interview row.
///
/// `read_rules` is the projection of "at least one rule confirmation"; the
/// confirmation text itself is not stored.
#[derive(Debug, Clone, PartialEq)]
pub struct InterviewRow {
    pub guild_id: GuildId,
    pub member_id: UserId,
    pub channel_id: ChannelId,
    pub user_name: String,
    pub question_number: u32,
    pub interview_finished: bool,
    pub paused: bool,
    pub interview_type: InterviewType,
    pub read_rules: bool,
    pub join_timestamp: DateTime<Utc>,
}

impl InterviewRow {
    pub fn key(&self) -> InterviewKey {
        InterviewKey {
            channel_id: self.channel_id,
            member_id: self.member_id,
        }
    }
}

/// One mutable column with its new value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterviewField {
    QuestionNumber(u32),
    Finished(bool),
    Paused(bool),
    Type(InterviewType),
    ReadRules(bool),
}

impl InterviewField {
    pub fn column(&self) -> &'static str {
        match self {
            Self::QuestionNumber(_) => "question_number",
            Self::Finished(_) => "interview_finished",
            Self::Paused(_) => "paused",
            Self::Type(_) => "interview_type",
            Self::ReadRules(_) => "read_rules",
        }
    }
}

/// Backend-agnostic interview persistence.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Interviews ──────────────────────────────────────────────────

    async fn insert_interview(&self, row: &InterviewRow) -> Result<(), DatabaseError>;

    /// Update a single mutable column. One call per mutated field.
    async fn update_interview_field(
        &self,
        key: InterviewKey,
        field: InterviewField,
    ) -> Result<(), DatabaseError>;

    /// Rewrite every mutable column of an existing row.
    async fn update_interview_all(&self, row: &InterviewRow) -> Result<(), DatabaseError>;

    async fn delete_interview(&self, key: InterviewKey) -> Result<(), DatabaseError>;

    async fn list_all_interviews(&self) -> Result<Vec<InterviewRow>, DatabaseError>;
}
