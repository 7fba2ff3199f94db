//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::chat::model::{ChannelId, GuildId, UserId};
use crate::error::DatabaseError;
use crate::interview::InterviewType;
use crate::store::migrations;
use crate::store::traits::{Database, InterviewField, InterviewKey, InterviewRow};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Snowflakes fit in 63 bits, so the cast round-trips.
fn id_to_sql(id: u64) -> i64 {
    id as i64
}

fn id_from_sql(id: i64) -> u64 {
    id as u64
}

const INTERVIEW_COLUMNS: &str = "guild_id, member_id, channel_id, user_name, question_number, \
     interview_finished, paused, interview_type, read_rules, join_timestamp";

fn row_to_interview(row: &libsql::Row) -> Result<InterviewRow, DatabaseError> {
    let col = |e: libsql::Error| DatabaseError::Query(format!("row_to_interview: {e}"));

    let guild_id: i64 = row.get(0).map_err(col)?;
    let member_id: i64 = row.get(1).map_err(col)?;
    let channel_id: i64 = row.get(2).map_err(col)?;
    let user_name: String = row.get(3).map_err(col)?;
    let question_number: i64 = row.get(4).map_err(col)?;
    let interview_finished: i64 = row.get(5).map_err(col)?;
    let paused: i64 = row.get(6).map_err(col)?;
    let type_str: String = row.get(7).map_err(col)?;
    let read_rules: i64 = row.get(8).map_err(col)?;
    let joined_str: String = row.get(9).map_err(col)?;

    let interview_type: InterviewType = type_str.parse().map_err(|_| {
        DatabaseError::Serialization(format!("unknown interview_type '{type_str}'"))
    })?;

    Ok(InterviewRow {
        guild_id: GuildId(id_from_sql(guild_id)),
        member_id: UserId(id_from_sql(member_id)),
        channel_id: ChannelId(id_from_sql(channel_id)),
        user_name,
        question_number: u32::try_from(question_number.max(0)).unwrap_or(u32::MAX),
        interview_finished: interview_finished != 0,
        paused: paused != 0,
        interview_type,
        read_rules: read_rules != 0,
        join_timestamp: parse_datetime(&joined_str),
    })
}

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Interviews ──────────────────────────────────────────────────

    async fn insert_interview(&self, row: &InterviewRow) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT OR REPLACE INTO interviews ({INTERVIEW_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                params![
                    id_to_sql(row.guild_id.get()),
                    id_to_sql(row.member_id.get()),
                    id_to_sql(row.channel_id.get()),
                    row.user_name.clone(),
                    i64::from(row.question_number),
                    row.interview_finished as i64,
                    row.paused as i64,
                    row.interview_type.as_str(),
                    row.read_rules as i64,
                    row.join_timestamp.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_interview: {e}")))?;

        debug!(
            member_id = %row.member_id,
            channel_id = %row.channel_id,
            "Interview row inserted"
        );
        Ok(())
    }

    async fn update_interview_field(
        &self,
        key: InterviewKey,
        field: InterviewField,
    ) -> Result<(), DatabaseError> {
        let sql = format!(
            "UPDATE interviews SET {} = ?1 WHERE channel_id = ?2 AND member_id = ?3",
            field.column()
        );
        let channel = id_to_sql(key.channel_id.get());
        let member = id_to_sql(key.member_id.get());

        let result = match field {
            InterviewField::QuestionNumber(n) => {
                self.conn()
                    .execute(&sql, params![i64::from(n), channel, member])
                    .await
            }
            InterviewField::Finished(v) | InterviewField::Paused(v) | InterviewField::ReadRules(v) => {
                self.conn()
                    .execute(&sql, params![v as i64, channel, member])
                    .await
            }
            InterviewField::Type(t) => {
                self.conn()
                    .execute(&sql, params![t.as_str(), channel, member])
                    .await
            }
        };

        let affected = result.map_err(|e| {
            DatabaseError::Query(format!("update_interview_field({}): {e}", field.column()))
        })?;
        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "interview".into(),
                id: format!("{}/{}", key.channel_id, key.member_id),
            });
        }
        Ok(())
    }

    async fn update_interview_all(&self, row: &InterviewRow) -> Result<(), DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE interviews SET question_number = ?1, interview_finished = ?2, paused = ?3, \
                 interview_type = ?4, read_rules = ?5 WHERE channel_id = ?6 AND member_id = ?7",
                params![
                    i64::from(row.question_number),
                    row.interview_finished as i64,
                    row.paused as i64,
                    row.interview_type.as_str(),
                    row.read_rules as i64,
                    id_to_sql(row.channel_id.get()),
                    id_to_sql(row.member_id.get()),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_interview_all: {e}")))?;

        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "interview".into(),
                id: format!("{}/{}", row.channel_id, row.member_id),
            });
        }
        Ok(())
    }

    async fn delete_interview(&self, key: InterviewKey) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "DELETE FROM interviews WHERE channel_id = ?1 AND member_id = ?2",
                params![
                    id_to_sql(key.channel_id.get()),
                    id_to_sql(key.member_id.get())
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_interview: {e}")))?;
        Ok(())
    }

    async fn list_all_interviews(&self) -> Result<Vec<InterviewRow>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {INTERVIEW_COLUMNS} FROM interviews ORDER BY join_timestamp ASC"),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_all_interviews: {e}")))?;

        let mut interviews = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_all_interviews row: {e}")))?
        {
            interviews.push(row_to_interview(&row)?);
        }
        Ok(interviews)
    }
}
