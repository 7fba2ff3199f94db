//! Error types for PNBot.

use std::time::Duration;

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),

    #[error("UI error: {0}")]
    Ui(#[from] UiError),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors from the chat platform (REST, gateway, or in-memory backend).
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Missing permission for {action}")]
    Forbidden { action: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: String, id: String },

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Failed to send to channel {channel}: {reason}")]
    SendFailed { channel: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Gateway error: {0}")]
    Gateway(String),
}

impl ChatError {
    /// Failures that best-effort cleanup (reaction stripping, message
    /// deletion) is allowed to swallow.
    pub fn is_best_effort(&self) -> bool {
        matches!(self, Self::Forbidden { .. } | Self::NotFound { .. })
    }
}

/// Permission preconditions of an interactive page.
#[derive(Debug, thiserror::Error)]
pub enum UiError {
    #[error("Bot cannot send messages in this channel.")]
    CannotSendMessages,

    #[error("Bot does not have embed links permission in this channel.")]
    CannotEmbedLinks,

    #[error(
        "Insufficient permissions to add reactions to user interface! Please have an admin add the \
         **Add Reactions** and **Read Message History** permissions to this bot."
    )]
    CannotAddReactions,

    #[error(
        "The bot is missing the **Use External Emojis** permission! Please have an admin add it \
         for this channel."
    )]
    CannotAddExternalReactions,
}

/// Archival failures. The archive slot is always released before these
/// propagate.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Archive channel is not configured or could not be resolved")]
    NoArchiveChannel,

    #[error("Interview channel {0} has no history to archive")]
    EmptyHistory(String),

    #[error("Archival of channel {channel} failed: {source}")]
    Relay {
        channel: String,
        #[source]
        source: ChatError,
    },
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_effort_classification() {
        assert!(
            ChatError::Forbidden {
                action: "remove_reaction".into()
            }
            .is_best_effort()
        );
        assert!(
            ChatError::NotFound {
                entity: "message".into(),
                id: "1".into()
            }
            .is_best_effort()
        );
        assert!(!ChatError::Http("boom".into()).is_best_effort());
        assert!(!ChatError::RateLimited { retry_after: None }.is_best_effort());
    }

    #[test]
    fn errors_convert_into_top_level() {
        let err: Error = UiError::CannotAddReactions.into();
        assert!(matches!(err, Error::Ui(UiError::CannotAddReactions)));
        let err: Error = DatabaseError::Query("x".into()).into();
        assert!(err.to_string().starts_with("Database error"));
    }
}
