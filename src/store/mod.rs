//! Persistence layer: SQLite-backed storage for interviews.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{Database, InterviewField, InterviewKey, InterviewRow};
