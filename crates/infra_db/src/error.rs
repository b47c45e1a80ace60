//! Database error types

use thiserror::Error;

/// Errors raised by pool setup and migrations
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to establish a database connection
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Migration error
    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}
