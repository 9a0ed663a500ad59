use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Connection, SqliteConnection};

/// Builds options for a file-backed store. Every caller opens its own
/// connection from these and closes it when done; nothing is pooled.
pub fn connect_options(
    database_url: &str,
    timeout_secs: u64,
) -> Result<SqliteConnectOptions, sqlx::Error> {
    Ok(SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(timeout_secs.max(1))))
}

pub fn database_path(options: &SqliteConnectOptions) -> &Path {
    options.get_filename()
}

pub async fn open(options: &SqliteConnectOptions) -> Result<SqliteConnection, sqlx::Error> {
    SqliteConnection::connect_with(options).await
}

/// Read-only handle. SQLite rejects READONLY combined with CREATE, so the
/// file must already exist.
pub async fn open_read_only(
    options: &SqliteConnectOptions,
) -> Result<SqliteConnection, sqlx::Error> {
    let options = options.clone().create_if_missing(false).read_only(true);
    SqliteConnection::connect_with(&options).await
}

pub async fn close_quietly(conn: SqliteConnection) {
    if let Err(error) = conn.close().await {
        tracing::debug!(
            event_name = "store.connection.close_failed",
            error = %error,
            "sqlite connection did not close cleanly"
        );
    }
}
