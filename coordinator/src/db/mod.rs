use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

/// Open the coordinator database and run migrations.
///
/// File URLs (`sqlite:./foo.db`) get their parent directory created and run
/// in WAL mode. In-memory URLs (`sqlite::memory:`) get a single long-lived
/// connection, since every SQLite connection sees its own in-memory database.
pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let pool = if is_in_memory(database_url) {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(SqliteConnectOptions::from_str(database_url)?)
            .await?
    } else {
        // Resolve the file path and ensure the parent directory exists.
        // Handles both "sqlite:./foo.db" and "sqlite:../foo.db" forms.
        let file_path = database_url.strip_prefix("sqlite:").unwrap_or(database_url);

        let abs_path = std::env::current_dir()?.join(file_path);
        if let Some(parent) = abs_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(&abs_path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                // Concurrent participants write the same row; wait out the file lock
                // instead of surfacing SQLITE_BUSY. Version conflicts are handled above.
                .busy_timeout(Duration::from_secs(10)),
        )
        .await?
    };

    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

fn is_in_memory(database_url: &str) -> bool {
    let rest = database_url.strip_prefix("sqlite:").unwrap_or(database_url);
    let rest = rest.trim_start_matches("//");
    rest == ":memory:" || rest.starts_with(":memory:?") || rest.contains("mode=memory")
}
