use crate::error::{StorageError, StorageResult};
use sqlx::ConnectOptions;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Where the credential database lives and how the pool is sized.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub database_path: String,

    /// The recognition path and one enrollment rarely need more than a few.
    pub max_connections: u32,

    pub acquire_timeout: Duration,

    /// How long a writer waits on a locked database before failing.
    pub busy_timeout: Duration,

    /// Apply pending migrations when the pool is opened.
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_path: "smartlocker.db".to_string(),
            max_connections: 4,
            acquire_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(10),
            auto_migrate: true,
        }
    }
}

impl DatabaseConfig {
    pub fn new(database_path: impl Into<String>) -> Self {
        Self {
            database_path: database_path.into(),
            ..Default::default()
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn auto_migrate(mut self, migrate: bool) -> Self {
        self.auto_migrate = migrate;
        self
    }

    fn connect_options(&self) -> StorageResult<SqliteConnectOptions> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", self.database_path))
            .map_err(|e| StorageError::Configuration(format!("Invalid database path: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(self.busy_timeout)
            .disable_statement_logging();
        Ok(options)
    }
}

fn ensure_parent_dir(database_path: &str) -> StorageResult<()> {
    let Some(parent) = Path::new(database_path).parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() || parent.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|e| {
        StorageError::Configuration(format!(
            "Failed to create {}: {e}",
            parent.display()
        ))
    })
}

/// Pooled handle on the credential database.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (and by default migrate) the credential database.
    ///
    /// The pool runs in WAL mode so lookups by the recognition path never wait
    /// on an enrollment write to another row.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use smartlocker_storage::connection::{Database, DatabaseConfig};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = DatabaseConfig::new("/var/lib/smartlocker/credentials.db")
    ///     .max_connections(4);
    ///
    /// let db = Database::new(config).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(config: DatabaseConfig) -> StorageResult<Self> {
        ensure_parent_dir(&config.database_path)?;

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(config.connect_options()?)
            .await?;

        let db = Self { pool };
        debug!(path = %config.database_path, "Credential database opened");

        if config.auto_migrate {
            db.migrate().await?;
        }
        Ok(db)
    }

    /// Private in-memory database for tests.
    ///
    /// One connection that never idles out, since closing it drops the data.
    pub async fn in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Run the embedded migrations from the workspace `migrations/` directory.
    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// The journal mode SQLite reports for this pool, lower-case.
    pub async fn journal_mode(&self) -> StorageResult<String> {
        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&self.pool)
            .await?;
        Ok(mode.to_ascii_lowercase())
    }
}
