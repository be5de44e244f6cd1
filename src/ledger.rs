//! Durable storage for schedules, bookings and payments.
//!
//! Every capacity- or payment-affecting operation goes through
//! [`Ledger::transaction`], which opens `BEGIN IMMEDIATE`: the write lock is taken
//! before the first read, so a check made inside the closure still holds when the
//! closure writes. Concurrent callers block (up to the busy timeout) until the
//! holder commits or rolls back.

use diesel::connection::SimpleConnection;
use diesel::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use crate::error::BookingError;

// the migration path is relative to the `CARGO_MANIFEST_DIR`
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/");

pub type Pool = deadpool_diesel::sqlite::Pool;

#[derive(Clone)]
pub struct Ledger {
    pool: Pool,
    busy_timeout_ms: u64,
}

impl Ledger {
    pub fn connect(
        database_url: &str,
        max_size: usize,
        busy_timeout_ms: u64,
    ) -> Result<Self, BookingError> {
        let manager = deadpool_diesel::sqlite::Manager::new(
            database_url,
            deadpool_diesel::Runtime::Tokio1,
        );
        let pool = Pool::builder(manager)
            .max_size(max_size)
            .build()
            .map_err(|err| BookingError::Pool(err.to_string()))?;
        Ok(Self {
            pool,
            busy_timeout_ms,
        })
    }

    /// Switches the database to WAL and applies pending embedded migrations.
    pub async fn run_migrations(&self) -> Result<(), BookingError> {
        let conn = self.pool.get().await?;
        conn.interact(|conn| {
            conn.batch_execute("PRAGMA journal_mode = WAL;")
                .map_err(|err| BookingError::Pool(format!("migration failed: {err}")))?;
            conn.run_pending_migrations(MIGRATIONS)
                .map(|_| ())
                .map_err(|err| BookingError::Pool(format!("migration failed: {err}")))
        })
        .await?
    }

    /// Runs `f` inside one exclusive write transaction. Any `Err` rolls back
    /// everything `f` wrote.
    pub async fn transaction<T, F>(&self, f: F) -> Result<T, BookingError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, BookingError> + Send + 'static,
        T: Send + 'static,
    {
        let pragmas = self.session_pragmas();
        let conn = self.pool.get().await?;
        conn.interact(move |conn| {
            conn.batch_execute(&pragmas)?;
            conn.immediate_transaction(f)
        })
        .await?
    }

    /// Runs a read-only query outside any explicit transaction.
    pub async fn read<T, F>(&self, f: F) -> Result<T, BookingError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, BookingError> + Send + 'static,
        T: Send + 'static,
    {
        let pragmas = self.session_pragmas();
        let conn = self.pool.get().await?;
        conn.interact(move |conn| {
            conn.batch_execute(&pragmas)?;
            f(conn)
        })
        .await?
    }

    fn session_pragmas(&self) -> String {
        format!(
            "PRAGMA busy_timeout = {}; PRAGMA foreign_keys = ON;",
            self.busy_timeout_ms
        )
    }
}
