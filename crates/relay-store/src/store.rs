//! The [`RegistrationStore`] trait and its pooled `SQLite` implementation.

use relay_core::{IdentityKey, Registration};
use tracing::instrument;

use crate::connection::ConnectionPool;
use crate::errors::Result;
use crate::migrations::run_migrations;
use crate::repository::RegistrationRepo;

pub use crate::repository::FindOrCreate;

/// Durable registration table, as seen by the runtime and the HTTP layer.
///
/// Calls are short and synchronous; none of them are held across an await.
pub trait RegistrationStore: Send + Sync {
    /// Return the row for `key`, creating it if absent.
    fn find_or_create(&self, key: &IdentityKey) -> Result<FindOrCreate>;

    /// Look up the row for `key`.
    fn find(&self, key: &IdentityKey) -> Result<Option<Registration>>;

    /// Stamp `last_update` (epoch millis).
    fn touch(&self, id: i64, last_update: i64) -> Result<bool>;

    /// Persist a replacement delivery address; identity is unchanged.
    fn set_device_token_updated(&self, id: i64, device_token_updated: &str) -> Result<bool>;

    /// Delete a row. Absent rows return `Ok(false)`.
    fn delete(&self, id: i64) -> Result<bool>;

    /// Every stored row.
    fn list_all(&self) -> Result<Vec<Registration>>;
}

/// [`RegistrationStore`] backed by an `r2d2` `SQLite` pool.
#[derive(Clone)]
pub struct SqliteRegistrationStore {
    pool: ConnectionPool,
}

impl SqliteRegistrationStore {
    /// Wrap `pool`, applying pending migrations first.
    pub fn open(pool: ConnectionPool) -> Result<Self> {
        {
            let conn = pool.get()?;
            let _ = run_migrations(&conn)?;
        }
        Ok(Self { pool })
    }

    /// Number of stored rows.
    pub fn count(&self) -> Result<i64> {
        let conn = self.pool.get()?;
        RegistrationRepo::count(&conn)
    }
}

impl RegistrationStore for SqliteRegistrationStore {
    #[instrument(skip_all, fields(key = %key))]
    fn find_or_create(&self, key: &IdentityKey) -> Result<FindOrCreate> {
        let conn = self.pool.get()?;
        RegistrationRepo::find_or_create(&conn, key)
    }

    fn find(&self, key: &IdentityKey) -> Result<Option<Registration>> {
        let conn = self.pool.get()?;
        RegistrationRepo::find(&conn, key)
    }

    fn touch(&self, id: i64, last_update: i64) -> Result<bool> {
        let conn = self.pool.get()?;
        RegistrationRepo::touch(&conn, id, last_update)
    }

    fn set_device_token_updated(&self, id: i64, device_token_updated: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        let now = chrono::Utc::now().timestamp_millis();
        RegistrationRepo::set_device_token_updated(&conn, id, device_token_updated, now)
    }

    fn delete(&self, id: i64) -> Result<bool> {
        let conn = self.pool.get()?;
        RegistrationRepo::delete(&conn, id)
    }

    fn list_all(&self) -> Result<Vec<Registration>> {
        let conn = self.pool.get()?;
        RegistrationRepo::list_all(&conn)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
