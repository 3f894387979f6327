//! Registration repository: CRUD for the `registrations` table.
//!
//! Stateless; every method takes `&Connection`. Rows are unique per
//! [`IdentityKey`].

use relay_core::{IdentityKey, Registration};
use rusqlite::{Connection, OptionalExtension, params};

use crate::errors::Result;

const COLUMNS: &str = "id, instance_url, access_token, app_key, device_token, \
                       device_token_updated, last_update";

/// Result of [`RegistrationRepo::find_or_create`].
#[derive(Debug)]
pub struct FindOrCreate {
    /// The stored row.
    pub registration: Registration,
    /// Whether the row was inserted by this call.
    pub created: bool,
}

/// Registration repository.
pub struct RegistrationRepo;

impl RegistrationRepo {
    /// Return the row for `key`, inserting it first if absent.
    pub fn find_or_create(conn: &Connection, key: &IdentityKey) -> Result<FindOrCreate> {
        let now = chrono::Utc::now().to_rfc3339();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO registrations
                 (instance_url, access_token, app_key, device_token, last_update, created_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            params![
                key.instance_url,
                key.access_token,
                key.app_key,
                key.device_token,
                now
            ],
        )?;
        let registration = conn.query_row(
            &format!(
                "SELECT {COLUMNS} FROM registrations
                 WHERE instance_url = ?1 AND access_token = ?2
                   AND device_token = ?3 AND app_key = ?4"
            ),
            params![
                key.instance_url,
                key.access_token,
                key.device_token,
                key.app_key
            ],
            Self::map_row,
        )?;
        Ok(FindOrCreate {
            registration,
            created: inserted > 0,
        })
    }

    /// Look up the row for `key`.
    pub fn find(conn: &Connection, key: &IdentityKey) -> Result<Option<Registration>> {
        let row = conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM registrations
                     WHERE instance_url = ?1 AND access_token = ?2
                       AND device_token = ?3 AND app_key = ?4"
                ),
                params![
                    key.instance_url,
                    key.access_token,
                    key.device_token,
                    key.app_key
                ],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Get a row by id.
    pub fn get_by_id(conn: &Connection, id: i64) -> Result<Option<Registration>> {
        let row = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM registrations WHERE id = ?1"),
                params![id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Stamp `last_update`. Returns whether the row exists.
    pub fn touch(conn: &Connection, id: i64, last_update: i64) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE registrations SET last_update = ?1 WHERE id = ?2",
            params![last_update, id],
        )?;
        Ok(changed > 0)
    }

    /// Persist a gateway-supplied replacement delivery address.
    pub fn set_device_token_updated(
        conn: &Connection,
        id: i64,
        device_token_updated: &str,
        last_update: i64,
    ) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE registrations SET device_token_updated = ?1, last_update = ?2 WHERE id = ?3",
            params![device_token_updated, last_update, id],
        )?;
        Ok(changed > 0)
    }

    /// Delete a row. Deleting an absent row succeeds and returns `false`.
    pub fn delete(conn: &Connection, id: i64) -> Result<bool> {
        let changed = conn.execute("DELETE FROM registrations WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    /// Every stored row, oldest first.
    pub fn list_all(conn: &Connection) -> Result<Vec<Registration>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM registrations ORDER BY id"
        ))?;
        let rows = stmt
            .query_map([], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Number of stored rows.
    pub fn count(conn: &Connection) -> Result<i64> {
        let n = conn.query_row("SELECT COUNT(*) FROM registrations", [], |row| row.get(0))?;
        Ok(n)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Registration> {
        Ok(Registration {
            id: row.get(0)?,
            instance_url: row.get(1)?,
            access_token: row.get(2)?,
            app_key: row.get(3)?,
            device_token: row.get(4)?,
            device_token_updated: row.get(5)?,
            last_update: row.get(6)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
