//! SQLCipher-backed entry access.
//!
//! [`EntryRepository`] is the single data-access seam of the crate: it turns
//! an [`EntryFilter`] into [`Entry`] values. [`SqlCipherRepository`] is the
//! production implementation over a read-only `rusqlite` connection to
//! `vault.enpassdb`.
//!
//! # Opening
//!
//! Enpass keys its store with a raw 32-byte key, so no SQLCipher KDF runs:
//!
//! ```text
//! PRAGMA key = "x'<64 hex digits>'";
//! PRAGMA cipher_compatibility = 3;
//! SELECT name FROM sqlite_master WHERE type='table' AND name='item';
//! ```
//!
//! A wrong key surfaces either as an error on the probe (`file is not a
//! database`) or as an empty result. Both are reported as
//! [`VaultError::InvalidCredentials`].

use std::path::Path;

use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, params_from_iter};
use zeroize::Zeroizing;

use crate::entry::Entry;
use crate::error::{Result, VaultError};
use crate::query::{self, ENTRY_COLUMNS, EntryFilter};

/// SQLCipher settings matching the Enpass 6 store.
const CIPHER_COMPATIBILITY: u32 = 3;

const PROBE_ITEM_TABLE: &str = "SELECT name FROM sqlite_master WHERE type='table' AND name='item'";

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Entries selected by one query, still encrypted, plus the order-by names
/// that were not usable.
#[derive(Debug, Default)]
pub struct QueryResult {
    pub entries: Vec<Entry>,
    pub ignored_order_fields: Vec<String>,
}

/// Read access to vault entries.
pub trait EntryRepository {
    /// Run `filter` and return the matching rows as entries. Password values
    /// are left encrypted.
    fn find_entries(&self, filter: &EntryFilter) -> Result<QueryResult>;

    /// Release the underlying handle.
    fn close(self) -> Result<()>
    where
        Self: Sized;
}

// ---------------------------------------------------------------------------
// Row binding
// ---------------------------------------------------------------------------

/// One row of the entry query, bound column by column.
#[derive(Debug)]
struct EntryRow {
    uuid: String,
    kind: Option<String>,
    created_at: Option<i64>,
    field_updated_at: Option<i64>,
    title: Option<String>,
    subtitle: Option<String>,
    note: Option<String>,
    trashed: Option<i64>,
    deleted: Option<i64>,
    category: Option<String>,
    label: Option<String>,
    value: Option<String>,
    key: Option<Vec<u8>>,
    last_used: Option<i64>,
    sensitive: Option<i64>,
    icon: Option<String>,
}

impl EntryRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            uuid: row.get(0)?,
            kind: row.get(1)?,
            created_at: row.get(2)?,
            field_updated_at: row.get(3)?,
            title: row.get(4)?,
            subtitle: row.get(5)?,
            note: row.get(6)?,
            trashed: row.get(7)?,
            deleted: row.get(8)?,
            category: row.get(9)?,
            label: row.get(10)?,
            value: row.get(11)?,
            key: row.get(12)?,
            last_used: row.get(13)?,
            sensitive: row.get(14)?,
            icon: row.get(15)?,
        })
    }
}

impl From<EntryRow> for Entry {
    fn from(row: EntryRow) -> Self {
        let mut entry = Entry::default().with_item_key(row.key.unwrap_or_default());
        entry.uuid = row.uuid;
        entry.kind = row.kind.unwrap_or_default();
        entry.created_at = row.created_at.unwrap_or_default();
        entry.updated_at = row.field_updated_at.unwrap_or_default();
        entry.last_used = row.last_used.unwrap_or_default();
        entry.title = row.title.unwrap_or_default();
        entry.subtitle = row.subtitle.unwrap_or_default();
        entry.note = row.note.unwrap_or_default();
        entry.category = row.category.unwrap_or_default();
        entry.label = row.label.unwrap_or_default();
        entry.icon = row.icon.unwrap_or_default();
        entry.trashed = row.trashed.unwrap_or_default();
        entry.deleted = row.deleted.unwrap_or_default();
        entry.sensitive = row.sensitive.unwrap_or_default() != 0;
        entry.raw_value = row.value.unwrap_or_default();
        entry
    }
}

fn check_columns(names: &[&str]) -> Result<()> {
    if names == ENTRY_COLUMNS {
        return Ok(());
    }
    Err(VaultError::UnexpectedSchema {
        reason: format!(
            "expected columns [{}], got [{}]",
            ENTRY_COLUMNS.join(", "),
            names.join(", ")
        ),
    })
}

// ---------------------------------------------------------------------------
// SQLCipher repository
// ---------------------------------------------------------------------------

/// Entry repository over an unlocked Enpass database.
pub struct SqlCipherRepository {
    conn: Connection,
}

impl SqlCipherRepository {
    /// Open `path` read-only and unlock it with the raw database key.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidCredentials`] if the file cannot be opened
    /// or does not look like an Enpass vault once keyed.
    pub fn open(path: &Path, database_key: &[u8]) -> Result<Self> {
        tracing::debug!(path = %path.display(), "opening vault database");

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| {
            tracing::debug!(error = %e, "could not open database file");
            VaultError::InvalidCredentials
        })?;

        apply_key(&conn, database_key).map_err(|e| {
            tracing::debug!(error = %e, "could not apply database key");
            VaultError::InvalidCredentials
        })?;

        let probe: Option<String> = conn
            .query_row(PROBE_ITEM_TABLE, [], |row| row.get(0))
            .optional()
            .map_err(|e| {
                tracing::debug!(error = %e, "vault probe failed");
                VaultError::InvalidCredentials
            })?;
        if probe.is_none() {
            tracing::debug!("vault probe found no item table");
            return Err(VaultError::InvalidCredentials);
        }

        tracing::info!("vault database unlocked");
        Ok(Self { conn })
    }

    /// Wrap an already opened connection. The schema is not checked until
    /// the first query.
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }
}

/// Key a fresh SQLCipher connection with a raw key.
pub fn apply_key(conn: &Connection, database_key: &[u8]) -> rusqlite::Result<()> {
    let pragmas = Zeroizing::new(format!(
        "PRAGMA key = \"x'{}'\"; PRAGMA cipher_compatibility = {CIPHER_COMPATIBILITY};",
        hex::encode(database_key)
    ));
    conn.execute_batch(&pragmas)
}

impl EntryRepository for SqlCipherRepository {
    fn find_entries(&self, filter: &EntryFilter) -> Result<QueryResult> {
        let built = query::build(filter);
        let mut stmt = self.conn.prepare(&built.sql)?;
        check_columns(&stmt.column_names())?;

        let rows = stmt.query_map(params_from_iter(built.params.iter()), EntryRow::from_row)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(Entry::from(row?));
        }

        tracing::debug!(
            count = entries.len(),
            ignored_order_fields = built.ignored_order_fields.len(),
            "queried vault entries"
        );
        Ok(QueryResult {
            entries,
            ignored_order_fields: built.ignored_order_fields,
        })
    }

    fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| VaultError::Database(e))?;
        tracing::debug!("vault database closed");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Test fixtures
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    const GITHUB: &str = "a2ec30c0-aeed-41f7-aed7-cc50e69ff506";
    const GITLAB: &str = "0b3a4c1e-7d2f-4b8a-9c6d-1e2f3a4b5c6d";
    const BANK: &str = "f0e1d2c3-b4a5-4968-8776-655443322110";

    fn repository() -> SqlCipherRepository {
        let conn = memory_vault();
        let key = add_item(&conn, GITHUB, "GitHub", "alice", "login");
        add_field(&conn, GITHUB, &key, "password", "Password", "S3cr3t!");
        add_field(&conn, GITHUB, &key, "username", "Username", "alice");
        let key = add_item(&conn, GITLAB, "GitLab", "alice_w", "login");
        add_field(&conn, GITLAB, &key, "password", "Password", "hunter2");
        let key = add_item(&conn, BANK, "Bank", "bob", "finance");
        add_field(&conn, BANK, &key, "password", "PIN", "0000");
        SqlCipherRepository::from_connection(conn)
    }

    fn titles(result: &QueryResult) -> Vec<&str> {
        result.entries.iter().map(|e| e.title.as_str()).collect()
    }

    #[test]
    fn default_filter_returns_password_fields() {
        let repo = repository();
        let result = repo.find_entries(&EntryFilter::default()).unwrap();
        assert_eq!(result.entries.len(), 3);
        assert!(result.entries.iter().all(|e| e.kind == "password"));
        assert!(result.entries.iter().all(|e| !e.raw_value.is_empty()));
    }

    #[test]
    fn row_binding_fills_every_field() {
        let repo = repository();
        let filter = EntryFilter {
            uuids: vec![GITHUB.into()],
            ..EntryFilter::default()
        };
        let entry = repo.find_entries(&filter).unwrap().entries.remove(0);
        assert_eq!(entry.uuid, GITHUB);
        assert_eq!(entry.subtitle, "alice");
        assert_eq!(entry.category, "login");
        assert_eq!(entry.label, "Password");
        assert_eq!(entry.created_at, 1_600_000_000);
        assert_eq!(entry.updated_at, 1_600_000_100);
        assert_eq!(entry.last_used, 1_600_000_200);
        assert!(entry.sensitive);
    }

    #[test]
    fn or_within_and_across_classes() {
        let repo = repository();
        let filter = EntryFilter {
            titles: vec!["GitHub".into(), "Bank".into()],
            categories: vec!["login".into()],
            order_by: vec!["title".into()],
            ..EntryFilter::default()
        };
        let result = repo.find_entries(&filter).unwrap();
        assert_eq!(titles(&result), vec!["GitHub"]);
    }

    #[test]
    fn case_insensitive_match_by_default() {
        let repo = repository();
        let filter = EntryFilter {
            titles: vec!["github".into()],
            ..EntryFilter::default()
        };
        assert_eq!(repo.find_entries(&filter).unwrap().entries.len(), 1);

        let filter = EntryFilter {
            case_sensitive: true,
            ..filter
        };
        assert!(repo.find_entries(&filter).unwrap().entries.is_empty());
    }

    #[test]
    fn like_wildcard_treats_underscore_literally() {
        let repo = repository();
        let filter = EntryFilter {
            logins: vec!["alice_%".into()],
            ..EntryFilter::default()
        };
        let result = repo.find_entries(&filter).unwrap();
        assert_eq!(titles(&result), vec!["GitLab"]);
    }

    #[test]
    fn glob_wildcard_is_case_sensitive() {
        let repo = repository();
        let filter = EntryFilter {
            titles: vec!["Git%".into()],
            case_sensitive: true,
            order_by: vec!["title".into()],
            ..EntryFilter::default()
        };
        let result = repo.find_entries(&filter).unwrap();
        assert_eq!(titles(&result), vec!["GitHub", "GitLab"]);

        let filter = EntryFilter {
            titles: vec!["git%".into()],
            ..filter
        };
        assert!(repo.find_entries(&filter).unwrap().entries.is_empty());
    }

    #[test]
    fn deleted_rows_are_excluded_trashed_are_kept() {
        let repo = repository();
        set_flag(&repo.conn, GITLAB, "deleted", 1);
        set_flag(&repo.conn, BANK, "trashed", 1);

        let filter = EntryFilter {
            order_by: vec!["title".into()],
            ..EntryFilter::default()
        };
        let result = repo.find_entries(&filter).unwrap();
        assert_eq!(titles(&result), vec!["Bank", "GitHub"]);
    }

    #[test]
    fn unknown_order_fields_are_reported() {
        let repo = repository();
        let filter = EntryFilter {
            order_by: vec!["bogus".into(), "title".into()],
            ..EntryFilter::default()
        };
        let result = repo.find_entries(&filter).unwrap();
        assert_eq!(result.ignored_order_fields, vec!["bogus"]);
        assert_eq!(titles(&result), vec!["Bank", "GitHub", "GitLab"]);
    }

    #[test]
    fn empty_kind_returns_all_field_types() {
        let repo = repository();
        let filter = EntryFilter {
            uuids: vec![GITHUB.into()],
            ..EntryFilter::of_kind("")
        };
        assert_eq!(repo.find_entries(&filter).unwrap().entries.len(), 2);
    }

    #[test]
    fn column_mismatch_is_unexpected_schema() {
        let result = check_columns(&["uuid", "type"]);
        assert!(matches!(result, Err(VaultError::UnexpectedSchema { .. })));
        assert!(check_columns(&ENTRY_COLUMNS).is_ok());
    }

    #[test]
    fn missing_tables_surface_as_database_error() {
        let repo = SqlCipherRepository::from_connection(Connection::open_in_memory().unwrap());
        let result = repo.find_entries(&EntryFilter::default());
        assert!(matches!(result, Err(VaultError::Database(_))));
    }

    #[test]
    fn open_rejects_a_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.enpassdb");
        std::fs::write(&path, vec![0x42u8; 4096]).unwrap();
        let result = SqlCipherRepository::open(&path, &[0u8; 32]);
        assert!(matches!(result, Err(VaultError::InvalidCredentials)));
    }

    #[test]
    fn close_releases_connection() {
        repository().close().unwrap();
    }
}
