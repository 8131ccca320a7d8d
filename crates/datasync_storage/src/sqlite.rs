//! SQLite-backed repository.

use crate::error::{StorageError, StorageResult};
use crate::repository::{assign_id, require_id, Repository};
use chrono::{DateTime, SecondsFormat, Utc};
use datasync_core::{TableData, TableError, TableResult, Version};
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const COLUMNS: &str = "id, updated_at, version, deleted, data";
const MAX_TABLE_NAME: usize = 64;

type RawRow = (String, String, Vec<u8>, bool, String);

/// A repository storing one table in SQLite.
///
/// Each entity is a row of `(id, updated_at, version, deleted, data)`, where
/// `data` holds the non-system properties as a JSON object. Writes are
/// conditional `UPDATE`/`DELETE` statements keyed on `(id, version)`; a
/// statement that touches no rows is re-read and reported as
/// `412 Precondition Failed` (or `404` if the row vanished).
///
/// Several repositories may share one database file, one table each.
#[derive(Debug)]
pub struct SqliteRepository {
    conn: Mutex<Connection>,
    table: String,
}

impl SqliteRepository {
    /// Opens (or creates) the database at `path` and the table `table`.
    ///
    /// # Errors
    ///
    /// Returns an error if the table name is invalid or SQLite fails.
    pub fn open(path: &Path, table: &str) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?, table)
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the table name is invalid or SQLite fails.
    pub fn open_in_memory(table: &str) -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?, table)
    }

    /// Wraps an existing connection, creating the table if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the table name is invalid or SQLite fails.
    pub fn from_connection(conn: Connection, table: &str) -> StorageResult<Self> {
        validate_table_name(table)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS \"{table}\" (
                id TEXT PRIMARY KEY NOT NULL,
                updated_at TEXT NOT NULL,
                version BLOB NOT NULL,
                deleted INTEGER NOT NULL DEFAULT 0,
                data TEXT NOT NULL
            );"
        ))?;
        info!(table, "sqlite table ready");
        Ok(Self {
            conn: Mutex::new(conn),
            table: table.to_string(),
        })
    }

    /// Returns the SQL table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    fn fetch(&self, conn: &Connection, id: &str) -> StorageResult<Option<TableData>> {
        let sql = format!("SELECT {COLUMNS} FROM \"{}\" WHERE id = ?1", self.table);
        conn.query_row(&sql, params![id], raw_row)
            .optional()?
            .map(decode)
            .transpose()
    }

    fn fetch_all(&self, conn: &Connection) -> StorageResult<Vec<TableData>> {
        let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM \"{}\"", self.table))?;
        let raw = stmt
            .query_map([], raw_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(decode).collect()
    }

    fn insert(&self, conn: &Connection, entity: &TableData) -> StorageResult<()> {
        let sql = format!(
            "INSERT INTO \"{}\" ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)",
            self.table
        );
        conn.execute(
            &sql,
            params![
                entity.id,
                encode_time(&entity.updated_at),
                entity.version.as_bytes(),
                entity.deleted,
                serde_json::to_string(&entity.properties)?,
            ],
        )?;
        Ok(())
    }

    fn update(&self, conn: &Connection, entity: &TableData, expected: &Version) -> StorageResult<usize> {
        let sql = format!(
            "UPDATE \"{}\" SET updated_at = ?1, version = ?2, deleted = ?3, data = ?4
             WHERE id = ?5 AND version = ?6",
            self.table
        );
        Ok(conn.execute(
            &sql,
            params![
                encode_time(&entity.updated_at),
                entity.version.as_bytes(),
                entity.deleted,
                serde_json::to_string(&entity.properties)?,
                entity.id,
                expected.as_bytes(),
            ],
        )?)
    }

    /// Explains why a conditional statement touched no rows.
    fn lost_write(&self, conn: &Connection, id: &str) -> TableError {
        match self.fetch(conn, id) {
            Ok(Some(current)) => {
                debug!(table = %self.table, id, "conditional write matched no rows");
                TableError::precondition_failed(current)
            }
            Ok(None) => TableError::NotFound,
            Err(e) => e.into(),
        }
    }
}

impl Repository for SqliteRepository {
    fn query(&self) -> TableResult<Vec<TableData>> {
        let conn = self.conn.lock();
        Ok(self.fetch_all(&conn)?)
    }

    fn create(&self, mut entity: TableData) -> TableResult<TableData> {
        assign_id(&mut entity);
        entity.stamp(None);
        let conn = self.conn.lock();
        match self.insert(&conn, &entity) {
            Ok(()) => Ok(entity),
            Err(StorageError::Sqlite(rusqlite::Error::SqliteFailure(failure, _)))
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                debug!(table = %self.table, id = %entity.id, "create conflict");
                let existing = self.fetch(&conn, &entity.id)?.ok_or(TableError::NotFound)?;
                Err(TableError::conflict(existing))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn read(&self, id: &str) -> TableResult<TableData> {
        require_id(id)?;
        let conn = self.conn.lock();
        self.fetch(&conn, id)?.ok_or(TableError::NotFound)
    }

    fn replace(&self, mut entity: TableData, version: Option<&Version>) -> TableResult<TableData> {
        require_id(&entity.id)?;
        let conn = self.conn.lock();
        let stored = self.fetch(&conn, &entity.id)?.ok_or(TableError::NotFound)?;
        let expected = match version {
            Some(v) if !v.is_empty() => v,
            _ => &stored.version,
        };
        entity.stamp(Some(&stored.updated_at));
        if self.update(&conn, &entity, expected)? == 0 {
            return Err(self.lost_write(&conn, &entity.id));
        }
        Ok(entity)
    }

    fn delete(&self, id: &str, version: Option<&Version>) -> TableResult<()> {
        require_id(id)?;
        let conn = self.conn.lock();
        let deleted = match version {
            Some(v) if !v.is_empty() => conn.execute(
                &format!("DELETE FROM \"{}\" WHERE id = ?1 AND version = ?2", self.table),
                params![id, v.as_bytes()],
            ),
            _ => conn.execute(
                &format!("DELETE FROM \"{}\" WHERE id = ?1", self.table),
                params![id],
            ),
        }
        .map_err(StorageError::from)?;
        if deleted == 0 {
            return Err(self.lost_write(&conn, id));
        }
        Ok(())
    }

    fn count(&self) -> TableResult<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM \"{}\"", self.table), [], |row| row.get(0))
            .map_err(StorageError::from)?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

/// Table names must be plain identifiers since they are spliced into SQL.
fn validate_table_name(name: &str) -> StorageResult<()> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.len() <= MAX_TABLE_NAME;
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidTableName(name.to_string()))
    }
}

fn raw_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn decode((id, updated_at, version, deleted, data): RawRow) -> StorageResult<TableData> {
    let updated_at = DateTime::parse_from_rfc3339(&updated_at)
        .map_err(|e| StorageError::Corrupted(format!("row '{id}': bad updated_at: {e}")))?
        .with_timezone(&Utc);
    let properties: Map<String, Value> = serde_json::from_str(&data)?;
    Ok(TableData {
        id,
        updated_at,
        version: Version::new(version),
        deleted,
        properties,
    })
}

fn encode_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}
