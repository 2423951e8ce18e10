//! SQLite catalog store
//!
//! Default backing for the catalog interface. The schema is two tables:
//! parent groups keyed by reference name, and points keyed by normalized
//! name. `connect` opens a fresh connection and applies the schema, so a
//! new catalog file is usable immediately.

use super::{
    CatalogBackend, CatalogError, CatalogRecord, CatalogSession, ParentGroup, RecordDraft,
};
use crate::config::PointKind;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS parent_groups (
    id           INTEGER PRIMARY KEY,
    name         TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS points (
    id          INTEGER PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,
    alias       TEXT NOT NULL,
    parent_id   INTEGER NOT NULL REFERENCES parent_groups(id),
    seq         INTEGER NOT NULL,
    adder       REAL NOT NULL,
    multiplier  REAL NOT NULL,
    description TEXT NOT NULL,
    kind        TEXT NOT NULL
);
";

/// File-backed SQLite catalog; opens one connection per session
#[derive(Debug, Clone)]
pub struct SqliteCatalog {
    path: PathBuf,
}

impl SqliteCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl CatalogBackend for SqliteCatalog {
    fn connect(&self) -> Result<Box<dyn CatalogSession>, CatalogError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CatalogError::Store(format!("create catalog dir: {}", e)))?;
        }

        let conn = Connection::open(&self.path)?;
        Ok(Box::new(SqliteSession::init(conn)?))
    }
}

/// One open connection onto the SQLite catalog
pub struct SqliteSession {
    conn: Connection,
}

impl SqliteSession {
    fn init(conn: Connection) -> Result<Self, CatalogError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// In-memory catalog session, used by tests
    pub fn in_memory() -> Result<Self, CatalogError> {
        Self::init(Connection::open_in_memory()?)
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<(CatalogRecord, String)> {
    let kind_text: String = row.get(8)?;
    Ok((
        CatalogRecord {
            id: row.get(0)?,
            name: row.get(1)?,
            alias: row.get(2)?,
            parent_id: row.get(3)?,
            sequence_index: row.get(4)?,
            adder: row.get(5)?,
            multiplier: row.get(6)?,
            description: row.get(7)?,
            kind: PointKind::Analog,
        },
        kind_text,
    ))
}

fn parse_kind(record: CatalogRecord, kind_text: &str) -> Result<CatalogRecord, CatalogError> {
    let kind: PointKind = kind_text
        .parse()
        .map_err(|e: String| CatalogError::Corrupt(e))?;
    Ok(CatalogRecord { kind, ..record })
}

const SELECT_POINT: &str =
    "SELECT id, name, alias, parent_id, seq, adder, multiplier, description, kind
     FROM points WHERE name = ?1";

impl CatalogSession for SqliteSession {
    fn resolve_parent(
        &mut self,
        name: &str,
        display_name: &str,
    ) -> Result<ParentGroup, CatalogError> {
        let existing: Option<(i64, String)> = self
            .conn
            .query_row(
                "SELECT id, display_name FROM parent_groups WHERE name = ?1",
                params![name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let id = match existing {
            Some((id, stored_display)) => {
                // Reference name is the identity; the display name follows it
                if stored_display != display_name {
                    self.conn.execute(
                        "UPDATE parent_groups SET display_name = ?1 WHERE id = ?2",
                        params![display_name, id],
                    )?;
                }
                id
            }
            None => {
                self.conn.execute(
                    "INSERT INTO parent_groups (name, display_name) VALUES (?1, ?2)",
                    params![name, display_name],
                )?;
                self.conn.last_insert_rowid()
            }
        };

        Ok(ParentGroup {
            id,
            name: name.to_string(),
            display_name: display_name.to_string(),
        })
    }

    fn find_by_name(&mut self, name: &str) -> Result<Option<CatalogRecord>, CatalogError> {
        let found = self
            .conn
            .query_row(SELECT_POINT, params![name], record_from_row)
            .optional()?;

        match found {
            Some((record, kind_text)) => Ok(Some(parse_kind(record, &kind_text)?)),
            None => Ok(None),
        }
    }

    fn create_or_update(&mut self, draft: &RecordDraft) -> Result<CatalogRecord, CatalogError> {
        // seq is set on insert only; upserts never renumber a point
        self.conn.execute(
            "INSERT INTO points (name, alias, parent_id, seq, adder, multiplier, description, kind)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(name) DO UPDATE SET
                 alias = excluded.alias,
                 parent_id = excluded.parent_id,
                 adder = excluded.adder,
                 multiplier = excluded.multiplier,
                 description = excluded.description,
                 kind = excluded.kind",
            params![
                draft.name,
                draft.alias,
                draft.parent_id,
                draft.sequence_index,
                draft.adder,
                draft.multiplier,
                draft.description,
                draft.kind.to_string(),
            ],
        )?;

        let (record, kind_text) = self
            .conn
            .query_row(SELECT_POINT, params![draft.name], record_from_row)?;
        parse_kind(record, &kind_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: &str, seq: i64, parent_id: i64) -> RecordDraft {
        RecordDraft {
            name: name.to_string(),
            alias: name.to_lowercase(),
            parent_id,
            sequence_index: seq,
            adder: 0.0,
            multiplier: 1_000_000.0,
            description: "limit threshold".to_string(),
            kind: PointKind::Analog,
        }
    }

    #[test]
    fn test_resolve_parent_creates_then_reuses() {
        let mut session = SqliteSession::in_memory().unwrap();

        let first = session.resolve_parent("LIMITS!plant7", "Plant 7").unwrap();
        let second = session.resolve_parent("LIMITS!plant7", "Plant 7").unwrap();

        assert_eq!(first.id, second.id);
    }

    #[test]
    fn test_parent_display_rename_keeps_identity() {
        let mut session = SqliteSession::in_memory().unwrap();

        let first = session.resolve_parent("LIMITS!plant7", "Plant 7").unwrap();
        let renamed = session
            .resolve_parent("LIMITS!plant7", "Plant Seven")
            .unwrap();

        assert_eq!(first.id, renamed.id);
        assert_eq!(renamed.display_name, "Plant Seven");
    }

    #[test]
    fn test_create_then_find() {
        let mut session = SqliteSession::in_memory().unwrap();
        let parent = session.resolve_parent("LIMITS!t", "t").unwrap();

        assert!(session.find_by_name("A.B.HIGHALERT").unwrap().is_none());

        let created = session
            .create_or_update(&draft("A.B.HIGHALERT", 1, parent.id))
            .unwrap();
        let found = session.find_by_name("A.B.HIGHALERT").unwrap().unwrap();

        assert_eq!(created, found);
        assert_eq!(found.sequence_index, 1);
        assert_eq!(found.kind, PointKind::Analog);
    }

    #[test]
    fn test_upsert_refreshes_attributes_not_sequence() {
        let mut session = SqliteSession::in_memory().unwrap();
        let parent = session.resolve_parent("LIMITS!t", "t").unwrap();

        let first = session
            .create_or_update(&draft("A.B.HIGHALERT", 7, parent.id))
            .unwrap();

        let mut changed = draft("A.B.HIGHALERT", 99, parent.id);
        changed.multiplier = 1.0;
        changed.description = "updated".to_string();
        let second = session.create_or_update(&changed).unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.sequence_index, 7);
        assert_eq!(second.multiplier, 1.0);
        assert_eq!(second.description, "updated");
    }
}
