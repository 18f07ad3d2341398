//! `SQLite` corpus registry: schema, pragmas, migrations and enablement records.

use std::path::Path;
use std::time::Duration;
use std::fs;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};

use crate::corpus::{CorpusState, EnablementStore, StoreError};
use crate::model::Domain;

const SCHEMA_VERSION: i64 = 2;

const MIGRATION_V1: &str = r"
CREATE TABLE IF NOT EXISTS corpora (
    id TEXT NOT NULL,
    domain TEXT NOT NULL,
    name TEXT NOT NULL DEFAULT '',
    enabled INTEGER,
    description TEXT NOT NULL DEFAULT '',
    PRIMARY KEY (id, domain)
);
CREATE INDEX IF NOT EXISTS idx_corpora_domain ON corpora(domain);
";

const MIGRATION_V2: &str = r"
ALTER TABLE corpora ADD COLUMN license_url TEXT;
ALTER TABLE corpora ADD COLUMN updated_at INTEGER NOT NULL DEFAULT 0;
";

/// One row of the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusRecord {
    pub id: String,
    pub domain: Domain,
    pub name: String,
    /// `None` until an operator decides; treated as enabled.
    pub enabled: Option<bool>,
    pub description: String,
    pub license_url: Option<String>,
}

impl CorpusRecord {
    pub fn new(id: impl Into<String>, domain: Domain) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            domain,
            enabled: None,
            description: String::new(),
            license_url: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_license_url(mut self, url: impl Into<String>) -> Self {
        self.license_url = Some(url.into());
        self
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let domain: String = row.get(1)?;
        let domain = domain.parse::<Domain>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, e.into())
        })?;
        Ok(Self {
            id: row.get(0)?,
            domain,
            name: row.get(2)?,
            enabled: row.get(3)?,
            description: row.get(4)?,
            license_url: row.get(5)?,
        })
    }
}

/// Corpus records and their enablement flags.
pub struct CorpusRegistry {
    conn: Mutex<Connection>,
}

impl CorpusRegistry {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating registry directory {}", parent.display()))?;
        }

        let mut conn = Connection::open(path)
            .with_context(|| format!("opening corpus registry at {}", path.display()))?;

        apply_pragmas(&conn)?;
        migrate(&mut conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory().context("opening in-memory registry")?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert or replace a record, keyed by `(id, domain)`.
    pub fn upsert(&self, record: &CorpusRecord) -> Result<(), StoreError> {
        self.conn.lock().execute(
            "INSERT INTO corpora (id, domain, name, enabled, description, license_url, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, strftime('%s','now'))
             ON CONFLICT(id, domain) DO UPDATE SET
                name = excluded.name,
                enabled = excluded.enabled,
                description = excluded.description,
                license_url = excluded.license_url,
                updated_at = excluded.updated_at",
            params![
                record.id,
                record.domain.as_str(),
                record.name,
                record.enabled,
                record.description,
                record.license_url,
            ],
        )?;
        Ok(())
    }

    /// Set the explicit flag, creating a bare record when the corpus is new.
    pub fn set_enabled(&self, domain: Domain, id: &str, enabled: bool) -> Result<(), StoreError> {
        self.conn.lock().execute(
            "INSERT INTO corpora (id, domain, name, enabled, updated_at)
             VALUES (?1, ?2, ?1, ?3, strftime('%s','now'))
             ON CONFLICT(id, domain) DO UPDATE SET
                enabled = excluded.enabled,
                updated_at = excluded.updated_at",
            params![id, domain.as_str(), enabled],
        )?;
        tracing::info!(domain = %domain, corpus = id, enabled, "corpus_enablement_changed");
        Ok(())
    }

    pub fn get(&self, domain: Domain, id: &str) -> Result<Option<CorpusRecord>, StoreError> {
        let record = self
            .conn
            .lock()
            .query_row(
                "SELECT id, domain, name, enabled, description, license_url
                 FROM corpora WHERE id = ?1 AND domain = ?2",
                params![id, domain.as_str()],
                CorpusRecord::from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn list(&self, domain: Domain) -> Result<Vec<CorpusRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, domain, name, enabled, description, license_url
             FROM corpora WHERE domain = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![domain.as_str()], CorpusRecord::from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

impl EnablementStore for CorpusRegistry {
    fn corpus_states(&self, domain: Domain) -> Result<Vec<CorpusState>, StoreError> {
        Ok(self
            .list(domain)?
            .into_iter()
            .map(|r| CorpusState {
                id: r.id,
                enabled: r.enabled,
            })
            .collect())
    }
}

fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.execute_batch(
        r"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        ",
    )?;
    Ok(())
}

fn schema_version(conn: &Connection) -> Result<i64> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS meta (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
        [],
    )?;
    let current = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get::<_, String>(0).map(|s| s.parse().unwrap_or(0)),
        )
        .optional()?
        .unwrap_or(0);
    Ok(current)
}

fn migrate(conn: &mut Connection) -> Result<()> {
    let current = schema_version(conn)?;
    if current == SCHEMA_VERSION {
        return Ok(());
    }
    if current > SCHEMA_VERSION {
        anyhow::bail!(
            "corpus registry schema {current} is newer than supported {SCHEMA_VERSION}"
        );
    }

    let tx = conn.transaction()?;
    if current < 1 {
        tx.execute_batch(MIGRATION_V1)?;
    }
    if current < 2 {
        tx.execute_batch(MIGRATION_V2)?;
    }
    tx.execute(
        "INSERT INTO meta(key, value) VALUES('schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![SCHEMA_VERSION.to_string()],
    )?;
    tx.commit()?;
    tracing::debug!(from = current, to = SCHEMA_VERSION, "corpus registry migrated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_registry() -> (CorpusRegistry, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("registry.db");
        let registry = CorpusRegistry::open(&path).unwrap();
        (registry, dir)
    }

    #[test]
    fn upsert_and_get() {
        let (registry, _dir) = test_registry();
        let record = CorpusRecord::new("folk", Domain::Xml)
            .with_name("Folk songs")
            .with_license_url("https://example.org/license");
        registry.upsert(&record).unwrap();

        let loaded = registry.get(Domain::Xml, "folk").unwrap().unwrap();
        assert_eq!(loaded, record);
        assert!(registry.get(Domain::Audio, "folk").unwrap().is_none());
    }

    #[test]
    fn upsert_replaces_existing_rows() {
        let (registry, _dir) = test_registry();
        registry
            .upsert(&CorpusRecord::new("a", Domain::Xml).with_name("old"))
            .unwrap();
        registry
            .upsert(&CorpusRecord::new("a", Domain::Xml).with_name("new"))
            .unwrap();
        let all = registry.list(Domain::Xml).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "new");
    }

    #[test]
    fn set_enabled_creates_and_updates() {
        let registry = CorpusRegistry::open_in_memory().unwrap();
        registry.set_enabled(Domain::Audio, "rec", false).unwrap();
        let rec = registry.get(Domain::Audio, "rec").unwrap().unwrap();
        assert_eq!(rec.enabled, Some(false));
        assert_eq!(rec.name, "rec");

        registry
            .upsert(&CorpusRecord::new("rec2", Domain::Audio).with_description("kept"))
            .unwrap();
        registry.set_enabled(Domain::Audio, "rec2", true).unwrap();
        let rec2 = registry.get(Domain::Audio, "rec2").unwrap().unwrap();
        assert_eq!(rec2.enabled, Some(true));
        assert_eq!(rec2.description, "kept");
    }

    #[test]
    fn corpus_states_are_per_domain() {
        let registry = CorpusRegistry::open_in_memory().unwrap();
        registry.set_enabled(Domain::Xml, "x", false).unwrap();
        registry.upsert(&CorpusRecord::new("y", Domain::Xml)).unwrap();
        registry.set_enabled(Domain::Audio, "z", false).unwrap();

        let states = registry.corpus_states(Domain::Xml).unwrap();
        assert_eq!(
            states,
            vec![
                CorpusState {
                    id: "x".into(),
                    enabled: Some(false)
                },
                CorpusState {
                    id: "y".into(),
                    enabled: None
                },
            ]
        );
    }

    #[test]
    fn reopening_keeps_schema_and_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("registry.db");
        {
            let registry = CorpusRegistry::open(&path).unwrap();
            registry.set_enabled(Domain::Xml, "kept", true).unwrap();
        }
        let registry = CorpusRegistry::open(&path).unwrap();
        assert_eq!(registry.list(Domain::Xml).unwrap().len(), 1);
    }
}
