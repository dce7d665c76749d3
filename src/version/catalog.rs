//! SQLite-backed catalog of version records

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, Transaction};
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use crate::version::error::{CatalogError, IngestError};
use crate::version::ingest::NewVersionRecord;
use crate::version::types::{Platform, VersionRecord};

/// Storage for version records
///
/// The check path only reads snapshots through `list_records`; every other
/// method is an administrative command.
#[cfg_attr(test, automock)]
pub trait CatalogStore: Send + Sync + 'static {
    /// All records, ordered by id
    fn list_records(&self) -> Result<Vec<VersionRecord>, CatalogError>;

    fn get_record(&self, id: i64) -> Result<Option<VersionRecord>, CatalogError>;

    /// Insert a record. If it is marked latest, its platform siblings lose the flag.
    fn insert_record(&self, record: &NewVersionRecord) -> Result<VersionRecord, CatalogError>;

    /// Replace a record's fields. If it is marked latest, its platform siblings lose the flag.
    fn update_record(
        &self,
        id: i64,
        record: &NewVersionRecord,
    ) -> Result<VersionRecord, CatalogError>;

    fn delete_record(&self, id: i64) -> Result<(), CatalogError>;

    /// Mark a record as the latest for its platform, clearing the flag on the others
    fn set_latest(&self, id: i64) -> Result<VersionRecord, CatalogError>;

    fn set_active(&self, id: i64, active: bool) -> Result<VersionRecord, CatalogError>;
}

/// Schema migrations
/// Each version contains a list of SQL statements to execute
const MIGRATIONS: &[&[&str]] = &[
    // v1: release_notes column
    &["ALTER TABLE version_records ADD COLUMN release_notes TEXT"],
    // v2: download_url column
    &["ALTER TABLE version_records ADD COLUMN download_url TEXT"],
];

const RECORD_COLUMNS: &str = r#"
    id, platform, version, build_number, update_type, is_active, is_latest, priority,
    release_date, force_update_date_threshold, compatibility, minimum_os_version,
    release_notes, download_url
"#;

pub struct SqliteCatalog {
    conn: Mutex<Connection>,
}

/// A record row as stored, before platform and timestamp decoding
struct StoredRow {
    id: i64,
    platform: String,
    version: String,
    build_number: Option<i64>,
    update_type: String,
    is_active: bool,
    is_latest: bool,
    priority: i64,
    release_date: Option<i64>,
    force_update_date_threshold: Option<i64>,
    compatibility: String,
    minimum_os_version: Option<String>,
    release_notes: Option<String>,
    download_url: Option<String>,
}

impl StoredRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            platform: row.get(1)?,
            version: row.get(2)?,
            build_number: row.get(3)?,
            update_type: row.get(4)?,
            is_active: row.get(5)?,
            is_latest: row.get(6)?,
            priority: row.get(7)?,
            release_date: row.get(8)?,
            force_update_date_threshold: row.get(9)?,
            compatibility: row.get(10)?,
            minimum_os_version: row.get(11)?,
            release_notes: row.get(12)?,
            download_url: row.get(13)?,
        })
    }

    // The version string is left as stored: the gate decides what to do with
    // malformed versions.
    fn into_record(self) -> Result<VersionRecord, CatalogError> {
        let id = self.id;
        let corrupt = |detail: String| CatalogError::CorruptRow { id, detail };

        let platform = self
            .platform
            .parse::<Platform>()
            .map_err(|e| corrupt(e.to_string()))?;
        let update_type = self
            .update_type
            .parse()
            .map_err(|e: IngestError| corrupt(e.to_string()))?;
        let compatibility: BTreeSet<Platform> = serde_json::from_str(&self.compatibility)
            .map_err(|e| corrupt(format!("compatibility: {e}")))?;
        let build_number = self
            .build_number
            .map(u64::try_from)
            .transpose()
            .map_err(|_| corrupt("negative build number".to_string()))?;
        let priority =
            u8::try_from(self.priority).map_err(|_| corrupt("priority out of range".to_string()))?;

        Ok(VersionRecord {
            id,
            platform,
            version: self.version,
            build_number,
            update_type,
            is_active: self.is_active,
            is_latest: self.is_latest,
            priority,
            release_date: decode_timestamp(self.release_date).map_err(corrupt)?,
            force_update_date_threshold: decode_timestamp(self.force_update_date_threshold)
                .map_err(corrupt)?,
            compatibility,
            minimum_os_version: self.minimum_os_version,
            release_notes: self.release_notes,
            download_url: self.download_url,
        })
    }
}

fn decode_timestamp(millis: Option<i64>) -> Result<Option<DateTime<Utc>>, String> {
    millis
        .map(|ms| {
            DateTime::from_timestamp_millis(ms).ok_or_else(|| format!("invalid timestamp {ms}"))
        })
        .transpose()
}

fn encode_build_number(build_number: Option<u64>) -> Result<Option<i64>, CatalogError> {
    build_number
        .map(|n| {
            i64::try_from(n)
                .map_err(|_| CatalogError::from(IngestError::InvalidBuildNumber(n.to_string())))
        })
        .transpose()
}

fn encode_compatibility(compatibility: &BTreeSet<Platform>) -> Result<String, CatalogError> {
    Ok(serde_json::to_string(compatibility)?)
}

impl SqliteCatalog {
    pub fn new(db_path: &Path) -> Result<Self, CatalogError> {
        info!("Opening version catalog at {:?}", db_path);

        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let catalog = Self {
            conn: Mutex::new(conn),
        };

        catalog.create_schema()?;
        info!("Version catalog ready");

        Ok(catalog)
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, CatalogError> {
        self.conn.lock().map_err(|_| CatalogError::LockPoisoned)
    }

    fn current_timestamp_ms() -> i64 {
        Utc::now().timestamp_millis()
    }

    fn create_schema(&self) -> Result<(), CatalogError> {
        debug!("Creating catalog schema");

        let conn = self.lock_conn()?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS version_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                platform TEXT NOT NULL,
                version TEXT NOT NULL,
                build_number INTEGER,
                update_type TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                is_latest INTEGER NOT NULL DEFAULT 0,
                priority INTEGER NOT NULL DEFAULT 0,
                release_date INTEGER,
                force_update_date_threshold INTEGER,
                compatibility TEXT NOT NULL DEFAULT '[]',
                minimum_os_version TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_version_records_platform ON version_records(platform)",
            [],
        )?;

        Self::apply_migrations(&conn)?;

        debug!("Catalog schema created successfully");
        Ok(())
    }

    /// Apply pending migrations based on user_version pragma
    fn apply_migrations(conn: &Connection) -> Result<(), CatalogError> {
        let current_version: i64 =
            conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        for (version, statements) in (1_i64..).zip(MIGRATIONS.iter()) {
            if version > current_version {
                for sql in *statements {
                    match conn.execute(sql, []) {
                        Ok(_) => {}
                        Err(rusqlite::Error::SqliteFailure(_, Some(ref msg)))
                            if msg.contains("duplicate column name") =>
                        {
                            debug!("Column already exists, skipping: {}", sql);
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                debug!("Applied migration v{}", version);
            }
        }

        let target_version = MIGRATIONS.len() as i64;
        if target_version > current_version {
            conn.pragma_update(None, "user_version", target_version)?;
            debug!("Updated schema version to v{}", target_version);
        }

        Ok(())
    }

    fn fetch_record(conn: &Connection, id: i64) -> Result<Option<VersionRecord>, CatalogError> {
        let row = conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM version_records WHERE id = ?1"),
                [id],
                StoredRow::from_row,
            )
            .optional()?;

        row.map(StoredRow::into_record).transpose()
    }

    fn fetch_existing(conn: &Connection, id: i64) -> Result<VersionRecord, CatalogError> {
        Self::fetch_record(conn, id)?.ok_or(CatalogError::NotFound(id))
    }

    fn clear_latest_siblings(
        tx: &Transaction<'_>,
        platform: Platform,
        keep_id: i64,
    ) -> Result<usize, CatalogError> {
        let cleared = tx.execute(
            "UPDATE version_records SET is_latest = 0, updated_at = ?1 WHERE platform = ?2 AND id != ?3 AND is_latest = 1",
            (Self::current_timestamp_ms(), platform.as_str(), keep_id),
        )?;
        if cleared > 0 {
            debug!("Cleared latest flag on {} {} record(s)", cleared, platform);
        }
        Ok(cleared)
    }
}

impl CatalogStore for SqliteCatalog {
    fn list_records(&self) -> Result<Vec<VersionRecord>, CatalogError> {
        let conn = self.lock_conn()?;
        let mut stmt =
            conn.prepare(&format!("SELECT {RECORD_COLUMNS} FROM version_records ORDER BY id"))?;

        let rows = stmt
            .query_map([], StoredRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(StoredRow::into_record).collect()
    }

    fn get_record(&self, id: i64) -> Result<Option<VersionRecord>, CatalogError> {
        let conn = self.lock_conn()?;
        Self::fetch_record(&conn, id)
    }

    fn insert_record(&self, record: &NewVersionRecord) -> Result<VersionRecord, CatalogError> {
        let build_number = encode_build_number(record.build_number)?;
        let compatibility = encode_compatibility(&record.compatibility)?;
        let now = Self::current_timestamp_ms();

        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO version_records (
                platform, version, build_number, update_type, is_active, is_latest, priority,
                release_date, force_update_date_threshold, compatibility, minimum_os_version,
                release_notes, download_url, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?14)
            "#,
            rusqlite::params![
                record.platform.as_str(),
                record.version,
                build_number,
                record.update_type.as_str(),
                record.is_active,
                record.is_latest,
                record.priority,
                record.release_date.map(|d| d.timestamp_millis()),
                record.force_update_date_threshold.map(|d| d.timestamp_millis()),
                compatibility,
                record.minimum_os_version,
                record.release_notes,
                record.download_url,
                now,
            ],
        )?;
        let id = tx.last_insert_rowid();

        if record.is_latest {
            Self::clear_latest_siblings(&tx, record.platform, id)?;
        }

        let saved = Self::fetch_existing(&tx, id)?;
        tx.commit()?;

        info!(
            "Created version record {} ({} {})",
            id, saved.platform, saved.version
        );
        Ok(saved)
    }

    fn update_record(
        &self,
        id: i64,
        record: &NewVersionRecord,
    ) -> Result<VersionRecord, CatalogError> {
        let build_number = encode_build_number(record.build_number)?;
        let compatibility = encode_compatibility(&record.compatibility)?;

        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;

        let updated = tx.execute(
            r#"
            UPDATE version_records SET
                platform = ?2, version = ?3, build_number = ?4, update_type = ?5,
                is_active = ?6, is_latest = ?7, priority = ?8, release_date = ?9,
                force_update_date_threshold = ?10, compatibility = ?11,
                minimum_os_version = ?12, release_notes = ?13, download_url = ?14,
                updated_at = ?15
            WHERE id = ?1
            "#,
            rusqlite::params![
                id,
                record.platform.as_str(),
                record.version,
                build_number,
                record.update_type.as_str(),
                record.is_active,
                record.is_latest,
                record.priority,
                record.release_date.map(|d| d.timestamp_millis()),
                record.force_update_date_threshold.map(|d| d.timestamp_millis()),
                compatibility,
                record.minimum_os_version,
                record.release_notes,
                record.download_url,
                Self::current_timestamp_ms(),
            ],
        )?;

        if updated == 0 {
            return Err(CatalogError::NotFound(id));
        }

        if record.is_latest {
            Self::clear_latest_siblings(&tx, record.platform, id)?;
        }

        let saved = Self::fetch_existing(&tx, id)?;
        tx.commit()?;

        info!("Updated version record {}", id);
        Ok(saved)
    }

    fn delete_record(&self, id: i64) -> Result<(), CatalogError> {
        let conn = self.lock_conn()?;
        let deleted = conn.execute("DELETE FROM version_records WHERE id = ?1", [id])?;

        if deleted == 0 {
            return Err(CatalogError::NotFound(id));
        }

        info!("Deleted version record {}", id);
        Ok(())
    }

    fn set_latest(&self, id: i64) -> Result<VersionRecord, CatalogError> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;

        let existing = Self::fetch_existing(&tx, id)?;

        tx.execute(
            "UPDATE version_records SET is_latest = 1, updated_at = ?2 WHERE id = ?1",
            (id, Self::current_timestamp_ms()),
        )?;
        Self::clear_latest_siblings(&tx, existing.platform, id)?;

        let saved = Self::fetch_existing(&tx, id)?;
        tx.commit()?;

        info!(
            "Marked version record {} as latest for {}",
            id, saved.platform
        );
        Ok(saved)
    }

    fn set_active(&self, id: i64, active: bool) -> Result<VersionRecord, CatalogError> {
        let conn = self.lock_conn()?;

        let updated = conn.execute(
            "UPDATE version_records SET is_active = ?2, updated_at = ?3 WHERE id = ?1",
            (id, active, Self::current_timestamp_ms()),
        )?;
        if updated == 0 {
            return Err(CatalogError::NotFound(id));
        }

        info!(
            "Version record {} is now {}",
            id,
            if active { "active" } else { "inactive" }
        );
        Self::fetch_existing(&conn, id)
    }
}
