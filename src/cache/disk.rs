//! SQLite-indexed on-disk cache
//!
//! Every (location, version) pair owns a directory below the cache root named
//! after the SHA-256 of the key; the artifact keeps the file name of its URL.

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use reqwest::Url;
use rusqlite::{Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, DownloadInfo, ResourceCache};
use crate::error::CacheError;
use crate::version::{VersionId, VersionIdComparator, VersionString};

/// Name of the SQLite index inside the cache root
pub const INDEX_FILE_NAME: &str = "index.db";

/// File name used when the URL path has none
const DEFAULT_FILE_NAME: &str = "resource";

/// Stored in the `version` column for unversioned entries
const UNVERSIONED: &str = "";

/// Schema migrations
/// Each version contains a list of SQL statements to execute
const MIGRATIONS: &[&[&str]] = &[
    // v1: last_accessed column for least-recently-used eviction
    &["ALTER TABLE entries ADD COLUMN last_accessed INTEGER"],
];

const ENTRY_COLUMNS: &str = "location, version, file_path, last_modified, downloaded_at, size";

struct IndexRow {
    location: String,
    version: String,
    file_path: String,
    last_modified: Option<i64>,
    downloaded_at: i64,
    size: i64,
}

impl IndexRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            location: row.get(0)?,
            version: row.get(1)?,
            file_path: row.get(2)?,
            last_modified: row.get(3)?,
            downloaded_at: row.get(4)?,
            size: row.get(5)?,
        })
    }

    fn into_entry(self) -> Result<CacheEntry, CacheError> {
        let location =
            Url::parse(&self.location).map_err(|_| CacheError::InvalidLocation(self.location))?;
        Ok(CacheEntry {
            location,
            version: parse_version_column(&self.version)?,
            file: PathBuf::from(self.file_path),
            last_modified: self.last_modified,
            downloaded_at: self.downloaded_at,
            size: self.size.max(0) as u64,
        })
    }
}

fn version_column(version: Option<&VersionId>) -> &str {
    version.map_or(UNVERSIONED, VersionId::as_str)
}

fn parse_version_column(version: &str) -> Result<Option<VersionId>, CacheError> {
    if version == UNVERSIONED {
        Ok(None)
    } else {
        Ok(Some(VersionId::parse(version)?))
    }
}

/// Last path segment of the URL with anything unsafe for a file name replaced
fn file_name_of(location: &Url) -> String {
    let name = location
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .unwrap_or(DEFAULT_FILE_NAME);

    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

pub struct DiskCache {
    root: PathBuf,
    conn: Mutex<Connection>,
}

impl DiskCache {
    pub fn new(root: &Path) -> Result<Self, CacheError> {
        std::fs::create_dir_all(root)?;
        let db_path = root.join(INDEX_FILE_NAME);
        info!("Initializing resource cache at {:?}", root);

        let conn = Connection::open(&db_path)?;

        // Enable WAL mode for better concurrency
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let cache = Self {
            root: root.to_path_buf(),
            conn: Mutex::new(conn),
        };

        cache.create_schema()?;
        debug!("Resource cache initialized");

        Ok(cache)
    }

    /// Acquire database connection lock with proper error handling
    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
        self.conn.lock().map_err(|_| CacheError::LockPoisoned)
    }

    fn current_timestamp_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn create_schema(&self) -> Result<(), CacheError> {
        let conn = self.lock_conn()?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                location TEXT NOT NULL,
                version TEXT NOT NULL,
                file_path TEXT NOT NULL,
                last_modified INTEGER,
                downloaded_at INTEGER NOT NULL,
                size INTEGER NOT NULL,
                UNIQUE(location, version)
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_entries_location ON entries(location)",
            [],
        )?;

        Self::apply_migrations(&conn)?;

        Ok(())
    }

    /// Apply pending migrations based on user_version pragma
    fn apply_migrations(conn: &Connection) -> Result<(), CacheError> {
        let current_version: i32 =
            conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        for (i, statements) in MIGRATIONS.iter().enumerate() {
            let version = (i + 1) as i32;
            if version > current_version {
                for sql in *statements {
                    conn.execute(sql, [])?;
                }
                debug!("Applied migration v{}", version);
            }
        }

        let target_version = MIGRATIONS.len() as i32;
        if target_version > current_version {
            conn.pragma_update(None, "user_version", target_version)?;
        }

        Ok(())
    }

    fn entry_dir(&self, location: &Url, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(location.as_str().as_bytes());
        hasher.update(b"\n");
        hasher.update(key.as_bytes());
        self.root.join(format!("{:x}", hasher.finalize()))
    }

    /// Text of the `version` column holding `version`.
    ///
    /// Versions are equal under padding (`1` and `1.0`), so an entry indexed
    /// under an equal spelling is reused; otherwise the id's own text is the
    /// key.
    fn version_key(&self, location: &Url, version: Option<&VersionId>) -> Result<String, CacheError> {
        let Some(version) = version else {
            return Ok(UNVERSIONED.to_string());
        };

        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare("SELECT version FROM entries WHERE location = ?1")?;
        let keys = stmt
            .query_map([location.as_str()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(conn);

        let indexed = keys.into_iter().find(|key| {
            key.as_str() != UNVERSIONED
                && VersionId::parse(key).is_ok_and(|stored| stored.is_equal_to(version))
        });
        Ok(indexed.unwrap_or_else(|| version.as_str().to_string()))
    }

    fn find_entry(
        &self,
        location: &Url,
        version: Option<&VersionId>,
    ) -> Result<Option<CacheEntry>, CacheError> {
        let key = self.version_key(location, version)?;
        let conn = self.lock_conn()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM entries WHERE location = ?1 AND version = ?2",
                    ENTRY_COLUMNS
                ),
                (location.as_str(), &key),
                IndexRow::read,
            )
            .optional()?;
        drop(conn);

        row.map(IndexRow::into_entry).transpose()
    }

    fn entries_of(&self, location: &Url) -> Result<Vec<CacheEntry>, CacheError> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM entries WHERE location = ?1",
            ENTRY_COLUMNS
        ))?;
        let rows = stmt
            .query_map([location.as_str()], IndexRow::read)?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(conn);

        rows.into_iter().map(IndexRow::into_entry).collect()
    }

    /// Entry whose file still exists on disk
    fn find_present_entry(
        &self,
        location: &Url,
        version: Option<&VersionId>,
    ) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self
            .find_entry(location, version)?
            .filter(|entry| entry.file.is_file()))
    }

    fn remove_entry(&self, location: &Url, version: Option<&VersionId>) -> Result<(), CacheError> {
        let key = self.version_key(location, version)?;
        let file = {
            let conn = self.lock_conn()?;
            let file: Option<String> = conn
                .query_row(
                    "SELECT file_path FROM entries WHERE location = ?1 AND version = ?2",
                    (location.as_str(), &key),
                    |row| row.get(0),
                )
                .optional()?;
            conn.execute(
                "DELETE FROM entries WHERE location = ?1 AND version = ?2",
                (location.as_str(), &key),
            )?;
            file
        };

        if let Some(file) = file {
            remove_file_if_exists(Path::new(&file))?;
        }
        Ok(())
    }
}

impl ResourceCache for DiskCache {
    fn is_cached(&self, location: &Url, version: Option<&VersionId>) -> Result<bool, CacheError> {
        Ok(self.find_present_entry(location, version)?.is_some())
    }

    fn is_any_cached(
        &self,
        location: &Url,
        version_string: Option<&VersionString>,
    ) -> Result<bool, CacheError> {
        match version_string {
            None => self.is_cached(location, None),
            Some(_) => Ok(self
                .get_best_matching_version_in_cache(location, version_string)?
                .is_some()),
        }
    }

    fn is_up_to_date(
        &self,
        location: &Url,
        version: Option<&VersionId>,
        last_modified: Option<i64>,
    ) -> Result<bool, CacheError> {
        let Some(entry) = self.find_present_entry(location, version)? else {
            return Ok(false);
        };

        Ok(match (last_modified, entry.last_modified) {
            (None, _) => true,
            (Some(remote), Some(cached)) => remote <= cached,
            (Some(_), None) => false,
        })
    }

    fn get_info(
        &self,
        location: &Url,
        version: Option<&VersionId>,
    ) -> Result<Option<CacheEntry>, CacheError> {
        self.find_present_entry(location, version)
    }

    fn get_best_matching_version_in_cache(
        &self,
        location: &Url,
        version_string: Option<&VersionString>,
    ) -> Result<Option<VersionId>, CacheError> {
        let versions = self.get_all_versions_in_cache(location)?;
        let candidates: Vec<&VersionId> = versions
            .iter()
            .filter(|version| version_string.is_none_or(|vs| vs.contains(version)))
            .collect();

        let comparator = VersionIdComparator::new(version_string.cloned());
        Ok(comparator.best(candidates).cloned())
    }

    fn get_all_versions_in_cache(&self, location: &Url) -> Result<Vec<VersionId>, CacheError> {
        let mut versions: Vec<VersionId> = self
            .entries_of(location)?
            .into_iter()
            .filter(|entry| entry.file.is_file())
            .filter_map(|entry| entry.version)
            .collect();
        versions.sort();
        Ok(versions)
    }

    fn get_cache_file(
        &self,
        location: &Url,
        version: Option<&VersionId>,
    ) -> Result<Option<PathBuf>, CacheError> {
        let Some(entry) = self.find_present_entry(location, version)? else {
            return Ok(None);
        };

        let conn = self.lock_conn()?;
        conn.execute(
            "UPDATE entries SET last_accessed = ?3 WHERE location = ?1 AND version = ?2",
            (
                location.as_str(),
                version_column(entry.version.as_ref()),
                Self::current_timestamp_ms(),
            ),
        )?;

        Ok(Some(entry.file))
    }

    fn get_or_create_cache_file(
        &self,
        location: &Url,
        version: Option<&VersionId>,
    ) -> Result<PathBuf, CacheError> {
        let key = self.version_key(location, version)?;
        let dir = self.entry_dir(location, &key);
        std::fs::create_dir_all(&dir)?;
        Ok(dir.join(file_name_of(location)))
    }

    fn add_to_cache(
        &self,
        info: &DownloadInfo,
        content: &mut dyn Read,
    ) -> Result<CacheEntry, CacheError> {
        let version = info.version.as_ref();
        let key = self.version_key(&info.location, version)?;
        let target = self.get_or_create_cache_file(&info.location, version)?;
        let dir = target.parent().unwrap_or(&self.root);

        let mut temp = NamedTempFile::new_in(dir)?;
        let size = io::copy(content, &mut temp)?;
        temp.as_file().sync_all()?;
        temp.persist(&target).map_err(|e| e.error)?;

        let now = Self::current_timestamp_ms();
        let conn = self.lock_conn()?;
        conn.execute(
            r#"
            INSERT INTO entries (location, version, file_path, last_modified, downloaded_at, size, last_accessed)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?5)
            ON CONFLICT(location, version) DO UPDATE SET
                file_path = excluded.file_path,
                last_modified = excluded.last_modified,
                downloaded_at = excluded.downloaded_at,
                size = excluded.size,
                last_accessed = excluded.last_accessed
            "#,
            (
                info.location.as_str(),
                &key,
                target.to_string_lossy().into_owned(),
                info.last_modified,
                now,
                size as i64,
            ),
        )?;

        info!(
            "Cached {} ({}) at {:?}: {} bytes",
            info.location,
            version_column(version),
            target,
            size
        );

        Ok(CacheEntry {
            location: info.location.clone(),
            version: info.version.clone(),
            file: target,
            last_modified: info.last_modified,
            downloaded_at: now,
            size,
        })
    }

    fn invalidate_existing_cache_file(
        &self,
        location: &Url,
        version: Option<&VersionId>,
    ) -> Result<(), CacheError> {
        debug!(
            "Invalidating cache entry {} ({})",
            location,
            version_column(version)
        );
        self.remove_entry(location, version)
    }

    fn delete_from_cache(
        &self,
        location: &Url,
        version_string: Option<&VersionString>,
    ) -> Result<usize, CacheError> {
        let doomed: Vec<Option<VersionId>> = self
            .entries_of(location)?
            .into_iter()
            .map(|entry| entry.version)
            .filter(|version| match (version_string, version) {
                (None, _) => true,
                (Some(vs), Some(version)) => vs.contains(version),
                (Some(_), None) => false,
            })
            .collect();

        for version in &doomed {
            self.remove_entry(location, version.as_ref())?;
        }
        Ok(doomed.len())
    }

    fn clear_cache(&self) -> Result<(), CacheError> {
        let files: Vec<String> = {
            let conn = self.lock_conn()?;
            let mut stmt = conn.prepare("SELECT file_path FROM entries")?;
            let files = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            drop(stmt);
            conn.execute("DELETE FROM entries", [])?;
            files
        };

        for file in &files {
            let path = Path::new(file);
            remove_file_if_exists(path)?;
            if let Some(dir) = path.parent().filter(|dir| *dir != self.root.as_path()) {
                let _ = std::fs::remove_dir(dir)
                    .inspect_err(|e| debug!("Keeping cache directory {:?}: {}", dir, e));
            }
        }

        info!("Cleared {} cache entries", files.len());
        Ok(())
    }

    fn clean_cache(&self, max_size: u64) -> Result<u64, CacheError> {
        let entries: Vec<(String, String, i64)> = {
            let conn = self.lock_conn()?;
            let mut stmt = conn.prepare(
                r#"
                SELECT location, version, size FROM entries
                ORDER BY COALESCE(last_accessed, downloaded_at) ASC, id ASC
                "#,
            )?;
            let entries = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            entries
        };

        let mut total: u64 = entries.iter().map(|(_, _, size)| (*size).max(0) as u64).sum();
        let mut freed = 0;

        for (location, version, size) in entries {
            if total <= max_size {
                break;
            }
            let Ok(url) = Url::parse(&location) else {
                warn!("Skipping invalid location in cache index: {}", location);
                continue;
            };
            let version = parse_version_column(&version)?;
            self.remove_entry(&url, version.as_ref())?;

            let size = size.max(0) as u64;
            total -= size;
            freed += size;
        }

        info!("Cache cleaned: freed {} bytes, {} bytes left", freed, total);
        Ok(freed)
    }
}
