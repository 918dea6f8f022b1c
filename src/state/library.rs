use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::{
    ffi, params, Connection, ErrorCode, OptionalExtension, Row, Transaction, TransactionBehavior,
};
use thiserror::Error;
use tracing::{debug, info};

use super::data::{
    Album, AlbumId, LibraryStats, NewPhoto, Page, Photo, PhotoChanges, PhotoId, PhotoMetadata,
    ScanCounts, ScanJob, ScanJobId, ScanStatus,
};

/// Errors returned by catalog operations.
///
/// Every exposed operation runs in its own transaction, so a returned error
/// means nothing was written.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database query failed: {0}")]
    Sql(#[from] rusqlite::Error),
    /// Another live photo already owns this path.
    #[error("a photo is already indexed at {path}")]
    Conflict { path: PathBuf },
    /// The album was pruned between resolving it and inserting into it.
    #[error("album {album_id} no longer exists")]
    MissingAlbum { album_id: AlbumId },
    /// A pending or running scan job already exists.
    #[error("a scan job is already active")]
    ScanActive,
    #[error("scan jobs cannot be finalized as {0:?}")]
    InvalidStatus(ScanStatus),
    #[error("path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),
    #[error("could not create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

const PHOTO_COLUMNS: &str = "id, filename, album_id, path, size_bytes, width, height, format, \
     taken_at, created_at, modified_at, indexed_at, hash";

const ALBUM_COLUMNS: &str =
    "id, name, path, photo_count, size_bytes, cover_photo_id, created_at, updated_at";

const SCAN_JOB_COLUMNS: &str = "id, status, photos_found, photos_added, photos_updated, \
     started_at, completed_at, error_message";

/// The Library manages the SQLite catalog database.
/// It stores albums, photos, their optional EXIF metadata and scan-job records.
///
/// A single connection is shared behind a mutex and every write runs in an
/// `IMMEDIATE` transaction, so album aggregate recomputation for one album
/// never interleaves with another writer.
pub struct Library {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl Library {
    /// Open (or create) the catalog at `db_path` and initialize the schema.
    /// The parent directory is created when missing.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref().to_path_buf();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let conn = Connection::open(&db_path)?;
        let library = Self::from_connection(conn, db_path)?;
        info!(path = %library.db_path.display(), "Catalog database initialized");
        Ok(library)
    }

    /// Open a throwaway catalog that lives only as long as the returned value.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, PathBuf::from(":memory:"))
    }

    fn from_connection(conn: Connection, db_path: PathBuf) -> Result<Self, StoreError> {
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA foreign_keys=ON;
             PRAGMA busy_timeout=5000;",
        )?;
        init_schema(&conn)?;
        Ok(Library {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    /// Get the path to the database file
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-transaction rolls the transaction back on unwind, so the
        // connection itself is still consistent.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run raw SQL against the catalog, for tests that need to rig the schema.
    #[cfg(test)]
    pub(crate) fn execute_batch_for_test(&self, sql: &str) -> Result<(), StoreError> {
        self.conn().execute_batch(sql)?;
        Ok(())
    }

    // ========== Albums ==========

    /// Return the album for an exact directory path, creating an empty one if absent.
    ///
    /// The insert is resolved against the unique `path` constraint, so two callers
    /// racing on the same new directory both get the same id.
    pub fn upsert_album_for_path(&self, dir: &Path) -> Result<AlbumId, StoreError> {
        let key = path_text(dir)?;
        let now = Utc::now();

        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let inserted = tx.execute(
            "INSERT INTO albums (id, name, path, photo_count, size_bytes, created_at, updated_at)
             VALUES (?1, ?2, ?3, 0, 0, ?4, ?4)
             ON CONFLICT(path) DO NOTHING",
            params![AlbumId::new(), album_name(dir), key, now],
        )?;
        let id: AlbumId =
            tx.query_row("SELECT id FROM albums WHERE path = ?1", [key], |row| row.get(0))?;
        tx.commit()?;

        if inserted > 0 {
            debug!(album_id = %id, path = %dir.display(), "Created album");
        }
        Ok(id)
    }

    pub fn album(&self, id: &AlbumId) -> Result<Option<Album>, StoreError> {
        let conn = self.conn();
        let album = conn
            .query_row(
                &format!("SELECT {ALBUM_COLUMNS} FROM albums WHERE id = ?1"),
                [id],
                album_from_row,
            )
            .optional()?;
        Ok(album)
    }

    /// Albums ordered by most recently updated first.
    pub fn list_albums(&self, page: Page) -> Result<Vec<Album>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ALBUM_COLUMNS} FROM albums
             ORDER BY updated_at DESC, path
             LIMIT ?1 OFFSET ?2"
        ))?;
        let albums = stmt
            .query_map(params![page.limit, page.offset], album_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(albums)
    }

    /// Delete every album that no longer has a photo referencing it.
    /// Returns the number of albums removed.
    pub fn prune_empty_albums(&self) -> Result<usize, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let removed = tx.execute(
            "DELETE FROM albums
             WHERE NOT EXISTS (SELECT 1 FROM photos WHERE photos.album_id = albums.id)",
            [],
        )?;
        tx.commit()?;
        Ok(removed)
    }

    // ========== Photos ==========

    pub fn find_photo_by_path(&self, path: &Path) -> Result<Option<Photo>, StoreError> {
        let key = path_text(path)?;
        let conn = self.conn();
        let photo = conn
            .query_row(
                &format!("SELECT {PHOTO_COLUMNS} FROM photos WHERE path = ?1"),
                [key],
                photo_from_row,
            )
            .optional()?;
        Ok(photo)
    }

    pub fn photo(&self, id: &PhotoId) -> Result<Option<Photo>, StoreError> {
        let conn = self.conn();
        let photo = conn
            .query_row(
                &format!("SELECT {PHOTO_COLUMNS} FROM photos WHERE id = ?1"),
                [id],
                photo_from_row,
            )
            .optional()?;
        Ok(photo)
    }

    /// Photos of one album ordered by capture time, then filename.
    pub fn list_photos_in_album(
        &self,
        album_id: &AlbumId,
        page: Page,
    ) -> Result<Vec<Photo>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PHOTO_COLUMNS} FROM photos
             WHERE album_id = ?1
             ORDER BY taken_at, filename
             LIMIT ?2 OFFSET ?3"
        ))?;
        let photos = stmt
            .query_map(params![album_id, page.limit, page.offset], photo_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(photos)
    }

    /// Every live photo sharing a content hash.
    pub fn photos_with_hash(&self, hash: &str) -> Result<Vec<Photo>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PHOTO_COLUMNS} FROM photos WHERE hash = ?1 ORDER BY path"
        ))?;
        let photos = stmt
            .query_map([hash], photo_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(photos)
    }

    /// Id and path of every live photo.
    pub fn live_photo_paths(&self) -> Result<Vec<(PhotoId, PathBuf)>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT id, path FROM photos")?;
        let rows = stmt
            .query_map([], |row| {
                let path: String = row.get(1)?;
                Ok((row.get(0)?, PathBuf::from(path)))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Insert a photo and recompute its album's aggregates in the same transaction.
    ///
    /// Fails with [`StoreError::Conflict`] when another photo already owns the
    /// path, and with [`StoreError::MissingAlbum`] when the album row is gone.
    pub fn insert_photo(&self, new: &NewPhoto) -> Result<Photo, StoreError> {
        let key = path_text(&new.path)?;
        let id = PhotoId::new();
        let now = Utc::now();

        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO photos (id, filename, album_id, path, size_bytes, width, height, format,
                                 taken_at, created_at, modified_at, indexed_at, hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                id,
                new.filename,
                new.album_id,
                key,
                new.size_bytes,
                new.width,
                new.height,
                new.format,
                new.taken_at,
                new.created_at,
                new.modified_at,
                now,
                new.hash,
            ],
        )
        .map_err(|err| classify_insert_error(err, new))?;
        recompute_album(&tx, &new.album_id, now)?;
        tx.commit()?;

        Ok(Photo {
            id,
            filename: new.filename.clone(),
            album_id: new.album_id.clone(),
            path: new.path.clone(),
            size_bytes: new.size_bytes,
            width: new.width,
            height: new.height,
            format: new.format.clone(),
            taken_at: new.taken_at,
            created_at: new.created_at,
            modified_at: new.modified_at,
            indexed_at: now,
            hash: new.hash.clone(),
        })
    }

    /// Rewrite the on-disk attributes of a photo and recompute its album.
    /// Returns false when the photo no longer exists.
    pub fn update_photo(&self, id: &PhotoId, changes: &PhotoChanges) -> Result<bool, StoreError> {
        let now = Utc::now();
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(album_id) = owning_album(&tx, id)? else {
            return Ok(false);
        };
        tx.execute(
            "UPDATE photos
             SET size_bytes = ?2, width = ?3, height = ?4, taken_at = ?5,
                 modified_at = ?6, indexed_at = ?7, hash = ?8
             WHERE id = ?1",
            params![
                id,
                changes.size_bytes,
                changes.width,
                changes.height,
                changes.taken_at,
                changes.modified_at,
                now,
                changes.hash,
            ],
        )?;
        recompute_album(&tx, &album_id, now)?;
        tx.commit()?;
        Ok(true)
    }

    /// Delete a photo (its metadata cascades) and recompute its album.
    /// The album row is kept even when it drops to zero photos.
    /// Returns false when the photo was already gone.
    pub fn remove_photo(&self, id: &PhotoId) -> Result<bool, StoreError> {
        let now = Utc::now();
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(album_id) = owning_album(&tx, id)? else {
            return Ok(false);
        };
        tx.execute("DELETE FROM photos WHERE id = ?1", [id])?;
        recompute_album(&tx, &album_id, now)?;
        tx.commit()?;
        Ok(true)
    }

    // ========== Photo metadata ==========

    pub fn upsert_photo_metadata(&self, metadata: &PhotoMetadata) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO photo_metadata
                 (photo_id, camera, lens, iso, exposure, aperture, latitude, longitude, altitude)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(photo_id) DO UPDATE SET
                 camera = excluded.camera, lens = excluded.lens, iso = excluded.iso,
                 exposure = excluded.exposure, aperture = excluded.aperture,
                 latitude = excluded.latitude, longitude = excluded.longitude,
                 altitude = excluded.altitude",
            params![
                metadata.photo_id,
                metadata.camera,
                metadata.lens,
                metadata.iso,
                metadata.exposure,
                metadata.aperture,
                metadata.latitude,
                metadata.longitude,
                metadata.altitude,
            ],
        )?;
        Ok(())
    }

    pub fn photo_metadata(&self, photo_id: &PhotoId) -> Result<Option<PhotoMetadata>, StoreError> {
        let conn = self.conn();
        let metadata = conn
            .query_row(
                "SELECT photo_id, camera, lens, iso, exposure, aperture, latitude, longitude, altitude
                 FROM photo_metadata WHERE photo_id = ?1",
                [photo_id],
                |row| {
                    Ok(PhotoMetadata {
                        photo_id: row.get(0)?,
                        camera: row.get(1)?,
                        lens: row.get(2)?,
                        iso: row.get(3)?,
                        exposure: row.get(4)?,
                        aperture: row.get(5)?,
                        latitude: row.get(6)?,
                        longitude: row.get(7)?,
                        altitude: row.get(8)?,
                    })
                },
            )
            .optional()?;
        Ok(metadata)
    }

    // ========== Scan jobs ==========

    /// Create a `pending` job. Fails with [`StoreError::ScanActive`] while
    /// another job is pending or running.
    pub fn record_scan_job_start(&self) -> Result<ScanJobId, StoreError> {
        let id = ScanJobId::new();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO scan_jobs (id, status, started_at) VALUES (?1, ?2, ?3)",
            params![id, ScanStatus::Pending, Utc::now()],
        )
        .map_err(|err| match constraint_code(&err) {
            Some(ffi::SQLITE_CONSTRAINT_UNIQUE) => StoreError::ScanActive,
            _ => StoreError::Sql(err),
        })?;
        Ok(id)
    }

    /// Move a pending job to `running`. Returns false if the job was not pending.
    pub fn mark_scan_job_running(&self, id: &ScanJobId) -> Result<bool, StoreError> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE scan_jobs SET status = ?2 WHERE id = ?1 AND status = ?3",
            params![id, ScanStatus::Running, ScanStatus::Pending],
        )?;
        Ok(changed > 0)
    }

    pub fn record_scan_job_progress(
        &self,
        id: &ScanJobId,
        counts: ScanCounts,
    ) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "UPDATE scan_jobs
             SET photos_found = ?2, photos_added = ?3, photos_updated = ?4
             WHERE id = ?1 AND status IN ('pending', 'running')",
            params![
                id,
                saturating_i64(counts.found),
                saturating_i64(counts.added),
                saturating_i64(counts.updated)
            ],
        )?;
        Ok(())
    }

    /// Finalize a job as `completed` or `failed`.
    /// Returns false if the job had already reached a terminal status.
    pub fn record_scan_job_end(
        &self,
        id: &ScanJobId,
        status: ScanStatus,
        error: Option<&str>,
    ) -> Result<bool, StoreError> {
        if !status.is_terminal() {
            return Err(StoreError::InvalidStatus(status));
        }
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE scan_jobs
             SET status = ?2, completed_at = ?3, error_message = ?4
             WHERE id = ?1 AND status IN ('pending', 'running')",
            params![id, status, Utc::now(), error],
        )?;
        Ok(changed > 0)
    }

    /// Fail every job a previous process left pending or running.
    pub fn fail_interrupted_scan_jobs(&self) -> Result<usize, StoreError> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE scan_jobs
             SET status = 'failed', completed_at = ?1, error_message = 'interrupted'
             WHERE status IN ('pending', 'running')",
            [Utc::now()],
        )?;
        Ok(changed)
    }

    pub fn scan_job(&self, id: &ScanJobId) -> Result<Option<ScanJob>, StoreError> {
        let conn = self.conn();
        let job = conn
            .query_row(
                &format!("SELECT {SCAN_JOB_COLUMNS} FROM scan_jobs WHERE id = ?1"),
                [id],
                scan_job_from_row,
            )
            .optional()?;
        Ok(job)
    }

    pub fn active_scan_job(&self) -> Result<Option<ScanJob>, StoreError> {
        let conn = self.conn();
        let job = conn
            .query_row(
                &format!(
                    "SELECT {SCAN_JOB_COLUMNS} FROM scan_jobs
                     WHERE status IN ('pending', 'running')"
                ),
                [],
                scan_job_from_row,
            )
            .optional()?;
        Ok(job)
    }

    // ========== Totals ==========

    pub fn stats(&self) -> Result<LibraryStats, StoreError> {
        let conn = self.conn();
        let stats = conn.query_row(
            "SELECT (SELECT COUNT(*) FROM albums),
                    (SELECT COUNT(*) FROM photos),
                    (SELECT COALESCE(SUM(size_bytes), 0) FROM photos)",
            [],
            |row| {
                Ok(LibraryStats {
                    album_count: row.get(0)?,
                    photo_count: row.get(1)?,
                    total_bytes: row.get(2)?,
                })
            },
        )?;
        Ok(stats)
    }
}

// Implement Debug for better error messages
impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("db_path", &self.db_path)
            .finish()
    }
}

/// Initialize the database schema.
/// Creates all tables and indexes if they don't exist.
fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS albums (
            id              TEXT PRIMARY KEY,
            name            TEXT NOT NULL,
            path            TEXT NOT NULL UNIQUE,
            photo_count     INTEGER NOT NULL DEFAULT 0,
            size_bytes      INTEGER NOT NULL DEFAULT 0,
            cover_photo_id  TEXT,
            created_at      DATETIME NOT NULL,
            updated_at      DATETIME NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_albums_updated ON albums(updated_at DESC);

        CREATE TABLE IF NOT EXISTS photos (
            id              TEXT PRIMARY KEY,
            filename        TEXT NOT NULL,
            album_id        TEXT NOT NULL,
            path            TEXT NOT NULL UNIQUE,
            size_bytes      INTEGER NOT NULL,
            width           INTEGER NOT NULL DEFAULT 0,
            height          INTEGER NOT NULL DEFAULT 0,
            format          TEXT NOT NULL,
            taken_at        DATETIME,
            created_at      DATETIME NOT NULL,
            modified_at     DATETIME NOT NULL,
            indexed_at      DATETIME NOT NULL,
            hash            TEXT NOT NULL,
            FOREIGN KEY (album_id) REFERENCES albums(id) ON DELETE CASCADE
        );
        CREATE INDEX IF NOT EXISTS idx_photos_album ON photos(album_id);
        CREATE INDEX IF NOT EXISTS idx_photos_taken_at ON photos(taken_at DESC);
        CREATE INDEX IF NOT EXISTS idx_photos_filename ON photos(filename);
        CREATE INDEX IF NOT EXISTS idx_photos_hash ON photos(hash);

        CREATE TABLE IF NOT EXISTS photo_metadata (
            photo_id        TEXT PRIMARY KEY,
            camera          TEXT,
            lens            TEXT,
            iso             INTEGER,
            exposure        TEXT,
            aperture        TEXT,
            latitude        REAL,
            longitude       REAL,
            altitude        REAL,
            FOREIGN KEY (photo_id) REFERENCES photos(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS scan_jobs (
            id              TEXT PRIMARY KEY,
            status          TEXT NOT NULL,
            photos_found    INTEGER NOT NULL DEFAULT 0,
            photos_added    INTEGER NOT NULL DEFAULT 0,
            photos_updated  INTEGER NOT NULL DEFAULT 0,
            started_at      DATETIME NOT NULL,
            completed_at    DATETIME,
            error_message   TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_scan_jobs_status ON scan_jobs(status);
        CREATE INDEX IF NOT EXISTS idx_scan_jobs_started ON scan_jobs(started_at DESC);
        -- At most one pending or running job per catalog: every active row
        -- indexes the same key, so a second one is a unique violation.
        DROP INDEX IF EXISTS idx_scan_jobs_single_active;
        CREATE UNIQUE INDEX IF NOT EXISTS idx_scan_jobs_one_active
            ON scan_jobs((status IN ('pending', 'running')))
            WHERE status IN ('pending', 'running');",
    )?;
    Ok(())
}

/// Recompute `photo_count`, `size_bytes` and the cover of one album from its live photos.
fn recompute_album(
    tx: &Transaction<'_>,
    album_id: &AlbumId,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    tx.execute(
        "UPDATE albums SET
            photo_count = (SELECT COUNT(*) FROM photos WHERE album_id = ?1),
            size_bytes = (SELECT COALESCE(SUM(size_bytes), 0) FROM photos WHERE album_id = ?1),
            cover_photo_id = CASE
                WHEN cover_photo_id IN (SELECT id FROM photos WHERE album_id = ?1)
                    THEN cover_photo_id
                ELSE (SELECT id FROM photos WHERE album_id = ?1
                      ORDER BY taken_at, filename LIMIT 1)
            END,
            updated_at = ?2
         WHERE id = ?1",
        params![album_id, now],
    )?;
    Ok(())
}

fn owning_album(tx: &Transaction<'_>, id: &PhotoId) -> Result<Option<AlbumId>, StoreError> {
    let album_id = tx
        .query_row("SELECT album_id FROM photos WHERE id = ?1", [id], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(album_id)
}

fn constraint_code(err: &rusqlite::Error) -> Option<i32> {
    match err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            Some(failure.extended_code)
        }
        _ => None,
    }
}

fn classify_insert_error(err: rusqlite::Error, new: &NewPhoto) -> StoreError {
    match constraint_code(&err) {
        Some(ffi::SQLITE_CONSTRAINT_UNIQUE) => StoreError::Conflict {
            path: new.path.clone(),
        },
        Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => StoreError::MissingAlbum {
            album_id: new.album_id.clone(),
        },
        _ => StoreError::Sql(err),
    }
}

fn path_text(path: &Path) -> Result<&str, StoreError> {
    path.to_str()
        .ok_or_else(|| StoreError::NonUtf8Path(path.to_path_buf()))
}

fn album_name(dir: &Path) -> String {
    dir.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.to_string_lossy().into_owned())
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn album_from_row(row: &Row<'_>) -> rusqlite::Result<Album> {
    let path: String = row.get(2)?;
    Ok(Album {
        id: row.get(0)?,
        name: row.get(1)?,
        path: PathBuf::from(path),
        photo_count: row.get(3)?,
        size_bytes: row.get(4)?,
        cover_photo_id: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn photo_from_row(row: &Row<'_>) -> rusqlite::Result<Photo> {
    let path: String = row.get(3)?;
    let modified_at: DateTime<Utc> = row.get(10)?;
    let taken_at: Option<DateTime<Utc>> = row.get(8)?;
    Ok(Photo {
        id: row.get(0)?,
        filename: row.get(1)?,
        album_id: row.get(2)?,
        path: PathBuf::from(path),
        size_bytes: row.get(4)?,
        width: row.get(5)?,
        height: row.get(6)?,
        format: row.get(7)?,
        taken_at: taken_at.unwrap_or(modified_at),
        created_at: row.get(9)?,
        modified_at,
        indexed_at: row.get(11)?,
        hash: row.get(12)?,
    })
}

fn scan_job_from_row(row: &Row<'_>) -> rusqlite::Result<ScanJob> {
    Ok(ScanJob {
        id: row.get(0)?,
        status: row.get(1)?,
        photos_found: row.get(2)?,
        photos_added: row.get(3)?,
        photos_updated: row.get(4)?,
        started_at: row.get(5)?,
        completed_at: row.get(6)?,
        error_message: row.get(7)?,
    })
}
