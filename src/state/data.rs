//! Shared data structures for the catalog
//!
//! These structs represent the data model that flows between
//! the database layer, the indexer and the API layer.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares an opaque, text-backed identifier stored as a UUID string.
macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                self.0.to_sql()
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                String::column_result(value).map(Self)
            }
        }
    };
}

record_id!(
    /// Identifier of an album row.
    AlbumId
);
record_id!(
    /// Identifier of a photo row, stable for the file's lifetime in the index.
    PhotoId
);
record_id!(
    /// Identifier of a full-scan run.
    ScanJobId
);

/// One directory that contains at least one indexed photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub id: AlbumId,
    /// Directory name only (e.g., "2024")
    pub name: String,
    /// Absolute directory path, unique across albums
    pub path: PathBuf,
    /// Number of live photos referencing this album
    pub photo_count: i64,
    /// Summed size of those photos
    pub size_bytes: i64,
    pub cover_photo_id: Option<PhotoId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Album {
    /// URL the API layer serves the cover thumbnail from, if the album has a cover.
    pub fn cover_thumbnail_url(&self) -> Option<String> {
        self.cover_photo_id
            .as_ref()
            .map(|id| format!("/api/v1/photos/{id}/thumbnail"))
    }
}

/// One indexed image file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    pub id: PhotoId,
    /// Filename only (e.g., "IMG_0001.jpg")
    pub filename: String,
    pub album_id: AlbumId,
    /// Full path to the image file
    pub path: PathBuf,
    pub size_bytes: i64,
    /// Pixel width, 0 when unknown
    pub width: u32,
    /// Pixel height, 0 when unknown
    pub height: u32,
    /// Lower-case extension (e.g., "jpg")
    pub format: String,
    /// Best-effort capture time; falls back to the modification time
    pub taken_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub indexed_at: DateTime<Utc>,
    /// Hex-encoded SHA-256 of the file bytes
    pub hash: String,
}

/// Attributes of a photo that is about to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPhoto {
    pub album_id: AlbumId,
    pub path: PathBuf,
    pub filename: String,
    pub size_bytes: i64,
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub taken_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub hash: String,
}

/// Fields rewritten when the file behind a photo changes on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoChanges {
    pub size_bytes: i64,
    pub width: u32,
    pub height: u32,
    pub taken_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub hash: String,
}

/// EXIF-derived attributes, one-to-one with a photo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhotoMetadata {
    pub photo_id: PhotoId,
    pub camera: Option<String>,
    pub lens: Option<String>,
    pub iso: Option<i64>,
    pub exposure: Option<String>,
    pub aperture: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
}

/// Lifecycle of a full scan. Transitions only move forward:
/// `Pending -> Running -> Completed | Failed` (or `Pending -> Failed`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ScanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ScanStatus::Pending => "pending",
            ScanStatus::Running => "running",
            ScanStatus::Completed => "completed",
            ScanStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ScanStatus::Pending),
            "running" => Some(ScanStatus::Running),
            "completed" => Some(ScanStatus::Completed),
            "failed" => Some(ScanStatus::Failed),
            _ => None,
        }
    }

    /// Completed and failed jobs never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, ScanStatus::Completed | ScanStatus::Failed)
    }
}

impl ToSql for ScanStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ScanStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        ScanStatus::parse(text).ok_or_else(|| {
            rusqlite::types::FromSqlError::Other(format!("unknown scan status {text:?}").into())
        })
    }
}

/// Running counters of a scan, persisted on the job row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCounts {
    pub found: u64,
    pub added: u64,
    pub updated: u64,
}

/// One full-scan run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanJob {
    pub id: ScanJobId,
    pub status: ScanStatus,
    pub photos_found: i64,
    pub photos_added: i64,
    pub photos_updated: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// Offset/limit window for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: u32,
    pub limit: u32,
}

impl Page {
    pub const DEFAULT_LIMIT: u32 = 50;
    pub const MAX_LIMIT: u32 = 500;

    pub fn new(offset: u32, limit: u32) -> Self {
        Self {
            offset,
            limit: limit.clamp(1, Self::MAX_LIMIT),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(0, Self::DEFAULT_LIMIT)
    }
}

/// Library-wide totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryStats {
    pub album_count: i64,
    pub photo_count: i64,
    pub total_bytes: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_limit_is_clamped() {
        assert_eq!(Page::new(0, 0).limit, 1);
        assert_eq!(Page::new(10, 10_000).limit, Page::MAX_LIMIT);
        assert_eq!(Page::default().limit, Page::DEFAULT_LIMIT);
    }

    #[test]
    fn test_scan_status_round_trips_text() {
        for status in [
            ScanStatus::Pending,
            ScanStatus::Running,
            ScanStatus::Completed,
            ScanStatus::Failed,
        ] {
            assert_eq!(ScanStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ScanStatus::parse("paused"), None);
        assert!(ScanStatus::Failed.is_terminal());
        assert!(!ScanStatus::Running.is_terminal());
    }

    #[test]
    fn test_cover_thumbnail_url_follows_cover_photo() {
        let now = Utc::now();
        let mut album = Album {
            id: AlbumId::from("a1"),
            name: "2024".to_string(),
            path: PathBuf::from("/photos/2024"),
            photo_count: 0,
            size_bytes: 0,
            cover_photo_id: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(album.cover_thumbnail_url(), None);

        album.cover_photo_id = Some(PhotoId::from("p9"));
        assert_eq!(
            album.cover_thumbnail_url().as_deref(),
            Some("/api/v1/photos/p9/thumbnail")
        );
    }
}
