//! The decision core: resolves one observed filesystem entry against the catalog.
//!
//! Both the scanner and the change monitor feed entries through a shared
//! [`Reconciler`]. It is the only writer of photo and album rows.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::classify;
use super::guard::PathLocks;
use super::hasher;
use crate::error::IndexError;
use crate::state::data::{NewPhoto, PhotoChanges, PhotoId};
use crate::state::library::{Library, StoreError};

/// Attributes of a file as seen on disk at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified: DateTime<Utc>,
    pub created: Option<DateTime<Utc>>,
}

impl Observation {
    pub fn from_metadata(path: impl Into<PathBuf>, metadata: &fs::Metadata) -> Self {
        Observation {
            path: path.into(),
            size_bytes: metadata.len(),
            // A fixed fallback keeps repeated observations comparable.
            modified: metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| DateTime::<Utc>::from(SystemTime::UNIX_EPOCH)),
            created: metadata.created().ok().map(DateTime::<Utc>::from),
        }
    }

    /// Stat `path`. Returns `None` when it does not exist.
    pub fn stat(path: &Path) -> io::Result<Option<Self>> {
        match fs::metadata(path) {
            Ok(metadata) => Ok(Some(Self::from_metadata(path, &metadata))),
            Err(err) if is_absent(&err) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// Whether a stat failure means nothing exists at the path.
///
/// `NotADirectory` shows up when an ancestor directory was replaced by a file.
pub(crate) fn is_absent(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}

/// What reconciling one observation did to the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    Added(PhotoId),
    Updated(PhotoId),
    Unchanged,
    /// Not an indexable image; the store was not touched.
    Ignored,
}

pub struct Reconciler {
    library: Arc<Library>,
    locks: PathLocks,
}

impl Reconciler {
    pub fn new(library: Arc<Library>) -> Self {
        Reconciler {
            library,
            locks: PathLocks::new(),
        }
    }

    pub fn library(&self) -> &Arc<Library> {
        &self.library
    }

    /// Insert, refresh or skip the photo at `observed.path`.
    ///
    /// Concurrent calls for the same path run one after the other. An unreadable
    /// or vanished file fails with a transient [`IndexError::Io`] and leaves the
    /// catalog untouched.
    pub fn reconcile(&self, observed: &Observation) -> Result<Reconciled, IndexError> {
        let Some(format) = classify::format_of(&observed.path) else {
            return Ok(Reconciled::Ignored);
        };
        let _lock = self.locks.lock(&observed.path);

        match self.library.find_photo_by_path(&observed.path)? {
            Some(existing) => self.refresh(
                existing.id,
                existing.size_bytes,
                existing.modified_at,
                observed,
            ),
            None => self.add(observed, format),
        }
    }

    fn add(&self, observed: &Observation, format: String) -> Result<Reconciled, IndexError> {
        let path = &observed.path;
        let Some(dir) = path.parent() else {
            return Ok(Reconciled::Ignored);
        };

        let hash = hasher::hash_file(path)?;
        let (width, height) = classify::probe_dimensions(path);
        let mut album_id = self.library.upsert_album_for_path(dir)?;

        // The album may be pruned by an end-of-scan sweep between the upsert
        // and the insert; one re-upsert settles it.
        for attempt in 0..2 {
            let new = NewPhoto {
                album_id: album_id.clone(),
                path: path.clone(),
                filename: file_name(path),
                size_bytes: size_as_i64(observed.size_bytes),
                width,
                height,
                format: format.clone(),
                taken_at: observed.modified,
                created_at: observed.created.unwrap_or(observed.modified),
                modified_at: observed.modified,
                hash: hash.clone(),
            };

            match self.library.insert_photo(&new) {
                Ok(photo) => {
                    debug!(path = %path.display(), photo_id = %photo.id, "Indexed new photo");
                    return Ok(Reconciled::Added(photo.id));
                }
                Err(StoreError::Conflict { .. }) => {
                    return match self.library.find_photo_by_path(path)? {
                        Some(existing) => self.refresh(
                            existing.id,
                            existing.size_bytes,
                            existing.modified_at,
                            observed,
                        ),
                        None => Err(IndexError::Conflict(path.clone())),
                    };
                }
                Err(StoreError::MissingAlbum { .. }) if attempt == 0 => {
                    album_id = self.library.upsert_album_for_path(dir)?;
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(IndexError::Store(StoreError::MissingAlbum { album_id }))
    }

    fn refresh(
        &self,
        id: PhotoId,
        stored_size: i64,
        stored_modified: DateTime<Utc>,
        observed: &Observation,
    ) -> Result<Reconciled, IndexError> {
        let size_bytes = size_as_i64(observed.size_bytes);
        if stored_size == size_bytes && stored_modified == observed.modified {
            return Ok(Reconciled::Unchanged);
        }

        let hash = hasher::hash_file(&observed.path)?;
        let (width, height) = classify::probe_dimensions(&observed.path);
        let changes = PhotoChanges {
            size_bytes,
            width,
            height,
            taken_at: observed.modified,
            modified_at: observed.modified,
            hash,
        };

        if self.library.update_photo(&id, &changes)? {
            debug!(path = %observed.path.display(), photo_id = %id, "Refreshed changed photo");
            Ok(Reconciled::Updated(id))
        } else {
            Err(IndexError::Conflict(observed.path.clone()))
        }
    }

    /// Remove the photo at `path`, or every photo below it when `path` was a directory.
    ///
    /// Each photo is removed only once its file is confirmed absent on disk.
    /// Returns the number of photos removed. Albums left empty are kept.
    pub fn remove_path(&self, path: &Path) -> Result<usize, IndexError> {
        if let Some(photo) = self.library.find_photo_by_path(path)? {
            return Ok(usize::from(self.remove_if_absent(&photo.id, path)?));
        }

        let mut removed = 0;
        for (id, photo_path) in self.library.live_photo_paths()? {
            if !photo_path.starts_with(path) {
                continue;
            }
            match self.remove_if_absent(&id, &photo_path) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(err) if err.is_transient() => {
                    warn!(path = %photo_path.display(), error = %err, "Kept photo that could not be checked");
                }
                Err(err) => return Err(err),
            }
        }
        if removed > 0 {
            debug!(path = %path.display(), removed, "Removed photos under vanished directory");
        }
        Ok(removed)
    }

    /// End-of-scan removal sweep.
    ///
    /// Considers only photos under `roots`. Skips paths in `observed` and paths
    /// below any `protected` directory the walk could not read.
    pub fn sweep_unobserved(
        &self,
        roots: &[PathBuf],
        observed: &HashSet<PathBuf>,
        protected: &[PathBuf],
    ) -> Result<usize, IndexError> {
        let mut removed = 0;
        for (id, path) in self.library.live_photo_paths()? {
            let in_scope = roots.iter().any(|root| path.starts_with(root));
            if !in_scope || observed.contains(&path) {
                continue;
            }
            if protected.iter().any(|dir| path.starts_with(dir)) {
                continue;
            }
            match self.remove_if_absent(&id, &path) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                // Kept until a later scan can confirm it is gone.
                Err(err) if err.is_transient() => {
                    warn!(path = %path.display(), error = %err, "Kept photo that could not be checked");
                }
                Err(err) => return Err(err),
            }
        }
        if removed > 0 {
            info!(removed, "Removed photos no longer on disk");
        }
        Ok(removed)
    }

    pub fn prune_empty_albums(&self) -> Result<usize, IndexError> {
        let pruned = self.library.prune_empty_albums()?;
        if pruned > 0 {
            info!(pruned, "Pruned empty albums");
        }
        Ok(pruned)
    }

    fn remove_if_absent(&self, id: &PhotoId, path: &Path) -> Result<bool, IndexError> {
        let _lock = self.locks.lock(path);
        match fs::symlink_metadata(path) {
            Ok(_) => return Ok(false),
            Err(err) if is_absent(&err) => {}
            Err(err) => return Err(IndexError::io(path, err)),
        }
        let removed = self.library.remove_photo(id)?;
        if removed {
            debug!(path = %path.display(), photo_id = %id, "Removed photo");
        }
        Ok(removed)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn size_as_i64(size: u64) -> i64 {
    i64::try_from(size).unwrap_or(i64::MAX)
}
