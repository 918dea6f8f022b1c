//! Full scans of the configured roots.
//!
//! A scan walks every root, feeds each image through the [`Reconciler`], keeps a
//! `scan_jobs` row up to date with running counts and, when the walk finishes
//! uncancelled, sweeps photos that were not seen and prunes empty albums.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use super::classify;
use super::reconciler::{Observation, Reconciled, Reconciler};
use crate::error::IndexError;
use crate::state::data::{ScanCounts, ScanJobId, ScanStatus};
use crate::state::library::StoreError;

/// Outcome of one walked entry that did not reconcile cleanly.
#[derive(Debug)]
pub enum EntryError {
    /// This entry is skipped; the walk continues.
    Skip(IndexError),
    /// The scan cannot continue and the job fails.
    Abort(IndexError),
}

impl From<IndexError> for EntryError {
    fn from(err: IndexError) -> Self {
        if err.is_transient() {
            EntryError::Skip(err)
        } else {
            EntryError::Abort(err)
        }
    }
}

/// Result of a completed scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    pub job_id: ScanJobId,
    pub counts: ScanCounts,
    pub skipped: u64,
    pub removed: usize,
    pub albums_pruned: usize,
}

pub struct Scanner {
    reconciler: Arc<Reconciler>,
    roots: Vec<PathBuf>,
    progress_interval: u64,
    active: Mutex<Option<ScanJobId>>,
}

impl Scanner {
    pub fn new(reconciler: Arc<Reconciler>, roots: Vec<PathBuf>, progress_interval: u64) -> Self {
        Scanner {
            reconciler,
            roots,
            progress_interval: progress_interval.max(1),
            active: Mutex::new(None),
        }
    }

    /// Id of the scan this process is currently running, if any.
    pub fn active_job(&self) -> Option<ScanJobId> {
        self.slot().clone()
    }

    /// Claim the single scan slot and record a `pending` job.
    ///
    /// Fails with [`IndexError::AlreadyRunning`] while another scan is pending or
    /// running, whether in this process or recorded in the catalog.
    pub fn begin(self: &Arc<Self>) -> Result<ScanRun, IndexError> {
        let mut slot = self.slot();
        if let Some(id) = slot.as_ref() {
            return Err(IndexError::AlreadyRunning(id.clone()));
        }

        let library = self.reconciler.library();
        let job_id = match library.record_scan_job_start() {
            Ok(id) => id,
            Err(StoreError::ScanActive) => {
                return Err(match library.active_scan_job()? {
                    Some(job) => IndexError::AlreadyRunning(job.id),
                    None => IndexError::Store(StoreError::ScanActive),
                });
            }
            Err(err) => return Err(err.into()),
        };

        *slot = Some(job_id.clone());
        Ok(ScanRun {
            scanner: Arc::clone(self),
            job_id,
            finished: false,
        })
    }

    fn slot(&self) -> MutexGuard<'_, Option<ScanJobId>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn walk(
        &self,
        job_id: &ScanJobId,
        cancel: &CancellationToken,
        counts: &mut ScanCounts,
    ) -> Result<ScanSummary, IndexError> {
        let library = self.reconciler.library();

        for root in &self.roots {
            fs::read_dir(root).map_err(|source| IndexError::RootUnavailable {
                path: root.clone(),
                source,
            })?;
        }
        library.mark_scan_job_running(job_id)?;
        info!(job_id = %job_id, roots = self.roots.len(), "Scan started");

        let mut observed = HashSet::new();
        let mut protected = Vec::new();
        let mut skipped = 0;
        let mut since_progress = 0;

        for root in &self.roots {
            for entry in WalkDir::new(root).follow_links(false) {
                if cancel.is_cancelled() {
                    return Err(IndexError::Cancelled);
                }

                let visited = match entry {
                    Ok(entry) => self.visit(&entry, &mut observed, counts),
                    Err(err) => {
                        // Whatever sits below an unreadable path was not observed, not deleted.
                        let path = err.path().map(|p| p.to_path_buf());
                        if let Some(path) = &path {
                            protected.push(path.clone());
                        }
                        Err(EntryError::Skip(IndexError::io(
                            path.unwrap_or_else(|| root.clone()),
                            err.into(),
                        )))
                    }
                };
                match visited {
                    Ok(()) => {}
                    Err(EntryError::Skip(err)) => {
                        skipped += 1;
                        debug!(job_id = %job_id, error = %err, "Skipping entry");
                    }
                    Err(EntryError::Abort(err)) => return Err(err),
                }

                since_progress += 1;
                if since_progress >= self.progress_interval {
                    library.record_scan_job_progress(job_id, *counts)?;
                    since_progress = 0;
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(IndexError::Cancelled);
        }

        let removed = self
            .reconciler
            .sweep_unobserved(&self.roots, &observed, &protected)?;
        let albums_pruned = self.reconciler.prune_empty_albums()?;

        Ok(ScanSummary {
            job_id: job_id.clone(),
            counts: *counts,
            skipped,
            removed,
            albums_pruned,
        })
    }

    fn visit(
        &self,
        entry: &DirEntry,
        observed: &mut HashSet<PathBuf>,
        counts: &mut ScanCounts,
    ) -> Result<(), EntryError> {
        let path = entry.path();
        if !entry.file_type().is_file() || !classify::is_image_path(path) {
            return Ok(());
        }

        counts.found += 1;
        observed.insert(path.to_path_buf());

        let metadata = entry
            .metadata()
            .map_err(|err| EntryError::Skip(IndexError::io(path, err.into())))?;
        match self
            .reconciler
            .reconcile(&Observation::from_metadata(path, &metadata))?
        {
            Reconciled::Added(_) => counts.added += 1,
            Reconciled::Updated(_) => counts.updated += 1,
            Reconciled::Unchanged | Reconciled::Ignored => {}
        }
        Ok(())
    }
}

/// A claimed scan slot with its `pending` job row.
///
/// Dropping it without calling [`ScanRun::execute`] fails the job and frees the slot.
pub struct ScanRun {
    scanner: Arc<Scanner>,
    job_id: ScanJobId,
    finished: bool,
}

impl ScanRun {
    pub fn job_id(&self) -> &ScanJobId {
        &self.job_id
    }

    /// Walk every root and finalize the job.
    ///
    /// Per-entry failures are skipped. Only an inaccessible root, a catalog
    /// failure or cancellation fails the job, and none of them run the sweep.
    pub fn execute(mut self, cancel: &CancellationToken) -> Result<ScanSummary, IndexError> {
        let mut counts = ScanCounts::default();
        let result = self.scanner.walk(&self.job_id, cancel, &mut counts);

        let library = self.scanner.reconciler.library();
        if let Err(err) = library.record_scan_job_progress(&self.job_id, counts) {
            warn!(job_id = %self.job_id, error = %err, "Could not record final scan counts");
        }
        // The end write runs whatever happened above; only its success releases Drop.
        let ended = match &result {
            Ok(_) => library.record_scan_job_end(&self.job_id, ScanStatus::Completed, None),
            Err(err) => {
                library.record_scan_job_end(&self.job_id, ScanStatus::Failed, Some(&err.to_string()))
            }
        };
        self.finished = ended.is_ok();

        match &result {
            Ok(summary) => info!(
                job_id = %self.job_id,
                found = summary.counts.found,
                added = summary.counts.added,
                updated = summary.counts.updated,
                removed = summary.removed,
                skipped = summary.skipped,
                "Scan completed"
            ),
            Err(err) => warn!(job_id = %self.job_id, error = %err, "Scan failed"),
        }

        let summary = result?;
        ended?;
        Ok(summary)
    }
}

impl Drop for ScanRun {
    fn drop(&mut self) {
        if !self.finished {
            let library = self.scanner.reconciler.library();
            if let Err(err) =
                library.record_scan_job_end(&self.job_id, ScanStatus::Failed, Some("abandoned"))
            {
                warn!(job_id = %self.job_id, error = %err, "Could not finalize abandoned scan");
            }
        }

        let mut slot = self.scanner.slot();
        if slot.as_ref() == Some(&self.job_id) {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::library::Library;

    fn scanner_for(roots: Vec<PathBuf>) -> Arc<Scanner> {
        let library = Arc::new(Library::open_in_memory().unwrap());
        let reconciler = Arc::new(Reconciler::new(library));
        Arc::new(Scanner::new(reconciler, roots, 2))
    }

    fn job_status(scanner: &Scanner, id: &ScanJobId) -> (ScanStatus, Option<String>) {
        let job = scanner.reconciler.library().scan_job(id).unwrap().unwrap();
        (job.status, job.error_message)
    }

    #[test]
    fn test_scan_counts_and_completes() {
        let dir = tempfile::tempdir().unwrap();
        let album = dir.path().join("2024");
        fs::create_dir(&album).unwrap();
        fs::write(album.join("a.jpg"), b"abc").unwrap();
        fs::write(album.join("b.JPG"), b"defg").unwrap();
        fs::write(album.join("notes.txt"), b"skip me").unwrap();

        let scanner = scanner_for(vec![dir.path().to_path_buf()]);
        let summary = scanner.begin().unwrap().execute(&CancellationToken::new()).unwrap();
        assert_eq!(summary.counts, ScanCounts { found: 2, added: 2, updated: 0 });

        let job = scanner
            .reconciler
            .library()
            .scan_job(&summary.job_id)
            .unwrap()
            .unwrap();
        assert_eq!(job.status, ScanStatus::Completed);
        assert_eq!((job.photos_found, job.photos_added, job.photos_updated), (2, 2, 0));
        assert!(scanner.active_job().is_none());
    }

    #[test]
    fn test_missing_root_fails_the_job() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = scanner_for(vec![dir.path().join("absent")]);
        let run = scanner.begin().unwrap();
        let job_id = run.job_id().clone();

        let err = run.execute(&CancellationToken::new()).unwrap_err();
        assert!(matches!(err, IndexError::RootUnavailable { .. }));
        assert_eq!(job_status(&scanner, &job_id).0, ScanStatus::Failed);
    }

    #[test]
    fn test_cancelled_scan_fails_without_sweeping() {
        let dir = tempfile::tempdir().unwrap();
        let photo = dir.path().join("a.jpg");
        fs::write(&photo, b"abc").unwrap();
        let scanner = scanner_for(vec![dir.path().to_path_buf()]);
        scanner.begin().unwrap().execute(&CancellationToken::new()).unwrap();

        fs::remove_file(&photo).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let run = scanner.begin().unwrap();
        let job_id = run.job_id().clone();
        assert!(matches!(run.execute(&cancel), Err(IndexError::Cancelled)));

        let (status, message) = job_status(&scanner, &job_id);
        assert_eq!(status, ScanStatus::Failed);
        assert_eq!(message.as_deref(), Some("scan was cancelled"));
        let library = scanner.reconciler.library();
        assert!(library.find_photo_by_path(&photo).unwrap().is_some());
    }

    #[test]
    fn test_second_scan_is_rejected_while_one_is_claimed() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = scanner_for(vec![dir.path().to_path_buf()]);

        let run = scanner.begin().unwrap();
        let err = scanner.begin().err().unwrap();
        assert!(matches!(err, IndexError::AlreadyRunning(ref id) if id == run.job_id()));

        drop(run);
        assert!(scanner.active_job().is_none());
        assert!(scanner.begin().is_ok());
    }

    #[test]
    fn test_abandoned_run_is_failed() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = scanner_for(vec![dir.path().to_path_buf()]);
        let run = scanner.begin().unwrap();
        let job_id = run.job_id().clone();
        drop(run);

        let (status, message) = job_status(&scanner, &job_id);
        assert_eq!(status, ScanStatus::Failed);
        assert_eq!(message.as_deref(), Some("abandoned"));
    }

    #[test]
    fn test_failed_count_write_still_finalizes_the_job() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = scanner_for(vec![dir.path().to_path_buf()]);
        scanner
            .reconciler
            .library()
            .execute_batch_for_test(
                "CREATE TRIGGER reject_counts BEFORE UPDATE OF photos_found ON scan_jobs
                 BEGIN SELECT RAISE(ABORT, 'counts rejected'); END;",
            )
            .unwrap();

        let run = scanner.begin().unwrap();
        let job_id = run.job_id().clone();
        run.execute(&CancellationToken::new()).unwrap();

        assert_eq!(job_status(&scanner, &job_id), (ScanStatus::Completed, None));
        assert!(scanner.reconciler.library().active_scan_job().unwrap().is_none());
        assert!(scanner.active_job().is_none());
        assert!(scanner.begin().is_ok());
    }
}
