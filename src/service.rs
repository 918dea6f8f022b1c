//! Operations offered to the HTTP API layer.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ScanConfig;
use crate::error::IndexError;
use crate::index::{Reconciler, ScanRun, ScanSummary, Scanner};
use crate::state::data::{
    Album, AlbumId, LibraryStats, Page, Photo, PhotoId, ScanJob, ScanJobId,
};
use crate::state::library::{Library, StoreError};

/// Catalog handle shared by the API layer: scan control plus read queries.
pub struct PhotoIndex {
    library: Arc<Library>,
    reconciler: Arc<Reconciler>,
    scanner: Arc<Scanner>,
    /// Parent of every running scan's token; swapped for a fresh one on cancel.
    scans: Mutex<CancellationToken>,
}

impl PhotoIndex {
    pub fn new(library: Arc<Library>, roots: Vec<PathBuf>, scan: &ScanConfig) -> Self {
        let reconciler = Arc::new(Reconciler::new(Arc::clone(&library)));
        let scanner = Arc::new(Scanner::new(
            Arc::clone(&reconciler),
            roots,
            scan.progress_interval,
        ));
        PhotoIndex {
            library,
            reconciler,
            scanner,
            scans: Mutex::new(CancellationToken::new()),
        }
    }

    /// The reconciler shared with the change monitor.
    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    // ========== Scans ==========

    /// Start a full scan in the background and return its job id.
    /// Fails with [`IndexError::AlreadyRunning`] while another scan is active.
    pub fn trigger_scan(&self) -> Result<ScanJobId, IndexError> {
        let run = self.scanner.begin()?;
        let job_id = run.job_id().clone();
        let cancel = self.scan_token();

        let background_id = job_id.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(err) = run.execute(&cancel) {
                debug!(job_id = %background_id, error = %err, "Background scan returned an error");
            }
        });
        info!(job_id = %job_id, "Scan triggered");
        Ok(job_id)
    }

    /// Run a full scan and wait for it to finish.
    pub async fn scan_now(&self) -> Result<ScanSummary, IndexError> {
        let run: ScanRun = self.scanner.begin()?;
        let cancel = self.scan_token();
        match tokio::task::spawn_blocking(move || run.execute(&cancel)).await {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => Err(IndexError::Cancelled),
        }
    }

    /// Cancel every scan started so far. Later scans are unaffected.
    pub fn cancel_scans(&self) {
        let mut scans = self.scans();
        scans.cancel();
        *scans = CancellationToken::new();
        if let Some(job_id) = self.scanner.active_job() {
            warn!(job_id = %job_id, "Cancelling scan");
        }
    }

    pub fn scan_status(&self, id: &ScanJobId) -> Result<Option<ScanJob>, StoreError> {
        self.library.scan_job(id)
    }

    fn scan_token(&self) -> CancellationToken {
        self.scans().child_token()
    }

    fn scans(&self) -> MutexGuard<'_, CancellationToken> {
        self.scans.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ========== Queries ==========

    pub fn list_albums(&self, page: Page) -> Result<Vec<Album>, StoreError> {
        self.library.list_albums(page)
    }

    pub fn album(&self, id: &AlbumId) -> Result<Option<Album>, StoreError> {
        self.library.album(id)
    }

    pub fn list_photos_in_album(
        &self,
        album_id: &AlbumId,
        page: Page,
    ) -> Result<Vec<Photo>, StoreError> {
        self.library.list_photos_in_album(album_id, page)
    }

    pub fn photo(&self, id: &PhotoId) -> Result<Option<Photo>, StoreError> {
        self.library.photo(id)
    }

    /// Other photos with the same content as `id`, or `None` if `id` isn't indexed.
    pub fn find_duplicates(&self, id: &PhotoId) -> Result<Option<Vec<Photo>>, StoreError> {
        let Some(photo) = self.library.photo(id)? else {
            return Ok(None);
        };
        let mut twins = self.library.photos_with_hash(&photo.hash)?;
        twins.retain(|twin| twin.id != photo.id);
        Ok(Some(twins))
    }

    pub fn stats(&self) -> Result<LibraryStats, StoreError> {
        self.library.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::data::ScanStatus;
    use std::fs;
    use std::time::Duration;

    fn index_for(root: &std::path::Path) -> PhotoIndex {
        let library = Arc::new(Library::open_in_memory().unwrap());
        PhotoIndex::new(library, vec![root.to_path_buf()], &ScanConfig::default())
    }

    #[tokio::test]
    async fn test_scan_now_then_query() {
        let dir = tempfile::tempdir().unwrap();
        let album = dir.path().join("2024");
        fs::create_dir(&album).unwrap();
        fs::write(album.join("a.jpg"), b"same").unwrap();
        fs::write(album.join("b.jpg"), b"same").unwrap();
        fs::write(album.join("c.jpg"), b"other").unwrap();

        let index = index_for(dir.path());
        let summary = index.scan_now().await.unwrap();
        assert_eq!(summary.counts.added, 3);

        let albums = index.list_albums(Page::default()).unwrap();
        assert_eq!(albums.len(), 1);
        assert!(albums[0].cover_thumbnail_url().is_some());

        let photos = index.list_photos_in_album(&albums[0].id, Page::default()).unwrap();
        assert_eq!(photos.len(), 3);

        let a = photos.iter().find(|p| p.filename == "a.jpg").unwrap();
        let twins = index.find_duplicates(&a.id).unwrap().unwrap();
        assert_eq!(twins.len(), 1);
        assert_eq!(twins[0].filename, "b.jpg");
        assert_eq!(index.find_duplicates(&PhotoId::from("missing")).unwrap(), None);

        let stats = index.stats().unwrap();
        assert_eq!((stats.album_count, stats.photo_count, stats.total_bytes), (1, 3, 13));
    }

    #[tokio::test]
    async fn test_trigger_scan_records_completion() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.png"), b"abc").unwrap();
        let index = index_for(dir.path());

        let job_id = index.trigger_scan().unwrap();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let job = index.scan_status(&job_id).unwrap().unwrap();
            if job.status.is_terminal() {
                assert_eq!(job.status, ScanStatus::Completed);
                assert_eq!(job.photos_added, 1);
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "scan did not finish");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn test_failed_background_scan_frees_the_slot() {
        let dir = tempfile::tempdir().unwrap();
        let index = index_for(&dir.path().join("absent"));

        let job_id = index.trigger_scan().unwrap();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while !index.scan_status(&job_id).unwrap().unwrap().status.is_terminal() {
            assert!(tokio::time::Instant::now() < deadline, "scan did not finish");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(index.scan_status(&job_id).unwrap().unwrap().status, ScanStatus::Failed);

        // The run drops its slot after finalizing, so wait for that too.
        while index.scanner.active_job().is_some() {
            assert!(tokio::time::Instant::now() < deadline, "slot was not released");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(index.trigger_scan().is_ok());
    }

    #[tokio::test]
    async fn test_cancel_only_affects_running_scans() {
        let dir = tempfile::tempdir().unwrap();
        let index = index_for(dir.path());

        let old_token = index.scan_token();
        index.cancel_scans();
        assert!(old_token.is_cancelled());
        assert!(!index.scan_token().is_cancelled());
        assert!(index.scan_now().await.is_ok());
    }
}
