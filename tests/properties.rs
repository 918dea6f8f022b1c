use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier};
use std::thread;

use photo_indexer::config::ScanConfig;
use photo_indexer::index::hasher::hash_file;
use photo_indexer::index::{Observation, Reconciled, Reconciler, Scanner};
use photo_indexer::state::data::{Page, ScanStatus};
use photo_indexer::{IndexError, Library, PhotoIndex};
use tokio_util::sync::CancellationToken;

fn open_index(root: &Path) -> (Arc<Library>, PhotoIndex) {
    let library = Arc::new(Library::open_in_memory().unwrap());
    let index = PhotoIndex::new(
        Arc::clone(&library),
        vec![root.to_path_buf()],
        &ScanConfig::default(),
    );
    (library, index)
}

/// Every album's stored totals equal the count and sum over its photos.
fn assert_aggregates(library: &Library) {
    let everything = Page::new(0, Page::MAX_LIMIT);
    for album in library.list_albums(everything).unwrap() {
        let photos = library.list_photos_in_album(&album.id, everything).unwrap();
        let size: i64 = photos.iter().map(|photo| photo.size_bytes).sum();
        assert_eq!(album.photo_count, photos.len() as i64, "count of {:?}", album.path);
        assert_eq!(album.size_bytes, size, "size of {:?}", album.path);
        for photo in &photos {
            assert_eq!(photo.path.parent(), Some(album.path.as_path()));
        }
    }
}

#[tokio::test]
async fn test_deleting_files_updates_then_prunes_album() {
    let dir = tempfile::tempdir().unwrap();
    let album_dir = dir.path().join("2024");
    fs::create_dir(&album_dir).unwrap();
    fs::write(album_dir.join("a.jpg"), b"abc").unwrap();
    fs::write(album_dir.join("b.jpg"), b"hello").unwrap();

    let (library, index) = open_index(dir.path());
    index.scan_now().await.unwrap();

    let albums = index.list_albums(Page::default()).unwrap();
    assert_eq!(albums.len(), 1);
    assert_eq!(albums[0].path, album_dir);
    assert_eq!(albums[0].name, "2024");
    assert_eq!((albums[0].photo_count, albums[0].size_bytes), (2, 8));

    fs::remove_file(album_dir.join("a.jpg")).unwrap();
    let summary = index.scan_now().await.unwrap();
    assert_eq!(summary.removed, 1);

    let album = index.album(&albums[0].id).unwrap().unwrap();
    assert_eq!((album.photo_count, album.size_bytes), (1, 5));
    assert_aggregates(&library);

    fs::remove_file(album_dir.join("b.jpg")).unwrap();
    let summary = index.scan_now().await.unwrap();
    assert_eq!(summary.albums_pruned, 1);
    assert!(index.album(&albums[0].id).unwrap().is_none());
    assert_eq!(index.stats().unwrap().album_count, 0);
}

#[tokio::test]
async fn test_album_directory_replaced_by_file() {
    let dir = tempfile::tempdir().unwrap();
    let album_dir = dir.path().join("2024");
    fs::create_dir(&album_dir).unwrap();
    let photo = album_dir.join("a.jpg");
    fs::write(&photo, b"abc").unwrap();

    let (library, index) = open_index(dir.path());
    index.scan_now().await.unwrap();
    assert!(library.find_photo_by_path(&photo).unwrap().is_some());

    fs::remove_dir_all(&album_dir).unwrap();
    fs::write(&album_dir, b"no longer a directory").unwrap();

    let summary = index.scan_now().await.unwrap();
    assert_eq!((summary.removed, summary.albums_pruned), (1, 1));
    assert!(library.find_photo_by_path(&photo).unwrap().is_none());

    // Later scans keep working.
    let summary = index.scan_now().await.unwrap();
    assert_eq!(summary.removed, 0);
    assert_eq!(index.stats().unwrap().photo_count, 0);
}

#[tokio::test]
async fn test_scanned_photos_match_disk() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("trips").join("alps");
    fs::create_dir_all(&nested).unwrap();
    let files = [
        dir.path().join("top.png"),
        dir.path().join("trips").join("map.GIF"),
        nested.join("peak.jpeg"),
        nested.join("lake.webp"),
    ];
    for (i, path) in files.iter().enumerate() {
        fs::write(path, vec![i as u8; 10 + i]).unwrap();
    }
    fs::write(nested.join("itinerary.pdf"), b"not a photo").unwrap();

    let (library, index) = open_index(dir.path());
    let summary = index.scan_now().await.unwrap();
    assert_eq!(summary.counts.found, 4);
    assert_eq!(summary.counts.added, 4);

    for path in &files {
        let photo = library.find_photo_by_path(path).unwrap().unwrap();
        assert_eq!(photo.size_bytes as u64, fs::metadata(path).unwrap().len());
        assert_eq!(photo.hash, hash_file(path).unwrap());
    }
    assert!(library
        .find_photo_by_path(&nested.join("itinerary.pdf"))
        .unwrap()
        .is_none());
    assert_eq!(index.stats().unwrap().album_count, 3);
    assert_aggregates(&library);
}

#[tokio::test]
async fn test_rescan_without_changes_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["a.jpg", "b.png", "c.bmp"] {
        fs::write(dir.path().join(name), name.as_bytes()).unwrap();
    }
    let (library, index) = open_index(dir.path());
    index.scan_now().await.unwrap();

    let page = Page::new(0, Page::MAX_LIMIT);
    let albums_before = library.list_albums(page).unwrap();
    let photos_before = library.list_photos_in_album(&albums_before[0].id, page).unwrap();

    let summary = index.scan_now().await.unwrap();
    assert_eq!((summary.counts.added, summary.counts.updated), (0, 0));
    assert_eq!(summary.counts.found, 3);
    assert_eq!(summary.removed, 0);

    assert_eq!(library.list_albums(page).unwrap(), albums_before);
    assert_eq!(
        library.list_photos_in_album(&albums_before[0].id, page).unwrap(),
        photos_before
    );
}

#[tokio::test]
async fn test_modified_file_is_rehashed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.jpg");
    fs::write(&path, b"first").unwrap();
    let (library, index) = open_index(dir.path());
    index.scan_now().await.unwrap();

    fs::write(&path, b"second version").unwrap();
    let summary = index.scan_now().await.unwrap();
    assert_eq!((summary.counts.added, summary.counts.updated), (0, 1));

    let photo = library.find_photo_by_path(&path).unwrap().unwrap();
    assert_eq!(photo.hash, hash_file(&path).unwrap());
    assert_eq!(photo.size_bytes, 14);
    assert_aggregates(&library);
}

#[test]
fn test_concurrent_reconcile_of_new_path_creates_one_photo() {
    let dir = tempfile::tempdir().unwrap();
    let db = tempfile::tempdir().unwrap();
    let library = Arc::new(Library::open(db.path().join("catalog.db")).unwrap());
    let reconciler = Arc::new(Reconciler::new(Arc::clone(&library)));

    let path = dir.path().join("new").join("a.jpg");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, b"abc").unwrap();
    let observed = Observation::stat(&path).unwrap().unwrap();

    let workers = 8;
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let reconciler = Arc::clone(&reconciler);
            let barrier = Arc::clone(&barrier);
            let observed = observed.clone();
            thread::spawn(move || {
                barrier.wait();
                reconciler.reconcile(&observed).unwrap()
            })
        })
        .collect();
    let outcomes: Vec<Reconciled> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let added = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, Reconciled::Added(_)))
        .count();
    assert_eq!(added, 1);
    assert!(outcomes
        .iter()
        .all(|outcome| matches!(outcome, Reconciled::Added(_) | Reconciled::Unchanged)));

    let stats = library.stats().unwrap();
    assert_eq!((stats.album_count, stats.photo_count), (1, 1));
    assert_aggregates(&library);
}

#[test]
fn test_concurrent_new_files_in_one_album_keep_totals() {
    let dir = tempfile::tempdir().unwrap();
    let library = Arc::new(Library::open_in_memory().unwrap());
    let reconciler = Arc::new(Reconciler::new(Arc::clone(&library)));

    let paths: Vec<PathBuf> = (0..16)
        .map(|i| {
            let path = dir.path().join(format!("{i:02}.jpg"));
            fs::write(&path, vec![0u8; i + 1]).unwrap();
            path
        })
        .collect();

    thread::scope(|scope| {
        for path in &paths {
            let reconciler = &reconciler;
            scope.spawn(move || {
                let observed = Observation::stat(path).unwrap().unwrap();
                reconciler.reconcile(&observed).unwrap();
            });
        }
    });

    let albums = library.list_albums(Page::default()).unwrap();
    assert_eq!(albums.len(), 1);
    assert_eq!(albums[0].photo_count, 16);
    assert_eq!(albums[0].size_bytes, (1..=16).sum::<i64>());
}

#[test]
fn test_second_scan_is_rejected_across_scanners() {
    let dir = tempfile::tempdir().unwrap();
    let library = Arc::new(Library::open_in_memory().unwrap());
    let scanner_for = || {
        let reconciler = Arc::new(Reconciler::new(Arc::clone(&library)));
        Arc::new(Scanner::new(reconciler, vec![dir.path().to_path_buf()], 100))
    };
    let first = scanner_for();
    let second = scanner_for();

    let run = first.begin().unwrap();
    let err = second.begin().err().unwrap();
    assert!(matches!(err, IndexError::AlreadyRunning(ref id) if id == run.job_id()));

    // Still rejected once the first job has moved from pending to running.
    library.mark_scan_job_running(run.job_id()).unwrap();
    let err = second.begin().err().unwrap();
    assert!(matches!(err, IndexError::AlreadyRunning(ref id) if id == run.job_id()));

    let active = library.active_scan_job().unwrap().unwrap();
    assert_eq!(&active.id, run.job_id());

    let summary = run.execute(&CancellationToken::new()).unwrap();
    let job = library.scan_job(&summary.job_id).unwrap().unwrap();
    assert_eq!(job.status, ScanStatus::Completed);
    assert!(second.begin().is_ok());
}
