//! Live filesystem change monitor.
//!
//! Every directory under the configured roots gets its own non-recursive watch,
//! so directories created later are subscribed as they appear. Notifications
//! pass through a bounded queue that coalesces by path into a per-path debouncer;
//! each settled path is reconciled on the blocking pool, bounded by a semaphore.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::classify;
use super::reconciler::{is_absent, Observation, Reconciler};
use crate::config::WatchConfig;
use crate::error::IndexError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Created, written or moved into place.
    Upsert,
    /// Deleted or moved away.
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl PathChange {
    fn new(path: &Path, kind: ChangeKind) -> Self {
        PathChange {
            path: path.to_path_buf(),
            kind,
        }
    }
}

/// Translate a raw notification into per-path changes.
pub fn changes_from_event(event: &Event) -> Vec<PathChange> {
    let each = |kind: ChangeKind| -> Vec<PathChange> {
        event
            .paths
            .iter()
            .map(|path| PathChange::new(path, kind))
            .collect()
    };

    match &event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => each(ChangeKind::Remove),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
            [from, to] => vec![
                PathChange::new(from, ChangeKind::Remove),
                PathChange::new(to, ChangeKind::Upsert),
            ],
            _ => each(ChangeKind::Upsert),
        },
        EventKind::Create(_) | EventKind::Modify(_) => each(ChangeKind::Upsert),
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => each(ChangeKind::Upsert),
        EventKind::Remove(_) => each(ChangeKind::Remove),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

#[derive(Default)]
struct Queued {
    order: VecDeque<PathBuf>,
    kinds: HashMap<PathBuf, ChangeKind>,
}

/// Bounded hand-off from the watcher callback to the event loop.
///
/// A path holds at most one slot: a newer change for a queued path replaces the
/// older one in place. Only a path not yet queued can be turned away when full.
pub struct ChangeQueue {
    capacity: usize,
    queued: Mutex<Queued>,
    wake: Notify,
}

impl ChangeQueue {
    pub fn new(capacity: usize) -> Self {
        ChangeQueue {
            capacity: capacity.max(1),
            queued: Mutex::new(Queued::default()),
            wake: Notify::new(),
        }
    }

    /// Queue `change`, handing it back if its path is new and the queue is full.
    pub fn push(&self, change: PathChange) -> Result<(), PathChange> {
        let mut queued = self.queued();
        if let Some(kind) = queued.kinds.get_mut(&change.path) {
            *kind = change.kind;
            return Ok(());
        }
        if queued.order.len() >= self.capacity {
            return Err(change);
        }
        queued.order.push_back(change.path.clone());
        queued.kinds.insert(change.path, change.kind);
        drop(queued);
        self.wake.notify_one();
        Ok(())
    }

    /// Take every queued change in arrival order of its path.
    pub fn drain(&self) -> Vec<PathChange> {
        let Queued { order, mut kinds } = std::mem::take(&mut *self.queued());
        order
            .into_iter()
            .filter_map(|path| {
                let kind = kinds.remove(&path)?;
                Some(PathChange { path, kind })
            })
            .collect()
    }

    /// Wait until a push happens. A push made before the call also counts.
    pub async fn notified(&self) {
        self.wake.notified().await;
    }

    pub fn len(&self) -> usize {
        self.queued().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued().order.is_empty()
    }

    fn queued(&self) -> MutexGuard<'_, Queued> {
        self.queued.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Pending {
    kind: ChangeKind,
    first_seen: Instant,
    last_seen: Instant,
}

/// Trailing per-path debounce with an upper bound on total delay.
pub struct Debouncer {
    window: Duration,
    max_wait: Duration,
    capacity: usize,
    pending: HashMap<PathBuf, Pending>,
}

impl Debouncer {
    pub fn new(window: Duration, max_wait: Duration, capacity: usize) -> Self {
        Debouncer {
            window,
            max_wait: max_wait.max(window),
            capacity: capacity.max(1),
            pending: HashMap::new(),
        }
    }

    /// Record a change. A repeated path replaces its pending entry and restarts
    /// the window; a new path at capacity is handed back as dropped.
    pub fn push(&mut self, change: PathChange, now: Instant) -> Result<(), PathChange> {
        if let Some(pending) = self.pending.get_mut(&change.path) {
            pending.kind = change.kind;
            pending.last_seen = now;
            return Ok(());
        }
        if self.pending.len() >= self.capacity {
            return Err(change);
        }
        self.pending.insert(
            change.path,
            Pending {
                kind: change.kind,
                first_seen: now,
                last_seen: now,
            },
        );
        Ok(())
    }

    fn due_at(&self, pending: &Pending) -> Instant {
        (pending.last_seen + self.window).min(pending.first_seen + self.max_wait)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|pending| self.due_at(pending)).min()
    }

    /// Remove and return every change whose deadline has passed, ordered by path.
    pub fn drain_due(&mut self, now: Instant) -> Vec<PathChange> {
        let due: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, pending)| self.due_at(pending) <= now)
            .map(|(path, _)| path.clone())
            .collect();

        let mut changes: Vec<PathChange> = due
            .into_iter()
            .filter_map(|path| {
                let pending = self.pending.remove(&path)?;
                Some(PathChange {
                    path,
                    kind: pending.kind,
                })
            })
            .collect();
        changes.sort_by(|a, b| a.path.cmp(&b.path));
        changes
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Platform watch handle for single directories.
pub trait DirectoryWatch: Send + 'static {
    fn watch_dir(&mut self, dir: &Path) -> notify::Result<()>;
    fn unwatch_dir(&mut self, dir: &Path) -> notify::Result<()>;
}

impl DirectoryWatch for RecommendedWatcher {
    fn watch_dir(&mut self, dir: &Path) -> notify::Result<()> {
        self.watch(dir, RecursiveMode::NonRecursive)
    }

    fn unwatch_dir(&mut self, dir: &Path) -> notify::Result<()> {
        self.unwatch(dir)
    }
}

/// The set of directories currently watched.
pub struct Subscriptions<W> {
    watcher: W,
    watched: BTreeSet<PathBuf>,
}

impl<W: DirectoryWatch> Subscriptions<W> {
    pub fn new(watcher: W) -> Self {
        Subscriptions {
            watcher,
            watched: BTreeSet::new(),
        }
    }

    /// Watch `dir` and every directory below it.
    ///
    /// Each directory is watched before its entries are listed, so a file created
    /// meanwhile is either reported by the watch or returned here. Returns the
    /// image files found.
    pub fn subscribe_tree(&mut self, dir: &Path) -> Vec<PathBuf> {
        let mut images = Vec::new();
        for entry in WalkDir::new(dir).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!(path = %dir.display(), error = %err, "Could not list directory");
                    continue;
                }
            };
            let path = entry.path();
            if entry.file_type().is_dir() {
                if self.watched.contains(path) {
                    continue;
                }
                match self.watcher.watch_dir(path) {
                    Ok(()) => {
                        self.watched.insert(path.to_path_buf());
                    }
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "Could not watch directory")
                    }
                }
            } else if entry.file_type().is_file() && classify::is_image_path(path) {
                images.push(path.to_path_buf());
            }
        }
        images
    }

    /// Stop watching `dir` and everything below it. Returns how many watches were dropped.
    pub fn unsubscribe_tree(&mut self, dir: &Path) -> usize {
        let gone: Vec<PathBuf> = self
            .watched
            .range(dir.to_path_buf()..)
            .take_while(|path| path.starts_with(dir))
            .cloned()
            .collect();
        for path in &gone {
            self.watched.remove(path);
            // The platform usually drops watches on deleted directories by itself.
            if let Err(err) = self.watcher.unwatch_dir(path) {
                debug!(path = %path.display(), error = %err, "Unwatch failed");
            }
        }
        gone.len()
    }

    pub fn is_watched(&self, dir: &Path) -> bool {
        self.watched.contains(dir)
    }

    pub fn len(&self) -> usize {
        self.watched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watched.is_empty()
    }

    /// Drop every watch.
    pub fn clear(&mut self) {
        for path in std::mem::take(&mut self.watched) {
            if let Err(err) = self.watcher.unwatch_dir(&path) {
                debug!(path = %path.display(), error = %err, "Unwatch failed");
            }
        }
    }
}

fn lock<W>(subscriptions: &Mutex<Subscriptions<W>>) -> MutexGuard<'_, Subscriptions<W>> {
    subscriptions.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Reconcile one settled change against what is on disk now.
///
/// The path is re-read rather than trusting the notification kind: an upsert
/// for a path that is gone becomes a removal, and a new directory is subscribed
/// with every image already inside it reconciled.
pub fn apply_change<W: DirectoryWatch>(
    reconciler: &Reconciler,
    subscriptions: &Mutex<Subscriptions<W>>,
    change: &PathChange,
) -> Result<(), IndexError> {
    let path = &change.path;
    // Symlinks are neither followed nor indexed, the same as in a full scan.
    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => {
            let images = lock(subscriptions).subscribe_tree(path);
            for image in images {
                let observed = match Observation::stat(&image) {
                    Ok(Some(observed)) => observed,
                    Ok(None) => continue,
                    Err(err) => {
                        debug!(path = %image.display(), error = %err, "Could not stat file");
                        continue;
                    }
                };
                if let Err(err) = reconciler.reconcile(&observed) {
                    warn!(path = %image.display(), error = %err, "Could not index file in new directory");
                }
            }
            Ok(())
        }
        Ok(metadata) if metadata.is_file() => {
            if !classify::is_image_path(path) {
                return Ok(());
            }
            if change.kind == ChangeKind::Remove {
                debug!(path = %path.display(), "Removed path is back on disk");
            }
            reconciler.reconcile(&Observation::from_metadata(path, &metadata))?;
            Ok(())
        }
        Ok(_) => {
            debug!(path = %path.display(), "Ignoring change to a non-regular file");
            Ok(())
        }
        Err(err) if is_absent(&err) => {
            let was_watched_dir = lock(subscriptions).unsubscribe_tree(path) > 0;
            if was_watched_dir || classify::is_image_path(path) {
                reconciler.remove_path(path)?;
            }
            Ok(())
        }
        Err(err) => Err(IndexError::io(path.clone(), err)),
    }
}

struct Dispatcher<W> {
    reconciler: Arc<Reconciler>,
    subscriptions: Arc<Mutex<Subscriptions<W>>>,
    permits: Arc<Semaphore>,
}

impl<W: DirectoryWatch> Dispatcher<W> {
    /// Reconcile `change` on its own task so a slow path never holds up others.
    fn dispatch(&self, change: PathChange) {
        let reconciler = Arc::clone(&self.reconciler);
        let subscriptions = Arc::clone(&self.subscriptions);
        let permits = Arc::clone(&self.permits);

        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            let path = change.path.clone();
            let applied = tokio::task::spawn_blocking(move || {
                apply_change(&reconciler, &subscriptions, &change)
            })
            .await;

            match applied {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    warn!(path = %path.display(), error = %err, "Dropping change that failed to reconcile")
                }
                Err(err) => warn!(path = %path.display(), error = %err, "Change handler panicked"),
            }
        });
    }
}

async fn run_loop<W: DirectoryWatch>(
    queue: Arc<ChangeQueue>,
    mut debouncer: Debouncer,
    dispatcher: Dispatcher<W>,
    cancel: CancellationToken,
) {
    loop {
        let deadline = debouncer.next_deadline();
        let settle = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = queue.notified() => {
                let now = Instant::now();
                for change in queue.drain() {
                    if let Err(dropped) = debouncer.push(change, now) {
                        warn!(path = %dropped.path.display(), pending = debouncer.len(), "Too many pending changes, dropping notification");
                    }
                }
            }
            _ = settle => {
                for change in debouncer.drain_due(Instant::now()) {
                    dispatcher.dispatch(change);
                }
            }
        }
    }
    debug!(pending = debouncer.len(), "Change monitor loop stopped");
}

/// Running change monitor. Must be started from within a Tokio runtime.
pub struct ChangeMonitor {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    subscriptions: Arc<Mutex<Subscriptions<RecommendedWatcher>>>,
}

impl ChangeMonitor {
    pub fn start(
        reconciler: Arc<Reconciler>,
        roots: &[PathBuf],
        config: &WatchConfig,
    ) -> Result<Self, IndexError> {
        let queue = Arc::new(ChangeQueue::new(config.queue_capacity));
        let sender = Arc::clone(&queue);
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for change in changes_from_event(&event) {
                    if let Err(change) = sender.push(change) {
                        warn!(path = %change.path.display(), queued = sender.len(), "Change queue full, dropping notification");
                    }
                }
            }
            Err(err) => warn!(error = %err, "Filesystem watch error"),
        })?;

        let mut subscriptions = Subscriptions::new(watcher);
        for root in roots {
            // Existing files are the scanner's job; only the watches matter here.
            subscriptions.subscribe_tree(root);
            if !subscriptions.is_watched(root) {
                warn!(path = %root.display(), "Photo root is not being watched");
            }
        }
        info!(roots = roots.len(), directories = subscriptions.len(), "Change monitor started");

        let subscriptions = Arc::new(Mutex::new(subscriptions));
        let dispatcher = Dispatcher {
            reconciler,
            subscriptions: Arc::clone(&subscriptions),
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
        };
        let debouncer = Debouncer::new(
            Duration::from_millis(config.debounce_ms),
            Duration::from_millis(config.max_wait_ms),
            config.max_pending,
        );
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_loop(queue, debouncer, dispatcher, cancel.clone()));

        Ok(ChangeMonitor {
            cancel,
            task,
            subscriptions,
        })
    }

    pub fn watched_directories(&self) -> usize {
        lock(&self.subscriptions).len()
    }

    /// Stop the event loop and drop every watch. Changes still pending are discarded.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(err) = self.task.await {
            warn!(error = %err, "Change monitor task failed");
        }
        lock(&self.subscriptions).clear();
        info!("Change monitor stopped");
    }
}
