/// Indexing module
///
/// Keeps the catalog in step with the directory trees on disk:
/// - Content fingerprints (hasher.rs)
/// - Which files count as photos (classify.rs)
/// - Per-path serialization of concurrent work (guard.rs)
/// - Insert / refresh / remove decisions (reconciler.rs)
/// - Full scans and their job records (scanner.rs)
/// - Live filesystem notifications (monitor.rs)

pub mod classify;
pub mod guard;
pub mod hasher;
pub mod monitor;
pub mod reconciler;
pub mod scanner;

pub use monitor::ChangeMonitor;
pub use reconciler::{Observation, Reconciled, Reconciler};
pub use scanner::{ScanRun, ScanSummary, Scanner};
