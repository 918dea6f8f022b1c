//! Photo indexer: keeps a SQLite catalog of albums and photos in sync with
//! directory trees on disk, through full scans and live change notifications.

pub mod config;
pub mod error;
pub mod index;
pub mod logging;
pub mod service;
pub mod state;

pub use config::Config;
pub use error::IndexError;
pub use service::PhotoIndex;
pub use state::library::{Library, StoreError};
