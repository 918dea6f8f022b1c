/// State management module
///
/// This module owns all persisted catalog state:
/// - Database connection, schema and transactional queries (library.rs)
/// - Shared data structures and typed record ids (data.rs)

pub mod data;
pub mod library;
