/// Unit-of-work repositories and the writer committing a chunk through them.
pub mod repository;

#[cfg(feature = "logger")]
/// A writer logging every record, useful for debugging purposes.
pub mod logger;

#[cfg(feature = "csv")]
/// Delimited text writer.
pub mod csv;

#[cfg(feature = "rdbc")]
/// Relational sources, writers and job repository.
pub mod rdbc;
