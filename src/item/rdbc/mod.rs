//! Relational database support, built on `sqlx`.
//!
//! Sources, writers and the job repository are synchronous, like the rest of the batch
//! engine: each database call is driven to completion with [`block_on`]. Inside a Tokio
//! runtime this uses `block_in_place`, which requires the multi-threaded runtime
//! (`#[tokio::main]`, or `#[tokio::test(flavor = "multi_thread")]` in tests).

use std::future::Future;

use tokio::runtime::{Builder, Handle};

use crate::BatchError;

#[cfg(feature = "rdbc-sqlite")]
pub mod sqlite_reader;

#[cfg(feature = "rdbc-sqlite")]
pub mod sqlite_writer;

#[cfg(feature = "rdbc-sqlite")]
pub mod sqlite_job_repository;

#[cfg(feature = "rdbc-sqlite")]
pub use sqlite_job_repository::SqliteJobRepository;
#[cfg(feature = "rdbc-sqlite")]
pub use sqlite_reader::{RowMapper, SqlitePagingItemSource, SqlitePagingItemSourceBuilder};
#[cfg(feature = "rdbc-sqlite")]
pub use sqlite_writer::{SqliteItemBinder, SqliteItemWriter};

/// Runs a database future to completion from synchronous code, mapping its error with
/// `unavailable` (for example [`BatchError::SourceUnavailable`]).
#[cfg(feature = "rdbc-sqlite")]
pub(crate) fn block_on<F, T>(future: F, unavailable: fn(String) -> BatchError) -> Result<T, BatchError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    let result = match Handle::try_current() {
        Ok(handle) => tokio::task::block_in_place(|| handle.block_on(future)),
        Err(_) => Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|error| unavailable(error.to_string()))?
            .block_on(future),
    };

    result.map_err(|error| unavailable(error.to_string()))
}
