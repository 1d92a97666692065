use log::{debug, error};
use sqlx::{Pool, QueryBuilder, Sqlite};

use crate::{
    BatchError,
    core::item::{ItemWriter, ItemWriterResult},
};

use super::block_on;

/// Builds the statement persisting one record, e.g.
/// `UPDATE users SET level = ? WHERE id = ?`.
///
/// Values must be pushed with `push_bind`.
pub trait SqliteItemBinder<O> {
    fn bind(&self, item: &O, query_builder: &mut QueryBuilder<'_, Sqlite>);
}

/// Persists a chunk with one statement per record, all inside one transaction.
///
/// If any statement fails, the transaction is rolled back and no record of the chunk
/// is persisted.
pub struct SqliteItemWriter<'a, O> {
    pool: &'a Pool<Sqlite>,
    item_binder: &'a dyn SqliteItemBinder<O>,
}

impl<'a, O> SqliteItemWriter<'a, O> {
    pub fn new(pool: &'a Pool<Sqlite>, item_binder: &'a dyn SqliteItemBinder<O>) -> Self {
        Self { pool, item_binder }
    }

    async fn write_in_transaction(&self, items: &[O]) -> Result<(), sqlx::Error> {
        let mut transaction = self.pool.begin().await?;

        for item in items {
            let mut query_builder = QueryBuilder::new("");
            self.item_binder.bind(item, &mut query_builder);
            if let Err(error) = query_builder.build().execute(&mut *transaction).await {
                transaction.rollback().await?;
                return Err(error);
            }
        }

        transaction.commit().await
    }
}

impl<O> ItemWriter<O> for SqliteItemWriter<'_, O> {
    fn write(&self, items: &[O]) -> ItemWriterResult {
        match block_on(self.write_in_transaction(items), BatchError::SinkUnavailable) {
            Ok(()) => {
                debug!("Successfully wrote {} items to SQLite", items.len());
                Ok(())
            }
            Err(err) => {
                error!("Failed to write {} items to SQLite: {}", items.len(), err);
                Err(err)
            }
        }
    }
}
