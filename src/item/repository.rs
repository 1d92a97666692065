//! Repository-style persistence of records.
//!
//! A [`Repository`] hands out units of work. Records saved in a unit of work become
//! visible only once it is committed; a unit of work rolled back, or dropped without
//! being committed, leaves the repository unchanged.

use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard},
};

use log::{debug, warn};

use crate::{
    BatchError,
    core::{
        item::{ItemWriter, ItemWriterResult},
        paging::{Page, PageQuery, PagingItemSource},
    },
};

/// Pending changes of a repository.
pub trait UnitOfWork<T> {
    /// Saves (inserts or updates) one record.
    fn save(&mut self, record: &T) -> Result<(), BatchError>;

    /// Makes every saved record visible at once.
    fn commit(self: Box<Self>) -> Result<(), BatchError>;

    /// Discards every saved record.
    fn rollback(self: Box<Self>) -> Result<(), BatchError> {
        Ok(())
    }
}

pub trait Repository<T> {
    fn begin(&self) -> Result<Box<dyn UnitOfWork<T> + '_>, BatchError>;
}

/// Persists a chunk through a repository: one `save` per record, one commit per chunk.
///
/// The failure of any record rolls the whole chunk back.
pub struct RepositoryItemWriter<'a, T> {
    repository: &'a dyn Repository<T>,
}

impl<'a, T> RepositoryItemWriter<'a, T> {
    pub fn new(repository: &'a dyn Repository<T>) -> Self {
        Self { repository }
    }
}

impl<T> ItemWriter<T> for RepositoryItemWriter<'_, T> {
    fn write(&self, items: &[T]) -> ItemWriterResult {
        let mut unit = self.repository.begin()?;

        for (index, item) in items.iter().enumerate() {
            if let Err(error) = unit.save(item) {
                warn!(
                    "Save of record {} failed, rolling back chunk of {} records",
                    index,
                    items.len()
                );
                if let Err(rollback_error) = unit.rollback() {
                    warn!("Rollback failed: {}", rollback_error);
                }
                return Err(error);
            }
        }

        unit.commit()?;
        debug!("Committed {} records", items.len());
        Ok(())
    }
}

/// Repository kept in memory, keyed and ordered by a key extracted from each record.
///
/// It is also a [`PagingItemSource`] over its records in key order; sort keys of the
/// query are not interpreted.
pub struct InMemoryRepository<K, T> {
    records: Mutex<BTreeMap<K, T>>,
    key: fn(&T) -> K,
}

impl<K: Ord + Clone, T: Clone> InMemoryRepository<K, T> {
    pub fn new(key: fn(&T) -> K) -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            key,
        }
    }

    /// Inserts records directly, outside any unit of work.
    pub fn with_records(self, records: impl IntoIterator<Item = T>) -> Self {
        if let Ok(mut stored) = self.records.lock() {
            for record in records {
                stored.insert((self.key)(&record), record);
            }
        }
        self
    }

    pub fn get(&self, key: &K) -> Option<T> {
        self.lock().ok().and_then(|records| records.get(key).cloned())
    }

    /// Snapshot of every record, in key order.
    pub fn records(&self) -> Vec<T> {
        self.lock()
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<K, T>>, BatchError> {
        self.records
            .lock()
            .map_err(|_| BatchError::SinkUnavailable("repository lock poisoned".to_string()))
    }
}

struct InMemoryUnitOfWork<'r, K, T> {
    repository: &'r InMemoryRepository<K, T>,
    pending: Vec<T>,
}

impl<K: Ord + Clone, T: Clone> UnitOfWork<T> for InMemoryUnitOfWork<'_, K, T> {
    fn save(&mut self, record: &T) -> Result<(), BatchError> {
        self.pending.push(record.clone());
        Ok(())
    }

    fn commit(self: Box<Self>) -> Result<(), BatchError> {
        let InMemoryUnitOfWork {
            repository,
            pending,
        } = *self;

        let mut records = repository.lock()?;
        for record in pending {
            records.insert((repository.key)(&record), record);
        }
        Ok(())
    }
}

impl<K: Ord + Clone, T: Clone> Repository<T> for InMemoryRepository<K, T> {
    fn begin(&self) -> Result<Box<dyn UnitOfWork<T> + '_>, BatchError> {
        Ok(Box::new(InMemoryUnitOfWork {
            repository: self,
            pending: Vec::new(),
        }))
    }
}

impl<K: Ord + Clone, T: Clone> PagingItemSource<T> for InMemoryRepository<K, T> {
    fn read_page(&self, query: &PageQuery) -> Result<Page<T>, BatchError> {
        let records = self
            .records
            .lock()
            .map_err(|_| BatchError::SourceUnavailable("repository lock poisoned".to_string()))?;

        let mut remaining = records.values().skip(query.offset());
        let items: Vec<T> = remaining.by_ref().take(query.page_size()).cloned().collect();
        let has_more = remaining.next().is_some();

        Ok(Page::new(items, has_more))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Account {
        id: u32,
        balance: i64,
    }

    fn account_id(account: &Account) -> u32 {
        account.id
    }

    /// Fails to save any account with a negative balance.
    struct GuardedRepository {
        inner: InMemoryRepository<u32, Account>,
    }

    struct GuardedUnit<'r> {
        inner: Box<dyn UnitOfWork<Account> + 'r>,
    }

    impl UnitOfWork<Account> for GuardedUnit<'_> {
        fn save(&mut self, record: &Account) -> Result<(), BatchError> {
            if record.balance < 0 {
                return Err(BatchError::SinkUnavailable(format!(
                    "constraint violated by account {}",
                    record.id
                )));
            }
            self.inner.save(record)
        }

        fn commit(self: Box<Self>) -> Result<(), BatchError> {
            self.inner.commit()
        }
    }

    impl Repository<Account> for GuardedRepository {
        fn begin(&self) -> Result<Box<dyn UnitOfWork<Account> + '_>, BatchError> {
            Ok(Box::new(GuardedUnit {
                inner: self.inner.begin()?,
            }))
        }
    }

    #[test]
    fn chunk_should_be_committed_as_a_whole() -> Result<(), BatchError> {
        let repository = InMemoryRepository::new(account_id);
        let writer = RepositoryItemWriter::new(&repository);

        writer.write(&[
            Account { id: 2, balance: 10 },
            Account { id: 1, balance: 20 },
        ])?;

        assert_eq!(repository.len(), 2);
        assert_eq!(repository.get(&1), Some(Account { id: 1, balance: 20 }));
        Ok(())
    }

    #[test]
    fn failed_record_should_roll_back_chunk() {
        let repository = GuardedRepository {
            inner: InMemoryRepository::new(account_id),
        };
        let writer = RepositoryItemWriter::new(&repository);

        let result = writer.write(&[
            Account { id: 1, balance: 10 },
            Account { id: 2, balance: -5 },
            Account { id: 3, balance: 10 },
        ]);

        assert!(matches!(result, Err(BatchError::SinkUnavailable(_))));
        assert!(repository.inner.is_empty());
    }

    #[test]
    fn save_should_update_existing_record() -> Result<(), BatchError> {
        let repository =
            InMemoryRepository::new(account_id).with_records([Account { id: 1, balance: 1 }]);

        let mut unit = repository.begin()?;
        unit.save(&Account { id: 1, balance: 99 })?;
        assert_eq!(repository.get(&1), Some(Account { id: 1, balance: 1 }));

        unit.commit()?;
        assert_eq!(repository.get(&1), Some(Account { id: 1, balance: 99 }));
        Ok(())
    }

    #[test]
    fn repository_should_page_in_key_order() -> Result<(), BatchError> {
        let repository = InMemoryRepository::new(account_id).with_records(
            [3, 1, 2].map(|id| Account { id, balance: 0 }),
        );
        let mut cursor = repository.open(PageQuery::new(2))?;

        let ids = |page: Page<Account>| page.items.iter().map(|a| a.id).collect::<Vec<_>>();
        assert_eq!(ids(repository.next_page(&mut cursor)?), vec![1, 2]);
        assert_eq!(ids(repository.next_page(&mut cursor)?), vec![3]);
        assert!(cursor.is_exhausted());
        Ok(())
    }
}
