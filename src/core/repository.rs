use std::{collections::HashMap, fmt, str::FromStr, sync::Mutex};

use log::debug;

use crate::BatchError;

/// Status of a job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Starting,
    InProgress,
    Completed,
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Starting => "STARTING",
            BatchStatus::InProgress => "IN_PROGRESS",
            BatchStatus::Completed => "COMPLETED",
            BatchStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = BatchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "STARTING" => Ok(BatchStatus::Starting),
            "IN_PROGRESS" => Ok(BatchStatus::InProgress),
            "COMPLETED" => Ok(BatchStatus::Completed),
            "FAILED" => Ok(BatchStatus::Failed),
            other => Err(BatchError::Repository(format!(
                "unknown batch status: {}",
                other
            ))),
        }
    }
}

/// Storage of job run identifiers and their status.
///
/// Run ids are allocated per job name, starting at 1, and never reused. Implementations
/// must allocate atomically: two concurrent launches of the same job get distinct ids.
pub trait JobRepository: Send + Sync {
    /// Allocates a fresh run id for `job_name`, recorded with status `Starting`.
    fn next_run_id(&self, job_name: &str) -> Result<u64, BatchError>;

    fn update_status(
        &self,
        job_name: &str,
        run_id: u64,
        status: BatchStatus,
    ) -> Result<(), BatchError>;

    fn find_status(&self, job_name: &str, run_id: u64) -> Result<Option<BatchStatus>, BatchError>;
}

/// Job repository kept in process memory.
#[derive(Default)]
pub struct InMemoryJobRepository {
    runs: Mutex<HashMap<String, Vec<BatchStatus>>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<BatchStatus>>>, BatchError> {
        self.runs
            .lock()
            .map_err(|_| BatchError::Repository("job repository lock poisoned".to_string()))
    }
}

impl JobRepository for InMemoryJobRepository {
    fn next_run_id(&self, job_name: &str) -> Result<u64, BatchError> {
        let mut runs = self.lock()?;
        let statuses = runs.entry(job_name.to_string()).or_default();
        statuses.push(BatchStatus::Starting);
        Ok(statuses.len() as u64)
    }

    fn update_status(
        &self,
        job_name: &str,
        run_id: u64,
        status: BatchStatus,
    ) -> Result<(), BatchError> {
        let mut runs = self.lock()?;
        let slot = runs
            .get_mut(job_name)
            .and_then(|statuses| statuses.get_mut((run_id as usize).wrapping_sub(1)))
            .ok_or_else(|| {
                BatchError::Repository(format!("unknown run {} of job {}", run_id, job_name))
            })?;
        *slot = status;
        Ok(())
    }

    fn find_status(&self, job_name: &str, run_id: u64) -> Result<Option<BatchStatus>, BatchError> {
        let runs = self.lock()?;
        Ok(runs
            .get(job_name)
            .and_then(|statuses| statuses.get((run_id as usize).wrapping_sub(1)))
            .copied())
    }
}

/// Gives each launch of a job a fresh, monotonically increasing run id, drawn from an
/// injected [`JobRepository`].
pub struct RunIdIncrementer<'a> {
    repository: &'a dyn JobRepository,
}

impl<'a> RunIdIncrementer<'a> {
    pub fn new(repository: &'a dyn JobRepository) -> Self {
        Self { repository }
    }

    pub fn next(&self, job_name: &str) -> Result<u64, BatchError> {
        let run_id = self.repository.next_run_id(job_name)?;
        debug!("Allocated run {} for job {}", run_id, job_name);
        Ok(run_id)
    }

    pub fn repository(&self) -> &'a dyn JobRepository {
        self.repository
    }
}
