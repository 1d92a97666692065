use sqlx::{Pool, Row, Sqlite};

use crate::{
    BatchError,
    core::repository::{BatchStatus, JobRepository},
};

use super::block_on;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS batch_job_run (
    job_name TEXT NOT NULL,
    run_id INTEGER NOT NULL,
    status TEXT NOT NULL,
    PRIMARY KEY (job_name, run_id)
)";

/// Job repository stored in the `batch_job_run` table, so run ids keep increasing
/// across processes sharing the database.
pub struct SqliteJobRepository {
    pool: Pool<Sqlite>,
}

impl SqliteJobRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Creates the `batch_job_run` table if needed.
    pub fn initialize(&self) -> Result<(), BatchError> {
        block_on(
            sqlx::query(CREATE_TABLE).execute(&self.pool),
            BatchError::Repository,
        )?;
        Ok(())
    }
}

impl JobRepository for SqliteJobRepository {
    fn next_run_id(&self, job_name: &str) -> Result<u64, BatchError> {
        // a single statement, so concurrent launches cannot get the same id
        let row = block_on(
            sqlx::query(
                "INSERT INTO batch_job_run (job_name, run_id, status)
                 SELECT ?1, COALESCE(MAX(run_id), 0) + 1, ?2 FROM batch_job_run WHERE job_name = ?1
                 RETURNING run_id",
            )
            .bind(job_name)
            .bind(BatchStatus::Starting.as_str())
            .fetch_one(&self.pool),
            BatchError::Repository,
        )?;

        let run_id: i64 = row
            .try_get(0)
            .map_err(|error| BatchError::Repository(error.to_string()))?;
        u64::try_from(run_id).map_err(|error| BatchError::Repository(error.to_string()))
    }

    fn update_status(
        &self,
        job_name: &str,
        run_id: u64,
        status: BatchStatus,
    ) -> Result<(), BatchError> {
        let result = block_on(
            sqlx::query("UPDATE batch_job_run SET status = ? WHERE job_name = ? AND run_id = ?")
                .bind(status.as_str())
                .bind(job_name)
                .bind(run_id as i64)
                .execute(&self.pool),
            BatchError::Repository,
        )?;

        if result.rows_affected() == 0 {
            return Err(BatchError::Repository(format!(
                "unknown run {} of job {}",
                run_id, job_name
            )));
        }
        Ok(())
    }

    fn find_status(&self, job_name: &str, run_id: u64) -> Result<Option<BatchStatus>, BatchError> {
        let row = block_on(
            sqlx::query("SELECT status FROM batch_job_run WHERE job_name = ? AND run_id = ?")
                .bind(job_name)
                .bind(run_id as i64)
                .fetch_optional(&self.pool),
            BatchError::Repository,
        )?;

        match row {
            Some(row) => {
                let status: String = row
                    .try_get(0)
                    .map_err(|error| BatchError::Repository(error.to_string()))?;
                status.parse().map(Some)
            }
            None => Ok(None),
        }
    }
}
