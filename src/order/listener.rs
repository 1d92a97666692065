use std::cell::Cell;

use chrono::NaiveDate;
use log::info;
use sqlx::{Pool, Row, Sqlite};

use crate::{
    BatchError,
    core::{job::StepExecutionListener, parameters::JobParameters, step::StepExecution},
    item::rdbc::block_on,
};

/// Reports how many users were leveled up on `today` once the level-up step ends.
pub struct LevelUpListener<'a> {
    pool: &'a Pool<Sqlite>,
    today: NaiveDate,
    updated: Cell<Option<i64>>,
}

impl<'a> LevelUpListener<'a> {
    pub fn new(pool: &'a Pool<Sqlite>, today: NaiveDate) -> Self {
        Self {
            pool,
            today,
            updated: Cell::new(None),
        }
    }

    /// Number of users found updated by the last notification.
    pub fn updated_count(&self) -> Option<i64> {
        self.updated.get()
    }
}

impl StepExecutionListener for LevelUpListener<'_> {
    fn after_step(
        &self,
        step_execution: &StepExecution,
        _parameters: &JobParameters,
    ) -> Result<(), BatchError> {
        let row = block_on(
            sqlx::query("SELECT count(*) FROM users WHERE updated_date = ?")
                .bind(self.today)
                .fetch_one(self.pool),
            BatchError::SourceUnavailable,
        )?;
        let count: i64 = row
            .try_get(0)
            .map_err(|error| BatchError::SourceUnavailable(error.to_string()))?;
        self.updated.set(Some(count));

        info!(
            "User level update: {} users updated on {}, step {} took {}ms",
            count,
            self.today,
            step_execution.name,
            step_execution.duration.as_millis()
        );
        Ok(())
    }
}
