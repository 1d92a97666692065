use chrono::{Local, NaiveDate};
use log::info;
use sqlx::{Pool, Sqlite};

use crate::{
    BatchError,
    config::BatchConfig,
    core::{
        flow::{CONTINUE, JobParametersDecider},
        job::{Job, JobBuilder, JobExecution},
        paging::{Order as SortOrder, PageQuery},
        parameters::JobParameters,
        repository::{JobRepository, RunIdIncrementer},
        step::StepBuilder,
    },
    item::{
        csv::CsvItemWriterBuilder,
        rdbc::{SqliteItemWriter, SqlitePagingItemSourceBuilder},
    },
};

use super::{
    listener::LevelUpListener,
    seed::SaveUserTasklet,
    statistics::{
        OrderStatistics, OrderStatisticsFieldExtractor, OrderStatisticsRowMapper,
        STATISTICS_FROM_CLAUSE, STATISTICS_GROUP_CLAUSE, STATISTICS_HEADER,
        STATISTICS_SELECT_CLAUSE, STATISTICS_WHERE_CLAUSE, statistics_month, statistics_query,
    },
    user::{
        LevelUpProcessor, USER_FROM_CLAUSE, USER_GROUP_CLAUSE, USER_SELECT_CLAUSE, User,
        UserLevelUpBinder, UserRowMapper,
    },
};

pub const USER_JOB_NAME: &str = "userJob";
pub const USER_STEP: &str = "userStep";
pub const USER_LEVEL_UP_STEP: &str = "userLevelUpStep";
pub const DATE_DECISION: &str = "dateDecision";
pub const ORDER_STATISTICS_STEP: &str = "orderStatisticsStep";

/// Launches `userJob`:
///
/// 1. `userStep` seeds the users and their orders,
/// 2. `userLevelUpStep` levels up every eligible user, chunk by chunk,
/// 3. `dateDecision` continues only when a `date` (`yyyy-MM`) parameter is given,
/// 4. `orderStatisticsStep` writes the daily order totals of that month to a CSV file.
///
/// The job's components borrow each other, so they are assembled anew for every launch.
pub struct UserJobLauncher<'a> {
    pool: &'a Pool<Sqlite>,
    config: &'a BatchConfig,
    repository: &'a dyn JobRepository,
    today: NaiveDate,
}

impl<'a> UserJobLauncher<'a> {
    pub fn new(
        pool: &'a Pool<Sqlite>,
        config: &'a BatchConfig,
        repository: &'a dyn JobRepository,
    ) -> Self {
        Self {
            pool,
            config,
            repository,
            today: Local::now().date_naive(),
        }
    }

    /// Date recorded as the update date of leveled-up users. Defaults to the local date.
    pub fn today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn run(&self, parameters: &JobParameters) -> Result<JobExecution, BatchError> {
        self.launch(parameters, None)
    }

    /// Re-runs a failed run of `userJob` from `userStep`.
    pub fn restart(&self, run_id: u64, parameters: &JobParameters) -> Result<JobExecution, BatchError> {
        self.launch(parameters, Some(run_id))
    }

    fn launch(
        &self,
        parameters: &JobParameters,
        restarted_run: Option<u64>,
    ) -> Result<JobExecution, BatchError> {
        self.config.validate()?;
        let chunk_size = self.config.chunk_size;
        let page_size = self.config.page_size;

        let seed = SaveUserTasklet::new(self.pool);
        let user_step = StepBuilder::new(USER_STEP).tasklet(&seed).build()?;

        let user_mapper = UserRowMapper;
        let user_reader = SqlitePagingItemSourceBuilder::<User>::new()
            .pool(self.pool)
            .select_clause(USER_SELECT_CLAUSE)
            .from_clause(USER_FROM_CLAUSE)
            .group_clause(USER_GROUP_CLAUSE)
            .row_mapper(&user_mapper)
            .build()?;
        let level_up = LevelUpProcessor::new(self.today);
        let user_binder = UserLevelUpBinder;
        let user_writer = SqliteItemWriter::new(self.pool, &user_binder);
        let level_up_step = StepBuilder::new(USER_LEVEL_UP_STEP)
            .chunk::<User, User>(chunk_size)
            .reader(&user_reader)
            .processor(&level_up)
            .writer(&user_writer)
            .query(PageQuery::new(page_size).sort_key("u.id", SortOrder::Ascending))
            .build()?;
        let level_up_listener = LevelUpListener::new(self.pool, self.today);

        let date_decider = JobParametersDecider::new("date").year_month();

        let statistics_mapper = OrderStatisticsRowMapper;
        let statistics_reader = SqlitePagingItemSourceBuilder::<OrderStatistics>::new()
            .pool(self.pool)
            .select_clause(STATISTICS_SELECT_CLAUSE)
            .from_clause(STATISTICS_FROM_CLAUSE)
            .where_clause(STATISTICS_WHERE_CLAUSE)
            .group_clause(STATISTICS_GROUP_CLAUSE)
            .row_mapper(&statistics_mapper)
            .build()?;
        let statistics_fields = OrderStatisticsFieldExtractor;
        let mut statistics_writer = CsvItemWriterBuilder::<OrderStatistics>::new()
            .delimiter(self.config.delimiter_byte()?)
            .header(STATISTICS_HEADER)
            .field_extractor(&statistics_fields);
        // without a month the decision skips the statistics step
        if let Ok(year_month) = statistics_month(parameters) {
            let path = self.config.statistics_path(&year_month);
            info!("Order statistics of {} go to {}", year_month, path.display());
            statistics_writer = statistics_writer.path(path);
        }
        let statistics_writer = statistics_writer.build()?;
        let statistics_step = StepBuilder::new(ORDER_STATISTICS_STEP)
            .chunk::<OrderStatistics, OrderStatistics>(chunk_size)
            .reader(&statistics_reader)
            .pass_through()
            .writer(&statistics_writer)
            .query(move |parameters: &JobParameters| -> Result<PageQuery, BatchError> {
                statistics_query(parameters, page_size)
            })
            .build()?;

        let job = JobBuilder::new()
            .name(USER_JOB_NAME)
            .start(&user_step)
            .next(&level_up_step)
            .listener(&level_up_listener)
            .decision(DATE_DECISION, &date_decider)
            .on(CONTINUE)
            .to(&statistics_step)
            .incrementer(RunIdIncrementer::new(self.repository))
            .build()?;

        match restarted_run {
            Some(run_id) => job.restart(run_id, parameters),
            None => job.run(parameters),
        }
    }
}
