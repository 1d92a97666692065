//! The monthly user job.
//!
//! Users accumulate orders; once their total order amount reaches the threshold of the
//! next [`user::Level`] they are leveled up. When launched with `date=yyyy-MM`, the job
//! also writes the total order amount of each day of that month to
//! `<output_dir>/<yyyy>_<MM>_daily_order_statistics.csv`:
//!
//! ```text
//! total_amount, date
//! 100000,2020-11-01
//! 20000000,2020-11-02
//! ```
//!
//! Tables are created with [`schema::create_schema`]; the job itself is assembled and
//! launched by [`job::UserJobLauncher`].

pub mod job;
pub mod listener;
pub mod schema;
pub mod seed;
pub mod statistics;
pub mod user;

pub use job::{USER_JOB_NAME, UserJobLauncher};
pub use schema::create_schema;
