use chrono::NaiveDate;
use log::info;
use sqlx::{Pool, Sqlite};

use crate::{
    BatchError,
    core::{parameters::JobParameters, step::StepExecution, tasklet::Tasklet},
    item::rdbc::block_on,
};

use super::user::{Level, Order};

/// Order amount of each group of seeded users, the n-th group ordering on day n of
/// November 2020.
const GROUP_AMOUNTS: [i64; 4] = [1_000, 200_000, 300_000, 500_000];
const USERS_PER_GROUP: i64 = 100;

/// Seeds the users and their orders: 400 users, each with one order.
///
/// Rows are written under fixed ids, so running the tasklet again resets the same
/// users to `NORMAL` instead of adding new ones.
pub struct SaveUserTasklet<'a> {
    pool: &'a Pool<Sqlite>,
}

impl<'a> SaveUserTasklet<'a> {
    pub fn new(pool: &'a Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// The seeded orders, one per user id.
    pub fn orders() -> Vec<Order> {
        GROUP_AMOUNTS
            .iter()
            .zip(1u32..)
            .filter_map(|(amount, day)| {
                NaiveDate::from_ymd_opt(2020, 11, day).map(|created_date| (*amount, day, created_date))
            })
            .flat_map(|(amount, day, created_date)| {
                let first_id = i64::from(day - 1) * USERS_PER_GROUP + 1;
                (first_id..first_id + USERS_PER_GROUP).map(move |id| Order {
                    id,
                    user_id: id,
                    item_name: "item".to_string(),
                    amount,
                    created_date,
                })
            })
            .collect()
    }

    async fn save_all(&self, orders: &[Order]) -> Result<(), sqlx::Error> {
        let mut transaction = self.pool.begin().await?;

        for order in orders {
            sqlx::query(
                "INSERT INTO users (id, username, level, updated_date) VALUES (?, ?, ?, NULL)
                 ON CONFLICT(id) DO UPDATE SET
                     username = excluded.username, level = excluded.level, updated_date = NULL",
            )
            .bind(order.user_id)
            .bind(format!("test username{}", order.user_id))
            .bind(Level::Normal.as_str())
            .execute(&mut *transaction)
            .await?;

            sqlx::query(
                "INSERT INTO orders (id, user_id, item_name, amount, created_date) VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET
                     user_id = excluded.user_id, item_name = excluded.item_name,
                     amount = excluded.amount, created_date = excluded.created_date",
            )
            .bind(order.id)
            .bind(order.user_id)
            .bind(&order.item_name)
            .bind(order.amount)
            .bind(order.created_date)
            .execute(&mut *transaction)
            .await?;
        }

        transaction.commit().await
    }
}

impl Tasklet for SaveUserTasklet<'_> {
    fn execute(
        &self,
        step_execution: &mut StepExecution,
        _parameters: &JobParameters,
    ) -> Result<(), BatchError> {
        let orders = Self::orders();
        block_on(self.save_all(&orders), BatchError::Tasklet)?;

        step_execution.write_count = orders.len();
        info!("Saved {} users with their orders", orders.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_should_have_four_groups_of_hundred() {
        let orders = SaveUserTasklet::orders();
        assert_eq!(orders.len(), 400);

        let first = &orders[0];
        assert_eq!((first.user_id, first.amount), (1, 1_000));
        assert_eq!(first.created_date, NaiveDate::from_ymd_opt(2020, 11, 1).unwrap());

        let last = &orders[399];
        assert_eq!((last.user_id, last.amount), (400, 500_000));
        assert_eq!(last.created_date, NaiveDate::from_ymd_opt(2020, 11, 4).unwrap());

        let silver: i64 = orders
            .iter()
            .filter(|order| order.created_date.format("%d").to_string() == "02")
            .map(|order| order.amount)
            .sum();
        assert_eq!(silver, 20_000_000);
    }
}
