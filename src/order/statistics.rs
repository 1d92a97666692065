use chrono::NaiveDate;
use sqlx::{Row, sqlite::SqliteRow};

use crate::{
    BatchError,
    core::{
        paging::{Order, PageQuery},
        parameters::{JobParameters, YearMonth},
    },
    item::{csv::FieldExtractor, rdbc::RowMapper},
};

pub const STATISTICS_HEADER: &str = "total_amount, date";
pub const STATISTICS_SELECT_CLAUSE: &str = "sum(amount), created_date";
pub const STATISTICS_FROM_CLAUSE: &str = "orders";
pub const STATISTICS_WHERE_CLAUSE: &str =
    "created_date >= :startDate and created_date <= :endDate";
pub const STATISTICS_GROUP_CLAUSE: &str = "created_date";

/// Total amount of the orders created on one day.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderStatistics {
    pub amount: i64,
    pub date: NaiveDate,
}

pub struct OrderStatisticsRowMapper;

impl RowMapper<OrderStatistics> for OrderStatisticsRowMapper {
    fn map_row(&self, row: &SqliteRow) -> Result<OrderStatistics, BatchError> {
        let unavailable = |error: sqlx::Error| BatchError::SourceUnavailable(error.to_string());
        Ok(OrderStatistics {
            amount: row.try_get(0).map_err(unavailable)?,
            date: row.try_get(1).map_err(unavailable)?,
        })
    }
}

/// `amount`, then `date` as `yyyy-MM-dd`.
pub struct OrderStatisticsFieldExtractor;

impl FieldExtractor<OrderStatistics> for OrderStatisticsFieldExtractor {
    fn fields(&self, record: &OrderStatistics) -> Vec<String> {
        vec![
            record.amount.to_string(),
            record.date.format("%Y-%m-%d").to_string(),
        ]
    }
}

/// Query of the daily totals of the month named by the `date` parameter (`yyyy-MM`),
/// from its first to its last day, oldest day first.
pub fn statistics_query(
    parameters: &JobParameters,
    page_size: usize,
) -> Result<PageQuery, BatchError> {
    let year_month = statistics_month(parameters)?;

    Ok(PageQuery::new(page_size)
        .parameter("startDate", year_month.first_day())
        .parameter("endDate", year_month.last_day())
        .sort_key("created_date", Order::Ascending))
}

pub(crate) fn statistics_month(parameters: &JobParameters) -> Result<YearMonth, BatchError> {
    let date = parameters
        .get_string("date")
        .ok_or_else(|| BatchError::Configuration("job parameter date is required".to_string()))?;
    date.parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parameters::JobParameter;

    #[test]
    fn query_should_cover_whole_month() -> Result<(), BatchError> {
        let parameters = JobParameters::new().with("date", "2020-02");
        let query = statistics_query(&parameters, 100)?;

        assert_eq!(query.page_size(), 100);
        assert_eq!(
            query.parameters().get("startDate"),
            Some(&JobParameter::Date(NaiveDate::from_ymd_opt(2020, 2, 1).unwrap()))
        );
        assert_eq!(
            query.parameters().get("endDate"),
            Some(&JobParameter::Date(NaiveDate::from_ymd_opt(2020, 2, 29).unwrap()))
        );
        assert_eq!(
            query.sort_keys(),
            &[("created_date".to_string(), Order::Ascending)]
        );
        Ok(())
    }

    #[test]
    fn query_should_need_valid_month() {
        assert!(statistics_query(&JobParameters::new(), 100).is_err());
        assert!(statistics_query(&JobParameters::new().with("date", "2020-13"), 100).is_err());
    }

    #[test]
    fn fields_should_be_amount_then_day() {
        let record = OrderStatistics {
            amount: 100_000,
            date: NaiveDate::from_ymd_opt(2020, 11, 1).unwrap(),
        };
        assert_eq!(
            OrderStatisticsFieldExtractor.fields(&record),
            vec!["100000".to_string(), "2020-11-01".to_string()]
        );
    }
}
