use log::debug;
use sqlx::{Pool, QueryBuilder, Sqlite, sqlite::SqliteRow};

use crate::{
    BatchError,
    core::{
        paging::{ClauseSegment, Page, PageCursor, PageQuery, PagingItemSource, bind_named},
        parameters::JobParameter,
    },
};

use super::block_on;

/// Maps a result row to a record.
pub trait RowMapper<T> {
    fn map_row(&self, row: &SqliteRow) -> Result<T, BatchError>;
}

/// Pages through the result of
/// `SELECT <select> FROM <from> [WHERE <where>] [GROUP BY <group>] ORDER BY <sort keys>`
/// with `LIMIT` / `OFFSET`.
///
/// The where clause refers to the query's named parameters as `:name`; they are bound
/// as statement parameters, never spliced into the SQL text. Sort keys are mandatory:
/// without them page boundaries are undefined.
pub struct SqlitePagingItemSource<'a, T> {
    pool: &'a Pool<Sqlite>,
    select_clause: String,
    from_clause: String,
    where_clause: Option<String>,
    group_clause: Option<String>,
    row_mapper: &'a dyn RowMapper<T>,
}

impl<T> SqlitePagingItemSource<'_, T> {
    fn build_query<'q>(&self, query: &'q PageQuery) -> Result<QueryBuilder<'q, Sqlite>, BatchError> {
        let mut query_builder = QueryBuilder::new("SELECT ");
        query_builder.push(&self.select_clause);
        query_builder.push(" FROM ");
        query_builder.push(&self.from_clause);

        if let Some(where_clause) = &self.where_clause {
            query_builder.push(" WHERE ");
            for segment in bind_named(where_clause, query.parameters())? {
                match segment {
                    ClauseSegment::Text(text) => {
                        query_builder.push(text);
                    }
                    ClauseSegment::Parameter(value) => push_parameter(&mut query_builder, value),
                }
            }
        }

        if let Some(group_clause) = &self.group_clause {
            query_builder.push(" GROUP BY ");
            query_builder.push(group_clause);
        }

        let sort_keys: Vec<String> = query
            .sort_keys()
            .iter()
            .map(|(key, order)| format!("{} {}", key, order.as_sql()))
            .collect();
        query_builder.push(" ORDER BY ");
        query_builder.push(sort_keys.join(", "));

        query_builder.push(" LIMIT ");
        query_builder.push_bind(query.page_size() as i64);
        query_builder.push(" OFFSET ");
        query_builder.push_bind(query.offset() as i64);

        Ok(query_builder)
    }
}

fn push_parameter(query_builder: &mut QueryBuilder<'_, Sqlite>, value: &JobParameter) {
    match value {
        JobParameter::String(value) => {
            query_builder.push_bind(value.clone());
        }
        JobParameter::Long(value) => {
            query_builder.push_bind(*value);
        }
        JobParameter::Double(value) => {
            query_builder.push_bind(*value);
        }
        JobParameter::Date(value) => {
            query_builder.push_bind(*value);
        }
    }
}

impl<T> PagingItemSource<T> for SqlitePagingItemSource<'_, T> {
    fn open(&self, query: PageQuery) -> Result<PageCursor, BatchError> {
        query.validate()?;

        if query.sort_keys().is_empty() {
            return Err(BatchError::Configuration(format!(
                "sort keys are required to page through {}",
                self.from_clause
            )));
        }

        if let Some(where_clause) = &self.where_clause {
            bind_named(where_clause, query.parameters())?;
        }

        Ok(PageCursor::new(query))
    }

    fn read_page(&self, query: &PageQuery) -> Result<Page<T>, BatchError> {
        let mut query_builder = self.build_query(query)?;
        debug!("Reading page {}: {}", query.page_index(), query_builder.sql());

        let rows = block_on(
            query_builder.build().fetch_all(self.pool),
            BatchError::SourceUnavailable,
        )?;

        let items = rows
            .iter()
            .map(|row| self.row_mapper.map_row(row))
            .collect::<Result<Vec<T>, BatchError>>()?;
        let has_more = items.len() == query.page_size();

        Ok(Page::new(items, has_more))
    }
}

pub struct SqlitePagingItemSourceBuilder<'a, T> {
    pool: Option<&'a Pool<Sqlite>>,
    select_clause: Option<String>,
    from_clause: Option<String>,
    where_clause: Option<String>,
    group_clause: Option<String>,
    row_mapper: Option<&'a dyn RowMapper<T>>,
}

impl<T> Default for SqlitePagingItemSourceBuilder<'_, T> {
    fn default() -> Self {
        Self {
            pool: None,
            select_clause: None,
            from_clause: None,
            where_clause: None,
            group_clause: None,
            row_mapper: None,
        }
    }
}

impl<'a, T> SqlitePagingItemSourceBuilder<'a, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pool(mut self, pool: &'a Pool<Sqlite>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn select_clause(mut self, select_clause: &str) -> Self {
        self.select_clause = Some(select_clause.to_string());
        self
    }

    pub fn from_clause(mut self, from_clause: &str) -> Self {
        self.from_clause = Some(from_clause.to_string());
        self
    }

    pub fn where_clause(mut self, where_clause: &str) -> Self {
        self.where_clause = Some(where_clause.to_string());
        self
    }

    pub fn group_clause(mut self, group_clause: &str) -> Self {
        self.group_clause = Some(group_clause.to_string());
        self
    }

    pub fn row_mapper(mut self, row_mapper: &'a dyn RowMapper<T>) -> Self {
        self.row_mapper = Some(row_mapper);
        self
    }

    pub fn build(self) -> Result<SqlitePagingItemSource<'a, T>, BatchError> {
        let missing = |component: &str| {
            BatchError::Configuration(format!("{} is required for SQLite paging source", component))
        };

        Ok(SqlitePagingItemSource {
            pool: self.pool.ok_or_else(|| missing("Pool"))?,
            select_clause: self.select_clause.ok_or_else(|| missing("Select clause"))?,
            from_clause: self.from_clause.ok_or_else(|| missing("From clause"))?,
            where_clause: self.where_clause,
            group_clause: self.group_clause,
            row_mapper: self.row_mapper.ok_or_else(|| missing("Row mapper"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use sqlx::{Row, SqlitePool};

    use super::*;
    use crate::core::paging::Order;

    #[derive(Debug, PartialEq)]
    struct DailyTotal {
        amount: i64,
        day: NaiveDate,
    }

    struct DailyTotalMapper;

    impl RowMapper<DailyTotal> for DailyTotalMapper {
        fn map_row(&self, row: &SqliteRow) -> Result<DailyTotal, BatchError> {
            let map_err = |error: sqlx::Error| BatchError::SourceUnavailable(error.to_string());
            Ok(DailyTotal {
                amount: row.try_get(0).map_err(map_err)?,
                day: row.try_get(1).map_err(map_err)?,
            })
        }
    }

    fn day(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 11, day).unwrap()
    }

    async fn setup_pool() -> Result<SqlitePool, sqlx::Error> {
        let pool = SqlitePool::connect("sqlite::memory:").await?;
        sqlx::query("CREATE TABLE payments (amount INTEGER NOT NULL, paid_on DATE NOT NULL)")
            .execute(&pool)
            .await?;

        for (amount, paid_on) in [
            (10, day(3)),
            (5, day(1)),
            (7, day(1)),
            (1, day(2)),
            (100, day(30)),
            (999, NaiveDate::from_ymd_opt(2020, 12, 1).unwrap()),
        ] {
            sqlx::query("INSERT INTO payments (amount, paid_on) VALUES (?, ?)")
                .bind(amount as i64)
                .bind(paid_on)
                .execute(&pool)
                .await?;
        }

        Ok(pool)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pages_should_follow_sort_keys_and_date_range() -> Result<(), Box<dyn std::error::Error>>
    {
        let pool = setup_pool().await?;
        let mapper = DailyTotalMapper;
        let source = SqlitePagingItemSourceBuilder::<DailyTotal>::new()
            .pool(&pool)
            .select_clause("sum(amount), paid_on")
            .from_clause("payments")
            .where_clause("paid_on >= :startDate and paid_on <= :endDate")
            .group_clause("paid_on")
            .row_mapper(&mapper)
            .build()?;

        let query = PageQuery::new(2)
            .parameter("startDate", day(1))
            .parameter("endDate", day(30))
            .sort_key("paid_on", Order::Ascending);
        let mut cursor = source.open(query)?;

        let first = source.next_page(&mut cursor)?;
        assert_eq!(
            first.items,
            vec![
                DailyTotal { amount: 12, day: day(1) },
                DailyTotal { amount: 1, day: day(2) },
            ]
        );
        assert!(first.has_more);

        let second = source.next_page(&mut cursor)?;
        assert_eq!(
            second.items,
            vec![
                DailyTotal { amount: 10, day: day(3) },
                DailyTotal { amount: 100, day: day(30) },
            ]
        );

        let last = source.next_page(&mut cursor)?;
        assert!(last.items.is_empty());
        assert!(!last.has_more);
        assert!(cursor.is_exhausted());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn open_should_require_sort_keys_and_parameters() -> Result<(), Box<dyn std::error::Error>>
    {
        let pool = setup_pool().await?;
        let mapper = DailyTotalMapper;
        let source = SqlitePagingItemSourceBuilder::<DailyTotal>::new()
            .pool(&pool)
            .select_clause("amount, paid_on")
            .from_clause("payments")
            .where_clause("paid_on >= :startDate")
            .row_mapper(&mapper)
            .build()?;

        let unsorted = PageQuery::new(10).parameter("startDate", day(1));
        assert!(matches!(
            source.open(unsorted),
            Err(BatchError::Configuration(_))
        ));

        let unbound = PageQuery::new(10).sort_key("paid_on", Order::Ascending);
        assert!(matches!(
            source.open(unbound),
            Err(BatchError::Configuration(_))
        ));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_table_should_be_source_unavailable() -> Result<(), Box<dyn std::error::Error>> {
        let pool = SqlitePool::connect("sqlite::memory:").await?;
        let mapper = DailyTotalMapper;
        let source = SqlitePagingItemSourceBuilder::<DailyTotal>::new()
            .pool(&pool)
            .select_clause("amount, paid_on")
            .from_clause("payments")
            .row_mapper(&mapper)
            .build()?;

        let mut cursor = source.open(PageQuery::new(10).sort_key("paid_on", Order::Ascending))?;
        assert!(matches!(
            source.next_page(&mut cursor),
            Err(BatchError::SourceUnavailable(_))
        ));
        Ok(())
    }

    #[test]
    fn incomplete_builder_should_fail() {
        let result = SqlitePagingItemSourceBuilder::<DailyTotal>::new()
            .select_clause("amount")
            .build();
        assert!(matches!(result, Err(BatchError::Configuration(_))));
    }
}
