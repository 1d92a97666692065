//! # Paging
//!
//! Contract shared by every paginated record source, whatever the backing store:
//! a relational query, an in-process repository or a flat collection.
//!
//! A source is opened with a [`PageQuery`], which yields a [`PageCursor`]. Pages are
//! then requested one after the other with [`PagingItemSource::next_page`] until a
//! page reports `has_more == false`. Pages must come back in an order consistent with
//! the query's sort keys, otherwise chunk boundaries are not reproducible between runs.
//!
//! ```
//! use order_batch::core::paging::{InMemoryPagingSource, PageQuery, PagingItemSource};
//!
//! let source = InMemoryPagingSource::new(vec![1, 2, 3, 4, 5]);
//! let mut cursor = source.open(PageQuery::new(2)).unwrap();
//!
//! let page = source.next_page(&mut cursor).unwrap();
//! assert_eq!(page.items, vec![1, 2]);
//! assert!(page.has_more);
//! ```

use std::collections::BTreeMap;

use crate::BatchError;

use super::parameters::JobParameter;

/// Sort direction of a sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Ascending,
    Descending,
}

impl Order {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Order::Ascending => "ASC",
            Order::Descending => "DESC",
        }
    }
}

/// Parameters of one page request: size, zero-based index, named filter values and
/// ordered sort keys.
#[derive(Debug, Clone, PartialEq)]
pub struct PageQuery {
    page_size: usize,
    page_index: usize,
    parameters: BTreeMap<String, JobParameter>,
    sort_keys: Vec<(String, Order)>,
}

impl PageQuery {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            page_index: 0,
            parameters: BTreeMap::new(),
            sort_keys: Vec::new(),
        }
    }

    /// Binds a named filter value (for example `startDate`).
    pub fn parameter(mut self, name: &str, value: impl Into<JobParameter>) -> Self {
        self.parameters.insert(name.to_string(), value.into());
        self
    }

    /// Appends a sort key. Keys are applied in the order they are added.
    pub fn sort_key(mut self, key: &str, order: Order) -> Self {
        self.sort_keys.push((key.to_string(), order));
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn parameters(&self) -> &BTreeMap<String, JobParameter> {
        &self.parameters
    }

    pub fn sort_keys(&self) -> &[(String, Order)] {
        &self.sort_keys
    }

    /// Number of records that precede the current page.
    pub fn offset(&self) -> usize {
        self.page_size * self.page_index
    }

    pub fn validate(&self) -> Result<(), BatchError> {
        if self.page_size == 0 {
            return Err(BatchError::Configuration(
                "page size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Handle on an opened source.
#[derive(Debug)]
pub struct PageCursor {
    query: PageQuery,
    exhausted: bool,
}

impl PageCursor {
    pub fn new(query: PageQuery) -> Self {
        Self {
            query,
            exhausted: false,
        }
    }

    pub fn query(&self) -> &PageQuery {
        &self.query
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    fn advance(&mut self, has_more: bool) {
        self.query.page_index += 1;
        self.exhausted = !has_more;
    }
}

/// One page of records.
#[derive(Debug, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, has_more: bool) -> Self {
        Self { items, has_more }
    }

    /// The page that signals exhaustion.
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            has_more: false,
        }
    }
}

/// A finite, ordered, filterable and paginated sequence of records.
///
/// Implementors only provide [`read_page`](PagingItemSource::read_page); cursor
/// bookkeeping is shared so every source signals exhaustion the same way. A source must
/// never return fewer records than the page size except on its final page, and must not
/// retry on its own: a backing-store failure is reported as
/// [`BatchError::SourceUnavailable`] and left to the caller.
pub trait PagingItemSource<T> {
    /// Opens the source for the given query.
    fn open(&self, query: PageQuery) -> Result<PageCursor, BatchError> {
        query.validate()?;
        Ok(PageCursor::new(query))
    }

    /// Reads the page described by `query` (size and index).
    fn read_page(&self, query: &PageQuery) -> Result<Page<T>, BatchError>;

    /// Returns the next page, or an empty page with `has_more == false` once exhausted.
    fn next_page(&self, cursor: &mut PageCursor) -> Result<Page<T>, BatchError> {
        if cursor.is_exhausted() {
            return Ok(Page::empty());
        }
        let page = self.read_page(cursor.query())?;
        cursor.advance(page.has_more);
        Ok(page)
    }

    fn close(&self, _cursor: PageCursor) -> Result<(), BatchError> {
        Ok(())
    }
}

type RecordFilter<T> = Box<dyn Fn(&T, &BTreeMap<String, JobParameter>) -> bool>;

/// A paging source over records already held in memory, in insertion order.
///
/// Sort keys of the query are not interpreted: the vector order is the source order.
pub struct InMemoryPagingSource<T> {
    items: Vec<T>,
    filter: Option<RecordFilter<T>>,
}

impl<T: Clone> InMemoryPagingSource<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            filter: None,
        }
    }

    /// Keeps only the records accepted by `filter`, given the query's named parameters.
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&T, &BTreeMap<String, JobParameter>) -> bool + 'static,
    {
        self.filter = Some(Box::new(filter));
        self
    }
}

impl<T: Clone> PagingItemSource<T> for InMemoryPagingSource<T> {
    fn read_page(&self, query: &PageQuery) -> Result<Page<T>, BatchError> {
        let accepted = |item: &&T| match &self.filter {
            Some(filter) => filter(item, query.parameters()),
            None => true,
        };

        let mut matching = self.items.iter().filter(accepted).skip(query.offset());
        let items: Vec<T> = matching
            .by_ref()
            .take(query.page_size())
            .cloned()
            .collect();
        let has_more = matching.next().is_some();

        Ok(Page::new(items, has_more))
    }
}

/// A piece of a clause with named parameters, see [`bind_named`].
#[derive(Debug, PartialEq)]
pub enum ClauseSegment<'c> {
    Text(&'c str),
    Parameter(&'c JobParameter),
}

/// Splits a clause such as `created_date >= :startDate` into literal text and the
/// parameter values it references, in order of appearance.
///
/// Placeholders are `:` followed by an identifier. Quoted literals and `::` casts are
/// left untouched. A placeholder with no bound value is a configuration error.
pub fn bind_named<'c>(
    clause: &'c str,
    parameters: &'c BTreeMap<String, JobParameter>,
) -> Result<Vec<ClauseSegment<'c>>, BatchError> {
    let bytes = clause.as_bytes();
    let mut segments = Vec::new();
    let mut text_start = 0;
    let mut in_literal = false;
    let mut index = 0;

    while index < bytes.len() {
        let byte = bytes[index];
        if byte == b'\'' {
            in_literal = !in_literal;
            index += 1;
            continue;
        }

        let starts_placeholder = !in_literal
            && byte == b':'
            && (index == 0 || bytes[index - 1] != b':')
            && bytes
                .get(index + 1)
                .is_some_and(|next| next.is_ascii_alphabetic() || *next == b'_');

        if !starts_placeholder {
            index += 1;
            continue;
        }

        let name_start = index + 1;
        let mut name_end = name_start;
        while name_end < bytes.len()
            && (bytes[name_end].is_ascii_alphanumeric() || bytes[name_end] == b'_')
        {
            name_end += 1;
        }

        let name = &clause[name_start..name_end];
        let value = parameters.get(name).ok_or_else(|| {
            BatchError::Configuration(format!("no value bound for parameter :{}", name))
        })?;

        if text_start < index {
            segments.push(ClauseSegment::Text(&clause[text_start..index]));
        }
        segments.push(ClauseSegment::Parameter(value));

        text_start = name_end;
        index = name_end;
    }

    if text_start < bytes.len() {
        segments.push(ClauseSegment::Text(&clause[text_start..]));
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_should_be_returned_in_order_until_exhaustion() -> Result<(), BatchError> {
        let source = InMemoryPagingSource::new((1..=5).collect::<Vec<i32>>());
        let mut cursor = source.open(PageQuery::new(2))?;

        assert_eq!(source.next_page(&mut cursor)?, Page::new(vec![1, 2], true));
        assert_eq!(source.next_page(&mut cursor)?, Page::new(vec![3, 4], true));
        assert_eq!(source.next_page(&mut cursor)?, Page::new(vec![5], false));
        assert!(cursor.is_exhausted());
        assert_eq!(source.next_page(&mut cursor)?, Page::empty());
        assert_eq!(cursor.query().page_index(), 3);

        source.close(cursor)
    }

    #[test]
    fn exact_multiple_should_end_on_full_page() -> Result<(), BatchError> {
        let source = InMemoryPagingSource::new(vec!['a', 'b', 'c', 'd']);
        let mut cursor = source.open(PageQuery::new(2))?;

        assert!(source.next_page(&mut cursor)?.has_more);
        assert_eq!(source.next_page(&mut cursor)?, Page::new(vec!['c', 'd'], false));
        Ok(())
    }

    #[test]
    fn filter_should_see_query_parameters() -> Result<(), BatchError> {
        let source = InMemoryPagingSource::new((1..=10).collect::<Vec<i64>>()).with_filter(
            |item, parameters| match parameters.get("min") {
                Some(JobParameter::Long(min)) => item >= min,
                _ => true,
            },
        );
        let mut cursor = source.open(PageQuery::new(4).parameter("min", 8))?;

        assert_eq!(source.next_page(&mut cursor)?, Page::new(vec![8, 9, 10], false));
        Ok(())
    }

    #[test]
    fn zero_page_size_should_be_rejected() {
        let source = InMemoryPagingSource::new(vec![1]);
        let result = source.open(PageQuery::new(0));
        assert!(matches!(result, Err(BatchError::Configuration(_))));
    }

    #[test]
    fn named_parameters_should_be_bound_in_order() -> Result<(), BatchError> {
        let query = PageQuery::new(10)
            .parameter("startDate", "2020-11-01")
            .parameter("endDate", "2020-11-30");

        let segments = bind_named(
            "created_date >= :startDate and created_date <= :endDate",
            query.parameters(),
        )?;

        assert_eq!(
            segments,
            vec![
                ClauseSegment::Text("created_date >= "),
                ClauseSegment::Parameter(&JobParameter::from("2020-11-01")),
                ClauseSegment::Text(" and created_date <= "),
                ClauseSegment::Parameter(&JobParameter::from("2020-11-30")),
            ]
        );
        Ok(())
    }

    #[test]
    fn literals_and_casts_should_not_be_bound() -> Result<(), BatchError> {
        let parameters = BTreeMap::new();
        let clause = "label = ':notAParam' and amount::text <> ''";

        let segments = bind_named(clause, &parameters)?;

        assert_eq!(segments, vec![ClauseSegment::Text(clause)]);
        Ok(())
    }

    #[test]
    fn unknown_parameter_should_be_a_configuration_error() {
        let parameters = BTreeMap::new();
        let result = bind_named("id = :id", &parameters);
        assert!(matches!(result, Err(BatchError::Configuration(_))));
    }
}
