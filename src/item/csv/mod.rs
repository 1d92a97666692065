/// Delimited text output.
///
/// [`csv_writer::CsvItemWriter`] turns each record of a chunk into an ordered list of
/// fields through a [`csv_writer::FieldExtractor`], formats the whole chunk with the
/// `csv` crate, and hands it to its destination in a single write. An optional header
/// line is written once, when the writer is opened. A file destination that fails in
/// the middle of a chunk is cut back to the chunks already written.
///
/// # Examples
///
/// ```
/// use order_batch::core::item::ItemWriter;
/// use order_batch::item::csv::csv_writer::{CsvItemWriterBuilder, FieldExtractor};
///
/// struct DailyTotal {
///     amount: i64,
///     day: &'static str,
/// }
///
/// struct DailyTotalFields;
///
/// impl FieldExtractor<DailyTotal> for DailyTotalFields {
///     fn fields(&self, record: &DailyTotal) -> Vec<String> {
///         vec![record.amount.to_string(), record.day.to_string()]
///     }
/// }
///
/// let mut output = Vec::new();
/// {
///     let writer = CsvItemWriterBuilder::<DailyTotal>::new()
///         .header("total_amount, date")
///         .field_extractor(&DailyTotalFields)
///         .from_writer(&mut output)
///         .unwrap();
///
///     writer.open().unwrap();
///     writer
///         .write(&[DailyTotal { amount: 100000, day: "2020-11-01" }])
///         .unwrap();
///     writer.close().unwrap();
/// }
///
/// assert_eq!(
///     String::from_utf8(output).unwrap(),
///     "total_amount, date\n100000,2020-11-01\n"
/// );
/// ```
pub mod csv_writer;

pub use csv_writer::{CsvItemWriter, CsvItemWriterBuilder, FieldExtractor, TruncateWrite};
