use std::{
    cell::{Cell, RefCell},
    fs::{self, File},
    io::{self, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use csv::WriterBuilder;
use log::{debug, warn};

use crate::{
    BatchError,
    core::item::{ItemWriter, ItemWriterResult},
};

/// Ordered fields of one output line.
pub trait FieldExtractor<T> {
    fn fields(&self, record: &T) -> Vec<String>;
}

/// A destination that can drop the bytes written past a given length.
///
/// `len` counts bytes from the start of the destination, which must be empty when the
/// writer gets it.
pub trait TruncateWrite: Write {
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
}

impl TruncateWrite for File {
    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        self.seek(SeekFrom::Start(len)).map(|_| ())
    }
}

enum Destination<'a> {
    /// Rolled back to the last committed length when a write fails
    Truncating(Box<dyn TruncateWrite + 'a>),
    Plain(Box<dyn Write + 'a>),
}

impl Destination<'_> {
    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Destination::Truncating(wtr) => wtr.as_mut(),
            Destination::Plain(wtr) => wtr.as_mut(),
        }
    }
}

/// Writes records as delimited text lines.
///
/// A chunk is formatted in memory first, so a formatting failure leaves the destination
/// untouched, and the formatted chunk reaches the destination in a single write.
/// When that write fails partway, a path or [`TruncateWrite`] destination is cut back
/// to the bytes of the chunks already committed.
///
/// A path destination is created (truncated if it exists) on `open` and released on
/// `close`. A writer destination is used as given.
pub struct CsvItemWriter<'a, T> {
    destination: RefCell<Option<Destination<'a>>>,
    /// Bytes written by completed writes since the destination was opened
    committed: Cell<u64>,
    path: Option<PathBuf>,
    delimiter: u8,
    header: Option<String>,
    extractor: &'a dyn FieldExtractor<T>,
}

impl<T> CsvItemWriter<'_, T> {
    fn format(&self, items: &[T]) -> Result<Vec<u8>, BatchError> {
        let mut wtr = WriterBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .flexible(false)
            .from_writer(Vec::<u8>::new());

        for item in items {
            wtr.write_record(self.extractor.fields(item))
                .map_err(|error| BatchError::SinkUnavailable(error.to_string()))?;
        }

        wtr.into_inner()
            .map_err(|error| BatchError::SinkUnavailable(error.to_string()))
    }

    fn write_all(&self, bytes: &[u8]) -> ItemWriterResult {
        let mut destination = self.destination.borrow_mut();
        let destination = destination.as_mut().ok_or_else(|| {
            BatchError::SinkUnavailable("CSV writer has no open destination".to_string())
        })?;

        match destination.writer().write_all(bytes) {
            Ok(()) => {
                self.committed.set(self.committed.get() + bytes.len() as u64);
                Ok(())
            }
            Err(error) => {
                if let Destination::Truncating(wtr) = destination {
                    let committed = self.committed.get();
                    match wtr.truncate_to(committed) {
                        Ok(()) => debug!("Rolled CSV destination back to {} bytes", committed),
                        Err(truncate_error) => warn!(
                            "Could not roll CSV destination back to {} bytes: {}",
                            committed, truncate_error
                        ),
                    }
                }
                Err(BatchError::SinkUnavailable(error.to_string()))
            }
        }
    }

    fn create_file(path: &Path) -> Result<File, BatchError> {
        let unavailable = |error: std::io::Error| {
            BatchError::SinkUnavailable(format!("{}: {}", path.display(), error))
        };

        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(unavailable)?;
        }
        File::create(path).map_err(unavailable)
    }
}

impl<T> ItemWriter<T> for CsvItemWriter<'_, T> {
    fn open(&self) -> ItemWriterResult {
        if let Some(path) = &self.path {
            let file = Self::create_file(path)?;
            debug!("Opened CSV destination {}", path.display());
            *self.destination.borrow_mut() = Some(Destination::Truncating(Box::new(file)));
            self.committed.set(0);
        }

        if let Some(header) = &self.header {
            let mut line = header.clone().into_bytes();
            line.push(b'\n');
            self.write_all(&line)?;
        } else if self.destination.borrow().is_none() {
            return Err(BatchError::SinkUnavailable(
                "CSV writer has no destination".to_string(),
            ));
        }

        self.flush()
    }

    fn write(&self, items: &[T]) -> ItemWriterResult {
        let bytes = self.format(items)?;
        self.write_all(&bytes)
    }

    fn flush(&self) -> ItemWriterResult {
        match self.destination.borrow_mut().as_mut() {
            Some(destination) => destination
                .writer()
                .flush()
                .map_err(|error| BatchError::SinkUnavailable(error.to_string())),
            None => Ok(()),
        }
    }

    fn close(&self) -> ItemWriterResult {
        let result = self.flush();
        if self.path.is_some() {
            self.destination.borrow_mut().take();
        }
        result
    }
}

/// A builder for [`CsvItemWriter`].
///
/// The destination is optional at build time: a writer without one fails with
/// [`BatchError::SinkUnavailable`] when opened.
pub struct CsvItemWriterBuilder<'a, T> {
    delimiter: u8,
    header: Option<String>,
    extractor: Option<&'a dyn FieldExtractor<T>>,
    path: Option<PathBuf>,
    destination: Option<Destination<'a>>,
}

impl<T> Default for CsvItemWriterBuilder<'_, T> {
    fn default() -> Self {
        Self {
            delimiter: b',',
            header: None,
            extractor: None,
            path: None,
            destination: None,
        }
    }
}

impl<'a, T> CsvItemWriterBuilder<'a, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Field delimiter, a comma by default.
    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Line written once before the first record, as is.
    pub fn header(mut self, header: &str) -> Self {
        self.header = Some(header.to_string());
        self
    }

    pub fn field_extractor(mut self, extractor: &'a dyn FieldExtractor<T>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn writer<W: Write + 'a>(mut self, wtr: W) -> Self {
        self.destination = Some(Destination::Plain(Box::new(wtr)));
        self
    }

    /// Writes to `wtr`, cutting it back to the committed chunks when a write fails.
    pub fn truncating_writer<W: TruncateWrite + 'a>(mut self, wtr: W) -> Self {
        self.destination = Some(Destination::Truncating(Box::new(wtr)));
        self
    }

    pub fn from_path<P: AsRef<Path>>(self, path: P) -> Result<CsvItemWriter<'a, T>, BatchError> {
        self.path(path).build()
    }

    pub fn from_writer<W: Write + 'a>(self, wtr: W) -> Result<CsvItemWriter<'a, T>, BatchError> {
        self.writer(wtr).build()
    }

    pub fn build(self) -> Result<CsvItemWriter<'a, T>, BatchError> {
        let extractor = self.extractor.ok_or_else(|| {
            BatchError::Configuration("Field extractor is required for CSV writer".to_string())
        })?;

        if self.path.is_some() && self.destination.is_some() {
            return Err(BatchError::Configuration(
                "CSV writer takes either a path or a writer, not both".to_string(),
            ));
        }

        Ok(CsvItemWriter {
            destination: RefCell::new(self.destination),
            committed: Cell::new(0),
            path: self.path,
            delimiter: self.delimiter,
            header: self.header,
            extractor,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    struct City {
        name: &'static str,
        country: &'static str,
        population: u64,
    }

    struct CityFields;

    impl FieldExtractor<City> for CityFields {
        fn fields(&self, record: &City) -> Vec<String> {
            vec![
                record.name.to_string(),
                record.country.to_string(),
                record.population.to_string(),
            ]
        }
    }

    fn boston() -> City {
        City {
            name: "Boston",
            country: "United States",
            population: 4628910,
        }
    }

    #[test]
    fn header_should_precede_records_once() -> Result<(), Box<dyn Error>> {
        let mut output = Vec::new();
        {
            let wtr = CsvItemWriterBuilder::<City>::new()
                .header("city, country, popcount")
                .field_extractor(&CityFields)
                .from_writer(&mut output)?;

            wtr.open()?;
            wtr.write(&[boston()])?;
            wtr.write(&[City {
                name: "Concord, NH",
                country: "United States",
                population: 42695,
            }])?;
            wtr.close()?;
        }

        assert_eq!(
            String::from_utf8(output)?,
            "city, country, popcount
Boston,United States,4628910
\"Concord, NH\",United States,42695
"
        );
        Ok(())
    }

    #[test]
    fn delimiter_should_be_configurable() -> Result<(), Box<dyn Error>> {
        let mut output = Vec::new();
        {
            let wtr = CsvItemWriterBuilder::<City>::new()
                .delimiter(b';')
                .field_extractor(&CityFields)
                .from_writer(&mut output)?;

            wtr.open()?;
            wtr.write(&[boston()])?;
        }

        assert_eq!(String::from_utf8(output)?, "Boston;United States;4628910\n");
        Ok(())
    }

    #[test]
    fn path_should_be_created_and_truncated() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("cities.csv");

        let wtr = CsvItemWriterBuilder::<City>::new()
            .header("city, country, popcount")
            .field_extractor(&CityFields)
            .from_path(&path)?;

        for _ in 0..2 {
            wtr.open()?;
            wtr.write(&[boston()])?;
            wtr.close()?;
        }

        assert_eq!(
            fs::read_to_string(&path)?,
            "city, country, popcount\nBoston,United States,4628910\n"
        );
        Ok(())
    }

    #[test]
    fn file_should_truncate_to_committed_length() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("totals.csv");
        let mut file = File::create(&path)?;

        file.write_all(b"total_amount, date\n100000,2020-1")?;
        file.truncate_to(19)?;
        file.write_all(b"100000,2020-11-01\n")?;
        drop(file);

        assert_eq!(
            fs::read_to_string(&path)?,
            "total_amount, date\n100000,2020-11-01\n"
        );
        Ok(())
    }

    #[test]
    fn missing_destination_should_fail_on_open() -> Result<(), BatchError> {
        let wtr = CsvItemWriterBuilder::<City>::new()
            .field_extractor(&CityFields)
            .build()?;

        assert!(matches!(wtr.open(), Err(BatchError::SinkUnavailable(_))));
        assert!(matches!(
            wtr.write(&[boston()]),
            Err(BatchError::SinkUnavailable(_))
        ));
        Ok(())
    }

    #[test]
    fn missing_extractor_should_not_build() {
        let result = CsvItemWriterBuilder::<City>::new().from_writer(Vec::<u8>::new());
        assert!(matches!(result, Err(BatchError::Configuration(_))));
    }
}
