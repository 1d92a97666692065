use std::fmt::Debug;

use log::info;

use crate::{BatchError, core::item::ItemWriter};

/// Logs every record of a chunk at info level.
#[derive(Default)]
pub struct LoggerWriter {
    prefix: Option<String>,
}

impl LoggerWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefixes each logged record, to tell several logging sinks apart.
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            prefix: Some(prefix.to_string()),
        }
    }
}

impl<T> ItemWriter<T> for LoggerWriter
where
    T: Debug,
{
    fn write(&self, items: &[T]) -> Result<(), BatchError> {
        let prefix = self.prefix.as_deref().unwrap_or("Record");
        items.iter().for_each(|item| info!("{}:{:?}", prefix, item));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::LoggerWriter;
    use crate::core::item::ItemWriter;

    #[test]
    fn logging_should_never_fail() {
        let writer = LoggerWriter::with_prefix("User");
        assert!(writer.write(&[1, 2, 3]).is_ok());
        assert!(ItemWriter::<i32>::write(&LoggerWriter::new(), &[]).is_ok());
    }
}
