use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::{BatchError, core::parameters::YearMonth};

/// Settings of the batch jobs.
///
/// Loaded from a TOML file where every key is optional:
///
/// ```toml
/// chunk_size = 100
/// page_size = 100
/// database_url = "sqlite://order-batch.db"
/// output_dir = "excelfile"
/// statistics_file_template = "{year}_{month}_daily_order_statistics.csv"
/// delimiter = ","
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Number of records committed together
    pub chunk_size: usize,
    /// Number of records requested per page from a source
    pub page_size: usize,
    pub database_url: String,
    /// Directory receiving the generated files
    pub output_dir: PathBuf,
    /// File name of the monthly statistics, `{year}` and `{month}` are substituted
    pub statistics_file_template: String,
    pub delimiter: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            page_size: 100,
            database_url: "sqlite://order-batch.db".to_string(),
            output_dir: PathBuf::from("excelfile"),
            statistics_file_template: "{year}_{month}_daily_order_statistics.csv".to_string(),
            delimiter: ",".to_string(),
        }
    }
}

impl BatchConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment overrides are applied separately via `apply_env_overrides()`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, BatchError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            BatchError::Configuration(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, BatchError> {
        toml::from_str(content)
            .map_err(|e| BatchError::Configuration(format!("Failed to parse config file: {}", e)))
    }

    /// Overrides settings from `ORDER_BATCH_*` environment variables.
    pub fn apply_env_overrides(&mut self) -> Result<(), BatchError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Overrides settings from a variable lookup, `ORDER_BATCH_CHUNK_SIZE`,
    /// `ORDER_BATCH_PAGE_SIZE`, `ORDER_BATCH_DATABASE_URL` and `ORDER_BATCH_OUTPUT_DIR`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), BatchError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse_size = |key: &str, value: String| {
            value.trim().parse::<usize>().map_err(|_| {
                BatchError::Configuration(format!("{} must be a positive integer: {}", key, value))
            })
        };

        if let Some(value) = lookup("ORDER_BATCH_CHUNK_SIZE") {
            self.chunk_size = parse_size("ORDER_BATCH_CHUNK_SIZE", value)?;
        }
        if let Some(value) = lookup("ORDER_BATCH_PAGE_SIZE") {
            self.page_size = parse_size("ORDER_BATCH_PAGE_SIZE", value)?;
        }
        if let Some(value) = lookup("ORDER_BATCH_DATABASE_URL") {
            self.database_url = value;
        }
        if let Some(value) = lookup("ORDER_BATCH_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(value);
        }

        Ok(())
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), BatchError> {
        if self.chunk_size == 0 {
            return Err(BatchError::Configuration(
                "chunk_size cannot be 0".to_string(),
            ));
        }

        if self.page_size == 0 {
            return Err(BatchError::Configuration("page_size cannot be 0".to_string()));
        }

        if self.database_url.trim().is_empty() {
            return Err(BatchError::Configuration(
                "database_url cannot be empty".to_string(),
            ));
        }

        if self.statistics_file_template.trim().is_empty() {
            return Err(BatchError::Configuration(
                "statistics_file_template cannot be empty".to_string(),
            ));
        }

        self.delimiter_byte()?;

        Ok(())
    }

    /// The field delimiter as a single ASCII byte.
    pub fn delimiter_byte(&self) -> Result<u8, BatchError> {
        match self.delimiter.as_bytes() {
            [byte] if byte.is_ascii() => Ok(*byte),
            _ => Err(BatchError::Configuration(format!(
                "delimiter must be a single ASCII character, got '{}'",
                self.delimiter
            ))),
        }
    }

    /// Path of the statistics file of a month, e.g. `excelfile/2020_11_daily_order_statistics.csv`.
    pub fn statistics_path(&self, year_month: &YearMonth) -> PathBuf {
        let file_name = self
            .statistics_file_template
            .replace("{year}", &year_month.year().to_string())
            .replace("{month}", &format!("{:02}", year_month.month()));

        self.output_dir.join(file_name)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn default_config_should_be_valid() {
        let config = BatchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.delimiter_byte(), Ok(b','));
    }

    #[test]
    fn missing_keys_should_take_defaults() -> Result<(), BatchError> {
        let config = BatchConfig::from_toml_str("chunk_size = 50\ndelimiter = \";\"")?;

        assert_eq!(config.chunk_size, 50);
        assert_eq!(config.page_size, 100);
        assert_eq!(config.delimiter_byte()?, b';');
        assert_eq!(config.output_dir, PathBuf::from("excelfile"));
        Ok(())
    }

    #[test]
    fn malformed_toml_should_be_rejected() {
        let result = BatchConfig::from_toml_str("chunk_size = \"many\"");
        assert!(matches!(result, Err(BatchError::Configuration(_))));
    }

    #[test]
    fn overrides_should_replace_file_values() -> Result<(), BatchError> {
        let env: HashMap<&str, &str> = [
            ("ORDER_BATCH_CHUNK_SIZE", "25"),
            ("ORDER_BATCH_OUTPUT_DIR", "/tmp/reports"),
        ]
        .into_iter()
        .collect();

        let mut config = BatchConfig::default();
        config.apply_overrides(|key| env.get(key).map(|value| value.to_string()))?;

        assert_eq!(config.chunk_size, 25);
        assert_eq!(config.page_size, 100);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/reports"));

        let result = config.apply_overrides(|key| {
            (key == "ORDER_BATCH_PAGE_SIZE").then(|| "lots".to_string())
        });
        assert!(matches!(result, Err(BatchError::Configuration(_))));
        Ok(())
    }

    #[test]
    fn zero_sizes_should_be_rejected() {
        let config = BatchConfig {
            chunk_size: 0,
            ..BatchConfig::default()
        };
        assert!(config.validate().is_err());

        let config = BatchConfig {
            page_size: 0,
            ..BatchConfig::default()
        };
        assert!(config.validate().is_err());

        let config = BatchConfig {
            delimiter: "||".to_string(),
            ..BatchConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn statistics_path_should_embed_year_and_month() -> Result<(), BatchError> {
        let config = BatchConfig::default();
        let path = config.statistics_path(&"2020-11".parse()?);

        assert_eq!(
            path,
            PathBuf::from("excelfile").join("2020_11_daily_order_statistics.csv")
        );
        Ok(())
    }
}
