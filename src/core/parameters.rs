use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{Datelike, NaiveDate};

use crate::BatchError;

/// A typed job parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum JobParameter {
    String(String),
    Long(i64),
    Double(f64),
    Date(NaiveDate),
}

impl fmt::Display for JobParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobParameter::String(value) => write!(f, "{}", value),
            JobParameter::Long(value) => write!(f, "{}", value),
            JobParameter::Double(value) => write!(f, "{}", value),
            JobParameter::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
        }
    }
}

impl From<&str> for JobParameter {
    fn from(value: &str) -> Self {
        JobParameter::String(value.to_string())
    }
}

impl From<String> for JobParameter {
    fn from(value: String) -> Self {
        JobParameter::String(value)
    }
}

impl From<i64> for JobParameter {
    fn from(value: i64) -> Self {
        JobParameter::Long(value)
    }
}

impl From<f64> for JobParameter {
    fn from(value: f64) -> Self {
        JobParameter::Double(value)
    }
}

impl From<NaiveDate> for JobParameter {
    fn from(value: NaiveDate) -> Self {
        JobParameter::Date(value)
    }
}

/// Immutable set of named parameters a job is launched with.
///
/// Parameters are kept in key order so two launches with the same
/// assignments always compare and log identically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobParameters {
    parameters: BTreeMap<String, JobParameter>,
}

impl JobParameters {
    pub fn new() -> Self {
        Self {
            parameters: BTreeMap::new(),
        }
    }

    /// Returns a copy of these parameters with `key` set to `value`.
    pub fn with(mut self, key: &str, value: impl Into<JobParameter>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }

    /// Builds parameters from `key=value` assignments, as given on a command line.
    ///
    /// Integers become [`JobParameter::Long`], ISO dates (`2020-11-01`) become
    /// [`JobParameter::Date`], everything else is kept as a string.
    pub fn from_assignments<I, S>(assignments: I) -> Result<Self, BatchError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parameters = JobParameters::new();
        for assignment in assignments {
            let (key, value) = Self::parse(assignment.as_ref())?;
            parameters.parameters.insert(key, value);
        }
        Ok(parameters)
    }

    /// Parses a single `key=value` assignment.
    pub fn parse(assignment: &str) -> Result<(String, JobParameter), BatchError> {
        let (key, value) = assignment.split_once('=').ok_or_else(|| {
            BatchError::Configuration(format!(
                "job parameter '{}' is not of the form key=value",
                assignment
            ))
        })?;

        let key = key.trim().trim_start_matches('-');
        if key.is_empty() {
            return Err(BatchError::Configuration(format!(
                "job parameter '{}' has an empty name",
                assignment
            )));
        }

        let value = value.trim();
        let parameter = if let Ok(long) = value.parse::<i64>() {
            JobParameter::Long(long)
        } else if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            JobParameter::Date(date)
        } else {
            JobParameter::String(value.to_string())
        };

        Ok((key.to_string(), parameter))
    }

    pub fn get(&self, key: &str) -> Option<&JobParameter> {
        self.parameters.get(key)
    }

    /// Returns the parameter rendered as a string, whatever its type.
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.parameters.get(key).map(|value| value.to_string())
    }

    pub fn get_long(&self, key: &str) -> Option<i64> {
        match self.parameters.get(key) {
            Some(JobParameter::Long(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.parameters.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &JobParameter)> {
        self.parameters.iter()
    }
}

impl fmt::Display for JobParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .parameters
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();
        write!(f, "{{{}}}", rendered.join(", "))
    }
}

/// A calendar month, as carried by the `date` launch parameter (`2020-11`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearMonth {
    first_day: NaiveDate,
    last_day: NaiveDate,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Result<Self, BatchError> {
        let invalid = || BatchError::Configuration(format!("invalid month: {}-{:02}", year, month));

        let first_day = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
        let next_month = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        };
        let last_day = next_month
            .and_then(|date| date.pred_opt())
            .ok_or_else(invalid)?;

        Ok(Self {
            first_day,
            last_day,
        })
    }

    pub fn year(&self) -> i32 {
        self.first_day.year()
    }

    pub fn month(&self) -> u32 {
        self.first_day.month()
    }

    pub fn first_day(&self) -> NaiveDate {
        self.first_day
    }

    pub fn last_day(&self) -> NaiveDate {
        self.last_day
    }
}

impl FromStr for YearMonth {
    type Err = BatchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let malformed =
            || BatchError::Configuration(format!("'{}' is not a year-month (yyyy-MM)", value));

        let (year, month) = value.trim().split_once('-').ok_or_else(malformed)?;
        if month.len() != 2 {
            return Err(malformed());
        }
        let year = year.parse::<i32>().map_err(|_| malformed())?;
        let month = month.parse::<u32>().map_err(|_| malformed())?;

        YearMonth::new(year, month)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year(), self.month())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{JobParameter, JobParameters, YearMonth};
    use crate::BatchError;

    #[test]
    fn assignments_should_be_typed() -> Result<(), BatchError> {
        let parameters =
            JobParameters::from_assignments(["date=2020-11", "-limit=10", "day=2020-11-02"])?;

        assert_eq!(
            parameters.get("date"),
            Some(&JobParameter::String("2020-11".to_string()))
        );
        assert_eq!(parameters.get_long("limit"), Some(10));
        assert_eq!(
            parameters.get("day"),
            Some(&JobParameter::Date(NaiveDate::from_ymd_opt(2020, 11, 2).unwrap()))
        );
        assert_eq!(parameters.len(), 3);
        Ok(())
    }

    #[test]
    fn assignment_without_equal_sign_should_be_rejected() {
        let result = JobParameters::from_assignments(["date"]);
        assert!(matches!(result, Err(BatchError::Configuration(_))));
    }

    #[test]
    fn parameters_should_render_in_key_order() {
        let parameters = JobParameters::new().with("z", 1).with("a", "x");
        assert_eq!(parameters.to_string(), "{a=x, z=1}");
    }

    #[test]
    fn year_month_should_cover_whole_month() -> Result<(), BatchError> {
        let november: YearMonth = "2020-11".parse()?;
        assert_eq!(november.first_day(), NaiveDate::from_ymd_opt(2020, 11, 1).unwrap());
        assert_eq!(november.last_day(), NaiveDate::from_ymd_opt(2020, 11, 30).unwrap());

        let december: YearMonth = "2020-12".parse()?;
        assert_eq!(december.last_day(), NaiveDate::from_ymd_opt(2020, 12, 31).unwrap());

        let february: YearMonth = "2020-02".parse()?;
        assert_eq!(february.last_day(), NaiveDate::from_ymd_opt(2020, 2, 29).unwrap());
        assert_eq!(february.to_string(), "2020-02");
        Ok(())
    }

    #[test]
    fn malformed_year_month_should_be_rejected() {
        assert!("2020-13".parse::<YearMonth>().is_err());
        assert!("2020-1".parse::<YearMonth>().is_err());
        assert!("november".parse::<YearMonth>().is_err());
    }
}
