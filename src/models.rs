use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::PulseError;

/// Calendar-month key, ordered chronologically, rendered as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Month {
    year: i32,
    month: u32,
}

impl Month {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) {
            Some(Month { year, month })
        } else {
            None
        }
    }

    pub fn of(date: NaiveDate) -> Self {
        Month {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn first_day(self) -> NaiveDate {
        // month is validated on construction, so day 1 always exists
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn succ(self) -> Self {
        if self.month == 12 {
            Month {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Month {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// BigQuery table-suffix token, e.g. `202301`.
    pub fn suffix(self) -> String {
        format!("{:04}{:02}", self.year, self.month)
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Month {
    type Err = PulseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let pattern = Regex::new(r"^\d{4}-(0[1-9]|1[0-2])$")
            .map_err(|err| PulseError::Other(err.to_string()))?;
        if !pattern.is_match(value) {
            return Err(PulseError::InvalidMonth(value.to_string()));
        }
        let year = value[..4]
            .parse::<i32>()
            .map_err(|_| PulseError::InvalidMonth(value.to_string()))?;
        let month = value[5..7]
            .parse::<u32>()
            .map_err(|_| PulseError::InvalidMonth(value.to_string()))?;
        Ok(Month { year, month })
    }
}

/// Every month from `start` to `end` inclusive, ascending.
pub fn months_between(start: Month, end: Month) -> Vec<Month> {
    let mut months = Vec::new();
    let mut current = start;
    while current <= end {
        months.push(current);
        current = current.succ();
    }
    months
}

/// Month totals keyed chronologically; iteration order is the persisted order.
///
/// Totals are additive across disjoint day sets only. The bulk query path
/// overwrites whole months instead of summing into them.
pub type MonthlyTotals = BTreeMap<Month, u64>;

/// One cache row, serialized as `month,commits`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MonthRow {
    pub month: String,
    pub commits: u64,
}

/// Serde view of one archive NDJSON record. Every field is optional so a
/// record missing them parses fine and simply contributes nothing.
#[derive(Deserialize, Debug)]
pub struct RawEvent {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub payload: RawPayload,
}

#[derive(Deserialize, Debug, Default)]
pub struct RawPayload {
    pub size: Option<i64>,
}
