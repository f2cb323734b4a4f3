//! The finished report: identifier, header block and body.
//!
//! A report is stamped once, at creation, with the local wall-clock time.
//! The `Generated:` line, the `PATH-…` identifier and the download file name
//! all derive from that single timestamp, so they always agree.

use chrono::{DateTime, Local, NaiveDateTime, Timelike};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Title line of every report header.
pub const HEADER_TITLE: &str = "# PATHOLOGY REPORT";

/// Separator line closing the header block.
pub const HEADER_SEPARATOR: &str = "_______________________________________________";

const ID_TIME_FORMAT: &str = "%Y%m%d-%H%M%S";
const GENERATED_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const FILE_TIME_FORMAT: &str = "%Y%m%d_%H%M%S";

static RE_REPORT_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^PATH-(\d{8}-\d{6})$").unwrap());

/// Report identifier of the form `PATH-YYYYMMDD-HHMMSS`.
///
/// Second granularity: two reports generated within the same second share
/// an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReportId(NaiveDateTime);

impl ReportId {
    /// Identifier for a report created at `at`.
    pub fn from_time(at: &DateTime<Local>) -> Self {
        let naive = at.naive_local();
        // Whole seconds, so parse(display(id)) == id.
        Self(naive.with_nanosecond(0).unwrap_or(naive))
    }

    /// The wall-clock second embedded in the identifier.
    pub fn timestamp(&self) -> NaiveDateTime {
        self.0
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PATH-{}", self.0.format(ID_TIME_FORMAT))
    }
}

/// Error parsing a [`ReportId`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid report identifier '{0}': expected PATH-YYYYMMDD-HHMMSS")]
pub struct ReportIdError(String);

impl FromStr for ReportId {
    type Err = ReportIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = RE_REPORT_ID
            .captures(s)
            .ok_or_else(|| ReportIdError(s.to_string()))?;
        NaiveDateTime::parse_from_str(&caps[1], ID_TIME_FORMAT)
            .map(ReportId)
            .map_err(|_| ReportIdError(s.to_string()))
    }
}

impl Serialize for ReportId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ReportId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A generated pathology report: header metadata plus the model's body.
///
/// Immutable once created; regenerating produces a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedReport {
    pub id: ReportId,
    /// Local time the report was stamped, whole seconds.
    pub generated_at: NaiveDateTime,
    /// Model output, unmodified.
    pub body: String,
}

impl FormattedReport {
    /// Stamp `body` with the current local time.
    pub fn new(body: impl Into<String>) -> Self {
        Self::at(&Local::now(), body)
    }

    /// Stamp `body` with a given time.
    pub fn at(now: &DateTime<Local>, body: impl Into<String>) -> Self {
        let id = ReportId::from_time(now);
        Self {
            id,
            generated_at: id.timestamp(),
            body: body.into(),
        }
    }

    /// The literal header block, ending in a blank line.
    pub fn header(&self) -> String {
        format!(
            "{HEADER_TITLE}\nGenerated: {}\nReport ID: {}\n{HEADER_SEPARATOR}\n\n",
            self.generated_at.format(GENERATED_TIME_FORMAT),
            self.id
        )
    }

    /// Header followed directly by the body. This is both what the user sees
    /// and what the download file contains.
    pub fn render(&self) -> String {
        let mut out = self.header();
        out.push_str(&self.body);
        out
    }

    /// `pathology_report_<YYYYMMDD_HHMMSS>.txt`
    pub fn file_name(&self) -> String {
        format!(
            "pathology_report_{}.txt",
            self.generated_at.format(FILE_TIME_FORMAT)
        )
    }
}
