//! Query builder for the `readings` table.
//!
//! [`ReadingQuery`] describes which readings to fetch and renders itself as
//! PostgREST query parameters. The default query is the one the readings
//! page runs: every column, newest first.
//!
//! # Example
//!
//! ```
//! use nanoc6_core::ReadingQuery;
//! use time::{Duration, OffsetDateTime};
//!
//! let now = OffsetDateTime::now_utc();
//!
//! // Last hour of readings from one device
//! let query = ReadingQuery::new()
//!     .device("A1B2C3D4E5F6")
//!     .since(now - Duration::hours(1))
//!     .limit(100);
//!
//! assert!(query.to_params().contains(&("mac_address".to_string(), "eq.A1B2C3D4E5F6".to_string())));
//! ```

use std::cmp::Ordering;

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use nanoc6_types::Reading;

/// Column readings are ordered by.
pub const ORDER_COLUMN: &str = "created_at";

/// Fluent query builder for readings.
///
/// By default, queries select all columns ordered by `created_at`
/// descending (newest first).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReadingQuery {
    /// Filter by reporting device MAC address.
    pub mac_address: Option<String>,
    /// Filter readings created at or after this time.
    pub since: Option<OffsetDateTime>,
    /// Filter readings created at or before this time.
    pub until: Option<OffsetDateTime>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Offset for pagination.
    pub offset: Option<u32>,
    /// Columns to select; empty selects all.
    pub columns: Vec<String>,
    /// Order by created_at descending (newest first).
    pub newest_first: bool,
}

impl ReadingQuery {
    /// Create a new query with default settings.
    ///
    /// Default behavior:
    /// - All columns
    /// - No device or time range filter
    /// - No limit
    /// - Ordered by newest first
    pub fn new() -> Self {
        Self {
            newest_first: true,
            ..Default::default()
        }
    }

    /// Filter by device MAC address.
    pub fn device(mut self, mac_address: &str) -> Self {
        self.mac_address = Some(mac_address.to_string());
        self
    }

    /// Filter to readings created at or after this time.
    pub fn since(mut self, time: OffsetDateTime) -> Self {
        self.since = Some(time);
        self
    }

    /// Filter to readings created at or before this time.
    pub fn until(mut self, time: OffsetDateTime) -> Self {
        self.until = Some(time);
        self
    }

    /// Limit the maximum number of results returned.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first N results.
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Select only the given columns.
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Order results by oldest first.
    pub fn oldest_first(mut self) -> Self {
        self.newest_first = false;
        self
    }

    /// The PostgREST `select` value.
    pub fn select(&self) -> String {
        if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.join(",")
        }
    }

    /// Render as PostgREST query parameters.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let direction = if self.newest_first { "desc" } else { "asc" };
        let mut params = vec![
            ("select".to_string(), self.select()),
            ("order".to_string(), format!("{}.{}", ORDER_COLUMN, direction)),
        ];

        if let Some(ref mac) = self.mac_address {
            params.push(("mac_address".to_string(), format!("eq.{}", mac)));
        }
        if let Some(since) = self.since.and_then(|t| t.format(&Rfc3339).ok()) {
            params.push((ORDER_COLUMN.to_string(), format!("gte.{}", since)));
        }
        if let Some(until) = self.until.and_then(|t| t.format(&Rfc3339).ok()) {
            params.push((ORDER_COLUMN.to_string(), format!("lte.{}", until)));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(offset) = self.offset {
            params.push(("offset".to_string(), offset.to_string()));
        }

        params
    }

    /// Whether a reading passes the filters of this query.
    ///
    /// Used by in-memory backends. Readings without a parseable
    /// `created_at` never pass a time range filter.
    pub fn matches(&self, reading: &Reading) -> bool {
        if let Some(ref mac) = self.mac_address
            && reading.mac_address() != Some(mac.as_str())
        {
            return false;
        }
        if self.since.is_some() || self.until.is_some() {
            let Some(created_at) = reading.created_at() else {
                return false;
            };
            if self.since.is_some_and(|since| created_at < since) {
                return false;
            }
            if self.until.is_some_and(|until| created_at > until) {
                return false;
            }
        }
        true
    }

    /// Compare two readings in this query's order.
    ///
    /// Readings without a timestamp sort last, matching PostgREST's
    /// default `nullslast` for descending order.
    pub fn compare(&self, a: &Reading, b: &Reading) -> Ordering {
        match (a.created_at(), b.created_at()) {
            (Some(a), Some(b)) if self.newest_first => b.cmp(&a),
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }

    /// Filter, order and page a set of readings the way the backend would.
    pub fn apply<'a, I>(&self, readings: I) -> Vec<Reading>
    where
        I: IntoIterator<Item = &'a Reading>,
    {
        let mut selected: Vec<Reading> = readings
            .into_iter()
            .filter(|r| self.matches(r))
            .cloned()
            .collect();
        selected.sort_by(|a, b| self.compare(a, b));

        let offset = self.offset.unwrap_or(0) as usize;
        let limit = self.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        let mut page: Vec<Reading> = selected.into_iter().skip(offset).take(limit).collect();

        if !self.columns.is_empty() {
            page = page
                .into_iter()
                .map(|r| {
                    let columns = r
                        .into_columns()
                        .into_iter()
                        .filter(|(k, _)| self.columns.iter().any(|c| c == k))
                        .collect();
                    Reading::from_columns(columns)
                })
                .collect();
        }
        page
    }
}
