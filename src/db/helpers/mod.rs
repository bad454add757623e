use std::{collections::BTreeMap, convert::TryFrom};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

use crate::models::{AccountStatus, AssignmentStatus};

pub fn to_i64(value: u32) -> i64 {
    i64::from(value)
}

pub fn to_u32(value: i64, field: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("{field} out of range: {value}"))
}

/// Fixed-width RFC 3339 so stored timestamps sort lexically.
pub fn format_datetime(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_optional_datetime(
    value: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => parse_datetime(&raw, field).map(Some),
        None => Ok(None),
    }
}

pub fn parse_date(value: &str, field: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").with_context(|| format!("failed to parse {field}"))
}

pub fn parse_optional_date(value: Option<String>, field: &str) -> Result<Option<NaiveDate>> {
    match value {
        Some(raw) => parse_date(&raw, field).map(Some),
        None => Ok(None),
    }
}

pub fn format_date(value: &NaiveDate) -> String {
    value.format("%Y-%m-%d").to_string()
}

pub fn parse_breakdown(value: &str) -> Result<BTreeMap<String, u32>> {
    serde_json::from_str(value).context("failed to parse score breakdown")
}

pub fn encode_breakdown(value: &BTreeMap<String, u32>) -> Result<String> {
    serde_json::to_string(value).context("failed to encode score breakdown")
}

pub fn parse_account_status(value: &str) -> Result<AccountStatus> {
    AccountStatus::parse(value).ok_or_else(|| anyhow!("unknown account status {value}"))
}

pub fn parse_assignment_status(value: &str) -> Result<AssignmentStatus> {
    AssignmentStatus::parse(value).ok_or_else(|| anyhow!("unknown assignment status {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dates_use_iso_calendar_format() {
        let date = parse_date("2025-03-14", "date").unwrap();
        assert_eq!(format_date(&date), "2025-03-14");
        assert!(parse_date("03/14/2025", "date").is_err());
    }

    #[test]
    fn negative_points_are_rejected() {
        assert!(to_u32(-1, "total").is_err());
        assert_eq!(to_u32(88, "total").unwrap(), 88);
    }
}
