//! Staff roster read from a Google Forms response sheet.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::error::{ServiceError, ServiceResult};
use crate::types::StaffData;

use super::{http_agent, upstream_error};

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Day-first layouts come before ISO because the form runs with a Malaysian
/// locale; month-first is never tried.
const TIMESTAMP_FORMATS: &[&str] = &[
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d/%m/%Y, %H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

#[derive(Clone)]
pub struct SheetsClient {
    agent: ureq::Agent,
    sheet_id: String,
    api_key: String,
    range: String,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

impl SheetsClient {
    pub fn new(sheet_id: String, api_key: String, range: String) -> Self {
        Self {
            agent: http_agent(Duration::from_secs(20)),
            sheet_id,
            api_key,
            range,
        }
    }

    fn values_url(&self) -> String {
        format!(
            "{}/{}/values/{}",
            SHEETS_API,
            encode_segment(&self.sheet_id),
            encode_segment(&self.range)
        )
    }

    pub fn fetch_rows(&self) -> ServiceResult<Vec<Vec<String>>> {
        let url = self.values_url();
        let response = self
            .agent
            .get(&url)
            .query("key", &self.api_key)
            .query("valueRenderOption", "FORMATTED_VALUE")
            .call()
            .map_err(|e| upstream_error("Google Sheets", e))?;
        let parsed: ValueRange = response
            .into_json()
            .map_err(|e| ServiceError::Upstream(format!("Failed to read sheet values: {e}")))?;
        Ok(parsed.values)
    }

    pub fn fetch_roster(&self, offset: &FixedOffset) -> ServiceResult<Vec<StaffData>> {
        let rows = self.fetch_rows()?;
        Ok(parse_roster(&rows, offset))
    }
}

/// Percent-encode one URL path segment. A1 ranges carry spaces, `!` and `:`.
fn encode_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

/// Parse a spreadsheet timestamp as wall-clock time at `offset`.
pub fn parse_timestamp(raw: &str, offset: &FixedOffset) -> Option<DateTime<Utc>> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    TIMESTAMP_FORMATS.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(text, fmt)
            .ok()
            .and_then(|naive| offset.from_local_datetime(&naive).single())
            .map(|dt| dt.with_timezone(&Utc))
    })
}

struct Columns {
    timestamp: usize,
    name: usize,
    position: Option<usize>,
    department: Option<usize>,
    status: Option<usize>,
    email: Option<usize>,
}

impl Columns {
    fn from_header(header: &[String]) -> Option<Self> {
        let find = |label: &str| {
            header
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(label))
        };
        Some(Columns {
            timestamp: find("Timestamp")?,
            name: find("Name")?,
            position: find("Position"),
            department: find("Department"),
            status: find("Status"),
            email: find("Email").or_else(|| find("Email Address")),
        })
    }
}

/// Map sheet rows (header first) to roster entries. Rows without a name or
/// with an unreadable timestamp are dropped.
pub fn parse_roster(rows: &[Vec<String>], offset: &FixedOffset) -> Vec<StaffData> {
    let Some((header, body)) = rows.split_first() else {
        return Vec::new();
    };
    let Some(columns) = Columns::from_header(header) else {
        tracing::warn!(?header, "roster sheet is missing Timestamp or Name column");
        return Vec::new();
    };

    let cell = |row: &[String], index: Option<usize>| -> String {
        index
            .and_then(|i| row.get(i))
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    };

    let mut staff = Vec::with_capacity(body.len());
    for (line, row) in body.iter().enumerate() {
        let name = cell(row, Some(columns.name));
        if name.is_empty() {
            continue;
        }
        let raw_timestamp = cell(row, Some(columns.timestamp));
        let Some(timestamp) = parse_timestamp(&raw_timestamp, offset) else {
            tracing::warn!(row = line + 2, timestamp = %raw_timestamp, "dropping roster row with malformed timestamp");
            continue;
        };
        staff.push(StaffData {
            timestamp,
            name,
            position: cell(row, columns.position),
            department: cell(row, columns.department),
            status: cell(row, columns.status),
            email: cell(row, columns.email),
        });
    }
    staff
}

#[cfg(test)]
mod tests {
    use super::*;

    fn myt() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).unwrap()
    }

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn timestamps_are_day_first_local_time() {
        let parsed = parse_timestamp("19/10/2026 14:05:33", &myt()).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 10, 19, 6, 5, 33).unwrap());

        let parsed = parse_timestamp("3/2/2026 8:00", &myt()).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 2, 3, 0, 0, 0).unwrap());

        let parsed = parse_timestamp("2026-10-19T01:00:00Z", &myt()).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 10, 19, 1, 0, 0).unwrap());
    }

    #[test]
    fn malformed_timestamps_are_rejected() {
        for raw in ["", "yesterday", "31/02/2026 10:00:00", "10/19/2026 14:05:33"] {
            assert!(parse_timestamp(raw, &myt()).is_none(), "accepted {raw:?}");
        }
    }

    #[test]
    fn roster_rows_map_by_header() {
        let rows = vec![
            row(&["Timestamp", "Email", "Name", "Position", "Department", "Status"]),
            row(&["19/10/2026 08:00:00", "hazim@example.com", "HAZIM", "F1", "ICT", "Available"]),
            row(&["not a date", "x@example.com", "BROKEN", "F1", "ICT", "Busy"]),
            row(&["19/10/2026 09:00:00", "", "", "F1", "ICT", "Busy"]),
            row(&["19/10/2026 09:30:00", "hafsah@example.com", "HAFSAH"]),
        ];
        let staff = parse_roster(&rows, &myt());
        assert_eq!(staff.len(), 2);
        assert_eq!(staff[0].name, "HAZIM");
        assert_eq!(staff[0].email, "hazim@example.com");
        assert_eq!(staff[0].status, "Available");
        assert_eq!(staff[1].name, "HAFSAH");
        assert_eq!(staff[1].status, "");
    }

    #[test]
    fn ranges_are_encoded_into_the_path() {
        let client = SheetsClient::new(
            "1AbC-xyz_9".into(),
            "key".into(),
            "Form Responses 1!A:F".into(),
        );
        assert_eq!(
            client.values_url(),
            "https://sheets.googleapis.com/v4/spreadsheets/1AbC-xyz_9/values/Form%20Responses%201%21A%3AF"
        );
        assert_eq!(encode_segment("Borang/Staf"), "Borang%2FStaf");
        assert_eq!(encode_segment("Ruang é"), "Ruang%20%C3%A9");
    }

    #[test]
    fn missing_header_yields_nothing() {
        let rows = vec![row(&["When", "Who"]), row(&["19/10/2026 08:00:00", "HAZIM"])];
        assert!(parse_roster(&rows, &myt()).is_empty());
        assert!(parse_roster(&[], &myt()).is_empty());
    }
}
