//! Tabular run encoding.
//!
//! One header row followed by one row per point:
//!
//! ```text
//! Timestamp,Latitude,Longitude,Velocity(m/s),Velocity(mph),Acceleration(m/s²)
//! 2024-05-01T10:30:00.000Z,36.0139,-5.6026,4.2,9.395148,0.35
//! ```
//!
//! Timestamps are RFC 3339 instants in UTC with millisecond precision, so
//! rows sort lexically by time. Numbers use Rust's shortest round-trip
//! formatting, so re-parsing reproduces the written `f64` values exactly.
//!
//! Parsing is tolerant: rows with fewer than six fields, invalid UTF-8, a
//! bad timestamp, a non-finite number or out-of-range coordinates are logged, reported in [`ParsedRun::skipped`] and
//! dropped; the rest of the run still loads.

use std::io::{Read, Write};

use chrono::{DateTime, SecondsFormat, Utc};
use csv::{ByteRecord, ReaderBuilder, StringRecord, Terminator, Trim, WriterBuilder};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{FoilTrackError, Result};
use crate::{EnrichedPoint, GpsPoint};

/// Fixed header row.
pub const CSV_HEADER: [&str; 6] = [
    "Timestamp",
    "Latitude",
    "Longitude",
    "Velocity(m/s)",
    "Velocity(mph)",
    "Acceleration(m/s²)",
];

/// A row that could not be turned into a point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRow {
    /// 1-based line number in the input
    pub line: u64,
    /// Raw row content, fields joined with commas
    pub content: String,
    pub reason: String,
}

/// Result of parsing a persisted run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedRun {
    pub points: Vec<EnrichedPoint>,
    pub skipped: Vec<SkippedRow>,
}

// ============================================================================
// Encoding
// ============================================================================

/// Format a timestamp the way it is persisted.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Encode one point as its six fields.
pub fn encode_row(point: &EnrichedPoint) -> [String; 6] {
    [
        format_timestamp(&point.timestamp),
        point.latitude.to_string(),
        point.longitude.to_string(),
        point.velocity_ms.to_string(),
        point.velocity_mph.to_string(),
        point.acceleration.to_string(),
    ]
}

/// Write points, optionally preceded by the header row.
pub fn write_points<W: Write>(writer: W, points: &[EnrichedPoint], include_header: bool) -> Result<()> {
    let mut csv_writer = WriterBuilder::new()
        .has_headers(false)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(writer);

    if include_header {
        csv_writer.write_record(CSV_HEADER)?;
    }
    for point in points {
        csv_writer.write_record(encode_row(point))?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Encode a complete run (header plus rows) to a string.
pub fn encode_run(points: &[EnrichedPoint]) -> Result<String> {
    let mut buf = Vec::new();
    write_points(&mut buf, points, true)?;
    String::from_utf8(buf)
        .map_err(|e| FoilTrackError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

// ============================================================================
// Decoding
// ============================================================================

/// Parse a persisted run, skipping malformed rows.
///
/// Only a failure of the underlying reader aborts the parse.
pub fn parse_run<R: Read>(reader: R) -> Result<ParsedRun> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    {
        let headers = csv_reader.byte_headers()?;
        if headers.iter().ne(CSV_HEADER.iter().map(|h| h.as_bytes())) && !headers.is_empty() {
            warn!("Unexpected run header: {}", join_fields(headers));
        }
    }

    let mut parsed = ParsedRun::default();
    for result in csv_reader.byte_records() {
        let raw = match result {
            Ok(record) => record,
            Err(e) => {
                if matches!(e.kind(), csv::ErrorKind::Io(_)) {
                    return Err(e.into());
                }
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                warn!("Skipping unreadable row at line {}: {}", line, e);
                parsed.skipped.push(SkippedRow {
                    line,
                    content: String::new(),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let line = raw.position().map(|p| p.line()).unwrap_or(0);
        let outcome = match StringRecord::from_byte_record(raw) {
            Ok(record) => parse_row(&record)
                .map_err(|reason| (reason, join_fields(record.as_byte_record()))),
            Err(e) => {
                let reason = format!("invalid UTF-8: {}", e.utf8_error());
                Err((reason, join_fields(&e.into_byte_record())))
            }
        };

        match outcome {
            Ok(point) => parsed.points.push(point),
            Err((reason, content)) => {
                warn!("Skipping row {} ({}): {}", line, reason, content);
                parsed.skipped.push(SkippedRow {
                    line,
                    content,
                    reason,
                });
            }
        }
    }

    debug!(
        "Parsed run: {} points, {} skipped rows",
        parsed.points.len(),
        parsed.skipped.len()
    );
    Ok(parsed)
}

/// Parse a run held in memory.
pub fn parse_run_str(data: &str) -> Result<ParsedRun> {
    parse_run(data.as_bytes())
}

/// Parse one data row. Extra trailing fields are ignored.
pub fn parse_row(record: &StringRecord) -> std::result::Result<EnrichedPoint, String> {
    if record.len() < CSV_HEADER.len() {
        return Err(format!(
            "expected {} fields, found {}",
            CSV_HEADER.len(),
            record.len()
        ));
    }

    let timestamp = DateTime::parse_from_rfc3339(&record[0])
        .map_err(|e| format!("bad timestamp '{}': {}", &record[0], e))?
        .with_timezone(&Utc);

    let latitude = parse_number(&record[1], "latitude")?;
    let longitude = parse_number(&record[2], "longitude")?;
    if !GpsPoint::new(latitude, longitude).is_valid() {
        return Err(format!(
            "coordinates out of range ({}, {})",
            latitude, longitude
        ));
    }

    Ok(EnrichedPoint {
        timestamp,
        latitude,
        longitude,
        speed: None,
        accuracy: None,
        velocity_ms: parse_number(&record[3], "velocity")?,
        velocity_mph: parse_number(&record[4], "velocity mph")?,
        acceleration: parse_number(&record[5], "acceleration")?,
    })
}

/// Finite numbers only; `NaN` and `inf` parse as `f64` but are not data.
fn parse_number(field: &str, name: &str) -> std::result::Result<f64, String> {
    field
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("bad {} '{}'", name, field))
}

fn join_fields(record: &ByteRecord) -> String {
    record
        .iter()
        .map(String::from_utf8_lossy)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_point() -> EnrichedPoint {
        EnrichedPoint {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap(),
            latitude: 36.0139,
            longitude: -5.6026,
            speed: Some(4.2),
            accuracy: Some(3.0),
            velocity_ms: 4.2,
            velocity_mph: 4.2 * crate::MS_TO_MPH,
            acceleration: 0.35,
        }
    }

    #[test]
    fn test_header_line() {
        let encoded = encode_run(&[]).unwrap();
        assert_eq!(
            encoded,
            "Timestamp,Latitude,Longitude,Velocity(m/s),Velocity(mph),Acceleration(m/s²)\n"
        );
    }

    #[test]
    fn test_row_format() {
        let row = encode_row(&sample_point());
        assert_eq!(row[0], "2024-05-01T10:30:00.000Z");
        assert_eq!(row[1], "36.0139");
        assert_eq!(row[2], "-5.6026");
        assert_eq!(row[5], "0.35");
    }

    #[test]
    fn test_short_row_skipped() {
        let data = "Timestamp,Latitude,Longitude,Velocity(m/s),Velocity(mph),Acceleration(m/s²)\n\
                    2024-05-01T10:30:00.000Z,36.0,-5.6,1.0,2.23694,0.0\n\
                    2024-05-01T10:30:01.000Z,36.0,-5.6\n";
        let parsed = parse_run_str(data).unwrap();
        assert_eq!(parsed.points.len(), 1);
        assert_eq!(parsed.skipped.len(), 1);
        assert_eq!(parsed.skipped[0].line, 3);
        assert!(parsed.skipped[0].reason.contains("found 3"));
    }

    #[test]
    fn test_non_numeric_row_skipped() {
        let data = "Timestamp,Latitude,Longitude,Velocity(m/s),Velocity(mph),Acceleration(m/s²)\n\
                    2024-05-01T10:30:00.000Z,north,-5.6,1.0,2.23694,0.0\n\
                    yesterday,36.0,-5.6,1.0,2.23694,0.0\n\
                    2024-05-01T10:30:02Z,36.0,-5.6,1.0,2.23694,0.0\n";
        let parsed = parse_run_str(data).unwrap();
        assert_eq!(parsed.points.len(), 1);
        assert_eq!(parsed.skipped.len(), 2);
        assert!(parsed.skipped[0].reason.contains("latitude"));
        assert!(parsed.skipped[1].reason.contains("timestamp"));
    }

    #[test]
    fn test_extra_fields_ignored() {
        let data = "Timestamp,Latitude,Longitude,Velocity(m/s),Velocity(mph),Acceleration(m/s²)\n\
                    2024-05-01T10:30:00.000Z,36.0,-5.6,1.0,2.23694,0.0,extra\n";
        let parsed = parse_run_str(data).unwrap();
        assert_eq!(parsed.points.len(), 1);
        assert!(parsed.skipped.is_empty());
    }

    #[test]
    fn test_empty_input() {
        let parsed = parse_run_str("").unwrap();
        assert!(parsed.points.is_empty());
        assert!(parsed.skipped.is_empty());
    }

    #[test]
    fn test_non_finite_row_skipped() {
        let data = "Timestamp,Latitude,Longitude,Velocity(m/s),Velocity(mph),Acceleration(m/s²)\n\
                    2024-05-01T10:30:00.000Z,36.0,-5.6,1.0,2.23694,0.0\n\
                    2024-05-01T10:30:01.000Z,NaN,-5.6,inf,inf,NaN\n\
                    2024-05-01T10:30:02.000Z,36.0001,-5.6,1.0,2.23694,-infinity\n\
                    2024-05-01T10:30:03.000Z,36.0002,-5.6,1.0,2.23694,0.0\n";
        let parsed = parse_run_str(data).unwrap();
        assert_eq!(parsed.points.len(), 2);
        assert_eq!(parsed.skipped.len(), 2);
        assert!(parsed.skipped[0].reason.contains("latitude"));
        assert!(parsed.skipped[1].reason.contains("acceleration"));

        let totals = crate::aggregate(&parsed.points);
        assert!(totals.distance_miles.is_finite());
        assert!(totals.max_speed_mph.is_finite());
    }

    #[test]
    fn test_out_of_range_coordinates_skipped() {
        let data = "Timestamp,Latitude,Longitude,Velocity(m/s),Velocity(mph),Acceleration(m/s²)\n\
                    2024-05-01T10:30:00.000Z,91.0,-5.6,1.0,2.23694,0.0\n\
                    2024-05-01T10:30:01.000Z,36.0,-180.5,1.0,2.23694,0.0\n";
        let parsed = parse_run_str(data).unwrap();
        assert!(parsed.points.is_empty());
        assert_eq!(parsed.skipped.len(), 2);
        assert!(parsed.skipped[0].reason.contains("out of range"));
    }

    #[test]
    fn test_invalid_utf8_row_keeps_content() {
        let mut data = b"Timestamp,Latitude,Longitude,Velocity(m/s),Velocity(mph),Acceleration(m/s\xC2\xB2)\n\
                         2024-05-01T10:30:00.000Z,36.0,-5.6,1.0,2.23694,0.0\n"
            .to_vec();
        data.extend_from_slice(b"2024-05-01T10:30:01.000Z,36.0,\xFF\xFE,1.0,2.23694,0.0\n");

        let parsed = parse_run(&data[..]).unwrap();
        assert_eq!(parsed.points.len(), 1);
        assert_eq!(parsed.skipped.len(), 1);
        let skipped = &parsed.skipped[0];
        assert_eq!(skipped.line, 3);
        assert!(skipped.reason.contains("UTF-8"));
        assert!(skipped.content.starts_with("2024-05-01T10:30:01.000Z,36.0,"));
        assert!(skipped.content.contains('\u{FFFD}'));
    }
}
