//! Delimited-text loader with column type inference.
//!
//! Parsing handles RFC 4180 quoted fields. Rows whose arity does not match
//! the header are reported with their line number and excluded, never
//! silently dropped.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::core::errors::TableError;
use crate::table::schema::{CellValue, Column, ColumnType, Row, Schema, Table};

/// A rejected input row and why it was rejected.
#[derive(Debug, Clone, Serialize)]
pub struct RowIssue {
    /// 1-based line number in the input.
    pub line: usize,
    pub reason: String,
}

#[derive(Debug)]
pub struct LoadReport {
    pub table: Table,
    pub issues: Vec<RowIssue>,
}

pub fn load_from_path(path: &std::path::Path) -> Result<LoadReport, TableError> {
    let content =
        std::fs::read_to_string(path).map_err(|e| TableError::Read(format!("{}: {}", path.display(), e)))?;
    load_from_str(&content)
}

pub fn load_from_str(content: &str) -> Result<LoadReport, TableError> {
    let mut lines = content.lines().enumerate();

    let header_line = loop {
        match lines.next() {
            Some((_, line)) if line.trim().is_empty() => continue,
            Some((_, line)) => break line,
            None => return Err(TableError::Empty),
        }
    };

    let headers: Vec<String> = parse_line(header_line)
        .into_iter()
        .map(|s| s.trim().to_string())
        .collect();
    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(TableError::Empty);
    }

    let mut issues = Vec::new();
    let mut raw_rows: Vec<Vec<String>> = Vec::new();

    for (idx, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        let fields = parse_line(line);
        if fields.len() != headers.len() {
            issues.push(RowIssue {
                line: idx + 1,
                reason: format!("expected {} fields, found {}", headers.len(), fields.len()),
            });
            continue;
        }
        raw_rows.push(fields);
    }

    let types: Vec<ColumnType> = (0..headers.len())
        .map(|col| infer_column_type(raw_rows.iter().map(|row| row[col].as_str())))
        .collect();

    let schema = Schema {
        columns: headers
            .into_iter()
            .zip(types.iter())
            .map(|(name, ty)| Column { name, ty: *ty })
            .collect(),
    };

    let rows: Vec<Row> = raw_rows
        .iter()
        .map(|raw| {
            raw.iter()
                .zip(types.iter())
                .map(|(field, ty)| coerce(field, *ty))
                .collect()
        })
        .collect();

    Ok(LoadReport {
        table: Table { schema, rows },
        issues,
    })
}

/// Parse one CSV line into fields, handling RFC 4180 quoting. Double quotes
/// inside a quoted field are escaped by doubling.
fn parse_line(line: &str) -> Vec<String> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(ch);
            }
        } else if ch == '"' {
            in_quotes = true;
        } else if ch == ',' {
            fields.push(current.clone());
            current.clear();
        } else {
            current.push(ch);
        }
    }
    fields.push(current);
    fields
}

/// Pick the narrowest type every non-empty value in the column fits.
/// Boolean and number take priority over datetime; anything else is string.
fn infer_column_type<'a>(values: impl Iterator<Item = &'a str>) -> ColumnType {
    let mut saw_value = false;
    let mut all_bool = true;
    let mut all_number = true;
    let mut all_datetime = true;

    for value in values {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        saw_value = true;
        if !matches!(value.to_ascii_lowercase().as_str(), "true" | "false") {
            all_bool = false;
        }
        if value.parse::<f64>().is_err() {
            all_number = false;
        }
        if parse_datetime(value).is_none() {
            all_datetime = false;
        }
        if !all_bool && !all_number && !all_datetime {
            return ColumnType::String;
        }
    }

    if !saw_value {
        ColumnType::String
    } else if all_bool {
        ColumnType::Boolean
    } else if all_number {
        ColumnType::Number
    } else if all_datetime {
        ColumnType::Datetime
    } else {
        ColumnType::String
    }
}

pub(crate) fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(DateTime::from_naive_utc_and_offset(
            date.and_hms_opt(0, 0, 0)?,
            Utc,
        ));
    }
    None
}

fn coerce(field: &str, ty: ColumnType) -> CellValue {
    let value = field.trim();
    if value.is_empty() {
        return CellValue::Null;
    }
    match ty {
        ColumnType::Boolean => CellValue::Boolean(value.eq_ignore_ascii_case("true")),
        ColumnType::Number => value
            .parse::<f64>()
            .map(CellValue::Number)
            .unwrap_or(CellValue::Null),
        ColumnType::Datetime => parse_datetime(value)
            .map(CellValue::Datetime)
            .unwrap_or(CellValue::Null),
        ColumnType::String => CellValue::String(value.to_string()),
    }
}
