//! CSV parsing into typed frames.
//!
//! The first record is the header. Column types are inferred by scanning
//! every value: integers (sized by magnitude), floats, booleans, otherwise
//! strings. Empty fields are nulls. Inference deliberately stops short of
//! date/timestamp sniffing; temporal types only arise from an explicit
//! column mapping, so unmapped text columns stay strings in the artifact.

use crate::error::{LoadError, Result};
use crate::frame::{Column, ColumnKind, ColumnValues, Frame};

/// Parse CSV bytes into a frame.
///
/// Bytes are decoded as UTF-8 when valid, otherwise as Windows-1252 (the
/// usual encoding of exported spreadsheets that are not UTF-8).
pub fn read_csv(bytes: &[u8]) -> Result<Frame> {
    let text = decode_text(bytes);

    let mut reader = csv::ReaderBuilder::new().from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|err| LoadError::storage_read(format!("failed to parse CSV header: {err}")))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record
            .map_err(|err| LoadError::storage_read(format!("failed to parse CSV record: {err}")))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    let columns = headers
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let values: Vec<&str> = rows
                .iter()
                .map(|row| row.get(idx).map_or("", String::as_str))
                .collect();
            Column::new(name.clone(), build_column(&values))
        })
        .collect();

    Frame::from_columns(columns)
}

fn decode_text(bytes: &[u8]) -> String {
    let (text, _, had_errors) = encoding_rs::UTF_8.decode(bytes);
    if !had_errors {
        return text.into_owned();
    }
    let (text, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    text.into_owned()
}

/// Infer the kind of a single value. `None` means null.
fn infer_value_kind(value: &str) -> Option<ColumnKind> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(n) = trimmed.parse::<i64>() {
        return Some(if i16::try_from(n).is_ok() {
            ColumnKind::Int16
        } else if i32::try_from(n).is_ok() {
            ColumnKind::Int32
        } else {
            ColumnKind::Int64
        });
    }

    if trimmed.parse::<f64>().is_ok() {
        return Some(ColumnKind::Float64);
    }

    if trimmed.eq_ignore_ascii_case("true") || trimmed.eq_ignore_ascii_case("false") {
        return Some(ColumnKind::Bool);
    }

    Some(ColumnKind::Utf8)
}

fn build_column(values: &[&str]) -> ColumnValues {
    let kind = values
        .iter()
        .filter_map(|v| infer_value_kind(v))
        .fold(None, |acc: Option<ColumnKind>, k| {
            Some(acc.map_or(k, |a| a.common(k)))
        })
        .unwrap_or(ColumnKind::Utf8);

    match kind {
        ColumnKind::Bool => ColumnValues::Bool(
            values
                .iter()
                .map(|v| non_empty(v).map(|t| t.eq_ignore_ascii_case("true")))
                .collect(),
        ),
        ColumnKind::Int16 => {
            ColumnValues::Int16(values.iter().map(|v| parse_num::<i16>(v)).collect())
        }
        ColumnKind::Int32 => {
            ColumnValues::Int32(values.iter().map(|v| parse_num::<i32>(v)).collect())
        }
        ColumnKind::Int64 => {
            ColumnValues::Int64(values.iter().map(|v| parse_num::<i64>(v)).collect())
        }
        ColumnKind::Float64 => {
            ColumnValues::Float64(values.iter().map(|v| parse_num::<f64>(v)).collect())
        }
        _ => ColumnValues::Utf8(
            values
                .iter()
                .map(|v| non_empty(v).map(|_| (*v).to_string()))
                .collect(),
        ),
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn parse_num<T: std::str::FromStr>(value: &str) -> Option<T> {
    non_empty(value).and_then(|t| t.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_typed_columns() {
        let csv = b"id,score,active,label\n1,1.5,true,alpha\n2,2.5,false,beta\n";
        let frame = read_csv(csv).unwrap();

        assert_eq!(frame.column_names(), vec!["id", "score", "active", "label"]);
        assert_eq!(
            frame.column("id").unwrap().values,
            ColumnValues::Int16(vec![Some(1), Some(2)])
        );
        assert_eq!(
            frame.column("score").unwrap().values,
            ColumnValues::Float64(vec![Some(1.5), Some(2.5)])
        );
        assert_eq!(
            frame.column("active").unwrap().values,
            ColumnValues::Bool(vec![Some(true), Some(false)])
        );
        assert_eq!(
            frame.column("label").unwrap().values,
            ColumnValues::Utf8(vec![Some("alpha".to_string()), Some("beta".to_string())])
        );
    }

    #[test]
    fn empty_fields_are_nulls() {
        let csv = b"id,note\n1,\n,hello\n";
        let frame = read_csv(csv).unwrap();

        assert_eq!(
            frame.column("id").unwrap().values,
            ColumnValues::Int16(vec![Some(1), None])
        );
        assert_eq!(
            frame.column("note").unwrap().values,
            ColumnValues::Utf8(vec![None, Some("hello".to_string())])
        );
    }

    #[test]
    fn integer_width_follows_magnitude() {
        let frame = read_csv(b"v\n1\n100000\n").unwrap();
        assert_eq!(
            frame.column("v").unwrap().values,
            ColumnValues::Int32(vec![Some(1), Some(100_000)])
        );

        let frame = read_csv(b"v\n1\n9999999999\n").unwrap();
        assert_eq!(
            frame.column("v").unwrap().values,
            ColumnValues::Int64(vec![Some(1), Some(9_999_999_999)])
        );
    }

    #[test]
    fn mixed_values_degrade_to_strings() {
        let frame = read_csv(b"v\n123\nhello\n456\n").unwrap();
        assert_eq!(
            frame.column("v").unwrap().values,
            ColumnValues::Utf8(vec![
                Some("123".to_string()),
                Some("hello".to_string()),
                Some("456".to_string())
            ])
        );
    }

    #[test]
    fn ints_and_floats_meet_at_float64() {
        let frame = read_csv(b"v\n1\n2.5\n").unwrap();
        assert_eq!(
            frame.column("v").unwrap().values,
            ColumnValues::Float64(vec![Some(1.0), Some(2.5)])
        );
    }

    #[test]
    fn decodes_windows_1252_fallback() {
        // "café" with a Latin-1 e-acute, invalid as UTF-8
        let csv = b"name\ncaf\xe9\n";
        let frame = read_csv(csv).unwrap();
        assert_eq!(
            frame.column("name").unwrap().values,
            ColumnValues::Utf8(vec![Some("café".to_string())])
        );
    }

    #[test]
    fn ragged_record_is_a_read_error() {
        let result = read_csv(b"a,b\n1,2\n3\n");
        assert!(matches!(result, Err(LoadError::StorageRead(_))));
    }

    #[test]
    fn header_only_yields_empty_frame() {
        let frame = read_csv(b"a,b\n").unwrap();
        assert!(frame.is_empty());
        assert_eq!(frame.num_columns(), 2);
    }
}
