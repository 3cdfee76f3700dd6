//! Excel workbook reader. Decodes the first worksheet of an `.xlsx`/`.xls`
//! object into a [`Frame`], inferring a column kind per header from the cell
//! values underneath it.

use std::io::Cursor;

use calamine::{Data, Reader, open_workbook_auto_from_rs};
use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{LoadError, Result};
use crate::frame::{Column, ColumnKind, ColumnValues, Frame, render_timestamp};

/// Parse workbook bytes and convert the first worksheet to a frame.
///
/// The sheet's first row supplies column names; blank header cells get a
/// positional `column_N` name. Rows below the header become values.
pub fn read_workbook(bytes: &[u8]) -> Result<Frame> {
    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook = open_workbook_auto_from_rs(cursor)
        .map_err(|err| LoadError::storage_read(format!("unreadable workbook: {err}")))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| LoadError::storage_read("workbook has no worksheets"))?
        .map_err(|err| LoadError::storage_read(format!("unreadable worksheet: {err}")))?;

    rows_to_frame(range.rows())
}

/// What a single cell contributes to column inference.
enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Microseconds since the Unix epoch.
    Timestamp(i64),
}

impl Cell {
    fn kind(&self) -> Option<ColumnKind> {
        match self {
            Cell::Null => None,
            Cell::Bool(_) => Some(ColumnKind::Bool),
            Cell::Int(value) => Some(int_kind(*value)),
            Cell::Float(_) => Some(ColumnKind::Float64),
            Cell::Text(_) => Some(ColumnKind::Utf8),
            Cell::Timestamp(_) => Some(ColumnKind::Timestamp),
        }
    }

    fn render(&self) -> Option<String> {
        match self {
            Cell::Null => None,
            Cell::Bool(value) => Some(value.to_string()),
            Cell::Int(value) => Some(value.to_string()),
            Cell::Float(value) => Some(value.to_string()),
            Cell::Text(value) => Some(value.clone()),
            Cell::Timestamp(micros) => render_timestamp(*micros),
        }
    }
}

// Largest magnitude losslessly representable in an f64 mantissa.
const MAX_EXACT_INT_IN_F64: f64 = 9_007_199_254_740_992.0;

fn classify(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Null,
        Data::Bool(value) => Cell::Bool(*value),
        Data::Int(value) => Cell::Int(*value),
        Data::Float(value) => {
            // Spreadsheets store integers as floats. Collapse integral values
            // back to ints so the column types as an integer column.
            if value.fract() == 0.0 && value.abs() < MAX_EXACT_INT_IN_F64 {
                Cell::Int(*value as i64)
            } else {
                Cell::Float(*value)
            }
        }
        Data::String(value) => {
            if value.trim().is_empty() {
                Cell::Null
            } else {
                Cell::Text(value.clone())
            }
        }
        Data::DateTime(value) => match value.as_datetime() {
            Some(datetime) => Cell::Timestamp(datetime.and_utc().timestamp_micros()),
            None => Cell::Null,
        },
        Data::DateTimeIso(value) => match parse_iso_datetime(value) {
            Some(micros) => Cell::Timestamp(micros),
            None => Cell::Text(value.clone()),
        },
        Data::DurationIso(value) => Cell::Text(value.clone()),
        Data::Error(_) => Cell::Null,
    }
}

fn int_kind(value: i64) -> ColumnKind {
    if i16::try_from(value).is_ok() {
        ColumnKind::Int16
    } else if i32::try_from(value).is_ok() {
        ColumnKind::Int32
    } else {
        ColumnKind::Int64
    }
}

fn parse_iso_datetime(text: &str) -> Option<i64> {
    let trimmed = text.trim();
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(datetime.and_utc().timestamp_micros());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0)?;
        return Some(midnight.and_utc().timestamp_micros());
    }
    None
}

fn header_name(data: &Data, index: usize) -> String {
    match data {
        Data::Empty => format!("column_{}", index + 1),
        other => {
            let text = other.to_string();
            if text.trim().is_empty() {
                format!("column_{}", index + 1)
            } else {
                text
            }
        }
    }
}

/// Build a frame from worksheet rows. The first row is the header.
pub(crate) fn rows_to_frame<'a, I>(rows: I) -> Result<Frame>
where
    I: IntoIterator<Item = &'a [Data]>,
{
    let mut rows = rows.into_iter();
    let Some(header) = rows.next() else {
        return Ok(Frame::new());
    };

    let names: Vec<String> = header
        .iter()
        .enumerate()
        .map(|(index, data)| header_name(data, index))
        .collect();

    let mut cells: Vec<Vec<Cell>> = names.iter().map(|_| Vec::new()).collect();
    for row in rows {
        for (index, column) in cells.iter_mut().enumerate() {
            let cell = row.get(index).map(classify).unwrap_or(Cell::Null);
            column.push(cell);
        }
    }

    let columns = names
        .into_iter()
        .zip(cells)
        .map(|(name, cells)| Column::new(name, build_values(cells)))
        .collect();
    Frame::from_columns(columns)
}

fn build_values(cells: Vec<Cell>) -> ColumnValues {
    let kind = cells
        .iter()
        .filter_map(Cell::kind)
        .reduce(ColumnKind::common)
        .unwrap_or(ColumnKind::Utf8);

    match kind {
        ColumnKind::Bool => ColumnValues::Bool(
            cells
                .into_iter()
                .map(|cell| match cell {
                    Cell::Bool(value) => Some(value),
                    _ => None,
                })
                .collect(),
        ),
        ColumnKind::Int16 => ColumnValues::Int16(collect_ints(cells, |v| i16::try_from(v).ok())),
        ColumnKind::Int32 => ColumnValues::Int32(collect_ints(cells, |v| i32::try_from(v).ok())),
        ColumnKind::Int64 => ColumnValues::Int64(collect_ints(cells, Some)),
        ColumnKind::Float64 => ColumnValues::Float64(
            cells
                .into_iter()
                .map(|cell| match cell {
                    Cell::Float(value) => Some(value),
                    Cell::Int(value) => Some(value as f64),
                    _ => None,
                })
                .collect(),
        ),
        ColumnKind::Timestamp => ColumnValues::Timestamp(
            cells
                .into_iter()
                .map(|cell| match cell {
                    Cell::Timestamp(micros) => Some(micros),
                    _ => None,
                })
                .collect(),
        ),
        // Mixed columns degrade to text, like the delimited reader.
        _ => ColumnValues::Utf8(cells.iter().map(Cell::render).collect()),
    }
}

fn collect_ints<T, F>(cells: Vec<Cell>, narrow: F) -> Vec<Option<T>>
where
    F: Fn(i64) -> Option<T>,
{
    cells
        .into_iter()
        .map(|cell| match cell {
            Cell::Int(value) => narrow(value),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_of(rows: Vec<Vec<Data>>) -> Frame {
        rows_to_frame(rows.iter().map(|row| row.as_slice())).unwrap()
    }

    #[test]
    fn typed_columns_from_cells() {
        let frame = frame_of(vec![
            vec![
                Data::String("id".into()),
                Data::String("price".into()),
                Data::String("active".into()),
                Data::String("name".into()),
            ],
            vec![
                Data::Float(1.0),
                Data::Float(9.99),
                Data::Bool(true),
                Data::String("alpha".into()),
            ],
            vec![
                Data::Float(2.0),
                Data::Float(1.5),
                Data::Bool(false),
                Data::String("beta".into()),
            ],
        ]);

        assert_eq!(frame.num_rows(), 2);
        assert_eq!(frame.column("id").unwrap().values.kind(), ColumnKind::Int16);
        assert_eq!(
            frame.column("price").unwrap().values.kind(),
            ColumnKind::Float64
        );
        assert_eq!(
            frame.column("active").unwrap().values.kind(),
            ColumnKind::Bool
        );
        match &frame.column("name").unwrap().values {
            ColumnValues::Utf8(values) => {
                assert_eq!(values[0].as_deref(), Some("alpha"));
            }
            other => panic!("expected text column, got {:?}", other.kind()),
        }
    }

    #[test]
    fn integral_floats_collapse_to_ints() {
        let cases = [
            (vec![Data::Float(1.0), Data::Float(2.0)], ColumnKind::Int16),
            (
                vec![Data::Float(1.0), Data::Float(100_000.0)],
                ColumnKind::Int32,
            ),
            (
                vec![Data::Float(1.0), Data::Float(1.5)],
                ColumnKind::Float64,
            ),
        ];
        for (cells, expected) in cases {
            let mut rows = vec![vec![Data::String("n".into())]];
            rows.extend(cells.into_iter().map(|cell| vec![cell]));
            let frame = frame_of(rows);
            assert_eq!(frame.column("n").unwrap().values.kind(), expected);
        }
    }

    #[test]
    fn iso_datetimes_become_timestamps() {
        let frame = frame_of(vec![
            vec![Data::String("seen_at".into())],
            vec![Data::DateTimeIso("2024-01-01T00:00:00".into())],
            vec![Data::Empty],
        ]);

        match &frame.column("seen_at").unwrap().values {
            ColumnValues::Timestamp(values) => {
                assert_eq!(values[0], Some(1_704_067_200_000_000));
                assert_eq!(values[1], None);
            }
            other => panic!("expected timestamp column, got {:?}", other.kind()),
        }
    }

    #[test]
    fn blank_headers_get_positional_names() {
        let frame = frame_of(vec![
            vec![Data::String("a".into()), Data::Empty, Data::String("c".into())],
            vec![Data::Float(1.0), Data::Float(2.0), Data::Float(3.0)],
        ]);
        assert_eq!(frame.column_names(), vec!["a", "column_2", "c"]);
    }

    #[test]
    fn short_rows_pad_with_nulls() {
        let frame = frame_of(vec![
            vec![Data::String("a".into()), Data::String("b".into())],
            vec![Data::Float(1.0)],
        ]);
        match &frame.column("b").unwrap().values {
            ColumnValues::Utf8(values) => assert_eq!(values[0], None),
            other => panic!("expected text column, got {:?}", other.kind()),
        }
    }

    #[test]
    fn mixed_cells_degrade_to_text() {
        let frame = frame_of(vec![
            vec![Data::String("v".into())],
            vec![Data::Float(7.0)],
            vec![Data::String("seven".into())],
        ]);
        match &frame.column("v").unwrap().values {
            ColumnValues::Utf8(values) => {
                assert_eq!(values[0].as_deref(), Some("7"));
                assert_eq!(values[1].as_deref(), Some("seven"));
            }
            other => panic!("expected text column, got {:?}", other.kind()),
        }
    }

    #[test]
    fn empty_sheet_yields_empty_frame() {
        let frame = frame_of(Vec::new());
        assert!(frame.is_empty());
        assert_eq!(frame.num_columns(), 0);
    }

    #[test]
    fn error_cells_are_nulls() {
        let frame = frame_of(vec![
            vec![Data::String("n".into())],
            vec![Data::Error(calamine::CellErrorType::Div0)],
            vec![Data::Float(4.0)],
        ]);
        match &frame.column("n").unwrap().values {
            ColumnValues::Int16(values) => {
                assert_eq!(values[0], None);
                assert_eq!(values[1], Some(4));
            }
            other => panic!("expected int column, got {:?}", other.kind()),
        }
    }
}
