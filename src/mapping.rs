//! Declarative column mapping. A mapping file is a JSON object keyed by
//! source column name; each entry may rename the column, coerce it to a
//! warehouse type, and supply a timestamp parse format:
//!
//! ```json
//! {
//!     "Order Date": {
//!         "redshift_column": "order_date",
//!         "type": "DATE",
//!         "date_format": "%d/%m/%Y"
//!     }
//! }
//! ```
//!
//! Entries for columns absent from the batch are ignored. Values that fail
//! to coerce become nulls, except `VARCHAR` which renders nulls as empty
//! strings.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;

use crate::error::{LoadError, Result};
use crate::frame::{ColumnKind, ColumnValues, Frame, MICROS_PER_DAY};

/// One mapping entry, as written in the mapping file.
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnRule {
    pub redshift_column: Option<String>,
    #[serde(rename = "type")]
    pub type_tag: Option<String>,
    pub date_format: Option<String>,
}

/// The full mapping, keyed by source column name.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct ColumnMapping(HashMap<String, ColumnRule>);

impl ColumnMapping {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|err| LoadError::configuration(format!("invalid column mapping: {err}")))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Coerce and rename the frame's columns per the mapping.
    ///
    /// Every type tag is validated before any column is touched, so a
    /// misspelled tag fails the whole call instead of half-applying.
    pub fn apply(&self, mut frame: Frame) -> Result<Frame> {
        if self.0.is_empty() {
            return Ok(frame);
        }

        let mut tags: HashMap<&str, TypeTag> = HashMap::new();
        for (source, rule) in &self.0 {
            if let Some(text) = &rule.type_tag {
                let tag = TypeTag::parse(text).map_err(|err| {
                    LoadError::configuration(format!("column '{source}': {err}"))
                })?;
                tags.insert(source.as_str(), tag);
            }
        }

        let names: Vec<String> = frame
            .column_names()
            .iter()
            .map(|name| name.to_string())
            .collect();
        let mut renames = Vec::new();
        for name in names {
            let Some(rule) = self.0.get(&name) else {
                continue;
            };
            if let Some(tag) = tags.get(name.as_str()) {
                let values = match frame.column(&name) {
                    Some(column) => column.values.clone(),
                    None => continue,
                };
                let coerced = coerce(values, *tag, rule.date_format.as_deref());
                frame.replace_values(&name, coerced)?;
            }
            if let Some(target) = &rule.redshift_column
                && target != &name
            {
                renames.push((name, target.clone()));
            }
        }
        for (from, to) in renames {
            frame.rename_column(&from, &to)?;
        }
        Ok(frame)
    }
}

/// A parsed `type` tag from a mapping entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeTag {
    Date,
    Timestamp,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Decimal { precision: u8, scale: i8 },
    Boolean,
    Varchar,
}

impl TypeTag {
    fn parse(text: &str) -> std::result::Result<TypeTag, String> {
        let normalized = text.trim().to_ascii_uppercase();
        match normalized.as_str() {
            "DATE" => Ok(TypeTag::Date),
            "TIMESTAMP" => Ok(TypeTag::Timestamp),
            "SMALLINT" => Ok(TypeTag::Int16),
            "INT" => Ok(TypeTag::Int32),
            "BIGINT" => Ok(TypeTag::Int64),
            "REAL" | "FLOAT" => Ok(TypeTag::Float32),
            "DOUBLE PRECISION" | "DOUBLE" => Ok(TypeTag::Float64),
            "BOOLEAN" => Ok(TypeTag::Boolean),
            "VARCHAR" => Ok(TypeTag::Varchar),
            other => parse_decimal_tag(other)
                .ok_or_else(|| format!("unrecognized type tag '{text}'")),
        }
    }
}

fn parse_decimal_tag(normalized: &str) -> Option<TypeTag> {
    let body = normalized
        .strip_prefix("DECIMAL(")?
        .strip_suffix(')')?;
    let (precision, scale) = body.split_once(',')?;
    let precision: u8 = precision.trim().parse().ok()?;
    let scale: i8 = scale.trim().parse().ok()?;
    if precision == 0 || precision > 38 || scale < 0 || scale as u8 > precision {
        return None;
    }
    Some(TypeTag::Decimal { precision, scale })
}

fn coerce(values: ColumnValues, tag: TypeTag, date_format: Option<&str>) -> ColumnValues {
    match tag {
        TypeTag::Int16 => coerce_int(&values, |v| i16::try_from(v).ok(), ColumnValues::Int16),
        TypeTag::Int32 => coerce_int(&values, |v| i32::try_from(v).ok(), ColumnValues::Int32),
        TypeTag::Int64 => coerce_int(&values, Some, ColumnValues::Int64),
        TypeTag::Float32 => {
            ColumnValues::Float32(each(&values, |text| text.trim().parse::<f32>().ok()))
        }
        TypeTag::Float64 => {
            ColumnValues::Float64(each(&values, |text| text.trim().parse::<f64>().ok()))
        }
        TypeTag::Decimal { precision, scale } => ColumnValues::Decimal {
            precision,
            scale,
            values: each(&values, |text| parse_decimal(text, precision, scale)),
        },
        TypeTag::Boolean => ColumnValues::Bool(each(&values, |text| {
            match text.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            }
        })),
        TypeTag::Varchar => ColumnValues::Utf8(
            (0..values.len())
                .map(|row| Some(values.render(row).unwrap_or_default()))
                .collect(),
        ),
        TypeTag::Timestamp => coerce_timestamp(values, date_format),
        TypeTag::Date => coerce_date(values, date_format),
    }
}

/// Apply a string parser to every row, rendering non-null values first.
fn each<T, F>(values: &ColumnValues, parse: F) -> Vec<Option<T>>
where
    F: Fn(&str) -> Option<T>,
{
    (0..values.len())
        .map(|row| values.render(row).as_deref().and_then(&parse))
        .collect()
}

fn coerce_int<T, F, W>(values: &ColumnValues, narrow: F, wrap: W) -> ColumnValues
where
    F: Fn(i64) -> Option<T>,
    W: Fn(Vec<Option<T>>) -> ColumnValues,
{
    wrap(each(values, |text| {
        let trimmed = text.trim();
        if let Ok(value) = trimmed.parse::<i64>() {
            return narrow(value);
        }
        // spreadsheet integers sometimes render as "42.0"
        let float: f64 = trimmed.parse().ok()?;
        if float.fract() == 0.0 && float.abs() < 9_007_199_254_740_992.0 {
            narrow(float as i64)
        } else {
            None
        }
    }))
}

fn coerce_timestamp(values: ColumnValues, date_format: Option<&str>) -> ColumnValues {
    match values.kind() {
        ColumnKind::Timestamp | ColumnKind::Date => values.cast_to(ColumnKind::Timestamp),
        _ => ColumnValues::Timestamp(each(&values, |text| {
            parse_timestamp(text, date_format)
        })),
    }
}

fn coerce_date(values: ColumnValues, date_format: Option<&str>) -> ColumnValues {
    match values {
        ColumnValues::Date(_) => values,
        ColumnValues::Timestamp(micros) => ColumnValues::Date(
            micros
                .into_iter()
                .map(|value| {
                    value.and_then(|micros| {
                        i32::try_from(micros.div_euclid(MICROS_PER_DAY)).ok()
                    })
                })
                .collect(),
        ),
        other => ColumnValues::Date(each(&other, |text| {
            let micros = parse_timestamp(text, date_format)?;
            i32::try_from(micros.div_euclid(MICROS_PER_DAY)).ok()
        })),
    }
}

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d",
    "%Y/%m/%d",
];

fn parse_timestamp(text: &str, date_format: Option<&str>) -> Option<i64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(format) = date_format {
        return parse_with_format(trimmed, format);
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| parse_with_format(trimmed, format))
}

fn parse_with_format(text: &str, format: &str) -> Option<i64> {
    if let Ok(datetime) = NaiveDateTime::parse_from_str(text, format) {
        return Some(datetime.and_utc().timestamp_micros());
    }
    // date-only formats carry no time fields; midnight is implied
    let date = NaiveDate::parse_from_str(text, format).ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_micros())
}

/// Parse a decimal literal into an unscaled i128 at the given scale.
/// Rounds half away from zero on excess fractional digits; values that
/// exceed the precision become null.
fn parse_decimal(text: &str, precision: u8, scale: i8) -> Option<i128> {
    let trimmed = text.trim();
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let (int_part, frac_part) = match body.split_once('.') {
        Some((int_part, frac_part)) => (int_part, frac_part),
        None => (body, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let scale = scale as usize;
    let mut unscaled: i128 = 0;
    for digit in int_part.bytes() {
        unscaled = unscaled
            .checked_mul(10)?
            .checked_add(i128::from(digit - b'0'))?;
    }
    let frac = frac_part.as_bytes();
    for position in 0..scale {
        let digit = frac.get(position).map(|b| i128::from(b - b'0')).unwrap_or(0);
        unscaled = unscaled.checked_mul(10)?.checked_add(digit)?;
    }
    if let Some(next) = frac.get(scale)
        && *next >= b'5'
    {
        unscaled = unscaled.checked_add(1)?;
    }

    if unscaled >= 10_i128.checked_pow(u32::from(precision))? {
        return None;
    }
    Some(if negative { -unscaled } else { unscaled })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Column;

    fn text_frame(name: &str, values: &[Option<&str>]) -> Frame {
        let values = values
            .iter()
            .map(|value| value.map(str::to_string))
            .collect();
        Frame::from_columns(vec![Column::new(name, ColumnValues::Utf8(values))]).unwrap()
    }

    fn mapping(json: &str) -> ColumnMapping {
        ColumnMapping::from_json(json).unwrap()
    }

    #[test]
    fn renames_and_leaves_unmapped_columns_alone() {
        let frame = Frame::from_columns(vec![
            Column::new("Order Id", ColumnValues::Int64(vec![Some(1)])),
            Column::new("other", ColumnValues::Int64(vec![Some(2)])),
        ])
        .unwrap();
        let mapping = mapping(r#"{"Order Id": {"redshift_column": "order_id"}}"#);

        let frame = mapping.apply(frame).unwrap();
        assert_eq!(frame.column_names(), vec!["order_id", "other"]);
    }

    #[test]
    fn entries_for_absent_columns_are_ignored() {
        let frame = text_frame("present", &[Some("1")]);
        let mapping = mapping(r#"{"absent": {"type": "INT"}}"#);
        let frame = mapping.apply(frame).unwrap();
        assert_eq!(frame.column_names(), vec!["present"]);
    }

    #[test]
    fn unrecognized_type_tag_is_a_configuration_error() {
        let frame = text_frame("n", &[Some("1")]);
        let mapping = mapping(r#"{"n": {"type": "MEDIUMINT"}}"#);
        let err = mapping.apply(frame).unwrap_err();
        assert!(matches!(err, LoadError::Configuration(_)), "{err}");
    }

    #[test]
    fn integer_coercion_nulls_failures() {
        let frame = text_frame("n", &[Some("42"), Some("42.0"), Some("x"), Some("1.5"), None]);
        let mapping = mapping(r#"{"n": {"type": "INT"}}"#);
        let frame = mapping.apply(frame).unwrap();
        assert_eq!(
            frame.column("n").unwrap().values,
            ColumnValues::Int32(vec![Some(42), Some(42), None, None, None])
        );
    }

    #[test]
    fn smallint_overflow_becomes_null() {
        let frame = text_frame("n", &[Some("40000"), Some("12")]);
        let mapping = mapping(r#"{"n": {"type": "SMALLINT"}}"#);
        let frame = mapping.apply(frame).unwrap();
        assert_eq!(
            frame.column("n").unwrap().values,
            ColumnValues::Int16(vec![None, Some(12)])
        );
    }

    #[test]
    fn boolean_accepts_words_and_digits() {
        let frame = text_frame("b", &[Some("True"), Some("0"), Some("yes")]);
        let mapping = mapping(r#"{"b": {"type": "BOOLEAN"}}"#);
        let frame = mapping.apply(frame).unwrap();
        assert_eq!(
            frame.column("b").unwrap().values,
            ColumnValues::Bool(vec![Some(true), Some(false), None])
        );
    }

    #[test]
    fn varchar_renders_nulls_as_empty_strings() {
        let frame = Frame::from_columns(vec![Column::new(
            "v",
            ColumnValues::Int32(vec![Some(7), None]),
        )])
        .unwrap();
        let mapping = mapping(r#"{"v": {"type": "VARCHAR"}}"#);
        let frame = mapping.apply(frame).unwrap();
        assert_eq!(
            frame.column("v").unwrap().values,
            ColumnValues::Utf8(vec![Some("7".into()), Some("".into())])
        );
    }

    #[test]
    fn timestamp_uses_explicit_format_when_given() {
        let frame = text_frame("t", &[Some("31/12/2023 23:59:59"), Some("not a date")]);
        let mapping =
            mapping(r#"{"t": {"type": "TIMESTAMP", "date_format": "%d/%m/%Y %H:%M:%S"}}"#);
        let frame = mapping.apply(frame).unwrap();
        assert_eq!(
            frame.column("t").unwrap().values,
            ColumnValues::Timestamp(vec![Some(1_704_067_199_000_000), None])
        );
    }

    #[test]
    fn date_parses_iso_without_format() {
        let frame = text_frame("d", &[Some("2024-01-01"), Some("junk")]);
        let mapping = mapping(r#"{"d": {"type": "DATE"}}"#);
        let frame = mapping.apply(frame).unwrap();
        assert_eq!(
            frame.column("d").unwrap().values,
            ColumnValues::Date(vec![Some(19_723), None])
        );
    }

    #[test]
    fn timestamp_column_coerced_to_date_keeps_day() {
        let frame = Frame::from_columns(vec![Column::new(
            "d",
            ColumnValues::Timestamp(vec![Some(1_704_067_200_000_000 + 3_600_000_000)]),
        )])
        .unwrap();
        let mapping = mapping(r#"{"d": {"type": "DATE"}}"#);
        let frame = mapping.apply(frame).unwrap();
        assert_eq!(
            frame.column("d").unwrap().values,
            ColumnValues::Date(vec![Some(19_723)])
        );
    }

    #[test]
    fn decimal_rounds_half_away_from_zero() {
        let cases = [
            ("123.455", Some(12346_i128), "rounds up at the boundary"),
            ("123.454", Some(12345), "rounds down below the boundary"),
            ("-1.005", Some(-101), "negative rounds away from zero"),
            (".5", Some(50), "bare fraction"),
            ("1e3", None, "scientific notation is not accepted"),
            ("99999.99", None, "exceeds precision"),
        ];
        for (input, expected, description) in cases {
            assert_eq!(parse_decimal(input, 6, 2), expected, "{description}");
        }
    }

    #[test]
    fn decimal_column_carries_precision_and_scale() {
        let frame = text_frame("amount", &[Some("19.999"), None]);
        let mapping = mapping(r#"{"amount": {"type": "DECIMAL(10,2)"}}"#);
        let frame = mapping.apply(frame).unwrap();
        assert_eq!(
            frame.column("amount").unwrap().values,
            ColumnValues::Decimal {
                precision: 10,
                scale: 2,
                values: vec![Some(2000), None],
            }
        );
    }

    #[test]
    fn malformed_decimal_tag_is_rejected() {
        for tag in ["DECIMAL", "DECIMAL(0,0)", "DECIMAL(39,2)", "DECIMAL(5,8)"] {
            assert!(TypeTag::parse(tag).is_err(), "{tag}");
        }
        assert_eq!(
            TypeTag::parse("decimal(12, 4)").unwrap(),
            TypeTag::Decimal {
                precision: 12,
                scale: 4
            }
        );
    }
}
