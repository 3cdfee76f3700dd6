//! Tabular batch: an ordered sequence of named, typed columns.
//!
//! Every column holds the same number of rows. Frames are produced by the
//! object readers, concatenated by the batch driver, mutated by the column
//! mapper, and consumed exactly once by the warehouse loader.

use std::collections::HashSet;

use crate::error::{LoadError, Result};

/// Logical column type. Dates are days since the Unix epoch, timestamps are
/// microseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Bool,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Decimal { precision: u8, scale: i8 },
    Utf8,
    Date,
    Timestamp,
}

impl ColumnKind {
    /// Find the most specific common kind that accommodates both.
    ///
    /// Integer widths widen, integers and floats meet at `Float64`, dates
    /// promote to timestamps. Anything else falls back to strings.
    pub fn common(self, other: ColumnKind) -> ColumnKind {
        use ColumnKind::*;
        if self == other {
            return self;
        }
        match (self, other) {
            (Int16, Int32) | (Int32, Int16) => Int32,
            (Int16 | Int32, Int64) | (Int64, Int16 | Int32) => Int64,
            (Int16 | Int32 | Int64, Float32 | Float64)
            | (Float32 | Float64, Int16 | Int32 | Int64) => Float64,
            (Float32, Float64) | (Float64, Float32) => Float64,
            (Date, Timestamp) | (Timestamp, Date) => Timestamp,
            _ => Utf8,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ColumnKind::Bool => "bool",
            ColumnKind::Int16 => "int16",
            ColumnKind::Int32 => "int32",
            ColumnKind::Int64 => "int64",
            ColumnKind::Float32 => "float32",
            ColumnKind::Float64 => "float64",
            ColumnKind::Decimal { .. } => "decimal",
            ColumnKind::Utf8 => "string",
            ColumnKind::Date => "date",
            ColumnKind::Timestamp => "timestamp",
        }
    }
}

/// Typed values of one column, null-aware.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Bool(Vec<Option<bool>>),
    Int16(Vec<Option<i16>>),
    Int32(Vec<Option<i32>>),
    Int64(Vec<Option<i64>>),
    Float32(Vec<Option<f32>>),
    Float64(Vec<Option<f64>>),
    Decimal {
        precision: u8,
        scale: i8,
        values: Vec<Option<i128>>,
    },
    Utf8(Vec<Option<String>>),
    /// Days since the Unix epoch.
    Date(Vec<Option<i32>>),
    /// Microseconds since the Unix epoch.
    Timestamp(Vec<Option<i64>>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Bool(v) => v.len(),
            ColumnValues::Int16(v) => v.len(),
            ColumnValues::Int32(v) => v.len(),
            ColumnValues::Int64(v) => v.len(),
            ColumnValues::Float32(v) => v.len(),
            ColumnValues::Float64(v) => v.len(),
            ColumnValues::Decimal { values, .. } => values.len(),
            ColumnValues::Utf8(v) => v.len(),
            ColumnValues::Date(v) => v.len(),
            ColumnValues::Timestamp(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            ColumnValues::Bool(_) => ColumnKind::Bool,
            ColumnValues::Int16(_) => ColumnKind::Int16,
            ColumnValues::Int32(_) => ColumnKind::Int32,
            ColumnValues::Int64(_) => ColumnKind::Int64,
            ColumnValues::Float32(_) => ColumnKind::Float32,
            ColumnValues::Float64(_) => ColumnKind::Float64,
            ColumnValues::Decimal {
                precision, scale, ..
            } => ColumnKind::Decimal {
                precision: *precision,
                scale: *scale,
            },
            ColumnValues::Utf8(_) => ColumnKind::Utf8,
            ColumnValues::Date(_) => ColumnKind::Date,
            ColumnValues::Timestamp(_) => ColumnKind::Timestamp,
        }
    }

    /// An all-null column of the given kind and length.
    pub fn nulls(kind: ColumnKind, len: usize) -> ColumnValues {
        match kind {
            ColumnKind::Bool => ColumnValues::Bool(vec![None; len]),
            ColumnKind::Int16 => ColumnValues::Int16(vec![None; len]),
            ColumnKind::Int32 => ColumnValues::Int32(vec![None; len]),
            ColumnKind::Int64 => ColumnValues::Int64(vec![None; len]),
            ColumnKind::Float32 => ColumnValues::Float32(vec![None; len]),
            ColumnKind::Float64 => ColumnValues::Float64(vec![None; len]),
            ColumnKind::Decimal { precision, scale } => ColumnValues::Decimal {
                precision,
                scale,
                values: vec![None; len],
            },
            ColumnKind::Utf8 => ColumnValues::Utf8(vec![None; len]),
            ColumnKind::Date => ColumnValues::Date(vec![None; len]),
            ColumnKind::Timestamp => ColumnValues::Timestamp(vec![None; len]),
        }
    }

    /// String rendering of one value, `None` for null. Used for dedup key
    /// comparison and for `VARCHAR` coercion.
    pub fn render(&self, idx: usize) -> Option<String> {
        match self {
            ColumnValues::Bool(v) => v[idx].map(|b| b.to_string()),
            ColumnValues::Int16(v) => v[idx].map(|n| n.to_string()),
            ColumnValues::Int32(v) => v[idx].map(|n| n.to_string()),
            ColumnValues::Int64(v) => v[idx].map(|n| n.to_string()),
            ColumnValues::Float32(v) => v[idx].map(|n| n.to_string()),
            ColumnValues::Float64(v) => v[idx].map(|n| n.to_string()),
            ColumnValues::Decimal { scale, values, .. } => {
                values[idx].map(|n| render_decimal(n, *scale))
            }
            ColumnValues::Utf8(v) => v[idx].clone(),
            ColumnValues::Date(v) => v[idx].and_then(render_date),
            ColumnValues::Timestamp(v) => v[idx].and_then(render_timestamp),
        }
    }

    /// Convert this column to the target kind. Identity when the kinds
    /// already match; numeric conversions widen; everything else renders to
    /// strings. Only conversions reachable through [`ColumnKind::common`]
    /// are meaningful.
    pub fn cast_to(self, kind: ColumnKind) -> ColumnValues {
        if self.kind() == kind {
            return self;
        }
        match (&self, kind) {
            (ColumnValues::Int16(v), ColumnKind::Int32) => {
                ColumnValues::Int32(v.iter().map(|x| x.map(i32::from)).collect())
            }
            (ColumnValues::Int16(v), ColumnKind::Int64) => {
                ColumnValues::Int64(v.iter().map(|x| x.map(i64::from)).collect())
            }
            (ColumnValues::Int32(v), ColumnKind::Int64) => {
                ColumnValues::Int64(v.iter().map(|x| x.map(i64::from)).collect())
            }
            (ColumnValues::Int16(v), ColumnKind::Float64) => {
                ColumnValues::Float64(v.iter().map(|x| x.map(f64::from)).collect())
            }
            (ColumnValues::Int32(v), ColumnKind::Float64) => {
                ColumnValues::Float64(v.iter().map(|x| x.map(f64::from)).collect())
            }
            (ColumnValues::Int64(v), ColumnKind::Float64) => {
                ColumnValues::Float64(v.iter().map(|x| x.map(|n| n as f64)).collect())
            }
            (ColumnValues::Float32(v), ColumnKind::Float64) => {
                ColumnValues::Float64(v.iter().map(|x| x.map(f64::from)).collect())
            }
            (ColumnValues::Date(v), ColumnKind::Timestamp) => ColumnValues::Timestamp(
                v.iter()
                    .map(|x| x.map(|days| i64::from(days) * MICROS_PER_DAY))
                    .collect(),
            ),
            (_, ColumnKind::Utf8) => {
                ColumnValues::Utf8((0..self.len()).map(|i| self.render(i)).collect())
            }
            // Unsupported pairs degrade to strings rather than lose data.
            _ => ColumnValues::Utf8((0..self.len()).map(|i| self.render(i)).collect()),
        }
    }

    fn append(&mut self, other: ColumnValues) {
        match (self, other) {
            (ColumnValues::Bool(a), ColumnValues::Bool(b)) => a.extend(b),
            (ColumnValues::Int16(a), ColumnValues::Int16(b)) => a.extend(b),
            (ColumnValues::Int32(a), ColumnValues::Int32(b)) => a.extend(b),
            (ColumnValues::Int64(a), ColumnValues::Int64(b)) => a.extend(b),
            (ColumnValues::Float32(a), ColumnValues::Float32(b)) => a.extend(b),
            (ColumnValues::Float64(a), ColumnValues::Float64(b)) => a.extend(b),
            (
                ColumnValues::Decimal { values: a, .. },
                ColumnValues::Decimal { values: b, .. },
            ) => a.extend(b),
            (ColumnValues::Utf8(a), ColumnValues::Utf8(b)) => a.extend(b),
            (ColumnValues::Date(a), ColumnValues::Date(b)) => a.extend(b),
            (ColumnValues::Timestamp(a), ColumnValues::Timestamp(b)) => a.extend(b),
            // Callers cast both sides to a common kind first.
            (a, b) => unreachable!("append across kinds: {:?} vs {:?}", a.kind(), b.kind()),
        }
    }

    fn filter(&self, keep: &[bool]) -> ColumnValues {
        fn pick<T: Clone>(v: &[Option<T>], keep: &[bool]) -> Vec<Option<T>> {
            v.iter()
                .zip(keep)
                .filter(|(_, k)| **k)
                .map(|(x, _)| x.clone())
                .collect()
        }
        match self {
            ColumnValues::Bool(v) => ColumnValues::Bool(pick(v, keep)),
            ColumnValues::Int16(v) => ColumnValues::Int16(pick(v, keep)),
            ColumnValues::Int32(v) => ColumnValues::Int32(pick(v, keep)),
            ColumnValues::Int64(v) => ColumnValues::Int64(pick(v, keep)),
            ColumnValues::Float32(v) => ColumnValues::Float32(pick(v, keep)),
            ColumnValues::Float64(v) => ColumnValues::Float64(pick(v, keep)),
            ColumnValues::Decimal {
                precision,
                scale,
                values,
            } => ColumnValues::Decimal {
                precision: *precision,
                scale: *scale,
                values: pick(values, keep),
            },
            ColumnValues::Utf8(v) => ColumnValues::Utf8(pick(v, keep)),
            ColumnValues::Date(v) => ColumnValues::Date(pick(v, keep)),
            ColumnValues::Timestamp(v) => ColumnValues::Timestamp(pick(v, keep)),
        }
    }
}

pub(crate) const MICROS_PER_DAY: i64 = 86_400_000_000;

fn render_decimal(unscaled: i128, scale: i8) -> String {
    if scale <= 0 {
        return unscaled.to_string();
    }
    let scale = scale as usize;
    let negative = unscaled < 0;
    let digits = unscaled.unsigned_abs().to_string();
    let padded = if digits.len() <= scale {
        format!("{}{}", "0".repeat(scale + 1 - digits.len()), digits)
    } else {
        digits
    };
    let (int_part, frac_part) = padded.split_at(padded.len() - scale);
    let sign = if negative { "-" } else { "" };
    format!("{sign}{int_part}.{frac_part}")
}

fn render_date(days: i32) -> Option<String> {
    let date = chrono::DateTime::from_timestamp(i64::from(days) * 86_400, 0)?.date_naive();
    Some(date.format("%Y-%m-%d").to_string())
}

pub(crate) fn render_timestamp(micros: i64) -> Option<String> {
    let ts = chrono::DateTime::from_timestamp_micros(micros)?.naive_utc();
    if micros.rem_euclid(1_000_000) == 0 {
        Some(ts.format("%Y-%m-%d %H:%M:%S").to_string())
    } else {
        Some(ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string())
    }
}

/// A named column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: ColumnValues,
}

impl Column {
    pub fn new(name: impl Into<String>, values: ColumnValues) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// An ordered collection of equally-sized columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    columns: Vec<Column>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a frame, validating that all columns have the same row count
    /// and that names are unique.
    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        if let Some(first) = columns.first() {
            let rows = first.values.len();
            for col in &columns {
                if col.values.len() != rows {
                    return Err(LoadError::configuration(format!(
                        "column '{}' has {} rows, expected {}",
                        col.name,
                        col.values.len(),
                        rows
                    )));
                }
            }
        }
        let mut seen = HashSet::new();
        for col in &columns {
            if !seen.insert(col.name.as_str()) {
                return Err(LoadError::configuration(format!(
                    "duplicate column name '{}'",
                    col.name
                )));
            }
        }
        Ok(Self { columns })
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// True when the frame holds zero rows (including the zero-column case).
    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Replace the values of an existing column, keeping its position.
    pub(crate) fn replace_values(&mut self, name: &str, values: ColumnValues) -> Result<()> {
        let rows = self.num_rows();
        if values.len() != rows {
            return Err(LoadError::configuration(format!(
                "replacement for column '{name}' has {} rows, expected {rows}",
                values.len()
            )));
        }
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(col) => {
                col.values = values;
                Ok(())
            }
            None => Err(LoadError::configuration(format!(
                "no column named '{name}'"
            ))),
        }
    }

    /// Rename a column in place. Renaming onto an existing name is rejected.
    pub(crate) fn rename_column(&mut self, from: &str, to: &str) -> Result<()> {
        if from == to {
            return Ok(());
        }
        if self.has_column(to) {
            return Err(LoadError::configuration(format!(
                "cannot rename '{from}' to '{to}': target name already exists"
            )));
        }
        match self.columns.iter_mut().find(|c| c.name == from) {
            Some(col) => {
                col.name = to.to_string();
                Ok(())
            }
            None => Err(LoadError::configuration(format!(
                "no column named '{from}'"
            ))),
        }
    }

    /// Set a constant string column. Replaces an existing column of the same
    /// name, otherwise appends at the end.
    pub fn push_constant(&mut self, name: &str, value: &str) {
        let values =
            ColumnValues::Utf8(vec![Some(value.to_string()); self.num_rows()]);
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(col) => col.values = values,
            None => self.columns.push(Column::new(name, values)),
        }
    }

    /// Concatenate frames row-wise, preserving encounter order.
    ///
    /// The result's column set is the union of all input columns (in first
    /// appearance order); frames missing a column contribute nulls. Columns
    /// sharing a name but not a kind are promoted via
    /// [`ColumnKind::common`].
    pub fn concat(frames: Vec<Frame>) -> Result<Frame> {
        let mut order: Vec<String> = Vec::new();
        let mut kinds: Vec<ColumnKind> = Vec::new();
        for frame in &frames {
            for col in &frame.columns {
                match order.iter().position(|n| n == &col.name) {
                    Some(i) => kinds[i] = kinds[i].common(col.values.kind()),
                    None => {
                        order.push(col.name.clone());
                        kinds.push(col.values.kind());
                    }
                }
            }
        }

        let mut out: Vec<Column> = order
            .iter()
            .zip(&kinds)
            .map(|(name, kind)| Column::new(name.clone(), ColumnValues::nulls(*kind, 0)))
            .collect();

        for frame in frames {
            let rows = frame.num_rows();
            let mut remaining: Vec<Option<Column>> = frame.columns.into_iter().map(Some).collect();
            for (slot, kind) in out.iter_mut().zip(&kinds) {
                let part = remaining
                    .iter_mut()
                    .find(|c| c.as_ref().is_some_and(|c| c.name == slot.name))
                    .and_then(Option::take);
                let values = match part {
                    Some(col) => col.values.cast_to(*kind),
                    None => ColumnValues::nulls(*kind, rows),
                };
                slot.values.append(values);
            }
        }

        Frame::from_columns(out)
    }

    /// Keep the first row per key tuple, dropping later duplicates. Returns
    /// the number of rows removed.
    pub fn dedup_by(&mut self, keys: &[String]) -> Result<usize> {
        let key_columns: Vec<&Column> = keys
            .iter()
            .map(|k| {
                self.column(k).ok_or_else(|| {
                    LoadError::configuration(format!("dedup column '{k}' not in batch"))
                })
            })
            .collect::<Result<_>>()?;

        let rows = self.num_rows();
        let mut seen: HashSet<Vec<Option<String>>> = HashSet::with_capacity(rows);
        let mut keep = Vec::with_capacity(rows);
        for row in 0..rows {
            let key: Vec<Option<String>> =
                key_columns.iter().map(|c| c.values.render(row)).collect();
            keep.push(seen.insert(key));
        }

        let dropped = keep.iter().filter(|k| !**k).count();
        if dropped > 0 {
            for col in &mut self.columns {
                col.values = col.values.filter(&keep);
            }
        }
        Ok(dropped)
    }
}
