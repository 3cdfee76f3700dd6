//! Frame to Parquet encoding. Every column is written as a nullable field;
//! timestamps carry microsecond precision; row groups are snappy-compressed.

use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanArray, Date32Array, Decimal128Array, Float32Array, Float64Array, Int16Array,
    Int32Array, Int64Array, StringArray, TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::error::{LoadError, Result};
use crate::frame::{ColumnValues, Frame};

pub(crate) fn to_parquet(frame: &Frame) -> Result<Vec<u8>> {
    let batch = to_record_batch(frame)?;
    let properties = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), Some(properties))
        .map_err(|err| LoadError::storage_write(format!("parquet writer: {err}")))?;
    writer
        .write(&batch)
        .map_err(|err| LoadError::storage_write(format!("parquet write: {err}")))?;
    writer
        .close()
        .map_err(|err| LoadError::storage_write(format!("parquet close: {err}")))?;
    Ok(buffer)
}

fn to_record_batch(frame: &Frame) -> Result<RecordBatch> {
    let mut fields = Vec::with_capacity(frame.num_columns());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(frame.num_columns());
    for column in frame.columns() {
        let (data_type, array) = to_array(&column.values)?;
        fields.push(Field::new(&column.name, data_type, true));
        arrays.push(array);
    }
    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
        .map_err(|err| LoadError::storage_write(format!("columnar encoding: {err}")))
}

fn to_array(values: &ColumnValues) -> Result<(DataType, ArrayRef)> {
    let pair: (DataType, ArrayRef) = match values {
        ColumnValues::Bool(v) => (DataType::Boolean, Arc::new(BooleanArray::from(v.clone()))),
        ColumnValues::Int16(v) => (DataType::Int16, Arc::new(Int16Array::from(v.clone()))),
        ColumnValues::Int32(v) => (DataType::Int32, Arc::new(Int32Array::from(v.clone()))),
        ColumnValues::Int64(v) => (DataType::Int64, Arc::new(Int64Array::from(v.clone()))),
        ColumnValues::Float32(v) => (DataType::Float32, Arc::new(Float32Array::from(v.clone()))),
        ColumnValues::Float64(v) => (DataType::Float64, Arc::new(Float64Array::from(v.clone()))),
        ColumnValues::Decimal {
            precision,
            scale,
            values,
        } => {
            let array = Decimal128Array::from(values.clone())
                .with_precision_and_scale(*precision, *scale)
                .map_err(|err| LoadError::storage_write(format!("decimal encoding: {err}")))?;
            (DataType::Decimal128(*precision, *scale), Arc::new(array))
        }
        ColumnValues::Utf8(v) => (DataType::Utf8, Arc::new(StringArray::from(v.clone()))),
        ColumnValues::Date(v) => (DataType::Date32, Arc::new(Date32Array::from(v.clone()))),
        ColumnValues::Timestamp(v) => (
            DataType::Timestamp(TimeUnit::Microsecond, None),
            Arc::new(TimestampMicrosecondArray::from(v.clone())),
        ),
    };
    Ok(pair)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{as_primitive_array, as_string_array, Array};
    use arrow::datatypes::{Int16Type, TimestampMicrosecondType};
    use bytes::Bytes;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    use crate::frame::Column;

    fn decode(encoded: Vec<u8>) -> Vec<RecordBatch> {
        ParquetRecordBatchReaderBuilder::try_new(Bytes::from(encoded))
            .unwrap()
            .build()
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn round_trips_names_rows_and_values() {
        let frame = Frame::from_columns(vec![
            Column::new("id", ColumnValues::Int16(vec![Some(1), Some(2), None])),
            Column::new(
                "name",
                ColumnValues::Utf8(vec![Some("a".into()), None, Some("c".into())]),
            ),
        ])
        .unwrap();

        let batches = decode(to_parquet(&frame).unwrap());
        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.schema().field(0).name(), "id");
        assert_eq!(batch.schema().field(1).name(), "name");

        let ids = as_primitive_array::<Int16Type>(batch.column(0));
        assert_eq!(ids.value(0), 1);
        assert_eq!(ids.value(1), 2);
        assert!(ids.is_null(2));

        let names = as_string_array(batch.column(1));
        assert_eq!(names.value(0), "a");
        assert!(names.is_null(1));
        assert_eq!(names.value(2), "c");
    }

    #[test]
    fn timestamps_are_written_in_microseconds() {
        let micros = 1_704_067_200_123_456_i64;
        let frame = Frame::from_columns(vec![Column::new(
            "seen_at",
            ColumnValues::Timestamp(vec![Some(micros), None]),
        )])
        .unwrap();

        let batches = decode(to_parquet(&frame).unwrap());
        let batch = &batches[0];
        assert_eq!(
            batch.schema().field(0).data_type(),
            &DataType::Timestamp(TimeUnit::Microsecond, None)
        );
        let values = as_primitive_array::<TimestampMicrosecondType>(batch.column(0));
        assert_eq!(values.value(0), micros);
        assert!(values.is_null(1));
    }

    #[test]
    fn decimals_keep_precision_and_scale() {
        let frame = Frame::from_columns(vec![Column::new(
            "amount",
            ColumnValues::Decimal {
                precision: 10,
                scale: 2,
                values: vec![Some(12345), Some(-5), None],
            },
        )])
        .unwrap();

        let batches = decode(to_parquet(&frame).unwrap());
        let batch = &batches[0];
        assert_eq!(
            batch.schema().field(0).data_type(),
            &DataType::Decimal128(10, 2)
        );
        let amounts = batch
            .column(0)
            .as_any()
            .downcast_ref::<Decimal128Array>()
            .unwrap();
        assert_eq!(amounts.value(0), 12345);
        assert_eq!(amounts.value(1), -5);
        assert!(amounts.is_null(2));
    }

    #[test]
    fn dates_and_bools_survive_encoding() {
        let frame = Frame::from_columns(vec![
            Column::new("day", ColumnValues::Date(vec![Some(19_723)])),
            Column::new("flag", ColumnValues::Bool(vec![Some(true)])),
        ])
        .unwrap();

        let batches = decode(to_parquet(&frame).unwrap());
        let batch = &batches[0];
        assert_eq!(batch.schema().field(0).data_type(), &DataType::Date32);
        assert_eq!(batch.schema().field(1).data_type(), &DataType::Boolean);
    }
}
