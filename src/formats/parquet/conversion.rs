//! Conversion from Arrow RecordBatch to row-based Records.
//!
//! This module converts Arrow's columnar format to the string-based Record format
//! used by the store. All values are converted to strings, with nulls
//! represented as empty strings. The store parses these strings back to typed
//! values based on the established table schema.

use anyhow::{Context, Result};
use arrow::array::*;
use arrow::datatypes::{
    DataType, Date32Type, Date64Type, Decimal128Type, Decimal256Type, Float16Type, Float32Type,
    Float64Type, Int8Type, Int16Type, Int32Type, Int64Type, TimeUnit, TimestampMicrosecondType,
    TimestampMillisecondType, TimestampNanosecondType, TimestampSecondType, UInt8Type, UInt16Type,
    UInt32Type, UInt64Type,
};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDate, Utc};

use crate::formats::reader::Record;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const TIMESTAMP_TZ_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f+00:00";

/// Convert an Arrow RecordBatch to a vector of Records
pub fn record_batch_to_records(batch: &RecordBatch) -> Result<Vec<Record>> {
    let num_rows = batch.num_rows();
    let num_columns = batch.num_columns();

    if num_rows == 0 {
        return Ok(Vec::new());
    }

    // Convert each column to strings
    let mut column_strings: Vec<Vec<String>> = Vec::with_capacity(num_columns);
    for col_idx in 0..num_columns {
        let array = batch.column(col_idx);
        let strings = array_to_strings(array).with_context(|| {
            format!(
                "Failed to convert column {} ({:?}) to strings",
                batch.schema().field(col_idx).name(),
                array.data_type()
            )
        })?;
        column_strings.push(strings);
    }

    // Transpose to rows, moving each string out instead of cloning
    let mut columns: Vec<std::vec::IntoIter<String>> =
        column_strings.into_iter().map(|c| c.into_iter()).collect();
    let mut records = Vec::with_capacity(num_rows);
    for _ in 0..num_rows {
        let fields = columns
            .iter_mut()
            .map(|col| col.next().unwrap_or_default())
            .collect();
        records.push(Record { fields });
    }

    Ok(records)
}

/// Convert an Arrow array to a vector of string representations
fn array_to_strings(array: &dyn Array) -> Result<Vec<String>> {
    match array.data_type() {
        DataType::Boolean => {
            let arr = as_boolean_array(array);
            render(array, |i| Ok(arr.value(i).to_string()))
        }
        DataType::Int8 => render_primitive::<Int8Type>(array),
        DataType::Int16 => render_primitive::<Int16Type>(array),
        DataType::Int32 => render_primitive::<Int32Type>(array),
        DataType::Int64 => render_primitive::<Int64Type>(array),
        DataType::UInt8 => render_primitive::<UInt8Type>(array),
        DataType::UInt16 => render_primitive::<UInt16Type>(array),
        DataType::UInt32 => render_primitive::<UInt32Type>(array),
        DataType::UInt64 => render_primitive::<UInt64Type>(array),
        DataType::Float16 => render_primitive::<Float16Type>(array),
        DataType::Float32 => render_primitive::<Float32Type>(array),
        DataType::Float64 => render_primitive::<Float64Type>(array),
        DataType::Utf8 => {
            let arr = as_string_array(array);
            render(array, |i| Ok(arr.value(i).to_owned()))
        }
        DataType::LargeUtf8 => {
            let arr = as_largestring_array(array);
            render(array, |i| Ok(arr.value(i).to_owned()))
        }
        DataType::Binary => {
            let arr = as_generic_binary_array::<i32>(array);
            render(array, |i| Ok(bytea_hex(arr.value(i))))
        }
        DataType::LargeBinary => {
            let arr = as_generic_binary_array::<i64>(array);
            render(array, |i| Ok(bytea_hex(arr.value(i))))
        }
        DataType::Date32 => {
            let arr = as_primitive_array::<Date32Type>(array);
            let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).context("Invalid epoch")?;
            render(array, |i| {
                let date = epoch
                    .checked_add_signed(chrono::Duration::days(arr.value(i) as i64))
                    .context("Invalid date")?;
                Ok(date.format(DATE_FORMAT).to_string())
            })
        }
        DataType::Date64 => {
            let arr = as_primitive_array::<Date64Type>(array);
            render(array, |i| {
                let datetime =
                    DateTime::from_timestamp_millis(arr.value(i)).context("Invalid date")?;
                Ok(datetime.format(DATE_FORMAT).to_string())
            })
        }
        DataType::Timestamp(unit, tz) => {
            let format = if tz.is_some() {
                TIMESTAMP_TZ_FORMAT
            } else {
                TIMESTAMP_FORMAT
            };
            render_timestamp(array, *unit, format)
        }
        DataType::Decimal128(_, scale) => {
            let arr = as_primitive_array::<Decimal128Type>(array);
            render(array, |i| {
                Ok(insert_decimal_point(&arr.value(i).to_string(), *scale))
            })
        }
        DataType::Decimal256(_, scale) => {
            let arr = as_primitive_array::<Decimal256Type>(array);
            render(array, |i| {
                Ok(insert_decimal_point(&arr.value(i).to_string(), *scale))
            })
        }
        other => Err(anyhow::anyhow!(
            "Unsupported array type for conversion: {:?}",
            other
        )),
    }
}

/// Render every slot of `array`, nulls as empty strings
fn render<F>(array: &dyn Array, mut value: F) -> Result<Vec<String>>
where
    F: FnMut(usize) -> Result<String>,
{
    (0..array.len())
        .map(|i| {
            if array.is_null(i) {
                Ok(String::new())
            } else {
                value(i)
            }
        })
        .collect()
}

fn render_primitive<T: ArrowPrimitiveType>(array: &dyn Array) -> Result<Vec<String>>
where
    T::Native: std::fmt::Display,
{
    let arr = as_primitive_array::<T>(array);
    render(array, |i| Ok(arr.value(i).to_string()))
}

/// Timestamps are rendered in UTC
fn render_timestamp(array: &dyn Array, unit: TimeUnit, format: &str) -> Result<Vec<String>> {
    let to_datetime: fn(i64) -> Option<DateTime<Utc>> = match unit {
        TimeUnit::Second => |v| DateTime::from_timestamp(v, 0),
        TimeUnit::Millisecond => DateTime::from_timestamp_millis,
        TimeUnit::Microsecond => DateTime::from_timestamp_micros,
        TimeUnit::Nanosecond => |v| Some(DateTime::from_timestamp_nanos(v)),
    };
    let raw: Vec<Option<i64>> = match unit {
        TimeUnit::Second => as_primitive_array::<TimestampSecondType>(array).iter().collect(),
        TimeUnit::Millisecond => as_primitive_array::<TimestampMillisecondType>(array)
            .iter()
            .collect(),
        TimeUnit::Microsecond => as_primitive_array::<TimestampMicrosecondType>(array)
            .iter()
            .collect(),
        TimeUnit::Nanosecond => as_primitive_array::<TimestampNanosecondType>(array)
            .iter()
            .collect(),
    };

    raw.into_iter()
        .map(|value| match value {
            None => Ok(String::new()),
            Some(v) => Ok(to_datetime(v)
                .context("Invalid timestamp")?
                .naive_utc()
                .format(format)
                .to_string()),
        })
        .collect()
}

/// Render bytes in PostgreSQL's hex bytea input format
fn bytea_hex(bytes: &[u8]) -> String {
    format!("\\x{}", hex::encode(bytes))
}

/// Place the decimal point into an unscaled integer string
fn insert_decimal_point(raw: &str, scale: i8) -> String {
    if scale <= 0 {
        if raw == "0" {
            return raw.to_string();
        }
        return format!("{}{}", raw, "0".repeat(scale.unsigned_abs() as usize));
    }

    let (sign, digits) = match raw.strip_prefix('-') {
        Some(digits) => ("-", digits),
        None => ("", raw),
    };

    let scale = scale as usize;
    let padded = if digits.len() <= scale {
        format!("{}{}", "0".repeat(scale - digits.len() + 1), digits)
    } else {
        digits.to_string()
    };

    let (int_part, frac_part) = padded.split_at(padded.len() - scale);
    format!("{}{}.{}", sign, int_part, frac_part)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{BooleanArray, Float64Array, Int32Array, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    #[test]
    fn test_record_batch_to_records_integers() {
        let schema = Schema::new(vec![
            Field::new("int32", DataType::Int32, false),
            Field::new("int64", DataType::Int64, false),
        ]);

        let int32_array = Int32Array::from(vec![1, 2, 3]);
        let int64_array = Int64Array::from(vec![100, 200, 300]);

        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(int32_array), Arc::new(int64_array)],
        )
        .unwrap();

        let records = record_batch_to_records(&batch).unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].fields, vec!["1", "100"]);
        assert_eq!(records[2].fields, vec!["3", "300"]);
    }

    #[test]
    fn test_record_batch_to_records_mixed_types() {
        let schema = Schema::new(vec![
            Field::new("VendorID", DataType::Int32, false),
            Field::new("store_and_fwd_flag", DataType::Utf8, true),
            Field::new("fare_amount", DataType::Float64, true),
            Field::new("flag", DataType::Boolean, false),
        ]);

        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(Int32Array::from(vec![2, 1])),
                Arc::new(StringArray::from(vec![Some("N"), None])),
                Arc::new(Float64Array::from(vec![Some(12.5), None])),
                Arc::new(BooleanArray::from(vec![true, false])),
            ],
        )
        .unwrap();

        let records = record_batch_to_records(&batch).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].fields, vec!["2", "N", "12.5", "true"]);
        assert_eq!(records[1].fields, vec!["1", "", "", "false"]);
    }

    #[test]
    fn test_record_batch_to_records_sliced() {
        let schema = Schema::new(vec![Field::new("id", DataType::Int64, false)]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(Int64Array::from_iter_values(0..10))],
        )
        .unwrap();

        let records = record_batch_to_records(&batch.slice(4, 3)).unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.fields[0].as_str()).collect();
        assert_eq!(ids, vec!["4", "5", "6"]);
    }

    #[test]
    fn test_timestamps_keep_fractional_seconds() {
        let schema = Schema::new(vec![
            Field::new(
                "pickup",
                DataType::Timestamp(TimeUnit::Microsecond, None),
                true,
            ),
            Field::new(
                "dropoff",
                DataType::Timestamp(TimeUnit::Second, Some("UTC".into())),
                true,
            ),
        ]);

        // 2025-11-01 00:15:00 UTC
        let base = 1_761_956_100i64;
        let pickup = TimestampMicrosecondArray::from(vec![Some(base * 1_000_000), Some(base * 1_000_000 + 250_000), None]);
        let dropoff =
            TimestampSecondArray::from(vec![Some(base), Some(base + 60), None]).with_timezone("UTC");

        let batch =
            RecordBatch::try_new(Arc::new(schema), vec![Arc::new(pickup), Arc::new(dropoff)])
                .unwrap();
        let records = record_batch_to_records(&batch).unwrap();

        assert_eq!(records[0].fields[0], "2025-11-01 00:15:00");
        assert_eq!(records[1].fields[0], "2025-11-01 00:15:00.250");
        assert_eq!(records[1].fields[1], "2025-11-01 00:16:00+00:00");
        assert_eq!(records[2].fields, vec!["", ""]);
    }

    #[test]
    fn test_record_batch_to_records_dates() {
        let schema = Schema::new(vec![Field::new("date", DataType::Date32, false)]);

        // 18993 days after the epoch is 2022-01-01
        let date_array = Date32Array::from(vec![0, 18993]);

        let batch = RecordBatch::try_new(Arc::new(schema), vec![Arc::new(date_array)]).unwrap();
        let records = record_batch_to_records(&batch).unwrap();

        assert_eq!(records[0].fields, vec!["1970-01-01"]);
        assert_eq!(records[1].fields, vec!["2022-01-01"]);
    }

    #[test]
    fn test_binary_renders_bytea_hex() {
        let schema = Schema::new(vec![Field::new("raw", DataType::Binary, true)]);
        let array = BinaryArray::from(vec![Some(&[0xde, 0xad][..]), None]);
        let batch = RecordBatch::try_new(Arc::new(schema), vec![Arc::new(array)]).unwrap();

        let records = record_batch_to_records(&batch).unwrap();
        assert_eq!(records[0].fields, vec!["\\xdead"]);
        assert_eq!(records[1].fields, vec![""]);
    }

    #[test]
    fn test_insert_decimal_point() {
        assert_eq!(insert_decimal_point("12345", 2), "123.45");
        assert_eq!(insert_decimal_point("1", 2), "0.01");
        assert_eq!(insert_decimal_point("100", 2), "1.00");
        assert_eq!(insert_decimal_point("-12345", 2), "-123.45");
        assert_eq!(insert_decimal_point("-1", 3), "-0.001");
        assert_eq!(insert_decimal_point("12345", 0), "12345");
        assert_eq!(insert_decimal_point("123", -2), "12300");
        assert_eq!(insert_decimal_point("0", -2), "0");
    }

    #[test]
    fn test_record_batch_to_records_empty() {
        let schema = Schema::new(vec![Field::new("id", DataType::Int32, false)]);
        let int32_array = Int32Array::from(vec![] as Vec<i32>);
        let batch = RecordBatch::try_new(Arc::new(schema), vec![Arc::new(int32_array)]).unwrap();

        assert!(record_batch_to_records(&batch).unwrap().is_empty());
    }
}
