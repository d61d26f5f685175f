//! Conversions between boundary records and Arrow columns.
//!
//! Records are turned into a single Arrow batch on the way in (with per-column
//! type inference) and Arrow batches are turned back into records on the way
//! out. DuckDB column type names for staging tables are derived here as well.

use std::any::type_name;
use std::collections::HashSet;
use std::sync::Arc;

use duckdb::arrow::array::{
    Array, ArrayRef, BinaryArray, BooleanArray, Date32Array, Decimal128Array, Float32Array,
    Float64Array, Int16Array, Int32Array, Int64Array, Int8Array, IntervalMonthDayNanoArray,
    LargeBinaryArray, LargeStringArray, StringArray, StringViewArray, Time64MicrosecondArray,
    Time64NanosecondArray, TimestampMicrosecondArray, TimestampMillisecondArray,
    TimestampNanosecondArray, TimestampSecondArray, UInt16Array, UInt32Array, UInt64Array,
    UInt8Array,
};
use duckdb::arrow::datatypes::{DataType, Field, IntervalUnit, Schema, TimeUnit};
use duckdb::arrow::record_batch::RecordBatch;
use duckdb::types::{TimeUnit as DuckTimeUnit, Value};

use crate::error::WrapperError;
use crate::record::{to_micros, Record};

/// Build one Arrow batch from records.
///
/// Columns are the union of all field names in first-seen order; a record
/// missing a field contributes NULL. Column types are inferred from the
/// non-null values, widening integers and promoting mixed integer/float
/// columns to DOUBLE. Mixing signed integers with UBIGINT values yields
/// DECIMAL(38,0) so every value stays exact. Columns with only NULLs become
/// VARCHAR.
pub fn records_to_batch(records: &[Record]) -> Result<RecordBatch, WrapperError> {
    if records.is_empty() {
        return Err(WrapperError::EmptyInput);
    }

    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for record in records {
        for name in record.columns() {
            if seen.insert(name) {
                names.push(name);
            }
        }
    }
    if names.is_empty() {
        return Err(WrapperError::EmptyInput);
    }

    let mut fields = Vec::with_capacity(names.len());
    let mut columns = Vec::with_capacity(names.len());
    for name in names {
        let data_type = infer_column_type(name, records)?;
        columns.push(build_column(name, &data_type, records)?);
        fields.push(Field::new(name, data_type, true));
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

/// Split a batch back into records, one per row.
pub fn batch_to_records(batch: &RecordBatch) -> Result<Vec<Record>, WrapperError> {
    let schema = batch.schema();
    let mut columns = Vec::with_capacity(batch.num_columns());
    for column in batch.columns() {
        columns.push(array_to_values(column)?.into_iter());
    }

    let mut rows = Vec::with_capacity(batch.num_rows());
    for _ in 0..batch.num_rows() {
        let mut fields = Vec::with_capacity(columns.len());
        for (field, values) in schema.fields().iter().zip(columns.iter_mut()) {
            fields.push((field.name().clone(), values.next().unwrap_or(Value::Null)));
        }
        rows.push(Record::from_fields(fields));
    }
    Ok(rows)
}

/// DuckDB column type for an Arrow type, used in staging table DDL.
pub fn arrow_type_to_duckdb(data_type: &DataType) -> Result<String, WrapperError> {
    let name = match data_type {
        DataType::Boolean => "BOOLEAN",
        DataType::Int8 => "TINYINT",
        DataType::Int16 => "SMALLINT",
        DataType::Int32 => "INTEGER",
        DataType::Int64 => "BIGINT",
        DataType::UInt8 => "UTINYINT",
        DataType::UInt16 => "USMALLINT",
        DataType::UInt32 => "UINTEGER",
        DataType::UInt64 => "UBIGINT",
        DataType::Float32 => "FLOAT",
        DataType::Float64 => "DOUBLE",
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View => "VARCHAR",
        DataType::Binary | DataType::LargeBinary => "BLOB",
        DataType::Date32 => "DATE",
        DataType::Time64(_) => "TIME",
        DataType::Timestamp(_, Some(_)) => "TIMESTAMPTZ",
        DataType::Timestamp(TimeUnit::Second, None) => "TIMESTAMP_S",
        DataType::Timestamp(TimeUnit::Millisecond, None) => "TIMESTAMP_MS",
        DataType::Timestamp(TimeUnit::Microsecond, None) => "TIMESTAMP",
        DataType::Timestamp(TimeUnit::Nanosecond, None) => "TIMESTAMP_NS",
        DataType::Interval(_) => "INTERVAL",
        DataType::Decimal128(precision, scale) => {
            return Ok(format!("DECIMAL({precision},{scale})"));
        }
        other => return Err(WrapperError::UnsupportedColumnType(other.to_string())),
    };
    Ok(name.to_string())
}

fn infer_column_type(column: &str, records: &[Record]) -> Result<DataType, WrapperError> {
    let mut inferred: Option<DataType> = None;
    for value in records.iter().filter_map(|record| record.get(column)) {
        let Some(next) = value_type(value)? else {
            continue;
        };
        inferred = Some(match inferred {
            None => next,
            Some(current) => unify(&current, &next).ok_or_else(|| {
                WrapperError::InvalidRecords(format!(
                    "column '{column}' mixes {current} and {next} values"
                ))
            })?,
        });
    }
    Ok(inferred.unwrap_or(DataType::Utf8))
}

fn value_type(value: &Value) -> Result<Option<DataType>, WrapperError> {
    let data_type = match value {
        Value::Null => return Ok(None),
        Value::Boolean(_) => DataType::Boolean,
        Value::TinyInt(_) => DataType::Int8,
        Value::SmallInt(_) => DataType::Int16,
        Value::Int(_) => DataType::Int32,
        Value::BigInt(_) => DataType::Int64,
        Value::UTinyInt(_) => DataType::UInt8,
        Value::USmallInt(_) => DataType::UInt16,
        Value::UInt(_) => DataType::UInt32,
        Value::UBigInt(_) => DataType::UInt64,
        Value::Float(_) => DataType::Float32,
        Value::Double(_) => DataType::Float64,
        Value::Text(_) | Value::Enum(_) => DataType::Utf8,
        Value::Blob(_) => DataType::Binary,
        Value::Date32(_) => DataType::Date32,
        Value::Time64(..) => DataType::Time64(TimeUnit::Microsecond),
        Value::Timestamp(..) => DataType::Timestamp(TimeUnit::Microsecond, None),
        other => return Err(WrapperError::UnsupportedColumnType(format!("{other:?}"))),
    };
    Ok(Some(data_type))
}

/// Exact column type for integers that fit neither BIGINT nor UBIGINT.
const WIDE_INTEGER: DataType = DataType::Decimal128(38, 0);

/// Common type for two inferred column types, if any.
fn unify(a: &DataType, b: &DataType) -> Option<DataType> {
    if a == b {
        return Some(a.clone());
    }
    if let (Some((signed_a, width_a)), Some((signed_b, width_b))) =
        (integer_width(a), integer_width(b))
    {
        if signed_a == signed_b {
            return Some(integer_type(signed_a, width_a.max(width_b)));
        }
        let unsigned_width = if signed_a { width_b } else { width_a };
        return Some(if unsigned_width == 64 {
            WIDE_INTEGER
        } else {
            DataType::Int64
        });
    }
    let integral = |t: &DataType| integer_width(t).is_some() || *t == WIDE_INTEGER;
    if integral(a) && integral(b) {
        return Some(WIDE_INTEGER);
    }
    let numeric =
        |t: &DataType| integral(t) || matches!(t, DataType::Float32 | DataType::Float64);
    if numeric(a) && numeric(b) {
        return Some(DataType::Float64);
    }
    None
}

fn integer_width(data_type: &DataType) -> Option<(bool, u8)> {
    match data_type {
        DataType::Int8 => Some((true, 8)),
        DataType::Int16 => Some((true, 16)),
        DataType::Int32 => Some((true, 32)),
        DataType::Int64 => Some((true, 64)),
        DataType::UInt8 => Some((false, 8)),
        DataType::UInt16 => Some((false, 16)),
        DataType::UInt32 => Some((false, 32)),
        DataType::UInt64 => Some((false, 64)),
        _ => None,
    }
}

fn integer_type(signed: bool, width: u8) -> DataType {
    match (signed, width) {
        (true, 8) => DataType::Int8,
        (true, 16) => DataType::Int16,
        (true, 32) => DataType::Int32,
        (true, _) => DataType::Int64,
        (false, 8) => DataType::UInt8,
        (false, 16) => DataType::UInt16,
        (false, 32) => DataType::UInt32,
        (false, _) => DataType::UInt64,
    }
}

fn integer_value(value: &Value) -> Option<i128> {
    match value {
        Value::TinyInt(v) => Some(i128::from(*v)),
        Value::SmallInt(v) => Some(i128::from(*v)),
        Value::Int(v) => Some(i128::from(*v)),
        Value::BigInt(v) => Some(i128::from(*v)),
        Value::UTinyInt(v) => Some(i128::from(*v)),
        Value::USmallInt(v) => Some(i128::from(*v)),
        Value::UInt(v) => Some(i128::from(*v)),
        Value::UBigInt(v) => Some(i128::from(*v)),
        _ => None,
    }
}

fn float_value(value: &Value) -> Option<f64> {
    match value {
        Value::Double(v) => Some(*v),
        Value::Float(v) => Some(f64::from(*v)),
        other => integer_value(other).map(|v| v as f64),
    }
}

fn collect_column<T>(
    column: &str,
    data_type: &DataType,
    records: &[Record],
    convert: impl Fn(&Value) -> Option<T>,
) -> Result<Vec<Option<T>>, WrapperError> {
    records
        .iter()
        .map(|record| match record.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => convert(value).map(Some).ok_or_else(|| {
                WrapperError::InvalidRecords(format!(
                    "column '{column}' expected {data_type} but found {value:?}"
                ))
            }),
        })
        .collect()
}

fn build_column(
    column: &str,
    data_type: &DataType,
    records: &[Record],
) -> Result<ArrayRef, WrapperError> {
    macro_rules! int_column {
        ($arr_type:ty, $native:ty) => {{
            let values = collect_column(column, data_type, records, |v| {
                integer_value(v).and_then(|i| <$native>::try_from(i).ok())
            })?;
            Arc::new(<$arr_type>::from(values)) as ArrayRef
        }};
    }

    let array: ArrayRef = match data_type {
        DataType::Boolean => {
            let values = collect_column(column, data_type, records, |v| match v {
                Value::Boolean(b) => Some(*b),
                _ => None,
            })?;
            Arc::new(BooleanArray::from(values))
        }
        DataType::Int8 => int_column!(Int8Array, i8),
        DataType::Int16 => int_column!(Int16Array, i16),
        DataType::Int32 => int_column!(Int32Array, i32),
        DataType::Int64 => int_column!(Int64Array, i64),
        DataType::UInt8 => int_column!(UInt8Array, u8),
        DataType::UInt16 => int_column!(UInt16Array, u16),
        DataType::UInt32 => int_column!(UInt32Array, u32),
        DataType::UInt64 => int_column!(UInt64Array, u64),
        DataType::Float32 => {
            let values = collect_column(column, data_type, records, |v| match v {
                Value::Float(f) => Some(*f),
                _ => None,
            })?;
            Arc::new(Float32Array::from(values))
        }
        DataType::Float64 => {
            Arc::new(Float64Array::from(collect_column(column, data_type, records, float_value)?))
        }
        DataType::Decimal128(precision, scale) => {
            let values = collect_column(column, data_type, records, integer_value)?;
            Arc::new(Decimal128Array::from(values).with_precision_and_scale(*precision, *scale)?)
        }
        DataType::Utf8 => {
            let values = collect_column(column, data_type, records, |v| match v {
                Value::Text(s) | Value::Enum(s) => Some(s.clone()),
                _ => None,
            })?;
            Arc::new(StringArray::from(values))
        }
        DataType::Binary => {
            let values = collect_column(column, data_type, records, |v| match v {
                Value::Blob(bytes) => Some(bytes.clone()),
                _ => None,
            })?;
            Arc::new(BinaryArray::from_iter(values))
        }
        DataType::Date32 => {
            let values = collect_column(column, data_type, records, |v| match v {
                Value::Date32(days) => Some(*days),
                _ => None,
            })?;
            Arc::new(Date32Array::from(values))
        }
        DataType::Time64(TimeUnit::Microsecond) => {
            let values = collect_column(column, data_type, records, |v| match v {
                Value::Time64(unit, raw) => Some(to_micros(*unit, *raw)),
                _ => None,
            })?;
            Arc::new(Time64MicrosecondArray::from(values))
        }
        DataType::Timestamp(TimeUnit::Microsecond, None) => {
            let values = collect_column(column, data_type, records, |v| match v {
                Value::Timestamp(unit, raw) => Some(to_micros(*unit, *raw)),
                _ => None,
            })?;
            Arc::new(TimestampMicrosecondArray::from(values))
        }
        other => return Err(WrapperError::UnsupportedColumnType(other.to_string())),
    };
    Ok(array)
}

/// Convert an Arrow column into DuckDB values.
///
/// Decimals are surfaced as `Double`.
pub fn array_to_values(array: &ArrayRef) -> Result<Vec<Value>, WrapperError> {
    let mut values = Vec::with_capacity(array.len());

    macro_rules! push_values {
        ($array:expr, $values:expr, $arr_type:ty, |$v:ident| $make:expr) => {{
            let arr = downcast_array::<$arr_type>($array)?;
            for idx in 0..arr.len() {
                if arr.is_null(idx) {
                    $values.push(Value::Null);
                } else {
                    let $v = arr.value(idx);
                    $values.push($make);
                }
            }
        }};
    }

    match array.data_type() {
        DataType::Null => values.resize(array.len(), Value::Null),
        DataType::Boolean => push_values!(array, values, BooleanArray, |v| Value::Boolean(v)),
        DataType::Int8 => push_values!(array, values, Int8Array, |v| Value::TinyInt(v)),
        DataType::Int16 => push_values!(array, values, Int16Array, |v| Value::SmallInt(v)),
        DataType::Int32 => push_values!(array, values, Int32Array, |v| Value::Int(v)),
        DataType::Int64 => push_values!(array, values, Int64Array, |v| Value::BigInt(v)),
        DataType::UInt8 => push_values!(array, values, UInt8Array, |v| Value::UTinyInt(v)),
        DataType::UInt16 => push_values!(array, values, UInt16Array, |v| Value::USmallInt(v)),
        DataType::UInt32 => push_values!(array, values, UInt32Array, |v| Value::UInt(v)),
        DataType::UInt64 => push_values!(array, values, UInt64Array, |v| Value::UBigInt(v)),
        DataType::Float32 => push_values!(array, values, Float32Array, |v| Value::Float(v)),
        DataType::Float64 => push_values!(array, values, Float64Array, |v| Value::Double(v)),
        DataType::Utf8 => {
            push_values!(array, values, StringArray, |v| Value::Text(v.to_string()))
        }
        DataType::LargeUtf8 => {
            push_values!(array, values, LargeStringArray, |v| Value::Text(v.to_string()))
        }
        DataType::Utf8View => {
            push_values!(array, values, StringViewArray, |v| Value::Text(v.to_string()))
        }
        DataType::Binary => push_values!(array, values, BinaryArray, |v| Value::Blob(v.to_vec())),
        DataType::LargeBinary => {
            push_values!(array, values, LargeBinaryArray, |v| Value::Blob(v.to_vec()))
        }
        DataType::Date32 => push_values!(array, values, Date32Array, |v| Value::Date32(v)),
        DataType::Time64(TimeUnit::Microsecond) => {
            push_values!(array, values, Time64MicrosecondArray, |v| Value::Time64(
                DuckTimeUnit::Microsecond,
                v
            ))
        }
        DataType::Time64(TimeUnit::Nanosecond) => {
            push_values!(array, values, Time64NanosecondArray, |v| Value::Time64(
                DuckTimeUnit::Nanosecond,
                v
            ))
        }
        DataType::Timestamp(TimeUnit::Second, _) => {
            push_values!(array, values, TimestampSecondArray, |v| Value::Timestamp(
                DuckTimeUnit::Second,
                v
            ))
        }
        DataType::Timestamp(TimeUnit::Millisecond, _) => {
            push_values!(array, values, TimestampMillisecondArray, |v| Value::Timestamp(
                DuckTimeUnit::Millisecond,
                v
            ))
        }
        DataType::Timestamp(TimeUnit::Microsecond, _) => {
            push_values!(array, values, TimestampMicrosecondArray, |v| Value::Timestamp(
                DuckTimeUnit::Microsecond,
                v
            ))
        }
        DataType::Timestamp(TimeUnit::Nanosecond, _) => {
            push_values!(array, values, TimestampNanosecondArray, |v| Value::Timestamp(
                DuckTimeUnit::Nanosecond,
                v
            ))
        }
        DataType::Decimal128(_, 0) => {
            push_values!(array, values, Decimal128Array, |v| Value::HugeInt(v))
        }
        DataType::Decimal128(_, scale) => {
            let divisor = 10f64.powi(i32::from(*scale));
            push_values!(array, values, Decimal128Array, |v| Value::Double(
                v as f64 / divisor
            ))
        }
        DataType::Interval(IntervalUnit::MonthDayNano) => {
            push_values!(array, values, IntervalMonthDayNanoArray, |v| {
                Value::Interval {
                    months: v.months,
                    days: v.days,
                    nanos: v.nanoseconds,
                }
            })
        }
        other => return Err(WrapperError::UnsupportedColumnType(other.to_string())),
    }

    Ok(values)
}

fn downcast_array<T: 'static>(array: &ArrayRef) -> Result<&T, WrapperError> {
    array.as_any().downcast_ref::<T>().ok_or_else(|| {
        WrapperError::Internal(format!(
            "expected {} but found {}",
            type_name::<T>(),
            array.data_type()
        ))
    })
}
