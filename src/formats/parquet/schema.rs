//! Mapping from Arrow schemas to SQL table schemas.

use anyhow::{Result, anyhow};
use arrow::datatypes::{DataType, Schema as ArrowSchema};

use crate::db::schema::{Column, Schema, SqlType};

/// Map an Arrow data type to the SQL type used for its column
pub fn sql_type_for(data_type: &DataType) -> Option<SqlType> {
    let sql_type = match data_type {
        DataType::Boolean => SqlType::Boolean,
        DataType::Int8 | DataType::Int16 | DataType::UInt8 => SqlType::SmallInt,
        DataType::Int32 | DataType::UInt16 => SqlType::Integer,
        DataType::Int64 | DataType::UInt32 => SqlType::BigInt,
        // u64 overflows BIGINT
        DataType::UInt64 => SqlType::Numeric,
        DataType::Float16 | DataType::Float32 => SqlType::Real,
        DataType::Float64 => SqlType::DoublePrecision,
        DataType::Decimal128(_, _) | DataType::Decimal256(_, _) => SqlType::Numeric,
        DataType::Utf8 | DataType::LargeUtf8 => SqlType::Text,
        DataType::Binary | DataType::LargeBinary => SqlType::Bytea,
        DataType::Date32 | DataType::Date64 => SqlType::Date,
        DataType::Timestamp(_, None) => SqlType::Timestamp,
        DataType::Timestamp(_, Some(_)) => SqlType::TimestampTz,
        _ => return None,
    };
    Some(sql_type)
}

/// Build the SQL schema for an Arrow schema, failing on the first unsupported column
pub fn schema_from_arrow(arrow_schema: &ArrowSchema) -> Result<Schema> {
    let columns = arrow_schema
        .fields()
        .iter()
        .map(|field| {
            let sql_type = sql_type_for(field.data_type()).ok_or_else(|| {
                anyhow!(
                    "Unsupported column type for '{}': {:?}",
                    field.name(),
                    field.data_type()
                )
            })?;
            Ok(Column {
                name: field.name().clone(),
                sql_type,
                nullable: field.is_nullable(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if columns.is_empty() {
        anyhow::bail!("Parquet schema has no columns");
    }

    Ok(Schema { columns })
}
