use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime};

/// Field values from a record (as strings from CSV/TSV)
/// Used for schema inference - just the raw field values without metadata
pub type FieldValues = Vec<String>;

/// SQL data type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Real,
    DoublePrecision,
    Numeric,
    Text,
    Timestamp,
    TimestampTz,
    Date,
    Bytea,
}

impl SqlType {
    /// Returns the Postgres type name
    pub fn to_postgres(&self) -> &'static str {
        match self {
            SqlType::Boolean => "BOOLEAN",
            SqlType::SmallInt => "SMALLINT",
            SqlType::Integer => "INTEGER",
            SqlType::BigInt => "BIGINT",
            SqlType::Real => "REAL",
            SqlType::DoublePrecision => "DOUBLE PRECISION",
            SqlType::Numeric => "NUMERIC",
            SqlType::Text => "TEXT",
            SqlType::Timestamp => "TIMESTAMP",
            SqlType::TimestampTz => "TIMESTAMP WITH TIME ZONE",
            SqlType::Date => "DATE",
            SqlType::Bytea => "BYTEA",
        }
    }

    /// Narrowest type that holds values of both `self` and `other`, falling back to TEXT
    pub fn common_type(&self, other: &SqlType) -> SqlType {
        use SqlType::*;

        if self == other {
            return self.clone();
        }
        if matches!((self, other), (Numeric, Real) | (Real, Numeric)) {
            return DoublePrecision;
        }
        match (self.numeric_rank(), other.numeric_rank()) {
            (Some(a), Some(b)) => return if a >= b { self.clone() } else { other.clone() },
            (Some(_), None) | (None, Some(_)) => return Text,
            (None, None) => {}
        }
        match (self.temporal_rank(), other.temporal_rank()) {
            (Some(a), Some(b)) if a >= b => self.clone(),
            (Some(_), Some(_)) => other.clone(),
            _ => Text,
        }
    }

    fn numeric_rank(&self) -> Option<u8> {
        match self {
            SqlType::SmallInt => Some(1),
            SqlType::Integer => Some(2),
            SqlType::BigInt => Some(3),
            SqlType::Numeric => Some(4),
            SqlType::Real => Some(5),
            SqlType::DoublePrecision => Some(6),
            _ => None,
        }
    }

    fn temporal_rank(&self) -> Option<u8> {
        match self {
            SqlType::Date => Some(0),
            SqlType::Timestamp => Some(1),
            SqlType::TimestampTz => Some(2),
            _ => None,
        }
    }
}

/// A column in a schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub sql_type: SqlType,
    pub nullable: bool,
}

/// A table schema (ordered collection of columns)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub columns: Vec<Column>,
}

impl Schema {
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Columns rendered as `name TYPE`, used when reporting mismatches
    pub fn describe_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.sql_type.to_postgres()))
            .collect()
    }

    /// True when both schemas have the same column names and types in the same order.
    /// Nullability is ignored: it is a property of the sampled rows, not of the table.
    pub fn same_columns(&self, other: &Schema) -> bool {
        self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|(a, b)| a.name == b.name && a.sql_type == b.sql_type)
    }
}

/// Quote an identifier for use in SQL, doubling any embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Generate the DDL statement for creating a table.
///
/// Columns are always nullable: the schema is taken from the first chunk,
/// and a later chunk may carry nulls the first one did not.
pub fn create_table_ddl(table_name: &str, schema: &Schema) -> String {
    let mut ddl = format!("CREATE TABLE {} (\n", quote_ident(table_name));

    let column_defs: Vec<String> = schema
        .columns
        .iter()
        .map(|col| format!("  {} {}", quote_ident(&col.name), col.sql_type.to_postgres()))
        .collect();

    ddl.push_str(&column_defs.join(",\n"));
    ddl.push_str("\n)");

    ddl
}

pub fn drop_table_sql(table_name: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_ident(table_name))
}

/// `0` and `1` are left to the integer types
const BOOLEAN_LITERALS: [&str; 4] = ["true", "false", "t", "f"];

/// Date layouts accepted in delimited data. Slash dates are month-first
/// unless the first field cannot be a month.
pub(crate) const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%m/%d/%Y", "%d-%m-%Y", "%d/%m/%Y"];

/// Timestamp layouts accepted in delimited data, with or without seconds
pub(crate) const TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Schema inferrer for delimited data
pub struct SchemaInferrer {
    /// Infer header names from first row if true
    pub has_header: bool,
}

impl SchemaInferrer {
    /// Type of a single value; `None` for an empty (null) value
    fn infer_value_type(value: &str) -> Option<SqlType> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }

        let sql_type = if BOOLEAN_LITERALS.iter().any(|b| value.eq_ignore_ascii_case(b)) {
            SqlType::Boolean
        } else if let Ok(n) = value.parse::<i64>() {
            integer_type(n)
        } else if let Some(float) = float_type(value) {
            float
        } else if DATE_FORMATS
            .iter()
            .any(|f| NaiveDate::parse_from_str(value, f).is_ok())
        {
            SqlType::Date
        } else if TIMESTAMP_FORMATS
            .iter()
            .any(|f| NaiveDateTime::parse_from_str(value, f).is_ok())
        {
            SqlType::Timestamp
        } else {
            SqlType::Text
        };
        Some(sql_type)
    }

    /// Widen over every value of a column. Returns the type and whether a null was seen.
    fn infer_column_type(values: &[&str]) -> (SqlType, bool) {
        let mut has_nulls = false;
        let widest = values
            .iter()
            .filter_map(|v| {
                let t = Self::infer_value_type(v);
                has_nulls |= t.is_none();
                t
            })
            .reduce(|acc, t| acc.common_type(&t));

        match widest {
            Some(sql_type) => (sql_type, has_nulls),
            // A column with no values at all stays nullable text
            None => (SqlType::Text, true),
        }
    }

    /// Infer schema from records.
    ///
    /// With `has_header`, the first record supplies the column names. A header
    /// with no data rows yields nullable `TEXT` columns.
    pub fn infer_from_data(&self, records: &[FieldValues]) -> Result<Schema> {
        if records.is_empty() {
            anyhow::bail!("Cannot infer schema from empty dataset");
        }

        let (header_names, data_start_idx) = if self.has_header {
            (records[0].clone(), 1)
        } else {
            let num_cols = records[0].len();
            let names = (0..num_cols).map(|i| format!("column_{}", i + 1)).collect();
            (names, 0)
        };

        if header_names.is_empty() {
            anyhow::bail!("Header row has no columns");
        }

        let data_rows = &records[data_start_idx..];
        let mut columns = Vec::with_capacity(header_names.len());

        for (col_idx, name) in header_names.iter().enumerate() {
            let column_values: Vec<&str> = data_rows
                .iter()
                .filter_map(|row| row.get(col_idx).map(|s| s.as_str()))
                .collect();

            let (sql_type, nullable) = Self::infer_column_type(&column_values);

            columns.push(Column {
                name: name.clone(),
                sql_type,
                nullable,
            });
        }

        Ok(Schema { columns })
    }
}

fn integer_type(n: i64) -> SqlType {
    if i16::try_from(n).is_ok() {
        SqlType::SmallInt
    } else if i32::try_from(n).is_ok() {
        SqlType::Integer
    } else {
        SqlType::BigInt
    }
}

/// Every non-integer number is DOUBLE PRECISION, so no value is rounded to `f32`.
/// `NaN` and `inf` spellings are not numbers here.
fn float_type(value: &str) -> Option<SqlType> {
    let spelled_out = value
        .chars()
        .any(|c| c.is_ascii_alphabetic() && !matches!(c, 'e' | 'E'));
    if spelled_out || value.parse::<f64>().is_err() {
        return None;
    }
    Some(SqlType::DoublePrecision)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(data: &[&[&str]]) -> Vec<FieldValues> {
        data.iter()
            .map(|r| r.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_infer_value_types() {
        let cases = [
            ("42", Some(SqlType::SmallInt)),
            ("100000", Some(SqlType::Integer)),
            ("9999999999", Some(SqlType::BigInt)),
            ("3.14", Some(SqlType::DoublePrecision)),
            ("0.123456789", Some(SqlType::DoublePrecision)),
            ("1e5", Some(SqlType::DoublePrecision)),
            ("true", Some(SqlType::Boolean)),
            ("F", Some(SqlType::Boolean)),
            ("0", Some(SqlType::SmallInt)),
            ("1", Some(SqlType::SmallInt)),
            ("Newark Airport", Some(SqlType::Text)),
            ("2025-11-03", Some(SqlType::Date)),
            ("2025-11-03 08:15:00", Some(SqlType::Timestamp)),
            ("2025-11-03T08:15", Some(SqlType::Timestamp)),
            ("NaN", Some(SqlType::Text)),
            ("  ", None),
        ];
        for (value, expected) in cases {
            assert_eq!(SchemaInferrer::infer_value_type(value), expected, "{value:?}");
        }
    }

    #[test]
    fn test_type_promotion() {
        use SqlType::*;
        let cases = [
            (SmallInt, Integer, Integer),
            (Boolean, BigInt, Text),
            (Integer, Numeric, Numeric),
            (Integer, Real, Real),
            (Numeric, Real, DoublePrecision),
            (Real, DoublePrecision, DoublePrecision),
            (Date, Timestamp, Timestamp),
            (TimestampTz, Date, TimestampTz),
            (Integer, Text, Text),
            (Integer, Date, Text),
            (Bytea, Boolean, Text),
        ];
        for (a, b, expected) in cases {
            assert_eq!(a.common_type(&b), expected, "{a:?} + {b:?}");
            assert_eq!(b.common_type(&a), expected, "{b:?} + {a:?}");
        }
    }

    #[test]
    fn test_infer_zone_lookup_schema() {
        let records = rows(&[
            &["LocationID", "Borough", "Zone", "service_zone"],
            &["1", "EWR", "Newark Airport", "EWR"],
            &["2", "Queens", "Jamaica Bay", "Boro Zone"],
            &["264", "Unknown", "", "N/A"],
        ]);

        let inferrer = SchemaInferrer { has_header: true };
        let schema = inferrer.infer_from_data(&records).unwrap();

        assert_eq!(
            schema.column_names(),
            vec!["LocationID", "Borough", "Zone", "service_zone"]
        );
        assert_eq!(schema.columns[0].sql_type, SqlType::SmallInt);
        assert_eq!(schema.columns[1].sql_type, SqlType::Text);
        assert!(schema.columns[2].nullable);
        assert!(!schema.columns[3].nullable);
    }

    #[test]
    fn test_infer_trip_columns_keep_precision() {
        let records = rows(&[
            &["fare_amount", "VendorID", "store_and_fwd_flag"],
            &["123456.78", "1", "t"],
            &["16777217.5", "0", "f"],
            &["12", "1", ""],
        ]);

        let inferrer = SchemaInferrer { has_header: true };
        let schema = inferrer.infer_from_data(&records).unwrap();

        // integers mixed into a decimal column widen to DOUBLE PRECISION too
        assert_eq!(schema.columns[0].sql_type, SqlType::DoublePrecision);
        assert_eq!(schema.columns[1].sql_type, SqlType::SmallInt);
        assert_eq!(schema.columns[2].sql_type, SqlType::Boolean);
        assert!(schema.columns[2].nullable);
    }

    #[test]
    fn test_infer_header_only() {
        let records = rows(&[&["LocationID", "Borough"]]);

        let inferrer = SchemaInferrer { has_header: true };
        let schema = inferrer.infer_from_data(&records).unwrap();

        assert_eq!(schema.columns.len(), 2);
        assert!(
            schema
                .columns
                .iter()
                .all(|c| c.sql_type == SqlType::Text && c.nullable)
        );
    }

    #[test]
    fn test_infer_schema_without_header() {
        let records = rows(&[&["1", "Alice"], &["2", "Bob"]]);

        let inferrer = SchemaInferrer { has_header: false };
        let schema = inferrer.infer_from_data(&records).unwrap();

        assert_eq!(schema.column_names(), vec!["column_1", "column_2"]);
    }

    #[test]
    fn test_create_table_ddl() {
        let schema = Schema {
            columns: vec![
                Column {
                    name: "VendorID".to_string(),
                    sql_type: SqlType::Integer,
                    nullable: false,
                },
                Column {
                    name: "fare_amount".to_string(),
                    sql_type: SqlType::DoublePrecision,
                    nullable: true,
                },
            ],
        };

        let ddl = create_table_ddl("green_taxi_trips", &schema);

        assert!(ddl.starts_with("CREATE TABLE \"green_taxi_trips\""));
        assert!(ddl.contains("\"VendorID\" INTEGER"));
        assert!(!ddl.contains("NOT NULL"));
        assert!(ddl.contains("\"fare_amount\" DOUBLE PRECISION"));
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("taxi_zones"), "\"taxi_zones\"");
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
        assert_eq!(drop_table_sql("t"), "DROP TABLE IF EXISTS \"t\"");
    }

    #[test]
    fn test_same_columns_ignores_nullability() {
        let col = |name: &str, sql_type: SqlType, nullable: bool| Column {
            name: name.to_string(),
            sql_type,
            nullable,
        };
        let a = Schema {
            columns: vec![col("id", SqlType::BigInt, false)],
        };
        let b = Schema {
            columns: vec![col("id", SqlType::BigInt, true)],
        };
        let c = Schema {
            columns: vec![col("id", SqlType::Text, false)],
        };

        assert!(a.same_columns(&b));
        assert!(!a.same_columns(&c));
        assert_eq!(c.describe_columns(), vec!["id TEXT"]);
    }
}
