//! Generic row decoding.
//!
//! Every cell of a result row is rendered as a string, whatever its column
//! type. NULL becomes the empty string.
//!
//! # Architecture
//!
//! Decoding uses the same two-phase approach per backend:
//! 1. `TypeCategory` classifies the column's declared type
//! 2. Database-specific decoders read the value and render it as text
//!
//! SQLite is the exception: its columns carry no reliable type, so cells are
//! rendered by the storage class of each value instead.
//!
//! # Temporal values
//!
//! MySQL DATE, TIME, DATETIME and TIMESTAMP cells keep the server's notation,
//! including zero dates, negative or multi-day TIME and the column's
//! fractional digits. PostgreSQL `timestamptz` is normalised to UTC and
//! printed with a `+00:00` offset, not in the session time zone.

use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, DecodedRow};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo, ValueRef};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const TIMESTAMPTZ_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f%:z";

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Boolean,
    Integer,
    Float,
    Double,
    Decimal,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Json,
    Uuid,
    Text,
    Binary,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    let lower = type_name.to_ascii_lowercase();
    let base = lower.strip_suffix(" unsigned").unwrap_or(&lower);

    match base {
        "bool" | "boolean" => TypeCategory::Boolean,
        "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "int2" | "int4"
        | "int8" | "year" => TypeCategory::Integer,
        "float" | "float4" | "real" => TypeCategory::Float,
        "double" | "float8" | "double precision" => TypeCategory::Double,
        "decimal" | "numeric" => TypeCategory::Decimal,
        "date" => TypeCategory::Date,
        "time" => TypeCategory::Time,
        "datetime" | "timestamp" => TypeCategory::Timestamp,
        "timestamptz" => TypeCategory::TimestampTz,
        "json" | "jsonb" => TypeCategory::Json,
        "uuid" => TypeCategory::Uuid,
        "char" | "varchar" | "text" | "tinytext" | "mediumtext" | "longtext" | "bpchar"
        | "name" | "citext" | "enum" | "set" => TypeCategory::Text,
        "binary" | "varbinary" | "blob" | "tinyblob" | "mediumblob" | "longblob" | "bytea"
        | "bit" => TypeCategory::Binary,
        _ => TypeCategory::Unknown,
    }
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Raw DECIMAL value as sent by MySQL, which transmits decimals as text in
/// both protocols. Preserves the exact server representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

// =============================================================================
// Row Decoding
// =============================================================================

/// Render a row's cells as strings.
pub trait DecodeRow: Row {
    /// Render one cell. `None` means SQL NULL.
    fn decode_cell(&self, index: usize) -> DbResult<Option<String>>;

    /// Column names in result order.
    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }

    /// Render the whole row, NULL as `""`.
    ///
    /// When a column name repeats, the later value wins and the key keeps the
    /// position of its first occurrence.
    fn decode_row(&self) -> DbResult<DecodedRow> {
        let mut decoded = DecodedRow::with_capacity(self.len());
        for (index, column) in self.columns().iter().enumerate() {
            let value = self.decode_cell(index)?.unwrap_or_default();
            decoded.insert(column.name().to_string(), value);
        }
        Ok(decoded)
    }
}

fn column_name<R: Row>(row: &R, index: usize) -> String {
    row.columns()
        .get(index)
        .map(|c| c.name().to_string())
        .unwrap_or_else(|| index.to_string())
}

fn decode_error<R: Row>(row: &R, index: usize) -> impl FnOnce(sqlx::Error) -> DbError + '_ {
    move |e| match e {
        sqlx::Error::ColumnDecode { source, .. } => {
            DbError::decode(column_name(row, index), source.to_string())
        }
        other => DbError::decode(column_name(row, index), other.to_string()),
    }
}

fn lossy(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

impl DecodeRow for MySqlRow {
    fn decode_cell(&self, index: usize) -> DbResult<Option<String>> {
        mysql::decode_cell(self, index)
    }
}

impl DecodeRow for PgRow {
    fn decode_cell(&self, index: usize) -> DbResult<Option<String>> {
        postgres::decode_cell(self, index)
    }
}

impl DecodeRow for SqliteRow {
    fn decode_cell(&self, index: usize) -> DbResult<Option<String>> {
        sqlite::decode_cell(self, index)
    }
}

/// A raw result row from any backend.
pub enum DbRow {
    MySql(MySqlRow),
    Postgres(PgRow),
    SQLite(SqliteRow),
}

impl DbRow {
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbRow::MySql(_) => DatabaseType::MySQL,
            DbRow::Postgres(_) => DatabaseType::PostgreSQL,
            DbRow::SQLite(_) => DatabaseType::SQLite,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            DbRow::MySql(r) => r.len(),
            DbRow::Postgres(r) => r.len(),
            DbRow::SQLite(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column_names(&self) -> Vec<String> {
        match self {
            DbRow::MySql(r) => r.column_names(),
            DbRow::Postgres(r) => r.column_names(),
            DbRow::SQLite(r) => r.column_names(),
        }
    }

    /// Render one cell by position. Unlike [`DbRow::decode`], NULL stays
    /// distinguishable as `None`.
    pub fn cell(&self, index: usize) -> DbResult<Option<String>> {
        if index >= self.len() {
            return Err(DbError::decode(
                index.to_string(),
                format!("index out of bounds (len: {})", self.len()),
            ));
        }
        match self {
            DbRow::MySql(r) => r.decode_cell(index),
            DbRow::Postgres(r) => r.decode_cell(index),
            DbRow::SQLite(r) => r.decode_cell(index),
        }
    }

    /// Render one cell by column name (first match).
    pub fn get(&self, column: &str) -> DbResult<Option<String>> {
        let index = self
            .column_names()
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| DbError::decode(column, "column not found"))?;
        self.cell(index)
    }

    /// Render the whole row, NULL as `""`.
    pub fn decode(&self) -> DbResult<DecodedRow> {
        match self {
            DbRow::MySql(r) => r.decode_row(),
            DbRow::Postgres(r) => r.decode_row(),
            DbRow::SQLite(r) => r.decode_row(),
        }
    }
}

impl std::fmt::Debug for DbRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbRow")
            .field("db_type", &self.db_type())
            .field("columns", &self.column_names())
            .finish()
    }
}

impl From<MySqlRow> for DbRow {
    fn from(row: MySqlRow) -> Self {
        DbRow::MySql(row)
    }
}

impl From<PgRow> for DbRow {
    fn from(row: PgRow) -> Self {
        DbRow::Postgres(row)
    }
}

impl From<SqliteRow> for DbRow {
    fn from(row: SqliteRow) -> Self {
        DbRow::SQLite(row)
    }
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;

    pub fn decode_cell(row: &MySqlRow, idx: usize) -> DbResult<Option<String>> {
        if row.try_get_raw(idx).map_err(decode_error(row, idx))?.is_null() {
            return Ok(None);
        }

        let type_name = row.columns()[idx].type_info().name();
        let category = categorize_type(type_name);
        let rendered = match category {
            // TINYINT(1); rendered the way MySQL prints it
            TypeCategory::Boolean | TypeCategory::Integer => decode_integer(row, idx, type_name),
            TypeCategory::Float => row
                .try_get_unchecked::<f32, _>(idx)
                .map(|v| v.to_string()),
            TypeCategory::Double => row
                .try_get_unchecked::<f64, _>(idx)
                .map(|v| v.to_string()),
            TypeCategory::Decimal => row.try_get::<RawDecimal, _>(idx).map(|v| v.0),
            TypeCategory::Date
            | TypeCategory::Time
            | TypeCategory::Timestamp
            | TypeCategory::TimestampTz => row
                .try_get_unchecked::<Vec<u8>, _>(idx)
                .and_then(|bytes| {
                    render_temporal(&bytes, category)
                        .map_err(|msg| sqlx::Error::Decode(msg.into()))
                }),
            TypeCategory::Json => row
                .try_get_unchecked::<serde_json::Value, _>(idx)
                .map(|v| v.to_string()),
            // Strings travel as bytes in both protocols
            _ => row.try_get_unchecked::<Vec<u8>, _>(idx).map(lossy),
        };

        rendered.map(Some).map_err(decode_error(row, idx))
    }

    fn decode_integer(row: &MySqlRow, idx: usize, type_name: &str) -> Result<String, sqlx::Error> {
        if type_name.to_ascii_uppercase().ends_with("UNSIGNED") {
            row.try_get_unchecked::<u64, _>(idx).map(|v| v.to_string())
        } else {
            row.try_get_unchecked::<i64, _>(idx).map(|v| v.to_string())
        }
    }

    /// Render a DATE, TIME, DATETIME or TIMESTAMP cell in MySQL's own notation.
    ///
    /// Text-protocol values already are that notation and pass through
    /// untouched, so zero dates, TIME beyond 24 hours and the column's
    /// fractional precision all survive. Binary-protocol values are a
    /// length-prefixed struct whose first byte (0 to 12) never starts a
    /// textual value; fractions there render as six digits when non-zero.
    pub(super) fn render_temporal(bytes: &[u8], category: TypeCategory) -> Result<String, String> {
        let (&len, rest) = bytes
            .split_first()
            .ok_or_else(|| "empty temporal value".to_string())?;
        if len.is_ascii_digit() || len == b'-' {
            return Ok(lossy(bytes.to_vec()));
        }

        let body = rest
            .get(..usize::from(len))
            .ok_or_else(|| format!("temporal value truncated: expected {len} bytes"))?;
        match category {
            TypeCategory::Time => binary_time(body),
            TypeCategory::Date => binary_datetime(body, false),
            _ => binary_datetime(body, true),
        }
    }

    fn binary_datetime(body: &[u8], with_clock: bool) -> Result<String, String> {
        let (year, month, day, clock) = match *body {
            [] => (0, 0, 0, &[][..]),
            [y0, y1, month, day, ref clock @ ..] => {
                (u16::from_le_bytes([y0, y1]), month, day, clock)
            }
            _ => return Err(format!("unexpected date length {}", body.len())),
        };
        let date = format!("{year:04}-{month:02}-{day:02}");
        if !with_clock {
            return Ok(date);
        }

        let (hour, minute, second, micros) = match *clock {
            [] => (0, 0, 0, 0),
            [h, m, s] => (h, m, s, 0),
            [h, m, s, a, b, c, d] => (h, m, s, u32::from_le_bytes([a, b, c, d])),
            _ => return Err(format!("unexpected datetime length {}", body.len())),
        };
        Ok(format!(
            "{date} {}",
            clock_text(u32::from(hour), minute, second, micros)
        ))
    }

    fn binary_time(body: &[u8]) -> Result<String, String> {
        let (negative, days, hour, minute, second, micros) = match *body {
            [] => (false, 0, 0, 0, 0, 0),
            [sign, d0, d1, d2, d3, h, m, s] => {
                (sign == 1, u32::from_le_bytes([d0, d1, d2, d3]), h, m, s, 0)
            }
            [sign, d0, d1, d2, d3, h, m, s, a, b, c, d] => (
                sign == 1,
                u32::from_le_bytes([d0, d1, d2, d3]),
                h,
                m,
                s,
                u32::from_le_bytes([a, b, c, d]),
            ),
            _ => return Err(format!("unexpected time length {}", body.len())),
        };
        let hours = days * 24 + u32::from(hour);
        let sign = if negative { "-" } else { "" };
        Ok(format!("{sign}{}", clock_text(hours, minute, second, micros)))
    }

    fn clock_text(hours: u32, minute: u8, second: u8, micros: u32) -> String {
        if micros == 0 {
            format!("{hours:02}:{minute:02}:{second:02}")
        } else {
            format!("{hours:02}:{minute:02}:{second:02}.{micros:06}")
        }
    }
}

mod postgres {
    use super::*;

    pub fn decode_cell(row: &PgRow, idx: usize) -> DbResult<Option<String>> {
        if row.try_get_raw(idx).map_err(decode_error(row, idx))?.is_null() {
            return Ok(None);
        }

        let type_name = row.columns()[idx].type_info().name();
        let rendered = match categorize_type(type_name) {
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Integer => decode_integer(row, idx, type_name),
            TypeCategory::Float => row.try_get::<f32, _>(idx).map(|v| v.to_string()),
            TypeCategory::Double => row.try_get::<f64, _>(idx).map(|v| v.to_string()),
            TypeCategory::Decimal => row
                .try_get::<sqlx::types::Decimal, _>(idx)
                .map(|v| v.to_string()),
            TypeCategory::Date => row
                .try_get::<NaiveDate, _>(idx)
                .map(|v| v.format(DATE_FORMAT).to_string()),
            TypeCategory::Time => row
                .try_get::<NaiveTime, _>(idx)
                .map(|v| v.format(TIME_FORMAT).to_string()),
            TypeCategory::Timestamp => row
                .try_get::<NaiveDateTime, _>(idx)
                .map(|v| v.format(TIMESTAMP_FORMAT).to_string()),
            TypeCategory::TimestampTz => row
                .try_get::<DateTime<Utc>, _>(idx)
                .map(|v| v.format(TIMESTAMPTZ_FORMAT).to_string()),
            TypeCategory::Json => row
                .try_get::<serde_json::Value, _>(idx)
                .map(|v| v.to_string()),
            TypeCategory::Uuid => row
                .try_get::<sqlx::types::Uuid, _>(idx)
                .map(|v| v.hyphenated().to_string()),
            TypeCategory::Binary => row.try_get::<Vec<u8>, _>(idx).map(lossy),
            TypeCategory::Text => row.try_get_unchecked::<String, _>(idx),
            TypeCategory::Unknown => decode_fallback(row, idx),
        };

        rendered.map(Some).map_err(decode_error(row, idx))
    }

    fn decode_boolean(row: &PgRow, idx: usize) -> Result<String, sqlx::Error> {
        row.try_get::<bool, _>(idx)
            .map(|v| if v { "t" } else { "f" }.to_string())
    }

    fn decode_integer(row: &PgRow, idx: usize, type_name: &str) -> Result<String, sqlx::Error> {
        match type_name.to_ascii_uppercase().as_str() {
            "INT2" | "SMALLINT" => row.try_get::<i16, _>(idx).map(|v| v.to_string()),
            "INT4" | "INT" | "INTEGER" => row.try_get::<i32, _>(idx).map(|v| v.to_string()),
            _ => row.try_get::<i64, _>(idx).map(|v| v.to_string()),
        }
    }

    /// Types without a dedicated decoder (intervals, enums, arrays, domains).
    /// Queries without parameters use the text protocol, so the raw value is
    /// already the server's textual form.
    fn decode_fallback(row: &PgRow, idx: usize) -> Result<String, sqlx::Error> {
        row.try_get_unchecked::<String, _>(idx)
            .or_else(|_| row.try_get_unchecked::<Vec<u8>, _>(idx).map(lossy))
    }
}

mod sqlite {
    use super::*;

    pub fn decode_cell(row: &SqliteRow, idx: usize) -> DbResult<Option<String>> {
        let storage_class = {
            let raw = row.try_get_raw(idx).map_err(decode_error(row, idx))?;
            if raw.is_null() {
                return Ok(None);
            }
            raw.type_info().name().to_ascii_uppercase()
        };

        let rendered = match storage_class.as_str() {
            "INTEGER" => row
                .try_get_unchecked::<i64, _>(idx)
                .map(|v| v.to_string()),
            "REAL" => row
                .try_get_unchecked::<f64, _>(idx)
                .map(|v| v.to_string()),
            "BLOB" => row.try_get_unchecked::<Vec<u8>, _>(idx).map(lossy),
            _ => row.try_get_unchecked::<String, _>(idx),
        };

        rendered.map(Some).map_err(decode_error(row, idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_type_integer() {
        assert_eq!(categorize_type("INT"), TypeCategory::Integer);
        assert_eq!(categorize_type("BIGINT"), TypeCategory::Integer);
        assert_eq!(categorize_type("TINYINT UNSIGNED"), TypeCategory::Integer);
        assert_eq!(categorize_type("INT8"), TypeCategory::Integer);
        // Not integers despite the substring
        assert_eq!(categorize_type("INTERVAL"), TypeCategory::Unknown);
        assert_eq!(categorize_type("POINT"), TypeCategory::Unknown);
    }

    #[test]
    fn test_categorize_type_decimal_and_float() {
        assert_eq!(categorize_type("DECIMAL"), TypeCategory::Decimal);
        assert_eq!(categorize_type("NUMERIC"), TypeCategory::Decimal);
        assert_eq!(categorize_type("FLOAT4"), TypeCategory::Float);
        assert_eq!(categorize_type("DOUBLE"), TypeCategory::Double);
        assert_eq!(categorize_type("FLOAT8"), TypeCategory::Double);
    }

    #[test]
    fn test_categorize_type_temporal() {
        assert_eq!(categorize_type("DATE"), TypeCategory::Date);
        assert_eq!(categorize_type("TIME"), TypeCategory::Time);
        assert_eq!(categorize_type("DATETIME"), TypeCategory::Timestamp);
        assert_eq!(categorize_type("TIMESTAMP"), TypeCategory::Timestamp);
        assert_eq!(categorize_type("TIMESTAMPTZ"), TypeCategory::TimestampTz);
    }

    #[test]
    fn test_categorize_type_misc() {
        assert_eq!(categorize_type("BOOLEAN"), TypeCategory::Boolean);
        assert_eq!(categorize_type("BOOL"), TypeCategory::Boolean);
        assert_eq!(categorize_type("jsonb"), TypeCategory::Json);
        assert_eq!(categorize_type("UUID"), TypeCategory::Uuid);
        assert_eq!(categorize_type("VARCHAR"), TypeCategory::Text);
        assert_eq!(categorize_type("BYTEA"), TypeCategory::Binary);
        assert_eq!(categorize_type("LONGBLOB"), TypeCategory::Binary);
        assert_eq!(categorize_type("GEOMETRY"), TypeCategory::Unknown);
    }

    #[test]
    fn test_lossy_keeps_valid_utf8() {
        assert_eq!(lossy(b"hello".to_vec()), "hello");
        assert_eq!(lossy(Vec::new()), "");
    }

    #[test]
    fn test_lossy_replaces_invalid_utf8() {
        assert_eq!(lossy(vec![b'a', 0xFF, b'b']), "a\u{FFFD}b");
    }

    #[test]
    fn test_mysql_text_temporals_pass_through() {
        for (raw, category) in [
            ("0000-00-00", TypeCategory::Date),
            ("0000-00-00 00:00:00", TypeCategory::Timestamp),
            ("838:59:59", TypeCategory::Time),
            ("-01:00:00", TypeCategory::Time),
            ("2024-01-01 10:00:00.500000", TypeCategory::Timestamp),
        ] {
            assert_eq!(mysql::render_temporal(raw.as_bytes(), category).unwrap(), raw);
        }
    }

    #[test]
    fn test_mysql_binary_dates() {
        let zero = mysql::render_temporal(&[0], TypeCategory::Date).unwrap();
        assert_eq!(zero, "0000-00-00");

        let date = [4, 0xE8, 0x07, 1, 2];
        assert_eq!(
            mysql::render_temporal(&date, TypeCategory::Date).unwrap(),
            "2024-01-02"
        );

        let zero_ts = mysql::render_temporal(&[0], TypeCategory::Timestamp).unwrap();
        assert_eq!(zero_ts, "0000-00-00 00:00:00");

        // 500000 microseconds, little-endian
        let ts = [11, 0xE8, 0x07, 1, 1, 10, 0, 0, 0x20, 0xA1, 0x07, 0x00];
        assert_eq!(
            mysql::render_temporal(&ts, TypeCategory::Timestamp).unwrap(),
            "2024-01-01 10:00:00.500000"
        );
    }

    #[test]
    fn test_mysql_binary_times() {
        // 34 days 22:59:59
        let long = [8, 0, 34, 0, 0, 0, 22, 59, 59];
        assert_eq!(
            mysql::render_temporal(&long, TypeCategory::Time).unwrap(),
            "838:59:59"
        );

        let negative = [8, 1, 0, 0, 0, 0, 1, 0, 0];
        assert_eq!(
            mysql::render_temporal(&negative, TypeCategory::Time).unwrap(),
            "-01:00:00"
        );

        assert_eq!(
            mysql::render_temporal(&[0], TypeCategory::Time).unwrap(),
            "00:00:00"
        );
    }

    #[test]
    fn test_mysql_malformed_temporal_is_an_error() {
        assert!(mysql::render_temporal(&[], TypeCategory::Date).is_err());
        assert!(mysql::render_temporal(&[7, 0xE8, 0x07], TypeCategory::Timestamp).is_err());
        assert!(mysql::render_temporal(&[2, 0, 0], TypeCategory::Date).is_err());
    }

    #[test]
    fn test_temporal_formats() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_milli_opt(7, 5, 1, 250)
            .unwrap();
        assert_eq!(ts.format(DATE_FORMAT).to_string(), "2024-03-09");
        assert_eq!(ts.format(TIME_FORMAT).to_string(), "07:05:01.250");
        assert_eq!(ts.format(TIMESTAMP_FORMAT).to_string(), "2024-03-09 07:05:01.250");
        assert_eq!(
            ts.and_utc().format(TIMESTAMPTZ_FORMAT).to_string(),
            "2024-03-09 07:05:01.250+00:00"
        );

        let whole = NaiveTime::from_hms_opt(23, 59, 0).unwrap();
        assert_eq!(whole.format(TIME_FORMAT).to_string(), "23:59:00");
    }
}
