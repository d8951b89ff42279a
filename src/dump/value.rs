// ABOUTME: Cell values decoded at the database boundary and their SQL literal form
// ABOUTME: Maps PostgreSQL column types onto a closed set of cell kinds

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::error::Error;
use std::net::IpAddr;
use tokio_postgres::types::{FromSql, Kind, Type};
use uuid::Uuid;

use super::numeric::numeric_to_string;

/// One database cell, reduced to the kinds the dump knows how to print.
///
/// Produced by [`FromSql`] at the driver boundary so that formatting never has
/// to look at column types.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Bool(bool),
    /// Text content (or the hex text form of binary data)
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
    /// Any other scalar, already in its textual form
    Other(String),
}

impl CellValue {
    /// Convenience constructor for text cells.
    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Bytes(value.into().into_bytes())
    }

    /// SQL literal for this cell.
    ///
    /// - `Null` → `NULL`
    /// - `Bool` → `true` / `false`, unquoted
    /// - `Bytes` → quoted, with every `'` doubled
    /// - `Timestamp` → quoted UTC `YYYY-MM-DDTHH:MM:SSZ`, sub-seconds truncated
    /// - `Other` → its text, quoted (numbers included)
    ///
    /// # Examples
    ///
    /// ```
    /// # use pg_user_dump::dump::CellValue;
    /// assert_eq!(CellValue::Null.to_sql_literal(), "NULL");
    /// assert_eq!(CellValue::Bool(false).to_sql_literal(), "false");
    /// assert_eq!(CellValue::text("O'Brien").to_sql_literal(), "'O''Brien'");
    /// assert_eq!(CellValue::Other("42".into()).to_sql_literal(), "'42'");
    /// ```
    pub fn to_sql_literal(&self) -> String {
        match self {
            CellValue::Null => "NULL".to_string(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Bytes(bytes) => quote_literal(&String::from_utf8_lossy(bytes)),
            CellValue::Timestamp(ts) => format!("'{}'", ts.format(TIMESTAMP_FORMAT)),
            CellValue::Other(text) => quote_literal(text),
        }
    }

    /// Element text inside an array literal: double-quoted, `NULL` bare.
    fn array_element(&self) -> String {
        let text = match self {
            CellValue::Null => return "NULL".to_string(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            CellValue::Timestamp(ts) => ts.format(TIMESTAMP_FORMAT).to_string(),
            CellValue::Other(text) => text.clone(),
        };
        format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
    }

    /// Plain text of the cell when it is usable as a row identifier.
    pub fn as_identifier(&self) -> Option<String> {
        match self {
            CellValue::Null => None,
            CellValue::Bool(b) => Some(b.to_string()),
            CellValue::Bytes(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            CellValue::Timestamp(ts) => Some(ts.to_rfc3339()),
            CellValue::Other(text) => Some(text.clone()),
        }
    }
}

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

type DecodeError = Box<dyn Error + Sync + Send>;

/// Single-quote `value`, doubling embedded single quotes.
///
/// Nothing else is escaped: the output targets servers running with
/// `standard_conforming_strings = on`.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Postgres hex text form of binary data (`\x0a1b...`).
pub fn bytea_hex(raw: &[u8]) -> String {
    let mut out = String::with_capacity(2 + raw.len() * 2);
    out.push_str("\\x");
    for byte in raw {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

fn float_text(value: f64) -> String {
    if value.is_infinite() {
        if value.is_sign_positive() {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else if value.is_nan() {
        "NaN".to_string()
    } else {
        value.to_string()
    }
}

/// `infinity` / `-infinity` sentinels for timestamp columns, which chrono
/// cannot represent.
fn timestamp_infinity(raw: &[u8]) -> Option<&'static str> {
    let micros = i64::from_be_bytes(raw.try_into().ok()?);
    match micros {
        i64::MAX => Some("infinity"),
        i64::MIN => Some("-infinity"),
        _ => None,
    }
}

fn date_infinity(raw: &[u8]) -> Option<&'static str> {
    let days = i32::from_be_bytes(raw.try_into().ok()?);
    match days {
        i32::MAX => Some("infinity"),
        i32::MIN => Some("-infinity"),
        _ => None,
    }
}

/// Text form of a binary `inet`/`cidr` value. The prefix length is shown for
/// `cidr` and for `inet` values that are not a single host.
fn inet_text(raw: &[u8]) -> Result<String, DecodeError> {
    if raw.len() < 4 {
        return Err("invalid inet length".into());
    }
    let (header, addr) = raw.split_at(4);
    let (family, bits, is_cidr) = (header[0], header[1], header[2] != 0);

    let ip = match family {
        2 => IpAddr::from(<[u8; 4]>::try_from(addr)?),
        3 => IpAddr::from(<[u8; 16]>::try_from(addr)?),
        _ => return Err(format!("invalid inet family {}", family).into()),
    };
    let host_bits = if ip.is_ipv4() { 32 } else { 128 };

    if is_cidr || bits != host_bits {
        Ok(format!("{}/{}", ip, bits))
    } else {
        Ok(ip.to_string())
    }
}

/// `timetz` travels as microseconds since midnight plus the zone in seconds
/// west of UTC.
fn timetz_text(raw: &[u8]) -> Result<String, DecodeError> {
    if raw.len() != 12 {
        return Err("invalid timetz length".into());
    }
    let time = NaiveTime::from_sql(&Type::TIME, &raw[..8])?;
    let east = -i32::from_sql(&Type::INT4, &raw[8..])?;
    let sign = if east < 0 { '-' } else { '+' };
    let offset = east.unsigned_abs();

    Ok(format!(
        "{}{}{:02}:{:02}",
        time,
        sign,
        offset / 3600,
        offset % 3600 / 60
    ))
}

/// Interval text accepted back by the server, e.g. `14 mons 3 days 04:05:06.500000`.
fn interval_text(raw: &[u8]) -> Result<String, DecodeError> {
    if raw.len() != 16 {
        return Err("invalid interval length".into());
    }
    let micros = i64::from_sql(&Type::INT8, &raw[..8])?;
    let days = i32::from_sql(&Type::INT4, &raw[8..12])?;
    let months = i32::from_sql(&Type::INT4, &raw[12..])?;

    let sign = if micros < 0 { "-" } else { "" };
    let total = micros.unsigned_abs();
    let secs = total / 1_000_000;
    let mut text = format!(
        "{} mons {} days {}{:02}:{:02}:{:02}",
        months,
        days,
        sign,
        secs / 3600,
        secs / 60 % 60,
        secs % 60
    );
    if total % 1_000_000 != 0 {
        text.push_str(&format!(".{:06}", total % 1_000_000));
    }
    Ok(text)
}

fn take_i32(reader: &mut &[u8]) -> Result<i32, DecodeError> {
    if reader.len() < 4 {
        return Err("truncated array".into());
    }
    let (head, rest) = reader.split_at(4);
    *reader = rest;
    Ok(i32::from_sql(&Type::INT4, head)?)
}

/// Array literal text (`{"a",NULL,"b"}`) with every element decoded by its
/// own type. Multi-dimensional arrays nest braces per dimension.
fn array_text(member: &Type, raw: &[u8]) -> Result<String, DecodeError> {
    let mut reader = raw;
    let ndim = take_i32(&mut reader)?;
    let _has_nulls = take_i32(&mut reader)?;
    let _element_oid = take_i32(&mut reader)?;

    if !(0..=6).contains(&ndim) {
        return Err(format!("invalid array dimension count {}", ndim).into());
    }
    if ndim == 0 {
        return Ok("{}".to_string());
    }

    let mut dims = Vec::with_capacity(ndim as usize);
    for _ in 0..ndim {
        let len = take_i32(&mut reader)?;
        let _lower_bound = take_i32(&mut reader)?;
        dims.push(usize::try_from(len).map_err(|_| "negative array dimension")?);
    }

    let mut out = String::new();
    write_array_level(member, &dims, &mut reader, &mut out)?;
    if !reader.is_empty() {
        return Err("trailing bytes after array elements".into());
    }
    Ok(out)
}

fn write_array_level(
    member: &Type,
    dims: &[usize],
    reader: &mut &[u8],
    out: &mut String,
) -> Result<(), DecodeError> {
    out.push('{');
    for i in 0..dims[0] {
        if i > 0 {
            out.push(',');
        }
        if dims.len() > 1 {
            write_array_level(member, &dims[1..], reader, out)?;
            continue;
        }

        let cell = match usize::try_from(take_i32(reader)?) {
            Err(_) => CellValue::Null,
            Ok(len) if len <= reader.len() => {
                let (element, rest) = reader.split_at(len);
                *reader = rest;
                CellValue::from_sql(member, element)?
            }
            Ok(_) => return Err("truncated array element".into()),
        };
        out.push_str(&cell.array_element());
    }
    out.push('}');
    Ok(())
}

impl<'a> FromSql<'a> for CellValue {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, DecodeError> {
        let value = match *ty {
            Type::BOOL => CellValue::Bool(bool::from_sql(ty, raw)?),
            Type::INT2 => CellValue::Other(i16::from_sql(ty, raw)?.to_string()),
            Type::INT4 => CellValue::Other(i32::from_sql(ty, raw)?.to_string()),
            Type::INT8 => CellValue::Other(i64::from_sql(ty, raw)?.to_string()),
            Type::OID => CellValue::Other(u32::from_sql(ty, raw)?.to_string()),
            Type::FLOAT4 => {
                let value = f32::from_sql(ty, raw)?;
                if value.is_finite() {
                    CellValue::Other(value.to_string())
                } else {
                    CellValue::Other(float_text(f64::from(value)))
                }
            }
            Type::FLOAT8 => CellValue::Other(float_text(f64::from_sql(ty, raw)?)),
            Type::NUMERIC => CellValue::Other(numeric_to_string(raw)?),
            Type::TEXT
            | Type::VARCHAR
            | Type::BPCHAR
            | Type::NAME
            | Type::UNKNOWN
            | Type::CHAR
            | Type::XML => CellValue::Bytes(raw.to_vec()),
            Type::JSON => CellValue::Bytes(raw.to_vec()),
            Type::JSONB => match raw.split_first() {
                Some((&1, body)) => CellValue::Bytes(body.to_vec()),
                _ => return Err("unsupported jsonb wire version".into()),
            },
            Type::BYTEA => CellValue::Bytes(bytea_hex(raw).into_bytes()),
            Type::UUID => CellValue::Other(Uuid::from_sql(ty, raw)?.to_string()),
            Type::INET | Type::CIDR => CellValue::Other(inet_text(raw)?),
            Type::TIME => CellValue::Other(NaiveTime::from_sql(ty, raw)?.to_string()),
            Type::TIMETZ => CellValue::Other(timetz_text(raw)?),
            Type::INTERVAL => CellValue::Other(interval_text(raw)?),
            Type::TIMESTAMPTZ => match timestamp_infinity(raw) {
                Some(sentinel) => CellValue::Other(sentinel.to_string()),
                None => CellValue::Timestamp(DateTime::<Utc>::from_sql(ty, raw)?),
            },
            Type::TIMESTAMP => match timestamp_infinity(raw) {
                Some(sentinel) => CellValue::Other(sentinel.to_string()),
                None => CellValue::Timestamp(NaiveDateTime::from_sql(ty, raw)?.and_utc()),
            },
            Type::DATE => match date_infinity(raw) {
                Some(sentinel) => CellValue::Other(sentinel.to_string()),
                None => {
                    let date = NaiveDate::from_sql(ty, raw)?;
                    CellValue::Timestamp(date.and_time(NaiveTime::MIN).and_utc())
                }
            },
            _ => match ty.kind() {
                Kind::Enum(_) => CellValue::Bytes(raw.to_vec()),
                Kind::Array(member) => CellValue::Other(array_text(member, raw)?),
                Kind::Domain(base) => return CellValue::from_sql(base, raw),
                _ if ty.name() == "citext" => CellValue::Bytes(raw.to_vec()),
                // Binary wire format with no decoder here
                _ => return Err(format!("unsupported column type {}", ty.name()).into()),
            },
        };

        Ok(value)
    }

    fn from_sql_null(_ty: &Type) -> Result<Self, DecodeError> {
        Ok(CellValue::Null)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}
