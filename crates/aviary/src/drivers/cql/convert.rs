//! Conversion between [`KeyValue`] and driver values by declared CQL type.

use chrono::{Duration as ChronoDuration, NaiveDate};
use scylla::frame::response::result::CqlValue;
use scylla::frame::value::{
    Counter, CqlDate, CqlDecimal, CqlDuration, CqlTime, CqlTimestamp, CqlTimeuuid, CqlVarint,
};
use std::net::IpAddr;
use uuid::Uuid;

use crate::core::KeyValue;
use crate::error::{AviaryError, Result};

/// `CqlDate` counts days with the epoch at 2^31.
const DATE_EPOCH_OFFSET: i64 = 1 << 31;

fn unix_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

fn mismatch(value: &KeyValue, cql_type: &str) -> AviaryError {
    AviaryError::conversion(
        "bind value",
        format!("cannot bind {} as {}", value, cql_type),
    )
}

/// Bind a canary value as a column of type `cql_type`.
pub(super) fn to_cql(value: &KeyValue, cql_type: &str) -> Result<CqlValue> {
    let err = || mismatch(value, cql_type);
    let int = |v: &KeyValue| v.as_i64().ok_or_else(err);
    let text = |v: &KeyValue| v.as_str().map(str::to_string).ok_or_else(err);

    let cql = match cql_type.to_ascii_lowercase().as_str() {
        "ascii" => CqlValue::Ascii(text(value)?),
        "text" | "varchar" => CqlValue::Text(text(value)?),
        "boolean" => match value {
            KeyValue::Bool(b) => CqlValue::Boolean(*b),
            _ => return Err(err()),
        },
        "tinyint" => CqlValue::TinyInt(i8::try_from(int(value)?).map_err(|_| err())?),
        "smallint" => CqlValue::SmallInt(i16::try_from(int(value)?).map_err(|_| err())?),
        "int" => CqlValue::Int(i32::try_from(int(value)?).map_err(|_| err())?),
        "bigint" => CqlValue::BigInt(int(value)?),
        "counter" => CqlValue::Counter(Counter(int(value)?)),
        "float" | "double" => {
            let v = match value {
                KeyValue::Float(f) => *f,
                KeyValue::Int(i) => *i as f64,
                _ => return Err(err()),
            };
            if cql_type.eq_ignore_ascii_case("float") {
                CqlValue::Float(v as f32)
            } else {
                CqlValue::Double(v)
            }
        }
        "uuid" => CqlValue::Uuid(Uuid::parse_str(&text(value)?).map_err(|_| err())?),
        "timeuuid" => CqlValue::Timeuuid(CqlTimeuuid::from(
            Uuid::parse_str(&text(value)?).map_err(|_| err())?,
        )),
        "inet" => CqlValue::Inet(text(value)?.parse::<IpAddr>().map_err(|_| err())?),
        "timestamp" => CqlValue::Timestamp(CqlTimestamp(int(value)?)),
        "time" => CqlValue::Time(CqlTime(int(value)?)),
        "date" => {
            let date = NaiveDate::parse_from_str(&text(value)?, "%Y-%m-%d").map_err(|_| err())?;
            let days = (date - unix_epoch()).num_days() + DATE_EPOCH_OFFSET;
            CqlValue::Date(CqlDate(u32::try_from(days).map_err(|_| err())?))
        }
        "blob" => CqlValue::Blob(decode_hex(&text(value)?).ok_or_else(err)?),
        "varint" => {
            let bytes = match value {
                KeyValue::Int(i) => minimize(i.to_be_bytes().to_vec()),
                KeyValue::Text(s) => decimal_to_signed_be(s).ok_or_else(err)?,
                _ => return Err(err()),
            };
            CqlValue::Varint(CqlVarint::from_signed_bytes_be(bytes))
        }
        "decimal" => {
            let (bytes, scale) = match value {
                KeyValue::Int(i) => (minimize(i.to_be_bytes().to_vec()), 0),
                KeyValue::Text(s) => parse_decimal(s).ok_or_else(err)?,
                _ => return Err(err()),
            };
            CqlValue::Decimal(CqlDecimal::from_signed_be_bytes_and_exponent(bytes, scale))
        }
        "duration" => CqlValue::Duration(parse_duration(&text(value)?).ok_or_else(err)?),
        other => {
            return Err(AviaryError::conversion(
                "bind value",
                format!("unsupported primary key type {}", other),
            ))
        }
    };
    Ok(cql)
}

/// Read a key column value returned by the driver.
pub(super) fn from_cql(value: CqlValue) -> Result<KeyValue> {
    let key = match value {
        CqlValue::Ascii(s) | CqlValue::Text(s) => KeyValue::Text(s),
        CqlValue::Boolean(b) => KeyValue::Bool(b),
        CqlValue::TinyInt(v) => KeyValue::Int(v.into()),
        CqlValue::SmallInt(v) => KeyValue::Int(v.into()),
        CqlValue::Int(v) => KeyValue::Int(v.into()),
        CqlValue::BigInt(v) => KeyValue::Int(v),
        CqlValue::Counter(c) => KeyValue::Int(c.0),
        CqlValue::Float(v) => KeyValue::Float(v.into()),
        CqlValue::Double(v) => KeyValue::Float(v),
        CqlValue::Uuid(u) => KeyValue::Text(u.to_string()),
        CqlValue::Timeuuid(t) => KeyValue::Text(t.to_string()),
        CqlValue::Inet(ip) => KeyValue::Text(ip.to_string()),
        CqlValue::Timestamp(t) => KeyValue::Int(t.0),
        CqlValue::Time(t) => KeyValue::Int(t.0),
        CqlValue::Date(d) => {
            let date = unix_epoch() + ChronoDuration::days(i64::from(d.0) - DATE_EPOCH_OFFSET);
            KeyValue::Text(date.format("%Y-%m-%d").to_string())
        }
        CqlValue::Blob(bytes) => KeyValue::Text(encode_hex(&bytes)),
        CqlValue::Varint(v) => {
            let bytes = v.as_signed_bytes_be_slice();
            match signed_be_to_i64(bytes) {
                Some(i) => KeyValue::Int(i),
                None => KeyValue::Text(signed_be_to_decimal(bytes)),
            }
        }
        CqlValue::Decimal(d) => {
            let (bytes, scale) = d.as_signed_be_bytes_slice_and_exponent();
            KeyValue::Text(decimal_text(bytes, scale))
        }
        CqlValue::Duration(d) => {
            KeyValue::Text(format!("{}mo{}d{}ns", d.months, d.days, d.nanoseconds))
        }
        CqlValue::Empty => KeyValue::Null,
        other => {
            return Err(AviaryError::conversion(
                "result row",
                format!("unsupported primary key value {:?}", other),
            ))
        }
    };
    Ok(key)
}

/// Drop leading bytes that only repeat the sign.
fn minimize(mut bytes: Vec<u8>) -> Vec<u8> {
    let mut start = 0;
    while start + 1 < bytes.len() {
        let (head, next) = (bytes[start], bytes[start + 1]);
        if (head == 0x00 && next & 0x80 == 0) || (head == 0xff && next & 0x80 != 0) {
            start += 1;
        } else {
            break;
        }
    }
    bytes.drain(..start);
    bytes
}

/// Two's complement negation in place.
fn negate(bytes: &mut [u8]) {
    for b in bytes.iter_mut() {
        *b = !*b;
    }
    for b in bytes.iter_mut().rev() {
        let (sum, carry) = b.overflowing_add(1);
        *b = sum;
        if !carry {
            break;
        }
    }
}

fn signed_be_to_i64(bytes: &[u8]) -> Option<i64> {
    if bytes.len() > 8 {
        return None;
    }
    let fill = match bytes.first() {
        Some(b) if b & 0x80 != 0 => 0xff,
        _ => 0x00,
    };
    let mut buf = [fill; 8];
    buf[8 - bytes.len()..].copy_from_slice(bytes);
    Some(i64::from_be_bytes(buf))
}

fn signed_be_to_decimal(bytes: &[u8]) -> String {
    if let Some(i) = signed_be_to_i64(bytes) {
        return i.to_string();
    }
    let negative = bytes.first().is_some_and(|b| b & 0x80 != 0);
    let mut magnitude = bytes.to_vec();
    if negative {
        negate(&mut magnitude);
    }

    let mut digits = Vec::new();
    while magnitude.iter().any(|&b| b != 0) {
        let mut rem = 0u32;
        for b in magnitude.iter_mut() {
            let cur = (rem << 8) | u32::from(*b);
            *b = (cur / 10) as u8;
            rem = cur % 10;
        }
        digits.push(b'0' + rem as u8);
    }
    if negative {
        digits.push(b'-');
    }
    digits.iter().rev().map(|&d| char::from(d)).collect()
}

fn decimal_to_signed_be(text: &str) -> Option<Vec<u8>> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    if digits.is_empty() || !digits.bytes().all(|d| d.is_ascii_digit()) {
        return None;
    }

    let mut magnitude = vec![0u8];
    for d in digits.bytes() {
        let mut carry = u32::from(d - b'0');
        for b in magnitude.iter_mut().rev() {
            let cur = u32::from(*b) * 10 + carry;
            *b = cur as u8;
            carry = cur >> 8;
        }
        while carry > 0 {
            magnitude.insert(0, carry as u8);
            carry >>= 8;
        }
    }
    magnitude.insert(0, 0);
    if negative {
        negate(&mut magnitude);
    }
    Some(minimize(magnitude))
}

/// Plain notation for non-negative scales, `unscaledEexp` otherwise.
fn decimal_text(unscaled: &[u8], scale: i32) -> String {
    let unscaled = signed_be_to_decimal(unscaled);
    if scale == 0 {
        return unscaled;
    }
    if scale < 0 {
        return format!("{}E{}", unscaled, -i64::from(scale));
    }

    let (sign, digits) = match unscaled.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", unscaled.as_str()),
    };
    let scale = scale as usize;
    let padded = format!("{:0>width$}", digits, width = scale + 1);
    let (int, frac) = padded.split_at(padded.len() - scale);
    format!("{}{}.{}", sign, int, frac)
}

fn parse_decimal(text: &str) -> Option<(Vec<u8>, i32)> {
    let (mantissa, exponent) = match text.split_once(|c: char| c == 'e' || c == 'E') {
        Some((m, e)) => (m, e.parse::<i32>().ok()?),
        None => (text, 0),
    };
    let (int, frac) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let scale = i32::try_from(frac.len()).ok()?.checked_sub(exponent)?;
    let unscaled = decimal_to_signed_be(&format!("{}{}", int, frac))?;
    Some((unscaled, scale))
}

/// Parses the `{months}mo{days}d{nanos}ns` form produced when reading.
fn parse_duration(text: &str) -> Option<CqlDuration> {
    let (months, rest) = text.split_once("mo")?;
    let (days, rest) = rest.split_once('d')?;
    let nanoseconds = rest.strip_suffix("ns")?;
    Some(CqlDuration {
        months: months.parse().ok()?,
        days: days.parse().ok()?,
        nanoseconds: nanoseconds.parse().ok()?,
    })
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("0x");
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

fn decode_hex(text: &str) -> Option<Vec<u8>> {
    let digits = text.strip_prefix("0x").unwrap_or(text);
    if digits.len() % 2 != 0 {
        return None;
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(digits.get(i..i + 2)?, 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_widths() {
        assert_eq!(to_cql(&KeyValue::Int(5), "int").unwrap(), CqlValue::Int(5));
        assert!(to_cql(&KeyValue::Int(1 << 40), "int").is_err());
        assert_eq!(from_cql(CqlValue::SmallInt(-3)).unwrap(), KeyValue::Int(-3));
    }

    #[test]
    fn test_text_backed_types() {
        let id = "6f1c5b44-5a6d-4a3e-9d52-0d9a3f0e2c11";
        let cql = to_cql(&KeyValue::from(id), "uuid").unwrap();
        assert_eq!(from_cql(cql).unwrap(), KeyValue::from(id));

        let cql = to_cql(&KeyValue::from("2024-02-29"), "date").unwrap();
        assert_eq!(from_cql(cql).unwrap(), KeyValue::from("2024-02-29"));

        let cql = to_cql(&KeyValue::from("0xdeadbeef"), "blob").unwrap();
        assert_eq!(cql, CqlValue::Blob(vec![0xde, 0xad, 0xbe, 0xef]));
        assert_eq!(from_cql(cql).unwrap(), KeyValue::from("0xdeadbeef"));
    }

    #[test]
    fn test_type_mismatch_and_unsupported() {
        assert!(to_cql(&KeyValue::from("x"), "bigint").is_err());
        assert!(to_cql(&KeyValue::Int(1), "frozen<list<int>>").is_err());

        let err = from_cql(CqlValue::Tuple(vec![Some(CqlValue::Int(1))])).unwrap_err();
        assert!(matches!(err, AviaryError::Conversion { .. }));
        assert!(!err.is_transient());
        assert!(!to_cql(&KeyValue::from("x"), "int").unwrap_err().is_transient());
    }

    fn varint_bytes(cql: CqlValue) -> Vec<u8> {
        match cql {
            CqlValue::Varint(v) => v.as_signed_bytes_be_slice().to_vec(),
            other => panic!("expected varint, got {:?}", other),
        }
    }

    #[test]
    fn test_varint_fits_int_or_falls_back_to_text() {
        let small = CqlValue::Varint(CqlVarint::from_signed_bytes_be(vec![0x01, 0x00]));
        assert_eq!(from_cql(small).unwrap(), KeyValue::Int(256));
        assert_eq!(varint_bytes(to_cql(&KeyValue::Int(-129), "varint").unwrap()), vec![0xff, 0x7f]);

        let big = vec![0x01, 0, 0, 0, 0, 0, 0, 0, 0];
        let value = from_cql(CqlValue::Varint(CqlVarint::from_signed_bytes_be(big.clone()))).unwrap();
        assert_eq!(value, KeyValue::from("18446744073709551616"));
        assert_eq!(varint_bytes(to_cql(&value, "varint").unwrap()), big);

        let negative = [vec![0xfe], vec![0xff; 8]].concat();
        let value =
            from_cql(CqlValue::Varint(CqlVarint::from_signed_bytes_be(negative.clone()))).unwrap();
        assert_eq!(value, KeyValue::from("-18446744073709551617"));
        assert_eq!(varint_bytes(to_cql(&value, "varint").unwrap()), negative);
    }

    #[test]
    fn test_decimal_as_text() {
        let cql = CqlValue::Decimal(CqlDecimal::from_signed_be_bytes_and_exponent(vec![0x30, 0x39], 2));
        let value = from_cql(cql).unwrap();
        assert_eq!(value, KeyValue::from("123.45"));

        match to_cql(&value, "decimal").unwrap() {
            CqlValue::Decimal(d) => {
                let (bytes, scale) = d.as_signed_be_bytes_slice_and_exponent();
                assert_eq!((bytes, scale), (&[0x30u8, 0x39][..], 2));
            }
            other => panic!("expected decimal, got {:?}", other),
        }

        let cql = CqlValue::Decimal(CqlDecimal::from_signed_be_bytes_and_exponent(vec![0xfb], 2));
        assert_eq!(from_cql(cql).unwrap(), KeyValue::from("-0.05"));
        let cql = CqlValue::Decimal(CqlDecimal::from_signed_be_bytes_and_exponent(vec![0x07], -3));
        assert_eq!(from_cql(cql).unwrap(), KeyValue::from("7E3"));
        assert_eq!(parse_decimal("7E3"), Some((vec![0x07], -3)));
        assert!(to_cql(&KeyValue::from("1.2.3"), "decimal").is_err());
    }

    #[test]
    fn test_duration_as_text() {
        let duration = || CqlDuration {
            months: 1,
            days: -2,
            nanoseconds: 3_000,
        };
        let value = from_cql(CqlValue::Duration(duration())).unwrap();
        assert_eq!(value, KeyValue::from("1mo-2d3000ns"));
        assert_eq!(to_cql(&value, "duration").unwrap(), CqlValue::Duration(duration()));
    }
}
