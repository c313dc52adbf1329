//! Record format: varints, serial types and column values.

use super::SqliteError;

type Result<T> = std::result::Result<T, SqliteError>;

/// Column value decoded from a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
        }
    }
}

/// Read a SQLite varint at `pos`, returning the value and its length.
pub fn read_varint(buf: &[u8], pos: usize) -> Result<(u64, usize)> {
    let mut value: u64 = 0;
    for i in 0..9 {
        let byte = *buf
            .get(pos + i)
            .ok_or_else(|| SqliteError::CorruptRecord("varint runs past end of buffer".into()))?;
        if i == 8 {
            value = (value << 8) | u64::from(byte);
            return Ok((value, 9));
        }
        value = (value << 7) | u64::from(byte & 0x7f);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    unreachable!("varint loop returns by the ninth byte")
}

/// Decode a complete record payload into its values.
pub fn decode_record(payload: &[u8]) -> Result<Vec<Value>> {
    let (header_len, mut pos) = read_varint(payload, 0)?;
    let header_len = usize::try_from(header_len)
        .ok()
        .filter(|&n| n >= pos && n <= payload.len())
        .ok_or_else(|| SqliteError::CorruptRecord(format!("record header length {}", header_len)))?;

    let mut serial_types = Vec::new();
    while pos < header_len {
        let (serial, len) = read_varint(payload, pos)?;
        serial_types.push(serial);
        pos += len;
    }
    if pos != header_len {
        return Err(SqliteError::CorruptRecord("record header overruns its length".into()));
    }

    let mut body = header_len;
    let mut values = Vec::with_capacity(serial_types.len());
    for serial in serial_types {
        let size = content_size(serial)?;
        let bytes = payload
            .get(body..body + size)
            .ok_or_else(|| SqliteError::CorruptRecord("record body truncated".into()))?;
        values.push(decode_value(serial, bytes));
        body += size;
    }
    Ok(values)
}

fn content_size(serial: u64) -> Result<usize> {
    let size = match serial {
        0 | 8 | 9 => 0,
        1 => 1,
        2 => 2,
        3 => 3,
        4 => 4,
        5 => 6,
        6 | 7 => 8,
        10 | 11 => {
            return Err(SqliteError::CorruptRecord(format!(
                "reserved serial type {}",
                serial
            )))
        }
        n if n % 2 == 0 => (n - 12) / 2,
        n => (n - 13) / 2,
    };
    usize::try_from(size).map_err(|_| SqliteError::CorruptRecord("oversized value".into()))
}

fn decode_value(serial: u64, bytes: &[u8]) -> Value {
    match serial {
        0 => Value::Null,
        1..=6 => Value::Integer(read_int(bytes)),
        7 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(bytes);
            Value::Real(f64::from_be_bytes(raw))
        }
        8 => Value::Integer(0),
        9 => Value::Integer(1),
        n if n % 2 == 0 => Value::Blob(bytes.to_vec()),
        _ => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
    }
}

/// Big-endian two's complement integer of 1 to 8 bytes.
fn read_int(bytes: &[u8]) -> i64 {
    let mut value: i64 = if bytes.first().is_some_and(|b| b & 0x80 != 0) {
        -1
    } else {
        0
    };
    for &b in bytes {
        value = (value << 8) | i64::from(b);
    }
    value
}
