//! The closed scalar set cacheable row values are restricted to.
//!
//! Anything the underlying driver returns outside this set makes the row
//! uncacheable for that query; the rows themselves are still handed back
//! to the caller, just never stored.

use serde::{Deserialize, Serialize};

/// One cacheable cell value.
///
/// Strings and byte buffers are always copied on insertion so a cached row
/// never shares a mutable buffer with driver output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int64(i64),
    UInt64(u64),
    Float64(f64),
    Text(String),
    Bytes(Vec<u8>),
    Bool(bool),
    Time(chrono::NaiveDateTime),
    Null,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int64(_) => "int64",
            Value::UInt64(_) => "uint64",
            Value::Float64(_) => "float64",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Bool(_) => "bool",
            Value::Time(_) => "time",
            Value::Null => "null",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            Value::UInt64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Serialize this value into `buf`, appended with the zero-byte
    /// delimiter used by cache keys. Strings and byte slices are written
    /// verbatim; every other scalar uses its standard decimal form.
    pub fn write_key_bytes(&self, buf: &mut Vec<u8>) {
        match self {
            Value::Int64(v) => buf.extend_from_slice(v.to_string().as_bytes()),
            Value::UInt64(v) => buf.extend_from_slice(v.to_string().as_bytes()),
            Value::Float64(v) => buf.extend_from_slice(v.to_string().as_bytes()),
            Value::Text(s) => buf.extend_from_slice(s.as_bytes()),
            Value::Bytes(b) => buf.extend_from_slice(b),
            Value::Bool(b) => buf.extend_from_slice(if *b { b"true" } else { b"false" }),
            Value::Time(t) => buf.extend_from_slice(t.to_string().as_bytes()),
            Value::Null => {}
        }
        buf.push(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names() {
        assert_eq!(Value::Int64(1).type_name(), "int64");
        assert_eq!(Value::Null.type_name(), "null");
        assert_eq!(Value::Bytes(vec![1, 2]).type_name(), "bytes");
    }

    #[test]
    fn key_bytes_use_zero_delimiter() {
        let mut a = Vec::new();
        Value::Text("a".into()).write_key_bytes(&mut a);
        Value::Text("b".into()).write_key_bytes(&mut a);

        let mut b = Vec::new();
        Value::Text("ab".into()).write_key_bytes(&mut b);
        Value::Text("".into()).write_key_bytes(&mut b);

        assert_ne!(a, b);
    }
}
