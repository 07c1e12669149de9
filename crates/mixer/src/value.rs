use bytes::Bytes;
use core::{fmt, time::Duration};
use std::{collections::BTreeMap, sync::Arc, time::SystemTime};

/// A string-to-string map attribute, shared between bags without copying.
pub type StringMap = Arc<BTreeMap<String, String>>;

/// A single typed attribute value.
///
/// The set of variants is closed and mirrors the typed maps of the wire
/// format one-to-one. Payload-carrying variants are reference counted, so
/// cloning a [`Value`] out of a bag never copies string, byte or map data.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    String(Arc<str>),
    Int64(i64),
    Double(f64),
    Bool(bool),
    Timestamp(SystemTime),
    Duration(Duration),
    Bytes(Bytes),
    StringMap(StringMap),
}

/// The kind of a [`Value`], without its payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    String,
    Int64,
    Double,
    Bool,
    Timestamp,
    Duration,
    Bytes,
    StringMap,
}

impl Value {
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::String(_) => ValueKind::String,
            Self::Int64(_) => ValueKind::Int64,
            Self::Double(_) => ValueKind::Double,
            Self::Bool(_) => ValueKind::Bool,
            Self::Timestamp(_) => ValueKind::Timestamp,
            Self::Duration(_) => ValueKind::Duration,
            Self::Bytes(_) => ValueKind::Bytes,
            Self::StringMap(_) => ValueKind::StringMap,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_timestamp(&self) -> Option<SystemTime> {
        match self {
            Self::Timestamp(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_duration(&self) -> Option<Duration> {
        match self {
            Self::Duration(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_string_map(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Self::StringMap(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Int64 => "int64",
            Self::Double => "double",
            Self::Bool => "bool",
            Self::Timestamp => "timestamp",
            Self::Duration => "duration",
            Self::Bytes => "bytes",
            Self::StringMap => "string map",
        };
        f.write_str(name)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(Arc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(Arc::from(value))
    }
}

impl From<Arc<str>> for Value {
    fn from(value: Arc<str>) -> Self {
        Self::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<SystemTime> for Value {
    fn from(value: SystemTime) -> Self {
        Self::Timestamp(value)
    }
}

impl From<Duration> for Value {
    fn from(value: Duration) -> Self {
        Self::Duration(value)
    }
}

impl From<Bytes> for Value {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(value))
    }
}

impl From<BTreeMap<String, String>> for Value {
    fn from(value: BTreeMap<String, String>) -> Self {
        Self::StringMap(Arc::new(value))
    }
}

impl From<StringMap> for Value {
    fn from(value: StringMap) -> Self {
        Self::StringMap(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_payloads() {
        let v = Value::from("alice");
        let w = v.clone();
        match (&v, &w) {
            (Value::String(a), Value::String(b)) => assert!(Arc::ptr_eq(a, b)),
            _ => panic!("expected strings"),
        }
    }

    #[test]
    fn accessors_match_kind() {
        assert_eq!(Value::from(42_i64).as_i64(), Some(42));
        assert_eq!(Value::from(42_i64).as_str(), None);
        assert_eq!(Value::from(true).kind(), ValueKind::Bool);
        assert_eq!(Value::from(vec![1_u8, 2]).as_bytes().map(|b| b.len()), Some(2));
        assert_eq!(ValueKind::StringMap.to_string(), "string map");
    }

    #[test]
    fn equality_is_by_value() {
        let mut m1 = BTreeMap::new();
        m1.insert("k".to_string(), "v".to_string());
        let m2 = m1.clone();
        assert_eq!(Value::from(m1), Value::from(m2));
        assert_ne!(Value::from(1.0_f64), Value::from(2.0_f64));
        assert_ne!(Value::from("1"), Value::from(1_i64));
    }
}
