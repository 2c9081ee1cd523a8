//! Reply values handed back by the store collaborator.
//!
//! The router never touches the wire format itself; the collaborator decodes
//! replies into this shape. It covers the reply types the routing layer needs
//! to interpret: status strings, binary-safe bulks, integers, and nested
//! arrays (as returned by the slot-ownership query).

use bytes::Bytes;

/// A decoded reply from the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Status reply ("OK", "PONG").
    Simple(String),
    /// Binary-safe bulk reply; `None` is a missing value.
    Bulk(Option<Bytes>),
    /// Integer reply.
    Int(i64),
    /// Array reply, possibly nested.
    Array(Vec<Value>),
    /// Explicit null reply.
    Null,
}

impl Value {
    /// Borrows the reply as UTF-8 text, for Simple and Bulk replies.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Simple(s) => Some(s),
            Value::Bulk(Some(data)) => std::str::from_utf8(data).ok(),
            _ => None,
        }
    }

    /// Returns the integer payload, if this is an Int reply.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Borrows the elements, if this is an Array reply.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the bulk payload, if this is a Bulk reply.
    pub fn as_bulk(&self) -> Option<&Bytes> {
        match self {
            Value::Bulk(Some(data)) => Some(data),
            _ => None,
        }
    }

    /// Returns true for Null and missing-bulk replies.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null | Value::Bulk(None))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Simple(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<Bytes> for Value {
    fn from(data: Bytes) -> Self {
        Value::Bulk(Some(data))
    }
}
