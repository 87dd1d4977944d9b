use std::fmt;

use bytes::Bytes;

/// What a successful match produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// A single unit, from a character class.
    Byte(u8),
    /// A literal, or a run of units collected by a scan.
    Bytes(Bytes),
    /// Sequences and repetitions.
    List(Vec<Value>),
}

impl Value {
    pub fn as_byte(&self) -> Option<u8> {
        match self {
            Value::Byte(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn into_list(self) -> Option<Vec<Value>> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Concatenates every unit reachable from this value, in order.
    pub fn flatten(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(&self, out: &mut Vec<u8>) {
        match self {
            Value::Byte(b) => out.push(*b),
            Value::Bytes(b) => out.extend_from_slice(b),
            Value::List(items) => items.iter().for_each(|item| item.flatten_into(out)),
        }
    }
}

/// The empty list.
impl Default for Value {
    fn default() -> Self {
        Value::List(Vec::new())
    }
}

impl From<u8> for Value {
    fn from(b: u8) -> Self {
        Value::Byte(b)
    }
}

impl From<&'static str> for Value {
    fn from(s: &'static str) -> Self {
        Value::Bytes(Bytes::from_static(s.as_bytes()))
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::Bytes(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Byte(b) => write!(f, "'{}'", b.escape_ascii()),
            Value::Bytes(b) => write!(f, "\"{}\"", b.escape_ascii()),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_escapes_units() {
        let v = Value::List(vec![Value::from("a\"b"), Value::Byte(b'\n'), Value::default()]);
        assert_eq!(v.to_string(), "[\"a\\\"b\", '\\n', []]");
    }

    #[test]
    fn flatten_walks_nested_lists() {
        let v = Value::List(vec![
            Value::from("%"),
            Value::List(vec![Value::Byte(b'2'), Value::Byte(b'0')]),
        ]);
        assert_eq!(v.flatten(), b"%20".to_vec());
    }
}
