use std::collections::HashMap;
use std::time::Duration;

// Value trees nest through lists and maps; cap the depth so a hostile
// message cannot blow the stack.
const MAX_DEPTH: usize = 32;

const TAG_INT: u8 = 1;
const TAG_BOOL: u8 = 2;
const TAG_STR: u8 = 3;
const TAG_BYTES: u8 = 4;
const TAG_DURATION: u8 = 5;
const TAG_LIST: u8 = 6;
const TAG_MAP: u8 = 7;

/// A dynamically typed parameter or response value.
///
/// This is the full set of types the wire format can carry; the command
/// layer narrows them through the coercion helpers.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Str(String),
    Bytes(Vec<u8>),
    /// Nanoseconds.
    Duration(i64),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("message truncated")]
    UnexpectedEof,
    #[error("unknown value tag {0}")]
    BadTag(u8),
    #[error("string is not valid utf-8")]
    BadUtf8,
    #[error("value nesting exceeds limit")]
    TooDeep,
    #[error("declared length exceeds message size")]
    BadLength,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Duration(_) => "duration",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Value::Duration(ns) if *ns >= 0 => Some(Duration::from_nanos(*ns as u64)),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Map(v) => Some(v),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<HashMap<String, Value>> for Value {
    fn from(v: HashMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

/// Little-endian message writer.
pub(crate) struct Encoder {
    pub buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn put_str(&mut self, s: &str) {
        self.put_u32(s.len() as u32);
        self.buf.extend_from_slice(s.as_bytes());
    }

    pub fn put_bytes(&mut self, b: &[u8]) {
        self.put_u32(b.len() as u32);
        self.buf.extend_from_slice(b);
    }

    pub fn put_value(&mut self, value: &Value) {
        match value {
            Value::Int(v) => {
                self.put_u8(TAG_INT);
                self.put_i64(*v);
            }
            Value::Bool(v) => {
                self.put_u8(TAG_BOOL);
                self.put_u8(*v as u8);
            }
            Value::Str(v) => {
                self.put_u8(TAG_STR);
                self.put_str(v);
            }
            Value::Bytes(v) => {
                self.put_u8(TAG_BYTES);
                self.put_bytes(v);
            }
            Value::Duration(ns) => {
                self.put_u8(TAG_DURATION);
                self.put_i64(*ns);
            }
            Value::List(items) => {
                self.put_u8(TAG_LIST);
                self.put_u32(items.len() as u32);
                for item in items {
                    self.put_value(item);
                }
            }
            Value::Map(map) => {
                self.put_u8(TAG_MAP);
                self.put_map(map);
            }
        }
    }

    pub fn put_map(&mut self, map: &HashMap<String, Value>) {
        self.put_u32(map.len() as u32);
        for (key, value) in map {
            self.put_str(key);
            self.put_value(value);
        }
    }
}

/// Little-endian message reader over a fully buffered message body.
pub(crate) struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < len {
            return Err(DecodeError::UnexpectedEof);
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn get_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn get_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn get_i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn get_i64(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn get_raw(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        self.take(len)
    }

    pub fn get_str(&mut self) -> Result<String, DecodeError> {
        let len = self.get_u32()? as usize;
        if len > self.remaining() {
            return Err(DecodeError::BadLength);
        }
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| DecodeError::BadUtf8)
    }

    pub fn get_bytes(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self.get_u32()? as usize;
        if len > self.remaining() {
            return Err(DecodeError::BadLength);
        }
        Ok(self.take(len)?.to_vec())
    }

    pub fn get_value(&mut self) -> Result<Value, DecodeError> {
        self.get_value_at(0)
    }

    fn get_value_at(&mut self, depth: usize) -> Result<Value, DecodeError> {
        if depth > MAX_DEPTH {
            return Err(DecodeError::TooDeep);
        }
        let tag = self.get_u8()?;
        match tag {
            TAG_INT => Ok(Value::Int(self.get_i64()?)),
            TAG_BOOL => Ok(Value::Bool(self.get_u8()? != 0)),
            TAG_STR => Ok(Value::Str(self.get_str()?)),
            TAG_BYTES => Ok(Value::Bytes(self.get_bytes()?)),
            TAG_DURATION => Ok(Value::Duration(self.get_i64()?)),
            TAG_LIST => {
                let count = self.get_u32()? as usize;
                if count > self.remaining() {
                    return Err(DecodeError::BadLength);
                }
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.get_value_at(depth + 1)?);
                }
                Ok(Value::List(items))
            }
            TAG_MAP => Ok(Value::Map(self.get_map_at(depth + 1)?)),
            other => Err(DecodeError::BadTag(other)),
        }
    }

    pub fn get_map(&mut self) -> Result<HashMap<String, Value>, DecodeError> {
        self.get_map_at(0)
    }

    fn get_map_at(&mut self, depth: usize) -> Result<HashMap<String, Value>, DecodeError> {
        let count = self.get_u32()? as usize;
        if count > self.remaining() {
            return Err(DecodeError::BadLength);
        }
        let mut map = HashMap::with_capacity(count);
        for _ in 0..count {
            let key = self.get_str()?;
            let value = self.get_value_at(depth)?;
            map.insert(key, value);
        }
        Ok(map)
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use super::{Decoder, Encoder, Value};

    fn roundtrip(value: Value) -> Value {
        let mut enc = Encoder::new();
        enc.put_value(&value);
        let mut dec = Decoder::new(&enc.buf);
        let out = dec.get_value().expect("decode failed");
        assert_eq!(dec.remaining(), 0);
        out
    }

    #[test]
    fn test_value_roundtrip() {
        let mut map = HashMap::new();
        map.insert("paths".to_string(), Value::List(vec!["/x/f".into()]));
        map.insert("start".to_string(), Value::Int(-1));
        map.insert("clear".to_string(), Value::Bool(true));
        map.insert("payload".to_string(), Value::Bytes(vec![0, 1, 2, 255]));
        map.insert("wait".to_string(), Value::Duration(1_500_000_000));
        let value = Value::Map(map);

        assert_eq!(roundtrip(value.clone()), value);
    }

    #[test]
    fn test_truncated_message() {
        let mut enc = Encoder::new();
        enc.put_value(&Value::Str("hello".into()));
        let mut dec = Decoder::new(&enc.buf[..enc.buf.len() - 2]);
        assert!(dec.get_value().is_err());
    }

    #[test]
    fn test_hostile_length() {
        // claims a 4 GiB string in a 10 byte message
        let buf = [3u8, 0xff, 0xff, 0xff, 0xff, 0, 0, 0, 0, 0];
        let mut dec = Decoder::new(&buf);
        assert!(dec.get_value().is_err());
    }

    #[test]
    fn test_bad_tag() {
        let buf = [99u8, 0, 0];
        let mut dec = Decoder::new(&buf);
        assert!(dec.get_value().is_err());
    }
}
