//! OSC data model: atomic values, messages, bundles and packets

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

use crate::address::Address;
use crate::codec::tag;
use crate::{Error, Result, TimeTag};

/// An OSC atomic value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// 32-bit two's-complement integer (`i`)
    Int(i32),
    /// IEEE-754 single precision float (`f`)
    Float(f32),
    /// Null-terminated string (`s`)
    String(String),
    /// Length-prefixed byte sequence (`b`)
    Blob(Vec<u8>),
    /// 64-bit NTP time tag (`t`)
    Time(TimeTag),
}

impl Value {
    /// Type tag character for this value
    pub fn type_tag(&self) -> char {
        match self {
            Value::Int(_) => tag::INT,
            Value::Float(_) => tag::FLOAT,
            Value::String(_) => tag::STRING,
            Value::Blob(_) => tag::BLOB,
            Value::Time(_) => tag::TIME,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<TimeTag> {
        match self {
            Value::Time(t) => Some(*t),
            _ => None,
        }
    }

    /// Coerce this value into the type named by `tag`
    pub fn coerce(self, tag: char) -> Result<Value> {
        let mismatch = |found: &Value| Error::TypeMismatch {
            tag,
            found: found.to_string(),
        };

        match (tag, self) {
            (tag::INT, Value::Int(i)) => Ok(Value::Int(i)),
            (tag::INT, Value::Float(f)) => Ok(Value::Int(f.trunc() as i32)),
            (tag::INT, Value::String(s)) => match s.trim().parse::<i32>() {
                Ok(i) => Ok(Value::Int(i)),
                Err(_) => Err(mismatch(&Value::String(s))),
            },
            (tag::FLOAT, Value::Float(f)) => Ok(Value::Float(f)),
            (tag::FLOAT, Value::Int(i)) => Ok(Value::Float(i as f32)),
            (tag::FLOAT, Value::String(s)) => match s.trim().parse::<f32>() {
                Ok(f) => Ok(Value::Float(f)),
                Err(_) => Err(mismatch(&Value::String(s))),
            },
            (tag::STRING, Value::Blob(b)) => Err(mismatch(&Value::Blob(b))),
            (tag::STRING, Value::String(s)) => Ok(Value::String(s)),
            (tag::STRING, other) => Ok(Value::String(other.to_string())),
            (tag::BLOB, Value::Blob(b)) => Ok(Value::Blob(b)),
            (tag::BLOB, Value::String(s)) => Ok(Value::Blob(s.into_bytes())),
            (tag::TIME, Value::Time(t)) => Ok(Value::Time(t)),
            (tag::INT | tag::FLOAT | tag::BLOB | tag::TIME, other) => Err(mismatch(&other)),
            (unknown, _) => Err(Error::UnknownTypeTag(unknown)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{}", s),
            Value::Blob(b) => write!(f, "<blob {} bytes>", b.len()),
            Value::Time(t) => write!(f, "{}", t),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Blob(v.to_vec())
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Blob(v.to_vec())
    }
}

impl From<TimeTag> for Value {
    fn from(v: TimeTag) -> Self {
        Value::Time(v)
    }
}

/// An OSC message: a literal address plus typed arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    address: String,
    args: Vec<Value>,
}

impl Message {
    /// Create a message, inferring each argument's type from its value
    pub fn new(address: impl Into<String>, args: Vec<Value>) -> Result<Self> {
        let address = address.into();
        Address::parse(&address)?;
        Ok(Self { address, args })
    }

    /// Create a message with explicit type tags, coercing each argument.
    ///
    /// A leading `,` in `tags` is optional.
    pub fn with_tags(address: impl Into<String>, tags: &str, args: Vec<Value>) -> Result<Self> {
        let tags = tags.strip_prefix(',').unwrap_or(tags);
        if tags.chars().count() != args.len() {
            return Err(Error::TypeMismatch {
                tag: ',',
                found: format!("{} tags for {} arguments", tags.chars().count(), args.len()),
            });
        }

        let args = tags
            .chars()
            .zip(args)
            .map(|(tag, arg)| arg.coerce(tag))
            .collect::<Result<Vec<_>>>()?;

        Self::new(address, args)
    }

    /// Decoded messages keep whatever `/`-prefixed address arrived on the wire
    pub(crate) fn from_wire(address: String, args: Vec<Value>) -> Self {
        Self { address, args }
    }

    /// Append an argument
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn into_parts(self) -> (String, Vec<Value>) {
        (self.address, self.args)
    }

    /// Type tag string, e.g. `",ifs"`
    pub fn type_tags(&self) -> String {
        std::iter::once(',')
            .chain(self.args.iter().map(Value::type_tag))
            .collect()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.address, self.type_tags())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// A time-tagged collection of messages and nested bundles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub timetag: TimeTag,
    pub contents: Vec<Packet>,
}

impl Bundle {
    pub fn new(timetag: TimeTag, contents: Vec<Packet>) -> Self {
        Self { timetag, contents }
    }

    /// Bundle to be dispatched as soon as it is received
    pub fn immediate(contents: Vec<Packet>) -> Self {
        Self::new(TimeTag::IMMEDIATE, contents)
    }

    /// Bundle due at a wall-clock time
    pub fn at(time: SystemTime, contents: Vec<Packet>) -> Result<Self> {
        Ok(Self::new(TimeTag::try_from(time)?, contents))
    }

    /// Bundle from any input convertible to a time tag
    pub fn try_new<T>(time: T, contents: Vec<Packet>) -> Result<Self>
    where
        T: TryInto<TimeTag>,
        Error: From<T::Error>,
    {
        Ok(Self::new(time.try_into()?, contents))
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Packet> {
        self.contents.iter()
    }
}

impl<'a> IntoIterator for &'a Bundle {
    type Item = &'a Packet;
    type IntoIter = std::slice::Iter<'a, Packet>;

    fn into_iter(self) -> Self::IntoIter {
        self.contents.iter()
    }
}

impl IntoIterator for Bundle {
    type Item = Packet;
    type IntoIter = std::vec::IntoIter<Packet>;

    fn into_iter(self) -> Self::IntoIter {
        self.contents.into_iter()
    }
}

/// The unit of transmission: exactly one message or one bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Packet {
    Message(Message),
    Bundle(Bundle),
}

impl Packet {
    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Packet::Message(m) => Some(m),
            Packet::Bundle(_) => None,
        }
    }

    pub fn as_bundle(&self) -> Option<&Bundle> {
        match self {
            Packet::Bundle(b) => Some(b),
            Packet::Message(_) => None,
        }
    }
}

impl From<Message> for Packet {
    fn from(m: Message) -> Self {
        Packet::Message(m)
    }
}

impl From<Bundle> for Packet {
    fn from(b: Bundle) -> Self {
        Packet::Bundle(b)
    }
}
