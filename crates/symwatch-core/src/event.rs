use std::{
    fmt::{self, Display},
    time::SystemTime,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Event reported by the kernel instrumentation layer.
///
/// Raw events are loosely typed: besides the [`Header`], every field is a named
/// [`Argument`] whose value representation is only known at runtime. Derivers
/// extract what they need with the typed accessors ([`RawEvent::arg_u64`],
/// [`RawEvent::arg_u32`], [`RawEvent::arg_str`]) and fail with an
/// [`ExtractionError`] when the event doesn't have the expected shape.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub name: String,
    pub header: Header,
    pub args: Vec<Argument>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub image: String,
    pub pid: i32,
    /// Mount namespace of the process at the time of the event.
    pub mount_ns: u32,
    pub timestamp: SystemTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: String,
    pub value: ArgValue,
}

impl Argument {
    pub fn new(name: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Str(String),
}

impl ArgValue {
    /// Name of the underlying representation, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            ArgValue::Int32(_) => "i32",
            ArgValue::UInt32(_) => "u32",
            ArgValue::Int64(_) => "i64",
            ArgValue::UInt64(_) => "u64",
            ArgValue::Str(_) => "string",
        }
    }
}

impl From<i32> for ArgValue {
    fn from(v: i32) -> Self {
        ArgValue::Int32(v)
    }
}

impl From<u32> for ArgValue {
    fn from(v: u32) -> Self {
        ArgValue::UInt32(v)
    }
}

impl From<i64> for ArgValue {
    fn from(v: i64) -> Self {
        ArgValue::Int64(v)
    }
}

impl From<u64> for ArgValue {
    fn from(v: u64) -> Self {
        ArgValue::UInt64(v)
    }
}

impl From<String> for ArgValue {
    fn from(v: String) -> Self {
        ArgValue::Str(v)
    }
}

impl From<&str> for ArgValue {
    fn from(v: &str) -> Self {
        ArgValue::Str(v.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("argument `{name}` not found")]
    MissingArgument { name: String },
    #[error("argument `{name}` is {found}, expected {expected}")]
    MismatchedType {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
}

impl RawEvent {
    /// Returns the argument with the given name.
    pub fn arg(&self, name: &str) -> Result<&ArgValue, ExtractionError> {
        self.args
            .iter()
            .find(|arg| arg.name == name)
            .map(|arg| &arg.value)
            .ok_or_else(|| ExtractionError::MissingArgument {
                name: name.to_string(),
            })
    }

    pub fn arg_u64(&self, name: &str) -> Result<u64, ExtractionError> {
        match self.arg(name)? {
            ArgValue::UInt64(v) => Ok(*v),
            other => Err(mismatched(name, "u64", other)),
        }
    }

    pub fn arg_u32(&self, name: &str) -> Result<u32, ExtractionError> {
        match self.arg(name)? {
            ArgValue::UInt32(v) => Ok(*v),
            other => Err(mismatched(name, "u32", other)),
        }
    }

    pub fn arg_str(&self, name: &str) -> Result<&str, ExtractionError> {
        match self.arg(name)? {
            ArgValue::Str(v) => Ok(v),
            other => Err(mismatched(name, "string", other)),
        }
    }
}

fn mismatched(name: &str, expected: &'static str, found: &ArgValue) -> ExtractionError {
    ExtractionError::MismatchedType {
        name: name.to_string(),
        expected,
        found: found.type_name(),
    }
}

/// Event synthesized by a deriver out of a [`RawEvent`].
///
/// A derived event shares the header of the raw event which caused it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub(crate) header: Header,
    pub(crate) payload: Payload,
}

impl Event {
    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header = self.header();
        let time = DateTime::<Utc>::from(header.timestamp).format("%Y-%m-%dT%TZ");
        let image = &header.image;
        let pid = &header.pid;
        let payload = self.payload();

        if f.alternate() {
            writeln!(
                f,
                "[{time} \x1b[1;30;46mEVENT\x1b[0m {image} ({pid})] {payload}"
            )
        } else {
            writeln!(f, "[{time} EVENT {image} ({pid})] {payload}")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content")]
pub enum Payload {
    /// A shared object exporting at least one watched symbol was loaded.
    SymbolsLoaded {
        library_path: String,
        symbols: Vec<String>,
    },
}

impl Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::SymbolsLoaded {
                library_path,
                symbols,
            } => {
                write!(f, "Symbols Loaded {{ library_path: {library_path}, symbols: ")?;
                print_vec(f, symbols)?;
                write!(f, " }}")
            }
        }
    }
}

fn print_vec<T: Display>(f: &mut fmt::Formatter<'_>, v: &[T]) -> fmt::Result {
    write!(f, "[")?;
    for (i, item) in v.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    write!(f, "]")
}
