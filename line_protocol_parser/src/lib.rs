//! This crate contains a pure rust parser for single lines of InfluxDB
//! Line Protocol <https://docs.influxdata.com/influxdb/v2.0/reference/syntax/line-protocol/>
//!
//! A line is scanned once, left to right, with an explicit cursor. Each
//! section (measurement, tag set, field set, timestamp) is ended by the
//! unescaped delimiter that announces the next one, so the scanner never
//! backtracks. Field values are then coerced into one of the line protocol
//! data types.
//!
//! Unlike a full line protocol reader, only the first line of the input is
//! consumed: everything after the first unescaped newline is ignored.

use indexmap::IndexMap;
use serde::Serialize;
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use std::any::Any;
use tracing::debug;

#[cfg(feature = "python")]
pub mod python;
mod scan;
mod value;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Line is empty string"))]
    EmptyInput,

    #[snafu(display("Line is not valid UTF-8: {source}"))]
    InvalidUtf8 { source: std::str::Utf8Error },

    #[snafu(display("Failed to parse measurement of line '{line}'"))]
    MissingMeasurement { line: String },

    #[snafu(display("Failed to parse key of tag starting at byte {position}"))]
    MissingTagKey { position: usize },

    #[snafu(display("Failed to parse value of tag '{key}'"))]
    MissingTagValue { key: String },

    #[snafu(display("Failed to parse key of field starting at byte {position}"))]
    MissingFieldKey { position: usize },

    #[snafu(display("Failed to parse value of field '{key}'"))]
    MissingFieldValue { key: String },

    #[snafu(display("Failed to parse type of field value '{value}'"))]
    UnrecognizedFieldValueType { value: String },

    #[snafu(display("Failed to parse type of field value '{value}': {source}"))]
    IntegerOutOfRange {
        source: std::num::ParseIntError,
        value: String,
    },

    #[snafu(display("Failed to parse type of field value '{value}': float out of range"))]
    FloatOutOfRange { value: String },

    #[snafu(display("Failed to parse nanoseconds integer timestamp '{value}'"))]
    InvalidTimestamp { value: String },

    #[snafu(display("Failed to parse nanoseconds integer timestamp '{value}': {source}"))]
    TimestampOutOfRange {
        source: std::num::ParseIntError,
        value: String,
    },

    #[snafu(display("Expected a str or bytes line, but got {found}"))]
    TypeMismatch { found: String },
}

impl Error {
    /// Returns true if the line itself was malformed, as opposed to the
    /// input not being a line at all.
    pub fn is_format_error(&self) -> bool {
        !matches!(self, Self::TypeMismatch { .. })
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Represents a single parsed line of line protocol data
///
/// Here is an example of how to parse the line protocol data
/// `cpu,host=A,region=west usage_system=64i 1590488773254420000`
/// into a `ParsedLine`:
///
/// ```
/// use line_protocol_parser::{FieldValue, ParsedLine};
///
/// let ParsedLine {
///     measurement,
///     tags,
///     fields,
///     time,
/// } = line_protocol_parser::parse_line(
///     "cpu,host=A,region=west usage_system=64i 1590488773254420000",
/// )
/// .expect("Should parse successfully");
///
/// assert_eq!(measurement, "cpu");
///
/// assert_eq!(tags["host"], "A");
/// assert_eq!(tags["region"], "west");
///
/// assert_eq!(fields["usage_system"], FieldValue::I64(64));
///
/// assert_eq!(time, Some(1590488773254420000));
/// ```
///
/// The record owns all of its strings; nothing borrows from the input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedLine {
    pub measurement: String,
    /// Tags in the order they appear on the line.
    pub tags: IndexMap<String, String>,
    /// Fields in the order they appear on the line.
    pub fields: IndexMap<String, FieldValue>,
    /// Nanoseconds since the epoch, `None` when the line has no timestamp.
    pub time: Option<i64>,
}

impl ParsedLine {
    /// Total number of columns on this line, including fields, tags, and
    /// timestamp (which is always counted).
    ///
    /// ```
    /// let parsed_line = line_protocol_parser::parse_line(
    ///     "cpu,host=A,region=west usage_system=64i 1590488773254420000",
    /// )
    /// .expect("Should parse successfully");
    ///
    /// assert_eq!(parsed_line.column_count(), 4);
    /// ```
    pub fn column_count(&self) -> usize {
        1 + self.fields.len() + self.tags.len()
    }

    /// Returns the value of the passed in tag, if present.
    pub fn tag_value(&self, tag_key: &str) -> Option<&str> {
        self.tags.get(tag_key).map(String::as_str)
    }

    /// Returns the value of the passed in field, if present.
    pub fn field_value(&self, field_key: &str) -> Option<&FieldValue> {
        self.fields.get(field_key)
    }
}

/// Allowed types of Fields in a `ParsedLine`. One of the types described in
/// <https://docs.influxdata.com/influxdb/v2.0/reference/syntax/line-protocol/#data-types-and-format>
///
/// String values are only stripped of their surrounding quotes: any
/// backslash inside the quotes is kept as-is, unlike measurements, tags and
/// field keys which are unescaped.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    I64(i64),
    U64(u64),
    F64(f64),
    String(String),
    Boolean(bool),
}

/// Parse the first line of `input` into a [`ParsedLine`].
///
/// `input` may be text or raw UTF-8 bytes. A trailing `\n` or `\r\n`, and
/// anything after it, is ignored. Parsing is all-or-nothing: if any element
/// of the line is malformed, the [`Error`] names that element.
///
/// ```
/// use line_protocol_parser::{Error, FieldValue};
///
/// let line = line_protocol_parser::parse_line(b"m,t=x f=\"hi\" 12\nignored").unwrap();
/// assert_eq!(line.fields["f"], FieldValue::String("hi".into()));
/// assert_eq!(line.time, Some(12));
///
/// let err = line_protocol_parser::parse_line("m,t=x f=hej 12").unwrap_err();
/// assert!(matches!(err, Error::UnrecognizedFieldValueType { .. }));
/// ```
pub fn parse_line(input: impl AsRef<[u8]>) -> Result<ParsedLine> {
    let input = input.as_ref();
    let res = parse_bytes(input);

    if let Err(e) = &res {
        debug!(
            line = %String::from_utf8_lossy(input),
            error = %e,
            "Error parsing line"
        );
    }
    res
}

/// Parse a dynamically typed line.
///
/// This is the entry point for callers that do not know statically what they
/// were handed, such as language bindings. Accepted inputs are `String`,
/// `&'static str`, `Vec<u8>` and `&'static [u8]`; anything else, including no
/// input at all, is a [`Error::TypeMismatch`].
///
/// ```
/// use std::any::Any;
/// use line_protocol_parser::Error;
///
/// let line = String::from("m f=1 0");
/// assert!(line_protocol_parser::parse_untyped(Some(&line as &dyn Any)).is_ok());
///
/// let err = line_protocol_parser::parse_untyped(Some(&123 as &dyn Any)).unwrap_err();
/// assert!(matches!(err, Error::TypeMismatch { .. }));
/// ```
pub fn parse_untyped(input: Option<&dyn Any>) -> Result<ParsedLine> {
    let input = input.context(TypeMismatchSnafu {
        found: "no argument",
    })?;

    if let Some(s) = input.downcast_ref::<String>() {
        parse_line(s)
    } else if let Some(s) = input.downcast_ref::<&str>() {
        parse_line(s)
    } else if let Some(b) = input.downcast_ref::<Vec<u8>>() {
        parse_line(b)
    } else if let Some(b) = input.downcast_ref::<&[u8]>() {
        parse_line(b)
    } else {
        TypeMismatchSnafu {
            found: "a value that is neither text nor bytes",
        }
        .fail()
    }
}

fn parse_bytes(input: &[u8]) -> Result<ParsedLine> {
    ensure!(!input.is_empty(), EmptyInputSnafu);

    let line = std::str::from_utf8(scan::first_line(input)).context(InvalidUtf8Snafu)?;
    scan::scan(line)
}
