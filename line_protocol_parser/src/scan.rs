//! Single pass scanner splitting a line into its sections and tokens.

use crate::{
    InvalidTimestampSnafu, MissingFieldKeySnafu, MissingFieldValueSnafu, MissingMeasurementSnafu,
    MissingTagKeySnafu, MissingTagValueSnafu, ParsedLine, Result, TimestampOutOfRangeSnafu,
    value::{self, is_integral},
};
use indexmap::IndexMap;
use snafu::{OptionExt, ResultExt, ensure};
use std::borrow::Cow;
use tracing::trace;

/// Bytes that end a measurement, tag value or field value
const VALUE_DELIMITERS: &[u8] = b", ";

/// Bytes that end a tag key or field key. Only `=` ends one successfully.
const KEY_DELIMITERS: &[u8] = b"=, ";

/// Characters whose escaping backslash is dropped in measurements
const MEASUREMENT_ESCAPES: &[char] = &[',', ' ', '=', '"'];

/// Characters whose escaping backslash is dropped in tag keys and values
const TAG_ESCAPES: &[char] = &[',', ' ', '='];

/// Characters whose escaping backslash is dropped in field keys
const FIELD_KEY_ESCAPES: &[char] = MEASUREMENT_ESCAPES;

/// Returns the first line of `input`, without its line ending.
///
/// A backslash-escaped `\n` does not end the line, and neither does one
/// inside a quoted field string value. A quote opens a string only after the
/// first unescaped space, and only when an `=` is pending for a field value.
pub(crate) fn first_line(input: &[u8]) -> &[u8] {
    let mut fields = false;
    let mut quoted = false;
    // `=` and `,` seen in the field set outside of quotes
    let mut equals = 0;
    let mut commas = 0;

    let mut i = 0;
    let end = loop {
        match input.get(i) {
            None => break input.len(),
            Some(b'\\') => {
                i += 2;
                continue;
            }
            Some(b' ') => fields = true,
            Some(b'=') if fields && !quoted => equals += 1,
            Some(b',') if fields && !quoted => commas += 1,
            Some(b'"') if fields && equals > commas => quoted = !quoted,
            Some(b'\n') if !quoted => break i,
            Some(_) => {}
        }
        i += 1;
    };

    let line = &input[..end];
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// A cursor over a single line.
///
/// A backslash always pairs with the byte after it, so the paired byte can
/// never be a delimiter.
#[derive(Debug)]
struct Cursor<'a> {
    line: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(line: &'a str) -> Self {
        Self { line, pos: 0 }
    }

    fn position(&self) -> usize {
        self.pos
    }

    /// Scan forward to the next unescaped byte in `delimiters`.
    ///
    /// Returns the token before the delimiter and the delimiter itself, and
    /// leaves the cursor just past the delimiter. With `quoted`, a token
    /// starting with `"` is read up to its closing unescaped `"` before
    /// delimiters are considered.
    ///
    /// Returns `None` if the line ends first.
    fn take_until(&mut self, delimiters: &[u8], quoted: bool) -> Option<(&'a str, u8)> {
        let bytes = self.line.as_bytes();
        let start = self.pos;
        let mut in_quotes = quoted && bytes.get(start) == Some(&b'"');
        let mut i = if in_quotes { start + 1 } else { start };

        while let Some(&b) = bytes.get(i) {
            match b {
                b'\\' => {
                    i += 2;
                    continue;
                }
                b'"' if in_quotes => in_quotes = false,
                b if !in_quotes && delimiters.contains(&b) => {
                    self.pos = i + 1;
                    // delimiters are ASCII, so `i` is a char boundary
                    return Some((&self.line[start..i], b));
                }
                _ => {}
            }
            i += 1;
        }

        self.pos = bytes.len();
        None
    }

    /// Everything after the cursor.
    fn rest(&mut self) -> &'a str {
        let rest = &self.line[self.pos..];
        self.pos = self.line.len();
        rest
    }
}

/// Copy `token`, dropping each backslash that precedes one of `escapes`.
///
/// Any other backslash is kept. Borrows when there is nothing to drop.
fn unescape<'a>(token: &'a str, escapes: &[char]) -> Cow<'a, str> {
    if !token.contains('\\') {
        return Cow::Borrowed(token);
    }

    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek().is_some_and(|next| escapes.contains(next)) {
            continue;
        }
        out.push(c);
    }
    Cow::Owned(out)
}

/// Scan a single line (already cut at its line ending) into a [`ParsedLine`].
pub(crate) fn scan(line: &str) -> Result<ParsedLine> {
    let mut cursor = Cursor::new(line);

    let (measurement, mut delimiter) = cursor
        .take_until(VALUE_DELIMITERS, false)
        .filter(|(token, _)| !token.is_empty())
        .context(MissingMeasurementSnafu { line })?;
    let measurement = unescape(measurement, MEASUREMENT_ESCAPES).into_owned();
    trace!(%measurement, "scanned measurement");

    let mut tags = IndexMap::new();
    while delimiter == b',' {
        let position = cursor.position();
        let key = match cursor.take_until(KEY_DELIMITERS, false) {
            Some((key, b'=')) if !key.is_empty() => key,
            _ => return MissingTagKeySnafu { position }.fail(),
        };
        let (value, next) = cursor
            .take_until(VALUE_DELIMITERS, false)
            .filter(|(token, _)| !token.is_empty())
            .context(MissingTagValueSnafu { key })?;
        trace!(key, value, "scanned tag");

        tags.insert(
            unescape(key, TAG_ESCAPES).into_owned(),
            unescape(value, TAG_ESCAPES).into_owned(),
        );
        delimiter = next;
    }

    // the measurement or last tag value ended with a space: fields follow
    let mut fields = IndexMap::new();
    loop {
        let position = cursor.position();
        let key = match cursor.take_until(KEY_DELIMITERS, false) {
            Some((key, b'=')) if !key.is_empty() => key,
            _ => return MissingFieldKeySnafu { position }.fail(),
        };
        let (raw, next) = cursor
            .take_until(VALUE_DELIMITERS, true)
            .filter(|(token, _)| !token.is_empty())
            .context(MissingFieldValueSnafu { key })?;
        trace!(key, raw, "scanned field");

        fields.insert(
            unescape(key, FIELD_KEY_ESCAPES).into_owned(),
            value::coerce(raw)?,
        );
        if next != b',' {
            break;
        }
    }

    // same digits rule as an `i` field value: an optional `-`, never `+`
    let time = match cursor.rest() {
        "" => None,
        raw => {
            ensure!(
                is_integral(raw.strip_prefix('-').unwrap_or(raw)),
                InvalidTimestampSnafu { value: raw }
            );
            Some(
                raw.parse::<i64>()
                    .context(TimestampOutOfRangeSnafu { value: raw })?,
            )
        }
    };

    Ok(ParsedLine {
        measurement,
        tags,
        fields,
        time,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Error, FieldValue};

    #[test]
    fn first_line_strips_line_endings() {
        assert_eq!(first_line(b""), b"");
        assert_eq!(first_line(b"foo"), b"foo");
        assert_eq!(first_line(b"foo\nbar"), b"foo");
        assert_eq!(first_line(b"foo\r\nbar"), b"foo");
        assert_eq!(first_line(b"foo\r"), b"foo");
        assert_eq!(first_line(b"\nfoo"), b"");
    }

    #[test]
    fn first_line_skips_escaped_newline() {
        assert_eq!(first_line(b"fo\\\no\nbar"), b"fo\\\no");
        assert_eq!(first_line(b"foo\\"), b"foo\\");
        assert_eq!(first_line(b"foo\\\\\nbar"), b"foo\\\\");
    }

    #[test]
    fn first_line_keeps_newline_in_quoted_field_value() {
        assert_eq!(first_line(b"m f=\"a\nb\" 0\nnext"), b"m f=\"a\nb\" 0");
        assert_eq!(
            first_line(b"m f=1,g=\"x,\ny\",h=\"\n\"\nnext"),
            b"m f=1,g=\"x,\ny\",h=\"\n\""
        );
        // quotes outside of a field value don't open a string
        assert_eq!(first_line(b"m,t=\"a f=1 0\nnext"), b"m,t=\"a f=1 0");
        // an escaped quote doesn't close one
        assert_eq!(first_line(b"m f=\"a\\\"\nb\" 0\nx"), b"m f=\"a\\\"\nb\" 0");
    }

    #[test]
    fn take_until_honors_escapes() {
        let mut cursor = Cursor::new(r"a\ b\,c,d e");
        assert_eq!(cursor.take_until(VALUE_DELIMITERS, false), Some((r"a\ b\,c", b',')));
        assert_eq!(cursor.take_until(VALUE_DELIMITERS, false), Some(("d", b' ')));
        assert_eq!(cursor.take_until(VALUE_DELIMITERS, false), None);
        assert_eq!(cursor.rest(), "");
    }

    #[test]
    fn take_until_escaped_backslash_does_not_escape_delimiter() {
        let mut cursor = Cursor::new(r"a\\,b");
        assert_eq!(cursor.take_until(VALUE_DELIMITERS, false), Some((r"a\\", b',')));
        assert_eq!(cursor.rest(), "b");
    }

    #[test]
    fn take_until_quoted() {
        let mut cursor = Cursor::new(r#""a, \"b c" 12"#);
        assert_eq!(
            cursor.take_until(VALUE_DELIMITERS, true),
            Some((r#""a, \"b c""#, b' '))
        );
        assert_eq!(cursor.rest(), "12");

        // quotes only matter where they were asked for
        let mut cursor = Cursor::new(r#""a, b""#);
        assert_eq!(cursor.take_until(VALUE_DELIMITERS, false), Some((r#""a"#, b',')));

        // unterminated
        let mut cursor = Cursor::new(r#""a, b 12"#);
        assert_eq!(cursor.take_until(VALUE_DELIMITERS, true), None);
    }

    #[test]
    fn unescape_drops_only_listed_escapes() {
        assert!(matches!(unescape("plain", TAG_ESCAPES), Cow::Borrowed("plain")));
        assert_eq!(unescape(r#"a\ \,\=\"\b"#, TAG_ESCAPES), r#"a ,=\"\b"#);
        assert_eq!(unescape(r#"a\ \,\=\"\b"#, MEASUREMENT_ESCAPES), r#"a ,="\b"#);
        assert_eq!(unescape(r"trailing\", MEASUREMENT_ESCAPES), r"trailing\");
        assert_eq!(unescape(r"a\\b", MEASUREMENT_ESCAPES), r"a\\b");
    }

    #[test]
    fn scan_full_line() {
        let line = scan(r#"measu\,re\ m=ent,tag1=A,tag2=B f0=True,f1="1. 2,\"3" 1570283407262541159"#)
            .unwrap();

        assert_eq!(line.measurement, "measu,re m=ent");
        assert_eq!(line.tags["tag1"], "A");
        assert_eq!(line.tags["tag2"], "B");
        assert_eq!(line.fields["f0"], FieldValue::Boolean(true));
        assert_eq!(line.fields["f1"], FieldValue::String(r#"1. 2,\"3"#.into()));
        assert_eq!(line.time, Some(1570283407262541159));
    }

    #[test]
    fn scan_unicode() {
        let line = scan("温度,地点=东京 值=\"晴れ\" 1").unwrap();
        assert_eq!(line.measurement, "温度");
        assert_eq!(line.tags["地点"], "东京");
        assert_eq!(line.fields["值"], FieldValue::String("晴れ".into()));
    }

    #[test]
    fn scan_missing_measurement() {
        for line in ["", " f=1 0", ",t=1 f=1 0", "measurement"] {
            let res = scan(line);
            assert!(
                matches!(res, Err(Error::MissingMeasurement { .. })),
                "{line:?} gave {res:?}"
            );
        }
    }

    #[test]
    fn scan_missing_tag_key() {
        for line in ["m,=v f=1 0", "m, f=1 0", "m,t f=1 0", "m,t=v, f=1 0", "m,"] {
            let res = scan(line);
            assert!(
                matches!(res, Err(Error::MissingTagKey { .. })),
                "{line:?} gave {res:?}"
            );
        }
    }

    #[test]
    fn scan_missing_tag_value() {
        for line in ["m,t= f=1 0", "m,t=,u=1 f=1 0", "m,t=v"] {
            let res = scan(line);
            assert!(
                matches!(res, Err(Error::MissingTagValue { .. })),
                "{line:?} gave {res:?}"
            );
        }
    }

    #[test]
    fn scan_missing_field_key() {
        for line in ["m 1234", "m =1 0", "m  f=1 0", "m f=1, 0", "m f=1,"] {
            let res = scan(line);
            assert!(
                matches!(res, Err(Error::MissingFieldKey { .. })),
                "{line:?} gave {res:?}"
            );
        }
    }

    #[test]
    fn scan_missing_field_value() {
        for line in ["m f=", "m f= 0", "m f=,g=1 0", "m f=1", r#"m f="open 0"#] {
            let res = scan(line);
            assert!(
                matches!(res, Err(Error::MissingFieldValue { .. })),
                "{line:?} gave {res:?}"
            );
        }
    }

    #[test]
    fn scan_invalid_timestamp() {
        for line in [
            "m f=1 time",
            "m f=1 12 ",
            "m f=1 1.5",
            "m f=1 12a",
            "m f=1 +5",
            "m f=1 -",
            "m f=1 --5",
        ] {
            let res = scan(line);
            assert!(
                matches!(res, Err(Error::InvalidTimestamp { .. })),
                "{line:?} gave {res:?}"
            );
        }
    }

    #[test]
    fn scan_timestamp_sign() {
        assert_eq!(scan("m f=1 -5").unwrap().time, Some(-5));
        assert_eq!(scan("m f=1 -9223372036854775808").unwrap().time, Some(i64::MIN));

        let err = scan("m f=1 +5").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to parse nanoseconds integer timestamp '+5'"
        );
        // `+` is rejected the same way for integer field values
        assert!(matches!(
            scan("m f=+5i 0"),
            Err(Error::UnrecognizedFieldValueType { .. })
        ));

        assert!(matches!(
            scan("m f=1 9223372036854775808"),
            Err(Error::TimestampOutOfRange { .. })
        ));
    }

    #[test]
    fn scan_reports_position_of_missing_key() {
        let err = scan("m,t=v,u f=1 0").unwrap_err();
        assert!(matches!(err, Error::MissingTagKey { position: 6 }), "{err:?}");
        assert_eq!(
            err.to_string(),
            "Failed to parse key of tag starting at byte 6"
        );
    }
}
