//! Coercion of raw field value tokens into typed [`FieldValue`]s.

use crate::{
    FieldValue, FloatOutOfRangeSnafu, IntegerOutOfRangeSnafu, Result,
    UnrecognizedFieldValueTypeSnafu,
};
use snafu::{OptionExt, ResultExt, ensure};

/// Classify and convert a raw field value token, as handed over by the
/// scanner (quotes of a string value still in place).
///
/// Checked in order, first match wins:
///
/// 1. `"..."` is a string; the content is kept verbatim.
/// 2. `-?digits` followed by `i` is a signed integer.
/// 3. `digits` followed by `u` is an unsigned integer.
/// 4. `t`, `true`, `f`, `false` in any letter case are booleans.
/// 5. Anything matching the float grammar is a float.
pub(crate) fn coerce(raw: &str) -> Result<FieldValue> {
    if let Some(s) = raw
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    {
        return Ok(FieldValue::String(s.to_string()));
    }

    if let Some(digits) = raw.strip_suffix('i') {
        if is_integral(digits.strip_prefix('-').unwrap_or(digits)) {
            let v = digits
                .parse::<i64>()
                .context(IntegerOutOfRangeSnafu { value: raw })?;
            return Ok(FieldValue::I64(v));
        }
    }

    if let Some(digits) = raw.strip_suffix('u') {
        if is_integral(digits) {
            let v = digits
                .parse::<u64>()
                .context(IntegerOutOfRangeSnafu { value: raw })?;
            return Ok(FieldValue::U64(v));
        }
    }

    if let Some(b) = boolean(raw) {
        return Ok(FieldValue::Boolean(b));
    }

    ensure!(is_float(raw), UnrecognizedFieldValueTypeSnafu { value: raw });
    // the grammar check above leaves only overflow for `parse` to reject
    let v: f64 = raw
        .parse()
        .ok()
        .filter(|v: &f64| v.is_finite())
        .context(FloatOutOfRangeSnafu { value: raw })?;
    Ok(FieldValue::F64(v))
}

/// Non-empty and ASCII digits only.
pub(crate) fn is_integral(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

// https://docs.influxdata.com/influxdb/v2.0/reference/syntax/line-protocol/#data-types-and-format
fn boolean(raw: &str) -> Option<bool> {
    if raw.eq_ignore_ascii_case("t") || raw.eq_ignore_ascii_case("true") {
        Some(true)
    } else if raw.eq_ignore_ascii_case("f") || raw.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// `[+-]?(digits[.digits*] | .digits)([eE][+-]?digits)?`
fn is_float(raw: &str) -> bool {
    let s = raw.strip_prefix(['+', '-']).unwrap_or(raw);

    let (mantissa, exponent) = match s.find(['e', 'E']) {
        Some(idx) => (&s[..idx], Some(&s[idx + 1..])),
        None => (s, None),
    };

    let mantissa_ok = match mantissa.split_once('.') {
        Some((int, frac)) => {
            (is_integral(int) && (frac.is_empty() || is_integral(frac)))
                || (int.is_empty() && is_integral(frac))
        }
        None => is_integral(mantissa),
    };

    let exponent_ok = exponent.is_none_or(|e| is_integral(e.strip_prefix(['+', '-']).unwrap_or(e)));

    mantissa_ok && exponent_ok
}
