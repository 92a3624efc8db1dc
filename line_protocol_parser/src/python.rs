//! The `_line_protocol_parser` Python extension module.
//!
//! Exposes `parse_line(line) -> dict` and the `LineFormatError` exception.
//! `line` may be `str` or `bytes`; anything else raises `TypeError`.
//!
//! Build the importable module with the `extension-module` feature (see
//! `pyproject.toml`). The `python` feature alone links libpython, which is
//! what `cargo test --features python` needs.

use crate::{Error, FieldValue, ParsedLine, TypeMismatchSnafu};
use pyo3::{
    create_exception,
    exceptions::{PyException, PyTypeError},
    prelude::*,
    types::{PyBytes, PyDict, PyString},
};

create_exception!(
    _line_protocol_parser,
    LineFormatError,
    PyException,
    "An error occurred when parsing the components of the line."
);

fn to_py_err(e: Error) -> PyErr {
    if e.is_format_error() {
        LineFormatError::new_err(e.to_string())
    } else {
        PyTypeError::new_err(e.to_string())
    }
}

/// Parse a line protocol string into a dictionary.
///
/// Returns a dictionary with keys 'measurement', 'fields', 'tags' and
/// 'time'. Raises `LineFormatError` when input can't be parsed.
#[pyfunction]
#[pyo3(name = "parse_line", signature = (line=None))]
fn py_parse_line<'py>(
    py: Python<'py>,
    line: Option<&Bound<'py, PyAny>>,
) -> PyResult<Bound<'py, PyDict>> {
    let parsed = match line {
        None => TypeMismatchSnafu {
            found: "no argument",
        }
        .fail(),
        Some(line) => {
            if let Ok(bytes) = line.downcast::<PyBytes>() {
                crate::parse_line(bytes.as_bytes())
            } else if let Ok(text) = line.downcast::<PyString>() {
                crate::parse_line(text.to_str()?)
            } else {
                TypeMismatchSnafu {
                    found: line.get_type().name()?.to_string(),
                }
                .fail()
            }
        }
    }
    .map_err(to_py_err)?;

    to_dict(py, &parsed)
}

fn to_dict<'py>(py: Python<'py>, parsed: &ParsedLine) -> PyResult<Bound<'py, PyDict>> {
    let tags = PyDict::new(py);
    for (key, value) in &parsed.tags {
        tags.set_item(key.as_str(), value.as_str())?;
    }

    let fields = PyDict::new(py);
    for (key, value) in &parsed.fields {
        let key = key.as_str();
        match value {
            FieldValue::I64(v) => fields.set_item(key, *v)?,
            FieldValue::U64(v) => fields.set_item(key, *v)?,
            FieldValue::F64(v) => fields.set_item(key, *v)?,
            FieldValue::String(v) => fields.set_item(key, v.as_str())?,
            FieldValue::Boolean(v) => fields.set_item(key, *v)?,
        }
    }

    let output = PyDict::new(py);
    output.set_item("measurement", parsed.measurement.as_str())?;
    output.set_item("tags", tags)?;
    output.set_item("fields", fields)?;
    output.set_item("time", parsed.time)?;
    Ok(output)
}

/// Parse InfluxDB line protocol strings into Python dictionaries.
#[pymodule]
pub fn _line_protocol_parser(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(py_parse_line, m)?)?;
    m.add("LineFormatError", m.py().get_type::<LineFormatError>())?;
    Ok(())
}
