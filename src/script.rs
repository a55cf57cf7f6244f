//! The request script: one request per line, fields separated by commas.
//!
//! ```text
//! a,<size_bytes>,<ptr>                  allocate
//! f,<ptr>                               free
//! r,<new_size_bytes>,<old_ptr>,<new_ptr> reallocate
//! ```
//!
//! Whitespace anywhere in a line is ignored and blank lines are skipped.

use core::{fmt, str::FromStr};
use std::{fs, path::Path};

use crate::{error::ScriptError, ClientPtr};

/// A single request of the simulated program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Allocate {
        size_bytes: usize,
        ptr: ClientPtr,
    },
    Free {
        ptr: ClientPtr,
    },
    Reallocate {
        size_bytes: usize,
        old_ptr: ClientPtr,
        new_ptr: ClientPtr,
    },
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Allocate { size_bytes, ptr } => write!(f, "a,{},{}", size_bytes, ptr),
            Request::Free { ptr } => write!(f, "f,{}", ptr),
            Request::Reallocate {
                size_bytes,
                old_ptr,
                new_ptr,
            } => write!(f, "r,{},{},{}", size_bytes, old_ptr, new_ptr),
        }
    }
}

/// Parses one field of a request line.
fn field<T: FromStr>(line: usize, text: &str, value: &str, name: &str) -> Result<T, ScriptError> {
    value.parse().map_err(|_| ScriptError::MalformedRequest {
        line,
        text: text.to_string(),
        reason: format!("{} `{}` is not a valid integer", name, value),
    })
}

/// Parses line number `line` of a script. Returns `None` for a blank line.
pub fn parse_line(line: usize, text: &str) -> Result<Option<Request>, ScriptError> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Ok(None);
    }

    let fields: Vec<&str> = compact.split(',').collect();
    let malformed = |reason: &str| ScriptError::MalformedRequest {
        line,
        text: text.to_string(),
        reason: reason.to_string(),
    };

    let request = match fields[0] {
        "a" => {
            if fields.len() != 3 {
                return Err(malformed(
                    "alloc requests must have 3 parts: a, size, requested_pointer",
                ));
            }
            Request::Allocate {
                size_bytes: field(line, text, fields[1], "size")?,
                ptr: field(line, text, fields[2], "pointer")?,
            }
        },
        "f" => {
            if fields.len() != 2 {
                return Err(malformed("free requests must have 2 parts: f, pointer_to_free"));
            }
            Request::Free {
                ptr: field(line, text, fields[1], "pointer")?,
            }
        },
        "r" => {
            if fields.len() != 4 {
                return Err(malformed(
                    "realloc requests must have 4 parts: r, new_size, old_ptr, new_ptr",
                ));
            }
            Request::Reallocate {
                size_bytes: field(line, text, fields[1], "size")?,
                old_ptr: field(line, text, fields[2], "old pointer")?,
                new_ptr: field(line, text, fields[3], "new pointer")?,
            }
        },
        _ => return Err(malformed("requests must start with a, f or r")),
    };

    Ok(Some(request))
}

/// Parses a whole script. Nothing is returned unless every line is valid, so a
/// malformed line stops the run before its first request.
pub fn parse_script(source: &str) -> Result<Vec<Request>, ScriptError> {
    let mut requests = Vec::new();
    for (index, text) in source.lines().enumerate() {
        requests.extend(parse_line(index + 1, text)?);
    }
    Ok(requests)
}

/// Reads and parses the script at `path`.
pub fn read_script(path: impl AsRef<Path>) -> Result<Vec<Request>, ScriptError> {
    let source = fs::read_to_string(path)?;
    parse_script(&source)
}
