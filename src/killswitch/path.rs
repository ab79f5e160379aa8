//! # Field Paths
//!
//! Dotted-path mutation over arbitrary JSON. Each step looks at the runtime
//! type of the current container:
//! - **Object**: segments are keys. A key that itself contains dots wins over
//!   splitting: the whole remaining path is tried first, then the longest
//!   dotted key that prefixes it at a `.` boundary, then the first segment.
//! - **Array**: segments are integers, negative ones counting from the end.
//! - Anything else cannot be indexed and is an error.
//!
//! Missing keys and out-of-range indexes along the way make the operation a
//! no-op.

use crate::error::PathError;
use serde_json::{Map, Value};

/// Placeholder written by redaction rules.
pub const REDACTED: &str = "REDACTED";

/// Terminal operation applied at the end of a path.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    Set(Value),
    Delete,
}

/// Assign `value` at `path`, appending when the final index equals an array's length.
pub fn set_path(target: &mut Value, path: &str, value: Value) -> Result<(), PathError> {
    apply_path(target, path, FieldOp::Set(value))
}

/// Replace the value at `path` with [`REDACTED`].
pub fn redact_path(target: &mut Value, path: &str) -> Result<(), PathError> {
    apply_path(target, path, FieldOp::Set(Value::String(REDACTED.to_string())))
}

/// Remove the key or index at `path`.
pub fn delete_path(target: &mut Value, path: &str) -> Result<(), PathError> {
    apply_path(target, path, FieldOp::Delete)
}

/// Walk `path` through `target` and apply `op` at the end.
pub fn apply_path(target: &mut Value, path: &str, op: FieldOp) -> Result<(), PathError> {
    let mut current = target;
    let mut rest = path;

    loop {
        current = match current {
            Value::Object(map) => match split_object_path(map, rest) {
                None => {
                    apply_to_object(map, rest, op);
                    return Ok(());
                }
                Some((head, tail)) => {
                    rest = tail;
                    match map.get_mut(head) {
                        Some(next) => next,
                        None => {
                            log::debug!("Path {:?}: no key {:?}, skipping", path, head);
                            return Ok(());
                        }
                    }
                }
            },
            Value::Array(seq) => match rest.split_once('.') {
                None => return apply_to_array(seq, path, rest, op),
                Some((head, tail)) => {
                    let idx = parse_index(path, head)?;
                    match resolve_index(idx, seq.len()) {
                        Some(i) => {
                            rest = tail;
                            &mut seq[i]
                        }
                        None => {
                            log::debug!("Path {:?}: index {} out of range, skipping", path, idx);
                            return Ok(());
                        }
                    }
                }
            },
            other => {
                return Err(PathError::Unindexable {
                    path: path.to_string(),
                    kind: kind_name(other),
                })
            }
        };
    }
}

/// Where an object step splits `path`: `None` if `path` is the final key.
fn split_object_path<'p>(map: &Map<String, Value>, path: &'p str) -> Option<(&'p str, &'p str)> {
    if !path.contains('.') || map.contains_key(path) {
        return None;
    }

    let dotted = map
        .keys()
        .filter(|k| k.contains('.'))
        .filter(|k| {
            path.len() > k.len() && path.starts_with(k.as_str()) && path.as_bytes()[k.len()] == b'.'
        })
        .map(String::len)
        .max();

    match dotted {
        Some(len) => Some((&path[..len], &path[len + 1..])),
        None => path.split_once('.'),
    }
}

fn apply_to_object(map: &mut Map<String, Value>, key: &str, op: FieldOp) {
    match op {
        FieldOp::Set(value) => {
            map.insert(key.to_string(), value);
        }
        FieldOp::Delete => {
            map.shift_remove(key);
        }
    }
}

fn apply_to_array(seq: &mut Vec<Value>, path: &str, segment: &str, op: FieldOp) -> Result<(), PathError> {
    let idx = parse_index(path, segment)?;
    let len = seq.len();

    match op {
        FieldOp::Set(value) => {
            if idx >= 0 && idx as usize == len {
                seq.push(value);
            } else if let Some(i) = resolve_index(idx, len) {
                seq[i] = value;
            } else {
                log::debug!("Path {:?}: cannot set index {} of {}, skipping", path, idx, len);
            }
        }
        FieldOp::Delete => {
            if let Some(i) = resolve_index(idx, len) {
                seq.remove(i);
            }
        }
    }

    Ok(())
}

fn parse_index(path: &str, segment: &str) -> Result<i64, PathError> {
    segment
        .trim()
        .parse::<i64>()
        .map_err(|_| PathError::NonIntegerIndex {
            path: path.to_string(),
            segment: segment.to_string(),
        })
}

/// Map a possibly negative index onto `0..len`.
fn resolve_index(idx: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let resolved = if idx < 0 { len + idx } else { idx };
    (0..len).contains(&resolved).then_some(resolved as usize)
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
