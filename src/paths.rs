use serde_json::Value;

use crate::error::{EngineError, Result};

/// Extracts a value from a JSON document given a `$`-rooted, dot-separated
/// path.
///
/// The `[]` segment passes the current array through unchanged; it does not
/// flatten nested lists. The caller is expected to index per-element itself.
/// A non-`[]` segment descending into anything but an object is a hard
/// failure; a missing key in an object yields `Null`.
pub fn extract(root: &Value, path: &str) -> Result<Value> {
    let mut current = root.clone();
    for segment in path.split('.').skip(1) {
        if segment == "[]" {
            match current {
                Value::Array(_) => {} // pass the list through as-is
                _ => {
                    return Err(EngineError::Path {
                        path: path.to_string(),
                        segment: segment.to_string(),
                    })
                }
            }
        } else {
            match current {
                Value::Object(ref map) => {
                    current = map.get(segment).cloned().unwrap_or(Value::Null);
                }
                _ => {
                    return Err(EngineError::Path {
                        path: path.to_string(),
                        segment: segment.to_string(),
                    })
                }
            }
        }
    }
    Ok(current)
}

/// Extracts a path and coerces the result to a float. Numeric strings are
/// accepted; everything else is an extraction miss reported as `Path`.
pub fn extract_f64(root: &Value, path: &str) -> Result<f64> {
    let value = extract(root, path)?;
    match &value {
        Value::Number(n) => Ok(n.as_f64().unwrap_or(0.0)),
        Value::String(s) if s.parse::<f64>().is_ok() => Ok(s.parse().unwrap_or(0.0)),
        _ => Err(EngineError::Path {
            path: path.to_string(),
            segment: format!("non-numeric leaf {value}"),
        }),
    }
}

/// Removes `prefix` from `path` if `path` literally starts with it;
/// otherwise returns `path` unchanged. This is a string-prefix match, not a
/// structural one: two sibling fields sharing a prefix token will both
/// match.
pub fn strip_prefix<'a>(path: &'a str, prefix: &str) -> &'a str {
    path.strip_prefix(prefix).unwrap_or(path)
}

/// Re-roots `path` relative to `base`: strips the base prefix and prepends
/// the `$` root, which is how the sweep addresses note fields relative to
/// the note socket's recorded path.
pub fn rebase(path: &str, base: &str) -> String {
    format!("${}", strip_prefix(path, base))
}
