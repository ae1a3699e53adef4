//! Capture size/depth/item truncation (spec.md §4.5).
//!
//! A probe's captured values are bounded before they ever leave the VM:
//! nested structures are truncated by depth and item count first, then the
//! whole capture's estimated byte size is checked against the budget. This
//! mirrors the original implementation's two-phase `_limit_capture_value`
//! then `_check_capture_size` pipeline in `vm.py`.

use indexmap::IndexMap;

use crate::capability::HostObject;
use crate::error::HogTraceError;
use crate::limits::Limits;
use crate::value::Value;

/// Recursively truncates `value` to `limits`' depth and item-count budgets.
///
/// - A list/map beyond `max_capture_depth` collapses to a placeholder
///   string rather than erroring — truncation degrades gracefully, spec.md
///   §4.5 never raises for depth/size, only logs.
/// - A list/map with more than `max_capture_items` entries keeps the first
///   `max_capture_items` and appends a `"... N more"` marker.
/// - A host object with an [`HostObject::attr_map`] projection is truncated
///   like a map; otherwise it collapses to its `repr()` string.
/// - A string longer than `max_capture_string_length` characters is cut to
///   that length with an ellipsis sentinel naming the original length.
#[must_use]
pub fn truncate(value: &Value, limits: &Limits) -> Value {
    truncate_at_depth(value, limits, 0)
}

/// Truncates `s` to `limits.max_capture_string_length` characters, appending
/// a sentinel that preserves the original length (spec.md §4.5).
fn truncate_string(s: &str, limits: &Limits) -> Value {
    let max = limits.max_capture_string_length;
    let total_chars = s.chars().count();
    if total_chars <= max {
        return Value::Str(s.to_owned());
    }
    let head: String = s.chars().take(max).collect();
    Value::Str(format!("{head}... ({total_chars} chars total)"))
}

fn truncate_at_depth(value: &Value, limits: &Limits, depth: u32) -> Value {
    if depth >= limits.max_capture_depth {
        return match value {
            Value::List(_) | Value::Map(_) => Value::Str(format!("<max depth {} exceeded>", limits.max_capture_depth)),
            Value::Host(obj) => Value::Str(obj.repr()),
            Value::Str(s) => truncate_string(s, limits),
            other => other.clone(),
        };
    }

    match value {
        Value::Str(s) => truncate_string(s, limits),
        Value::List(items) => Value::List(truncate_items(items.iter(), limits, depth, |item| {
            truncate_at_depth(item, limits, depth + 1)
        })),
        Value::Map(map) => {
            let mut out = IndexMap::new();
            let total = map.len();
            for (key, val) in map.iter().take(limits.max_capture_items) {
                out.insert(key.clone(), truncate_at_depth(val, limits, depth + 1));
            }
            if total > limits.max_capture_items {
                out.insert("__truncated__".to_owned(), Value::Str(format!("... {} more", total - limits.max_capture_items)));
            }
            Value::Map(out)
        }
        Value::Host(obj) => match obj.attr_map() {
            Some(attrs) => {
                let mut out = IndexMap::new();
                let total = attrs.len();
                for (key, val) in attrs.into_iter().take(limits.max_capture_items) {
                    out.insert(key, truncate_at_depth(&val, limits, depth + 1));
                }
                if total > limits.max_capture_items {
                    out.insert("__truncated__".to_owned(), Value::Str(format!("... {} more", total - limits.max_capture_items)));
                }
                Value::Map(out)
            }
            None => Value::Str(obj.repr()),
        },
        other => other.clone(),
    }
}

fn truncate_items<'a>(
    items: impl Iterator<Item = &'a Value>,
    limits: &Limits,
    _depth: u32,
    map_item: impl Fn(&Value) -> Value,
) -> Vec<Value> {
    let items: Vec<&Value> = items.collect();
    let total = items.len();
    let mut out: Vec<Value> = items.into_iter().take(limits.max_capture_items).map(map_item).collect();
    if total > limits.max_capture_items {
        out.push(Value::Str(format!("... {} more", total - limits.max_capture_items)));
    }
    out
}

/// A rough, allocation-light estimate of the serialized size of `value` in
/// bytes, used to enforce `max_capture_size_bytes` without actually
/// serializing the capture (spec.md §4.5).
#[must_use]
pub fn estimate_size(value: &Value) -> usize {
    match value {
        Value::Null | Value::Bool(_) => 4,
        Value::Int(_) | Value::Float(_) => 8,
        Value::Str(s) => s.len(),
        Value::List(items) => items.iter().map(estimate_size).sum::<usize>() + items.len() * 2,
        Value::Map(map) => map.iter().map(|(k, v)| k.len() + estimate_size(v)).sum::<usize>() + map.len() * 2,
        Value::Host(obj) => obj.repr().len(),
    }
}

/// Checks a captured value against the size budget after truncation.
///
/// # Errors
///
/// Returns [`HogTraceError::CaptureSize`] if the estimated size exceeds
/// `limits.max_capture_size_bytes`.
pub fn check_capture_size(value: &Value, limits: &Limits) -> Result<(), HogTraceError> {
    let estimated = estimate_size(value);
    if estimated > limits.max_capture_size_bytes {
        Err(HogTraceError::CaptureSize {
            estimated_bytes: estimated,
            limit_bytes: limits.max_capture_size_bytes,
        })
    } else {
        Ok(())
    }
}
