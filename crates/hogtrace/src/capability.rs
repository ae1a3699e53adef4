//! Host capability for attribute and index access.
//!
//! Per the design note in spec.md §9, the evaluator is written against a
//! minimal capability rather than any particular host object model:
//! `attr(obj, name) -> value | null` and `index(obj, key) -> value | null`.
//! Everything else in the evaluator is portable; only [`HostObject`] needs a
//! new implementation per host language/runtime.
//!
//! The attribute-access *policy* (rejecting `_private` and `__dunder__`
//! names by default) lives here too, since it is the gate every `attr` call
//! must pass through before reaching the host object.
//!
//! # Usage
//!
//! ```
//! use hogtrace::capability::{attr, HostObject};
//! use hogtrace::limits::Limits;
//! use hogtrace::value::Value;
//!
//! #[derive(Debug)]
//! struct Point { x: i64, y: i64 }
//!
//! impl HostObject for Point {
//!     fn attr(&self, name: &str) -> Option<Value> {
//!         match name {
//!             "x" => Some(Value::Int(self.x)),
//!             "y" => Some(Value::Int(self.y)),
//!             _ => None,
//!         }
//!     }
//!     fn index(&self, _key: &Value) -> Option<Value> { None }
//!     fn repr(&self) -> String { format!("{self:?}") }
//! }
//!
//! let p = Point { x: 1, y: 2 };
//! assert_eq!(attr(&p, "x", &Limits::default()).unwrap(), Some(Value::Int(1)));
//! ```

use crate::error::HogTraceError;
use crate::limits::Limits;
use crate::value::Value;

/// A host-owned object reachable from a probe expression.
///
/// Implementations back `Value::Host` and are supplied by the embedding
/// application's [`crate::frame::FrameContext`] — this crate never
/// constructs one itself. `attr`/`index` return `None` for a missing
/// member rather than an error: spec.md §3 invariant 4 requires missing
/// reads to yield null, never raise.
pub trait HostObject: std::fmt::Debug {
    /// Look up an attribute by name. `None` means "no such attribute",
    /// which the evaluator turns into a null value, not an error.
    fn attr(&self, name: &str) -> Option<Value>;

    /// Look up an item by index/key. `None` means "no such item" (covers
    /// `KeyError`/`IndexError`/`TypeError`-shaped misses in the source
    /// language).
    fn index(&self, key: &Value) -> Option<Value>;

    /// Projects this object to an attribute map of non-private members,
    /// for capture truncation (§4.5 "generic objects with an attribute
    /// map project to a mapping"). Default: no projection, falls back to
    /// [`HostObject::repr`].
    fn attr_map(&self) -> Option<Vec<(String, Value)>> {
        None
    }

    /// A safe, printable representation used when a captured value has no
    /// structured projection.
    fn repr(&self) -> String;
}

/// Returns `true` for attribute names the default policy rejects: a single
/// leading underscore (private) or a `__dunder__` wrapper, unless the
/// corresponding `Limits` flag relaxes that check.
fn is_blocked(name: &str, limits: &Limits) -> bool {
    let is_dunder = name.starts_with("__") && name.ends_with("__") && name.len() > 4;
    let is_private = name.starts_with('_') && !is_dunder;
    (is_private && !limits.allow_private_attributes) || (is_dunder && !limits.allow_dunder_attributes)
}

/// Performs a policy-checked attribute read: `attr(obj, name) -> value | null`.
///
/// # Errors
///
/// Returns [`HogTraceError::UnsafeAttribute`] if `name` is blocked by the
/// default private/dunder policy and not relaxed by `limits`.
pub fn attr(obj: &dyn HostObject, name: &str, limits: &Limits) -> Result<Option<Value>, HogTraceError> {
    if is_blocked(name, limits) {
        return Err(HogTraceError::UnsafeAttribute { name: name.to_owned() });
    }
    Ok(obj.attr(name))
}

/// Performs an index read: `index(obj, key) -> value | null`. Index access
/// has no name-based policy — only attribute access does (§4.7) — so this
/// never fails; a miss is simply `None`.
#[must_use]
pub fn index(obj: &dyn HostObject, key: &Value) -> Option<Value> {
    obj.index(key)
}
