//! Frame context: the read-only binding environment for a single probe
//! invocation (spec.md §3, §4.3).

use std::collections::HashMap;

use crate::value::Value;

/// The names the VM binds into every probe invocation, built once per call
/// site by the embedding application (spec.md §4.3's identifier resolution
/// order: frame locals, then these reserved bindings, then `None`/null).
#[derive(Debug, Clone, Default)]
pub struct FrameContext {
    bindings: HashMap<String, Value>,
}

impl FrameContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a name directly, overwriting any previous binding.
    pub fn bind(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.bindings.insert(name.into(), value.into());
        self
    }

    /// Looks up an identifier. Missing bindings resolve to `None`, which the
    /// evaluator turns into `Value::Null` rather than an error (spec.md §3
    /// invariant 4).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }
}

/// Builds a [`FrameContext`] from the pieces a host frame naturally has on
/// hand: positional args, keyword args, `self`, locals, globals, and
/// (for a return/exception probe point) `retval`/`exception`.
///
/// This mirrors the reserved-name contract the original implementation's
/// frame introspection exposed (`args`, `arg0..N`, `kwargs`, `self`,
/// `locals`, `globals`, `retval`, `exception`) so a capture's positional
/// argument resolves to `argN` and a bare `self`/`retval` reference binds
/// without the caller writing boilerplate.
#[derive(Debug, Clone, Default)]
pub struct FrameContextBuilder {
    args: Vec<Value>,
    kwargs: HashMap<String, Value>,
    this: Option<Value>,
    locals: HashMap<String, Value>,
    globals: HashMap<String, Value>,
    retval: Option<Value>,
    exception: Option<Value>,
}

impl FrameContextBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn args(mut self, args: impl IntoIterator<Item = Value>) -> Self {
        self.args = args.into_iter().collect();
        self
    }

    #[must_use]
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn this(mut self, value: impl Into<Value>) -> Self {
        self.this = Some(value.into());
        self
    }

    #[must_use]
    pub fn local(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.locals.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn global(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.globals.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn retval(mut self, value: impl Into<Value>) -> Self {
        self.retval = Some(value.into());
        self
    }

    #[must_use]
    pub fn exception(mut self, value: impl Into<Value>) -> Self {
        self.exception = Some(value.into());
        self
    }

    #[must_use]
    pub fn build(self) -> FrameContext {
        let mut ctx = FrameContext::new();

        for (name, value) in self.locals {
            ctx.bind(name, value);
        }

        ctx.bind("args", Value::List(self.args.clone()));
        for (i, value) in self.args.into_iter().enumerate() {
            ctx.bind(format!("arg{i}"), value);
        }

        let kwargs_map: indexmap::IndexMap<String, Value> = self.kwargs.clone().into_iter().collect();
        ctx.bind("kwargs", Value::Map(kwargs_map));
        for (name, value) in self.kwargs {
            ctx.bind(name, value);
        }

        if let Some(this) = self.this {
            ctx.bind("self", this);
        }

        let globals_map: indexmap::IndexMap<String, Value> = self.globals.into_iter().collect();
        ctx.bind("globals", Value::Map(globals_map));

        if let Some(retval) = self.retval {
            ctx.bind("retval", retval);
        }
        if let Some(exception) = self.exception {
            ctx.bind("exception", exception);
        }

        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_args_bind_by_index() {
        let ctx = FrameContextBuilder::new().args([Value::Int(1), Value::Int(2)]).build();
        assert_eq!(ctx.get("arg0"), Some(&Value::Int(1)));
        assert_eq!(ctx.get("arg1"), Some(&Value::Int(2)));
    }

    #[test]
    fn missing_identifier_is_none() {
        let ctx = FrameContext::new();
        assert_eq!(ctx.get("nope"), None);
    }

    #[test]
    fn retval_and_exception_are_mutually_optional() {
        let ctx = FrameContextBuilder::new().retval(Value::Int(200)).build();
        assert_eq!(ctx.get("retval"), Some(&Value::Int(200)));
        assert_eq!(ctx.get("exception"), None);
    }
}
