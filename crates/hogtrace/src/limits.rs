//! Resource limits and safety configuration for probe evaluation.
//!
//! A plain data struct with `#[must_use]` builder methods, plus named
//! presets for the common operating points (production, strict, relaxed).

/// Configuration for probe resource limits and attribute-access policy.
///
/// All numeric limits have production-safe defaults; build a custom profile
/// with the builder methods, or start from [`Limits::strict`] /
/// [`Limits::relaxed`].
#[derive(Debug, Clone, PartialEq)]
pub struct Limits {
    /// Maximum depth for recursive expression evaluation.
    pub max_recursion_depth: u32,
    /// Wall-clock / work-quantum budget for predicate and action evaluation,
    /// in milliseconds. `None` disables the timeout (not recommended in
    /// production).
    pub max_predicate_time_ms: Option<u64>,
    /// Maximum size in bytes for a probe's captured data.
    pub max_capture_size_bytes: usize,
    /// Maximum depth when truncating nested captured values.
    pub max_capture_depth: u32,
    /// Maximum number of items retained from a sequence or mapping capture.
    pub max_capture_items: usize,
    /// Maximum number of characters retained from a captured string before
    /// it is truncated with an ellipsis sentinel (spec.md §4.5 type policy).
    pub max_capture_string_length: usize,
    /// Maximum number of times a single probe (by `ProbeSpec::full_spec`)
    /// may fire per second. `None` disables rate limiting.
    pub max_probe_fires_per_second: Option<u32>,
    /// Whether to allow access to attributes beginning with a single `_`.
    pub allow_private_attributes: bool,
    /// Whether to allow access to `__dunder__`-style attributes.
    pub allow_dunder_attributes: bool,
    /// Whether to log (at DEBUG) every predicate that evaluates false.
    pub log_predicate_failures: bool,
    /// Whether to log (at DEBUG) every successful probe execution.
    pub log_probe_execution: bool,
    /// Makes `sample` defer request-store writes until the accumulator is
    /// known to survive, rather than the source's abortive-not-atomic
    /// default. See `DESIGN.md`, Open Question: sample atomicity.
    pub atomic_sample: bool,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_recursion_depth: 100,
            max_predicate_time_ms: Some(10),
            max_capture_size_bytes: 10_000,
            max_capture_depth: 10,
            max_capture_items: 100,
            max_capture_string_length: 1000,
            max_probe_fires_per_second: Some(1000),
            allow_private_attributes: false,
            allow_dunder_attributes: false,
            log_predicate_failures: false,
            log_probe_execution: false,
            atomic_sample: false,
        }
    }
}

impl Limits {
    /// Production-safe defaults. Equivalent to `Limits::default()`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tighter limits for high-traffic production environments.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            max_recursion_depth: 50,
            max_predicate_time_ms: Some(5),
            max_capture_size_bytes: 5_000,
            max_capture_depth: 5,
            max_capture_items: 50,
            max_capture_string_length: 200,
            max_probe_fires_per_second: Some(500),
            ..Self::default()
        }
    }

    /// Looser limits for development and testing; turns on the debug logs.
    #[must_use]
    pub fn relaxed() -> Self {
        Self {
            max_recursion_depth: 200,
            max_predicate_time_ms: Some(50),
            max_capture_size_bytes: 50_000,
            max_capture_depth: 20,
            max_capture_items: 500,
            max_capture_string_length: 5000,
            max_probe_fires_per_second: None,
            log_predicate_failures: true,
            log_probe_execution: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn max_recursion_depth(mut self, limit: u32) -> Self {
        self.max_recursion_depth = limit;
        self
    }

    #[must_use]
    pub fn max_predicate_time_ms(mut self, limit: Option<u64>) -> Self {
        self.max_predicate_time_ms = limit;
        self
    }

    #[must_use]
    pub fn max_capture_size_bytes(mut self, limit: usize) -> Self {
        self.max_capture_size_bytes = limit;
        self
    }

    #[must_use]
    pub fn max_capture_depth(mut self, limit: u32) -> Self {
        self.max_capture_depth = limit;
        self
    }

    #[must_use]
    pub fn max_capture_items(mut self, limit: usize) -> Self {
        self.max_capture_items = limit;
        self
    }

    #[must_use]
    pub fn max_capture_string_length(mut self, limit: usize) -> Self {
        self.max_capture_string_length = limit;
        self
    }

    #[must_use]
    pub fn max_probe_fires_per_second(mut self, limit: Option<u32>) -> Self {
        self.max_probe_fires_per_second = limit;
        self
    }

    #[must_use]
    pub fn allow_private_attributes(mut self, allow: bool) -> Self {
        self.allow_private_attributes = allow;
        self
    }

    #[must_use]
    pub fn allow_dunder_attributes(mut self, allow: bool) -> Self {
        self.allow_dunder_attributes = allow;
        self
    }

    #[must_use]
    pub fn atomic_sample(mut self, atomic: bool) -> Self {
        self.atomic_sample = atomic;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::Limits;

    #[test]
    fn strict_is_tighter_than_default() {
        let default = Limits::default();
        let strict = Limits::strict();
        assert!(strict.max_recursion_depth < default.max_recursion_depth);
        assert!(strict.max_capture_size_bytes < default.max_capture_size_bytes);
    }

    #[test]
    fn relaxed_disables_rate_limit() {
        assert_eq!(Limits::relaxed().max_probe_fires_per_second, None);
    }
}
