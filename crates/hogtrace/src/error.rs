//! Runtime error taxonomy for the evaluator and probe VM.
//!
//! These are the error kinds a probe can raise *after* it has parsed
//! successfully. None of them propagate past [`crate::vm::ProbeExecutor`]:
//! the VM absorbs every variant into a dropped state and a log entry
//! (see `vm.rs`). They exist as a typed enum anyway because the evaluator's
//! internals, the rate limiter, and the truncator all need to report
//! *which* budget was exceeded, and a string would lose that structure.

use std::fmt;

use crate::limits::Limits;

/// A runtime failure raised while evaluating an expression or running a probe.
///
/// Mirrors the taxonomy in `SPEC_FULL.md` §B / spec.md §7, minus
/// `SyntaxError` (see [`crate::parser::ParseError`]) and `VersionError` (see
/// [`crate::ir::IrError`]), which are propagated to the caller rather than
/// absorbed by the VM.
#[derive(Debug, Clone)]
pub enum HogTraceError {
    /// Call to a name outside the fixed builtin table (§4.7).
    UnknownFunction { name: String },
    /// Attribute access blocked by the private/dunder policy (§4.3, §4.7).
    UnsafeAttribute { name: String },
    /// Expression recursion depth exceeded the configured limit (§4.3).
    Recursion { limit: u32 },
    /// Wall-clock or work-quantum budget exceeded during predicate or
    /// action evaluation (§5).
    Timeout { budget_ms: u64 },
    /// The capture accumulator exceeded `max_capture_size_bytes` (§4.5).
    CaptureSize { estimated_bytes: usize, limit_bytes: usize },
    /// The probe fired more often than `max_probe_fires_per_second` allows (§5).
    RateLimit { probe_spec: String, limit_per_sec: u32 },
    /// Catch-all for runtime failures not covered above: type errors,
    /// unsupported operands, failed conversions.
    Eval { message: String },
}

impl fmt::Display for HogTraceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownFunction { name } => write!(f, "function '{name}' is not available"),
            Self::UnsafeAttribute { name } => {
                write!(f, "access to attribute '{name}' is not allowed")
            }
            Self::Recursion { limit } => write!(f, "expression recursion depth exceeded {limit}"),
            Self::Timeout { budget_ms } => write!(f, "evaluation exceeded {budget_ms}ms budget"),
            Self::CaptureSize {
                estimated_bytes,
                limit_bytes,
            } => write!(
                f,
                "captured data size ({estimated_bytes} bytes) exceeds limit ({limit_bytes} bytes)"
            ),
            Self::RateLimit {
                probe_spec,
                limit_per_sec,
            } => write!(f, "probe '{probe_spec}' exceeded {limit_per_sec}/s rate limit"),
            Self::Eval { message } => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for HogTraceError {}

impl HogTraceError {
    /// The log level spec.md §7 prescribes for this error kind.
    #[must_use]
    pub fn log_level(&self) -> LogLevel {
        match self {
            Self::Timeout { .. } | Self::RateLimit { .. } | Self::CaptureSize { .. } => LogLevel::Warn,
            Self::UnknownFunction { .. } | Self::UnsafeAttribute { .. } | Self::Eval { .. } => LogLevel::Warn,
            Self::Recursion { .. } => LogLevel::Error,
        }
    }

    pub(crate) fn eval(message: impl Into<String>) -> Self {
        Self::Eval { message: message.into() }
    }
}

/// The level policy from spec.md §7: WARN for timeout/rate-limit/capture-size,
/// DEBUG for predicate-false / predicate-error, ERROR for internal bugs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Warn,
    Error,
}

pub(crate) type EvalResult<T> = Result<T, HogTraceError>;

/// Evaluation outcome shared by the evaluator's recursion guard: either a
/// value, or an error carrying enough context for the VM's dropped-state
/// logging. Kept separate from `Result` so `Limits` can be threaded through
/// without an extra parameter on every call.
pub(crate) fn recursion_error(limits: &Limits) -> HogTraceError {
    HogTraceError::Recursion {
        limit: limits.max_recursion_depth,
    }
}
