//! Probe execution observability.
//!
//! Spec.md §7 prescribes a level policy (WARN for Timeout/RateLimit/
//! CaptureSize, DEBUG for predicate-false/predicate-error, ERROR for
//! internal bugs) but leaves the logging *mechanism* unspecified ("a log
//! entry"). This module follows the teacher's `VmTracer` idiom: a trait with
//! no-op default methods, monomorphized into the VM so [`NoopTracer`]
//! compiles away entirely, plus concrete tracers for the common cases.
//!
//! [`TracingProbeTracer`] additionally emits through the `tracing` crate at
//! exactly the levels spec.md §7 names, so a host application gets
//! structured logging for free; [`RecordingTracer`] exists for tests that
//! want to assert on the dropped/emitted sequence without a subscriber.

use crate::ast::ProbeSpec;
use crate::error::{HogTraceError, LogLevel};

/// Why a probe invocation produced no capture record, mirroring the
/// DROPPED_* states in spec.md §4.4's state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum DroppedReason {
    /// The per-probe token bucket was exhausted.
    RateLimited,
    /// The predicate evaluated to a falsey value.
    PredicateFalse,
    /// The predicate raised an error or exceeded its time budget.
    PredicateError(HogTraceError),
    /// A `sample` action's draw exceeded its threshold.
    Sample,
    /// Every action ran and none of them produced a capture entry.
    Empty,
    /// An action or the final size check raised an error.
    Error(HogTraceError),
}

impl DroppedReason {
    /// The log level spec.md §7 prescribes for this drop reason.
    #[must_use]
    pub fn log_level(&self) -> LogLevel {
        match self {
            Self::RateLimited => LogLevel::Warn,
            Self::PredicateFalse | Self::Empty => LogLevel::Debug,
            Self::PredicateError(_) => LogLevel::Debug,
            Self::Sample => LogLevel::Debug,
            Self::Error(err) => err.log_level(),
        }
    }
}

impl std::fmt::Display for DroppedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimited => write!(f, "rate limited"),
            Self::PredicateFalse => write!(f, "predicate false"),
            Self::PredicateError(err) => write!(f, "predicate error: {err}"),
            Self::Sample => write!(f, "sample draw missed"),
            Self::Empty => write!(f, "no capture data produced"),
            Self::Error(err) => write!(f, "{err}"),
        }
    }
}

/// Observability hooks for one probe's execution. All methods default to a
/// no-op so implementations only override what they care about, and so
/// [`NoopTracer`] compiles to nothing (mirrors `VmTracer` in the teacher's
/// bytecode VM, generalized from opcode dispatch to probe outcomes).
pub trait ProbeTracer {
    /// Called when a probe produces a capture record.
    fn on_emitted(&mut self, _probe_spec: &ProbeSpec) {}

    /// Called when a probe produces no record, with the reason it was
    /// dropped.
    fn on_dropped(&mut self, _probe_spec: &ProbeSpec, _reason: &DroppedReason) {}
}

/// A tracer that does nothing. The production default: the VM carries the
/// tracer as a generic parameter, so the compiler inlines every hook call
/// to nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl ProbeTracer for NoopTracer {}

/// Emits structured log records through the `tracing` crate at the levels
/// spec.md §7 names. This is the tracer a host application reaches for in
/// production: drops are visible to whatever subscriber it has configured,
/// without this crate ever deciding where logs go.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProbeTracer;

impl ProbeTracer for TracingProbeTracer {
    fn on_emitted(&mut self, probe_spec: &ProbeSpec) {
        tracing::debug!(probe = %probe_spec.full_spec, "probe emitted a capture record");
    }

    fn on_dropped(&mut self, probe_spec: &ProbeSpec, reason: &DroppedReason) {
        match reason.log_level() {
            LogLevel::Debug => tracing::debug!(probe = %probe_spec.full_spec, reason = %reason, "probe dropped"),
            LogLevel::Warn => tracing::warn!(probe = %probe_spec.full_spec, reason = %reason, "probe dropped"),
            LogLevel::Error => tracing::error!(probe = %probe_spec.full_spec, reason = %reason, "probe dropped"),
        }
    }
}

/// One recorded tracer event, used by [`RecordingTracer`].
#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
    Emitted { probe_spec: String },
    Dropped { probe_spec: String, reason: DroppedReason },
}

/// Records every event in order, for tests that want to assert on the
/// dropped/emitted sequence across a whole program run without standing up
/// a `tracing` subscriber.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    events: Vec<TraceEvent>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }
}

impl ProbeTracer for RecordingTracer {
    fn on_emitted(&mut self, probe_spec: &ProbeSpec) {
        self.events.push(TraceEvent::Emitted {
            probe_spec: probe_spec.full_spec.clone(),
        });
    }

    fn on_dropped(&mut self, probe_spec: &ProbeSpec, reason: &DroppedReason) {
        self.events.push(TraceEvent::Dropped {
            probe_spec: probe_spec.full_spec.clone(),
            reason: reason.clone(),
        });
    }
}
