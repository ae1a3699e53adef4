//! The probe VM driver (spec.md §4.4): given a single [`Probe`] and a bound
//! [`FrameContext`], runs its predicate, samples, assignments, and captures
//! in order, and produces either a capture record or nothing.
//!
//! This is the module every other piece of the crate exists to support: the
//! parser/IR get a program onto the heap, the evaluator computes values, the
//! truncator bounds them, and [`ProbeExecutor`] is the thing that actually
//! calls all of that against a live frame while guaranteeing the host never
//! sees a probe-induced panic or exception (spec.md §3 invariant 5, §7's
//! propagation policy: every [`HogTraceError`] this module's evaluation
//! calls can raise is absorbed into a [`DroppedReason`] here).

use indexmap::IndexMap;

use crate::ast::{Action, Expression, Probe, ProbeSpec, Program};
use crate::builtins::{Clock, RngSource};
use crate::error::HogTraceError;
use crate::evaluator::{eval, EvalContext};
use crate::frame::FrameContext;
use crate::limits::Limits;
use crate::rate_limit::RateLimiter;
use crate::request_store::{RequestId, RequestStore};
use crate::tracer::{DroppedReason, ProbeTracer};
use crate::truncate::{check_capture_size, truncate};
use crate::value::Value;

/// A single probe firing's output: a mapping of capture names to truncated
/// values, handed to the sink as `(probe_spec, record)` (spec.md §6).
pub type CaptureRecord = IndexMap<String, Value>;

/// Positional capture arguments that are bare references to one of these
/// reserved identifiers capture under that name instead of the synthetic
/// `arg<i>` key (spec.md §4.4 step 4).
const RESERVED_CAPTURE_NAMES: &[&str] = &["args", "kwargs", "locals", "globals", "retval", "exception", "self"];

/// The result of running one probe against one frame.
#[derive(Debug)]
pub enum ProbeOutcome {
    /// The probe fired and produced a non-empty capture record.
    Emitted(CaptureRecord),
    /// The probe produced no record; `reason` is one of the DROPPED_* states
    /// from spec.md §4.4's state machine.
    Dropped(DroppedReason),
}

impl ProbeOutcome {
    #[must_use]
    pub fn into_record(self) -> Option<CaptureRecord> {
        match self {
            Self::Emitted(record) => Some(record),
            Self::Dropped(_) => None,
        }
    }
}

/// Runs probes against frames, holding everything a run needs beyond the
/// AST itself: the request store, resource limits, rate limiter, and the
/// host's clock/RNG. One executor can drive many probes and many frames;
/// it holds no per-probe state between calls.
pub struct ProbeExecutor<'a> {
    pub store: &'a RequestStore,
    pub request_id: RequestId,
    pub limits: &'a Limits,
    pub rate_limiter: &'a RateLimiter,
    pub clock: &'a dyn Clock,
    pub rng: &'a mut dyn RngSource,
}

impl<'a> ProbeExecutor<'a> {
    #[must_use]
    pub fn new(
        store: &'a RequestStore,
        request_id: RequestId,
        limits: &'a Limits,
        rate_limiter: &'a RateLimiter,
        clock: &'a dyn Clock,
        rng: &'a mut dyn RngSource,
    ) -> Self {
        Self {
            store,
            request_id,
            limits,
            rate_limiter,
            clock,
            rng,
        }
    }

    /// Runs a single probe against `frame`, following spec.md §4.4's
    /// algorithm exactly: rate limit, predicate, then actions in
    /// declaration order.
    ///
    /// Never returns an `Err` and never panics on probe-authored input:
    /// every internal failure degrades to [`ProbeOutcome::Dropped`]
    /// (spec.md §3 invariant 5). `tracer` observes the outcome either way.
    pub fn execute(&mut self, probe: &Probe, frame: &FrameContext, tracer: &mut dyn ProbeTracer) -> ProbeOutcome {
        let outcome = self.execute_inner(probe, frame);
        match &outcome {
            ProbeOutcome::Emitted(_) => tracer.on_emitted(&probe.spec),
            ProbeOutcome::Dropped(reason) => tracer.on_dropped(&probe.spec, reason),
        }
        outcome
    }

    fn execute_inner(&mut self, probe: &Probe, frame: &FrameContext) -> ProbeOutcome {
        if !self.rate_limiter.check(&probe.spec.full_spec, self.limits.max_probe_fires_per_second) {
            return ProbeOutcome::Dropped(DroppedReason::RateLimited);
        }

        if let Some(predicate) = &probe.predicate {
            match eval(&predicate.expression, &mut self.eval_ctx(frame)) {
                Ok(value) if value.truthy() => {}
                Ok(_) => return ProbeOutcome::Dropped(DroppedReason::PredicateFalse),
                Err(err) => return ProbeOutcome::Dropped(DroppedReason::PredicateError(err)),
            }
        }

        let mut accumulator = CaptureRecord::new();
        let mut pending_writes: Vec<(String, Value)> = Vec::new();
        let mut fired = true;

        for action in &probe.actions {
            match action {
                Action::Sample(sample) => {
                    let draw = self.rng.next_f64();
                    if draw >= sample.threshold {
                        fired = false;
                        break;
                    }
                }
                Action::Assignment(assignment) => {
                    if let Ok(value) = eval(&assignment.value, &mut self.eval_ctx(frame)) {
                        if self.limits.atomic_sample {
                            pending_writes.push((assignment.variable.name.clone(), value));
                        } else {
                            self.store.set(self.request_id, assignment.variable.name.clone(), value);
                        }
                    }
                    // Evaluation errors are dropped silently (spec.md §3's
                    // assignment action: "on failure, silently drops").
                }
                Action::Capture(capture) => {
                    for (i, expr) in capture.arguments.iter().enumerate() {
                        let key = reserved_capture_name(expr).map_or_else(|| format!("arg{i}"), ToOwned::to_owned);
                        if let Ok(value) = eval(expr, &mut self.eval_ctx(frame)) {
                            accumulator.insert(key, truncate(&value, self.limits));
                        }
                    }
                    for (name, expr) in &capture.named_arguments {
                        if let Ok(value) = eval(expr, &mut self.eval_ctx(frame)) {
                            accumulator.insert(name.clone(), truncate(&value, self.limits));
                        }
                    }
                }
            }
        }

        if !fired {
            return ProbeOutcome::Dropped(DroppedReason::Sample);
        }

        if accumulator.is_empty() {
            return ProbeOutcome::Dropped(DroppedReason::Empty);
        }

        let as_map_value = Value::Map(accumulator.clone().into_iter().collect());
        if let Err(err) = check_capture_size(&as_map_value, self.limits) {
            return ProbeOutcome::Dropped(DroppedReason::Error(err));
        }

        if self.limits.atomic_sample {
            for (name, value) in pending_writes {
                self.store.set(self.request_id, name, value);
            }
        }

        ProbeOutcome::Emitted(accumulator)
    }

    fn eval_ctx<'b>(&'b mut self, frame: &'b FrameContext) -> EvalContext<'b> {
        EvalContext::new(frame, self.store, self.request_id, self.limits, self.clock, &mut *self.rng)
    }

    /// Runs every probe in `program` against `frame`, in declaration order,
    /// returning a `(probe_spec, record)` pair for each one that fires.
    ///
    /// A failing probe never suppresses a later one (spec.md §4.4: "MUST
    /// NOT short-circuit on errors").
    pub fn run_program(&mut self, program: &Program, frame: &FrameContext, tracer: &mut dyn ProbeTracer) -> Vec<(ProbeSpec, CaptureRecord)> {
        let mut fired = Vec::new();
        for probe in &program.probes {
            if let ProbeOutcome::Emitted(record) = self.execute(probe, frame, tracer) {
                fired.push((probe.spec.clone(), record));
            }
        }
        fired
    }
}

fn reserved_capture_name(expr: &Expression) -> Option<&str> {
    let Expression::Identifier(ident) = expr else {
        return None;
    };
    RESERVED_CAPTURE_NAMES.iter().find(|&&name| name == ident.name).copied()
}

/// Exposed only so tests can construct an error of a specific kind without
/// reaching into `error.rs` directly.
#[cfg(test)]
fn force_eval_error(message: &str) -> HogTraceError {
    HogTraceError::eval(message.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::SystemClock;
    use crate::frame::FrameContextBuilder;
    use crate::parser::parse;

    struct FixedRng(f64);
    impl RngSource for FixedRng {
        fn next_f64(&mut self) -> f64 {
            self.0
        }
    }

    fn run_single(source: &str, frame: &FrameContext, rng_value: f64) -> ProbeOutcome {
        let program = parse(source).unwrap();
        let probe = &program.probes[0];
        let store = RequestStore::new();
        let limits = Limits::default();
        let rate_limiter = RateLimiter::new();
        let clock = SystemClock;
        let mut rng = FixedRng(rng_value);
        let mut executor = ProbeExecutor::new(&store, RequestId::new(1), &limits, &rate_limiter, &clock, &mut rng);
        let mut tracer = crate::tracer::NoopTracer;
        executor.execute(probe, frame, &mut tracer)
    }

    #[test]
    fn predicate_gates_capture() {
        let source = "fn:t:entry / arg0 > 10 / { capture(value=arg0); }";
        let low = FrameContextBuilder::new().args([Value::Int(5)]).build();
        assert!(matches!(run_single(source, &low, 0.0), ProbeOutcome::Dropped(DroppedReason::PredicateFalse)));

        let high = FrameContextBuilder::new().args([Value::Int(15)]).build();
        let ProbeOutcome::Emitted(record) = run_single(source, &high, 0.0) else {
            panic!("expected a capture record");
        };
        assert_eq!(record.get("value"), Some(&Value::Int(15)));
    }

    #[test]
    fn named_and_positional_capture_keys() {
        let source = "fn:t:entry { capture(arg0, arg1, name=arg0); }";
        let frame = FrameContextBuilder::new().args([Value::Int(1), Value::Int(2)]).build();
        let ProbeOutcome::Emitted(record) = run_single(source, &frame, 0.0) else {
            panic!("expected a capture record");
        };
        assert_eq!(record.get("arg0"), Some(&Value::Int(1)));
        assert_eq!(record.get("arg1"), Some(&Value::Int(2)));
        assert_eq!(record.get("name"), Some(&Value::Int(1)));
    }

    #[test]
    fn reserved_identifier_capture_uses_its_own_name() {
        let source = "fn:t:return { capture(retval); }";
        let frame = FrameContextBuilder::new().retval(Value::Int(200)).build();
        let ProbeOutcome::Emitted(record) = run_single(source, &frame, 0.0) else {
            panic!("expected a capture record");
        };
        assert_eq!(record.get("retval"), Some(&Value::Int(200)));
        assert!(record.get("arg0").is_none());
    }

    #[test]
    fn sample_failure_drops_record_but_not_prior_assignment() {
        let source = "fn:t:entry { $req.before = 1; sample 10%; capture(x=1); }";
        let frame = FrameContext::new();
        let program = parse(source).unwrap();
        let probe = &program.probes[0];
        let store = RequestStore::new();
        let limits = Limits::default();
        let rate_limiter = RateLimiter::new();
        let clock = SystemClock;
        let mut rng = FixedRng(0.99); // misses a 10% threshold
        let mut executor = ProbeExecutor::new(&store, RequestId::new(9), &limits, &rate_limiter, &clock, &mut rng);
        let mut tracer = crate::tracer::NoopTracer;
        let outcome = executor.execute(probe, &frame, &mut tracer);
        assert!(matches!(outcome, ProbeOutcome::Dropped(DroppedReason::Sample)));
        assert_eq!(store.get(RequestId::new(9), "before"), Some(Value::Int(1)));
    }

    #[test]
    fn empty_accumulator_is_dropped() {
        let source = "fn:t:entry { $req.x = 1; }";
        let frame = FrameContext::new();
        assert!(matches!(run_single(source, &frame, 0.0), ProbeOutcome::Dropped(DroppedReason::Empty)));
    }

    #[test]
    fn program_runs_every_probe_independent_of_earlier_failures() {
        let source = "fn:a:entry / undefined_function() / { capture(x=1); } fn:b:entry { capture(y=2); }";
        let program = parse(source).unwrap();
        let frame = FrameContext::new();
        let store = RequestStore::new();
        let limits = Limits::default();
        let rate_limiter = RateLimiter::new();
        let clock = SystemClock;
        let mut rng = FixedRng(0.0);
        let mut executor = ProbeExecutor::new(&store, RequestId::new(1), &limits, &rate_limiter, &clock, &mut rng);
        let mut tracer = crate::tracer::NoopTracer;
        let fired = executor.run_program(&program, &frame, &mut tracer);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].0.full_spec, "fn:b:entry");
    }

    #[test]
    fn atomic_sample_discards_writes_when_probe_does_not_fire() {
        let source = "fn:t:entry { $req.before = 1; sample 10%; }";
        let frame = FrameContext::new();
        let program = parse(source).unwrap();
        let probe = &program.probes[0];
        let store = RequestStore::new();
        let limits = Limits::default().atomic_sample(true);
        let rate_limiter = RateLimiter::new();
        let clock = SystemClock;
        let mut rng = FixedRng(0.99);
        let mut executor = ProbeExecutor::new(&store, RequestId::new(3), &limits, &rate_limiter, &clock, &mut rng);
        let mut tracer = crate::tracer::NoopTracer;
        executor.execute(probe, &frame, &mut tracer);
        assert_eq!(store.get(RequestId::new(3), "before"), None);
    }

    #[test]
    fn oversized_capture_is_dropped_as_an_error() {
        let source = "fn:t:entry { capture(big=arg0); }";
        let frame = FrameContextBuilder::new().args([Value::Str("x".repeat(20_000))]).build();
        let program = parse(source).unwrap();
        let probe = &program.probes[0];
        let store = RequestStore::new();
        // Disable string-length truncation here so the capture still carries
        // the full 20,000-byte string through to the size check below.
        let limits = Limits::default().max_capture_string_length(usize::MAX);
        let rate_limiter = RateLimiter::new();
        let clock = SystemClock;
        let mut rng = FixedRng(0.0);
        let mut executor = ProbeExecutor::new(&store, RequestId::new(1), &limits, &rate_limiter, &clock, &mut rng);
        let mut tracer = crate::tracer::NoopTracer;
        let outcome = executor.execute(probe, &frame, &mut tracer);
        assert!(matches!(outcome, ProbeOutcome::Dropped(DroppedReason::Error(HogTraceError::CaptureSize { .. }))));
    }

    #[test]
    fn force_eval_error_is_wired_for_future_assertions() {
        assert!(matches!(force_eval_error("x"), HogTraceError::Eval { .. }));
    }
}
