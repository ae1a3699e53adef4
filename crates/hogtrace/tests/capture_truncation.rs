//! Capture bounding (spec.md §4.5, §8 scenario 6) and the *Null tolerance* /
//! *Private attribute default* universal invariants, driven through the
//! full VM pipeline rather than `truncate.rs`'s unit tests so the size
//! check, the rate limiter, and the capability policy all run together as
//! an embedder would actually see them.

use hogtrace::builtins::{RngSource, SystemClock};
use hogtrace::capability::HostObject;
use hogtrace::error::HogTraceError;
use hogtrace::frame::FrameContextBuilder;
use hogtrace::limits::Limits;
use hogtrace::parser::parse;
use hogtrace::rate_limit::RateLimiter;
use hogtrace::request_store::{RequestId, RequestStore};
use hogtrace::tracer::{DroppedReason, NoopTracer};
use hogtrace::value::Value;
use hogtrace::vm::{CaptureRecord, ProbeExecutor, ProbeOutcome};
use indexmap::IndexMap;
use pretty_assertions::assert_eq;

struct FixedRng(f64);
impl RngSource for FixedRng {
    fn next_f64(&mut self) -> f64 {
        self.0
    }
}

fn execute(source: &str, arg0: Value, limits: &Limits) -> ProbeOutcome {
    let program = parse(source).unwrap();
    let probe = &program.probes[0];
    let frame = FrameContextBuilder::new().args([arg0]).build();
    let store = RequestStore::new();
    let rate_limiter = RateLimiter::new();
    let clock = SystemClock;
    let mut rng = FixedRng(0.0);
    let mut executor = ProbeExecutor::new(&store, RequestId::new(1), limits, &rate_limiter, &clock, &mut rng);
    let mut tracer = NoopTracer;
    executor.execute(probe, &frame, &mut tracer)
}

fn expect_record(source: &str, arg0: Value, limits: &Limits) -> CaptureRecord {
    match execute(source, arg0, limits) {
        ProbeOutcome::Emitted(record) => record,
        other => panic!("expected a capture record, got {other:?}"),
    }
}

#[test]
fn item_count_truncation_keeps_a_prefix_and_appends_a_marker() {
    let items = Value::List((0..10).map(Value::Int).collect());
    let limits = Limits::default().max_capture_items(3);
    let record = expect_record("fn:t:entry { capture(result=arg0); }", items, &limits);
    let Some(Value::List(truncated)) = record.get("result") else {
        panic!("expected result to be a list");
    };
    assert_eq!(truncated.len(), 4); // 3 kept + 1 marker
    assert_eq!(truncated[3], Value::Str("... 7 more".to_owned()));
}

#[test]
fn oversized_capture_is_dropped_as_an_error_rather_than_silently_truncated() {
    // String-length truncation would otherwise cut this 20,000-byte string
    // down to `max_capture_string_length` chars before the size check ever
    // sees it, so raise that limit out of the way for this test.
    let limits = Limits::default().max_capture_string_length(usize::MAX);
    let outcome = execute("fn:t:entry { capture(big=arg0); }", Value::Str("x".repeat(20_000)), &limits);
    assert!(matches!(
        outcome,
        ProbeOutcome::Dropped(DroppedReason::Error(HogTraceError::CaptureSize { .. }))
    ));
}

#[test]
fn long_strings_are_truncated_with_a_length_sentinel_before_the_size_check() {
    let limits = Limits::default().max_capture_string_length(10);
    let record = expect_record("fn:t:entry { capture(value=arg0); }", Value::Str("x".repeat(50)), &limits);
    let Some(Value::Str(truncated)) = record.get("value") else {
        panic!("expected a string");
    };
    assert!(truncated.contains("(50 chars total)"));
    assert!(truncated.starts_with("xxxxxxxxxx"));
}

#[test]
fn missing_map_attribute_evaluates_to_null_instead_of_erroring() {
    let limits = Limits::default();
    let record = expect_record("fn:t:entry { capture(value=arg0.missing); }", Value::Map(IndexMap::new()), &limits);
    assert_eq!(record.get("value"), Some(&Value::Null));
}

#[test]
fn missing_list_index_and_missing_map_key_both_evaluate_to_null() {
    let limits = Limits::default();
    let list_record = expect_record(
        "fn:t:entry { capture(value=arg0[10]); }",
        Value::List(vec![Value::Int(1)]),
        &limits,
    );
    assert_eq!(list_record.get("value"), Some(&Value::Null));

    let mut map = IndexMap::new();
    map.insert("present".to_owned(), Value::Int(1));
    let map_record = expect_record("fn:t:entry { capture(value=arg0[\"absent\"]); }", Value::Map(map), &limits);
    assert_eq!(map_record.get("value"), Some(&Value::Null));
}

#[test]
fn unset_request_variable_reads_as_null() {
    let limits = Limits::default();
    let record = expect_record(
        "fn:t:entry { capture(value=$req.never_written); }",
        Value::Null,
        &limits,
    );
    assert_eq!(record.get("value"), Some(&Value::Null));
}

#[test]
fn unbound_identifier_reads_as_null() {
    let limits = Limits::default();
    let record = expect_record("fn:t:entry { capture(value=totally_unbound_name); }", Value::Null, &limits);
    assert_eq!(record.get("value"), Some(&Value::Null));
}

/// Default limits reject a leading-underscore attribute on a host object.
/// The read fails, so the one capture argument referencing it is silently
/// dropped (spec.md §3's per-action error policy) and the probe overall
/// drops as empty rather than panicking or propagating to the host
/// (spec.md §8 "Safety").
#[test]
fn private_attribute_read_is_rejected_and_the_probe_drops_as_empty() {
    #[derive(Debug)]
    struct Secretive;

    impl HostObject for Secretive {
        fn attr(&self, name: &str) -> Option<Value> {
            match name {
                "_token" => Some(Value::Str("shh".to_owned())),
                "public" => Some(Value::Int(1)),
                _ => None,
            }
        }
        fn index(&self, _key: &Value) -> Option<Value> {
            None
        }
        fn repr(&self) -> String {
            "Secretive".to_owned()
        }
    }

    let limits = Limits::default();
    let outcome = execute(
        "fn:t:entry { capture(value=arg0._token); }",
        Value::Host(std::sync::Arc::new(Secretive)),
        &limits,
    );
    assert!(matches!(outcome, ProbeOutcome::Dropped(DroppedReason::Empty)));
}

#[test]
fn relaxed_limits_allow_reading_a_private_attribute() {
    #[derive(Debug)]
    struct Secretive;

    impl HostObject for Secretive {
        fn attr(&self, name: &str) -> Option<Value> {
            match name {
                "_token" => Some(Value::Str("shh".to_owned())),
                _ => None,
            }
        }
        fn index(&self, _key: &Value) -> Option<Value> {
            None
        }
        fn repr(&self) -> String {
            "Secretive".to_owned()
        }
    }

    let limits = Limits::default().allow_private_attributes(true);
    let record = expect_record(
        "fn:t:entry { capture(value=arg0._token); }",
        Value::Host(std::sync::Arc::new(Secretive)),
        &limits,
    );
    assert_eq!(record.get("value"), Some(&Value::Str("shh".to_owned())));
}
