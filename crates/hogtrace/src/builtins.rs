//! The fixed builtin function table (spec.md §4.7).
//!
//! Calls to anything not in this table fail with
//! [`crate::error::HogTraceError::UnknownFunction`] — there is no dynamic
//! dispatch to host-language functions from inside a probe expression.

use rand::Rng;

use crate::error::HogTraceError;
use crate::value::Value;

/// Wall-clock and RNG access the evaluator can't provide deterministically
/// by itself (spec.md §8 "Determinism modulo `rand`/`timestamp`"); callers
/// supply their own clock/RNG so tests can pin both.
pub trait Clock {
    /// Milliseconds since the Unix epoch, used for the work-quantum timeout
    /// budget (`evaluator::EvalContext`), not for the `timestamp()` builtin.
    fn now_unix_ms(&self) -> u64;

    /// Wall-clock seconds since the Unix epoch as a float, matching
    /// spec.md §4.7's `timestamp()` contract ("monotonic or wall-clock
    /// float seconds") and `original_source/hogtrace/builtins.py`'s
    /// `time.time()`. Default implementation derives it from
    /// [`Clock::now_unix_ms`].
    fn now_unix_seconds(&self) -> f64 {
        self.now_unix_ms() as f64 / 1000.0
    }
}

/// A clock backed by [`std::time::SystemTime`], used outside of tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }

    fn now_unix_seconds(&self) -> f64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// Calls a builtin by name with already-evaluated arguments.
///
/// # Errors
///
/// Returns [`HogTraceError::UnknownFunction`] if `name` isn't one of the
/// fixed builtins, or [`HogTraceError::Eval`] if the arguments don't match
/// what the builtin expects.
pub fn call(name: &str, args: &[Value], clock: &dyn Clock, rng: &mut dyn RngSource) -> Result<Value, HogTraceError> {
    match name {
        "timestamp" => {
            require_arity(name, args, 0)?;
            Ok(Value::Float(clock.now_unix_seconds()))
        }
        "rand" => {
            require_arity(name, args, 0)?;
            Ok(Value::Float(rng.next_f64()))
        }
        "len" => {
            require_arity(name, args, 1)?;
            match &args[0] {
                Value::Str(s) => Ok(Value::Int(i64::try_from(s.chars().count()).unwrap_or(i64::MAX))),
                Value::List(items) => Ok(Value::Int(i64::try_from(items.len()).unwrap_or(i64::MAX))),
                Value::Map(map) => Ok(Value::Int(i64::try_from(map.len()).unwrap_or(i64::MAX))),
                other => Err(HogTraceError::eval(format!("len() does not accept {}", other.type_name()))),
            }
        }
        "str" => {
            require_arity(name, args, 1)?;
            Ok(Value::Str(args[0].to_string()))
        }
        "int" => {
            require_arity(name, args, 1)?;
            to_int(&args[0]).map(Value::Int)
        }
        "float" => {
            require_arity(name, args, 1)?;
            args[0]
                .as_f64()
                .map(Value::Float)
                .or_else(|| match &args[0] {
                    Value::Str(s) => s.trim().parse::<f64>().ok().map(Value::Float),
                    _ => None,
                })
                .ok_or_else(|| HogTraceError::eval(format!("cannot convert {} to float", args[0].type_name())))
        }
        "bool" => {
            require_arity(name, args, 1)?;
            Ok(Value::Bool(args[0].truthy()))
        }
        "abs" => {
            require_arity(name, args, 1)?;
            match &args[0] {
                Value::Int(i) => Ok(Value::Int(i.abs())),
                Value::Float(f) => Ok(Value::Float(f.abs())),
                other => Err(HogTraceError::eval(format!("abs() does not accept {}", other.type_name()))),
            }
        }
        "min" => reduce_numeric(name, args, |a, b| if a < b { a } else { b }),
        "max" => reduce_numeric(name, args, |a, b| if a > b { a } else { b }),
        "sum" => {
            require_arity(name, args, 1)?;
            let Value::List(items) = &args[0] else {
                return Err(HogTraceError::eval("sum() requires a list argument"));
            };
            let mut total = 0.0;
            for item in items {
                total += item
                    .as_f64()
                    .ok_or_else(|| HogTraceError::eval(format!("sum() cannot add {}", item.type_name())))?;
            }
            Ok(Value::Float(total))
        }
        "round" => {
            if args.len() == 1 {
                let f = numeric_arg(&args[0])?;
                Ok(Value::Int(f.round() as i64))
            } else if args.len() == 2 {
                let f = numeric_arg(&args[0])?;
                let Value::Int(ndigits) = args[1] else {
                    return Err(HogTraceError::eval("round() second argument must be an int"));
                };
                let factor = 10f64.powi(i32::try_from(ndigits).unwrap_or(0));
                Ok(Value::Float((f * factor).round() / factor))
            } else {
                Err(arity_error(name, args.len()))
            }
        }
        "upper" => string_map(name, args, str::to_uppercase),
        "lower" => string_map(name, args, str::to_lowercase),
        "strip" => string_map(name, args, |s| s.trim().to_owned()),
        "isinstance" => {
            require_arity(name, args, 2)?;
            let Value::Str(type_name) = &args[1] else {
                return Err(HogTraceError::eval("isinstance() second argument must be a type name string"));
            };
            Ok(Value::Bool(args[0].type_name() == type_name))
        }
        "hasattr" | "getattr" => Err(HogTraceError::eval(format!(
            "{name}() requires host-object attribute policy, call it through capability::attr"
        ))),
        _ => Err(HogTraceError::UnknownFunction { name: name.to_owned() }),
    }
}

/// A source of randomness for the `rand()` builtin. Kept as a trait object
/// rather than a concrete RNG so tests can supply a fixed sequence.
pub trait RngSource {
    fn next_f64(&mut self) -> f64;
}

/// The production RNG: ChaCha-seeded from the OS, not required to be
/// reproducible across runs.
#[derive(Debug)]
pub struct DefaultRng(rand_chacha::ChaCha8Rng);

impl Default for DefaultRng {
    fn default() -> Self {
        use rand::SeedableRng;
        Self(rand_chacha::ChaCha8Rng::from_entropy())
    }
}

impl RngSource for DefaultRng {
    fn next_f64(&mut self) -> f64 {
        self.0.gen_range(0.0..1.0)
    }
}

fn numeric_arg(value: &Value) -> Result<f64, HogTraceError> {
    value
        .as_f64()
        .ok_or_else(|| HogTraceError::eval(format!("expected a number, found {}", value.type_name())))
}

fn to_int(value: &Value) -> Result<i64, HogTraceError> {
    match value {
        Value::Int(i) => Ok(*i),
        #[allow(clippy::cast_possible_truncation, reason = "matches host-language int() truncation toward zero")]
        Value::Float(f) => Ok(*f as i64),
        Value::Bool(b) => Ok(i64::from(*b)),
        Value::Str(s) => s.trim().parse().map_err(|_| HogTraceError::eval(format!("cannot convert '{s}' to int"))),
        other => Err(HogTraceError::eval(format!("cannot convert {} to int", other.type_name()))),
    }
}

fn require_arity(name: &str, args: &[Value], expected: usize) -> Result<(), HogTraceError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(arity_error(name, args.len()))
    }
}

fn arity_error(name: &str, found: usize) -> HogTraceError {
    HogTraceError::eval(format!("{name}() called with {found} arguments"))
}

fn reduce_numeric(name: &str, args: &[Value], pick: impl Fn(f64, f64) -> f64) -> Result<Value, HogTraceError> {
    let values: Vec<f64> = if args.len() == 1 {
        match &args[0] {
            Value::List(items) => items.iter().map(numeric_arg).collect::<Result<_, _>>()?,
            other => vec![numeric_arg(other)?],
        }
    } else {
        args.iter().map(numeric_arg).collect::<Result<_, _>>()?
    };
    values
        .into_iter()
        .reduce(pick)
        .map(Value::Float)
        .ok_or_else(|| HogTraceError::eval(format!("{name}() requires at least one argument")))
}

fn string_map(name: &str, args: &[Value], f: impl Fn(&str) -> String) -> Result<Value, HogTraceError> {
    require_arity(name, args, 1)?;
    let Value::Str(s) = &args[0] else {
        return Err(HogTraceError::eval(format!("{name}() requires a string argument")));
    };
    Ok(Value::Str(f(s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedClock(u64);
    impl Clock for FixedClock {
        fn now_unix_ms(&self) -> u64 {
            self.0
        }
    }

    struct FixedRng(f64);
    impl RngSource for FixedRng {
        fn next_f64(&mut self) -> f64 {
            self.0
        }
    }

    #[test]
    fn timestamp_reads_from_clock_as_float_seconds() {
        let clock = FixedClock(12345);
        let mut rng = FixedRng(0.5);
        let result = call("timestamp", &[], &clock, &mut rng).unwrap();
        assert_eq!(result, Value::Float(12.345));
    }

    #[test]
    fn len_supports_str_list_map() {
        let clock = FixedClock(0);
        let mut rng = FixedRng(0.0);
        assert_eq!(call("len", &[Value::Str("abc".into())], &clock, &mut rng).unwrap(), Value::Int(3));
        assert_eq!(
            call("len", &[Value::List(vec![Value::Int(1), Value::Int(2)])], &clock, &mut rng).unwrap(),
            Value::Int(2)
        );
    }

    #[test]
    fn unknown_function_is_rejected() {
        let clock = FixedClock(0);
        let mut rng = FixedRng(0.0);
        let err = call("eval", &[], &clock, &mut rng).unwrap_err();
        assert!(matches!(err, HogTraceError::UnknownFunction { .. }));
    }

    #[test]
    fn min_max_over_a_list() {
        let clock = FixedClock(0);
        let mut rng = FixedRng(0.0);
        let list = Value::List(vec![Value::Int(3), Value::Int(1), Value::Int(2)]);
        assert_eq!(call("min", &[list.clone()], &clock, &mut rng).unwrap(), Value::Float(1.0));
        assert_eq!(call("max", &[list], &clock, &mut rng).unwrap(), Value::Float(3.0));
    }

    #[test]
    fn round_with_and_without_ndigits() {
        let clock = FixedClock(0);
        let mut rng = FixedRng(0.0);
        assert_eq!(call("round", &[Value::Float(2.6)], &clock, &mut rng).unwrap(), Value::Int(3));
        assert_eq!(
            call("round", &[Value::Float(2.567), Value::Int(2)], &clock, &mut rng).unwrap(),
            Value::Float(2.57)
        );
    }
}
