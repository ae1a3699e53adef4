//! Tree-walking expression evaluator (spec.md §4.3).

use crate::ast::{BinaryOp, BinaryOperator, Expression, FieldAccess, FunctionCall, IndexAccess, UnaryOp, UnaryOperator};
use crate::builtins::{self, Clock, RngSource};
use crate::capability::{self, HostObject};
use crate::error::{recursion_error, HogTraceError};
use crate::frame::FrameContext;
use crate::limits::Limits;
use crate::request_store::{RequestId, RequestStore};
use crate::value::Value;

/// Everything an expression evaluation needs that isn't part of the AST
/// itself: the binding environment, the request store, resource limits,
/// and the host's clock/RNG. Grouped into one struct so the evaluator's
/// recursive methods don't grow an unmanageable parameter list.
pub struct EvalContext<'a> {
    pub frame: &'a FrameContext,
    pub store: &'a RequestStore,
    pub request_id: RequestId,
    pub limits: &'a Limits,
    pub clock: &'a dyn Clock,
    pub rng: &'a mut dyn RngSource,
    depth: u32,
    /// Work-quantum counter: a simpler, portable stand-in for a wall-clock
    /// timeout. Every node visited consumes one unit; when the budget is
    /// exhausted, evaluation fails with `HogTraceError::Timeout` without
    /// depending on signals or a host-provided deadline clock (spec.md §5).
    work_remaining: u64,
}

impl<'a> EvalContext<'a> {
    #[must_use]
    pub fn new(
        frame: &'a FrameContext,
        store: &'a RequestStore,
        request_id: RequestId,
        limits: &'a Limits,
        clock: &'a dyn Clock,
        rng: &'a mut dyn RngSource,
    ) -> Self {
        let work_budget = limits.max_predicate_time_ms.map_or(u64::MAX, |ms| ms.saturating_mul(10_000));
        Self {
            frame,
            store,
            request_id,
            limits,
            clock,
            rng,
            depth: 0,
            work_remaining: work_budget,
        }
    }

    fn tick(&mut self) -> Result<(), HogTraceError> {
        if self.work_remaining == 0 {
            return Err(HogTraceError::Timeout {
                budget_ms: self.limits.max_predicate_time_ms.unwrap_or(0),
            });
        }
        self.work_remaining -= 1;
        Ok(())
    }

    fn enter(&mut self) -> Result<(), HogTraceError> {
        self.depth += 1;
        if self.depth > self.limits.max_recursion_depth {
            return Err(recursion_error(self.limits));
        }
        Ok(())
    }

    fn exit(&mut self) {
        self.depth -= 1;
    }
}

/// Evaluates `expr` against `ctx`. The sole entry point the VM and tests
/// call into; everything else in this module is a private recursive
/// helper.
///
/// # Errors
///
/// Returns a [`HogTraceError`] if evaluation hits a resource limit, an
/// unsafe attribute, an unknown function, or a type error.
pub fn eval(expr: &Expression, ctx: &mut EvalContext<'_>) -> Result<Value, HogTraceError> {
    ctx.tick()?;
    ctx.enter()?;
    let result = eval_inner(expr, ctx);
    ctx.exit();
    result
}

fn eval_inner(expr: &Expression, ctx: &mut EvalContext<'_>) -> Result<Value, HogTraceError> {
    match expr {
        Expression::Literal(lit) => Ok(literal_value(lit)),
        Expression::Identifier(ident) => Ok(ctx.frame.get(&ident.name).cloned().unwrap_or(Value::Null)),
        Expression::RequestVar(var) => Ok(ctx.store.get(ctx.request_id, &var.name).unwrap_or(Value::Null)),
        Expression::FieldAccess(node) => eval_field_access(node, ctx),
        Expression::IndexAccess(node) => eval_index_access(node, ctx),
        Expression::FunctionCall(node) => eval_function_call(node, ctx),
        Expression::BinaryOp(node) => eval_binary_op(node, ctx),
        Expression::UnaryOp(node) => eval_unary_op(node, ctx),
    }
}

fn literal_value(lit: &crate::ast::Literal) -> Value {
    match &lit.value {
        crate::ast::LiteralValue::Null => Value::Null,
        crate::ast::LiteralValue::Bool(b) => Value::Bool(*b),
        crate::ast::LiteralValue::Int(i) => Value::Int(*i),
        crate::ast::LiteralValue::Float(f) => Value::Float(*f),
        crate::ast::LiteralValue::Str(s) => Value::Str(s.clone()),
    }
}

fn eval_field_access(node: &FieldAccess, ctx: &mut EvalContext<'_>) -> Result<Value, HogTraceError> {
    let object = eval(&node.object, ctx)?;
    match object {
        Value::Null => Ok(Value::Null),
        Value::Map(map) => Ok(map.get(&node.field).cloned().unwrap_or(Value::Null)),
        Value::Host(obj) => Ok(capability::attr(obj.as_ref(), &node.field, ctx.limits)?.unwrap_or(Value::Null)),
        other => Err(HogTraceError::eval(format!("{} has no attribute '{}'", other.type_name(), node.field))),
    }
}

fn eval_index_access(node: &IndexAccess, ctx: &mut EvalContext<'_>) -> Result<Value, HogTraceError> {
    let object = eval(&node.object, ctx)?;
    let index = eval(&node.index, ctx)?;
    match object {
        Value::Null => Ok(Value::Null),
        Value::List(items) => {
            let Some(i) = as_index(&index) else {
                return Ok(Value::Null);
            };
            Ok(usize::try_from(i).ok().and_then(|i| items.get(i)).cloned().unwrap_or(Value::Null))
        }
        Value::Map(map) => {
            let Value::Str(key) = &index else {
                return Ok(Value::Null);
            };
            Ok(map.get(key).cloned().unwrap_or(Value::Null))
        }
        Value::Str(s) => {
            let Some(i) = as_index(&index) else {
                return Ok(Value::Null);
            };
            Ok(usize::try_from(i)
                .ok()
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::Str(c.to_string()))
                .unwrap_or(Value::Null))
        }
        Value::Host(obj) => Ok(capability::index(obj.as_ref(), &index).unwrap_or(Value::Null)),
        other => Err(HogTraceError::eval(format!("{} is not indexable", other.type_name()))),
    }
}

fn as_index(value: &Value) -> Option<i64> {
    match value {
        Value::Int(i) => Some(*i),
        _ => None,
    }
}

fn eval_function_call(node: &FunctionCall, ctx: &mut EvalContext<'_>) -> Result<Value, HogTraceError> {
    let mut args = Vec::with_capacity(node.arguments.len());
    for arg in &node.arguments {
        args.push(eval(arg, ctx)?);
    }
    builtins::call(&node.function, &args, ctx.clock, ctx.rng)
}

fn eval_binary_op(node: &BinaryOp, ctx: &mut EvalContext<'_>) -> Result<Value, HogTraceError> {
    // && and || short-circuit: the right operand is only evaluated (and
    // only charged against the recursion/work budget) when necessary.
    match node.operator {
        BinaryOperator::And => {
            let left = eval(&node.left, ctx)?;
            if !left.truthy() {
                return Ok(Value::Bool(false));
            }
            return Ok(Value::Bool(eval(&node.right, ctx)?.truthy()));
        }
        BinaryOperator::Or => {
            let left = eval(&node.left, ctx)?;
            if left.truthy() {
                return Ok(Value::Bool(true));
            }
            return Ok(Value::Bool(eval(&node.right, ctx)?.truthy()));
        }
        _ => {}
    }

    let left = eval(&node.left, ctx)?;
    let right = eval(&node.right, ctx)?;

    match node.operator {
        BinaryOperator::Eq => Ok(Value::Bool(left == right)),
        BinaryOperator::Ne => Ok(Value::Bool(left != right)),
        BinaryOperator::Lt | BinaryOperator::Gt | BinaryOperator::Le | BinaryOperator::Ge => compare(node.operator, &left, &right),
        BinaryOperator::Add => arithmetic_or_concat(&left, &right),
        BinaryOperator::Sub | BinaryOperator::Mul | BinaryOperator::Div | BinaryOperator::Mod => arithmetic(node.operator, &left, &right),
        BinaryOperator::And | BinaryOperator::Or => unreachable!("handled above with short-circuit evaluation"),
    }
}

fn compare(op: BinaryOperator, left: &Value, right: &Value) -> Result<Value, HogTraceError> {
    if let (Value::Str(a), Value::Str(b)) = (left, right) {
        let ord = a.cmp(b);
        return Ok(Value::Bool(match op {
            BinaryOperator::Lt => ord.is_lt(),
            BinaryOperator::Gt => ord.is_gt(),
            BinaryOperator::Le => ord.is_le(),
            BinaryOperator::Ge => ord.is_ge(),
            _ => unreachable!(),
        }));
    }
    let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
        return Err(HogTraceError::eval(format!(
            "cannot compare {} and {}",
            left.type_name(),
            right.type_name()
        )));
    };
    Ok(Value::Bool(match op {
        BinaryOperator::Lt => a < b,
        BinaryOperator::Gt => a > b,
        BinaryOperator::Le => a <= b,
        BinaryOperator::Ge => a >= b,
        _ => unreachable!(),
    }))
}

fn arithmetic_or_concat(left: &Value, right: &Value) -> Result<Value, HogTraceError> {
    if let (Value::Str(a), Value::Str(b)) = (left, right) {
        return Ok(Value::Str(format!("{a}{b}")));
    }
    arithmetic(BinaryOperator::Add, left, right)
}

fn arithmetic(op: BinaryOperator, left: &Value, right: &Value) -> Result<Value, HogTraceError> {
    if let (Value::Int(a), Value::Int(b)) = (left, right) {
        return int_arithmetic(op, *a, *b);
    }
    let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
        return Err(HogTraceError::eval(format!(
            "unsupported operand types for arithmetic: {} and {}",
            left.type_name(),
            right.type_name()
        )));
    };
    float_arithmetic(op, a, b)
}

fn int_arithmetic(op: BinaryOperator, a: i64, b: i64) -> Result<Value, HogTraceError> {
    match op {
        BinaryOperator::Add => Ok(Value::Int(a.wrapping_add(b))),
        BinaryOperator::Sub => Ok(Value::Int(a.wrapping_sub(b))),
        BinaryOperator::Mul => Ok(Value::Int(a.wrapping_mul(b))),
        BinaryOperator::Div => {
            if b == 0 {
                Err(HogTraceError::eval("division by zero"))
            } else {
                Ok(Value::Float(a as f64 / b as f64))
            }
        }
        BinaryOperator::Mod => {
            if b == 0 {
                Err(HogTraceError::eval("modulo by zero"))
            } else {
                Ok(Value::Int(a.rem_euclid(b)))
            }
        }
        _ => unreachable!("non-arithmetic operator reached int_arithmetic"),
    }
}

fn float_arithmetic(op: BinaryOperator, a: f64, b: f64) -> Result<Value, HogTraceError> {
    match op {
        BinaryOperator::Add => Ok(Value::Float(a + b)),
        BinaryOperator::Sub => Ok(Value::Float(a - b)),
        BinaryOperator::Mul => Ok(Value::Float(a * b)),
        BinaryOperator::Div => {
            if b == 0.0 {
                Err(HogTraceError::eval("division by zero"))
            } else {
                Ok(Value::Float(a / b))
            }
        }
        BinaryOperator::Mod => {
            if b == 0.0 {
                Err(HogTraceError::eval("modulo by zero"))
            } else {
                Ok(Value::Float(a.rem_euclid(b)))
            }
        }
        _ => unreachable!("non-arithmetic operator reached float_arithmetic"),
    }
}

fn eval_unary_op(node: &UnaryOp, ctx: &mut EvalContext<'_>) -> Result<Value, HogTraceError> {
    let operand = eval(&node.operand, ctx)?;
    match node.operator {
        UnaryOperator::Not => Ok(Value::Bool(!operand.truthy())),
        UnaryOperator::Neg => match operand {
            Value::Int(i) => Ok(Value::Int(-i)),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(HogTraceError::eval(format!("cannot negate {}", other.type_name()))),
        },
        UnaryOperator::Pos => match operand {
            Value::Int(_) | Value::Float(_) => Ok(operand),
            other => Err(HogTraceError::eval(format!("unary '+' not supported for {}", other.type_name()))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::{Clock, RngSource};
    use crate::parser::parse;
    use crate::request_store::RequestStore;

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

    fn eval_str(expr_source: &str, frame: &FrameContext) -> Result<Value, HogTraceError> {
        let program = parse(&format!("a:b:c / {expr_source} / {{ capture(unused=1); }}")).unwrap();
        let predicate = program.probes[0].predicate.as_ref().unwrap();
        let store = RequestStore::new();
        let limits = Limits::default();
        let clock = FixedClock(1000);
        let mut rng = FixedRng(0.5);
        let mut ctx = EvalContext::new(frame, &store, RequestId::new(1), &limits, &clock, &mut rng);
        eval(&predicate.expression, &mut ctx)
    }

    #[test]
    fn arithmetic_and_comparison() {
        let frame = FrameContext::new();
        assert_eq!(eval_str("1 + 2 * 3 == 7", &frame).unwrap(), Value::Bool(true));
    }

    #[test]
    fn short_circuit_and_skips_right_operand_errors() {
        let frame = FrameContext::new();
        assert_eq!(eval_str("false && undefined_function()", &frame).unwrap(), Value::Bool(false));
    }

    #[test]
    fn short_circuit_or_skips_right_operand_errors() {
        let frame = FrameContext::new();
        assert_eq!(eval_str("true || undefined_function()", &frame).unwrap(), Value::Bool(true));
    }

    #[test]
    fn missing_identifier_is_null_not_error() {
        let frame = FrameContext::new();
        assert_eq!(eval_str("missing == null", &frame).unwrap(), Value::Bool(true));
    }

    #[test]
    fn unknown_function_errors() {
        let frame = FrameContext::new();
        let err = eval_str("nope()", &frame).unwrap_err();
        assert!(matches!(err, HogTraceError::UnknownFunction { .. }));
    }

    #[test]
    fn recursion_limit_is_enforced() {
        let frame = FrameContext::new();
        let mut expr_source = String::from("1");
        for _ in 0..200 {
            expr_source = format!("({expr_source} + 1)");
        }
        let err = eval_str(&format!("{expr_source} > 0"), &frame).unwrap_err();
        assert!(matches!(err, HogTraceError::Recursion { .. }));
    }
}
