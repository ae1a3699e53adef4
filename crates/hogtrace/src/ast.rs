//! Typed AST for HogTrace programs.
//!
//! This *is* the IR: each node derives `Serialize`/`Deserialize` with a
//! `type` tag matching spec.md §4.2's wire shape one-to-one, so there is no
//! separate lowering step between "parsed form" and "wire form" — the
//! parser builds this tree directly and `ir.rs` only adds the version
//! envelope and roundtrip guarantees around it.

use serde::{Deserialize, Serialize};

/// An ordered sequence of probes; the unit of compile, serialization, and
/// execution (spec.md §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Program {
    pub probes: Vec<Probe>,
}

/// A `(ProbeSpec, optional Predicate, ordered Actions)` tuple.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Probe {
    pub spec: ProbeSpec,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub predicate: Option<Predicate>,
    pub actions: Vec<Action>,
}

/// Opaque to the VM: used only by the external attach layer to decide
/// where to invoke the probe (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProbeSpec {
    pub provider: String,
    pub module_function: String,
    pub probe_point: String,
    pub full_spec: String,
}

impl ProbeSpec {
    #[must_use]
    pub fn new(provider: impl Into<String>, module_function: impl Into<String>, probe_point: impl Into<String>) -> Self {
        let provider = provider.into();
        let module_function = module_function.into();
        let probe_point = probe_point.into();
        let full_spec = format!("{provider}:{module_function}:{probe_point}");
        Self {
            provider,
            module_function,
            probe_point,
            full_spec,
        }
    }
}

/// A single boolean expression gating a probe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Predicate {
    pub expression: Expression,
}

/// One VM-level action. Actions execute in declaration order (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Sample(SampleAction),
    Assignment(AssignmentAction),
    Capture(CaptureAction),
}

/// Either a percentage (`sample 10%`) or a ratio (`sample 1/100`), folded
/// at parse time to a normalized fraction in `[0, 1]` (spec.md §4.1).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SampleAction {
    pub is_percentage: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub percentage: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub numerator: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub denominator: Option<u64>,
    /// Normalized threshold in `[0, 1]`: `percentage / 100` or
    /// `numerator / denominator`.
    pub threshold: f64,
}

/// `$req.name = expr`. Only a request-var reference is assignable (spec.md
/// §4.1 builder responsibilities); the parser rejects anything else.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssignmentAction {
    pub variable: RequestVar,
    pub value: Expression,
}

/// `capture(...)` / `send(...)`. Positional arguments capture under
/// `arg<i>` unless the argument AST is a reserved identifier (`args`,
/// `kwargs`, `locals`, `globals`, `retval`, `exception`, `self`), in which
/// case that name is used; named arguments always capture under the given
/// name (spec.md §4.4 step 4).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureAction {
    pub function: String,
    pub arguments: Vec<Expression>,
    #[serde(default)]
    pub named_arguments: Vec<(String, Expression)>,
}

/// A tagged expression node. Every variant carries `raw`, the source
/// snippet it was parsed from, for diagnostics (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Expression {
    Literal(Literal),
    Identifier(Identifier),
    RequestVar(RequestVar),
    FieldAccess(FieldAccess),
    IndexAccess(IndexAccess),
    FunctionCall(FunctionCall),
    BinaryOp(BinaryOp),
    UnaryOp(UnaryOp),
}

impl Expression {
    /// The raw source snippet this node was parsed from, used in
    /// diagnostics and debug captures.
    #[must_use]
    pub fn raw(&self) -> &str {
        match self {
            Self::Literal(l) => &l.raw,
            Self::Identifier(i) => &i.raw,
            Self::RequestVar(r) => &r.raw,
            Self::FieldAccess(f) => &f.raw,
            Self::IndexAccess(i) => &i.raw,
            Self::FunctionCall(c) => &c.raw,
            Self::BinaryOp(b) => &b.raw,
            Self::UnaryOp(u) => &u.raw,
        }
    }
}

/// `int`, `float`, `string`, `bool`, or `null` (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Literal {
    pub value: LiteralValue,
    pub raw: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum LiteralValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// A bare identifier, bound from the `FrameContext` (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Identifier {
    pub name: String,
    pub raw: String,
}

/// `$req.name` / `$request.name`, resolved against the `RequestStore`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestVar {
    pub name: String,
    pub prefix: String,
    pub raw: String,
}

/// `obj.field`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldAccess {
    pub object: Box<Expression>,
    pub field: String,
    pub raw: String,
}

/// `obj[index]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexAccess {
    pub object: Box<Expression>,
    pub index: Box<Expression>,
    pub raw: String,
}

/// `name(args...)`, restricted at evaluation time to the fixed builtin
/// table (spec.md §4.7).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub function: String,
    pub arguments: Vec<Expression>,
    pub raw: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BinaryOp {
    pub operator: BinaryOperator,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
    pub raw: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOperator {
    Not,
    Neg,
    Pos,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnaryOp {
    pub operator: UnaryOperator,
    pub operand: Box<Expression>,
    pub raw: String,
}
