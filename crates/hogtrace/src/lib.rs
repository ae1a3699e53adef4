#![doc = include_str!("../../../README.md")]

//! HogTrace: a sandboxed, DTrace-inspired probe scripting language.
//!
//! A probe program compiles source text (`parser.rs`) into a tree of
//! [`ast::Probe`]s, which is also its own serializable IR (`ir.rs`). At
//! runtime, [`vm::ProbeExecutor`] binds that tree against a
//! [`frame::FrameContext`] built by the embedding host, evaluates predicates
//! and actions through the sandboxed tree-walking `evaluator`, and
//! truncates/bounds whatever a `capture` action collects before it ever
//! leaves the VM.

pub mod ast;
pub mod builtins;
pub mod capability;
pub mod error;
pub mod evaluator;
pub mod frame;
pub mod ir;
pub mod lexer;
pub mod limits;
pub mod parser;
pub mod rate_limit;
pub mod request_store;
pub mod tracer;
pub mod truncate;
pub mod value;
pub mod vm;

pub use crate::ast::{Action, Probe, ProbeSpec, Program};
pub use crate::error::HogTraceError;
pub use crate::frame::{FrameContext, FrameContextBuilder};
pub use crate::ir::{IrDocument, IrError};
pub use crate::limits::Limits;
pub use crate::parser::{parse, ParseError};
pub use crate::rate_limit::RateLimiter;
pub use crate::request_store::{RequestId, RequestScope, RequestStore};
pub use crate::tracer::{DroppedReason, NoopTracer, ProbeTracer, RecordingTracer, TraceEvent, TracingProbeTracer};
pub use crate::value::Value;
pub use crate::vm::{CaptureRecord, ProbeExecutor, ProbeOutcome};
