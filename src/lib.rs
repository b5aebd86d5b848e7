// Rust 1.93+ triggers false positives on thiserror/miette derive macro fields
#![allow(unused_assignments)]

//! Iridium Script
//!
//! An embeddable expression and scripting engine with C#-like syntax.
//! Hosts compile source text once, then evaluate it against a [`Context`]
//! holding variables, native functions and host objects.
//!
//! # Example
//!
//! ```
//! use iridium::{EngineConfig, ScriptEngine, Value};
//!
//! let engine = ScriptEngine::with_config(EngineConfig::flexible());
//! let ctx = engine.create_context();
//! let result = engine
//!     .evaluate_str("total = 0; foreach (i in 1...4) total = total + i; total", &ctx)
//!     .unwrap();
//! assert!(matches!(result.value, Value::Int(10)));
//! ```

pub mod cache;
pub mod context;
pub mod engine;
pub mod errors;
pub mod evaluator;
pub mod lexer;
pub mod parser;

pub use cache::ParseCache;
pub use context::{
    AssignmentPermissions, Context, ContextBehavior, ContextSettings, NumberFormat,
    StringComparison,
};
pub use engine::{EngineConfig, ScriptEngine};
pub use errors::{AssignmentDenial, ScriptError, ScriptResult};
pub use evaluator::{
    ArrayValue, Callable, DynamicValue, EvalOutcome, Evaluator, HostObject, HostObjectRef,
    HostType, HostTypeRef, Member, MemberKind, NativeFunction, OperatorTable, OverloadNames,
    RangeValue, Signature, TypeTag, TypedValue, Value,
};
pub use lexer::token::{Token, TokenKind};
pub use lexer::Lexer;
pub use parser::ast;
pub use parser::{CompiledExpression, Parser};
