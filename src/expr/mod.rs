//! Expression language for keys, conditions, and payloads.
//!
//! A deliberately small grammar: literals, `#variable` lookup, field and
//! index access (with `?.` for null-safe navigation), arithmetic and string
//! concatenation with `+`, comparisons (`==`, `eq`, `<`, `lt`, ...), boolean
//! operators (`and`/`&&`, `or`/`||`, `not`/`!`) and `cond ? a : b`.
//!
//! ```
//! use cachewire::expr::{EvalContext, Evaluator};
//! use serde_json::json;
//!
//! let evaluator = Evaluator::new();
//! let ctx = EvalContext::bind(&["id".to_string()], &[json!("42")]);
//!
//! assert_eq!(evaluator.eval_string("'user:' + #id", &ctx).unwrap(), Some("user:42".into()));
//! assert_eq!(evaluator.eval_string("#p0", &ctx).unwrap(), Some("42".into()));
//! assert!(evaluator.eval_bool("#id == '42'", &ctx, false).unwrap());
//! assert!(evaluator.eval_bool("   ", &ctx, true).unwrap());
//! ```
//!
//! Errors are returned, never swallowed here: each policy decides whether a
//! failing expression means "proceed" or "skip".

pub mod context;
pub mod eval;
pub mod lexer;
pub mod parser;

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;

pub use context::{EvalContext, PAYLOAD_VAR, RESULT_VAR};
pub use parser::Expr;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("Parse error at {pos}: {message}")]
    Parse { pos: usize, message: String },
    #[error("Type error: {0}")]
    Type(String),
    #[error("Cannot read '{field}' of null")]
    NullTarget { field: String },
    #[error("Division by zero")]
    DivisionByZero,
}

impl ExprError {
    pub(crate) fn parse(pos: usize, message: impl Into<String>) -> Self {
        Self::Parse { pos, message: message.into() }
    }
}

/// Compiles and evaluates expressions, caching the parsed form of every
/// expression string it has seen.
#[derive(Debug, Default)]
pub struct Evaluator {
    compiled: DashMap<String, Arc<Expr>>,
}

impl Evaluator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse (or fetch the cached parse of) an expression.
    pub fn compile(&self, source: &str) -> Result<Arc<Expr>, ExprError> {
        if let Some(hit) = self.compiled.get(source) {
            return Ok(Arc::clone(hit.value()));
        }
        let expr = Arc::new(parser::parse(source)?);
        self.compiled.insert(source.to_string(), Arc::clone(&expr));
        Ok(expr)
    }

    pub fn eval(&self, source: &str, ctx: &EvalContext) -> Result<Value, ExprError> {
        let expr = self.compile(source)?;
        eval::evaluate(&expr, ctx)
    }

    /// Evaluate to text. Blank expressions and null results give `None`.
    pub fn eval_string(&self, source: &str, ctx: &EvalContext) -> Result<Option<String>, ExprError> {
        if is_blank(source) {
            return Ok(None);
        }
        Ok(eval::render(&self.eval(source, ctx)?))
    }

    /// Evaluate to a boolean; blank expressions return `default_if_blank`
    /// without being parsed.
    pub fn eval_bool(&self, source: &str, ctx: &EvalContext, default_if_blank: bool) -> Result<bool, ExprError> {
        if is_blank(source) {
            return Ok(default_if_blank);
        }
        Ok(eval::truthy(&self.eval(source, ctx)?))
    }

    /// Evaluate a key expression to text. A null result renders as the
    /// literal `null`; a blank expression has no key and is an error.
    pub fn eval_key(&self, source: &str, ctx: &EvalContext) -> Result<String, ExprError> {
        if is_blank(source) {
            return Err(ExprError::Type("blank key expression".into()));
        }
        let value = self.eval(source, ctx)?;
        Ok(eval::render(&value).unwrap_or_else(|| "null".to_string()))
    }

    /// Number of distinct expressions compiled so far.
    pub fn cached(&self) -> usize {
        self.compiled.len()
    }
}

pub fn is_blank(source: &str) -> bool {
    source.trim().is_empty()
}
