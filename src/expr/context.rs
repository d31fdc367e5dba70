//! Variable bindings an expression is evaluated against.

use std::collections::HashMap;

use serde_json::Value;

/// Variable holding the intercepted operation's return value.
pub const RESULT_VAR: &str = "result";
/// Variable holding a delivered message payload.
pub const PAYLOAD_VAR: &str = "payload";

/// Per-call lookup environment: argument names, positional aliases
/// (`p0`, `p1`, ...) and optionally `result` or `payload`.
///
/// Built for one intercepted call and dropped with it.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    vars: HashMap<String, Value>,
}

impl EvalContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind arguments by declared name and by position.
    ///
    /// Names may be shorter than `args` (unnamed trailing arguments are only
    /// reachable positionally). Positional aliases are bound last so a
    /// parameter literally called `p1` cannot shadow the second argument.
    #[must_use]
    pub fn bind(names: &[String], args: &[Value]) -> Self {
        let mut vars = HashMap::with_capacity(names.len() + args.len() + 1);
        for (name, value) in names.iter().zip(args) {
            vars.insert(name.clone(), value.clone());
        }
        for (i, value) in args.iter().enumerate() {
            vars.insert(format!("p{}", i), value.clone());
        }
        Self { vars }
    }

    #[must_use]
    pub fn with_result(self, result: Value) -> Self {
        self.with_var(RESULT_VAR, result)
    }

    #[must_use]
    pub fn with_payload(self, payload: Value) -> Self {
        self.with_var(PAYLOAD_VAR, payload)
    }

    #[must_use]
    pub fn with_var(mut self, name: impl Into<String>, value: Value) -> Self {
        self.vars.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_names_and_positions_resolve_to_same_value() {
        let ctx = EvalContext::bind(&["id".into(), "name".into()], &[json!("42"), json!("Ann")]);
        assert_eq!(ctx.get("id"), ctx.get("p0"));
        assert_eq!(ctx.get("name"), ctx.get("p1"));
        assert_eq!(ctx.len(), 4);
    }

    #[test]
    fn test_unnamed_arguments_are_positional_only() {
        let ctx = EvalContext::bind(&[], &[json!(1), json!(2)]);
        assert_eq!(ctx.get("p1"), Some(&json!(2)));
        assert!(ctx.get("id").is_none());
    }

    #[test]
    fn test_positional_alias_wins_over_same_named_parameter() {
        let ctx = EvalContext::bind(&["p1".into(), "b".into()], &[json!("first"), json!("second")]);
        assert_eq!(ctx.get("p1"), Some(&json!("second")));
    }

    #[test]
    fn test_result_and_payload_bindings() {
        let ctx = EvalContext::new().with_result(json!({"id": 7})).with_payload(json!("x"));
        assert_eq!(ctx.get(RESULT_VAR), Some(&json!({"id": 7})));
        assert_eq!(ctx.get(PAYLOAD_VAR), Some(&json!("x")));
    }
}
