//! The arguments of one intercepted call.

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::codec::to_value;
use crate::expr::EvalContext;

/// Named arguments of a single call, in declaration order.
///
/// ```rust
/// use cachewire::policy::Invocation;
///
/// let inv = Invocation::new().arg("id", &42).arg("name", "Ann");
/// let ctx = inv.context();
/// assert_eq!(ctx.get("id"), ctx.get("p0"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    names: Vec<String>,
    args: Vec<Value>,
}

impl Invocation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an argument by serializing it. An argument that cannot be
    /// serialized is bound as `null` so expressions can still run.
    #[must_use]
    pub fn arg<T: Serialize + ?Sized>(self, name: impl Into<String>, value: &T) -> Self {
        let name = name.into();
        let value = match to_value(value) {
            Ok(v) => v,
            Err(e) => {
                warn!(arg = %name, error = %e, "Argument not serializable, bound as null");
                Value::Null
            }
        };
        self.value(name, value)
    }

    #[must_use]
    pub fn value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.names.push(name.into());
        self.args.push(value);
        self
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Lookup environment with names and positional aliases bound.
    #[must_use]
    pub fn context(&self) -> EvalContext {
        EvalContext::bind(&self.names, &self.args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_arguments_keep_order() {
        let inv = Invocation::new().arg("a", "x").arg("b", &2);
        assert_eq!(inv.args(), &[json!("x"), json!(2)]);
        let ctx = inv.context();
        assert_eq!(ctx.get("p1"), Some(&json!(2)));
        assert_eq!(ctx.get("b"), Some(&json!(2)));
    }

    #[test]
    fn test_unserializable_argument_is_null() {
        let mut bad = HashMap::new();
        bad.insert((1, 2), "v");
        let inv = Invocation::new().arg("bad", &bad);
        assert_eq!(inv.context().get("bad"), Some(&Value::Null));
    }
}
