// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Tree-walking interpreter over JSON values.

use std::cmp::Ordering;

use serde_json::{Number, Value};

use super::context::EvalContext;
use super::parser::{BinaryOp, Expr};
use super::ExprError;

pub fn evaluate(expr: &Expr, ctx: &EvalContext) -> Result<Value, ExprError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        // unknown variables read as null
        Expr::Var(name) => Ok(ctx.get(name).cloned().unwrap_or(Value::Null)),
        Expr::Field { target, name, safe } => match evaluate(target, ctx)? {
            Value::Object(mut map) => Ok(map.remove(name).unwrap_or(Value::Null)),
            Value::Null if *safe => Ok(Value::Null),
            Value::Null => Err(ExprError::NullTarget { field: name.clone() }),
            other => Err(ExprError::Type(format!(
                "cannot read field '{}' of {}",
                name,
                type_name(&other)
            ))),
        },
        Expr::Index { target, index } => {
            let target = evaluate(target, ctx)?;
            let index = evaluate(index, ctx)?;
            match (&target, &index) {
                (Value::Array(items), Value::Number(n)) => {
                    let i = n
                        .as_u64()
                        .ok_or_else(|| ExprError::Type(format!("invalid array index {}", n)))?;
                    Ok(items.get(i as usize).cloned().unwrap_or(Value::Null))
                }
                (Value::Object(map), Value::String(key)) => Ok(map.get(key).cloned().unwrap_or(Value::Null)),
                (Value::Null, _) => Err(ExprError::NullTarget { field: render(&index).unwrap_or_default() }),
                _ => Err(ExprError::Type(format!(
                    "cannot index {} with {}",
                    type_name(&target),
                    type_name(&index)
                ))),
            }
        }
        Expr::Not(inner) => Ok(Value::Bool(!truthy(&evaluate(inner, ctx)?))),
        Expr::Neg(inner) => match evaluate(inner, ctx)? {
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(i
                    .checked_neg()
                    .map(Value::from)
                    .unwrap_or_else(|| Value::from(-(i as f64)))),
                None => Ok(Value::from(-as_f64(&n))),
            },
            other => Err(ExprError::Type(format!("cannot negate {}", type_name(&other)))),
        },
        Expr::Ternary { cond, then, otherwise } => {
            if truthy(&evaluate(cond, ctx)?) {
                evaluate(then, ctx)
            } else {
                evaluate(otherwise, ctx)
            }
        }
        Expr::Binary { op: BinaryOp::And, lhs, rhs } => {
            Ok(Value::Bool(truthy(&evaluate(lhs, ctx)?) && truthy(&evaluate(rhs, ctx)?)))
        }
        Expr::Binary { op: BinaryOp::Or, lhs, rhs } => {
            Ok(Value::Bool(truthy(&evaluate(lhs, ctx)?) || truthy(&evaluate(rhs, ctx)?)))
        }
        Expr::Binary { op, lhs, rhs } => {
            let lhs = evaluate(lhs, ctx)?;
            let rhs = evaluate(rhs, ctx)?;
            binary(*op, lhs, rhs)
        }
    }
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, ExprError> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(equals(&lhs, &rhs))),
        BinaryOp::Ne => Ok(Value::Bool(!equals(&lhs, &rhs))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ord = compare(&lhs, &rhs)?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ord == Ordering::Less,
                BinaryOp::Le => ord != Ordering::Greater,
                BinaryOp::Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            }))
        }
        BinaryOp::Add if lhs.is_string() || rhs.is_string() => {
            let mut out = display(&lhs);
            out.push_str(&display(&rhs));
            Ok(Value::String(out))
        }
        _ => arithmetic(op, &lhs, &rhs),
    }
}

fn arithmetic(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, ExprError> {
    let (Value::Number(a), Value::Number(b)) = (lhs, rhs) else {
        return Err(ExprError::Type(format!(
            "operator {:?} needs numbers, got {} and {}",
            op,
            type_name(lhs),
            type_name(rhs)
        )));
    };

    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        let exact = match op {
            BinaryOp::Add => x.checked_add(y),
            BinaryOp::Sub => x.checked_sub(y),
            BinaryOp::Mul => x.checked_mul(y),
            BinaryOp::Div | BinaryOp::Rem if y == 0 => return Err(ExprError::DivisionByZero),
            BinaryOp::Div => x.checked_div(y),
            BinaryOp::Rem => x.checked_rem(y),
            _ => None,
        };
        if let Some(v) = exact {
            return Ok(Value::from(v));
        }
    }

    let (x, y) = (as_f64(a), as_f64(b));
    let v = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div | BinaryOp::Rem if y == 0.0 => return Err(ExprError::DivisionByZero),
        BinaryOp::Div => x / y,
        BinaryOp::Rem => x % y,
        other => return Err(ExprError::Type(format!("{:?} is not arithmetic", other))),
    };
    Number::from_f64(v)
        .map(Value::Number)
        .ok_or_else(|| ExprError::Type(format!("{:?} produced a non-finite number", op)))
}

fn equals(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => as_f64(a) == as_f64(b),
        },
        _ => lhs == rhs,
    }
}

fn compare(lhs: &Value, rhs: &Value) -> Result<Ordering, ExprError> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => Ok(x.cmp(&y)),
            _ => as_f64(a)
                .partial_cmp(&as_f64(b))
                .ok_or_else(|| ExprError::Type("numbers are not comparable".into())),
        },
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => Err(ExprError::Type(format!(
            "cannot order {} and {}",
            type_name(lhs),
            type_name(rhs)
        ))),
    }
}

fn as_f64(n: &Number) -> f64 {
    n.as_f64().unwrap_or(f64::NAN)
}

/// Boolean reading of a value: booleans as-is, null is false, anything else
/// is true only when its text is `true` (any case).
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        other => display(other).eq_ignore_ascii_case("true"),
    }
}

/// Text form used for keys and fields. `None` for null.
pub fn render(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        other => Some(display(other)),
    }
}

/// Concatenation form: like [`render`] but null prints as `null`.
fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
