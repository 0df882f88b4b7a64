//! The pure expression evaluator (spec §4.4).
//!
//! Grounded on `expressions.rs`'s operator evaluation shape, trimmed to this
//! spec's operator set. Takes a name-to-value lookup rather than owning any
//! state itself, so the resolver can plug in "resolve VarRef -> ExprId ->
//! value via vault" without this module knowing about the vault at all.

use std::fmt;

use regex::Regex;

use crate::ir::{BinOp, CastType, EnumMemberRef, ExprIr, Pattern, Value};

/// An evaluation failure, local to the expression being evaluated (spec
/// §7 `TypeError`/`UndefinedName`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    UndefinedVariable(String),
    NonNumericComparison { op: &'static str },
    BadCast { target: &'static str, value: String },
    InvalidPattern(String),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UndefinedVariable(name) => write!(f, "undefined variable \"{name}\""),
            Self::NonNumericComparison { op } => {
                write!(f, "cannot compare non-numeric values with {op}")
            }
            Self::BadCast { target, value } => write!(f, "cannot cast \"{value}\" to {target}"),
            Self::InvalidPattern(msg) => write!(f, "invalid pattern: {msg}"),
        }
    }
}

impl std::error::Error for EvalError {}

pub type EvalResult<T> = Result<T, EvalError>;

/// Looks up a name to a resolved value. The resolver implements this as
/// "VarRef -> ExprId via scope -> value via vault"; tests implement it as a
/// plain map.
pub trait Lookup {
    fn get(&self, name: &str) -> Option<Value>;
}

impl<F: Fn(&str) -> Option<Value>> Lookup for F {
    fn get(&self, name: &str) -> Option<Value> {
        self(name)
    }
}

/// Evaluates an already-resolvable expression tree to a `Value` (spec
/// §4.4). A `DecoratorRef` reaching this function must already carry a
/// resolved value substituted in by the caller — the evaluator itself never
/// invokes decorators (that is the resolver's job, batched, spec §4.5).
pub fn evaluate(expr: &ExprIr, lookup: &dyn Lookup) -> EvalResult<Value> {
    match expr {
        ExprIr::Literal(value) => Ok(value.clone()),
        ExprIr::VarRef(name) => lookup.get(name).ok_or_else(|| EvalError::UndefinedVariable(name.clone())),
        ExprIr::DecoratorRef(decorator) => {
            // Defensive: `@var.X` should already be normalized to `VarRef`
            // upstream (spec §4.4 "accept here defensively").
            if let Some(name) = crate::decorator::normalize_var_ref(decorator) {
                return lookup.get(&name).ok_or(EvalError::UndefinedVariable(name));
            }
            Err(EvalError::UndefinedVariable(decorator.path()))
        }
        ExprIr::BinaryOp { op, left, right } => {
            let lhs = evaluate(left, lookup)?;
            let rhs = evaluate(right, lookup)?;
            eval_binop(*op, &lhs, &rhs)
        }
        ExprIr::TypeCast { value, target, optional } => {
            let inner = evaluate(value, lookup)?;
            match cast(&inner, *target) {
                Ok(v) => Ok(v),
                Err(e) if *optional => {
                    let _ = e;
                    Ok(Value::Null)
                }
                Err(e) => Err(e),
            }
        }
        ExprIr::EnumMemberRef(member) => Ok(Value::String(format!("{}.{}", member.enum_name, member.member_name))),
        ExprIr::ArrayLiteral(items) => {
            let values = items.iter().map(|item| evaluate(item, lookup)).collect::<EvalResult<Vec<_>>>()?;
            Ok(Value::Array(values))
        }
        ExprIr::ObjectLiteral(fields) => {
            let mut map = std::collections::BTreeMap::new();
            for (key, value_expr) in fields {
                map.insert(key.clone(), evaluate(value_expr, lookup)?);
            }
            Ok(Value::Object(map))
        }
        ExprIr::CommandExpr(parts) => {
            let mut out = String::new();
            for part in parts {
                out.push_str(&evaluate(part, lookup)?.to_string());
            }
            Ok(Value::String(out))
        }
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

fn both_int(lhs: &Value, rhs: &Value) -> Option<(i64, i64)> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Some((*a, *b)),
        _ => None,
    }
}

fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    if let (Some(a), Some(b)) = (as_f64(lhs), as_f64(rhs)) {
        return (a - b).abs() < f64::EPSILON;
    }
    lhs == rhs
}

fn eval_binop(op: BinOp, lhs: &Value, rhs: &Value) -> EvalResult<Value> {
    match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => {
            if let Some((a, b)) = both_int(lhs, rhs) {
                return Ok(Value::Int(match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    _ => unreachable!(),
                }));
            }
            let (a, b) = (
                as_f64(lhs).ok_or(EvalError::NonNumericComparison { op: op.symbol() })?,
                as_f64(rhs).ok_or(EvalError::NonNumericComparison { op: op.symbol() })?,
            );
            Ok(Value::Float(match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                BinOp::Div => a / b,
                _ => unreachable!(),
            }))
        }
        BinOp::Eq => Ok(Value::Bool(values_equal(lhs, rhs))),
        BinOp::Ne => Ok(Value::Bool(!values_equal(lhs, rhs))),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let a = as_f64(lhs).ok_or(EvalError::NonNumericComparison { op: op.symbol() })?;
            let b = as_f64(rhs).ok_or(EvalError::NonNumericComparison { op: op.symbol() })?;
            Ok(Value::Bool(match op {
                BinOp::Lt => a < b,
                BinOp::Le => a <= b,
                BinOp::Gt => a > b,
                BinOp::Ge => a >= b,
                _ => unreachable!(),
            }))
        }
        BinOp::And => Ok(if lhs.truthy() { Value::Bool(rhs.truthy()) } else { Value::Bool(false) }),
        BinOp::Or => Ok(if lhs.truthy() { Value::Bool(true) } else { Value::Bool(rhs.truthy()) }),
    }
}

fn cast(value: &Value, target: CastType) -> EvalResult<Value> {
    let fail = || EvalError::BadCast { target: cast_name(target), value: value.to_string() };
    match target {
        CastType::Int => match value {
            Value::Int(i) => Ok(Value::Int(*i)),
            Value::Float(f) => Ok(Value::Int(*f as i64)),
            Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
            Value::String(s) => s.trim().parse::<i64>().map(Value::Int).map_err(|_| fail()),
            _ => Err(fail()),
        },
        CastType::Float => match value {
            Value::Int(i) => Ok(Value::Float(*i as f64)),
            Value::Float(f) => Ok(Value::Float(*f)),
            Value::String(s) => s.trim().parse::<f64>().map(Value::Float).map_err(|_| fail()),
            _ => Err(fail()),
        },
        CastType::String => Ok(Value::String(value.to_string())),
        CastType::Bool => Ok(Value::Bool(value.truthy())),
        CastType::Duration => match value {
            Value::Duration(d) => Ok(Value::Duration(*d)),
            Value::Int(i) if *i >= 0 => Ok(Value::Duration(std::time::Duration::from_secs(*i as u64))),
            Value::String(s) => parse_duration(s).ok_or_else(fail),
            _ => Err(fail()),
        },
    }
}

fn cast_name(target: CastType) -> &'static str {
    match target {
        CastType::Int => "Int",
        CastType::Float => "Float",
        CastType::String => "String",
        CastType::Bool => "Bool",
        CastType::Duration => "Duration",
    }
}

/// Parses `"3s"`, `"500ms"`, `"2m"` into a `Duration`. Minimal — only the
/// suffixes this DSL's literal syntax is specified to use (spec GLOSSARY
/// duration literal).
pub(crate) fn parse_duration(text: &str) -> Option<std::time::Duration> {
    let text = text.trim();
    let (digits, unit) = text.split_at(text.find(|c: char| !c.is_ascii_digit() && c != '.')?);
    let amount: f64 = digits.parse().ok()?;
    let secs = match unit {
        "ms" => amount / 1000.0,
        "s" => amount,
        "m" => amount * 60.0,
        "h" => amount * 3600.0,
        _ => return None,
    };
    Some(std::time::Duration::from_secs_f64(secs))
}

/// Evaluates a `when`-arm pattern against an already-resolved scrutinee
/// value (spec §4.4).
pub fn match_pattern(pattern: &Pattern, scrutinee: &Value, lookup: &dyn Lookup) -> EvalResult<bool> {
    match pattern {
        Pattern::Else => Ok(true),
        Pattern::Literal(expr) => {
            let value = evaluate(expr, lookup)?;
            Ok(values_equal(&value, scrutinee))
        }
        Pattern::Regex(pattern) => {
            let re = Regex::new(pattern).map_err(|e| EvalError::InvalidPattern(e.to_string()))?;
            Ok(re.is_match(&scrutinee.as_match_string()))
        }
        Pattern::IntRange { start, end_inclusive } => match scrutinee {
            Value::Int(i) => Ok(*i >= *start && *i <= *end_inclusive),
            _ => Err(EvalError::NonNumericComparison { op: "..." }),
        },
        Pattern::EnumMember(member) => match_enum_member(member, scrutinee),
    }
}

fn match_enum_member(member: &EnumMemberRef, scrutinee: &Value) -> EvalResult<bool> {
    let expected = format!("{}.{}", member.enum_name, member.member_name);
    match scrutinee {
        Value::String(s) => Ok(*s == expected || *s == member.member_name),
        _ => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, Value)]) -> HashMap<String, Value> {
        vars.iter().map(|(k, v)| ((*k).to_owned(), v.clone())).collect()
    }

    #[test]
    fn int_preserved_when_both_sides_int() {
        let result = eval_binop(BinOp::Add, &Value::Int(2), &Value::Int(3)).unwrap();
        assert_eq!(result, Value::Int(5));
    }

    #[test]
    fn mixed_numeric_promotes_to_float() {
        let result = eval_binop(BinOp::Add, &Value::Int(2), &Value::Float(0.5)).unwrap();
        assert_eq!(result, Value::Float(2.5));
    }

    #[test]
    fn comparison_requires_numeric_operands() {
        let err = eval_binop(BinOp::Lt, &Value::String("a".into()), &Value::Int(1)).unwrap_err();
        assert_eq!(err, EvalError::NonNumericComparison { op: "<" });
    }

    #[test]
    fn and_short_circuits_without_evaluating_rhs_value() {
        // short-circuit is enforced by the resolver not evaluating the rhs
        // subexpression at all when lhs is falsy; here we only check value semantics.
        let result = eval_binop(BinOp::And, &Value::Bool(false), &Value::Bool(true)).unwrap();
        assert_eq!(result, Value::Bool(false));
    }

    #[test]
    fn undefined_variable_errors() {
        let vars = env(&[]);
        let result = evaluate(&ExprIr::VarRef("X".into()), &|n: &str| vars.get(n).cloned());
        assert_eq!(result.unwrap_err(), EvalError::UndefinedVariable("X".into()));
    }

    #[test]
    fn optional_cast_failure_yields_null() {
        let expr = ExprIr::TypeCast {
            value: Box::new(ExprIr::Literal(Value::String("not a number".into()))),
            target: CastType::Int,
            optional: true,
        };
        let result = evaluate(&expr, &|_: &str| None).unwrap();
        assert_eq!(result, Value::Null);
    }

    #[test]
    fn non_optional_cast_failure_errors() {
        let expr = ExprIr::TypeCast {
            value: Box::new(ExprIr::Literal(Value::String("not a number".into()))),
            target: CastType::Int,
            optional: false,
        };
        assert!(evaluate(&expr, &|_: &str| None).is_err());
    }

    #[test]
    fn int_range_pattern_is_inclusive() {
        let pattern = Pattern::IntRange { start: 1, end_inclusive: 3 };
        assert!(match_pattern(&pattern, &Value::Int(3), &|_: &str| None).unwrap());
        assert!(!match_pattern(&pattern, &Value::Int(4), &|_: &str| None).unwrap());
    }

    #[test]
    fn regex_pattern_matches_string_form() {
        let pattern = Pattern::Regex("^prod.*".to_owned());
        assert!(match_pattern(&pattern, &Value::String("production".into()), &|_: &str| None).unwrap());
    }

    #[test]
    fn empty_string_is_falsy() {
        assert!(!Value::String(String::new()).truthy());
    }
}
