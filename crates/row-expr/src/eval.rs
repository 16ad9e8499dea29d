//! Compilation and evaluation.

use std::collections::{BTreeMap, HashMap};

use crate::builtins;
use crate::error::{ExprError, Result};
use crate::parser::{parse, BinaryOp, Expr, UnaryOp};
use crate::value::Value;

/// Signature of a function callable from expressions.
pub type Function = fn(&[Value]) -> Result<Value>;

/// Variables and functions visible to a running [`Program`].
#[derive(Clone, Default)]
pub struct Env {
    vars: HashMap<String, Value>,
    functions: HashMap<String, Function>,
}

impl Env {
    /// An empty environment without any functions.
    pub fn new() -> Self {
        Self::default()
    }

    /// An environment with `mapTo` and `len` registered.
    pub fn with_builtins() -> Self {
        let mut env = Self::new();
        env.register("mapTo", builtins::map_to);
        env.register("len", builtins::len);
        env
    }

    pub fn with_var(mut self, name: impl Into<String>, value: Value) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn register(&mut self, name: impl Into<String>, function: Function) {
        self.functions.insert(name.into(), function);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    fn has_var(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    fn function(&self, name: &str) -> Option<Function> {
        self.functions.get(name).copied()
    }
}

impl std::fmt::Debug for Env {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut vars: Vec<_> = self.vars.keys().collect();
        vars.sort();
        let mut functions: Vec<_> = self.functions.keys().collect();
        functions.sort();
        f.debug_struct("Env")
            .field("vars", &vars)
            .field("functions", &functions)
            .finish()
    }
}

/// A compiled expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    source: String,
    expr: Expr,
}

impl Program {
    /// Parse `source` without checking names.
    pub fn compile(source: &str) -> Result<Self> {
        Ok(Self {
            source: source.to_string(),
            expr: parse(source)?,
        })
    }

    /// Parse `source` and check that every root identifier and function
    /// exists in `env`.
    pub fn compile_with(source: &str, env: &Env) -> Result<Self> {
        let program = Self::compile(source)?;
        if let Some(name) = program
            .expr
            .identifiers()
            .into_iter()
            .find(|name| !env.has_var(name))
        {
            return Err(ExprError::UnknownVariable(name.to_string()));
        }
        if let Some(name) = program
            .expr
            .calls()
            .into_iter()
            .find(|name| env.function(name).is_none())
        {
            return Err(ExprError::UnknownFunction(name.to_string()));
        }
        Ok(program)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn run(&self, env: &Env) -> Result<Value> {
        eval(&self.expr, env)
    }
}

fn eval(expr: &Expr, env: &Env) -> Result<Value> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Ident(name) => env
            .get(name)
            .cloned()
            .ok_or_else(|| ExprError::UnknownVariable(name.clone())),
        Expr::Member(target, name) => match eval(target, env)? {
            Value::Map(mut map) => Ok(map.remove(name).unwrap_or(Value::Null)),
            Value::Null => Ok(Value::Null),
            other => Err(ExprError::Type(format!(
                "cannot access field '{name}' on {}",
                other.type_name()
            ))),
        },
        Expr::Index(target, index) => {
            let target = eval(target, env)?;
            let index = eval(index, env)?;
            index_value(target, index)
        }
        Expr::Call(name, args) => {
            let function = env
                .function(name)
                .ok_or_else(|| ExprError::UnknownFunction(name.clone()))?;
            let args = args
                .iter()
                .map(|a| eval(a, env))
                .collect::<Result<Vec<_>>>()?;
            function(&args)
        }
        Expr::Unary(op, operand) => {
            let value = eval(operand, env)?;
            match (op, value) {
                (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                (UnaryOp::Neg, Value::Int(i)) => {
                    i.checked_neg().map(Value::Int).ok_or(ExprError::Overflow)
                }
                (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
                (op, other) => Err(ExprError::Type(format!(
                    "operator {op:?} is not defined for {}",
                    other.type_name()
                ))),
            }
        }
        Expr::Binary(BinaryOp::And, lhs, rhs) => {
            if !truthy(eval(lhs, env)?, "&&")? {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(truthy(eval(rhs, env)?, "&&")?))
        }
        Expr::Binary(BinaryOp::Or, lhs, rhs) => {
            if truthy(eval(lhs, env)?, "||")? {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(truthy(eval(rhs, env)?, "||")?))
        }
        Expr::Binary(op, lhs, rhs) => {
            let lhs = eval(lhs, env)?;
            let rhs = eval(rhs, env)?;
            binary(*op, lhs, rhs)
        }
        Expr::Conditional(cond, then, otherwise) => {
            if truthy(eval(cond, env)?, "?:")? {
                eval(then, env)
            } else {
                eval(otherwise, env)
            }
        }
        Expr::List(items) => items
            .iter()
            .map(|item| eval(item, env))
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
    }
}

fn truthy(value: Value, op: &str) -> Result<bool> {
    value.as_bool().ok_or_else(|| {
        ExprError::Type(format!(
            "operator {op} expects bool, got {}",
            value.type_name()
        ))
    })
}

fn index_value(target: Value, index: Value) -> Result<Value> {
    match (target, index) {
        (Value::List(items), Value::Int(i)) => {
            let len = items.len() as i64;
            let pos = if i < 0 { len + i } else { i };
            if pos < 0 || pos >= len {
                return Err(ExprError::Type(format!(
                    "index {i} out of range for array of length {len}"
                )));
            }
            Ok(items.into_iter().nth(pos as usize).unwrap_or(Value::Null))
        }
        (Value::Map(mut map), Value::Str(key)) => Ok(map.remove(&key).unwrap_or(Value::Null)),
        (Value::Null, _) => Ok(Value::Null),
        (target, index) => Err(ExprError::Type(format!(
            "cannot index {} with {}",
            target.type_name(),
            index.type_name()
        ))),
    }
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(lhs.loose_eq(&rhs))),
        BinaryOp::NotEq => Ok(Value::Bool(!lhs.loose_eq(&rhs))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = lhs.compare(&rhs).ok_or_else(|| {
                ExprError::Type(format!(
                    "cannot compare {} with {}",
                    lhs.type_name(),
                    rhs.type_name()
                ))
            })?;
            let result = match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::In => match rhs {
            Value::List(items) => Ok(Value::Bool(items.iter().any(|i| i.loose_eq(&lhs)))),
            Value::Map(map) => match lhs {
                Value::Str(key) => Ok(Value::Bool(map.contains_key(&key))),
                other => Err(ExprError::Type(format!(
                    "map keys are strings, got {}",
                    other.type_name()
                ))),
            },
            Value::Str(haystack) => match lhs {
                Value::Str(needle) => Ok(Value::Bool(haystack.contains(&needle))),
                other => Err(ExprError::Type(format!(
                    "cannot search string for {}",
                    other.type_name()
                ))),
            },
            other => Err(ExprError::Type(format!(
                "operator in is not defined for {}",
                other.type_name()
            ))),
        },
        BinaryOp::Add => match (lhs, rhs) {
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
            (Value::List(mut a), Value::List(b)) => {
                a.extend(b);
                Ok(Value::List(a))
            }
            (lhs, rhs) => arithmetic(op, lhs, rhs),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            arithmetic(op, lhs, rhs)
        }
        BinaryOp::And | BinaryOp::Or => {
            Ok(Value::Bool(truthy(lhs, "&&")? && truthy(rhs, "&&")?))
        }
    }
}

fn arithmetic(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value> {
    match (&lhs, &rhs) {
        (Value::Int(a), Value::Int(b)) => {
            let (a, b) = (*a, *b);
            let result = match op {
                BinaryOp::Add => a.checked_add(b),
                BinaryOp::Sub => a.checked_sub(b),
                BinaryOp::Mul => a.checked_mul(b),
                BinaryOp::Div => {
                    if b == 0 {
                        return Err(ExprError::DivisionByZero);
                    }
                    return Ok(Value::Float(a as f64 / b as f64));
                }
                BinaryOp::Rem => {
                    if b == 0 {
                        return Err(ExprError::DivisionByZero);
                    }
                    a.checked_rem(b)
                }
                _ => None,
            };
            result.map(Value::Int).ok_or(ExprError::Overflow)
        }
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            let a = number(&lhs);
            let b = number(&rhs);
            let result = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => {
                    if b == 0.0 {
                        return Err(ExprError::DivisionByZero);
                    }
                    a / b
                }
                _ => {
                    return Err(ExprError::Type(
                        "operator % requires integer operands".to_string(),
                    ))
                }
            };
            Ok(Value::Float(result))
        }
        _ => Err(ExprError::Type(format!(
            "operator {op:?} is not defined for {} and {}",
            lhs.type_name(),
            rhs.type_name()
        ))),
    }
}

fn number(value: &Value) -> f64 {
    match value {
        Value::Int(i) => *i as f64,
        Value::Float(f) => *f,
        _ => f64::NAN,
    }
}

/// Build a nested `{a: {b: {c: value}}}` map from path segments.
pub fn nest(path: &[&str], value: Value) -> Value {
    match path.split_last() {
        None => value,
        Some((last, parents)) => {
            let mut map = BTreeMap::new();
            map.insert((*last).to_string(), value);
            nest(parents, Value::Map(map))
        }
    }
}
