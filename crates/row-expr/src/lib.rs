//! Sandboxed expression language for binlog-sync.
//!
//! Expressions are used in two places:
//!
//! - data filters, evaluated against `schema.table.column` values of a row
//! - column transforms, evaluated with `current`, `last` and `mapTo(...)`
//!
//! Built-in functions are `mapTo` and `len`.
//!
//! The language is side-effect free: there are no assignments, loops or
//! host calls other than the functions registered in the [`Env`].
//!
//! ```text
//! literal     := int | float | 'str' | "str" | true | false | nil | [a, b, ...]
//! primary     := literal | ident | ident '(' args ')' | '(' expr ')'
//! postfix     := primary ( '.' ident | '[' expr ']' )*
//! unary       := ('!' | 'not' | '-') unary | postfix
//! binary      := * / %  >  + -  >  < <= > >= in  >  == !=  >  && and  >  || or
//! expr        := binary ( '?' expr ':' expr )?
//! ```
//!
//! # Example
//!
//! ```rust
//! use row_expr::{Env, Program, Value};
//!
//! let env = Env::with_builtins().with_var("current", Value::Str("A".into()));
//! let program = Program::compile(r#"mapTo(current, "A", "X", "B", "Y")"#).unwrap();
//! assert_eq!(program.run(&env).unwrap(), Value::Str("X".into()));
//! ```

mod builtins;
mod convert;
mod error;
mod eval;
mod lexer;
mod parser;
mod value;

pub use builtins::map_to;
pub use convert::{from_row_value, to_row_value};
pub use error::{ExprError, Result};
pub use eval::{nest, Env, Function, Program};
pub use parser::{BinaryOp, Expr, UnaryOp};
pub use value::Value;
