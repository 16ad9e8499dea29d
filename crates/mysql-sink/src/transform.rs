//! Per-column value transforms.
//!
//! A transform sees `current` (the value being written), `last` (the
//! before-image value, updates only) and `mapTo`. A transform that fails to
//! compile or evaluate leaves the value untouched.

use row_expr::{from_row_value, to_row_value, Env, Program};
use sync_core::RowValue;
use tracing::{debug, warn};

use crate::mapping::TableMapping;

#[derive(Debug, Clone, Default)]
pub struct ColumnTransforms {
    /// Indexed like `TableMapping::col_mappings`.
    programs: Vec<Option<Program>>,
}

impl ColumnTransforms {
    pub fn compile(mapping: &TableMapping) -> Self {
        let programs = mapping
            .col_mappings
            .iter()
            .map(|c| {
                if c.expr.is_empty() {
                    return None;
                }
                match Program::compile(&c.expr) {
                    Ok(p) => Some(p),
                    Err(e) => {
                        warn!(
                            table = %mapping.src_table,
                            column = %c.src,
                            expression = %c.expr,
                            "Transform does not compile, values pass through unchanged: {e}"
                        );
                        None
                    }
                }
            })
            .collect();
        Self { programs }
    }

    pub fn is_empty(&self) -> bool {
        self.programs.iter().all(Option::is_none)
    }

    /// Transformed value for the column at `mapping` index.
    pub fn apply(&self, mapping: Option<usize>, current: &RowValue, last: Option<&RowValue>) -> RowValue {
        let Some(program) = mapping.and_then(|i| self.programs.get(i)).and_then(Option::as_ref) else {
            return current.clone();
        };

        let input = from_row_value(current);
        let mut env = Env::with_builtins().with_var("current", input.clone());
        if let Some(last) = last {
            env.set("last", from_row_value(last));
        }
        match program.run(&env) {
            // An unchanged value keeps its original column type.
            Ok(value) if value == input => current.clone(),
            Ok(value) => to_row_value(value),
            Err(e) => {
                debug!(expression = program.source(), "Transform failed, keeping original value: {e}");
                current.clone()
            }
        }
    }
}
