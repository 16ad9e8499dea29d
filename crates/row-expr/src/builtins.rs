//! Built-in functions available to every [`Env`](crate::Env).

use crate::error::Result;
use crate::value::Value;

/// `mapTo(current, k1, v1, k2, v2, ...)`
///
/// Returns the value paired with the first key equal to `current`, or
/// `current` itself when nothing matches. A call without pairs, or with a
/// dangling key, returns `current` unchanged.
pub fn map_to(args: &[Value]) -> Result<Value> {
    let Some((current, pairs)) = args.split_first() else {
        return Ok(Value::Null);
    };
    if pairs.is_empty() || pairs.len() % 2 != 0 {
        return Ok(current.clone());
    }
    let mapped = pairs
        .chunks_exact(2)
        .find(|pair| pair[0].loose_eq(current))
        .map(|pair| pair[1].clone());
    Ok(mapped.unwrap_or_else(|| current.clone()))
}

/// `len(x)` for strings, bytes, lists and maps.
pub(crate) fn len(args: &[Value]) -> Result<Value> {
    use crate::error::ExprError;
    let [value] = args else {
        return Err(ExprError::Type(format!(
            "len expects 1 argument, got {}",
            args.len()
        )));
    };
    let n = match value {
        Value::Str(s) => s.chars().count(),
        Value::Bytes(b) => b.len(),
        Value::List(items) => items.len(),
        Value::Map(map) => map.len(),
        Value::Null => 0,
        other => {
            return Err(ExprError::Type(format!(
                "len is not defined for {}",
                other.type_name()
            )))
        }
    };
    Ok(Value::Int(n as i64))
}
