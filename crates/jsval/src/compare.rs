use crate::number::Number;
use serde_json::Value;

/// Structural equality over JSON values, with numeric normalization:
/// `1`, `1.0`, and unsigned/signed representations of the same value
/// compare equal, as `const` and `enum` require.
pub fn json_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(l), Value::Bool(r)) => l == r,
        (Value::String(l), Value::String(r)) => l == r,
        (Value::Number(l), Value::Number(r)) => Number::from(l) == Number::from(r),
        (Value::Array(l), Value::Array(r)) => {
            l.len() == r.len() && l.iter().zip(r.iter()).all(|(l, r)| json_equal(l, r))
        }
        (Value::Object(l), Value::Object(r)) => {
            // Key order is irrelevant to equality.
            l.len() == r.len()
                && l.iter()
                    .all(|(k, lv)| r.get(k).map_or(false, |rv| json_equal(lv, rv)))
        }
        _ => false,
    }
}
