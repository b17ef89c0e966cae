use serde_json::Value;

use crate::{
    address::Address,
    data::schema::{FieldKind, FieldNode},
    error::{FieldError, Result},
};

/// Value a leaf starts with when neither the document nor the schema
/// provides one.
pub fn empty_leaf_value(node: &FieldNode) -> Value {
    match &node.kind {
        FieldKind::String { .. } | FieldKind::Date => Value::String(String::new()),
        FieldKind::Number { min, .. } => match min {
            Some(min) if *min > 0.0 => Value::from(*min),
            _ => Value::from(0),
        },
        FieldKind::Boolean => Value::Bool(false),
        FieldKind::Select { options } => options
            .first()
            .map(|o| o.value.clone())
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// Check that `value` fits the leaf described by `node`.
///
/// `null` is always accepted: it clears the field.
pub fn check_leaf_value(node: &FieldNode, value: &Value, address: &Address) -> Result<()> {
    if value.is_null() {
        return Ok(());
    }
    match &node.kind {
        FieldKind::String { .. } => match value {
            Value::String(_) => Ok(()),
            _ => Err(FieldError::mismatch(address, "string", value)),
        },
        FieldKind::Date => match value {
            Value::String(s) if looks_like_date(s) => Ok(()),
            _ => Err(FieldError::mismatch(address, "date (YYYY-MM-DD...)", value)),
        },
        FieldKind::Number { min, max } => {
            let Some(n) = value.as_f64() else {
                return Err(FieldError::mismatch(address, "number", value));
            };
            if let Some(min) = min
                && n < *min
            {
                return Err(FieldError::mismatch(address, format!("number >= {min}"), n));
            }
            if let Some(max) = max
                && n > *max
            {
                return Err(FieldError::mismatch(address, format!("number <= {max}"), n));
            }
            Ok(())
        }
        FieldKind::Boolean => match value {
            Value::Bool(_) => Ok(()),
            _ => Err(FieldError::mismatch(address, "boolean", value)),
        },
        FieldKind::Select { options } => {
            if options.is_empty() || options.iter().any(|o| &o.value == value) {
                Ok(())
            } else {
                let variants: Vec<String> = options.iter().map(|o| o.value.to_string()).collect();
                Err(FieldError::mismatch(
                    address,
                    format!("one of: {}", variants.join(", ")),
                    value,
                ))
            }
        }
        // Composite and custom kinds carry no leaf constraint.
        _ => Ok(()),
    }
}

// Accepts `YYYY-MM-DD` optionally followed by a time part, which is what
// front matter dates look like.
fn looks_like_date(s: &str) -> bool {
    let b = s.as_bytes();
    if b.len() < 10 {
        return false;
    }
    let digits = |r: std::ops::Range<usize>| b[r].iter().all(u8::is_ascii_digit);
    digits(0..4) && b[4] == b'-' && digits(5..7) && b[7] == b'-' && digits(8..10)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn at() -> Address {
        crate::addr!["field"]
    }

    #[test]
    fn test_string_and_boolean() {
        assert!(check_leaf_value(&FieldNode::string("s"), &json!("x"), &at()).is_ok());
        assert!(check_leaf_value(&FieldNode::string("s"), &json!(1), &at()).is_err());
        assert!(check_leaf_value(&FieldNode::boolean("b"), &json!(true), &at()).is_ok());
        assert!(check_leaf_value(&FieldNode::boolean("b"), &json!("true"), &at()).is_err());
        assert!(check_leaf_value(&FieldNode::boolean("b"), &Value::Null, &at()).is_ok());
    }

    #[test]
    fn test_number_bounds() {
        let node = FieldNode {
            kind: FieldKind::Number {
                min: Some(1.0),
                max: Some(10.0),
            },
            ..FieldNode::number("weight")
        };
        assert!(check_leaf_value(&node, &json!(5), &at()).is_ok());
        let err = check_leaf_value(&node, &json!(11), &at()).unwrap_err();
        assert!(err.to_string().contains("<= 10"));
        assert!(check_leaf_value(&node, &json!(0.5), &at()).is_err());
        assert_eq!(empty_leaf_value(&node), json!(1.0));
    }

    #[test]
    fn test_select_must_match_option() {
        let node = FieldNode::select("layout", &["wide", "narrow"]);
        assert!(check_leaf_value(&node, &json!("wide"), &at()).is_ok());
        let err = check_leaf_value(&node, &json!("tall"), &at()).unwrap_err();
        assert!(matches!(err, FieldError::TypeMismatch { .. }));
        assert_eq!(empty_leaf_value(&node), json!("wide"));
    }

    #[test]
    fn test_date_shape() {
        let node = FieldNode::date("date");
        assert!(check_leaf_value(&node, &json!("2024-03-01"), &at()).is_ok());
        assert!(check_leaf_value(&node, &json!("2024-03-01T10:00:00Z"), &at()).is_ok());
        assert!(check_leaf_value(&node, &json!("March 1st"), &at()).is_err());
    }
}
