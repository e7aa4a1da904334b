//! The template function vocabulary
//!
//! A fixed dispatch from function name to handler. Unknown names are an
//! error value that callers may surface or suppress.

use chrono::{SecondsFormat, Utc};
use serde_json::Value;

use super::TemplateError;

/// Render a value to its string form: strings verbatim, numbers and bools in
/// canonical form, maps and lists as compact JSON, nil as the empty string.
pub(crate) fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Object(_) | Value::Array(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// The emptiness predicate shared by `default`, `empty` and `coalesce`:
/// nil, the empty string, and empty maps/lists are empty.
pub(crate) fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Object(m) => m.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

fn expect_arity(name: &str, args: &[Value], expected: usize) -> Result<(), TemplateError> {
    if args.len() != expected {
        return Err(TemplateError::Arity {
            name: name.to_string(),
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

/// Invoke a vocabulary function.
pub(crate) fn call(name: &str, args: &[Value]) -> Result<Value, TemplateError> {
    match name {
        "toJson" => {
            expect_arity(name, args, 1)?;
            let json = serde_json::to_string(&args[0])
                .map_err(|e| TemplateError::Render(e.to_string()))?;
            Ok(Value::String(json))
        }
        "toPrettyJson" => {
            expect_arity(name, args, 1)?;
            let json = serde_json::to_string_pretty(&args[0])
                .map_err(|e| TemplateError::Render(e.to_string()))?;
            Ok(Value::String(json))
        }
        "quote" => {
            expect_arity(name, args, 1)?;
            Ok(Value::String(format!("\"{}\"", display(&args[0]))))
        }
        "squote" => {
            expect_arity(name, args, 1)?;
            Ok(Value::String(format!("'{}'", display(&args[0]))))
        }
        "upper" => {
            expect_arity(name, args, 1)?;
            Ok(Value::String(display(&args[0]).to_uppercase()))
        }
        "lower" => {
            expect_arity(name, args, 1)?;
            Ok(Value::String(display(&args[0]).to_lowercase()))
        }
        "trim" => {
            expect_arity(name, args, 1)?;
            Ok(Value::String(display(&args[0]).trim().to_string()))
        }
        "replace" => {
            expect_arity(name, args, 3)?;
            let old = display(&args[0]);
            let new = display(&args[1]);
            let s = display(&args[2]);
            Ok(Value::String(s.replace(&old, &new)))
        }
        "contains" => {
            expect_arity(name, args, 2)?;
            Ok(Value::Bool(display(&args[1]).contains(&display(&args[0]))))
        }
        "hasPrefix" => {
            expect_arity(name, args, 2)?;
            Ok(Value::Bool(
                display(&args[1]).starts_with(&display(&args[0])),
            ))
        }
        "hasSuffix" => {
            expect_arity(name, args, 2)?;
            Ok(Value::Bool(display(&args[1]).ends_with(&display(&args[0]))))
        }
        "default" => {
            expect_arity(name, args, 2)?;
            if is_empty(&args[1]) {
                Ok(args[0].clone())
            } else {
                Ok(args[1].clone())
            }
        }
        "empty" => {
            expect_arity(name, args, 1)?;
            Ok(Value::Bool(is_empty(&args[0])))
        }
        "coalesce" => Ok(args
            .iter()
            .find(|v| !is_empty(v))
            .cloned()
            .unwrap_or(Value::Null)),
        "now" => {
            expect_arity(name, args, 0)?;
            Ok(Value::String(
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            ))
        }
        "index" => {
            expect_arity(name, args, 2)?;
            Ok(index(&args[0], &args[1]))
        }
        other => Err(TemplateError::UnknownFunction(other.to_string())),
    }
}

/// Nil-safe collection lookup: map by string key, list by integer index.
fn index(collection: &Value, key: &Value) -> Value {
    match collection {
        Value::Object(map) => map.get(&display(key)).cloned().unwrap_or(Value::Null),
        Value::Array(list) => key
            .as_i64()
            .and_then(|i| usize::try_from(i).ok())
            .and_then(|i| list.get(i))
            .cloned()
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display_forms() {
        assert_eq!(display(&Value::Null), "");
        assert_eq!(display(&json!("s")), "s");
        assert_eq!(display(&json!(12)), "12");
        assert_eq!(display(&json!(1.5)), "1.5");
        assert_eq!(display(&json!(true)), "true");
        assert_eq!(display(&json!({"a": 1})), r#"{"a":1}"#);
    }

    #[test]
    fn test_default_and_empty() {
        assert_eq!(
            call("default", &[json!("d"), Value::Null]).unwrap(),
            json!("d")
        );
        assert_eq!(call("default", &[json!("d"), json!("")]).unwrap(), json!("d"));
        assert_eq!(
            call("default", &[json!("d"), json!("v")]).unwrap(),
            json!("v")
        );
        assert_eq!(call("empty", &[json!({})]).unwrap(), json!(true));
        assert_eq!(call("empty", &[json!(0)]).unwrap(), json!(false));
    }

    #[test]
    fn test_coalesce_first_non_empty() {
        assert_eq!(
            call("coalesce", &[Value::Null, json!(""), json!("x"), json!("y")]).unwrap(),
            json!("x")
        );
        assert_eq!(call("coalesce", &[Value::Null, json!("")]).unwrap(), Value::Null);
        assert_eq!(call("coalesce", &[]).unwrap(), Value::Null);
    }

    #[test]
    fn test_string_helpers() {
        assert_eq!(call("upper", &[json!("grüße")]).unwrap(), json!("GRÜSSE"));
        assert_eq!(call("trim", &[json!("  x ")]).unwrap(), json!("x"));
        assert_eq!(
            call("replace", &[json!("o"), json!("0"), json!("foo")]).unwrap(),
            json!("f00")
        );
        assert_eq!(
            call("hasPrefix", &[json!("kube-"), json!("kube-system")]).unwrap(),
            json!(true)
        );
        assert_eq!(
            call("contains", &[json!("sys"), json!("kube-system")]).unwrap(),
            json!(true)
        );
    }

    #[test]
    fn test_quote_variants() {
        assert_eq!(call("quote", &[json!("x")]).unwrap(), json!("\"x\""));
        assert_eq!(call("squote", &[json!(5)]).unwrap(), json!("'5'"));
    }

    #[test]
    fn test_index_is_nil_safe() {
        assert_eq!(
            index(&json!({"app": "web"}), &json!("app")),
            json!("web")
        );
        assert_eq!(index(&json!({"app": "web"}), &json!("none")), Value::Null);
        assert_eq!(index(&json!(["a", "b"]), &json!(1)), json!("b"));
        assert_eq!(index(&json!(["a"]), &json!(4)), Value::Null);
        assert_eq!(index(&json!(["a"]), &json!(-1)), Value::Null);
        assert_eq!(index(&Value::Null, &json!("k")), Value::Null);
    }

    #[test]
    fn test_unknown_function_is_an_error() {
        let err = call("b64enc", &[json!("x")]).unwrap_err();
        assert!(matches!(err, TemplateError::UnknownFunction(_)));
    }

    #[test]
    fn test_arity_mismatch() {
        let err = call("upper", &[]).unwrap_err();
        assert!(matches!(err, TemplateError::Arity { .. }));
    }
}
