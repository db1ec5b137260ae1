use rquickjs::{Array, Ctx, Object, Value};

use super::{GenericMap, GenericValue};
use crate::error::BridgeError;
use crate::invoker::{FunctionName, NodeId};

/// Deepest nesting accepted when converting script values. Cyclic objects hit
/// this limit instead of recursing forever.
pub const MAX_DEPTH: usize = 64;

/// Convert a script value into its engine-neutral form.
///
/// Undefined and null become `Null`. Functions, symbols and other values with
/// no generic counterpart also become `Null` when they appear as array
/// elements, and are skipped when they appear as object properties.
pub fn to_generic(value: &Value<'_>) -> Result<GenericValue, BridgeError> {
    to_generic_at(value, 0)
}

fn to_generic_at(value: &Value<'_>, depth: usize) -> Result<GenericValue, BridgeError> {
    if depth > MAX_DEPTH {
        return Err(BridgeError::TooDeep(MAX_DEPTH));
    }

    if value.is_undefined() || value.is_null() {
        return Ok(GenericValue::Null);
    }
    if let Some(b) = value.as_bool() {
        return Ok(GenericValue::Bool(b));
    }
    if let Some(n) = value.as_number() {
        return Ok(GenericValue::Number(n));
    }
    if let Some(s) = value.as_string() {
        return Ok(GenericValue::String(s.to_string()?));
    }
    if value.is_function() {
        return Ok(GenericValue::Null);
    }
    if let Some(array) = value.as_array() {
        let mut items = Vec::with_capacity(array.len());
        for item in array.iter::<Value<'_>>() {
            items.push(to_generic_at(&item?, depth + 1)?);
        }
        return Ok(GenericValue::Array(items));
    }
    if let Some(object) = value.as_object() {
        let mut map = GenericMap::new();
        for prop in object.props::<String, Value<'_>>() {
            let (key, item) = prop?;
            if item.is_undefined() || item.is_function() {
                continue;
            }
            map.insert(key, to_generic_at(&item, depth + 1)?);
        }
        return Ok(GenericValue::Object(map));
    }

    Ok(GenericValue::Null)
}

/// Build a script value from a generic one.
///
/// Returns `None` when the engine refuses to allocate the value, which is what
/// happens once the owning context is being torn down.
pub fn to_script<'js>(ctx: &Ctx<'js>, value: &GenericValue) -> Option<Value<'js>> {
    match to_script_at(ctx, value) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::debug!(target: "bridge", error = %err, "failed to build script value");
            None
        }
    }
}

fn to_script_at<'js>(ctx: &Ctx<'js>, value: &GenericValue) -> rquickjs::Result<Value<'js>> {
    let converted = match value {
        GenericValue::Null => Value::new_null(ctx.clone()),
        GenericValue::Bool(b) => Value::new_bool(ctx.clone(), *b),
        GenericValue::Number(n) => Value::new_number(ctx.clone(), *n),
        GenericValue::String(s) => rquickjs::String::from_str(ctx.clone(), s)?.into_value(),
        GenericValue::Array(items) => {
            let array = Array::new(ctx.clone())?;
            for (index, item) in items.iter().enumerate() {
                array.set(index, to_script_at(ctx, item)?)?;
            }
            array.into_value()
        }
        GenericValue::Object(map) => {
            let object = Object::new(ctx.clone())?;
            for (key, item) in map {
                object.set(key.as_str(), to_script_at(ctx, item)?)?;
            }
            object.into_value()
        }
    };
    Ok(converted)
}

/// Numeric values truncate toward zero (saturating at the `i32` range, NaN
/// maps to zero). Anything else resolves to node `0` without being inspected.
pub fn node_id(value: &Value<'_>) -> NodeId {
    value.as_number().map(|n| n as NodeId).unwrap_or(0)
}

pub fn function_name(value: &Value<'_>) -> FunctionName {
    value
        .as_string()
        .and_then(|name| name.to_string().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rquickjs::{Context, Runtime};

    fn with_ctx<F>(f: F)
    where
        F: for<'js> FnOnce(Ctx<'js>),
    {
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        context.with(f);
    }

    #[test]
    fn node_id_truncates_numbers() {
        with_ctx(|ctx| {
            for (source, expected) in [
                ("3.9", 3),
                ("-3.9", -3),
                ("42", 42),
                ("NaN", 0),
                ("1e12", i32::MAX),
            ] {
                let value: Value = ctx.eval(source).unwrap();
                assert_eq!(node_id(&value), expected, "{source}");
            }
        });
    }

    #[test]
    fn node_id_defaults_for_non_numbers() {
        with_ctx(|ctx| {
            for source in ["'bad-id'", "null", "undefined", "({})", "[7]"] {
                let value: Value = ctx.eval(source).unwrap();
                assert_eq!(node_id(&value), 0, "{source}");
            }
        });
    }

    #[test]
    fn function_name_defaults_for_non_strings() {
        with_ctx(|ctx| {
            let name: Value = ctx.eval("'measureText'").unwrap();
            assert_eq!(function_name(&name), "measureText");
            for source in ["7", "null", "({ toString() { return 'x'; } })"] {
                let value: Value = ctx.eval(source).unwrap();
                assert_eq!(function_name(&value), "", "{source}");
            }
        });
    }

    #[test]
    fn soft_defaults_do_not_touch_object_properties() {
        with_ctx(|ctx| {
            let value: Value = ctx
                .eval("globalThis.touched = 0; ({ get a() { touched++; throw new Error('no'); } })")
                .unwrap();
            assert_eq!(node_id(&value), 0);
            assert_eq!(function_name(&value), "");
            let touched: i32 = ctx.eval("touched").unwrap();
            assert_eq!(touched, 0);
        });
    }

    #[test]
    fn converts_script_objects_in_order() {
        with_ctx(|ctx| {
            let value: Value = ctx
                .eval(r#"({ text: "hi", size: 12.5, tags: [1, "a", null], skip: undefined, f() {} })"#)
                .unwrap();
            let generic = to_generic(&value).unwrap();
            let keys: Vec<_> = generic.as_object().unwrap().keys().cloned().collect();
            assert_eq!(keys, vec!["text", "size", "tags"]);
            assert_eq!(generic.get("size"), Some(&GenericValue::Number(12.5)));
            assert_eq!(
                generic.get("tags"),
                Some(&GenericValue::Array(vec![
                    GenericValue::Number(1.0),
                    GenericValue::from("a"),
                    GenericValue::Null,
                ]))
            );
        });
    }

    #[test]
    fn arrays_are_not_objects() {
        with_ctx(|ctx| {
            let value: Value = ctx.eval("[1, 2]").unwrap();
            let generic = to_generic(&value).unwrap();
            assert!(!generic.is_object());
            assert_eq!(generic.kind(), "array");
        });
    }

    #[test]
    fn cyclic_objects_are_rejected() {
        with_ctx(|ctx| {
            let value: Value = ctx.eval("const o = {}; o.self = o; o").unwrap();
            assert!(matches!(to_generic(&value), Err(BridgeError::TooDeep(MAX_DEPTH))));
        });
    }

    #[test]
    fn builds_script_values() {
        with_ctx(|ctx| {
            let generic: GenericValue = [
                ("width", GenericValue::from(10)),
                ("label", GenericValue::from("ok")),
                ("items", GenericValue::Array(vec![GenericValue::Bool(true)])),
            ]
            .into_iter()
            .collect();
            let value = to_script(&ctx, &generic).unwrap();
            ctx.globals().set("result", value).unwrap();
            let summary: String = ctx
                .eval("`${result.width}:${result.label}:${result.items[0]}:${Object.keys(result)}`")
                .unwrap();
            assert_eq!(summary, "10:ok:true:width,label,items");
        });
    }
}
