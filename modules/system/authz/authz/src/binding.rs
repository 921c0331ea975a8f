//! Binding of call arguments into custom permissions.
//!
//! Arguments arrive as one JSON object. Parameters are addressed by name, and
//! nested fields by dotted path, e.g. `bean.headers.authorization`.

use serde_json::Value;

/// Value at `path` in `args`. Array elements are addressed by index.
#[must_use]
pub fn resolve<'a>(args: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(args, |current, key| match current {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Bind the declared `params`; with no declaration every top-level argument is bound.
///
/// Unresolvable paths bind `null`.
#[must_use]
pub fn bind(args: &Value, params: &[String]) -> Vec<(String, Value)> {
    if params.is_empty() {
        return match args {
            Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            _ => Vec::new(),
        };
    }
    params
        .iter()
        .map(|path| (path.clone(), resolve(args, path).cloned().unwrap_or(Value::Null)))
        .collect()
}
