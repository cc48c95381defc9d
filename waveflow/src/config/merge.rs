//! Deep merge of configuration mappings.

use super::Config;
use serde_json::Value;

/// Recursively merges `patch` into `target`.
///
/// Mapping values present on both sides are merged key by key; any other
/// value in `patch` overwrites the one in `target`.
pub fn merge_config(target: &mut Config, patch: &Config) {
    for (key, value) in patch {
        if let (Some(Value::Object(existing)), Value::Object(incoming)) = (target.get_mut(key), value) {
            merge_config(existing, incoming);
            continue;
        }
        target.insert(key.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn mapping(value: Value) -> Config {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("test fixtures are objects"),
        }
    }

    #[test]
    fn test_nested_values_are_merged() {
        let mut target = mapping(json!({"a": {"c": 23, "d": 1}}));
        merge_config(&mut target, &mapping(json!({"a": {"c": 11}})));

        assert_eq!(Value::Object(target), json!({"a": {"c": 11, "d": 1}}));
    }

    #[test]
    fn test_scalars_overwrite_mappings() {
        let mut target = mapping(json!({"a": {"c": 23}, "b": 1}));
        merge_config(&mut target, &mapping(json!({"a": 5, "b": {"x": true}})));

        assert_eq!(Value::Object(target), json!({"a": 5, "b": {"x": true}}));
    }

    #[test]
    fn test_new_keys_are_added() {
        let mut target = mapping(json!({"__global": {"timeout": 1}}));
        merge_config(
            &mut target,
            &mapping(json!({"__global": {"allow_failure": true}, "fetch": {"timeout": 2}})),
        );

        assert_eq!(
            Value::Object(target),
            json!({
                "__global": {"timeout": 1, "allow_failure": true},
                "fetch": {"timeout": 2}
            })
        );
    }

    #[test]
    fn test_deeply_nested_merge() {
        let mut target = mapping(json!({"a": {"b": {"c": {"d": 1, "e": 2}}}}));
        merge_config(&mut target, &mapping(json!({"a": {"b": {"c": {"e": 3}}}})));

        assert_eq!(Value::Object(target), json!({"a": {"b": {"c": {"d": 1, "e": 3}}}}));
    }
}
