//! JSON merge patch (RFC 7386).

use serde_json::Value;

/// Applies a JSON merge patch to `target` in place.
///
/// Object members in the patch replace members of the target; `null`
/// removes a member. A non-object patch replaces the target entirely.
pub fn apply_merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(map) = target {
        for (key, value) in patch {
            if value.is_null() {
                map.remove(key);
            } else {
                apply_merge_patch(map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}
