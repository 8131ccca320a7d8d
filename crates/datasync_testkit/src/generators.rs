//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains required invariants.

use datasync_core::{TableData, Version};
use proptest::prelude::*;
use serde_json::{Map, Value};

/// Strategy for generating valid entity ids.
pub fn entity_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z0-9][A-Za-z0-9_.:-]{0,31}").expect("Invalid regex")
}

/// Strategy for generating non-empty versions.
pub fn version_strategy() -> impl Strategy<Value = Version> {
    prop::collection::vec(any::<u8>(), 1..17).prop_map(Version::new)
}

/// Strategy for generating user property names that are not system
/// properties.
pub fn property_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-zA-Z0-9]{0,11}")
        .expect("Invalid regex")
        .prop_filter("Must not be a system property", |name| {
            !datasync_core::is_system_property(name)
        })
}

/// Strategy for generating scalar JSON property values.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i32>().prop_map(Value::from),
        (-1.0e6f64..1.0e6).prop_map(Value::from),
        "[ -~]{0,24}".prop_map(Value::from),
    ]
}

/// Strategy for generating user property maps.
pub fn properties_strategy() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::btree_map(property_name_strategy(), scalar_value_strategy(), 0..6)
        .prop_map(|props| props.into_iter().collect())
}

/// Strategy for generating unstamped entities ready to be created.
pub fn entity_strategy() -> impl Strategy<Value = TableData> {
    (entity_id_strategy(), properties_strategy()).prop_map(|(id, properties)| TableData {
        properties,
        ..TableData::new(id)
    })
}

/// Strategy for generating a batch of entities with distinct ids.
pub fn entity_batch_strategy(max: usize) -> impl Strategy<Value = Vec<TableData>> {
    prop::collection::btree_map(entity_id_strategy(), properties_strategy(), 0..max).prop_map(
        |entries| {
            entries
                .into_iter()
                .map(|(id, properties)| TableData {
                    properties,
                    ..TableData::new(id)
                })
                .collect()
        },
    )
}
