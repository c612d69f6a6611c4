use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Strategy for generating valid cache keys (no whitespace or control bytes)
pub fn cache_key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_:.\\-]{1,120}"
}

/// Strategy for generating distinct key sets
pub fn key_set_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set(cache_key_strategy(), 200..400).prop_map(|keys| keys.into_iter().collect())
}

/// Strategy for generating cluster sizes
pub fn cluster_size_strategy() -> impl Strategy<Value = u16> {
    2u16..8
}

/// Strategy for generating arbitrary JSON documents (scalars, arrays, objects)
pub fn json_value_strategy() -> impl Strategy<Value = serde_json::Value> {
    let leaf = prop_oneof![
        Just(serde_json::Value::Null),
        any::<bool>().prop_map(serde_json::Value::from),
        any::<i64>().prop_map(serde_json::Value::from),
        "[a-zA-Z0-9 ]{0,32}".prop_map(serde_json::Value::from),
    ];
    leaf.prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(serde_json::Value::Array),
            prop::collection::btree_map("[a-z_]{1,12}", inner, 0..6)
                .prop_map(|map| serde_json::Value::Object(map.into_iter().collect())),
        ]
    })
}

/// Typed value covering scalars, sequences and string-keyed maps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRecord {
    pub id: u64,
    pub name: String,
    pub score: i32,
    pub enabled: bool,
    pub tags: Vec<String>,
    pub attributes: BTreeMap<String, i64>,
    pub parent: Option<u64>,
}

/// Strategy for generating typed records
pub fn cached_record_strategy() -> impl Strategy<Value = CachedRecord> {
    (
        any::<u64>(),
        "[a-zA-Z0-9 _]{0,40}",
        any::<i32>(),
        any::<bool>(),
        prop::collection::vec("[a-z]{1,10}", 0..5),
        prop::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..5),
        prop::option::of(any::<u64>()),
    )
        .prop_map(|(id, name, score, enabled, tags, attributes, parent)| CachedRecord {
            id,
            name,
            score,
            enabled,
            tags,
            attributes,
            parent,
        })
}
