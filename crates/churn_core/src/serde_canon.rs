//! Canonical JSON serialization for deterministic model hashing
//!
//! Object keys are sorted recursively and no whitespace is emitted, so two
//! equal models always produce byte-identical JSON and the same blake3 hash.

use crate::errors::Result;
use serde::Serialize;
use std::collections::BTreeMap;

/// Serialize a value to canonical JSON (sorted keys, no whitespace)
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String> {
    let json_value = serde_json::to_value(value)?;
    let canonical = canonicalize_value(&json_value);
    Ok(serde_json::to_string(&canonical)?)
}

/// Canonicalize a JSON value by sorting all object keys recursively
fn canonicalize_value(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut btree = BTreeMap::new();
            for (k, v) in map {
                btree.insert(k.clone(), canonicalize_value(v));
            }
            serde_json::Value::Object(btree.into_iter().collect())
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(canonicalize_value).collect())
        }
        other => other.clone(),
    }
}

/// Compute the blake3 hash of the canonical JSON representation as hex
pub fn hash_canonical_hex<T: Serialize>(value: &T) -> Result<String> {
    let json = to_canonical_json(value)?;
    Ok(hex::encode(blake3::hash(json.as_bytes()).as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Serialize)]
    struct Metrics {
        roc_auc: f64,
        pr_auc: f64,
        extra: HashMap<String, f64>,
    }

    fn sample() -> Metrics {
        let mut extra = HashMap::new();
        extra.insert("precision_at_10".to_string(), 0.5);
        extra.insert("precision_at_5".to_string(), 0.75);
        Metrics {
            roc_auc: 0.8,
            pr_auc: 0.4,
            extra,
        }
    }

    #[test]
    fn test_canonical_json_sorts_keys() {
        let json = to_canonical_json(&sample()).unwrap();

        let extra_pos = json.find("extra").unwrap();
        let pr_pos = json.find("pr_auc").unwrap();
        let roc_pos = json.find("roc_auc").unwrap();
        assert!(extra_pos < pr_pos);
        assert!(pr_pos < roc_pos);
        assert!(json.find("precision_at_10").unwrap() < json.find("precision_at_5").unwrap());
        assert!(!json.contains('\n'));
    }

    #[test]
    fn test_hash_deterministic() {
        let hash1 = hash_canonical_hex(&sample()).unwrap();
        let hash2 = hash_canonical_hex(&sample()).unwrap();
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_hash_changes_with_data() {
        let mut other = sample();
        other.roc_auc = 0.81;
        assert_ne!(
            hash_canonical_hex(&sample()).unwrap(),
            hash_canonical_hex(&other).unwrap()
        );
    }
}
