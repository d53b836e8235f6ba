//! Hashing - SHA-256 Fingerprints for Export Receipts
//!
//! Identical compositions always hash identically, whatever order their
//! maps were filled in.

use serde::Serialize;
use serde_json::{to_string, Value};
use sha2::{Digest, Sha256};

use crate::state::CompositionState;

/// SHA-256 of bytes as lowercase hex.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Canonical JSON: sorted keys, no whitespace.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let v = serde_json::to_value(value)?;
    to_string(&sort_value(&v))
}

fn sort_value(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut sorted: Vec<_> = map.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                sorted
                    .into_iter()
                    .map(|(k, v)| (k.clone(), sort_value(v)))
                    .collect(),
            )
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_value).collect()),
        _ => v.clone(),
    }
}

/// Fingerprint of everything that affects how a card renders.
pub fn composition_fingerprint(state: &CompositionState) -> Result<String, serde_json::Error> {
    Ok(sha256_hex(canonical_json(state)?.as_bytes()))
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{:02x}", b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ContentType, RatingLevel};
    use serde_json::json;

    #[test]
    fn test_canonical_json_sorted() {
        let obj = json!({"z": 1, "a": 2, "m": {"y": 0, "b": 1}});
        assert_eq!(canonical_json(&obj).unwrap(), r#"{"a":2,"m":{"b":1,"y":0},"z":1}"#);
    }

    #[test]
    fn test_sha256_known_value() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_fingerprint_ignores_mutation_order() {
        let mut a = CompositionState::new(ContentType::Game);
        a.set_rating("gore", RatingLevel::Mild).unwrap();
        a.set_rating("kufr", RatingLevel::Heavy).unwrap();

        let mut b = CompositionState::new(ContentType::Game);
        b.set_rating("kufr", RatingLevel::Heavy).unwrap();
        b.set_rating("gore", RatingLevel::Mild).unwrap();

        assert_eq!(composition_fingerprint(&a).unwrap(), composition_fingerprint(&b).unwrap());

        b.set_rating("gore", RatingLevel::Severe).unwrap();
        assert_ne!(composition_fingerprint(&a).unwrap(), composition_fingerprint(&b).unwrap());
    }
}
