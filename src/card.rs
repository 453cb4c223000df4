//! Agent card codec: canonical serialization and Ed25519 verification.
//!
//! The canonical form is a wire format of its own: field order is pinned in
//! code, absent optionals are rendered as explicit nulls, and the output is
//! compact JSON. The same bytes are used for signing and verification.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A self-described, signed agent card.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub did: String,
    pub endpoint: String,
    pub public_key: String,
    pub version: i64,
    #[serde(default)]
    pub lineage: Option<String>,
    pub capabilities: Vec<CardCapability>,
    /// Opaque; insertion order of nested maps is preserved end-to-end
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardCapability {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub input_schema: Option<Value>,
    #[serde(default)]
    pub output_schema: Option<Value>,
    #[serde(default)]
    pub embedding_dim: Option<i64>,
}

/// Canonical serialization of a card.
///
/// Field order: `did, endpoint, publicKey, version, lineage, capabilities,
/// metadata`; within each capability: `id, description, inputSchema,
/// outputSchema, embeddingDim`. Absent optionals become explicit nulls.
pub fn canonical_json(card: &Card) -> String {
    let mut capabilities = Vec::with_capacity(card.capabilities.len());
    for cap in &card.capabilities {
        let mut entry = Map::new();
        entry.insert("id".to_string(), Value::String(cap.id.clone()));
        entry.insert("description".to_string(), Value::String(cap.description.clone()));
        entry.insert(
            "inputSchema".to_string(),
            cap.input_schema.clone().unwrap_or(Value::Null),
        );
        entry.insert(
            "outputSchema".to_string(),
            cap.output_schema.clone().unwrap_or(Value::Null),
        );
        entry.insert(
            "embeddingDim".to_string(),
            cap.embedding_dim.map(Value::from).unwrap_or(Value::Null),
        );
        capabilities.push(Value::Object(entry));
    }

    let mut root = Map::new();
    root.insert("did".to_string(), Value::String(card.did.clone()));
    root.insert("endpoint".to_string(), Value::String(card.endpoint.clone()));
    root.insert("publicKey".to_string(), Value::String(card.public_key.clone()));
    root.insert("version".to_string(), Value::from(card.version));
    root.insert(
        "lineage".to_string(),
        card.lineage.clone().map(Value::String).unwrap_or(Value::Null),
    );
    root.insert("capabilities".to_string(), Value::Array(capabilities));
    root.insert(
        "metadata".to_string(),
        card.metadata.clone().unwrap_or(Value::Null),
    );

    Value::Object(root).to_string()
}

/// Verify a detached base58 Ed25519 signature over the card's canonical
/// bytes against the card's own `publicKey`. Decode failures and length
/// mismatches report `false`, never an error.
pub fn verify(card: &Card, signature_b58: &str) -> bool {
    let Ok(key_bytes) = bs58::decode(&card.public_key).into_vec() else {
        return false;
    };
    let Ok(key_arr) = <[u8; 32]>::try_from(key_bytes.as_slice()) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&key_arr) else {
        return false;
    };

    let Ok(sig_bytes) = bs58::decode(signature_b58).into_vec() else {
        return false;
    };
    let Ok(sig_arr) = <[u8; 64]>::try_from(sig_bytes.as_slice()) else {
        return false;
    };
    let signature = Signature::from_bytes(&sig_arr);

    verifying_key
        .verify(canonical_json(card).as_bytes(), &signature)
        .is_ok()
}

/// Normalize an endpoint URL. Trailing slashes are the only transform;
/// null or empty input (including all-slash input) normalizes to None.
pub fn normalize_endpoint(endpoint: Option<&str>) -> Option<String> {
    let value = endpoint?;
    let trimmed = value.trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    fn test_card(signing_key: &SigningKey) -> Card {
        Card {
            did: "did:agent:alpha".to_string(),
            endpoint: "http://alpha.example".to_string(),
            public_key: bs58::encode(signing_key.verifying_key().to_bytes()).into_string(),
            version: 1,
            lineage: None,
            capabilities: vec![CardCapability {
                id: "echo".to_string(),
                description: "echo input back".to_string(),
                input_schema: None,
                output_schema: Some(serde_json::json!({"type": "string"})),
                embedding_dim: Some(384),
            }],
            metadata: None,
        }
    }

    fn sign(card: &Card, key: &SigningKey) -> String {
        let sig = key.sign(canonical_json(card).as_bytes());
        bs58::encode(sig.to_bytes()).into_string()
    }

    #[test]
    fn canonical_form_pins_field_order_and_nulls() {
        let key = SigningKey::from_bytes(&[7u8; 32]);
        let card = test_card(&key);
        let json = canonical_json(&card);

        let expected = format!(
            "{{\"did\":\"did:agent:alpha\",\"endpoint\":\"http://alpha.example\",\
             \"publicKey\":\"{}\",\"version\":1,\"lineage\":null,\
             \"capabilities\":[{{\"id\":\"echo\",\"description\":\"echo input back\",\
             \"inputSchema\":null,\"outputSchema\":{{\"type\":\"string\"}},\
             \"embeddingDim\":384}}],\"metadata\":null}}",
            card.public_key
        );
        assert_eq!(json, expected);
    }

    #[test]
    fn metadata_preserves_insertion_order() {
        let key = SigningKey::from_bytes(&[9u8; 32]);
        let mut card = test_card(&key);
        card.metadata =
            serde_json::from_str(r#"{"zeta":1,"alpha":2,"mid":3}"#).unwrap();
        let json = canonical_json(&card);
        assert!(json.contains(r#""metadata":{"zeta":1,"alpha":2,"mid":3}"#));
    }

    #[test]
    fn signed_card_verifies() {
        let key = SigningKey::from_bytes(&[42u8; 32]);
        let card = test_card(&key);
        let signature = sign(&card, &key);
        assert!(verify(&card, &signature));
    }

    #[test]
    fn tampered_card_fails_verification() {
        let key = SigningKey::from_bytes(&[42u8; 32]);
        let mut card = test_card(&key);
        let signature = sign(&card, &key);
        card.capabilities[0].description = "echo input back, promise".to_string();
        assert!(!verify(&card, &signature));
    }

    #[test]
    fn wrong_key_fails_verification() {
        let signer = SigningKey::from_bytes(&[42u8; 32]);
        let other = SigningKey::from_bytes(&[43u8; 32]);
        let mut card = test_card(&signer);
        card.public_key = bs58::encode(other.verifying_key().to_bytes()).into_string();
        let signature = sign(&card, &signer);
        assert!(!verify(&card, &signature));
    }

    #[test]
    fn malformed_encodings_report_false() {
        let key = SigningKey::from_bytes(&[42u8; 32]);
        let card = test_card(&key);
        let signature = sign(&card, &key);

        // Garbage signature
        assert!(!verify(&card, "not-base58-0OIl"));
        // Truncated signature
        assert!(!verify(&card, &bs58::encode([1u8; 10]).into_string()));
        // Garbage public key
        let mut bad_key = card.clone();
        bad_key.public_key = "zz".to_string();
        assert!(!verify(&bad_key, &signature));
    }

    #[test]
    fn normalize_strips_trailing_slash() {
        assert_eq!(normalize_endpoint(Some("http://h/")), Some("http://h".to_string()));
        assert_eq!(normalize_endpoint(Some("http://h")), Some("http://h".to_string()));
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize_endpoint(Some("http://h//"));
        let twice = normalize_endpoint(once.as_deref());
        assert_eq!(once, twice);
    }

    #[test]
    fn normalize_empty_is_none() {
        assert_eq!(normalize_endpoint(None), None);
        assert_eq!(normalize_endpoint(Some("")), None);
        assert_eq!(normalize_endpoint(Some("/")), None);
    }
}
