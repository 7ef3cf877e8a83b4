//! Signature Verifier
//!
//! A message is signed as `secp256k1-ECDSA(SHA-256(canonical_json(message)))`, where the
//! canonical JSON has lexicographically sorted object keys and no insignificant
//! whitespace. Producers in any language that sort keys and emit compact JSON hash to the
//! same digest.

use ethers::core::k256::ecdsa::signature::hazmat::PrehashVerifier;
use ethers::core::k256::ecdsa::{Signature, VerifyingKey};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Canonical byte form of any serializable value.
///
/// Object keys are sorted at every depth, so field declaration order of the Rust type
/// does not matter.
pub fn canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let value = sort_keys(serde_json::to_value(value)?);
    serde_json::to_vec(&value)
}

// Sorted explicitly so the output does not depend on serde_json's `preserve_order` feature.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k, sort_keys(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// SHA-256 of the canonical bytes
pub fn digest<T: Serialize + ?Sized>(value: &T) -> Result<[u8; 32], serde_json::Error> {
    let bytes = canonical_bytes(value)?;
    Ok(Sha256::digest(&bytes).into())
}

/// Parse a SEC1 (33 or 65 byte) or raw 64-byte `X || Y` public key.
pub fn parse_public_key(bytes: &[u8]) -> Option<VerifyingKey> {
    if bytes.len() == 64 {
        let mut sec1 = Vec::with_capacity(65);
        sec1.push(0x04);
        sec1.extend_from_slice(bytes);
        return VerifyingKey::from_sec1_bytes(&sec1).ok();
    }
    VerifyingKey::from_sec1_bytes(bytes).ok()
}

/// Hex variant of [`parse_public_key`]
pub fn parse_public_key_hex(public_key: &str) -> Option<VerifyingKey> {
    hex::decode(public_key.trim_start_matches("0x"))
        .ok()
        .and_then(|bytes| parse_public_key(&bytes))
}

/// Verify `signature` (raw 64-byte `r || s`) over `message` with `public_key`.
///
/// Every failure collapses to `false`: bad key encoding, bad signature encoding,
/// serialization failure and mismatch are indistinguishable to the caller.
pub fn verify<T: Serialize + ?Sized>(public_key: &[u8], signature: &[u8], message: &T) -> bool {
    let Some(key) = parse_public_key(public_key) else {
        debug!("signature check: undecodable public key");
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        debug!("signature check: undecodable signature");
        return false;
    };
    // Signers that do not enforce low-S still produce valid ECDSA signatures.
    let signature = signature.normalize_s().unwrap_or(signature);
    let Ok(hash) = digest(message) else {
        return false;
    };

    key.verify_prehash(&hash, &signature).is_ok()
}

/// Hex-encoded variant of [`verify`], as carried on the wire.
pub fn verify_hex<T: Serialize + ?Sized>(public_key: &str, signature: &str, message: &T) -> bool {
    let (Ok(key), Ok(sig)) = (
        hex::decode(public_key.trim_start_matches("0x")),
        hex::decode(signature.trim_start_matches("0x")),
    ) else {
        debug!("signature check: bad hex");
        return false;
    };
    verify(&key, &sig, message)
}
