//! Transfer Validation Module
//!
//! Signature verification over canonical message bytes, used when a transfer is
//! submitted, and the settlement-time validator that re-checks signature, nonce and
//! balance against live account state.

mod signature;
mod validator;

pub use signature::{
    canonical_bytes, digest, parse_public_key, parse_public_key_hex, verify, verify_hex,
};
pub use validator::Validator;
