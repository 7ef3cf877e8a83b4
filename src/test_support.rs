//! Shared fixtures for unit tests: deterministic signing keys and signed requests.

use ethers::core::k256::ecdsa::signature::hazmat::PrehashSigner;
use ethers::core::k256::ecdsa::{Signature, SigningKey};
use serde::Serialize;

use crate::{Account, TransferMessage, TransferRequest, TransferSubmission, validation::digest};

pub struct TestKey {
    signing: SigningKey,
}

impl TestKey {
    /// Deterministic key; `seed` must be non-zero.
    pub fn new(seed: u8) -> Self {
        let signing = SigningKey::from_slice(&[seed; 32]).expect("valid scalar");
        Self { signing }
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing.verifying_key().to_encoded_point(false).as_bytes())
    }

    pub fn compressed_public_key_hex(&self) -> String {
        hex::encode(self.signing.verifying_key().to_encoded_point(true).as_bytes())
    }

    pub fn sign<T: Serialize>(&self, message: &T) -> String {
        let hash = digest(message).expect("serializable");
        let signature: Signature = self.signing.sign_prehash(&hash).expect("signing");
        hex::encode(signature.to_bytes())
    }

    pub fn account(&self, id: &str, balance: u64) -> Account {
        Account::new(id, self.public_key_hex(), balance)
    }

    pub fn submission(&self, recipient: &str, amount: u64, nonce: u64) -> TransferSubmission {
        let message = message(recipient, amount, nonce);
        let signature = self.sign(&message);
        TransferSubmission { message, signature }
    }
}

pub fn message(recipient: &str, amount: u64, nonce: u64) -> TransferMessage {
    TransferMessage {
        recipient_id: recipient.to_string(),
        amount,
        nonce,
    }
}

/// Request as the pool would build it, bypassing submission checks
pub fn signed_request(key: &TestKey, sender: &str, recipient: &str, amount: u64, nonce: u64) -> TransferRequest {
    let TransferSubmission { message, signature } = key.submission(recipient, amount, nonce);
    TransferRequest {
        id: nonce,
        sender_id: sender.to_string(),
        recipient_id: recipient.to_string(),
        amount,
        nonce,
        message,
        signature,
        submitted_at: 0,
    }
}
