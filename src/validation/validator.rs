use crate::{Account, TransferRequest, ValidationError, validation::verify_hex};
use tracing::{debug, warn};

/// Settlement-time checks of a pooled request against live sender state
///
/// Pool membership proves the signature was good at submission; balances and nonces may
/// have moved since, so every check runs again against the account snapshot taken inside
/// the store transaction.
#[derive(Debug, Default, Clone, Copy)]
pub struct Validator;

impl Validator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a request against its sender's current state
    /// Returns Ok(()) if the request may settle, Err(ValidationError) otherwise
    pub fn validate(&self, request: &TransferRequest, sender: &Account) -> Result<(), ValidationError> {
        debug!("Validating request #{} from {}", request.id, request.sender_id);

        // 1. Verify signature
        self.verify_signature(request, sender)?;

        // 2. Check amount and endpoints
        self.check_transfer(request)?;

        // 3. Check nonce
        self.check_nonce(request, sender)?;

        // 4. Check balance
        self.check_balance(request, sender)?;

        Ok(())
    }

    /// Verify the request signature with the sender's current key
    fn verify_signature(&self, request: &TransferRequest, sender: &Account) -> Result<(), ValidationError> {
        if !verify_hex(&sender.public_key, &request.signature, &request.message) {
            warn!("Signature verification failed for request #{}", request.id);
            return Err(ValidationError::InvalidSignature);
        }
        Ok(())
    }

    /// A transfer moves a positive amount between two different accounts
    fn check_transfer(&self, request: &TransferRequest) -> Result<(), ValidationError> {
        if request.amount == 0 {
            warn!("Request #{} from {} has a zero amount", request.id, request.sender_id);
            return Err(ValidationError::ZeroAmount);
        }
        if request.sender_id == request.recipient_id {
            warn!("Request #{} is a transfer from {} to itself", request.id, request.sender_id);
            return Err(ValidationError::SelfTransfer {
                account: request.sender_id.clone(),
            });
        }
        Ok(())
    }

    /// The request nonce must be exactly the sender's current nonce
    fn check_nonce(&self, request: &TransferRequest, sender: &Account) -> Result<(), ValidationError> {
        if request.nonce != sender.nonce {
            warn!(
                "Nonce check failed for {}: expected {}, got {}",
                sender.id, sender.nonce, request.nonce
            );
            return Err(ValidationError::InvalidNonce {
                expected: sender.nonce,
                got: request.nonce,
            });
        }
        Ok(())
    }

    /// Staked credit is locked and cannot be spent
    fn check_balance(&self, request: &TransferRequest, sender: &Account) -> Result<(), ValidationError> {
        if sender.balance < request.amount {
            warn!(
                "Insufficient balance for {}: required {}, available {}",
                sender.id, request.amount, sender.balance
            );
            return Err(ValidationError::InsufficientFunds {
                required: request.amount,
                available: sender.balance,
            });
        }
        Ok(())
    }
}
