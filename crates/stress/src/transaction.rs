use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::account::Address;
use crate::errors::{Result, StressError};

/// Everything needed to produce one signed transfer. Consumed once by signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionIntent {
    pub from: Address,
    pub to: Address,
    pub amount: u128,
    pub fee_price: u128,
    pub sequence: u64,
    pub chain_id: u64,
}

/// Signed bytes ready for submission, with the identifier derived from them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPayload {
    pub bytes: Vec<u8>,
    pub identifier: String,
}

impl SignedPayload {
    pub fn new(bytes: Vec<u8>) -> Self {
        let identifier = format!("0x{}", blake3::hash(&bytes).to_hex());
        Self { bytes, identifier }
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

/// Wire envelope produced by [`Ed25519Signer`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedEnvelope {
    pub intent: TransactionIntent,
    pub public_key: [u8; 32],
    pub signature: Vec<u8>,
}

impl SignedEnvelope {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|err| StressError::Decode(err.to_string()))
    }

    /// Check the signature against the embedded public key.
    pub fn verify(&self) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&self.public_key) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(&self.signature) else {
            return false;
        };
        let Ok(message) = bincode::serialize(&self.intent) else {
            return false;
        };
        key.verify(&message, &signature).is_ok()
    }
}

pub trait Signer: Send + Sync {
    fn sign(&self, intent: &TransactionIntent, key: &SigningKey) -> Result<SignedPayload>;
}

/// Signs the bincode encoding of the intent with ed25519.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Signer;

impl Signer for Ed25519Signer {
    fn sign(&self, intent: &TransactionIntent, key: &SigningKey) -> Result<SignedPayload> {
        let public_key = key.verifying_key().to_bytes();
        if public_key != intent.from.0 {
            return Err(StressError::Signing(format!(
                "credential does not belong to sender {}",
                intent.from
            )));
        }

        let message =
            bincode::serialize(intent).map_err(|err| StressError::Signing(err.to_string()))?;
        let signature = key.sign(&message);
        let envelope = SignedEnvelope {
            intent: intent.clone(),
            public_key,
            signature: signature.to_bytes().to_vec(),
        };
        let bytes =
            bincode::serialize(&envelope).map_err(|err| StressError::Signing(err.to_string()))?;
        Ok(SignedPayload::new(bytes))
    }
}
