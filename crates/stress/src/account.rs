//! Sender/recipient identities and the per-sender sequence allocator.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, StressError};

/// Number of raw bytes in an account identifier.
pub const ADDRESS_BYTES: usize = 32;

/// Length of the rendered form: `i` followed by 64 hex characters.
pub const ADDRESS_STRING_LENGTH: usize = 1 + ADDRESS_BYTES * 2;

/// 32-byte account identifier, rendered as `i<hex>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(pub [u8; ADDRESS_BYTES]);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = StressError;

    fn from_str(s: &str) -> Result<Self> {
        let payload = s
            .strip_prefix('i')
            .ok_or_else(|| StressError::InvalidAddress(format!("{s}: missing 'i' prefix")))?;
        if s.len() != ADDRESS_STRING_LENGTH {
            return Err(StressError::InvalidAddress(format!(
                "{s}: expected {ADDRESS_STRING_LENGTH} characters, got {}",
                s.len()
            )));
        }
        let mut bytes = [0u8; ADDRESS_BYTES];
        hex::decode_to_slice(payload, &mut bytes)
            .map_err(|err| StressError::InvalidAddress(format!("{s}: {err}")))?;
        Ok(Address(bytes))
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for Address {
    type Error = StressError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Hands out consecutive sequence numbers for one sender.
///
/// `next` is a single `fetch_add`, so concurrent callers never see the same
/// value and `n` calls starting from `initial` issue exactly
/// `initial..initial + n`.
#[derive(Debug, Default)]
pub struct SequenceAllocator {
    next: AtomicU64,
}

impl SequenceAllocator {
    pub fn new(initial: u64) -> Self {
        Self {
            next: AtomicU64::new(initial),
        }
    }

    /// Return the current value and advance the counter by one.
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// Value the next call to [`SequenceAllocator::next`] would return.
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }

    /// Re-seed from the node's view of the account. Only used before workers start.
    pub fn reset(&self, value: u64) {
        self.next.store(value, Ordering::SeqCst);
    }
}

/// An identity that can sign transactions, plus its sequence counter.
pub struct Account {
    address: Address,
    signing_key: SigningKey,
    sequence: SequenceAllocator,
}

impl Account {
    pub fn new(signing_key: SigningKey, initial_sequence: u64) -> Self {
        let address = Address(signing_key.verifying_key().to_bytes());
        Self {
            address,
            signing_key,
            sequence: SequenceAllocator::new(initial_sequence),
        }
    }

    /// Fresh random keypair with a zero sequence counter.
    pub fn generate() -> Self {
        Self::new(SigningKey::generate(&mut OsRng), 0)
    }

    /// Load a 32-byte secret given as hex, with or without a `0x` prefix.
    pub fn from_secret_hex(raw: &str) -> Result<Self> {
        let normalized = raw.trim().trim_start_matches("0x");
        let bytes = hex::decode(normalized)
            .map_err(|err| StressError::InvalidKey(format!("invalid hex: {err}")))?;
        let key_bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| StressError::InvalidKey("must be 32 bytes (64 hex chars)".into()))?;
        Ok(Self::new(SigningKey::from_bytes(&key_bytes), 0))
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn sequence(&self) -> &SequenceAllocator {
        &self.sequence
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("address", &self.address)
            .field("next_sequence", &self.sequence.peek())
            .finish_non_exhaustive()
    }
}

pub fn generate_accounts(count: usize) -> Vec<Account> {
    (0..count).map(|_| Account::generate()).collect()
}
