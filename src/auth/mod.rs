use std::collections::BTreeMap;

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::address::Address;
use crate::ledger::LedgerCall;

const CALL_DOMAIN: &[u8] = b"t9c-call";

/// A ledger call signed by the key that owns the calling address.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedCall {
    #[serde(with = "crate::encoding::hex_bytes")]
    pub public_key: [u8; 32],
    pub nonce: u64,
    pub call: LedgerCall,
    #[serde(with = "crate::encoding::hex_bytes")]
    pub signature: Vec<u8>,
}

impl SignedCall {
    pub fn sign(key: &SigningKey, nonce: u64, call: LedgerCall) -> Self {
        let public_key = key.verifying_key().to_bytes();
        let digest = call_digest(&public_key, nonce, &call);
        let signature = key.sign(&digest).to_bytes().to_vec();
        Self {
            public_key,
            nonce,
            call,
            signature,
        }
    }

    /// `sha256(domain ‖ public_key ‖ nonce_le ‖ json(call))`.
    pub fn digest(&self) -> [u8; 32] {
        call_digest(&self.public_key, self.nonce, &self.call)
    }
}

fn call_digest(public_key: &[u8; 32], nonce: u64, call: &LedgerCall) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(CALL_DOMAIN);
    hasher.update(public_key);
    hasher.update(nonce.to_le_bytes());
    // Serializing a plain enum of addresses, strings and integers cannot fail.
    hasher.update(serde_json::to_vec(call).unwrap_or_default());
    hasher.finalize().into()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("malformed public key")]
    MalformedKey,
    #[error("malformed signature from {0}")]
    MalformedSignature(Address),
    #[error("invalid signature from {0}")]
    InvalidSignature(Address),
    #[error("stale nonce from {caller}: got {got}, expected above {expected_above}")]
    StaleNonce {
        caller: Address,
        expected_above: u64,
        got: u64,
    },
}

/// Recovers caller identities from signed calls and rejects replays.
#[derive(Default)]
pub struct CallAuthenticator {
    last_nonce: BTreeMap<Address, u64>,
}

impl CallAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks the signature strictly and that the nonce moves forward, then
    /// returns the caller's address. The nonce is only consumed on success.
    pub fn verify(&mut self, call: &SignedCall) -> Result<Address, AuthError> {
        let key =
            VerifyingKey::from_bytes(&call.public_key).map_err(|_| AuthError::MalformedKey)?;
        let caller = Address::from_verifying_key(&key);
        let signature = Signature::from_slice(&call.signature)
            .map_err(|_| AuthError::MalformedSignature(caller))?;
        key.verify_strict(&call.digest(), &signature)
            .map_err(|_| AuthError::InvalidSignature(caller))?;

        if let Some(&last) = self.last_nonce.get(&caller) {
            if call.nonce <= last {
                return Err(AuthError::StaleNonce {
                    caller,
                    expected_above: last,
                    got: call.nonce,
                });
            }
        }
        self.last_nonce.insert(caller, call.nonce);
        Ok(caller)
    }

    pub fn last_nonce(&self, caller: &Address) -> Option<u64> {
        self.last_nonce.get(caller).copied()
    }
}
