//! Detached Ed25519 block signatures.
//!
//! The signature covers the CID of the unsigned block. It is stored as its
//! own block and referenced from the signed block through a `_sig` link, so
//! signing changes the signed block's CID but never the signed content.

use crate::block::Block;
use crate::error::{MerkleError, Result};
use crate::store::BlockStore;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use mdcs_store::Transaction;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

/// Signature algorithms a signature block may carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureKind {
    Ed25519,
}

/// A stored signature: algorithm, signer public key and signature bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureBlock {
    pub kind: SignatureKind,
    pub identity: Vec<u8>,
    pub value: Vec<u8>,
}

/// A replica's signing identity.
#[derive(Clone)]
pub struct Identity {
    signing_key: SigningKey,
}

impl Identity {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_bytes(secret: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(secret),
        }
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Identity({})", hex::encode(&self.public_key_bytes()[..4]))
    }
}

/// Sign `block`, store the signature block, and return the signed block.
/// The returned block is not stored.
pub fn sign_block(txn: &mut dyn Transaction, block: Block, identity: &Identity) -> Result<Block> {
    let unsigned = block.without_signature();
    let cid = unsigned.cid()?;
    let signature = SignatureBlock {
        kind: SignatureKind::Ed25519,
        identity: identity.public_key_bytes().to_vec(),
        value: identity.sign(cid.as_bytes()).to_bytes().to_vec(),
    };
    let bytes = serde_json::to_vec(&signature).map_err(|e| MerkleError::Encode(e.to_string()))?;
    let sig_cid = txn.put_raw_block(bytes)?;
    Ok(unsigned.with_signature(sig_cid))
}

/// Check the signature linked from `block`. Unsigned blocks pass.
pub fn verify_block(txn: &mut dyn Transaction, block: &Block) -> Result<()> {
    let Some(sig_cid) = block.signature() else {
        return Ok(());
    };
    let unsigned = block.without_signature();
    let cid = unsigned.cid()?;
    let invalid = || MerkleError::InvalidSignature(cid);

    let bytes = txn.get_raw_block(&sig_cid)?;
    let signature: SignatureBlock = serde_json::from_slice(&bytes).map_err(|e| MerkleError::Decode {
        cid: sig_cid,
        reason: e.to_string(),
    })?;

    let key: [u8; 32] = signature.identity.as_slice().try_into().map_err(|_| invalid())?;
    let key = VerifyingKey::from_bytes(&key).map_err(|_| invalid())?;
    let value = Signature::from_slice(&signature.value).map_err(|_| invalid())?;
    key.verify(cid.as_bytes(), &value).map_err(|_| invalid())
}
