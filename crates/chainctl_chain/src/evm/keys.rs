//! secp256k1 keys and EIP-55 addresses.

use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use sha3::{Digest, Keccak256};

use chainctl_core::{ChainError, Result};

use crate::adapter::Seed;

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// ECDSA signature split into its recovery id and scalars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub recovery_id: u8,
    pub r: [u8; 32],
    pub s: [u8; 32],
}

/// A signing key with its derived account address.
pub struct EvmKey {
    secret: SecretKey,
    public: PublicKey,
    address: [u8; 20],
}

impl EvmKey {
    /// Interprets a 32-byte seed as the private key.
    pub fn from_seed(seed: &Seed) -> Result<Self> {
        let bytes = seed.as_bytes();
        if bytes.len() != 32 {
            return Err(ChainError::invalid(format!(
                "EVM seeds must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        let secret = SecretKey::from_slice(bytes)
            .map_err(|_| ChainError::invalid("seed is not a valid secp256k1 private key"))?;
        let secp = Secp256k1::new();
        let public = PublicKey::from_secret_key(&secp, &secret);
        let uncompressed = public.serialize_uncompressed();
        let hash = keccak256(&uncompressed[1..]);
        let mut address = [0u8; 20];
        address.copy_from_slice(&hash[12..]);
        Ok(Self {
            secret,
            public,
            address,
        })
    }

    pub fn address_bytes(&self) -> [u8; 20] {
        self.address
    }

    /// Checksummed `0x` address.
    pub fn address(&self) -> String {
        to_checksum(&self.address)
    }

    /// Compressed public key as hex.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public.serialize())
    }

    /// Signs a 32-byte digest with a recoverable signature.
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Result<Signature> {
        let secp = Secp256k1::new();
        let message = Message::from_digest_slice(digest)
            .map_err(|e| ChainError::invalid(format!("cannot sign digest: {e}")))?;
        let sig = secp.sign_ecdsa_recoverable(&message, &self.secret);
        let (recovery_id, compact) = sig.serialize_compact();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&compact[..32]);
        s.copy_from_slice(&compact[32..]);
        Ok(Signature {
            recovery_id: recovery_id.to_i32() as u8,
            r,
            s,
        })
    }
}

/// EIP-55 mixed-case checksum encoding.
pub fn to_checksum(address: &[u8; 20]) -> String {
    let lower = hex::encode(address);
    let hash = keccak256(lower.as_bytes());
    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let byte = hash[i / 2];
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Parses a `0x` address. Mixed-case input must carry a valid checksum.
pub fn parse_address(text: &str) -> Result<[u8; 20]> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("0x")
        .ok_or_else(|| ChainError::invalid(format!("\"{text}\" is not a 0x address")))?;
    if body.len() != 40 {
        return Err(ChainError::invalid(format!("\"{text}\" is not a 20-byte address")));
    }
    let bytes = hex::decode(body)
        .map_err(|_| ChainError::invalid(format!("\"{text}\" is not a hex address")))?;
    let mut address = [0u8; 20];
    address.copy_from_slice(&bytes);

    let mixed = body.chars().any(|c| c.is_ascii_uppercase()) && body.chars().any(|c| c.is_ascii_lowercase());
    if mixed && to_checksum(&address) != trimmed {
        return Err(ChainError::invalid(format!("\"{text}\" has an invalid checksum")));
    }
    Ok(address)
}

pub fn is_address(text: &str) -> bool {
    parse_address(text).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANVIL_KEY_0: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn derives_known_anvil_address() {
        let key = EvmKey::from_seed(&Seed::from_hex(ANVIL_KEY_0).unwrap()).unwrap();
        assert_eq!(key.address(), "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
        assert_eq!(key.public_key_hex().len(), 66);
    }

    #[test]
    fn rejects_wrong_seed_length() {
        let err = EvmKey::from_seed(&Seed::from_hex("0102").unwrap()).err().unwrap();
        assert!(matches!(err, ChainError::InvalidInput(_)));
    }

    #[test]
    fn rejects_zero_key() {
        let zero = Seed::from_hex(&"00".repeat(32)).unwrap();
        assert!(EvmKey::from_seed(&zero).is_err());
    }

    #[test]
    fn checksum_validation() {
        assert!(is_address("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"));
        assert!(is_address("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"));
        assert!(!is_address("0xF39fd6e51aad88F6F4ce6aB8827279cffFb92266"));
        assert!(!is_address("f39fd6e51aad88f6f4ce6ab8827279cfffb92266"));
        assert!(!is_address("alice"));
    }
}
