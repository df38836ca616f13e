//! ECDSA public keys.
//!
//! OSNMA signs the DSM-KROOT with either ECDSA P-256/SHA-256 or ECDSA
//! P-521/SHA-512. This module wraps both kinds of keys together with their
//! public key ID (PKID) and validation status.

use crate::validation::{NotValidated, Validated};
use core::fmt;
use signature::Verifier;

/// Public key type.
///
/// The discriminants of the variants are the NPKT codes used in the DSM-PKR.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum PublicKeyType {
    /// ECDSA P-256/SHA-256.
    P256Sha256,
    /// ECDSA P-521/SHA-512.
    P521Sha512,
}

impl PublicKeyType {
    /// Looks up the key type from an NPKT value.
    ///
    /// Returns `None` for reserved values and for the OSNMA Alert Message
    /// code, which does not designate a key.
    pub fn from_npkt(npkt: u8) -> Option<PublicKeyType> {
        match npkt {
            1 => Some(PublicKeyType::P256Sha256),
            3 => Some(PublicKeyType::P521Sha512),
            _ => None,
        }
    }

    /// NPKT code of the key type.
    pub fn npkt(&self) -> u8 {
        match self {
            PublicKeyType::P256Sha256 => 1,
            PublicKeyType::P521Sha512 => 3,
        }
    }

    /// Length in bits of the compressed SEC1 point of this key type.
    pub fn point_bits(&self) -> usize {
        match self {
            PublicKeyType::P256Sha256 => 264,
            PublicKeyType::P521Sha512 => 536,
        }
    }

    /// Length in bits of an ECDSA signature made with this key type.
    pub fn signature_bits(&self) -> usize {
        match self {
            PublicKeyType::P256Sha256 => 512,
            PublicKeyType::P521Sha512 => 1056,
        }
    }

    /// Name used in the public key files.
    pub fn name(&self) -> &'static str {
        match self {
            PublicKeyType::P256Sha256 => "ECDSA P-256/SHA-256",
            PublicKeyType::P521Sha512 => "ECDSA P-521/SHA-512",
        }
    }

    /// Parses a key type name as found in public key files.
    ///
    /// Both the full name and the short form (`P-256/SHA-256`) are accepted.
    pub fn from_name(name: &str) -> Option<PublicKeyType> {
        let name = name.trim();
        let name = name.strip_prefix("ECDSA ").unwrap_or(name);
        match name {
            "P-256/SHA-256" => Some(PublicKeyType::P256Sha256),
            "P-521/SHA-512" => Some(PublicKeyType::P521Sha512),
            _ => None,
        }
    }
}

impl fmt::Display for PublicKeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.name().fmt(f)
    }
}

#[derive(Clone)]
enum VerifyingKey {
    P256(p256::ecdsa::VerifyingKey),
    P521(p521::ecdsa::VerifyingKey),
}

// p521 verifying keys do not implement Debug
impl fmt::Debug for VerifyingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyingKey::P256(_) => f.write_str("P256"),
            VerifyingKey::P521(_) => f.write_str("P521"),
        }
    }
}

/// ECDSA public key.
///
/// The type parameter `V` is [`Validated`] once the key has been checked
/// against the Merkle tree or loaded from trusted storage.
#[derive(Debug, Clone)]
pub struct PublicKey<V> {
    key: VerifyingKey,
    point: Vec<u8>,
    pkid: u8,
    _validated: V,
}

/// Errors produced when building a public key.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, thiserror::Error)]
pub enum PublicKeyError {
    /// The point is not a valid SEC1 encoding for the key type.
    #[error("invalid SEC1 point for {0}")]
    InvalidPoint(PublicKeyType),
}

impl PublicKey<NotValidated> {
    /// Wraps a P-256 verifying key.
    pub fn from_p256(key: p256::ecdsa::VerifyingKey, pkid: u8) -> PublicKey<NotValidated> {
        let point = key.to_encoded_point(true).as_bytes().to_vec();
        PublicKey {
            key: VerifyingKey::P256(key),
            point,
            pkid,
            _validated: NotValidated {},
        }
    }

    /// Wraps a P-521 verifying key.
    pub fn from_p521(key: p521::ecdsa::VerifyingKey, pkid: u8) -> PublicKey<NotValidated> {
        let point = key.to_encoded_point(true).as_bytes().to_vec();
        PublicKey {
            key: VerifyingKey::P521(key),
            point,
            pkid,
            _validated: NotValidated {},
        }
    }

    /// Builds a public key from its SEC1 encoding.
    pub fn from_sec1(
        key_type: PublicKeyType,
        point: &[u8],
        pkid: u8,
    ) -> Result<PublicKey<NotValidated>, PublicKeyError> {
        let key = match key_type {
            PublicKeyType::P256Sha256 => VerifyingKey::P256(
                p256::ecdsa::VerifyingKey::from_sec1_bytes(point)
                    .map_err(|_| PublicKeyError::InvalidPoint(key_type))?,
            ),
            PublicKeyType::P521Sha512 => VerifyingKey::P521(
                p521::ecdsa::VerifyingKey::from_sec1_bytes(point)
                    .map_err(|_| PublicKeyError::InvalidPoint(key_type))?,
            ),
        };
        Ok(PublicKey {
            key,
            point: point.to_vec(),
            pkid,
            _validated: NotValidated {},
        })
    }

    /// Marks the key as validated.
    ///
    /// This is meant for keys read from trusted storage. Keys received in a
    /// DSM-PKR are validated by the [`MerkleTree`](crate::merkle_tree::MerkleTree).
    pub fn force_valid(self) -> PublicKey<Validated> {
        PublicKey {
            key: self.key,
            point: self.point,
            pkid: self.pkid,
            _validated: Validated {},
        }
    }
}

impl<V> PublicKey<V> {
    /// Public key ID.
    pub fn pkid(&self) -> u8 {
        self.pkid
    }

    /// Key type.
    pub fn key_type(&self) -> PublicKeyType {
        match self.key {
            VerifyingKey::P256(_) => PublicKeyType::P256Sha256,
            VerifyingKey::P521(_) => PublicKeyType::P521Sha512,
        }
    }

    /// SEC1 encoding of the key, as it was received or loaded.
    pub fn point(&self) -> &[u8] {
        &self.point
    }
}

impl PublicKey<Validated> {
    /// Checks an ECDSA signature.
    ///
    /// The signature `signature` is the concatenation of `r` and `s`. The
    /// message is hashed with the hash function of the key type.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        match &self.key {
            VerifyingKey::P256(key) => match p256::ecdsa::Signature::from_slice(signature) {
                Ok(sig) => key.verify(message, &sig).is_ok(),
                Err(_) => false,
            },
            VerifyingKey::P521(key) => match p521::ecdsa::Signature::from_slice(signature) {
                Ok(sig) => key.verify(message, &sig).is_ok(),
                Err(_) => false,
            },
        }
    }
}

impl<V> PartialEq for PublicKey<V> {
    fn eq(&self, other: &Self) -> bool {
        self.pkid == other.pkid && self.point == other.point
    }
}

impl<V> Eq for PublicKey<V> {}
