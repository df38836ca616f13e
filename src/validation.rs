//! Typestate markers for cryptographic trust.
//!
//! TESLA keys and public keys carry a type parameter saying whether they have
//! been traced back to a trusted root (the Merkle tree root for public keys,
//! the ECDSA-signed KROOT for TESLA keys). Only [`Validated`] objects can be
//! used to validate other objects, so a key received over the air can never
//! authenticate data before it has itself been checked.

/// The object has passed every cryptographic check it needs.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct Validated {}

/// The object has been received but not yet checked.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct NotValidated {}
