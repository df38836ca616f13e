//! Merkle tree.
//!
//! This module contains code used to authenticate public keys against the OSNMA
//! Merkle tree.

use crate::bitfields::{DsmPkr, NewPublicKeyType};
use crate::pubkey::{PublicKey, PublicKeyError};
use crate::types::MerkleTreeNode;
use crate::validation::Validated;
use sha2::{Digest, Sha256};

const MERKLE_TREE_DEPTH: usize = 4;

/// Merkle tree.
///
/// This struct represents the OSNMA Merkle tree. Only its root is stored.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct MerkleTree {
    root: MerkleTreeNode,
}

/// Outcome of a successful DSM-PKR verification.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PkrOutcome {
    /// The DSM-PKR carries a new public key, which is now validated.
    NewPublicKey(PublicKey<Validated>),
    /// The DSM-PKR is an OSNMA Alert Message.
    AlertMessage,
}

impl MerkleTree {
    /// Creates a new Merkle tree.
    ///
    /// The value of the root of the Merkle tree is given to the constructor.
    pub fn new(root: MerkleTreeNode) -> MerkleTree {
        MerkleTree { root }
    }

    /// Returns the root of the tree.
    pub fn root(&self) -> &MerkleTreeNode {
        &self.root
    }

    /// Validates a DSM-PKR against this Merkle tree.
    ///
    /// The padding of the DSM-PKR is checked first. Then the leaf formed by
    /// the NPKT, NPKID and NPK fields is hashed and combined with the four
    /// intermediate tree nodes, taking the MID parity at each level to decide
    /// the side of the node, and the result is compared with the stored root.
    ///
    /// The validation algorithm is described in Section 6.2 of the
    /// [OSNMA SIS ICD v1.1](https://www.gsc-europa.eu/sites/default/files/sites/all/files/Galileo_OSNMA_SIS_ICD_v1.1.pdf).
    pub fn pkr_verification(&self, dsm_pkr: DsmPkr) -> Result<PkrOutcome, PkrError> {
        let Some(leaf) = dsm_pkr.merkle_tree_leaf() else {
            return Err(PkrError::ReservedField);
        };
        if !dsm_pkr.check_padding(&self.root) {
            log::error!("DSM-PKR padding check failed for MID {}", dsm_pkr.message_id());
            return Err(PkrError::WrongPadding);
        }
        let mut id = dsm_pkr.message_id();
        let mut node = Self::hash_leaf(leaf);
        for j in 0..MERKLE_TREE_DEPTH {
            let is_left = id & 1 == 0;
            let itn = dsm_pkr.intermediate_tree_node(j);
            node = if is_left {
                Self::calc_node(&node, itn)
            } else {
                Self::calc_node(itn, &node)
            };
            id >>= 1;
        }
        if node != self.root {
            log::error!(
                "DSM-PKR Merkle tree root mismatch for MID {}",
                dsm_pkr.message_id()
            );
            return Err(PkrError::WrongRoot);
        }
        match dsm_pkr.new_public_key_type() {
            NewPublicKeyType::EcdsaKey(key_type) => {
                let point = dsm_pkr.new_public_key().ok_or(PkrError::ReservedField)?;
                let key = PublicKey::from_sec1(key_type, point, dsm_pkr.new_public_key_id())?;
                // The key is a leaf of the tree, so it is authentic.
                Ok(PkrOutcome::NewPublicKey(key.force_valid()))
            }
            NewPublicKeyType::OsnmaAlertMessage => Ok(PkrOutcome::AlertMessage),
            NewPublicKeyType::Reserved => Err(PkrError::ReservedField),
        }
    }

    fn hash_leaf(leaf: &[u8]) -> MerkleTreeNode {
        let mut hash = Sha256::new();
        hash.update(leaf);
        hash.finalize().into()
    }

    fn calc_node(left: &MerkleTreeNode, right: &MerkleTreeNode) -> MerkleTreeNode {
        let mut hash = Sha256::new();
        hash.update(left);
        hash.update(right);
        hash.finalize().into()
    }
}

/// Errors produced during validation of the DSM-PKR using the Merkle tree.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, thiserror::Error)]
pub enum PkrError {
    /// One of the fields in the DSM-PKR needed to interpret it has a reserved
    /// value.
    #[error("reserved value present in some field")]
    ReservedField,
    /// The padding does not match.
    #[error("wrong DSM-PKR padding")]
    WrongPadding,
    /// The computed Merkle tree root value does not match the pre-stored Merkle
    /// tree root.
    #[error("wrong calculated Merkle tree root")]
    WrongRoot,
    /// The new public key is not a valid point.
    #[error(transparent)]
    InvalidKey(#[from] PublicKeyError),
}
