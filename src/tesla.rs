//! TESLA keys and chains.
//!
//! This module contains the [`Chain`] parameters of a TESLA chain, the TESLA
//! [`Key`] type, and [`TeslaChain`], which keeps track of the keys of a chain
//! that have been verified so far and owns the [`TagVerification`] engine that
//! uses them.

use crate::bitfields::{self, DsmKroot, KrootVerification, NmaHeader, NmaStatus};
use crate::bits::BitBuilder;
use crate::gst::{Gst, Tow};
use crate::pubkey::PublicKey;
use crate::tags::TagVerification;
use crate::types::BitSlice;
use crate::validation::{NotValidated, Validated};
use aes::Aes128;
use cmac::Cmac;
use core::fmt;
use core::str::FromStr;
use crypto_common::KeyInit;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use sha3::Sha3_256;
use std::collections::BTreeMap;

const MAX_KEY_BYTES: usize = 32;

/// Maximum number of one-way function applications done to verify a key.
///
/// This is slightly greater than one day of keys at one key per subframe.
pub const MAX_DERIVATIONS: u32 = 3000;

// Number of verified keys cached below the last verified key
const MAX_CACHED_KEYS: u32 = 256;

/// Scheme used to assign an index to a TESLA key from its GST.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum KeyIndexScheme {
    /// One key per subframe, common to all the satellites.
    ///
    /// The key transmitted in the subframe starting at GST0 has index 1.
    #[default]
    PerSubframe,
    /// NMACK keys per subframe, one for each MACK block.
    ///
    /// The key of MACK block `b` (starting at 1) transmitted in the subframe
    /// `n` subframes after GST0 has index `n * NMACK + b`.
    PerMackBlock,
}

impl FromStr for KeyIndexScheme {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<KeyIndexScheme, ChainError> {
        match s.trim() {
            "subframe" => Ok(KeyIndexScheme::PerSubframe),
            "mack_block" => Ok(KeyIndexScheme::PerMackBlock),
            _ => Err(ChainError::UnknownIndexScheme),
        }
    }
}

/// TESLA chain parameters.
///
/// This holds the parameters of a chain, as given by its DSM-KROOT. It is
/// immutable and cheap to copy.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Chain {
    status: ChainStatus,
    id: u8,
    hash_function: HashFunction,
    mac_function: MacFunction,
    key_size_bytes: usize,
    tag_size_bits: usize,
    maclt: u8,
    alpha: u64,
    nmack: u8,
    gst0: Gst,
    index_scheme: KeyIndexScheme,
}

/// Chain status.
///
/// This is the NMA status of the header that carried the DSM-KROOT.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ChainStatus {
    /// Test.
    Test,
    /// Operational.
    Operational,
}

/// Hash function used by the one-way function of the chain.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum HashFunction {
    /// SHA-256.
    Sha256,
    /// SHA3-256.
    Sha3_256,
}

/// MAC function used for tags.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum MacFunction {
    /// HMAC-SHA-256.
    HmacSha256,
    /// CMAC-AES.
    CmacAes,
}

impl Chain {
    /// Extracts the chain parameters from a DSM-KROOT.
    pub fn from_dsm_kroot(
        nma_header: NmaHeader,
        dsm_kroot: DsmKroot,
        index_scheme: KeyIndexScheme,
    ) -> Result<Chain, ChainError> {
        let status = match nma_header.nma_status() {
            NmaStatus::Test => ChainStatus::Test,
            NmaStatus::Operational => ChainStatus::Operational,
            NmaStatus::DontUse => return Err(ChainError::NmaDontUse),
            NmaStatus::Reserved => return Err(ChainError::ReservedField),
        };
        let hash_function = match dsm_kroot.hash_function() {
            bitfields::HashFunction::Sha256 => HashFunction::Sha256,
            bitfields::HashFunction::Sha3_256 => HashFunction::Sha3_256,
            bitfields::HashFunction::Reserved => return Err(ChainError::ReservedField),
        };
        let mac_function = match dsm_kroot.mac_function() {
            bitfields::MacFunction::HmacSha256 => MacFunction::HmacSha256,
            bitfields::MacFunction::CmacAes => MacFunction::CmacAes,
            bitfields::MacFunction::Reserved => return Err(ChainError::ReservedField),
        };
        let key_size_bytes = dsm_kroot.key_size().ok_or(ChainError::ReservedField)? / 8;
        let tag_size_bits = dsm_kroot.tag_size().ok_or(ChainError::ReservedField)?;
        let towh = Tow::from(dsm_kroot.kroot_towh());
        let gst0 = Gst::try_new(dsm_kroot.kroot_wn(), towh * 3600).ok_or(ChainError::ReservedField)?;
        Ok(Chain {
            status,
            id: dsm_kroot.kroot_chain_id(),
            hash_function,
            mac_function,
            key_size_bytes,
            tag_size_bits,
            maclt: dsm_kroot.mac_lookup_table(),
            alpha: dsm_kroot.alpha(),
            nmack: dsm_kroot.nmack(),
            gst0,
            index_scheme,
        })
    }

    /// Chain status.
    pub fn chain_status(&self) -> ChainStatus {
        self.status
    }

    /// Chain ID.
    pub fn chain_id(&self) -> u8 {
        self.id
    }

    /// Hash function.
    pub fn hash_function(&self) -> HashFunction {
        self.hash_function
    }

    /// MAC function.
    pub fn mac_function(&self) -> MacFunction {
        self.mac_function
    }

    /// Key size in bytes.
    pub fn key_size_bytes(&self) -> usize {
        self.key_size_bytes
    }

    /// Key size in bits.
    pub fn key_size_bits(&self) -> usize {
        self.key_size_bytes() * 8
    }

    /// Tag size in bits.
    pub fn tag_size_bits(&self) -> usize {
        self.tag_size_bits
    }

    /// MAC look-up table ID.
    pub fn mac_lookup_table(&self) -> u8 {
        self.maclt
    }

    /// Random pattern alpha.
    pub fn alpha(&self) -> u64 {
        self.alpha
    }

    /// Number of MACK blocks per subframe.
    pub fn nmack(&self) -> u8 {
        self.nmack
    }

    /// Chain start GST (GST0).
    ///
    /// The KROOT corresponds to the subframe before GST0.
    pub fn gst0(&self) -> Gst {
        self.gst0
    }

    /// Key index scheme.
    pub fn key_index_scheme(&self) -> KeyIndexScheme {
        self.index_scheme
    }

    /// Index of the key transmitted in the subframe `gst_subframe`, in MACK
    /// block `mack_block` (starting at 1).
    ///
    /// Returns `None` if the GST is before GST0 or not subframe aligned.
    pub fn key_index(&self, gst_subframe: Gst, mack_block: u8) -> Option<u32> {
        let diff = gst_subframe.seconds_since(self.gst0);
        if diff < 0 || diff % 30 != 0 {
            return None;
        }
        let subframes = u32::try_from(diff / 30).ok()?;
        match self.index_scheme {
            KeyIndexScheme::PerSubframe => subframes.checked_add(1),
            KeyIndexScheme::PerMackBlock => {
                let block = u32::from(mack_block.clamp(1, self.nmack));
                subframes
                    .checked_mul(self.nmack.into())?
                    .checked_add(block)
            }
        }
    }

    /// GST of the subframe in which the key with index `index` is
    /// transmitted.
    pub fn gst_of_index(&self, index: u32) -> Gst {
        let subframes = match self.index_scheme {
            KeyIndexScheme::PerSubframe => index,
            KeyIndexScheme::PerMackBlock => index.div_ceil(self.nmack.into()),
        };
        let subframes = i32::try_from(subframes.min(i32::MAX as u32 / 30)).unwrap_or(0);
        self.gst0.add_subframes(subframes - 1)
    }
}

/// Errors produced when building a chain from a DSM-KROOT.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, thiserror::Error)]
pub enum ChainError {
    /// A field needed to define the chain has a reserved value.
    #[error("reserved value present in some field")]
    ReservedField,
    /// The NMA status is "don't use".
    #[error("NMA status is don't use")]
    NmaDontUse,
    /// Unknown key index scheme name.
    #[error("unknown key index scheme")]
    UnknownIndexScheme,
}

/// TESLA key.
///
/// The type parameter `V` tells whether the key has been validated by the
/// chain.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Key<V> {
    data: [u8; MAX_KEY_BYTES],
    chain: Chain,
    gst_subframe: Gst,
    index: u32,
    _validated: V,
}

impl<V> Key<V> {
    /// GST of the subframe in which the key is transmitted.
    pub fn gst_subframe(&self) -> Gst {
        self.gst_subframe
    }

    /// Index of the key in the chain. The KROOT has index 0.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Chain of the key.
    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Key bytes.
    pub fn data(&self) -> &[u8] {
        &self.data[..self.chain.key_size_bytes]
    }

    fn force_valid(self) -> Key<Validated> {
        Key {
            data: self.data,
            chain: self.chain,
            gst_subframe: self.gst_subframe,
            index: self.index,
            _validated: Validated {},
        }
    }
}

impl<V> fmt::Debug for Key<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("data", &hex::encode(self.data()))
            .field("gst_subframe", &self.gst_subframe)
            .field("index", &self.index)
            .field("chain_id", &self.chain.id)
            .finish()
    }
}

impl Key<NotValidated> {
    /// Builds a key from the key field of a MACK message.
    ///
    /// Returns `None` if the GST precedes the start of the chain.
    pub fn from_bitslice(
        slice: &BitSlice,
        gst: Gst,
        mack_block: u8,
        chain: &Chain,
    ) -> Option<Key<NotValidated>> {
        let index = chain.key_index(gst, mack_block)?;
        let mut data = [0; MAX_KEY_BYTES];
        let len = chain.key_size_bits().min(slice.len());
        BitSlice::from_slice_mut(&mut data)[..len].copy_from_bitslice(&slice[..len]);
        Some(Self::with_index(data, gst, index, chain))
    }

    /// Builds a key from its bytes and the GST of the subframe in which it is
    /// transmitted.
    pub fn from_slice(slice: &[u8], gst: Gst, chain: &Chain) -> Option<Key<NotValidated>> {
        let index = chain.key_index(gst, 1)?;
        let mut data = [0; MAX_KEY_BYTES];
        let len = chain.key_size_bytes.min(slice.len());
        data[..len].copy_from_slice(&slice[..len]);
        Some(Self::with_index(data, gst, index, chain))
    }

    fn with_index(data: [u8; MAX_KEY_BYTES], gst: Gst, index: u32, chain: &Chain) -> Self {
        Key {
            data,
            chain: *chain,
            gst_subframe: gst,
            index,
            _validated: NotValidated {},
        }
    }
}

impl Key<Validated> {
    /// Extracts and verifies the KROOT of a DSM-KROOT.
    ///
    /// All the checks of [`DsmKroot::kroot_verification`] must pass, and
    /// `pubkey` must have the PKID given in the DSM-KROOT.
    pub fn from_dsm_kroot(
        nma_header: NmaHeader,
        dsm_kroot: DsmKroot,
        pubkey: &PublicKey<Validated>,
        index_scheme: KeyIndexScheme,
    ) -> Result<Key<Validated>, KrootValidationError> {
        if !dsm_kroot.is_complete() {
            return Err(KrootValidationError::Incomplete);
        }
        if pubkey.pkid() != dsm_kroot.public_key_id() {
            return Err(KrootValidationError::WrongPublicKeyId);
        }
        let verification = dsm_kroot.kroot_verification(nma_header, pubkey);
        if !verification.is_valid() {
            return Err(KrootValidationError::Verification(verification));
        }
        let chain = Chain::from_dsm_kroot(nma_header, dsm_kroot, index_scheme)?;
        let kroot = dsm_kroot
            .kroot()
            .ok_or(KrootValidationError::Chain(ChainError::ReservedField))?;
        Ok(Self::kroot_from_slice(kroot, &chain))
    }

    /// Builds the KROOT of `chain` from trusted bytes.
    ///
    /// This is used for KROOTs that have already been verified, for instance
    /// those read from storage.
    pub fn kroot_from_slice(kroot: &[u8], chain: &Chain) -> Key<Validated> {
        let mut data = [0; MAX_KEY_BYTES];
        let len = chain.key_size_bytes.min(kroot.len());
        data[..len].copy_from_slice(&kroot[..len]);
        Key::with_index(data, chain.gst0.add_subframes(-1), 0, chain).force_valid()
    }
}

/// Errors produced when extracting the KROOT of a DSM-KROOT.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, thiserror::Error)]
pub enum KrootValidationError {
    /// The DSM-KROOT does not hold the number of blocks given in NB_DK.
    #[error("DSM-KROOT size does not match NB_DK")]
    Incomplete,
    /// The public key does not have the PKID of the DSM-KROOT.
    #[error("public key ID does not match the DSM-KROOT")]
    WrongPublicKeyId,
    /// Some check of the DSM-KROOT failed.
    #[error("DSM-KROOT verification failed: {0:?}")]
    Verification(KrootVerification),
    /// The chain parameters are invalid.
    #[error("invalid chain parameters: {0}")]
    Chain(#[from] ChainError),
}

impl<V: Clone> Key<V> {
    /// Applies the one-way function, obtaining the previous key in the chain.
    ///
    /// The previous key is the truncated hash of this key, the GST of the
    /// previous key and alpha.
    pub fn one_way_function(&self) -> Key<V> {
        let index = self.index.saturating_sub(1);
        let previous_gst = self.chain.gst_of_index(index);
        let size = self.chain.key_size_bytes;
        let mut message = BitBuilder::new();
        message
            .push_bytes(&self.data[..size])
            .push_uint(previous_gst.wn().into(), 12)
            .push_uint(previous_gst.tow().into(), 20)
            .push_uint(self.chain.alpha, 48);
        let message = message.into_bytes();
        let mut new_key = [0; MAX_KEY_BYTES];
        match self.chain.hash_function {
            HashFunction::Sha256 => {
                let hash = Sha256::digest(&message);
                new_key[..size].copy_from_slice(&hash[..size]);
            }
            HashFunction::Sha3_256 => {
                let hash = Sha3_256::digest(&message);
                new_key[..size].copy_from_slice(&hash[..size]);
            }
        };
        Key {
            data: new_key,
            chain: self.chain,
            gst_subframe: previous_gst,
            index,
            _validated: self._validated.clone(),
        }
    }
}

fn nmas_code(nma_status: NmaStatus) -> u64 {
    match nma_status {
        NmaStatus::Reserved => 0,
        NmaStatus::Test => 1,
        NmaStatus::Operational => 2,
        NmaStatus::DontUse => 3,
    }
}

impl Key<Validated> {
    /// Checks a tag other than tag0.
    ///
    /// The MAC covers PRN_D, PRN_A, the GST of the tag subframe, the tag
    /// counter `ctr`, the NMA status and the navigation data.
    #[allow(clippy::too_many_arguments)]
    pub fn validate_tag(
        &self,
        tag: &BitSlice,
        tag_gst: Gst,
        prnd: u8,
        prna: u8,
        ctr: u8,
        nma_status: NmaStatus,
        navdata: &BitSlice,
    ) -> bool {
        let mut message = BitBuilder::new();
        message.push_uint(prnd.into(), 8);
        Self::push_common_tag_message(&mut message, tag_gst, prna, ctr, nma_status, navdata);
        self.check_tag(&message.into_bytes(), tag)
    }

    /// Checks tag0, which always authenticates the CED of the transmitting
    /// satellite and has a counter of 1.
    pub fn validate_tag0(
        &self,
        tag0: &BitSlice,
        tag_gst: Gst,
        prna: u8,
        nma_status: NmaStatus,
        navdata: &BitSlice,
    ) -> bool {
        let mut message = BitBuilder::new();
        Self::push_common_tag_message(&mut message, tag_gst, prna, 1, nma_status, navdata);
        self.check_tag(&message.into_bytes(), tag0)
    }

    fn push_common_tag_message(
        message: &mut BitBuilder,
        gst: Gst,
        prna: u8,
        ctr: u8,
        nma_status: NmaStatus,
        navdata: &BitSlice,
    ) {
        message
            .push_uint(prna.into(), 8)
            .push_uint(gst.wn().into(), 12)
            .push_uint(gst.tow().into(), 20)
            .push_uint(ctr.into(), 8)
            .push_uint(nmas_code(nma_status), 2)
            .push_bits(navdata);
    }

    /// Checks the MACSEQ field of a MACK message.
    ///
    /// The MAC covers PRN_A, the GST of the MACK subframe and the 16-bit tag
    /// info of each flexible tag, in order.
    pub fn validate_macseq(
        &self,
        macseq: u16,
        prna: u8,
        gst_subframe: Gst,
        flex_tag_infos: &[u16],
    ) -> bool {
        let mut message = BitBuilder::new();
        message
            .push_uint(prna.into(), 8)
            .push_uint(gst_subframe.wn().into(), 12)
            .push_uint(gst_subframe.tow().into(), 20);
        for &info in flex_tag_infos {
            message.push_uint(info.into(), 16);
        }
        let mut expected = BitBuilder::new();
        expected.push_uint(macseq.into(), 12);
        self.check_tag(&message.into_bytes(), expected.as_bitslice())
    }

    fn check_tag(&self, message: &[u8], tag: &BitSlice) -> bool {
        match self.chain.mac_function {
            MacFunction::HmacSha256 => self.check_tag_mac::<Hmac<Sha256>>(message, tag),
            MacFunction::CmacAes => self.check_tag_mac::<Cmac<Aes128>>(message, tag),
        }
    }

    fn check_tag_mac<M: Mac + KeyInit>(&self, message: &[u8], tag: &BitSlice) -> bool {
        let key = &self.data[..self.chain.key_size_bytes];
        let Ok(mut mac) = <M as Mac>::new_from_slice(key) else {
            log::error!(
                "key size of {} bytes not usable with {:?}",
                key.len(),
                self.chain.mac_function
            );
            return false;
        };
        mac.update(message);
        let mac = mac.finalize().into_bytes();
        let computed = BitSlice::from_slice(&mac);
        tag.len() <= computed.len() && computed[..tag.len()] == *tag
    }
}

/// Errors produced when adding a key to a [`TeslaChain`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, thiserror::Error)]
pub enum TeslaError {
    /// The key does not hash to the verified key of the chain.
    #[error("key with index {index} does not follow the one-way function")]
    WrongOneWayFunction {
        /// Index of the offending key.
        index: u32,
    },
    /// The key is too far from the last verified key.
    #[error("too many derivations ({gap}) needed to verify key")]
    TooManyDerivations {
        /// Number of derivations that would be needed.
        gap: u32,
    },
    /// The key belongs to another chain.
    #[error("key belongs to a different chain")]
    DifferentChain,
}

/// Store of verified TESLA keys of a chain.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct KeyStore {
    root_key: Key<Validated>,
    last_key: Key<Validated>,
    derived: BTreeMap<u32, Key<Validated>>,
    regenerate: bool,
}

impl KeyStore {
    /// Creates a key store whose only verified key is `root_key`.
    ///
    /// If `regenerate` is set, the intermediate keys computed while verifying
    /// a new key are stored too.
    pub fn new(root_key: Key<Validated>, regenerate: bool) -> KeyStore {
        let mut derived = BTreeMap::new();
        derived.insert(root_key.index, root_key);
        KeyStore {
            root_key,
            last_key: root_key,
            derived,
            regenerate,
        }
    }

    /// Root key of the chain. This need not be the KROOT when the chain was
    /// started from a key other than the KROOT.
    pub fn root_key(&self) -> &Key<Validated> {
        &self.root_key
    }

    /// Verified key with the highest index.
    pub fn last_key(&self) -> &Key<Validated> {
        &self.last_key
    }

    /// Verifies a new key.
    ///
    /// Returns whether the key was not previously known and is now verified,
    /// together with its index. A key with an index at or below the last
    /// verified key is compared with the key derived at that index.
    pub fn add_key(&mut self, new_key: &Key<NotValidated>) -> Result<(bool, u32), TeslaError> {
        if new_key.chain != self.last_key.chain {
            return Err(TeslaError::DifferentChain);
        }
        let index = new_key.index;
        let last = self.last_key.index;
        if index <= last {
            let known = self
                .key_at(index)
                .ok_or(TeslaError::TooManyDerivations { gap: last - index })?;
            return if known.data() == new_key.data() {
                log::trace!("key {index} already verified");
                Ok((false, index))
            } else {
                Err(TeslaError::WrongOneWayFunction { index })
            };
        }
        let gap = index - last;
        if gap > MAX_DERIVATIONS {
            return Err(TeslaError::TooManyDerivations { gap });
        }
        let mut intermediate = Vec::with_capacity(gap as usize);
        let mut key = *new_key;
        for _ in 0..gap {
            let previous = key.one_way_function();
            intermediate.push(key);
            key = previous;
        }
        if key.data() != self.last_key.data() {
            return Err(TeslaError::WrongOneWayFunction { index });
        }
        let new_key = new_key.force_valid();
        log::info!(
            "TESLA key {index} at {} verified by key {last}",
            new_key.gst_subframe
        );
        if self.regenerate {
            for k in intermediate {
                self.derived.insert(k.index, k.force_valid());
            }
        }
        self.derived.insert(index, new_key);
        self.last_key = new_key;
        self.prune();
        Ok((true, index))
    }

    fn prune(&mut self) {
        let floor = self.last_key.index.saturating_sub(MAX_CACHED_KEYS);
        self.derived = self.derived.split_off(&floor);
    }

    /// Returns `true` if the key with index `index` is available, which
    /// happens when it is not newer than the last verified key.
    pub fn key_check(&self, index: u32) -> bool {
        index <= self.last_key.index
    }

    /// Returns the verified key with index `index`.
    ///
    /// Keys that are not cached are derived from the nearest cached key above
    /// them and cached.
    pub fn key_at(&mut self, index: u32) -> Option<Key<Validated>> {
        if !self.key_check(index) {
            return None;
        }
        let start = match self.derived.range(index..).next() {
            Some((_, k)) => *k,
            None => self.last_key,
        };
        if start.index - index > MAX_DERIVATIONS {
            log::warn!("key {index} is too old to be derived from key {}", start.index);
            return None;
        }
        let mut key = start;
        while key.index > index {
            key = key.one_way_function();
            if self.regenerate {
                self.derived.insert(key.index, key);
            }
        }
        self.derived.insert(index, key);
        Some(key)
    }
}

/// TESLA chain.
///
/// Holds the chain parameters, its verified keys and the tags waiting for
/// keys of this chain.
#[derive(Debug, Clone)]
pub struct TeslaChain {
    chain: Chain,
    keys: KeyStore,
    engine: TagVerification,
}

impl TeslaChain {
    /// Creates a chain from a verified root key.
    pub fn new(root_key: Key<Validated>, regenerate: bool, engine: TagVerification) -> TeslaChain {
        TeslaChain {
            chain: *root_key.chain(),
            keys: KeyStore::new(root_key, regenerate),
            engine,
        }
    }

    /// Chain parameters.
    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Verified keys.
    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    /// Verified keys, mutably.
    pub fn keys_mut(&mut self) -> &mut KeyStore {
        &mut self.keys
    }

    /// Tag verification engine.
    pub fn engine(&self) -> &TagVerification {
        &self.engine
    }

    /// Split borrow of the key store and the tag verification engine.
    pub fn keys_and_engine_mut(&mut self) -> (&mut KeyStore, &mut TagVerification) {
        (&mut self.keys, &mut self.engine)
    }

    /// Verifies a new key. See [`KeyStore::add_key`].
    pub fn add_key(&mut self, new_key: &Key<NotValidated>) -> Result<(bool, u32), TeslaError> {
        self.keys.add_key(new_key)
    }

    /// Index of the last verified key.
    pub fn last_index(&self) -> u32 {
        self.keys.last_key().index()
    }
}
