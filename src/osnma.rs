use crate::bitfields::{ChainAndPubkeyStatus, DsmKroot, DsmPkr, DsmType, NmaHeader, NmaStatus};
use crate::config::Config;
use crate::dsm::{CollectDsm, Dsm};
use crate::gst::Gst;
use crate::key_material::{self, KeyMaterialError, StoredKroot};
use crate::mack::Mack;
use crate::merkle_tree::{MerkleTree, PkrOutcome};
use crate::navmessage::{AuthenticatedBlock, NavigationDataManager};
use crate::pubkey::PublicKey;
use crate::regenerator::SubframeRegenerator;
use crate::status::{
    ReceiverStatusError, StartStage, StatusAction, StatusInput, chain_status_handler,
};
use crate::subframe::{CollectSubframe, Subframe};
use crate::svn::Svn;
use crate::tags::TagVerification;
use crate::tesla::{Key, TeslaChain};
use crate::types::{InavBand, MerkleTreeNode, NavigationPage};
use crate::validation::Validated;

// Word type of dummy INAV words
const DUMMY_WORD_TYPE: u8 = 63;
// Consecutive DSM verification failures tolerated in WARM_START
const MAX_DSM_FAILURES: u32 = 2;

/// OSNMA receiver.
///
/// This is the black box that implements the OSNMA protocol. Pages are fed
/// with [`Osnma::process_page`] (or in bulk with [`Osnma::run`]), and the
/// navigation data authenticated so far can be obtained with
/// [`Osnma::get_ced_and_status`] and [`Osnma::get_timing_parameters`].
///
/// The receiver starts in COLD_START if it has no public key, WARM_START if
/// it has a public key, and HOT_START if it also has a stored DSM-KROOT that
/// the public key verifies.
#[derive(Debug, Clone)]
pub struct Osnma {
    config: Config,
    subframe: CollectSubframe,
    regenerator: SubframeRegenerator,
    dsm: CollectDsm,
    navdata: NavigationDataManager,
    merkle_tree: Option<MerkleTree>,
    pubkeys: Vec<PublicKey<Validated>>,
    chain: Option<TeslaChain>,
    next_chain: Option<TeslaChain>,
    stage: StartStage,
    stored_status: ChainAndPubkeyStatus,
    dsm_failures: u32,
    first_gst: Option<Gst>,
    first_fix: Option<FirstFix>,
}

/// First authenticated fix.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct FirstFix {
    /// Time to first authenticated fix in seconds.
    pub ttfaf: i64,
    /// GST of the first page processed.
    pub first_gst: Gst,
    /// GST at which the fix was obtained.
    pub fix_gst: Gst,
}

/// Result of processing a page.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PageOutcome {
    /// The page was dropped before any processing.
    Dropped,
    /// The page was processed.
    Processed,
    /// The page completed the first authenticated fix and the receiver is
    /// configured to stop there.
    FirstFix(FirstFix),
}

/// Summary of [`Osnma::run`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct RunSummary {
    /// Number of pages consumed.
    pub pages: usize,
    /// First authenticated fix, if the run stopped there.
    pub first_fix: Option<FirstFix>,
}

/// Errors that stop the receiver.
#[derive(Debug, thiserror::Error)]
pub enum OsnmaError {
    /// The NMA header is not compatible with the receiver status.
    #[error("{source} (last TESLA key index {last_key_index:?})")]
    ReceiverStatus {
        /// Rejected transition.
        source: ReceiverStatusError,
        /// Index of the last verified TESLA key of the chain in force.
        last_key_index: Option<u32>,
    },
    /// Key material could not be loaded.
    #[error("key material: {0}")]
    KeyMaterial(#[from] KeyMaterialError),
}

// DSM-KROOT verified in the current subframe
struct VerifiedKroot {
    key: Key<Validated>,
    stored: StoredKroot,
}

impl Osnma {
    /// Creates a receiver loading its key material from the files named in
    /// `config`.
    ///
    /// A missing Merkle tree file is not an error, but then DSM-PKRs cannot
    /// be verified. A configured public key that cannot be read is an error.
    /// A stored DSM-KROOT that cannot be read is ignored, and the receiver
    /// starts without it.
    pub fn new(config: Config) -> Result<Osnma, OsnmaError> {
        let merkle_path = config.merkle_path();
        let merkle_root = match key_material::read_merkle_root(&merkle_path) {
            Ok(root) => Some(root),
            Err(KeyMaterialError::Io { path, source })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                log::warn!(
                    "Merkle tree file {} not found; DSM-PKR cannot be verified",
                    path.display()
                );
                None
            }
            Err(e) => return Err(e.into()),
        };
        let pubkey = config
            .pubk_path()
            .map(|path| key_material::read_public_key(&path))
            .transpose()?;
        let kroot = config
            .kroot_path()
            .and_then(|path| match StoredKroot::read(&path) {
                Ok(kroot) => Some(kroot),
                Err(e) => {
                    log::warn!("stored DSM-KROOT ignored: {e}");
                    None
                }
            });
        Ok(Osnma::from_parts(config, merkle_root, pubkey, kroot))
    }

    /// Creates a receiver from key material already in memory.
    pub fn from_parts(
        config: Config,
        merkle_root: Option<MerkleTreeNode>,
        pubkey: Option<PublicKey<Validated>>,
        kroot: Option<StoredKroot>,
    ) -> Osnma {
        let mut osnma = Osnma {
            navdata: NavigationDataManager::new(&config),
            subframe: CollectSubframe::new(),
            regenerator: SubframeRegenerator::new(),
            dsm: CollectDsm::new(),
            merkle_tree: merkle_root.map(MerkleTree::new),
            pubkeys: pubkey.into_iter().collect(),
            chain: None,
            next_chain: None,
            stage: StartStage::ColdStart,
            stored_status: ChainAndPubkeyStatus::Nominal,
            dsm_failures: 0,
            first_gst: None,
            first_fix: None,
            config,
        };
        if !osnma.pubkeys.is_empty() {
            osnma.stage = StartStage::WarmStart;
        }
        if let Some(stored) = kroot {
            osnma.hot_start(&stored);
        }
        log::info!("receiver starts in {}", osnma.stage);
        osnma
    }

    fn hot_start(&mut self, stored: &StoredKroot) {
        let dsm_kroot = DsmKroot(&stored.dsm_kroot);
        if !dsm_kroot.is_complete() {
            log::warn!(
                "stored DSM-KROOT has {} bytes, which does not match NB_DK; ignored",
                stored.dsm_kroot.len()
            );
            return;
        }
        let Some(pubkey) = self.pubkey(dsm_kroot.public_key_id()) else {
            log::warn!(
                "no public key with ID {} for the stored DSM-KROOT; ignored",
                dsm_kroot.public_key_id()
            );
            return;
        };
        match Key::from_dsm_kroot(
            stored.nma_header,
            dsm_kroot,
            pubkey,
            self.config.key_index_scheme,
        ) {
            Ok(key) => {
                log::info!("stored KROOT verified: {key:?}");
                self.chain = Some(self.new_chain(key));
                self.stored_status = stored.nma_header.chain_and_pubkey_status();
                self.stage = StartStage::HotStart;
            }
            Err(e) => log::error!("stored DSM-KROOT rejected: {e}"),
        }
    }

    fn new_chain(&self, root_key: Key<Validated>) -> TeslaChain {
        let engine = TagVerification::new(*root_key.chain(), self.config.stale_data_subframes);
        TeslaChain::new(root_key, self.config.do_tesla_key_regen, engine)
    }

    fn pubkey(&self, pkid: u8) -> Option<&PublicKey<Validated>> {
        self.pubkeys.iter().find(|k| k.pkid() == pkid)
    }

    /// Current start stage.
    pub fn stage(&self) -> StartStage {
        self.stage
    }

    /// Configuration of the receiver.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// TESLA chain in force.
    pub fn chain(&self) -> Option<&TeslaChain> {
        self.chain.as_ref()
    }

    /// Next TESLA chain, announced while the chain in force ends.
    pub fn next_chain(&self) -> Option<&TeslaChain> {
        self.next_chain.as_ref()
    }

    /// Verified public keys.
    pub fn pubkeys(&self) -> &[PublicKey<Validated>] {
        &self.pubkeys
    }

    /// Navigation data manager.
    pub fn navigation_data(&self) -> &NavigationDataManager {
        &self.navdata
    }

    /// First authenticated fix, once obtained.
    pub fn first_fix(&self) -> Option<FirstFix> {
        self.first_fix
    }

    /// Latest authenticated ephemeris, clock and status data of `svn`.
    pub fn get_ced_and_status(&self, svn: Svn) -> Option<&AuthenticatedBlock> {
        self.navdata.get_ced_and_status(svn)
    }

    /// Latest authenticated timing parameters of `svn`.
    pub fn get_timing_parameters(&self, svn: Svn) -> Option<&AuthenticatedBlock> {
        self.navdata.get_timing_parameters(svn)
    }

    /// Processes pages until the input ends, `max_pages` pages have been
    /// consumed, or the first authenticated fix stops the receiver.
    pub fn run(
        &mut self,
        pages: impl IntoIterator<Item = NavigationPage>,
        max_pages: Option<usize>,
    ) -> Result<RunSummary, OsnmaError> {
        let mut summary = RunSummary {
            pages: 0,
            first_fix: None,
        };
        for page in pages {
            if max_pages.is_some_and(|max| summary.pages >= max) {
                log::info!("stopping after {} pages", summary.pages);
                break;
            }
            summary.pages += 1;
            if let PageOutcome::FirstFix(fix) = self.process_page(&page)? {
                summary.first_fix = Some(fix);
                break;
            }
        }
        Ok(summary)
    }

    /// Processes one page.
    pub fn process_page(&mut self, page: &NavigationPage) -> Result<PageOutcome, OsnmaError> {
        if !page.crc_ok {
            log::debug!("{} page at {} has wrong CRC; dropped", page.svn, page.gst);
            return Ok(PageOutcome::Dropped);
        }
        if page.is_alert() {
            log::trace!("{} alert page at {} dropped", page.svn, page.gst);
            return Ok(PageOutcome::Dropped);
        }
        if page.word_type() == DUMMY_WORD_TYPE {
            log::trace!("{} dummy word at {} dropped", page.svn, page.gst);
            return Ok(PageOutcome::Dropped);
        }
        if page.svn.index() >= self.config.ns {
            return Ok(PageOutcome::Dropped);
        }
        self.first_gst.get_or_insert(page.gst);

        self.navdata.feed(page);
        if page.band != InavBand::E1B || !page.has_osnma() {
            return Ok(PageOutcome::Processed);
        }
        match self.subframe.feed(&page.osnma_data(), page.svn, page.gst) {
            Some(subframe) => self.process_subframe(&subframe),
            None => Ok(PageOutcome::Processed),
        }
    }

    fn process_subframe(&mut self, subframe: &Subframe) -> Result<PageOutcome, OsnmaError> {
        let svn = subframe.svn;
        let gst = subframe.gst;
        log::debug!("{svn} processing subframe at {gst} ({} pages)", subframe.num_pages());
        let kroot = self.process_hkroot(subframe);
        let nma_header = subframe
            .hkroot[0]
            .map(|[h]| NmaHeader(h))
            .or(self.regenerator.last_nma_header());
        let Some(nma_header) = nma_header else {
            log::debug!("{svn} no NMA header known at {gst}; subframe ignored");
            return Ok(PageOutcome::Processed);
        };

        let action = self.update_status(nma_header, kroot)?;
        if action == StatusAction::Suspend {
            log::warn!("{svn} NMA status is don't use at {gst}; MACK ignored");
        } else {
            self.process_mack(subframe, nma_header);
        }

        let report = self.navdata.get_authenticated_data(gst);
        let Some(fix_gst) = report.first_fix else {
            return Ok(PageOutcome::Processed);
        };
        let first_gst = self.first_gst.unwrap_or(fix_gst);
        let fix = FirstFix {
            ttfaf: fix_gst.seconds_since(first_gst),
            first_gst,
            fix_gst,
        };
        log::info!(
            "first authenticated fix at {fix_gst} (TTFAF = {} s)",
            fix.ttfaf
        );
        self.first_fix = Some(fix);
        Ok(if self.config.stop_at_faf {
            PageOutcome::FirstFix(fix)
        } else {
            PageOutcome::Processed
        })
    }

    fn process_hkroot(&mut self, subframe: &Subframe) -> Option<VerifiedKroot> {
        let block = self.regenerator.feed(&subframe.hkroot, subframe.gst)?;
        let dsm = self.dsm.feed(block.dsm_header, &block.block)?;
        let Some(nma_header) = block.nma_header else {
            log::debug!("DSM {} complete but no NMA header is known", dsm.id());
            self.dsm.discard(dsm.id());
            return None;
        };
        match dsm.dsm_type() {
            DsmType::Kroot => self.process_dsm_kroot(&dsm, nma_header),
            DsmType::Pkr => {
                self.process_dsm_pkr(&dsm);
                None
            }
        }
    }

    fn process_dsm_kroot(&mut self, dsm: &Dsm, nma_header: NmaHeader) -> Option<VerifiedKroot> {
        let dsm_kroot = DsmKroot(dsm.data());
        let pkid = dsm_kroot.public_key_id();
        let Some(pubkey) = self.pubkey(pkid) else {
            log::info!("DSM-KROOT {} needs public key {pkid}, which is not known", dsm.id());
            self.dsm.discard(dsm.id());
            return None;
        };
        match Key::from_dsm_kroot(nma_header, dsm_kroot, pubkey, self.config.key_index_scheme) {
            Ok(key) => {
                log::info!("DSM-KROOT {} verified: {key:?}", dsm.id());
                self.dsm_failures = 0;
                Some(VerifiedKroot {
                    key,
                    stored: StoredKroot {
                        dsm_kroot: dsm.data().to_vec(),
                        nma_header,
                    },
                })
            }
            Err(e) => {
                log::error!("DSM-KROOT {} rejected: {e}", dsm.id());
                self.dsm.discard(dsm.id());
                self.dsm_failure();
                None
            }
        }
    }

    fn process_dsm_pkr(&mut self, dsm: &Dsm) {
        let Some(merkle_tree) = &self.merkle_tree else {
            log::warn!("DSM-PKR {} received but no Merkle tree is loaded", dsm.id());
            return;
        };
        match merkle_tree.pkr_verification(DsmPkr(dsm.data())) {
            Ok(PkrOutcome::NewPublicKey(pubkey)) => {
                log::info!("DSM-PKR {} verified public key {}", dsm.id(), pubkey.pkid());
                self.dsm_failures = 0;
                if self.config.write_key_material
                    && let Err(e) = key_material::write_public_key(&self.config.exec_path, &pubkey)
                {
                    log::warn!("could not store public key: {e}");
                }
                self.pubkeys.retain(|k| k.pkid() != pubkey.pkid());
                self.pubkeys.push(pubkey);
                if self.stage == StartStage::ColdStart {
                    self.set_stage(StartStage::WarmStart);
                }
            }
            Ok(PkrOutcome::AlertMessage) => {
                log::warn!("DSM-PKR {} is an OSNMA alert message", dsm.id());
                self.fallback_cold();
            }
            Err(e) => {
                log::error!("DSM-PKR {} rejected: {e}", dsm.id());
                self.dsm.discard(dsm.id());
                self.dsm_failure();
            }
        }
    }

    fn dsm_failure(&mut self) {
        if self.stage != StartStage::WarmStart {
            return;
        }
        self.dsm_failures += 1;
        if self.dsm_failures >= MAX_DSM_FAILURES {
            log::warn!("{} consecutive DSM failures in WARM_START", self.dsm_failures);
            self.fallback_cold();
        }
    }

    fn set_stage(&mut self, stage: StartStage) {
        if self.stage != stage {
            log::info!("start stage {} -> {stage}", self.stage);
            self.stage = stage;
        }
    }

    fn fallback_cold(&mut self) {
        self.pubkeys.clear();
        self.chain = None;
        self.next_chain = None;
        self.dsm_failures = 0;
        self.set_stage(StartStage::ColdStart);
    }

    fn fallback_warm(&mut self) {
        self.chain = None;
        self.next_chain = None;
        self.dsm_failures = 0;
        if self.pubkeys.is_empty() {
            self.set_stage(StartStage::ColdStart);
        } else {
            self.set_stage(StartStage::WarmStart);
        }
    }

    fn store_kroot(&self, stored: &StoredKroot) {
        if !self.config.write_key_material {
            return;
        }
        if let Err(e) = stored.write(&self.config.exec_path) {
            log::warn!("could not store DSM-KROOT: {e}");
        }
    }

    fn update_status(
        &mut self,
        nma_header: NmaHeader,
        kroot: Option<VerifiedKroot>,
    ) -> Result<StatusAction, OsnmaError> {
        let input = StatusInput {
            kroot_cid: kroot.as_ref().map(|k| k.key.chain().chain_id()),
            installed_cid: self.chain.as_ref().map(|c| c.chain().chain_id()),
            next_cid: self.next_chain.as_ref().map(|c| c.chain().chain_id()),
            ..StatusInput::from_header(self.stage, self.stored_status, nma_header)
        };
        let action = chain_status_handler(&input).map_err(|source| {
            log::error!("{source}");
            OsnmaError::ReceiverStatus {
                source,
                last_key_index: self.chain.as_ref().map(TeslaChain::last_index),
            }
        })?;
        if action != StatusAction::Nothing {
            log::debug!("{nma_header:?}: {action:?}");
        }
        match (action, kroot) {
            (StatusAction::Nothing | StatusAction::Suspend, _) => (),
            (StatusAction::Install, Some(kroot)) => {
                log::info!("installing chain {}", kroot.key.chain().chain_id());
                self.store_kroot(&kroot.stored);
                self.chain = Some(self.new_chain(kroot.key));
                self.set_stage(StartStage::Started);
            }
            (StatusAction::CacheNext, Some(kroot)) => {
                let known = self
                    .next_chain
                    .as_ref()
                    .is_some_and(|c| c.keys().root_key() == &kroot.key);
                if !known {
                    log::info!("caching next chain {}", kroot.key.chain().chain_id());
                    self.store_kroot(&kroot.stored);
                    self.next_chain = Some(self.new_chain(kroot.key));
                }
            }
            (StatusAction::SwitchToNext, _) => {
                if let Some(next) = self.next_chain.take() {
                    log::info!("switching to chain {}", next.chain().chain_id());
                    self.chain = Some(next);
                    self.set_stage(StartStage::Started);
                }
            }
            (StatusAction::UpdateInPlace, Some(kroot)) => {
                let changed = self
                    .chain
                    .as_ref()
                    .is_none_or(|c| c.chain() != kroot.key.chain());
                if changed {
                    log::info!(
                        "chain {} parameters changed; reinstalling",
                        kroot.key.chain().chain_id()
                    );
                    self.store_kroot(&kroot.stored);
                    self.chain = Some(self.new_chain(kroot.key));
                }
            }
            (StatusAction::Replace, Some(kroot)) => {
                log::warn!(
                    "chain {:?} replaced by chain {}",
                    self.chain.as_ref().map(|c| c.chain().chain_id()),
                    kroot.key.chain().chain_id()
                );
                self.store_kroot(&kroot.stored);
                self.chain = Some(self.new_chain(kroot.key));
                self.next_chain = None;
            }
            (StatusAction::FallbackCold, _) => {
                log::warn!("public key revoked");
                self.fallback_cold();
            }
            (StatusAction::FallbackWarm, _) => {
                log::warn!("chain revoked");
                self.fallback_warm();
            }
            (
                StatusAction::Install
                | StatusAction::CacheNext
                | StatusAction::UpdateInPlace
                | StatusAction::Replace,
                None,
            ) => {
                log::debug!("{action:?} without a verified DSM-KROOT");
            }
        }
        if input.nma_status != NmaStatus::DontUse {
            self.stored_status = input.cpks;
        }
        Ok(action)
    }

    fn process_mack(&mut self, subframe: &Subframe, nma_header: NmaHeader) {
        let svn = subframe.svn;
        let gst = subframe.gst;
        let Some(tesla) = self.chain.as_mut() else {
            log::trace!("{svn} no TESLA chain; MACK at {gst} ignored");
            return;
        };
        if !self.config.do_mack_partial && subframe.mack.iter().any(Option::is_none) {
            log::debug!("{svn} MACK at {gst} incomplete; ignored");
            return;
        }
        let chain = *tesla.chain();
        let mack = Mack::from_sections(
            &subframe.mack,
            chain.key_size_bits(),
            chain.tag_size_bits(),
            chain.nmack(),
        );

        let mut new_key = false;
        for block in 0..mack.nmack() {
            let Some(bits) = mack.key(block) else {
                continue;
            };
            let block_id = u8::try_from(block + 1).unwrap_or(u8::MAX);
            let Some(key) = Key::from_bitslice(bits, gst, block_id, &chain) else {
                log::debug!("{svn} key at {gst} precedes chain {}", chain.chain_id());
                continue;
            };
            match tesla.add_key(&key) {
                Ok((true, index)) => {
                    log::info!("{svn} TESLA key {index} at {gst} verified");
                    new_key = true;
                }
                Ok((false, _)) => (),
                Err(e) if self.stage == StartStage::HotStart => {
                    log::error!("{svn} key at {gst} does not verify against stored KROOT: {e}");
                    self.fallback_warm();
                    return;
                }
                Err(e) => {
                    log::error!("{svn} TESLA key at {gst}: {e}; MACK dropped");
                    return;
                }
            }
        }

        let (keys, engine) = tesla.keys_and_engine_mut();
        engine.add_mack(&mack, svn, gst, nma_header, &self.navdata);
        if new_key {
            let events = engine.update_tag_lists(keys, &self.navdata);
            self.navdata.record_events(&events);
            if self.stage == StartStage::HotStart {
                self.set_stage(StartStage::Started);
            }
        }
    }
}
