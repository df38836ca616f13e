//! Navigation data manager.
//!
//! [`NavigationDataManager`] collects the I/NAV words that OSNMA tags
//! authenticate, and serves them to the tag verification engine through the
//! [`NavDataProvider`] trait.
//!
//! For ADKD 0 and 12 the data are words 1 to 5 (ephemeris, clock and
//! status). These are kept as blocks indexed by satellite and IODnav, each
//! recording when it was first seen, when it was completed and when it was
//! last received. For ADKD 4 the data are the GST-UTC and GST-GPS parameters
//! of words 6 and 10.
//!
//! Tags that have been verified are accumulated per satellite, ADKD and
//! IODnav in the [`AuthenticatedData`] store, which decides when a data block
//! has gathered enough authentication bits.

use crate::bitfields::Adkd;
use crate::config::Config;
use crate::gst::Gst;
use crate::reed_solomon::ReedSolomon;
use crate::svn::Svn;
use crate::tags::{DataRequest, NavDataProvider, TagData, TagEvent, TagOutcome};
use crate::types::{BitSlice, InavBand, InavWord, NUM_SVNS, NavigationPage};
use bitvec::prelude::*;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

const CED_AND_STATUS_BYTES: usize = 69;
const CED_AND_STATUS_BITS: usize = 549;
const CED_AND_STATUS_WORDS: usize = 5;
const WORD6_BITS: usize = 99;
const WORD10_BITS: usize = 42;
// Complete blocks kept per satellite
const MAX_COMPLETE_BLOCKS: usize = 4;
// Distinct timing words kept per satellite and word type
const MAX_TIMING_WORDS: usize = 4;
// Incomplete blocks without updates for this long are dropped
const MAX_BLOCK_AGE_SECONDS: i64 = 1800;
// Number of distinct satellites needed for the first authenticated fix
const FIX_SATELLITES: usize = 4;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
struct CopLink {
    gst: Gst,
    cop: u8,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
struct CedAndStatus {
    iod: u16,
    data: [u8; CED_AND_STATUS_BYTES],
    valid: [bool; CED_AND_STATUS_WORDS],
    first_gst: Gst,
    complete_gst: Option<Gst>,
    last_gst: Gst,
    link: Option<CopLink>,
}

impl CedAndStatus {
    fn new(iod: u16, gst: Gst) -> CedAndStatus {
        CedAndStatus {
            iod,
            data: [0; CED_AND_STATUS_BYTES],
            valid: [false; CED_AND_STATUS_WORDS],
            first_gst: gst,
            complete_gst: None,
            last_gst: gst,
            link: None,
        }
    }

    fn bits(&self) -> &BitSlice {
        &BitSlice::from_slice(&self.data)[..CED_AND_STATUS_BITS]
    }

    fn is_complete(&self) -> bool {
        self.complete_gst.is_some()
    }

    fn word(&self, idx: usize) -> Option<&BitSlice> {
        self.valid[idx].then(|| &self.bits()[Self::word_range(idx)])
    }

    fn word_range(idx: usize) -> core::ops::Range<usize> {
        match idx {
            0 => 0..120,
            1 => 120..240,
            2 => 240..362,
            3 => 362..482,
            _ => 482..549,
        }
    }

    fn source_range(idx: usize) -> core::ops::Range<usize> {
        match idx {
            2 => 6..128,
            4 => 6..73,
            _ => 6..126,
        }
    }

    fn store(&mut self, svn: Svn, idx: usize, word: &BitSlice, gst: Gst) {
        self.last_gst = gst;
        let source = &word[Self::source_range(idx)];
        let dest = &mut BitSlice::from_slice_mut(&mut self.data)[Self::word_range(idx)];
        if self.valid[idx] && dest == source {
            return;
        }
        let changed = self.valid[idx];
        dest.copy_from_bitslice(source);
        self.valid[idx] = true;
        log::trace!(
            "{svn} IODnav {} stored word {} at {gst}; valid words {:?}",
            self.iod,
            idx + 1,
            self.valid
        );
        if changed {
            log::debug!("{svn} IODnav {} word {} changed at {gst}", self.iod, idx + 1);
            self.link = None;
        }
        if self.valid.iter().all(|&v| v) && (changed || self.complete_gst.is_none()) {
            log::debug!("{svn} IODnav {} complete at {gst}", self.iod);
            self.complete_gst = Some(gst);
        }
    }

    fn tag_data(&self) -> TagData {
        TagData {
            bits: self.bits().to_bitvec(),
            last_update: self.last_gst,
            iod: self.iod,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
struct TimingWord {
    bits: BitVec<u8, Msb0>,
    first_gst: Gst,
    last_gst: Gst,
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Hash)]
struct TimingParameters {
    word6: VecDeque<TimingWord>,
    word10: VecDeque<TimingWord>,
}

impl TimingParameters {
    fn feed(svn: Svn, history: &mut VecDeque<TimingWord>, bits: &BitSlice, gst: Gst) {
        if let Some(newest) = history.back_mut()
            && newest.bits.as_bitslice() == bits
        {
            newest.last_gst = gst;
            return;
        }
        log::trace!("{svn} new timing word at {gst}");
        history.push_back(TimingWord {
            bits: bits.to_bitvec(),
            first_gst: gst,
            last_gst: gst,
        });
        if history.len() > MAX_TIMING_WORDS {
            history.pop_front();
        }
    }

    // Newest word first received before `gst`
    fn before(history: &VecDeque<TimingWord>, gst: Gst) -> Option<&TimingWord> {
        history
            .iter()
            .rev()
            .find(|w| gst.seconds_since(w.first_gst) > 0)
    }

    fn tag_data(&self, gst_tag: Gst) -> Option<TagData> {
        let w6 = Self::before(&self.word6, gst_tag)?;
        let w10 = Self::before(&self.word10, gst_tag)?;
        let mut bits = w6.bits.clone();
        bits.extend_from_bitslice(&w10.bits);
        let last_update = if w6.last_gst.seconds_since(w10.last_gst) < 0 {
            w6.last_gst
        } else {
            w10.last_gst
        };
        Some(TagData {
            bits,
            last_update,
            iod: 0,
        })
    }

    fn has_data(&self) -> bool {
        !self.word6.is_empty() && !self.word10.is_empty()
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Hash)]
struct SatelliteData {
    blocks: Vec<CedAndStatus>,
    current_iod: Option<u16>,
    timing: TimingParameters,
}

impl SatelliteData {
    fn block_mut(&mut self, iod: u16) -> Option<&mut CedAndStatus> {
        self.blocks.iter_mut().find(|b| b.iod == iod)
    }

    fn prune(&mut self, svn: Svn, gst: Gst) {
        self.blocks.retain(|b| {
            let keep = b.is_complete() || gst.seconds_since(b.last_gst) <= MAX_BLOCK_AGE_SECONDS;
            if !keep {
                log::debug!("{svn} dropping incomplete IODnav {} at {gst}", b.iod);
            }
            keep
        });
        let complete = self.blocks.iter().filter(|b| b.is_complete()).count();
        if complete > MAX_COMPLETE_BLOCKS {
            let mut first_gsts: Vec<Gst> = self
                .blocks
                .iter()
                .filter(|b| b.is_complete())
                .map(|b| b.first_gst)
                .collect();
            first_gsts.sort_by_key(|&g| gst.seconds_since(g));
            let cutoff = first_gsts[MAX_COMPLETE_BLOCKS - 1];
            self.blocks.retain(|b| {
                !b.is_complete() || gst.seconds_since(b.first_gst) <= gst.seconds_since(cutoff)
            });
        }
    }
}

/// Navigation data authenticated by verified tags.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct AuthenticatedBlock {
    /// Satellite whose data this is.
    pub svn: Svn,
    /// ADKD of the tags.
    pub adkd: Adkd,
    /// IODnav (zero for ADKD 4).
    pub iod: u16,
    /// Data bits.
    pub bits: BitVec<u8, Msb0>,
    /// Number of tag bits verified against these data.
    pub auth_bits: u16,
    /// Whether `auth_bits` has reached the configured tag length.
    pub authenticated: bool,
    /// GST of the most recent tag verified against these data.
    pub gst: Gst,
}

/// What [`AuthenticatedData::get_authenticated_data`] found.
#[derive(Debug, Clone, Default, Eq, PartialEq, Hash)]
pub struct AuthenticationReport {
    /// Blocks that became authenticated in this call, as
    /// `(satellite, ADKD, IODnav)`.
    pub newly_authenticated: Vec<(Svn, Adkd, u16)>,
    /// GST of the first authenticated fix, if it was reached in this call.
    pub first_fix: Option<Gst>,
}

/// Accumulator of verified tag bits.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct AuthenticatedData {
    tag_length: u16,
    blocks: BTreeMap<(Svn, Adkd, u16), AuthenticatedBlock>,
    fix_svns: BTreeSet<Svn>,
    first_fix: Option<Gst>,
}

impl AuthenticatedData {
    /// Creates an empty store.
    ///
    /// A data block is authenticated once `tag_length` tag bits have been
    /// verified against it.
    pub fn new(tag_length: u16) -> AuthenticatedData {
        AuthenticatedData {
            tag_length,
            blocks: BTreeMap::new(),
            fix_svns: BTreeSet::new(),
            first_fix: None,
        }
    }

    /// Adds the bits of a verified tag for `svn`.
    ///
    /// If the data differ from the data previously accumulated for the same
    /// satellite, ADKD and IOD, the count starts again.
    pub fn add_tag(&mut self, svn: Svn, adkd: Adkd, data: &TagData, tag_bits: usize, gst: Gst) {
        let tag_bits = u16::try_from(tag_bits).unwrap_or(u16::MAX);
        let block = self
            .blocks
            .entry((svn, adkd, data.iod))
            .or_insert_with(|| AuthenticatedBlock {
                svn,
                adkd,
                iod: data.iod,
                bits: data.bits.clone(),
                auth_bits: 0,
                authenticated: false,
                gst,
            });
        if block.bits != data.bits {
            log::debug!("{svn} {adkd:?} IOD {} data changed; restarting count", data.iod);
            block.bits = data.bits.clone();
            block.auth_bits = 0;
            block.authenticated = false;
        }
        block.auth_bits = block.auth_bits.saturating_add(tag_bits);
        if gst.seconds_since(block.gst) > 0 {
            block.gst = gst;
        }
        log::trace!(
            "{svn} {adkd:?} IOD {}: {} authenticated bits",
            data.iod,
            block.auth_bits
        );
    }

    /// Marks the blocks that have reached the tag length as authenticated.
    ///
    /// Marking is idempotent. `gst` is the current time, reported as the
    /// first fix GST when a fourth satellite gets authenticated ephemeris.
    pub fn get_authenticated_data(&mut self, gst: Gst) -> AuthenticationReport {
        let mut report = AuthenticationReport::default();
        for block in self.blocks.values_mut() {
            if block.authenticated || block.auth_bits < self.tag_length {
                continue;
            }
            block.authenticated = true;
            log::info!(
                "{} {:?} IOD {} authenticated with {} bits at {gst}",
                block.svn,
                block.adkd,
                block.iod,
                block.auth_bits
            );
            report
                .newly_authenticated
                .push((block.svn, block.adkd, block.iod));
            if block.adkd != Adkd::InavTiming {
                self.fix_svns.insert(block.svn);
            }
        }
        if self.first_fix.is_none() && self.fix_svns.len() >= FIX_SATELLITES {
            log::info!("first authenticated fix at {gst}");
            self.first_fix = Some(gst);
            report.first_fix = Some(gst);
        }
        report
    }

    /// GST of the first authenticated fix, if reached.
    pub fn first_fix(&self) -> Option<Gst> {
        self.first_fix
    }

    /// Latest authenticated block of `svn` among the given ADKDs.
    pub fn latest(&self, svn: Svn, adkds: &[Adkd]) -> Option<&AuthenticatedBlock> {
        self.blocks
            .values()
            .filter(|b| b.svn == svn && b.authenticated && adkds.contains(&b.adkd))
            .reduce(|a, b| if b.gst.seconds_since(a.gst) > 0 { b } else { a })
    }

    fn prune(&mut self, gst: Gst) {
        let latest: BTreeSet<(Svn, Adkd, u16)> = Svn::iter()
            .flat_map(|svn| {
                [Adkd::InavCed, Adkd::InavTiming, Adkd::SlowMac]
                    .into_iter()
                    .map(move |adkd| (svn, adkd))
            })
            .filter_map(|(svn, adkd)| {
                self.latest(svn, &[adkd])
                    .map(|b| (b.svn, b.adkd, b.iod))
            })
            .collect();
        self.blocks.retain(|key, b| {
            latest.contains(key) || gst.seconds_since(b.gst) <= MAX_BLOCK_AGE_SECONDS
        });
    }
}

/// Navigation data manager.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct NavigationDataManager {
    tl: u32,
    cop_link: bool,
    dual_frequency: bool,
    satellites: Vec<SatelliteData>,
    reed_solomon: Option<ReedSolomon>,
    authenticated: AuthenticatedData,
    last_subframe: Option<Gst>,
}

impl NavigationDataManager {
    /// Creates an empty manager with the settings of `config`.
    pub fn new(config: &Config) -> NavigationDataManager {
        NavigationDataManager {
            tl: config.tl,
            cop_link: config.do_cop_link_optimization,
            dual_frequency: config.do_dual_frequency,
            satellites: vec![SatelliteData::default(); NUM_SVNS],
            reed_solomon: config.do_reed_solomon.then(ReedSolomon::new),
            authenticated: AuthenticatedData::new(config.tag_length),
            last_subframe: None,
        }
    }

    /// Feeds the INAV word of a page.
    ///
    /// Words received on E5b-I are only used if dual frequency is enabled.
    pub fn feed(&mut self, page: &NavigationPage) {
        if page.band == InavBand::E5B && !self.dual_frequency {
            return;
        }
        let subframe = page.gst.gst_subframe();
        if self.last_subframe != Some(subframe) {
            self.last_subframe = Some(subframe);
            self.prune(subframe);
        }
        let word = page.inav_word();
        self.feed_word(page.svn, page.gst, &word);
        let recovered = match self.reed_solomon.as_mut() {
            Some(rs) => match rs.feed(page.svn, page.gst, &word) {
                Ok(words) => words,
                Err(e) => {
                    log::debug!("{} Reed-Solomon: {e}", page.svn);
                    return;
                }
            },
            None => return,
        };
        if recovered.is_empty() {
            return;
        }
        if !self.consistent_with_held(page.svn, &recovered) {
            log::warn!(
                "{} Reed-Solomon recovery at {} contradicts held words; rejected",
                page.svn,
                page.gst
            );
            if let Some(rs) = self.reed_solomon.as_mut() {
                rs.reset(page.svn);
            }
            return;
        }
        for word in &recovered {
            self.feed_word(page.svn, page.gst, word);
        }
    }

    fn consistent_with_held(&self, svn: Svn, words: &[InavWord]) -> bool {
        let sat = &self.satellites[svn.index()];
        words.iter().all(|word| {
            let bits = BitSlice::from_slice(word);
            let idx = usize::from(bits[..6].load_be::<u8>()).wrapping_sub(1);
            let iod = bits[6..16].load_be::<u16>();
            let Some(block) = sat.blocks.iter().find(|b| b.iod == iod) else {
                return true;
            };
            match idx {
                0..=3 => block
                    .word(idx)
                    .is_none_or(|held| held == &bits[CedAndStatus::source_range(idx)]),
                _ => true,
            }
        })
    }

    fn feed_word(&mut self, svn: Svn, gst: Gst, word: &InavWord) {
        let bits = BitSlice::from_slice(word);
        let word_type = bits[..6].load_be::<u8>();
        let sat = &mut self.satellites[svn.index()];
        match word_type {
            1..=4 => {
                let iod = bits[6..16].load_be::<u16>();
                if sat.current_iod != Some(iod) {
                    log::debug!("{svn} IODnav {iod} at {gst}");
                    sat.current_iod = Some(iod);
                }
                if sat.block_mut(iod).is_none() {
                    sat.blocks.push(CedAndStatus::new(iod, gst));
                }
                if let Some(block) = sat.block_mut(iod) {
                    block.store(svn, usize::from(word_type) - 1, bits, gst);
                }
            }
            5 => {
                let Some(iod) = sat.current_iod else {
                    log::trace!("{svn} word 5 at {gst} before any IODnav; ignored");
                    return;
                };
                if let Some(block) = sat.block_mut(iod) {
                    block.store(svn, 4, bits, gst);
                }
            }
            6 => TimingParameters::feed(svn, &mut sat.timing.word6, &bits[6..6 + WORD6_BITS], gst),
            10 => TimingParameters::feed(
                svn,
                &mut sat.timing.word10,
                &bits[86..86 + WORD10_BITS],
                gst,
            ),
            _ => (),
        }
    }

    fn prune(&mut self, gst: Gst) {
        for (svn, sat) in Svn::iter().zip(self.satellites.iter_mut()) {
            sat.prune(svn, gst);
        }
        self.authenticated.prune(gst);
    }

    fn ced_for_tag(&self, svn: Svn, request: &DataRequest) -> Option<TagData> {
        let sat = &self.satellites[svn.index()];
        let window_start = request.gst_tag.add_seconds(-30 * i32::from(request.cop));
        let tl = i64::from(self.tl);
        let in_window = |g: Gst| g.seconds_since(window_start) >= 0;
        let newest = sat
            .blocks
            .iter()
            .filter(|b| {
                b.complete_gst.is_some_and(|c| {
                    request.gst_tag.seconds_since(c) > 0 && request.gst_key.seconds_since(c) > tl
                }) && in_window(b.last_gst)
            })
            .reduce(|a, b| if b.first_gst.seconds_since(a.first_gst) > 0 { b } else { a });
        if let Some(block) = newest {
            return Some(block.tag_data());
        }
        if !self.cop_link {
            return None;
        }
        // A previous tag with at least this COP vouched for the block up to
        // its own GST
        let linked = sat
            .blocks
            .iter()
            .filter(|b| {
                b.link.is_some_and(|link| {
                    link.cop >= request.cop
                        && in_window(link.gst)
                        && request.gst_tag.seconds_since(link.gst) > 0
                })
            })
            .reduce(|a, b| if b.first_gst.seconds_since(a.first_gst) > 0 { b } else { a })?;
        log::debug!(
            "{} using IODnav {} of {svn} through COP link at {}",
            request.prna,
            linked.iod,
            request.gst_tag
        );
        Some(linked.tag_data())
    }

    /// Records the outcome of checked tags.
    ///
    /// Authenticated tags add their bits to the [`AuthenticatedData`] store
    /// and, for ADKD 0 and 12, link the data block to the tag GST and COP.
    pub fn record_events(&mut self, events: &[TagEvent]) {
        for event in events {
            if event.outcome != TagOutcome::Authenticated {
                continue;
            }
            let request = event.tag.request();
            let Some(data) = &event.data else {
                continue;
            };
            if request.is_dummy() {
                continue;
            }
            let Ok(svn) = Svn::try_from(request.prnd) else {
                continue;
            };
            self.authenticated.add_tag(
                svn,
                request.adkd,
                data,
                event.tag.tag.as_bitslice().len(),
                request.gst_tag,
            );
            if matches!(request.adkd, Adkd::InavCed | Adkd::SlowMac)
                && let Some(block) = self.satellites[svn.index()].block_mut(data.iod)
            {
                let newer = block
                    .link
                    .is_none_or(|l| request.gst_tag.seconds_since(l.gst) >= 0);
                if newer {
                    block.link = Some(CopLink {
                        gst: request.gst_tag,
                        cop: request.cop,
                    });
                }
            }
        }
    }

    /// Marks the data blocks with enough verified tag bits as authenticated.
    ///
    /// See [`AuthenticatedData::get_authenticated_data`].
    pub fn get_authenticated_data(&mut self, gst: Gst) -> AuthenticationReport {
        self.authenticated.get_authenticated_data(gst)
    }

    /// Store of verified tag bits.
    pub fn authenticated_data(&self) -> &AuthenticatedData {
        &self.authenticated
    }

    /// Returns `true` if complete data of the ADKD is held for PRN_D.
    pub fn has_data(&self, prnd: u8, adkd: Adkd) -> bool {
        let Ok(svn) = Svn::try_from(prnd) else {
            return false;
        };
        let sat = &self.satellites[svn.index()];
        match adkd {
            Adkd::InavCed | Adkd::SlowMac => sat.blocks.iter().any(|b| b.is_complete()),
            Adkd::InavTiming => sat.timing.has_data(),
            Adkd::Reserved => false,
        }
    }

    /// Latest authenticated ephemeris, clock and status data of `svn`.
    pub fn get_ced_and_status(&self, svn: Svn) -> Option<&AuthenticatedBlock> {
        self.authenticated
            .latest(svn, &[Adkd::InavCed, Adkd::SlowMac])
    }

    /// Latest authenticated timing parameters of `svn`.
    pub fn get_timing_parameters(&self, svn: Svn) -> Option<&AuthenticatedBlock> {
        self.authenticated.latest(svn, &[Adkd::InavTiming])
    }
}

impl NavDataProvider for NavigationDataManager {
    fn tag_data(&self, request: &DataRequest) -> Option<TagData> {
        let len = request.adkd.navdata_bits()?;
        if request.is_dummy() {
            return Some(TagData {
                bits: bitvec![u8, Msb0; 0; len],
                last_update: request.gst_tag,
                iod: 0,
            });
        }
        let svn = Svn::try_from(request.prnd).ok()?;
        match request.adkd {
            Adkd::InavCed | Adkd::SlowMac => self.ced_for_tag(svn, request),
            Adkd::InavTiming => self.satellites[svn.index()]
                .timing
                .tag_data(request.gst_tag),
            Adkd::Reserved => None,
        }
    }
}
