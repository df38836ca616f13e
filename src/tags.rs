//! Tag verification.
//!
//! [`TagVerification`] holds the tags received in MACK messages until the
//! TESLA key that authenticates them is verified. Tags in fixed slots of the
//! MAC Look-up Table wait for their key directly. Tags in flexible slots wait
//! inside a [`MacSeq`], and are only released once the MACSEQ field that
//! protects their tag info has been checked.
//!
//! Navigation data is fetched through the [`NavDataProvider`] trait when the
//! key becomes available, and the result of each check is returned to the
//! caller as a [`TagEvent`].

use crate::bitfields::{Adkd, NmaHeader, NmaStatus};
use crate::gst::Gst;
use crate::mack::{Mack, Tag, TagAndInfo};
use crate::maclt::{self, MacLTSlot};
use crate::svn::Svn;
use crate::tesla::{Chain, KeyStore};
use crate::types::BitSlice;
use bitvec::prelude::*;

// COP assumed for the tags of a MACK block whose header slot was lost
const UNKNOWN_COP: u8 = 15;
// Tags that have waited this long for their key are dropped
const MAX_WAIT_SUBFRAMES: i64 = 20;

/// Navigation data request issued for a tag whose key is available.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct DataRequest {
    /// Transmitting satellite.
    pub prna: Svn,
    /// PRN_D of the tag (for tag0 this is PRN_A).
    pub prnd: u8,
    /// ADKD of the tag.
    pub adkd: Adkd,
    /// GST of the subframe where the tag was transmitted.
    pub gst_tag: Gst,
    /// GST of the subframe where the key was transmitted.
    pub gst_key: Gst,
    /// Cut-off point in subframes.
    pub cop: u8,
    /// Returns `true` if this is tag0.
    pub is_tag0: bool,
}

impl DataRequest {
    /// Returns `true` for dummy tags, which authenticate zero-filled data.
    ///
    /// Tags 1 to nt-1 are dummy when their PRN_D is 255. Tag0 is dummy when
    /// the COP is zero.
    pub fn is_dummy(&self) -> bool {
        if self.is_tag0 {
            self.cop == 0
        } else {
            self.prnd == crate::svn::DUMMY_PRN
        }
    }
}

/// Navigation data authenticated by a tag.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct TagData {
    /// Data bits.
    pub bits: BitVec<u8, Msb0>,
    /// Last time the data was received.
    pub last_update: Gst,
    /// Issue of data (IODnav for ADKD 0 and 12, zero for ADKD 4).
    pub iod: u16,
}

/// Source of the navigation data that tags authenticate.
pub trait NavDataProvider {
    /// Returns the data for a tag, or `None` if it is not available.
    ///
    /// A tag flagged as new data supersedes the waiting tags of the same
    /// identity for which this returns `None`.
    fn tag_data(&self, request: &DataRequest) -> Option<TagData>;
}

/// A tag waiting for its TESLA key.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct WaitingTag {
    /// Tag bits.
    pub tag: Tag,
    /// Transmitting satellite.
    pub prna: Svn,
    /// PRN_D (PRN_A for tag0).
    pub prnd: u8,
    /// ADKD.
    pub adkd: Adkd,
    /// IOD_TAG field, `None` for tag0.
    pub iod_tag: Option<u8>,
    /// Tag counter used in the MAC.
    pub ctr: u8,
    /// GST of the MACK subframe.
    pub gst_tag: Gst,
    /// Cut-off point.
    pub cop: u8,
    /// NMA status in the header of the MACK subframe.
    pub nma_status: NmaStatus,
    /// Index of the key that authenticates the tag.
    pub key_index: u32,
    /// GST of the subframe where that key is transmitted.
    pub gst_key: Gst,
}

impl WaitingTag {
    /// Returns `true` for tag0.
    pub fn is_tag0(&self) -> bool {
        self.iod_tag.is_none()
    }

    // Identity used for supersession
    fn identity(&self) -> (u8, Adkd, Option<u8>) {
        (self.prnd, self.adkd, self.iod_tag.map(|iod| iod & 0x7))
    }

    /// Navigation data request for this tag.
    pub fn request(&self) -> DataRequest {
        DataRequest {
            prna: self.prna,
            prnd: self.prnd,
            adkd: self.adkd,
            gst_tag: self.gst_tag,
            gst_key: self.gst_key,
            cop: self.cop,
            is_tag0: self.is_tag0(),
        }
    }
}

/// MAC sequence of a MACK block, with the flexible tags it protects.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct MacSeq {
    prna: Svn,
    gst_subframe: Gst,
    macseq: u16,
    key_index: u32,
    tag_infos: Vec<u16>,
    flex_tags: Vec<WaitingTag>,
}

/// Result of the check of a tag.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TagOutcome {
    /// The tag matches the data.
    Authenticated,
    /// The tag does not match the data.
    Failed,
    /// The tag does not match data that was last updated well before the
    /// tag. This is expected for cross-authentication of satellites that
    /// changed their data while out of view.
    StaleData,
    /// No navigation data was available for the tag.
    Discarded,
}

/// A tag that has been processed after its key was verified.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct TagEvent {
    /// The tag.
    pub tag: WaitingTag,
    /// Outcome of the check.
    pub outcome: TagOutcome,
    /// Data that was checked, if any.
    pub data: Option<TagData>,
}

/// Counts of what happened to the tags of a MACK message.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct MackSummary {
    /// Tags in fixed slots queued for their key.
    pub queued: usize,
    /// Flexible tags queued behind a MACSEQ.
    pub flex: usize,
    /// Tags rejected because they do not match their MACLT slot.
    pub maclt_mismatch: usize,
    /// Tags lost because some of their pages are missing.
    pub missing: usize,
    /// Waiting tags superseded by a tag flagged as new data.
    pub superseded: usize,
}

/// Tag verification engine of a TESLA chain.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct TagVerification {
    chain: Chain,
    stale_data_subframes: u32,
    waiting_tags: Vec<WaitingTag>,
    waiting_macseqs: Vec<MacSeq>,
}

impl TagVerification {
    /// Creates an engine for the tags of `chain`.
    ///
    /// A failed tag whose data was last updated more than
    /// `stale_data_subframes` subframes before the tag is reported as
    /// [`TagOutcome::StaleData`].
    pub fn new(chain: Chain, stale_data_subframes: u32) -> TagVerification {
        TagVerification {
            chain,
            stale_data_subframes,
            waiting_tags: Vec::new(),
            waiting_macseqs: Vec::new(),
        }
    }

    /// Chain parameters used by the engine.
    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Tags waiting for their key.
    pub fn waiting_tags(&self) -> &[WaitingTag] {
        &self.waiting_tags
    }

    /// Number of MACSEQs waiting for their key.
    pub fn num_waiting_macseqs(&self) -> usize {
        self.waiting_macseqs.len()
    }

    /// Classifies the tags of block `block` of a MACK against the MAC
    /// Look-up Table.
    ///
    /// Returns the tags of fixed slots that match their slot, and the tag
    /// number and tag of each flexible slot (`None` if the slot was not
    /// received).
    #[allow(clippy::type_complexity)]
    pub fn verify_maclt(
        &self,
        mack: &Mack,
        block: usize,
        prna: Svn,
        gst_subframe: Gst,
        summary: &mut MackSummary,
    ) -> (Vec<(usize, TagAndInfo)>, Vec<(usize, Option<TagAndInfo>)>) {
        let maclt = self.chain.mac_lookup_table();
        let mut fixed = Vec::new();
        let mut flex = Vec::new();
        let msg = match maclt::section_for(maclt, gst_subframe) {
            Ok(msg) => msg,
            Err(e) => {
                log::error!("{prna} MACK at {gst_subframe}: MACLT {maclt}: {e}");
                return (fixed, flex);
            }
        };
        for j in 1..mack.num_tags() {
            let slot = match maclt::get_maclt_entry(maclt, msg, j) {
                Ok(slot) => slot,
                Err(e) => {
                    log::warn!("{prna} tag {j} at {gst_subframe}: {e}");
                    summary.maclt_mismatch += 1;
                    continue;
                }
            };
            let tag = mack.tag_and_info(block, j);
            if slot == MacLTSlot::Flex {
                flex.push((j, tag));
                continue;
            }
            let Some(tag) = tag else {
                summary.missing += 1;
                continue;
            };
            if maclt::verify_maclt_slot(slot, tag.adkd(), u8::from(prna), tag.prnd) {
                fixed.push((j, tag));
            } else {
                log::warn!(
                    "{prna} tag {j} at {gst_subframe} does not match MACLT slot {slot:?}: \
                     PRN_D = {}, ADKD = {}",
                    tag.prnd,
                    tag.adkd_code
                );
                summary.maclt_mismatch += 1;
            }
        }
        (fixed, flex)
    }

    /// Queues the tags of a MACK message transmitted by `prna` in the
    /// subframe starting at `gst_subframe`.
    pub fn add_mack(
        &mut self,
        mack: &Mack,
        prna: Svn,
        gst_subframe: Gst,
        nma_header: NmaHeader,
        navdata: &impl NavDataProvider,
    ) -> MackSummary {
        let mut summary = MackSummary::default();
        self.prune(gst_subframe);
        let chain = self.chain;
        let nma_status = nma_header.nma_status();
        for block in 0..mack.nmack() {
            let block_id = u8::try_from(block + 1).unwrap_or(u8::MAX);
            let header = mack.tag0_and_seq(block);
            let cop = header.map_or(UNKNOWN_COP, |h| h.cop);
            let make_tag = |tag: Tag, prnd: u8, adkd: Adkd, iod_tag: Option<u8>, ctr: u8| {
                let gst_key = gst_subframe.add_subframes(adkd.key_delay_subframes());
                let key_index = chain.key_index(gst_key, block_id)?;
                Some(WaitingTag {
                    tag,
                    prna,
                    prnd,
                    adkd,
                    iod_tag,
                    ctr,
                    gst_tag: gst_subframe,
                    cop,
                    nma_status,
                    key_index,
                    gst_key,
                })
            };

            match header.and_then(|h| make_tag(h.tag0, u8::from(prna), Adkd::InavCed, None, 1)) {
                Some(tag0) => {
                    log::trace!("{prna} queued tag0 at {gst_subframe} COP = {cop}");
                    self.waiting_tags.push(tag0);
                    summary.queued += 1;
                }
                None => summary.missing += 1,
            }

            let (fixed, flex) = self.verify_maclt(mack, block, prna, gst_subframe, &mut summary);
            for (j, info) in fixed {
                let ctr = u8::try_from(j + 1).unwrap_or(u8::MAX);
                let Some(tag) = make_tag(info.tag, info.prnd, info.adkd(), Some(info.iod_tag), ctr)
                else {
                    continue;
                };
                if info.new_data() {
                    summary.superseded += self.supersede(&tag, navdata);
                }
                self.waiting_tags.push(tag);
                summary.queued += 1;
            }

            if flex.is_empty() {
                continue;
            }
            let (Some(header), Some(key_index)) =
                (header, chain.key_index(gst_subframe.add_subframes(1), block_id))
            else {
                log::debug!("{prna} MACSEQ at {gst_subframe} lost; discarding flexible tags");
                summary.missing += flex.len();
                continue;
            };
            if flex.iter().any(|(_, t)| t.is_none()) {
                log::debug!(
                    "{prna} flexible tag missing at {gst_subframe}; MACSEQ cannot be checked"
                );
                summary.missing += flex.len();
                continue;
            }
            let mut tag_infos = Vec::with_capacity(maclt::MAX_FLX_ENTRIES);
            let mut flex_tags = Vec::with_capacity(maclt::MAX_FLX_ENTRIES);
            for (j, info) in flex.into_iter().filter_map(|(j, t)| Some((j, t?))) {
                tag_infos.push(info.tag_info());
                if !maclt::verify_maclt_slot(MacLTSlot::Flex, info.adkd(), u8::from(prna), info.prnd)
                {
                    log::warn!(
                        "{prna} flexible tag {j} at {gst_subframe} has reserved ADKD {}",
                        info.adkd_code
                    );
                    summary.maclt_mismatch += 1;
                    continue;
                }
                let ctr = u8::try_from(j + 1).unwrap_or(u8::MAX);
                if let Some(tag) =
                    make_tag(info.tag, info.prnd, info.adkd(), Some(info.iod_tag), ctr)
                {
                    flex_tags.push(tag);
                }
            }
            summary.flex += flex_tags.len();
            self.waiting_macseqs.push(MacSeq {
                prna,
                gst_subframe,
                macseq: header.macseq,
                key_index,
                tag_infos,
                flex_tags,
            });
        }
        log::debug!("{prna} MACK at {gst_subframe}: {summary:?}");
        summary
    }

    // Removes the waiting tags with the identity of `new` that have no data
    // within their own COP window.
    fn supersede(&mut self, new: &WaitingTag, navdata: &impl NavDataProvider) -> usize {
        let before = self.waiting_tags.len();
        self.waiting_tags
            .retain(|t| t.identity() != new.identity() || navdata.tag_data(&t.request()).is_some());
        let removed = before - self.waiting_tags.len();
        if removed != 0 {
            log::debug!(
                "{} tag for PRN_D {} ADKD {:?} at {} supersedes {removed} waiting tags",
                new.prna,
                new.prnd,
                new.adkd,
                new.gst_tag
            );
        }
        removed
    }

    fn prune(&mut self, gst: Gst) {
        let old = |g: Gst| gst.seconds_since(g) > MAX_WAIT_SUBFRAMES * 30;
        self.waiting_tags.retain(|t| !old(t.gst_tag));
        self.waiting_macseqs.retain(|m| !old(m.gst_subframe));
    }

    /// Checks all the MACSEQs and tags whose key is now available.
    ///
    /// MACSEQs are processed first, so that the flexible tags they release
    /// are checked in the same call.
    pub fn update_tag_lists(
        &mut self,
        keys: &mut KeyStore,
        navdata: &impl NavDataProvider,
    ) -> Vec<TagEvent> {
        let (ready, waiting): (Vec<_>, Vec<_>) = self
            .waiting_macseqs
            .drain(..)
            .partition(|m| keys.key_check(m.key_index));
        self.waiting_macseqs = waiting;
        for macseq in ready {
            let Some(key) = keys.key_at(macseq.key_index) else {
                continue;
            };
            if key.validate_macseq(
                macseq.macseq,
                u8::from(macseq.prna),
                macseq.gst_subframe,
                &macseq.tag_infos,
            ) {
                log::info!(
                    "{} MACSEQ at {} verified; releasing {} flexible tags",
                    macseq.prna,
                    macseq.gst_subframe,
                    macseq.flex_tags.len()
                );
                self.waiting_tags.extend(macseq.flex_tags);
            } else {
                log::error!(
                    "{} MACSEQ at {} failed; discarding {} flexible tags",
                    macseq.prna,
                    macseq.gst_subframe,
                    macseq.flex_tags.len()
                );
            }
        }

        let (ready, waiting): (Vec<_>, Vec<_>) = self
            .waiting_tags
            .drain(..)
            .partition(|t| keys.key_check(t.key_index));
        self.waiting_tags = waiting;
        let mut events = Vec::with_capacity(ready.len());
        for tag in ready {
            let Some(key) = keys.key_at(tag.key_index) else {
                continue;
            };
            let Some(data) = navdata.tag_data(&tag.request()) else {
                log::trace!(
                    "{} tag for PRN_D {} ADKD {:?} at {}: no navigation data; discarded",
                    tag.prna,
                    tag.prnd,
                    tag.adkd,
                    tag.gst_tag
                );
                events.push(TagEvent {
                    tag,
                    outcome: TagOutcome::Discarded,
                    data: None,
                });
                continue;
            };
            let navbits: &BitSlice = &data.bits;
            let ok = if tag.is_tag0() {
                key.validate_tag0(
                    tag.tag.as_bitslice(),
                    tag.gst_tag,
                    u8::from(tag.prna),
                    tag.nma_status,
                    navbits,
                )
            } else {
                key.validate_tag(
                    tag.tag.as_bitslice(),
                    tag.gst_tag,
                    tag.prnd,
                    u8::from(tag.prna),
                    tag.ctr,
                    tag.nma_status,
                    navbits,
                )
            };
            let outcome = if ok {
                log::info!(
                    "{} tag{} for PRN_D {} ADKD {:?} at {} COP = {} authenticated",
                    tag.prna,
                    if tag.is_tag0() { "0" } else { "" },
                    tag.prnd,
                    tag.adkd,
                    tag.gst_tag,
                    tag.cop
                );
                TagOutcome::Authenticated
            } else if tag.gst_tag.seconds_since(data.last_update)
                > i64::from(self.stale_data_subframes) * 30
            {
                log::debug!(
                    "{} tag for PRN_D {} ADKD {:?} at {} does not match stale data from {}",
                    tag.prna,
                    tag.prnd,
                    tag.adkd,
                    tag.gst_tag,
                    data.last_update
                );
                TagOutcome::StaleData
            } else {
                log::error!(
                    "{} tag for PRN_D {} ADKD {:?} at {} failed",
                    tag.prna,
                    tag.prnd,
                    tag.adkd,
                    tag.gst_tag
                );
                TagOutcome::Failed
            };
            events.push(TagEvent {
                tag,
                outcome,
                data: Some(data),
            });
        }
        events
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bits::BitBuilder;
    use crate::tesla::test::{kroot, test_chain};
    use crate::tesla::{Key, KeyStore};
    use crate::types::MACK_MESSAGE_BYTES;
    use crate::validation::Validated;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Navdata {
        data: HashMap<(u8, Adkd), TagData>,
    }

    impl NavDataProvider for Navdata {
        fn tag_data(&self, request: &DataRequest) -> Option<TagData> {
            self.data.get(&(request.prnd, request.adkd)).cloned()
        }
    }

    // Data of PRN_D 7 ADKD 0 for the tags transmitted from `from` on
    struct ReceivedFrom {
        from: Gst,
        data: TagData,
    }

    impl NavDataProvider for ReceivedFrom {
        fn tag_data(&self, request: &DataRequest) -> Option<TagData> {
            (request.prnd == 7
                && request.adkd == Adkd::InavCed
                && request.gst_tag.seconds_since(self.from) >= 0)
                .then(|| self.data.clone())
        }
    }

    fn data(fill: u8, adkd: Adkd, last_update: Gst) -> TagData {
        let len = adkd.navdata_bits().unwrap();
        let mut bits = BitVec::<u8, Msb0>::repeat(false, len);
        for (j, mut b) in bits.iter_mut().enumerate() {
            *b = (usize::from(fill) + j) % 3 == 0;
        }
        TagData {
            bits,
            last_update,
            iod: 0,
        }
    }

    fn svn(n: u8) -> Svn {
        Svn::try_from(n).unwrap()
    }

    // Computes a 40-bit HMAC-SHA-256 tag with the same message layout as
    // the verifier.
    fn compute_tag(
        key: &Key<Validated>,
        prnd: Option<u8>,
        prna: u8,
        gst: Gst,
        ctr: u8,
        navdata: &BitSlice,
    ) -> u64 {
        let mut m = BitBuilder::new();
        if let Some(prnd) = prnd {
            m.push_uint(prnd.into(), 8);
        }
        m.push_uint(prna.into(), 8)
            .push_uint(gst.wn().into(), 12)
            .push_uint(gst.tow().into(), 20)
            .push_uint(ctr.into(), 8)
            .push_uint(1, 2)
            .push_bits(navdata);
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key.data()).unwrap();
        mac.update(&m.into_bytes());
        let out = mac.finalize().into_bytes();
        BitSlice::from_slice(&out)[..40].load_be::<u64>()
    }

    fn compute_macseq(key: &Key<Validated>, prna: u8, gst: Gst, infos: &[u16]) -> u64 {
        let mut m = BitBuilder::new();
        m.push_uint(prna.into(), 8)
            .push_uint(gst.wn().into(), 12)
            .push_uint(gst.tow().into(), 20);
        for &i in infos {
            m.push_uint(i.into(), 16);
        }
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key.data()).unwrap();
        mac.update(&m.into_bytes());
        let out = mac.finalize().into_bytes();
        BitSlice::from_slice(&out)[..12].load_be::<u64>()
    }

    // A chain of keys derived from a known top key: index 0 is the KROOT.
    fn keys_up_to(n: u32) -> (Key<Validated>, Vec<Key<crate::validation::NotValidated>>) {
        let chain = test_chain();
        let top = Key::from_slice(&[0x33; 16], chain.gst0().add_subframes(n as i32 - 1), &chain)
            .unwrap();
        let mut keys = vec![top];
        for _ in 0..n {
            let prev = keys.last().unwrap().one_way_function();
            keys.push(prev);
        }
        keys.reverse();
        let root = Key::kroot_from_slice(keys[0].data(), &chain);
        (root, keys)
    }

    #[derive(Clone, Copy)]
    struct TagSpec {
        prnd: u8,
        adkd: u8,
        iod_tag: u8,
        tag: u64,
    }

    fn build_mack(tag0: u64, macseq: u64, cop: u64, tags: &[TagSpec]) -> Mack {
        let mut b = BitBuilder::new();
        b.push_uint(tag0, 40).push_uint(macseq, 12).push_uint(cop, 4);
        for t in tags {
            b.push_uint(t.tag, 40)
                .push_uint(t.prnd.into(), 8)
                .push_uint(t.adkd.into(), 4)
                .push_uint(t.iod_tag.into(), 4);
        }
        // unused slots get PRN_D 0, which no fixed slot accepts
        for _ in tags.len()..5 {
            b.push_uint(0, 56);
        }
        b.push_uint(0, 64).push_uint(0, 64).push_uint(0, 16);
        let data: [u8; MACK_MESSAGE_BYTES] = b.into_bytes().try_into().unwrap();
        Mack::new(&data, 128, 40, 1)
    }

    #[test]
    fn tags_verified_when_key_arrives() {
        // MACLT 33, section 0 (even subframe count): 00E 04S 00E 12S 00E
        let chain = test_chain();
        let gst = chain.gst0().add_subframes(4);
        assert_eq!(maclt::section_for(33, gst), Ok(0));
        let (root, keys) = keys_up_to(20);
        let tag_key = Key::kroot_from_slice(keys[6].data(), &chain);
        assert_eq!(keys[6].gst_subframe(), gst.add_subframes(1));
        let prna = 5;
        let mut navdata = Navdata::default();
        let ced5 = data(1, Adkd::InavCed, gst.add_seconds(-10));
        let ced7 = data(2, Adkd::InavCed, gst.add_seconds(-10));
        let timing = data(3, Adkd::InavTiming, gst.add_seconds(-4));
        navdata.data.insert((5, Adkd::InavCed), ced5.clone());
        navdata.data.insert((7, Adkd::InavCed), ced7.clone());
        navdata.data.insert((5, Adkd::InavTiming), timing.clone());

        let tag0 = compute_tag(&tag_key, None, prna, gst, 1, &ced5.bits);
        let tag1 = compute_tag(&tag_key, Some(7), prna, gst, 2, &ced7.bits);
        let tag2 = compute_tag(&tag_key, Some(5), prna, gst, 3, &timing.bits);
        let mack = build_mack(
            tag0,
            0,
            2,
            &[
                TagSpec { prnd: 7, adkd: 0, iod_tag: 1, tag: tag1 },
                TagSpec { prnd: 5, adkd: 4, iod_tag: 0, tag: tag2 },
                // wrong: 00E slot with PRN_D == PRN_A
                TagSpec { prnd: 5, adkd: 0, iod_tag: 0, tag: 0 },
                // 12S slot, waits for a later key
                TagSpec { prnd: 5, adkd: 12, iod_tag: 0, tag: 0 },
                // no data for E09
                TagSpec { prnd: 9, adkd: 0, iod_tag: 0, tag: 0 },
            ],
        );
        let mut engine = TagVerification::new(chain, 1);
        let summary = engine.add_mack(&mack, svn(5), gst, NmaHeader(0x52), &navdata);
        assert_eq!(summary.queued, 5);
        assert_eq!(summary.maclt_mismatch, 1);
        assert_eq!(summary.flex, 0);

        let mut store = KeyStore::new(root, true);
        // the tag key is not verified yet
        assert!(engine.update_tag_lists(&mut store, &navdata).is_empty());
        assert_eq!(store.add_key(&keys[6]), Ok((true, 6)));
        let events = engine.update_tag_lists(&mut store, &navdata);
        let outcomes: Vec<_> = events
            .iter()
            .map(|e| (e.tag.prnd, e.tag.adkd, e.outcome))
            .collect();
        assert_eq!(
            outcomes,
            vec![
                (5, Adkd::InavCed, TagOutcome::Authenticated),
                (7, Adkd::InavCed, TagOutcome::Authenticated),
                (5, Adkd::InavTiming, TagOutcome::Authenticated),
                (9, Adkd::InavCed, TagOutcome::Discarded),
            ]
        );
        // the slow MAC tag is still waiting for the key 11 subframes later
        assert_eq!(engine.waiting_tags().len(), 1);
        assert_eq!(engine.waiting_tags()[0].key_index, 16);
    }

    #[test]
    fn stale_and_failed() {
        // MACLT 33, section 1: 00E 00E 12S 00E 12E
        let chain = test_chain();
        let gst = chain.gst0().add_subframes(3);
        let (root, keys) = keys_up_to(6);
        let mut navdata = Navdata::default();
        // data of E07 is old; data of E05 is current but wrong
        navdata.data.insert((7, Adkd::InavCed), data(2, Adkd::InavCed, gst.add_subframes(-4)));
        navdata.data.insert((5, Adkd::InavCed), data(1, Adkd::InavCed, gst.add_seconds(-2)));
        let mack = build_mack(
            0x1234,
            0,
            5,
            &[TagSpec { prnd: 7, adkd: 0, iod_tag: 0, tag: 0x5678 }],
        );
        let mut engine = TagVerification::new(chain, 1);
        engine.add_mack(&mack, svn(5), gst, NmaHeader(0x52), &navdata);
        let mut store = KeyStore::new(root, false);
        store.add_key(&keys[5]).unwrap();
        let events = engine.update_tag_lists(&mut store, &navdata);
        assert_eq!(events[0].outcome, TagOutcome::Failed);
        assert_eq!(events[1].outcome, TagOutcome::StaleData);
    }

    #[test]
    fn macseq_releases_flex_tags() {
        // MACLT 34, section 0: FLX 04S FLX 12S 00E
        let chain = crate::tesla::test::chain_with_maclt(34);
        let gst = chain.gst0().add_subframes(4);
        let (_, keys) = keys_up_to(7);
        let root = Key::kroot_from_slice(keys[0].data(), &chain);
        let tag_key = Key::kroot_from_slice(keys[6].data(), &chain);
        let mut navdata = Navdata::default();
        let ced9 = data(4, Adkd::InavCed, gst.add_seconds(-10));
        navdata.data.insert((9, Adkd::InavCed), ced9.clone());
        let flex1 = TagSpec {
            prnd: 9,
            adkd: 0,
            iod_tag: 2,
            tag: compute_tag(&tag_key, Some(9), 5, gst, 2, &ced9.bits),
        };
        let flex3 = TagSpec { prnd: 11, adkd: 0, iod_tag: 0, tag: 0 };
        let infos = [0x0902, 0x0b00];
        let good = compute_macseq(&tag_key, 5, gst, &infos);
        let mack = |macseq| {
            build_mack(
                0,
                macseq,
                1,
                &[
                    flex1,
                    TagSpec { prnd: 5, adkd: 4, iod_tag: 0, tag: 0 },
                    flex3,
                    TagSpec { prnd: 5, adkd: 12, iod_tag: 0, tag: 0 },
                    TagSpec { prnd: 2, adkd: 0, iod_tag: 0, tag: 0 },
                ],
            )
        };

        for (macseq, released) in [(good, true), (good ^ 1, false)] {
            let mut engine = TagVerification::new(chain, 1);
            let summary = engine.add_mack(&mack(macseq), svn(5), gst, NmaHeader(0x52), &navdata);
            assert_eq!(summary.flex, 2);
            assert_eq!(engine.num_waiting_macseqs(), 1);
            let mut store = KeyStore::new(root, false);
            store
                .add_key(&Key::from_slice(keys[6].data(), keys[6].gst_subframe(), &chain).unwrap())
                .unwrap();
            let events = engine.update_tag_lists(&mut store, &navdata);
            assert_eq!(engine.num_waiting_macseqs(), 0);
            let flex_authenticated = events
                .iter()
                .any(|e| e.tag.prnd == 9 && e.outcome == TagOutcome::Authenticated);
            assert_eq!(flex_authenticated, released);
        }
    }

    #[test]
    fn new_data_supersedes_waiting_tag() {
        // MACLT 33, section 1: only the first slot (00E) is used here
        let chain = test_chain();
        let gst = chain.gst0().add_subframes(3);
        let navdata = Navdata::default();
        let mut engine = TagVerification::new(chain, 1);
        let tags = |iod_tag| {
            [
                TagSpec { prnd: 7, adkd: 0, iod_tag, tag: 1 },
                TagSpec { prnd: 5, adkd: 4, iod_tag: 0, tag: 2 },
                TagSpec { prnd: 8, adkd: 0, iod_tag: 0, tag: 3 },
                TagSpec { prnd: 5, adkd: 12, iod_tag: 0, tag: 4 },
                TagSpec { prnd: 9, adkd: 0, iod_tag: 0, tag: 5 },
            ]
        };
        engine.add_mack(&build_mack(0, 0, 1, &tags(3)), svn(5), gst, NmaHeader(0x52), &navdata);
        let waiting = engine.waiting_tags().len();
        let summary = engine.add_mack(
            &build_mack(0, 0, 1, &tags(0x8 | 3)),
            svn(5),
            gst.add_subframes(2),
            NmaHeader(0x52),
            &navdata,
        );
        assert_eq!(summary.superseded, 1);
        assert_eq!(engine.waiting_tags().len(), 2 * waiting - 1);
    }

    #[test]
    fn supersession_checks_each_waiting_tag() {
        let chain = test_chain();
        let gst = chain.gst0().add_subframes(3);
        let tags = |iod_tag| {
            [
                TagSpec { prnd: 7, adkd: 0, iod_tag, tag: 1 },
                TagSpec { prnd: 5, adkd: 4, iod_tag: 0, tag: 2 },
                TagSpec { prnd: 8, adkd: 0, iod_tag: 0, tag: 3 },
                TagSpec { prnd: 5, adkd: 12, iod_tag: 0, tag: 4 },
                TagSpec { prnd: 9, adkd: 0, iod_tag: 0, tag: 5 },
            ]
        };
        let new_gst = gst.add_subframes(2);
        // Data that only the new tag can use, and data that both can use
        for (from, superseded) in [(new_gst, 1), (gst, 0)] {
            let navdata = ReceivedFrom {
                from,
                data: data(1, Adkd::InavCed, from),
            };
            let mut engine = TagVerification::new(chain, 1);
            let first = build_mack(0, 0, 1, &tags(3));
            engine.add_mack(&first, svn(5), gst, NmaHeader(0x52), &navdata);
            let summary = engine.add_mack(
                &build_mack(0, 0, 1, &tags(0x8 | 3)),
                svn(5),
                new_gst,
                NmaHeader(0x52),
                &navdata,
            );
            assert_eq!(summary.superseded, superseded, "data from {from}");
        }
    }

    #[test]
    fn dummy_requests() {
        let request = DataRequest {
            prna: svn(1),
            prnd: 255,
            adkd: Adkd::InavCed,
            gst_tag: Gst::new(1176, 120960),
            gst_key: Gst::new(1176, 120990),
            cop: 3,
            is_tag0: false,
        };
        assert!(request.is_dummy());
        assert!(!DataRequest { prnd: 4, ..request }.is_dummy());
        assert!(DataRequest { is_tag0: true, cop: 0, prnd: 1, ..request }.is_dummy());
        assert!(!DataRequest { is_tag0: true, cop: 1, prnd: 1, ..request }.is_dummy());
    }
}
