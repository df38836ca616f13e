//! HKROOT regeneration.
//!
//! When some pages of a subframe are lost, the DSM block carried in its HKROOT
//! message is incomplete. Since each DSM is broadcast repeatedly, the missing
//! bytes can be filled in from a later transmission of the same block.
//! [`SubframeRegenerator`] merges these partial blocks, keyed by DSM ID and
//! block ID, and yields each block once all of its bytes are known.

use crate::bitfields::{DsmHeader, NmaHeader};
use crate::gst::Gst;
use crate::types::{DSM_BLOCK_BYTES, DsmBlock, HkrootSection, WORDS_PER_SUBFRAME};
use std::collections::HashMap;

// Partial blocks that have not been updated for this long are dropped.
const FRAGMENT_LIFETIME_SECONDS: i64 = 1800;

/// A DSM block recovered from the HKROOT of one or several subframes.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct RegeneratedBlock {
    /// NMA header of the subframe, or the last known one if the page carrying
    /// it was lost. `None` if no NMA header has been seen yet.
    pub nma_header: Option<NmaHeader>,
    /// DSM header of the block.
    pub dsm_header: DsmHeader,
    /// Block contents.
    pub block: DsmBlock,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
struct Fragment {
    bytes: [Option<u8>; DSM_BLOCK_BYTES],
    last_update: Gst,
}

/// Merges partial HKROOT messages into DSM blocks.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct SubframeRegenerator {
    fragments: HashMap<(u8, u8), Fragment>,
    last_nma_header: Option<NmaHeader>,
}

impl SubframeRegenerator {
    /// Creates a new regenerator with no stored fragments.
    pub fn new() -> SubframeRegenerator {
        SubframeRegenerator::default()
    }

    /// Last NMA header seen.
    pub fn last_nma_header(&self) -> Option<NmaHeader> {
        self.last_nma_header
    }

    /// Feeds the HKROOT sections of a subframe starting at `gst`.
    ///
    /// Complete HKROOT messages are returned directly. For incomplete ones, the
    /// bytes that were received are merged with earlier fragments of the same
    /// block, and the block is returned once it is complete. The page carrying
    /// the DSM header must be present for the subframe to be used at all.
    pub fn feed(
        &mut self,
        hkroot: &[Option<HkrootSection>; WORDS_PER_SUBFRAME],
        gst: Gst,
    ) -> Option<RegeneratedBlock> {
        self.prune(gst);
        if let Some([header]) = hkroot[0] {
            self.last_nma_header = Some(NmaHeader(header));
        }
        let Some([dsm_header]) = hkroot[1] else {
            log::debug!("DSM header page missing in subframe at {gst}; HKROOT unusable");
            return None;
        };
        let dsm_header = DsmHeader(dsm_header);
        let key = (dsm_header.dsm_id(), dsm_header.dsm_block_id());
        let received = &hkroot[2..];

        if received.iter().all(Option::is_some) {
            // No regeneration needed, but the complete block supersedes any
            // fragment of the same block.
            self.fragments.remove(&key);
            return Some(RegeneratedBlock {
                nma_header: self.last_nma_header,
                dsm_header,
                block: core::array::from_fn(|j| received[j].map_or(0, |[x]| x)),
            });
        }

        let fragment = self.fragments.entry(key).or_insert_with(|| Fragment {
            bytes: [None; DSM_BLOCK_BYTES],
            last_update: gst,
        });
        let conflict = fragment
            .bytes
            .iter()
            .zip(received.iter())
            .any(|(stored, new)| matches!((stored, new), (Some(a), Some([b])) if a != b));
        if conflict {
            log::debug!(
                "fragment of DSM {} block {} changed contents at {gst}; restarting",
                key.0,
                key.1
            );
            fragment.bytes = [None; DSM_BLOCK_BYTES];
        }
        for (stored, new) in fragment.bytes.iter_mut().zip(received.iter()) {
            if let Some([b]) = new {
                *stored = Some(*b);
            }
        }
        fragment.last_update = gst;
        let missing = fragment.bytes.iter().filter(|b| b.is_none()).count();
        log::trace!(
            "fragment of DSM {} block {} has {missing} missing bytes",
            key.0,
            key.1
        );
        if missing != 0 {
            return None;
        }
        let fragment = self.fragments.remove(&key)?;
        log::debug!(
            "regenerated DSM {} block {} from partial subframes",
            key.0,
            key.1
        );
        Some(RegeneratedBlock {
            nma_header: self.last_nma_header,
            dsm_header,
            block: core::array::from_fn(|j| fragment.bytes[j].unwrap_or(0)),
        })
    }

    fn prune(&mut self, gst: Gst) {
        self.fragments
            .retain(|_, f| gst.seconds_since(f.last_update) <= FRAGMENT_LIFETIME_SECONDS);
    }

    /// Discards all the stored fragments and the last NMA header.
    pub fn reset(&mut self) {
        self.fragments.clear();
        self.last_nma_header = None;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use hex_literal::hex;

    fn sections(hkroot: &[u8; 15], present: impl Fn(usize) -> bool) -> [Option<HkrootSection>; 15] {
        core::array::from_fn(|j| present(j).then_some([hkroot[j]]))
    }

    const HKROOT: [u8; 15] = hex!("52 21 84 1e 1d e4 d4 58 c0 e9 84 24 76 e0 04");

    #[test]
    fn complete_passthrough() {
        let mut regen = SubframeRegenerator::new();
        let block = regen
            .feed(&sections(&HKROOT, |_| true), Gst::new(1176, 120930))
            .unwrap();
        assert_eq!(block.nma_header, Some(NmaHeader(0x52)));
        assert_eq!(block.dsm_header, DsmHeader(0x21));
        assert_eq!(&block.block[..], &HKROOT[2..]);
    }

    #[test]
    fn merge_two_subframes() {
        let mut regen = SubframeRegenerator::new();
        let gst = Gst::new(1176, 120930);
        // First transmission loses pages 0, 4 and 9
        assert!(
            regen
                .feed(&sections(&HKROOT, |j| ![0, 4, 9].contains(&j)), gst)
                .is_none()
        );
        // Second transmission loses page 7 only; the NMA header is absent
        // in the first one and present here
        let block = regen
            .feed(&sections(&HKROOT, |j| j != 7), gst.add_subframes(6))
            .unwrap();
        assert_eq!(&block.block[..], &HKROOT[2..]);
        assert_eq!(block.nma_header, Some(NmaHeader(0x52)));
        assert!(regen.fragments.is_empty());
    }

    #[test]
    fn missing_dsm_header() {
        let mut regen = SubframeRegenerator::new();
        assert!(
            regen
                .feed(&sections(&HKROOT, |j| j != 1), Gst::new(1176, 120930))
                .is_none()
        );
        assert_eq!(regen.last_nma_header(), Some(NmaHeader(0x52)));
    }

    #[test]
    fn stale_fragment_dropped() {
        let mut regen = SubframeRegenerator::new();
        let gst = Gst::new(1176, 120930);
        assert!(regen.feed(&sections(&HKROOT, |j| j < 8), gst).is_none());
        // Too late to merge with the first fragment
        assert!(
            regen
                .feed(&sections(&HKROOT, |j| j != 3), gst.add_seconds(3600))
                .is_none()
        );
    }
}
