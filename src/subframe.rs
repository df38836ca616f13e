//! Subframe collection.
//!
//! This module contains [`CollectSubframe`], which buffers the OSNMA field of
//! the pages transmitted by each satellite until a subframe ends, and then
//! hands the HKROOT and MACK sections of the subframe to the caller.

use crate::gst::Gst;
use crate::svn::Svn;
use crate::types::{
    HKROOT_MESSAGE_BYTES, HKROOT_SECTION_BYTES, HkrootSection, MACK_MESSAGE_BYTES,
    MACK_SECTION_BYTES, MackSection, NUM_SVNS, OsnmaDataMessage, WORDS_PER_SUBFRAME,
};

/// OSNMA data of a subframe transmitted by one satellite.
///
/// Pages that were not received are `None`.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Subframe {
    /// Transmitting satellite.
    pub svn: Svn,
    /// GST at the start of the subframe.
    pub gst: Gst,
    /// HKROOT sections, one per page.
    pub hkroot: [Option<HkrootSection>; WORDS_PER_SUBFRAME],
    /// MACK sections, one per page.
    pub mack: [Option<MackSection>; WORDS_PER_SUBFRAME],
}

impl Subframe {
    fn new(svn: Svn, gst: Gst) -> Subframe {
        Subframe {
            svn,
            gst,
            hkroot: [None; WORDS_PER_SUBFRAME],
            mack: [None; WORDS_PER_SUBFRAME],
        }
    }

    /// Number of pages received.
    pub fn num_pages(&self) -> usize {
        self.hkroot.iter().filter(|x| x.is_some()).count()
    }

    /// Returns `true` if all the pages of the subframe were received.
    pub fn is_complete(&self) -> bool {
        self.num_pages() == WORDS_PER_SUBFRAME
    }

    /// Returns the full HKROOT message if all its pages were received.
    pub fn hkroot_message(&self) -> Option<[u8; HKROOT_MESSAGE_BYTES]> {
        let mut message = [0; HKROOT_MESSAGE_BYTES];
        for (dest, section) in message
            .chunks_exact_mut(HKROOT_SECTION_BYTES)
            .zip(self.hkroot.iter())
        {
            dest.copy_from_slice(section.as_ref()?);
        }
        Some(message)
    }

    /// Returns the full MACK message if all its pages were received.
    pub fn mack_message(&self) -> Option<[u8; MACK_MESSAGE_BYTES]> {
        let mut message = [0; MACK_MESSAGE_BYTES];
        for (dest, section) in message
            .chunks_exact_mut(MACK_SECTION_BYTES)
            .zip(self.mack.iter())
        {
            dest.copy_from_slice(section.as_ref()?);
        }
        Some(message)
    }
}

/// Subframe collector.
///
/// Keeps one partially filled subframe per satellite. A subframe is returned
/// when its last page is fed, or when a page of a later subframe arrives for
/// the same satellite.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct CollectSubframe {
    current: Vec<Option<Subframe>>,
}

impl CollectSubframe {
    /// Creates a new, empty subframe collector.
    pub fn new() -> CollectSubframe {
        CollectSubframe {
            current: vec![None; NUM_SVNS],
        }
    }

    /// Feeds the OSNMA field of one page.
    ///
    /// The `gst` is the GST at the start of the page. The return value is the
    /// subframe that this page completes or flushes, if any.
    pub fn feed(&mut self, osnma_data: &OsnmaDataMessage, svn: Svn, gst: Gst) -> Option<Subframe> {
        let gst_subframe = gst.gst_subframe();
        let word_num = gst.page_in_subframe();
        let (hkroot, mack) = osnma_data.split_at(HKROOT_SECTION_BYTES);
        log::trace!(
            "feeding hkroot = {hkroot:02x?}, mack = {mack:02x?} for {svn} \
             (GST {gst}, word number {word_num})"
        );
        let slot = &mut self.current[svn.index()];
        let mut flushed = None;
        if let Some(sf) = slot.as_ref()
            && sf.gst != gst_subframe
        {
            if gst_subframe.seconds_since(sf.gst) < 0 {
                log::warn!(
                    "{svn} page at {gst} is older than the subframe being collected ({})",
                    sf.gst
                );
                return None;
            }
            log::debug!(
                "{svn} subframe at {} flushed with {} pages",
                sf.gst,
                sf.num_pages()
            );
            flushed = slot.take();
        }
        let sf = slot.get_or_insert_with(|| Subframe::new(svn, gst_subframe));
        sf.hkroot[word_num] = hkroot.try_into().ok();
        sf.mack[word_num] = mack.try_into().ok();
        // Only one subframe is returned per page. If this page both flushes
        // the previous subframe and ends the current one, the current one
        // stays buffered until the next page arrives.
        if word_num == WORDS_PER_SUBFRAME - 1 && flushed.is_none() {
            let done = slot.take();
            if let Some(done) = &done {
                log::trace!(
                    "{svn} subframe at {} finished with {} pages",
                    done.gst,
                    done.num_pages()
                );
            }
            return done;
        }
        flushed
    }
}

impl Default for CollectSubframe {
    fn default() -> CollectSubframe {
        CollectSubframe::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn svn(n: u8) -> Svn {
        Svn::try_from(n).unwrap()
    }

    fn data(j: u8) -> OsnmaDataMessage {
        [j, 0x10 + j, 0x20 + j, 0x30 + j, 0x40 + j]
    }

    #[test]
    fn complete_subframe() {
        let mut collect = CollectSubframe::new();
        let start = Gst::new(1176, 120930);
        for j in 0..15u8 {
            let ret = collect.feed(&data(j), svn(5), start.add_seconds(2 * i32::from(j)));
            if j < 14 {
                assert!(ret.is_none());
            } else {
                let sf = ret.unwrap();
                assert_eq!(sf.gst, start);
                assert_eq!(sf.svn, svn(5));
                assert!(sf.is_complete());
                let hkroot = sf.hkroot_message().unwrap();
                assert_eq!(hkroot[3], 3);
                let mack = sf.mack_message().unwrap();
                assert_eq!(&mack[4..8], &[0x11, 0x21, 0x31, 0x41]);
            }
        }
    }

    #[test]
    fn missing_pages_flush() {
        let mut collect = CollectSubframe::new();
        let start = Gst::new(1176, 120930);
        for j in [0u8, 1, 2, 5, 6] {
            assert!(
                collect
                    .feed(&data(j), svn(7), start.add_seconds(2 * i32::from(j)))
                    .is_none()
            );
        }
        // other satellites do not interfere
        assert!(collect.feed(&data(0), svn(8), start).is_none());
        let sf = collect
            .feed(&data(0), svn(7), start.add_subframes(1))
            .unwrap();
        assert_eq!(sf.num_pages(), 5);
        assert!(sf.hkroot_message().is_none());
        assert!(sf.mack[3].is_none());
        assert_eq!(sf.mack[5], Some([0x15, 0x25, 0x35, 0x45]));
    }

    #[test]
    fn odd_tow_last_page() {
        let mut collect = CollectSubframe::new();
        let sf = collect
            .feed(&data(1), svn(1), Gst::new(1176, 120959))
            .unwrap();
        assert_eq!(sf.gst, Gst::new(1176, 120930));
        assert_eq!(sf.num_pages(), 1);
    }
}
