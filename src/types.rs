//! Common types and sizes.
//!
//! This module holds the normalized page record consumed by
//! [`Osnma`](crate::Osnma) and the fixed-size buffers that the OSNMA
//! protocol is built from.

use crate::{Gst, Svn};
use bitvec::prelude::*;

/// Number of SVNs in the Galileo constellation.
pub const NUM_SVNS: usize = 36;

/// Number of pages (words) in a subframe.
pub const WORDS_PER_SUBFRAME: usize = 15;

/// Size of the HKROOT section of a page in bytes.
pub const HKROOT_SECTION_BYTES: usize = 1;
/// Size of the MACK section of a page in bytes.
pub const MACK_SECTION_BYTES: usize = 4;
/// HKROOT section transmitted in one page.
pub type HkrootSection = [u8; HKROOT_SECTION_BYTES];
/// MACK section transmitted in one page.
pub type MackSection = [u8; MACK_SECTION_BYTES];

/// OSNMA data field of a page: HKROOT section followed by MACK section.
pub type OsnmaDataMessage = [u8; HKROOT_SECTION_BYTES + MACK_SECTION_BYTES];

/// Size of a full HKROOT message in bytes.
pub const HKROOT_MESSAGE_BYTES: usize = HKROOT_SECTION_BYTES * WORDS_PER_SUBFRAME;
/// Size of a full MACK message in bytes.
pub const MACK_MESSAGE_BYTES: usize = MACK_SECTION_BYTES * WORDS_PER_SUBFRAME;
/// Size of a MACK message in bits.
pub const MACK_MESSAGE_BITS: usize = MACK_MESSAGE_BYTES * 8;

/// Size of a DSM block in bytes.
pub const DSM_BLOCK_BYTES: usize = 13;
/// DSM block.
pub type DsmBlock = [u8; DSM_BLOCK_BYTES];

/// Size of an INAV word in bytes.
pub const INAV_WORD_BYTES: usize = 16;
/// INAV word (128 bits, word type included).
pub type InavWord = [u8; INAV_WORD_BYTES];

/// Size of a nominal page pair (even and odd page) in bytes.
pub const PAGE_BYTES: usize = 30;

/// Merkle tree node (a SHA-256 output).
pub type MerkleTreeNode = [u8; 32];

/// Bit slice type used throughout the crate.
pub type BitSlice = bitvec::slice::BitSlice<u8, bitvec::order::Msb0>;

/// INAV band.
///
/// The INAV message is transmitted on E1-B and E5b-I. OSNMA data is only
/// present on E1-B.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum InavBand {
    /// E1-B band.
    E1B,
    /// E5b-I band.
    E5B,
}

/// Navigation page.
///
/// This is the normalized page record that transport-specific readers must
/// produce. `nav_bits` contains the 240 bits of the even page followed by the
/// odd page (tail bits included, so the OSNMA field sits at bits 138 to 178).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct NavigationPage {
    /// Transmitting satellite.
    pub svn: Svn,
    /// GST at the start of the page transmission.
    pub gst: Gst,
    /// Page contents.
    pub nav_bits: [u8; PAGE_BYTES],
    /// Band where the page was received.
    pub band: InavBand,
    /// Whether the page CRC was correct.
    pub crc_ok: bool,
}

impl NavigationPage {
    fn bits(&self) -> &BitSlice {
        BitSlice::from_slice(&self.nav_bits)
    }

    /// Returns the 128-bit INAV word carried by the page.
    ///
    /// The word is made of the 112 data bits of the even page and the 16 data
    /// bits of the odd page.
    pub fn inav_word(&self) -> InavWord {
        let mut word = [0u8; INAV_WORD_BYTES];
        let dest = BitSlice::from_slice_mut(&mut word);
        dest[..112].copy_from_bitslice(&self.bits()[2..114]);
        dest[112..].copy_from_bitslice(&self.bits()[122..138]);
        word
    }

    /// Returns the word type of the INAV word.
    pub fn word_type(&self) -> u8 {
        self.bits()[2..8].load_be::<u8>()
    }

    /// Returns `true` if either half of the page is an alert page.
    pub fn is_alert(&self) -> bool {
        self.bits()[1] || self.bits()[121]
    }

    /// Returns the 40-bit OSNMA field of the page.
    pub fn osnma_data(&self) -> OsnmaDataMessage {
        let mut data = [0u8; HKROOT_SECTION_BYTES + MACK_SECTION_BYTES];
        BitSlice::from_slice_mut(&mut data).copy_from_bitslice(&self.bits()[138..178]);
        data
    }

    /// Returns `true` if the page carries OSNMA data.
    ///
    /// Satellites that do not transmit OSNMA fill the field with zeros.
    pub fn has_osnma(&self) -> bool {
        self.bits()[138..178].any()
    }

    /// Returns the DSM ID and DSM block ID announced by the page, if the page
    /// is the second one of its subframe (TOW 2 modulo 30).
    pub fn dsm_ids(&self) -> Option<(u8, u8)> {
        (self.gst.page_in_subframe() == 1).then(|| {
            (
                self.bits()[138..142].load_be::<u8>(),
                self.bits()[142..146].load_be::<u8>(),
            )
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn page_with(bits: &[(usize, bool)]) -> NavigationPage {
        let mut nav_bits = [0u8; PAGE_BYTES];
        let b = BitSlice::from_slice_mut(&mut nav_bits);
        for &(j, v) in bits {
            b.set(j, v);
        }
        NavigationPage {
            svn: Svn::try_from(1u8).unwrap(),
            gst: Gst::new(1200, 32),
            nav_bits,
            band: InavBand::E1B,
            crc_ok: true,
        }
    }

    #[test]
    fn osnma_detection() {
        assert!(!page_with(&[]).has_osnma());
        assert!(page_with(&[(177, true)]).has_osnma());
        assert!(!page_with(&[(178, true)]).has_osnma());
    }

    #[test]
    fn dsm_ids() {
        // DSM ID 0b1000, block ID 0b0001
        let page = page_with(&[(138, true), (145, true)]);
        assert_eq!(page.dsm_ids(), Some((8, 1)));
    }

    #[test]
    fn word_splicing() {
        let page = page_with(&[(2, true), (113, true), (122, true), (137, true)]);
        let word = page.inav_word();
        let w = BitSlice::from_slice(&word);
        assert!(w[0] && w[111] && w[112] && w[127]);
        assert_eq!(w.count_ones(), 4);
        assert_eq!(page.word_type(), 32);
    }
}
