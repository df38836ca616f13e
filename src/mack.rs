//! MACK message parsing.
//!
//! This module contains [`Mack`], which splits the 480-bit MACK section of a
//! subframe into its tags and TESLA key. The MACK can be incomplete: each
//! field is only returned if all the 32-bit pages that carry it were received.

use crate::bitfields::Adkd;
use crate::types::{
    BitSlice, MACK_MESSAGE_BITS, MACK_MESSAGE_BYTES, MackSection, WORDS_PER_SUBFRAME,
};
use bitvec::prelude::*;
use core::fmt;

const MACK_SECTION_BITS: usize = 32;
// Largest tag size allowed by the TS field
const MAX_TAG_BYTES: usize = 5;
const TAG_INFO_BITS: usize = 16;
const MACSEQ_BITS: usize = 12;

/// Tag bits, as received.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Tag {
    bytes: [u8; MAX_TAG_BYTES],
    len: usize,
}

impl Tag {
    pub(crate) fn from_bitslice(bits: &BitSlice) -> Tag {
        let mut bytes = [0; MAX_TAG_BYTES];
        let len = bits.len().min(MAX_TAG_BYTES * 8);
        BitSlice::from_slice_mut(&mut bytes)[..len].copy_from_bitslice(&bits[..len]);
        Tag { bytes, len }
    }

    /// Tag bits.
    pub fn as_bitslice(&self) -> &BitSlice {
        &BitSlice::from_slice(&self.bytes)[..self.len]
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({})", hex::encode(&self.bytes[..self.len.div_ceil(8)]))
    }
}

/// Tag0 together with the MACSEQ and COP fields of a MACK block.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Tag0AndSeq {
    /// Tag0, which authenticates the CED of the transmitting satellite.
    pub tag0: Tag,
    /// MAC sequence protecting the tag info of the flexible tags.
    pub macseq: u16,
    /// Cut-off point: number of subframes the data can be older than the tag.
    pub cop: u8,
}

/// A tag other than tag0, with its tag info field.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct TagAndInfo {
    /// Tag.
    pub tag: Tag,
    /// PRN of the satellite whose data is authenticated.
    pub prnd: u8,
    /// Raw ADKD field.
    pub adkd_code: u8,
    /// IOD_TAG field. Its most significant bit flags new data.
    pub iod_tag: u8,
}

impl TagAndInfo {
    /// ADKD of the tag.
    pub fn adkd(&self) -> Adkd {
        Adkd::from(self.adkd_code)
    }

    /// The 16-bit tag info field as transmitted.
    pub fn tag_info(&self) -> u16 {
        (u16::from(self.prnd) << 8)
            | (u16::from(self.adkd_code & 0xf) << 4)
            | u16::from(self.iod_tag & 0xf)
    }

    /// Returns `true` if the new data flag of IOD_TAG is set.
    pub fn new_data(&self) -> bool {
        self.iod_tag & 0x8 != 0
    }

    /// Data issue identifier: the three least significant bits of IOD_TAG.
    pub fn iod(&self) -> u8 {
        self.iod_tag & 0x7
    }
}

/// MACK message.
///
/// The message is divided in NMACK blocks. Each block contains tag0, MACSEQ
/// and COP, followed by `nt - 1` tags with their tag info, and the TESLA key.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Mack {
    data: [u8; MACK_MESSAGE_BYTES],
    present: [bool; WORDS_PER_SUBFRAME],
    key_size: usize,
    tag_size: usize,
    nmack: usize,
}

impl Mack {
    /// Builds a MACK from a complete message.
    pub fn new(
        data: &[u8; MACK_MESSAGE_BYTES],
        key_size: usize,
        tag_size: usize,
        nmack: u8,
    ) -> Mack {
        Mack {
            data: *data,
            present: [true; WORDS_PER_SUBFRAME],
            key_size,
            tag_size,
            nmack: usize::from(nmack.max(1)),
        }
    }

    /// Builds a MACK from the MACK sections of a subframe, some of which may
    /// be missing.
    pub fn from_sections(
        sections: &[Option<MackSection>; WORDS_PER_SUBFRAME],
        key_size: usize,
        tag_size: usize,
        nmack: u8,
    ) -> Mack {
        let mut data = [0; MACK_MESSAGE_BYTES];
        let mut present = [false; WORDS_PER_SUBFRAME];
        for (j, (dest, section)) in data
            .chunks_exact_mut(MACK_SECTION_BITS / 8)
            .zip(sections.iter())
            .enumerate()
        {
            if let Some(section) = section {
                dest.copy_from_slice(section);
                present[j] = true;
            }
        }
        Mack {
            data,
            present,
            key_size,
            tag_size,
            nmack: usize::from(nmack.max(1)),
        }
    }

    fn bits(&self) -> &BitSlice {
        BitSlice::from_slice(&self.data)
    }

    /// Returns `true` if all the pages of the MACK were received.
    pub fn is_complete(&self) -> bool {
        self.present.iter().all(|&p| p)
    }

    /// Number of MACK blocks.
    pub fn nmack(&self) -> usize {
        self.nmack
    }

    /// Key size in bits.
    pub fn key_size(&self) -> usize {
        self.key_size
    }

    /// Tag size in bits.
    pub fn tag_size(&self) -> usize {
        self.tag_size
    }

    fn block_bits(&self) -> usize {
        MACK_MESSAGE_BITS / self.nmack
    }

    /// Number of tags in each block, tag0 included.
    ///
    /// Returns zero if the key does not fit in the block.
    pub fn num_tags(&self) -> usize {
        self.block_bits().saturating_sub(self.key_size) / (self.tag_size + TAG_INFO_BITS)
    }

    // Returns the bits in `[start, start + len)` if all the pages that
    // carry them were received.
    fn field(&self, start: usize, len: usize) -> Option<&BitSlice> {
        let end = start + len;
        if len == 0 || end > MACK_MESSAGE_BITS {
            return None;
        }
        let pages = start / MACK_SECTION_BITS..=(end - 1) / MACK_SECTION_BITS;
        if !self.present[pages].iter().all(|&p| p) {
            return None;
        }
        Some(&self.bits()[start..end])
    }

    fn slot_start(&self, block: usize, slot: usize) -> usize {
        block * self.block_bits() + slot * (self.tag_size + TAG_INFO_BITS)
    }

    /// Tag0, MACSEQ and COP of block `block` (starting at 0).
    pub fn tag0_and_seq(&self, block: usize) -> Option<Tag0AndSeq> {
        if block >= self.nmack || self.num_tags() == 0 {
            return None;
        }
        let slot = self.field(self.slot_start(block, 0), self.tag_size + TAG_INFO_BITS)?;
        let info = &slot[self.tag_size..];
        Some(Tag0AndSeq {
            tag0: Tag::from_bitslice(&slot[..self.tag_size]),
            macseq: info[..MACSEQ_BITS].load_be::<u16>(),
            cop: info[MACSEQ_BITS..].load_be::<u8>(),
        })
    }

    /// Tag `tag` (from 1 to `nt - 1`) of block `block`, with its tag info.
    pub fn tag_and_info(&self, block: usize, tag: usize) -> Option<TagAndInfo> {
        if block >= self.nmack || tag == 0 || tag >= self.num_tags() {
            return None;
        }
        let slot = self.field(self.slot_start(block, tag), self.tag_size + TAG_INFO_BITS)?;
        let info = &slot[self.tag_size..];
        Some(TagAndInfo {
            tag: Tag::from_bitslice(&slot[..self.tag_size]),
            prnd: info[..8].load_be::<u8>(),
            adkd_code: info[8..12].load_be::<u8>(),
            iod_tag: info[12..16].load_be::<u8>(),
        })
    }

    /// TESLA key of block `block`.
    pub fn key(&self, block: usize) -> Option<&BitSlice> {
        if block >= self.nmack || self.num_tags() == 0 {
            return None;
        }
        let start = self.slot_start(block, self.num_tags());
        self.field(start, self.key_size)
    }
}

impl fmt::Debug for Mack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("Mack");
        dbg.field("nmack", &self.nmack);
        for block in 0..self.nmack {
            dbg.field("tag0_and_seq", &self.tag0_and_seq(block));
            for tag in 1..self.num_tags() {
                dbg.field("tag_and_info", &self.tag_and_info(block, tag));
            }
            dbg.field("key", &self.key(block).map(|k| k.to_bitvec()));
        }
        dbg.finish()
    }
}
