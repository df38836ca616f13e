//! Reed-Solomon recovery of I/NAV ephemeris words.
//!
//! Galileo I/NAV words 17 to 20 carry Reed-Solomon parity for words 1 to 4.
//! The code is RS(255,195) over GF(256), with field polynomial
//! x^8+x^4+x^3+x^2+1 and first consecutive root α^1, shortened to
//! RS(118,58). The 58-byte information vector is made of word 1 (with its
//! word type cleared) and the data bits of words 2 to 4. The 60-byte parity
//! vector is made of the parity bits of words 17 to 20.
//!
//! Any four of these eight words are in general enough to recover the rest,
//! which are treated as erasures. [`ReedSolomon`] keeps a buffer per
//! satellite and returns the recovered words 1 to 4 as soon as this is
//! possible.

use crate::gst::Gst;
use crate::svn::Svn;
use crate::types::{BitSlice, INAV_WORD_BYTES, InavWord, NUM_SVNS};
use bitvec::prelude::*;

/// Number of bytes of the information vector.
pub const INFO_BYTES: usize = 58;
/// Number of bytes of the parity vector.
pub const PARITY_BYTES: usize = 60;
/// Number of bytes of the shortened codeword.
pub const CODEWORD_BYTES: usize = INFO_BYTES + PARITY_BYTES;

// Bytes contributed by word 1, by each of words 2 to 4, and by each parity
// word
const WORD1_BYTES: usize = 16;
const CED_WORD_BYTES: usize = 14;
const PARITY_WORD_BYTES: usize = 15;
const NUM_WORDS: usize = 8;
const FIRST_PARITY_WORD: u8 = 17;
// Buffers without updates for this long are discarded
const MAX_AGE_SECONDS: i64 = 1800;

const FIELD_POLY: u16 = 0x11d;

struct Tables {
    exp: [u8; 512],
    log: [u8; 256],
}

const fn build_tables() -> Tables {
    let mut exp = [0u8; 512];
    let mut log = [0u8; 256];
    let mut x: u16 = 1;
    let mut i = 0;
    while i < 255 {
        exp[i] = x as u8;
        exp[i + 255] = x as u8;
        log[x as usize] = i as u8;
        x <<= 1;
        if x & 0x100 != 0 {
            x ^= FIELD_POLY;
        }
        i += 1;
    }
    Tables { exp, log }
}

static GF: Tables = build_tables();

fn mul(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        0
    } else {
        GF.exp[usize::from(GF.log[usize::from(a)]) + usize::from(GF.log[usize::from(b)])]
    }
}

// a / b, with b != 0
fn div(a: u8, b: u8) -> u8 {
    if a == 0 {
        0
    } else {
        GF.exp[usize::from(GF.log[usize::from(a)]) + 255 - usize::from(GF.log[usize::from(b)])]
    }
}

fn alpha_pow(e: usize) -> u8 {
    GF.exp[e % 255]
}

// Evaluates a polynomial given lowest degree first
fn poly_eval(poly: &[u8], x: u8) -> u8 {
    poly.iter().rev().fold(0, |acc, &c| mul(acc, x) ^ c)
}

// g(x) = (x + α^1)(x + α^2)...(x + α^60), lowest degree first
fn generator() -> [u8; PARITY_BYTES + 1] {
    let mut g = [0u8; PARITY_BYTES + 1];
    g[0] = 1;
    for i in 1..=PARITY_BYTES {
        let root = alpha_pow(i);
        for k in (1..=i).rev() {
            g[k] = g[k - 1] ^ mul(root, g[k]);
        }
        g[0] = mul(root, g[0]);
    }
    g
}

/// Computes the parity vector of an information vector.
///
/// The codeword is the information vector followed by the parity vector, with
/// the first byte as the highest degree coefficient.
pub fn encode(info: &[u8; INFO_BYTES]) -> [u8; PARITY_BYTES] {
    let g = generator();
    let mut rem = [0u8; PARITY_BYTES];
    for &b in info {
        let feedback = b ^ rem[PARITY_BYTES - 1];
        for k in (1..PARITY_BYTES).rev() {
            rem[k] = rem[k - 1] ^ mul(feedback, g[k]);
        }
        rem[0] = mul(feedback, g[0]);
    }
    core::array::from_fn(|j| rem[PARITY_BYTES - 1 - j])
}

fn syndromes(codeword: &[u8; CODEWORD_BYTES]) -> [u8; PARITY_BYTES] {
    core::array::from_fn(|j| {
        let x = alpha_pow(j + 1);
        codeword.iter().fold(0, |acc, &c| mul(acc, x) ^ c)
    })
}

/// Fills the erased bytes of a codeword.
///
/// `erasures` lists the positions in the codeword of the bytes whose value is
/// unknown. On success every erased byte has been replaced and the codeword
/// has zero syndrome. An error is returned if there are more erasures than
/// parity bytes or if the bytes that are not erased are not consistent with
/// any codeword.
pub fn decode(codeword: &mut [u8; CODEWORD_BYTES], erasures: &[usize]) -> Result<(), RsError> {
    let mut positions: Vec<usize> = erasures.to_vec();
    positions.sort_unstable();
    positions.dedup();
    if positions.len() > PARITY_BYTES {
        return Err(RsError::TooManyErasures(positions.len()));
    }
    if let Some(&p) = positions.iter().find(|&&p| p >= CODEWORD_BYTES) {
        return Err(RsError::InvalidPosition(p));
    }
    let s = syndromes(codeword);
    if s.iter().all(|&x| x == 0) {
        return Ok(());
    }
    if positions.is_empty() {
        return Err(RsError::Inconsistent);
    }

    let locators: Vec<u8> = positions
        .iter()
        .map(|&p| alpha_pow(CODEWORD_BYTES - 1 - p))
        .collect();
    // Erasure locator polynomial, lowest degree first
    let mut lambda = vec![1u8];
    for &x in &locators {
        let mut next = vec![0u8; lambda.len() + 1];
        for (k, &c) in lambda.iter().enumerate() {
            next[k] ^= c;
            next[k + 1] ^= mul(c, x);
        }
        lambda = next;
    }
    // Error evaluator polynomial: S(x) Λ(x) mod x^60
    let mut omega = [0u8; PARITY_BYTES];
    for (i, &si) in s.iter().enumerate() {
        for (k, &lk) in lambda.iter().enumerate() {
            if i + k < PARITY_BYTES {
                omega[i + k] ^= mul(si, lk);
            }
        }
    }
    // Formal derivative: only odd powers survive in characteristic 2
    let lambda_prime: Vec<u8> = lambda
        .iter()
        .enumerate()
        .skip(1)
        .map(|(k, &c)| if k % 2 == 1 { c } else { 0 })
        .collect();

    for (&p, &x) in positions.iter().zip(&locators) {
        let x_inv = div(1, x);
        let denominator = poly_eval(&lambda_prime, x_inv);
        if denominator == 0 {
            return Err(RsError::Inconsistent);
        }
        codeword[p] ^= div(poly_eval(&omega, x_inv), denominator);
    }
    if syndromes(codeword).iter().any(|&x| x != 0) {
        return Err(RsError::Inconsistent);
    }
    Ok(())
}

/// Reed-Solomon errors.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, thiserror::Error)]
pub enum RsError {
    /// More erasures than parity bytes.
    #[error("too many erasures ({0})")]
    TooManyErasures(usize),
    /// An erasure position is outside the codeword.
    #[error("erasure position {0} out of range")]
    InvalidPosition(usize),
    /// The received bytes are not consistent with any codeword, or the
    /// recovered words contradict words already held.
    #[error("recovery inconsistent with received data")]
    Inconsistent,
}

// Byte range of the codeword carried by each word. Index 0 to 3 are words 1
// to 4, index 4 to 7 are words 17 to 20.
fn word_range(idx: usize) -> core::ops::Range<usize> {
    match idx {
        0 => 0..WORD1_BYTES,
        1..=3 => {
            let start = WORD1_BYTES + (idx - 1) * CED_WORD_BYTES;
            start..start + CED_WORD_BYTES
        }
        _ => {
            let start = INFO_BYTES + (idx - 4) * PARITY_WORD_BYTES;
            start..start + PARITY_WORD_BYTES
        }
    }
}

fn word_index(word_type: u8) -> Option<usize> {
    match word_type {
        1..=4 => Some(usize::from(word_type) - 1),
        17..=20 => Some(usize::from(word_type - FIRST_PARITY_WORD) + 4),
        _ => None,
    }
}

// Writes the bits of an INAV word that belong to the codeword.
fn word_to_codeword(idx: usize, word: &BitSlice, dest: &mut BitSlice) {
    match idx {
        0 => {
            dest[..6].fill(false);
            dest[6..128].copy_from_bitslice(&word[6..128]);
        }
        1..=3 => dest.copy_from_bitslice(&word[16..128]),
        _ => {
            dest[..8].copy_from_bitslice(&word[6..14]);
            dest[8..].copy_from_bitslice(&word[16..128]);
        }
    }
}

// Rebuilds an INAV word from the codeword. `iod` is the full IODnav.
fn codeword_to_word(idx: usize, codeword: &BitSlice, iod: u16) -> InavWord {
    let mut word = [0u8; INAV_WORD_BYTES];
    let bits = BitSlice::from_slice_mut(&mut word);
    match idx {
        0 => {
            bits.copy_from_bitslice(codeword);
            bits[..6].store_be(1u8);
        }
        1..=3 => {
            bits[..6].store_be(u8::try_from(idx + 1).unwrap_or(0));
            bits[6..16].store_be(iod);
            bits[16..].copy_from_bitslice(codeword);
        }
        _ => {
            bits[..6].store_be(FIRST_PARITY_WORD + u8::try_from(idx - 4).unwrap_or(0));
            bits[6..14].copy_from_bitslice(&codeword[..8]);
            bits[14..16].store_be(iod & 3);
            bits[16..].copy_from_bitslice(&codeword[8..]);
        }
    }
    word
}

/// Computes words 17 to 20 for words 1 to 4.
///
/// This is the transmitter side of the code, used to build test data.
pub fn parity_words(ced: &[InavWord; 4]) -> [InavWord; 4] {
    let mut codeword = [0u8; CODEWORD_BYTES];
    for (idx, word) in ced.iter().enumerate() {
        let range = word_range(idx);
        let dest = &mut BitSlice::from_slice_mut(&mut codeword)[range.start * 8..range.end * 8];
        word_to_codeword(idx, BitSlice::from_slice(word), dest);
    }
    let mut info = [0u8; INFO_BYTES];
    info.copy_from_slice(&codeword[..INFO_BYTES]);
    codeword[INFO_BYTES..].copy_from_slice(&encode(&info));
    let iod = BitSlice::from_slice(&ced[0])[6..16].load_be::<u16>();
    core::array::from_fn(|j| {
        let range = word_range(j + 4);
        codeword_to_word(
            j + 4,
            &BitSlice::from_slice(&codeword)[range.start * 8..range.end * 8],
            iod,
        )
    })
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Hash)]
struct RsBuffer {
    iod: Option<u16>,
    iod_lsb: Option<u8>,
    words: [Option<InavWord>; NUM_WORDS],
    last_update: Option<Gst>,
    done: bool,
}

impl RsBuffer {
    fn reset(&mut self) {
        *self = RsBuffer::default();
    }

    fn feed(&mut self, svn: Svn, gst: Gst, word: &InavWord) -> Result<Vec<InavWord>, RsError> {
        let bits = BitSlice::from_slice(word);
        let Some(idx) = word_index(bits[..6].load_be::<u8>()) else {
            return Ok(Vec::new());
        };
        if let Some(last) = self.last_update
            && gst.seconds_since(last) > MAX_AGE_SECONDS
        {
            log::debug!("{svn} Reed-Solomon buffer expired at {gst}");
            self.reset();
        }
        if idx < 4 {
            let iod = bits[6..16].load_be::<u16>();
            let stale = self.iod.is_some_and(|i| i != iod)
                || self.iod_lsb.is_some_and(|lsb| u16::from(lsb) != iod & 3);
            if stale {
                log::debug!("{svn} Reed-Solomon buffer reset by IODnav {iod} at {gst}");
                self.reset();
            }
            self.iod = Some(iod);
            self.iod_lsb = Some((iod & 3) as u8);
        } else {
            let lsb = bits[14..16].load_be::<u8>();
            if self.iod_lsb.is_some_and(|l| l != lsb) {
                log::debug!("{svn} Reed-Solomon buffer reset by parity IODnav LSBs {lsb} at {gst}");
                self.reset();
            }
            self.iod_lsb = Some(lsb);
        }
        self.last_update = Some(gst);
        if let Some(held) = &self.words[idx]
            && held != word
        {
            log::warn!("{svn} word {} at {gst} differs from the buffered word", idx + 1);
            self.reset();
            return Err(RsError::Inconsistent);
        }
        self.words[idx] = Some(*word);
        self.try_recover(svn, gst)
    }

    fn try_recover(&mut self, svn: Svn, gst: Gst) -> Result<Vec<InavWord>, RsError> {
        let present = self.words.iter().filter(|w| w.is_some()).count();
        let missing_ced = self.words[..4].iter().any(|w| w.is_none());
        let Some(iod) = self.iod else {
            return Ok(Vec::new());
        };
        if self.done || !missing_ced || present < 4 {
            return Ok(Vec::new());
        }
        let erasures: Vec<usize> = self
            .words
            .iter()
            .enumerate()
            .filter(|(_, w)| w.is_none())
            .flat_map(|(idx, _)| word_range(idx))
            .collect();
        if erasures.len() > PARITY_BYTES {
            return Ok(Vec::new());
        }
        let mut codeword = [0u8; CODEWORD_BYTES];
        for (idx, word) in self.words.iter().enumerate() {
            if let Some(word) = word {
                let range = word_range(idx);
                let dest =
                    &mut BitSlice::from_slice_mut(&mut codeword)[range.start * 8..range.end * 8];
                word_to_codeword(idx, BitSlice::from_slice(word), dest);
            }
        }
        if let Err(e) = decode(&mut codeword, &erasures) {
            log::warn!("{svn} Reed-Solomon recovery failed at {gst}: {e}");
            self.done = true;
            return Err(e);
        }
        let codeword_bits = BitSlice::from_slice(&codeword);
        let recovered_iod = codeword_bits[6..16].load_be::<u16>();
        if recovered_iod != iod {
            log::warn!(
                "{svn} Reed-Solomon recovery at {gst} gives IODnav {recovered_iod} \
                 (expected {iod})"
            );
            self.done = true;
            return Err(RsError::Inconsistent);
        }
        let mut recovered = Vec::new();
        for idx in 0..4 {
            if self.words[idx].is_none() {
                let range = word_range(idx);
                let word = codeword_to_word(
                    idx,
                    &codeword_bits[range.start * 8..range.end * 8],
                    iod,
                );
                self.words[idx] = Some(word);
                recovered.push(word);
            }
        }
        log::info!(
            "{svn} recovered {} words with Reed-Solomon at {gst} (IODnav {iod})",
            recovered.len()
        );
        self.done = true;
        Ok(recovered)
    }
}

/// Per-satellite Reed-Solomon recovery of words 1 to 4.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ReedSolomon {
    buffers: Vec<RsBuffer>,
}

impl ReedSolomon {
    /// Creates empty buffers for all the satellites.
    pub fn new() -> ReedSolomon {
        ReedSolomon {
            buffers: vec![RsBuffer::default(); NUM_SVNS],
        }
    }

    /// Feeds an INAV word received from `svn`.
    ///
    /// Words other than 1 to 4 and 17 to 20 are ignored. When the word
    /// completes a decodable set, the missing words among 1 to 4 are returned
    /// (with their word type and IODnav filled in). Each set is decoded at
    /// most once.
    pub fn feed(&mut self, svn: Svn, gst: Gst, word: &InavWord) -> Result<Vec<InavWord>, RsError> {
        self.buffers[svn.index()].feed(svn, gst, word)
    }

    /// Discards the buffer of `svn`.
    pub fn reset(&mut self, svn: Svn) {
        self.buffers[svn.index()].reset();
    }
}

impl Default for ReedSolomon {
    fn default() -> ReedSolomon {
        ReedSolomon::new()
    }
}
