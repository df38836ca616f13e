//! MAC Look-up Table
//!
//! This module contains the MAC Look-up Table defined in ANNEX C of the
//! [OSNMA ICD](https://www.gsc-europa.eu/sites/default/files/sites/all/files/Galileo_OSNMA_SIS_ICD_v1.1.pdf),
//! and the rules used to check that a received tag matches the role that the
//! table assigns to its slot.
//!
//! Each table entry has one or two sections. The section in use alternates
//! with the subframe: it is the subframe count within the week modulo the
//! number of sections. When there are several MACK blocks per subframe, the
//! section is repeated in each block.

use crate::bitfields::Adkd;
use crate::gst::Gst;
use crate::svn::Prn;

// Maximum number of sections of an entry
const MAX_SECTIONS: usize = 2;

// Maximum value of nt in the MAC Look-up Table
const MAX_NT: usize = 10;

// Number of entries in the MAC Look-up Table
const MAC_LT_ENTRIES: usize = 12;

/// Maximum number of FLX entries in a single MAC Look-up Table sequence.
///
/// This constant is needed to dimension the buffer used in MACSEQ verification.
pub const MAX_FLX_ENTRIES: usize = 4;

// Constants used for defining MAC Look-up Table entries more briefly
const F00S: MacLTSlot = MacLTSlot::Fixed {
    adkd: Adkd::InavCed,
    object: AuthObject::SelfAuth,
};
const F00E: MacLTSlot = MacLTSlot::Fixed {
    adkd: Adkd::InavCed,
    object: AuthObject::CrossAuth,
};
const F04S: MacLTSlot = MacLTSlot::Fixed {
    adkd: Adkd::InavTiming,
    object: AuthObject::SelfAuth,
};
const F12S: MacLTSlot = MacLTSlot::Fixed {
    adkd: Adkd::SlowMac,
    object: AuthObject::SelfAuth,
};
const F12E: MacLTSlot = MacLTSlot::Fixed {
    adkd: Adkd::SlowMac,
    object: AuthObject::CrossAuth,
};
const FLX: MacLTSlot = MacLTSlot::Flex;

struct MacLTEntry {
    id: u8,
    nt: u8,
    // The first entry in the sequence is omitted, since it is always 00S and is
    // not looked up, because it corresponds to tag0.
    //
    // Inexistent entries in the sequence are filled with FLX.
    //
    // Number of sections (1 or 2). Entries with a single section only use
    // the first array of `sequence`.
    msg: u8,
    sequence: [[MacLTSlot; MAX_NT - 1]; MAX_SECTIONS],
}

// MAC Look-up Table
static MACLT: [MacLTEntry; MAC_LT_ENTRIES] = [
    MacLTEntry {
        id: 27,
        msg: 2,
        nt: 6,
        sequence: [
            [F00E, F00E, F00E, F12S, F00E, FLX, FLX, FLX, FLX],
            [F00E, F00E, F04S, F12S, F00E, FLX, FLX, FLX, FLX],
        ],
    },
    MacLTEntry {
        id: 28,
        msg: 2,
        nt: 10,
        sequence: [
            [F00E, F00E, F00E, F00S, F00E, F00E, F12S, F00E, F00E],
            [F00E, F00E, F00S, F00E, F00E, F04S, F12S, F00E, F00E],
        ],
    },
    MacLTEntry {
        id: 31,
        msg: 2,
        nt: 5,
        sequence: [
            [F00E, F00E, F12S, F00E, FLX, FLX, FLX, FLX, FLX],
            [F00E, F00E, F12S, F04S, FLX, FLX, FLX, FLX, FLX],
        ],
    },
    MacLTEntry {
        id: 33,
        msg: 2,
        nt: 6,
        sequence: [
            [F00E, F04S, F00E, F12S, F00E, FLX, FLX, FLX, FLX],
            [F00E, F00E, F12S, F00E, F12E, FLX, FLX, FLX, FLX],
        ],
    },
    MacLTEntry {
        id: 34,
        msg: 2,
        nt: 6,
        sequence: [
            [FLX, F04S, FLX, F12S, F00E, FLX, FLX, FLX, FLX],
            [FLX, F00E, F12S, F00E, F12E, FLX, FLX, FLX, FLX],
        ],
    },
    MacLTEntry {
        id: 35,
        msg: 2,
        nt: 6,
        sequence: [
            [FLX, F04S, FLX, F12S, FLX, FLX, FLX, FLX, FLX],
            [FLX, FLX, F12S, FLX, FLX, FLX, FLX, FLX, FLX],
        ],
    },
    MacLTEntry {
        id: 36,
        msg: 2,
        nt: 5,
        sequence: [
            [FLX, F04S, FLX, F12S, FLX, FLX, FLX, FLX, FLX],
            [FLX, F00E, F12S, F12E, FLX, FLX, FLX, FLX, FLX],
        ],
    },
    MacLTEntry {
        id: 37,
        msg: 2,
        nt: 5,
        sequence: [
            [F00E, F04S, F00E, F12S, FLX, FLX, FLX, FLX, FLX],
            [F00E, F00E, F12S, F12E, FLX, FLX, FLX, FLX, FLX],
        ],
    },
    MacLTEntry {
        id: 38,
        msg: 2,
        nt: 5,
        sequence: [
            [FLX, F04S, FLX, F12S, FLX, FLX, FLX, FLX, FLX],
            [FLX, FLX, F12S, FLX, FLX, FLX, FLX, FLX, FLX],
        ],
    },
    MacLTEntry {
        id: 39,
        msg: 2,
        nt: 4,
        sequence: [
            [FLX, F04S, FLX, FLX, FLX, FLX, FLX, FLX, FLX],
            [FLX, F00E, F12S, FLX, FLX, FLX, FLX, FLX, FLX],
        ],
    },
    MacLTEntry {
        id: 40,
        msg: 2,
        nt: 4,
        sequence: [
            [F00E, F04S, F12S, FLX, FLX, FLX, FLX, FLX, FLX],
            [F00E, F00E, F12E, FLX, FLX, FLX, FLX, FLX, FLX],
        ],
    },
    MacLTEntry {
        id: 41,
        msg: 2,
        nt: 4,
        sequence: [
            [FLX, F04S, FLX, FLX, FLX, FLX, FLX, FLX, FLX],
            [FLX, FLX, F12S, FLX, FLX, FLX, FLX, FLX, FLX],
        ],
    },
];

fn find_entry(maclt: u8) -> Result<&'static MacLTEntry, MacLTError> {
    MACLT
        .iter()
        .find(|x| x.id == maclt)
        .ok_or(MacLTError::InvalidMaclt)
}

/// Number of sections of the MAC Look-up Table entry `maclt`.
pub fn number_of_sections(maclt: u8) -> Result<usize, MacLTError> {
    Ok(find_entry(maclt)?.msg.into())
}

/// Number of tags `nt` in the MACK messages that use the entry `maclt`,
/// tag0 included.
pub fn number_of_tags(maclt: u8) -> Result<usize, MacLTError> {
    Ok(find_entry(maclt)?.nt.into())
}

/// Section of the entry `maclt` used by the subframe starting at
/// `gst_subframe`.
pub fn section_for(maclt: u8, gst_subframe: Gst) -> Result<usize, MacLTError> {
    let sections = number_of_sections(maclt)?;
    Ok((gst_subframe.tow() / 30) as usize % sections)
}

/// Looks up an entry in the MAC Look-up Table.
///
/// This function looks up and returns the slot of the MAC Look-up Table
/// corresponding to a `maclt` ID, section `msg` and tag number `num_tag`.
/// Tag0 (`num_tag` zero) is not in the table, since it is always `00S`.
pub fn get_maclt_entry(maclt: u8, msg: usize, num_tag: usize) -> Result<MacLTSlot, MacLTError> {
    let entry = find_entry(maclt)?;
    if msg >= usize::from(entry.msg) {
        return Err(MacLTError::InvalidSection);
    }
    if num_tag == 0 || num_tag >= entry.nt.into() {
        return Err(MacLTError::InvalidTagNumber);
    }
    Ok(entry.sequence[msg][num_tag - 1])
}

/// Returns an iterator over the indices corresponding to FLX entries.
///
/// This function returns an iterator over the tag numbers of the FLX slots
/// for a particular `maclt` ID and section `msg`.
pub fn get_flx_indices(maclt: u8, msg: usize) -> Result<impl Iterator<Item = usize>, MacLTError> {
    let entry = find_entry(maclt)?;
    if msg >= usize::from(entry.msg) {
        return Err(MacLTError::InvalidSection);
    }
    Ok(entry.sequence[msg]
        .iter()
        .take(usize::from(entry.nt) - 1)
        .enumerate()
        .filter_map(|(j, &x)| if x == FLX { Some(j + 1) } else { None }))
}

/// Checks a received tag against its MAC Look-up Table slot.
///
/// The ADKD of the tag must be the ADKD of a fixed slot. Self-authentication
/// slots require `prn_d == prn_a`. Galileo cross-authentication slots require
/// another Galileo satellite, and GNSS cross-authentication slots a PRN in the
/// range 64 to 95. Dummy tags (PRN_D [`DUMMY_PRN`](crate::DUMMY_PRN))
/// are accepted in both kinds of cross-authentication slot. Flexible slots
/// accept any non-reserved ADKD.
pub fn verify_maclt_slot(slot: MacLTSlot, adkd: Adkd, prn_a: u8, prn_d: u8) -> bool {
    match slot {
        MacLTSlot::Flex => adkd != Adkd::Reserved,
        MacLTSlot::Fixed {
            adkd: slot_adkd,
            object,
        } => {
            if slot_adkd != adkd {
                return false;
            }
            match (object, Prn::from(prn_d)) {
                (AuthObject::SelfAuth, _) => prn_d == prn_a,
                (AuthObject::CrossAuth | AuthObject::GnssAuth, Prn::Dummy) => true,
                (AuthObject::CrossAuth, Prn::Galileo(_)) => prn_d != prn_a,
                (AuthObject::GnssAuth, Prn::OtherGnss(_)) => true,
                _ => false,
            }
        }
    }
}

/// MAC Look-up Table slot.
///
/// This enum represents a slot in the MAC Look-up Table.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum MacLTSlot {
    /// Fixed slot.
    ///
    /// A fixed slot, such as '00S', '04S', '12S', '00E', or '12E'. It is
    /// composed by an ADKD and an authentication object.
    Fixed {
        /// ADKD of the fixed slot.
        adkd: Adkd,
        /// Authentication object of the fixed slot.
        object: AuthObject,
    },
    /// Flexible slot ('FLX').
    Flex,
}

/// Authentication object.
///
/// This enum lists the possible objects that are authenticated by a MAC Look-up
/// Table entry.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum AuthObject {
    /// Self-authentication ('S').
    SelfAuth,
    /// Galileo cross-authentication ('E').
    CrossAuth,
    /// Cross-authentication of another GNSS ('G').
    GnssAuth,
}

/// Errors produced during MAC Table look-up.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, thiserror::Error)]
pub enum MacLTError {
    /// The value of the MACLT does not appear as an ID in the MAC Look-up
    /// Table.
    #[error("invalid MAC look-up table ID")]
    InvalidMaclt,
    /// The section number is not used by the entry.
    #[error("invalid MAC look-up table section")]
    InvalidSection,
    /// The tag number is zero or not smaller than the number of tags 'nt' in
    /// the MAC Look-up Table entry.
    #[error("invalid tag number")]
    InvalidTagNumber,
}
